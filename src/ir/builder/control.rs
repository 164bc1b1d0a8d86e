//! Phis and structured control flow.

use crate::ir::{BlockId, Builder, Cursor, Dest, InstrKind, Instruction, Operand, Terminator, ValueId};

/// Blocks created by [`Builder::push_if`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IfBlocks {
    /// Taken when the condition is true.
    pub then_block: BlockId,
    /// Taken when the condition is false.
    pub else_block: BlockId,
    /// Join point; holds what followed the cursor before the split.
    pub merge_block: BlockId,
}

/// Blocks created by [`Builder::push_loop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopBlocks {
    /// Loop header; entered from the preheader and the back edge.
    pub header: BlockId,
    /// Loop body; jumps back to the header.
    pub body: BlockId,
    /// Block after the loop; holds what followed the cursor before the split.
    pub exit: BlockId,
}

impl Builder<'_> {
    /// Phi in the cursor's block with one `(predecessor, value)` pair per
    /// incoming edge. The cursor does not move.
    ///
    /// # Panics
    ///
    /// Panics if `sources` is empty or the values differ in shape.
    pub fn phi(&mut self, sources: &[(BlockId, ValueId)]) -> ValueId {
        let (block, _) = self.shader().resolve(self.cursor());
        assert!(!sources.is_empty(), "phi without sources");
        let first = sources[0].1;
        let value = self.shader().value(first);
        let (bits, comps) = (value.bit_size(), value.num_components());
        for &(_, v) in sources {
            let other = self.shader().value(v);
            assert!(
                other.bit_size() == bits && other.num_components() == comps,
                "phi sources differ in shape: {first} vs {v}"
            );
        }

        let dest = self.shader_mut().create_value(bits, comps);
        let instr = Instruction::new(
            InstrKind::Phi(sources.iter().map(|&(b, _)| b).collect()),
            sources.iter().map(|&(_, v)| Operand::value(v)).collect(),
            Some(Dest::Value(dest)),
        )
        .with_exec_size(self.exec_size);
        self.shader_mut()
            .insert_instruction(Cursor::BlockStart(block), instr);
        dest
    }

    /// Ends the current block with `if (cond)`: the block is split at the
    /// cursor, then/else blocks are created and both jump to the merge block
    /// holding the split-off tail. The cursor moves to the end of the then
    /// block.
    pub fn push_if(&mut self, cond: ValueId) -> IfBlocks {
        let (block, _) = self.shader().resolve(self.cursor());
        let cursor = self.cursor();
        let shader = self.shader_mut();

        let merge_block = shader.split_block_at(cursor);
        let then_block = shader.create_block_after(block);
        let else_block = shader.create_block_after(then_block);
        shader.set_terminator(then_block, Terminator::Jump(merge_block));
        shader.set_terminator(else_block, Terminator::Jump(merge_block));
        shader.set_terminator(
            block,
            Terminator::Branch {
                cond,
                then_block,
                else_block,
            },
        );

        self.set_cursor(Cursor::BlockEnd(then_block));
        IfBlocks {
            then_block,
            else_block,
            merge_block,
        }
    }

    /// Starts a loop at the cursor: the block is split, the preheader jumps
    /// to a new header, the header falls through to the body and the body
    /// jumps back. The exit block (the split-off tail) has no predecessors
    /// until [`Builder::loop_exit_if`] adds the exit edge. The cursor moves to
    /// the start of the header.
    pub fn push_loop(&mut self) -> LoopBlocks {
        let (preheader, _) = self.shader().resolve(self.cursor());
        let cursor = self.cursor();
        let shader = self.shader_mut();

        let exit = shader.split_block_at(cursor);
        let header = shader.create_block_after(preheader);
        let body = shader.create_block_after(header);
        shader.set_terminator(header, Terminator::Jump(body));
        shader.set_terminator(body, Terminator::Jump(header));
        shader.set_terminator(preheader, Terminator::Jump(header));

        self.set_cursor(Cursor::BlockStart(header));
        LoopBlocks { header, body, exit }
    }

    /// Makes the loop header leave the loop when `cond` is true.
    pub fn loop_exit_if(&mut self, blocks: &LoopBlocks, cond: ValueId) {
        self.shader_mut().set_terminator(
            blocks.header,
            Terminator::Branch {
                cond,
                then_block: blocks.exit,
                else_block: blocks.body,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use crate::ir::{Builder, Cursor, Operand, Shader, ShaderStage, Terminator};

    #[test]
    fn test_push_if_builds_diamond() {
        let mut shader = Shader::new("if", ShaderStage::Fragment);
        let entry = shader.entry();
        let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
        let x = b.load_input(32, 0, 1, 32);
        let cond = b.fge_imm(x, 0.0);
        let tail_value = b.fneg(x);
        let tail = b.shader().value(tail_value).parent().unwrap();

        b.set_cursor(Cursor::Before(tail));
        let ifb = b.push_if(cond);
        let a = b.fmul_imm(x, 2.0);
        b.set_cursor(Cursor::BlockEnd(ifb.else_block));
        let c = b.fmul_imm(x, 3.0);
        b.set_cursor(Cursor::BlockStart(ifb.merge_block));
        let joined = b.phi(&[(ifb.then_block, a), (ifb.else_block, c)]);
        b.store_output(joined, 32, 0);

        assert_eq!(shader.predecessors(ifb.merge_block), &[ifb.then_block, ifb.else_block]);
        assert_eq!(shader.instr(tail).block(), ifb.merge_block);
        assert!(matches!(
            shader.block(entry).terminator(),
            Terminator::Branch { .. }
        ));
        assert_eq!(
            shader.block_ids().collect::<Vec<_>>(),
            vec![entry, ifb.then_block, ifb.else_block, ifb.merge_block]
        );
        shader.validate().unwrap();
    }

    #[test]
    fn test_push_loop_with_counter() {
        let mut shader = Shader::new("loop", ShaderStage::Compute);
        let entry = shader.entry();
        let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
        let zero = b.imm_int(0, 32);
        let placeholder = b.undef(32, 1);
        let l = b.push_loop();
        let i = b.phi(&[(entry, zero), (l.body, placeholder)]);
        let ten = b.imm_int(10, 32);
        let done = b.ige(i, ten);
        b.loop_exit_if(&l, done);
        b.set_cursor(Cursor::BlockEnd(l.body));
        let next = b.iadd_imm(i, 1);
        let phi = b.shader().value(i).parent().unwrap();
        b.shader_mut().set_phi_source(phi, l.body, Operand::value(next));

        assert_eq!(shader.successors(l.header), vec![l.exit, l.body]);
        assert_eq!(shader.predecessors(l.exit), &[l.header]);
        assert!(!shader.value(placeholder).has_uses());
        shader.validate().unwrap();
    }
}
