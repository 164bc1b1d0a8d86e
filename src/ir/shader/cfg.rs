//! Control-flow graph mutation.
//!
//! Predecessor lists are derived from terminators and maintained here
//! incrementally: a block's `preds` has one entry per incoming edge, in the
//! order the edges were created. Phi operand lists are keyed by predecessor,
//! so edge edits that rename a predecessor also rename it in the phis of the
//! target block.

use crate::{
    analysis::DependencyMask,
    ir::{Block, BlockId, Cursor, InstrId, InstrKind, Operand, Shader, Src, Terminator, Use},
    utils::BitSet,
};

impl Shader {
    /// Appends an empty block (terminated by `Return`) to the layout.
    pub fn create_block(&mut self) -> BlockId {
        let id = BlockId::new(self.blocks.len());
        self.blocks.push(Block::new(id));
        self.layout.push(id);
        self.touch(DependencyMask::BLOCKS);
        id
    }

    /// Creates an empty block laid out right after `anchor`.
    pub fn create_block_after(&mut self, anchor: BlockId) -> BlockId {
        let id = BlockId::new(self.blocks.len());
        self.blocks.push(Block::new(id));
        let at = self
            .layout
            .iter()
            .position(|&b| b == anchor)
            .map_or(self.layout.len(), |p| p + 1);
        self.layout.insert(at, id);
        self.touch(DependencyMask::BLOCKS);
        id
    }

    /// Replaces the terminator of `block`, updating successor predecessor
    /// lists and the branch-condition use.
    ///
    /// Phis of newly targeted blocks are not updated; callers add their
    /// operands with [`Shader::set_phi_source`] or create the phis afterwards.
    pub fn set_terminator(&mut self, block: BlockId, terminator: Terminator) {
        let old = self.blocks[block.index()].terminator;
        for succ in old.successors() {
            let preds = &mut self.blocks[succ.index()].preds;
            if let Some(p) = preds.iter().position(|&p| p == block) {
                preds.remove(p);
            }
        }
        if let Some(cond) = old.condition() {
            self.values[cond.index()].uses.remove(&Use::Branch(block));
        }

        for succ in terminator.successors() {
            assert!(self.blocks[succ.index()].live, "edge to removed {succ}");
            self.blocks[succ.index()].preds.push(block);
        }
        if let Some(cond) = terminator.condition() {
            let value = &mut self.values[cond.index()];
            assert!(value.live, "branch on dead {cond}");
            assert_eq!(value.bit_size, 1, "branch condition {cond} is not a boolean");
            value.uses.insert(Use::Branch(block));
        }
        self.blocks[block.index()].terminator = terminator;
        self.touch(DependencyMask::BLOCKS | DependencyMask::INSTRUCTIONS);
    }

    /// Splits the block containing `instr` so that `instr` starts a new block.
    /// See [`Shader::split_block_at`].
    pub fn split_block_before(&mut self, instr: InstrId) -> BlockId {
        self.touch(DependencyMask::BLOCKS);
        self.split_block_at(Cursor::Before(instr))
    }

    /// Splits a block at `cursor`.
    ///
    /// Instructions at and after the cursor move to a new block laid out
    /// right after the original, which inherits the original terminator (and
    /// with it the successors, whose phis are renamed accordingly). The
    /// original block then jumps to the new one. Returns the new block.
    ///
    /// # Panics
    ///
    /// Panics if the cursor points between phis.
    pub fn split_block_at(&mut self, cursor: Cursor) -> BlockId {
        let (block, pos) = self.resolve(cursor);
        assert!(
            pos >= self.phi_count(block),
            "cannot split {block} between its phis"
        );
        let tail = self.create_block_after(block);

        let moved = self.blocks[block.index()].instrs.split_off(pos);
        for &i in &moved {
            self.instrs[i.index()].block = tail;
        }
        self.blocks[tail.index()].instrs = moved;

        let terminator = self.blocks[block.index()].terminator;
        for succ in terminator.successors() {
            self.rename_pred(succ, block, tail);
        }
        if let Some(cond) = terminator.condition() {
            let uses = &mut self.values[cond.index()].uses;
            uses.remove(&Use::Branch(block));
            uses.insert(Use::Branch(tail));
        }
        self.blocks[tail.index()].terminator = terminator;
        self.blocks[block.index()].terminator = Terminator::Jump(tail);
        self.blocks[tail.index()].preds.push(block);

        self.touch(DependencyMask::BLOCKS | DependencyMask::INSTRUCTIONS);
        tail
    }

    /// Sets the operand of `phi` that flows in from `pred`.
    ///
    /// # Panics
    ///
    /// Panics if `phi` is not a phi or has no operand for `pred`.
    pub fn set_phi_source(&mut self, phi: InstrId, pred: BlockId, operand: Operand) {
        let slot = self.phi_slot(phi, pred);
        self.touch(DependencyMask::INSTRUCTIONS);
        self.set_operand(phi, slot, operand);
    }

    /// Removes the operand of `phi` that flows in from `pred`.
    ///
    /// # Panics
    ///
    /// Panics if `phi` is not a phi or has no operand for `pred`.
    pub fn remove_phi_source(&mut self, phi: InstrId, pred: BlockId) {
        let slot = self.phi_slot(phi, pred);
        let instr = &mut self.instrs[phi.index()];
        let removed = instr.srcs.remove(slot);
        if let InstrKind::Phi(preds) = &mut instr.kind {
            preds.remove(slot);
        }
        // Operands after the removed slot shift down by one.
        let shifted: Vec<(usize, Src)> = instr.srcs[slot..]
            .iter()
            .enumerate()
            .map(|(i, op)| (slot + i, op.src))
            .collect();
        if let Src::Value(v) = removed.src {
            self.values[v.index()].uses.remove(&Use::src(phi, slot));
        }
        for (new_slot, src) in shifted {
            if let Src::Value(v) = src {
                let uses = &mut self.values[v.index()].uses;
                uses.remove(&Use::src(phi, new_slot + 1));
                uses.insert(Use::src(phi, new_slot));
            }
        }
        self.touch(DependencyMask::INSTRUCTIONS);
    }

    /// Removes every block not reachable from the entry and returns how many
    /// were removed.
    ///
    /// Phi operands flowing from removed blocks into reachable ones are
    /// dropped first; the instructions of removed blocks are then deleted
    /// together, so uses between unreachable blocks do not block removal.
    ///
    /// # Panics
    ///
    /// Panics if a value defined in an unreachable block is still read by
    /// reachable code, which cannot happen in a shader whose definitions
    /// dominate their uses.
    pub fn remove_unreachable_blocks(&mut self) -> usize {
        let reachable = self.reachable_blocks();
        let dead: Vec<BlockId> = self
            .layout
            .iter()
            .copied()
            .filter(|b| !reachable.contains(b.index()))
            .collect();
        if dead.is_empty() {
            return 0;
        }

        for &block in &dead {
            for succ in self.successors(block) {
                if reachable.contains(succ.index()) {
                    for phi in self.phis(succ) {
                        while self.phi_slot_opt(phi, block).is_some() {
                            self.remove_phi_source(phi, block);
                        }
                    }
                }
            }
            self.set_terminator(block, Terminator::Return);
        }

        let doomed: Vec<InstrId> = dead
            .iter()
            .flat_map(|b| self.blocks[b.index()].instrs.clone())
            .collect();
        for &i in &doomed {
            self.detach(i);
        }
        for &i in &doomed {
            if let Some(v) = self.instrs[i.index()].def() {
                assert!(
                    !self.values[v.index()].has_uses(),
                    "{v} from an unreachable block is used by reachable code"
                );
            }
            self.tombstone(i);
        }

        for &block in &dead {
            let b = &mut self.blocks[block.index()];
            b.instrs.clear();
            b.preds.clear();
            b.live = false;
        }
        self.layout.retain(|b| reachable.contains(b.index()));
        self.touch(DependencyMask::all());
        dead.len()
    }

    /// Blocks reachable from the entry.
    #[must_use]
    pub fn reachable_blocks(&self) -> BitSet {
        let mut seen = BitSet::new(self.blocks.len());
        let mut stack = vec![self.entry()];
        seen.insert(self.entry().index());
        while let Some(b) = stack.pop() {
            for succ in self.successors(b) {
                if seen.insert(succ.index()) {
                    stack.push(succ);
                }
            }
        }
        seen
    }

    fn phi_slot(&self, phi: InstrId, pred: BlockId) -> usize {
        self.phi_slot_opt(phi, pred)
            .unwrap_or_else(|| panic!("{phi} has no operand for {pred}"))
    }

    fn phi_slot_opt(&self, phi: InstrId, pred: BlockId) -> Option<usize> {
        match &self.instrs[phi.index()].kind {
            InstrKind::Phi(preds) => preds.iter().position(|&p| p == pred),
            other => panic!("{phi} is a {other}, not a phi"),
        }
    }

    fn rename_pred(&mut self, block: BlockId, from: BlockId, to: BlockId) {
        for p in &mut self.blocks[block.index()].preds {
            if *p == from {
                *p = to;
            }
        }
        for phi in self.phis(block) {
            if let InstrKind::Phi(preds) = &mut self.instrs[phi.index()].kind {
                for p in preds.iter_mut().filter(|p| **p == from) {
                    *p = to;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::ir::{Builder, Cursor, Operand, Shader, ShaderStage, Terminator};

    #[test]
    fn test_split_block_moves_tail_and_terminator() {
        let mut shader = Shader::new("split", ShaderStage::Fragment);
        let entry = shader.entry();
        let exit = shader.create_block();
        shader.set_terminator(entry, Terminator::Jump(exit));

        let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
        let x = b.imm_int(1, 32);
        let y = b.imm_int(2, 32);
        let second = shader.value(y).parent().unwrap();

        let tail = shader.split_block_before(second);
        assert_eq!(shader.block(entry).instrs().len(), 1);
        assert_eq!(shader.block(tail).instrs(), &[second]);
        assert_eq!(shader.block(entry).terminator(), &Terminator::Jump(tail));
        assert_eq!(shader.predecessors(exit), &[tail]);
        assert_eq!(shader.predecessors(tail), &[entry]);
        assert_eq!(shader.block_ids().collect::<Vec<_>>(), vec![entry, tail, exit]);
        assert!(shader.value(x).is_live());
        assert!(shader.validate().is_ok());
    }

    #[test]
    fn test_remove_unreachable_drops_phi_sources() {
        let mut shader = Shader::new("dead", ShaderStage::Fragment);
        let entry = shader.entry();
        let orphan = shader.create_block();
        let merge = shader.create_block();
        shader.set_terminator(entry, Terminator::Jump(merge));
        shader.set_terminator(orphan, Terminator::Jump(merge));

        let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
        let live = b.imm_int(1, 32);
        b.set_cursor(Cursor::BlockEnd(orphan));
        let dead = b.imm_int(2, 32);
        let _ = b.iadd(dead, dead);
        b.set_cursor(Cursor::BlockStart(merge));
        let phi = b.phi(&[(entry, live), (orphan, dead)]);
        let phi_instr = shader.value(phi).parent().unwrap();

        assert_eq!(shader.remove_unreachable_blocks(), 1);
        assert!(!shader.block(orphan).is_live());
        assert_eq!(shader.instr(phi_instr).srcs(), &[Operand::value(live)]);
        assert_eq!(shader.predecessors(merge), &[entry]);
        assert!(!shader.value(dead).is_live());
        assert!(shader.validate().is_ok());
        assert_eq!(shader.remove_unreachable_blocks(), 0);
    }
}
