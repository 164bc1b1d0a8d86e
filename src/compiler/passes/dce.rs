//! Dead code elimination.
//!
//! Works by marking instead of by use counts so dead cycles through loop
//! phis are removed as well:
//!
//! 1. Drop blocks unreachable from the entry
//! 2. Mark instructions with side effects and the producers of branch
//!    conditions as live
//! 3. Propagate liveness from every live instruction to the producers of its
//!    operands
//! 4. Remove everything left unmarked in one step

use crate::{
    compiler::{pass::ShaderPass, CompilerContext, EventKind, EventLog},
    ir::{InstrId, Shader},
    utils::BitSet,
    Result,
};

/// Removes unreachable blocks and instructions whose results are never used.
pub struct DeadCodePass;

impl Default for DeadCodePass {
    fn default() -> Self {
        Self::new()
    }
}

impl DeadCodePass {
    /// Creates a new dead code elimination pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Instructions that are needed, directly or through the values they feed.
    fn find_live(shader: &Shader) -> BitSet {
        let mut live = BitSet::new(shader.instr_capacity());
        let mut worklist: Vec<InstrId> = Vec::new();

        for instr in shader.instructions() {
            if instr.has_side_effects() && live.insert(instr.id().index()) {
                worklist.push(instr.id());
            }
        }
        for block in shader.blocks() {
            if let Some(cond) = block.terminator().condition() {
                if let Some(def) = shader.value(cond).parent() {
                    if live.insert(def.index()) {
                        worklist.push(def);
                    }
                }
            }
        }

        while let Some(id) = worklist.pop() {
            for (_, v) in shader.instr(id).value_srcs() {
                if let Some(def) = shader.value(v).parent() {
                    if live.insert(def.index()) {
                        worklist.push(def);
                    }
                }
            }
        }
        live
    }
}

impl ShaderPass for DeadCodePass {
    fn name(&self) -> &'static str {
        "dce"
    }

    fn description(&self) -> &'static str {
        "Remove unreachable blocks and instructions without side effects whose results are unused"
    }

    fn run(&self, shader: &mut Shader, ctx: &CompilerContext) -> Result<bool> {
        let changes = EventLog::new();

        let blocks = shader.remove_unreachable_blocks();
        if blocks > 0 {
            changes
                .record(EventKind::InstructionRemoved)
                .shader(shader.name())
                .message(format!("{blocks} unreachable block(s)"));
        }

        let live = Self::find_live(shader);
        let dead: Vec<InstrId> = shader
            .instructions()
            .map(|i| i.id())
            .filter(|id| !live.contains(id.index()))
            .collect();
        for &id in &dead {
            changes
                .record(EventKind::InstructionRemoved)
                .at(shader.name(), id.index())
                .message(format!("{}", shader.instr(id).kind()));
        }
        if !dead.is_empty() {
            shader.remove_instructions(&dead);
        }

        let changed = !changes.is_empty();
        if changed {
            ctx.events.merge(&changes);
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Builder, Cursor, Operand, ShaderStage, Terminator};

    fn run(shader: &mut Shader) -> bool {
        let ctx = CompilerContext::default();
        DeadCodePass::new().run(shader, &ctx).unwrap()
    }

    #[test]
    fn test_cascading_dead_code() {
        let mut shader = Shader::new("dce", ShaderStage::Fragment);
        let entry = shader.entry();
        let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
        let x = b.load_input(32, 0, 1, 32);
        let two = b.imm_float(2.0, 32);
        let y = b.fmul(x, two);
        let _unused = b.fadd(y, two);
        b.store_output(x, 32, 0);

        assert!(run(&mut shader));
        // load offset, load, store offset, store
        assert_eq!(shader.num_instructions(), 4);
        assert!(!run(&mut shader));
        assert!(shader.validate().is_ok());
    }

    #[test]
    fn test_dead_loop_phi_cycle() {
        let mut shader = Shader::new("cycle", ShaderStage::Compute);
        let entry = shader.entry();
        let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
        let zero = b.imm_int(0, 32);
        let one = b.imm_int(1, 32);
        let l = b.push_loop();
        // Counter only feeds itself.
        b.set_cursor(Cursor::BlockStart(l.header));
        let placeholder = b.phi(&[(entry, zero), (l.body, zero)]);
        let phi = b.shader().value(placeholder).parent().unwrap();
        b.set_cursor(Cursor::BlockEnd(l.body));
        let next = b.iadd(placeholder, one);
        b.shader_mut().set_phi_source(phi, l.body, Operand::value(next));
        b.set_cursor(Cursor::BlockEnd(l.header));
        let t = b.imm_bool(true);
        b.loop_exit_if(&l, t);

        let before = shader.num_instructions();
        assert!(run(&mut shader));
        assert!(!shader.instr(phi).is_live());
        assert!(!shader.value(next).is_live());
        assert!(shader.num_instructions() < before);
        assert!(shader.validate().is_ok());
    }

    #[test]
    fn test_keeps_branch_conditions_and_stores() {
        let mut shader = Shader::new("keep", ShaderStage::Fragment);
        let entry = shader.entry();
        let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
        let x = b.load_input(32, 0, 1, 32);
        let c = b.fge_imm(x, 0.0);
        let ifb = b.push_if(c);
        b.set_cursor(Cursor::BlockEnd(ifb.merge_block));
        b.store_output(x, 32, 0);

        assert!(!run(&mut shader));
        assert!(shader.value(c).is_live());
    }

    #[test]
    fn test_unreachable_blocks_removed() {
        let mut shader = Shader::new("unreachable", ShaderStage::Fragment);
        let entry = shader.entry();
        let orphan = shader.create_block();
        let mut b = Builder::new(&mut shader, Cursor::BlockEnd(orphan));
        let v = b.imm_int(7, 32);
        b.store_output(v, 32, 0);
        shader.set_terminator(entry, Terminator::Return);

        assert!(run(&mut shader));
        assert_eq!(shader.num_instructions(), 0);
        assert!(!shader.block(orphan).is_live());
    }
}
