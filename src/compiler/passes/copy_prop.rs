//! Copy propagation.
//!
//! Folds moves and modifier instructions into the operands of their users:
//!
//! ```text
//! ssa_2 = mov ssa_1.zyx          ssa_4 = fadd -ssa_1.y, ssa_3.x
//! ssa_3 = fneg ssa_2      =>
//! ssa_4 = fadd ssa_3.y, ...
//! ```
//!
//! The user's operand is composed with the folded instruction's operand
//! ([`Operand::compose`]): swizzles are re-indexed, `abs` flags or'ed and
//! `negate` flags xor'ed. `fneg`/`fabs` only fold into float inputs and
//! `ineg`/`iabs` only into signed integer inputs, since the modifier means
//! something different for each. Non-ALU users (phis, intrinsics) only take
//! plain full-width copies.

use crate::{
    compiler::{pass::ShaderPass, CompilerContext, EventKind, EventLog},
    ir::{AluOp, AluType, InstrId, Operand, Shader, Src, Use, ValueId},
    Result,
};

/// Folds `mov`, `fneg`/`fabs` and `ineg`/`iabs` into their users.
pub struct CopyPropagationPass;

impl Default for CopyPropagationPass {
    fn default() -> Self {
        Self::new()
    }
}

/// A foldable instruction seen as the operand it stands for.
struct Copy {
    instr: InstrId,
    dest: ValueId,
    operand: Operand,
    family: AluType,
}

impl CopyPropagationPass {
    /// Creates a new copy propagation pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn as_copy(shader: &Shader, id: InstrId) -> Option<Copy> {
        let instr = shader.instr(id);
        let op = instr.alu_op()?;
        let dest = instr.def()?;
        let src = *instr.src(0);
        let Src::Value(source) = src.src else {
            return None;
        };
        if shader.value(source).bit_size() != shader.value(dest).bit_size() {
            return None;
        }

        let operand = match op {
            AluOp::Mov => src,
            AluOp::Fneg | AluOp::Ineg => Operand {
                negate: !src.negate,
                ..src
            },
            AluOp::Fabs | AluOp::Iabs => Operand {
                abs: true,
                negate: false,
                ..src
            },
            _ => return None,
        };
        Some(Copy {
            instr: id,
            dest,
            operand,
            family: op.input_type(0),
        })
    }

    /// The operand `user` would read at `slot` after folding, if legal.
    fn fold(shader: &Shader, copy: &Copy, user: InstrId, slot: usize) -> Option<Operand> {
        let instr = shader.instr(user);
        let outer = instr.src(slot);
        let folded = outer.compose(&copy.operand);

        if instr.alu_op().is_none() {
            let comps = shader.value(copy.dest).num_components() as usize;
            let Src::Value(source) = folded.src else {
                return None;
            };
            let plain = !folded.has_modifiers()
                && folded.swizzle.is_identity(comps)
                && shader.value(source).num_components() as usize == comps;
            return plain.then_some(folded);
        }

        if folded.has_modifiers() {
            let ty = instr.kind().operand_type(slot);
            if !ty.accepts_modifiers() {
                return None;
            }
            if copy.operand.has_modifiers() && ty != copy.family {
                return None;
            }
        }
        Some(folded)
    }

    fn propagate(shader: &mut Shader, copy: &Copy, changes: &EventLog) -> bool {
        let uses: Vec<Use> = shader.value(copy.dest).uses().collect();
        let mut changed = false;

        for u in uses {
            let Use::Src { instr: user, slot } = u else {
                continue;
            };
            let slot = slot as usize;
            let Some(folded) = Self::fold(shader, copy, user, slot) else {
                continue;
            };
            shader.set_operand(user, slot, folded);
            changes
                .record(EventKind::CopyPropagated)
                .at(shader.name(), user.index())
                .message(format!("{} folded into operand {slot} of {user}", copy.dest));
            changed = true;
        }

        if changed && !shader.value(copy.dest).has_uses() {
            shader.remove_instruction(copy.instr);
        }
        changed
    }
}

impl ShaderPass for CopyPropagationPass {
    fn name(&self) -> &'static str {
        "copy_prop"
    }

    fn description(&self) -> &'static str {
        "Fold moves and negate/abs instructions into the source modifiers of their users"
    }

    fn run(&self, shader: &mut Shader, ctx: &CompilerContext) -> Result<bool> {
        let changes = EventLog::new();

        // A fold can expose a copy that was already visited, so sweep until
        // nothing moves.
        loop {
            let mut progress = false;
            for id in shader.instr_ids() {
                if !shader.instr(id).is_live() {
                    continue;
                }
                if let Some(copy) = Self::as_copy(shader, id) {
                    progress |= Self::propagate(shader, &copy, &changes);
                }
            }
            if !progress {
                break;
            }
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
    use crate::ir::{Builder, Cursor, ShaderStage, Swizzle};

    fn run(shader: &mut Shader) -> bool {
        CopyPropagationPass::new()
            .run(shader, &CompilerContext::default())
            .unwrap()
    }

    #[test]
    fn test_swizzle_and_negate_compose() {
        let mut shader = Shader::new("copy", ShaderStage::Fragment);
        let entry = shader.entry();
        let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
        let v = b.load_input(32, 0, 3, 32);
        let zyx = b.swizzle(v, &[2, 1, 0]);
        let neg = b.fneg(zyx);
        let y = b.channel(neg, 1);
        let sum = b.fadd(y, y);
        b.store_output(sum, 32, 0);

        assert!(run(&mut shader));
        let add = shader.def_instr(sum).unwrap();
        let src = add.src(0);
        assert_eq!(src.src, Src::Value(v));
        assert!(src.negate && !src.abs);
        assert_eq!(src.swizzle.lane(0), 1);
        assert!(!shader.value(zyx).is_live());
        assert!(shader.validate().is_ok());
        assert!(!run(&mut shader));
    }

    #[test]
    fn test_abs_discards_inner_negate() {
        let mut shader = Shader::new("abs", ShaderStage::Fragment);
        let entry = shader.entry();
        let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
        let x = b.load_input(32, 0, 1, 32);
        let n = b.fneg(x);
        let a = b.fabs(n);
        let r = b.frcp(a);
        b.store_output(r, 32, 0);

        assert!(run(&mut shader));
        let rcp = shader.def_instr(r).unwrap();
        assert_eq!(rcp.src(0).src, Src::Value(x));
        assert!(rcp.src(0).abs && !rcp.src(0).negate);
    }

    #[test]
    fn test_float_modifier_not_folded_into_integer_input() {
        let mut shader = Shader::new("types", ShaderStage::Fragment);
        let entry = shader.entry();
        let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
        let x = b.load_input(32, 0, 1, 32);
        let n = b.fneg(x);
        let i = b.iadd(n, n);
        let m = b.ineg(x);
        let f = b.fadd(m, m);
        b.store_output(i, 32, 0);
        b.store_output(f, 32, 1);

        assert!(!run(&mut shader));
        assert_eq!(shader.def_instr(i).unwrap().src(0).src, Src::Value(n));
        assert_eq!(shader.def_instr(f).unwrap().src(0).src, Src::Value(m));
    }

    #[test]
    fn test_only_plain_copies_reach_intrinsics() {
        let mut shader = Shader::new("stores", ShaderStage::Fragment);
        let entry = shader.entry();
        let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
        let v = b.load_input(32, 0, 2, 32);
        let same = b.mov(v);
        let x = b.channel(v, 0);
        let store_same = b.store_output(same, 32, 0);
        let store_x = b.store_output(x, 33, 0);

        assert!(run(&mut shader));
        assert_eq!(shader.instr(store_same).src(0).src, Src::Value(v));
        assert_eq!(shader.instr(store_x).src(0).src, Src::Value(x));
        assert_eq!(shader.instr(store_x).src(0).swizzle, Swizzle::IDENTITY);
    }

    #[test]
    fn test_chained_moves() {
        let mut shader = Shader::new("chain", ShaderStage::Fragment);
        let entry = shader.entry();
        let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
        let x = b.load_input(32, 0, 1, 32);
        let a = b.mov(x);
        let c = b.mov(a);
        let d = b.fmul(c, c);
        b.store_output(d, 32, 0);

        assert!(run(&mut shader));
        let mul = shader.def_instr(d).unwrap();
        assert_eq!(mul.src(0).src, Src::Value(x));
        assert_eq!(mul.src(1).src, Src::Value(x));
        assert!(!shader.value(a).is_live() && !shader.value(c).is_live());
    }
}
