//! Select hoisting.
//!
//! When both arms of a select compute the same operation and differ in a
//! single scalar operand, select that operand instead and compute the
//! operation once:
//!
//! ```text
//! t = fadd a, b
//! e = fadd a, c          s = bcsel cond, b, c
//! r = bcsel cond, t, e   r = fadd a, s
//! ```
//!
//! The same rewrite applies to phis whose sources all come from one opcode:
//! `phi(op(a, b), op(a, c))` becomes `op(a, phi(b, c))`, with the operation
//! moved to the top of the join block.
//!
//! Every arm must have the select (or phi) as its only use, so the rewrite
//! always removes instructions. A `bcsel` is only rewritten when it is scalar
//! and all three instructions share a block: a vector condition may pick
//! different arms per lane.

use crate::{
    compiler::{pass::ShaderPass, CompilerContext, EventKind, EventLog},
    ir::{
        AluOp, Builder, Cursor, InstrId, InstrKind, Operand, Shader, Src, Swizzle, ValueId,
    },
    Result,
};

/// Arms of a select that differ in exactly one operand.
struct Arms {
    op: AluOp,
    /// Producers of the arms, in operand order.
    instrs: Vec<InstrId>,
    /// The one operand slot in which the arms differ.
    slot: usize,
}

/// Hoists `bcsel` and phis over identical operations.
pub struct OptSelectPass;

impl Default for OptSelectPass {
    fn default() -> Self {
        Self::new()
    }
}

impl OptSelectPass {
    /// Creates a new select hoisting pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Matches the arm values against the hoisting preconditions.
    fn match_arms(shader: &Shader, user: InstrId, arms: &[Operand]) -> Option<Arms> {
        let mut instrs = Vec::with_capacity(arms.len());
        for arm in arms {
            let Src::Value(v) = arm.src else {
                return None;
            };
            let value = shader.value(v);
            if value.single_use().and_then(|u| u.instr()) != Some(user) {
                return None;
            }
            let producer = shader.def_instr(v)?;
            if producer.alu_op().is_none()
                || producer.reads_accumulator_implicitly()
                || producer.srcs().iter().any(|s| s.as_reg().is_some())
            {
                return None;
            }
            instrs.push(producer.id());
        }

        let first = shader.instr(instrs[0]);
        let op = first.alu_op()?;
        let dest_comps = shader.value(first.def()?).num_components() as usize;
        for &id in &instrs[1..] {
            let other = shader.instr(id);
            if other.alu_op() != Some(op)
                || other.exact != first.exact
                || other.fast_math != first.fast_math
                || other.exec_size != first.exec_size
            {
                return None;
            }
        }

        let mut differing = None;
        for slot in 0..op.num_inputs() {
            let lanes = first.lanes_read(slot, dest_comps, 0);
            let same = instrs[1..]
                .iter()
                .all(|&id| shader.instr(id).src(slot).equal_over(first.src(slot), lanes));
            if !same {
                if differing.is_some() {
                    // Hoisting two operands would need two selects.
                    return None;
                }
                differing = Some(slot);
            }
        }
        let slot = differing?;

        let modifiers = (first.src(slot).negate, first.src(slot).abs);
        if instrs
            .iter()
            .any(|&id| {
                let s = shader.instr(id).src(slot);
                (s.negate, s.abs) != modifiers
            })
        {
            return None;
        }
        Some(Arms { op, instrs, slot })
    }

    /// Rewrites `r = bcsel c, op(.., b, ..), op(.., c, ..)`.
    fn hoist_bcsel(shader: &mut Shader, sel: InstrId) -> Option<Arms> {
        let instr = shader.instr(sel);
        let dest = instr.def()?;
        if shader.value(dest).num_components() != 1 {
            return None;
        }
        let cond = *instr.src(0);
        let arm_operands = [*instr.src(1), *instr.src(2)];
        let arms = Self::match_arms(shader, sel, &arm_operands)?;
        if !arms.instrs.iter().all(|&id| shader.same_block(id, sel)) {
            return None;
        }
        // The arms replace the select, so they must be scalar and read as is.
        for (operand, &id) in arm_operands.iter().zip(&arms.instrs) {
            let def = shader.instr(id).def()?;
            if shader.value(def).num_components() != 1
                || operand.negate
                || operand.abs
                || operand.swizzle.0[0] != 0
            {
                return None;
            }
        }
        let (then_id, else_id) = (arms.instrs[0], arms.instrs[1]);

        let then_src = *shader.instr(then_id).src(arms.slot);
        let else_src = *shader.instr(else_id).src(arms.slot);
        let (Src::Value(b), Src::Value(c)) = (then_src.src, else_src.src) else {
            return None;
        };
        let bits = shader.value(b).bit_size();
        if shader.value(c).bit_size() != bits
            || shader.value(b).num_components() != 1
            || shader.value(c).num_components() != 1
        {
            return None;
        }

        let plain = |o: Operand| Operand {
            negate: false,
            abs: false,
            ..o
        };
        let mut builder = Builder::new(shader, Cursor::Before(sel));
        builder.copy_flags_from(sel);
        let selected = builder.alu_operands(
            AluOp::Bcsel,
            vec![cond, plain(then_src), plain(else_src)],
            bits,
            1,
        );

        shader.set_operand(
            then_id,
            arms.slot,
            Operand {
                src: Src::Value(selected),
                swizzle: Swizzle::IDENTITY,
                ..then_src
            },
        );
        shader.move_instruction(then_id, Cursor::Before(sel));

        let kept = shader.instr(then_id).def()?;
        shader.replace_all_uses(dest, kept);
        shader.remove_instruction(sel);
        shader.remove_instruction(else_id);
        Some(arms)
    }

    /// Rewrites `r = phi(op(.., b, ..), op(.., c, ..), ..)`.
    fn hoist_phi(shader: &mut Shader, phi: InstrId) -> Option<Arms> {
        let instr = shader.instr(phi);
        let InstrKind::Phi(preds) = instr.kind() else {
            return None;
        };
        if preds.len() < 2 {
            return None;
        }
        let preds = preds.clone();
        let dest = instr.def()?;
        let block = instr.block();
        let arms = Self::match_arms(shader, phi, instr.srcs())?;

        let mut sources: Vec<(_, ValueId)> = Vec::with_capacity(preds.len());
        for (&pred, &id) in preds.iter().zip(&arms.instrs) {
            let Src::Value(v) = shader.instr(id).src(arms.slot).src else {
                return None;
            };
            if shader.value(v).num_components() != 1 {
                return None;
            }
            sources.push((pred, v));
        }
        let bits = shader.value(sources[0].1).bit_size();
        if sources.iter().any(|&(_, v)| shader.value(v).bit_size() != bits) {
            return None;
        }

        let first = arms.instrs[0];
        let first_src = *shader.instr(first).src(arms.slot);
        let exec_size = shader.instr(phi).exec_size;
        let mut builder = Builder::new(shader, Cursor::BlockStart(block));
        builder.exec_size = exec_size;
        let merged = builder.phi(&sources);

        shader.set_operand(
            first,
            arms.slot,
            Operand {
                src: Src::Value(merged),
                ..first_src
            },
        );
        shader.move_instruction(first, Cursor::BlockStart(block));

        let kept = shader.instr(first).def()?;
        shader.replace_all_uses(dest, kept);
        shader.remove_instruction(phi);
        let rest: Vec<InstrId> = arms.instrs[1..].to_vec();
        shader.remove_instructions(&rest);
        Some(arms)
    }

    fn hoist(shader: &mut Shader, id: InstrId) -> Option<Arms> {
        let instr = shader.instr(id);
        if instr.is_phi() {
            Self::hoist_phi(shader, id)
        } else if instr.alu_op() == Some(AluOp::Bcsel) {
            Self::hoist_bcsel(shader, id)
        } else {
            None
        }
    }
}

impl ShaderPass for OptSelectPass {
    fn name(&self) -> &'static str {
        "opt_select"
    }

    fn description(&self) -> &'static str {
        "Hoist selects and phis over operations that differ in a single scalar operand"
    }

    fn run(&self, shader: &mut Shader, ctx: &CompilerContext) -> Result<bool> {
        let changes = EventLog::new();

        // A hoisted select can make its own operands hoistable.
        loop {
            let mut progress = false;
            for id in shader.instr_ids() {
                if !shader.instr(id).is_live() {
                    continue;
                }
                let kind = if shader.instr(id).is_phi() { "phi" } else { "bcsel" };
                if let Some(arms) = Self::hoist(shader, id) {
                    changes
                        .record(EventKind::SelectHoisted)
                        .at(shader.name(), id.index())
                        .message(format!(
                            "{kind} over {} arms of {}, operand {}",
                            arms.instrs.len(),
                            arms.op,
                            arms.slot
                        ));
                    progress = true;
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
