//! Structural validation.
//!
//! [`Shader::validate`] recomputes every invariant the mutation API maintains
//! incrementally and reports the first one that does not hold. It is run after
//! every pass when `CompilerOptions::validate_passes` is set and by most tests.

use std::collections::HashMap;

use crate::{
    analysis::Dominance,
    ir::{
        AluType, BlockId, Dest, InstrId, InstrKind, Instruction, RegFile, Shader, Src, Use, ValueId,
    },
    Error, Result,
};

macro_rules! invalid {
    ($($arg:tt)*) => {
        return Err(Error::ValidationFailed(format!($($arg)*)))
    };
}

impl Shader {
    /// Checks the structural invariants of the shader.
    ///
    /// - every live block is laid out once, its instructions are live and
    ///   point back at it, and phis come first
    /// - predecessor lists match the terminators' edges
    /// - operand counts match the instruction kinds
    /// - operands read live values within their component range, modifiers
    ///   appear only on float and signed inputs, boolean inputs are 1-bit
    /// - use sets contain exactly the operands and branch conditions reading
    ///   each value
    /// - phis have one operand per incoming edge
    /// - definitions dominate their uses in reachable code
    ///
    /// # Errors
    ///
    /// Returns [`Error::ValidationFailed`] describing the first violation.
    pub fn validate(&self) -> Result<()> {
        self.validate_layout()?;
        self.validate_edges()?;
        for block in self.blocks() {
            for &id in block.instrs() {
                self.validate_instr(self.instr(id))?;
            }
            if let Some(cond) = block.terminator().condition() {
                let value = self.value(cond);
                if !value.is_live() {
                    invalid!("{} branches on dead {cond}", block.id());
                }
                if value.bit_size() != 1 || value.num_components() != 1 {
                    invalid!("{} branches on non-boolean {cond}", block.id());
                }
                if !value.uses.contains(&Use::Branch(block.id())) {
                    invalid!("{cond} is missing the branch use of {}", block.id());
                }
            }
        }
        self.validate_use_sets()?;
        self.validate_dominance()
    }

    fn validate_layout(&self) -> Result<()> {
        let mut seen = vec![false; self.block_capacity()];
        if self.block_ids().next() != Some(self.entry()) {
            invalid!("entry {} is not laid out first", self.entry());
        }
        for block in self.blocks() {
            let id = block.id();
            if !block.is_live() {
                invalid!("removed {id} is still laid out");
            }
            if std::mem::replace(&mut seen[id.index()], true) {
                invalid!("{id} is laid out twice");
            }
            let mut in_phis = true;
            for &i in block.instrs() {
                let instr = self.instr(i);
                if !instr.is_live() {
                    invalid!("{id} lists removed {i}");
                }
                if instr.block() != id {
                    invalid!("{i} is listed in {id} but claims {}", instr.block());
                }
                if instr.is_phi() && !in_phis {
                    invalid!("phi {i} follows a non-phi in {id}");
                }
                in_phis &= instr.is_phi();
            }
            for succ in block.succs() {
                if !self.block(succ).is_live() {
                    invalid!("{id} jumps to removed {succ}");
                }
            }
        }
        Ok(())
    }

    fn validate_edges(&self) -> Result<()> {
        let mut expected: HashMap<BlockId, Vec<BlockId>> = HashMap::new();
        for block in self.blocks() {
            for succ in block.succs() {
                expected.entry(succ).or_default().push(block.id());
            }
        }
        for block in self.blocks() {
            let mut want = expected.remove(&block.id()).unwrap_or_default();
            let mut have = block.preds().to_vec();
            want.sort();
            have.sort();
            if want != have {
                invalid!(
                    "{} records predecessors {have:?}, edges say {want:?}",
                    block.id()
                );
            }
        }
        Ok(())
    }

    fn validate_instr(&self, instr: &Instruction) -> Result<()> {
        let id = instr.id();
        if instr.srcs().len() != instr.kind().arity() {
            invalid!(
                "{id} ({}) has {} operands, expected {}",
                instr.kind(),
                instr.srcs().len(),
                instr.kind().arity()
            );
        }

        let dest_comps = match instr.dest() {
            Some(Dest::Value(v)) => {
                let value = self.value(*v);
                if !value.is_live() || value.parent() != Some(id) {
                    invalid!("{id} defines {v}, which does not name it as producer");
                }
                value.num_components() as usize
            }
            Some(Dest::Reg(r)) => {
                self.validate_reg(id, r.reg.file, r.reg.nr)?;
                1
            }
            None => 0,
        };

        if let (Some(op), Some(Dest::Value(v))) = (instr.alu_op(), instr.dest()) {
            if op.is_comparison() && self.value(*v).bit_size() != 1 {
                invalid!("comparison {id} defines non-boolean {v}");
            }
        }

        if let InstrKind::Phi(preds) = instr.kind() {
            let mut have = preds.clone();
            let mut want = self.predecessors(instr.block()).to_vec();
            have.sort();
            want.sort();
            if have != want {
                invalid!(
                    "phi {id} has operands for {have:?}, {} has predecessors {want:?}",
                    instr.block()
                );
            }
        }

        for (slot, operand) in instr.srcs().iter().enumerate() {
            let v = match operand.src {
                Src::Value(v) => v,
                Src::Reg(r) => {
                    self.validate_reg(id, r.file, r.nr)?;
                    continue;
                }
            };
            let value = self.value(v);
            if !value.is_live() {
                invalid!("operand {slot} of {id} reads dead {v}");
            }
            if !value.uses.contains(&Use::src(id, slot)) {
                invalid!("{v} is missing the use by operand {slot} of {id}");
            }

            let comps = value.num_components() as usize;
            let lanes = instr.lanes_read(slot, dest_comps.max(1), comps);
            if let Some(bad) = operand.swizzle.0[..lanes]
                .iter()
                .find(|&&c| c as usize >= comps)
            {
                invalid!("operand {slot} of {id} selects component {bad} of {comps}-wide {v}");
            }

            let ty = instr.kind().operand_type(slot);
            if operand.has_modifiers() && !ty.accepts_modifiers() {
                invalid!("operand {slot} of {id} has modifiers on a {ty} input");
            }
            if ty == AluType::Bool && value.bit_size() != 1 {
                invalid!("boolean operand {slot} of {id} reads {}-bit {v}", value.bit_size());
            }
            if instr.is_phi() {
                if let Some(dest) = instr.def() {
                    let d = self.value(dest);
                    if d.bit_size() != value.bit_size() || d.num_components() != value.num_components() {
                        invalid!("phi {id} mixes shapes of {dest} and {v}");
                    }
                }
            }
        }
        Ok(())
    }

    fn validate_reg(&self, id: InstrId, file: RegFile, nr: u32) -> Result<()> {
        if file == RegFile::Vgrf && nr as usize >= self.num_regs() {
            invalid!("{id} names unallocated register r{nr}");
        }
        Ok(())
    }

    fn validate_use_sets(&self) -> Result<()> {
        for value in self.live_values() {
            let v = value.id();
            if value.has_uses() && !value.parent().is_some_and(|p| self.instr(p).is_live()) {
                invalid!("{v} is used but has no live producer");
            }
            for u in value.uses() {
                match u {
                    Use::Src { instr, slot } => {
                        let inst = self.instr(instr);
                        let reads = inst.is_live()
                            && inst
                                .srcs()
                                .get(slot as usize)
                                .is_some_and(|op| op.src == Src::Value(v));
                        if !reads {
                            invalid!("{v} records a use by operand {slot} of {instr}, which reads something else");
                        }
                    }
                    Use::Branch(block) => {
                        let b = self.block(block);
                        if !b.is_live() || b.terminator().condition() != Some(v) {
                            invalid!("{v} records a branch use by {block}, which branches on something else");
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn validate_dominance(&self) -> Result<()> {
        let dom = Dominance::build(self);
        for block in self.blocks() {
            let id = block.id();
            if !dom.is_reachable(id) {
                continue;
            }
            for &i in block.instrs() {
                let instr = self.instr(i);
                if let InstrKind::Phi(preds) = instr.kind() {
                    for (slot, (&pred, operand)) in preds.iter().zip(instr.srcs()).enumerate() {
                        if let Some(v) = operand.as_value() {
                            if dom.is_reachable(pred) && !self.def_reaches_end_of(&dom, v, pred) {
                                invalid!("{v} does not dominate the edge {pred} -> {id} (operand {slot} of phi {i})");
                            }
                        }
                    }
                    continue;
                }
                for (slot, v) in instr.value_srcs() {
                    let Some(def) = self.value(v).parent() else {
                        continue;
                    };
                    if !dom.instr_dominates(self, def, i) {
                        invalid!("{v} defined by {def} does not dominate operand {slot} of {i}");
                    }
                }
            }
            if let Some(cond) = block.terminator().condition() {
                if !self.def_reaches_end_of(&dom, cond, id) {
                    invalid!("branch condition {cond} does not dominate the end of {id}");
                }
            }
        }
        Ok(())
    }

    fn def_reaches_end_of(&self, dom: &Dominance, v: ValueId, block: BlockId) -> bool {
        match self.value(v).parent() {
            Some(def) => dom.dominates(self.instr(def).block(), block),
            None => false,
        }
    }
}
