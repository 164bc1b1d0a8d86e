//! Value and instruction mutation.
//!
//! Every public `&mut self` method here declares what it changes through
//! `touch`; `tests/mutation_sites.rs` enforces that by scanning this file.

use std::mem;

use crate::{
    analysis::DependencyMask,
    ir::{
        operand::MAX_COMPONENTS, Cursor, Dest, FloatControls, InstrId, InstrKind, Instruction,
        Operand, Shader, Src, Terminator, Use, Value, ValueId,
    },
};

const VALID_BIT_SIZES: [u8; 5] = [1, 8, 16, 32, 64];

impl Shader {
    /// Creates a value with an empty use set and no producer yet.
    ///
    /// # Panics
    ///
    /// Panics on a bit size other than 1, 8, 16, 32 or 64, or a component
    /// count outside `1..=16`.
    pub fn create_value(&mut self, bit_size: u8, num_components: u8) -> ValueId {
        check_shape(bit_size, num_components);
        let id = ValueId::new(self.values.len());
        self.values.push(Value::new(id, bit_size, num_components));
        self.touch(DependencyMask::VARIABLES);
        id
    }

    /// Changes the shape of a value in place.
    ///
    /// Callers are responsible for the value's producer and users agreeing
    /// with the new shape.
    pub fn set_value_type(&mut self, value: ValueId, bit_size: u8, num_components: u8) {
        check_shape(bit_size, num_components);
        let v = &mut self.values[value.index()];
        assert!(v.live, "{value} is not part of the shader");
        v.bit_size = bit_size;
        v.num_components = num_components;
        self.touch(DependencyMask::VARIABLES);
    }

    /// Allocates a virtual register of `size` general registers and returns its number.
    pub fn alloc_reg(&mut self, size: u32) -> u32 {
        assert!(size > 0, "empty register allocation");
        let nr = u32::try_from(self.regs.len()).expect("register file overflow");
        self.regs.push(size);
        self.touch(DependencyMask::VARIABLES);
        nr
    }

    /// Inserts a detached instruction at `cursor` and returns its id.
    ///
    /// Operand uses are recorded and the destination value (if any) gets the
    /// instruction as its producer.
    ///
    /// # Panics
    ///
    /// Panics if the operand count does not match the kind, an operand or the
    /// destination value is not live, the destination value already has a
    /// producer, or the insertion point would put a phi after a non-phi (or an
    /// ordinary instruction between phis).
    pub fn insert_instruction(&mut self, cursor: Cursor, mut instr: Instruction) -> InstrId {
        assert_eq!(
            instr.srcs.len(),
            instr.kind.arity(),
            "{} takes {} operands",
            instr.kind,
            instr.kind.arity()
        );
        if let InstrKind::Intrinsic(intr, _) = instr.kind {
            assert_eq!(
                intr.has_dest(),
                instr.dest.is_some(),
                "{intr} destination mismatch"
            );
        }

        let (block, pos) = self.resolve(cursor);
        let phis = self.phi_count(block);
        if instr.is_phi() {
            assert!(pos <= phis, "phi inserted after a non-phi in {block}");
        } else {
            assert!(pos >= phis, "{} inserted between the phis of {block}", instr.kind);
        }

        let id = InstrId::new(self.instrs.len());
        for (slot, v) in instr.value_srcs() {
            let value = &mut self.values[v.index()];
            assert!(value.live, "operand {slot} of new {} reads dead {v}", instr.kind);
            value.uses.insert(Use::src(id, slot));
        }
        if let Some(Dest::Value(v)) = instr.dest {
            let value = &mut self.values[v.index()];
            assert!(value.live, "destination {v} is not part of the shader");
            assert!(
                value.parent.is_none(),
                "{v} is already defined by {:?}",
                value.parent
            );
            value.parent = Some(id);
        }

        instr.id = id;
        instr.block = block;
        instr.live = true;
        self.instrs.push(instr);
        self.blocks[block.index()].instrs.insert(pos, id);
        self.touch(DependencyMask::INSTRUCTIONS | DependencyMask::VARIABLES);
        id
    }

    /// Removes an instruction whose result is unused.
    ///
    /// # Panics
    ///
    /// Panics if the instruction is not live or its destination value still
    /// has uses.
    pub fn remove_instruction(&mut self, id: InstrId) {
        let instr = &self.instrs[id.index()];
        assert!(instr.live, "{id} was already removed");
        if let Some(v) = instr.def() {
            let value = &self.values[v.index()];
            assert!(
                !value.has_uses(),
                "cannot remove {id}: {v} still has {} use(s)",
                value.use_count()
            );
        }

        self.detach(id);
        let block = self.instrs[id.index()].block;
        self.blocks[block.index()].instrs.retain(|&i| i != id);
        self.tombstone(id);
        self.touch(DependencyMask::INSTRUCTIONS | DependencyMask::VARIABLES);
    }

    /// Removes a set of instructions at once.
    ///
    /// Uses among the removed instructions do not block removal, so dead
    /// cycles through phis can be deleted in one step.
    ///
    /// # Panics
    ///
    /// Panics if an instruction is not live or a removed result is still read
    /// by an instruction outside the set.
    pub fn remove_instructions(&mut self, ids: &[InstrId]) {
        for &id in ids {
            assert!(self.instrs[id.index()].live, "{id} was already removed");
            self.detach(id);
        }
        for &id in ids {
            if let Some(v) = self.instrs[id.index()].def() {
                let value = &self.values[v.index()];
                assert!(
                    !value.has_uses(),
                    "cannot remove {id}: {v} still has {} use(s)",
                    value.use_count()
                );
            }
            let block = self.instrs[id.index()].block;
            self.blocks[block.index()].instrs.retain(|&i| i != id);
            self.tombstone(id);
        }
        self.touch(DependencyMask::INSTRUCTIONS | DependencyMask::VARIABLES);
    }

    /// Moves a live instruction to `cursor`.
    ///
    /// Keeping definitions ahead of their uses is the caller's responsibility.
    ///
    /// # Panics
    ///
    /// Panics if the cursor is anchored at the moved instruction or the move
    /// would break phi placement.
    pub fn move_instruction(&mut self, id: InstrId, cursor: Cursor) {
        assert!(
            !matches!(cursor, Cursor::Before(i) | Cursor::After(i) if i == id),
            "cannot move {id} relative to itself"
        );
        let old_block = self.instrs[id.index()].block;
        let old_pos = self.position(id);
        self.blocks[old_block.index()].instrs.remove(old_pos);

        let (block, pos) = self.resolve(cursor);
        let phis = self.phi_count(block);
        let is_phi = self.instrs[id.index()].is_phi();
        assert!(
            if is_phi { pos <= phis } else { pos >= phis },
            "moving {id} would break phi placement in {block}"
        );
        self.blocks[block.index()].instrs.insert(pos, id);
        self.instrs[id.index()].block = block;
        self.touch(DependencyMask::INSTRUCTIONS);
    }

    /// Replaces operand `slot` of `id`, updating both use sets.
    ///
    /// # Panics
    ///
    /// Panics if the slot is out of range or the new operand reads a dead value.
    pub fn set_operand(&mut self, id: InstrId, slot: usize, operand: Operand) {
        let old = self.instrs[id.index()].srcs[slot];
        if let Src::Value(v) = old.src {
            self.values[v.index()].uses.remove(&Use::src(id, slot));
        }
        if let Src::Value(v) = operand.src {
            let value = &mut self.values[v.index()];
            assert!(value.live, "operand {slot} of {id} would read dead {v}");
            value.uses.insert(Use::src(id, slot));
        }
        self.instrs[id.index()].srcs[slot] = operand;
        self.touch(DependencyMask::INSTRUCTIONS);
    }

    /// Sets the `exact` flag and float controls of an instruction.
    pub fn set_float_controls(&mut self, id: InstrId, exact: bool, fast_math: FloatControls) {
        let instr = &mut self.instrs[id.index()];
        instr.exact = exact;
        instr.fast_math = fast_math;
        self.touch(DependencyMask::INSTRUCTIONS);
    }

    /// Rewrites every operand and branch condition reading `old` to read `new`.
    ///
    /// # Panics
    ///
    /// Panics if `old == new`, either value is dead, or the bit sizes or
    /// component counts differ (insert an explicit conversion first).
    pub fn replace_all_uses(&mut self, old: ValueId, new: ValueId) {
        assert_ne!(old, new, "replacing {old} with itself");
        let (o, n) = (self.value(old), self.value(new));
        assert!(o.live && n.live, "replace_all_uses on a dead value");
        assert!(
            o.bit_size == n.bit_size && o.num_components == n.num_components,
            "cannot replace {old} ({}x{}) with {new} ({}x{})",
            o.bit_size,
            o.num_components,
            n.bit_size,
            n.num_components
        );

        let uses = mem::take(&mut self.values[old.index()].uses);
        let mut mask = DependencyMask::INSTRUCTIONS;
        for u in &uses {
            match *u {
                Use::Src { instr, slot } => {
                    self.instrs[instr.index()].srcs[slot as usize].src = Src::Value(new);
                }
                Use::Branch(block) => {
                    let term = &mut self.blocks[block.index()].terminator;
                    if let Terminator::Branch { cond, .. } = term {
                        *cond = new;
                    }
                    mask |= DependencyMask::BLOCKS;
                }
            }
        }
        self.values[new.index()].uses.extend(uses);
        self.touch(mask);
    }

    /// Drops the operand uses of `id` without unlinking it.
    pub(super) fn detach(&mut self, id: InstrId) {
        let srcs: Vec<(usize, ValueId)> = self.instrs[id.index()].value_srcs().collect();
        for (slot, v) in srcs {
            self.values[v.index()].uses.remove(&Use::src(id, slot));
        }
    }

    /// Marks `id` and its destination value dead.
    pub(super) fn tombstone(&mut self, id: InstrId) {
        let instr = &mut self.instrs[id.index()];
        instr.live = false;
        if let Some(v) = instr.def() {
            self.values[v.index()].live = false;
        }
    }
}

fn check_shape(bit_size: u8, num_components: u8) {
    assert!(
        VALID_BIT_SIZES.contains(&bit_size),
        "invalid bit size {bit_size}"
    );
    assert!(
        (1..=MAX_COMPONENTS).contains(&(num_components as usize)),
        "invalid component count {num_components}"
    );
}

#[cfg(test)]
mod tests {
    use crate::ir::{AluOp, Builder, Cursor, Operand, Shader, ShaderStage, Use};

    fn scratch() -> Shader {
        Shader::new("mutation", ShaderStage::Fragment)
    }

    #[test]
    fn test_replace_all_uses_moves_use_set() {
        let mut shader = scratch();
        let entry = shader.entry();
        let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
        let a = b.imm_float(1.0, 32);
        let c = b.imm_float(2.0, 32);
        let sum = b.fadd(a, a);
        let add = shader.value(sum).parent().unwrap();

        shader.replace_all_uses(a, c);
        assert!(!shader.value(a).has_uses());
        assert_eq!(shader.value(c).use_count(), 2);
        assert!(shader.value(c).uses().all(|u| u.instr() == Some(add)));
        assert!(shader.validate().is_ok());
    }

    #[test]
    #[should_panic(expected = "cannot replace")]
    fn test_replace_with_incompatible_shape_panics() {
        let mut shader = scratch();
        let entry = shader.entry();
        let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
        let a = b.imm_float(1.0, 32);
        let wide = b.imm_float(1.0, 64);
        let _ = b.fadd(a, a);
        shader.replace_all_uses(a, wide);
    }

    #[test]
    #[should_panic(expected = "still has")]
    fn test_remove_used_instruction_panics() {
        let mut shader = scratch();
        let entry = shader.entry();
        let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
        let a = b.imm_float(1.0, 32);
        let _ = b.fneg(a);
        let def = shader.value(a).parent().unwrap();
        shader.remove_instruction(def);
    }

    #[test]
    fn test_remove_instruction_tombstones() {
        let mut shader = scratch();
        let entry = shader.entry();
        let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
        let a = b.imm_float(1.0, 32);
        let n = b.fneg(a);
        let neg = shader.value(n).parent().unwrap();

        shader.remove_instruction(neg);
        assert!(!shader.instr(neg).is_live());
        assert!(!shader.value(n).is_live());
        assert!(!shader.value(a).has_uses());
        assert_eq!(shader.num_instructions(), 1);
    }

    #[test]
    fn test_set_operand_updates_uses() {
        let mut shader = scratch();
        let entry = shader.entry();
        let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
        let a = b.imm_int(1, 32);
        let c = b.imm_int(2, 32);
        let sum = b.alu(AluOp::Iadd, &[a, a]);
        let add = shader.value(sum).parent().unwrap();

        shader.set_operand(add, 1, Operand::value(c));
        assert_eq!(shader.value(a).uses().collect::<Vec<_>>(), vec![Use::src(add, 0)]);
        assert_eq!(shader.value(c).uses().collect::<Vec<_>>(), vec![Use::src(add, 1)]);
    }

    #[test]
    fn test_move_instruction() {
        let mut shader = scratch();
        let entry = shader.entry();
        let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
        let a = b.imm_int(1, 32);
        let c = b.imm_int(2, 32);
        let first = shader.value(a).parent().unwrap();
        let second = shader.value(c).parent().unwrap();

        shader.move_instruction(first, Cursor::After(second));
        assert_eq!(shader.block(entry).instrs(), &[second, first]);
    }

    #[test]
    #[should_panic(expected = "invalid bit size")]
    fn test_create_value_rejects_odd_sizes() {
        scratch().create_value(24, 1);
    }
}
