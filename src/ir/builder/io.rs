//! Intrinsics, textures and register-level instructions.

use crate::ir::{
    AluOp, Builder, Dest, InstrId, InstrKind, Instruction, Intrinsic, IoIndices, Operand, RegDest,
    RegRef, ValueId,
};

impl Builder<'_> {
    /// Value-producing intrinsic.
    ///
    /// # Panics
    ///
    /// Panics if the intrinsic has no destination.
    pub fn load_intrinsic(
        &mut self,
        intrinsic: Intrinsic,
        indices: IoIndices,
        srcs: &[ValueId],
        bit_size: u8,
        num_components: u8,
    ) -> ValueId {
        assert!(intrinsic.has_dest(), "{intrinsic} produces no value");
        let dest = self.shader_mut().create_value(bit_size, num_components);
        let srcs = srcs.iter().copied().map(Operand::value).collect();
        let instr = Instruction::new(
            InstrKind::Intrinsic(intrinsic, indices),
            srcs,
            Some(Dest::Value(dest)),
        )
        .with_exec_size(self.exec_size);
        self.insert(instr);
        dest
    }

    /// Intrinsic without a result (stores).
    ///
    /// # Panics
    ///
    /// Panics if the intrinsic produces a value.
    pub fn store_intrinsic(
        &mut self,
        intrinsic: Intrinsic,
        indices: IoIndices,
        srcs: &[ValueId],
    ) -> InstrId {
        assert!(!intrinsic.has_dest(), "{intrinsic} produces a value");
        let srcs = srcs.iter().copied().map(Operand::value).collect();
        let instr = Instruction::new(InstrKind::Intrinsic(intrinsic, indices), srcs, None)
            .with_exec_size(self.exec_size);
        self.insert(instr)
    }

    /// `load_input` of `num_components` components at `location`/`component`.
    pub fn load_input(
        &mut self,
        location: u32,
        component: u8,
        num_components: u8,
        bit_size: u8,
    ) -> ValueId {
        let offset = self.imm_int(0, 32);
        self.load_intrinsic(
            Intrinsic::LoadInput,
            IoIndices::slot(location, component),
            &[offset],
            bit_size,
            num_components,
        )
    }

    /// `store_output` of every component of `value` at `location`/`component`.
    pub fn store_output(&mut self, value: ValueId, location: u32, component: u8) -> InstrId {
        let comps = self.shader().value(value).num_components();
        let offset = self.imm_int(0, 32);
        let indices = IoIndices {
            write_mask: ((1u32 << comps) - 1) as u8,
            ..IoIndices::slot(location, component)
        };
        self.store_intrinsic(Intrinsic::StoreOutput, indices, &[value, offset])
    }

    /// Texture sample (`query == false`) or texture query, producing a vec4.
    pub fn tex(&mut self, coord: ValueId, query: bool) -> ValueId {
        let dest = self.shader_mut().create_value(32, 4);
        let instr = Instruction::new(
            InstrKind::Tex { query },
            vec![Operand::value(coord)],
            Some(Dest::Value(dest)),
        )
        .with_exec_size(self.exec_size);
        self.insert(instr);
        dest
    }

    /// Canonicalizes the whole contents of `reg` into a value.
    ///
    /// The value has the element type of `reg` and stands for `bytes` bytes
    /// of register data.
    pub fn load_reg(&mut self, reg: RegRef, bytes: u32) -> ValueId {
        let dest = self.shader_mut().create_value(reg.type_bits, 1);
        let instr = Instruction::new(
            InstrKind::LoadReg { bytes },
            vec![Operand::reg(reg)],
            Some(Dest::Value(dest)),
        )
        .with_exec_size(self.exec_size);
        self.insert(instr);
        dest
    }

    /// Register-to-register move.
    pub fn mov_reg(&mut self, dest: RegDest, src: Operand) -> InstrId {
        self.alu_reg(AluOp::Mov, dest, vec![src])
    }

    /// Register-level ALU instruction writing `dest`.
    pub fn alu_reg(&mut self, op: AluOp, dest: RegDest, srcs: Vec<Operand>) -> InstrId {
        let instr = Instruction::alu(op, srcs, Dest::Reg(dest))
            .with_exact(self.exact)
            .with_fast_math(self.fast_math)
            .with_exec_size(self.exec_size);
        self.insert(instr)
    }
}

#[cfg(test)]
mod tests {
    use crate::ir::{Builder, Cursor, Intrinsic, RegDest, RegRef, Shader, ShaderStage};

    #[test]
    fn test_store_output_sets_write_mask() {
        let mut shader = Shader::new("io", ShaderStage::Vertex);
        let entry = shader.entry();
        let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
        let v = b.load_input(32, 0, 3, 32);
        let store = b.store_output(v, 33, 1);
        let (intr, idx) = shader.instr(store).kind().intrinsic().unwrap();
        assert_eq!(intr, Intrinsic::StoreOutput);
        assert_eq!(idx.write_mask, 0b111);
        assert_eq!(idx.location, 33);
        assert_eq!(idx.component, 1);
        assert!(shader.validate().is_ok());
    }

    #[test]
    fn test_register_moves() {
        let mut shader = Shader::new("regs", ShaderStage::Compute);
        let src = shader.alloc_reg(1);
        let dst = shader.alloc_reg(1);
        let entry = shader.entry();
        let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
        let mov = b.mov_reg(
            RegDest::new(RegRef::vgrf(dst, 32), 32),
            crate::ir::Operand::reg(RegRef::vgrf(src, 32)),
        );
        assert!(shader.instr(mov).reg_dest().is_some());
        assert!(shader.instr(mov).has_side_effects());
    }
}
