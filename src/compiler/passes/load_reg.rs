//! Load materialization for raw register sources.
//!
//! Late in the backend many instructions still read VGRFs that are written
//! more than once or only partially. [`InsertLoadRegPass`] puts a `load_reg`
//! in front of each such read so the consumer sees an SSA value, reusing an
//! earlier load of the same register in the block when nothing wrote the
//! register in between. [`LowerLoadRegPass`] expands every `load_reg` into
//! plain register moves once the rest of the pipeline is done with them:
//!
//! ```text
//! r4 = fadd r1, r2           ssa_7 = load_reg r1 (64B)
//!                      =>    r4 = fadd ssa_7, r2
//!
//! ssa_7 = load_reg r1        r9+0 = mov r1+0
//! r4 = fadd ssa_7, r2   =>   r9+32 = mov r1+32
//!                            r4 = fadd r9, r2
//! ```

use crate::{
    analysis::{fully_defines, RegisterDefs},
    compiler::{pass::ShaderPass, CompilerContext, EventKind, EventLog},
    ir::{
        AluOp, Builder, Cursor, Dest, InstrId, InstrKind, Operand, RegDest, RegFile, RegRef,
        Shader, Src, Swizzle, Use, ValueId,
    },
    Result,
};

/// Inserts `load_reg` in front of reads of non-SSA VGRFs.
pub struct InsertLoadRegPass;

impl Default for InsertLoadRegPass {
    fn default() -> Self {
        Self::new()
    }
}

impl InsertLoadRegPass {
    /// Creates a new load insertion pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Whether the sources of `id` may be materialized at all.
    fn eligible(shader: &Shader, defs: &RegisterDefs, id: InstrId) -> bool {
        let instr = shader.instr(id);
        match instr.kind() {
            InstrKind::LoadReg { .. } | InstrKind::Undef | InstrKind::Alu(AluOp::Dpas) => {
                return false
            }
            InstrKind::Intrinsic(intr, _) if intr.is_store() => return false,
            _ => {}
        }

        let Some(Dest::Reg(dest)) = instr.dest() else {
            return false;
        };
        if defs.get(&dest.reg).is_some() || instr.reads_accumulator_implicitly() {
            return false;
        }
        if instr
            .srcs()
            .iter()
            .filter_map(Operand::as_reg)
            .any(|r| r.file.blocks_materialization())
        {
            return false;
        }
        fully_defines(shader, dest)
    }

    /// The whole-register region a load of `reg` would read, if it can be
    /// loaded as one unit.
    fn loadable(
        shader: &Shader,
        defs: &RegisterDefs,
        reg: &RegRef,
        exec_size: u8,
    ) -> Option<RegRef> {
        if reg.file != RegFile::Vgrf || defs.is_ssa(reg.nr) {
            return None;
        }
        if exec_size < 8 {
            return None;
        }
        let granularity = u32::from(exec_size / 8);
        if shader.reg_size(reg.nr) % granularity != 0 {
            return None;
        }
        if reg.stride != 1 || reg.offset != 0 {
            return None;
        }
        Some(RegRef::vgrf(reg.nr, reg.type_bits))
    }

    /// A `load_reg` of `whole` earlier in the block that is still current
    /// at `id`.
    fn find_prior_load(shader: &Shader, id: InstrId, whole: &RegRef) -> Option<ValueId> {
        let block = shader.block(shader.instr(id).block());
        let pos = shader.position(id);

        for &prev in block.instrs()[..pos].iter().rev() {
            let scan = shader.instr(prev);
            if scan.reg_dest().is_some_and(|d| d.reg.is_vgrf(whole.nr)) {
                return None;
            }
            if matches!(scan.kind(), InstrKind::LoadReg { .. })
                && scan.src(0).src == Src::Reg(*whole)
            {
                return scan.def();
            }
        }
        None
    }
}

impl ShaderPass for InsertLoadRegPass {
    fn name(&self) -> &'static str {
        "insert_load_reg"
    }

    fn description(&self) -> &'static str {
        "Load non-SSA register sources into values in front of their readers"
    }

    fn run(&self, shader: &mut Shader, ctx: &CompilerContext) -> Result<bool> {
        let changes = EventLog::new();
        let defs = shader.require::<RegisterDefs>();
        let grf_size = ctx.options.grf_size;

        for id in shader.instr_ids() {
            if !Self::eligible(shader, &defs, id) {
                continue;
            }
            let exec_size = shader.instr(id).exec_size;

            for slot in 0..shader.instr(id).srcs().len() {
                let operand = *shader.instr(id).src(slot);
                let Src::Reg(reg) = operand.src else {
                    continue;
                };
                let Some(whole) = Self::loadable(shader, &defs, &reg, exec_size) else {
                    continue;
                };

                let loaded = match Self::find_prior_load(shader, id, &whole) {
                    Some(v) => v,
                    None => {
                        let bytes = shader.reg_size(whole.nr) * grf_size;
                        let mut b = Builder::new(shader, Cursor::Before(id));
                        b.copy_flags_from(id);
                        let v = b.load_reg(whole, bytes);
                        changes
                            .record(EventKind::LoadInserted)
                            .at(shader.name(), id.index())
                            .message(format!("{v} = load_reg {whole} ({bytes}B)"));
                        v
                    }
                };

                shader.set_operand(
                    id,
                    slot,
                    Operand {
                        src: Src::Value(loaded),
                        swizzle: Swizzle::IDENTITY,
                        ..operand
                    },
                );
            }
        }

        let changed = !changes.is_empty();
        if changed {
            ctx.events.merge(&changes);
        }
        Ok(changed)
    }
}

/// Expands `load_reg` into register moves.
pub struct LowerLoadRegPass;

impl Default for LowerLoadRegPass {
    fn default() -> Self {
        Self::new()
    }
}

impl LowerLoadRegPass {
    /// Creates a new load lowering pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Copies the register behind load `id` into a fresh VGRF and points the
    /// readers of the loaded value at it. Returns the number of moves.
    fn lower(shader: &mut Shader, id: InstrId, grf_size: u32, max_move: u32) -> Option<u32> {
        let instr = shader.instr(id);
        let InstrKind::LoadReg { bytes } = *instr.kind() else {
            return None;
        };
        let dest = instr.def()?;
        let src = *instr.src(0).as_reg()?;
        let exec_size = u32::from(instr.exec_size);

        let uses: Vec<Use> = shader.value(dest).uses().collect();
        if uses.iter().any(|u| !matches!(u, Use::Src { .. })) {
            return None;
        }

        let nr = shader.alloc_reg(bytes.div_ceil(grf_size));
        let copy = RegRef::vgrf(nr, src.type_bits);
        let chunk = (exec_size * src.type_bytes()).clamp(1, max_move);

        let mut b = Builder::new(shader, Cursor::Before(id));
        b.copy_flags_from(id);
        let mut moves = 0;
        let mut offset = 0;
        while offset < bytes {
            let size = chunk.min(bytes - offset);
            b.mov_reg(
                RegDest::new(copy.at_offset(offset), size),
                Operand::reg(src.at_offset(src.offset + offset)),
            );
            offset += size;
            moves += 1;
        }

        for u in uses {
            let Use::Src { instr: user, slot } = u else {
                continue;
            };
            let slot = slot as usize;
            let operand = *shader.instr(user).src(slot);
            shader.set_operand(
                user,
                slot,
                Operand {
                    src: Src::Reg(copy),
                    ..operand
                },
            );
        }
        shader.remove_instruction(id);
        Some(moves)
    }
}

impl ShaderPass for LowerLoadRegPass {
    fn name(&self) -> &'static str {
        "lower_load_reg"
    }

    fn description(&self) -> &'static str {
        "Expand load_reg into register moves of at most two registers each"
    }

    fn run(&self, shader: &mut Shader, ctx: &CompilerContext) -> Result<bool> {
        let changes = EventLog::new();
        let grf_size = ctx.options.grf_size;
        let max_move = ctx.options.max_move_bytes();

        for id in shader.instr_ids() {
            if !matches!(shader.instr(id).kind(), InstrKind::LoadReg { .. }) {
                continue;
            }
            if let Some(moves) = Self::lower(shader, id, grf_size, max_move) {
                changes
                    .record(EventKind::LoadLowered)
                    .at(shader.name(), id.index())
                    .message(format!("load_reg -> {moves} mov(s)"));
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
    use crate::{analysis::DependencyMask, ir::ShaderStage};

    fn vgrf(nr: u32) -> RegRef {
        RegRef::vgrf(nr, 32)
    }

    fn insert(shader: &mut Shader) -> bool {
        InsertLoadRegPass::new()
            .run(shader, &CompilerContext::default())
            .unwrap()
    }

    fn loads(shader: &Shader) -> Vec<InstrId> {
        shader
            .instructions()
            .filter(|i| matches!(i.kind(), InstrKind::LoadReg { .. }))
            .map(|i| i.id())
            .collect()
    }

    /// `r0` is written twice, so reads of it are not SSA.
    fn twice_written() -> (Shader, u32, u32) {
        let mut shader = Shader::new("regs", ShaderStage::Compute);
        let r0 = shader.alloc_reg(2);
        let r1 = shader.alloc_reg(2);
        let entry = shader.entry();
        let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
        b.exec_size = 16;
        b.mov_reg(RegDest::new(vgrf(r0), 64), Operand::reg(vgrf(r1)));
        b.mov_reg(RegDest::new(vgrf(r0), 64), Operand::reg(vgrf(r1)));
        (shader, r0, r1)
    }

    #[test]
    fn test_inserts_and_dedups_within_block() {
        let (mut shader, r0, r1) = twice_written();
        let out = shader.alloc_reg(2);
        let entry = shader.entry();
        let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
        b.exec_size = 16;
        let add = b.alu_reg(
            AluOp::Fadd,
            RegDest::new(vgrf(out), 64),
            vec![Operand::reg(vgrf(r0)), Operand::reg(vgrf(r0)).negated()],
        );
        let mul = b.alu_reg(
            AluOp::Fmul,
            RegDest::new(vgrf(out), 64),
            vec![Operand::reg(vgrf(r0)), Operand::reg(vgrf(out))],
        );

        assert!(insert(&mut shader));
        let reading = |shader: &Shader, nr: u32| -> Vec<InstrId> {
            loads(shader)
                .into_iter()
                .filter(|&l| shader.instr(l).src(0).src == Src::Reg(vgrf(nr)))
                .collect()
        };
        // Both writes of r0 share one load of r1, and every read of r0 after
        // them shares another.
        assert_eq!(reading(&shader, r1).len(), 1);
        let r0_loads = reading(&shader, r0);
        assert_eq!(r0_loads.len(), 1);
        assert!(matches!(
            shader.instr(r0_loads[0]).kind(),
            InstrKind::LoadReg { bytes: 64 }
        ));

        let loaded = shader.instr(r0_loads[0]).def().unwrap();
        assert_eq!(shader.instr(add).src(0).src, Src::Value(loaded));
        assert_eq!(shader.instr(add).src(1).src, Src::Value(loaded));
        assert!(shader.instr(add).src(1).negate);
        assert_eq!(shader.instr(mul).src(0).src, Src::Value(loaded));

        // `out` was rewritten by the fadd, so the fmul loads it afresh.
        let out_loads = reading(&shader, out);
        assert_eq!(out_loads.len(), 1);
        assert_eq!(
            shader.instr(mul).src(1).src,
            Src::Value(shader.instr(out_loads[0]).def().unwrap())
        );
        assert!(shader.validate().is_ok());
    }

    #[test]
    fn test_redefinition_stops_reuse() {
        let (mut shader, r0, r1) = twice_written();
        let out = shader.alloc_reg(2);
        let entry = shader.entry();
        let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
        b.exec_size = 16;
        b.mov_reg(RegDest::new(vgrf(out), 64), Operand::reg(vgrf(r0)));
        b.mov_reg(RegDest::new(vgrf(r0), 64), Operand::reg(vgrf(r1)));
        b.mov_reg(RegDest::new(vgrf(out), 64), Operand::reg(vgrf(r0)));

        assert!(insert(&mut shader));
        let r0_loads = loads(&shader)
            .into_iter()
            .filter(|&l| shader.instr(l).src(0).src == Src::Reg(vgrf(r0)))
            .count();
        assert_eq!(r0_loads, 2);
    }

    #[test]
    fn test_skips_ineligible_instructions() {
        let (mut shader, r0, r1) = twice_written();
        let odd = shader.alloc_reg(3);
        let out = shader.alloc_reg(2);
        let entry = shader.entry();
        let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
        b.exec_size = 16;
        // Three registers do not split into SIMD16 halves.
        b.mov_reg(RegDest::new(vgrf(out), 64), Operand::reg(vgrf(odd)));
        // Partial write of the destination.
        let mut partial = RegDest::new(vgrf(out), 64);
        partial.predicated = true;
        b.mov_reg(partial, Operand::reg(vgrf(r0)));
        // Flag source.
        let flag = RegRef {
            file: RegFile::Flag,
            ..RegRef::vgrf(0, 32)
        };
        b.alu_reg(
            AluOp::Fadd,
            RegDest::new(vgrf(out), 64),
            vec![Operand::reg(vgrf(r0)), Operand::reg(flag)],
        );
        // Strided source.
        let strided = RegRef {
            stride: 2,
            ..vgrf(r0)
        };
        b.mov_reg(RegDest::new(vgrf(out), 64), Operand::reg(strided));
        // Implicit accumulator read.
        b.alu_reg(
            AluOp::Mac,
            RegDest::new(vgrf(out), 64),
            vec![Operand::reg(vgrf(r0)), Operand::reg(vgrf(r0))],
        );
        // SIMD4.
        b.exec_size = 4;
        b.mov_reg(RegDest::new(vgrf(out), 64), Operand::reg(vgrf(r0)));

        assert!(insert(&mut shader));
        // Only the two writes of r0 are eligible; they share a load of r1.
        let inserted = loads(&shader);
        assert_eq!(inserted.len(), 1);
        assert_eq!(shader.instr(inserted[0]).src(0).src, Src::Reg(vgrf(r1)));
    }

    #[test]
    fn test_insert_then_remove_restores_shader() {
        let (mut shader, r0, _) = twice_written();
        let mask = DependencyMask::all();
        let before = shader.checksum(mask);
        let values = shader.num_values();

        let entry = shader.entry();
        let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
        let v = b.load_reg(vgrf(r0), 64);
        let load = shader.value(v).parent().unwrap();
        shader.remove_instruction(load);

        assert_eq!(shader.checksum(mask), before);
        assert_eq!(shader.num_values(), values);
        assert!(shader.validate().is_ok());
    }

    #[test]
    fn test_lowering_emits_chunked_moves() {
        let (mut shader, r0, _) = twice_written();
        let out = shader.alloc_reg(2);
        let entry = shader.entry();
        let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
        b.exec_size = 16;
        let user = b.alu_reg(
            AluOp::Fabs,
            RegDest::new(vgrf(out), 64),
            vec![Operand::reg(vgrf(r0)).negated()],
        );
        b.mov_reg(RegDest::new(vgrf(out), 64), Operand::reg(vgrf(out)));
        assert!(insert(&mut shader));
        let inserted = loads(&shader).len();

        let ctx = CompilerContext::default();
        let pass = LowerLoadRegPass::new();
        assert!(pass.run(&mut shader, &ctx).unwrap());
        assert!(loads(&shader).is_empty());
        assert_eq!(ctx.events.count_kind(EventKind::LoadLowered), inserted);
        assert!(!pass.run(&mut shader, &ctx).unwrap());

        let operand = *shader.instr(user).src(0);
        let Src::Reg(copy) = operand.src else {
            panic!("reader still reads a value");
        };
        assert!(operand.negate);
        assert_eq!(shader.reg_size(copy.nr), 2);

        // SIMD16 of 32-bit data is 64 bytes, one move per load.
        let moves: Vec<_> = shader
            .instructions()
            .filter(|i| i.reg_dest().is_some_and(|d| d.reg.is_vgrf(copy.nr)))
            .collect();
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0].reg_dest().unwrap().size_written, 64);
        assert_eq!(moves[0].src(0).src, Src::Reg(vgrf(r0)));
        assert!(shader.validate().is_ok());
    }

    #[test]
    fn test_lowering_respects_move_limit() {
        let mut shader = Shader::new("wide", ShaderStage::Compute);
        let big = shader.alloc_reg(4);
        let entry = shader.entry();
        let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
        b.exec_size = 32;
        let v = b.load_reg(RegRef::vgrf(big, 64), 128);
        let out = b.shader_mut().alloc_reg(4);
        b.alu_reg(
            AluOp::Mov,
            RegDest::new(RegRef::vgrf(out, 64), 128),
            vec![Operand::value(v)],
        );

        let ctx = CompilerContext::default();
        assert!(LowerLoadRegPass::new().run(&mut shader, &ctx).unwrap());
        // 32 lanes of 8 bytes exceed two registers, so 64-byte chunks.
        let copies: Vec<u32> = shader
            .instructions()
            .filter_map(|i| i.reg_dest())
            .filter(|d| d.reg.nr != out)
            .map(|d| d.reg.offset)
            .collect();
        assert_eq!(copies, vec![0, 64]);
    }
}
