//! Textual form of shaders.
//!
//! ```text
//! shader fs "example"
//! block_0:
//!     ssa_1:32x1 = load_input ssa_0.x @32.0
//!     ssa_3:32x1 = fmul ssa_1.x, ssa_2.x
//!     store_output ssa_3.x, ssa_4.x @32.0 wrmask=x
//!     return
//! ```

use std::fmt::{self, Write as _};

use crate::ir::{
    operand::swizzle_letters, Dest, Instruction, InstrKind, Shader, Swizzle, Terminator,
};

impl fmt::Display for InstrKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstrKind::Alu(op) => write!(f, "{op}"),
            InstrKind::Intrinsic(intr, _) => write!(f, "{intr}"),
            InstrKind::Tex { query: false } => f.write_str("tex"),
            InstrKind::Tex { query: true } => f.write_str("txs"),
            InstrKind::LoadConst(_) => f.write_str("load_const"),
            InstrKind::Undef => f.write_str("undef"),
            InstrKind::Phi(_) => f.write_str("phi"),
            InstrKind::LoadReg { .. } => f.write_str("load_reg"),
        }
    }
}

impl Shader {
    /// Renders one instruction, e.g. `ssa_3:32x1 = fadd ssa_1.x, -ssa_2.x`.
    #[must_use]
    pub fn render_instr(&self, instr: &Instruction) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = self.write_instr(&mut out, instr);
        out
    }

    fn write_instr(&self, out: &mut String, instr: &Instruction) -> fmt::Result {
        let dest_comps = match instr.dest {
            Some(Dest::Value(v)) => {
                let value = self.value(v);
                write!(out, "{v}:{}x{} = ", value.bit_size(), value.num_components())?;
                value.num_components() as usize
            }
            Some(Dest::Reg(r)) => {
                write!(out, "{} ({}B)", r.reg, r.size_written)?;
                if r.predicated {
                    out.push_str(" (pred)");
                }
                out.push_str(" = ");
                1
            }
            None => 0,
        };
        if instr.exact {
            out.push_str("!");
        }
        write!(out, "{}", instr.kind)?;

        match &instr.kind {
            InstrKind::LoadConst(bits) => {
                out.push_str(" (");
                for (i, b) in bits.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    write!(out, "{b:#x}")?;
                }
                out.push(')');
                return Ok(());
            }
            InstrKind::Phi(preds) => {
                for (i, (pred, op)) in preds.iter().zip(&instr.srcs).enumerate() {
                    out.push_str(if i == 0 { " " } else { ", " });
                    write!(out, "{pred}: ")?;
                    op.write_lanes(out, self.src_width(op))?;
                }
                return Ok(());
            }
            _ => {}
        }

        for (slot, op) in instr.srcs.iter().enumerate() {
            out.push_str(if slot == 0 { " " } else { ", " });
            let lanes = instr.lanes_read(slot, dest_comps.max(1), self.src_width(op));
            op.write_lanes(out, lanes)?;
        }

        match &instr.kind {
            InstrKind::Intrinsic(_, idx) => {
                write!(out, " @{}.{}", idx.location, idx.component)?;
                if idx.num_slots > 1 {
                    write!(out, "+{}", idx.num_slots)?;
                }
                if idx.high_16bits {
                    out.push_str(".hi");
                }
                if idx.write_mask != 0 {
                    let lanes: Vec<u8> = (0..8).filter(|c| idx.write_mask & (1 << c) != 0).collect();
                    if !lanes.is_empty() {
                        write!(
                            out,
                            " wrmask={}",
                            swizzle_letters(&Swizzle::from_lanes(&lanes), lanes.len())
                        )?;
                    }
                }
            }
            InstrKind::LoadReg { bytes } => write!(out, " ({bytes}B)")?,
            _ => {}
        }
        if instr.exec_size != 8 {
            write!(out, " (simd{})", instr.exec_size)?;
        }
        Ok(())
    }

    fn src_width(&self, op: &crate::ir::Operand) -> usize {
        op.as_value()
            .map_or(1, |v| self.value(v).num_components() as usize)
    }
}

impl fmt::Display for Shader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shader {} \"{}\"", self.stage(), self.name())?;
        if let Some(next) = self.next_stage() {
            write!(f, " (->{next})")?;
        }
        writeln!(f)?;
        for block in self.blocks() {
            write!(f, "{}:", block.id())?;
            if !block.preds().is_empty() {
                let preds: Vec<String> = block.preds().iter().map(ToString::to_string).collect();
                write!(f, " // preds: {}", preds.join(", "))?;
            }
            writeln!(f)?;
            for &i in block.instrs() {
                writeln!(f, "    {}", self.render_instr(self.instr(i)))?;
            }
            match block.terminator() {
                Terminator::Jump(t) => writeln!(f, "    jump {t}")?,
                Terminator::Branch {
                    cond,
                    then_block,
                    else_block,
                } => writeln!(f, "    branch {cond} ? {then_block} : {else_block}")?,
                Terminator::Return => writeln!(f, "    return")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::ir::{Builder, Cursor, Operand, AluOp, Shader, ShaderStage};

    #[test]
    fn test_instruction_rendering() {
        let mut shader = Shader::new("print", ShaderStage::Fragment);
        let entry = shader.entry();
        let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
        let v = b.imm_vec_float(&[1.0, 2.0], 32);
        let s = b.alu_operands(
            AluOp::Fadd,
            vec![
                Operand::value(v).swizzled(&[1]),
                Operand::value(v).negated().absolute(),
            ],
            32,
            1,
        );
        let add = shader.def_instr(s).unwrap();
        assert_eq!(
            shader.render_instr(add),
            "ssa_1:32x1 = fadd ssa_0.y, -|ssa_0.x|"
        );
        let text = shader.to_string();
        assert!(text.starts_with("shader fs \"print\"\nblock_0:\n"));
        assert!(text.contains("load_const (0x3f800000, 0x40000000)"));
        assert!(text.trim_end().ends_with("return"));
    }
}
