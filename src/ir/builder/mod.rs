//! Instruction builder.
//!
//! A [`Builder`] borrows a shader mutably and inserts instructions at a
//! [`Cursor`]. Every value-producing helper allocates a fresh destination
//! value and returns it; the cursor advances past each inserted instruction so
//! consecutive calls come out in program order.
//!
//! ALU instructions created by the builder are stamped with the builder's
//! `exact`, `fast_math` and `exec_size`. Lowering passes copy these from the
//! instruction they replace before emitting the replacement sequence.
//!
//! # Save/restore discipline
//!
//! Code that needs to emit somewhere else temporarily either saves and
//! restores the cursor with [`Builder::cursor`] / [`Builder::set_cursor`], or
//! uses [`Builder::with_cursor`], which restores it on return.
//!
//! # Examples
//!
//! ```rust
//! use shadeopt::ir::{Builder, Cursor, Shader, ShaderStage};
//!
//! let mut shader = Shader::new("example", ShaderStage::Fragment);
//! let entry = shader.entry();
//! let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
//! let x = b.load_input(32, 0, 1, 32);
//! let y = b.fmul_imm(x, 0.5);
//! b.store_output(y, 32, 0);
//! assert!(shader.validate().is_ok());
//! ```

mod alu;
mod control;
mod io;

pub use alu::float_bits;
pub use control::{IfBlocks, LoopBlocks};

use crate::ir::{
    AluOp, AluType, Cursor, Dest, FloatControls, InstrId, Instruction, Operand, Shader, Src,
    Swizzle, ValueId,
};

/// Inserts instructions into a shader at a cursor.
pub struct Builder<'a> {
    shader: &'a mut Shader,
    cursor: Cursor,
    /// Stamped on created ALU instructions.
    pub exact: bool,
    /// Stamped on created ALU instructions.
    pub fast_math: FloatControls,
    /// SIMD width of created instructions.
    pub exec_size: u8,
}

impl<'a> Builder<'a> {
    /// Builder inserting at `cursor`.
    pub fn new(shader: &'a mut Shader, cursor: Cursor) -> Self {
        Builder {
            shader,
            cursor,
            exact: false,
            fast_math: FloatControls::empty(),
            exec_size: 8,
        }
    }

    /// Read access to the shader being built.
    #[must_use]
    pub fn shader(&self) -> &Shader {
        &*self.shader
    }

    /// Direct access to the shader's mutation API.
    pub fn shader_mut(&mut self) -> &mut Shader {
        &mut *self.shader
    }

    /// Current insertion point.
    #[must_use]
    pub const fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// Moves the insertion point.
    pub fn set_cursor(&mut self, cursor: Cursor) {
        self.cursor = cursor;
    }

    /// Runs `f` with the cursor at `cursor`, then restores the previous cursor.
    pub fn with_cursor<R>(&mut self, cursor: Cursor, f: impl FnOnce(&mut Self) -> R) -> R {
        let saved = self.cursor;
        self.cursor = cursor;
        let out = f(self);
        self.cursor = saved;
        out
    }

    /// Copies `exact`, float controls and SIMD width from an existing instruction.
    pub fn copy_flags_from(&mut self, instr: InstrId) {
        let inst = self.shader.instr(instr);
        self.exact = inst.exact;
        self.fast_math = inst.fast_math;
        self.exec_size = inst.exec_size;
    }

    /// Inserts a fully formed instruction at the cursor and advances.
    pub fn insert(&mut self, instr: Instruction) -> InstrId {
        let id = self.shader.insert_instruction(self.cursor, instr);
        self.cursor = self.cursor.advance(id);
        id
    }

    /// ALU instruction on plain values; the result shape is inferred.
    ///
    /// Per-component inputs that are scalars are broadcast to the result
    /// width. Comparisons produce 1-bit results, `bcsel` takes the size of its
    /// data operands and `bit_count` is always 32-bit.
    ///
    /// # Panics
    ///
    /// Panics for conversions (use [`Builder::alu_sized`]), on an operand
    /// count mismatch, or when per-component inputs have incompatible widths.
    pub fn alu(&mut self, op: AluOp, srcs: &[ValueId]) -> ValueId {
        assert!(
            !op.is_conversion(),
            "{op} needs an explicit result size"
        );
        let bit_size = self.inferred_bit_size(op, srcs);
        self.alu_sized(op, srcs, bit_size)
    }

    /// ALU instruction on plain values with an explicit result bit size.
    pub fn alu_sized(&mut self, op: AluOp, srcs: &[ValueId], bit_size: u8) -> ValueId {
        assert_eq!(srcs.len(), op.num_inputs(), "{op} takes {} operands", op.num_inputs());
        let comps = match op.output_size() {
            0 => srcs
                .iter()
                .enumerate()
                .filter(|&(i, _)| op.input_size(i) == 0)
                .map(|(_, v)| self.shader.value(*v).num_components())
                .max()
                .unwrap_or(1),
            n => n,
        };

        let operands = srcs
            .iter()
            .enumerate()
            .map(|(i, &v)| {
                let width = self.shader.value(v).num_components();
                let mut operand = Operand::value(v);
                match op.input_size(i) {
                    0 if width == comps => {}
                    0 if width == 1 => operand.swizzle = Swizzle::splat(0),
                    0 => panic!("{op} operand {i} has {width} components, result has {comps}"),
                    n => assert!(
                        width >= n,
                        "{op} operand {i} needs {n} components, {v} has {width}"
                    ),
                }
                operand
            })
            .collect();
        self.alu_operands(op, operands, bit_size, comps)
    }

    /// ALU instruction on explicit operands and result shape.
    pub fn alu_operands(
        &mut self,
        op: AluOp,
        srcs: Vec<Operand>,
        bit_size: u8,
        num_components: u8,
    ) -> ValueId {
        let dest = self.shader.create_value(bit_size, num_components);
        let instr = Instruction::alu(op, srcs, Dest::Value(dest))
            .with_exact(self.exact)
            .with_fast_math(self.fast_math)
            .with_exec_size(self.exec_size);
        self.insert(instr);
        dest
    }

    /// Materializes operand `slot` of ALU instruction `instr` as a plain value,
    /// applying its swizzle and modifiers with explicit instructions.
    ///
    /// Returns the source value itself when the operand is already plain.
    ///
    /// # Panics
    ///
    /// Panics if the operand reads a raw register.
    pub fn ssa_for_alu_src(&mut self, instr: InstrId, slot: usize) -> ValueId {
        let inst = self.shader.instr(instr);
        let op = inst
            .alu_op()
            .unwrap_or_else(|| panic!("{instr} is not an ALU instruction"));
        let operand = inst.srcs[slot];
        let dest_comps = inst
            .def()
            .map_or(1, |d| self.shader.value(d).num_components() as usize);
        let Src::Value(value) = operand.src else {
            panic!("operand {slot} of {instr} reads a register");
        };
        let src = self.shader.value(value);
        let lanes = inst.lanes_read(slot, dest_comps, src.num_components() as usize);
        let (bit_size, src_comps) = (src.bit_size(), src.num_components() as usize);

        let mut out = value;
        if !(operand.swizzle.is_identity(lanes) && src_comps == lanes) {
            let mut mov = Operand::value(value);
            mov.swizzle = operand.swizzle;
            out = self.alu_operands(AluOp::Mov, vec![mov], bit_size, lanes as u8);
        }
        let float = op.input_type(slot) == AluType::Float;
        if operand.abs {
            out = self.alu(if float { AluOp::Fabs } else { AluOp::Iabs }, &[out]);
        }
        if operand.negate {
            out = self.alu(if float { AluOp::Fneg } else { AluOp::Ineg }, &[out]);
        }
        out
    }

    fn inferred_bit_size(&self, op: AluOp, srcs: &[ValueId]) -> u8 {
        let size_of = |i: usize| self.shader.value(srcs[i]).bit_size();
        if op.is_comparison() {
            1
        } else {
            match op {
                AluOp::Bcsel => size_of(1),
                AluOp::BitCount => 32,
                _ => size_of(0),
            }
        }
    }
}
