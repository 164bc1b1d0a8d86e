//! Instructions.
//!
//! An [`Instruction`] is a tagged [`InstrKind`], an ordered list of
//! [`Operand`]s and at most one [`Dest`]. Instructions are created detached
//! with the constructors below and only become part of a shader through
//! [`Shader::insert_instruction`](crate::ir::Shader::insert_instruction), which
//! assigns the id and owning block and records operand uses.

use bitflags::bitflags;

use crate::ir::{AluOp, AluType, BlockId, InstrId, Intrinsic, Operand, RegRef, ValueId};

bitflags! {
    /// Floating-point execution controls stamped on ALU instructions.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FloatControls: u16 {
        /// The sign of zero must be preserved for 16-bit floats.
        const SIGNED_ZERO_PRESERVE_FP16 = 1 << 0;
        /// The sign of zero must be preserved for 32-bit floats.
        const SIGNED_ZERO_PRESERVE_FP32 = 1 << 1;
        /// The sign of zero must be preserved for 64-bit floats.
        const SIGNED_ZERO_PRESERVE_FP64 = 1 << 2;
        /// Denormals must be preserved for 16-bit floats.
        const DENORM_PRESERVE_FP16 = 1 << 3;
        /// Denormals must be preserved for 32-bit floats.
        const DENORM_PRESERVE_FP32 = 1 << 4;
        /// Denormals must be preserved for 64-bit floats.
        const DENORM_PRESERVE_FP64 = 1 << 5;
        /// Infinities must be preserved for 32-bit floats.
        const INF_PRESERVE_FP32 = 1 << 6;
        /// NaNs must be preserved for 32-bit floats.
        const NAN_PRESERVE_FP32 = 1 << 7;
    }
}

impl FloatControls {
    /// Signed-zero preservation bit for `bit_size`-wide floats.
    #[must_use]
    pub const fn signed_zero_preserve(bit_size: u8) -> FloatControls {
        match bit_size {
            16 => FloatControls::SIGNED_ZERO_PRESERVE_FP16,
            32 => FloatControls::SIGNED_ZERO_PRESERVE_FP32,
            64 => FloatControls::SIGNED_ZERO_PRESERVE_FP64,
            _ => FloatControls::empty(),
        }
    }

    /// Whether the sign of zero must be preserved at `bit_size`.
    #[must_use]
    pub const fn preserves_signed_zero(self, bit_size: u8) -> bool {
        let bit = FloatControls::signed_zero_preserve(bit_size);
        !bit.is_empty() && self.contains(bit)
    }
}

/// Location and layout indices of an I/O or memory intrinsic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct IoIndices {
    /// First varying slot accessed.
    pub location: u32,
    /// Number of consecutive slots.
    pub num_slots: u32,
    /// First component within the slot.
    pub component: u8,
    /// Accesses the upper half of a 32-bit slot with 16-bit data.
    pub high_16bits: bool,
    /// Components written by a store (contiguous from bit 0).
    pub write_mask: u8,
}

impl IoIndices {
    /// Single-slot access at `location`, component `component`.
    #[must_use]
    pub const fn slot(location: u32, component: u8) -> Self {
        IoIndices {
            location,
            num_slots: 1,
            component,
            high_16bits: false,
            write_mask: 0,
        }
    }
}

/// What an instruction does.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InstrKind {
    /// Arithmetic/logic operation.
    Alu(AluOp),
    /// Shader intrinsic with its I/O indices.
    Intrinsic(Intrinsic, IoIndices),
    /// Texture access; `query` instructions (size, levels) read no texels.
    Tex {
        /// Reads metadata instead of texels.
        query: bool,
    },
    /// Constant; one raw bit pattern per component.
    LoadConst(Vec<u64>),
    /// Undefined value.
    Undef,
    /// SSA phi; `preds[i]` is the predecessor feeding operand `i`.
    Phi(Vec<BlockId>),
    /// Canonicalizes a raw register read into an SSA value of `bytes` bytes.
    LoadReg {
        /// Size of the register contents in bytes.
        bytes: u32,
    },
}

impl InstrKind {
    /// Number of operands the kind requires.
    #[must_use]
    pub fn arity(&self) -> usize {
        match self {
            InstrKind::Alu(op) => op.num_inputs(),
            InstrKind::Intrinsic(intr, _) => intr.num_srcs(),
            InstrKind::Tex { .. } | InstrKind::LoadReg { .. } => 1,
            InstrKind::LoadConst(_) | InstrKind::Undef => 0,
            InstrKind::Phi(preds) => preds.len(),
        }
    }

    /// The ALU opcode, if this is an ALU instruction.
    #[must_use]
    pub const fn alu_op(&self) -> Option<AluOp> {
        match self {
            InstrKind::Alu(op) => Some(*op),
            _ => None,
        }
    }

    /// The intrinsic and its indices, if this is an intrinsic.
    #[must_use]
    pub const fn intrinsic(&self) -> Option<(Intrinsic, &IoIndices)> {
        match self {
            InstrKind::Intrinsic(intr, idx) => Some((*intr, idx)),
            _ => None,
        }
    }

    /// Whether this is a phi.
    #[must_use]
    pub const fn is_phi(&self) -> bool {
        matches!(self, InstrKind::Phi(_))
    }

    /// Type the operand at `slot` is read as, for modifier legality.
    #[must_use]
    pub const fn operand_type(&self, slot: usize) -> AluType {
        match self {
            InstrKind::Alu(op) => op.input_type(slot),
            _ => AluType::Any,
        }
    }
}

/// A register destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegDest {
    /// Register region written.
    pub reg: RegRef,
    /// Bytes written by the instruction.
    pub size_written: u32,
    /// Predicated writes may leave lanes untouched.
    pub predicated: bool,
}

impl RegDest {
    /// Unpredicated write of `size_written` bytes.
    #[must_use]
    pub const fn new(reg: RegRef, size_written: u32) -> Self {
        RegDest {
            reg,
            size_written,
            predicated: false,
        }
    }

    /// Whether lanes of the region may keep their previous contents.
    #[must_use]
    pub const fn is_partial_write(&self) -> bool {
        self.predicated || self.reg.stride != 1
    }
}

/// Destination of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dest {
    /// Defines an SSA value.
    Value(ValueId),
    /// Writes a raw register.
    Reg(RegDest),
}

/// A single instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub(crate) id: InstrId,
    pub(crate) block: BlockId,
    pub(crate) live: bool,
    pub(crate) kind: InstrKind,
    pub(crate) srcs: Vec<Operand>,
    pub(crate) dest: Option<Dest>,
    /// Must not be reassociated or otherwise transformed inexactly.
    pub exact: bool,
    /// Float execution controls.
    pub fast_math: FloatControls,
    /// SIMD width.
    pub exec_size: u8,
}

impl Instruction {
    /// Detached instruction; ids are assigned on insertion.
    #[must_use]
    pub fn new(kind: InstrKind, srcs: Vec<Operand>, dest: Option<Dest>) -> Self {
        Instruction {
            id: InstrId::DETACHED,
            block: BlockId::new(0),
            live: false,
            kind,
            srcs,
            dest,
            exact: false,
            fast_math: FloatControls::empty(),
            exec_size: 8,
        }
    }

    /// ALU instruction defining `dest`.
    #[must_use]
    pub fn alu(op: AluOp, srcs: Vec<Operand>, dest: Dest) -> Self {
        Self::new(InstrKind::Alu(op), srcs, Some(dest))
    }

    /// Sets the SIMD width.
    #[must_use]
    pub const fn with_exec_size(mut self, exec_size: u8) -> Self {
        self.exec_size = exec_size;
        self
    }

    /// Sets the float controls.
    #[must_use]
    pub const fn with_fast_math(mut self, fast_math: FloatControls) -> Self {
        self.fast_math = fast_math;
        self
    }

    /// Sets the `exact` flag.
    #[must_use]
    pub const fn with_exact(mut self, exact: bool) -> Self {
        self.exact = exact;
        self
    }

    /// Instruction id.
    #[must_use]
    pub const fn id(&self) -> InstrId {
        self.id
    }

    /// Owning block.
    #[must_use]
    pub const fn block(&self) -> BlockId {
        self.block
    }

    /// Whether the instruction is still part of its shader.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        self.live
    }

    /// Kind tag.
    #[must_use]
    pub const fn kind(&self) -> &InstrKind {
        &self.kind
    }

    /// Operands in order.
    #[must_use]
    pub fn srcs(&self) -> &[Operand] {
        &self.srcs
    }

    /// Operand at `slot`.
    #[must_use]
    pub fn src(&self, slot: usize) -> &Operand {
        &self.srcs[slot]
    }

    /// Destination, if any.
    #[must_use]
    pub const fn dest(&self) -> Option<&Dest> {
        self.dest.as_ref()
    }

    /// The SSA value defined, if the destination is a value.
    #[must_use]
    pub const fn def(&self) -> Option<ValueId> {
        match self.dest {
            Some(Dest::Value(v)) => Some(v),
            _ => None,
        }
    }

    /// The register written, if the destination is a register.
    #[must_use]
    pub const fn reg_dest(&self) -> Option<&RegDest> {
        match &self.dest {
            Some(Dest::Reg(r)) => Some(r),
            _ => None,
        }
    }

    /// The ALU opcode, if any.
    #[must_use]
    pub const fn alu_op(&self) -> Option<AluOp> {
        self.kind.alu_op()
    }

    /// Whether this is a phi.
    #[must_use]
    pub const fn is_phi(&self) -> bool {
        self.kind.is_phi()
    }

    /// Whether removing the instruction could change observable behavior
    /// even when its result is unused.
    #[must_use]
    pub fn has_side_effects(&self) -> bool {
        match &self.kind {
            InstrKind::Intrinsic(intr, _) => intr.has_side_effects(),
            _ => matches!(self.dest, Some(Dest::Reg(_)) | None),
        }
    }

    /// Whether the instruction reads the accumulator without naming it.
    #[must_use]
    pub fn reads_accumulator_implicitly(&self) -> bool {
        self.alu_op()
            .is_some_and(AluOp::reads_accumulator_implicitly)
    }

    /// Values read by the instruction, with their operand slots.
    pub fn value_srcs(&self) -> impl Iterator<Item = (usize, ValueId)> + '_ {
        self.srcs
            .iter()
            .enumerate()
            .filter_map(|(slot, op)| op.as_value().map(|v| (slot, v)))
    }

    /// Number of lanes of operand `slot` that are actually read, given the
    /// component count of the destination (`dest_components`) and of the
    /// source value (`src_components`).
    #[must_use]
    pub fn lanes_read(&self, slot: usize, dest_components: usize, src_components: usize) -> usize {
        match &self.kind {
            InstrKind::Alu(op) => match op.input_size(slot) {
                0 => dest_components,
                n => n as usize,
            },
            _ => src_components,
        }
    }
}

impl InstrId {
    /// Placeholder id of an instruction not yet inserted into a shader.
    pub const DETACHED: InstrId = InstrId::from_raw(u32::MAX);
}
