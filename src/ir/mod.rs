//! SSA shader IR.
//!
//! A [`Shader`] is a control-flow graph of [`Block`]s holding
//! [`Instruction`]s in SSA form. Values are produced exactly once and carry
//! the set of operands reading them, so def-use and use-def queries are both
//! constant-time lookups:
//!
//! - [`Value`] / [`ValueId`]: bit size, component count, producer, use set
//! - [`Instruction`] / [`InstrId`]: an [`InstrKind`] tag, [`Operand`]s and at
//!   most one [`Dest`]
//! - [`Block`] / [`BlockId`]: phis, instructions and a [`Terminator`]
//!
//! Instructions are created through a [`Builder`] positioned by a [`Cursor`],
//! and changed afterwards only through the mutation API on [`Shader`], which
//! keeps use sets, predecessor lists and the metadata cache consistent.
//! [`Shader::validate`] re-checks all structural invariants from scratch and
//! [`eval`] runs a shader on concrete inputs.

mod block;
mod builder;
mod cursor;
mod display;
pub mod eval;
mod ids;
mod instruction;
mod op;
pub mod operand;
mod shader;
mod value;
mod verify;

pub use block::{Block, Terminator};
pub use builder::{float_bits, Builder, IfBlocks, LoopBlocks};
pub use cursor::Cursor;
pub use ids::{BlockId, InstrId, ValueId};
pub use instruction::{Dest, FloatControls, InstrKind, Instruction, IoIndices, RegDest};
pub use op::{AluOp, AluType, Intrinsic};
pub use operand::{swizzle_letters, Operand, RegFile, RegRef, Src, Swizzle};
pub use shader::{Shader, ShaderStage, REG_SIZE};
pub use value::{Use, Value};
