//! # shadeopt Prelude
//!
//! Re-exports of the types most code working with `shadeopt` needs: building
//! and inspecting shaders, running passes, and querying analyses.
//!
//! ```rust
//! use shadeopt::prelude::*;
//!
//! let mut shader = Shader::new("prelude", ShaderStage::Compute);
//! let entry = shader.entry();
//! let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
//! let x = b.imm_int(3, 32);
//! let y = b.imul_imm(x, 5);
//! assert_eq!(shader.const_component(x, 0), Some(3));
//! assert_eq!(shader.const_component(y, 0), None);
//! ```

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all shadeopt operations
pub use crate::Error;

/// The result type used throughout shadeopt
pub use crate::Result;

// ================================================================================================
// Intermediate Representation
// ================================================================================================

/// Shader container and identifiers
pub use crate::ir::{BlockId, InstrId, Shader, ShaderStage, ValueId};

/// Instructions, opcodes and operands
pub use crate::ir::{
    AluOp, AluType, Dest, FloatControls, InstrKind, Instruction, Intrinsic, Operand, RegDest,
    RegFile, RegRef, Src, Swizzle, Use, Value,
};

/// Construction and positioning
pub use crate::ir::{Builder, Cursor, Terminator};

// ================================================================================================
// Analyses
// ================================================================================================

/// Cached analyses and the dependency mask they are invalidated by
pub use crate::analysis::{Analysis, DependencyMask, Dominance, RegisterDefs};

/// Output-to-input dependency queries
pub use crate::analysis::{gather_output_dependencies, OutputDeps, OutputsDeps};

// ================================================================================================
// Pass Infrastructure
// ================================================================================================

/// Running passes
pub use crate::compiler::{
    CompilerContext, CompilerOptions, EventKind, EventLog, PassScheduler, ShaderPass,
};

/// Built-in passes
pub use crate::compiler::{
    CopyPropagationPass, DeadCodePass, InsertLoadRegPass, LowerAluPass, LowerAtanPass,
    LowerLoadRegPass, OptSelectPass,
};
