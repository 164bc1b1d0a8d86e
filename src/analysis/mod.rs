//! Analyses over the shader IR.
//!
//! Cached analyses implement [`Analysis`] and are obtained through
//! [`Shader::require`](crate::ir::Shader::require), which memoizes them until a
//! mutation touches one of their [`DependencyMask`] bits:
//!
//! - [`Dominance`] - dominator tree and reverse post-order of the CFG
//! - [`RegisterDefs`] - raw registers written once by a dominating full write
//!
//! [`output_deps`] is a one-shot query parameterized by the outputs of
//! interest and is not cached.

mod defs;
mod dominance;
mod metadata;
pub mod output_deps;

pub use defs::{fully_defines, RegisterDefs};
pub use dominance::{reverse_postorder, Dominance};
pub use metadata::{Analysis, AnalysisKind, DependencyMask, MetadataCache};
pub use output_deps::{
    gather_output_clipper_var_groups, gather_output_dependencies, ClipperVarGroups, OutputDeps,
    OutputsDeps,
};
