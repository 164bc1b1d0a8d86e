//! Pass infrastructure and the built-in passes.
//!
//! This module sits on top of the IR and its analyses:
//!
//! - [`crate::ir`] - SSA shader, builder, mutation API
//! - [`crate::analysis`] - cached analyses and dependency queries
//! - [`compiler`](self) - passes, options, scheduling and event reporting
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      Compiler Pipeline                           │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  CompilerContext              Shared, read-only during passes    │
//! │    ├─ CompilerOptions         (target capabilities, limits)      │
//! │    └─ EventLog                (append-only, thread safe)         │
//! │                                                                  │
//! │  PassScheduler               Phased fixpoint execution           │
//! │    ├─ Phase 1: Lower          (atan, integer and float ALU ops)  │
//! │    ├─ Phase 2: Optimize       (select hoisting)                  │
//! │    ├─ Normalize               (copy propagation, DCE)            │
//! │    └─ Late                    (load insertion, load lowering)    │
//! │    Each phase: run → normalize → repeat until stable             │
//! │                                                                  │
//! │  ShaderPass trait            Interface for all passes            │
//! │    ├─ should_run()            Cheap gate on options and shader   │
//! │    └─ run()                   Mutates, returns whether changed   │
//! │                                                                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use shadeopt::{
//!     compiler::{CompilerContext, CompilerOptions, PassScheduler},
//!     ir::{AluOp, Builder, Cursor, Shader, ShaderStage},
//! };
//!
//! let mut shader = Shader::new("angle", ShaderStage::Fragment);
//! let entry = shader.entry();
//! let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
//! let y = b.load_input(32, 0, 1, 32);
//! let x = b.load_input(32, 1, 1, 32);
//! let a = b.atan2(y, x);
//! b.store_output(a, 32, 0);
//!
//! let options = CompilerOptions::default();
//! let ctx = CompilerContext::new(options.clone());
//! let mut scheduler = PassScheduler::standard(&options);
//! scheduler.run(&ctx, &mut shader)?;
//!
//! assert!(shader.instructions().all(|i| i.alu_op() != Some(AluOp::Atan2)));
//! # Ok::<(), shadeopt::Error>(())
//! ```

mod context;
mod events;
mod options;
mod pass;
mod passes;
mod scheduler;

pub use context::CompilerContext;
pub use events::{
    DerivedStats, Event, EventBuilder, EventCategory, EventKind, EventLog, EventLogIter, KindCounts,
};
pub use options::CompilerOptions;
pub use pass::ShaderPass;
pub use passes::{
    lowered_atan, lowered_atan2, lowered_bit_count, lowered_bitfield_reverse,
    lowered_fminmax_signed_zero, lowered_mul_high, CopyPropagationPass, DeadCodePass,
    InsertLoadRegPass, LowerAluPass, LowerAtanPass, LowerLoadRegPass, OptSelectPass,
};
pub use scheduler::PassScheduler;
