// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![allow(clippy::too_many_arguments)]

//! # shadeopt
//!
//! An SSA middle-end for GPU shader compilers. `shadeopt` provides the
//! intermediate representation shaders are optimized in, the analyses passes
//! query, and a set of representative lowering and peephole passes driven by
//! a phased scheduler.
//!
//! ## Features
//!
//! - **SSA IR** - values with use sets, phis keyed by predecessor, swizzle and
//!   negate/abs operand modifiers, raw register operands for late passes
//! - **Builder and cursors** - insert anywhere, emit structured `if`/`loop`
//! - **Cached analyses** - dominance and register definitions, invalidated
//!   precisely by the mutation API
//! - **Passes** - software `atan`/`atan2`, integer and signed-zero ALU
//!   lowering, select hoisting, copy propagation, DCE, load materialization
//! - **Output dependencies** - which input components every output reads
//! - **Reference interpreter** - evaluate a shader on concrete inputs to
//!   check that a pass preserved its meaning
//!
//! ## Quick Start
//!
//! ```rust
//! use shadeopt::prelude::*;
//!
//! let mut shader = Shader::new("tint", ShaderStage::Fragment);
//! let entry = shader.entry();
//! let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
//! let color = b.load_input(32, 0, 4, 32);
//! let half = b.imm_float(0.5, 32);
//! let scaled = b.fmul(color, half);
//! let moved = b.mov(scaled);
//! b.store_output(moved, 32, 0);
//!
//! let ctx = CompilerContext::default();
//! CopyPropagationPass::new().run(&mut shader, &ctx)?;
//! shader.validate()?;
//! println!("{}", ctx.events.summary());
//! # Ok::<(), shadeopt::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`ir`] - the shader, its instructions and the [`ir::Builder`]
//! - [`analysis`] - dominance, register definitions, output dependencies
//! - [`compiler`] - passes, options, the scheduler and the event log
//! - [`utils`] - bit manipulation helpers and a dense bit set
//! - [`prelude`] - the commonly used types in one import
//! - [`Error`] and [`Result`] - error handling
//!
//! ## Error Handling
//!
//! Conditions a caller can react to (invalid shaders, resource limits,
//! operations the interpreter does not model) are returned as [`Error`].
//! Broken preconditions of the mutation API, such as removing an instruction
//! whose result is still read, are programming errors and panic.

#[macro_use]
pub(crate) mod error;

pub mod analysis;
pub mod compiler;
pub mod ir;
pub mod prelude;
pub mod utils;

#[cfg(test)]
mod test;

pub use error::Error;

/// The result type used throughout `shadeopt`.
pub type Result<T> = std::result::Result<T, Error>;
