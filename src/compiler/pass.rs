//! Shader pass trait.

use crate::{compiler::context::CompilerContext, ir::Shader, Result};

/// A transformation over a single shader.
///
/// Passes are stateless between shaders: the same pass object runs on many
/// shaders, possibly on several threads at once, so `run` takes `&self`.
/// Anything a pass needs from its surroundings comes from the
/// [`CompilerContext`].
///
/// # Contract
///
/// - `run` returns `Ok(true)` exactly when it changed the shader.
/// - Passes are idempotent: running a pass twice in a row with nothing in
///   between reports no change the second time.
/// - Every change goes through the shader's mutation API, so use sets and
///   cached analyses stay consistent.
/// - Broken preconditions (removing a used instruction, malformed operands)
///   are bugs and panic; errors are reserved for conditions a caller can act
///   on.
pub trait ShaderPass: Send + Sync {
    /// Short identifier used in events and diagnostics.
    fn name(&self) -> &'static str;

    /// Returns a description of what this pass does.
    fn description(&self) -> &'static str {
        "No description available"
    }

    /// Whether the pass applies to `shader` at all.
    ///
    /// Called before [`ShaderPass::run`]; the default runs on every shader.
    fn should_run(&self, _shader: &Shader, _ctx: &CompilerContext) -> bool {
        true
    }

    /// Runs the pass on one shader.
    ///
    /// # Errors
    ///
    /// Returns an error when the pass cannot complete, e.g. because the
    /// shader uses something the pass does not support.
    fn run(&self, shader: &mut Shader, ctx: &CompilerContext) -> Result<bool>;

    /// Called once before the pass runs over a batch of shaders.
    ///
    /// # Errors
    ///
    /// Returns an error if the pass cannot be set up.
    fn initialize(&mut self, _ctx: &CompilerContext) -> Result<()> {
        Ok(())
    }

    /// Called once after the pass ran over a batch of shaders.
    ///
    /// # Errors
    ///
    /// Returns an error if the pass cannot be torn down.
    fn finalize(&mut self, _ctx: &CompilerContext) -> Result<()> {
        Ok(())
    }
}
