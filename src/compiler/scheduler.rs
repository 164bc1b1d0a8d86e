//! Pass scheduler for orchestrating shader pass execution.
//!
//! The `PassScheduler` runs passes in a phased pipeline. Each phase runs to
//! fixpoint with normalization after every change; the whole pipeline is
//! repeated until nothing changes, and the late passes run once at the end.

use rayon::prelude::*;

use crate::{
    compiler::{
        context::CompilerContext,
        events::EventKind,
        options::CompilerOptions,
        pass::ShaderPass,
        passes::{
            CopyPropagationPass, DeadCodePass, InsertLoadRegPass, LowerAluPass, LowerAtanPass,
            LowerLoadRegPass, OptSelectPass,
        },
    },
    ir::Shader,
    Error, Result,
};

/// Orchestrates pass execution in a phased pipeline.
///
/// 1. **Lowering**: replaces operations the target lacks + normalize
/// 2. **Optimization**: peepholes + normalize
///
/// Each phase runs to fixpoint (until no more changes) before proceeding.
/// The two phases are repeated until global fixpoint or max iterations, then
/// the **late** passes run once each, in order. Late passes are the ones
/// that would undo each other inside a fixpoint loop, such as inserting
/// register loads and expanding them into moves.
///
/// Shaders are independent: every pass runs over all shaders in parallel,
/// each shader owned by one worker for the duration of the pass.
#[allow(clippy::struct_field_names)]
pub struct PassScheduler {
    /// Maximum iterations for the entire pipeline.
    max_iterations: usize,
    /// Number of stable iterations before stopping.
    stable_iterations: usize,
    /// Maximum iterations for a single phase before moving on.
    max_phase_iterations: usize,
    /// Phase 1: lowering of unsupported operations.
    pub lower: Vec<Box<dyn ShaderPass>>,
    /// Phase 2: peephole optimization.
    pub optimize: Vec<Box<dyn ShaderPass>>,
    /// Normalization passes (copy propagation, DCE).
    /// Run after each phase to clean up before the next.
    pub normalize: Vec<Box<dyn ShaderPass>>,
    /// Passes run once after the pipeline, in order.
    pub late: Vec<Box<dyn ShaderPass>>,
}

impl Default for PassScheduler {
    fn default() -> Self {
        Self::new(5, 2, 15)
    }
}

impl PassScheduler {
    /// Creates a new scheduler with the specified iteration limits and no passes.
    ///
    /// # Arguments
    ///
    /// * `max_iterations` - Maximum iterations for the entire pipeline before stopping.
    /// * `stable_iterations` - Stop early if no changes for this many iterations.
    /// * `max_phase_iterations` - Maximum iterations for a single phase before moving on.
    #[must_use]
    pub fn new(
        max_iterations: usize,
        stable_iterations: usize,
        max_phase_iterations: usize,
    ) -> Self {
        Self {
            max_iterations,
            stable_iterations,
            max_phase_iterations,
            lower: Vec::new(),
            optimize: Vec::new(),
            normalize: Vec::new(),
            late: Vec::new(),
        }
    }

    /// Creates an empty scheduler with the iteration limits of `options`.
    #[must_use]
    pub fn with_options(options: &CompilerOptions) -> Self {
        Self::new(
            options.max_iterations,
            options.stable_iterations,
            options.max_phase_iterations,
        )
    }

    /// Creates a scheduler populated with every built-in pass.
    ///
    /// Which lowerings actually fire is decided per run from the context's
    /// options, so the same scheduler serves any target.
    #[must_use]
    pub fn standard(options: &CompilerOptions) -> Self {
        let mut scheduler = Self::with_options(options);
        scheduler.lower = vec![Box::new(LowerAtanPass::new()), Box::new(LowerAluPass::new())];
        scheduler.optimize = vec![Box::new(OptSelectPass::new())];
        scheduler.normalize = vec![
            Box::new(CopyPropagationPass::new()),
            Box::new(DeadCodePass::new()),
        ];
        scheduler.late = vec![
            Box::new(InsertLoadRegPass::new()),
            Box::new(LowerLoadRegPass::new()),
        ];
        scheduler
    }

    /// Total number of registered passes.
    #[must_use]
    pub fn pass_count(&self) -> usize {
        self.lower.len() + self.optimize.len() + self.normalize.len() + self.late.len()
    }

    /// Runs normalization passes until no more changes occur.
    fn normalize_to_fixpoint(
        ctx: &CompilerContext,
        passes: &mut [Box<dyn ShaderPass>],
        max_phase_iterations: usize,
        shaders: &mut [Shader],
    ) -> Result<bool> {
        let mut any_changed = false;

        for _ in 0..max_phase_iterations {
            if !Self::run_passes_once(ctx, passes, shaders)? {
                break;
            }
            any_changed = true;
        }

        Ok(any_changed)
    }

    /// Runs a phase to fixpoint: execute phase passes, then normalize until stable.
    fn phase_to_fixpoint(
        ctx: &CompilerContext,
        phase_passes: &mut [Box<dyn ShaderPass>],
        normalize_passes: &mut [Box<dyn ShaderPass>],
        max_phase_iterations: usize,
        shaders: &mut [Shader],
    ) -> Result<bool> {
        if phase_passes.is_empty() {
            return Ok(false);
        }

        let mut phase_changed = false;

        for _ in 0..max_phase_iterations {
            if !Self::run_passes_once(ctx, phase_passes, shaders)? {
                break;
            }

            phase_changed = true;

            // Cleanup can expose new opportunities for the phase passes
            if !normalize_passes.is_empty() {
                Self::normalize_to_fixpoint(ctx, normalize_passes, max_phase_iterations, shaders)?;
            }
        }

        Ok(phase_changed)
    }

    /// Runs all passes once over all shaders.
    ///
    /// Returns `true` if any pass made changes to any shader.
    fn run_passes_once(
        ctx: &CompilerContext,
        passes: &mut [Box<dyn ShaderPass>],
        shaders: &mut [Shader],
    ) -> Result<bool> {
        for pass in passes.iter_mut() {
            pass.initialize(ctx)?;
        }

        let mut any_changed = false;
        for pass in passes.iter() {
            let pass = pass.as_ref();
            let changed = shaders
                .par_iter_mut()
                .map(|shader| Self::run_on_shader(pass, shader, ctx))
                .try_reduce(|| false, |a, b| Ok(a || b))?;
            any_changed |= changed;
        }

        for pass in passes.iter_mut() {
            pass.finalize(ctx)?;
        }

        Ok(any_changed)
    }

    /// Runs one pass on one shader and checks the result against the limits.
    fn run_on_shader(
        pass: &dyn ShaderPass,
        shader: &mut Shader,
        ctx: &CompilerContext,
    ) -> Result<bool> {
        if !pass.should_run(shader, ctx) {
            return Ok(false);
        }

        ctx.events
            .record(EventKind::PassStarted)
            .shader(shader.name())
            .pass(pass.name());

        let changed = pass.run(shader, ctx)?;

        if changed {
            Self::check_limits(pass, shader, &ctx.options)?;
            if ctx.options.validate_passes {
                if let Err(e) = shader.validate() {
                    ctx.events
                        .record(EventKind::Error)
                        .shader(shader.name())
                        .pass(pass.name())
                        .message(format!("invalid after {}: {e}", pass.name()));
                    return Err(e);
                }
                ctx.events
                    .record(EventKind::ShaderValidated)
                    .shader(shader.name())
                    .pass(pass.name());
            }
        }

        ctx.events
            .record(EventKind::PassCompleted)
            .shader(shader.name())
            .pass(pass.name())
            .message(if changed { "changed" } else { "unchanged" });

        Ok(changed)
    }

    fn check_limits(
        pass: &dyn ShaderPass,
        shader: &Shader,
        options: &CompilerOptions,
    ) -> Result<()> {
        let checks = [
            ("instructions", shader.num_instructions(), options.max_instructions),
            ("values", shader.value_capacity(), options.max_values),
        ];
        for (what, count, limit) in checks {
            if count > limit {
                return Err(Error::ResourceExhausted {
                    pass: pass.name().to_string(),
                    what,
                    count,
                    limit,
                });
            }
        }
        Ok(())
    }

    /// Runs the complete pipeline over a batch of independent shaders.
    ///
    /// Executes the lowering and optimization phases to fixpoint, repeating
    /// the pipeline until no phase makes changes or `max_iterations` is
    /// reached, then runs the late passes once.
    ///
    /// # Returns
    ///
    /// The number of iterations completed. Events are accumulated in `ctx.events`.
    ///
    /// # Errors
    ///
    /// Returns an error if any pass fails, a shader exceeds the configured
    /// resource limits, or (with validation enabled) a pass leaves a shader
    /// invalid.
    pub fn run_all(&mut self, ctx: &CompilerContext, shaders: &mut [Shader]) -> Result<usize> {
        let mut stable_count = 0;
        let mut iterations = 0;
        let max_phase = self.max_phase_iterations;

        for iteration in 0..self.max_iterations {
            iterations = iteration + 1;
            let mut iteration_changed = false;

            if Self::phase_to_fixpoint(
                ctx,
                &mut self.lower,
                &mut self.normalize,
                max_phase,
                shaders,
            )? {
                iteration_changed = true;
            }

            if Self::phase_to_fixpoint(
                ctx,
                &mut self.optimize,
                &mut self.normalize,
                max_phase,
                shaders,
            )? {
                iteration_changed = true;
            }

            // Normalization runs even if no phase pass fired
            if iteration == 0 && !iteration_changed && !self.normalize.is_empty() {
                iteration_changed =
                    Self::normalize_to_fixpoint(ctx, &mut self.normalize, max_phase, shaders)?;
            }

            if iteration_changed {
                stable_count = 0;
            } else {
                stable_count += 1;
                if stable_count >= self.stable_iterations {
                    break;
                }
            }
        }

        for pass in &mut self.late {
            Self::run_passes_once(ctx, std::slice::from_mut(pass), shaders)?;
        }

        Ok(iterations)
    }

    /// Runs the complete pipeline over a single shader.
    ///
    /// # Errors
    ///
    /// See [`PassScheduler::run_all`].
    pub fn run(&mut self, ctx: &CompilerContext, shader: &mut Shader) -> Result<usize> {
        self.run_all(ctx, std::slice::from_mut(shader))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::{
        compiler::{
            CompilerContext, CompilerOptions, EventKind, PassScheduler, ShaderPass,
        },
        ir::{Builder, Cursor, Shader, ShaderStage},
        Error, Result,
    };

    /// Makes `changes` changes per shader, then reports a fixpoint.
    struct TestPass {
        name: &'static str,
        changes_to_make: usize,
        runs: AtomicUsize,
    }

    impl TestPass {
        fn new(name: &'static str, changes: usize) -> Self {
            Self {
                name,
                changes_to_make: changes,
                runs: AtomicUsize::new(0),
            }
        }
    }

    impl ShaderPass for TestPass {
        fn name(&self) -> &'static str {
            self.name
        }

        fn run(&self, shader: &mut Shader, ctx: &CompilerContext) -> Result<bool> {
            let run = self.runs.fetch_add(1, Ordering::Relaxed);
            let changed = run < self.changes_to_make;
            if changed {
                ctx.events
                    .record(EventKind::InstructionLowered)
                    .at(shader.name(), run)
                    .message("test");
            }
            Ok(changed)
        }
    }

    /// Appends one constant per run, without end.
    struct GrowPass;

    impl ShaderPass for GrowPass {
        fn name(&self) -> &'static str {
            "grow"
        }

        fn run(&self, shader: &mut Shader, _ctx: &CompilerContext) -> Result<bool> {
            let entry = shader.entry();
            Builder::new(shader, Cursor::BlockEnd(entry)).imm_int(1, 32);
            Ok(true)
        }
    }

    fn shader(name: &str) -> Shader {
        Shader::new(name, ShaderStage::Fragment)
    }

    #[test]
    fn test_scheduler_iteration_limits() {
        let scheduler = PassScheduler::new(10, 3, 5);
        assert_eq!(scheduler.max_iterations, 10);
        assert_eq!(scheduler.stable_iterations, 3);
        assert_eq!(scheduler.max_phase_iterations, 5);
    }

    #[test]
    fn test_default_scheduler() {
        let scheduler = PassScheduler::default();
        assert_eq!(scheduler.max_iterations, 5);
        assert_eq!(scheduler.stable_iterations, 2);
        assert_eq!(scheduler.max_phase_iterations, 15);
        assert_eq!(scheduler.pass_count(), 0);
    }

    #[test]
    fn test_standard_pipeline() {
        let scheduler = PassScheduler::standard(&CompilerOptions::default());
        let names: Vec<_> = scheduler
            .lower
            .iter()
            .chain(&scheduler.optimize)
            .chain(&scheduler.normalize)
            .chain(&scheduler.late)
            .map(|p| p.name())
            .collect();
        assert_eq!(
            names,
            [
                "lower_atan",
                "lower_alu",
                "opt_select",
                "copy_prop",
                "dce",
                "insert_load_reg",
                "lower_load_reg"
            ]
        );
    }

    #[test]
    fn test_pipeline_reaches_fixpoint() -> Result<()> {
        let ctx = CompilerContext::default();
        let mut scheduler = PassScheduler::new(10, 2, 15);
        scheduler.lower.push(Box::new(TestPass::new("lower", 3)));

        let mut s = shader("fix");
        let iterations = scheduler.run(&ctx, &mut s)?;

        // One changing iteration, then two stable ones.
        assert_eq!(iterations, 3);
        assert_eq!(ctx.events.count_kind(EventKind::InstructionLowered), 3);
        assert!(ctx.events.has(EventKind::PassCompleted));
        Ok(())
    }

    #[test]
    fn test_phase_iteration_cap() -> Result<()> {
        let ctx = CompilerContext::default();
        let mut scheduler = PassScheduler::new(1, 1, 4);
        scheduler.lower.push(Box::new(TestPass::new("busy", 100)));

        scheduler.run(&ctx, &mut shader("cap"))?;
        assert_eq!(ctx.events.count_kind(EventKind::InstructionLowered), 4);
        Ok(())
    }

    #[test]
    fn test_late_passes_run_once() -> Result<()> {
        let ctx = CompilerContext::default();
        let mut scheduler = PassScheduler::new(3, 1, 5);
        scheduler.late.push(Box::new(TestPass::new("late", 10)));

        scheduler.run(&ctx, &mut shader("late"))?;
        assert_eq!(ctx.events.count_kind(EventKind::InstructionLowered), 1);
        Ok(())
    }

    #[test]
    fn test_runs_every_shader() -> Result<()> {
        let ctx = CompilerContext::default();
        let mut scheduler = PassScheduler::new(1, 1, 1);
        scheduler.late.push(Box::new(TestPass::new("each", 100)));

        let mut shaders: Vec<_> = (0..8).map(|i| shader(&format!("s{i}"))).collect();
        scheduler.run_all(&ctx, &mut shaders)?;
        assert_eq!(ctx.events.shaders_affected(), 8);
        Ok(())
    }

    #[test]
    fn test_instruction_limit() {
        let ctx = CompilerContext::new(CompilerOptions::default().with_max_instructions(3));
        let mut scheduler = PassScheduler::new(1, 1, 10);
        scheduler.lower.push(Box::new(GrowPass));

        let err = scheduler.run(&ctx, &mut shader("grow")).unwrap_err();
        match err {
            Error::ResourceExhausted {
                pass, what, count, limit,
            } => {
                assert_eq!(pass, "grow");
                assert_eq!(what, "instructions");
                assert_eq!(count, 4);
                assert_eq!(limit, 3);
            }
            other => panic!("unexpected error {other}"),
        }
    }

    /// Reads a value nothing produces.
    struct BreakPass;

    impl ShaderPass for BreakPass {
        fn name(&self) -> &'static str {
            "break"
        }

        fn run(&self, shader: &mut Shader, _ctx: &CompilerContext) -> Result<bool> {
            let orphan = shader.create_value(32, 1);
            let entry = shader.entry();
            Builder::new(shader, Cursor::BlockEnd(entry)).mov(orphan);
            Ok(true)
        }
    }

    #[test]
    fn test_validation_after_each_pass() {
        let ctx = CompilerContext::new(CompilerOptions::default().with_validation(true));
        let mut scheduler = PassScheduler::new(1, 1, 1);
        scheduler.lower.push(Box::new(TestPass::new("fine", 1)));
        scheduler.lower.push(Box::new(BreakPass));

        let err = scheduler.run(&ctx, &mut shader("broken")).unwrap_err();
        assert!(matches!(err, Error::ValidationFailed(_)), "{err}");
        let error = ctx.events.errors().next().unwrap();
        assert_eq!(error.pass.as_deref(), Some("break"));
        assert!(error.message.starts_with("invalid after break"));
        assert_eq!(ctx.events.count_kind(EventKind::ShaderValidated), 1);
    }
}
