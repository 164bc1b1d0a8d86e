//! Compiler options.
//!
//! [`CompilerOptions`] collects the target capabilities consulted by the
//! lowering passes and the limits enforced by the
//! [`PassScheduler`](crate::compiler::PassScheduler). Options are read-only
//! while passes run.

use crate::ir::REG_SIZE;

/// Target capabilities and pipeline limits.
///
/// # Examples
///
/// ```rust
/// use shadeopt::compiler::CompilerOptions;
///
/// let options = CompilerOptions::new()
///     .with_lower_bit_count(true)
///     .with_max_iterations(4);
/// assert!(options.lower_bit_count);
/// assert!(!options.lower_bitfield_reverse);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerOptions {
    /// Replace `bitfield_reverse` with a shift-and-mask sequence.
    pub lower_bitfield_reverse: bool,

    /// Replace `bit_count` with a SWAR popcount sequence.
    pub lower_bit_count: bool,

    /// Replace `imul_high`/`umul_high` with a wide multiply sequence.
    pub lower_mul_high: bool,

    /// Replace `fmin`/`fmax` that must preserve the sign of zero with a
    /// select over the integer min/max of the bit patterns.
    pub lower_fminmax_signed_zero: bool,

    /// The target has native `atan`/`atan2`; suppresses their lowering.
    pub has_atan: bool,

    /// Maximum iterations of the whole pipeline.
    ///
    /// Default: 5
    pub max_iterations: usize,

    /// Stop after this many consecutive iterations without changes.
    ///
    /// Default: 2
    pub stable_iterations: usize,

    /// Maximum iterations of a single phase before moving on.
    ///
    /// Default: 15
    pub max_phase_iterations: usize,

    /// A pass that leaves more live instructions than this fails the
    /// compilation with [`Error::ResourceExhausted`](crate::Error::ResourceExhausted).
    ///
    /// Default: 1 << 20
    pub max_instructions: usize,

    /// Limit on allocated values, checked like `max_instructions`.
    ///
    /// Default: 1 << 22
    pub max_values: usize,

    /// Validate the shader after every pass that reports a change.
    ///
    /// Default: on in debug builds.
    pub validate_passes: bool,

    /// Size of a general register in bytes. A single move never copies
    /// more than two registers.
    ///
    /// Default: 32
    pub grf_size: u32,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            lower_bitfield_reverse: false,
            lower_bit_count: false,
            lower_mul_high: false,
            lower_fminmax_signed_zero: false,
            has_atan: false,
            max_iterations: 5,
            stable_iterations: 2,
            max_phase_iterations: 15,
            max_instructions: 1 << 20,
            max_values: 1 << 22,
            validate_passes: cfg!(debug_assertions),
            grf_size: REG_SIZE,
        }
    }
}

impl CompilerOptions {
    /// Creates options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Options for a target without any of the optional ALU instructions:
    /// every lowering is enabled.
    #[must_use]
    pub fn software() -> Self {
        Self {
            lower_bitfield_reverse: true,
            lower_bit_count: true,
            lower_mul_high: true,
            lower_fminmax_signed_zero: true,
            has_atan: false,
            ..Self::default()
        }
    }

    /// Options for a target implementing every optional instruction natively.
    #[must_use]
    pub fn native() -> Self {
        Self {
            has_atan: true,
            ..Self::default()
        }
    }

    /// Sets whether `bitfield_reverse` is lowered.
    #[must_use]
    pub fn with_lower_bitfield_reverse(mut self, lower: bool) -> Self {
        self.lower_bitfield_reverse = lower;
        self
    }

    /// Sets whether `bit_count` is lowered.
    #[must_use]
    pub fn with_lower_bit_count(mut self, lower: bool) -> Self {
        self.lower_bit_count = lower;
        self
    }

    /// Sets whether the high-multiply ops are lowered.
    #[must_use]
    pub fn with_lower_mul_high(mut self, lower: bool) -> Self {
        self.lower_mul_high = lower;
        self
    }

    /// Sets whether signed-zero preserving min/max is lowered.
    #[must_use]
    pub fn with_lower_fminmax_signed_zero(mut self, lower: bool) -> Self {
        self.lower_fminmax_signed_zero = lower;
        self
    }

    /// Sets whether the target has native arc tangent.
    #[must_use]
    pub fn with_has_atan(mut self, has_atan: bool) -> Self {
        self.has_atan = has_atan;
        self
    }

    /// Sets the maximum pipeline iterations.
    #[must_use]
    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    /// Sets the number of stable iterations that ends the pipeline early.
    #[must_use]
    pub fn with_stable_iterations(mut self, stable: usize) -> Self {
        self.stable_iterations = stable;
        self
    }

    /// Sets the maximum iterations per phase.
    #[must_use]
    pub fn with_max_phase_iterations(mut self, max: usize) -> Self {
        self.max_phase_iterations = max;
        self
    }

    /// Sets the live instruction limit.
    #[must_use]
    pub fn with_max_instructions(mut self, max: usize) -> Self {
        self.max_instructions = max;
        self
    }

    /// Sets the value allocation limit.
    #[must_use]
    pub fn with_max_values(mut self, max: usize) -> Self {
        self.max_values = max;
        self
    }

    /// Enables or disables validation after each changing pass.
    #[must_use]
    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate_passes = validate;
        self
    }

    /// Sets the general register size in bytes.
    ///
    /// # Panics
    ///
    /// Panics if `bytes` is not a non-zero power of two.
    #[must_use]
    pub fn with_grf_size(mut self, bytes: u32) -> Self {
        assert!(bytes.is_power_of_two(), "register size {bytes} is not a power of two");
        self.grf_size = bytes;
        self
    }

    /// Largest number of bytes a single move may copy.
    #[must_use]
    pub fn max_move_bytes(&self) -> u32 {
        2 * self.grf_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = CompilerOptions::default();
        assert!(!options.has_atan);
        assert!(!options.lower_bit_count);
        assert_eq!(options.max_iterations, 5);
        assert_eq!(options.stable_iterations, 2);
        assert_eq!(options.max_phase_iterations, 15);
        assert_eq!(options.validate_passes, cfg!(debug_assertions));
        assert_eq!(options.max_move_bytes(), 64);
    }

    #[test]
    fn test_presets() {
        let sw = CompilerOptions::software();
        assert!(sw.lower_bitfield_reverse && sw.lower_bit_count && sw.lower_mul_high);
        assert!(sw.lower_fminmax_signed_zero && !sw.has_atan);

        let hw = CompilerOptions::native();
        assert!(hw.has_atan && !hw.lower_mul_high);
    }

    #[test]
    fn test_builder_chain() {
        let options = CompilerOptions::new()
            .with_has_atan(true)
            .with_max_instructions(10)
            .with_validation(true)
            .with_grf_size(64);
        assert!(options.has_atan);
        assert_eq!(options.max_instructions, 10);
        assert!(options.validate_passes);
        assert_eq!(options.max_move_bytes(), 128);
    }

    #[test]
    #[should_panic(expected = "power of two")]
    fn test_grf_size_must_be_power_of_two() {
        let _ = CompilerOptions::new().with_grf_size(24);
    }
}
