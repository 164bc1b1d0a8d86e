use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Violations of the IR's own preconditions (removing an instruction whose result is still
/// used, replacing a value with one of a different shape, inserting a phi after a non-phi)
/// are programming errors and panic instead. Everything a caller can meaningfully react to
/// is reported through this enum.
///
/// # Error Categories
///
/// ## Input Errors
/// - [`Error::Malformed`] - A shader handed to the library is structurally broken
/// - [`Error::ValidationFailed`] - [`crate::ir::Shader::validate`] found a broken invariant
/// - [`Error::Unsupported`] - An operation is not implemented for the given input
///
/// ## Pipeline Errors
/// - [`Error::ResourceExhausted`] - A pass grew the shader past the configured limits
/// - [`Error::EvaluationLimit`] - The reference interpreter ran out of steps
///
/// # Examples
///
/// ```rust
/// use shadeopt::{Error, ir::Shader};
///
/// let shader = Shader::new("empty", shadeopt::ir::ShaderStage::Fragment);
/// match shader.validate() {
///     Ok(()) => println!("valid"),
///     Err(Error::ValidationFailed(reason)) => eprintln!("broken shader: {reason}"),
///     Err(e) => eprintln!("other error: {e}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The shader is damaged and cannot be processed.
    ///
    /// The error includes the source location where the malformation was detected
    /// for debugging purposes.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// A structural invariant of the IR does not hold.
    ///
    /// Produced by shader validation; the message names the first broken
    /// invariant and the ids involved.
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// A pass made the shader exceed a configured resource limit.
    ///
    /// Passes never shrink the budget on their own; the scheduler checks the
    /// instruction and value counts after every pass.
    #[error("Resource limit exceeded after pass '{pass}': {what} {count} > {limit}")]
    ResourceExhausted {
        /// Name of the pass after which the limit was exceeded
        pass: String,
        /// What was counted (instructions, values)
        what: &'static str,
        /// The observed count
        count: usize,
        /// The configured limit
        limit: usize,
    },

    /// The requested operation is not supported for this input.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// The reference interpreter executed more steps than allowed.
    #[error("Evaluation exceeded {0} steps")]
    EvaluationLimit(usize),

    /// Generic error for miscellaneous failures.
    ///
    /// Used for errors that don't fit into other categories, such as a pass
    /// reporting a failure with additional context.
    #[error("{0}")]
    Error(String),
}
