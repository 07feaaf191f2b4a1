use core::fmt;

use crate::hierarchy::ValidationReport;

/// Result alias for `clade`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by hierarchy construction, clustering, and aggregation.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Input was empty.
    EmptyInput,

    /// Shape mismatch (string description).
    ShapeMismatch {
        /// Expected shape description.
        expected: String,
        /// Actual shape description.
        actual: String,
    },

    /// Invalid parameter value.
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Error message.
        message: &'static str,
    },

    /// The supplied hierarchy is not a well-formed rooted tree.
    InvalidStructure {
        /// Issues found during structural validation.
        report: ValidationReport,
    },

    /// The greedy splitter stopped making progress before reaching the
    /// requested group count (pruning kept cancelling splits).
    Stalled {
        /// Number of iterations attempted.
        iterations: usize,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::EmptyInput => write!(f, "empty input provided"),
            Error::ShapeMismatch { expected, actual } => {
                write!(f, "shape mismatch: expected {expected}, actual {actual}")
            }
            Error::InvalidParameter { name, message } => {
                write!(f, "invalid parameter '{name}': {message}")
            }
            Error::InvalidStructure { report } => {
                write!(f, "malformed hierarchy: {report}")
            }
            Error::Stalled { iterations } => {
                write!(f, "splitter stalled after {iterations} iterations")
            }
        }
    }
}

impl std::error::Error for Error {}
