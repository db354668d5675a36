// error.rs — Error taxonomy shared by buffers, streams and dispatchers.
//
// Every failure is a caller contract violation: nothing here is retried.
// Synchronous calls return the error at the offending call; stream work
// hands it to the next `Stream::wait_for_completion` (or to the
// `PendingDownload` that owns the failing transfer).

use thiserror::Error;

use crate::mat::MatType;

/// Errors raised by device buffers, streams and image operations.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// The device memory budget cannot hold the requested allocation.
    #[error("device allocation of {requested} bytes failed ({available} bytes available)")]
    Allocation { requested: usize, available: usize },

    /// Dimensions or element types of paired operands (or of a fixed,
    /// reused buffer) disagree.
    #[error("shape mismatch in {context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        context: &'static str,
        expected: String,
        actual: String,
    },

    /// A dispatcher or function was given an out-of-range tuning value.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// An operation was invoked on a zero-sized buffer.
    #[error("{op}: input buffer is empty")]
    EmptyInput { op: &'static str },

    /// The element type is not supported by the operation, or paired inputs
    /// carry different element types.
    #[error("type mismatch in {op}: expected {expected}, got {actual}")]
    TypeMismatch {
        op: &'static str,
        expected: String,
        actual: MatType,
    },

    /// Backend failure (adapter selection, device request, readback map).
    #[error("device backend error: {0}")]
    Backend(String),

    /// Configuration could not be read or parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// The stream worker could not be started or stopped responding.
    #[error("stream error: {0}")]
    Stream(String),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }

    pub(crate) fn shape(
        context: &'static str,
        expected: impl ToString,
        actual: impl ToString,
    ) -> Self {
        Error::ShapeMismatch {
            context,
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    pub(crate) fn type_mismatch(op: &'static str, expected: impl Into<String>, actual: MatType) -> Self {
        Error::TypeMismatch {
            op,
            expected: expected.into(),
            actual,
        }
    }
}
