use thiserror::Error;

/// Primary error type for bulklite operations.
///
/// Only sink I/O can fail at runtime. Once any operation has returned an
/// error the database under construction is in an indeterminate state and
/// must be discarded; none of these variants are retryable.
///
/// Misuse of the library (draining a degenerate interior node, page-counter
/// exhaustion, cell bookkeeping corruption) is a programming error and
/// panics instead of surfacing here.
#[derive(Error, Debug)]
pub enum BulkliteError {
    /// I/O error from the output sink.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// I/O error while writing a specific page.
    #[error("I/O error writing page {page}")]
    IoWrite {
        page: u32,
        #[source]
        source: std::io::Error,
    },

    /// Internal logic error (should never happen).
    #[error("internal error: {0}")]
    Internal(String),
}

impl BulkliteError {
    /// Create an internal error from a message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Result alias used throughout bulklite.
pub type Result<T, E = BulkliteError> = std::result::Result<T, E>;
