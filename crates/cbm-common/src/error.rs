use thiserror::Error;

/// Error types covering configuration, drive transport, and output failures.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CbmError {
    /// Invalid measurement parameters, detected before the drive is touched.
    #[error("configuration error: {0}")]
    Config(String),

    /// A transport call to the drive did not report success.
    #[error("transport error during {operation}: {detail}")]
    Transport {
        /// The transport operation that failed.
        operation: &'static str,
        /// Description of the failure.
        detail: String,
    },

    /// Upload or download moved fewer bytes than requested.
    #[error("short transfer at ${address:04x}: expected {expected} bytes, got {actual}")]
    ShortTransfer {
        /// Drive memory address of the transfer.
        address: u16,
        /// Number of bytes requested.
        expected: usize,
        /// Number of bytes actually transferred.
        actual: usize,
    },

    /// Writing measurement output failed.
    #[error("I/O error: {0}")]
    Io(String),

    /// The run was interrupted by a signal.
    #[error("interrupted")]
    Interrupted,
}

impl CbmError {
    /// Shorthand for a [`CbmError::Transport`] error.
    pub fn transport(operation: &'static str, detail: impl Into<String>) -> Self {
        Self::Transport {
            operation,
            detail: detail.into(),
        }
    }
}

impl From<std::io::Error> for CbmError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Convenience type alias for drive operations.
pub type CbmResult<T> = Result<T, CbmError>;
