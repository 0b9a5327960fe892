use thiserror::Error;

pub type SealdropResult<T> = Result<T, SealdropError>;

/// Error taxonomy for the transfer pipeline.
///
/// Only `Transport` errors are retryable. `Authentication` is always fatal to
/// the stream it occurred on: a forged or corrupted frame cannot be salvaged
/// and retrying on the same bytes cannot change the outcome.
#[derive(Debug, Error)]
pub enum SealdropError {
    /// Transient transport failure (network error, remote 5xx). Retried up to
    /// the attempt budget, then escalated.
    #[error("transport error: {0}")]
    Transport(String),

    /// AEAD tag mismatch. Never retried, no partial plaintext is emitted.
    #[error("authentication failed: frame tag mismatch")]
    Authentication,

    /// Contract violation detected before or during a session (missing
    /// metadata, part-count mismatch, truncated stream, gap in part numbers).
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// Cooperative cancellation. Not a failure: outstanding work settles and
    /// remote cleanup is attempted before this is returned.
    #[error("transfer cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SealdropError {
    /// Whether the retry loop may absorb this error.
    pub fn is_transient(&self) -> bool {
        matches!(self, SealdropError::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transport_is_transient() {
        assert!(SealdropError::Transport("503".into()).is_transient());
        assert!(!SealdropError::Authentication.is_transient());
        assert!(!SealdropError::Protocol("gap".into()).is_transient());
        assert!(!SealdropError::Cancelled.is_transient());
    }
}
