use thiserror::Error;

/// Marker trait for errors returned by a node client.
///
/// Cancellation is terminal for the caller; every other error is treated as
/// transient.
pub trait NodeClientError: std::error::Error + Send + Sync + 'static {
    /// Returns `true` if the operation failed because its cancellation token fired.
    fn is_cancelled(&self) -> bool;
}

/// Errors from parsing a base58check identifier.
#[derive(Debug, Error)]
pub enum HashError {
    /// The string is not valid base58check.
    #[error("invalid base58check: {0}")]
    Base58(#[from] bs58::decode::Error),

    /// The payload has the wrong length.
    #[error("invalid payload length: expected {expected}, got {actual}")]
    Length {
        /// Expected payload length.
        expected: usize,
        /// Actual payload length.
        actual: usize,
    },

    /// The version prefix does not match the identifier kind.
    #[error("unexpected prefix for {0}")]
    Prefix(&'static str),
}
