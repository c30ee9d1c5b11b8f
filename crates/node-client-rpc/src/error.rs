use reqwest::StatusCode;
use sentinel_node_client::NodeClientError;
use thiserror::Error;

/// Result type for the RPC client.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to the node RPC.
#[derive(Debug, Error)]
pub enum Error {
    /// The request or subscription was cancelled.
    #[error("cancelled")]
    Cancelled,

    /// Transport-level failure.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The response body could not be decoded.
    #[error("decode error: {0}")]
    Json(#[from] serde_json::Error),

    /// The node answered with a non-success status.
    #[error("unexpected status {status}: {body}")]
    Status {
        /// HTTP status.
        status: StatusCode,
        /// Response body, for diagnostics.
        body: String,
    },

    /// A streaming response ended.
    #[error("stream closed by the node")]
    StreamClosed,

    /// An endpoint URL could not be built.
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}

impl NodeClientError for Error {
    fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
