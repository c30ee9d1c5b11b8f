use sentinel_node_client::{BlockHash, NodeClientError};
use thiserror::Error;

use crate::Method;

/// Errors returned by the mock client.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MockError {
    /// The subscription was cancelled.
    #[error("cancelled")]
    Cancelled,

    /// The stream was dropped by the scripted session.
    #[error("disconnected")]
    Disconnected,

    /// A failure injected with `fail_next`.
    #[error("injected failure in {0:?}")]
    Injected(Method),

    /// The block is not part of the scripted chain.
    #[error("unknown block {0}")]
    UnknownBlock(BlockHash),
}

impl NodeClientError for MockError {
    fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
