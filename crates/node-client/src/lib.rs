//! Abstract interface to the blockchain node observed by the monitors.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod hash;
mod types;

pub use error::{HashError, NodeClientError};
pub use hash::{BlockHash, ChainId, ProtocolHash};
pub use types::*;

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

/// A stream of items terminated by at most one error.
pub type Subscription<T, E> = BoxStream<'static, Result<T, E>>;

/// Request/response and streaming accessors of a node.
///
/// Fetch operations carry no timeout of their own; callers bound them. Streams
/// end after yielding an error, and yield a cancellation error once the token
/// passed at subscription time is cancelled.
#[async_trait]
pub trait NodeClient
where
    Self: Clone + Send + Sync + 'static,
{
    /// The error type for the client.
    type Error: NodeClientError;

    /// Fetches hash and protocols of a block.
    async fn basic_block_info(
        &self,
        chain: &ChainId,
        block: &BlockId,
    ) -> Result<BasicBlockInfo, Self::Error>;

    /// Fetches the shell header of a block.
    async fn shell_header(
        &self,
        chain: &ChainId,
        block: &BlockHash,
    ) -> Result<ShellHeader, Self::Error>;

    /// Fetches the constants of `protocol` in the context of a block.
    async fn protocol_constants(
        &self,
        chain: &ChainId,
        block: &BlockHash,
        protocol: &ProtocolHash,
    ) -> Result<ProtocolConstants, Self::Error>;

    /// Fetches the protocol and next protocol of a block.
    async fn block_protocols(
        &self,
        chain: &ChainId,
        block: &BlockHash,
    ) -> Result<BlockProtocols, Self::Error>;

    /// Subscribes to new heads of a chain.
    async fn heads(
        &self,
        chain: &ChainId,
        cancellation_token: CancellationToken,
    ) -> Result<Subscription<Head, Self::Error>, Self::Error>;

    /// Subscribes to batches of operations entering the mempool.
    async fn mempool_operations(
        &self,
        chain: &ChainId,
        cancellation_token: CancellationToken,
    ) -> Result<Subscription<Vec<OperationGroup>, Self::Error>, Self::Error>;

    /// Fetches the bootstrap and sync state.
    async fn bootstrap_state(&self, chain: &ChainId) -> Result<BootstrapStatus, Self::Error>;

    /// Fetches the current peer connections.
    async fn connections(&self) -> Result<Vec<Connection>, Self::Error>;

    /// Fetches a snapshot of the mempool.
    async fn pending_operations(&self, chain: &ChainId) -> Result<PendingOperations, Self::Error>;
}
