//! A scripted, call-recording implementation of `NodeClient`. Used for testing.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::MockError;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::DateTime;
use parking_lot::Mutex;
use sentinel_node_client::{
    BasicBlockInfo, BlockHash, BlockId, BlockProtocols, BootstrapStatus, ChainId, Connection,
    Head, NodeClient, OperationGroup, PendingOperations, ProtocolConstants, ProtocolHash,
    ShellHeader, Subscription, SyncState,
};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Client methods, used to inject failures and count calls.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    /// `basic_block_info`
    BasicBlockInfo,
    /// `shell_header`
    ShellHeader,
    /// `protocol_constants`
    ProtocolConstants,
    /// `block_protocols`
    BlockProtocols,
    /// `heads`
    Heads,
    /// `mempool_operations`
    MempoolOperations,
    /// `bootstrap_state`
    BootstrapState,
    /// `connections`
    Connections,
    /// `pending_operations`
    PendingOperations,
}

/// A recorded client call with its arguments.
#[derive(Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Call {
    BasicBlockInfo {
        chain: ChainId,
        block: BlockId,
    },
    ShellHeader {
        chain: ChainId,
        block: BlockHash,
    },
    ProtocolConstants {
        chain: ChainId,
        block: BlockHash,
        protocol: ProtocolHash,
    },
    BlockProtocols {
        chain: ChainId,
        block: BlockHash,
    },
    Heads {
        chain: ChainId,
    },
    MempoolOperations {
        chain: ChainId,
    },
    BootstrapState {
        chain: ChainId,
    },
    Connections,
    PendingOperations {
        chain: ChainId,
    },
}

impl Call {
    /// Returns the method this call was made to.
    #[must_use]
    pub const fn method(&self) -> Method {
        match self {
            Self::BasicBlockInfo { .. } => Method::BasicBlockInfo,
            Self::ShellHeader { .. } => Method::ShellHeader,
            Self::ProtocolConstants { .. } => Method::ProtocolConstants,
            Self::BlockProtocols { .. } => Method::BlockProtocols,
            Self::Heads { .. } => Method::Heads,
            Self::MempoolOperations { .. } => Method::MempoolOperations,
            Self::BootstrapState { .. } => Method::BootstrapState,
            Self::Connections => Method::Connections,
            Self::PendingOperations { .. } => Method::PendingOperations,
        }
    }
}

/// A block of the scripted chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MockBlock {
    /// Block hash.
    pub hash: BlockHash,
    /// Shell header.
    pub header: ShellHeader,
    /// Protocols of the block.
    pub protocols: BlockProtocols,
    /// Constants in the context of the block.
    pub constants: ProtocolConstants,
}

impl MockBlock {
    /// Creates a block whose hash is derived from `seed`, produced at
    /// `timestamp` seconds since the epoch under `protocol`.
    #[must_use]
    pub fn new(
        seed: u8,
        proto: u8,
        timestamp: i64,
        protocol: ProtocolHash,
        minimal_block_delay: u64,
    ) -> Self {
        Self {
            hash: mock_block_hash(seed),
            header: ShellHeader {
                level: i32::from(seed),
                proto,
                predecessor: mock_block_hash(seed.wrapping_sub(1)),
                timestamp: DateTime::from_timestamp(timestamp, 0).unwrap_or_default(),
            },
            protocols: BlockProtocols {
                protocol,
                next_protocol: protocol,
            },
            constants: ProtocolConstants {
                minimal_block_delay,
            },
        }
    }

    /// Sets the next protocol of the block.
    #[must_use]
    pub const fn with_next_protocol(mut self, next_protocol: ProtocolHash) -> Self {
        self.protocols.next_protocol = next_protocol;
        self
    }

    /// Returns the block as announced on the heads stream.
    #[must_use]
    pub fn head(&self) -> Head {
        Head {
            hash: self.hash,
            header: self.header.clone(),
        }
    }
}

/// Returns a block hash whose first payload byte is `seed`.
#[must_use]
pub fn mock_block_hash(seed: u8) -> BlockHash {
    let mut bytes = [0u8; 32];
    bytes[0] = seed;
    BlockHash::new(bytes)
}

/// Returns a protocol hash whose first payload byte is `seed`.
#[must_use]
pub fn mock_protocol_hash(seed: u8) -> ProtocolHash {
    let mut bytes = [0u8; 32];
    bytes[0] = seed;
    ProtocolHash::new(bytes)
}

/// A scripted step of a mempool subscription.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MempoolEvent {
    /// Deliver a batch of operation groups.
    Batch(Vec<OperationGroup>),
    /// Terminate the stream with an error.
    Disconnect,
}

/// Calls to let through before failing, then calls to fail.
#[derive(Debug, Default)]
struct Failures {
    skip: usize,
    remaining: usize,
}

#[derive(Debug)]
struct State {
    blocks: Vec<MockBlock>,
    head: usize,
    calls: Vec<Call>,
    failures: HashMap<Method, Failures>,
    bootstrap: BootstrapStatus,
    connections: Vec<Connection>,
    pending_operations: PendingOperations,
    mempool_sessions: VecDeque<Vec<MempoolEvent>>,
}

impl State {
    fn record(&mut self, call: Call) -> Result<(), MockError> {
        let method = call.method();
        self.calls.push(call);

        match self.failures.get_mut(&method) {
            Some(failures) if failures.skip > 0 => {
                failures.skip -= 1;
                Ok(())
            }
            Some(failures) if failures.remaining > 0 => {
                failures.remaining -= 1;
                Err(MockError::Injected(method))
            }
            _ => Ok(()),
        }
    }

    fn block(&self, id: &BlockId) -> Result<&MockBlock, MockError> {
        match id {
            BlockId::Head => self
                .blocks
                .get(self.head)
                .ok_or(MockError::UnknownBlock(BlockHash::default())),
            BlockId::Hash(hash) => self
                .blocks
                .iter()
                .find(|block| &block.hash == hash)
                .ok_or(MockError::UnknownBlock(*hash)),
        }
    }
}

/// A mock implementation of the `NodeClient` trait. Used for testing.
///
/// The first block is the head at construction time; every heads
/// subscription announces the blocks after the current head, advancing it,
/// then stays open until cancelled.
#[derive(Clone, Debug)]
pub struct MockNodeClient {
    state: Arc<Mutex<State>>,
    heads_exhausted: Arc<watch::Sender<usize>>,
    mempool_drained: Arc<watch::Sender<usize>>,
}

impl MockNodeClient {
    /// Creates a client over a scripted chain.
    #[must_use]
    pub fn new(blocks: Vec<MockBlock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                blocks,
                head: 0,
                calls: Vec::new(),
                failures: HashMap::new(),
                bootstrap: BootstrapStatus {
                    bootstrapped: true,
                    sync_state: SyncState::Synced,
                },
                connections: Vec::new(),
                pending_operations: PendingOperations::default(),
                mempool_sessions: VecDeque::new(),
            })),
            heads_exhausted: Arc::new(watch::channel(0).0),
            mempool_drained: Arc::new(watch::channel(0).0),
        }
    }

    /// Makes the next `times` calls to `method` fail.
    pub fn fail_next(&self, method: Method, times: usize) {
        self.state
            .lock()
            .failures
            .entry(method)
            .or_default()
            .remaining += times;
    }

    /// Lets the next `calls` calls to `method` succeed, then makes the
    /// following `times` calls fail.
    pub fn fail_after(&self, method: Method, calls: usize, times: usize) {
        let mut state = self.state.lock();
        let failures = state.failures.entry(method).or_default();
        failures.skip = calls;
        failures.remaining += times;
    }

    /// Sets the bootstrap state returned from now on.
    pub fn set_bootstrap_state(&self, status: BootstrapStatus) {
        self.state.lock().bootstrap = status;
    }

    /// Sets the connections returned from now on.
    pub fn set_connections(&self, connections: Vec<Connection>) {
        self.state.lock().connections = connections;
    }

    /// Sets the mempool snapshot returned from now on.
    pub fn set_pending_operations(&self, pending_operations: PendingOperations) {
        self.state.lock().pending_operations = pending_operations;
    }

    /// Queues the script for the next mempool subscription.
    pub fn push_mempool_session(&self, events: Vec<MempoolEvent>) {
        self.state.lock().mempool_sessions.push_back(events);
    }

    /// Returns all recorded calls in order.
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    /// Returns the number of recorded calls to `method`.
    #[must_use]
    pub fn call_count(&self, method: Method) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| call.method() == method)
            .count()
    }

    /// Waits until `n` heads subscriptions have announced every remaining block.
    pub async fn wait_heads_exhausted(&self, n: usize) {
        let mut rx = self.heads_exhausted.subscribe();
        let _ = rx.wait_for(|count| *count >= n).await;
    }

    /// Waits until `n` mempool sessions have delivered their last batch.
    pub async fn wait_mempool_drained(&self, n: usize) {
        let mut rx = self.mempool_drained.subscribe();
        let _ = rx.wait_for(|count| *count >= n).await;
    }
}

#[async_trait]
impl NodeClient for MockNodeClient {
    type Error = MockError;

    async fn basic_block_info(
        &self,
        chain: &ChainId,
        block: &BlockId,
    ) -> Result<BasicBlockInfo, Self::Error> {
        let mut state = self.state.lock();
        state.record(Call::BasicBlockInfo {
            chain: *chain,
            block: *block,
        })?;
        let block = state.block(block)?;

        Ok(BasicBlockInfo {
            hash: block.hash,
            protocol: block.protocols.protocol,
            next_protocol: block.protocols.next_protocol,
        })
    }

    async fn shell_header(
        &self,
        chain: &ChainId,
        block: &BlockHash,
    ) -> Result<ShellHeader, Self::Error> {
        let mut state = self.state.lock();
        state.record(Call::ShellHeader {
            chain: *chain,
            block: *block,
        })?;

        Ok(state.block(&BlockId::Hash(*block))?.header.clone())
    }

    async fn protocol_constants(
        &self,
        chain: &ChainId,
        block: &BlockHash,
        protocol: &ProtocolHash,
    ) -> Result<ProtocolConstants, Self::Error> {
        let mut state = self.state.lock();
        state.record(Call::ProtocolConstants {
            chain: *chain,
            block: *block,
            protocol: *protocol,
        })?;

        Ok(state.block(&BlockId::Hash(*block))?.constants)
    }

    async fn block_protocols(
        &self,
        chain: &ChainId,
        block: &BlockHash,
    ) -> Result<BlockProtocols, Self::Error> {
        let mut state = self.state.lock();
        state.record(Call::BlockProtocols {
            chain: *chain,
            block: *block,
        })?;

        Ok(state.block(&BlockId::Hash(*block))?.protocols)
    }

    async fn heads(
        &self,
        chain: &ChainId,
        cancellation_token: CancellationToken,
    ) -> Result<Subscription<Head, Self::Error>, Self::Error> {
        self.state.lock().record(Call::Heads { chain: *chain })?;

        let state = self.state.clone();
        let exhausted = self.heads_exhausted.clone();

        let stream = async_stream::stream! {
            loop {
                let next = {
                    let mut state = state.lock();
                    if state.head + 1 < state.blocks.len() {
                        state.head += 1;
                        Some(state.blocks[state.head].head())
                    } else {
                        None
                    }
                };

                match next {
                    Some(head) => yield Ok(head),
                    None => break,
                }
            }

            exhausted.send_modify(|count| *count += 1);
            cancellation_token.cancelled().await;
            yield Err(MockError::Cancelled);
        };

        Ok(Box::pin(stream))
    }

    async fn mempool_operations(
        &self,
        chain: &ChainId,
        cancellation_token: CancellationToken,
    ) -> Result<Subscription<Vec<OperationGroup>, Self::Error>, Self::Error> {
        let events = {
            let mut state = self.state.lock();
            state.record(Call::MempoolOperations { chain: *chain })?;
            state.mempool_sessions.pop_front().unwrap_or_default()
        };

        let drained = self.mempool_drained.clone();

        let stream = async_stream::stream! {
            for event in events {
                match event {
                    MempoolEvent::Batch(batch) => yield Ok(batch),
                    MempoolEvent::Disconnect => {
                        yield Err(MockError::Disconnected);
                        return;
                    }
                }
            }

            drained.send_modify(|count| *count += 1);
            cancellation_token.cancelled().await;
            yield Err(MockError::Cancelled);
        };

        Ok(Box::pin(stream))
    }

    async fn bootstrap_state(&self, chain: &ChainId) -> Result<BootstrapStatus, Self::Error> {
        let mut state = self.state.lock();
        state.record(Call::BootstrapState { chain: *chain })?;

        Ok(state.bootstrap)
    }

    async fn connections(&self) -> Result<Vec<Connection>, Self::Error> {
        let mut state = self.state.lock();
        state.record(Call::Connections)?;

        Ok(state.connections.clone())
    }

    async fn pending_operations(&self, chain: &ChainId) -> Result<PendingOperations, Self::Error> {
        let mut state = self.state.lock();
        state.record(Call::PendingOperations { chain: *chain })?;

        Ok(state.pending_operations.clone())
    }
}
