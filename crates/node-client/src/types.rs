//! Data model shared between node clients and the monitoring engine.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::hash::{BlockHash, ProtocolHash};

/// Reference to a block, either the current head or a specific hash.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlockId {
    /// The current head of the chain.
    Head,
    /// A block identified by its hash.
    Hash(BlockHash),
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Head => f.write_str("head"),
            Self::Hash(hash) => write!(f, "{hash}"),
        }
    }
}

impl From<BlockHash> for BlockId {
    fn from(hash: BlockHash) -> Self {
        Self::Hash(hash)
    }
}

/// Hash and protocols of a block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicBlockInfo {
    /// Block hash.
    pub hash: BlockHash,
    /// Protocol the block was produced under.
    pub protocol: ProtocolHash,
    /// Protocol of the following block.
    pub next_protocol: ProtocolHash,
}

/// Protocol-independent part of a block header.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellHeader {
    /// Block level.
    pub level: i32,
    /// Protocol ordinal; changes at protocol upgrade boundaries.
    pub proto: u8,
    /// Predecessor hash.
    pub predecessor: BlockHash,
    /// Block timestamp.
    pub timestamp: DateTime<Utc>,
}

/// A head announced by the node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Head {
    /// Block hash.
    pub hash: BlockHash,
    /// Shell header of the block.
    #[serde(flatten)]
    pub header: ShellHeader,
}

/// Protocol constants. Only the fields used by the monitors are decoded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolConstants {
    /// Minimum number of seconds between consecutive blocks.
    #[serde(deserialize_with = "deserialize_int64")]
    pub minimal_block_delay: u64,
}

/// Protocols of a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockProtocols {
    /// Protocol the block was produced under.
    pub protocol: ProtocolHash,
    /// Protocol of the following block.
    pub next_protocol: ProtocolHash,
}

/// Node-reported synchronisation state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// The node has not caught up with its peers.
    Unsynced,
    /// The node is synchronised.
    Synced,
    /// The chain is not progressing.
    Stuck,
}

/// Bootstrap and sync state of the node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapStatus {
    /// Whether the node has caught up with a few peers.
    pub bootstrapped: bool,
    /// Synchronisation state.
    pub sync_state: SyncState,
}

impl BootstrapStatus {
    /// Returns `true` if the sync state is `synced`.
    #[must_use]
    pub fn is_synced(&self) -> bool {
        self.sync_state == SyncState::Synced
    }
}

/// Direction of a peer connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Initiated by the peer.
    Incoming,
    /// Initiated by the node.
    Outgoing,
}

impl Direction {
    /// Returns the label used in metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Incoming => "incoming",
            Self::Outgoing => "outgoing",
        }
    }
}

/// A peer connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    /// Whether the peer initiated the connection.
    pub incoming: bool,
    /// Whether the peer is a private peer.
    pub private: bool,
}

impl Connection {
    /// Returns the direction of the connection.
    #[must_use]
    pub const fn direction(&self) -> Direction {
        if self.incoming {
            Direction::Incoming
        } else {
            Direction::Outgoing
        }
    }
}

/// A single operation inside a group.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// Operation kind, e.g. `transaction` or `attestation`.
    pub kind: String,
}

impl Operation {
    /// Creates an operation of the given kind.
    pub fn new(kind: impl Into<String>) -> Self {
        Self { kind: kind.into() }
    }
}

/// A signed group of operations as it appears in the mempool.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationGroup {
    /// Operation hash, when reported.
    #[serde(default)]
    pub hash: Option<String>,
    /// Operations in the group.
    #[serde(default)]
    pub contents: Vec<Operation>,
}

impl OperationGroup {
    /// Creates a group from operation kinds.
    pub fn with_kinds<I, S>(kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            hash: None,
            contents: kinds.into_iter().map(Operation::new).collect(),
        }
    }

    /// Iterates over the kinds of the operations in the group.
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.contents.iter().map(|op| op.kind.as_str())
    }
}

/// Named mempool pools.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MempoolPool {
    /// Validated operations.
    Validated,
    /// Refused operations.
    Refused,
    /// Operations with an outdated branch.
    Outdated,
    /// Operations refused on the current branch.
    BranchRefused,
    /// Operations delayed on the current branch.
    BranchDelayed,
    /// Operations not yet processed.
    Unprocessed,
}

impl MempoolPool {
    /// All pools in reporting order.
    pub const ALL: [Self; 6] = [
        Self::Validated,
        Self::Refused,
        Self::Outdated,
        Self::BranchRefused,
        Self::BranchDelayed,
        Self::Unprocessed,
    ];

    /// Returns the label used in metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Validated => "validated",
            Self::Refused => "refused",
            Self::Outdated => "outdated",
            Self::BranchRefused => "branch_refused",
            Self::BranchDelayed => "branch_delayed",
            Self::Unprocessed => "unprocessed",
        }
    }
}

/// Snapshot of the mempool partitioned into pools.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOperations {
    /// Validated operations.
    #[serde(default, alias = "applied")]
    pub validated: Vec<OperationGroup>,
    /// Refused operations.
    #[serde(default)]
    pub refused: Vec<OperationGroup>,
    /// Outdated operations.
    #[serde(default)]
    pub outdated: Vec<OperationGroup>,
    /// Operations refused on the current branch.
    #[serde(default)]
    pub branch_refused: Vec<OperationGroup>,
    /// Operations delayed on the current branch.
    #[serde(default)]
    pub branch_delayed: Vec<OperationGroup>,
    /// Operations not yet processed.
    #[serde(default)]
    pub unprocessed: Vec<OperationGroup>,
}

impl PendingOperations {
    /// Returns the groups in a pool.
    #[must_use]
    pub fn pool(&self, pool: MempoolPool) -> &[OperationGroup] {
        match pool {
            MempoolPool::Validated => &self.validated,
            MempoolPool::Refused => &self.refused,
            MempoolPool::Outdated => &self.outdated,
            MempoolPool::BranchRefused => &self.branch_refused,
            MempoolPool::BranchDelayed => &self.branch_delayed,
            MempoolPool::Unprocessed => &self.unprocessed,
        }
    }

    /// Iterates over all pools with their groups.
    pub fn pools(&self) -> impl Iterator<Item = (MempoolPool, &[OperationGroup])> {
        MempoolPool::ALL.into_iter().map(|pool| (pool, self.pool(pool)))
    }
}

// The node encodes int64 values as JSON strings.
fn deserialize_int64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Int64 {
        Number(u64),
        Text(String),
    }

    match Int64::deserialize(deserializer)? {
        Int64::Number(n) => Ok(n),
        Int64::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}
