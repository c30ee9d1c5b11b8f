//! Single-writer status cells shared between a monitor task and its readers.

use std::sync::Arc;

use parking_lot::RwLock;
use sentinel_node_client::{BlockProtocols, ProtocolHash};

/// Label used for the protocol before the head monitor has seen a block.
pub const UNKNOWN_PROTOCOL: &str = "unknown";

/// Creates a status cell, returning its only writer and a reader.
pub(crate) fn cell<T: Clone>(initial: T) -> (StatusWriter<T>, StatusReader<T>) {
    let inner = Arc::new(RwLock::new(initial));

    (StatusWriter(inner.clone()), StatusReader(inner))
}

/// The write half of a status cell. Not cloneable; owned by the monitor task.
#[derive(Debug)]
pub(crate) struct StatusWriter<T>(Arc<RwLock<T>>);

impl<T> StatusWriter<T> {
    /// Replaces the published value.
    pub fn set(&self, value: T) {
        *self.0.write() = value;
    }
}

/// Read-only view of the latest value published by a monitor.
#[derive(Debug)]
pub struct StatusReader<T>(Arc<RwLock<T>>);

impl<T> Clone for StatusReader<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: Clone> StatusReader<T> {
    /// Returns a copy of the latest published value.
    #[must_use]
    pub fn get(&self) -> T {
        self.0.read().clone()
    }
}

/// Read-only access to the protocols of the latest head.
///
/// Values may lag the node by one head; readers treat them as a best-effort
/// snapshot.
#[derive(Clone, Debug)]
pub struct ProtocolsReader(StatusReader<Option<BlockProtocols>>);

impl ProtocolsReader {
    pub(crate) const fn new(reader: StatusReader<Option<BlockProtocols>>) -> Self {
        Self(reader)
    }

    /// Returns the protocol pair of the latest head, if any.
    #[must_use]
    pub fn protocols(&self) -> Option<BlockProtocols> {
        self.0.get()
    }

    /// Returns the protocol the next block will be produced under.
    #[must_use]
    pub fn next_protocol(&self) -> Option<ProtocolHash> {
        self.protocols().map(|protocols| protocols.next_protocol)
    }

    /// Returns the next protocol as a metric label.
    #[must_use]
    pub fn next_protocol_label(&self) -> String {
        self.next_protocol()
            .map_or_else(|| UNKNOWN_PROTOCOL.to_string(), |protocol| protocol.to_string())
    }
}
