//! Monitors that derive the health of a blockchain node from its RPC.
//!
//! Three background monitors observe the node: `HeadMonitor` follows heads
//! and judges their delay, `MempoolMonitor` counts streamed operations and
//! `Poller` periodically samples bootstrap state, connections and the mempool.
//! `HealthChecker` combines their latest published signals into a verdict.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

mod call;
mod error;
mod head;
mod health;
mod lifecycle;
mod mempool;
mod metrics;
mod poller;
mod status;

pub use error::{Error, Result};
pub use head::{HeadMonitor, HeadMonitorOptions};
pub use health::{HealthChecker, HealthChecks, HealthReport, HealthStatus, evaluate};
pub use mempool::{MempoolMonitor, MempoolMonitorOptions};
pub use poller::{Poller, PollerOptions};
pub use status::{ProtocolsReader, StatusReader, UNKNOWN_PROTOCOL};
