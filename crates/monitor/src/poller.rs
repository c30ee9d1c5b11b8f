//! Bootstrap/Aggregate Poller.
//!
//! On every tick three independent sub-polls run concurrently: bootstrap
//! state, peer connections and pending mempool operations. Each one publishes
//! its own result; a failed sub-poll leaves its previous values in place.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use prometheus::Registry;
use sentinel_bootable::Bootable;
use sentinel_node_client::{
    BootstrapStatus, ChainId, Direction, MempoolPool, NodeClient, OperationGroup,
};
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::call::bounded;
use crate::lifecycle::Lifecycle;
use crate::metrics::PollerMetrics;
use crate::status::{self, ProtocolsReader, StatusReader, StatusWriter};
use crate::{Error, Result};

/// Options for configuring a `Poller`.
#[derive(Clone)]
pub struct PollerOptions {
    /// The chain to poll.
    pub chain_id: ChainId,

    /// Bound for each sub-poll.
    pub timeout: Duration,

    /// Time between ticks.
    pub poll_interval: Duration,

    /// Registry for the poller's metrics.
    pub registry: Option<Registry>,
}

/// Periodically polls bootstrap state, connections and the mempool.
pub struct Poller<C>
where
    C: NodeClient,
{
    lifecycle: Lifecycle,
    worker: Mutex<Option<PollerWorker<C>>>,
    bootstrap: StatusReader<Option<BootstrapStatus>>,
}

impl<C> Poller<C>
where
    C: NodeClient,
{
    /// Creates a new instance of `Poller`.
    ///
    /// # Errors
    ///
    /// Fails if metrics cannot be registered.
    pub fn new(client: C, protocols: ProtocolsReader, options: PollerOptions) -> Result<Self> {
        let metrics = PollerMetrics::new(options.registry.as_ref())?;
        let (bootstrap_writer, bootstrap) = status::cell(None);

        let worker = PollerWorker {
            shared: Arc::new(Shared {
                client,
                chain_id: options.chain_id,
                timeout: options.timeout,
                protocols,
                bootstrap: bootstrap_writer,
                metrics,
            }),
            poll_interval: options.poll_interval,
        };

        Ok(Self {
            lifecycle: Lifecycle::new("poller"),
            worker: Mutex::new(Some(worker)),
            bootstrap,
        })
    }

    /// Returns the latest bootstrap status, if any poll has succeeded.
    #[must_use]
    pub fn bootstrap_status(&self) -> Option<BootstrapStatus> {
        self.bootstrap.get()
    }

    /// Returns a reader of the bootstrap status.
    #[must_use]
    pub fn bootstrap_reader(&self) -> StatusReader<Option<BootstrapStatus>> {
        self.bootstrap.clone()
    }

    /// Stops the poller, waiting at most `deadline` for its tasks to exit.
    ///
    /// # Errors
    ///
    /// Returns `Error::ShutdownTimeout` if the deadline passes first.
    pub async fn shutdown_within(&self, deadline: Option<Duration>) -> Result<()> {
        self.lifecycle.shutdown(deadline).await
    }
}

#[async_trait]
impl<C> Bootable for Poller<C>
where
    C: NodeClient,
{
    type Error = Error;

    fn name(&self) -> &str {
        self.lifecycle.name()
    }

    async fn start(&self) -> Result<()> {
        if self.lifecycle.is_closed() {
            return Err(Error::AlreadyStarted);
        }

        let worker = self.worker.lock().take().ok_or(Error::AlreadyStarted)?;

        self.lifecycle
            .start(|token, tracker| worker.run(token, tracker))
    }

    async fn shutdown(&self) -> Result<()> {
        self.lifecycle.shutdown(None).await
    }

    async fn wait(&self) {
        self.lifecycle.wait().await;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SubPoll {
    Bootstrap,
    Connections,
    PendingOperations,
}

impl SubPoll {
    const ALL: [Self; 3] = [Self::Bootstrap, Self::Connections, Self::PendingOperations];
}

impl fmt::Display for SubPoll {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Bootstrap => "bootstrap",
            Self::Connections => "connections",
            Self::PendingOperations => "pending operations",
        })
    }
}

struct PollerWorker<C>
where
    C: NodeClient,
{
    shared: Arc<Shared<C>>,
    poll_interval: Duration,
}

impl<C> PollerWorker<C>
where
    C: NodeClient,
{
    async fn run(self, token: CancellationToken, tracker: TaskTracker) {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if self.poll_once(&token, &tracker).await {
                break;
            }
        }

        info!("poller stopped");
    }

    /// Runs one tick, returning `true` if any sub-poll was cancelled.
    async fn poll_once(&self, token: &CancellationToken, tracker: &TaskTracker) -> bool {
        let (tx, mut rx) = mpsc::channel(SubPoll::ALL.len());

        for sub_poll in SubPoll::ALL {
            let shared = self.shared.clone();
            let token = token.clone();
            let tx = tx.clone();

            tracker.spawn(async move {
                let result = shared.poll(sub_poll, &token).await;
                let _ = tx.send((sub_poll, result)).await;
            });
        }
        drop(tx);

        let mut cancelled = false;
        while let Some((sub_poll, result)) = rx.recv().await {
            match result {
                Ok(()) => debug!("{} poll done", sub_poll),
                Err(e) if e.is_cancelled() => cancelled = true,
                Err(e) => warn!("{} poll failed: {}", sub_poll, e),
            }
        }

        cancelled
    }
}

struct Shared<C>
where
    C: NodeClient,
{
    client: C,
    chain_id: ChainId,
    timeout: Duration,
    protocols: ProtocolsReader,
    bootstrap: StatusWriter<Option<BootstrapStatus>>,
    metrics: PollerMetrics,
}

impl<C> Shared<C>
where
    C: NodeClient,
{
    async fn poll(&self, sub_poll: SubPoll, token: &CancellationToken) -> Result<()> {
        match sub_poll {
            SubPoll::Bootstrap => self.poll_bootstrap(token).await,
            SubPoll::Connections => self.poll_connections(token).await,
            SubPoll::PendingOperations => self.poll_pending_operations(token).await,
        }
    }

    async fn poll_bootstrap(&self, token: &CancellationToken) -> Result<()> {
        let status = bounded(
            token,
            self.timeout,
            "bootstrap state",
            self.client.bootstrap_state(&self.chain_id),
        )
        .await?;

        self.metrics
            .bootstrapped
            .set(f64::from(u8::from(status.bootstrapped && status.is_synced())));
        self.bootstrap.set(Some(status));

        Ok(())
    }

    async fn poll_connections(&self, token: &CancellationToken) -> Result<()> {
        let connections = bounded(
            token,
            self.timeout,
            "connections",
            self.client.connections(),
        )
        .await?;

        let mut counts: HashMap<(Direction, bool), i64> = HashMap::new();
        for connection in &connections {
            *counts
                .entry((connection.direction(), connection.private))
                .or_default() += 1;
        }

        self.metrics.connections.reset();
        for ((direction, private), count) in counts {
            let private = private.to_string();
            self.metrics
                .connections
                .with_label_values(&[direction.as_str(), private.as_str()])
                .set(count);
        }

        Ok(())
    }

    async fn poll_pending_operations(&self, token: &CancellationToken) -> Result<()> {
        let pending = bounded(
            token,
            self.timeout,
            "pending operations",
            self.client.pending_operations(&self.chain_id),
        )
        .await?;

        let mut counts: HashMap<(&str, MempoolPool), i64> = HashMap::new();
        for (pool, groups) in pending.pools() {
            for kind in groups.iter().flat_map(OperationGroup::kinds) {
                *counts.entry((kind, pool)).or_default() += 1;
            }
        }

        let proto = self.protocols.next_protocol_label();

        self.metrics.mempool_operations.reset();
        for ((kind, pool), count) in counts {
            self.metrics
                .mempool_operations
                .with_label_values(&[kind, pool.as_str(), proto.as_str()])
                .set(count);
        }

        Ok(())
    }
}
