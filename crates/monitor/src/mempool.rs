//! Mempool Activity Monitor.
//!
//! Counts operations received on the node's mempool stream by kind and by the
//! protocol the next block is expected under. Counters start from zero on
//! every connection.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use prometheus::Registry;
use sentinel_bootable::Bootable;
use sentinel_node_client::{ChainId, NodeClient, OperationGroup};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::call::{backoff, bounded};
use crate::lifecycle::Lifecycle;
use crate::metrics::MempoolMetrics;
use crate::status::ProtocolsReader;
use crate::{Error, Result};

/// Options for configuring a `MempoolMonitor`.
#[derive(Clone)]
pub struct MempoolMonitorOptions {
    /// The chain whose mempool to follow.
    pub chain_id: ChainId,

    /// Bound for opening the subscription.
    pub timeout: Duration,

    /// Pause between a failure and the next connection attempt.
    pub reconnect_delay: Duration,

    /// Registry for the monitor's metrics.
    pub registry: Option<Registry>,
}

/// Counts mempool operations by kind and next protocol.
pub struct MempoolMonitor<C>
where
    C: NodeClient,
{
    lifecycle: Lifecycle,
    worker: Mutex<Option<MempoolWorker<C>>>,
}

impl<C> MempoolMonitor<C>
where
    C: NodeClient,
{
    /// Creates a new instance of `MempoolMonitor`.
    ///
    /// # Errors
    ///
    /// Fails if metrics cannot be registered.
    pub fn new(
        client: C,
        protocols: ProtocolsReader,
        options: MempoolMonitorOptions,
    ) -> Result<Self> {
        let metrics = MempoolMetrics::new(options.registry.as_ref())?;

        Ok(Self {
            lifecycle: Lifecycle::new("mempool monitor"),
            worker: Mutex::new(Some(MempoolWorker {
                client,
                chain_id: options.chain_id,
                timeout: options.timeout,
                reconnect_delay: options.reconnect_delay,
                protocols,
                metrics,
            })),
        })
    }

    /// Stops the monitor, waiting at most `deadline` for its task to exit.
    ///
    /// # Errors
    ///
    /// Returns `Error::ShutdownTimeout` if the deadline passes first.
    pub async fn shutdown_within(&self, deadline: Option<Duration>) -> Result<()> {
        self.lifecycle.shutdown(deadline).await
    }
}

#[async_trait]
impl<C> Bootable for MempoolMonitor<C>
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

        self.lifecycle.start(|token, _| worker.run(token))
    }

    async fn shutdown(&self) -> Result<()> {
        self.lifecycle.shutdown(None).await
    }

    async fn wait(&self) {
        self.lifecycle.wait().await;
    }
}

struct MempoolWorker<C>
where
    C: NodeClient,
{
    client: C,
    chain_id: ChainId,
    timeout: Duration,
    reconnect_delay: Duration,
    protocols: ProtocolsReader,
    metrics: MempoolMetrics,
}

impl<C> MempoolWorker<C>
where
    C: NodeClient,
{
    async fn run(self, token: CancellationToken) {
        loop {
            let e = self.session(&token).await;
            if e.is_cancelled() {
                break;
            }

            error!(
                "mempool monitor: {}, reconnecting in {:?}",
                e, self.reconnect_delay
            );

            if !backoff(&token, self.reconnect_delay).await {
                break;
            }
        }

        info!("mempool monitor stopped");
    }

    /// Follows one subscription until it fails, returning the failure.
    async fn session(&self, token: &CancellationToken) -> Error {
        let mut operations = match bounded(
            token,
            self.timeout,
            "mempool subscription",
            self.client.mempool_operations(&self.chain_id, token.clone()),
        )
        .await
        {
            Ok(operations) => operations,
            Err(e) => return e,
        };

        self.metrics.operations_total.reset();
        debug!("following mempool operations");

        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => return Error::Cancelled,
                next = operations.next() => match next {
                    Some(Ok(batch)) => self.record(&batch),
                    Some(Err(e)) => return Error::client(&e),
                    None => return Error::StreamClosed("mempool"),
                },
            }
        }
    }

    fn record(&self, batch: &[OperationGroup]) {
        let proto = self.protocols.next_protocol_label();

        for kind in batch.iter().flat_map(OperationGroup::kinds) {
            self.metrics
                .operations_total
                .with_label_values(&[kind, proto.as_str()])
                .inc();
        }
    }
}
