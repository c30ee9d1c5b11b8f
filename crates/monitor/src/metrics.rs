//! Prometheus metrics maintained by the monitors.
//!
//! Every metric lives under the `tezos_node_` prefix. Metrics are registered
//! on the registry passed at construction, or left unregistered when there is
//! none.

use prometheus::core::Collector;
use prometheus::{Gauge, IntCounterVec, IntGaugeVec, Opts, Registry};

const NAMESPACE: &str = "tezos";
const SUBSYSTEM: &str = "node";

fn opts(name: &str, help: &str) -> Opts {
    Opts::new(name, help)
        .namespace(NAMESPACE)
        .subsystem(SUBSYSTEM)
}

fn register<M>(registry: Option<&Registry>, metric: M) -> prometheus::Result<M>
where
    M: Collector + Clone + 'static,
{
    if let Some(registry) = registry {
        registry.register(Box::new(metric.clone()))?;
    }

    Ok(metric)
}

/// Metrics owned by the head monitor.
#[derive(Clone)]
pub(crate) struct HeadMetrics {
    /// 1 while the latest head arrived in time.
    pub block_delay_ok: Gauge,
}

impl HeadMetrics {
    pub fn new(registry: Option<&Registry>) -> prometheus::Result<Self> {
        let block_delay_ok = register(
            registry,
            Gauge::with_opts(opts(
                "block_delay_ok",
                "Whether the latest head arrived within the minimal block delay plus tolerance",
            ))?,
        )?;

        Ok(Self { block_delay_ok })
    }
}

/// Metrics owned by the mempool monitor.
#[derive(Clone)]
pub(crate) struct MempoolMetrics {
    /// Operations seen on the mempool stream since the last connection.
    pub operations_total: IntCounterVec,
}

impl MempoolMetrics {
    pub fn new(registry: Option<&Registry>) -> prometheus::Result<Self> {
        let operations_total = register(
            registry,
            IntCounterVec::new(
                opts(
                    "mempool_operations_total",
                    "Operations received on the mempool stream",
                ),
                &["kind", "proto"],
            )?,
        )?;

        Ok(Self { operations_total })
    }
}

/// Metrics owned by the poller.
#[derive(Clone)]
pub(crate) struct PollerMetrics {
    /// 1 while the node is bootstrapped and synced.
    pub bootstrapped: Gauge,
    /// Peer connections by direction and privacy.
    pub connections: IntGaugeVec,
    /// Pending operations by kind, pool and next protocol.
    pub mempool_operations: IntGaugeVec,
}

impl PollerMetrics {
    pub fn new(registry: Option<&Registry>) -> prometheus::Result<Self> {
        let bootstrapped = register(
            registry,
            Gauge::with_opts(opts(
                "bootstrapped",
                "Whether the node is bootstrapped and synced",
            ))?,
        )?;

        let connections = register(
            registry,
            IntGaugeVec::new(
                opts("connections", "Peer connections"),
                &["direction", "private"],
            )?,
        )?;

        let mempool_operations = register(
            registry,
            IntGaugeVec::new(
                opts("mempool_operations", "Pending mempool operations"),
                &["kind", "pool", "proto"],
            )?,
        )?;

        Ok(Self {
            bootstrapped,
            connections,
            mempool_operations,
        })
    }
}
