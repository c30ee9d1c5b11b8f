use std::time::Duration;

use prometheus::{Encoder, Registry, TextEncoder};
use sentinel_monitor::{HeadMonitorOptions, MempoolMonitorOptions, PollerOptions};
use sentinel_node_client::ChainId;

pub const TIMEOUT: Duration = Duration::from_secs(5);
pub const RECONNECT_DELAY: Duration = Duration::from_secs(10);
pub const POLL_INTERVAL: Duration = Duration::from_secs(15);

pub fn head_options(registry: &Registry, tolerance: Duration) -> HeadMonitorOptions {
    HeadMonitorOptions {
        chain_id: ChainId::default(),
        timeout: TIMEOUT,
        tolerance,
        reconnect_delay: RECONNECT_DELAY,
        use_timestamps: true,
        registry: Some(registry.clone()),
    }
}

pub fn mempool_options(registry: &Registry) -> MempoolMonitorOptions {
    MempoolMonitorOptions {
        chain_id: ChainId::default(),
        timeout: TIMEOUT,
        reconnect_delay: RECONNECT_DELAY,
        registry: Some(registry.clone()),
    }
}

pub fn poller_options(registry: &Registry) -> PollerOptions {
    PollerOptions {
        chain_id: ChainId::default(),
        timeout: TIMEOUT,
        poll_interval: POLL_INTERVAL,
        registry: Some(registry.clone()),
    }
}

/// Returns the exposition lines of samples of metric `name`.
pub fn samples(registry: &Registry, name: &str) -> Vec<String> {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&registry.gather(), &mut buffer)
        .unwrap();

    String::from_utf8(buffer)
        .unwrap()
        .lines()
        .filter(|line| {
            line.strip_prefix(name)
                .is_some_and(|rest| rest.starts_with('{') || rest.starts_with(' '))
        })
        .map(str::to_string)
        .collect()
}
