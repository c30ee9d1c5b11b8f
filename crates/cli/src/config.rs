use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use sentinel_monitor::HealthChecks;
use sentinel_node_client::ChainId;
use serde::Deserialize;
use url::Url;

use crate::error::{Error, Result};
use crate::serde_duration;

/// Sidecar configuration, read from a YAML file.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
#[allow(clippy::struct_excessive_bools)]
pub struct Config {
    /// Address the HTTP server listens on.
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Base URL of the node RPC.
    pub url: Url,

    /// Chain to monitor.
    pub chain_id: ChainId,

    /// Bound for each node call.
    #[serde(default = "default_timeout", deserialize_with = "serde_duration::deserialize")]
    pub timeout: Duration,

    /// Slack added to the minimal block delay.
    #[serde(default = "default_tolerance", deserialize_with = "serde_duration::deserialize")]
    pub tolerance: Duration,

    /// Pause before reconnecting a failed stream.
    #[serde(
        default = "default_reconnect_delay",
        deserialize_with = "serde_duration::deserialize"
    )]
    pub reconnect_delay: Duration,

    /// Time between polls of bootstrap state, connections and the mempool.
    #[serde(
        default = "default_poll_interval",
        deserialize_with = "serde_duration::deserialize"
    )]
    pub poll_interval: Duration,

    /// Judge heads by block timestamp rather than arrival time.
    #[serde(default)]
    pub use_timestamps: bool,

    /// Require the node to report itself bootstrapped.
    #[serde(default = "default_true")]
    pub health_use_bootstrapped: bool,

    /// Require the node to report `synced`.
    #[serde(default = "default_true")]
    pub health_use_sync_state: bool,

    /// Require the latest head to have arrived in time.
    #[serde(default = "default_true")]
    pub health_use_block_delay: bool,

    /// Follow the mempool stream.
    #[serde(default = "default_true")]
    pub enable_mempool_monitor: bool,
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

const fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

const fn default_tolerance() -> Duration {
    Duration::from_secs(1)
}

const fn default_reconnect_delay() -> Duration {
    Duration::from_secs(10)
}

const fn default_poll_interval() -> Duration {
    Duration::from_secs(15)
}

const fn default_true() -> bool {
    true
}

impl Config {
    /// Reads the configuration from `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| Error::Io("failed to read config", e))?;

        Self::from_yaml(&contents)
    }

    /// Parses the configuration from YAML.
    pub fn from_yaml(contents: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Returns the checks that make up the health verdict.
    pub const fn health_checks(&self) -> HealthChecks {
        HealthChecks {
            use_bootstrapped: self.health_use_bootstrapped,
            use_sync_state: self.health_use_sync_state,
            use_block_delay: self.health_use_block_delay,
        }
    }
}
