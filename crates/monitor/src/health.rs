//! Health Evaluator.

use sentinel_node_client::BootstrapStatus;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::status::StatusReader;
use crate::{Error, Result};

/// Which signals contribute to the overall verdict.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct HealthChecks {
    /// Require the node to report itself bootstrapped.
    pub use_bootstrapped: bool,

    /// Require the node to report `synced`.
    pub use_sync_state: bool,

    /// Require the latest head to have arrived in time.
    pub use_block_delay: bool,
}

impl Default for HealthChecks {
    fn default() -> Self {
        Self {
            use_bootstrapped: true,
            use_sync_state: true,
            use_block_delay: true,
        }
    }
}

/// Individual health signals. Signals of disabled checks stay `false`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    /// The node reports itself bootstrapped.
    #[serde(rename = "bootstrapped")]
    pub is_bootstrapped: bool,

    /// The node reports `synced`.
    #[serde(rename = "synced")]
    pub is_synced: bool,

    /// The latest head arrived in time.
    pub block_delay_ok: bool,
}

/// A health verdict.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HealthReport {
    /// Signals behind the verdict.
    pub status: HealthStatus,

    /// Whether every enabled signal is healthy.
    pub ok: bool,
}

/// Combines the latest signals into a verdict.
///
/// # Errors
///
/// Returns `Error::NoBootstrapData` if a bootstrap or sync check is enabled
/// and no bootstrap status is available.
pub fn evaluate(
    checks: HealthChecks,
    bootstrap: Option<BootstrapStatus>,
    block_delay_ok: bool,
) -> Result<HealthReport> {
    let mut status = HealthStatus::default();
    let mut ok = true;

    if checks.use_bootstrapped || checks.use_sync_state {
        let bootstrap = bootstrap.ok_or(Error::NoBootstrapData)?;

        if checks.use_bootstrapped {
            status.is_bootstrapped = bootstrap.bootstrapped;
            ok &= status.is_bootstrapped;
        }

        if checks.use_sync_state {
            status.is_synced = bootstrap.is_synced();
            ok &= status.is_synced;
        }
    }

    if checks.use_block_delay {
        status.block_delay_ok = block_delay_ok;
        ok &= block_delay_ok;
    }

    Ok(HealthReport { status, ok })
}

/// Evaluates health from the signals published by the monitors.
#[derive(Clone, Debug)]
pub struct HealthChecker {
    checks: HealthChecks,
    bootstrap: StatusReader<Option<BootstrapStatus>>,
    block_delay_ok: StatusReader<bool>,
}

impl HealthChecker {
    /// Creates a new instance of `HealthChecker`.
    #[must_use]
    pub const fn new(
        checks: HealthChecks,
        bootstrap: StatusReader<Option<BootstrapStatus>>,
        block_delay_ok: StatusReader<bool>,
    ) -> Self {
        Self {
            checks,
            bootstrap,
            block_delay_ok,
        }
    }

    /// Returns the current verdict without waiting on the node.
    ///
    /// # Errors
    ///
    /// Returns `Error::NoBootstrapData` if a bootstrap or sync check is enabled
    /// and the poller has not succeeded yet.
    pub fn status(&self) -> Result<HealthReport> {
        let report = evaluate(
            self.checks,
            self.bootstrap.get(),
            self.block_delay_ok.get(),
        )?;

        if !report.ok {
            warn!(
                bootstrapped = report.status.is_bootstrapped,
                synced = report.status.is_synced,
                block_delay_ok = report.status.block_delay_ok,
                "node is unhealthy"
            );
        }

        Ok(report)
    }
}
