use sentinel_bootable::BootableError;
use sentinel_node_client::NodeClientError;
use thiserror::Error;

/// The result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Already started.
    #[error("already started")]
    AlreadyStarted,

    /// The monitor was asked to stop.
    #[error("cancelled")]
    Cancelled,

    /// Node client error.
    #[error("node client error: {0}")]
    Client(String),

    /// Metrics could not be created or registered.
    #[error(transparent)]
    Metrics(#[from] prometheus::Error),

    /// The poller has not produced a bootstrap status yet.
    #[error("no bootstrap status available yet")]
    NoBootstrapData,

    /// Background tasks did not exit before the shutdown deadline.
    #[error("shutdown timed out")]
    ShutdownTimeout,

    /// A subscription ended without an error.
    #[error("{0} stream closed")]
    StreamClosed(&'static str),

    /// A time computation overflowed.
    #[error("time overflow")]
    TimeOverflow,

    /// A node call did not complete within the configured timeout.
    #[error("{0} timed out")]
    Timeout(&'static str),
}

impl Error {
    /// Maps a node client error, keeping cancellation distinguishable.
    pub(crate) fn client<E: NodeClientError>(error: &E) -> Self {
        if error.is_cancelled() {
            Self::Cancelled
        } else {
            Self::Client(error.to_string())
        }
    }

    /// Whether this error ends the task instead of triggering a retry.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl BootableError for Error {}
