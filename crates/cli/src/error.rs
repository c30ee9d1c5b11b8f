use thiserror::Error;

/// The result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// IO operation failed.
    #[error("{0}: {1}")]
    Io(&'static str, #[source] std::io::Error),

    /// A monitor failed to start or stop.
    #[error(transparent)]
    Monitor(#[from] sentinel_monitor::Error),

    /// The configuration file is invalid.
    #[error("invalid config: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
