//! Abstract interface for long-running background services.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use async_trait::async_trait;

/// Marker trait for errors returned by bootable services.
pub trait BootableError: std::error::Error + Send + Sync + 'static {}

/// Trait for services that are started once and shut down once.
#[async_trait]
pub trait Bootable
where
    Self: Send + Sync + 'static,
{
    /// The error type for the service.
    type Error: BootableError;

    /// Get the name of the service.
    fn name(&self) -> &str;

    /// Start the service. Fails if the service was already started or stopped.
    async fn start(&self) -> Result<(), Self::Error>;

    /// Shut the service down and wait for its background work to exit.
    async fn shutdown(&self) -> Result<(), Self::Error>;

    /// Wait for the service to exit.
    async fn wait(&self);
}
