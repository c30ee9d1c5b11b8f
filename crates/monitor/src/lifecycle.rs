use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::info;

use crate::{Error, Result};

/// Start-once, stop-once bookkeeping shared by the monitors.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    name: &'static str,
    shutdown_token: CancellationToken,
    task_tracker: TaskTracker,
}

impl Lifecycle {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            shutdown_token: CancellationToken::new(),
            task_tracker: TaskTracker::new(),
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Whether `start` or `shutdown` has already been called.
    pub fn is_closed(&self) -> bool {
        self.task_tracker.is_closed()
    }

    /// Spawns the monitor's background task and closes the tracker to
    /// further starts. The task may spawn helpers on the tracker it receives.
    pub fn start<F, Fut>(&self, task: F) -> Result<()>
    where
        F: FnOnce(CancellationToken, TaskTracker) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.task_tracker.is_closed() {
            return Err(Error::AlreadyStarted);
        }

        info!("starting {}...", self.name);

        self.task_tracker.spawn(task(
            self.shutdown_token.clone(),
            self.task_tracker.clone(),
        ));
        self.task_tracker.close();

        Ok(())
    }

    /// Cancels the background task and waits for every tracked task to exit.
    pub async fn shutdown(&self, deadline: Option<Duration>) -> Result<()> {
        info!("{} shutting down...", self.name);

        self.shutdown_token.cancel();
        self.task_tracker.close();

        match deadline {
            Some(deadline) => tokio::time::timeout(deadline, self.task_tracker.wait())
                .await
                .map_err(|_| Error::ShutdownTimeout)?,
            None => self.task_tracker.wait().await,
        }

        info!("{} shutdown", self.name);

        Ok(())
    }

    pub async fn wait(&self) {
        self.task_tracker.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_start_once() {
        let lifecycle = Lifecycle::new("test");

        lifecycle
            .start(|token, _| async move { token.cancelled().await })
            .unwrap();

        assert!(matches!(
            lifecycle.start(|_, _| async {}),
            Err(Error::AlreadyStarted)
        ));

        lifecycle.shutdown(None).await.unwrap();
    }

    #[tokio::test]
    async fn test_no_start_after_shutdown() {
        let lifecycle = Lifecycle::new("test");

        lifecycle.shutdown(None).await.unwrap();

        assert!(lifecycle.is_closed());
        assert!(matches!(
            lifecycle.start(|_, _| async {}),
            Err(Error::AlreadyStarted)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_deadline() {
        let lifecycle = Lifecycle::new("test");

        // Ignores cancellation.
        lifecycle
            .start(|_, _| async { tokio::time::sleep(Duration::from_secs(60)).await })
            .unwrap();

        assert!(matches!(
            lifecycle.shutdown(Some(Duration::from_secs(1))).await,
            Err(Error::ShutdownTimeout)
        ));
    }
}
