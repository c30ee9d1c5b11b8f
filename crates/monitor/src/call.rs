use std::future::Future;
use std::time::Duration;

use sentinel_node_client::NodeClientError;
use tokio_util::sync::CancellationToken;

use crate::{Error, Result};

/// Runs a node call bounded by `timeout` and interrupted by `token`.
pub(crate) async fn bounded<T, E, F>(
    token: &CancellationToken,
    timeout: Duration,
    what: &'static str,
    call: F,
) -> Result<T>
where
    E: NodeClientError,
    F: Future<Output = std::result::Result<T, E>>,
{
    tokio::select! {
        biased;
        () = token.cancelled() => Err(Error::Cancelled),
        result = tokio::time::timeout(timeout, call) => match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(Error::client(&e)),
            Err(_) => Err(Error::Timeout(what)),
        },
    }
}

/// Sleeps for `delay`, returning `false` if cancelled first.
pub(crate) async fn backoff(token: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        () = token.cancelled() => false,
        () = tokio::time::sleep(delay) => true,
    }
}
