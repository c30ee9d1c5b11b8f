//! Head Delay Monitor.
//!
//! Follows the node's heads and publishes whether each one arrived within the
//! protocol's minimal block delay plus a configured tolerance. The monitor
//! also publishes the protocol pair of the latest head, which the other
//! monitors use to label their metrics.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use futures::StreamExt;
use parking_lot::Mutex;
use prometheus::Registry;
use sentinel_bootable::Bootable;
use sentinel_node_client::{
    BlockId, BlockProtocols, ChainId, Head, NodeClient, ProtocolConstants, Subscription,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::call::{backoff, bounded};
use crate::lifecycle::Lifecycle;
use crate::metrics::HeadMetrics;
use crate::status::{self, ProtocolsReader, StatusReader, StatusWriter};
use crate::{Error, Result};

/// Options for configuring a `HeadMonitor`.
#[derive(Clone)]
pub struct HeadMonitorOptions {
    /// The chain to follow.
    pub chain_id: ChainId,

    /// Bound for each node call.
    pub timeout: Duration,

    /// Slack added to the minimal block delay before a head counts as late.
    pub tolerance: Duration,

    /// Pause between a failure and the next connection attempt.
    pub reconnect_delay: Duration,

    /// Judge heads by their block timestamp instead of their arrival time.
    pub use_timestamps: bool,

    /// Registry for the monitor's metrics.
    pub registry: Option<Registry>,
}

/// Publishes whether the chain's heads arrive in time.
pub struct HeadMonitor<C>
where
    C: NodeClient,
{
    lifecycle: Lifecycle,
    worker: Mutex<Option<HeadWorker<C>>>,
    block_delay_ok: StatusReader<bool>,
    protocols: ProtocolsReader,
}

impl<C> HeadMonitor<C>
where
    C: NodeClient,
{
    /// Creates a monitor, seeding the published protocols from the current
    /// head.
    ///
    /// # Errors
    ///
    /// Fails if the node cannot be reached, or if metrics cannot be
    /// registered.
    pub async fn connect(client: C, options: HeadMonitorOptions) -> Result<Self> {
        let metrics = HeadMetrics::new(options.registry.as_ref())?;
        let tolerance = TimeDelta::from_std(options.tolerance).map_err(|_| Error::TimeOverflow)?;

        let info = tokio::time::timeout(
            options.timeout,
            client.basic_block_info(&options.chain_id, &BlockId::Head),
        )
        .await
        .map_err(|_| Error::Timeout("basic block info"))?
        .map_err(|e| Error::client(&e))?;

        info!(
            block = %info.hash,
            protocol = %info.protocol,
            next_protocol = %info.next_protocol,
            "connected to node"
        );

        let (block_delay_writer, block_delay_ok) = status::cell(false);
        let (protocols_writer, protocols) = status::cell(Some(BlockProtocols {
            protocol: info.protocol,
            next_protocol: info.next_protocol,
        }));

        let worker = HeadWorker {
            client,
            chain_id: options.chain_id,
            timeout: options.timeout,
            tolerance,
            reconnect_delay: options.reconnect_delay,
            use_timestamps: options.use_timestamps,
            block_delay_ok: block_delay_writer,
            protocols: protocols_writer,
            metrics,
        };

        Ok(Self {
            lifecycle: Lifecycle::new("head monitor"),
            worker: Mutex::new(Some(worker)),
            block_delay_ok,
            protocols: ProtocolsReader::new(protocols),
        })
    }

    /// Whether the latest head arrived in time. `false` until the first head
    /// and while reconnecting.
    #[must_use]
    pub fn block_delay_ok(&self) -> bool {
        self.block_delay_ok.get()
    }

    /// Returns a reader of the block delay verdict.
    #[must_use]
    pub fn block_delay_status(&self) -> StatusReader<bool> {
        self.block_delay_ok.clone()
    }

    /// Returns a reader of the latest head's protocols.
    #[must_use]
    pub fn protocols_reader(&self) -> ProtocolsReader {
        self.protocols.clone()
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
impl<C> Bootable for HeadMonitor<C>
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

/// Reference point for judging the next head.
struct Session<E> {
    heads: Subscription<Head, E>,
    previous: DateTime<Utc>,
    proto: u8,
    minimal_block_delay: TimeDelta,
}

enum State<E> {
    Initializing,
    Streaming(Session<E>),
    Backoff(Error),
    Stopped,
}

impl<E> State<E> {
    fn after(error: Error) -> Self {
        if error.is_cancelled() {
            Self::Stopped
        } else {
            Self::Backoff(error)
        }
    }
}

struct HeadWorker<C>
where
    C: NodeClient,
{
    client: C,
    chain_id: ChainId,
    timeout: Duration,
    tolerance: TimeDelta,
    reconnect_delay: Duration,
    use_timestamps: bool,
    block_delay_ok: StatusWriter<bool>,
    protocols: StatusWriter<Option<BlockProtocols>>,
    metrics: HeadMetrics,
}

impl<C> HeadWorker<C>
where
    C: NodeClient,
{
    async fn run(self, token: CancellationToken) {
        let mut state = State::Initializing;

        loop {
            state = match state {
                State::Initializing => match self.initialize(&token).await {
                    Ok(session) => State::Streaming(session),
                    Err(e) => State::after(e),
                },
                State::Streaming(session) => State::after(self.follow(session, &token).await),
                State::Backoff(e) => {
                    self.publish_delay(false);
                    error!(
                        "head monitor: {}, reconnecting in {:?}",
                        e, self.reconnect_delay
                    );

                    if backoff(&token, self.reconnect_delay).await {
                        State::Initializing
                    } else {
                        State::Stopped
                    }
                }
                State::Stopped => break,
            };
        }

        info!("head monitor stopped");
    }

    async fn initialize(&self, token: &CancellationToken) -> Result<Session<C::Error>> {
        let info = bounded(
            token,
            self.timeout,
            "basic block info",
            self.client.basic_block_info(&self.chain_id, &BlockId::Head),
        )
        .await?;

        let header = bounded(
            token,
            self.timeout,
            "shell header",
            self.client.shell_header(&self.chain_id, &info.hash),
        )
        .await?;

        let constants = bounded(
            token,
            self.timeout,
            "protocol constants",
            self.client
                .protocol_constants(&self.chain_id, &info.hash, &info.protocol),
        )
        .await?;

        let heads = bounded(
            token,
            self.timeout,
            "heads subscription",
            self.client.heads(&self.chain_id, token.clone()),
        )
        .await?;

        self.protocols.set(Some(BlockProtocols {
            protocol: info.protocol,
            next_protocol: info.next_protocol,
        }));

        debug!(
            block = %info.hash,
            level = header.level,
            proto = header.proto,
            "following heads"
        );

        Ok(Session {
            heads,
            // In arrival-time mode the first head is compared against the
            // block timestamp; later heads compare arrival times only.
            previous: header.timestamp,
            proto: header.proto,
            minimal_block_delay: minimal_block_delay(constants)?,
        })
    }

    /// Processes heads until the stream fails, returning the failure.
    async fn follow(&self, mut session: Session<C::Error>, token: &CancellationToken) -> Error {
        loop {
            let head = tokio::select! {
                biased;
                () = token.cancelled() => return Error::Cancelled,
                next = session.heads.next() => match next {
                    Some(Ok(head)) => head,
                    Some(Err(e)) => return Error::client(&e),
                    None => return Error::StreamClosed("heads"),
                },
            };

            if let Err(e) = self.process(&mut session, &head, token).await {
                return e;
            }
        }
    }

    async fn process(
        &self,
        session: &mut Session<C::Error>,
        head: &Head,
        token: &CancellationToken,
    ) -> Result<()> {
        let observed = if self.use_timestamps {
            head.header.timestamp
        } else {
            Utc::now()
        };

        let deadline = session
            .previous
            .checked_add_signed(session.minimal_block_delay)
            .and_then(|t| t.checked_add_signed(self.tolerance))
            .ok_or(Error::TimeOverflow)?;
        let ok = observed < deadline;

        let protocols = bounded(
            token,
            self.timeout,
            "block protocols",
            self.client.block_protocols(&self.chain_id, &head.hash),
        )
        .await?;

        self.publish_delay(ok);
        self.protocols.set(Some(protocols));
        session.previous = observed;

        debug!(
            block = %head.hash,
            level = head.header.level,
            %observed,
            ok,
            "head"
        );

        if head.header.proto != session.proto {
            info!(
                block = %head.hash,
                protocol = %protocols.protocol,
                proto = head.header.proto,
                "protocol upgrade"
            );

            let constants = bounded(
                token,
                self.timeout,
                "protocol constants",
                self.client
                    .protocol_constants(&self.chain_id, &head.hash, &protocols.protocol),
            )
            .await?;

            session.minimal_block_delay = minimal_block_delay(constants)?;
            session.proto = head.header.proto;
        }

        Ok(())
    }

    fn publish_delay(&self, ok: bool) {
        self.block_delay_ok.set(ok);
        self.metrics.block_delay_ok.set(f64::from(u8::from(ok)));
    }
}

fn minimal_block_delay(constants: ProtocolConstants) -> Result<TimeDelta> {
    i64::try_from(constants.minimal_block_delay)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .ok_or(Error::TimeOverflow)
}

#[cfg(test)]
mod tests {
    use sentinel_node_client_mock::{
        Call, Method, MockBlock, MockNodeClient, mock_block_hash, mock_protocol_hash,
    };

    use super::*;

    fn options() -> HeadMonitorOptions {
        HeadMonitorOptions {
            chain_id: ChainId::default(),
            timeout: Duration::from_secs(5),
            tolerance: Duration::from_secs(1),
            reconnect_delay: Duration::from_secs(10),
            use_timestamps: true,
            registry: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_head_in_time() {
        let protocol = mock_protocol_hash(1);
        let client = MockNodeClient::new(vec![
            MockBlock::new(1, 0, 0, protocol, 8),
            MockBlock::new(2, 0, 8, protocol, 8),
        ]);

        let monitor = HeadMonitor::connect(client.clone(), options()).await.unwrap();
        assert!(!monitor.block_delay_ok());

        monitor.start().await.unwrap();
        client.wait_heads_exhausted(1).await;

        assert!(monitor.block_delay_ok());
        monitor.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_head() {
        let protocol = mock_protocol_hash(1);
        let client = MockNodeClient::new(vec![
            MockBlock::new(1, 0, 0, protocol, 8),
            MockBlock::new(2, 0, 8, protocol, 8),
            MockBlock::new(3, 0, 17, protocol, 8),
        ]);

        let monitor = HeadMonitor::connect(client.clone(), options()).await.unwrap();
        monitor.start().await.unwrap();
        client.wait_heads_exhausted(1).await;

        // 17 is not before 8 + 8 + 1.
        assert!(!monitor.block_delay_ok());
        monitor.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_protocol_upgrade_refreshes_constants() {
        let old = mock_protocol_hash(1);
        let new = mock_protocol_hash(2);
        let client = MockNodeClient::new(vec![
            MockBlock::new(1, 0, 0, old, 10).with_next_protocol(new),
            MockBlock::new(2, 1, 5, new, 2),
            MockBlock::new(3, 1, 10, new, 2),
        ]);

        let mut options = options();
        options.tolerance = Duration::ZERO;
        let monitor = HeadMonitor::connect(client.clone(), options).await.unwrap();

        assert_eq!(monitor.protocols_reader().next_protocol(), Some(new));

        monitor.start().await.unwrap();
        client.wait_heads_exhausted(1).await;

        // Block 3 is judged against the new constant: 10 is not before 5 + 2.
        assert!(!monitor.block_delay_ok());

        let chain = ChainId::default();
        assert_eq!(
            client.calls(),
            vec![
                Call::BasicBlockInfo {
                    chain,
                    block: BlockId::Head
                },
                Call::BasicBlockInfo {
                    chain,
                    block: BlockId::Head
                },
                Call::ShellHeader {
                    chain,
                    block: mock_block_hash(1)
                },
                Call::ProtocolConstants {
                    chain,
                    block: mock_block_hash(1),
                    protocol: old
                },
                Call::Heads { chain },
                Call::BlockProtocols {
                    chain,
                    block: mock_block_hash(2)
                },
                Call::ProtocolConstants {
                    chain,
                    block: mock_block_hash(2),
                    protocol: new
                },
                Call::BlockProtocols {
                    chain,
                    block: mock_block_hash(3)
                },
            ]
        );

        monitor.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_upgrade_head_judged_by_previous_constant() {
        let old = mock_protocol_hash(1);
        let new = mock_protocol_hash(2);
        let client = MockNodeClient::new(vec![
            MockBlock::new(1, 0, 0, old, 10).with_next_protocol(new),
            MockBlock::new(2, 1, 5, new, 2),
        ]);

        let mut options = options();
        options.tolerance = Duration::ZERO;
        let monitor = HeadMonitor::connect(client.clone(), options).await.unwrap();
        monitor.start().await.unwrap();
        client.wait_heads_exhausted(1).await;

        // 5 is before 0 + 10; the new delay of 2 only applies to later heads.
        assert!(monitor.block_delay_ok());
        assert_eq!(client.call_count(Method::ProtocolConstants), 2);

        monitor.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_after_failed_constants_refresh() {
        let old = mock_protocol_hash(1);
        let new = mock_protocol_hash(2);
        let client = MockNodeClient::new(vec![
            MockBlock::new(1, 0, 0, old, 8).with_next_protocol(new),
            MockBlock::new(2, 1, 1, new, 8),
        ]);
        // The first fetch happens during initialization.
        client.fail_after(Method::ProtocolConstants, 1, 1);

        let monitor = HeadMonitor::connect(client.clone(), options()).await.unwrap();
        monitor.start().await.unwrap();
        client.wait_heads_exhausted(1).await;

        // Block 2 was in time, but the failed refresh forced a reconnect.
        assert!(!monitor.block_delay_ok());
        assert_eq!(client.call_count(Method::ProtocolConstants), 3);
        assert_eq!(client.call_count(Method::Heads), 2);
        assert_eq!(client.call_count(Method::ShellHeader), 2);

        let chain = ChainId::default();
        assert_eq!(client.calls().last(), Some(&Call::Heads { chain }));
        assert!(client.calls().contains(&Call::ShellHeader {
            chain,
            block: mock_block_hash(2)
        }));

        monitor.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_after_failed_fetch() {
        let protocol = mock_protocol_hash(1);
        let client = MockNodeClient::new(vec![
            MockBlock::new(1, 0, 0, protocol, 8),
            MockBlock::new(2, 0, 1, protocol, 8),
        ]);
        client.fail_next(Method::BlockProtocols, 1);

        let monitor = HeadMonitor::connect(client.clone(), options()).await.unwrap();
        monitor.start().await.unwrap();
        client.wait_heads_exhausted(1).await;

        assert_eq!(client.call_count(Method::Heads), 2);
        assert_eq!(client.call_count(Method::ShellHeader), 2);
        assert!(!monitor.block_delay_ok());

        monitor.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_initialization() {
        let protocol = mock_protocol_hash(1);
        let client = MockNodeClient::new(vec![
            MockBlock::new(1, 0, 0, protocol, 8),
            MockBlock::new(2, 0, 1, protocol, 8),
        ]);

        let monitor = HeadMonitor::connect(client.clone(), options()).await.unwrap();
        client.fail_next(Method::ShellHeader, 2);

        monitor.start().await.unwrap();
        client.wait_heads_exhausted(1).await;

        assert_eq!(client.call_count(Method::ShellHeader), 3);
        assert_eq!(client.call_count(Method::Heads), 1);
        assert!(monitor.block_delay_ok());

        monitor.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_arrival_time_mode() {
        let protocol = mock_protocol_hash(1);
        let now = Utc::now().timestamp();
        let client = MockNodeClient::new(vec![
            MockBlock::new(1, 0, now, protocol, 60),
            MockBlock::new(2, 0, now - 3600, protocol, 60),
        ]);

        let mut options = options();
        options.use_timestamps = false;
        let monitor = HeadMonitor::connect(client.clone(), options).await.unwrap();
        monitor.start().await.unwrap();
        client.wait_heads_exhausted(1).await;

        // The stale block timestamp is ignored.
        assert!(monitor.block_delay_ok());
        monitor.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_fails_when_node_unreachable() {
        let client = MockNodeClient::new(vec![MockBlock::new(
            1,
            0,
            0,
            mock_protocol_hash(1),
            8,
        )]);
        client.fail_next(Method::BasicBlockInfo, 1);

        assert!(matches!(
            HeadMonitor::connect(client, options()).await,
            Err(Error::Client(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_keeps_last_verdict() {
        let protocol = mock_protocol_hash(1);
        let client = MockNodeClient::new(vec![
            MockBlock::new(1, 0, 0, protocol, 8),
            MockBlock::new(2, 0, 1, protocol, 8),
        ]);

        let monitor = HeadMonitor::connect(client.clone(), options()).await.unwrap();
        monitor.start().await.unwrap();
        client.wait_heads_exhausted(1).await;

        monitor
            .shutdown_within(Some(Duration::from_secs(1)))
            .await
            .unwrap();

        assert!(monitor.block_delay_ok());
        assert!(matches!(monitor.start().await, Err(Error::AlreadyStarted)));
    }

    #[test]
    fn test_minimal_block_delay_overflow() {
        assert!(matches!(
            minimal_block_delay(ProtocolConstants {
                minimal_block_delay: u64::MAX
            }),
            Err(Error::TimeOverflow)
        ));
        assert_eq!(
            minimal_block_delay(ProtocolConstants {
                minimal_block_delay: 8
            })
            .unwrap(),
            TimeDelta::seconds(8)
        );
    }
}
