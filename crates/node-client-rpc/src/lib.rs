//! An implementation of `NodeClient` over the node's JSON RPC.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod decoder;
mod error;

pub use decoder::JsonStreamDecoder;
pub use error::{Error, Result};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response};
use sentinel_node_client::{
    BasicBlockInfo, BlockHash, BlockId, BlockProtocols, BootstrapStatus, ChainId, Connection,
    Head, NodeClient, OperationGroup, PendingOperations, ProtocolConstants, ProtocolHash,
    ShellHeader, Subscription,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

/// JSON RPC node client.
#[derive(Clone, Debug)]
pub struct RpcNodeClient {
    client: Client,
    base_url: Url,
}

impl RpcNodeClient {
    /// Creates a client for the node listening at `base_url`.
    #[must_use]
    pub fn new(mut base_url: Url) -> Self {
        // Endpoint paths are joined relative to the base.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Self {
            client: Client::new(),
            base_url,
        }
    }

    fn url(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path)?;
        debug!("GET {}", url);

        let response = check_status(self.client.get(url).send().await?).await?;
        Ok(response.json().await?)
    }

    async fn subscribe<T>(
        &self,
        path: &str,
        cancellation_token: CancellationToken,
    ) -> Result<Subscription<T, Error>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let url = self.url(path)?;
        debug!("streaming GET {}", url);

        let response = tokio::select! {
            response = self.client.get(url).send() => check_status(response?).await?,
            () = cancellation_token.cancelled() => return Err(Error::Cancelled),
        };

        let mut body = Box::pin(response.bytes_stream());
        let stream = async_stream::stream! {
            let mut decoder = JsonStreamDecoder::<T>::new();
            loop {
                let chunk = tokio::select! {
                    biased;
                    () = cancellation_token.cancelled() => Err(Error::Cancelled),
                    chunk = body.next() => Ok(chunk),
                };

                match chunk {
                    Ok(Some(Ok(bytes))) => match decoder.push(&bytes) {
                        Ok(values) => {
                            for value in values {
                                yield Ok(value);
                            }
                        }
                        Err(e) => {
                            yield Err(Error::Json(e));
                            return;
                        }
                    },
                    Ok(Some(Err(e))) => {
                        yield Err(Error::Http(e));
                        return;
                    }
                    Ok(None) => {
                        yield Err(Error::StreamClosed);
                        return;
                    }
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "could not read response body".to_string());

    Err(Error::Status { status, body })
}

#[derive(Deserialize)]
struct BlockHeader {
    hash: BlockHash,
}

#[async_trait]
impl NodeClient for RpcNodeClient {
    type Error = Error;

    async fn basic_block_info(
        &self,
        chain: &ChainId,
        block: &BlockId,
    ) -> Result<BasicBlockInfo> {
        let header: BlockHeader = self
            .get(&format!("chains/{chain}/blocks/{block}/header"))
            .await?;
        let protocols = self.block_protocols(chain, &header.hash).await?;

        Ok(BasicBlockInfo {
            hash: header.hash,
            protocol: protocols.protocol,
            next_protocol: protocols.next_protocol,
        })
    }

    async fn shell_header(&self, chain: &ChainId, block: &BlockHash) -> Result<ShellHeader> {
        self.get(&format!("chains/{chain}/blocks/{block}/header/shell"))
            .await
    }

    async fn protocol_constants(
        &self,
        chain: &ChainId,
        block: &BlockHash,
        protocol: &ProtocolHash,
    ) -> Result<ProtocolConstants> {
        debug!("fetching constants of {} at {}", protocol, block);
        self.get(&format!("chains/{chain}/blocks/{block}/context/constants"))
            .await
    }

    async fn block_protocols(&self, chain: &ChainId, block: &BlockHash) -> Result<BlockProtocols> {
        self.get(&format!("chains/{chain}/blocks/{block}/protocols"))
            .await
    }

    async fn heads(
        &self,
        chain: &ChainId,
        cancellation_token: CancellationToken,
    ) -> Result<Subscription<Head, Error>> {
        self.subscribe(&format!("monitor/heads/{chain}"), cancellation_token)
            .await
    }

    async fn mempool_operations(
        &self,
        chain: &ChainId,
        cancellation_token: CancellationToken,
    ) -> Result<Subscription<Vec<OperationGroup>, Error>> {
        self.subscribe(
            &format!("chains/{chain}/mempool/monitor_operations?validated=true"),
            cancellation_token,
        )
        .await
    }

    async fn bootstrap_state(&self, chain: &ChainId) -> Result<BootstrapStatus> {
        self.get(&format!("chains/{chain}/is_bootstrapped")).await
    }

    async fn connections(&self) -> Result<Vec<Connection>> {
        self.get("network/connections").await
    }

    async fn pending_operations(&self, chain: &ChainId) -> Result<PendingOperations> {
        self.get(&format!("chains/{chain}/mempool/pending_operations?version=2"))
            .await
    }
}
