// src/rpc.rs
use alloy::primitives::{Address, B256};
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("RPC error: HTTP {0}")]
    Status(StatusCode),
    #[error("RPC node error {code}: {message}")]
    Node { code: i64, message: String },
    #[error("RPC response had neither result nor error")]
    EmptyResponse,
    #[error("Malformed RPC response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Invalid hex quantity: {0}")]
    Quantity(String),
}

/// Raw log as returned by `eth_getLogs`.
#[derive(Debug, Deserialize, Clone)]
pub struct Log {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,

    #[serde(rename = "blockNumber")]
    pub block_number_hex: String,

    #[serde(rename = "transactionHash")]
    pub tx_hash: String,

    #[serde(rename = "logIndex")]
    pub log_index_hex: String,

    /// Set by the node when the log was dropped in a reorg.
    #[serde(default)]
    pub removed: bool,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct BlockHeader {
    timestamp: String,
}

pub fn parse_quantity(hex: &str) -> Result<u64, RpcError> {
    u64::from_str_radix(hex.trim_start_matches("0x"), 16)
        .map_err(|_| RpcError::Quantity(hex.to_string()))
}

#[derive(Debug, Clone)]
pub struct RpcClient {
    client: Client,
    url: String,
}

impl RpcClient {
    pub fn new(url: &str) -> Result<Self, RpcError> {
        let client = Client::builder().timeout(Duration::from_secs(15)).build()?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RpcError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params
        });

        let resp = self.client.post(&self.url).json(&payload).send().await?;
        if resp.status() != StatusCode::OK {
            return Err(RpcError::Status(resp.status()));
        }

        let text = resp.text().await?;
        debug!("📩 Raw {} response: {}", method, text);

        let parsed: RpcResponse<T> = serde_json::from_str(&text)?;
        match (parsed.result, parsed.error) {
            (_, Some(err)) => Err(RpcError::Node {
                code: err.code,
                message: err.message,
            }),
            (Some(result), None) => Ok(result),
            (None, None) => Err(RpcError::EmptyResponse),
        }
    }

    /// Latest block number, retried on transport failures.
    pub async fn block_number(&self) -> Result<u64, RpcError> {
        let mut attempt = 1;
        loop {
            debug!("📡 Sending eth_blockNumber → {}", self.url);
            match self.call::<String>("eth_blockNumber", json!([])).await {
                Ok(hex) => return parse_quantity(&hex),
                Err(RpcError::Transport(e)) if attempt < MAX_ATTEMPTS => {
                    warn!(
                        "⚠️ RPC request failed (attempt {}): {}. Retrying...",
                        attempt, e
                    );
                    tokio::time::sleep(Duration::from_secs(2)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Unix timestamp of `block`. A block the node does not know yields `EmptyResponse`.
    pub async fn block_timestamp(&self, block: u64) -> Result<u64, RpcError> {
        debug!("📡 Sending eth_getBlockByNumber({}) → {}", block, self.url);
        let header: BlockHeader = self
            .call(
                "eth_getBlockByNumber",
                json!([format!("0x{:x}", block), false]),
            )
            .await?;
        parse_quantity(&header.timestamp)
    }

    /// Logs emitted by `address` in `[from_block, to_block]` whose topic0 is one of `topics`.
    pub async fn get_logs(
        &self,
        address: Address,
        topics: &[B256],
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Log>, RpcError> {
        let topic0: Vec<String> = topics.iter().map(|t| format!("{:#x}", t)).collect();
        let params = json!([{
            "fromBlock": format!("0x{:x}", from_block),
            "toBlock": format!("0x{:x}", to_block),
            "address": format!("{:#x}", address),
            "topics": [topic0]
        }]);

        info!(
            "📡 Sending eth_getLogs → {} (range {} → {}, contract {:#x})",
            self.url, from_block, to_block, address
        );

        self.call("eth_getLogs", params).await
    }
}
