use std::sync::atomic::{AtomicU64, Ordering};

use alloy_primitives::{Address, U64};
use async_trait::async_trait;
use color_eyre::eyre::{eyre, Result};
use serde_json::{json, Value};
use url::Url;

use super::{BlockRange, ChainTransport, RawLog};
use crate::config::RpcConfig;

/// JSON-RPC over HTTP
#[derive(Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: Url,
    next_id: AtomicU64,
}

impl HttpTransport {
    pub fn new(config: &RpcConfig) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::new(),
            url: Url::parse(&config.url)?,
            next_id: AtomicU64::new(1),
        })
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "method": method,
            "params": params,
        });

        let mut resp: Value = self
            .client
            .post(self.url.clone())
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(err) = resp.get("error") {
            return Err(eyre!("{} failed: {}", method, err));
        }

        resp.get_mut("result")
            .map(Value::take)
            .ok_or_else(|| eyre!("{} returned no result", method))
    }
}

#[async_trait]
impl ChainTransport for HttpTransport {
    async fn current_tip(&self) -> Result<u64> {
        let result = self.request("eth_blockNumber", json!([])).await?;
        let tip: U64 = serde_json::from_value(result)?;

        Ok(tip.to())
    }

    async fn fetch_logs(&self, range: BlockRange, contract: Address) -> Result<Vec<RawLog>> {
        let result = self
            .request("eth_getLogs", json!([logs_filter(range, contract)]))
            .await?;

        Ok(serde_json::from_value(result)?)
    }
}

fn logs_filter(range: BlockRange, contract: Address) -> Value {
    json!({
        "address": format!("{:#x}", contract),
        "fromBlock": format!("0x{:x}", range.from),
        "toBlock": format!("0x{:x}", range.to),
    })
}
