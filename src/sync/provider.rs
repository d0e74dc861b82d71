use alloy_primitives::{Address, Bytes, B256, U64};
use async_trait::async_trait;
use color_eyre::eyre::Result;
use serde::Deserialize;

use super::BlockRange;

/// A log as returned by `eth_getLogs`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,

    #[serde(default)]
    pub block_number: Option<U64>,

    #[serde(default)]
    pub log_index: Option<U64>,

    #[serde(default)]
    pub transaction_hash: Option<B256>,
}

/// Read access to the chain
///
/// The counter is only coupled to this trait, so the underlying node client can be swapped out,
/// including for testing purposes
#[async_trait]
pub trait ChainTransport: Send + Sync {
    /// Number of the latest block
    async fn current_tip(&self) -> Result<u64>;

    /// All logs emitted by `contract` within `range`, bounds inclusive
    async fn fetch_logs(&self, range: BlockRange, contract: Address) -> Result<Vec<RawLog>>;
}
