use std::path::PathBuf;

use alloy_primitives::Address;
use color_eyre::Result;
use serde::Deserialize;

use super::ConfigError;

/// Settings of the scan-and-count engine
#[derive(Deserialize, Clone, Debug)]
pub struct CounterConfig {
    /// Max number of logs decoded concurrently within a batch
    pub concurrency: i64,

    /// Contract emitting the tracked event
    pub contract_address: String,

    /// JSON ABI of the contract. Loaded from `contract_abi_file` when empty
    #[serde(default)]
    pub contract_abi: String,

    #[serde(default)]
    pub contract_abi_file: Option<PathBuf>,

    #[serde(default)]
    pub start_block: i64,

    pub event_name: String,

    /// Name of the decoded event parameter holding the owner address
    #[serde(default = "default_owner_field")]
    pub owner_field: String,

    /// Addresses whose events are counted
    pub addresses: Vec<String>,

    pub block_batch_size: i64,
}

impl CounterConfig {
    /// Checks every field, failing on the first violation
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency <= 0 {
            return Err(ConfigError::Concurrency);
        }
        if self.contract_address.is_empty() {
            return Err(ConfigError::ContractAddress);
        }
        if self.contract_abi.is_empty() {
            return Err(ConfigError::ContractAbi);
        }
        if self.start_block < 0 {
            return Err(ConfigError::StartBlock);
        }
        if self.event_name.is_empty() {
            return Err(ConfigError::EventName);
        }
        if self.addresses.is_empty() {
            return Err(ConfigError::Addresses);
        }
        if self.block_batch_size <= 0 {
            return Err(ConfigError::BlockBatchSize);
        }

        Ok(())
    }

    pub fn start_block(&self) -> u64 {
        u64::try_from(self.start_block).unwrap_or_default()
    }

    pub fn concurrency(&self) -> usize {
        usize::try_from(self.concurrency).unwrap_or_default()
    }

    pub fn block_batch_size(&self) -> u64 {
        u64::try_from(self.block_batch_size).unwrap_or_default()
    }

    pub fn contract_address(&self) -> Result<Address, ConfigError> {
        parse_address(&self.contract_address)
    }

    pub fn tracked_addresses(&self) -> Result<Vec<Address>, ConfigError> {
        self.addresses.iter().map(|a| parse_address(a)).collect()
    }

    pub(super) fn preload(&mut self) -> Result<()> {
        if !self.contract_abi.is_empty() {
            return Ok(());
        }

        if let Some(file) = &self.contract_abi_file {
            self.contract_abi = std::fs::read_to_string(file)?;
        }

        Ok(())
    }

    #[cfg(test)]
    pub fn for_test(addresses: Vec<Address>) -> Self {
        Self {
            concurrency: 10,
            contract_address: "0x1234567890abcdef1234567890abcdef12345678".to_owned(),
            contract_abi: crate::test_utils::ABI.to_owned(),
            contract_abi_file: None,
            start_block: 0,
            event_name: "ValidatorAdded".to_owned(),
            owner_field: default_owner_field(),
            addresses: addresses.iter().map(|a| a.to_string()).collect(),
            block_batch_size: 100,
        }
    }
}

/// Parses an address regardless of hex casing or checksum
pub fn parse_address(s: &str) -> Result<Address, ConfigError> {
    s.trim()
        .to_ascii_lowercase()
        .parse()
        .map_err(|_| ConfigError::InvalidAddress(s.to_owned()))
}

fn default_owner_field() -> String {
    "owner".to_owned()
}
