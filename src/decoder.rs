use alloy_primitives::Address;
use ethers_core::{
    abi::{self, Abi, Event, LogParam, Token},
    types::H256,
};
use thiserror::Error;

use crate::config::{ConfigError, CounterConfig};
use crate::sync::RawLog;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("log does not match event: {0}")]
    Mismatch(String),

    #[error("missing {0} parameter")]
    MissingOwner(String),

    #[error("{0} parameter is not an address")]
    OwnerNotAddress(String),
}

/// A log decoded into the tracked event
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedEvent {
    pub owner: Address,

    /// All decoded event parameters, owner included
    pub params: Vec<LogParam>,
}

/// Turns a raw log into a typed event.
/// Fails when the log's topics or data don't match the expected event shape
pub trait EventDecoder: Send + Sync {
    fn decode(&self, log: &RawLog) -> Result<DecodedEvent, DecodeError>;
}

/// Decodes a single event out of a contract's JSON ABI
#[derive(Debug, Clone)]
pub struct AbiDecoder {
    event: Event,
    owner_field: String,
}

impl AbiDecoder {
    pub fn new(schema: &str, event_name: &str, owner_field: &str) -> Result<Self, ConfigError> {
        let abi: Abi =
            serde_json::from_str(schema).map_err(|e| ConfigError::InvalidAbi(e.to_string()))?;

        let event = abi
            .event(event_name)
            .map_err(|_| ConfigError::UnknownEvent(event_name.to_owned()))?
            .clone();

        if !event.inputs.iter().any(|i| i.name == owner_field) {
            return Err(ConfigError::UnknownOwnerField {
                event: event_name.to_owned(),
                field: owner_field.to_owned(),
            });
        }

        Ok(Self {
            event,
            owner_field: owner_field.to_owned(),
        })
    }

    pub fn from_config(config: &CounterConfig) -> Result<Self, ConfigError> {
        Self::new(
            &config.contract_abi,
            &config.event_name,
            &config.owner_field,
        )
    }

    /// Topic identifying the event (keccak of its signature)
    pub fn topic0(&self) -> H256 {
        self.event.signature()
    }
}

impl EventDecoder for AbiDecoder {
    fn decode(&self, log: &RawLog) -> Result<DecodedEvent, DecodeError> {
        let raw = abi::RawLog {
            topics: log.topics.iter().map(|t| H256::from(t.0)).collect(),
            data: log.data.to_vec(),
        };

        let parsed = self
            .event
            .parse_log(raw)
            .map_err(|e| DecodeError::Mismatch(e.to_string()))?;

        let owner = parsed
            .params
            .iter()
            .find(|p| p.name == self.owner_field)
            .ok_or_else(|| DecodeError::MissingOwner(self.owner_field.clone()))?;

        let owner = match owner.value {
            Token::Address(address) => Address::from(address.0),
            _ => return Err(DecodeError::OwnerNotAddress(self.owner_field.clone())),
        };

        Ok(DecodedEvent {
            owner,
            params: parsed.params,
        })
    }
}
