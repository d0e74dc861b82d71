use thiserror::Error;

/// Configuration rejected at startup
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("concurrency must be greater than 0")]
    Concurrency,

    #[error("contract address must be provided")]
    ContractAddress,

    #[error("contract ABI must be provided")]
    ContractAbi,

    #[error("start block must be greater than or equal to 0")]
    StartBlock,

    #[error("event name must be provided")]
    EventName,

    #[error("addresses must be provided")]
    Addresses,

    #[error("block batch size must be greater than 0")]
    BlockBatchSize,

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid contract ABI: {0}")]
    InvalidAbi(String),

    #[error("event {0} not found in contract ABI")]
    UnknownEvent(String),

    #[error("event {event} has no parameter named {field}")]
    UnknownOwnerField { event: String, field: String },
}
