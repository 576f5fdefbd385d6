use alloy::primitives::B256;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CrawlerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Block {number} was not persisted: {reason}")]
    BlockNotPersisted { number: u64, reason: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration source error: {0}")]
    Source(#[from] config::ConfigError),
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("RPC transport error: {0}")]
    Transport(#[from] alloy::transports::TransportError),
    #[error("Invalid RPC endpoint URL: {0}")]
    Url(String),
    #[error("Chain ID mismatch: expected {expected}, got {actual}")]
    ChainIdMismatch { expected: u64, actual: u64 },
    #[error("Block {0} not found")]
    BlockNotFound(u64),
    #[error("Receipt for transaction {0:#x} not found")]
    ReceiptNotFound(B256),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Postgres database error: {0}")]
    Postgres(#[from] tokio_postgres::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Value out of range for column {column}: {value}")]
    OutOfRange { column: &'static str, value: String },
    #[error("Store error: {0}")]
    Msg(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Event {event} has no topics")]
    MissingTopics { event: String },
    #[error("Not enough topics for indexed parameter {param} of event {event}")]
    NotEnoughTopics { event: String, param: String },
    #[error("Failed to resolve type {ty} of parameter {param}: {reason}")]
    UnknownType { param: String, ty: String, reason: String },
    #[error("Failed to decode {what} of event {event}: {reason}")]
    Abi { event: String, what: String, reason: String },
    #[error("Log of event {event} is missing {field}")]
    MissingLogField { event: String, field: &'static str },
}

pub type CrawlerResult<T> = Result<T, CrawlerError>;
