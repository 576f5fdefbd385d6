use std::collections::BTreeMap;

use alloy::primitives::{Address, B256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event_decoder::FieldValue;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRow {
    pub number: u64,
    pub hash: String,
    pub parent_hash: String,
    pub timestamp: DateTime<Utc>,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub miner: String,
    pub difficulty: String, // Decimal string, may exceed 64 bits
    pub total_difficulty: Option<String>, // Only set when the node reports it
    pub size_bytes: Option<u64>,
    pub tx_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRow {
    pub hash: String,
    pub from_address: String, // Empty when sender recovery fails
    pub to_address: Option<String>, // None for contract creation
    pub value: String,
    pub gas_price: String,
    pub gas_used: u64,
    pub block_number: u64,
    pub timestamp: DateTime<Utc>,
    pub status: u8,
    pub input_data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenTransferRow {
    pub tx_hash: String,
    pub log_index: u64,
    pub from_address: String,
    pub to_address: String,
    pub value: String,
    pub token_address: String,
    pub block_number: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContractEventRow {
    pub tx_hash: String,
    pub log_index: u64,
    pub contract_address: String,
    pub event_name: String,
    pub block_number: u64,
    pub timestamp: DateTime<Utc>,
    pub event_data: BTreeMap<String, FieldValue>,
}

impl ContractEventRow {
    /// JSON object stored in the `event_data` column
    pub fn event_data_json(&self) -> serde_json::Value {
        let fields = self
            .event_data
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect();
        serde_json::Value::Object(fields)
    }
}

/// Aggregate over persisted token transfers, never stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenStats {
    pub token_address: String,
    pub transfer_count: u64,
    pub unique_senders: u64,
    pub unique_receivers: u64,
    pub total_volume: String,
}

pub fn address_hex(address: &Address) -> String {
    format!("{:#x}", address)
}

pub fn hash_hex(hash: &B256) -> String {
    format!("{:#x}", hash)
}

pub fn timestamp_to_utc(timestamp: u64) -> DateTime<Utc> {
    i64::try_from(timestamp)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or_default()
}
