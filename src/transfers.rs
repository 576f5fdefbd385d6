use alloy::primitives::{b256, Address, B256, U256};
use alloy::rpc::types::Log;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::types::{address_hex, hash_hex, TokenTransferRow};

/// keccak256("Transfer(address,address,uint256)")
pub const TRANSFER_TOPIC: B256 =
    b256!("ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef");

/// Canonical ERC-20 transfer: three topics and a single 32-byte amount word.
/// ERC-721 transfers index the token id and carry no data, so they never match.
pub fn decode_transfer(log: &alloy::primitives::Log) -> Option<(Address, Address, U256)> {
    let topics = log.topics();
    if topics.len() != 3 || topics[0] != TRANSFER_TOPIC {
        return None;
    }

    let data = &log.data.data;
    if data.len() != 32 {
        return None;
    }

    let from = Address::from_word(topics[1]);
    let to = Address::from_word(topics[2]);
    let value = U256::from_be_slice(data);
    Some((from, to, value))
}

/// Token transfer rows for the logs of one transaction receipt
pub fn extract_transfers(
    logs: &[Log],
    tx_hash: B256,
    block_number: u64,
    timestamp: DateTime<Utc>,
) -> Vec<TokenTransferRow> {
    logs.iter()
        .filter_map(|log| {
            let (from, to, value) = decode_transfer(&log.inner)?;
            let Some(log_index) = log.log_index else {
                debug!("Transfer log in tx {:#x} has no log index, skipping", tx_hash);
                return None;
            };
            Some(TokenTransferRow {
                tx_hash: hash_hex(&tx_hash),
                log_index,
                from_address: address_hex(&from),
                to_address: address_hex(&to),
                value: value.to_string(),
                token_address: address_hex(&log.address()),
                block_number,
                timestamp,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{keccak256, Bytes, LogData};

    fn transfer_log(topics: Vec<B256>, data: Vec<u8>, log_index: Option<u64>) -> Log {
        Log {
            inner: alloy::primitives::Log {
                address: Address::repeat_byte(0x11),
                data: LogData::new_unchecked(topics, Bytes::from(data)),
            },
            log_index,
            ..Default::default()
        }
    }

    fn amount(value: u64) -> Vec<u8> {
        U256::from(value).to_be_bytes::<32>().to_vec()
    }

    #[test]
    fn test_topic_matches_signature_hash() {
        assert_eq!(TRANSFER_TOPIC, keccak256("Transfer(address,address,uint256)"));
    }

    #[test]
    fn test_extracts_canonical_transfer() {
        let from = Address::repeat_byte(0xaa);
        let to = Address::repeat_byte(0xbb);
        let log = transfer_log(
            vec![TRANSFER_TOPIC, from.into_word(), to.into_word()],
            amount(0x64),
            Some(3),
        );
        let timestamp = DateTime::from_timestamp(1_700_000_000, 0).unwrap();

        let rows = extract_transfers(&[log], B256::repeat_byte(0x01), 42, timestamp);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.value, "100");
        assert_eq!(row.log_index, 3);
        assert_eq!(row.from_address, format!("0x{}", "aa".repeat(20)));
        assert_eq!(row.to_address, format!("0x{}", "bb".repeat(20)));
        assert_eq!(row.token_address, format!("0x{}", "11".repeat(20)));
        assert_eq!(row.block_number, 42);
        assert_eq!(row.timestamp, timestamp);
    }

    #[test]
    fn test_two_topics_do_not_match() {
        let log = transfer_log(vec![TRANSFER_TOPIC, B256::ZERO], amount(1), Some(0));
        assert!(decode_transfer(&log.inner).is_none());
    }

    #[test]
    fn test_erc721_shape_does_not_match() {
        let log = transfer_log(
            vec![TRANSFER_TOPIC, B256::ZERO, B256::ZERO, B256::with_last_byte(7)],
            Vec::new(),
            Some(0),
        );
        assert!(decode_transfer(&log.inner).is_none());
    }

    #[test]
    fn test_wrong_data_length_does_not_match() {
        let log = transfer_log(vec![TRANSFER_TOPIC, B256::ZERO, B256::ZERO], vec![0u8; 64], Some(0));
        assert!(decode_transfer(&log.inner).is_none());
    }

    #[test]
    fn test_other_topic_is_ignored() {
        let log = transfer_log(vec![B256::repeat_byte(0x02), B256::ZERO, B256::ZERO], amount(5), Some(0));
        assert!(extract_transfers(&[log], B256::ZERO, 1, Utc::now()).is_empty());
    }

    #[test]
    fn test_missing_log_index_is_skipped() {
        let log = transfer_log(vec![TRANSFER_TOPIC, B256::ZERO, B256::ZERO], amount(5), None);
        assert!(extract_transfers(&[log], B256::ZERO, 1, Utc::now()).is_empty());
    }
}
