use alloy::consensus::transaction::SignerRecoverable;
use alloy::consensus::TxReceipt;
use alloy::network::TransactionResponse;
use alloy::primitives::Address;
use alloy::rpc::types::{Block, Transaction, TransactionReceipt, TransactionTrait};
use tracing::warn;

use crate::types::{address_hex, hash_hex, timestamp_to_utc, BlockRow, TransactionRow};

pub fn normalize_block(block: &Block) -> BlockRow {
    let header = &block.header;

    BlockRow {
        number: header.number,
        hash: hash_hex(&header.hash),
        parent_hash: hash_hex(&header.parent_hash),
        timestamp: timestamp_to_utc(header.timestamp),
        gas_limit: header.gas_limit,
        gas_used: header.gas_used,
        miner: address_hex(&header.beneficiary),
        difficulty: header.difficulty.to_string(),
        total_difficulty: header.total_difficulty.map(|td| td.to_string()),
        size_bytes: header.size.map(|size| size.saturating_to::<u64>()),
        tx_count: block.transactions.len() as u64,
    }
}

/// Full transaction objects of a block fetched with `.full()`
pub fn full_transactions(block: &Block) -> &[Transaction] {
    block.transactions.as_transactions().unwrap_or_default()
}

/// Sender recovered from the envelope signature, not the `from` the node reports.
/// Legacy envelopes recover with the EIP-155 chain id they were signed with.
pub fn recover_sender(tx: &Transaction) -> Option<Address> {
    match tx.inner.inner().recover_signer() {
        Ok(sender) => Some(sender),
        Err(e) => {
            warn!("Failed to recover sender of tx {:#x}: {}", tx.tx_hash(), e);
            None
        }
    }
}

pub fn normalize_transaction(
    tx: &Transaction,
    receipt: &TransactionReceipt,
    block: &BlockRow,
) -> TransactionRow {
    let gas_price = TransactionTrait::gas_price(tx)
        .unwrap_or_else(|| TransactionTrait::max_fee_per_gas(tx));

    TransactionRow {
        hash: hash_hex(&tx.tx_hash()),
        from_address: recover_sender(tx).map(|a| address_hex(&a)).unwrap_or_default(),
        to_address: tx.to().map(|a| address_hex(&a)),
        value: tx.value().to_string(),
        gas_price: gas_price.to_string(),
        gas_used: receipt.gas_used,
        block_number: block.number,
        timestamp: block.timestamp,
        status: u8::from(receipt.inner.status()),
        input_data: format!("0x{}", hex::encode(tx.input())),
    }
}
