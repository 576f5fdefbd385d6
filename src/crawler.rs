use std::sync::Arc;

use alloy::consensus::TxReceipt;
use alloy::network::TransactionResponse;
use alloy::rpc::types::{Filter, Transaction};
use tracing::{debug, error, info, warn};

use crate::contracts::ContractRegistry;
use crate::db::Store;
use crate::error::{CrawlerError, CrawlerResult, DecodeError};
use crate::normalizer::{full_transactions, normalize_block, normalize_transaction};
use crate::persister::{Persister, WriteOutcome, WriteTally};
use crate::report::{BatchOutcome, BlockReport, EventsOutcome, RunSummary, TransactionOutcome};
use crate::rpc::ChainSource;
use crate::scheduler::{Batch, RangeScheduler};
use crate::transfers::extract_transfers;
use crate::types::{address_hex, hash_hex, BlockRow, ContractEventRow};

/// Sequential ingestion pipeline: one batch, one block, one transaction at a time
pub struct Crawler<C, S> {
    chain: C,
    persister: Persister<S>,
    contracts: Arc<ContractRegistry>,
}

impl<C: ChainSource, S: Store> Crawler<C, S> {
    pub fn new(chain: C, store: Arc<S>, contracts: Arc<ContractRegistry>) -> Self {
        Self {
            chain,
            persister: Persister::new(store),
            contracts,
        }
    }

    pub async fn run(&self, scheduler: &RangeScheduler) -> RunSummary {
        if self.contracts.is_empty() {
            info!("No contracts configured, contract event decoding disabled");
        } else {
            info!("Decoding events of {} configured contract(s)", self.contracts.len());
        }

        scheduler.run(|batch| self.process_batch(batch)).await
    }

    /// Any block error stops the rest of the batch
    pub async fn process_batch(&self, batch: Batch) -> BatchOutcome {
        let mut processed = Vec::new();

        for number in batch.blocks() {
            match self.process_block(number).await {
                Ok(report) => processed.push(report),
                Err(e) => {
                    return BatchOutcome::Failed {
                        batch,
                        failed_block: number,
                        error: e.to_string(),
                        processed,
                    }
                }
            }
        }

        BatchOutcome::Completed { batch, blocks: processed }
    }

    pub async fn process_block(&self, number: u64) -> CrawlerResult<BlockReport> {
        let block = self.chain.block_by_number(number).await?;
        let block_row = normalize_block(&block);

        let block_write = self.persister.write_block(&block_row).await;
        if let WriteOutcome::Failed(reason) = &block_write {
            return Err(CrawlerError::BlockNotPersisted {
                number,
                reason: reason.clone(),
            });
        }

        let txs = full_transactions(&block);
        if txs.len() as u64 != block_row.tx_count {
            warn!("Block {} came back without full transaction objects", number);
        }

        let mut transactions = Vec::with_capacity(txs.len());
        for tx in txs {
            transactions.push(self.process_transaction(tx, &block_row).await);
        }

        let events = self.process_contract_events(&block_row).await;

        debug!(
            "Processed block {}: {} transactions, events {:?}",
            number,
            transactions.len(),
            events
        );

        Ok(BlockReport {
            number,
            block: block_write,
            transactions,
            events,
        })
    }

    /// A missing receipt skips only this transaction
    async fn process_transaction(&self, tx: &Transaction, block: &BlockRow) -> TransactionOutcome {
        let tx_hash = tx.tx_hash();

        let receipt = match self.chain.receipt_by_hash(tx_hash).await {
            Ok(receipt) => receipt,
            Err(e) => {
                warn!("Skipping tx {:#x} in block {}: {}", tx_hash, block.number, e);
                return TransactionOutcome::Skipped {
                    hash: hash_hex(&tx_hash),
                    reason: e.to_string(),
                };
            }
        };

        let row = normalize_transaction(tx, &receipt, block);
        let write = self.persister.write_transaction(&row).await;

        let mut transfers = WriteTally::default();
        for transfer in extract_transfers(receipt.inner.logs(), tx_hash, block.number, block.timestamp) {
            transfers.record(&self.persister.write_token_transfer(&transfer).await);
        }

        TransactionOutcome::Processed {
            hash: row.hash,
            write,
            transfers,
        }
    }

    /// One log query per block over every configured contract address
    async fn process_contract_events(&self, block: &BlockRow) -> EventsOutcome {
        if self.contracts.is_empty() {
            return EventsOutcome::NotConfigured;
        }

        let filter = Filter::new()
            .from_block(block.number)
            .to_block(block.number)
            .address(self.contracts.addresses());

        let logs = match self.chain.logs(&filter).await {
            Ok(logs) => logs,
            Err(e) => {
                error!("Failed to fetch contract logs of block {}: {}", block.number, e);
                return EventsOutcome::Failed(e.to_string());
            }
        };

        let mut writes = WriteTally::default();
        let mut decode_failures = 0u64;

        for log in &logs {
            let Some(decoded) = self.contracts.decode_log(&log.inner) else {
                continue;
            };

            let event = match decoded {
                Ok(event) => event,
                Err(e) => {
                    warn!(
                        "Failed to decode log {:?} of tx {:?} in block {}: {}",
                        log.log_index, log.transaction_hash, block.number, e
                    );
                    decode_failures += 1;
                    continue;
                }
            };

            let (Some(tx_hash), Some(log_index)) = (log.transaction_hash, log.log_index) else {
                let missing = if log.transaction_hash.is_none() { "transaction hash" } else { "log index" };
                warn!(
                    "{}",
                    DecodeError::MissingLogField {
                        event: event.name.clone(),
                        field: missing,
                    }
                );
                decode_failures += 1;
                continue;
            };

            let row = ContractEventRow {
                tx_hash: hash_hex(&tx_hash),
                log_index,
                contract_address: address_hex(&event.contract),
                event_name: event.name,
                block_number: block.number,
                timestamp: block.timestamp,
                event_data: event.fields.into_iter().map(|p| (p.name, p.value)).collect(),
            };
            writes.record(&self.persister.write_contract_event(&row).await);
        }

        EventsOutcome::Processed { writes, decode_failures }
    }
}
