use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error};

use crate::db::Store;
use crate::error::StoreError;
use crate::types::{BlockRow, ContractEventRow, TokenTransferRow, TransactionRow};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum WriteOutcome {
    Inserted,
    Duplicate,
    Failed(String),
}

impl WriteOutcome {
    fn from_result(entity: &str, key: &str, result: Result<bool, StoreError>) -> Self {
        match result {
            Ok(true) => WriteOutcome::Inserted,
            Ok(false) => {
                debug!("{} {} already stored, skipping", entity, key);
                WriteOutcome::Duplicate
            }
            Err(e) => {
                error!("Failed to store {} {}: {}", entity, key, e);
                WriteOutcome::Failed(e.to_string())
            }
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, WriteOutcome::Failed(_))
    }
}

/// Per-entity write counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteTally {
    pub inserted: u64,
    pub duplicates: u64,
    pub failed: u64,
}

impl WriteTally {
    pub fn record(&mut self, outcome: &WriteOutcome) {
        match outcome {
            WriteOutcome::Inserted => self.inserted += 1,
            WriteOutcome::Duplicate => self.duplicates += 1,
            WriteOutcome::Failed(_) => self.failed += 1,
        }
    }

    pub fn merge(&mut self, other: &WriteTally) {
        self.inserted += other.inserted;
        self.duplicates += other.duplicates;
        self.failed += other.failed;
    }

    pub fn total(&self) -> u64 {
        self.inserted + self.duplicates + self.failed
    }
}

/// Writes rows one at a time; a failed row never stops the rows after it
pub struct Persister<S> {
    store: Arc<S>,
}

impl<S> Clone for Persister<S> {
    fn clone(&self) -> Self {
        Self { store: Arc::clone(&self.store) }
    }
}

impl<S: Store> Persister<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub async fn write_block(&self, block: &BlockRow) -> WriteOutcome {
        let result = self.store.insert_block(block).await;
        WriteOutcome::from_result("block", &block.number.to_string(), result)
    }

    pub async fn write_transaction(&self, tx: &TransactionRow) -> WriteOutcome {
        let result = self.store.insert_transaction(tx).await;
        WriteOutcome::from_result("transaction", &tx.hash, result)
    }

    pub async fn write_token_transfer(&self, transfer: &TokenTransferRow) -> WriteOutcome {
        let result = self.store.insert_token_transfer(transfer).await;
        let key = format!("{}:{}", transfer.tx_hash, transfer.log_index);
        WriteOutcome::from_result("token transfer", &key, result)
    }

    pub async fn write_contract_event(&self, event: &ContractEventRow) -> WriteOutcome {
        let result = self.store.insert_contract_event(event).await;
        let key = format!("{}:{} ({})", event.tx_hash, event.log_index, event.event_name);
        WriteOutcome::from_result("contract event", &key, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::types::TokenStats;
    use chrono::Utc;
    use std::future::Future;

    struct FailingStore;

    impl Store for FailingStore {
        fn insert_block(&self, _block: &BlockRow) -> impl Future<Output = Result<bool, StoreError>> + Send {
            async { Err(StoreError::Msg("disk full".to_string())) }
        }

        fn insert_transaction(&self, _tx: &TransactionRow) -> impl Future<Output = Result<bool, StoreError>> + Send {
            async { Err(StoreError::Msg("disk full".to_string())) }
        }

        fn insert_token_transfer(
            &self,
            _transfer: &TokenTransferRow,
        ) -> impl Future<Output = Result<bool, StoreError>> + Send {
            async { Err(StoreError::Msg("disk full".to_string())) }
        }

        fn insert_contract_event(
            &self,
            _event: &ContractEventRow,
        ) -> impl Future<Output = Result<bool, StoreError>> + Send {
            async { Err(StoreError::Msg("disk full".to_string())) }
        }

        fn top_tokens_by_volume(
            &self,
            _limit: u32,
            _window_days: u32,
        ) -> impl Future<Output = Result<Vec<TokenStats>, StoreError>> + Send {
            async { Ok(Vec::new()) }
        }
    }

    fn transaction(hash: &str, value: &str) -> TransactionRow {
        TransactionRow {
            hash: hash.to_string(),
            from_address: "0x01".to_string(),
            to_address: None,
            value: value.to_string(),
            gas_price: "1".to_string(),
            gas_used: 21_000,
            block_number: 1,
            timestamp: Utc::now(),
            status: 1,
            input_data: "0x".to_string(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_is_reported_and_first_write_kept() {
        let store = Arc::new(MemoryStore::new());
        let persister = Persister::new(Arc::clone(&store));

        assert_eq!(persister.write_transaction(&transaction("0xaa", "1")).await, WriteOutcome::Inserted);
        assert_eq!(persister.write_transaction(&transaction("0xaa", "2")).await, WriteOutcome::Duplicate);

        let stored = store.transactions();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].value, "1");
    }

    #[tokio::test]
    async fn test_failure_is_an_outcome() {
        let persister = Persister::new(Arc::new(FailingStore));
        let outcome = persister.write_transaction(&transaction("0xaa", "1")).await;
        assert!(outcome.is_failed());

        let mut tally = WriteTally::default();
        tally.record(&outcome);
        tally.record(&WriteOutcome::Inserted);
        tally.record(&WriteOutcome::Duplicate);
        assert_eq!(tally, WriteTally { inserted: 1, duplicates: 1, failed: 1 });
        assert_eq!(tally.total(), 3);
    }
}
