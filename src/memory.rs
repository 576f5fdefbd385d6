use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use num_bigint::BigUint;
use tracing::warn;

use crate::db::Store;
use crate::error::StoreError;
use crate::types::{BlockRow, ContractEventRow, TokenStats, TokenTransferRow, TransactionRow};

type LogKey = (String, u64);

#[derive(Default)]
struct Tables {
    blocks: BTreeMap<u64, BlockRow>,
    transactions: BTreeMap<String, TransactionRow>,
    token_transfers: BTreeMap<LogKey, TokenTransferRow>,
    contract_events: BTreeMap<LogKey, ContractEventRow>,
}

/// Store kept in process memory with the same first-write-wins semantics as Postgres
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|e| StoreError::Msg(format!("memory store lock poisoned: {}", e)))
    }

    pub fn blocks(&self) -> Vec<BlockRow> {
        self.lock().map(|t| t.blocks.values().cloned().collect()).unwrap_or_default()
    }

    pub fn transactions(&self) -> Vec<TransactionRow> {
        self.lock().map(|t| t.transactions.values().cloned().collect()).unwrap_or_default()
    }

    pub fn token_transfers(&self) -> Vec<TokenTransferRow> {
        self.lock().map(|t| t.token_transfers.values().cloned().collect()).unwrap_or_default()
    }

    pub fn contract_events(&self) -> Vec<ContractEventRow> {
        self.lock().map(|t| t.contract_events.values().cloned().collect()).unwrap_or_default()
    }

    fn top_tokens(&self, limit: u32, window_days: u32) -> Result<Vec<TokenStats>, StoreError> {
        #[derive(Default)]
        struct Acc {
            count: u64,
            senders: BTreeSet<String>,
            receivers: BTreeSet<String>,
            volume: BigUint,
        }

        // Windows reaching past the representable range cover every transfer
        let since = Duration::try_days(i64::from(window_days))
            .and_then(|window| Utc::now().checked_sub_signed(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let tables = self.lock()?;

        let mut per_token: HashMap<&str, Acc> = HashMap::new();
        for transfer in tables.token_transfers.values().filter(|t| t.timestamp > since) {
            let Ok(value) = transfer.value.parse::<BigUint>() else {
                warn!(
                    "Transfer {}:{} has a non-decimal value {}, excluded from volume",
                    transfer.tx_hash, transfer.log_index, transfer.value
                );
                continue;
            };
            let acc = per_token.entry(transfer.token_address.as_str()).or_default();
            acc.count += 1;
            acc.senders.insert(transfer.from_address.clone());
            acc.receivers.insert(transfer.to_address.clone());
            acc.volume += value;
        }

        let mut ranked: Vec<(&str, Acc)> = per_token.into_iter().collect();
        ranked.sort_by(|(a_token, a), (b_token, b)| {
            b.volume.cmp(&a.volume).then_with(|| a_token.cmp(b_token))
        });

        Ok(ranked
            .into_iter()
            .take(limit as usize)
            .map(|(token, acc)| TokenStats {
                token_address: token.to_string(),
                transfer_count: acc.count,
                unique_senders: acc.senders.len() as u64,
                unique_receivers: acc.receivers.len() as u64,
                total_volume: acc.volume.to_string(),
            })
            .collect())
    }
}

impl Store for MemoryStore {
    async fn insert_block(&self, block: &BlockRow) -> Result<bool, StoreError> {
        let mut tables = self.lock()?;
        // Hash is unique as well as the number
        if tables.blocks.values().any(|b| b.hash == block.hash) {
            return Ok(false);
        }
        Ok(insert_if_absent(&mut tables.blocks, block.number, block))
    }

    async fn insert_transaction(&self, tx: &TransactionRow) -> Result<bool, StoreError> {
        let mut tables = self.lock()?;
        Ok(insert_if_absent(&mut tables.transactions, tx.hash.clone(), tx))
    }

    async fn insert_token_transfer(&self, transfer: &TokenTransferRow) -> Result<bool, StoreError> {
        let mut tables = self.lock()?;
        let key = (transfer.tx_hash.clone(), transfer.log_index);
        Ok(insert_if_absent(&mut tables.token_transfers, key, transfer))
    }

    async fn insert_contract_event(&self, event: &ContractEventRow) -> Result<bool, StoreError> {
        let mut tables = self.lock()?;
        let key = (event.tx_hash.clone(), event.log_index);
        Ok(insert_if_absent(&mut tables.contract_events, key, event))
    }

    async fn top_tokens_by_volume(&self, limit: u32, window_days: u32) -> Result<Vec<TokenStats>, StoreError> {
        self.top_tokens(limit, window_days)
    }
}

fn insert_if_absent<K: Ord, V: Clone>(table: &mut BTreeMap<K, V>, key: K, row: &V) -> bool {
    match table.entry(key) {
        std::collections::btree_map::Entry::Occupied(_) => false,
        std::collections::btree_map::Entry::Vacant(slot) => {
            slot.insert(row.clone());
            true
        }
    }
}
