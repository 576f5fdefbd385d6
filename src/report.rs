use serde::Serialize;

use crate::persister::{WriteOutcome, WriteTally};
use crate::scheduler::Batch;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TransactionOutcome {
    Processed {
        hash: String,
        write: WriteOutcome,
        transfers: WriteTally,
    },
    /// Receipt could not be fetched, nothing of the transaction was written
    Skipped { hash: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum EventsOutcome {
    NotConfigured,
    Processed { writes: WriteTally, decode_failures: u64 },
    /// Log fetch failed, the rest of the block is unaffected
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockReport {
    pub number: u64,
    pub block: WriteOutcome,
    pub transactions: Vec<TransactionOutcome>,
    pub events: EventsOutcome,
}

impl BlockReport {
    pub fn skipped_transactions(&self) -> usize {
        self.transactions
            .iter()
            .filter(|t| matches!(t, TransactionOutcome::Skipped { .. }))
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum BatchOutcome {
    Completed {
        batch: Batch,
        blocks: Vec<BlockReport>,
    },
    Failed {
        batch: Batch,
        failed_block: u64,
        error: String,
        /// Blocks of the batch fully processed before the failure
        processed: Vec<BlockReport>,
    },
}

impl BatchOutcome {
    pub fn batch(&self) -> Batch {
        match self {
            BatchOutcome::Completed { batch, .. } | BatchOutcome::Failed { batch, .. } => *batch,
        }
    }

    pub fn blocks(&self) -> &[BlockReport] {
        match self {
            BatchOutcome::Completed { blocks, .. } => blocks,
            BatchOutcome::Failed { processed, .. } => processed,
        }
    }
}

/// Totals per entity kind across a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EntityTotals {
    pub blocks: WriteTally,
    pub transactions: WriteTally,
    pub skipped_transactions: u64,
    pub token_transfers: WriteTally,
    pub contract_events: WriteTally,
    pub event_decode_failures: u64,
    pub event_fetch_failures: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub batches: Vec<BatchOutcome>,
}

impl RunSummary {
    pub fn push(&mut self, outcome: BatchOutcome) {
        self.batches.push(outcome);
    }

    pub fn completed_batches(&self) -> impl Iterator<Item = Batch> + '_ {
        self.batches.iter().filter_map(|b| match b {
            BatchOutcome::Completed { batch, .. } => Some(*batch),
            BatchOutcome::Failed { .. } => None,
        })
    }

    /// Ranges an operator can re-submit, with the error that stopped each one
    pub fn failed_ranges(&self) -> Vec<(Batch, String)> {
        self.batches
            .iter()
            .filter_map(|b| match b {
                BatchOutcome::Failed { batch, error, .. } => Some((*batch, error.clone())),
                BatchOutcome::Completed { .. } => None,
            })
            .collect()
    }

    pub fn totals(&self) -> EntityTotals {
        let mut totals = EntityTotals::default();
        for block in self.batches.iter().flat_map(|b| b.blocks()) {
            totals.blocks.record(&block.block);
            for tx in &block.transactions {
                match tx {
                    TransactionOutcome::Processed { write, transfers, .. } => {
                        totals.transactions.record(write);
                        totals.token_transfers.merge(transfers);
                    }
                    TransactionOutcome::Skipped { .. } => totals.skipped_transactions += 1,
                }
            }
            match &block.events {
                EventsOutcome::NotConfigured => {}
                EventsOutcome::Processed { writes, decode_failures } => {
                    totals.contract_events.merge(writes);
                    totals.event_decode_failures += decode_failures;
                }
                EventsOutcome::Failed(_) => totals.event_fetch_failures += 1,
            }
        }
        totals
    }

    pub fn is_clean(&self) -> bool {
        self.failed_ranges().is_empty()
    }
}
