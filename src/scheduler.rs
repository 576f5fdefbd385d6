use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info};

use crate::error::ConfigError;
use crate::report::{BatchOutcome, RunSummary};

/// Closed block interval `[start, end]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Batch {
    pub start: u64,
    pub end: u64,
}

impl Batch {
    pub fn blocks(&self) -> std::ops::RangeInclusive<u64> {
        self.start..=self.end
    }
}

impl fmt::Display for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

/// Ascending, non-overlapping batches covering `[start, end]` exactly once
pub struct Batches {
    next: Option<u64>,
    end: u64,
    batch_size: u64,
}

impl Iterator for Batches {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        let start = self.next?;
        let end = start.saturating_add(self.batch_size - 1).min(self.end);
        self.next = if end >= self.end { None } else { Some(end + 1) };
        Some(Batch { start, end })
    }
}

#[derive(Debug, Clone)]
pub struct RangeScheduler {
    start: u64,
    end: u64,
    batch_size: u64,
    delay: Duration,
}

impl RangeScheduler {
    pub fn new(start: u64, end: u64, batch_size: u64, delay: Duration) -> Result<Self, ConfigError> {
        if batch_size == 0 {
            return Err(ConfigError::Invalid("batch size must be positive".to_string()));
        }
        if start > end {
            return Err(ConfigError::Invalid(format!(
                "start block {} is after end block {}",
                start, end
            )));
        }
        Ok(Self { start, end, batch_size, delay })
    }

    pub fn batches(&self) -> Batches {
        Batches {
            next: Some(self.start),
            end: self.end,
            batch_size: self.batch_size,
        }
    }

    /// Process batches in order, pausing between them.
    /// A failed batch is logged and the run moves on to the next one.
    pub async fn run<F, Fut>(&self, mut process: F) -> RunSummary
    where
        F: FnMut(Batch) -> Fut,
        Fut: Future<Output = BatchOutcome>,
    {
        info!(
            "Processing blocks {} to {} in batches of {} blocks",
            self.start, self.end, self.batch_size
        );

        let mut summary = RunSummary::default();
        let mut batches = self.batches().peekable();

        while let Some(batch) = batches.next() {
            info!("Processing batch {}", batch);

            let outcome = process(batch).await;
            match &outcome {
                BatchOutcome::Completed { blocks, .. } => {
                    info!("Batch {} completed, {} blocks processed", batch, blocks.len());
                }
                BatchOutcome::Failed { failed_block, error, processed, .. } => {
                    error!(
                        "Batch {} failed at block {} after {} blocks: {}",
                        batch,
                        failed_block,
                        processed.len(),
                        error
                    );
                }
            }
            summary.push(outcome);

            // Bound the request rate against the node
            if batches.peek().is_some() && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(start: u64, end: u64, batch_size: u64) -> Vec<(u64, u64)> {
        RangeScheduler::new(start, end, batch_size, Duration::ZERO)
            .unwrap()
            .batches()
            .map(|b| (b.start, b.end))
            .collect()
    }

    #[test]
    fn test_range_coverage() {
        assert_eq!(
            collect(100, 255, 50),
            vec![(100, 149), (150, 199), (200, 249), (250, 255)]
        );
    }

    #[test]
    fn test_every_block_exactly_once() {
        let blocks: Vec<u64> = RangeScheduler::new(7, 93, 9, Duration::ZERO)
            .unwrap()
            .batches()
            .flat_map(|b| b.blocks())
            .collect();
        assert_eq!(blocks, (7..=93).collect::<Vec<_>>());
    }

    #[test]
    fn test_single_block_range() {
        assert_eq!(collect(42, 42, 10), vec![(42, 42)]);
    }

    #[test]
    fn test_range_ending_at_u64_max() {
        let batches = collect(u64::MAX - 4, u64::MAX, 2);
        assert_eq!(
            batches,
            vec![
                (u64::MAX - 4, u64::MAX - 3),
                (u64::MAX - 2, u64::MAX - 1),
                (u64::MAX, u64::MAX)
            ]
        );
        assert_eq!(collect(u64::MAX - 1, u64::MAX, u64::MAX), vec![(u64::MAX - 1, u64::MAX)]);
    }

    #[test]
    fn test_rejects_invalid_input() {
        assert!(RangeScheduler::new(1, 10, 0, Duration::ZERO).is_err());
        assert!(RangeScheduler::new(11, 10, 5, Duration::ZERO).is_err());
    }

    #[tokio::test]
    async fn test_failed_batch_does_not_stop_run() {
        let scheduler = RangeScheduler::new(1, 6, 2, Duration::from_millis(1)).unwrap();
        let summary = scheduler
            .run(|batch| async move {
                if batch.start == 3 {
                    BatchOutcome::Failed {
                        batch,
                        failed_block: 3,
                        error: "boom".to_string(),
                        processed: Vec::new(),
                    }
                } else {
                    BatchOutcome::Completed { batch, blocks: Vec::new() }
                }
            })
            .await;

        assert_eq!(summary.batches.len(), 3);
        assert_eq!(
            summary.failed_ranges(),
            vec![(Batch { start: 3, end: 4 }, "boom".to_string())]
        );
        assert_eq!(summary.completed_batches().count(), 2);
    }
}
