//! Stabilization detector for lazily-loaded listings
//!
//! Triggers more loading, waits a settle interval and re-counts until the
//! count has failed to grow `max_stall_retries` times in a row.

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::domain::{ListingSource, SyncError};
use crate::infrastructure::config::StabilizationConfig;

/// Result of a stabilization pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StabilizationOutcome {
    pub final_count: usize,
    /// Trigger/count rounds performed
    pub rounds: u32,
    /// Stopped by the round ceiling rather than by stalling
    pub capped: bool,
}

pub struct StabilizationDetector {
    board: String,
    settle_wait: Duration,
    max_stall_retries: u32,
    max_rounds: u32,
}

impl StabilizationDetector {
    pub fn new(board: &str, config: &StabilizationConfig) -> Self {
        Self {
            board: board.to_string(),
            settle_wait: Duration::from_millis(config.settle_wait_ms),
            max_stall_retries: config.max_stall_retries.max(1),
            max_rounds: config.max_rounds,
        }
    }

    fn listing_failure(&self, source: crate::domain::ListingError) -> SyncError {
        SyncError::PreconditionFailure {
            board: self.board.clone(),
            source,
        }
    }

    /// Drive `source` until its item count stops growing.
    ///
    /// Listing errors are fatal: a half-revealed listing would turn every
    /// unrevealed entry into a delete.
    pub async fn stabilize(
        &self,
        source: &mut dyn ListingSource,
        cancel: &CancellationToken,
    ) -> Result<StabilizationOutcome, SyncError> {
        let mut previous_count = source
            .count_items()
            .await
            .map_err(|e| self.listing_failure(e))?;
        let mut stall_counter = 0;
        let mut rounds = 0;
        let mut capped = false;

        while stall_counter < self.max_stall_retries {
            if rounds >= self.max_rounds {
                warn!(
                    "Board {}: listing still growing after {} rounds, stopping at {} items",
                    self.board, rounds, previous_count
                );
                capped = true;
                break;
            }

            source
                .trigger_more()
                .await
                .map_err(|e| self.listing_failure(e))?;

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(SyncError::Cancelled),
                () = tokio::time::sleep(self.settle_wait) => {}
            }

            let current_count = source
                .count_items()
                .await
                .map_err(|e| self.listing_failure(e))?;
            rounds += 1;

            if current_count == previous_count {
                stall_counter += 1;
            } else {
                stall_counter = 0;
                previous_count = current_count;
            }
            debug!(
                "Board {}: round {} counted {} items (stall {}/{})",
                self.board, rounds, current_count, stall_counter, self.max_stall_retries
            );
        }

        Ok(StabilizationOutcome {
            final_count: previous_count,
            rounds,
            capped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ListingSource;
    use crate::test_utils::{ScriptedEntry, ScriptedListingSource};

    fn entries(n: usize) -> Vec<ScriptedEntry> {
        (0..n).map(|i| ScriptedEntry::slug(&format!("model-{i}"))).collect()
    }

    fn config(stall: u32, rounds: u32) -> StabilizationConfig {
        StabilizationConfig {
            settle_wait_ms: 0,
            max_stall_retries: stall,
            max_rounds: rounds,
        }
    }

    #[tokio::test]
    async fn test_stops_after_consecutive_stalls() {
        let mut source = ScriptedListingSource::batched(entries(9), &[3, 3, 3]);
        source.load("board").await.unwrap();

        let detector = StabilizationDetector::new("x", &config(3, 100));
        let outcome = detector
            .stabilize(&mut source, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.final_count, 9);
        // Two growing rounds, then three stalls
        assert_eq!(outcome.rounds, 5);
        assert!(!outcome.capped);
    }

    #[tokio::test]
    async fn test_single_stall_is_not_trusted() {
        // The second trigger reveals nothing; the third reveals the rest
        let mut source = ScriptedListingSource::batched(entries(6), &[2, 0, 4]);
        source.load("board").await.unwrap();

        let detector = StabilizationDetector::new("x", &config(2, 100));
        let outcome = detector
            .stabilize(&mut source, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.final_count, 6);
    }

    #[tokio::test]
    async fn test_round_ceiling() {
        let mut source = ScriptedListingSource::batched(entries(100), &[1; 100]);
        source.load("board").await.unwrap();

        let detector = StabilizationDetector::new("x", &config(2, 5));
        let outcome = detector
            .stabilize(&mut source, &CancellationToken::new())
            .await
            .unwrap();
        assert!(outcome.capped);
        assert_eq!(outcome.rounds, 5);
        assert_eq!(outcome.final_count, 6);
    }

    #[tokio::test]
    async fn test_trigger_failure_is_fatal() {
        let mut source = ScriptedListingSource::batched(entries(4), &[2, 2]).failing_trigger(1);
        source.load("board").await.unwrap();

        let detector = StabilizationDetector::new("x", &config(2, 10));
        let err = detector
            .stabilize(&mut source, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::PreconditionFailure { .. }));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_cancellation() {
        let mut source = ScriptedListingSource::new(entries(2));
        source.load("board").await.unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let detector = StabilizationDetector::new("x", &config(2, 10));
        let err = detector.stabilize(&mut source, &cancel).await.unwrap_err();
        assert_eq!(err, SyncError::Cancelled);
    }
}
