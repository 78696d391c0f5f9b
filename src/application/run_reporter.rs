//! Run reporter
//!
//! Tracks the phase of one board run and its counters, and turns them into
//! exactly one `RunResult`, whether the run completed or aborted.

use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::{CatalogStore, RunCounts, RunPhase, RunResult, SyncError};

pub struct RunReporter {
    run_id: Uuid,
    board: String,
    started_at: chrono::DateTime<Utc>,
    phase: RunPhase,
    counts: RunCounts,
}

impl RunReporter {
    pub fn start(board: &str) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            board: board.to_string(),
            started_at: Utc::now(),
            phase: RunPhase::Init,
            counts: RunCounts::default(),
        }
    }

    pub const fn phase(&self) -> RunPhase {
        self.phase
    }

    pub const fn counts(&self) -> RunCounts {
        self.counts
    }

    /// Move to `next`; illegal transitions are logged and ignored
    pub fn advance(&mut self, next: RunPhase) {
        if self.phase.can_transition_to(next) {
            info!("Board {}: {} -> {}", self.board, self.phase, next);
            self.phase = next;
        } else {
            warn!(
                "Board {}: ignoring illegal transition {} -> {}",
                self.board, self.phase, next
            );
        }
    }

    pub fn record_added(&mut self) {
        self.counts.added += 1;
    }

    pub fn record_skipped(&mut self) {
        self.counts.skipped += 1;
    }

    pub fn record_refreshed(&mut self) {
        self.counts.refreshed += 1;
    }

    pub fn record_removed(&mut self) {
        self.counts.removed += 1;
    }

    /// Count an item-level failure and log it
    pub fn record_failure(&mut self, failure: &SyncError) {
        self.counts.failed += 1;
        warn!("Board {}: {}", self.board, failure);
    }

    /// Close the run: `REPORTED` without an error, `ABORTED` with one
    pub fn finish(mut self, error: Option<&SyncError>) -> RunResult {
        let message = error.map(|e| {
            error!("Board {}: run aborted in {}: {}", self.board, self.phase, e);
            e.to_string()
        });
        let terminal = if message.is_some() {
            RunPhase::Aborted
        } else {
            RunPhase::Reported
        };
        self.advance(terminal);
        // A failed transition leaves the run non-terminal; report it as aborted
        let phase = if self.phase.is_terminal() {
            self.phase
        } else {
            RunPhase::Aborted
        };

        RunResult {
            run_id: self.run_id,
            board: self.board,
            started_at: self.started_at,
            finished_at: Utc::now(),
            added: self.counts.added,
            skipped: self.counts.skipped,
            refreshed: self.counts.refreshed,
            removed: self.counts.removed,
            failed: self.counts.failed,
            success: phase == RunPhase::Reported,
            error: message.or_else(|| {
                (phase == RunPhase::Aborted).then(|| "run ended before reconciliation".to_string())
            }),
            phase,
        }
    }

    /// Log `result` and hand it to the store; a failed append is only logged
    pub async fn publish(result: &RunResult, store: &dyn CatalogStore) {
        if result.success {
            info!("{}", result);
        } else {
            error!("{}", result);
        }
        if let Err(e) = store.append_log(result).await {
            error!("Failed to persist run report for {}: {}", result.board, e);
        }
    }
}
