//! Run lifecycle and the terminal run report

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Phases of one board run.
///
/// `Init → ListingLoaded → Extracting → Reconciled → Reported`, with `Aborted`
/// reachable from every non-terminal phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Init,
    ListingLoaded,
    Extracting,
    Reconciled,
    Reported,
    Aborted,
}

impl RunPhase {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Reported | Self::Aborted)
    }

    /// Whether `next` is a legal successor of `self`
    pub const fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Reported | Self::Aborted, _) => false,
            (_, Self::Aborted) => true,
            (Self::Init, Self::ListingLoaded)
            | (Self::ListingLoaded, Self::Extracting)
            | (Self::Extracting, Self::Reconciled)
            | (Self::Reconciled, Self::Reported) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "INIT",
            Self::ListingLoaded => "LISTING_LOADED",
            Self::Extracting => "EXTRACTING",
            Self::Reconciled => "RECONCILED",
            Self::Reported => "REPORTED",
            Self::Aborted => "ABORTED",
        };
        f.write_str(name)
    }
}

/// Item counters accumulated during a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    pub added: u32,
    pub skipped: u32,
    /// Existing entries re-extracted and rewritten because their content changed
    pub refreshed: u32,
    pub removed: u32,
    pub failed: u32,
}

/// Outcome of one board run, immutable once produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: Uuid,
    pub board: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub added: u32,
    pub skipped: u32,
    pub refreshed: u32,
    pub removed: u32,
    pub failed: u32,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub phase: RunPhase,
}

impl RunResult {
    pub const fn counts(&self) -> RunCounts {
        RunCounts {
            added: self.added,
            skipped: self.skipped,
            refreshed: self.refreshed,
            removed: self.removed,
            failed: self.failed,
        }
    }
}

impl fmt::Display for RunResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {} added, {} skipped, {} refreshed, {} removed, {} failed",
            self.phase, self.board, self.added, self.skipped, self.refreshed, self.removed, self.failed
        )?;
        if let Some(error) = &self.error {
            write!(f, " ({error})")?;
        }
        Ok(())
    }
}
