//! Catalog store interface
//!
//! Every query and mutation is scoped by board, so one board's run can never
//! see or delete another board's entries.

use async_trait::async_trait;
use std::collections::BTreeSet;

use super::errors::StoreError;
use super::identifier::Identifier;
use super::roster::RosterRecord;
use super::run::RunResult;

/// What an upsert did to the stored entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    /// Stored content was identical; nothing written
    Unchanged,
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Identifiers currently persisted for `board`
    async fn list_identifiers(&self, board: &str) -> Result<BTreeSet<Identifier>, StoreError>;

    /// Full records persisted for `board`, keyed by their stored identifier
    async fn list_records(
        &self,
        board: &str,
    ) -> Result<Vec<(Identifier, RosterRecord)>, StoreError>;

    /// Insert or replace the entry `(record.board, identifier)`
    async fn upsert(
        &self,
        identifier: &Identifier,
        record: &RosterRecord,
    ) -> Result<UpsertOutcome, StoreError>;

    /// Remove the entry `(board, identifier)`; removing a missing entry is not an error
    async fn delete(&self, board: &str, identifier: &Identifier) -> Result<(), StoreError>;

    /// Persist a run report
    async fn append_log(&self, result: &RunResult) -> Result<(), StoreError>;

    /// Most recent run reports, newest first
    async fn recent_logs(&self, limit: u32) -> Result<Vec<RunResult>, StoreError>;
}
