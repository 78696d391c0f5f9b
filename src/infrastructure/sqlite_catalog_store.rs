//! SQLite catalog store
//!
//! Entries live in `roster_entries`, keyed by `(board, identifier)`, with the
//! full record as a JSON payload. Run reports go to `scrape_logs`.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{Row, SqlitePool};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::domain::{
    CatalogStore, Identifier, RosterRecord, RunPhase, RunResult, StoreError, UpsertOutcome,
};

/// Connection-level failures make the store unavailable; anything else is a
/// rejection of the single statement.
fn map_sqlx_error(operation: &str, identifier: &str, error: sqlx::Error) -> StoreError {
    match error {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Configuration(_) => StoreError::Unavailable(error.to_string()),
        other => rejected(operation, identifier, other),
    }
}

fn rejected(operation: &str, identifier: &str, reason: impl ToString) -> StoreError {
    StoreError::Rejected {
        operation: operation.to_string(),
        identifier: identifier.to_string(),
        reason: reason.to_string(),
    }
}

/// RFC 3339 with fixed precision so stored timestamps sort lexically
fn fixed_width(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("bad timestamp '{value}': {e}"))
}

/// SQLite implementation of `CatalogStore`
pub struct SqliteCatalogStore {
    pool: SqlitePool,
}

impl SqliteCatalogStore {
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_log(row: &sqlx::sqlite::SqliteRow) -> Result<RunResult, String> {
        let get_u32 = |column: &str| -> Result<u32, String> {
            let value: i64 = row.try_get(column).map_err(|e| e.to_string())?;
            u32::try_from(value).map_err(|e| format!("{column}: {e}"))
        };

        let run_id: String = row.try_get("run_id").map_err(|e| e.to_string())?;
        let started_at: String = row.try_get("started_at").map_err(|e| e.to_string())?;
        let finished_at: String = row.try_get("finished_at").map_err(|e| e.to_string())?;
        let phase: String = row.try_get("phase").map_err(|e| e.to_string())?;
        let success: i64 = row.try_get("success").map_err(|e| e.to_string())?;

        Ok(RunResult {
            run_id: Uuid::parse_str(&run_id).map_err(|e| e.to_string())?,
            board: row.try_get("board").map_err(|e| e.to_string())?,
            started_at: parse_timestamp(&started_at)?,
            finished_at: parse_timestamp(&finished_at)?,
            added: get_u32("added")?,
            skipped: get_u32("skipped")?,
            refreshed: get_u32("refreshed")?,
            removed: get_u32("removed")?,
            failed: get_u32("failed")?,
            success: success != 0,
            error: row.try_get("error").map_err(|e| e.to_string())?,
            phase: serde_json::from_value::<RunPhase>(serde_json::Value::String(phase))
                .map_err(|e| e.to_string())?,
        })
    }
}

#[async_trait]
impl CatalogStore for SqliteCatalogStore {
    async fn list_identifiers(&self, board: &str) -> Result<BTreeSet<Identifier>, StoreError> {
        let rows = sqlx::query("SELECT identifier FROM roster_entries WHERE board = ?")
            .bind(board)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_identifiers", board, e))?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("identifier")
                    .map(Identifier::new)
                    .map_err(|e| rejected("list_identifiers", board, e))
            })
            .collect()
    }

    async fn list_records(
        &self,
        board: &str,
    ) -> Result<Vec<(Identifier, RosterRecord)>, StoreError> {
        let rows = sqlx::query(
            "SELECT identifier, payload FROM roster_entries WHERE board = ? ORDER BY identifier",
        )
        .bind(board)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_records", board, e))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let identifier: String = row
                .try_get("identifier")
                .map_err(|e| rejected("list_records", board, e))?;
            let payload: String = row
                .try_get("payload")
                .map_err(|e| rejected("list_records", &identifier, e))?;
            let record: RosterRecord = serde_json::from_str(&payload)
                .map_err(|e| rejected("list_records", &identifier, e))?;
            records.push((Identifier::new(identifier), record));
        }
        Ok(records)
    }

    async fn upsert(
        &self,
        identifier: &Identifier,
        record: &RosterRecord,
    ) -> Result<UpsertOutcome, StoreError> {
        let id = identifier.as_str();
        let payload = serde_json::to_string(record).map_err(|e| rejected("upsert", id, e))?;
        let hash = record.content_hash();
        let now = fixed_width(Utc::now());

        let existing: Option<String> = sqlx::query_scalar(
            "SELECT content_hash FROM roster_entries WHERE board = ? AND identifier = ?",
        )
        .bind(&record.board)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("upsert", id, e))?;

        let outcome = match existing {
            Some(stored) if stored == hash => return Ok(UpsertOutcome::Unchanged),
            Some(_) => UpsertOutcome::Updated,
            None => UpsertOutcome::Inserted,
        };

        sqlx::query(
            r"
            INSERT INTO roster_entries (
                board, identifier, name, profile_url, payload, content_hash, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (board, identifier) DO UPDATE SET
                name = excluded.name,
                profile_url = excluded.profile_url,
                payload = excluded.payload,
                content_hash = excluded.content_hash,
                updated_at = excluded.updated_at
            ",
        )
        .bind(&record.board)
        .bind(id)
        .bind(&record.name)
        .bind(&record.profile_url)
        .bind(payload)
        .bind(hash)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("upsert", id, e))?;

        Ok(outcome)
    }

    async fn delete(&self, board: &str, identifier: &Identifier) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM roster_entries WHERE board = ? AND identifier = ?")
            .bind(board)
            .bind(identifier.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete", identifier.as_str(), e))?;
        Ok(())
    }

    async fn append_log(&self, result: &RunResult) -> Result<(), StoreError> {
        let run_id = result.run_id.to_string();
        sqlx::query(
            r"
            INSERT INTO scrape_logs (
                run_id, board, started_at, finished_at, added, skipped, refreshed,
                removed, failed, success, error, phase
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&run_id)
        .bind(&result.board)
        .bind(fixed_width(result.started_at))
        .bind(fixed_width(result.finished_at))
        .bind(i64::from(result.added))
        .bind(i64::from(result.skipped))
        .bind(i64::from(result.refreshed))
        .bind(i64::from(result.removed))
        .bind(i64::from(result.failed))
        .bind(result.success)
        .bind(&result.error)
        .bind(result.phase.to_string().to_lowercase())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("append_log", &run_id, e))?;
        Ok(())
    }

    async fn recent_logs(&self, limit: u32) -> Result<Vec<RunResult>, StoreError> {
        let rows = sqlx::query(
            r"
            SELECT run_id, board, started_at, finished_at, added, skipped, refreshed,
                   removed, failed, success, error, phase
            FROM scrape_logs
            ORDER BY finished_at DESC
            LIMIT ?
            ",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("recent_logs", "", e))?;

        rows.iter()
            .map(|row| Self::row_to_log(row).map_err(|e| rejected("recent_logs", "", e)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Gender, Measurements};
    use crate::infrastructure::database_connection::DatabaseConnection;

    async fn store() -> SqliteCatalogStore {
        let db = DatabaseConnection::new("sqlite::memory:").await.unwrap();
        db.migrate().await.unwrap();
        SqliteCatalogStore::new(db.pool().clone())
    }

    fn record(board: &str, id: &str) -> RosterRecord {
        RosterRecord {
            identifier: Identifier::new(id),
            name: id.replace('_', " "),
            profile_url: format!("https://x.test/{board}/{id}/"),
            board: board.to_string(),
            agency: "X".to_string(),
            gender: Gender::Female,
            portfolio_images: vec!["https://x.test/1.jpg".to_string()],
            measurements: Measurements::with_keys(["height"]),
            out_of_town: false,
        }
    }

    #[tokio::test]
    async fn test_upsert_outcomes() {
        let store = store().await;
        let id = Identifier::new("jane_doe");
        let mut jane = record("women", "jane_doe");

        assert_eq!(store.upsert(&id, &jane).await.unwrap(), UpsertOutcome::Inserted);
        assert_eq!(store.upsert(&id, &jane).await.unwrap(), UpsertOutcome::Unchanged);
        jane.out_of_town = true;
        assert_eq!(store.upsert(&id, &jane).await.unwrap(), UpsertOutcome::Updated);

        let records = store.list_records("women").await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].1.out_of_town);
    }

    #[tokio::test]
    async fn test_operations_are_scoped_by_board() {
        let store = store().await;
        let id = Identifier::new("jane_doe");
        store.upsert(&id, &record("women", "jane_doe")).await.unwrap();
        store.upsert(&id, &record("men", "jane_doe")).await.unwrap();

        store.delete("men", &id).await.unwrap();
        // Deleting a missing entry is fine
        store.delete("men", &id).await.unwrap();

        assert!(store.list_identifiers("men").await.unwrap().is_empty());
        assert_eq!(
            store.list_identifiers("women").await.unwrap(),
            BTreeSet::from([id])
        );
    }

    #[tokio::test]
    async fn test_logs_round_trip_newest_first() {
        let store = store().await;
        let start = Utc::now();
        for (i, board) in ["a", "b"].iter().enumerate() {
            let finished = start + chrono::Duration::seconds(i64::try_from(i).unwrap() + 1);
            store
                .append_log(&RunResult {
                    run_id: Uuid::new_v4(),
                    board: (*board).to_string(),
                    started_at: start,
                    finished_at: finished,
                    added: 1,
                    skipped: 2,
                    refreshed: 0,
                    removed: 3,
                    failed: 0,
                    success: i == 0,
                    error: (i == 1).then(|| "listing marker missing".to_string()),
                    phase: if i == 0 { RunPhase::Reported } else { RunPhase::Aborted },
                })
                .await
                .unwrap();
        }

        let logs = store.recent_logs(10).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].board, "b");
        assert_eq!(logs[0].phase, RunPhase::Aborted);
        assert_eq!(logs[0].error.as_deref(), Some("listing marker missing"));
        assert_eq!(logs[1].phase, RunPhase::Reported);
        assert_eq!(logs[1].removed, 3);

        assert_eq!(store.recent_logs(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_closed_pool_is_unavailable() {
        let store = store().await;
        store.pool.close().await;
        assert!(matches!(
            store.list_identifiers("women").await,
            Err(StoreError::Unavailable(_))
        ));
    }
}
