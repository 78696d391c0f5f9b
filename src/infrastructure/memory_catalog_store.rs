//! In-memory catalog store
//!
//! Used for dry runs (seeded from the real snapshot) and as the store double
//! in tests. Every mutating call is recorded in order.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use crate::domain::{CatalogStore, Identifier, RosterRecord, RunResult, StoreError, UpsertOutcome};

/// One recorded mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Upsert { board: String, identifier: Identifier },
    Delete { board: String, identifier: Identifier },
    AppendLog { board: String },
}

#[derive(Default)]
struct Inner {
    entries: BTreeMap<(String, Identifier), RosterRecord>,
    logs: Vec<RunResult>,
    calls: Vec<StoreCall>,
    rejected: HashSet<Identifier>,
}

#[derive(Default)]
pub struct InMemoryCatalogStore {
    inner: RwLock<Inner>,
    offline: AtomicBool,
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-filled with `(identifier, record)` pairs; seeding is not recorded as calls
    pub fn seeded(records: impl IntoIterator<Item = (Identifier, RosterRecord)>) -> Self {
        let entries = records
            .into_iter()
            .map(|(id, record)| ((record.board.clone(), id), record))
            .collect();
        Self {
            inner: RwLock::new(Inner {
                entries,
                ..Inner::default()
            }),
            offline: AtomicBool::new(false),
        }
    }

    /// Simulate an unreachable store
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Refuse every future upsert/delete of `identifier`
    pub async fn reject(&self, identifier: impl Into<Identifier>) {
        self.inner.write().await.rejected.insert(identifier.into());
    }

    pub async fn calls(&self) -> Vec<StoreCall> {
        self.inner.read().await.calls.clone()
    }

    pub async fn logs(&self) -> Vec<RunResult> {
        self.inner.read().await.logs.clone()
    }

    pub async fn record(&self, board: &str, identifier: &str) -> Option<RosterRecord> {
        self.inner
            .read()
            .await
            .entries
            .get(&(board.to_string(), Identifier::new(identifier)))
            .cloned()
    }

    fn ensure_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("in-memory store is offline".to_string()))
        } else {
            Ok(())
        }
    }
}

fn rejected(operation: &str, identifier: &Identifier) -> StoreError {
    StoreError::Rejected {
        operation: operation.to_string(),
        identifier: identifier.to_string(),
        reason: "rejected by store".to_string(),
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn list_identifiers(&self, board: &str) -> Result<BTreeSet<Identifier>, StoreError> {
        self.ensure_online()?;
        Ok(self
            .inner
            .read()
            .await
            .entries
            .keys()
            .filter(|(b, _)| b == board)
            .map(|(_, id)| id.clone())
            .collect())
    }

    async fn list_records(
        &self,
        board: &str,
    ) -> Result<Vec<(Identifier, RosterRecord)>, StoreError> {
        self.ensure_online()?;
        Ok(self
            .inner
            .read()
            .await
            .entries
            .iter()
            .filter(|((b, _), _)| b == board)
            .map(|((_, id), record)| (id.clone(), record.clone()))
            .collect())
    }

    async fn upsert(
        &self,
        identifier: &Identifier,
        record: &RosterRecord,
    ) -> Result<UpsertOutcome, StoreError> {
        self.ensure_online()?;
        let mut inner = self.inner.write().await;
        inner.calls.push(StoreCall::Upsert {
            board: record.board.clone(),
            identifier: identifier.clone(),
        });
        if inner.rejected.contains(identifier) {
            return Err(rejected("upsert", identifier));
        }

        let key = (record.board.clone(), identifier.clone());
        let outcome = match inner.entries.get(&key) {
            Some(existing) if existing == record => UpsertOutcome::Unchanged,
            Some(_) => UpsertOutcome::Updated,
            None => UpsertOutcome::Inserted,
        };
        inner.entries.insert(key, record.clone());
        Ok(outcome)
    }

    async fn delete(&self, board: &str, identifier: &Identifier) -> Result<(), StoreError> {
        self.ensure_online()?;
        let mut inner = self.inner.write().await;
        inner.calls.push(StoreCall::Delete {
            board: board.to_string(),
            identifier: identifier.clone(),
        });
        if inner.rejected.contains(identifier) {
            return Err(rejected("delete", identifier));
        }
        inner
            .entries
            .remove(&(board.to_string(), identifier.clone()));
        Ok(())
    }

    async fn append_log(&self, result: &RunResult) -> Result<(), StoreError> {
        self.ensure_online()?;
        let mut inner = self.inner.write().await;
        inner.calls.push(StoreCall::AppendLog {
            board: result.board.clone(),
        });
        inner.logs.push(result.clone());
        Ok(())
    }

    async fn recent_logs(&self, limit: u32) -> Result<Vec<RunResult>, StoreError> {
        self.ensure_online()?;
        Ok(self
            .inner
            .read()
            .await
            .logs
            .iter()
            .rev()
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Gender, Measurements};

    fn record(board: &str, id: &str) -> RosterRecord {
        RosterRecord {
            identifier: Identifier::new(id),
            name: id.to_string(),
            profile_url: format!("https://x.test/{id}/"),
            board: board.to_string(),
            agency: "X".to_string(),
            gender: Gender::Male,
            portfolio_images: vec!["https://x.test/1.jpg".to_string()],
            measurements: Measurements::with_keys(["chest"]),
            out_of_town: false,
        }
    }

    #[tokio::test]
    async fn test_seeded_store_is_board_scoped() {
        let store = InMemoryCatalogStore::seeded([
            (Identifier::new("a"), record("x", "a")),
            (Identifier::new("b"), record("y", "b")),
        ]);
        let x = store.list_identifiers("x").await.unwrap();
        assert_eq!(x, BTreeSet::from([Identifier::new("a")]));
        assert!(store.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_rejection_and_offline() {
        let store = InMemoryCatalogStore::new();
        store.reject("bad").await;

        let err = store
            .upsert(&Identifier::new("bad"), &record("x", "bad"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Rejected { .. }));
        assert_eq!(store.calls().await.len(), 1);

        store.set_offline(true);
        assert!(matches!(
            store.list_identifiers("x").await,
            Err(StoreError::Unavailable(_))
        ));
        store.set_offline(false);
        assert!(store.list_identifiers("x").await.unwrap().is_empty());
    }
}
