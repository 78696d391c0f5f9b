//! Catalog synchronization engine
//!
//! One run per board:
//! 1. read the board's snapshot from the catalog
//! 2. load the listing and wait for it to stabilize
//! 3. derive a key for every listed entry and diff against the snapshot
//! 4. extract, normalize and upsert new entries (optionally refresh known ones)
//! 5. delete entries that are no longer listed, using the complete scrape
//! 6. report
//!
//! Only run-level failures stop a run; item failures are counted and skipped.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::application::normalizer::FieldNormalizer;
use crate::application::record_extractor::RecordExtractor;
use crate::application::run_reporter::RunReporter;
use crate::application::stabilization::StabilizationDetector;
use crate::domain::{
    CatalogStore, DetailHandle, Identifier, ListingError, ListingItem, ListingSource,
    RosterRecord, RunPhase, RunResult, StoreError, SyncError, UpsertOutcome, reconcile,
};
use crate::infrastructure::config::BoardConfig;

/// A listed entry waiting for extraction
struct PendingEntry {
    item: ListingItem,
    profile_url: String,
    handle: Box<dyn DetailHandle>,
}

pub struct CatalogSyncEngine {
    store: Arc<dyn CatalogStore>,
    board: BoardConfig,
}

impl CatalogSyncEngine {
    pub fn new(store: Arc<dyn CatalogStore>, board: BoardConfig) -> Self {
        Self { store, board }
    }

    pub const fn board(&self) -> &BoardConfig {
        &self.board
    }

    /// Run one synchronization pass; always produces and publishes a report
    pub async fn run(
        &self,
        source: &mut dyn ListingSource,
        cancel: &CancellationToken,
    ) -> RunResult {
        info!("Starting sync for board {} ({})", self.board.key, self.board.base_url);
        let mut reporter = RunReporter::start(&self.board.key);
        let outcome = self.execute(source, cancel, &mut reporter).await;
        let result = reporter.finish(outcome.err().as_ref());
        RunReporter::publish(&result, self.store.as_ref()).await;
        result
    }

    fn precondition(&self, source: ListingError) -> SyncError {
        SyncError::PreconditionFailure {
            board: self.board.key.clone(),
            source,
        }
    }

    fn ensure_running(cancel: &CancellationToken) -> Result<(), SyncError> {
        if cancel.is_cancelled() {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }

    async fn execute(
        &self,
        source: &mut dyn ListingSource,
        cancel: &CancellationToken,
        reporter: &mut RunReporter,
    ) -> Result<(), SyncError> {
        let board = &self.board;
        let normalizer = FieldNormalizer::new(board)?;
        let extractor = RecordExtractor::new(board);

        // Read once; never re-queried during the run
        let previous = self
            .store
            .list_identifiers(&board.key)
            .await
            .map_err(|e| match e {
                StoreError::Unavailable(message) => SyncError::StoreUnavailable(message),
                // Without a snapshot there is nothing to diff against
                other => SyncError::StoreUnavailable(other.to_string()),
            })?;
        info!("Board {}: snapshot holds {} entries", board.key, previous.len());

        source
            .load(&board.base_url)
            .await
            .map_err(|e| self.precondition(e))?;
        reporter.advance(RunPhase::ListingLoaded);

        let stabilized = StabilizationDetector::new(&board.key, &board.stabilization)
            .stabilize(source, cancel)
            .await?;
        let handles = source.get_items().await.map_err(|e| self.precondition(e))?;
        info!(
            "Board {}: listing stabilized at {} entries after {} rounds",
            board.key,
            handles.len(),
            stabilized.rounds
        );
        reporter.advance(RunPhase::Extracting);

        let listed_count = handles.len();
        let mut listed: BTreeMap<Identifier, PendingEntry> = BTreeMap::new();
        for (position, handle) in handles.into_iter().enumerate() {
            let identified = extractor
                .read_listing_item(position, handle.as_ref())
                .and_then(|item| normalizer.identify(&item).map(|keyed| (item, keyed)));
            match identified {
                Ok((item, (profile_url, identifier))) => {
                    if listed.contains_key(&identifier) {
                        debug!("Board {}: {} listed twice as {}", board.key, item, identifier);
                        continue;
                    }
                    listed.insert(
                        identifier,
                        PendingEntry {
                            item,
                            profile_url,
                            handle,
                        },
                    );
                }
                Err(e) => reporter.record_failure(&e),
            }
        }

        if listed.is_empty() && listed_count > 0 && !previous.is_empty() {
            return Err(SyncError::Configuration(format!(
                "none of {listed_count} listing entries yielded a profile link; \
                 refusing to reconcile board {}",
                board.key
            )));
        }

        let seen: BTreeSet<Identifier> = listed.keys().cloned().collect();
        let provisional = reconcile(&previous, &seen);
        info!(
            "Board {}: {} new, {} known, {} gone",
            board.key,
            provisional.to_add.len(),
            provisional.to_skip.len(),
            provisional.to_delete.len()
        );

        let mut current = BTreeSet::new();
        for identifier in &provisional.to_add {
            Self::ensure_running(cancel)?;
            let Some(entry) = listed.get(identifier) else {
                continue;
            };
            let record = match self
                .fetch_record(source, &extractor, &normalizer, identifier, entry)
                .await
            {
                Ok(record) => record,
                Err(e) => {
                    reporter.record_failure(&e);
                    continue;
                }
            };
            if self.write(identifier, &record, reporter).await?.is_some() {
                debug!("Board {}: added {}", board.key, identifier);
                reporter.record_added();
                current.insert(identifier.clone());
            }
        }

        for identifier in &provisional.to_skip {
            reporter.record_skipped();
            current.insert(identifier.clone());
            if !board.refresh_existing {
                continue;
            }
            Self::ensure_running(cancel)?;
            let Some(entry) = listed.get(identifier) else {
                continue;
            };
            match self
                .fetch_record(source, &extractor, &normalizer, identifier, entry)
                .await
            {
                Ok(record) => {
                    if self.write(identifier, &record, reporter).await?
                        == Some(UpsertOutcome::Updated)
                    {
                        reporter.record_refreshed();
                    }
                }
                Err(e) => reporter.record_failure(&e),
            }
        }

        // Deletes only ever use the complete result of this run
        let plan = reconcile(&previous, &current);
        for identifier in &plan.to_delete {
            Self::ensure_running(cancel)?;
            match self.store.delete(&board.key, identifier).await {
                Ok(()) => {
                    debug!("Board {}: removed {}", board.key, identifier);
                    reporter.record_removed();
                }
                Err(StoreError::Unavailable(message)) => {
                    return Err(SyncError::StoreUnavailable(message));
                }
                Err(rejected) => reporter.record_failure(&SyncError::StoreFailure(rejected)),
            }
        }
        reporter.advance(RunPhase::Reconciled);

        Ok(())
    }

    async fn fetch_record(
        &self,
        source: &mut dyn ListingSource,
        extractor: &RecordExtractor<'_>,
        normalizer: &FieldNormalizer,
        identifier: &Identifier,
        entry: &PendingEntry,
    ) -> Result<RosterRecord, SyncError> {
        let draft = extractor
            .extract(source, &entry.item, entry.handle.as_ref(), &entry.profile_url)
            .await?;
        normalizer.normalize(identifier.clone(), draft)
    }

    /// Upsert one record. `Ok(None)` means the store rejected this write;
    /// an unreachable store aborts the run.
    async fn write(
        &self,
        identifier: &Identifier,
        record: &RosterRecord,
        reporter: &mut RunReporter,
    ) -> Result<Option<UpsertOutcome>, SyncError> {
        match self.store.upsert(identifier, record).await {
            Ok(outcome) => Ok(Some(outcome)),
            Err(StoreError::Unavailable(message)) => Err(SyncError::StoreUnavailable(message)),
            Err(rejected) => {
                reporter.record_failure(&SyncError::StoreFailure(rejected));
                Ok(None)
            }
        }
    }
}
