//! Re-keys a board's stored entries under the board's identifier policy
//!
//! Snapshots written with display-name keys would otherwise make every entry
//! look new (and every old key look removed) on the first slug-keyed run.

use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::{CatalogStore, Identifier, StoreError, SyncError};
use crate::infrastructure::config::BoardConfig;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub board: String,
    pub dry_run: bool,
    pub examined: u32,
    pub rekeyed: u32,
    pub unchanged: u32,
    /// Entries whose new key was already taken; left under their old key
    pub collisions: u32,
    pub failed: u32,
}

pub struct KeyMigration {
    store: Arc<dyn CatalogStore>,
    board: BoardConfig,
}

fn unavailable_or(error: StoreError, failed: &mut u32) -> Result<(), SyncError> {
    match error {
        StoreError::Unavailable(message) => Err(SyncError::StoreUnavailable(message)),
        rejected => {
            warn!("{}", rejected);
            *failed += 1;
            Ok(())
        }
    }
}

impl KeyMigration {
    pub fn new(store: Arc<dyn CatalogStore>, board: BoardConfig) -> Self {
        Self { store, board }
    }

    pub async fn run(&self, dry_run: bool) -> Result<MigrationReport, SyncError> {
        let board = &self.board.key;
        let deriver = self.board.identifier_deriver();
        let records = self
            .store
            .list_records(board)
            .await
            .map_err(|e| SyncError::StoreUnavailable(e.to_string()))?;

        let mut report = MigrationReport {
            board: board.clone(),
            dry_run,
            ..MigrationReport::default()
        };

        // Entries already under their derived key keep it
        let mut claimed: HashSet<Identifier> = records
            .iter()
            .filter(|(stored, record)| {
                deriver.derive(&record.profile_url, &record.name).as_ref() == Some(stored)
            })
            .map(|(stored, _)| stored.clone())
            .collect();

        for (stored, record) in records {
            report.examined += 1;
            let Some(target) = deriver.derive(&record.profile_url, &record.name) else {
                warn!("Board {}: cannot derive a key for '{}'", board, stored);
                report.failed += 1;
                continue;
            };
            if target == stored {
                report.unchanged += 1;
                continue;
            }
            if !claimed.insert(target.clone()) {
                warn!(
                    "Board {}: '{}' maps to '{}', which is already taken",
                    board, stored, target
                );
                report.collisions += 1;
                continue;
            }

            if !dry_run {
                let mut rekeyed = record;
                rekeyed.identifier = target.clone();
                if let Err(e) = self.store.upsert(&target, &rekeyed).await {
                    unavailable_or(e, &mut report.failed)?;
                    continue;
                }
                if let Err(e) = self.store.delete(board, &stored).await {
                    // New key is written; the old one lingers until the next run removes it
                    unavailable_or(e, &mut report.failed)?;
                    continue;
                }
            }
            info!("Board {}: {} -> {}", board, stored, target);
            report.rekeyed += 1;
        }

        Ok(report)
    }
}
