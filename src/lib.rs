//! Roster Sync - keeps a model-agency roster catalog in sync with live agency boards
//!
//! Each configured board is scraped, its entries are normalized into
//! canonical records, and the result is reconciled against the catalog's
//! previous snapshot for that board.

// Module declarations
pub mod application;
pub mod domain;
pub mod infrastructure;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use application::{CatalogSyncEngine, KeyMigration};
pub use domain::{RosterRecord, RunResult, SyncError};
