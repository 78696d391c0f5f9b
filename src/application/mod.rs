//! Application layer - the per-board synchronization run
//!
//! Wires the domain rules to the listing source and catalog store
//! collaborators: stabilization, extraction, normalization, reconciliation
//! and reporting, plus the one-off key migration.

pub mod key_migration;
pub mod normalizer;
pub mod record_extractor;
pub mod run_reporter;
pub mod stabilization;
pub mod sync_engine;

// Re-export commonly used items
pub use key_migration::{KeyMigration, MigrationReport};
pub use normalizer::FieldNormalizer;
pub use record_extractor::RecordExtractor;
pub use run_reporter::RunReporter;
pub use stabilization::{StabilizationDetector, StabilizationOutcome};
pub use sync_engine::CatalogSyncEngine;
