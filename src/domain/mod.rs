//! Domain module - roster entities and the pure reconciliation rules
//!
//! Contains the canonical record shape, identifier derivation, the
//! add/skip/delete diff, the run lifecycle, and the collaborator interfaces
//! implemented by the infrastructure layer.

pub mod errors;
pub mod identifier;
pub mod listing_source;
pub mod reconciliation;
pub mod repositories;
pub mod roster;
pub mod run;

// Re-export commonly used items
pub use errors::{ListingError, StoreError, SyncError};
pub use identifier::{Identifier, IdentifierDeriver, IdentifierPolicy, profile_slug};
pub use listing_source::{DetailHandle, ElementSnapshot, ListingSource};
pub use reconciliation::{CatalogSnapshot, ReconciliationPlan, reconcile};
pub use repositories::{CatalogStore, UpsertOutcome};
pub use roster::{DraftRecord, Gender, ListingItem, Measurements, RawMeasurement, RosterRecord};
pub use run::{RunCounts, RunPhase, RunResult};
