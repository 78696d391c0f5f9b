//! Failure taxonomy for board runs
//!
//! Item-level failures are recovered inside the run loop; run-level failures
//! abort the run and surface in its report.

use thiserror::Error;

/// Errors raised by a listing source (HTTP, markup, timing)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ListingError {
    #[error("HTTP request failed: {status} - {url}")]
    HttpRequestFailed { status: u16, url: String },

    #[error("Request to {url} failed: {message}")]
    RequestFailed { url: String, message: String },

    #[error("Marker '{marker}' did not appear on {url} within {timeout_ms}ms")]
    MarkerTimeout {
        marker: String,
        url: String,
        timeout_ms: u64,
    },

    #[error("Invalid CSS selector: {selector} - {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("URL resolution failed: {url} - {reason}")]
    UrlResolutionFailed { url: String, reason: String },

    #[error("Listing has not been loaded")]
    NotLoaded,
}

impl ListingError {
    pub fn invalid_selector(selector: &str, reason: impl ToString) -> Self {
        Self::InvalidSelector {
            selector: selector.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Errors raised by the catalog store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store cannot be reached at all; the run cannot continue
    #[error("Catalog store unavailable: {0}")]
    Unavailable(String),

    /// A single operation was refused; other operations may still succeed
    #[error("Catalog store rejected {operation} for '{identifier}': {reason}")]
    Rejected {
        operation: String,
        identifier: String,
        reason: String,
    },
}

/// Typed failures of a board run
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// The listing never rendered; nothing can be reconciled
    #[error("Precondition failed for board '{board}': {source}")]
    PreconditionFailure {
        board: String,
        #[source]
        source: ListingError,
    },

    /// One entry could not be extracted
    #[error("Extraction failed for {item}: {reason}")]
    ExtractionFailure { item: String, reason: String },

    /// A profile yielded no portfolio images, usually a selector mismatch
    #[error("No portfolio images found for {item} ({profile_url})")]
    ZeroImages { item: String, profile_url: String },

    /// A single catalog write or delete failed
    #[error("Store operation failed: {0}")]
    StoreFailure(#[source] StoreError),

    /// The catalog cannot be reached
    #[error("Store unreachable: {0}")]
    StoreUnavailable(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Run cancelled")]
    Cancelled,
}

impl SyncError {
    pub fn extraction(item: impl ToString, reason: impl ToString) -> Self {
        Self::ExtractionFailure {
            item: item.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether this failure ends the whole run rather than one item
    pub const fn is_fatal(&self) -> bool {
        match self {
            Self::PreconditionFailure { .. }
            | Self::StoreUnavailable(_)
            | Self::Configuration(_)
            | Self::Cancelled => true,
            Self::ExtractionFailure { .. } | Self::ZeroImages { .. } | Self::StoreFailure(_) => {
                false
            }
        }
    }
}

impl From<StoreError> for SyncError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Unavailable(message) => Self::StoreUnavailable(message),
            rejected @ StoreError::Rejected { .. } => Self::StoreFailure(rejected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatality_classification() {
        let precondition = SyncError::PreconditionFailure {
            board: "b".into(),
            source: ListingError::NotLoaded,
        };
        assert!(precondition.is_fatal());
        assert!(SyncError::StoreUnavailable("down".into()).is_fatal());
        assert!(!SyncError::extraction("#1 Jane", "timeout").is_fatal());
        assert!(
            !SyncError::ZeroImages {
                item: "#1".into(),
                profile_url: "u".into()
            }
            .is_fatal()
        );
    }

    #[test]
    fn test_store_error_conversion() {
        let unavailable: SyncError = StoreError::Unavailable("refused".into()).into();
        assert!(unavailable.is_fatal());

        let rejected: SyncError = StoreError::Rejected {
            operation: "upsert".into(),
            identifier: "jane_doe".into(),
            reason: "constraint".into(),
        }
        .into();
        assert!(!rejected.is_fatal());
    }
}
