//! Listing source interface
//!
//! The engine never touches HTTP or a browser directly. A `ListingSource`
//! loads a board, reveals more entries on request, and opens profile pages;
//! every piece of markup it hands back is wrapped in a `DetailHandle`.

use async_trait::async_trait;
use std::collections::BTreeMap;

use super::errors::ListingError;

/// Snapshot of one matched element
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementSnapshot {
    /// Whitespace-collapsed text content
    pub text: String,
    pub attributes: BTreeMap<String, String>,
}

impl ElementSnapshot {
    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    /// Non-empty attribute value
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

/// Read access to a scoped piece of markup (a listing entry or a profile page)
pub trait DetailHandle: Send + Sync {
    /// URL (or listing position) this handle was read from, for logging
    fn location(&self) -> &str;

    /// All elements matching `selector`, in document order
    fn select(&self, selector: &str) -> Result<Vec<ElementSnapshot>, ListingError>;

    /// Label/value pairs where each `label` element is followed by a sibling
    /// `value` element. When `metric` matches inside the value, its text is
    /// used instead of the whole value text.
    fn labelled_pairs(
        &self,
        label: &str,
        value: &str,
        metric: Option<&str>,
    ) -> Result<Vec<(String, String)>, ListingError>;

    /// First non-empty text of `selector`
    fn first_text(&self, selector: &str) -> Result<Option<String>, ListingError> {
        Ok(self
            .select(selector)?
            .into_iter()
            .map(|el| el.text)
            .find(|text| !text.is_empty()))
    }

    /// First non-empty value of `attribute` among elements matching `selector`
    fn first_attribute(
        &self,
        selector: &str,
        attribute: &str,
    ) -> Result<Option<String>, ListingError> {
        Ok(self
            .select(selector)?
            .iter()
            .find_map(|el| el.attribute(attribute).map(str::to_string)))
    }

    fn exists(&self, selector: &str) -> Result<bool, ListingError> {
        Ok(!self.select(selector)?.is_empty())
    }
}

/// Browser-automation boundary for one board
#[async_trait]
pub trait ListingSource: Send {
    /// Navigate to the board and wait (bounded) for the listing marker
    async fn load(&mut self, board_url: &str) -> Result<(), ListingError>;

    /// Ask the listing to reveal more entries (scroll, next page, ...)
    async fn trigger_more(&mut self) -> Result<(), ListingError>;

    /// Number of entries currently revealed
    async fn count_items(&mut self) -> Result<usize, ListingError>;

    /// Handles to every revealed entry, in listing order
    async fn get_items(&mut self) -> Result<Vec<Box<dyn DetailHandle>>, ListingError>;

    /// Open a profile page and wait (bounded) for its detail marker
    async fn open_detail(&mut self, profile_url: &str)
    -> Result<Box<dyn DetailHandle>, ListingError>;
}
