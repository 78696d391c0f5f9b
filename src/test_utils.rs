//! Test utilities for roster-sync
//!
//! A scripted listing source that reveals entries in batches, a static
//! `DetailHandle`, and a board configuration matching both. Shared by unit
//! tests, integration tests and benchmarks.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use crate::domain::{DetailHandle, ElementSnapshot, Gender, ListingError, ListingSource};
use crate::infrastructure::config::{
    BoardConfig, BoardSelectors, DetailLocation, IdentifierConfig, ImageSelector, MarkerSelector,
    MeasurementLabel, MeasurementSelectors, StabilizationConfig,
};
use crate::infrastructure::{DatabaseConnection, SqliteCatalogStore};

pub const ENTRY_LINK: &str = "a.profile";
pub const DETAIL_MARKER: &str = "main.profile";
pub const IMAGE: &str = "img.portfolio";
pub const SPEC_LABEL: &str = "dl.specs dt";
pub const SPEC_VALUE: &str = "dd";
pub const OUT_OF_TOWN: &str = "div.away";

/// Board whose selectors match `StaticDetail` pages built by `profile`
pub fn test_board(key: &str) -> BoardConfig {
    BoardConfig {
        key: key.to_string(),
        agency: "Test Agency".to_string(),
        gender: Gender::Female,
        base_url: format!("https://agency.test/{key}/"),
        detail_location: DetailLocation::ProfilePage,
        selectors: BoardSelectors {
            listing_item: "div.entry".to_string(),
            listing_marker: None,
            name: Some(ENTRY_LINK.to_string()),
            profile_link: ENTRY_LINK.to_string(),
            next_page: None,
            detail_marker: DETAIL_MARKER.to_string(),
            detail_name: Some("h1".to_string()),
            image: ImageSelector {
                selector: IMAGE.to_string(),
                attributes: vec!["src".to_string()],
                style_fallback: true,
            },
            measurement: MeasurementSelectors {
                entry: None,
                label: Some(SPEC_LABEL.to_string()),
                value: Some(SPEC_VALUE.to_string()),
                metric: None,
            },
            out_of_town: Some(MarkerSelector {
                selector: OUT_OF_TOWN.to_string(),
                text: None,
            }),
        },
        measurement_labels: ["height", "bust", "waist", "hips", "shoe", "hair", "eyes"]
            .iter()
            .map(|key| MeasurementLabel::new(key))
            .collect(),
        value_separators: vec!['/', '|'],
        identifier: IdentifierConfig::default(),
        stabilization: StabilizationConfig {
            settle_wait_ms: 0,
            max_stall_retries: 3,
            max_rounds: 50,
        },
        listing_timeout_ms: 1_000,
        detail_timeout_ms: 200,
        refresh_existing: false,
    }
}

/// Absolute profile URL that `ScriptedEntry::slug(slug)` resolves to on `board`
pub fn profile_url(board: &BoardConfig, slug: &str) -> String {
    format!("{}{}/", board.base_url, slug)
}

/// `DetailHandle` over fixed element snapshots keyed by selector
#[derive(Debug, Clone, Default)]
pub struct StaticDetail {
    location: String,
    elements: HashMap<String, Vec<ElementSnapshot>>,
    pairs: HashMap<String, Vec<(String, String)>>,
}

impl StaticDetail {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with(mut self, selector: &str, element: ElementSnapshot) -> Self {
        self.elements
            .entry(selector.to_string())
            .or_default()
            .push(element);
        self
    }

    #[must_use]
    pub fn with_pair(mut self, label_selector: &str, label: &str, value: &str) -> Self {
        self.pairs
            .entry(label_selector.to_string())
            .or_default()
            .push((label.to_string(), value.to_string()));
        self
    }
}

impl DetailHandle for StaticDetail {
    fn location(&self) -> &str {
        &self.location
    }

    fn select(&self, selector: &str) -> Result<Vec<ElementSnapshot>, ListingError> {
        Ok(self.elements.get(selector).cloned().unwrap_or_default())
    }

    fn labelled_pairs(
        &self,
        label: &str,
        _value: &str,
        _metric: Option<&str>,
    ) -> Result<Vec<(String, String)>, ListingError> {
        Ok(self.pairs.get(label).cloned().unwrap_or_default())
    }
}

/// Profile page with the given images, `(label, value)` specs and out-of-town flag
pub fn profile(images: &[&str], specs: &[(&str, &str)], out_of_town: bool) -> StaticDetail {
    let mut page = StaticDetail::new("profile").with(DETAIL_MARKER, ElementSnapshot::default());
    for src in images {
        page = page.with(IMAGE, ElementSnapshot::default().attr("src", *src));
    }
    for (label, value) in specs {
        page = page.with_pair(SPEC_LABEL, label, value);
    }
    if out_of_town {
        page = page.with(OUT_OF_TOWN, ElementSnapshot::with_text("Out of town"));
    }
    page
}

/// One listing entry: display name and profile href
#[derive(Debug, Clone)]
pub struct ScriptedEntry {
    pub name: String,
    pub href: String,
}

impl ScriptedEntry {
    pub fn new(name: &str, href: &str) -> Self {
        Self {
            name: name.to_string(),
            href: href.to_string(),
        }
    }

    /// Entry whose href is `/<slug>/` relative to the board
    pub fn slug(slug: &str) -> Self {
        Self::new(&slug.replace('-', " "), &format!("{slug}/"))
    }
}

/// Listing that reveals scripted entries in batches
///
/// `load` reveals the first batch; each `trigger_more` reveals the next one.
/// Once the batches run out, `trigger_more` reveals nothing.
#[derive(Default)]
pub struct ScriptedListingSource {
    entries: Vec<ScriptedEntry>,
    batches: Vec<usize>,
    revealed_batches: usize,
    visible: usize,
    loaded: bool,
    load_error: Option<ListingError>,
    trigger_error_at: Option<usize>,
    profiles: BTreeMap<String, StaticDetail>,
    slow_profiles: BTreeMap<String, Duration>,
    pub load_calls: usize,
    pub trigger_calls: usize,
    pub opened: Vec<String>,
}

impl ScriptedListingSource {
    /// All entries visible immediately
    pub fn new(entries: Vec<ScriptedEntry>) -> Self {
        let count = entries.len();
        Self::batched(entries, &[count])
    }

    /// Entries revealed in batches of the given sizes
    pub fn batched(entries: Vec<ScriptedEntry>, batches: &[usize]) -> Self {
        Self {
            entries,
            batches: batches.to_vec(),
            ..Self::default()
        }
    }

    /// Listing whose marker never renders
    pub fn unrendered(board_url: &str) -> Self {
        Self {
            load_error: Some(ListingError::MarkerTimeout {
                marker: "div.entry".to_string(),
                url: board_url.to_string(),
                timeout_ms: 1_000,
            }),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_profile(mut self, profile_url: &str, page: StaticDetail) -> Self {
        self.profiles.insert(profile_url.to_string(), page);
        self
    }

    /// Delay opening `profile_url` by `delay`
    #[must_use]
    pub fn with_slow_profile(mut self, profile_url: &str, delay: Duration) -> Self {
        self.slow_profiles.insert(profile_url.to_string(), delay);
        self
    }

    /// Fail the `n`th (1-based) `trigger_more` call
    #[must_use]
    pub const fn failing_trigger(mut self, n: usize) -> Self {
        self.trigger_error_at = Some(n);
        self
    }

    fn reveal_next_batch(&mut self) {
        if let Some(size) = self.batches.get(self.revealed_batches) {
            self.visible = (self.visible + size).min(self.entries.len());
            self.revealed_batches += 1;
        }
    }
}

#[async_trait]
impl ListingSource for ScriptedListingSource {
    async fn load(&mut self, _board_url: &str) -> Result<(), ListingError> {
        self.load_calls += 1;
        if let Some(error) = &self.load_error {
            return Err(error.clone());
        }
        self.loaded = true;
        self.visible = 0;
        self.revealed_batches = 0;
        self.reveal_next_batch();
        Ok(())
    }

    async fn trigger_more(&mut self) -> Result<(), ListingError> {
        if !self.loaded {
            return Err(ListingError::NotLoaded);
        }
        self.trigger_calls += 1;
        if self.trigger_error_at == Some(self.trigger_calls) {
            return Err(ListingError::RequestFailed {
                url: "next".to_string(),
                message: "connection reset".to_string(),
            });
        }
        self.reveal_next_batch();
        Ok(())
    }

    async fn count_items(&mut self) -> Result<usize, ListingError> {
        if !self.loaded {
            return Err(ListingError::NotLoaded);
        }
        Ok(self.visible)
    }

    async fn get_items(&mut self) -> Result<Vec<Box<dyn DetailHandle>>, ListingError> {
        if !self.loaded {
            return Err(ListingError::NotLoaded);
        }
        Ok(self.entries[..self.visible]
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                Box::new(
                    StaticDetail::new(format!("entry-{}", i + 1)).with(
                        ENTRY_LINK,
                        ElementSnapshot::with_text(entry.name.clone()).attr("href", &entry.href),
                    ),
                ) as Box<dyn DetailHandle>
            })
            .collect())
    }

    async fn open_detail(
        &mut self,
        profile_url: &str,
    ) -> Result<Box<dyn DetailHandle>, ListingError> {
        self.opened.push(profile_url.to_string());
        if let Some(delay) = self.slow_profiles.get(profile_url) {
            tokio::time::sleep(*delay).await;
        }
        match self.profiles.get(profile_url) {
            Some(page) => {
                let mut page = page.clone();
                page.location = profile_url.to_string();
                Ok(Box::new(page))
            }
            None => Err(ListingError::MarkerTimeout {
                marker: DETAIL_MARKER.to_string(),
                url: profile_url.to_string(),
                timeout_ms: 200,
            }),
        }
    }
}

/// Fresh migrated in-memory SQLite catalog
pub async fn sqlite_store() -> Result<SqliteCatalogStore> {
    let db = DatabaseConnection::new("sqlite::memory:").await?;
    db.migrate().await?;
    Ok(SqliteCatalogStore::new(db.pool().clone()))
}
