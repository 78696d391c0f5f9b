//! Record extraction
//!
//! Reads a listing entry's name and profile link, then pulls raw images,
//! measurements and the out-of-town marker from wherever the board keeps
//! them. Nothing here interprets values; that is the normalizer's job.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use crate::domain::{
    DetailHandle, DraftRecord, ListingError, ListingItem, ListingSource, RawMeasurement, SyncError,
};
use crate::infrastructure::config::{BoardConfig, DetailLocation};

lazy_static! {
    // background-image: url("...") / url('...') / url(...)
    static ref STYLE_URL: Regex = Regex::new(r#"url\(\s*['"]?([^'")]+?)['"]?\s*\)"#).unwrap();
}

/// Image references of one element: direct attributes first, then `style`
pub fn image_refs_of(
    element: &crate::domain::ElementSnapshot,
    attributes: &[String],
    style_fallback: bool,
) -> Vec<String> {
    if let Some(direct) = attributes.iter().find_map(|a| element.attribute(a)) {
        return vec![direct.to_string()];
    }
    if !style_fallback {
        return Vec::new();
    }
    element
        .attribute("style")
        .map(|style| {
            STYLE_URL
                .captures_iter(style)
                .filter_map(|c| c.get(1))
                .map(|m| m.as_str().trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

pub struct RecordExtractor<'a> {
    board: &'a BoardConfig,
}

impl<'a> RecordExtractor<'a> {
    pub const fn new(board: &'a BoardConfig) -> Self {
        Self { board }
    }

    fn failure(item: &ListingItem, error: ListingError) -> SyncError {
        SyncError::extraction(item, error)
    }

    /// Name and profile reference of the entry at `position`
    pub fn read_listing_item(
        &self,
        position: usize,
        handle: &dyn DetailHandle,
    ) -> Result<ListingItem, SyncError> {
        let selectors = &self.board.selectors;
        let name = match &selectors.name {
            Some(selector) => handle
                .first_text(selector)
                .map_err(|e| SyncError::extraction(handle.location(), e))?
                .unwrap_or_default(),
            None => String::new(),
        };

        let profile_ref = handle
            .first_attribute(&selectors.profile_link, "href")
            .map_err(|e| SyncError::extraction(handle.location(), e))?
            .ok_or_else(|| {
                SyncError::extraction(
                    ListingItem::new(position, name.clone(), ""),
                    "profile link missing",
                )
            })?;

        Ok(ListingItem::new(position, name, profile_ref))
    }

    /// Pull the raw detail fields for `item`.
    ///
    /// Profile pages are opened through `source` and bounded by the board's
    /// detail timeout; inline boards read `item_handle` directly.
    pub async fn extract(
        &self,
        source: &mut dyn ListingSource,
        item: &ListingItem,
        item_handle: &dyn DetailHandle,
        profile_url: &str,
    ) -> Result<DraftRecord, SyncError> {
        match self.board.detail_location {
            DetailLocation::Listing => self.read_detail(item, item_handle, profile_url),
            DetailLocation::ProfilePage => {
                let timeout = self.board.detail_timeout();
                let page = tokio::time::timeout(timeout, source.open_detail(profile_url))
                    .await
                    .map_err(|_| {
                        SyncError::extraction(
                            item,
                            format!("detail page timed out after {}ms", timeout.as_millis()),
                        )
                    })?
                    .map_err(|e| Self::failure(item, e))?;
                debug!("Opened {} for {}", page.location(), item);
                self.read_detail(item, page.as_ref(), profile_url)
            }
        }
    }

    /// Raw fields from an already-rendered detail handle
    pub fn read_detail(
        &self,
        item: &ListingItem,
        detail: &dyn DetailHandle,
        profile_url: &str,
    ) -> Result<DraftRecord, SyncError> {
        let selectors = &self.board.selectors;
        let fail = |e| Self::failure(item, e);

        let detail_name = match &selectors.detail_name {
            Some(selector) => detail.first_text(selector).map_err(fail)?,
            None => None,
        };

        let image = &selectors.image;
        let image_refs = detail
            .select(&image.selector)
            .map_err(fail)?
            .iter()
            .flat_map(|el| image_refs_of(el, &image.attributes, image.style_fallback))
            .collect();

        let m = &selectors.measurement;
        let raw_measurements = match (&m.label, &m.value, &m.entry) {
            (Some(label), Some(value), _) => detail
                .labelled_pairs(label, value, m.metric.as_deref())
                .map_err(fail)?
                .into_iter()
                .map(|(label, text)| RawMeasurement::labelled(label, text))
                .collect(),
            (_, _, Some(entry)) => detail
                .select(entry)
                .map_err(fail)?
                .into_iter()
                .filter(|el| !el.text.is_empty())
                .map(|el| RawMeasurement::free_text(el.text))
                .collect(),
            _ => Vec::new(),
        };

        let out_of_town_marker = match &selectors.out_of_town {
            Some(marker) => {
                let found = detail.select(&marker.selector).map_err(fail)?;
                match &marker.text {
                    Some(text) => {
                        let wanted = text.to_lowercase();
                        found.iter().any(|el| el.text.to_lowercase().contains(&wanted))
                    }
                    None => !found.is_empty(),
                }
            }
            None => false,
        };

        Ok(DraftRecord {
            item: item.clone(),
            profile_url: profile_url.to_string(),
            detail_name,
            image_refs,
            raw_measurements,
            out_of_town_marker,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ElementSnapshot;
    use crate::infrastructure::config::presets;
    use crate::infrastructure::html_listing_source::HtmlDocument;
    use crate::test_utils::{ScriptedListingSource, StaticDetail, profile, test_board};
    use std::time::Duration;

    #[test]
    fn test_image_refs_prefer_direct_attributes() {
        let attrs = vec!["src".to_string(), "data-src".to_string()];
        let direct = ElementSnapshot::default()
            .attr("data-src", "/lazy.jpg")
            .attr("style", "background-image: url(/bg.jpg)");
        assert_eq!(image_refs_of(&direct, &attrs, true), vec!["/lazy.jpg"]);

        let styled = ElementSnapshot::default()
            .attr("style", r#"background-image: url("https://cdn.test/a.jpg?w=800");"#);
        assert_eq!(
            image_refs_of(&styled, &attrs, true),
            vec!["https://cdn.test/a.jpg?w=800"]
        );
        assert!(image_refs_of(&styled, &attrs, false).is_empty());
    }

    #[test]
    fn test_read_listing_item() {
        let board = test_board("x");
        let extractor = RecordExtractor::new(&board);
        let handle = StaticDetail::new("entry-1").with(
            crate::test_utils::ENTRY_LINK,
            ElementSnapshot::with_text("Jane Doe").attr("href", "jane-doe/"),
        );
        let item = extractor.read_listing_item(0, &handle).unwrap();
        assert_eq!(item, ListingItem::new(0, "Jane Doe", "jane-doe/"));

        let missing = StaticDetail::new("entry-2");
        let err = extractor.read_listing_item(1, &missing).unwrap_err();
        assert!(matches!(err, SyncError::ExtractionFailure { .. }));
    }

    #[test]
    fn test_chic_profile_markup() {
        let board = presets::chic_women();
        let html = r#"
            <h1>Jane Doe</h1>
            <div class="responsive-image_imageWrapper__3799i" style="background-image: url('/p/1.jpg')"></div>
            <div class="responsive-image_imageWrapper__3799i" style="background-image: url('/p/2.jpg')"></div>
            <div class="model-detail_modelDetailMeasurements__lXZ2d">
              <div>175 Height</div>
              <div>Brown Eye Colour</div>
            </div>
            <div class="model-detail_item__cBV_M"><span>Out of Town</span></div>
        "#;
        let page = HtmlDocument::document("https://chic.test/women/jane-doe/", html);
        let item = ListingItem::new(0, "", "/women/jane-doe/");

        let draft = RecordExtractor::new(&board)
            .read_detail(&item, &page, "https://chic.test/women/jane-doe/")
            .unwrap();
        assert_eq!(draft.detail_name.as_deref(), Some("Jane Doe"));
        assert_eq!(draft.image_refs, vec!["/p/1.jpg", "/p/2.jpg"]);
        assert_eq!(
            draft.raw_measurements,
            vec![
                RawMeasurement::free_text("175 Height"),
                RawMeasurement::free_text("Brown Eye Colour"),
            ]
        );
        assert!(draft.out_of_town_marker);
    }

    #[tokio::test]
    async fn test_extract_opens_profile() {
        let board = test_board("x");
        let url = "https://agency.test/x/jane-doe/";
        let mut source = ScriptedListingSource::new(Vec::new())
            .with_profile(url, profile(&["/1.jpg"], &[("Height", "175")], false));
        let item = ListingItem::new(0, "Jane", "jane-doe/");

        let draft = RecordExtractor::new(&board)
            .extract(&mut source, &item, &StaticDetail::new("entry-1"), url)
            .await
            .unwrap();
        assert_eq!(draft.image_refs, vec!["/1.jpg"]);
        assert_eq!(
            draft.raw_measurements,
            vec![RawMeasurement::labelled("Height", "175")]
        );
        assert!(!draft.out_of_town_marker);
        assert_eq!(source.opened, vec![url.to_string()]);
    }

    #[tokio::test]
    async fn test_slow_profile_times_out() {
        let board = test_board("x");
        let url = "https://agency.test/x/slow/";
        let mut source = ScriptedListingSource::new(Vec::new())
            .with_profile(url, profile(&["/1.jpg"], &[], false))
            .with_slow_profile(url, Duration::from_secs(5));
        let item = ListingItem::new(0, "Slow", "slow/");

        let err = RecordExtractor::new(&board)
            .extract(&mut source, &item, &StaticDetail::new("entry-1"), url)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::ExtractionFailure { ref reason, .. } if reason.contains("timed out")));
    }

    #[tokio::test]
    async fn test_inline_details_skip_navigation() {
        let mut board = test_board("x");
        board.detail_location = DetailLocation::Listing;
        let inline = profile(&["/inline.jpg"], &[], true);
        let mut source = ScriptedListingSource::new(Vec::new());
        let item = ListingItem::new(0, "Jane", "jane/");

        let draft = RecordExtractor::new(&board)
            .extract(&mut source, &item, &inline, "https://agency.test/x/jane/")
            .await
            .unwrap();
        assert!(draft.out_of_town_marker);
        assert!(source.opened.is_empty());
    }
}
