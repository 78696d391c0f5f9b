//! HTML listing source built on `reqwest` + `scraper`
//!
//! Boards are fetched as server-rendered HTML. "Loading more" follows the
//! board's next-page link when one is configured; waiting for a marker means
//! re-fetching until the marker is present or the timeout elapses.

#![allow(clippy::uninlined_format_args)]

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};
use url::Url;

use crate::domain::{DetailHandle, ElementSnapshot, ListingError, ListingSource};
use crate::infrastructure::config::{BoardConfig, BoardSelectors};
use crate::infrastructure::http_client::HttpClient;

/// Delay between re-fetches while waiting for a marker
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

fn compile(selector: &str) -> Result<Selector, ListingError> {
    Selector::parse(selector).map_err(|e| ListingError::invalid_selector(selector, e))
}

fn collapse_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn snapshot(element: ElementRef<'_>) -> ElementSnapshot {
    ElementSnapshot {
        text: collapse_text(element),
        attributes: element
            .value()
            .attrs()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect::<BTreeMap<_, _>>(),
    }
}

/// Parsed-on-demand markup of a whole page or of one listing entry
#[derive(Debug, Clone)]
pub struct HtmlDocument {
    location: String,
    html: String,
    fragment: bool,
}

impl HtmlDocument {
    pub fn document(location: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            html: html.into(),
            fragment: false,
        }
    }

    pub fn fragment(location: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            html: html.into(),
            fragment: true,
        }
    }

    fn parse(&self) -> Html {
        if self.fragment {
            Html::parse_fragment(&self.html)
        } else {
            Html::parse_document(&self.html)
        }
    }
}

impl DetailHandle for HtmlDocument {
    fn location(&self) -> &str {
        &self.location
    }

    fn select(&self, selector: &str) -> Result<Vec<ElementSnapshot>, ListingError> {
        let selector = compile(selector)?;
        let html = self.parse();
        Ok(html.select(&selector).map(snapshot).collect())
    }

    fn labelled_pairs(
        &self,
        label: &str,
        value: &str,
        metric: Option<&str>,
    ) -> Result<Vec<(String, String)>, ListingError> {
        let label_selector = compile(label)?;
        let value_selector = compile(value)?;
        let metric_selector = metric.map(compile).transpose()?;
        let html = self.parse();

        let mut pairs = Vec::new();
        for label_element in html.select(&label_selector) {
            let Some(value_element) = label_element
                .next_siblings()
                .find_map(ElementRef::wrap)
                .filter(|sibling| value_selector.matches(sibling))
            else {
                continue;
            };

            let text = metric_selector
                .as_ref()
                .and_then(|m| value_element.select(m).next())
                .map_or_else(|| collapse_text(value_element), collapse_text);

            pairs.push((collapse_text(label_element), text));
        }
        Ok(pairs)
    }
}

/// Entries and next-page link extracted from one listing page
struct ListingPage {
    items: Vec<String>,
    next_page: Option<String>,
}

fn contains_marker(html: &str, marker: &str) -> Result<bool, ListingError> {
    let selector = compile(marker)?;
    Ok(Html::parse_document(html).select(&selector).next().is_some())
}

fn parse_listing_page(
    page_url: &str,
    html: &str,
    selectors: &BoardSelectors,
) -> Result<ListingPage, ListingError> {
    let document = Html::parse_document(html);
    let item_selector = compile(&selectors.listing_item)?;
    let items = document.select(&item_selector).map(|el| el.html()).collect();

    let next_page = match &selectors.next_page {
        Some(next) => {
            let next_selector = compile(next)?;
            let href = document
                .select(&next_selector)
                .find_map(|el| el.value().attr("href").map(str::to_string));
            match href {
                Some(href) => Some(resolve(page_url, &href)?),
                None => None,
            }
        }
        None => None,
    };

    Ok(ListingPage { items, next_page })
}

fn resolve(base: &str, href: &str) -> Result<String, ListingError> {
    Url::parse(base)
        .and_then(|b| b.join(href.trim()))
        .map(String::from)
        .map_err(|e| ListingError::UrlResolutionFailed {
            url: href.to_string(),
            reason: e.to_string(),
        })
}

/// Listing source reading server-rendered board pages
pub struct HtmlListingSource {
    client: Arc<HttpClient>,
    selectors: BoardSelectors,
    listing_timeout: Duration,
    detail_timeout: Duration,
    poll_interval: Duration,
    board_url: Option<String>,
    items: Vec<String>,
    visited: HashSet<String>,
    next_page: Option<String>,
}

impl HtmlListingSource {
    pub fn new(client: Arc<HttpClient>, board: &BoardConfig) -> Self {
        Self {
            client,
            selectors: board.selectors.clone(),
            listing_timeout: board.listing_timeout(),
            detail_timeout: board.detail_timeout(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            board_url: None,
            items: Vec::new(),
            visited: HashSet::new(),
            next_page: None,
        }
    }

    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Fetch `url` until `marker` is present, bounded by `timeout`.
    ///
    /// The bound covers in-flight requests too: a server that accepts the
    /// connection and never answers still yields `MarkerTimeout` on time.
    async fn fetch_until_marker(
        &self,
        url: &str,
        marker: &str,
        timeout: Duration,
    ) -> Result<String, ListingError> {
        let marker_timeout = || ListingError::MarkerTimeout {
            marker: marker.to_string(),
            url: url.to_string(),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        };
        let deadline = Instant::now() + timeout;
        loop {
            let fetched = tokio::time::timeout_at(deadline, self.client.get_text(url)).await;
            let last_error = match fetched {
                Err(_) => {
                    warn!("Fetching {} did not finish within {:?}", url, timeout);
                    return Err(marker_timeout());
                }
                Ok(Ok(body)) => {
                    if contains_marker(&body, marker)? {
                        return Ok(body);
                    }
                    debug!("Marker '{}' not yet present on {}", marker, url);
                    None
                }
                Ok(Err(e @ ListingError::HttpRequestFailed { status, .. })) if status < 500 => {
                    return Err(e);
                }
                Ok(Err(e)) => {
                    warn!("Fetching {} failed, will retry: {}", url, e);
                    Some(e)
                }
            };

            if Instant::now() + self.poll_interval >= deadline {
                return Err(last_error.unwrap_or_else(marker_timeout));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    fn absorb_page(&mut self, page_url: &str, html: &str) -> Result<usize, ListingError> {
        let page = parse_listing_page(page_url, html, &self.selectors)?;
        let revealed = page.items.len();
        self.items.extend(page.items);
        self.next_page = page.next_page.filter(|next| !self.visited.contains(next));
        Ok(revealed)
    }
}

#[async_trait]
impl ListingSource for HtmlListingSource {
    async fn load(&mut self, board_url: &str) -> Result<(), ListingError> {
        let marker = self.selectors.listing_marker().to_string();
        let html = self
            .fetch_until_marker(board_url, &marker, self.listing_timeout)
            .await?;

        self.items.clear();
        self.visited.clear();
        self.visited.insert(board_url.to_string());
        self.board_url = Some(board_url.to_string());

        let revealed = self.absorb_page(board_url, &html)?;
        debug!("Loaded {} with {} entries", board_url, revealed);
        Ok(())
    }

    async fn trigger_more(&mut self) -> Result<(), ListingError> {
        if self.board_url.is_none() {
            return Err(ListingError::NotLoaded);
        }
        let Some(next) = self.next_page.take() else {
            return Ok(());
        };

        let marker = self.selectors.listing_marker().to_string();
        let html = self
            .fetch_until_marker(&next, &marker, self.listing_timeout)
            .await?;
        self.visited.insert(next.clone());

        let revealed = self.absorb_page(&next, &html)?;
        debug!("Next page {} revealed {} entries", next, revealed);
        Ok(())
    }

    async fn count_items(&mut self) -> Result<usize, ListingError> {
        if self.board_url.is_none() {
            return Err(ListingError::NotLoaded);
        }
        Ok(self.items.len())
    }

    async fn get_items(&mut self) -> Result<Vec<Box<dyn DetailHandle>>, ListingError> {
        let board_url = self.board_url.as_deref().ok_or(ListingError::NotLoaded)?;
        Ok(self
            .items
            .iter()
            .enumerate()
            .map(|(index, html)| {
                Box::new(HtmlDocument::fragment(
                    format!("{}#entry-{}", board_url, index + 1),
                    html.clone(),
                )) as Box<dyn DetailHandle>
            })
            .collect())
    }

    async fn open_detail(
        &mut self,
        profile_url: &str,
    ) -> Result<Box<dyn DetailHandle>, ListingError> {
        let html = self
            .fetch_until_marker(profile_url, &self.selectors.detail_marker, self.detail_timeout)
            .await?;
        Ok(Box::new(HtmlDocument::document(profile_url, html)))
    }
}
