//! Field normalization
//!
//! Turns a `DraftRecord` into a canonical `RosterRecord`: measurement labels
//! are matched against the board's label set, combined metric/imperial values
//! keep their first segment, and every URL is made absolute.

use regex::Regex;
use std::collections::HashSet;
use tracing::debug;
use url::Url;

use crate::domain::{
    DraftRecord, Gender, Identifier, IdentifierDeriver, ListingItem, Measurements, RawMeasurement,
    RosterRecord, SyncError, profile_slug,
};
use crate::infrastructure::config::{BoardConfig, MeasurementLabel};

/// Label matcher for one canonical measurement key
#[derive(Debug)]
struct LabelMatcher {
    key: String,
    /// Whole-label match ("Eye Colour:", "HEIGHT")
    anchored: Regex,
    /// Label anywhere inside free text ("Brown Eye Colour")
    search: Regex,
}

impl LabelMatcher {
    fn new(label: &MeasurementLabel) -> Result<Self, regex::Error> {
        let key = label.key.trim().to_lowercase();
        let mut stems: Vec<String> = vec![key.clone()];
        match key.strip_suffix('s') {
            Some(singular) if !singular.is_empty() => stems.push(singular.to_string()),
            _ => stems.push(format!("{key}s")),
        }
        stems.extend(label.aliases.iter().map(|a| a.trim().to_lowercase()));

        let mut stems: Vec<String> = stems
            .iter()
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.split_whitespace()
                    .map(regex::escape)
                    .collect::<Vec<_>>()
                    .join(r"\s+")
            })
            .collect();
        // Longest alternative first so "hair colour" wins over "hair"
        stems.sort_by_key(|s| std::cmp::Reverse(s.len()));
        stems.dedup();

        let body = format!(r"(?:{})(?:\s+(?:colou?r|size))?", stems.join("|"));
        Ok(Self {
            key,
            anchored: Regex::new(&format!(r"(?i)^\s*{body}\s*:?\s*$"))?,
            search: Regex::new(&format!(r"(?i)\b{body}\b\s*:?"))?,
        })
    }
}

pub struct FieldNormalizer {
    board: String,
    agency: String,
    gender: Gender,
    base_url: Url,
    keys: Vec<String>,
    matchers: Vec<LabelMatcher>,
    value_separators: Vec<char>,
    deriver: IdentifierDeriver,
}

impl FieldNormalizer {
    pub fn new(board: &BoardConfig) -> Result<Self, SyncError> {
        let base_url = Url::parse(&board.base_url).map_err(|e| {
            SyncError::Configuration(format!("invalid base URL '{}': {e}", board.base_url))
        })?;
        let matchers = board
            .measurement_labels
            .iter()
            .map(LabelMatcher::new)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| SyncError::Configuration(format!("invalid measurement label: {e}")))?;

        Ok(Self {
            board: board.key.clone(),
            agency: board.agency.clone(),
            gender: board.gender,
            base_url,
            keys: matchers.iter().map(|m| m.key.clone()).collect(),
            matchers,
            value_separators: board.value_separators.clone(),
            deriver: board.identifier_deriver(),
        })
    }

    /// Absolute form of `raw`, resolved against the board URL
    pub fn resolve_url(&self, raw: &str) -> Result<String, SyncError> {
        self.base_url
            .join(raw.trim())
            .map(String::from)
            .map_err(|e| SyncError::extraction(raw, format!("unresolvable URL: {e}")))
    }

    /// Absolute profile URL and catalog key of a listing entry
    pub fn identify(&self, item: &ListingItem) -> Result<(String, Identifier), SyncError> {
        let profile_url = self.resolve_url(&item.profile_ref)?;
        let identifier = self
            .deriver
            .derive(&profile_url, &collapse_whitespace(&item.name))
            .ok_or_else(|| SyncError::extraction(item, "no identifier derivable"))?;
        Ok((profile_url, identifier))
    }

    /// Canonical measurement key for a label, if it belongs to the label set
    pub fn match_label(&self, label: &str) -> Option<&str> {
        self.matchers
            .iter()
            .find(|m| m.anchored.is_match(label))
            .map(|m| m.key.as_str())
    }

    /// First segment of a combined value ("86 / 34" -> "86").
    ///
    /// Only values starting with a digit are split, so text values that
    /// happen to contain a separator survive intact.
    pub fn split_value(&self, value: &str) -> String {
        let value = collapse_whitespace(value);
        if value.starts_with(|c: char| c.is_ascii_digit()) {
            if let Some(index) = value.find(self.value_separators.as_slice()) {
                return value[..index].trim().to_string();
            }
        }
        value
    }

    fn parse_free_text(&self, text: &str) -> Option<(&str, String)> {
        let text = collapse_whitespace(text);
        self.matchers.iter().find_map(|m| {
            let found = m.search.find(&text)?;
            let remainder = format!("{} {}", &text[..found.start()], &text[found.end()..]);
            let remainder = remainder.trim_matches(|c: char| c.is_whitespace() || c == ':' || c == '-');
            Some((m.key.as_str(), self.split_value(remainder)))
        })
    }

    /// Measurements over the full label set; unknown labels are dropped
    pub fn normalize_measurements(&self, raw: &[RawMeasurement]) -> Measurements {
        let mut measurements = Measurements::with_keys(self.keys.iter().cloned());
        for entry in raw {
            let parsed = match &entry.label {
                Some(label) => self
                    .match_label(label)
                    .map(|key| (key, self.split_value(&entry.text))),
                None => self.parse_free_text(&entry.text),
            };

            match parsed {
                Some((key, value)) if !value.is_empty() => {
                    // First occurrence wins
                    if measurements.get(key).is_empty() {
                        measurements.set(key, value);
                    }
                }
                Some(_) => {}
                None => debug!("Ignoring unknown measurement {:?}", entry),
            }
        }
        measurements
    }

    /// Absolute image URLs, duplicates removed, order of appearance kept
    pub fn normalize_images(&self, refs: &[String]) -> Vec<String> {
        let mut seen = HashSet::new();
        refs.iter()
            .filter(|r| !r.trim().is_empty())
            .filter_map(|r| match self.resolve_url(r) {
                Ok(url) => Some(url),
                Err(e) => {
                    debug!("Dropping image reference: {}", e);
                    None
                }
            })
            .filter(|url| seen.insert(url.clone()))
            .collect()
    }

    pub fn normalize(
        &self,
        identifier: Identifier,
        draft: DraftRecord,
    ) -> Result<RosterRecord, SyncError> {
        let portfolio_images = self.normalize_images(&draft.image_refs);
        if portfolio_images.is_empty() {
            return Err(SyncError::ZeroImages {
                item: draft.item.to_string(),
                profile_url: draft.profile_url,
            });
        }

        let listing_name = collapse_whitespace(&draft.item.name);
        let name = if !listing_name.is_empty() {
            listing_name
        } else if let Some(detail) = draft
            .detail_name
            .as_deref()
            .map(collapse_whitespace)
            .filter(|n| !n.is_empty())
        {
            detail
        } else {
            name_from_slug(&draft.profile_url)
        };

        Ok(RosterRecord {
            identifier,
            name,
            profile_url: draft.profile_url,
            board: self.board.clone(),
            agency: self.agency.clone(),
            gender: self.gender,
            portfolio_images,
            measurements: self.normalize_measurements(&draft.raw_measurements),
            out_of_town: draft.out_of_town_marker,
        })
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// "https://x.test/board/jane-doe/" -> "Jane Doe"
fn name_from_slug(profile_url: &str) -> String {
    profile_slug(profile_url)
        .unwrap_or_default()
        .split(['-', '_'])
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}
