//! Roster entities
//!
//! `ListingItem` and `DraftRecord` are transient values produced while a board
//! is scraped; `RosterRecord` is the canonical shape persisted in the catalog.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::identifier::Identifier;

/// One entry read from a stabilized board listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingItem {
    /// Zero-based position within the listing
    pub position: usize,
    /// Display name as shown on the listing (may be empty)
    pub name: String,
    /// Profile link exactly as found in the markup (relative or absolute)
    pub profile_ref: String,
}

impl ListingItem {
    pub fn new(position: usize, name: impl Into<String>, profile_ref: impl Into<String>) -> Self {
        Self {
            position,
            name: name.into(),
            profile_ref: profile_ref.into(),
        }
    }
}

impl fmt::Display for ListingItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            write!(f, "#{} ({})", self.position + 1, self.profile_ref)
        } else {
            write!(f, "#{} {}", self.position + 1, self.name)
        }
    }
}

/// Categorical gender tag of a board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Female,
    Male,
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Female => f.write_str("female"),
            Self::Male => f.write_str("male"),
        }
    }
}

/// Measurement values keyed by a fixed label set.
///
/// Every configured key is always present; unset values are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Measurements(BTreeMap<String, String>);

impl Measurements {
    /// Empty values for every key of the label set
    pub fn with_keys<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self(keys.into_iter().map(|k| (k.into(), String::new())).collect())
    }

    /// Set a value; keys outside the label set are ignored.
    /// Returns whether the key was known.
    pub fn set(&mut self, key: &str, value: impl Into<String>) -> bool {
        match self.0.get_mut(key) {
            Some(slot) => {
                *slot = value.into();
                true
            }
            None => false,
        }
    }

    /// Value for a key, empty when unset or unknown
    pub fn get(&self, key: &str) -> &str {
        self.0.get(key).map_or("", String::as_str)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Raw measurement text as found on a profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMeasurement {
    /// Label text when the markup separates label and value
    pub label: Option<String>,
    /// Value text, or the whole entry text when `label` is `None`
    pub text: String,
}

impl RawMeasurement {
    pub fn labelled(label: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            text: text.into(),
        }
    }

    pub fn free_text(text: impl Into<String>) -> Self {
        Self {
            label: None,
            text: text.into(),
        }
    }
}

/// Unnormalized fields pulled from a listing entry and its profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftRecord {
    pub item: ListingItem,
    /// Absolute profile URL
    pub profile_url: String,
    /// Name found on the profile page, if the board exposes one
    pub detail_name: Option<String>,
    /// Image references in order of appearance, possibly relative
    pub image_refs: Vec<String>,
    pub raw_measurements: Vec<RawMeasurement>,
    pub out_of_town_marker: bool,
}

/// Canonical catalog record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterRecord {
    pub identifier: Identifier,
    pub name: String,
    pub profile_url: String,
    pub board: String,
    pub agency: String,
    pub gender: Gender,
    pub portfolio_images: Vec<String>,
    pub measurements: Measurements,
    pub out_of_town: bool,
}

impl RosterRecord {
    /// Content fingerprint used to skip no-op refresh writes
    pub fn content_hash(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for field in [
            self.identifier.as_str(),
            self.name.as_str(),
            self.profile_url.as_str(),
            self.board.as_str(),
            self.agency.as_str(),
        ] {
            hasher.update(field.as_bytes());
            hasher.update(&[0x1f]);
        }
        hasher.update(self.gender.to_string().as_bytes());
        for image in &self.portfolio_images {
            hasher.update(image.as_bytes());
            hasher.update(&[0x1e]);
        }
        for (key, value) in self.measurements.iter() {
            hasher.update(key.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
            hasher.update(&[0x1e]);
        }
        hasher.update(&[u8::from(self.out_of_town)]);
        hasher.finalize().to_hex().to_string()
    }
}
