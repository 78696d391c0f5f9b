//! Identifier derivation for roster records
//!
//! Catalog keys are derived from the profile URL slug. Display-name keys are a
//! fallback for boards that expose no stable profile URL.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use url::Url;

/// Default separator joining slug words (`jane-doe` -> `jane_doe`)
pub const DEFAULT_SEPARATOR: char = '_';

/// Stable catalog key of a roster entry, unique within a board
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    /// Wrap an already-normalized key (e.g. one read back from the store)
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Identifier {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Which source text a key is derived from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierPolicy {
    /// Last non-empty path segment of the profile URL, falling back to the name
    #[default]
    UrlSlug,
    /// Display name lowercased with each space replaced by the separator,
    /// the key scheme of snapshots written before slug keys. Hyphens are kept
    /// (`Mary-Jane Smith` -> `mary-jane_smith`).
    DisplayName,
}

/// Derives catalog keys with a fixed policy and separator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentifierDeriver {
    policy: IdentifierPolicy,
    separator: char,
}

impl Default for IdentifierDeriver {
    fn default() -> Self {
        Self::new(IdentifierPolicy::UrlSlug, DEFAULT_SEPARATOR)
    }
}

impl IdentifierDeriver {
    pub const fn new(policy: IdentifierPolicy, separator: char) -> Self {
        Self { policy, separator }
    }

    pub const fn policy(&self) -> IdentifierPolicy {
        self.policy
    }

    /// Derive the key for a record from its profile URL and display name.
    ///
    /// Under `UrlSlug` the name is consulted only when the URL has no usable
    /// slug. Returns `None` when neither source yields a key.
    pub fn derive(&self, profile_url: &str, name: &str) -> Option<Identifier> {
        match self.policy {
            IdentifierPolicy::UrlSlug => self
                .from_profile_url(profile_url)
                .or_else(|| self.from_name(name)),
            IdentifierPolicy::DisplayName => self.legacy_name_key(name),
        }
    }

    /// Key from the last non-empty path segment, ignoring query and fragment
    pub fn from_profile_url(&self, profile_url: &str) -> Option<Identifier> {
        self.normalize(&profile_slug(profile_url)?)
    }

    /// Key from the display name (`"Jane  Doe"` -> `jane_doe`)
    pub fn from_name(&self, name: &str) -> Option<Identifier> {
        self.normalize(name)
    }

    fn legacy_name_key(&self, name: &str) -> Option<Identifier> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        Some(Identifier(
            name.to_lowercase().replace(' ', &self.separator.to_string()),
        ))
    }

    fn normalize(&self, raw: &str) -> Option<Identifier> {
        let separator = self.separator;
        let words: Vec<String> = raw
            .split(|c: char| c == '-' || c == separator || c.is_whitespace())
            .filter(|word| !word.is_empty())
            .map(str::to_lowercase)
            .collect();

        if words.is_empty() {
            return None;
        }

        Some(Identifier(words.join(&separator.to_string())))
    }
}

/// Last non-empty path segment of `profile_url`, percent-decoded
/// (`/board/jos%C3%A9-silva/` -> `josé-silva`)
pub fn profile_slug(profile_url: &str) -> Option<String> {
    let path = match Url::parse(profile_url) {
        Ok(url) => url.path().to_string(),
        Err(_) => profile_url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    };

    let segment = path.rsplit('/').find(|segment| !segment.trim().is_empty())?;
    Some(urlencoding::decode(segment).map_or_else(|_| segment.to_string(), Cow::into_owned))
}
