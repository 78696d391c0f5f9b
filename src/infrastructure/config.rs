//! Configuration infrastructure
//!
//! Contains configuration loading, validation and the built-in board presets.
//!
//! Every board is described by a typed `BoardConfig`. The whole file is
//! validated when it is loaded, so a broken selector or URL fails the command
//! up front instead of halfway through a run.

#![allow(clippy::derivable_impls)]

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use tracing::info;
use url::Url;

use crate::domain::{Gender, IdentifierDeriver, IdentifierPolicy};
use crate::infrastructure::http_client::HttpClientConfig;

/// Configuration validation failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Board '{board}': invalid selector for {field}: '{selector}' ({reason})")]
    InvalidSelector {
        board: String,
        field: String,
        selector: String,
        reason: String,
    },

    #[error("Board '{board}': invalid base URL '{url}': {reason}")]
    InvalidBaseUrl {
        board: String,
        url: String,
        reason: String,
    },

    #[error("Duplicate board key '{0}'")]
    DuplicateBoard(String),

    #[error("Board '{board}': {message}")]
    InvalidValue { board: String, message: String },

    #[error("Unknown board '{0}'")]
    UnknownBoard(String),
}

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// sqlx connection string of the catalog database
    pub database_url: String,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub http: HttpClientConfig,

    pub boards: Vec<BoardConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let database_path = ConfigManager::get_app_data_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join("catalog.db");

        Self {
            database_url: format!("sqlite://{}", database_path.display()),
            logging: LoggingConfig::default(),
            http: HttpClientConfig::default(),
            boards: vec![
                presets::viviens_women(),
                presets::viviens_men(),
                presets::chic_women(),
            ],
        }
    }
}

impl AppConfig {
    /// Validate every board; called on load
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut keys = HashSet::new();
        for board in &self.boards {
            if !keys.insert(board.key.as_str()) {
                return Err(ConfigError::DuplicateBoard(board.key.clone()));
            }
            board.validate()?;
        }
        Ok(())
    }

    pub fn board(&self, key: &str) -> Result<&BoardConfig, ConfigError> {
        self.boards
            .iter()
            .find(|b| b.key == key)
            .ok_or_else(|| ConfigError::UnknownBoard(key.to_string()))
    }
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted file logs
    pub json_format: bool,

    /// Enable console output
    pub console_output: bool,

    /// Enable file output
    pub file_output: bool,

    /// Directory for log files; defaults to `logs/` beside the executable
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Log file name
    pub file_name: String,

    /// Number of log files to keep (older files will be deleted)
    pub max_files: u32,

    /// Module-specific log level filters (e.g., "sqlx": "warn", "reqwest": "info")
    #[serde(default)]
    pub module_filters: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            console_output: true,
            file_output: true,
            log_dir: None,
            file_name: "roster-sync.log".to_string(),
            max_files: 7,
            module_filters: HashMap::new(),
        }
    }
}

/// Where a board keeps images, measurements and the out-of-town flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailLocation {
    /// On a separate profile page linked from the listing
    #[default]
    ProfilePage,
    /// Inside the listing entry itself
    Listing,
}

/// CSS selectors for one board
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardSelectors {
    /// One element per roster entry
    pub listing_item: String,

    /// Element whose presence means the listing has rendered; defaults to `listing_item`
    #[serde(default)]
    pub listing_marker: Option<String>,

    /// Display name inside a listing entry
    #[serde(default)]
    pub name: Option<String>,

    /// Link (`href`) to the profile inside a listing entry
    pub profile_link: String,

    /// "Next page" link used to reveal more entries
    #[serde(default)]
    pub next_page: Option<String>,

    /// Element whose presence means a profile page has rendered
    pub detail_marker: String,

    /// Display name on the profile page
    #[serde(default)]
    pub detail_name: Option<String>,

    pub image: ImageSelector,

    pub measurement: MeasurementSelectors,

    #[serde(default)]
    pub out_of_town: Option<MarkerSelector>,
}

impl BoardSelectors {
    pub fn listing_marker(&self) -> &str {
        self.listing_marker.as_deref().unwrap_or(&self.listing_item)
    }
}

/// Portfolio image extraction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageSelector {
    pub selector: String,

    /// Attributes tried in order for a direct URL
    #[serde(default = "default_image_attributes")]
    pub attributes: Vec<String>,

    /// Fall back to `url(...)` inside the `style` attribute
    #[serde(default = "default_true")]
    pub style_fallback: bool,
}

/// Measurement extraction.
///
/// With `label` + `value`, each label element is paired with the following
/// sibling value element (definition lists). Otherwise each `entry` element's
/// text carries both label and value ("86 / 34 Bust").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeasurementSelectors {
    #[serde(default)]
    pub entry: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    /// Preferred metric element inside a value
    #[serde(default)]
    pub metric: Option<String>,
}

/// Presence marker for a boolean flag
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkerSelector {
    pub selector: String,
    /// When set, a matched element must also contain this text (case-insensitive)
    #[serde(default)]
    pub text: Option<String>,
}

/// One canonical measurement key and the extra label spellings that map to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasurementLabel {
    pub key: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl MeasurementLabel {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            aliases: Vec::new(),
        }
    }

    pub fn with_aliases(key: &str, aliases: &[&str]) -> Self {
        Self {
            key: key.to_string(),
            aliases: aliases.iter().map(|a| (*a).to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IdentifierConfig {
    pub policy: IdentifierPolicy,
    pub separator: char,
}

impl Default for IdentifierConfig {
    fn default() -> Self {
        Self {
            policy: IdentifierPolicy::UrlSlug,
            separator: crate::domain::identifier::DEFAULT_SEPARATOR,
        }
    }
}

/// Stabilization loop settings
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StabilizationConfig {
    /// Wait after each load trigger before re-counting
    pub settle_wait_ms: u64,
    /// Consecutive no-growth observations required to stop
    pub max_stall_retries: u32,
    /// Hard ceiling on trigger/count rounds
    pub max_rounds: u32,
}

impl Default for StabilizationConfig {
    fn default() -> Self {
        Self {
            settle_wait_ms: 1000,
            max_stall_retries: 10,
            max_rounds: 500,
        }
    }
}

/// Typed configuration of one board
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardConfig {
    /// Scope key; every stored entry of this board carries it
    pub key: String,
    pub agency: String,
    pub gender: Gender,
    pub base_url: String,

    #[serde(default)]
    pub detail_location: DetailLocation,

    pub selectors: BoardSelectors,

    #[serde(default = "default_measurement_labels")]
    pub measurement_labels: Vec<MeasurementLabel>,

    /// Characters separating metric and imperial parts of a value
    #[serde(default = "default_value_separators")]
    pub value_separators: Vec<char>,

    #[serde(default)]
    pub identifier: IdentifierConfig,

    #[serde(default)]
    pub stabilization: StabilizationConfig,

    #[serde(default = "default_listing_timeout_ms")]
    pub listing_timeout_ms: u64,

    #[serde(default = "default_detail_timeout_ms")]
    pub detail_timeout_ms: u64,

    /// Re-extract entries that already exist instead of skipping them
    #[serde(default)]
    pub refresh_existing: bool,
}

impl BoardConfig {
    pub const fn identifier_deriver(&self) -> IdentifierDeriver {
        IdentifierDeriver::new(self.identifier.policy, self.identifier.separator)
    }

    pub const fn listing_timeout(&self) -> Duration {
        Duration::from_millis(self.listing_timeout_ms)
    }

    pub const fn detail_timeout(&self) -> Duration {
        Duration::from_millis(self.detail_timeout_ms)
    }

    pub fn measurement_keys(&self) -> impl Iterator<Item = &str> {
        self.measurement_labels.iter().map(|l| l.key.as_str())
    }

    /// Check selectors, URL, label set and timing values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: &str| ConfigError::InvalidValue {
            board: self.key.clone(),
            message: message.to_string(),
        };

        if self.key.trim().is_empty() {
            return Err(invalid("board key must not be empty"));
        }

        let base = Url::parse(&self.base_url).map_err(|e| ConfigError::InvalidBaseUrl {
            board: self.key.clone(),
            url: self.base_url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidBaseUrl {
                board: self.key.clone(),
                url: self.base_url.clone(),
                reason: format!("unsupported scheme '{}'", base.scheme()),
            });
        }

        let s = &self.selectors;
        let mut selectors: Vec<(&str, &str)> = vec![
            ("listing_item", s.listing_item.as_str()),
            ("profile_link", s.profile_link.as_str()),
            ("detail_marker", s.detail_marker.as_str()),
            ("image", s.image.selector.as_str()),
        ];
        let optional = [
            ("listing_marker", &s.listing_marker),
            ("name", &s.name),
            ("next_page", &s.next_page),
            ("detail_name", &s.detail_name),
            ("measurement.entry", &s.measurement.entry),
            ("measurement.label", &s.measurement.label),
            ("measurement.value", &s.measurement.value),
            ("measurement.metric", &s.measurement.metric),
        ];
        selectors.extend(
            optional
                .iter()
                .filter_map(|(field, value)| value.as_deref().map(|v| (*field, v))),
        );
        if let Some(marker) = &s.out_of_town {
            selectors.push(("out_of_town", marker.selector.as_str()));
        }

        for (field, selector) in selectors {
            scraper::Selector::parse(selector).map_err(|e| ConfigError::InvalidSelector {
                board: self.key.clone(),
                field: field.to_string(),
                selector: selector.to_string(),
                reason: e.to_string(),
            })?;
        }

        let m = &s.measurement;
        match (&m.entry, &m.label, &m.value) {
            (_, Some(_), Some(_)) | (Some(_), None, None) => {}
            (None, None, None) => {
                return Err(invalid(
                    "measurement needs either `entry` or both `label` and `value`",
                ));
            }
            _ => return Err(invalid("measurement `label` and `value` must be set together")),
        }

        if s.image.attributes.is_empty() && !s.image.style_fallback {
            return Err(invalid("image extraction needs an attribute or the style fallback"));
        }

        if self.measurement_labels.is_empty() {
            return Err(invalid("measurement label set must not be empty"));
        }
        let mut label_keys = HashSet::new();
        for label in &self.measurement_labels {
            let key = label.key.trim();
            if key.is_empty() || !label_keys.insert(key.to_lowercase()) {
                return Err(invalid(&format!("invalid or duplicate measurement key '{key}'")));
            }
        }

        if self.stabilization.max_stall_retries == 0 {
            return Err(invalid("stabilization.max_stall_retries must be at least 1"));
        }
        if self.stabilization.max_rounds < self.stabilization.max_stall_retries {
            return Err(invalid(
                "stabilization.max_rounds must not be lower than max_stall_retries",
            ));
        }
        if self.listing_timeout_ms == 0 || self.detail_timeout_ms == 0 {
            return Err(invalid("timeouts must be greater than zero"));
        }
        if self.identifier.separator.is_alphanumeric() {
            return Err(invalid("identifier separator must not be alphanumeric"));
        }

        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_image_attributes() -> Vec<String> {
    vec!["src".to_string()]
}

fn default_measurement_labels() -> Vec<MeasurementLabel> {
    presets::WOMEN_MEASUREMENTS
        .iter()
        .map(|key| MeasurementLabel::new(key))
        .collect()
}

fn default_value_separators() -> Vec<char> {
    vec!['/', '|']
}

const fn default_listing_timeout_ms() -> u64 {
    10_000
}

const fn default_detail_timeout_ms() -> u64 {
    10_000
}

/// Configuration file manager
pub struct ConfigManager {
    pub config_path: PathBuf,
}

impl ConfigManager {
    /// Get the application configuration directory
    pub fn get_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get user config directory")?
            .join("roster-sync");

        Ok(config_dir)
    }

    /// Get application data directory
    pub fn get_app_data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .context("Failed to get user data directory")?
            .join("roster-sync");

        Ok(data_dir)
    }

    /// Configuration manager for the default location
    pub fn new() -> Result<Self> {
        let config_path = Self::get_config_dir()?.join("roster_sync_config.json");
        Ok(Self { config_path })
    }

    /// Configuration manager for an explicit file
    pub fn with_path(path: impl AsRef<Path>) -> Self {
        Self {
            config_path: path.as_ref().to_path_buf(),
        }
    }

    /// Load and validate the configuration, writing defaults if the file does not exist
    pub async fn load_config(&self) -> Result<AppConfig> {
        if !self.config_path.exists() {
            info!("Configuration file not found, creating default: {:?}", self.config_path);
            let default_config = AppConfig::default();
            self.save_config(&default_config).await?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(&self.config_path)
            .await
            .with_context(|| format!("Failed to read configuration file {:?}", self.config_path))?;

        let config: AppConfig = serde_json::from_str(&content)
            .with_context(|| format!("Configuration file {:?} is malformed", self.config_path))?;

        config
            .validate()
            .with_context(|| format!("Configuration file {:?} is invalid", self.config_path))?;

        info!(
            "Loaded configuration from {:?} ({} boards)",
            self.config_path,
            config.boards.len()
        );
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_config(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }

        let content =
            serde_json::to_string_pretty(config).context("Failed to serialize configuration")?;

        fs::write(&self.config_path, content)
            .await
            .context("Failed to write configuration file")?;

        info!("Saved configuration to: {:?}", self.config_path);
        Ok(())
    }

    /// Get the configuration file path
    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }
}

/// Built-in boards
pub mod presets {
    use super::{
        BoardConfig, BoardSelectors, DetailLocation, IdentifierConfig, ImageSelector,
        MarkerSelector, MeasurementLabel, MeasurementSelectors, StabilizationConfig,
    };
    use crate::domain::Gender;

    pub const WOMEN_MEASUREMENTS: &[&str] = &[
        "height", "bust", "waist", "hips", "dress", "shoe", "hair", "eyes",
    ];

    pub const MEN_MEASUREMENTS: &[&str] = &[
        "height", "chest", "waist", "suit", "collar", "shoe", "hair", "eyes",
    ];

    fn labels(keys: &[&str]) -> Vec<MeasurementLabel> {
        keys.iter().map(|key| MeasurementLabel::new(key)).collect()
    }

    fn viviens(key: &str, base_url: &str, gender: Gender, keys: &[&str]) -> BoardConfig {
        BoardConfig {
            key: key.to_string(),
            agency: "Vivien's".to_string(),
            gender,
            base_url: base_url.to_string(),
            detail_location: DetailLocation::ProfilePage,
            selectors: BoardSelectors {
                listing_item: "div.model".to_string(),
                listing_marker: None,
                name: Some("p.name a".to_string()),
                profile_link: "p.name a".to_string(),
                next_page: None,
                detail_marker: "div#model-gallery".to_string(),
                detail_name: None,
                image: ImageSelector {
                    selector: "div#model-gallery img".to_string(),
                    attributes: vec!["src".to_string(), "data-src".to_string()],
                    style_fallback: true,
                },
                measurement: MeasurementSelectors {
                    entry: None,
                    label: Some("dl#specs dt".to_string()),
                    value: Some("dd".to_string()),
                    metric: Some("span.metric".to_string()),
                },
                out_of_town: Some(MarkerSelector {
                    selector: "div.out-of-town".to_string(),
                    text: None,
                }),
            },
            measurement_labels: labels(keys),
            value_separators: vec!['/', '|'],
            identifier: IdentifierConfig::default(),
            stabilization: StabilizationConfig::default(),
            listing_timeout_ms: 10_000,
            detail_timeout_ms: 10_000,
            refresh_existing: false,
        }
    }

    /// Vivien's Sydney women's mainboard
    pub fn viviens_women() -> BoardConfig {
        viviens(
            "viviens-sydney-mainboard",
            "https://viviensmodels.com.au/sydney/mainboard/",
            Gender::Female,
            WOMEN_MEASUREMENTS,
        )
    }

    /// Vivien's Sydney men's board
    pub fn viviens_men() -> BoardConfig {
        viviens(
            "viviens-sydney-men",
            "https://viviensmodels.com.au/sydney/men/",
            Gender::Male,
            MEN_MEASUREMENTS,
        )
    }

    /// Chic women's mainboard; images live in background styles
    pub fn chic_women() -> BoardConfig {
        BoardConfig {
            key: "chic-women-mainboard".to_string(),
            agency: "Chic".to_string(),
            gender: Gender::Female,
            base_url: "https://www.chicmanagement.com.au/women/mainboard/".to_string(),
            detail_location: DetailLocation::ProfilePage,
            selectors: BoardSelectors {
                listing_item: "a.models-list-item_modelImage__Wvd4u".to_string(),
                listing_marker: None,
                name: None,
                profile_link: "a.models-list-item_modelImage__Wvd4u".to_string(),
                next_page: None,
                detail_marker: "div.responsive-image_imageWrapper__3799i".to_string(),
                detail_name: Some("h1".to_string()),
                image: ImageSelector {
                    selector: "div.responsive-image_imageWrapper__3799i".to_string(),
                    attributes: Vec::new(),
                    style_fallback: true,
                },
                measurement: MeasurementSelectors {
                    entry: Some("div.model-detail_modelDetailMeasurements__lXZ2d > div".to_string()),
                    label: None,
                    value: None,
                    metric: None,
                },
                out_of_town: Some(MarkerSelector {
                    selector: "div.model-detail_item__cBV_M span".to_string(),
                    text: Some("Out of Town".to_string()),
                }),
            },
            measurement_labels: vec![
                MeasurementLabel::new("height"),
                MeasurementLabel::new("bust"),
                MeasurementLabel::new("waist"),
                MeasurementLabel::new("hips"),
                MeasurementLabel::new("dress"),
                MeasurementLabel::with_aliases("shoe", &["Shoes"]),
                MeasurementLabel::with_aliases("hair", &["Hair Colour"]),
                MeasurementLabel::with_aliases("eyes", &["Eye Colour"]),
            ],
            value_separators: vec!['/', '|'],
            identifier: IdentifierConfig::default(),
            stabilization: StabilizationConfig::default(),
            listing_timeout_ms: 10_000,
            detail_timeout_ms: 8_000,
            refresh_existing: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.boards.len(), 3);
        config.validate().unwrap();
    }

    #[test]
    fn test_invalid_selector_is_rejected() {
        let mut board = presets::viviens_women();
        board.selectors.image.selector = "div[[".to_string();
        let err = board.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSelector { ref field, .. } if field == "image"));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut board = presets::viviens_women();
        board.stabilization.max_stall_retries = 0;
        assert!(board.validate().is_err());

        let mut board = presets::viviens_women();
        board.base_url = "not a url".to_string();
        assert!(matches!(board.validate(), Err(ConfigError::InvalidBaseUrl { .. })));

        let mut board = presets::viviens_women();
        board.selectors.measurement.value = None;
        assert!(board.validate().is_err());

        let mut board = presets::viviens_women();
        board.measurement_labels.push(MeasurementLabel::new("Height"));
        assert!(board.validate().is_err());
    }

    #[test]
    fn test_duplicate_board_keys() {
        let mut config = AppConfig::default();
        config.boards.push(presets::viviens_women());
        assert_eq!(
            config.validate(),
            Err(ConfigError::DuplicateBoard("viviens-sydney-mainboard".to_string()))
        );
    }

    #[test]
    fn test_minimal_board_json_uses_defaults() {
        let json = serde_json::json!({
            "key": "demo",
            "agency": "Demo",
            "gender": "female",
            "base_url": "https://demo.test/women/",
            "selectors": {
                "listing_item": "div.card",
                "profile_link": "a",
                "detail_marker": "main",
                "image": { "selector": "main img" },
                "measurement": { "entry": "ul.stats li" }
            }
        });
        let board: BoardConfig = serde_json::from_value(json).unwrap();
        board.validate().unwrap();
        assert_eq!(board.stabilization.max_stall_retries, 10);
        assert_eq!(board.measurement_labels.len(), 8);
        assert_eq!(board.selectors.listing_marker(), "div.card");
        assert!(board.selectors.image.style_fallback);
    }

    #[tokio::test]
    async fn test_config_round_trip_through_file() -> Result<()> {
        let dir = tempdir()?;
        let manager = ConfigManager::with_path(dir.path().join("nested/config.json"));

        let created = manager.load_config().await?;
        assert!(manager.config_path().exists());

        let loaded = manager.load_config().await?;
        assert_eq!(loaded.boards.len(), created.boards.len());
        assert_eq!(loaded.database_url, created.database_url);
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_file_fails_on_load() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.json");
        let mut config = AppConfig::default();
        config.boards[0].selectors.listing_item = ":::".to_string();
        std::fs::write(&path, serde_json::to_string(&config)?)?;

        let manager = ConfigManager::with_path(&path);
        assert!(manager.load_config().await.is_err());
        Ok(())
    }
}
