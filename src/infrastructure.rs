//! Infrastructure layer for configuration, logging, HTTP, HTML and storage
//!
//! Implements the collaborator traits of the domain: an HTML listing source
//! over a rate-limited HTTP client, and SQLite / in-memory catalog stores.

pub mod config;
pub mod database_connection;
pub mod html_listing_source;
pub mod http_client;
pub mod logging;
pub mod memory_catalog_store;
pub mod sqlite_catalog_store;

// Re-export commonly used items
pub use config::{AppConfig, BoardConfig, ConfigError, ConfigManager};
pub use database_connection::DatabaseConnection;
pub use html_listing_source::{HtmlDocument, HtmlListingSource};
pub use http_client::{HttpClient, HttpClientConfig};
pub use logging::{get_log_directory, init_logging, init_logging_with_config};
pub use memory_catalog_store::{InMemoryCatalogStore, StoreCall};
pub use sqlite_catalog_store::SqliteCatalogStore;
