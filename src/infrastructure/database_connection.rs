// Database connection and pool management
// SQLite catalog via sqlx; in-memory URLs get a single shared connection

use anyhow::Result;
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use std::path::Path;

pub struct DatabaseConnection {
    pool: SqlitePool,
}

fn is_memory_url(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

impl DatabaseConnection {
    pub async fn new(database_url: &str) -> Result<Self> {
        if is_memory_url(database_url) {
            // Every pooled connection would otherwise get its own empty database
            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .connect(database_url)
                .await?;
            return Ok(Self { pool });
        }

        let db_path = database_url
            .strip_prefix("sqlite://")
            .or_else(|| database_url.strip_prefix("sqlite:"))
            .unwrap_or(database_url);
        let db_path = db_path.split('?').next().unwrap_or(db_path);

        if let Some(parent) = Path::new(db_path).parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        if !Path::new(db_path).exists() {
            tokio::fs::File::create(db_path).await?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        let create_entries_sql = r"
            CREATE TABLE IF NOT EXISTS roster_entries (
                board TEXT NOT NULL,
                identifier TEXT NOT NULL,
                name TEXT NOT NULL,
                profile_url TEXT NOT NULL,
                payload TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (board, identifier)
            )
        ";

        let create_logs_sql = r"
            CREATE TABLE IF NOT EXISTS scrape_logs (
                run_id TEXT PRIMARY KEY,
                board TEXT NOT NULL,
                started_at TEXT NOT NULL,
                finished_at TEXT NOT NULL,
                added INTEGER NOT NULL,
                skipped INTEGER NOT NULL,
                refreshed INTEGER NOT NULL,
                removed INTEGER NOT NULL,
                failed INTEGER NOT NULL,
                success INTEGER NOT NULL,
                error TEXT,
                phase TEXT NOT NULL
            )
        ";

        let create_indexes_sql = r"
            CREATE INDEX IF NOT EXISTS idx_scrape_logs_finished_at ON scrape_logs (finished_at);
            CREATE INDEX IF NOT EXISTS idx_scrape_logs_board ON scrape_logs (board);
        ";

        sqlx::query(create_entries_sql).execute(&self.pool).await?;
        sqlx::query(create_logs_sql).execute(&self.pool).await?;
        sqlx::raw_sql(create_indexes_sql).execute(&self.pool).await?;

        Ok(())
    }
}
