//! roster-sync command-line runner
//!
//! Results are printed to stdout as JSON; logs go to stderr and the log file.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use roster_sync_lib::application::{CatalogSyncEngine, KeyMigration};
use roster_sync_lib::domain::{CatalogStore, Gender};
use roster_sync_lib::infrastructure::{
    AppConfig, ConfigManager, DatabaseConnection, HtmlListingSource, HttpClient,
    InMemoryCatalogStore, SqliteCatalogStore, init_logging_with_config,
};

#[derive(Parser)]
#[command(name = "roster-sync")]
#[command(about = "Keeps a model-agency roster catalog in sync with live agency boards")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Synchronize every configured board, or the selected ones
    Sync {
        /// Board key; repeat to select several
        #[arg(long = "board")]
        boards: Vec<String>,

        /// Re-extract entries that already exist
        #[arg(long)]
        refresh: bool,

        /// Run against an in-memory copy of the catalog
        #[arg(long)]
        dry_run: bool,
    },

    /// List configured boards
    Boards,

    /// Show recent run reports
    Logs {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },

    /// Re-key a board's stored entries under its identifier policy
    MigrateKeys {
        #[arg(long)]
        board: String,

        #[arg(long)]
        dry_run: bool,
    },

    /// Write the default configuration file
    InitConfig,
}

#[derive(Serialize)]
struct BoardInfo<'a> {
    key: &'a str,
    agency: &'a str,
    gender: Gender,
    base_url: &'a str,
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to serialize output")?
    );
    Ok(())
}

async fn open_store(config: &AppConfig) -> Result<Arc<SqliteCatalogStore>> {
    let db = DatabaseConnection::new(&config.database_url)
        .await
        .with_context(|| format!("Failed to open catalog database {}", config.database_url))?;
    db.migrate().await.context("Failed to migrate catalog database")?;
    Ok(Arc::new(SqliteCatalogStore::new(db.pool().clone())))
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current step");
            child.cancel();
        }
    });
    token
}

async fn sync(config: &AppConfig, boards: &[String], refresh: bool, dry_run: bool) -> Result<bool> {
    let selected = if boards.is_empty() {
        config.boards.iter().collect::<Vec<_>>()
    } else {
        boards
            .iter()
            .map(|key| config.board(key))
            .collect::<Result<Vec<_>, _>>()?
    };

    let catalog = open_store(config).await?;
    let client = Arc::new(HttpClient::new(&config.http)?);
    let cancel = cancel_on_ctrl_c();
    let mut all_succeeded = true;

    // One board at a time; each run owns its listing source
    for board in selected {
        let mut board = board.clone();
        board.refresh_existing |= refresh;

        let store: Arc<dyn CatalogStore> = if dry_run {
            let records = catalog.list_records(&board.key).await?;
            info!("Dry run for {}: {} stored entries copied", board.key, records.len());
            Arc::new(InMemoryCatalogStore::seeded(records))
        } else {
            catalog.clone()
        };

        let mut source = HtmlListingSource::new(client.clone(), &board);
        let engine = CatalogSyncEngine::new(store, board);
        let result = engine.run(&mut source, &cancel).await;
        all_succeeded &= result.success;
        print_json(&result)?;

        if cancel.is_cancelled() {
            break;
        }
    }

    Ok(all_succeeded)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let manager = match &cli.config {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new()?,
    };

    if matches!(cli.command, Commands::InitConfig) {
        manager.save_config(&AppConfig::default()).await?;
        println!("{}", manager.config_path().display());
        return Ok(ExitCode::SUCCESS);
    }

    let config = manager.load_config().await?;
    init_logging_with_config(&config.logging)?;

    match cli.command {
        Commands::Sync {
            boards,
            refresh,
            dry_run,
        } => {
            if !sync(&config, &boards, refresh, dry_run).await? {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Boards => {
            let boards: Vec<BoardInfo<'_>> = config
                .boards
                .iter()
                .map(|b| BoardInfo {
                    key: &b.key,
                    agency: &b.agency,
                    gender: b.gender,
                    base_url: &b.base_url,
                })
                .collect();
            print_json(&boards)?;
        }
        Commands::Logs { limit } => {
            let store = open_store(&config).await?;
            print_json(&store.recent_logs(limit).await?)?;
        }
        Commands::MigrateKeys { board, dry_run } => {
            let board = config.board(&board)?.clone();
            let store = open_store(&config).await?;
            let report = KeyMigration::new(store, board).run(dry_run).await?;
            print_json(&report)?;
        }
        Commands::InitConfig => {}
    }

    Ok(ExitCode::SUCCESS)
}
