// crates/server/src/main.rs
//! Tokenlens binary.
//!
//! `serve` runs the HTTP API; `ingest`, `sync-metadata` and `aggregate`
//! are the batch entry points that bootstrap and refresh the analytical
//! database.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tokenlens_core::llm::{create_provider, LlmConfig};
use tokenlens_core::Granularity;
use tokenlens_db::Database;
use tokenlens_server::{create_app, AppState, ServerConfig};
use tracing_subscriber::EnvFilter;

/// Default port for the server.
const DEFAULT_PORT: u16 = 47921;

#[derive(Parser)]
#[command(
    name = "tokenlens",
    version,
    about = "LLM gateway usage analytics with a conversational query interface"
)]
struct Cli {
    /// Database file (defaults to the per-user data directory).
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP API server.
    Serve {
        /// Port to bind; falls back to TOKENLENS_PORT / PORT.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Ingest a bulk usage-log JSON export into the raw log.
    Ingest {
        /// Path to the JSON document (array of records or day-keyed map).
        file: PathBuf,
    },
    /// Apply a channel/token/user metadata sync document.
    SyncMetadata {
        /// Path to the JSON document with channel/token/user sections.
        file: PathBuf,
    },
    /// Recompute rollups over a trailing window.
    Aggregate {
        /// hour, day, or week; all three when omitted.
        #[arg(long)]
        granularity: Option<String>,
        /// Days of raw data to re-aggregate, ending now.
        #[arg(long, default_value_t = 1)]
        last_days: i64,
    },
}

fn get_port(flag: Option<u16>) -> u16 {
    flag.or_else(|| {
        std::env::var("TOKENLENS_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
    })
    .or_else(|| std::env::var("PORT").ok().and_then(|p| p.parse().ok()))
    .unwrap_or(DEFAULT_PORT)
}

async fn open_db(path: &Option<PathBuf>) -> Result<Database> {
    Ok(match path {
        Some(path) => Database::new(path).await?,
        None => Database::open_default().await?,
    })
}

fn read_json(path: &Path) -> Result<serde_json::Value> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("  {spinner} {msg}")
            .expect("valid spinner template"),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tokenlens=info,warn")),
        )
        .compact()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { port } => serve(cli.db, get_port(port)).await,
        Command::Ingest { file } => ingest(cli.db, &file).await,
        Command::SyncMetadata { file } => sync_metadata(cli.db, &file).await,
        Command::Aggregate {
            granularity,
            last_days,
        } => aggregate(cli.db, granularity, last_days).await,
    }
}

async fn serve(db_path: Option<PathBuf>, port: u16) -> Result<()> {
    eprintln!("\n\u{1f4ca} tokenlens v{}\n", env!("CARGO_PKG_VERSION"));
    let startup = Instant::now();

    let db = open_db(&db_path).await?;

    let llm_config = LlmConfig::from_env();
    let provider =
        create_provider(&llm_config).map_err(|e| anyhow::anyhow!("completion provider: {e}"))?;
    if let Err(e) = provider.health_check().await {
        tracing::warn!(
            error = %e,
            "completion provider not ready; chat requests will fail until it is configured"
        );
    }

    let state = AppState::new(db, provider, ServerConfig::default());
    let app = create_app(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    eprintln!(
        "  \u{2713} Ready in {}ms",
        startup.elapsed().as_millis()
    );
    eprintln!("  \u{2192} http://localhost:{port}\n");

    axum::serve(listener, app).await?;
    Ok(())
}

async fn ingest(db_path: Option<PathBuf>, file: &Path) -> Result<()> {
    let db = open_db(&db_path).await?;
    let doc = read_json(file)?;

    let pb = spinner(&format!("Ingesting {}...", file.display()));
    let start = Instant::now();
    let report = db.ingest_usage(&doc).await?;
    pb.finish_and_clear();

    eprintln!(
        "  \u{2713} Ingested {} records ({} skipped) in {}ms",
        report.inserted,
        report.skipped,
        start.elapsed().as_millis()
    );
    Ok(())
}

async fn sync_metadata(db_path: Option<PathBuf>, file: &Path) -> Result<()> {
    let db = open_db(&db_path).await?;
    let doc = read_json(file)?;

    let report = db.sync_metadata(&doc).await?;
    eprintln!(
        "  \u{2713} Synced {} channels, {} tokens, {} users",
        report.channels, report.tokens, report.users
    );
    Ok(())
}

async fn aggregate(
    db_path: Option<PathBuf>,
    granularity: Option<String>,
    last_days: i64,
) -> Result<()> {
    let db = open_db(&db_path).await?;

    let end = chrono::Utc::now().timestamp();
    let start = end - last_days.max(1) * 86_400;

    let pb = spinner("Aggregating...");
    let reports = match granularity {
        Some(raw) => {
            let granularity: Granularity = raw.parse().map_err(|e| anyhow::anyhow!("{e}"))?;
            vec![db.aggregate_range(start, end, granularity).await?]
        }
        None => db.aggregate_all(start, end).await?,
    };
    pb.finish_and_clear();

    for report in &reports {
        eprintln!(
            "  \u{2713} {}: {} model buckets, {} channel buckets",
            report.granularity, report.model_buckets, report.channel_buckets
        );
    }
    Ok(())
}
