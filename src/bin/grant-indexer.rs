//! Grant Indexer CLI: import registry organizations and grants.
//!
//! Usage:
//!   grant-indexer --query "food bank" [--max-pages 5] [--db path]
//!   grant-indexer --eins 131624100,042103580 [--db path]
//!   grant-indexer --source file --input batches.json [--db path]

use clap::{Parser, ValueEnum};
use grant_indexer::{
    CancellationToken, Connector, ConnectorConfig, HttpClient, IndexerConfig, LoadStats, Loader,
    ProPublicaConnector, ReplayConnector, SqliteStore,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const RETRY_BACKOFF: Duration = Duration::from_millis(500);

#[derive(Parser)]
#[command(
    name = "grant-indexer",
    version,
    about = "Import nonprofit registry data without duplicating organizations"
)]
struct Cli {
    /// Data source to import from
    #[arg(long, value_enum, default_value_t = Source::Propublica)]
    source: Source,
    /// Free-text search query
    #[arg(long)]
    query: Option<String>,
    /// Comma-separated EINs to fetch (takes precedence over --query)
    #[arg(long, value_delimiter = ',')]
    eins: Vec<String>,
    /// Maximum number of search result pages
    #[arg(long, default_value_t = 5)]
    max_pages: usize,
    /// JSON file of record batches (with --source file)
    #[arg(long)]
    input: Option<PathBuf>,
    /// Path to SQLite database file
    #[arg(long)]
    db: Option<PathBuf>,
    /// Path to YAML config file
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Source {
    /// ProPublica Nonprofit Explorer
    Propublica,
    /// Batches replayed from a JSON file
    File,
}

fn build_connector(cli: &Cli, config: &IndexerConfig) -> Result<Box<dyn Connector>, String> {
    match cli.source {
        Source::Propublica => {
            let client = HttpClient::new(&config.api_base, config.request_timeout(), &config.user_agent)
                .map_err(|e| format!("Failed to create HTTP client: {}", e))?;
            let selection = ConnectorConfig {
                query: cli.query.clone(),
                identifiers: cli.eins.clone(),
                max_pages: cli.max_pages,
            };
            Ok(Box::new(
                ProPublicaConnector::new(Arc::new(client), selection)
                    .with_retries(config.max_retries, RETRY_BACKOFF),
            ))
        }
        Source::File => {
            let path = cli
                .input
                .as_ref()
                .ok_or_else(|| "--input is required with --source file".to_string())?;
            let connector = ReplayConnector::from_json_file(path).map_err(|e| e.to_string())?;
            Ok(Box::new(connector))
        }
    }
}

fn print_stats(stats: &LoadStats) {
    match serde_json::to_string(stats) {
        Ok(json) => println!("{}", json),
        Err(_) => println!("{}", stats),
    }
}

async fn run(cli: Cli) -> i32 {
    let mut config = match IndexerConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    if let Some(db) = &cli.db {
        config.database_path = db.clone();
    }

    let store = match SqliteStore::open_with_timeout(&config.database_path, config.store_timeout()) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            eprintln!("Error: failed to open database {}: {}", config.database_path.display(), e);
            return 1;
        }
    };

    let connector = match build_connector(&cli, &config) {
        Ok(connector) => connector,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    tracing::info!(
        source = connector.source_id(),
        db = %config.database_path.display(),
        "starting import"
    );

    let token = CancellationToken::new();
    token.cancel_on_ctrl_c();

    let mut stream = connector.fetch();
    let loader = Loader::new(store).with_cancellation(token);
    match loader.load(stream.as_mut()).await {
        Ok(stats) => {
            tracing::info!(%stats, "import complete");
            print_stats(&stats);
            0
        }
        Err(failure) => {
            eprintln!("Error: {}", failure.error);
            print_stats(&failure.stats);
            1
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let code = run(cli).await;
    std::process::exit(code);
}
