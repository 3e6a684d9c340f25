// Stockroom - Web Server
// REST API with Axum over the SQLite-backed ledger

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use stockroom::api::{router, AppState};
use stockroom::{Config, OutcomeLookup};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{fmt, EnvFilter};

/// Stockroom Server
#[derive(Parser, Debug)]
#[command(name = "stockroom-server")]
#[command(about = "HTTP API for the stock ledger")]
#[command(version)]
struct Args {
    /// SQLite database file
    #[arg(long, env = "STOCKROOM_DB", default_value = "./stockroom.db")]
    db: PathBuf,

    /// Listen address (host:port)
    #[arg(short, long, env = "STOCKROOM_LISTEN", default_value = "127.0.0.1:8080")]
    listen: String,

    /// Outcome lookup policy: attributes | exact
    #[arg(long, env = "STOCKROOM_OUTCOME_LOOKUP", default_value = "attributes")]
    outcome_lookup: String,
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,stockroom=debug,tower_http=info"));

    fmt().with_env_filter(filter).with_target(true).init();

    let args = Args::parse();
    let outcome_lookup: OutcomeLookup = args.outcome_lookup.parse()?;

    let config = Config::builder()
        .database_path(&args.db)
        .listen_addr(&args.listen)
        .outcome_lookup(outcome_lookup)
        .build();

    tracing::info!("🌐 Stockroom Server v{}", stockroom::VERSION);
    tracing::info!("Database: {}", config.database_path.display());
    tracing::info!("Outcome lookup: {}", config.outcome_lookup);

    let ledger = config
        .open_ledger()
        .with_context(|| format!("Failed to open database {}", config.database_path.display()))?;

    let app = router(AppState::new(ledger))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;

    tracing::info!("✓ Listening on http://{}", config.listen_addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
