//! School Ledger - API Server Binary
//!
//! Starts the HTTP API server for the school billing ledger.
//!
//! # Usage
//!
//! ```bash
//! # Run with default configuration
//! cargo run --bin school-ledger-api
//!
//! # Run against an in-memory ledger
//! API_STORAGE=memory cargo run --bin school-ledger-api
//! ```
//!
//! # Environment Variables
//!
//! * `API_HOST` - Server host (default: 0.0.0.0)
//! * `API_PORT` - Server port (default: 8080)
//! * `API_JWT_SECRET` - JWT signing secret (required in production)
//! * `API_JWT_EXPIRATION_SECS` - JWT token expiration in seconds (default: 3600)
//! * `API_DATABASE_URL` - PostgreSQL connection string
//! * `API_LOG_LEVEL` - Log level: trace, debug, info, warn, error (default: info)
//! * `API_CURRENCY` - Default report currency (default: KES)
//! * `API_STORAGE` - `postgres` or `memory` (default: postgres)

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use domain_billing::memory::InMemoryLedger;
use domain_billing::LedgerPort;
use infra_db::{create_pool, run_migrations, DatabaseConfig, PostgresLedger};
use interface_api::config::{ApiConfig, StorageBackend};
use interface_api::create_router;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (useful for local development)
    dotenvy::dotenv().ok();

    let config = ApiConfig::from_env().context("invalid API_* configuration")?;

    init_tracing(&config.log_level);

    tracing::info!(
        host = %config.host,
        port = %config.port,
        storage = ?config.storage,
        "Starting school ledger API server"
    );

    let ledger = open_ledger(&config).await?;

    let app = create_router(ledger, config.clone()).context("invalid API_CURRENCY")?;

    let addr: SocketAddr = config.server_addr().parse()?;

    tracing::info!(%addr, "Server listening");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Initializes the tracing subscriber for structured logging.
fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Connects the configured ledger store, applying migrations for PostgreSQL
async fn open_ledger(config: &ApiConfig) -> anyhow::Result<Arc<dyn LedgerPort>> {
    match config.storage {
        StorageBackend::Postgres => {
            tracing::info!("Connecting to database...");
            let pool = create_pool(DatabaseConfig::new(&config.database_url))
                .await
                .context("failed to connect to PostgreSQL")?;

            tracing::info!("Running database migrations...");
            run_migrations(&pool).await.context("failed to apply migrations")?;

            tracing::info!("Database ready");
            Ok(Arc::new(PostgresLedger::new(pool)))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using the in-memory ledger; data is lost on shutdown");
            Ok(Arc::new(InMemoryLedger::new()))
        }
    }
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
