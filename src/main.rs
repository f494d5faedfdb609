//! worker-loan-ledger server entry point.
//!
//! Starts the Axum HTTP server with REST and WebSocket endpoints.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

use worker_loan_ledger::app_state::AppState;
use worker_loan_ledger::build_app;
use worker_loan_ledger::config::{LedgerConfig, LogFormat, StorageBackend};
use worker_loan_ledger::domain::EventBus;
use worker_loan_ledger::persistence::memory::MemoryWorkerDirectory;
use worker_loan_ledger::service::LedgerContext;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = LedgerConfig::from_env()?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    tracing::info!(addr = %config.listen_addr, backend = ?config.storage_backend, "starting worker-loan-ledger");

    let event_bus = EventBus::new(config.event_bus_capacity);

    let ctx = match config.storage_backend {
        StorageBackend::Memory => {
            let directory = match &config.workers_file {
                Some(path) => {
                    let json = tokio::fs::read_to_string(path)
                        .await
                        .with_context(|| format!("reading WORKERS_FILE {path}"))?;
                    MemoryWorkerDirectory::from_json(&json)?
                }
                None => MemoryWorkerDirectory::new(),
            };
            LedgerContext::in_memory(Arc::new(directory), event_bus)
        }
        StorageBackend::Postgres => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .min_connections(config.database_min_connections)
                .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
                .connect(&config.database_url)
                .await
                .context("connecting to PostgreSQL")?;
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .context("running migrations")?;
            tracing::info!("database migrations applied");
            LedgerContext::postgres(pool, event_bus)
        }
    };

    let app_state = AppState::new(ctx, config.payment_settings());
    let app = build_app(app_state, config.request_timeout());

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app).await?;

    Ok(())
}
