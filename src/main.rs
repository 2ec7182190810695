//! repo-pulse - Main entry point.
//!
//! This binary runs the HTTP server that accepts push webhooks, drives the
//! conflict/feature/health engines, and serves the dashboard event stream.

use repo_pulse::config::Config;
use repo_pulse::server::{AppState, build_router};
use repo_pulse::store::Database;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "repo_pulse=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    if let Some(parent) = config.database_path.parent()
        && let Err(e) = std::fs::create_dir_all(parent)
    {
        tracing::error!(error = %e, "Failed to create database directory");
        std::process::exit(1);
    }

    let db = match Database::open(&config.database_path) {
        Ok(db) => db,
        Err(e) => {
            tracing::error!(error = %e, "Failed to open database");
            std::process::exit(1);
        }
    };

    tracing::info!(
        database = %config.database_path.display(),
        "Starting repo-pulse"
    );

    let app_state = AppState::new(db, &config);
    let app = build_router(app_state);

    tracing::info!("Listening on {}", config.listen_addr);

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .await
        .expect("Server failed to start");
}
