//! Runtime configuration.
//!
//! Loaded from environment variables with defaults suitable for local
//! development. Every recognized option is a field here; nothing else is
//! consulted at runtime.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::types::DEFAULT_ACTIVITY_WINDOW_HOURS;

/// Configuration for the pipeline server.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address to bind the HTTP server to.
    pub listen_addr: SocketAddr,

    /// Path of the SQLite database file.
    pub database_path: PathBuf,

    /// Secret for verifying webhook signatures. Empty disables verification
    /// (dev mode) and puts the webhook endpoint behind the source limiter.
    pub webhook_secret: Vec<u8>,

    /// Activity window applied to workspaces created without one.
    pub activity_window_hours: i64,

    /// Alignment analyzer endpoint URL.
    pub alignment_endpoint: String,

    /// Alignment analyzer model name.
    pub alignment_model: String,

    /// Hard deadline for one alignment call.
    pub alignment_timeout: Duration,

    /// Retries after a transient alignment failure.
    pub alignment_max_retries: u32,

    /// Pause before the alignment retry.
    pub alignment_retry_delay: Duration,

    /// Alignment quota window per workspace.
    pub alignment_rate_window: Duration,

    /// Alignment calls allowed per workspace per window.
    pub alignment_rate_max: usize,

    /// Webhook source-address quota window (dev mode only).
    pub webhook_rate_window: Duration,

    /// Unverified webhook requests allowed per source per window.
    pub webhook_rate_max: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            database_path: PathBuf::from("./data/pulse.db"),
            webhook_secret: Vec::new(),
            activity_window_hours: DEFAULT_ACTIVITY_WINDOW_HOURS,
            alignment_endpoint: "http://localhost:11434/api/generate".to_string(),
            alignment_model: "alignment-check".to_string(),
            alignment_timeout: Duration::from_secs(15),
            alignment_max_retries: 1,
            alignment_retry_delay: Duration::from_millis(1500),
            alignment_rate_window: Duration::from_secs(60),
            alignment_rate_max: 10,
            webhook_rate_window: Duration::from_secs(60),
            webhook_rate_max: 60,
        }
    }
}

impl Config {
    /// Loads configuration from environment variables, falling back to the
    /// defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Config::default();

        let webhook_secret = std::env::var("WEBHOOK_SECRET")
            .map(String::into_bytes)
            .unwrap_or_else(|_| {
                tracing::warn!(
                    "WEBHOOK_SECRET not set; signature verification disabled (development only)"
                );
                Vec::new()
            });

        Config {
            listen_addr: env_parsed("LISTEN_ADDR", defaults.listen_addr),
            database_path: std::env::var("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),
            webhook_secret,
            activity_window_hours: env_parsed(
                "ACTIVITY_WINDOW_HOURS",
                defaults.activity_window_hours,
            ),
            alignment_endpoint: std::env::var("ALIGNMENT_ENDPOINT")
                .unwrap_or(defaults.alignment_endpoint),
            alignment_model: std::env::var("ALIGNMENT_MODEL").unwrap_or(defaults.alignment_model),
            alignment_timeout: Duration::from_secs(env_parsed("ALIGNMENT_TIMEOUT_SECS", 15)),
            alignment_max_retries: env_parsed("ALIGNMENT_MAX_RETRIES", 1),
            alignment_retry_delay: Duration::from_millis(env_parsed(
                "ALIGNMENT_RETRY_DELAY_MS",
                1500,
            )),
            alignment_rate_window: Duration::from_secs(env_parsed(
                "ALIGNMENT_RATE_WINDOW_SECS",
                60,
            )),
            alignment_rate_max: env_parsed("ALIGNMENT_RATE_MAX", 10),
            webhook_rate_window: Duration::from_secs(env_parsed("WEBHOOK_RATE_WINDOW_SECS", 60)),
            webhook_rate_max: env_parsed("WEBHOOK_RATE_MAX", 60),
        }
    }
}

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
