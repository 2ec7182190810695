//! HTTP server for the push-intelligence pipeline.
//!
//! This module implements the HTTP surface that:
//! - Accepts push webhooks, verifies signatures, applies file activity
//!   transactionally, and acknowledges before engines run
//! - Serves the dashboard WebSocket that live events fan out over
//! - Provides a workspace state endpoint for observability
//! - Provides a health check for liveness probes
//!
//! # Endpoints
//!
//! - `POST /webhook/github` - Push webhook ingestion (returns 200 with a status)
//! - `GET /ws?userUid=...` - Dashboard event stream
//! - `GET /api/v1/workspaces/{id}/state` - Workspace snapshot as JSON
//! - `GET /health` - Returns 200 if the server is running

use std::sync::Arc;

pub mod health;
pub mod state;
pub mod webhook;
pub mod ws;

pub use health::health_handler;
pub use state::state_handler;
pub use webhook::webhook_handler;
pub use ws::ws_handler;

use crate::bus::EventBus;
use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::engine::{ConflictEngine, FeatureEngine};
use crate::ratelimit::SlidingWindow;
use crate::store::Database;

/// Shared application state, passed to all handlers via Axum's `State`
/// extractor. Cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Shared database handle.
    db: Database,

    /// Dashboard fan-out hub.
    bus: Arc<EventBus>,

    /// Post-ACK dispatch into per-workspace engine workers.
    dispatcher: Arc<Dispatcher>,

    /// Webhook secret for HMAC-SHA256 signature verification. Empty means
    /// dev mode: verification is skipped and the source limiter applies.
    webhook_secret: Vec<u8>,

    /// Source-address limiter for unverified webhook traffic.
    webhook_limiter: SlidingWindow,
}

impl AppState {
    /// Wires the engines, dispatcher, and bus over the given database.
    pub fn new(db: Database, config: &Config) -> Self {
        let bus = Arc::new(EventBus::new());
        let conflict = ConflictEngine::new(db.clone(), Arc::clone(&bus));
        let feature = FeatureEngine::new(db.clone(), Arc::clone(&bus));
        let dispatcher = Arc::new(Dispatcher::new(conflict, feature));

        AppState {
            inner: Arc::new(AppStateInner {
                db,
                bus,
                dispatcher,
                webhook_secret: config.webhook_secret.clone(),
                webhook_limiter: SlidingWindow::new(
                    config.webhook_rate_window,
                    config.webhook_rate_max,
                ),
            }),
        }
    }

    pub fn db(&self) -> &Database {
        &self.inner.db
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.inner.bus
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.inner.dispatcher
    }

    pub fn webhook_secret(&self) -> &[u8] {
        &self.inner.webhook_secret
    }

    pub fn webhook_limiter(&self) -> &SlidingWindow {
        &self.inner.webhook_limiter
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router(app_state: AppState) -> axum::Router {
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/webhook/github", post(webhook_handler))
        .route("/ws", get(ws_handler))
        .route("/api/v1/workspaces/{id}/state", get(state_handler))
        .route("/health", get(health_handler))
        .with_state(app_state)
}
