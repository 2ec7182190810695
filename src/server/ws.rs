//! Dashboard WebSocket endpoint.
//!
//! Clients connect with a `userUid` query parameter. The session registers a
//! bus subscriber, binds it to the workspace the user is enrolled in (a
//! `userUid` unknown to every workspace stays unbound and receives no
//! events), then forwards serialized events from the bus to the socket.
//!
//! Liveness: the server pings on a fixed cadence; a client that has not
//! answered the previous ping by the time the next one is due is terminated
//! and removed from the bus.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::AppState;
use crate::store::members;
use crate::types::WorkspaceId;

/// Cadence of liveness probes.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Query parameters of the socket endpoint.
#[derive(Debug, Deserialize)]
pub struct WsParams {
    #[serde(rename = "userUid")]
    pub user_uid: String,
}

/// WebSocket upgrade handler for `GET /ws?userUid=...`.
pub async fn ws_handler(
    State(app_state): State<AppState>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| run_session(app_state, params.user_uid, socket))
}

/// Finds the workspace the user is enrolled in, if any. Storage errors are
/// logged and treated as "not enrolled".
fn lookup_workspace(app_state: &AppState, user_uid: &str) -> Option<WorkspaceId> {
    let conn = match app_state.db().conn() {
        Ok(conn) => conn,
        Err(e) => {
            warn!(user_uid = %user_uid, error = %e, "Workspace lookup failed");
            return None;
        }
    };
    match members::workspace_for_user(&conn, user_uid) {
        Ok(workspace) => workspace,
        Err(e) => {
            warn!(user_uid = %user_uid, error = %e, "Workspace lookup failed");
            None
        }
    }
}

async fn run_session(app_state: AppState, user_uid: String, socket: WebSocket) {
    let bus = Arc::clone(app_state.bus());
    let mut subscription = bus.register().await;

    match lookup_workspace(&app_state, &user_uid) {
        Some(workspace) => {
            bus.bind(subscription.id, &workspace).await;
            debug!(
                subscriber = %subscription.id,
                user_uid = %user_uid,
                workspace = %workspace,
                "Dashboard session bound"
            );
        }
        None => {
            debug!(
                subscriber = %subscription.id,
                user_uid = %user_uid,
                "Dashboard session left unbound"
            );
        }
    }

    let (mut sender, mut receiver) = socket.split();
    let mut ping_timer = tokio::time::interval(PING_INTERVAL);
    ping_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; consume it so the first real
    // probe fires one full interval after connect.
    ping_timer.tick().await;
    let mut awaiting_pong = false;

    loop {
        tokio::select! {
            event = subscription.receiver.recv() => {
                let Some(json) = event else { break };
                if sender.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Pong(_))) => awaiting_pong = false,
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sender.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    // Client chatter carries no meaning on this channel.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(subscriber = %subscription.id, error = %e, "Socket error");
                        break;
                    }
                }
            }
            _ = ping_timer.tick() => {
                if awaiting_pong {
                    debug!(subscriber = %subscription.id, "Missed pong; terminating session");
                    break;
                }
                if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
                awaiting_pong = true;
            }
        }
    }

    bus.unregister(subscription.id).await;
    debug!(subscriber = %subscription.id, "Dashboard session closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::build_router;
    use crate::server::test_support::test_app_state;
    use crate::store::workspaces::{self, NewWorkspace};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::Utc;
    use tower::ServiceExt;

    #[tokio::test]
    async fn missing_user_uid_is_rejected() {
        let app = build_router(test_app_state(b"secret"));
        let response = app
            .oneshot(Request::builder().uri("/ws").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn plain_get_without_upgrade_is_rejected() {
        let app = build_router(test_app_state(b"secret"));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/ws?userUid=u1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        // Not a websocket handshake; the upgrade extractor refuses it.
        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn enrolled_user_resolves_to_their_workspace() {
        let state = test_app_state(b"secret");
        {
            let conn = state.db().conn().unwrap();
            workspaces::create(&conn, &NewWorkspace::new("ws", 1, "o/r", "k"), Utc::now()).unwrap();
            members::add(&conn, &WorkspaceId::new("ws"), "u1", "alice").unwrap();
        }

        assert_eq!(
            lookup_workspace(&state, "u1"),
            Some(WorkspaceId::new("ws"))
        );
        assert_eq!(lookup_workspace(&state, "stranger"), None);
    }
}
