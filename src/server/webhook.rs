//! Webhook endpoint handler.
//!
//! Implements the synchronous ingestion protocol: header gate, event filter,
//! signature verification, payload validation, idempotency insert, workspace
//! resolution, push classification, and the file-activity upsert, all inside
//! one transaction. Then the 200 acknowledgement, and only after that the
//! asynchronous hand-off to the engine workers.
//!
//! The acknowledgement is sacrosanct: once the transaction commits and the
//! 200 goes out, nothing an engine does can change the response, and engine
//! failures are logged, never surfaced.

use std::time::Instant;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::AppState;
use crate::dispatch::EngineJob;
use crate::store::{StoreError, activity, deliveries, members, workspaces};
use crate::types::{DeliveryId, WorkspaceId};
use crate::webhooks::payload::{PayloadError, PushEvent, PushKind, parse_push};
use crate::webhooks::verify_signature;

/// Header carrying the event type.
const HEADER_EVENT: &str = "x-github-event";
/// Header carrying the delivery ID.
const HEADER_DELIVERY: &str = "x-github-delivery";
/// Header carrying the HMAC-SHA256 signature.
const HEADER_SIGNATURE: &str = "x-hub-signature-256";
/// Source-address header consulted by the dev-mode rate limiter.
const HEADER_FORWARDED_FOR: &str = "x-forwarded-for";

/// Errors that reject a webhook delivery.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Missing required header.
    #[error("missing required header: {0}")]
    MissingHeader(&'static str),

    /// Signature missing or not matching the body.
    #[error("invalid signature")]
    InvalidSignature,

    /// Unverified source over quota.
    #[error("rate limit exceeded")]
    RateLimited,

    /// Body is not valid JSON.
    #[error("invalid JSON body: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// Body is JSON but required push fields are absent.
    #[error("{0}")]
    InvalidPayload(#[from] PayloadError),

    /// Storage failure during the synchronous phase.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebhookError::MissingHeader(_)
            | WebhookError::InvalidJson(_)
            | WebhookError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            WebhookError::InvalidSignature => StatusCode::UNAUTHORIZED,
            WebhookError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            WebhookError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = match &self {
            WebhookError::InvalidPayload(e) => json!({
                "error": "invalid payload",
                "fields": e.missing,
            }),
            other => json!({ "error": other.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}

/// What the transactional phase decided about a push.
enum PushOutcome {
    /// Delivery id already logged; nothing was touched.
    Duplicate,
    /// No workspace is onboarded for the repository.
    WorkspaceNotFound,
    /// The ref is not a branch (tag push and the like).
    IgnoredRef,
    /// `after` was the zero id; the branch's activity rows were wiped.
    BranchDeleted,
    /// File activity is durable; the engines should run.
    Processed {
        workspace: WorkspaceId,
        branch: String,
        files: Vec<String>,
    },
}

/// Webhook handler.
///
/// # Response
///
/// - 200 with `{"status": ...}`: processing, duplicate, ignored,
///   branch_deleted, or workspace_not_found
/// - 400: missing header, invalid JSON, or missing payload fields
/// - 401: signature mismatch
/// - 429: unverified source over quota (dev mode only)
/// - 500: storage failure (nothing was committed)
pub async fn webhook_handler(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, WebhookError> {
    let started = Instant::now();

    let event_type = get_header(&headers, HEADER_EVENT)?;
    let delivery_id = DeliveryId::new(get_header(&headers, HEADER_DELIVERY)?);

    if event_type != "push" {
        debug!(delivery_id = %delivery_id, event_type = %event_type, "Ignoring non-push event");
        return Ok(ack("ignored"));
    }

    // Verify before any parsing or storage work. With no secret configured
    // (dev mode) verification is skipped and the source limiter applies
    // instead; verified traffic is exempt from it.
    let secret = app_state.webhook_secret();
    if secret.is_empty() {
        let source = headers
            .get(HEADER_FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .unwrap_or("unknown")
            .trim();
        if !app_state.webhook_limiter().check(source) {
            warn!(delivery_id = %delivery_id, source = %source, "Webhook source over quota");
            return Err(WebhookError::RateLimited);
        }
    } else {
        let signature = headers
            .get(HEADER_SIGNATURE)
            .and_then(|v| v.to_str().ok())
            .ok_or(WebhookError::InvalidSignature)?;
        if !verify_signature(&body, signature, secret) {
            warn!(delivery_id = %delivery_id, "Invalid webhook signature");
            return Err(WebhookError::InvalidSignature);
        }
    }

    let body_json: serde_json::Value = serde_json::from_slice(&body)?;
    let event = parse_push(&body_json)?;

    let outcome = ingest(&app_state, &delivery_id, &event, started)?;

    match outcome {
        PushOutcome::Duplicate => {
            debug!(delivery_id = %delivery_id, "Duplicate delivery (idempotent)");
            Ok(ack("duplicate"))
        }
        PushOutcome::WorkspaceNotFound => {
            // Quiet drop: the repository may simply not be onboarded yet.
            debug!(delivery_id = %delivery_id, repo = event.repo_id, "No workspace for repository");
            Ok(ack("workspace_not_found"))
        }
        PushOutcome::IgnoredRef => {
            debug!(delivery_id = %delivery_id, git_ref = %event.git_ref, "Ignoring non-branch ref");
            Ok(ack("ignored"))
        }
        PushOutcome::BranchDeleted => {
            info!(delivery_id = %delivery_id, "Branch deleted; activity wiped");
            Ok(ack("branch_deleted"))
        }
        PushOutcome::Processed {
            workspace,
            branch,
            files,
        } => {
            info!(
                delivery_id = %delivery_id,
                workspace = %workspace,
                branch = %branch,
                files = files.len(),
                "Push ingested"
            );

            // The acknowledgement below must not wait on the engines.
            let dispatcher = std::sync::Arc::clone(app_state.dispatcher());
            let job = EngineJob {
                workspace,
                modified_files: files,
                trigger_branch: branch,
                commit_sha: event.after.clone(),
            };
            let dispatch_delivery = delivery_id.clone();
            tokio::spawn(async move {
                if let Err(e) = dispatcher.dispatch(job).await {
                    warn!(delivery_id = %dispatch_delivery, error = %e, "Failed to dispatch push");
                }
            });

            Ok((
                StatusCode::OK,
                Json(json!({
                    "status": "processing",
                    "deliveryId": delivery_id.as_str(),
                })),
            )
                .into_response())
        }
    }
}

/// The transactional phase (steps 5–11 of the protocol). Either everything
/// here commits, or the error rolls the whole delivery back.
fn ingest(
    app_state: &AppState,
    delivery_id: &DeliveryId,
    event: &PushEvent,
    started: Instant,
) -> Result<PushOutcome, StoreError> {
    let now = Utc::now();
    let mut guard = app_state.db().conn()?;
    let tx = guard.transaction()?;

    if !deliveries::record(
        &tx,
        delivery_id,
        event.repo_id,
        event.branch(),
        &event.after,
        now,
    )? {
        tx.commit()?;
        return Ok(PushOutcome::Duplicate);
    }

    let Some(workspace) = workspaces::find_by_repo_id(&tx, event.repo_id)? else {
        tx.commit()?;
        return Ok(PushOutcome::WorkspaceNotFound);
    };

    let Some(branch) = event.branch() else {
        deliveries::finish(&tx, delivery_id, started.elapsed().as_millis() as i64)?;
        tx.commit()?;
        return Ok(PushOutcome::IgnoredRef);
    };

    if event.kind() == PushKind::BranchDelete {
        activity::wipe_branch(&tx, &workspace.id, branch)?;
        deliveries::finish(&tx, delivery_id, started.elapsed().as_millis() as i64)?;
        tx.commit()?;
        return Ok(PushOutcome::BranchDeleted);
    }

    let files = event.changed_files();
    activity::upsert_files(&tx, &workspace.id, branch, &files, &event.after, now)?;

    let authors = event.author_usernames();
    if !authors.is_empty() {
        members::touch_active(&tx, &workspace.id, &authors, now)?;
    }

    deliveries::finish(&tx, delivery_id, started.elapsed().as_millis() as i64)?;
    tx.commit()?;

    Ok(PushOutcome::Processed {
        workspace: workspace.id,
        branch: branch.to_string(),
        files,
    })
}

/// A 200 acknowledgement with a bare status.
fn ack(status: &'static str) -> Response {
    (StatusCode::OK, Json(json!({ "status": status }))).into_response()
}

/// Extracts a required header value as a string.
fn get_header(headers: &HeaderMap, name: &'static str) -> Result<String, WebhookError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or(WebhookError::MissingHeader(name))
}
