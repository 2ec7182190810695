//! Workspace state inspection endpoint.
//!
//! Returns the live snapshot a dashboard would render on first load: health
//! score and risk tier, all features, and the unresolved blockers.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::warn;

use super::AppState;
use crate::engine::health::risk_level;
use crate::store::{blockers, features, workspaces};
use crate::types::WorkspaceId;

/// Workspace state handler.
///
/// # Response
///
/// - 200 with the workspace snapshot as JSON
/// - 404 if the workspace does not exist
/// - 500 on storage failure
pub async fn state_handler(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    let workspace_id = WorkspaceId::new(id);

    let snapshot = (|| -> Result<Option<serde_json::Value>, crate::store::StoreError> {
        let conn = app_state.db().conn()?;
        let Some(workspace) = workspaces::find(&conn, &workspace_id)? else {
            return Ok(None);
        };
        let features = features::all(&conn, &workspace_id)?;
        let open_blockers = blockers::unresolved(&conn, &workspace_id)?;

        Ok(Some(json!({
            "id": workspace.id,
            "repoFullName": workspace.repo_full_name,
            "healthScore": workspace.health_score,
            "riskLevel": risk_level(workspace.health_score),
            "activityWindowHours": workspace.activity_window_hours,
            "features": features.iter().map(|f| json!({
                "id": f.id,
                "name": f.name,
                "priority": f.priority,
                "status": f.status,
                "completionPercentage": f.completion_pct,
                "owner": f.owner_uid,
            })).collect::<Vec<_>>(),
            "blockers": open_blockers.iter().map(|b| json!({
                "type": b.kind,
                "referenceId": b.reference_id,
                "severity": b.severity,
                "description": b.description,
            })).collect::<Vec<_>>(),
        })))
    })();

    match snapshot {
        Ok(Some(body)) => (StatusCode::OK, Json(body)).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, "workspace not found").into_response(),
        Err(e) => {
            warn!(workspace = %workspace_id, error = %e, "State snapshot failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "storage error").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::build_router;
    use crate::server::test_support::test_app_state;
    use crate::store::features::NewFeature;
    use crate::store::workspaces::NewWorkspace;
    use crate::types::Severity;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::Utc;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    #[tokio::test]
    async fn snapshot_lists_features_and_blockers() {
        let state = test_app_state(b"secret");
        let ws = WorkspaceId::new("ws-1");
        {
            let conn = state.db().conn().unwrap();
            workspaces::create(
                &conn,
                &NewWorkspace::new("ws-1", 42, "octo/radar", "dk"),
                Utc::now(),
            )
            .unwrap();
            workspaces::set_health_score(&conn, &ws, 55).unwrap();
            features::create(&conn, &NewFeature::new("f1", &ws, "auth")).unwrap();
            blockers::upsert_conflict_blocker(
                &conn,
                &ws,
                "a.js",
                Severity::High,
                "overlap",
                Utc::now(),
            )
            .unwrap();
        }

        let app = build_router(state);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/workspaces/ws-1/state")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["healthScore"], 55);
        assert_eq!(json["riskLevel"], "WARNING");
        assert_eq!(json["features"][0]["name"], "auth");
        assert_eq!(json["features"][0]["status"], "ACTIVE");
        assert_eq!(json["blockers"][0]["type"], "FILE_CONFLICT_RISK");
        assert_eq!(json["blockers"][0]["referenceId"], "a.js");
    }

    #[tokio::test]
    async fn unknown_workspace_is_404() {
        let app = build_router(test_app_state(b"secret"));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/workspaces/nope/state")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
