//! Workspace queries.
//!
//! Workspaces are created by the onboarding surface, which is external to the
//! pipeline; the operations here are the lookups the ingestor and engines
//! need, plus the creation call that surface (and the test fixtures) use.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use crate::types::{DEFAULT_ACTIVITY_WINDOW_HOURS, Workspace, WorkspaceId};

use super::to_millis;

/// Parameters for creating a workspace.
#[derive(Debug, Clone)]
pub struct NewWorkspace {
    pub id: WorkspaceId,
    pub github_repo_id: i64,
    pub repo_full_name: String,
    pub dashboard_key: String,
    pub activity_window_hours: i64,
}

impl NewWorkspace {
    pub fn new(
        id: impl Into<String>,
        github_repo_id: i64,
        repo_full_name: impl Into<String>,
        dashboard_key: impl Into<String>,
    ) -> Self {
        NewWorkspace {
            id: WorkspaceId::new(id),
            github_repo_id,
            repo_full_name: repo_full_name.into(),
            dashboard_key: dashboard_key.into(),
            activity_window_hours: DEFAULT_ACTIVITY_WINDOW_HOURS,
        }
    }

    pub fn with_activity_window_hours(mut self, hours: i64) -> Self {
        self.activity_window_hours = hours;
        self
    }
}

/// Inserts a workspace. Fails if the repo id or dashboard key is taken.
pub fn create(conn: &Connection, ws: &NewWorkspace, now: DateTime<Utc>) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO workspaces
         (id, github_repo_id, repo_full_name, dashboard_key, activity_window_hours, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            ws.id.as_str(),
            ws.github_repo_id,
            ws.repo_full_name,
            ws.dashboard_key,
            ws.activity_window_hours,
            to_millis(now),
        ],
    )?;
    Ok(())
}

fn row_to_workspace(row: &rusqlite::Row<'_>) -> rusqlite::Result<Workspace> {
    Ok(Workspace {
        id: WorkspaceId::new(row.get::<_, String>(0)?),
        github_repo_id: row.get(1)?,
        repo_full_name: row.get(2)?,
        dashboard_key: row.get(3)?,
        activity_window_hours: row.get(4)?,
        health_score: row.get(5)?,
    })
}

const WORKSPACE_COLUMNS: &str =
    "id, github_repo_id, repo_full_name, dashboard_key, activity_window_hours, health_score";

/// Resolves a workspace by its upstream numeric repository id.
pub fn find_by_repo_id(conn: &Connection, repo_id: i64) -> rusqlite::Result<Option<Workspace>> {
    conn.query_row(
        &format!("SELECT {WORKSPACE_COLUMNS} FROM workspaces WHERE github_repo_id = ?1"),
        params![repo_id],
        row_to_workspace,
    )
    .optional()
}

/// Fetches a workspace by id.
pub fn find(conn: &Connection, id: &WorkspaceId) -> rusqlite::Result<Option<Workspace>> {
    conn.query_row(
        &format!("SELECT {WORKSPACE_COLUMNS} FROM workspaces WHERE id = ?1"),
        params![id.as_str()],
        row_to_workspace,
    )
    .optional()
}

/// Returns the workspace's activity window, falling back to the default when
/// the workspace row is missing.
pub fn activity_window_hours(conn: &Connection, id: &WorkspaceId) -> rusqlite::Result<i64> {
    let hours = conn
        .query_row(
            "SELECT activity_window_hours FROM workspaces WHERE id = ?1",
            params![id.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(hours.unwrap_or(DEFAULT_ACTIVITY_WINDOW_HOURS))
}

/// Persists a recomputed health score.
pub fn set_health_score(conn: &Connection, id: &WorkspaceId, score: i64) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE workspaces SET health_score = ?1 WHERE id = ?2",
        params![score, id.as_str()],
    )?;
    Ok(())
}
