//! Feature and dependency queries.
//!
//! Feature status and completion are mutated by the feature engine only;
//! creation and dependency edges come from the (external) planning surface
//! and from test fixtures.

use rusqlite::{Connection, params};

use crate::types::{Feature, FeatureId, FeatureStatus, Priority, WorkspaceId};

/// Per-push completion bump.
const COMPLETION_DELTA: i64 = 5;

/// Ceiling for push-driven completion. The last 5% is reserved for an
/// explicit merge-to-trunk event.
const COMPLETION_CAP: i64 = 95;

/// Parameters for creating a feature.
#[derive(Debug, Clone)]
pub struct NewFeature {
    pub id: FeatureId,
    pub workspace_id: WorkspaceId,
    pub name: String,
    pub priority: Priority,
    pub owner_uid: Option<String>,
}

impl NewFeature {
    pub fn new(id: impl Into<String>, workspace: &WorkspaceId, name: impl Into<String>) -> Self {
        NewFeature {
            id: FeatureId::new(id),
            workspace_id: workspace.clone(),
            name: name.into(),
            priority: Priority::Medium,
            owner_uid: None,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_owner(mut self, owner_uid: impl Into<String>) -> Self {
        self.owner_uid = Some(owner_uid.into());
        self
    }
}

/// Inserts a feature with status ACTIVE and zero completion.
pub fn create(conn: &Connection, feature: &NewFeature) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO features (id, workspace_id, name, priority, owner_uid)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            feature.id.as_str(),
            feature.workspace_id.as_str(),
            feature.name,
            feature.priority.as_str(),
            feature.owner_uid,
        ],
    )?;
    Ok(())
}

/// Adds a dependency edge `feature -> depends_on`.
///
/// The pair is unique and self-loops are rejected by the schema.
pub fn add_dependency(
    conn: &Connection,
    feature: &FeatureId,
    depends_on: &FeatureId,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO feature_dependencies (feature_id, depends_on_id) VALUES (?1, ?2)",
        params![feature.as_str(), depends_on.as_str()],
    )?;
    Ok(())
}

fn row_to_feature(workspace: &WorkspaceId, row: &rusqlite::Row<'_>) -> rusqlite::Result<Feature> {
    let priority: String = row.get(2)?;
    let status: String = row.get(3)?;
    Ok(Feature {
        id: FeatureId::new(row.get::<_, String>(0)?),
        workspace_id: workspace.clone(),
        name: row.get(1)?,
        priority: Priority::parse(&priority).unwrap_or(Priority::Medium),
        status: FeatureStatus::parse(&status).unwrap_or(FeatureStatus::Active),
        completion_pct: row.get(4)?,
        owner_uid: row.get(5)?,
    })
}

/// All features of the workspace that have not reached COMPLETE.
pub fn incomplete(conn: &Connection, workspace: &WorkspaceId) -> rusqlite::Result<Vec<Feature>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, priority, status, completion_pct, owner_uid
         FROM features WHERE workspace_id = ?1 AND status <> 'COMPLETE'
         ORDER BY id",
    )?;
    let rows = stmt.query_map(params![workspace.as_str()], |row| {
        row_to_feature(workspace, row)
    })?;
    rows.collect()
}

/// All features of the workspace, for the state endpoint.
pub fn all(conn: &Connection, workspace: &WorkspaceId) -> rusqlite::Result<Vec<Feature>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, priority, status, completion_pct, owner_uid
         FROM features WHERE workspace_id = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![workspace.as_str()], |row| {
        row_to_feature(workspace, row)
    })?;
    rows.collect()
}

/// Names of upstream dependencies of `feature` that are not COMPLETE,
/// with their ids, sorted by name.
pub fn incomplete_dependencies(
    conn: &Connection,
    feature: &FeatureId,
) -> rusqlite::Result<Vec<(FeatureId, String)>> {
    let mut stmt = conn.prepare(
        "SELECT dep.id, dep.name
         FROM feature_dependencies fd
         JOIN features dep ON dep.id = fd.depends_on_id
         WHERE fd.feature_id = ?1 AND dep.status <> 'COMPLETE'
         ORDER BY dep.name",
    )?;
    let rows = stmt.query_map(params![feature.as_str()], |row| {
        Ok((FeatureId::new(row.get::<_, String>(0)?), row.get(1)?))
    })?;
    rows.collect()
}

/// Sets a feature's status.
pub fn set_status(
    conn: &Connection,
    feature: &FeatureId,
    status: FeatureStatus,
) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE features SET status = ?1 WHERE id = ?2",
        params![status.as_str(), feature.as_str()],
    )?;
    Ok(())
}

/// Bumps completion by the per-push delta, never past the push cap.
///
/// Features already at or above the cap are untouched, so a bump can never
/// move completion backwards.
pub fn bump_completion(conn: &Connection, feature: &FeatureId) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE features
         SET completion_pct = MIN(completion_pct + ?1, ?2)
         WHERE id = ?3 AND completion_pct < ?2",
        params![COMPLETION_DELTA, COMPLETION_CAP, feature.as_str()],
    )?;
    Ok(())
}

/// Mean completion across all features of the workspace; 0 when there are none.
pub fn completion_avg(conn: &Connection, workspace: &WorkspaceId) -> rusqlite::Result<f64> {
    conn.query_row(
        "SELECT COALESCE(AVG(completion_pct), 0.0) FROM features WHERE workspace_id = ?1",
        params![workspace.as_str()],
        |row| row.get(0),
    )
}
