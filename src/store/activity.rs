//! File activity: the latest touch of each (branch, file) pair per workspace.
//!
//! The ingestor is the only writer. The conflict engine reads two views of
//! this table: non-trunk branch overlaps inside the activity window, and the
//! set of files touched on trunk inside the same window.

use std::collections::BTreeMap;
use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, ToSql, params};

use crate::types::{TRUNK_BRANCHES, WorkspaceId};

use super::to_millis;

/// A file touched by two or more distinct non-trunk branches inside the
/// activity window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchOverlap {
    pub file_path: String,
    /// Distinct branch names, sorted.
    pub branches: Vec<String>,
}

/// Upserts the given files for (workspace, branch) in one multi-row
/// statement, overwriting the stored commit hash and timestamp.
pub fn upsert_files(
    conn: &Connection,
    workspace: &WorkspaceId,
    branch: &str,
    files: &[String],
    commit_sha: &str,
    now: DateTime<Utc>,
) -> rusqlite::Result<usize> {
    if files.is_empty() {
        return Ok(0);
    }

    let millis = to_millis(now);
    let mut sql = String::from(
        "INSERT INTO file_activity (workspace_id, branch, file_path, last_commit_sha, updated_at) VALUES ",
    );
    let mut binds: Vec<&dyn ToSql> = Vec::with_capacity(files.len() * 5);
    for (i, file) in files.iter().enumerate() {
        if i > 0 {
            sql.push_str(", ");
        }
        sql.push_str("(?, ?, ?, ?, ?)");
        binds.push(&workspace.0);
        binds.push(&branch);
        binds.push(file);
        binds.push(&commit_sha);
        binds.push(&millis);
    }
    sql.push_str(
        " ON CONFLICT (workspace_id, branch, file_path)
          DO UPDATE SET last_commit_sha = excluded.last_commit_sha,
                        updated_at = excluded.updated_at",
    );

    conn.execute(&sql, binds.as_slice())
}

/// Deletes every activity row for (workspace, branch). Returns rows removed.
pub fn wipe_branch(
    conn: &Connection,
    workspace: &WorkspaceId,
    branch: &str,
) -> rusqlite::Result<usize> {
    conn.execute(
        "DELETE FROM file_activity WHERE workspace_id = ?1 AND branch = ?2",
        params![workspace.as_str(), branch],
    )
}

/// Files touched by ≥2 distinct non-trunk branches at or after `cutoff`.
pub fn branch_overlaps(
    conn: &Connection,
    workspace: &WorkspaceId,
    cutoff: DateTime<Utc>,
) -> rusqlite::Result<Vec<BranchOverlap>> {
    let mut stmt = conn.prepare(
        "SELECT file_path, branch FROM file_activity
         WHERE workspace_id = ?1 AND updated_at >= ?2 AND branch NOT IN (?3, ?4)
         ORDER BY file_path, branch",
    )?;
    let rows = stmt.query_map(
        params![
            workspace.as_str(),
            to_millis(cutoff),
            TRUNK_BRANCHES[0],
            TRUNK_BRANCHES[1],
        ],
        |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
    )?;

    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for row in rows {
        let (file, branch) = row?;
        grouped.entry(file).or_default().push(branch);
    }

    Ok(grouped
        .into_iter()
        .filter(|(_, branches)| branches.len() >= 2)
        .map(|(file_path, branches)| BranchOverlap {
            file_path,
            branches,
        })
        .collect())
}

/// Files with a trunk-branch activity row at or after `cutoff`.
///
/// Auxiliary input to severity classification: trunk rows are excluded from
/// the overlap grouping, so trunk presence is established separately.
pub fn trunk_touched_files(
    conn: &Connection,
    workspace: &WorkspaceId,
    cutoff: DateTime<Utc>,
) -> rusqlite::Result<HashSet<String>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT file_path FROM file_activity
         WHERE workspace_id = ?1 AND updated_at >= ?2 AND branch IN (?3, ?4)",
    )?;
    let rows = stmt.query_map(
        params![
            workspace.as_str(),
            to_millis(cutoff),
            TRUNK_BRANCHES[0],
            TRUNK_BRANCHES[1],
        ],
        |row| row.get::<_, String>(0),
    )?;
    rows.collect()
}
