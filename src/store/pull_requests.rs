//! Pull request tracking.
//!
//! PR rows and their file memberships are maintained by the application's PR
//! surface (outside this pipeline); the conflict engine consumes the overlap
//! view over open PRs.

use std::collections::BTreeMap;

use rusqlite::{Connection, params};

use crate::types::{PrNumber, PrStatus, WorkspaceId};

/// A file listed by two or more open pull requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrOverlap {
    pub file_path: String,
    /// Distinct PR numbers, ascending.
    pub pr_numbers: Vec<PrNumber>,
    /// Source branches of those PRs, in the same order.
    pub source_branches: Vec<String>,
}

/// Inserts or refreshes a pull request, unique on (workspace, number).
pub fn upsert(
    conn: &Connection,
    workspace: &WorkspaceId,
    number: PrNumber,
    source_branch: &str,
    target_branch: &str,
    status: PrStatus,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO pull_requests (workspace_id, pr_number, source_branch, target_branch, status)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT (workspace_id, pr_number)
         DO UPDATE SET source_branch = excluded.source_branch,
                       target_branch = excluded.target_branch,
                       status = excluded.status",
        params![
            workspace.as_str(),
            number.0,
            source_branch,
            target_branch,
            status.as_str(),
        ],
    )?;
    Ok(())
}

/// Updates the status of an existing pull request.
pub fn set_status(
    conn: &Connection,
    workspace: &WorkspaceId,
    number: PrNumber,
    status: PrStatus,
) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE pull_requests SET status = ?1 WHERE workspace_id = ?2 AND pr_number = ?3",
        params![status.as_str(), workspace.as_str(), number.0],
    )
}

/// Replaces the file membership of a pull request.
pub fn replace_files(
    conn: &Connection,
    workspace: &WorkspaceId,
    number: PrNumber,
    files: &[String],
) -> rusqlite::Result<()> {
    let pr_id: i64 = conn.query_row(
        "SELECT id FROM pull_requests WHERE workspace_id = ?1 AND pr_number = ?2",
        params![workspace.as_str(), number.0],
        |row| row.get(0),
    )?;

    conn.execute("DELETE FROM pr_files WHERE pull_request_id = ?1", params![pr_id])?;
    let mut stmt =
        conn.prepare("INSERT INTO pr_files (pull_request_id, file_path) VALUES (?1, ?2)")?;
    for file in files {
        stmt.execute(params![pr_id, file])?;
    }
    Ok(())
}

/// Files present in ≥2 open pull requests of the workspace.
pub fn overlaps(conn: &Connection, workspace: &WorkspaceId) -> rusqlite::Result<Vec<PrOverlap>> {
    let mut stmt = conn.prepare(
        "SELECT pf.file_path, pr.pr_number, pr.source_branch
         FROM pr_files pf
         JOIN pull_requests pr ON pr.id = pf.pull_request_id
         WHERE pr.workspace_id = ?1 AND pr.status = 'open'
         ORDER BY pf.file_path, pr.pr_number",
    )?;
    let rows = stmt.query_map(params![workspace.as_str()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            PrNumber(row.get::<_, i64>(1)?),
            row.get::<_, String>(2)?,
        ))
    })?;

    let mut grouped: BTreeMap<String, (Vec<PrNumber>, Vec<String>)> = BTreeMap::new();
    for row in rows {
        let (file, number, branch) = row?;
        let entry = grouped.entry(file).or_default();
        entry.0.push(number);
        entry.1.push(branch);
    }

    Ok(grouped
        .into_iter()
        .filter(|(_, (numbers, _))| numbers.len() >= 2)
        .map(|(file_path, (pr_numbers, source_branches))| PrOverlap {
            file_path,
            pr_numbers,
            source_branches,
        })
        .collect())
}
