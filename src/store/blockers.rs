//! Blocker store.
//!
//! The only writer of the `blockers` table. Upserts lean on the partial
//! unique index (`resolved = 0` rows only): a single INSERT .. ON CONFLICT
//! statement either creates the unresolved blocker, refreshes it when the
//! severity changed, or leaves it untouched, with no read-then-write window
//! for a concurrent engine run to race through.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};

use crate::types::{Blocker, BlockerKind, FeatureId, Severity, TRUNK_BRANCHES, WorkspaceId};

use super::to_millis;

/// Inserts or refreshes the unresolved FILE_CONFLICT_RISK blocker for a file.
///
/// Returns `true` when a row was inserted or updated (the conflict picture
/// changed and a warning should go out), `false` when an unresolved blocker
/// with the same severity already existed.
pub fn upsert_conflict_blocker(
    conn: &Connection,
    workspace: &WorkspaceId,
    file_path: &str,
    severity: Severity,
    description: &str,
    now: DateTime<Utc>,
) -> rusqlite::Result<bool> {
    upsert(
        conn,
        workspace,
        BlockerKind::FileConflictRisk,
        file_path,
        severity,
        description,
        now,
    )
}

/// Inserts or refreshes the unresolved DEPENDENCY_BLOCK blocker for a
/// feature. Dependency blocks are always HIGH severity, so a second upsert
/// for the same feature is a no-op unless the description is the first.
pub fn upsert_dependency_blocker(
    conn: &Connection,
    workspace: &WorkspaceId,
    feature: &FeatureId,
    description: &str,
    now: DateTime<Utc>,
) -> rusqlite::Result<bool> {
    upsert(
        conn,
        workspace,
        BlockerKind::DependencyBlock,
        feature.as_str(),
        Severity::High,
        description,
        now,
    )
}

fn upsert(
    conn: &Connection,
    workspace: &WorkspaceId,
    kind: BlockerKind,
    reference_id: &str,
    severity: Severity,
    description: &str,
    now: DateTime<Utc>,
) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        "INSERT INTO blockers
         (workspace_id, kind, reference_id, severity, description, resolved, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?6)
         ON CONFLICT (workspace_id, kind, reference_id) WHERE resolved = 0
         DO UPDATE SET severity = excluded.severity,
                       description = excluded.description,
                       updated_at = excluded.updated_at
         WHERE blockers.severity <> excluded.severity",
        params![
            workspace.as_str(),
            kind.as_str(),
            reference_id,
            severity.as_str(),
            description,
            to_millis(now),
        ],
    )?;
    Ok(changed > 0)
}

/// Resolves, in one set-based statement, every unresolved conflict blocker
/// whose file has left the current conflict set: files touched by ≥2 distinct
/// non-trunk branches at or after `cutoff`, or listed by ≥2 open PRs.
///
/// Returns the number of blockers resolved.
pub fn resolve_stale_conflict_blockers(
    conn: &Connection,
    workspace: &WorkspaceId,
    cutoff: DateTime<Utc>,
    now: DateTime<Utc>,
) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE blockers SET resolved = 1, updated_at = ?1
         WHERE workspace_id = ?2 AND kind = ?3 AND resolved = 0
           AND reference_id NOT IN (
               SELECT file_path FROM file_activity
               WHERE workspace_id = ?2 AND updated_at >= ?4 AND branch NOT IN (?5, ?6)
               GROUP BY file_path
               HAVING COUNT(DISTINCT branch) >= 2
               UNION
               SELECT pf.file_path FROM pr_files pf
               JOIN pull_requests pr ON pr.id = pf.pull_request_id
               WHERE pr.workspace_id = ?2 AND pr.status = 'open'
               GROUP BY pf.file_path
               HAVING COUNT(DISTINCT pr.id) >= 2
           )",
        params![
            to_millis(now),
            workspace.as_str(),
            BlockerKind::FileConflictRisk.as_str(),
            to_millis(cutoff),
            TRUNK_BRANCHES[0],
            TRUNK_BRANCHES[1],
        ],
    )
}

/// Resolves the unresolved DEPENDENCY_BLOCK blocker for a feature, if any.
pub fn resolve_dependency_blocker(
    conn: &Connection,
    workspace: &WorkspaceId,
    feature: &FeatureId,
    now: DateTime<Utc>,
) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        "UPDATE blockers SET resolved = 1, updated_at = ?1
         WHERE workspace_id = ?2 AND kind = ?3 AND reference_id = ?4 AND resolved = 0",
        params![
            to_millis(now),
            workspace.as_str(),
            BlockerKind::DependencyBlock.as_str(),
            feature.as_str(),
        ],
    )?;
    Ok(changed > 0)
}

/// Unresolved blocker totals for the health recomputation:
/// `(all kinds, FILE_CONFLICT_RISK only)`.
pub fn unresolved_counts(
    conn: &Connection,
    workspace: &WorkspaceId,
) -> rusqlite::Result<(i64, i64)> {
    conn.query_row(
        "SELECT COUNT(*),
                COALESCE(SUM(CASE WHEN kind = ?2 THEN 1 ELSE 0 END), 0)
         FROM blockers WHERE workspace_id = ?1 AND resolved = 0",
        params![workspace.as_str(), BlockerKind::FileConflictRisk.as_str()],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
}

/// All unresolved blockers of the workspace, newest first.
pub fn unresolved(conn: &Connection, workspace: &WorkspaceId) -> rusqlite::Result<Vec<Blocker>> {
    let mut stmt = conn.prepare(
        "SELECT id, kind, reference_id, severity, description
         FROM blockers WHERE workspace_id = ?1 AND resolved = 0
         ORDER BY created_at DESC, id DESC",
    )?;
    let rows = stmt.query_map(params![workspace.as_str()], |row| {
        let kind: String = row.get(1)?;
        let severity: String = row.get(3)?;
        Ok(Blocker {
            id: row.get(0)?,
            workspace_id: workspace.clone(),
            kind: BlockerKind::parse(&kind).unwrap_or(BlockerKind::FileConflictRisk),
            reference_id: row.get(2)?,
            severity: Severity::parse(&severity).unwrap_or(Severity::Low),
            description: row.get(4)?,
            resolved: false,
        })
    })?;
    rows.collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::workspaces::{self, NewWorkspace};
    use crate::store::{Database, activity, pull_requests};
    use crate::types::{PrNumber, PrStatus};
    use chrono::Duration;

    fn seeded_db() -> (Database, WorkspaceId) {
        let db = Database::open_in_memory().unwrap();
        {
            let conn = db.conn().unwrap();
            workspaces::create(&conn, &NewWorkspace::new("ws", 1, "o/r", "k"), Utc::now()).unwrap();
        }
        (db, WorkspaceId::new("ws"))
    }

    fn unresolved_rows(conn: &Connection) -> i64 {
        conn.query_row(
            "SELECT COUNT(*) FROM blockers WHERE resolved = 0",
            [],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn upsert_is_idempotent_at_equal_severity() {
        let (db, ws) = seeded_db();
        let conn = db.conn().unwrap();
        let now = Utc::now();

        assert!(upsert_conflict_blocker(&conn, &ws, "a.js", Severity::Medium, "two branches", now).unwrap());
        assert!(!upsert_conflict_blocker(&conn, &ws, "a.js", Severity::Medium, "two branches", now).unwrap());
        assert_eq!(unresolved_rows(&conn), 1);
    }

    #[test]
    fn upsert_escalates_severity_in_place() {
        let (db, ws) = seeded_db();
        let conn = db.conn().unwrap();
        let now = Utc::now();

        upsert_conflict_blocker(&conn, &ws, "a.js", Severity::Medium, "two branches", now).unwrap();
        assert!(upsert_conflict_blocker(&conn, &ws, "a.js", Severity::High, "three branches", now).unwrap());

        let all = unresolved(&conn, &ws).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].severity, Severity::High);
        assert_eq!(all[0].description, "three branches");
    }

    #[test]
    fn at_most_one_unresolved_blocker_per_reference() {
        let (db, ws) = seeded_db();
        let conn = db.conn().unwrap();
        let now = Utc::now();

        for severity in [Severity::Low, Severity::Medium, Severity::High, Severity::Low] {
            upsert_conflict_blocker(&conn, &ws, "a.js", severity, "d", now).unwrap();
        }
        assert_eq!(unresolved_rows(&conn), 1);
    }

    #[test]
    fn dependency_blocker_roundtrip() {
        let (db, ws) = seeded_db();
        let conn = db.conn().unwrap();
        let now = Utc::now();
        let feature = FeatureId::new("f1");

        assert!(upsert_dependency_blocker(&conn, &ws, &feature, "waiting on auth", now).unwrap());
        // Same severity (always HIGH): the second upsert is a no-op.
        assert!(!upsert_dependency_blocker(&conn, &ws, &feature, "waiting on auth", now).unwrap());

        assert!(resolve_dependency_blocker(&conn, &ws, &feature, now).unwrap());
        assert!(!resolve_dependency_blocker(&conn, &ws, &feature, now).unwrap());
        assert_eq!(unresolved_rows(&conn), 0);
    }

    #[test]
    fn resolved_blocker_can_be_recreated() {
        let (db, ws) = seeded_db();
        let conn = db.conn().unwrap();
        let now = Utc::now();

        upsert_conflict_blocker(&conn, &ws, "a.js", Severity::High, "d", now).unwrap();
        resolve_stale_conflict_blockers(&conn, &ws, now - Duration::hours(72), now).unwrap();
        assert_eq!(unresolved_rows(&conn), 0);

        // The partial index only constrains unresolved rows, so the file can
        // re-enter the conflict set later.
        assert!(upsert_conflict_blocker(&conn, &ws, "a.js", Severity::High, "d", now).unwrap());
        assert_eq!(unresolved_rows(&conn), 1);
    }

    #[test]
    fn stale_resolution_tracks_the_conflict_set() {
        let (db, ws) = seeded_db();
        let conn = db.conn().unwrap();
        let now = Utc::now();
        let cutoff = now - Duration::hours(72);

        // a.js still overlaps on branches; core.ts still overlaps on PRs;
        // x.md aged out of the window.
        activity::upsert_files(&conn, &ws, "feat-1", &["a.js".into()], "s1", now).unwrap();
        activity::upsert_files(&conn, &ws, "feat-2", &["a.js".into()], "s2", now).unwrap();
        activity::upsert_files(
            &conn,
            &ws,
            "feat-1",
            &["x.md".into()],
            "s3",
            now - Duration::hours(100),
        )
        .unwrap();
        activity::upsert_files(
            &conn,
            &ws,
            "feat-2",
            &["x.md".into()],
            "s4",
            now - Duration::hours(90),
        )
        .unwrap();
        pull_requests::upsert(&conn, &ws, PrNumber(10), "feat-a", "main", PrStatus::Open).unwrap();
        pull_requests::upsert(&conn, &ws, PrNumber(11), "feat-b", "main", PrStatus::Open).unwrap();
        pull_requests::replace_files(&conn, &ws, PrNumber(10), &["core.ts".into()]).unwrap();
        pull_requests::replace_files(&conn, &ws, PrNumber(11), &["core.ts".into()]).unwrap();

        for file in ["a.js", "core.ts", "x.md"] {
            upsert_conflict_blocker(&conn, &ws, file, Severity::High, "d", now).unwrap();
        }

        let resolved = resolve_stale_conflict_blockers(&conn, &ws, cutoff, now).unwrap();
        assert_eq!(resolved, 1);

        let remaining: Vec<String> = unresolved(&conn, &ws)
            .unwrap()
            .into_iter()
            .map(|b| b.reference_id)
            .collect();
        assert!(remaining.contains(&"a.js".to_string()));
        assert!(remaining.contains(&"core.ts".to_string()));
        assert!(!remaining.contains(&"x.md".to_string()));
    }

    #[test]
    fn stale_resolution_leaves_dependency_blockers_alone() {
        let (db, ws) = seeded_db();
        let conn = db.conn().unwrap();
        let now = Utc::now();

        upsert_dependency_blocker(&conn, &ws, &FeatureId::new("f1"), "d", now).unwrap();
        resolve_stale_conflict_blockers(&conn, &ws, now - Duration::hours(72), now).unwrap();
        assert_eq!(unresolved_rows(&conn), 1);
    }

    #[test]
    fn unresolved_counts_split_by_kind() {
        let (db, ws) = seeded_db();
        let conn = db.conn().unwrap();
        let now = Utc::now();

        upsert_conflict_blocker(&conn, &ws, "a.js", Severity::High, "d", now).unwrap();
        upsert_conflict_blocker(&conn, &ws, "b.js", Severity::Low, "d", now).unwrap();
        upsert_dependency_blocker(&conn, &ws, &FeatureId::new("f1"), "d", now).unwrap();

        let (total, conflicts) = unresolved_counts(&conn, &ws).unwrap();
        assert_eq!(total, 3);
        assert_eq!(conflicts, 2);
    }
}
