//! Database schema.
//!
//! The partial unique index `idx_blockers_active` is load-bearing: it lets
//! the blocker store insert-or-update without a read-then-write race between
//! concurrent engine runs, and it is what bounds unresolved blockers to one
//! per `(workspace, kind, reference)`.

use rusqlite::Connection;

/// DDL applied at startup. Every statement is idempotent.
const DDL: &str = "
CREATE TABLE IF NOT EXISTS workspaces (
    id                      TEXT PRIMARY KEY,
    github_repo_id          INTEGER NOT NULL UNIQUE,
    repo_full_name          TEXT NOT NULL,
    dashboard_key           TEXT NOT NULL UNIQUE,
    activity_window_hours   INTEGER NOT NULL DEFAULT 72,
    health_score            INTEGER NOT NULL DEFAULT 100
                            CHECK (health_score BETWEEN 0 AND 100),
    created_at              INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS members (
    workspace_id    TEXT NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
    user_uid        TEXT NOT NULL,
    username        TEXT NOT NULL,
    last_active     INTEGER,
    PRIMARY KEY (workspace_id, user_uid)
);

CREATE TABLE IF NOT EXISTS features (
    id              TEXT PRIMARY KEY,
    workspace_id    TEXT NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
    name            TEXT NOT NULL,
    priority        TEXT NOT NULL DEFAULT 'MEDIUM',
    status          TEXT NOT NULL DEFAULT 'ACTIVE',
    completion_pct  INTEGER NOT NULL DEFAULT 0
                    CHECK (completion_pct BETWEEN 0 AND 100),
    owner_uid       TEXT
);

CREATE TABLE IF NOT EXISTS feature_dependencies (
    feature_id      TEXT NOT NULL REFERENCES features(id) ON DELETE CASCADE,
    depends_on_id   TEXT NOT NULL REFERENCES features(id) ON DELETE CASCADE,
    PRIMARY KEY (feature_id, depends_on_id),
    CHECK (feature_id <> depends_on_id)
);

CREATE TABLE IF NOT EXISTS file_activity (
    workspace_id    TEXT NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
    branch          TEXT NOT NULL,
    file_path       TEXT NOT NULL,
    last_commit_sha TEXT NOT NULL,
    updated_at      INTEGER NOT NULL,
    PRIMARY KEY (workspace_id, branch, file_path)
);

CREATE INDEX IF NOT EXISTS idx_file_activity_window
    ON file_activity (workspace_id, updated_at);

CREATE TABLE IF NOT EXISTS pull_requests (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    workspace_id    TEXT NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
    pr_number       INTEGER NOT NULL,
    source_branch   TEXT NOT NULL,
    target_branch   TEXT NOT NULL,
    status          TEXT NOT NULL DEFAULT 'open',
    UNIQUE (workspace_id, pr_number)
);

CREATE TABLE IF NOT EXISTS pr_files (
    pull_request_id INTEGER NOT NULL REFERENCES pull_requests(id) ON DELETE CASCADE,
    file_path       TEXT NOT NULL,
    PRIMARY KEY (pull_request_id, file_path)
);

CREATE TABLE IF NOT EXISTS blockers (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    workspace_id    TEXT NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
    kind            TEXT NOT NULL,
    reference_id    TEXT NOT NULL,
    severity        TEXT NOT NULL,
    description     TEXT NOT NULL,
    resolved        INTEGER NOT NULL DEFAULT 0,
    created_at      INTEGER NOT NULL,
    updated_at      INTEGER NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_blockers_active
    ON blockers (workspace_id, kind, reference_id) WHERE resolved = 0;

CREATE TABLE IF NOT EXISTS webhook_deliveries (
    delivery_id     TEXT PRIMARY KEY,
    github_repo_id  INTEGER,
    branch          TEXT,
    commit_sha      TEXT,
    received_at     INTEGER NOT NULL,
    duration_ms     INTEGER
);
";

/// Applies the schema and per-connection pragmas.
pub fn init(conn: &Connection) -> rusqlite::Result<()> {
    // Foreign keys are off by default in SQLite and must be enabled per
    // connection for the workspace cascades to fire.
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.execute_batch(DDL)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init(&conn).unwrap();
        conn
    }

    #[test]
    fn init_is_idempotent() {
        let conn = test_conn();
        init(&conn).unwrap();
        init(&conn).unwrap();
    }

    #[test]
    fn active_blocker_index_rejects_second_unresolved_row() {
        let conn = test_conn();
        conn.execute(
            "INSERT INTO workspaces (id, github_repo_id, repo_full_name, dashboard_key, created_at)
             VALUES ('ws', 1, 'o/r', 'key', 0)",
            [],
        )
        .unwrap();

        let insert = "INSERT INTO blockers
             (workspace_id, kind, reference_id, severity, description, resolved, created_at, updated_at)
             VALUES ('ws', 'FILE_CONFLICT_RISK', 'a.js', 'HIGH', 'd', 0, 0, 0)";
        conn.execute(insert, []).unwrap();
        assert!(conn.execute(insert, []).is_err());

        // A resolved row with the same key is allowed: the index is partial.
        conn.execute(
            "INSERT INTO blockers
             (workspace_id, kind, reference_id, severity, description, resolved, created_at, updated_at)
             VALUES ('ws', 'FILE_CONFLICT_RISK', 'a.js', 'HIGH', 'd', 1, 0, 0)",
            [],
        )
        .unwrap();
    }

    #[test]
    fn self_dependency_is_rejected() {
        let conn = test_conn();
        conn.execute(
            "INSERT INTO workspaces (id, github_repo_id, repo_full_name, dashboard_key, created_at)
             VALUES ('ws', 1, 'o/r', 'key', 0)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO features (id, workspace_id, name) VALUES ('f1', 'ws', 'auth')",
            [],
        )
        .unwrap();

        let result = conn.execute(
            "INSERT INTO feature_dependencies (feature_id, depends_on_id) VALUES ('f1', 'f1')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn workspace_delete_cascades() {
        let conn = test_conn();
        conn.execute(
            "INSERT INTO workspaces (id, github_repo_id, repo_full_name, dashboard_key, created_at)
             VALUES ('ws', 1, 'o/r', 'key', 0)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO members (workspace_id, user_uid, username) VALUES ('ws', 'u1', 'alice')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO file_activity (workspace_id, branch, file_path, last_commit_sha, updated_at)
             VALUES ('ws', 'feat', 'a.js', 'abc', 0)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO blockers
             (workspace_id, kind, reference_id, severity, description, resolved, created_at, updated_at)
             VALUES ('ws', 'FILE_CONFLICT_RISK', 'a.js', 'HIGH', 'd', 0, 0, 0)",
            [],
        )
        .unwrap();

        conn.execute("DELETE FROM workspaces WHERE id = 'ws'", [])
            .unwrap();

        for table in ["members", "file_activity", "blockers"] {
            let n: i64 = conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                    row.get(0)
                })
                .unwrap();
            assert_eq!(n, 0, "{table} should be empty after workspace delete");
        }
    }
}
