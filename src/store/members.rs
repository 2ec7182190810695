//! Workspace member queries.
//!
//! Usernames are canonical lowercase; the ingestor refreshes `last_active`
//! from push commit authors, and the health engine counts members whose
//! activity has fallen outside the workspace window.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use crate::types::WorkspaceId;

use super::to_millis;

/// Enrolls a member. The username is normalized to lowercase.
pub fn add(
    conn: &Connection,
    workspace: &WorkspaceId,
    user_uid: &str,
    username: &str,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO members (workspace_id, user_uid, username) VALUES (?1, ?2, ?3)",
        params![workspace.as_str(), user_uid, username.to_lowercase()],
    )?;
    Ok(())
}

/// Refreshes `last_active` for members whose username matches one of the
/// given (already lowercased) names. Returns the number of rows touched.
pub fn touch_active(
    conn: &Connection,
    workspace: &WorkspaceId,
    usernames: &[String],
    now: DateTime<Utc>,
) -> rusqlite::Result<usize> {
    let mut touched = 0;
    let mut stmt = conn.prepare(
        "UPDATE members SET last_active = ?1 WHERE workspace_id = ?2 AND username = ?3",
    )?;
    for name in usernames {
        touched += stmt.execute(params![to_millis(now), workspace.as_str(), name])?;
    }
    Ok(touched)
}

/// Counts members with no activity at or after `cutoff`.
///
/// A member who has never pushed (`last_active` NULL) counts as inactive.
pub fn inactive_count(
    conn: &Connection,
    workspace: &WorkspaceId,
    cutoff: DateTime<Utc>,
) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM members
         WHERE workspace_id = ?1 AND (last_active IS NULL OR last_active < ?2)",
        params![workspace.as_str(), to_millis(cutoff)],
        |row| row.get(0),
    )
}

/// Finds the workspace a user is enrolled in, if any.
///
/// Used to bind dashboard subscribers: a `userUid` unknown to every
/// workspace stays unbound and receives no events.
pub fn workspace_for_user(
    conn: &Connection,
    user_uid: &str,
) -> rusqlite::Result<Option<WorkspaceId>> {
    conn.query_row(
        "SELECT workspace_id FROM members WHERE user_uid = ?1 LIMIT 1",
        params![user_uid],
        |row| row.get::<_, String>(0).map(WorkspaceId::new),
    )
    .optional()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Database;
    use crate::store::workspaces::{self, NewWorkspace};
    use chrono::Duration;

    fn seeded_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        {
            let conn = db.conn().unwrap();
            workspaces::create(&conn, &NewWorkspace::new("ws", 1, "o/r", "k"), Utc::now()).unwrap();
        }
        db
    }

    #[test]
    fn usernames_are_canonicalized_lowercase() {
        let db = seeded_db();
        let conn = db.conn().unwrap();
        let ws = WorkspaceId::new("ws");
        add(&conn, &ws, "u1", "Alice").unwrap();

        let touched = touch_active(&conn, &ws, &["alice".to_string()], Utc::now()).unwrap();
        assert_eq!(touched, 1);
    }

    #[test]
    fn inactive_count_honors_cutoff_and_null() {
        let db = seeded_db();
        let conn = db.conn().unwrap();
        let ws = WorkspaceId::new("ws");
        let now = Utc::now();

        add(&conn, &ws, "u1", "alice").unwrap();
        add(&conn, &ws, "u2", "bob").unwrap();
        add(&conn, &ws, "u3", "carol").unwrap();
        // alice pushed just now; bob pushed four days ago; carol never pushed.
        touch_active(&conn, &ws, &["alice".to_string()], now).unwrap();
        touch_active(&conn, &ws, &["bob".to_string()], now - Duration::hours(96)).unwrap();

        let cutoff = now - Duration::hours(72);
        assert_eq!(inactive_count(&conn, &ws, cutoff).unwrap(), 2);
    }

    #[test]
    fn workspace_lookup_by_user() {
        let db = seeded_db();
        let conn = db.conn().unwrap();
        let ws = WorkspaceId::new("ws");
        add(&conn, &ws, "u1", "alice").unwrap();

        assert_eq!(workspace_for_user(&conn, "u1").unwrap(), Some(ws));
        assert_eq!(workspace_for_user(&conn, "nobody").unwrap(), None);
    }
}
