//! Webhook delivery log.
//!
//! One row per upstream delivery id. The conditional insert is the
//! idempotency gate: a redelivered id inserts zero rows, and the ingestor
//! answers `duplicate` without touching any other table.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};

use crate::types::DeliveryId;

use super::to_millis;

/// Records a delivery if its id has not been seen.
///
/// Returns `true` when the row was inserted (first sighting), `false` when
/// the id was already logged.
pub fn record(
    conn: &Connection,
    delivery: &DeliveryId,
    github_repo_id: i64,
    branch: Option<&str>,
    commit_sha: &str,
    now: DateTime<Utc>,
) -> rusqlite::Result<bool> {
    let inserted = conn.execute(
        "INSERT INTO webhook_deliveries (delivery_id, github_repo_id, branch, commit_sha, received_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT (delivery_id) DO NOTHING",
        params![
            delivery.as_str(),
            github_repo_id,
            branch,
            commit_sha,
            to_millis(now),
        ],
    )?;
    Ok(inserted > 0)
}

/// Stamps the processing duration onto a logged delivery.
pub fn finish(conn: &Connection, delivery: &DeliveryId, duration_ms: i64) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE webhook_deliveries SET duration_ms = ?1 WHERE delivery_id = ?2",
        params![duration_ms, delivery.as_str()],
    )?;
    Ok(())
}
