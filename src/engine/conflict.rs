//! Cross-branch and cross-PR conflict detection.
//!
//! One transaction per invocation: overlap queries, severity classification,
//! blocker upserts, and set-based stale resolution all commit or roll back
//! together. Partial state never persists. `CONFLICT_WARNING` events go out
//! only after the commit, and only for blockers whose row actually changed,
//! so a back-to-back rerun with unchanged file activity broadcasts nothing.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::bus::{DomainEvent, EventBus};
use crate::store::{Database, StoreError, activity, blockers, pull_requests, workspaces};
use crate::types::{PrNumber, WorkspaceId};

use super::severity::{ConflictSignals, classify};

/// Combined per-file signals from the branch- and PR-overlap views.
#[derive(Debug, Default, Clone)]
struct FileSignals {
    branches: Vec<String>,
    pr_numbers: Vec<PrNumber>,
    touches_trunk: bool,
}

/// Recomputes the conflict picture of one workspace.
#[derive(Clone)]
pub struct ConflictEngine {
    db: Database,
    bus: Arc<EventBus>,
}

impl ConflictEngine {
    pub fn new(db: Database, bus: Arc<EventBus>) -> Self {
        ConflictEngine { db, bus }
    }

    /// Runs conflict detection for a push that modified `modified_files` on
    /// `trigger_branch`. Exits immediately when the push carried no files.
    ///
    /// Errors are logged and swallowed: the webhook has already been
    /// acknowledged, and the next delivery reprocesses the same state.
    pub async fn run(&self, workspace: &WorkspaceId, modified_files: &[String], trigger_branch: &str) {
        if modified_files.is_empty() {
            return;
        }

        let events = match self.detect(workspace) {
            Ok(events) => events,
            Err(e) => {
                warn!(
                    workspace = %workspace,
                    branch = %trigger_branch,
                    error = %e,
                    "Conflict detection failed; transaction rolled back"
                );
                return;
            }
        };

        if !events.is_empty() {
            info!(
                workspace = %workspace,
                branch = %trigger_branch,
                warnings = events.len(),
                "Conflict warnings raised"
            );
        }
        for event in &events {
            self.bus.broadcast(workspace, event).await;
        }
    }

    fn detect(&self, workspace: &WorkspaceId) -> Result<Vec<DomainEvent>, StoreError> {
        let now = Utc::now();
        let mut guard = self.db.conn()?;
        let tx = guard.transaction()?;

        let window_hours = workspaces::activity_window_hours(&tx, workspace)?;
        let cutoff = now - Duration::hours(window_hours);

        let merged = gather_signals(&tx, workspace, cutoff)?;

        let mut events = Vec::new();
        for (file_path, signals) in &merged {
            let tier = classify(&ConflictSignals {
                branch_count: signals.branches.len(),
                pr_count: signals.pr_numbers.len(),
                touches_trunk: signals.touches_trunk,
            });
            let description = describe(file_path, signals);
            let changed = blockers::upsert_conflict_blocker(
                &tx,
                workspace,
                file_path,
                tier,
                &description,
                now,
            )?;
            if changed {
                events.push(DomainEvent::ConflictWarning {
                    file: file_path.clone(),
                    branches: signals.branches.clone(),
                    severity: tier,
                });
            }
        }

        let resolved = blockers::resolve_stale_conflict_blockers(&tx, workspace, cutoff, now)?;
        if resolved > 0 {
            debug!(workspace = %workspace, resolved, "Stale conflict blockers resolved");
        }

        tx.commit()?;
        Ok(events)
    }
}

/// Merges the branch-overlap and PR-overlap views into per-file signals.
///
/// Trunk involvement comes from a separate membership check: trunk branches
/// are excluded from the overlap grouping itself, so their presence on an
/// overlapping file is established against the unfiltered activity rows.
fn gather_signals(
    conn: &rusqlite::Connection,
    workspace: &WorkspaceId,
    cutoff: DateTime<Utc>,
) -> Result<BTreeMap<String, FileSignals>, StoreError> {
    let mut merged: BTreeMap<String, FileSignals> = BTreeMap::new();

    for overlap in activity::branch_overlaps(conn, workspace, cutoff)? {
        merged.entry(overlap.file_path).or_default().branches = overlap.branches;
    }
    for overlap in pull_requests::overlaps(conn, workspace)? {
        merged.entry(overlap.file_path).or_default().pr_numbers = overlap.pr_numbers;
    }

    if !merged.is_empty() {
        let trunk_files = activity::trunk_touched_files(conn, workspace, cutoff)?;
        for (file, signals) in merged.iter_mut() {
            signals.touches_trunk = trunk_files.contains(file);
        }
    }

    Ok(merged)
}

/// Human description for the dashboard blocker card.
fn describe(file_path: &str, signals: &FileSignals) -> String {
    let mut parts = Vec::new();
    if signals.branches.len() >= 2 {
        parts.push(format!(
            "{} active branches ({})",
            signals.branches.len(),
            signals.branches.join(", ")
        ));
    }
    if signals.pr_numbers.len() >= 2 {
        let numbers: Vec<String> = signals.pr_numbers.iter().map(PrNumber::to_string).collect();
        parts.push(format!(
            "{} open pull requests ({})",
            signals.pr_numbers.len(),
            numbers.join(", ")
        ));
    }
    if signals.touches_trunk {
        parts.push("recent trunk activity".to_string());
    }
    format!("{} is touched by {}", file_path, parts.join(" and "))
}
