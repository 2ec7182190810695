//! Workspace health recomputation.
//!
//! A pure scoring formula over an aggregate snapshot: feature completion
//! pulls the score up, unresolved blockers and inactive members pull it
//! down. The score is persisted on the workspace and pushed to dashboards
//! as a `HEALTH_UPDATE` after the transaction commits.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, warn};

use crate::bus::{DomainEvent, EventBus};
use crate::store::{Database, StoreError, blockers, features, members, workspaces};
use crate::types::{RiskLevel, WorkspaceId};

/// Aggregate inputs to the score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthInputs {
    /// Mean completion percentage across all features (0 when none).
    pub feature_completion_avg: f64,
    /// Unresolved blockers of every kind.
    pub active_blocker_total: i64,
    /// Unresolved FILE_CONFLICT_RISK blockers (counted again on top of the
    /// total: conflicts weigh extra).
    pub conflict_blocker_count: i64,
    /// Members with no qualifying activity inside the workspace window.
    pub inactive_member_count: i64,
}

/// Computes the health score, clamped to `[0, 100]`, rounded half-up.
pub fn compute_score(inputs: &HealthInputs) -> i64 {
    let raw = 0.4 * inputs.feature_completion_avg
        - 5.0 * inputs.active_blocker_total as f64
        - 3.0 * inputs.conflict_blocker_count as f64
        - 5.0 * inputs.inactive_member_count as f64;
    (raw.round() as i64).clamp(0, 100)
}

/// Maps a score onto its risk tier.
pub fn risk_level(score: i64) -> RiskLevel {
    if score >= 80 {
        RiskLevel::Healthy
    } else if score >= 50 {
        RiskLevel::Warning
    } else {
        RiskLevel::Critical
    }
}

/// Recomputes and persists the health score of one workspace.
#[derive(Clone)]
pub struct HealthEngine {
    db: Database,
    bus: Arc<EventBus>,
}

impl HealthEngine {
    pub fn new(db: Database, bus: Arc<EventBus>) -> Self {
        HealthEngine { db, bus }
    }

    /// Runs the recomputation. Errors are logged, never propagated: the next
    /// engine run recomputes from scratch.
    pub async fn run(&self, workspace: &WorkspaceId) {
        let event = match self.recompute(workspace) {
            Ok(event) => event,
            Err(e) => {
                warn!(workspace = %workspace, error = %e, "Health recomputation failed");
                return;
            }
        };

        self.bus.broadcast(workspace, &event).await;
    }

    fn recompute(&self, workspace: &WorkspaceId) -> Result<DomainEvent, StoreError> {
        let mut guard = self.db.conn()?;
        let tx = guard.transaction()?;

        let window_hours = workspaces::activity_window_hours(&tx, workspace)?;
        let cutoff = Utc::now() - Duration::hours(window_hours);

        let feature_completion_avg = features::completion_avg(&tx, workspace)?;
        let (active_blocker_total, conflict_blocker_count) =
            blockers::unresolved_counts(&tx, workspace)?;
        let inactive_member_count = members::inactive_count(&tx, workspace, cutoff)?;

        let inputs = HealthInputs {
            feature_completion_avg,
            active_blocker_total,
            conflict_blocker_count,
            inactive_member_count,
        };
        let score = compute_score(&inputs);
        workspaces::set_health_score(&tx, workspace, score)?;

        tx.commit()?;

        debug!(
            workspace = %workspace,
            score,
            blockers = active_blocker_total,
            inactive = inactive_member_count,
            "Health recomputed"
        );

        Ok(DomainEvent::HealthUpdate {
            score,
            risk_level: risk_level(score),
        })
    }
}
