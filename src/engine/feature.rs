//! Feature progress and dependency reconciliation.
//!
//! Every non-COMPLETE feature of the workspace is evaluated on every push:
//! a feature with incomplete upstream dependencies is BLOCKED and carries a
//! DEPENDENCY_BLOCK blocker; a blocked feature whose dependencies have all
//! completed returns to ACTIVE and the blocker is resolved. Independently,
//! each push nudges completion forward by a fixed delta, stopping short of
//! 100; the final step is reserved for an explicit merge to trunk.
//!
//! The health engine runs after every reconciliation pass.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::bus::{DomainEvent, EventBus};
use crate::store::{Database, StoreError, blockers, features};
use crate::types::{FeatureStatus, WorkspaceId};

use super::health::HealthEngine;

/// Reconciles feature state for one workspace.
#[derive(Clone)]
pub struct FeatureEngine {
    db: Database,
    bus: Arc<EventBus>,
    health: HealthEngine,
}

impl FeatureEngine {
    pub fn new(db: Database, bus: Arc<EventBus>) -> Self {
        let health = HealthEngine::new(db.clone(), Arc::clone(&bus));
        FeatureEngine { db, bus, health }
    }

    /// Runs the reconciliation pass for a push identified by `commit_sha`,
    /// then recomputes workspace health.
    ///
    /// Errors are logged and swallowed; the next push reprocesses.
    pub async fn run(&self, workspace: &WorkspaceId, _modified_files: &[String], commit_sha: &str) {
        match self.reconcile(workspace) {
            Ok(events) => {
                debug!(
                    workspace = %workspace,
                    commit = %commit_sha,
                    new_blocks = events.len(),
                    "Feature reconciliation complete"
                );
                for event in &events {
                    self.bus.broadcast(workspace, event).await;
                }
            }
            Err(e) => {
                warn!(
                    workspace = %workspace,
                    commit = %commit_sha,
                    error = %e,
                    "Feature reconciliation failed; transaction rolled back"
                );
                return;
            }
        }

        self.health.run(workspace).await;
    }

    fn reconcile(&self, workspace: &WorkspaceId) -> Result<Vec<DomainEvent>, StoreError> {
        let now = Utc::now();
        let mut guard = self.db.conn()?;
        let tx = guard.transaction()?;

        let mut events = Vec::new();
        for feature in features::incomplete(&tx, workspace)? {
            let unmet = features::incomplete_dependencies(&tx, &feature.id)?;

            if !unmet.is_empty() {
                if feature.status != FeatureStatus::Blocked {
                    features::set_status(&tx, &feature.id, FeatureStatus::Blocked)?;
                }
                let names: Vec<String> = unmet.into_iter().map(|(_, name)| name).collect();
                let description =
                    format!("Waiting on incomplete dependencies: {}", names.join(", "));
                let changed = blockers::upsert_dependency_blocker(
                    &tx,
                    workspace,
                    &feature.id,
                    &description,
                    now,
                )?;
                if changed {
                    events.push(DomainEvent::BlockerCreated {
                        feature_id: feature.id.clone(),
                        feature_name: feature.name.clone(),
                        blocked_by: names,
                    });
                }
            } else if feature.status == FeatureStatus::Blocked {
                features::set_status(&tx, &feature.id, FeatureStatus::Active)?;
                blockers::resolve_dependency_blocker(&tx, workspace, &feature.id, now)?;
            }

            features::bump_completion(&tx, &feature.id)?;
        }

        tx.commit()?;
        Ok(events)
    }
}
