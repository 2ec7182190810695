//! In-process event bus for dashboard fan-out.
//!
//! The bus keeps two in-memory mappings: workspace → subscriber set, and
//! subscriber → workspace. Subscribers register first (unbound) and are
//! bound to a workspace afterwards; an unbound subscriber receives nothing.
//!
//! Delivery is best-effort and non-durable. `broadcast` serializes the event
//! once and hands it to every bound subscriber whose channel has capacity;
//! a full or closed channel is logged and skipped. Engines call `broadcast`
//! only after their transaction has committed, so nothing a dashboard sees
//! can be rolled back.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, warn};

use crate::types::{FeatureId, RiskLevel, Severity, WorkspaceId};

/// Capacity of each subscriber's outbound channel. A dashboard that stops
/// draining loses events rather than stalling the broadcast.
const SUBSCRIBER_CHANNEL_BUFFER: usize = 64;

/// Domain events pushed to dashboard clients.
///
/// The serialized form is the wire contract: a `type` tag plus camelCase
/// payload fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum DomainEvent {
    /// A file is at risk of a cross-branch or cross-PR conflict.
    #[serde(rename = "CONFLICT_WARNING")]
    ConflictWarning {
        file: String,
        branches: Vec<String>,
        severity: Severity,
    },

    /// A feature became blocked on incomplete dependencies.
    #[serde(rename = "BLOCKER_CREATED")]
    BlockerCreated {
        #[serde(rename = "featureId")]
        feature_id: FeatureId,
        #[serde(rename = "featureName")]
        feature_name: String,
        #[serde(rename = "blockedBy")]
        blocked_by: Vec<String>,
    },

    /// The workspace health score was recomputed.
    #[serde(rename = "HEALTH_UPDATE")]
    HealthUpdate {
        score: i64,
        #[serde(rename = "riskLevel")]
        risk_level: RiskLevel,
    },
}

/// Identifier of a connected subscriber, unique for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// A registered subscriber's receiving half.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriberId,
    /// Serialized events; one JSON document per message.
    pub receiver: mpsc::Receiver<String>,
}

#[derive(Default)]
struct BusInner {
    /// Bound subscribers, grouped by workspace.
    rooms: HashMap<WorkspaceId, HashMap<SubscriberId, mpsc::Sender<String>>>,
    /// Reverse mapping for unregistration.
    bindings: HashMap<SubscriberId, WorkspaceId>,
    /// Registered but not yet bound subscribers.
    unbound: HashMap<SubscriberId, mpsc::Sender<String>>,
}

/// Per-workspace broadcast hub.
///
/// Mutation goes through the single `RwLock`; broadcast holds a read lock
/// and tolerates subscribers departing concurrently (their channels close,
/// the send is skipped).
#[derive(Default)]
pub struct EventBus {
    inner: RwLock<BusInner>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new, unbound subscriber.
    pub async fn register(&self) -> Subscription {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CHANNEL_BUFFER);
        self.inner.write().await.unbound.insert(id, tx);
        debug!(subscriber = %id, "Subscriber registered");
        Subscription { id, receiver: rx }
    }

    /// Binds a registered subscriber to a workspace.
    ///
    /// Returns `false` if the subscriber is unknown or already bound.
    pub async fn bind(&self, id: SubscriberId, workspace: &WorkspaceId) -> bool {
        let mut inner = self.inner.write().await;
        let Some(tx) = inner.unbound.remove(&id) else {
            return false;
        };
        inner.rooms.entry(workspace.clone()).or_default().insert(id, tx);
        inner.bindings.insert(id, workspace.clone());
        debug!(subscriber = %id, workspace = %workspace, "Subscriber bound");
        true
    }

    /// Removes a subscriber, bound or not.
    pub async fn unregister(&self, id: SubscriberId) {
        let mut inner = self.inner.write().await;
        inner.unbound.remove(&id);
        if let Some(workspace) = inner.bindings.remove(&id)
            && let Some(room) = inner.rooms.get_mut(&workspace)
        {
            room.remove(&id);
            if room.is_empty() {
                inner.rooms.remove(&workspace);
            }
        }
        debug!(subscriber = %id, "Subscriber removed");
    }

    /// Serializes `event` once and delivers it to every subscriber bound to
    /// `workspace` whose channel is ready. Returns the number of deliveries.
    pub async fn broadcast(&self, workspace: &WorkspaceId, event: &DomainEvent) -> usize {
        let payload = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(e) => {
                warn!(workspace = %workspace, error = %e, "Failed to serialize event");
                return 0;
            }
        };

        let inner = self.inner.read().await;
        let Some(room) = inner.rooms.get(workspace) else {
            return 0;
        };

        let mut delivered = 0;
        for (id, tx) in room {
            match tx.try_send(payload.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    // Slow or departed subscriber; the event is dropped for
                    // that client only.
                    warn!(subscriber = %id, workspace = %workspace, error = %e,
                          "Dropping event for subscriber");
                }
            }
        }
        delivered
    }

    /// Number of subscribers currently bound to the workspace.
    pub async fn subscriber_count(&self, workspace: &WorkspaceId) -> usize {
        self.inner
            .read()
            .await
            .rooms
            .get(workspace)
            .map_or(0, HashMap::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn health_event(score: i64) -> DomainEvent {
        DomainEvent::HealthUpdate {
            score,
            risk_level: RiskLevel::Healthy,
        }
    }

    #[test]
    fn events_serialize_to_wire_contract() {
        let event = DomainEvent::ConflictWarning {
            file: "a.js".into(),
            branches: vec!["feat-1".into(), "feat-2".into()],
            severity: Severity::High,
        };
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&event).unwrap()).unwrap();
        assert_eq!(json["type"], "CONFLICT_WARNING");
        assert_eq!(json["file"], "a.js");
        assert_eq!(json["severity"], "HIGH");
        assert_eq!(json["branches"][1], "feat-2");

        let event = DomainEvent::BlockerCreated {
            feature_id: FeatureId::new("f2"),
            feature_name: "search".into(),
            blocked_by: vec!["auth".into()],
        };
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&event).unwrap()).unwrap();
        assert_eq!(json["type"], "BLOCKER_CREATED");
        assert_eq!(json["featureId"], "f2");
        assert_eq!(json["featureName"], "search");
        assert_eq!(json["blockedBy"][0], "auth");

        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&health_event(88)).unwrap()).unwrap();
        assert_eq!(json["type"], "HEALTH_UPDATE");
        assert_eq!(json["score"], 88);
        assert_eq!(json["riskLevel"], "HEALTHY");
    }

    #[tokio::test]
    async fn bound_subscriber_receives_broadcast() {
        let bus = EventBus::new();
        let ws = WorkspaceId::new("ws");

        let mut sub = bus.register().await;
        assert!(bus.bind(sub.id, &ws).await);

        let delivered = bus.broadcast(&ws, &health_event(70)).await;
        assert_eq!(delivered, 1);

        let raw = sub.receiver.recv().await.unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["score"], 70);
    }

    #[tokio::test]
    async fn unbound_subscriber_receives_nothing() {
        let bus = EventBus::new();
        let ws = WorkspaceId::new("ws");

        let mut sub = bus.register().await;
        assert_eq!(bus.broadcast(&ws, &health_event(70)).await, 0);
        assert!(sub.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn broadcast_is_scoped_to_the_workspace() {
        let bus = EventBus::new();
        let ws_a = WorkspaceId::new("a");
        let ws_b = WorkspaceId::new("b");

        let mut sub_a = bus.register().await;
        let mut sub_b = bus.register().await;
        bus.bind(sub_a.id, &ws_a).await;
        bus.bind(sub_b.id, &ws_b).await;

        assert_eq!(bus.broadcast(&ws_a, &health_event(70)).await, 1);
        assert!(sub_a.receiver.try_recv().is_ok());
        assert!(sub_b.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn departed_subscriber_does_not_fail_broadcast() {
        let bus = EventBus::new();
        let ws = WorkspaceId::new("ws");

        let sub_gone = bus.register().await;
        bus.bind(sub_gone.id, &ws).await;
        let mut sub_live = bus.register().await;
        bus.bind(sub_live.id, &ws).await;

        // The first subscriber's receiver is dropped without unregistering,
        // simulating an abrupt disconnect mid-broadcast.
        drop(sub_gone.receiver);

        let delivered = bus.broadcast(&ws, &health_event(50)).await;
        assert_eq!(delivered, 1);
        assert!(sub_live.receiver.try_recv().is_ok());
    }

    #[tokio::test]
    async fn unregister_removes_binding() {
        let bus = EventBus::new();
        let ws = WorkspaceId::new("ws");

        let sub = bus.register().await;
        bus.bind(sub.id, &ws).await;
        assert_eq!(bus.subscriber_count(&ws).await, 1);

        bus.unregister(sub.id).await;
        assert_eq!(bus.subscriber_count(&ws).await, 0);
        assert_eq!(bus.broadcast(&ws, &health_event(50)).await, 0);
    }

    #[tokio::test]
    async fn bind_rejects_unknown_and_double_binding() {
        let bus = EventBus::new();
        let ws = WorkspaceId::new("ws");

        let sub = bus.register().await;
        assert!(bus.bind(sub.id, &ws).await);
        assert!(!bus.bind(sub.id, &ws).await);
        assert!(!bus.bind(SubscriberId(9999), &ws).await);
    }
}
