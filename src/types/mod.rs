//! Core domain types for the push-intelligence pipeline.
//!
//! This module contains the fundamental types used throughout the application:
//! newtype identifiers that prevent accidental mixing, and the domain
//! enumerations and entities the engines operate on.

pub mod domain;
pub mod ids;

// Re-export commonly used types at the module level
pub use domain::{
    Blocker, BlockerKind, DEFAULT_ACTIVITY_WINDOW_HOURS, Feature, FeatureStatus, PrStatus,
    Priority, RiskLevel, Severity, TRUNK_BRANCHES, Workspace, is_trunk,
};
pub use ids::{DeliveryId, FeatureId, PrNumber, WorkspaceId};
