//! Domain enumerations and entities.
//!
//! String representations (`as_str` / `parse`) are the forms persisted in the
//! store and emitted on the wire, so they are part of the external contract.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{FeatureId, WorkspaceId};

/// The integration trunk: branches excluded from cross-branch overlap
/// detection and targeted by merge-to-trunk completion.
pub const TRUNK_BRANCHES: [&str; 2] = ["main", "master"];

/// Default per-workspace activity window, in hours.
///
/// Bounds which file-activity rows are considered live for conflict
/// detection and member inactivity.
pub const DEFAULT_ACTIVITY_WINDOW_HOURS: i64 = 72;

/// Returns true if the branch is one of the trunk names.
pub fn is_trunk(branch: &str) -> bool {
    TRUNK_BRANCHES.contains(&branch)
}

/// Severity tier of a blocker.
///
/// Ordered so that `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "LOW" => Some(Severity::Low),
            "MEDIUM" => Some(Severity::Medium),
            "HIGH" => Some(Severity::High),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Risk tier derived from the workspace health score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Healthy,
    Warning,
    Critical,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Healthy => "HEALTHY",
            RiskLevel::Warning => "WARNING",
            RiskLevel::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Feature lifecycle status.
///
/// `Complete` is terminal; the BLOCKED/ACTIVE transitions are driven solely
/// by the state of upstream dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FeatureStatus {
    Active,
    Blocked,
    Complete,
}

impl FeatureStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FeatureStatus::Active => "ACTIVE",
            FeatureStatus::Blocked => "BLOCKED",
            FeatureStatus::Complete => "COMPLETE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(FeatureStatus::Active),
            "BLOCKED" => Some(FeatureStatus::Blocked),
            "COMPLETE" => Some(FeatureStatus::Complete),
            _ => None,
        }
    }
}

/// Feature priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "LOW",
            Priority::Medium => "MEDIUM",
            Priority::High => "HIGH",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "LOW" => Some(Priority::Low),
            "MEDIUM" => Some(Priority::Medium),
            "HIGH" => Some(Priority::High),
            _ => None,
        }
    }
}

/// Pull request status as reported by the upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrStatus {
    Open,
    Merged,
    Closed,
}

impl PrStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PrStatus::Open => "open",
            PrStatus::Merged => "merged",
            PrStatus::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(PrStatus::Open),
            "merged" => Some(PrStatus::Merged),
            "closed" => Some(PrStatus::Closed),
            _ => None,
        }
    }
}

/// Discriminant of the blocker union.
///
/// The `reference_id` of a blocker is polymorphic over this kind: a file path
/// for conflict risks, a feature id for dependency blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockerKind {
    FileConflictRisk,
    DependencyBlock,
    Inactivity,
    AlignmentDrift,
}

impl BlockerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BlockerKind::FileConflictRisk => "FILE_CONFLICT_RISK",
            BlockerKind::DependencyBlock => "DEPENDENCY_BLOCK",
            BlockerKind::Inactivity => "INACTIVITY",
            BlockerKind::AlignmentDrift => "ALIGNMENT_DRIFT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "FILE_CONFLICT_RISK" => Some(BlockerKind::FileConflictRisk),
            "DEPENDENCY_BLOCK" => Some(BlockerKind::DependencyBlock),
            "INACTIVITY" => Some(BlockerKind::Inactivity),
            "ALIGNMENT_DRIFT" => Some(BlockerKind::AlignmentDrift),
            _ => None,
        }
    }
}

impl fmt::Display for BlockerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A tracked workspace: the tenant boundary tied to one upstream repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Workspace {
    pub id: WorkspaceId,
    /// Numeric upstream repository id; stable across renames.
    pub github_repo_id: i64,
    pub repo_full_name: String,
    pub dashboard_key: String,
    pub activity_window_hours: i64,
    pub health_score: i64,
}

/// A tracked feature within a workspace. Mutated by the feature engine only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Feature {
    pub id: FeatureId,
    pub workspace_id: WorkspaceId,
    pub name: String,
    pub priority: Priority,
    pub status: FeatureStatus,
    pub completion_pct: i64,
    pub owner_uid: Option<String>,
}

/// A surfaced, user-visible impediment. Mutated by the blocker store only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Blocker {
    pub id: i64,
    pub workspace_id: WorkspaceId,
    pub kind: BlockerKind,
    pub reference_id: String,
    pub severity: Severity,
    pub description: String,
    pub resolved: bool,
}
