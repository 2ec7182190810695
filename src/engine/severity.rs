//! Severity classification for file conflict signals.
//!
//! Pure and deterministic; no I/O. The tiers encode how close a file is to a
//! real merge collision: overlapping open PRs are a confirmed incoming
//! collision, trunk involvement escalates anything, and branch fan-out
//! escalates by degree.

use crate::types::Severity;

/// Per-file conflict signals gathered by the conflict engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConflictSignals {
    /// Distinct non-trunk branches touching the file inside the window.
    pub branch_count: usize,
    /// Distinct open PRs listing the file.
    pub pr_count: usize,
    /// Whether a trunk branch touched the file inside the window.
    pub touches_trunk: bool,
}

/// Classifies conflict signals into a severity tier.
///
/// Rules in precedence order, first match wins:
/// 1. ≥2 open PRs touch the file → HIGH
/// 2. trunk touched the file → HIGH
/// 3. ≥3 branches → HIGH
/// 4. exactly 2 branches → MEDIUM
/// 5. otherwise → LOW
pub fn classify(signals: &ConflictSignals) -> Severity {
    if signals.pr_count >= 2 {
        Severity::High
    } else if signals.touches_trunk {
        Severity::High
    } else if signals.branch_count >= 3 {
        Severity::High
    } else if signals.branch_count == 2 {
        Severity::Medium
    } else {
        Severity::Low
    }
}
