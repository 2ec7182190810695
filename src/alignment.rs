//! Interface to the external language-model alignment analyzer.
//!
//! The analyzer itself is an external collaborator; this module defines the
//! port, the deterministic neutral result, and the resilience wrapper around
//! any concrete client: a hard per-call timeout, at most one retry on
//! transient error, a per-workspace sliding-window quota, and a fall back to
//! the neutral result whenever the upstream cannot answer in time.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::ratelimit::SlidingWindow;
use crate::types::{Severity, WorkspaceId};

/// Errors a concrete analyzer client may surface.
#[derive(Debug, Error)]
pub enum AlignmentError {
    /// The endpoint answered with a transient failure (5xx, disconnect).
    #[error("alignment endpoint unavailable: {0}")]
    Unavailable(String),

    /// The endpoint rejected the request outright.
    #[error("alignment request rejected: {0}")]
    Rejected(String),
}

/// Outcome of an alignment analysis over a push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignmentReport {
    pub drift_detected: bool,
    pub severity: Severity,
    pub summary: String,
}

impl AlignmentReport {
    /// The deterministic result used whenever the upstream cannot answer:
    /// no drift, lowest severity.
    pub fn neutral() -> Self {
        AlignmentReport {
            drift_detected: false,
            severity: Severity::Low,
            summary: "alignment analysis unavailable".to_string(),
        }
    }
}

/// Port for the upstream analyzer.
#[async_trait]
pub trait AlignmentAnalyzer: Send + Sync {
    /// Analyzes a push's diff summary for drift against the workspace's
    /// stated goals.
    async fn analyze(
        &self,
        workspace: &WorkspaceId,
        diff_summary: &str,
    ) -> Result<AlignmentReport, AlignmentError>;
}

/// Resilience wrapper: timeout, single retry, per-workspace quota,
/// neutral fallback.
pub struct GuardedAnalyzer<A> {
    inner: A,
    timeout: Duration,
    max_retries: u32,
    retry_delay: Duration,
    quota: SlidingWindow,
}

impl<A: AlignmentAnalyzer> GuardedAnalyzer<A> {
    pub fn new(
        inner: A,
        timeout: Duration,
        max_retries: u32,
        retry_delay: Duration,
        quota: SlidingWindow,
    ) -> Self {
        GuardedAnalyzer {
            inner,
            timeout,
            max_retries,
            retry_delay,
            quota,
        }
    }

    /// Runs the analysis, degrading to [`AlignmentReport::neutral`] when the
    /// workspace is over quota, the call times out, or retries are exhausted.
    pub async fn analyze_or_neutral(
        &self,
        workspace: &WorkspaceId,
        diff_summary: &str,
    ) -> AlignmentReport {
        if !self.quota.check(workspace.as_str()) {
            debug!(workspace = %workspace, "Alignment quota exhausted; using neutral result");
            return AlignmentReport::neutral();
        }

        let mut attempt = 0;
        loop {
            match tokio::time::timeout(self.timeout, self.inner.analyze(workspace, diff_summary))
                .await
            {
                Ok(Ok(report)) => return report,
                Ok(Err(AlignmentError::Rejected(reason))) => {
                    warn!(workspace = %workspace, %reason, "Alignment request rejected");
                    return AlignmentReport::neutral();
                }
                Ok(Err(AlignmentError::Unavailable(reason))) => {
                    warn!(workspace = %workspace, %reason, attempt, "Alignment endpoint unavailable");
                }
                Err(_) => {
                    warn!(workspace = %workspace, attempt, "Alignment call timed out");
                }
            }

            if attempt >= self.max_retries {
                return AlignmentReport::neutral();
            }
            attempt += 1;
            tokio::time::sleep(self.retry_delay).await;
        }
    }
}
