//! Push payload parsing and classification.
//!
//! The upstream delivers a JSON document per push with the ref, the old and
//! new head commits, the commit list, and the repository identity. Parsing
//! validates the required fields up front and reports every missing one, so
//! a malformed delivery gets a single structured 400.

use std::collections::BTreeSet;

use serde::Deserialize;
use thiserror::Error;

/// The all-zero commit id marking an absent endpoint (branch create/delete).
pub const ZERO_SHA: &str = "0000000000000000000000000000000000000000";

/// Error for a payload that is valid JSON but missing required fields.
#[derive(Debug, Error)]
#[error("push payload missing required fields: {}", missing.join(", "))]
pub struct PayloadError {
    /// Dotted paths of the absent fields.
    pub missing: Vec<&'static str>,
}

/// File deltas of a single commit.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommitFiles {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub added: Vec<String>,
    #[serde(default)]
    pub modified: Vec<String>,
    #[serde(default)]
    pub removed: Vec<String>,
    #[serde(default)]
    pub author: Option<CommitAuthor>,
}

/// Commit author descriptor; only the username is consumed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommitAuthor {
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawRepository {
    id: Option<i64>,
    full_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawPush {
    #[serde(rename = "ref")]
    git_ref: Option<String>,
    before: Option<String>,
    after: Option<String>,
    #[serde(default)]
    commits: Vec<CommitFiles>,
    head_commit: Option<CommitFiles>,
    repository: Option<RawRepository>,
}

/// A validated push event.
#[derive(Debug, Clone)]
pub struct PushEvent {
    pub git_ref: String,
    pub before: String,
    pub after: String,
    pub commits: Vec<CommitFiles>,
    pub head_commit: Option<CommitFiles>,
    pub repo_id: i64,
    pub repo_full_name: String,
}

/// Shape of a push, derived from its endpoints and commit list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushKind {
    /// `after` is the zero id: the branch was deleted.
    BranchDelete,
    /// `before` is the zero id: the branch was created.
    BranchCreate,
    /// Both endpoints real but the commit list is empty: history was
    /// rewritten, and file deltas come from the head commit.
    ForcePush,
    /// An ordinary fast-forward push.
    Update,
}

/// Parses and validates a push payload.
///
/// `Err(PayloadError)` lists every missing required field; JSON syntax errors
/// surface separately through `serde_json::Error` at the call site.
pub fn parse_push(body: &serde_json::Value) -> Result<PushEvent, PayloadError> {
    let raw: RawPush = serde_json::from_value(body.clone()).unwrap_or(RawPush {
        git_ref: None,
        before: None,
        after: None,
        commits: Vec::new(),
        head_commit: None,
        repository: None,
    });

    let mut missing = Vec::new();
    if raw.git_ref.is_none() {
        missing.push("ref");
    }
    if raw.after.is_none() {
        missing.push("after");
    }
    match &raw.repository {
        None => {
            missing.push("repository.id");
            missing.push("repository.full_name");
        }
        Some(repo) => {
            if repo.id.is_none() {
                missing.push("repository.id");
            }
            if repo.full_name.is_none() {
                missing.push("repository.full_name");
            }
        }
    }

    match (raw.git_ref, raw.after, raw.repository) {
        (
            Some(git_ref),
            Some(after),
            Some(RawRepository {
                id: Some(repo_id),
                full_name: Some(repo_full_name),
            }),
        ) => Ok(PushEvent {
            git_ref,
            before: raw.before.unwrap_or_else(|| ZERO_SHA.to_string()),
            after,
            commits: raw.commits,
            head_commit: raw.head_commit,
            repo_id,
            repo_full_name,
        }),
        _ => Err(PayloadError { missing }),
    }
}

impl PushEvent {
    /// The branch name, when the ref points at one.
    pub fn branch(&self) -> Option<&str> {
        self.git_ref.strip_prefix("refs/heads/")
    }

    /// Classifies the push from its endpoints and commit list.
    pub fn kind(&self) -> PushKind {
        if self.after == ZERO_SHA {
            PushKind::BranchDelete
        } else if self.before == ZERO_SHA {
            PushKind::BranchCreate
        } else if self.commits.is_empty() {
            PushKind::ForcePush
        } else {
            PushKind::Update
        }
    }

    /// Union of added, modified, and removed paths across the relevant
    /// commits (the head commit alone on a force push), sorted and deduped.
    pub fn changed_files(&self) -> Vec<String> {
        let mut files = BTreeSet::new();
        let commits: &[CommitFiles] = if self.kind() == PushKind::ForcePush {
            self.head_commit.as_slice()
        } else {
            &self.commits
        };
        for commit in commits {
            for path in commit
                .added
                .iter()
                .chain(commit.modified.iter())
                .chain(commit.removed.iter())
            {
                files.insert(path.clone());
            }
        }
        files.into_iter().collect()
    }

    /// Distinct commit author usernames, lowercased, for member activity
    /// refresh. Follows `changed_files` in honoring the force-push source.
    pub fn author_usernames(&self) -> Vec<String> {
        let commits: &[CommitFiles] = if self.kind() == PushKind::ForcePush {
            self.head_commit.as_slice()
        } else {
            &self.commits
        };
        let names: BTreeSet<String> = commits
            .iter()
            .filter_map(|c| c.author.as_ref())
            .filter_map(|a| a.username.as_deref())
            .map(str::to_lowercase)
            .collect();
        names.into_iter().collect()
    }
}
