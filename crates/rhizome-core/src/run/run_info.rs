//! Run identity and git integration

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of one analysis run
///
/// Reported alongside the metrics, never inside the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInfo {
    /// Unique identifier for this run
    pub id: String,
    /// Analyzed root
    pub root: PathBuf,
    /// HEAD commit when the root is inside a git repository
    pub commit_sha: Option<String>,
    /// Branch name (`HEAD` when detached)
    pub branch: Option<String>,
    /// SHA-256 over the analyzed files' relative paths and contents
    pub tree_digest: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunInfo {
    /// Create a new run
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            root: root.into(),
            commit_sha: None,
            branch: None,
            tree_digest: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Set the commit SHA
    #[must_use]
    pub fn with_commit(mut self, sha: impl Into<String>) -> Self {
        self.commit_sha = Some(sha.into());
        self
    }

    /// Set the branch
    #[must_use]
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    /// Set the tree digest
    #[must_use]
    pub fn with_tree_digest(mut self, digest: impl Into<String>) -> Self {
        self.tree_digest = Some(digest.into());
        self
    }

    /// Try to populate git info from the repository containing the root
    #[must_use]
    pub fn with_git_info(mut self) -> Self {
        if let Some((sha, branch)) = git_head(&self.root) {
            self.commit_sha = Some(sha);
            self.branch = branch;
        }
        self
    }

    /// Stamp the finish time
    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Wall-clock duration, once finished
    #[must_use]
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        self.finished_at.map(|end| end - self.started_at)
    }
}

fn git_head(path: &Path) -> Option<(String, Option<String>)> {
    let repo = git2::Repository::discover(path).ok()?;
    let head = repo.head().ok()?;
    let oid = head.target()?;
    Some((oid.to_string(), head.shorthand().map(str::to_string)))
}
