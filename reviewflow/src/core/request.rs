//! The pull request review request handed to the trigger client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, ReviewflowError};

/// Metadata describing the pull request to review.
///
/// Immutable once built. The wire names of the author/title/state/created
/// fields carry a `pr_` prefix; the unprefixed names are accepted on input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineRequest {
    /// Repository name (without owner).
    pub repository: String,
    /// Pull request number.
    pub pull_request_number: u64,
    /// Repository owner.
    pub owner: String,
    /// Head branch. May be empty for detached-head events.
    #[serde(default)]
    pub branch: String,
    /// Pull request author.
    #[serde(rename = "pr_author", alias = "author")]
    pub author: String,
    /// Pull request title.
    #[serde(rename = "pr_title", alias = "title")]
    pub title: String,
    /// Pull request state (e.g. `open`).
    #[serde(rename = "pr_state", alias = "state")]
    pub state: String,
    /// When the pull request was opened.
    #[serde(rename = "pr_created_at", alias = "created_at")]
    pub created_at: DateTime<Utc>,
    /// Head commit SHA.
    pub commit_sha: String,
}

impl PipelineRequest {
    /// Creates a request with the identifying fields set and the rest empty.
    ///
    /// Use the `with_*` methods to fill in the remaining metadata.
    #[must_use]
    pub fn new(repository: impl Into<String>, pull_request_number: u64, owner: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            pull_request_number,
            owner: owner.into(),
            branch: String::new(),
            author: String::new(),
            title: String::new(),
            state: String::new(),
            created_at: Utc::now(),
            commit_sha: String::new(),
        }
    }

    /// Sets the branch.
    #[must_use]
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    /// Sets the author.
    #[must_use]
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    /// Sets the title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Sets the state.
    #[must_use]
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = state.into();
        self
    }

    /// Sets the creation timestamp.
    #[must_use]
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Sets the commit SHA.
    #[must_use]
    pub fn with_commit_sha(mut self, sha: impl Into<String>) -> Self {
        self.commit_sha = sha.into();
        self
    }

    /// Parses a request from JSON.
    pub fn from_json(raw: &str) -> Result<Self> {
        let request: Self = serde_json::from_str(raw)
            .map_err(|e| ReviewflowError::invalid_input(format!("malformed request: {e}")))?;
        Ok(request)
    }

    /// Checks that every required field is present.
    ///
    /// All string fields must be non-blank except `branch`.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("repository", &self.repository),
            ("owner", &self.owner),
            ("pr_author", &self.author),
            ("pr_title", &self.title),
            ("pr_state", &self.state),
            ("commit_sha", &self.commit_sha),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();

        if !missing.is_empty() {
            return Err(ReviewflowError::invalid_input(format!(
                "missing request fields: {}",
                missing.join(", ")
            )));
        }
        if self.pull_request_number == 0 {
            return Err(ReviewflowError::invalid_input(
                "pull_request_number must be positive",
            ));
        }
        Ok(())
    }

    /// Returns `owner/repository`.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repository)
    }
}
