//! Low-level GitHub REST abstraction

use agora_core::{IssueRef, Reaction, RepoRef, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Issue state as far as governance cares
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueDetails {
    pub number: u64,
    pub open: bool,
    pub labels: Vec<String>,
}

/// A `labeled` event from the issue timeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelEvent {
    pub label: String,
    pub created_at: DateTime<Utc>,
}

/// An issue or pull-request comment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub id: u64,
    pub author: String,
    pub author_is_bot: bool,
    pub body: String,
}

/// A reaction with its author's account type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserReaction {
    pub reaction: Reaction,
    pub user_is_bot: bool,
}

/// Why an issue is being closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    NotPlanned,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotPlanned => "not_planned",
        }
    }
}

/// Trait for GitHub REST calls (allows mocking in tests)
///
/// Listing calls return every page. Pull requests never appear in issue
/// listings.
#[async_trait]
pub trait GitHubApi: Send + Sync {
    /// Repositories reachable with this credential
    async fn list_repositories(&self) -> Result<Vec<RepoRef>>;

    /// Raw file content from the default branch; `None` if absent
    async fn get_file(&self, repo: &RepoRef, path: &str) -> Result<Option<String>>;

    /// Open issues carrying the given label
    async fn list_issues_with_label(&self, repo: &RepoRef, label: &str) -> Result<Vec<u64>>;

    async fn get_issue(&self, issue: &IssueRef) -> Result<IssueDetails>;

    /// `labeled` events, oldest first
    async fn list_label_events(&self, issue: &IssueRef) -> Result<Vec<LabelEvent>>;

    /// Comments, oldest first
    async fn list_comments(&self, issue: &IssueRef) -> Result<Vec<Comment>>;

    async fn list_comment_reactions(
        &self,
        repo: &RepoRef,
        comment_id: u64,
    ) -> Result<Vec<UserReaction>>;

    /// Reactions on the issue body
    async fn list_issue_reactions(&self, issue: &IssueRef) -> Result<Vec<UserReaction>>;

    async fn add_labels(&self, issue: &IssueRef, labels: &[String]) -> Result<()>;

    /// Removing a label that is not present succeeds
    async fn remove_label(&self, issue: &IssueRef, label: &str) -> Result<()>;

    /// Returns the new comment id
    async fn create_comment(&self, issue: &IssueRef, body: &str) -> Result<u64>;

    async fn close_issue(&self, issue: &IssueRef, reason: CloseReason) -> Result<()>;

    /// Open pull requests that cross-reference the issue
    async fn list_linked_pull_requests(&self, issue: &IssueRef) -> Result<Vec<u64>>;
}
