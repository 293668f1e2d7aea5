//! Pull-request operations

use std::sync::Arc;

use agora_core::{IssueRef, PostResult, RepoRef, Result};
use async_trait::async_trait;
use tracing::{debug, info};

use crate::api::GitHubApi;
use crate::messages::{issue_ready_comment, issue_ready_marker};

#[async_trait]
pub trait PrOperations: Send + Sync {
    /// Open pull requests that reference the issue
    async fn linked_pull_requests(&self, issue: &IssueRef) -> Result<Vec<u64>>;

    /// Tell a pull request its issue is ready; once per (PR, issue) pair
    async fn notify_issue_ready(
        &self,
        repo: &RepoRef,
        pr_number: u64,
        issue_number: u64,
    ) -> Result<PostResult>;
}

/// [`PrOperations`] over a [`GitHubApi`]
pub struct GitHubPulls<A> {
    api: Arc<A>,
}

impl<A: GitHubApi> GitHubPulls<A> {
    pub fn new(api: Arc<A>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl<A: GitHubApi> PrOperations for GitHubPulls<A> {
    async fn linked_pull_requests(&self, issue: &IssueRef) -> Result<Vec<u64>> {
        self.api.list_linked_pull_requests(issue).await
    }

    async fn notify_issue_ready(
        &self,
        repo: &RepoRef,
        pr_number: u64,
        issue_number: u64,
    ) -> Result<PostResult> {
        // Pull-request conversation comments live on the issue endpoints
        let pr = repo.issue(pr_number);
        let marker = issue_ready_marker(issue_number);

        let comments = self.api.list_comments(&pr).await?;
        if comments.iter().any(|c| c.body.contains(&marker)) {
            debug!(pr = %pr, issue = issue_number, "Ready notification already posted");
            return Ok(PostResult::AlreadyExists);
        }

        self.api
            .create_comment(&pr, &issue_ready_comment(issue_number))
            .await?;
        info!(pr = %pr, issue = issue_number, "Notified linked PR");
        Ok(PostResult::Posted)
    }
}
