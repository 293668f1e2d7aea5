//! In-memory GitHub for testing
//!
//! [`MockGitHub`] implements [`GitHubApi`] over a small store of repositories,
//! issues, comments and reactions. Every call is logged, and failures can be
//! injected per operation (optionally per target, optionally a fixed number
//! of times) to exercise retry and degradation paths.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use agora_core::{
    AgoraError, IssueRef, NetworkErrorKind, Reaction, ReactionContent, RepoRef, Result,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::api::{CloseReason, Comment, GitHubApi, IssueDetails, LabelEvent, UserReaction};

/// Operations of [`GitHubApi`], for call counting and failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    ListRepositories,
    GetFile,
    ListIssuesWithLabel,
    GetIssue,
    ListLabelEvents,
    ListComments,
    ListCommentReactions,
    ListIssueReactions,
    AddLabels,
    RemoveLabel,
    CreateComment,
    CloseIssue,
    ListLinkedPullRequests,
}

impl MockOp {
    /// Whether the operation changes issue state
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::AddLabels | Self::RemoveLabel | Self::CreateComment | Self::CloseIssue
        )
    }
}

/// Error to inject
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    Status(u16),
    /// 403 with an exhausted quota
    RateLimited,
    Network(NetworkErrorKind),
}

impl MockFailure {
    fn to_error(self) -> AgoraError {
        match self {
            Self::Status(status) => AgoraError::api(status, "injected failure"),
            Self::RateLimited => AgoraError::Api {
                status: 403,
                message: "API rate limit exceeded".to_string(),
                rate_limit_remaining: Some(0),
                retry_after: None,
            },
            Self::Network(kind) => AgoraError::Network {
                kind,
                message: "injected network failure".to_string(),
            },
        }
    }
}

/// A logged call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    pub op: MockOp,
    /// `owner/repo` or `owner/repo#n`; empty for installation-wide calls
    pub target: String,
}

#[derive(Debug)]
struct FailureRule {
    op: MockOp,
    target: Option<String>,
    failure: MockFailure,
    remaining: Option<usize>,
}

#[derive(Debug, Clone)]
struct MockIssue {
    open: bool,
    labels: Vec<String>,
    label_events: Vec<LabelEvent>,
    reactions: Vec<UserReaction>,
    linked_prs: Vec<u64>,
    close_reason: Option<CloseReason>,
}

impl MockIssue {
    fn new() -> Self {
        Self {
            open: true,
            labels: Vec::new(),
            label_events: Vec::new(),
            reactions: Vec::new(),
            linked_prs: Vec::new(),
            close_reason: None,
        }
    }
}

#[derive(Debug)]
struct MockComment {
    issue: IssueRef,
    comment: Comment,
    reactions: Vec<UserReaction>,
}

#[derive(Debug, Default)]
struct MockState {
    repos: Vec<RepoRef>,
    files: HashMap<(RepoRef, String), String>,
    issues: BTreeMap<IssueRef, MockIssue>,
    comments: Vec<MockComment>,
    next_comment_id: u64,
    calls: Vec<MockCall>,
    failures: Vec<FailureRule>,
}

impl MockState {
    fn record(&mut self, op: MockOp, target: String) -> Result<()> {
        self.calls.push(MockCall {
            op,
            target: target.clone(),
        });

        let position = self.failures.iter().position(|rule| {
            rule.op == op && rule.target.as_ref().map_or(true, |t| *t == target)
        });
        let Some(index) = position else {
            return Ok(());
        };

        let failure = self.failures[index].failure;
        if let Some(remaining) = self.failures[index].remaining.as_mut() {
            *remaining -= 1;
            if *remaining == 0 {
                self.failures.remove(index);
            }
        }
        Err(failure.to_error())
    }

    fn issue(&self, issue: &IssueRef) -> Result<&MockIssue> {
        self.issues
            .get(issue)
            .ok_or_else(|| AgoraError::api(404, format!("Issue {} not found", issue)))
    }

    fn issue_mut(&mut self, issue: &IssueRef) -> Result<&mut MockIssue> {
        self.issues
            .get_mut(issue)
            .ok_or_else(|| AgoraError::api(404, format!("Issue {} not found", issue)))
    }

    fn insert_comment(
        &mut self,
        issue: &IssueRef,
        author: &str,
        author_is_bot: bool,
        body: &str,
    ) -> u64 {
        self.next_comment_id += 1;
        let id = self.next_comment_id;
        self.comments.push(MockComment {
            issue: issue.clone(),
            comment: Comment {
                id,
                author: author.to_string(),
                author_is_bot,
                body: body.to_string(),
            },
            reactions: Vec::new(),
        });
        id
    }
}

/// In-memory [`GitHubApi`] implementation
pub struct MockGitHub {
    bot_login: String,
    state: Mutex<MockState>,
}

impl Default for MockGitHub {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGitHub {
    pub const DEFAULT_BOT_LOGIN: &'static str = "agora[bot]";

    pub fn new() -> Self {
        Self {
            bot_login: Self::DEFAULT_BOT_LOGIN.to_string(),
            state: Mutex::new(MockState::default()),
        }
    }

    /// Author recorded on comments created through the API
    pub fn with_bot_login(mut self, login: impl Into<String>) -> Self {
        self.bot_login = login.into();
        self
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_repository(&self, repo: &RepoRef) {
        let mut state = self.state();
        if !state.repos.contains(repo) {
            state.repos.push(repo.clone());
        }
    }

    pub fn set_file(&self, repo: &RepoRef, path: &str, content: &str) {
        self.state()
            .files
            .insert((repo.clone(), path.to_string()), content.to_string());
    }

    /// Add an open issue carrying `labels`, with no label history
    pub fn add_issue(&self, issue: &IssueRef, labels: &[&str]) {
        let mut state = self.state();
        let entry = state.issues.entry(issue.clone()).or_insert_with(MockIssue::new);
        for label in labels {
            if !entry.labels.iter().any(|l| l.eq_ignore_ascii_case(label)) {
                entry.labels.push(label.to_string());
            }
        }
    }

    /// Add an open issue whose `label` was applied at `labeled_at`
    pub fn add_issue_labeled_at(&self, issue: &IssueRef, label: &str, labeled_at: DateTime<Utc>) {
        self.add_issue(issue, &[label]);
        self.add_label_event(issue, label, labeled_at);
    }

    pub fn add_label_event(&self, issue: &IssueRef, label: &str, created_at: DateTime<Utc>) {
        let mut state = self.state();
        let entry = state.issues.entry(issue.clone()).or_insert_with(MockIssue::new);
        entry.label_events.push(LabelEvent {
            label: label.to_string(),
            created_at,
        });
        entry.label_events.sort_by_key(|e| e.created_at);
    }

    pub fn set_open(&self, issue: &IssueRef, open: bool) {
        if let Some(entry) = self.state().issues.get_mut(issue) {
            entry.open = open;
        }
    }

    /// Reaction by a regular user on the issue body
    pub fn react_to_issue(&self, issue: &IssueRef, user: &str, content: ReactionContent) {
        self.add_issue_reaction(
            issue,
            UserReaction {
                reaction: Reaction::new(user, content),
                user_is_bot: false,
            },
        );
    }

    pub fn add_issue_reaction(&self, issue: &IssueRef, reaction: UserReaction) {
        let mut state = self.state();
        let entry = state.issues.entry(issue.clone()).or_insert_with(MockIssue::new);
        entry.reactions.push(reaction);
    }

    /// Add a pre-existing comment; returns its id
    pub fn add_comment(
        &self,
        issue: &IssueRef,
        author: &str,
        author_is_bot: bool,
        body: &str,
    ) -> u64 {
        self.state().insert_comment(issue, author, author_is_bot, body)
    }

    /// Reaction by a regular user on a comment
    pub fn react_to_comment(&self, comment_id: u64, user: &str, content: ReactionContent) {
        self.add_comment_reaction(
            comment_id,
            UserReaction {
                reaction: Reaction::new(user, content),
                user_is_bot: false,
            },
        );
    }

    pub fn add_comment_reaction(&self, comment_id: u64, reaction: UserReaction) {
        let mut state = self.state();
        if let Some(comment) = state.comments.iter_mut().find(|c| c.comment.id == comment_id) {
            comment.reactions.push(reaction);
        }
    }

    pub fn link_pull_request(&self, issue: &IssueRef, pr_number: u64) {
        let mut state = self.state();
        let entry = state.issues.entry(issue.clone()).or_insert_with(MockIssue::new);
        entry.linked_prs.push(pr_number);
    }

    /// Fail every call of `op`
    pub fn fail(&self, op: MockOp, failure: MockFailure) {
        self.push_failure(op, None, failure, None);
    }

    /// Fail the next `times` calls of `op`
    pub fn fail_times(&self, op: MockOp, failure: MockFailure, times: usize) {
        if times > 0 {
            self.push_failure(op, None, failure, Some(times));
        }
    }

    /// Fail every call of `op` against one target (`owner/repo` or `owner/repo#n`)
    pub fn fail_for(&self, op: MockOp, target: impl ToString, failure: MockFailure) {
        self.push_failure(op, Some(target.to_string()), failure, None);
    }

    fn push_failure(
        &self,
        op: MockOp,
        target: Option<String>,
        failure: MockFailure,
        remaining: Option<usize>,
    ) {
        self.state().failures.push(FailureRule {
            op,
            target,
            failure,
            remaining,
        });
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.state().calls.clone()
    }

    pub fn call_count(&self, op: MockOp) -> usize {
        self.state().calls.iter().filter(|c| c.op == op).count()
    }

    pub fn mutation_count(&self) -> usize {
        self.state().calls.iter().filter(|c| c.op.is_mutation()).count()
    }

    pub fn labels(&self, issue: &IssueRef) -> Vec<String> {
        self.state()
            .issues
            .get(issue)
            .map(|i| i.labels.clone())
            .unwrap_or_default()
    }

    pub fn is_open(&self, issue: &IssueRef) -> bool {
        self.state().issues.get(issue).map_or(false, |i| i.open)
    }

    pub fn close_reason(&self, issue: &IssueRef) -> Option<CloseReason> {
        self.state().issues.get(issue).and_then(|i| i.close_reason)
    }

    pub fn comments(&self, issue: &IssueRef) -> Vec<Comment> {
        self.state()
            .comments
            .iter()
            .filter(|c| c.issue == *issue)
            .map(|c| c.comment.clone())
            .collect()
    }
}

#[async_trait]
impl GitHubApi for MockGitHub {
    async fn list_repositories(&self) -> Result<Vec<RepoRef>> {
        let mut state = self.state();
        state.record(MockOp::ListRepositories, String::new())?;
        Ok(state.repos.clone())
    }

    async fn get_file(&self, repo: &RepoRef, path: &str) -> Result<Option<String>> {
        let mut state = self.state();
        state.record(MockOp::GetFile, repo.to_string())?;
        Ok(state.files.get(&(repo.clone(), path.to_string())).cloned())
    }

    async fn list_issues_with_label(&self, repo: &RepoRef, label: &str) -> Result<Vec<u64>> {
        let mut state = self.state();
        state.record(MockOp::ListIssuesWithLabel, repo.to_string())?;
        Ok(state
            .issues
            .iter()
            .filter(|(issue, entry)| {
                issue.owner == repo.owner
                    && issue.repo == repo.repo
                    && entry.open
                    && entry.labels.iter().any(|l| l.eq_ignore_ascii_case(label))
            })
            .map(|(issue, _)| issue.issue_number)
            .collect())
    }

    async fn get_issue(&self, issue: &IssueRef) -> Result<IssueDetails> {
        let mut state = self.state();
        state.record(MockOp::GetIssue, issue.to_string())?;
        let entry = state.issue(issue)?;
        Ok(IssueDetails {
            number: issue.issue_number,
            open: entry.open,
            labels: entry.labels.clone(),
        })
    }

    async fn list_label_events(&self, issue: &IssueRef) -> Result<Vec<LabelEvent>> {
        let mut state = self.state();
        state.record(MockOp::ListLabelEvents, issue.to_string())?;
        Ok(state.issue(issue)?.label_events.clone())
    }

    async fn list_comments(&self, issue: &IssueRef) -> Result<Vec<Comment>> {
        let mut state = self.state();
        state.record(MockOp::ListComments, issue.to_string())?;
        state.issue(issue)?;
        Ok(state
            .comments
            .iter()
            .filter(|c| c.issue == *issue)
            .map(|c| c.comment.clone())
            .collect())
    }

    async fn list_comment_reactions(
        &self,
        repo: &RepoRef,
        comment_id: u64,
    ) -> Result<Vec<UserReaction>> {
        let mut state = self.state();
        state.record(MockOp::ListCommentReactions, repo.to_string())?;
        state
            .comments
            .iter()
            .find(|c| c.comment.id == comment_id && c.issue.repo_ref() == *repo)
            .map(|c| c.reactions.clone())
            .ok_or_else(|| AgoraError::api(404, format!("Comment {} not found", comment_id)))
    }

    async fn list_issue_reactions(&self, issue: &IssueRef) -> Result<Vec<UserReaction>> {
        let mut state = self.state();
        state.record(MockOp::ListIssueReactions, issue.to_string())?;
        Ok(state.issue(issue)?.reactions.clone())
    }

    async fn add_labels(&self, issue: &IssueRef, labels: &[String]) -> Result<()> {
        let mut state = self.state();
        state.record(MockOp::AddLabels, issue.to_string())?;
        let entry = state.issue_mut(issue)?;
        let now = Utc::now();
        for label in labels {
            if !entry.labels.iter().any(|l| l.eq_ignore_ascii_case(label)) {
                entry.labels.push(label.clone());
                entry.label_events.push(LabelEvent {
                    label: label.clone(),
                    created_at: now,
                });
            }
        }
        Ok(())
    }

    async fn remove_label(&self, issue: &IssueRef, label: &str) -> Result<()> {
        let mut state = self.state();
        state.record(MockOp::RemoveLabel, issue.to_string())?;
        state
            .issue_mut(issue)?
            .labels
            .retain(|l| !l.eq_ignore_ascii_case(label));
        Ok(())
    }

    async fn create_comment(&self, issue: &IssueRef, body: &str) -> Result<u64> {
        let mut state = self.state();
        state.record(MockOp::CreateComment, issue.to_string())?;
        state.issue(issue)?;
        Ok(state.insert_comment(issue, &self.bot_login, true, body))
    }

    async fn close_issue(&self, issue: &IssueRef, reason: CloseReason) -> Result<()> {
        let mut state = self.state();
        state.record(MockOp::CloseIssue, issue.to_string())?;
        let entry = state.issue_mut(issue)?;
        entry.open = false;
        entry.close_reason = Some(reason);
        Ok(())
    }

    async fn list_linked_pull_requests(&self, issue: &IssueRef) -> Result<Vec<u64>> {
        let mut state = self.state();
        state.record(MockOp::ListLinkedPullRequests, issue.to_string())?;
        Ok(state.issue(issue)?.linked_prs.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue() -> IssueRef {
        RepoRef::new("acme", "widgets").issue(1)
    }

    #[tokio::test]
    async fn test_label_listing_is_case_insensitive_and_open_only() {
        let mock = MockGitHub::new();
        let repo = RepoRef::new("acme", "widgets");
        mock.add_issue(&repo.issue(1), &["Agora:Voting"]);
        mock.add_issue(&repo.issue(2), &["agora:voting"]);
        mock.add_issue(&repo.issue(3), &["agora:voting"]);
        mock.set_open(&repo.issue(3), false);

        let found = mock.list_issues_with_label(&repo, "agora:voting").await.unwrap();
        assert_eq!(found, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_injected_failure_consumed_then_succeeds() {
        let mock = MockGitHub::new();
        mock.add_issue(&issue(), &[]);
        mock.fail_times(MockOp::GetIssue, MockFailure::Status(503), 2);

        assert_eq!(mock.get_issue(&issue()).await.unwrap_err().status(), Some(503));
        assert_eq!(mock.get_issue(&issue()).await.unwrap_err().status(), Some(503));
        assert!(mock.get_issue(&issue()).await.is_ok());
        assert_eq!(mock.call_count(MockOp::GetIssue), 3);
    }

    #[tokio::test]
    async fn test_targeted_failure() {
        let mock = MockGitHub::new();
        let other = RepoRef::new("acme", "widgets").issue(2);
        mock.add_issue(&issue(), &[]);
        mock.add_issue(&other, &[]);
        mock.fail_for(MockOp::GetIssue, other.clone(), MockFailure::RateLimited);

        assert!(mock.get_issue(&issue()).await.is_ok());
        assert!(mock.get_issue(&other).await.unwrap_err().is_rate_limited());
    }

    #[tokio::test]
    async fn test_mutations_update_state() {
        let mock = MockGitHub::new();
        mock.add_issue(&issue(), &["agora:voting"]);

        mock.remove_label(&issue(), "AGORA:VOTING").await.unwrap();
        mock.add_labels(&issue(), &["agora:rejected".to_string()]).await.unwrap();
        mock.close_issue(&issue(), CloseReason::NotPlanned).await.unwrap();

        assert_eq!(mock.labels(&issue()), vec!["agora:rejected".to_string()]);
        assert!(!mock.is_open(&issue()));
        assert_eq!(mock.close_reason(&issue()), Some(CloseReason::NotPlanned));
        assert_eq!(mock.mutation_count(), 3);
    }

    #[tokio::test]
    async fn test_missing_issue_is_not_found() {
        let mock = MockGitHub::new();
        assert!(mock.get_issue(&issue()).await.unwrap_err().is_not_found());
    }
}
