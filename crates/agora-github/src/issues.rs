//! Issue operations consumed by the reconciler

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use agora_core::labels::{label_matches, phase_label};
use agora_core::{
    validate_votes, IssueRef, Phase, PostResult, ReactionContent, RepoRef, Result,
    ValidatedVoteResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use crate::api::{Comment, GitHubApi, UserReaction};
use crate::messages::{voting_comment, VOTING_MARKER};

/// Read and comment operations on governance issues
#[async_trait]
pub trait IssueOperations: Send + Sync {
    /// Open issues in `phase`, across all of its label aliases, ascending
    async fn list_phase_issues(&self, repo: &RepoRef, phase: Phase) -> Result<Vec<u64>>;

    /// When the phase label was last applied; `None` if it cannot be determined
    async fn get_label_added_time(
        &self,
        issue: &IssueRef,
        phase: Phase,
    ) -> Result<Option<DateTime<Utc>>>;

    async fn find_voting_comment_id(&self, issue: &IssueRef) -> Result<Option<u64>>;

    async fn get_validated_vote_counts(
        &self,
        issue: &IssueRef,
        comment_id: u64,
    ) -> Result<ValidatedVoteResult>;

    /// Users who marked the proposal ready (👍 on the issue body)
    async fn get_discussion_readiness(&self, issue: &IssueRef) -> Result<HashSet<String>>;

    /// Create the voting comment unless one already exists
    async fn post_voting_comment(&self, issue: &IssueRef) -> Result<PostResult>;
}

/// [`IssueOperations`] over a [`GitHubApi`]
pub struct GitHubIssues<A> {
    api: Arc<A>,
    bot_login: Option<String>,
}

impl<A: GitHubApi> GitHubIssues<A> {
    pub fn new(api: Arc<A>) -> Self {
        Self { api, bot_login: None }
    }

    /// Treat this login as the bot even when the account type says otherwise
    pub fn with_bot_login(mut self, login: impl Into<String>) -> Self {
        self.bot_login = Some(login.into());
        self
    }

    fn is_bot(&self, login: &str, flagged_bot: bool) -> bool {
        flagged_bot
            || self
                .bot_login
                .as_deref()
                .map_or(false, |bot| bot.eq_ignore_ascii_case(login))
    }

    fn is_voting_comment(&self, comment: &Comment) -> bool {
        comment.body.contains(VOTING_MARKER) && self.is_bot(&comment.author, comment.author_is_bot)
    }

    fn human_reactions(
        &self,
        reactions: Vec<UserReaction>,
    ) -> impl Iterator<Item = UserReaction> + '_ {
        reactions
            .into_iter()
            .filter(move |r| !self.is_bot(&r.reaction.user, r.user_is_bot))
    }
}

#[async_trait]
impl<A: GitHubApi> IssueOperations for GitHubIssues<A> {
    async fn list_phase_issues(&self, repo: &RepoRef, phase: Phase) -> Result<Vec<u64>> {
        let mut numbers = BTreeSet::new();
        for label in phase_label(phase).names() {
            numbers.extend(self.api.list_issues_with_label(repo, label).await?);
        }
        debug!(repo = %repo, phase = %phase, count = numbers.len(), "Listed phase issues");
        Ok(numbers.into_iter().collect())
    }

    async fn get_label_added_time(
        &self,
        issue: &IssueRef,
        phase: Phase,
    ) -> Result<Option<DateTime<Utc>>> {
        let events = self.api.list_label_events(issue).await?;
        Ok(events
            .into_iter()
            .filter(|e| label_matches(phase, &e.label))
            .map(|e| e.created_at)
            .max())
    }

    async fn find_voting_comment_id(&self, issue: &IssueRef) -> Result<Option<u64>> {
        let comments = self.api.list_comments(issue).await?;
        Ok(comments
            .iter()
            .find(|c| self.is_voting_comment(c))
            .map(|c| c.id))
    }

    async fn get_validated_vote_counts(
        &self,
        issue: &IssueRef,
        comment_id: u64,
    ) -> Result<ValidatedVoteResult> {
        let reactions = self
            .api
            .list_comment_reactions(&issue.repo_ref(), comment_id)
            .await?;
        let ballots: Vec<_> = self.human_reactions(reactions).map(|r| r.reaction).collect();
        Ok(validate_votes(&ballots))
    }

    async fn get_discussion_readiness(&self, issue: &IssueRef) -> Result<HashSet<String>> {
        let reactions = self.api.list_issue_reactions(issue).await?;
        Ok(self
            .human_reactions(reactions)
            .filter(|r| r.reaction.content == ReactionContent::ThumbsUp)
            .map(|r| r.reaction.user.to_lowercase())
            .collect())
    }

    #[instrument(skip_all, fields(issue = %issue))]
    async fn post_voting_comment(&self, issue: &IssueRef) -> Result<PostResult> {
        if let Some(id) = self.find_voting_comment_id(issue).await? {
            debug!(comment_id = id, "Voting comment already exists");
            return Ok(PostResult::AlreadyExists);
        }

        let id = self.api.create_comment(issue, &voting_comment()).await?;
        info!(comment_id = id, "Posted voting comment");
        Ok(PostResult::Posted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockGitHub, MockOp};
    use chrono::Duration;

    fn repo() -> RepoRef {
        RepoRef::new("acme", "widgets")
    }

    fn setup() -> (Arc<MockGitHub>, GitHubIssues<MockGitHub>) {
        let mock = Arc::new(MockGitHub::new());
        let issues = GitHubIssues::new(Arc::clone(&mock));
        (mock, issues)
    }

    #[tokio::test]
    async fn test_list_phase_issues_dedupes_aliases() {
        let (mock, issues) = setup();
        mock.add_issue(&repo().issue(4), &["agora:extended-voting"]);
        mock.add_issue(&repo().issue(2), &["inconclusive"]);
        mock.add_issue(&repo().issue(3), &["phase:extended-voting", "agora:extended-voting"]);
        mock.add_issue(&repo().issue(9), &["agora:voting"]);

        let found = issues.list_phase_issues(&repo(), Phase::ExtendedVoting).await.unwrap();
        assert_eq!(found, vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn test_label_added_time_uses_latest_matching_event() {
        let (mock, issues) = setup();
        let issue = repo().issue(1);
        let first = Utc::now() - Duration::days(5);
        let second = Utc::now() - Duration::days(1);
        mock.add_issue_labeled_at(&issue, "phase:voting", first);
        mock.add_label_event(&issue, "agora:discussion", second + Duration::hours(1));
        mock.add_label_event(&issue, "Agora:Voting", second);

        let at = issues.get_label_added_time(&issue, Phase::Voting).await.unwrap();
        assert_eq!(at, Some(second));
    }

    #[tokio::test]
    async fn test_label_added_time_unknown() {
        let (mock, issues) = setup();
        let issue = repo().issue(1);
        mock.add_issue(&issue, &["agora:voting"]);
        assert_eq!(issues.get_label_added_time(&issue, Phase::Voting).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_voting_comment_must_be_bot_authored() {
        let (mock, issues) = setup();
        let issue = repo().issue(1);
        mock.add_issue(&issue, &["agora:voting"]);
        mock.add_comment(&issue, "mallory", false, VOTING_MARKER);
        assert_eq!(issues.find_voting_comment_id(&issue).await.unwrap(), None);

        let id = mock.add_comment(&issue, "agora[bot]", true, &voting_comment());
        assert_eq!(issues.find_voting_comment_id(&issue).await.unwrap(), Some(id));
    }

    #[tokio::test]
    async fn test_configured_bot_login_is_recognized() {
        let mock = Arc::new(MockGitHub::new().with_bot_login("governor"));
        let issues = GitHubIssues::new(Arc::clone(&mock)).with_bot_login("Governor");
        let issue = repo().issue(1);
        mock.add_issue(&issue, &[]);
        let id = mock.add_comment(&issue, "Governor", false, &voting_comment());
        assert_eq!(issues.find_voting_comment_id(&issue).await.unwrap(), Some(id));

        let other = repo().issue(2);
        mock.add_issue(&other, &[]);
        assert_eq!(issues.post_voting_comment(&other).await.unwrap(), PostResult::Posted);
        assert_eq!(mock.comments(&other)[0].author, "governor");
        assert_eq!(
            issues.post_voting_comment(&other).await.unwrap(),
            PostResult::AlreadyExists
        );
    }

    #[tokio::test]
    async fn test_vote_counts_exclude_bots_and_ambiguous() {
        let (mock, issues) = setup();
        let issue = repo().issue(1);
        mock.add_issue(&issue, &["agora:voting"]);
        let id = mock.add_comment(&issue, "agora[bot]", true, &voting_comment());
        mock.react_to_comment(id, "alice", ReactionContent::ThumbsUp);
        mock.react_to_comment(id, "bob", ReactionContent::ThumbsUp);
        mock.react_to_comment(id, "bob", ReactionContent::ThumbsDown);
        mock.add_comment_reaction(
            id,
            UserReaction {
                reaction: agora_core::Reaction::new("agora[bot]", ReactionContent::ThumbsUp),
                user_is_bot: true,
            },
        );

        let result = issues.get_validated_vote_counts(&issue, id).await.unwrap();
        assert_eq!(result.votes.thumbs_up, 1);
        assert_eq!(result.votes.thumbs_down, 0);
        assert_eq!(result.voters, vec!["alice".to_string()]);
        assert_eq!(result.participants, vec!["alice".to_string(), "bob".to_string()]);
    }

    #[tokio::test]
    async fn test_discussion_readiness() {
        let (mock, issues) = setup();
        let issue = repo().issue(1);
        mock.add_issue(&issue, &["agora:discussion"]);
        mock.react_to_issue(&issue, "Alice", ReactionContent::ThumbsUp);
        mock.react_to_issue(&issue, "bob", ReactionContent::Heart);

        let ready = issues.get_discussion_readiness(&issue).await.unwrap();
        assert_eq!(ready.len(), 1);
        assert!(ready.contains("alice"));
    }

    #[tokio::test]
    async fn test_post_voting_comment_is_idempotent() {
        let (mock, issues) = setup();
        let issue = repo().issue(1);
        mock.add_issue(&issue, &["agora:voting"]);

        assert_eq!(issues.post_voting_comment(&issue).await.unwrap(), PostResult::Posted);
        assert_eq!(
            issues.post_voting_comment(&issue).await.unwrap(),
            PostResult::AlreadyExists
        );
        assert_eq!(mock.call_count(MockOp::CreateComment), 1);
        assert_eq!(mock.comments(&issue).len(), 1);
    }
}
