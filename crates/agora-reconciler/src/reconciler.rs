//! Phase reconciler
//!
//! Per issue and per pass:
//! 1. Find when the current phase label was applied; skip if unknown.
//! 2. Before the deadline, run the early-decision check if the phase has one.
//! 3. At or past the deadline, apply the deadline transition unconditionally.
//! 4. Otherwise leave the issue alone until a later pass.

use std::time::Duration;

use agora_core::{
    best_effort, AutoDiscussionExit, AutoVotingExit, EffectiveConfig, ExitPolicy, IssueRef,
    Outcome, Phase, RepoRef, Result, VoteCriteria,
};
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, instrument, warn};

use crate::capabilities::Capabilities;
use crate::early_decision::EarlyDecision;
use crate::retry::{with_retry, AccessKind, RetryPolicy};

/// A phase with automatic exits, ready to reconcile
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseJob {
    Discussion(Vec<AutoDiscussionExit>),
    Voting(Vec<AutoVotingExit>),
    ExtendedVoting(Vec<AutoVotingExit>),
}

impl PhaseJob {
    /// Jobs for every phase with auto exits, in workflow order
    pub fn from_config(config: &EffectiveConfig) -> Vec<Self> {
        let mut jobs = Vec::new();
        if let ExitPolicy::Auto(exits) = &config.discussion {
            jobs.push(Self::Discussion(exits.clone()));
        }
        if let ExitPolicy::Auto(exits) = &config.voting {
            jobs.push(Self::Voting(exits.clone()));
        }
        if let ExitPolicy::Auto(exits) = &config.extended_voting {
            jobs.push(Self::ExtendedVoting(exits.clone()));
        }
        jobs
    }

    pub fn phase(&self) -> Phase {
        match self {
            Self::Discussion(_) => Phase::Discussion,
            Self::Voting(_) => Phase::Voting,
            Self::ExtendedVoting(_) => Phase::ExtendedVoting,
        }
    }

    /// Window of the last exit
    pub fn deadline_ms(&self) -> Option<u64> {
        match self {
            Self::Discussion(exits) => exits.last().map(|e| e.after_ms),
            Self::Voting(exits) | Self::ExtendedVoting(exits) => exits.last().map(|e| e.after_ms),
        }
    }

    /// Transition applied once the deadline has passed
    pub fn deadline_transition(&self) -> Option<Transition> {
        match self {
            Self::Discussion(exits) => exits.last().map(|_| Transition::OpenVoting),
            Self::Voting(exits) => exits
                .last()
                .map(|e| Transition::close_vote(false, VoteCriteria::from(e))),
            Self::ExtendedVoting(exits) => exits
                .last()
                .map(|e| Transition::close_vote(true, VoteCriteria::from(e))),
        }
    }
}

/// A governance action the reconciler can take
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    OpenVoting,
    EndVoting(VoteCriteria),
    ResolveInconclusive(VoteCriteria),
}

impl Transition {
    pub fn close_vote(extended: bool, criteria: VoteCriteria) -> Self {
        if extended {
            Self::ResolveInconclusive(criteria)
        } else {
            Self::EndVoting(criteria)
        }
    }

    pub async fn apply(
        &self,
        caps: &Capabilities,
        retry: &RetryPolicy,
        issue: &IssueRef,
    ) -> Result<Outcome> {
        let governance = &caps.governance;
        match self {
            Self::OpenVoting => {
                with_retry(retry, "transition to voting", || {
                    governance.transition_to_voting(issue)
                })
                .await
            }
            Self::EndVoting(criteria) => {
                with_retry(retry, "end voting", || governance.end_voting(issue, criteria)).await
            }
            Self::ResolveInconclusive(criteria) => {
                with_retry(retry, "resolve inconclusive", || {
                    governance.resolve_inconclusive(issue, criteria)
                })
                .await
            }
        }
    }
}

/// What happened to one issue in a pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueResult {
    Transitioned { outcome: Outcome, early: bool },
    Pending { remaining: Duration },
    Skipped(String),
    AccessIssue(AccessKind),
    Failed(String),
}

/// Results for one phase of one repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseReport {
    pub phase: Phase,
    pub results: Vec<(u64, IssueResult)>,
}

impl PhaseReport {
    pub fn new(phase: Phase) -> Self {
        Self {
            phase,
            results: Vec::new(),
        }
    }

    pub fn transitioned(&self) -> usize {
        self.results
            .iter()
            .filter(|(_, r)| matches!(r, IssueResult::Transitioned { .. }))
            .count()
    }
}

/// Drives the issues of one repository through their phases
pub struct PhaseReconciler {
    caps: Capabilities,
    retry: RetryPolicy,
    notify_linked_prs: bool,
}

impl PhaseReconciler {
    pub fn new(caps: Capabilities, retry: RetryPolicy) -> Self {
        Self {
            caps,
            retry,
            notify_linked_prs: false,
        }
    }

    /// Notify linked pull requests when an issue becomes ready
    pub fn with_pr_notifications(mut self, enabled: bool) -> Self {
        self.notify_linked_prs = enabled;
        self
    }

    /// Reconcile every open issue in the job's phase
    #[instrument(skip_all, fields(repo = %repo, phase = %job.phase()))]
    pub async fn reconcile_phase(
        &self,
        repo: &RepoRef,
        job: &PhaseJob,
        now: DateTime<Utc>,
    ) -> Result<PhaseReport> {
        let phase = job.phase();
        let numbers = with_retry(&self.retry, "list phase issues", || {
            self.caps.issues.list_phase_issues(repo, phase)
        })
        .await?;
        debug!(count = numbers.len(), "Reconciling phase");

        let mut report = PhaseReport::new(phase);
        for number in numbers {
            let result = self.reconcile_issue(&repo.issue(number), job, now).await;
            report.results.push((number, result));
        }
        Ok(report)
    }

    /// Reconcile one issue, classifying any failure
    pub async fn reconcile_issue(
        &self,
        issue: &IssueRef,
        job: &PhaseJob,
        now: DateTime<Utc>,
    ) -> IssueResult {
        match self.try_reconcile(issue, job, now).await {
            Ok(result) => result,
            Err(e) if e.is_not_found() => {
                debug!(issue = %issue, "Issue gone, skipping");
                IssueResult::Skipped("issue not found".to_string())
            }
            Err(e) => match AccessKind::classify(&e) {
                Some(kind) => {
                    warn!(
                        issue = %issue,
                        access = %kind,
                        "Access issue, will retry next run: {}",
                        e
                    );
                    IssueResult::AccessIssue(kind)
                }
                None => {
                    error!(issue = %issue, "Reconciliation failed: {}", e);
                    IssueResult::Failed(e.to_string())
                }
            },
        }
    }

    async fn try_reconcile(
        &self,
        issue: &IssueRef,
        job: &PhaseJob,
        now: DateTime<Utc>,
    ) -> Result<IssueResult> {
        let phase = job.phase();
        let (Some(deadline_ms), Some(deadline)) = (job.deadline_ms(), job.deadline_transition())
        else {
            return Ok(IssueResult::Skipped("phase has no auto exits".to_string()));
        };

        let labeled_at = with_retry(&self.retry, "get label time", || {
            self.caps.issues.get_label_added_time(issue, phase)
        })
        .await?;
        let Some(labeled_at) = labeled_at else {
            info!(issue = %issue, phase = %phase, "Phase label time unknown, skipping");
            return Ok(IssueResult::Skipped("phase label time unknown".to_string()));
        };

        let elapsed_ms = u64::try_from((now - labeled_at).num_milliseconds()).unwrap_or(0);

        if elapsed_ms < deadline_ms {
            if let Some(early) = EarlyDecision::for_job(job) {
                let decided = early.run(&self.caps, &self.retry, issue, elapsed_ms).await?;
                if let Some(outcome) = decided {
                    return Ok(self.finish(issue, outcome, true).await);
                }
            }
            let remaining = Duration::from_millis(deadline_ms - elapsed_ms);
            debug!(issue = %issue, remaining_secs = remaining.as_secs(), "Deadline not reached");
            return Ok(IssueResult::Pending { remaining });
        }

        let outcome = deadline.apply(&self.caps, &self.retry, issue).await?;
        Ok(self.finish(issue, outcome, false).await)
    }

    async fn finish(&self, issue: &IssueRef, outcome: Outcome, early: bool) -> IssueResult {
        if outcome == Outcome::Skipped {
            debug!(issue = %issue, "Issue already left the phase");
            return IssueResult::Skipped("issue already left the phase".to_string());
        }

        info!(issue = %issue, outcome = %outcome, early, "Issue transitioned");
        if outcome.is_passing() && self.notify_linked_prs {
            self.notify_linked_prs(issue).await;
        }
        IssueResult::Transitioned { outcome, early }
    }

    async fn notify_linked_prs(&self, issue: &IssueRef) {
        let pulls = &self.caps.pulls;
        let Some(prs) = best_effort(issue, "list linked PRs", || {
            with_retry(&self.retry, "list linked PRs", || pulls.linked_pull_requests(issue))
        })
        .await
        else {
            return;
        };

        let repo = issue.repo_ref();
        for pr in prs {
            best_effort(issue, "notify linked PR", || {
                pulls.notify_issue_ready(&repo, pr, issue.issue_number)
            })
            .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::GitHubOptions;
    use agora_core::{ReactionContent, RequiredParticipants, VoteRequirement};
    use agora_github::messages::voting_comment;
    use agora_github::{MockFailure, MockGitHub, MockOp};
    use chrono::Duration as ChronoDuration;
    use std::sync::Arc;

    fn repo() -> RepoRef {
        RepoRef::new("acme", "widgets")
    }

    fn voting_exit(after_ms: u64, requires: VoteRequirement, min_voters: u32) -> AutoVotingExit {
        AutoVotingExit {
            after_ms,
            requires,
            min_voters,
            required_voters: RequiredParticipants::none(),
        }
    }

    fn setup() -> (Arc<MockGitHub>, PhaseReconciler) {
        let mock = Arc::new(MockGitHub::new());
        let caps = Capabilities::github(Arc::clone(&mock), &GitHubOptions::default());
        (mock, PhaseReconciler::new(caps, RetryPolicy::none()))
    }

    fn backoff_without_jitter() -> RetryPolicy {
        RetryPolicy {
            jitter: 0.0,
            ..RetryPolicy::default()
        }
    }

    fn reconciler_with(mock: &Arc<MockGitHub>, retry: RetryPolicy) -> PhaseReconciler {
        let caps = Capabilities::github(Arc::clone(mock), &GitHubOptions::default());
        PhaseReconciler::new(caps, retry)
    }

    fn voting_issue(mock: &MockGitHub, number: u64, labeled_ago_ms: i64, up: &[&str]) -> IssueRef {
        let issue = repo().issue(number);
        let labeled_at = Utc::now() - ChronoDuration::milliseconds(labeled_ago_ms);
        mock.add_issue_labeled_at(&issue, "agora:voting", labeled_at);
        let comment = mock.add_comment(&issue, "agora[bot]", true, &voting_comment());
        for user in up {
            mock.react_to_comment(comment, user, ReactionContent::ThumbsUp);
        }
        issue
    }

    #[tokio::test]
    async fn test_first_eligible_exit_wins_before_deadline() {
        let (mock, reconciler) = setup();
        let issue = voting_issue(&mock, 1, 70_000, &["alice", "bob"]);
        let job = PhaseJob::Voting(vec![
            voting_exit(60_000, VoteRequirement::Majority, 1),
            voting_exit(120_000, VoteRequirement::Unanimous, 3),
        ]);

        let result = reconciler.reconcile_issue(&issue, &job, Utc::now()).await;
        assert_eq!(
            result,
            IssueResult::Transitioned {
                outcome: Outcome::ReadyToImplement,
                early: true
            }
        );
        assert_eq!(mock.labels(&issue), vec!["agora:ready-to-implement".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_label_time_is_skipped() {
        let (mock, reconciler) = setup();
        let issue = repo().issue(2);
        mock.add_issue(&issue, &["agora:voting"]);
        let job = PhaseJob::Voting(vec![voting_exit(0, VoteRequirement::Majority, 0)]);

        let result = reconciler.reconcile_issue(&issue, &job, Utc::now()).await;
        assert!(matches!(result, IssueResult::Skipped(_)));
        assert_eq!(mock.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_pending_before_deadline_without_early_exit() {
        let (mock, reconciler) = setup();
        let issue = voting_issue(&mock, 3, 10_000, &["alice", "bob", "carol"]);
        let job = PhaseJob::Voting(vec![voting_exit(60_000, VoteRequirement::Majority, 1)]);

        let result = reconciler.reconcile_issue(&issue, &job, Utc::now()).await;
        match result {
            IssueResult::Pending { remaining } => {
                assert!(remaining <= Duration::from_millis(50_000))
            }
            other => panic!("expected pending, got {:?}", other),
        }
        assert_eq!(mock.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_deadline_forces_transition() {
        let (mock, reconciler) = setup();
        let issue = repo().issue(4);
        mock.add_issue_labeled_at(&issue, "phase:discussion", Utc::now() - ChronoDuration::days(2));
        let job = PhaseJob::Discussion(vec![AutoDiscussionExit::after_minutes(1_440)]);

        let result = reconciler.reconcile_issue(&issue, &job, Utc::now()).await;
        assert_eq!(
            result,
            IssueResult::Transitioned {
                outcome: Outcome::Voting,
                early: false
            }
        );
        assert_eq!(mock.labels(&issue), vec!["agora:voting".to_string()]);
        assert_eq!(mock.comments(&issue).len(), 1);
    }

    #[tokio::test]
    async fn test_deadline_without_quorum_extends_voting() {
        let (mock, reconciler) = setup();
        let issue = voting_issue(&mock, 5, 200_000, &["alice"]);
        let job = PhaseJob::Voting(vec![voting_exit(120_000, VoteRequirement::Majority, 3)]);

        let result = reconciler.reconcile_issue(&issue, &job, Utc::now()).await;
        assert_eq!(
            result,
            IssueResult::Transitioned {
                outcome: Outcome::Inconclusive,
                early: false
            }
        );
        assert_eq!(mock.labels(&issue), vec!["agora:extended-voting".to_string()]);
    }

    #[tokio::test]
    async fn test_rate_limit_becomes_access_issue() {
        let (mock, reconciler) = setup();
        let issue = voting_issue(&mock, 6, 200_000, &[]);
        mock.fail(MockOp::ListLabelEvents, MockFailure::RateLimited);
        let job = PhaseJob::Voting(vec![voting_exit(0, VoteRequirement::Majority, 0)]);

        let result = reconciler.reconcile_issue(&issue, &job, Utc::now()).await;
        assert_eq!(result, IssueResult::AccessIssue(AccessKind::RateLimited));
    }

    #[tokio::test]
    async fn test_transition_failure_reported() {
        let (mock, reconciler) = setup();
        let issue = voting_issue(&mock, 7, 200_000, &["alice"]);
        mock.fail(MockOp::AddLabels, MockFailure::Status(500));
        let job = PhaseJob::Voting(vec![voting_exit(0, VoteRequirement::Majority, 1)]);

        let result = reconciler.reconcile_issue(&issue, &job, Utc::now()).await;
        assert!(matches!(result, IssueResult::Failed(_)));
    }

    #[tokio::test]
    async fn test_early_check_error_defers_to_deadline() {
        let (mock, reconciler) = setup();
        let issue = voting_issue(&mock, 8, 70_000, &["alice", "bob"]);
        mock.fail(MockOp::ListCommentReactions, MockFailure::Status(503));
        let job = PhaseJob::Voting(vec![
            voting_exit(60_000, VoteRequirement::Majority, 1),
            voting_exit(120_000, VoteRequirement::Majority, 1),
        ]);

        let result = reconciler.reconcile_issue(&issue, &job, Utc::now()).await;
        assert!(matches!(result, IssueResult::Pending { .. }));
        assert_eq!(mock.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_passing_outcome_notifies_linked_prs_when_enabled() {
        let mock = Arc::new(MockGitHub::new());
        let caps = Capabilities::github(Arc::clone(&mock), &GitHubOptions::default());
        let reconciler =
            PhaseReconciler::new(caps, RetryPolicy::none()).with_pr_notifications(true);

        let issue = voting_issue(&mock, 9, 200_000, &["alice"]);
        mock.add_issue(&repo().issue(20), &[]);
        mock.link_pull_request(&issue, 20);
        let job = PhaseJob::Voting(vec![voting_exit(0, VoteRequirement::Majority, 1)]);

        let result = reconciler.reconcile_issue(&issue, &job, Utc::now()).await;
        assert!(matches!(
            result,
            IssueResult::Transitioned {
                outcome: Outcome::ReadyToImplement,
                ..
            }
        ));
        assert_eq!(mock.comments(&repo().issue(20)).len(), 1);
    }

    #[tokio::test]
    async fn test_linked_prs_untouched_when_disabled() {
        let (mock, reconciler) = setup();
        let issue = voting_issue(&mock, 10, 200_000, &["alice"]);
        mock.link_pull_request(&issue, 21);
        let job = PhaseJob::Voting(vec![voting_exit(0, VoteRequirement::Majority, 1)]);

        reconciler.reconcile_issue(&issue, &job, Utc::now()).await;
        assert_eq!(mock.call_count(MockOp::ListLinkedPullRequests), 0);
    }

    #[tokio::test]
    async fn test_reconcile_phase_covers_legacy_labels() {
        let (mock, reconciler) = setup();
        let old = Utc::now() - ChronoDuration::days(2);
        mock.add_issue_labeled_at(&repo().issue(11), "agora:discussion", old);
        mock.add_issue_labeled_at(&repo().issue(12), "phase:discussion", old);
        let job = PhaseJob::Discussion(vec![AutoDiscussionExit::after_minutes(60)]);

        let report = reconciler.reconcile_phase(&repo(), &job, Utc::now()).await.unwrap();
        assert_eq!(report.phase, Phase::Discussion);
        assert_eq!(report.transitioned(), 2);
    }

    #[tokio::test]
    async fn test_early_exit_with_eyes_ahead_waits_for_deadline() {
        let (mock, reconciler) = setup();
        let issue = voting_issue(&mock, 13, 70_000, &["alice", "bob"]);
        let comment = mock.comments(&issue)[0].id;
        for user in ["carol", "dave", "erin"] {
            mock.react_to_comment(comment, user, ReactionContent::Eyes);
        }
        let job = PhaseJob::Voting(vec![
            voting_exit(60_000, VoteRequirement::Majority, 1),
            voting_exit(120_000, VoteRequirement::Majority, 1),
        ]);

        let result = reconciler.reconcile_issue(&issue, &job, Utc::now()).await;
        assert!(matches!(result, IssueResult::Pending { .. }));
        assert_eq!(mock.mutation_count(), 0);
        assert_eq!(mock.labels(&issue), vec!["agora:voting".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_label_failures_retried_with_backoff() {
        let mock = Arc::new(MockGitHub::new());
        let reconciler = reconciler_with(&mock, backoff_without_jitter());
        let issue = repo().issue(14);
        let labeled_at = Utc::now() - ChronoDuration::days(2);
        mock.add_issue_labeled_at(&issue, "phase:discussion", labeled_at);
        mock.fail_times(MockOp::AddLabels, MockFailure::Status(503), 2);
        let job = PhaseJob::Discussion(vec![AutoDiscussionExit::after_minutes(60)]);

        let started = tokio::time::Instant::now();
        let result = reconciler.reconcile_issue(&issue, &job, Utc::now()).await;

        assert_eq!(
            result,
            IssueResult::Transitioned {
                outcome: Outcome::Voting,
                early: false
            }
        );
        assert_eq!(mock.call_count(MockOp::AddLabels), 3);
        // 1s before the second attempt, 2s before the third
        assert!(started.elapsed() >= Duration::from_secs(3));
        assert_eq!(mock.labels(&issue), vec!["agora:voting".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_leave_issue_in_phase() {
        let mock = Arc::new(MockGitHub::new());
        let reconciler = reconciler_with(&mock, backoff_without_jitter());
        let issue = voting_issue(&mock, 15, 200_000, &["alice"]);
        mock.fail(MockOp::AddLabels, MockFailure::Status(503));
        let job = PhaseJob::Voting(vec![voting_exit(0, VoteRequirement::Majority, 1)]);

        let result = reconciler.reconcile_issue(&issue, &job, Utc::now()).await;

        assert!(matches!(result, IssueResult::Failed(_)));
        assert_eq!(
            mock.call_count(MockOp::AddLabels),
            RetryPolicy::default().max_attempts as usize
        );
        assert_eq!(mock.labels(&issue), vec!["agora:voting".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_transition_completed_by_retry() {
        let mock = Arc::new(MockGitHub::new());
        let reconciler = reconciler_with(&mock, backoff_without_jitter());
        let issue = voting_issue(&mock, 16, 200_000, &["alice"]);
        mock.fail_times(MockOp::RemoveLabel, MockFailure::Status(503), 1);
        let job = PhaseJob::Voting(vec![voting_exit(0, VoteRequirement::Majority, 1)]);

        let result = reconciler.reconcile_issue(&issue, &job, Utc::now()).await;

        assert_eq!(
            result,
            IssueResult::Transitioned {
                outcome: Outcome::ReadyToImplement,
                early: false
            }
        );
        assert_eq!(mock.labels(&issue), vec!["agora:ready-to-implement".to_string()]);
        // Voting comment plus a single outcome announcement
        assert_eq!(mock.comments(&issue).len(), 2);
    }

    #[test]
    fn test_jobs_only_for_auto_phases() {
        let config = EffectiveConfig {
            discussion: ExitPolicy::Manual,
            ..EffectiveConfig::default()
        };
        let phases: Vec<Phase> = PhaseJob::from_config(&config).iter().map(|j| j.phase()).collect();
        assert_eq!(phases, vec![Phase::Voting, Phase::ExtendedVoting]);
    }
}
