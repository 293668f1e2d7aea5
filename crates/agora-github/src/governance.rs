//! Governance actions: the label mutations that move an issue between phases
//!
//! Every action re-reads the issue before touching it and does nothing when
//! the issue is closed or has already left the source phase, so a racing
//! process or a re-run never repeats an irreversible change. The target
//! label is added before the source labels are removed; an interrupted move
//! leaves the issue in both phases and the next attempt finishes it.
//! Announcement comments are best-effort.

use std::sync::Arc;

use agora_core::labels::{canonical_label, phase_labels_present};
use agora_core::{
    best_effort, decide_outcome, IssueRef, Outcome, Phase, Result, VoteCounts, VoteCriteria,
};
use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use crate::api::{CloseReason, GitHubApi};
use crate::issues::{GitHubIssues, IssueOperations};
use crate::messages::outcome_comment;

/// Phase transitions applied by the reconciler
#[async_trait]
pub trait GovernanceActions: Send + Sync {
    /// Discussion → Voting, then open the vote
    async fn transition_to_voting(&self, issue: &IssueRef) -> Result<Outcome>;

    /// Close a vote; an inconclusive result moves to extended voting
    ///
    /// With `criteria.early` set, anything but a passing result leaves the
    /// issue untouched and returns [`Outcome::Deferred`].
    async fn end_voting(&self, issue: &IssueRef, criteria: &VoteCriteria) -> Result<Outcome>;

    /// Close an extended vote; an inconclusive result needs a human
    async fn resolve_inconclusive(
        &self,
        issue: &IssueRef,
        criteria: &VoteCriteria,
    ) -> Result<Outcome>;
}

/// Outcome of an earlier move out of `source` that added the target label
/// but stopped before removing the source labels
fn interrupted_move(labels: &[String], source: Phase) -> Option<Outcome> {
    source
        .successors()
        .iter()
        .find(|next| !phase_labels_present(**next, labels).is_empty())
        .and_then(|next| Outcome::reaching(*next))
}

/// [`GovernanceActions`] that store phases as issue labels
pub struct LabelGovernance<A> {
    api: Arc<A>,
    issues: GitHubIssues<A>,
}

impl<A: GitHubApi> LabelGovernance<A> {
    pub fn new(api: Arc<A>) -> Self {
        Self {
            issues: GitHubIssues::new(Arc::clone(&api)),
            api,
        }
    }

    pub fn with_bot_login(mut self, login: impl Into<String>) -> Self {
        self.issues = self.issues.with_bot_login(login);
        self
    }

    /// Current labels if the issue is open and still in `source`
    async fn labels_in_phase(
        &self,
        issue: &IssueRef,
        source: Phase,
    ) -> Result<Option<Vec<String>>> {
        let details = self.api.get_issue(issue).await?;
        if !details.open {
            debug!(issue = %issue, "Issue closed, skipping");
            return Ok(None);
        }
        if phase_labels_present(source, &details.labels).is_empty() {
            debug!(issue = %issue, phase = %source, "Issue no longer in phase, skipping");
            return Ok(None);
        }
        Ok(Some(details.labels))
    }

    async fn move_phase(
        &self,
        issue: &IssueRef,
        labels: &[String],
        from: Phase,
        to: Phase,
    ) -> Result<()> {
        self.api
            .add_labels(issue, &[canonical_label(to).to_string()])
            .await?;
        for label in phase_labels_present(from, labels) {
            self.api.remove_label(issue, label).await?;
        }
        info!(issue = %issue, from = %from, to = %to, "Phase transition");
        Ok(())
    }

    async fn close_vote(
        &self,
        issue: &IssueRef,
        source: Phase,
        criteria: &VoteCriteria,
        inconclusive: Outcome,
    ) -> Result<Outcome> {
        let Some(labels) = self.labels_in_phase(issue, source).await? else {
            return Ok(Outcome::Skipped);
        };

        let result = match self.issues.find_voting_comment_id(issue).await? {
            Some(comment_id) => {
                Some(self.issues.get_validated_vote_counts(issue, comment_id).await?)
            }
            None => None,
        };

        let outcome = match interrupted_move(&labels, source) {
            Some(outcome) => {
                info!(issue = %issue, outcome = %outcome, "Finishing interrupted transition");
                outcome
            }
            None => {
                let decided = match &result {
                    Some(result) => decide_outcome(criteria, result),
                    None => {
                        warn!(issue = %issue, "No voting comment found, escalating");
                        Outcome::NeedsHuman
                    }
                };
                let outcome = match decided {
                    Outcome::Inconclusive => inconclusive,
                    other => other,
                };
                if criteria.early && !outcome.is_passing() {
                    info!(
                        issue = %issue,
                        outcome = %outcome,
                        "Early exit no longer passes, leaving to deadline"
                    );
                    return Ok(Outcome::Deferred);
                }
                outcome
            }
        };

        let votes = result.map(|r| r.votes);
        self.apply_outcome(issue, &labels, source, outcome, votes).await
    }

    async fn apply_outcome(
        &self,
        issue: &IssueRef,
        labels: &[String],
        source: Phase,
        outcome: Outcome,
        votes: Option<VoteCounts>,
    ) -> Result<Outcome> {
        let Some(target) = outcome.target_phase() else {
            return Ok(outcome);
        };

        self.move_phase(issue, labels, source, target).await?;

        if outcome == Outcome::Rejected {
            best_effort(issue, "close rejected issue", || {
                self.api.close_issue(issue, CloseReason::NotPlanned)
            })
            .await;
        }

        let body = outcome_comment(outcome, votes.as_ref());
        best_effort(issue, "post outcome comment", || {
            self.api.create_comment(issue, &body)
        })
        .await;

        Ok(outcome)
    }
}

#[async_trait]
impl<A: GitHubApi> GovernanceActions for LabelGovernance<A> {
    #[instrument(skip_all, fields(issue = %issue))]
    async fn transition_to_voting(&self, issue: &IssueRef) -> Result<Outcome> {
        let Some(labels) = self.labels_in_phase(issue, Phase::Discussion).await? else {
            return Ok(Outcome::Skipped);
        };

        self.move_phase(issue, &labels, Phase::Discussion, Phase::Voting)
            .await?;
        best_effort(issue, "post voting comment", || {
            self.issues.post_voting_comment(issue)
        })
        .await;

        Ok(Outcome::Voting)
    }

    #[instrument(skip_all, fields(issue = %issue))]
    async fn end_voting(&self, issue: &IssueRef, criteria: &VoteCriteria) -> Result<Outcome> {
        self.close_vote(issue, Phase::Voting, criteria, Outcome::Inconclusive)
            .await
    }

    #[instrument(skip_all, fields(issue = %issue))]
    async fn resolve_inconclusive(
        &self,
        issue: &IssueRef,
        criteria: &VoteCriteria,
    ) -> Result<Outcome> {
        self.close_vote(issue, Phase::ExtendedVoting, criteria, Outcome::NeedsHuman)
            .await
    }
}
