//! Early decisions: closing a phase before its deadline
//!
//! A phase with several auto exits can end as soon as one of its earlier,
//! shorter-window exits is satisfied. Only exits whose own window has
//! elapsed are considered, in ascending window order, and the first eligible
//! one decides using its own criteria.

use agora_core::exits::{
    elapsed_exits, first_eligible_discussion_exit, first_eligible_voting_exit,
};
use agora_core::{AutoDiscussionExit, AutoVotingExit, IssueRef, Outcome, Result, VoteCriteria};
use tracing::{debug, warn};

use crate::capabilities::Capabilities;
use crate::reconciler::{PhaseJob, Transition};
use crate::retry::{with_retry, AccessKind, RetryPolicy};

/// Early-decision check for one phase
#[derive(Debug, Clone, Copy)]
pub enum EarlyDecision<'a> {
    Discussion(&'a [AutoDiscussionExit]),
    Voting {
        exits: &'a [AutoVotingExit],
        extended: bool,
    },
}

impl<'a> EarlyDecision<'a> {
    /// Build the check for a phase; `None` when only the deadline exit exists
    pub fn for_job(job: &'a PhaseJob) -> Option<Self> {
        let decision = match job {
            PhaseJob::Discussion(exits) => Self::Discussion(exits),
            PhaseJob::Voting(exits) => Self::Voting {
                exits,
                extended: false,
            },
            PhaseJob::ExtendedVoting(exits) => Self::Voting {
                exits,
                extended: true,
            },
        };
        (decision.exit_count() > 1).then_some(decision)
    }

    fn exit_count(&self) -> usize {
        match *self {
            Self::Discussion(exits) => exits.len(),
            Self::Voting { exits, .. } => exits.len(),
        }
    }

    fn any_elapsed(&self, elapsed_ms: u64) -> bool {
        match *self {
            Self::Discussion(exits) => elapsed_exits(exits, elapsed_ms).next().is_some(),
            Self::Voting { exits, .. } => elapsed_exits(exits, elapsed_ms).next().is_some(),
        }
    }

    /// Find the transition an eligible early exit calls for
    pub async fn check(
        &self,
        caps: &Capabilities,
        retry: &RetryPolicy,
        issue: &IssueRef,
        elapsed_ms: u64,
    ) -> Result<Option<Transition>> {
        if !self.any_elapsed(elapsed_ms) {
            return Ok(None);
        }

        match *self {
            Self::Discussion(exits) => {
                let ready = with_retry(retry, "get discussion readiness", || {
                    caps.issues.get_discussion_readiness(issue)
                })
                .await?;
                Ok(first_eligible_discussion_exit(exits, elapsed_ms, &ready).map(|exit| {
                    debug!(
                        issue = %issue,
                        after_ms = exit.after_ms,
                        ready = ready.len(),
                        "Discussion exit eligible"
                    );
                    Transition::OpenVoting
                }))
            }
            Self::Voting { exits, extended } => {
                let comment_id = with_retry(retry, "find voting comment", || {
                    caps.issues.find_voting_comment_id(issue)
                })
                .await?;
                let Some(comment_id) = comment_id else {
                    debug!(issue = %issue, "No voting comment yet, leaving to deadline");
                    return Ok(None);
                };

                let votes = with_retry(retry, "get vote counts", || {
                    caps.issues.get_validated_vote_counts(issue, comment_id)
                })
                .await?;
                Ok(first_eligible_voting_exit(exits, elapsed_ms, &votes).map(|exit| {
                    debug!(
                        issue = %issue,
                        after_ms = exit.after_ms,
                        voters = votes.voters.len(),
                        "Voting exit eligible"
                    );
                    Transition::close_vote(extended, VoteCriteria::from(exit).early())
                }))
            }
        }
    }

    /// Check and, on a match, perform the transition
    ///
    /// Returns `None` when the issue should wait for a later exit or the
    /// deadline, including when the vote no longer passes by the time it is
    /// closed. Evaluation failures other than access problems and missing
    /// issues defer to the deadline; transition failures always propagate.
    pub async fn run(
        &self,
        caps: &Capabilities,
        retry: &RetryPolicy,
        issue: &IssueRef,
        elapsed_ms: u64,
    ) -> Result<Option<Outcome>> {
        let transition = match self.check(caps, retry, issue, elapsed_ms).await {
            Ok(Some(transition)) => transition,
            Ok(None) => return Ok(None),
            Err(e) if e.is_not_found() || AccessKind::classify(&e).is_some() => return Err(e),
            Err(e) => {
                warn!(issue = %issue, "Early decision check failed, deferring to deadline: {}", e);
                return Ok(None);
            }
        };

        match transition.apply(caps, retry, issue).await? {
            Outcome::Deferred => {
                debug!(issue = %issue, "Early exit deferred to deadline");
                Ok(None)
            }
            outcome => Ok(Some(outcome)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_core::VoteRequirement;

    fn voting_exits(windows: &[u64]) -> Vec<AutoVotingExit> {
        windows
            .iter()
            .map(|ms| AutoVotingExit {
                after_ms: *ms,
                ..AutoVotingExit::after_minutes(1)
            })
            .collect()
    }

    #[test]
    fn test_single_exit_has_no_early_decision() {
        let job = PhaseJob::Voting(voting_exits(&[60_000]));
        assert!(EarlyDecision::for_job(&job).is_none());

        let discussion = PhaseJob::Discussion(vec![AutoDiscussionExit::after_minutes(10)]);
        assert!(EarlyDecision::for_job(&discussion).is_none());
    }

    #[test]
    fn test_multiple_exits_build_check() {
        let job = PhaseJob::ExtendedVoting(voting_exits(&[60_000, 120_000]));
        match EarlyDecision::for_job(&job) {
            Some(EarlyDecision::Voting { exits, extended }) => {
                assert!(extended);
                assert_eq!(exits.len(), 2);
                assert_eq!(exits[0].requires, VoteRequirement::Majority);
            }
            other => panic!("unexpected early decision: {:?}", other),
        }
    }

    #[test]
    fn test_nothing_elapsed() {
        let job = PhaseJob::Voting(voting_exits(&[60_000, 120_000]));
        let early = EarlyDecision::for_job(&job).unwrap();
        assert!(!early.any_elapsed(59_999));
        assert!(early.any_elapsed(60_000));
    }
}
