//! Exit evaluation
//!
//! Pure decision functions over an exit policy and the current signals of an
//! issue. No I/O happens here; the reconciler fetches the signals and applies
//! the resulting transitions.

use std::collections::HashSet;

use crate::policy::{
    AutoDiscussionExit, AutoVotingExit, RequiredParticipants, TimedExit, VoteRequirement,
};
use crate::types::{Outcome, ValidatedVoteResult, VoteCounts};

/// Whether a tally satisfies a vote requirement
pub fn requirement_met(requires: VoteRequirement, votes: &VoteCounts) -> bool {
    match requires {
        VoteRequirement::Majority => votes.thumbs_up > votes.thumbs_down,
        VoteRequirement::Unanimous => votes.thumbs_down == 0 && votes.thumbs_up > 0,
    }
}

/// Whether a voting exit's criteria hold for the current tally
///
/// Quorum counts only unambiguous voters; mandatory participation counts
/// every participant, including discarded ambiguous ballots.
pub fn is_exit_eligible(exit: &AutoVotingExit, votes: &ValidatedVoteResult) -> bool {
    votes.voters.len() >= exit.min_voters as usize
        && exit.required_voters.is_met_by(&votes.participants)
        && requirement_met(exit.requires, &votes.votes)
}

/// Whether a discussion exit's readiness criteria hold
pub fn is_discussion_exit_eligible(
    exit: &AutoDiscussionExit,
    ready_users: &HashSet<String>,
) -> bool {
    ready_users.len() >= exit.min_ready as usize && exit.required_ready.is_met_by(ready_users)
}

/// Exits whose own window has elapsed, in ascending window order
pub fn elapsed_exits<E: TimedExit>(exits: &[E], elapsed_ms: u64) -> impl Iterator<Item = &E> {
    exits.iter().filter(move |e| e.after_ms() <= elapsed_ms)
}

/// First elapsed voting exit whose criteria hold
pub fn first_eligible_voting_exit<'a>(
    exits: &'a [AutoVotingExit],
    elapsed_ms: u64,
    votes: &ValidatedVoteResult,
) -> Option<&'a AutoVotingExit> {
    elapsed_exits(exits, elapsed_ms).find(|exit| is_exit_eligible(exit, votes))
}

/// First elapsed discussion exit whose criteria hold
pub fn first_eligible_discussion_exit<'a>(
    exits: &'a [AutoDiscussionExit],
    elapsed_ms: u64,
    ready_users: &HashSet<String>,
) -> Option<&'a AutoDiscussionExit> {
    elapsed_exits(exits, elapsed_ms).find(|exit| is_discussion_exit_eligible(exit, ready_users))
}

/// Criteria applied when a vote is closed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteCriteria {
    pub requires: VoteRequirement,
    pub min_voters: u32,
    pub required_voters: RequiredParticipants,
    /// Closing before the deadline: only a passing result may end the vote
    pub early: bool,
}

impl VoteCriteria {
    /// Same criteria, applied by an early exit
    pub fn early(mut self) -> Self {
        self.early = true;
        self
    }
}

impl From<&AutoVotingExit> for VoteCriteria {
    fn from(exit: &AutoVotingExit) -> Self {
        Self {
            requires: exit.requires,
            min_voters: exit.min_voters,
            required_voters: exit.required_voters.clone(),
            early: false,
        }
    }
}

/// Decide how a closed vote ends
///
/// Returns [`Outcome::Inconclusive`] when quorum or mandatory participation
/// fails or the tally is undecided; callers in extended voting map that to
/// [`Outcome::NeedsHuman`].
pub fn decide_outcome(criteria: &VoteCriteria, votes: &ValidatedVoteResult) -> Outcome {
    let tally = &votes.votes;

    if votes.voters.len() < criteria.min_voters as usize
        || !criteria.required_voters.is_met_by(&votes.participants)
    {
        return Outcome::Inconclusive;
    }
    if tally.eyes > tally.thumbs_up && tally.eyes > tally.thumbs_down {
        return Outcome::NeedsHuman;
    }
    if requirement_met(criteria.requires, tally) {
        return Outcome::ReadyToImplement;
    }
    if tally.thumbs_down > tally.thumbs_up {
        return Outcome::Rejected;
    }
    Outcome::Inconclusive
}

#[cfg(test)]
mod tests {
    use super::*;

    fn votes(up: u32, down: u32, voters: &[&str], participants: &[&str]) -> ValidatedVoteResult {
        ValidatedVoteResult {
            votes: VoteCounts {
                thumbs_up: up,
                thumbs_down: down,
                ..Default::default()
            },
            voters: voters.iter().map(|s| s.to_string()).collect(),
            participants: participants.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn voting_exit(after_ms: u64, requires: VoteRequirement, min_voters: u32) -> AutoVotingExit {
        AutoVotingExit {
            after_ms,
            requires,
            min_voters,
            required_voters: RequiredParticipants::none(),
        }
    }

    #[test]
    fn test_majority_and_unanimous() {
        let tally = VoteCounts {
            thumbs_up: 3,
            thumbs_down: 1,
            ..Default::default()
        };
        assert!(requirement_met(VoteRequirement::Majority, &tally));
        assert!(!requirement_met(VoteRequirement::Unanimous, &tally));

        let empty = VoteCounts::default();
        assert!(!requirement_met(VoteRequirement::Majority, &empty));
        assert!(!requirement_met(VoteRequirement::Unanimous, &empty));
    }

    #[test]
    fn test_quorum_counts_only_valid_voters() {
        let exit = voting_exit(0, VoteRequirement::Majority, 2);
        // bob cast an ambiguous ballot: participant but not voter
        let result = votes(1, 0, &["alice"], &["alice", "bob"]);
        assert!(!is_exit_eligible(&exit, &result));
    }

    #[test]
    fn test_required_voters_count_ambiguous_participants() {
        let exit = AutoVotingExit {
            required_voters: RequiredParticipants::all(vec!["bob".to_string()]),
            ..voting_exit(0, VoteRequirement::Majority, 1)
        };
        let result = votes(1, 0, &["alice"], &["alice", "bob"]);
        assert!(is_exit_eligible(&exit, &result));

        let absent = votes(1, 0, &["alice"], &["alice"]);
        assert!(!is_exit_eligible(&exit, &absent));
    }

    #[test]
    fn test_first_eligible_exit_wins_in_window_order() {
        let exits = vec![
            voting_exit(60_000, VoteRequirement::Majority, 1),
            voting_exit(120_000, VoteRequirement::Unanimous, 3),
        ];
        let result = votes(2, 0, &["alice", "bob"], &["alice", "bob"]);

        let chosen = first_eligible_voting_exit(&exits, 70_000, &result).unwrap();
        assert_eq!(chosen.after_ms, 60_000);

        // Before the first window nothing is eligible
        assert!(first_eligible_voting_exit(&exits, 30_000, &result).is_none());
    }

    #[test]
    fn test_later_exit_can_match_when_earlier_does_not() {
        let exits = vec![
            voting_exit(60_000, VoteRequirement::Unanimous, 5),
            voting_exit(90_000, VoteRequirement::Majority, 2),
            voting_exit(120_000, VoteRequirement::Majority, 1),
        ];
        let result = votes(2, 1, &["a", "b", "c"], &["a", "b", "c"]);
        let chosen = first_eligible_voting_exit(&exits, 100_000, &result).unwrap();
        assert_eq!(chosen.after_ms, 90_000);
    }

    #[test]
    fn test_discussion_eligibility() {
        let exit = AutoDiscussionExit {
            after_ms: 0,
            min_ready: 2,
            required_ready: RequiredParticipants::all(vec!["carol".to_string()]),
        };
        let ready: HashSet<String> = ["alice", "carol"].iter().map(|s| s.to_string()).collect();
        assert!(is_discussion_exit_eligible(&exit, &ready));

        let missing: HashSet<String> = ["alice", "bob"].iter().map(|s| s.to_string()).collect();
        assert!(!is_discussion_exit_eligible(&exit, &missing));

        let too_few: HashSet<String> = ["carol"].iter().map(|s| s.to_string()).collect();
        assert!(!is_discussion_exit_eligible(&exit, &too_few));
    }

    #[test]
    fn test_decide_outcome() {
        let criteria = VoteCriteria::from(&voting_exit(0, VoteRequirement::Majority, 2));

        assert_eq!(
            decide_outcome(&criteria, &votes(2, 0, &["a", "b"], &["a", "b"])),
            Outcome::ReadyToImplement
        );
        assert_eq!(
            decide_outcome(&criteria, &votes(0, 2, &["a", "b"], &["a", "b"])),
            Outcome::Rejected
        );
        assert_eq!(
            decide_outcome(&criteria, &votes(1, 1, &["a", "b"], &["a", "b"])),
            Outcome::Inconclusive
        );
        // Below quorum
        assert_eq!(
            decide_outcome(&criteria, &votes(1, 0, &["a"], &["a"])),
            Outcome::Inconclusive
        );
    }

    #[test]
    fn test_decide_outcome_needs_human() {
        let criteria = VoteCriteria::from(&voting_exit(0, VoteRequirement::Majority, 1));
        let mut result = votes(1, 0, &["a", "b", "c"], &["a", "b", "c"]);
        result.votes.eyes = 2;
        assert_eq!(decide_outcome(&criteria, &result), Outcome::NeedsHuman);
    }

    #[test]
    fn test_unanimous_with_dissent_is_not_ready() {
        let criteria = VoteCriteria::from(&voting_exit(0, VoteRequirement::Unanimous, 1));
        assert_eq!(
            decide_outcome(&criteria, &votes(3, 1, &["a", "b", "c", "d"], &["a", "b", "c", "d"])),
            Outcome::Inconclusive
        );
    }
}
