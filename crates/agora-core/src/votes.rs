//! Vote validation for voting comments
//!
//! Turns the raw reactions on a voting comment into a [`ValidatedVoteResult`].
//! A user who reacted with two or more different ballot kinds has cast an
//! ambiguous ballot: it is dropped from the tally and from `voters`, but the
//! user still counts as a participant for mandatory-participation checks.

use std::collections::{BTreeMap, BTreeSet};

use crate::types::{Reaction, ReactionContent, ValidatedVoteResult, VoteCounts};

/// Validate reactions on a voting comment
///
/// Non-ballot reactions (heart, rocket, ...) are ignored entirely. Repeated
/// reactions of the same kind by one user count once. Logins are normalized
/// to lowercase.
pub fn validate_votes(reactions: &[Reaction]) -> ValidatedVoteResult {
    let mut ballots: BTreeMap<String, BTreeSet<ReactionContent>> = BTreeMap::new();

    for reaction in reactions.iter().filter(|r| r.content.is_vote()) {
        let user = reaction.user.trim().to_lowercase();
        if user.is_empty() {
            continue;
        }
        ballots.entry(user).or_default().insert(reaction.content);
    }

    let mut result = ValidatedVoteResult::default();

    for (user, kinds) in ballots {
        result.participants.push(user.clone());

        if kinds.len() != 1 {
            tracing::debug!(user = %user, kinds = kinds.len(), "Discarding ambiguous ballot");
            continue;
        }

        if let Some(kind) = kinds.into_iter().next() {
            tally(&mut result.votes, kind);
            result.voters.push(user);
        }
    }

    result
}

fn tally(votes: &mut VoteCounts, kind: ReactionContent) {
    match kind {
        ReactionContent::ThumbsUp => votes.thumbs_up += 1,
        ReactionContent::ThumbsDown => votes.thumbs_down += 1,
        ReactionContent::Confused => votes.confused += 1,
        ReactionContent::Eyes => votes.eyes += 1,
        ReactionContent::Laugh
        | ReactionContent::Heart
        | ReactionContent::Hooray
        | ReactionContent::Rocket => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn r(user: &str, content: ReactionContent) -> Reaction {
        Reaction::new(user, content)
    }

    #[test]
    fn test_simple_tally() {
        let result = validate_votes(&[
            r("alice", ReactionContent::ThumbsUp),
            r("bob", ReactionContent::ThumbsUp),
            r("carol", ReactionContent::ThumbsDown),
            r("dave", ReactionContent::Eyes),
        ]);

        assert_eq!(result.votes.thumbs_up, 2);
        assert_eq!(result.votes.thumbs_down, 1);
        assert_eq!(result.votes.eyes, 1);
        assert_eq!(result.voters, vec!["alice", "bob", "carol", "dave"]);
        assert_eq!(result.participants, result.voters);
    }

    #[test]
    fn test_up_and_down_is_discarded_but_participates() {
        let result = validate_votes(&[
            r("alice", ReactionContent::ThumbsUp),
            r("alice", ReactionContent::ThumbsDown),
            r("bob", ReactionContent::ThumbsUp),
        ]);

        assert_eq!(result.votes.thumbs_up, 1);
        assert_eq!(result.votes.thumbs_down, 0);
        assert_eq!(result.voters, vec!["bob"]);
        assert_eq!(result.participants, vec!["alice", "bob"]);
    }

    #[test]
    fn test_duplicate_same_kind_counts_once() {
        let result = validate_votes(&[
            r("alice", ReactionContent::ThumbsUp),
            r("Alice", ReactionContent::ThumbsUp),
        ]);

        assert_eq!(result.votes.thumbs_up, 1);
        assert_eq!(result.voters, vec!["alice"]);
    }

    #[test]
    fn test_non_ballot_reactions_ignored() {
        let result = validate_votes(&[
            r("alice", ReactionContent::Heart),
            r("alice", ReactionContent::ThumbsDown),
            r("bob", ReactionContent::Rocket),
        ]);

        assert_eq!(result.votes.thumbs_down, 1);
        assert_eq!(result.voters, vec!["alice"]);
        assert_eq!(result.participants, vec!["alice"]);
    }

    #[test]
    fn test_no_reactions() {
        let result = validate_votes(&[]);
        assert_eq!(result, ValidatedVoteResult::default());
    }

    fn arb_content() -> impl Strategy<Value = ReactionContent> {
        prop_oneof![
            Just(ReactionContent::ThumbsUp),
            Just(ReactionContent::ThumbsDown),
            Just(ReactionContent::Confused),
            Just(ReactionContent::Eyes),
            Just(ReactionContent::Heart),
            Just(ReactionContent::Rocket),
        ]
    }

    fn arb_reactions() -> impl Strategy<Value = Vec<Reaction>> {
        prop::collection::vec(
            (prop::sample::select(vec!["u1", "u2", "u3", "u4", "u5"]), arb_content())
                .prop_map(|(user, content)| Reaction::new(user, content)),
            0..30,
        )
    }

    proptest! {
        // Property: voters are always a subset of participants
        #[test]
        fn prop_voters_subset_of_participants(reactions in arb_reactions()) {
            let result = validate_votes(&reactions);
            prop_assert!(result.voters.len() <= result.participants.len());
            for voter in &result.voters {
                prop_assert!(result.participants.contains(voter));
            }
        }

        // Property: tally size equals number of valid voters
        #[test]
        fn prop_tally_matches_voters(reactions in arb_reactions()) {
            let result = validate_votes(&reactions);
            let v = result.votes;
            let total = v.thumbs_up + v.thumbs_down + v.confused + v.eyes;
            prop_assert_eq!(total as usize, result.voters.len());
        }

        // Property: anyone with both up and down participates but never votes
        #[test]
        fn prop_up_and_down_never_votes(reactions in arb_reactions()) {
            let result = validate_votes(&reactions);
            for user in ["u1", "u2", "u3", "u4", "u5"] {
                let cast = |kind: ReactionContent| {
                    reactions.iter().any(|r| r.user == user && r.content == kind)
                };
                let up = cast(ReactionContent::ThumbsUp);
                let down = cast(ReactionContent::ThumbsDown);
                if up && down {
                    prop_assert!(result.participants.iter().any(|p| p == user));
                    prop_assert!(!result.voters.iter().any(|p| p == user));
                }
            }
        }
    }
}
