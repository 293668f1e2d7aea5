//! Comment bodies posted by the bot
//!
//! Every comment the bot relies on later carries a hidden HTML marker so it
//! can be found again without any local state.

use agora_core::{Outcome, VoteCounts};

/// Marker identifying the voting comment on an issue
pub const VOTING_MARKER: &str = "<!-- agora:voting -->";

/// Marker identifying a ready notification on a pull request
pub fn issue_ready_marker(issue_number: u64) -> String {
    format!("<!-- agora:issue-ready:{} -->", issue_number)
}

pub fn voting_comment() -> String {
    format!(
        "{}\n## Voting is open\n\n\
         React to this comment to vote:\n\
         - 👍 in favor\n\
         - 👎 against\n\
         - 😕 abstain\n\
         - 👀 needs human review\n\n\
         Only one voting reaction per person counts. Reacting with both 👍 and 👎 discards your vote.",
        VOTING_MARKER
    )
}

fn tally_line(votes: &VoteCounts) -> String {
    format!(
        "👍 {} · 👎 {} · 😕 {} · 👀 {}",
        votes.thumbs_up, votes.thumbs_down, votes.confused, votes.eyes
    )
}

/// Announcement for the end of a vote
pub fn outcome_comment(outcome: Outcome, votes: Option<&VoteCounts>) -> String {
    let headline = match outcome {
        Outcome::ReadyToImplement => "## Vote passed\n\nThis proposal is ready to implement.",
        Outcome::Rejected => "## Vote failed\n\nThis proposal was rejected and will be closed.",
        Outcome::Inconclusive => {
            "## Vote inconclusive\n\nThe vote did not reach a decision. Voting has been extended."
        }
        Outcome::NeedsHuman => {
            "## Needs human input\n\nThis proposal could not be decided automatically. A maintainer needs to take a look."
        }
        Outcome::Voting | Outcome::Skipped | Outcome::Deferred => "",
    };

    match votes {
        Some(votes) => format!("{}\n\n{}", headline, tally_line(votes)),
        None => headline.to_string(),
    }
}

/// Notification posted on a pull request that links a ready issue
pub fn issue_ready_comment(issue_number: u64) -> String {
    format!(
        "{}\nIssue #{} passed its vote and is ready to implement. This PR can now be reviewed.",
        issue_ready_marker(issue_number),
        issue_number
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voting_comment_carries_marker() {
        assert!(voting_comment().starts_with(VOTING_MARKER));
    }

    #[test]
    fn test_outcome_comment_includes_tally() {
        let votes = VoteCounts {
            thumbs_up: 4,
            thumbs_down: 1,
            ..Default::default()
        };
        let body = outcome_comment(Outcome::ReadyToImplement, Some(&votes));
        assert!(body.contains("ready to implement"));
        assert!(body.contains("👍 4"));
        assert!(body.contains("👎 1"));
    }

    #[test]
    fn test_issue_ready_marker_is_per_issue() {
        assert_ne!(issue_ready_marker(1), issue_ready_marker(12));
        assert!(issue_ready_comment(12).contains(&issue_ready_marker(12)));
    }
}
