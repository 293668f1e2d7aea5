//! Core type definitions for Agora governance

use serde::{Deserialize, Serialize};

/// Governance phase of a proposal, stored on the issue as a label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Discussion,
    Voting,
    ExtendedVoting,
    ReadyToImplement,
    Rejected,
    NeedsHuman,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::Discussion,
        Phase::Voting,
        Phase::ExtendedVoting,
        Phase::ReadyToImplement,
        Phase::Rejected,
        Phase::NeedsHuman,
    ];

    /// Phases a governance action can move an issue into from this one
    pub fn successors(&self) -> &'static [Phase] {
        match self {
            Self::Discussion => &[Self::Voting],
            Self::Voting => &[
                Self::ReadyToImplement,
                Self::Rejected,
                Self::ExtendedVoting,
                Self::NeedsHuman,
            ],
            Self::ExtendedVoting => &[Self::ReadyToImplement, Self::Rejected, Self::NeedsHuman],
            Self::ReadyToImplement | Self::Rejected | Self::NeedsHuman => &[],
        }
    }

    /// Phases in which a voting comment must exist
    pub fn is_voting(&self) -> bool {
        matches!(self, Self::Voting | Self::ExtendedVoting)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Discussion => write!(f, "discussion"),
            Self::Voting => write!(f, "voting"),
            Self::ExtendedVoting => write!(f, "extended_voting"),
            Self::ReadyToImplement => write!(f, "ready_to_implement"),
            Self::Rejected => write!(f, "rejected"),
            Self::NeedsHuman => write!(f, "needs_human"),
        }
    }
}

impl std::str::FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "discussion" => Ok(Self::Discussion),
            "voting" => Ok(Self::Voting),
            "extended_voting" | "extended-voting" | "extendedvoting" => Ok(Self::ExtendedVoting),
            "ready_to_implement" | "ready-to-implement" => Ok(Self::ReadyToImplement),
            "rejected" => Ok(Self::Rejected),
            "needs_human" | "needs-human" => Ok(Self::NeedsHuman),
            _ => Err(format!("Invalid phase: {}", s)),
        }
    }
}

/// Repository address
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub repo: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }

    /// Address an issue in this repository
    pub fn issue(&self, issue_number: u64) -> IssueRef {
        IssueRef {
            owner: self.owner.clone(),
            repo: self.repo.clone(),
            issue_number,
        }
    }
}

impl std::fmt::Display for RepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// Issue address; the only identity a proposal has
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IssueRef {
    pub owner: String,
    pub repo: String,
    pub issue_number: u64,
}

impl IssueRef {
    pub fn repo_ref(&self) -> RepoRef {
        RepoRef::new(self.owner.clone(), self.repo.clone())
    }
}

impl std::fmt::Display for IssueRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.repo, self.issue_number)
    }
}

/// Reaction kinds the host platform supports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ReactionContent {
    #[serde(rename = "+1")]
    ThumbsUp,
    #[serde(rename = "-1")]
    ThumbsDown,
    #[serde(rename = "laugh")]
    Laugh,
    #[serde(rename = "confused")]
    Confused,
    #[serde(rename = "heart")]
    Heart,
    #[serde(rename = "hooray")]
    Hooray,
    #[serde(rename = "rocket")]
    Rocket,
    #[serde(rename = "eyes")]
    Eyes,
}

impl ReactionContent {
    /// Whether this reaction is a ballot on a voting comment
    pub fn is_vote(&self) -> bool {
        matches!(
            self,
            Self::ThumbsUp | Self::ThumbsDown | Self::Confused | Self::Eyes
        )
    }
}

impl std::str::FromStr for ReactionContent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "+1" => Ok(Self::ThumbsUp),
            "-1" => Ok(Self::ThumbsDown),
            "laugh" => Ok(Self::Laugh),
            "confused" => Ok(Self::Confused),
            "heart" => Ok(Self::Heart),
            "hooray" => Ok(Self::Hooray),
            "rocket" => Ok(Self::Rocket),
            "eyes" => Ok(Self::Eyes),
            _ => Err(format!("Invalid reaction: {}", s)),
        }
    }
}

/// A single reaction left by a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub user: String,
    pub content: ReactionContent,
}

impl Reaction {
    pub fn new(user: impl Into<String>, content: ReactionContent) -> Self {
        Self {
            user: user.into(),
            content,
        }
    }
}

/// Tally of unambiguous ballots
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCounts {
    pub thumbs_up: u32,
    pub thumbs_down: u32,
    pub confused: u32,
    pub eyes: u32,
}

/// Validated vote tally for a voting comment
///
/// `voters` holds users with exactly one distinct ballot kind; `participants`
/// holds everyone who cast any ballot, including discarded ambiguous ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedVoteResult {
    pub votes: VoteCounts,
    pub voters: Vec<String>,
    pub participants: Vec<String>,
}

/// Result of a governance action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Discussion closed, voting opened
    Voting,
    ReadyToImplement,
    Rejected,
    /// Vote undecided; moved to extended voting
    Inconclusive,
    NeedsHuman,
    /// Nothing done: the issue was closed or had already left the phase
    Skipped,
    /// Nothing done: an early exit no longer passes, the deadline decides
    Deferred,
}

impl Outcome {
    /// Outcome that lets implementation start
    pub fn is_passing(&self) -> bool {
        matches!(self, Self::ReadyToImplement)
    }

    /// Outcome of a move into `phase`
    pub fn reaching(phase: Phase) -> Option<Self> {
        match phase {
            Phase::Discussion => None,
            Phase::Voting => Some(Self::Voting),
            Phase::ExtendedVoting => Some(Self::Inconclusive),
            Phase::ReadyToImplement => Some(Self::ReadyToImplement),
            Phase::Rejected => Some(Self::Rejected),
            Phase::NeedsHuman => Some(Self::NeedsHuman),
        }
    }

    /// Phase the issue lands in, if it moved
    pub fn target_phase(&self) -> Option<Phase> {
        match self {
            Self::Voting => Some(Phase::Voting),
            Self::ReadyToImplement => Some(Phase::ReadyToImplement),
            Self::Rejected => Some(Phase::Rejected),
            Self::Inconclusive => Some(Phase::ExtendedVoting),
            Self::NeedsHuman => Some(Phase::NeedsHuman),
            Self::Skipped | Self::Deferred => None,
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Voting => write!(f, "voting"),
            Self::ReadyToImplement => write!(f, "ready_to_implement"),
            Self::Rejected => write!(f, "rejected"),
            Self::Inconclusive => write!(f, "inconclusive"),
            Self::NeedsHuman => write!(f, "needs_human"),
            Self::Skipped => write!(f, "skipped"),
            Self::Deferred => write!(f, "deferred"),
        }
    }
}

/// Result of an idempotent voting-comment post
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostResult {
    Posted,
    AlreadyExists,
}
