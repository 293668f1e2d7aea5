//! Governance policy types
//!
//! [`EffectiveConfig`] is the fully resolved, bounds-clamped policy for one
//! repository. It is produced by [`crate::config::resolve_config`] on every
//! reconciliation pass and never cached across passes.

use serde::{Deserialize, Serialize};

/// Inclusive numeric range a configured value is clamped into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub min: u64,
    pub max: u64,
}

impl Bounds {
    pub const fn new(min: u64, max: u64) -> Self {
        Self { min, max }
    }

    pub fn clamp(&self, value: u64) -> u64 {
        value.clamp(self.min, self.max)
    }
}

/// Exit time window, in minutes (1 minute to 30 days)
pub const AFTER_MINUTES_BOUNDS: Bounds = Bounds::new(1, 43_200);
/// `minVoters` / `minReady`
pub const MIN_PARTICIPANTS_BOUNDS: Bounds = Bounds::new(0, 50);
/// Maximum entries in a required-participant list
pub const MAX_REQUIRED_USERS: usize = 20;
/// Maximum exits per phase
pub const MAX_EXITS_PER_PHASE: usize = 10;
pub const STALE_DAYS_BOUNDS: Bounds = Bounds::new(1, 30);
pub const MAX_PRS_PER_ISSUE_BOUNDS: Bounds = Bounds::new(1, 10);
pub const MAX_TRUSTED_REVIEWERS: usize = 20;
pub const MIN_APPROVALS_BOUNDS: Bounds = Bounds::new(1, 10);

pub const DEFAULT_AFTER_MINUTES: u64 = 1_440;
pub const DEFAULT_MIN_VOTERS: u32 = 3;
pub const DEFAULT_MIN_READY: u32 = 0;
pub const DEFAULT_STALE_DAYS: u32 = 3;
pub const DEFAULT_MAX_PRS_PER_ISSUE: u32 = 3;
pub const DEFAULT_MIN_APPROVALS: u32 = 1;
pub const DEFAULT_STANDUP_CATEGORY: &str = "Standups";

const MS_PER_MINUTE: u64 = 60_000;

/// Tally rule a vote must satisfy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteRequirement {
    /// More approvals than rejections among valid voters
    #[default]
    Majority,
    /// At least one approval and no rejections
    Unanimous,
}

impl std::fmt::Display for VoteRequirement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Majority => write!(f, "majority"),
            Self::Unanimous => write!(f, "unanimous"),
        }
    }
}

/// Users whose participation is mandatory, and how many of them must show up
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredParticipants {
    /// Always within `0..=users.len()`
    pub min_count: usize,
    /// Lowercase logins
    pub users: Vec<String>,
}

impl RequiredParticipants {
    pub fn none() -> Self {
        Self::default()
    }

    /// Every listed user is required
    pub fn all(users: Vec<String>) -> Self {
        Self {
            min_count: users.len(),
            users,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Whether at least `min_count` required users are present
    pub fn is_met_by<'a, I>(&self, present: I) -> bool
    where
        I: IntoIterator<Item = &'a String>,
    {
        if self.users.is_empty() {
            return true;
        }
        let present: Vec<String> = present.into_iter().map(|u| u.to_lowercase()).collect();
        let found = self
            .users
            .iter()
            .filter(|u| present.iter().any(|p| p == *u))
            .count();
        found >= self.min_count
    }
}

/// Time-gated exit for voting and extended voting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoVotingExit {
    pub after_ms: u64,
    pub requires: VoteRequirement,
    pub min_voters: u32,
    pub required_voters: RequiredParticipants,
}

impl AutoVotingExit {
    pub fn after_minutes(minutes: u64) -> Self {
        Self {
            after_ms: minutes * MS_PER_MINUTE,
            requires: VoteRequirement::Majority,
            min_voters: DEFAULT_MIN_VOTERS,
            required_voters: RequiredParticipants::none(),
        }
    }
}

/// Time-gated exit for discussion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoDiscussionExit {
    pub after_ms: u64,
    pub min_ready: u32,
    pub required_ready: RequiredParticipants,
}

impl AutoDiscussionExit {
    pub fn after_minutes(minutes: u64) -> Self {
        Self {
            after_ms: minutes * MS_PER_MINUTE,
            min_ready: DEFAULT_MIN_READY,
            required_ready: RequiredParticipants::none(),
        }
    }
}

/// Anything with an elapsed-time gate
pub trait TimedExit {
    fn after_ms(&self) -> u64;
}

impl TimedExit for AutoVotingExit {
    fn after_ms(&self) -> u64 {
        self.after_ms
    }
}

impl TimedExit for AutoDiscussionExit {
    fn after_ms(&self) -> u64 {
        self.after_ms
    }
}

/// Exit list of one phase
///
/// Homogeneous by construction: either manual, or one or more auto exits
/// sorted ascending by `after_ms`. The last auto exit is the deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitPolicy<E> {
    Manual,
    Auto(Vec<E>),
}

impl<E: TimedExit> ExitPolicy<E> {
    /// Build an auto policy; empty input collapses to manual
    pub fn auto(mut exits: Vec<E>) -> Self {
        if exits.is_empty() {
            return Self::Manual;
        }
        exits.sort_by_key(|e| e.after_ms());
        Self::Auto(exits)
    }

    pub fn is_auto(&self) -> bool {
        matches!(self, Self::Auto(_))
    }

    /// Auto exits in ascending window order (empty for manual)
    pub fn exits(&self) -> &[E] {
        match self {
            Self::Manual => &[],
            Self::Auto(exits) => exits,
        }
    }

    /// The largest-window exit, applied unconditionally once elapsed
    pub fn deadline(&self) -> Option<&E> {
        self.exits().last()
    }
}

/// How a pull request linked to a ready issue becomes active
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum IntakeMethod {
    /// Any new commit or comment activates the PR
    Update,
    /// Requires approvals from trusted reviewers
    Approval { min_approvals: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeReadyPolicy {
    pub min_approvals: u32,
}

/// Pull-request workflow policy (opt-in)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrPolicy {
    pub stale_days: u32,
    pub max_prs_per_issue: u32,
    pub trusted_reviewers: Vec<String>,
    pub intake: Vec<IntakeMethod>,
    pub merge_ready: Option<MergeReadyPolicy>,
}

impl Default for PrPolicy {
    fn default() -> Self {
        Self {
            stale_days: DEFAULT_STALE_DAYS,
            max_prs_per_issue: DEFAULT_MAX_PRS_PER_ISSUE,
            trusted_reviewers: Vec::new(),
            intake: vec![IntakeMethod::Update],
            merge_ready: None,
        }
    }
}

/// Standup report policy (opt-in)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandupPolicy {
    pub category: String,
}

/// Fully resolved policy for one repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveConfig {
    pub version: u32,
    pub discussion: ExitPolicy<AutoDiscussionExit>,
    pub voting: ExitPolicy<AutoVotingExit>,
    pub extended_voting: ExitPolicy<AutoVotingExit>,
    /// `None` disables all pull-request automation
    pub pr: Option<PrPolicy>,
    /// `None` disables standups
    pub standup: Option<StandupPolicy>,
}

impl EffectiveConfig {
    /// Whether any phase progresses on its own
    ///
    /// Manual-only repositories get no scheduled phase work.
    pub fn has_auto_exits(&self) -> bool {
        self.discussion.is_auto() || self.voting.is_auto() || self.extended_voting.is_auto()
    }
}

pub(crate) fn default_discussion() -> ExitPolicy<AutoDiscussionExit> {
    ExitPolicy::Auto(vec![AutoDiscussionExit::after_minutes(DEFAULT_AFTER_MINUTES)])
}

pub(crate) fn default_voting() -> ExitPolicy<AutoVotingExit> {
    ExitPolicy::Auto(vec![AutoVotingExit::after_minutes(DEFAULT_AFTER_MINUTES)])
}

impl Default for EffectiveConfig {
    fn default() -> Self {
        Self {
            version: 1,
            discussion: default_discussion(),
            voting: default_voting(),
            extended_voting: default_voting(),
            pr: None,
            standup: None,
        }
    }
}
