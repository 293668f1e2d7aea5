//! # agora-core
//!
//! Core types for the Agora proposal governance workflow.
//!
//! Proposals (repository issues) move through Discussion → Voting →
//! (optionally) Extended Voting → a terminal outcome. Phase markers live on
//! the host platform as labels; nothing is persisted anywhere else.
//!
//! This crate holds everything that needs no I/O:
//! - Domain types and the error taxonomy
//! - The phase label alias table
//! - Repository policy resolution (`.github/agora.yml`)
//! - Vote validation and exit evaluation

mod error;
mod types;

pub mod config;
pub mod exits;
pub mod labels;
pub mod policy;
pub mod side_effects;
pub mod votes;

pub use config::{
    resolve_config, resolve_config_with_warnings, ConfigWarning, DEFAULT_CONFIG_PATH,
};
pub use error::{AgoraError, NetworkErrorKind, Result};
pub use exits::{decide_outcome, is_discussion_exit_eligible, is_exit_eligible, VoteCriteria};
pub use policy::{
    AutoDiscussionExit, AutoVotingExit, EffectiveConfig, ExitPolicy, IntakeMethod,
    MergeReadyPolicy, PrPolicy, RequiredParticipants, StandupPolicy, VoteRequirement,
};
pub use side_effects::best_effort;
pub use types::*;
pub use votes::validate_votes;
