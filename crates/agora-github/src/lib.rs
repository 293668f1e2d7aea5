//! # agora-github
//!
//! GitHub capabilities for the Agora governance workflow.
//!
//! The reconciler depends only on the capability traits defined here
//! ([`IssueOperations`], [`GovernanceActions`], [`PrOperations`],
//! [`RepositoryOperations`]). Each is implemented once over the low-level
//! [`GitHubApi`] trait, which has a real REST client ([`GitHubClient`]) and
//! an in-memory one for tests ([`MockGitHub`]).

pub mod api;
pub mod client;
pub mod governance;
pub mod issues;
pub mod messages;
pub mod mock;
pub mod pulls;
pub mod repos;

pub use api::{CloseReason, Comment, GitHubApi, IssueDetails, LabelEvent, UserReaction};
pub use client::{GitHubClient, DEFAULT_API_URL};
pub use governance::{GovernanceActions, LabelGovernance};
pub use issues::{GitHubIssues, IssueOperations};
pub use mock::{MockCall, MockFailure, MockGitHub, MockOp};
pub use pulls::{GitHubPulls, PrOperations};
pub use repos::{GitHubRepositories, RepositoryOperations};
