//! # agora-reconciler
//!
//! Scheduled reconciliation for Agora governance.
//!
//! Since no state is stored anywhere but on GitHub, every run recomputes
//! each issue's position from its labels and reactions:
//! - [`Orchestrator`] walks installations and repositories
//! - [`PhaseReconciler`] decides, per issue, whether a phase is due to end
//! - [`EarlyDecision`] closes a phase early when an earlier exit is satisfied
//! - [`with_retry`] wraps every API call with exponential backoff

pub mod capabilities;
pub mod early_decision;
pub mod orchestrator;
pub mod reconciler;
pub mod retry;
pub mod summary;

pub use capabilities::{Capabilities, GitHubOptions};
pub use early_decision::EarlyDecision;
pub use orchestrator::{Installation, Orchestrator};
pub use reconciler::{IssueResult, PhaseJob, PhaseReconciler, PhaseReport, Transition};
pub use retry::{is_retryable, with_retry, AccessKind, RetryPolicy};
pub use summary::RunSummary;
