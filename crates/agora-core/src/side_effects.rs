//! Best-effort follow-ups to a phase transition
//!
//! Once the labels have moved, the transition has happened. Announcements,
//! closing a rejected issue and linked-PR notifications are follow-ups: a
//! failure is logged against the issue and dropped, and the caller carries on.
//! Label mutations and the reads that feed a vote decision never go through
//! here.

use std::future::Future;

use tracing::warn;

use crate::types::IssueRef;
use crate::Result;

/// Run a follow-up for `issue`, returning `None` if it failed
pub async fn best_effort<F, Fut, T>(issue: &IssueRef, action: &str, f: F) -> Option<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    f().await
        .map_err(|e| warn!(issue = %issue, action, "Follow-up failed, continuing: {}", e))
        .ok()
}
