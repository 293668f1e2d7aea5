//! Aggregated results of a scheduled run

use agora_core::Outcome;
use tracing::{info, warn};

use crate::reconciler::{IssueResult, PhaseReport};
use crate::retry::AccessKind;

/// Counters accumulated across every installation and repository
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub installations: usize,
    pub failed_installations: usize,
    pub repositories_processed: usize,
    pub repositories_without_auto_exits: usize,
    pub failed_repositories: usize,
    pub transitions: usize,
    pub early_transitions: usize,
    pub needs_human: usize,
    pub pending: usize,
    pub skipped: usize,
    pub rate_limited: usize,
    pub forbidden: usize,
    pub failed_issues: usize,
    pub voting_comments_repaired: usize,
}

impl RunSummary {
    pub fn record_access(&mut self, kind: AccessKind) {
        match kind {
            AccessKind::RateLimited => self.rate_limited += 1,
            AccessKind::Forbidden => self.forbidden += 1,
        }
    }

    pub fn record_issue(&mut self, result: &IssueResult) {
        match result {
            IssueResult::Transitioned { outcome, early } => {
                self.transitions += 1;
                if *early {
                    self.early_transitions += 1;
                }
                if *outcome == Outcome::NeedsHuman {
                    self.needs_human += 1;
                }
            }
            IssueResult::Pending { .. } => self.pending += 1,
            IssueResult::Skipped(_) => self.skipped += 1,
            IssueResult::AccessIssue(kind) => self.record_access(*kind),
            IssueResult::Failed(_) => self.failed_issues += 1,
        }
    }

    pub fn record_phase(&mut self, report: &PhaseReport) {
        for (_, result) in &report.results {
            self.record_issue(result);
        }
    }

    pub fn access_issues(&self) -> usize {
        self.rate_limited + self.forbidden
    }

    /// Whether every installation failed to enumerate its repositories
    pub fn all_installations_failed(&self) -> bool {
        self.installations > 0 && self.failed_installations == self.installations
    }

    /// Emit the end-of-run report
    pub fn log(&self) {
        info!(
            repositories = self.repositories_processed,
            manual_only = self.repositories_without_auto_exits,
            transitions = self.transitions,
            early = self.early_transitions,
            pending = self.pending,
            repaired = self.voting_comments_repaired,
            "Run complete: {}",
            self
        );
        if self.needs_human > 0 {
            warn!(count = self.needs_human, "Issues need human input");
        }
        if self.access_issues() > 0 {
            warn!(
                rate_limited = self.rate_limited,
                forbidden = self.forbidden,
                "Some issues or repositories could not be accessed; they will be retried next run"
            );
        }
        if self.failed_issues > 0 || self.failed_repositories > 0 {
            warn!(
                issues = self.failed_issues,
                repositories = self.failed_repositories,
                "Failures during run"
            );
        }
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} repositories, {} transitions ({} early), {} needs human, \
             {} rate limited, {} forbidden, {} failed",
            self.repositories_processed,
            self.transitions,
            self.early_transitions,
            self.needs_human,
            self.rate_limited,
            self.forbidden,
            self.failed_issues
        )
    }
}
