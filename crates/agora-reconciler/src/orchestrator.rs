//! Run orchestrator: one scheduled pass over every installation
//!
//! Repositories, phases and issues are processed strictly one after another
//! so a run stays within a single shared rate-limit budget. Nothing is
//! carried between repositories except the summary counters.

use agora_core::{resolve_config, AgoraError, EffectiveConfig, Phase, RepoRef, Result};
use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use crate::capabilities::Capabilities;
use crate::reconciler::{PhaseJob, PhaseReconciler};
use crate::retry::{with_retry, AccessKind, RetryPolicy};
use crate::summary::RunSummary;

/// One credential and the capabilities built on it
#[derive(Clone)]
pub struct Installation {
    pub name: String,
    pub capabilities: Capabilities,
}

impl Installation {
    pub fn new(name: impl Into<String>, capabilities: Capabilities) -> Self {
        Self {
            name: name.into(),
            capabilities,
        }
    }
}

pub struct Orchestrator {
    installations: Vec<Installation>,
    retry: RetryPolicy,
}

impl Orchestrator {
    pub fn new(installations: Vec<Installation>, retry: RetryPolicy) -> Self {
        Self {
            installations,
            retry,
        }
    }

    /// Run one pass
    ///
    /// Per-issue and per-repository problems are counted, never returned.
    /// Fails only when every installation failed to list its repositories.
    pub async fn run(&self) -> Result<RunSummary> {
        let mut summary = RunSummary::default();

        for installation in &self.installations {
            summary.installations += 1;
            if let Err(e) = self.run_installation(installation, &mut summary).await {
                error!(installation = %installation.name, "Failed to list repositories: {}", e);
                summary.failed_installations += 1;
            }
        }

        summary.log();

        if summary.all_installations_failed() {
            return Err(AgoraError::Governance(format!(
                "all {} installations failed to list repositories",
                summary.installations
            )));
        }
        Ok(summary)
    }

    #[instrument(skip_all, fields(installation = %installation.name))]
    async fn run_installation(
        &self,
        installation: &Installation,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let caps = &installation.capabilities;
        let repos = with_retry(&self.retry, "list repositories", || {
            caps.repositories.list_repositories()
        })
        .await?;
        info!(count = repos.len(), "Processing repositories");

        for repo in repos {
            self.run_repository(caps, &repo, summary).await;
        }
        Ok(())
    }

    /// Reconcile one repository
    #[instrument(skip_all, fields(repo = %repo))]
    pub async fn run_repository(
        &self,
        caps: &Capabilities,
        repo: &RepoRef,
        summary: &mut RunSummary,
    ) {
        let Some(config) = self.load_config(caps, repo, summary).await else {
            return;
        };
        summary.repositories_processed += 1;

        if config.has_auto_exits() {
            self.reconcile_phases(caps, repo, &config, summary).await;
        } else {
            info!("All phases use manual exits, skipping scheduled transitions");
            summary.repositories_without_auto_exits += 1;
        }

        self.repair_voting_comments(caps, repo, summary).await;
    }

    async fn load_config(
        &self,
        caps: &Capabilities,
        repo: &RepoRef,
        summary: &mut RunSummary,
    ) -> Option<EffectiveConfig> {
        let fetched = with_retry(&self.retry, "fetch config", || {
            caps.repositories.fetch_config(repo)
        })
        .await;
        let document = match fetched {
            Ok(document) => document,
            Err(e) if e.is_not_found() => None,
            Err(e) => {
                if let Some(kind) = AccessKind::classify(&e) {
                    warn!(
                        access = %kind,
                        "Cannot read repository config, skipping repository: {}",
                        e
                    );
                    summary.record_access(kind);
                    return None;
                }
                warn!("Failed to fetch config, using defaults: {}", e);
                None
            }
        };
        Some(resolve_config(document.as_deref()))
    }

    async fn reconcile_phases(
        &self,
        caps: &Capabilities,
        repo: &RepoRef,
        config: &EffectiveConfig,
        summary: &mut RunSummary,
    ) {
        let reconciler = PhaseReconciler::new(caps.clone(), self.retry.clone())
            .with_pr_notifications(config.pr.is_some());
        let now = Utc::now();
        let mut failed = false;

        for job in PhaseJob::from_config(config) {
            match reconciler.reconcile_phase(repo, &job, now).await {
                Ok(report) => {
                    debug!(
                        phase = %report.phase,
                        transitioned = report.transitioned(),
                        "Phase reconciled"
                    );
                    summary.record_phase(&report);
                }
                Err(e) => match AccessKind::classify(&e) {
                    Some(kind) => {
                        warn!(
                            phase = %job.phase(),
                            access = %kind,
                            "Cannot list phase issues: {}",
                            e
                        );
                        summary.record_access(kind);
                    }
                    None => {
                        error!(phase = %job.phase(), "Phase reconciliation failed: {}", e);
                        failed = true;
                    }
                },
            }
        }

        if failed {
            summary.failed_repositories += 1;
        }
    }

    /// Recreate voting comments that are missing; never touches labels or votes
    async fn repair_voting_comments(
        &self,
        caps: &Capabilities,
        repo: &RepoRef,
        summary: &mut RunSummary,
    ) {
        for phase in Phase::ALL.into_iter().filter(Phase::is_voting) {
            let numbers = match with_retry(&self.retry, "list phase issues", || {
                caps.issues.list_phase_issues(repo, phase)
            })
            .await
            {
                Ok(numbers) => numbers,
                Err(e) => {
                    if let Some(kind) = AccessKind::classify(&e) {
                        summary.record_access(kind);
                    }
                    warn!(phase = %phase, "Cannot list issues for voting comment repair: {}", e);
                    continue;
                }
            };

            for number in numbers {
                let issue = repo.issue(number);
                match with_retry(&self.retry, "post voting comment", || {
                    caps.issues.post_voting_comment(&issue)
                })
                .await
                {
                    Ok(agora_core::PostResult::Posted) => {
                        info!(issue = %issue, "Repaired missing voting comment");
                        summary.voting_comments_repaired += 1;
                    }
                    Ok(agora_core::PostResult::AlreadyExists) => {}
                    Err(e) if e.is_not_found() => {}
                    Err(e) => {
                        if let Some(kind) = AccessKind::classify(&e) {
                            summary.record_access(kind);
                        }
                        warn!(issue = %issue, "Voting comment repair failed: {}", e);
                    }
                }
            }
        }
    }
}
