//! Capability bundle handed to the reconciler

use std::sync::Arc;

use agora_core::DEFAULT_CONFIG_PATH;
use agora_github::{
    GitHubApi, GitHubIssues, GitHubPulls, GitHubRepositories, GovernanceActions, IssueOperations,
    LabelGovernance, PrOperations, RepositoryOperations,
};

/// Everything the reconciler may call for one installation
#[derive(Clone)]
pub struct Capabilities {
    pub repositories: Arc<dyn RepositoryOperations>,
    pub issues: Arc<dyn IssueOperations>,
    pub governance: Arc<dyn GovernanceActions>,
    pub pulls: Arc<dyn PrOperations>,
}

/// Options for building GitHub-backed capabilities
#[derive(Debug, Clone)]
pub struct GitHubOptions {
    pub bot_login: Option<String>,
    pub config_path: String,
}

impl Default for GitHubOptions {
    fn default() -> Self {
        Self {
            bot_login: None,
            config_path: DEFAULT_CONFIG_PATH.to_string(),
        }
    }
}

impl Capabilities {
    /// All capabilities backed by one API client
    pub fn github<A: GitHubApi + 'static>(api: Arc<A>, options: &GitHubOptions) -> Self {
        let mut issues = GitHubIssues::new(Arc::clone(&api));
        let mut governance = LabelGovernance::new(Arc::clone(&api));
        if let Some(login) = &options.bot_login {
            issues = issues.with_bot_login(login.clone());
            governance = governance.with_bot_login(login.clone());
        }

        let repositories =
            GitHubRepositories::new(Arc::clone(&api)).with_config_path(options.config_path.clone());

        Self {
            repositories: Arc::new(repositories),
            issues: Arc::new(issues),
            governance: Arc::new(governance),
            pulls: Arc::new(GitHubPulls::new(api)),
        }
    }
}
