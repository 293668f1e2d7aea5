//! Repository discovery and policy file lookup

use std::sync::Arc;

use agora_core::{RepoRef, Result, DEFAULT_CONFIG_PATH};
use async_trait::async_trait;

use crate::api::GitHubApi;

#[async_trait]
pub trait RepositoryOperations: Send + Sync {
    /// Repositories this installation governs
    async fn list_repositories(&self) -> Result<Vec<RepoRef>>;

    /// Raw policy document; `None` when the repository has none
    async fn fetch_config(&self, repo: &RepoRef) -> Result<Option<String>>;
}

/// [`RepositoryOperations`] over a [`GitHubApi`]
pub struct GitHubRepositories<A> {
    api: Arc<A>,
    config_path: String,
}

impl<A: GitHubApi> GitHubRepositories<A> {
    pub fn new(api: Arc<A>) -> Self {
        Self {
            api,
            config_path: DEFAULT_CONFIG_PATH.to_string(),
        }
    }

    pub fn with_config_path(mut self, path: impl Into<String>) -> Self {
        self.config_path = path.into();
        self
    }
}

#[async_trait]
impl<A: GitHubApi> RepositoryOperations for GitHubRepositories<A> {
    async fn list_repositories(&self) -> Result<Vec<RepoRef>> {
        self.api.list_repositories().await
    }

    async fn fetch_config(&self, repo: &RepoRef) -> Result<Option<String>> {
        self.api.get_file(repo, &self.config_path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockGitHub;

    #[tokio::test]
    async fn test_fetch_config_from_configured_path() {
        let mock = Arc::new(MockGitHub::new());
        let repo = RepoRef::new("acme", "widgets");
        mock.set_file(&repo, ".github/governance.yml", "version: 1");

        let default_path = GitHubRepositories::new(Arc::clone(&mock));
        assert_eq!(default_path.fetch_config(&repo).await.unwrap(), None);

        let custom = GitHubRepositories::new(Arc::clone(&mock))
            .with_config_path(".github/governance.yml");
        assert_eq!(
            custom.fetch_config(&repo).await.unwrap().as_deref(),
            Some("version: 1")
        );
    }
}
