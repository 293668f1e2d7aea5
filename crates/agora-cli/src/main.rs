//! Agora CLI - scheduled proposal governance
//!
//! Runs one reconciliation pass over every repository the configured
//! credentials can reach, then exits. Meant to be invoked from cron or a
//! scheduled CI workflow. The binary takes no arguments; every setting
//! comes from the environment.
//!
//! Usage:
//!   GITHUB_TOKEN=... agora
//!   AGORA_INSTALLATION_TOKENS=acme=...,widgets-co=... AGORA_VERBOSE=true agora

use std::ffi::OsString;
use std::sync::Arc;
use std::time::Duration;

use agora_core::DEFAULT_CONFIG_PATH;
use agora_github::{GitHubClient, DEFAULT_API_URL};
use agora_reconciler::retry::{
    DEFAULT_INITIAL_DELAY_MS, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY_MS, DEFAULT_MAX_ELAPSED_MS,
};
use agora_reconciler::{Capabilities, GitHubOptions, Installation, Orchestrator, RetryPolicy};
use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const DEFAULT_INSTALLATION: &str = "default";

/// Process settings
///
/// Parsed from the environment only: [`Settings::from_env`] hands clap the
/// binary name and nothing else, so the long names below are never
/// accepted on the command line.
#[derive(Parser)]
#[command(name = "agora")]
#[command(author, version, about = "Scheduled proposal governance for GitHub repositories")]
struct Settings {
    /// Enable verbose logging (ignored when RUST_LOG is set)
    #[arg(long, env = "AGORA_VERBOSE")]
    verbose: bool,

    /// Token for a single installation
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    github_token: Option<String>,

    /// Several installations as `name=token,name=token`
    #[arg(long, env = "AGORA_INSTALLATION_TOKENS", hide_env_values = true)]
    installation_tokens: Option<String>,

    /// GitHub REST API root
    #[arg(long, env = "AGORA_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Login of the bot account, if it is not a GitHub App
    #[arg(long, env = "AGORA_BOT_LOGIN")]
    bot_login: Option<String>,

    /// Policy file path inside each repository
    #[arg(long, env = "AGORA_CONFIG_PATH", default_value = DEFAULT_CONFIG_PATH)]
    config_path: String,

    #[arg(long, env = "AGORA_RETRY_MAX_ATTEMPTS", default_value_t = DEFAULT_MAX_ATTEMPTS)]
    retry_max_attempts: u32,

    #[arg(
        long,
        env = "AGORA_RETRY_INITIAL_DELAY_MS",
        default_value_t = DEFAULT_INITIAL_DELAY_MS
    )]
    retry_initial_delay_ms: u64,

    #[arg(long, env = "AGORA_RETRY_MAX_DELAY_MS", default_value_t = DEFAULT_MAX_DELAY_MS)]
    retry_max_delay_ms: u64,

    #[arg(long, env = "AGORA_RETRY_MAX_ELAPSED_MS", default_value_t = DEFAULT_MAX_ELAPSED_MS)]
    retry_max_elapsed_ms: u64,
}

impl Settings {
    /// Read settings from the environment, refusing any command-line argument
    fn from_env(args: impl IntoIterator<Item = OsString>) -> Result<Self> {
        let mut args = args.into_iter();
        let binary = args.next().unwrap_or_else(|| OsString::from("agora"));
        if let Some(extra) = args.next() {
            bail!(
                "agora takes no arguments (got {:?}); configure it through the environment",
                extra
            );
        }
        Self::try_parse_from([binary]).context("Invalid settings in environment")
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_max_attempts.max(1),
            initial_delay: Duration::from_millis(self.retry_initial_delay_ms),
            max_delay: Duration::from_millis(
                self.retry_max_delay_ms.max(self.retry_initial_delay_ms),
            ),
            max_elapsed: Duration::from_millis(self.retry_max_elapsed_ms),
            ..RetryPolicy::default()
        }
    }

    fn github_options(&self) -> GitHubOptions {
        GitHubOptions {
            bot_login: self.bot_login.clone(),
            config_path: self.config_path.clone(),
        }
    }
}

/// Resolve `(name, token)` pairs; the multi-installation list wins
fn parse_installations(
    github_token: Option<&str>,
    installation_tokens: Option<&str>,
) -> Result<Vec<(String, String)>> {
    if let Some(list) = installation_tokens.filter(|l| !l.trim().is_empty()) {
        let mut installations = Vec::new();
        let entries = list.split(',').map(str::trim).filter(|e| !e.is_empty());
        for (index, entry) in entries.enumerate() {
            let Some((name, token)) = entry.split_once('=') else {
                bail!(
                    "AGORA_INSTALLATION_TOKENS entry {} is not of the form name=token",
                    index + 1
                );
            };
            let (name, token) = (name.trim(), token.trim());
            if name.is_empty() || token.is_empty() {
                bail!("AGORA_INSTALLATION_TOKENS entry {} has an empty name or token", index + 1);
            }
            installations.push((name.to_string(), token.to_string()));
        }
        return Ok(installations);
    }

    match github_token.map(str::trim).filter(|t| !t.is_empty()) {
        Some(token) => Ok(vec![(DEFAULT_INSTALLATION.to_string(), token.to_string())]),
        None => bail!("No credentials: set GITHUB_TOKEN or AGORA_INSTALLATION_TOKENS"),
    }
}

fn init_logging(verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::from_env(std::env::args_os())?;
    init_logging(settings.verbose)?;

    let credentials = parse_installations(
        settings.github_token.as_deref(),
        settings.installation_tokens.as_deref(),
    )?;
    let options = settings.github_options();

    let mut installations = Vec::with_capacity(credentials.len());
    for (name, token) in credentials {
        let client = GitHubClient::new(&settings.api_url, token)
            .with_context(|| format!("Failed to create GitHub client for installation {}", name))?;
        let capabilities = Capabilities::github(Arc::new(client), &options);
        installations.push(Installation::new(name, capabilities));
    }

    info!(
        installations = installations.len(),
        api = %settings.api_url,
        "Starting governance run"
    );
    Orchestrator::new(installations, settings.retry_policy())
        .run()
        .await
        .context("Governance run failed")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_token() {
        let installations = parse_installations(Some("ghs_abc"), None).unwrap();
        assert_eq!(installations, vec![("default".to_string(), "ghs_abc".to_string())]);
    }

    #[test]
    fn test_installation_list_wins() {
        let installations =
            parse_installations(Some("ghs_abc"), Some("acme=t1, widgets = t2,")).unwrap();
        assert_eq!(
            installations,
            vec![
                ("acme".to_string(), "t1".to_string()),
                ("widgets".to_string(), "t2".to_string()),
            ]
        );
    }

    #[test]
    fn test_malformed_installation_list() {
        assert!(parse_installations(None, Some("acme")).is_err());
        assert!(parse_installations(None, Some("=token")).is_err());
    }

    #[test]
    fn test_missing_credentials() {
        assert!(parse_installations(None, None).is_err());
        assert!(parse_installations(Some("  "), Some("")).is_err());
    }

    #[test]
    fn test_arguments_rejected() {
        let args = ["agora", "--github-token", "ghs_abc"].map(OsString::from);
        assert!(Settings::from_env(args).is_err());
    }

    #[test]
    fn test_retry_settings_from_env() {
        std::env::set_var("AGORA_RETRY_MAX_ATTEMPTS", "0");
        std::env::set_var("AGORA_RETRY_MAX_DELAY_MS", "10");
        let settings = Settings::from_env([OsString::from("agora")]).unwrap();
        std::env::remove_var("AGORA_RETRY_MAX_ATTEMPTS");
        std::env::remove_var("AGORA_RETRY_MAX_DELAY_MS");

        let policy = settings.retry_policy();
        assert_eq!(policy.max_attempts, 1);
        assert!(policy.max_delay >= policy.initial_delay);
    }
}
