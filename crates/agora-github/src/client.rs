//! GitHub REST client

use std::time::Duration;

use agora_core::{AgoraError, IssueRef, NetworkErrorKind, Reaction, RepoRef, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION, LINK, USER_AGENT};
use reqwest::{Method, Response, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument, warn};

use crate::api::{CloseReason, Comment, GitHubApi, IssueDetails, LabelEvent, UserReaction};

pub const DEFAULT_API_URL: &str = "https://api.github.com";
const API_VERSION: &str = "2022-11-28";
const JSON_ACCEPT: &str = "application/vnd.github+json";
const RAW_ACCEPT: &str = "application/vnd.github.raw+json";
const CLIENT_USER_AGENT: &str = concat!("agora/", env!("CARGO_PKG_VERSION"));
const PER_PAGE: &str = "100";
/// Cap on pages fetched per listing
const MAX_PAGES: usize = 50;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Deserialize)]
struct ApiUser {
    login: String,
    #[serde(rename = "type", default)]
    kind: String,
}

impl ApiUser {
    fn is_bot(&self) -> bool {
        self.kind.eq_ignore_ascii_case("bot")
    }
}

#[derive(Deserialize)]
struct ApiLabel {
    name: String,
}

#[derive(Deserialize)]
struct ApiIssue {
    number: u64,
    state: String,
    #[serde(default)]
    labels: Vec<ApiLabel>,
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct ApiEvent {
    event: String,
    #[serde(default)]
    label: Option<ApiLabel>,
    created_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct ApiComment {
    id: u64,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    user: Option<ApiUser>,
}

#[derive(Deserialize)]
struct ApiReaction {
    content: String,
    #[serde(default)]
    user: Option<ApiUser>,
}

#[derive(Deserialize)]
struct ApiRepository {
    name: String,
    owner: ApiUser,
    #[serde(default)]
    archived: bool,
}

#[derive(Deserialize)]
struct ApiInstallationRepositories {
    repositories: Vec<ApiRepository>,
}

#[derive(Deserialize)]
struct ApiTimelineEvent {
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    source: Option<ApiTimelineSource>,
}

#[derive(Deserialize)]
struct ApiTimelineSource {
    #[serde(default)]
    issue: Option<ApiTimelineIssue>,
}

#[derive(Deserialize)]
struct ApiTimelineIssue {
    number: u64,
    state: String,
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
    #[serde(default)]
    repository: Option<ApiRepositoryName>,
}

#[derive(Deserialize)]
struct ApiRepositoryName {
    full_name: String,
}

#[derive(Deserialize)]
struct ApiMessage {
    message: String,
}

/// GitHub REST client authenticated with a single token
#[derive(Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    base: Url,
    token: String,
    next_link: Regex,
}

impl GitHubClient {
    /// Create a client for the given API root (e.g. `https://api.github.com`)
    pub fn new(api_url: &str, token: impl Into<String>) -> Result<Self> {
        let base = Url::parse(api_url)
            .map_err(|e| AgoraError::Other(format!("Invalid API URL {}: {}", api_url, e)))?;
        if base.cannot_be_a_base() {
            return Err(AgoraError::Other(format!("Invalid API URL {}", api_url)));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| AgoraError::Other(format!("Failed to build HTTP client: {}", e)))?;

        let next_link = Regex::new(r#"<([^>]+)>\s*;\s*rel="next""#)
            .map_err(|e| AgoraError::Other(format!("Invalid pagination pattern: {}", e)))?;

        Ok(Self {
            http,
            base,
            token: token.into(),
            next_link,
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| AgoraError::Other(format!("Invalid API URL {}", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn issue_url(&self, issue: &IssueRef, tail: &[&str]) -> Result<Url> {
        let number = issue.issue_number.to_string();
        let mut segments = vec![
            "repos",
            issue.owner.as_str(),
            issue.repo.as_str(),
            "issues",
            number.as_str(),
        ];
        segments.extend_from_slice(tail);
        self.url(&segments)
    }

    #[instrument(skip_all, fields(method = %method, path = %url.path()))]
    async fn execute(
        &self,
        method: Method,
        url: Url,
        body: Option<serde_json::Value>,
        accept: Option<&str>,
    ) -> Result<Response> {
        let mut request = self
            .http
            .request(method, url)
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .header(USER_AGENT, CLIENT_USER_AGENT)
            .header(ACCEPT, accept.unwrap_or(JSON_ACCEPT))
            .header("X-GitHub-Api-Version", API_VERSION);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(network_error)?;
        let status = response.status();
        debug!(status = status.as_u16(), "GitHub response");

        if status.is_success() {
            Ok(response)
        } else {
            Err(api_error(response).await)
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let response = self.execute(Method::GET, url, None, None).await?;
        decode(response).await
    }

    /// Follow `Link: rel="next"` until exhausted or the page cap is hit
    async fn get_pages<P: DeserializeOwned>(&self, mut url: Url) -> Result<Vec<P>> {
        url.query_pairs_mut().append_pair("per_page", PER_PAGE);
        let mut pages = Vec::new();
        let mut next = Some(url);

        while let Some(url) = next.take() {
            if pages.len() >= MAX_PAGES {
                warn!(
                    endpoint = url.path(),
                    max_pages = MAX_PAGES,
                    "Pagination cap reached, later pages ignored"
                );
                break;
            }
            let response = self.execute(Method::GET, url, None, None).await?;
            next = self.next_page(response.headers());
            pages.push(decode(response).await?);
        }

        Ok(pages)
    }

    async fn get_paginated<T: DeserializeOwned>(&self, url: Url) -> Result<Vec<T>> {
        let pages: Vec<Vec<T>> = self.get_pages(url).await?;
        Ok(pages.into_iter().flatten().collect())
    }

    fn next_page(&self, headers: &HeaderMap) -> Option<Url> {
        let link = headers.get(LINK)?.to_str().ok()?;
        let captures = self.next_link.captures(link)?;
        Url::parse(captures.get(1)?.as_str()).ok()
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let text = response.text().await.map_err(network_error)?;
    Ok(serde_json::from_str(&text)?)
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

async fn api_error(response: Response) -> AgoraError {
    let status = response.status().as_u16();
    let rate_limit_remaining = header_u64(response.headers(), "x-ratelimit-remaining");
    let retry_after = header_u64(response.headers(), "retry-after").map(Duration::from_secs);
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiMessage>(&body)
        .map(|m| m.message)
        .unwrap_or(body);

    AgoraError::Api {
        status,
        message,
        rate_limit_remaining,
        retry_after,
    }
}

fn network_error(e: reqwest::Error) -> AgoraError {
    let kind = if e.is_timeout() {
        NetworkErrorKind::Timeout
    } else if e.is_connect() {
        NetworkErrorKind::Connect
    } else if is_connection_reset(&e) {
        NetworkErrorKind::Reset
    } else {
        NetworkErrorKind::Other
    };
    AgoraError::Network {
        kind,
        message: e.to_string(),
    }
}

fn is_connection_reset(e: &reqwest::Error) -> bool {
    use std::error::Error;
    use std::io::ErrorKind;

    let mut source = e.source();
    while let Some(err) = source {
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            if matches!(
                io.kind(),
                ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::BrokenPipe
                    | ErrorKind::UnexpectedEof
            ) {
                return true;
            }
        }
        source = err.source();
    }
    false
}

fn user_reaction(raw: ApiReaction) -> Option<UserReaction> {
    let user = raw.user?;
    let content = raw.content.parse().ok()?;
    Some(UserReaction {
        user_is_bot: user.is_bot(),
        reaction: Reaction::new(user.login, content),
    })
}

#[async_trait]
impl GitHubApi for GitHubClient {
    async fn list_repositories(&self) -> Result<Vec<RepoRef>> {
        let url = self.url(&["installation", "repositories"])?;
        let pages: Vec<ApiInstallationRepositories> = self.get_pages(url).await?;
        Ok(pages
            .into_iter()
            .flat_map(|p| p.repositories)
            .filter(|r| !r.archived)
            .map(|r| RepoRef::new(r.owner.login, r.name))
            .collect())
    }

    async fn get_file(&self, repo: &RepoRef, path: &str) -> Result<Option<String>> {
        let mut segments = vec!["repos", repo.owner.as_str(), repo.repo.as_str(), "contents"];
        segments.extend(path.split('/').filter(|s| !s.is_empty()));
        let url = self.url(&segments)?;

        match self.execute(Method::GET, url, None, Some(RAW_ACCEPT)).await {
            Ok(response) => Ok(Some(response.text().await.map_err(network_error)?)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn list_issues_with_label(&self, repo: &RepoRef, label: &str) -> Result<Vec<u64>> {
        let mut url = self.url(&["repos", &repo.owner, &repo.repo, "issues"])?;
        url.query_pairs_mut()
            .append_pair("state", "open")
            .append_pair("labels", label);
        let issues: Vec<ApiIssue> = self.get_paginated(url).await?;
        Ok(issues
            .into_iter()
            .filter(|i| i.pull_request.is_none())
            .map(|i| i.number)
            .collect())
    }

    async fn get_issue(&self, issue: &IssueRef) -> Result<IssueDetails> {
        let raw: ApiIssue = self.get_json(self.issue_url(issue, &[])?).await?;
        Ok(IssueDetails {
            number: raw.number,
            open: raw.state == "open",
            labels: raw.labels.into_iter().map(|l| l.name).collect(),
        })
    }

    async fn list_label_events(&self, issue: &IssueRef) -> Result<Vec<LabelEvent>> {
        let events: Vec<ApiEvent> = self.get_paginated(self.issue_url(issue, &["events"])?).await?;
        Ok(events
            .into_iter()
            .filter(|e| e.event == "labeled")
            .filter_map(|e| {
                e.label.map(|label| LabelEvent {
                    label: label.name,
                    created_at: e.created_at,
                })
            })
            .collect())
    }

    async fn list_comments(&self, issue: &IssueRef) -> Result<Vec<Comment>> {
        let url = self.issue_url(issue, &["comments"])?;
        let comments: Vec<ApiComment> = self.get_paginated(url).await?;
        Ok(comments
            .into_iter()
            .map(|c| {
                let (author, author_is_bot) = match c.user {
                    Some(user) => {
                        let bot = user.is_bot();
                        (user.login, bot)
                    }
                    None => (String::new(), false),
                };
                Comment {
                    id: c.id,
                    author,
                    author_is_bot,
                    body: c.body.unwrap_or_default(),
                }
            })
            .collect())
    }

    async fn list_comment_reactions(
        &self,
        repo: &RepoRef,
        comment_id: u64,
    ) -> Result<Vec<UserReaction>> {
        let id = comment_id.to_string();
        let url = self.url(&[
            "repos",
            &repo.owner,
            &repo.repo,
            "issues",
            "comments",
            &id,
            "reactions",
        ])?;
        let reactions: Vec<ApiReaction> = self.get_paginated(url).await?;
        Ok(reactions.into_iter().filter_map(user_reaction).collect())
    }

    async fn list_issue_reactions(&self, issue: &IssueRef) -> Result<Vec<UserReaction>> {
        let url = self.issue_url(issue, &["reactions"])?;
        let reactions: Vec<ApiReaction> = self.get_paginated(url).await?;
        Ok(reactions.into_iter().filter_map(user_reaction).collect())
    }

    async fn add_labels(&self, issue: &IssueRef, labels: &[String]) -> Result<()> {
        let url = self.issue_url(issue, &["labels"])?;
        self.execute(Method::POST, url, Some(json!({ "labels": labels })), None)
            .await?;
        Ok(())
    }

    async fn remove_label(&self, issue: &IssueRef, label: &str) -> Result<()> {
        let url = self.issue_url(issue, &["labels", label])?;
        match self.execute(Method::DELETE, url, None, None).await {
            Ok(_) => Ok(()),
            Err(e) if e.status() == Some(404) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn create_comment(&self, issue: &IssueRef, body: &str) -> Result<u64> {
        let url = self.issue_url(issue, &["comments"])?;
        let response = self
            .execute(Method::POST, url, Some(json!({ "body": body })), None)
            .await?;
        let comment: ApiComment = decode(response).await?;
        Ok(comment.id)
    }

    async fn close_issue(&self, issue: &IssueRef, reason: CloseReason) -> Result<()> {
        let url = self.issue_url(issue, &[])?;
        let body = json!({ "state": "closed", "state_reason": reason.as_str() });
        self.execute(Method::PATCH, url, Some(body), None).await?;
        Ok(())
    }

    async fn list_linked_pull_requests(&self, issue: &IssueRef) -> Result<Vec<u64>> {
        let url = self.issue_url(issue, &["timeline"])?;
        let events: Vec<ApiTimelineEvent> = self.get_paginated(url).await?;
        let full_name = format!("{}/{}", issue.owner, issue.repo);

        let mut prs: Vec<u64> = events
            .into_iter()
            .filter(|e| e.event.as_deref() == Some("cross-referenced"))
            .filter_map(|e| e.source?.issue)
            .filter(|i| i.pull_request.is_some() && i.state == "open")
            .filter(|i| {
                i.repository
                    .as_ref()
                    .map_or(true, |r| r.full_name.eq_ignore_ascii_case(&full_name))
            })
            .map(|i| i.number)
            .collect();
        prs.sort_unstable();
        prs.dedup();
        Ok(prs)
    }
}
