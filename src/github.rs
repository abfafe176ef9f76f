use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{check_status, ApiError, Service};
use crate::retry::RetryPolicy;

const API_VERSION: &str = "2022-11-28";
const PAGE_SIZE: u32 = 100;
/// Media type that adds `starred_at` to each starred-list entry
const STAR_MEDIA_TYPE: &str = "application/vnd.github.star+json";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const TRUNCATION_MARKER: &str = "\n…(truncated)";

/// GitHub API client for the starred-repository source
#[derive(Debug)]
pub struct GitHubClient {
    client: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

/// One entry of the starred list under the star+json media type
#[derive(Debug, Deserialize)]
pub struct StarredEntry {
    #[serde(default)]
    pub starred_at: Option<DateTime<Utc>>,
    pub repo: RawRepo,
}

/// Raw repository payload, only the fields the sync needs
#[derive(Debug, Deserialize)]
pub struct RawRepo {
    pub full_name: String,
    pub name: String,
    pub owner: RawOwner,
    pub html_url: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub stargazers_count: u64,
}

#[derive(Debug, Deserialize)]
pub struct RawOwner {
    pub login: String,
}

/// Result of a README fetch. `Missing` and `Failed` both yield no content, but
/// only `Failed` indicates the service misbehaved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadmeOutcome {
    Content(String),
    Missing,
    Failed,
}

impl ReadmeOutcome {
    /// Content text, empty for `Missing` and `Failed`
    pub fn text(&self) -> &str {
        match self {
            ReadmeOutcome::Content(text) => text,
            ReadmeOutcome::Missing | ReadmeOutcome::Failed => "",
        }
    }
}

#[derive(Debug, Deserialize)]
struct UserPayload {
    login: String,
}

#[derive(Debug, Deserialize)]
struct ReadmePayload {
    content: String,
}

/// GitHub signals rate limiting with 429 and 403
fn retryable(err: &ApiError) -> bool {
    matches!(err.status(), Some(429 | 403))
}

impl GitHubClient {
    /// Create a new GitHub client authenticated with a personal access token
    pub fn new(token: &str, api_url: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))
            .context("GitHub token contains invalid header characters")?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(
            HeaderName::from_static("x-github-api-version"),
            HeaderValue::from_static(API_VERSION),
        );

        let client = reqwest::Client::builder()
            .user_agent(concat!("starsync/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create GitHub client")?;

        Ok(Self {
            client,
            base_url: api_url.trim_end_matches('/').to_string(),
            retry: RetryPolicy::default(),
        })
    }

    /// Override the retry policy (tests use short backoff delays)
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Return the login name of the authenticated user
    pub async fn username(&self) -> Result<String, ApiError> {
        let user: UserPayload = self
            .retry
            .execute(|| self.get_user(), retryable)
            .await?;
        Ok(user.login)
    }

    async fn get_user(&self) -> Result<UserPayload, ApiError> {
        let url = format!("{}/user", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ApiError::transport(Service::GitHub, e))?;
        let response = check_status(Service::GitHub, response).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::transport(Service::GitHub, e))
    }

    /// Fetch all starred repos with pagination, in the service's natural order.
    /// Each entry carries `starred_at` via the star+json media type.
    pub async fn starred(&self, username: Option<&str>) -> Result<Vec<StarredEntry>, ApiError> {
        let path = match username {
            Some(name) if !name.is_empty() => format!("/users/{name}/starred"),
            _ => "/user/starred".to_string(),
        };

        let mut entries = Vec::new();
        let mut page = 1u32;

        loop {
            let batch: Vec<StarredEntry> = self
                .retry
                .execute(|| self.fetch_star_page(&path, page), retryable)
                .await?;

            if batch.is_empty() {
                break;
            }

            debug!("Fetched page {} ({} repos)", page, batch.len());
            entries.extend(batch);
            page += 1;
        }

        info!("Found {} starred repositories", entries.len());
        Ok(entries)
    }

    async fn fetch_star_page(&self, path: &str, page: u32) -> Result<Vec<StarredEntry>, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .query(&[("page", page.to_string()), ("per_page", PAGE_SIZE.to_string())])
            .header(ACCEPT, STAR_MEDIA_TYPE)
            .send()
            .await
            .map_err(|e| ApiError::transport(Service::GitHub, e))?;
        let response = check_status(Service::GitHub, response).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::transport(Service::GitHub, e))
    }

    /// Fetch and decode the README for a repo, truncated to `max_length` chars.
    /// Never fails: a missing README is `Missing`, anything else that goes wrong
    /// after retries is logged and reported as `Failed`.
    pub async fn readme(&self, full_name: &str, max_length: usize) -> ReadmeOutcome {
        match self
            .retry
            .execute(|| self.fetch_readme(full_name), retryable)
            .await
        {
            Ok(Some(content)) => ReadmeOutcome::Content(truncate_chars(content, max_length)),
            Ok(None) => {
                debug!("No README for {}", full_name);
                ReadmeOutcome::Missing
            }
            Err(err) => {
                warn!("Failed to fetch README for {}: {}", full_name, err);
                ReadmeOutcome::Failed
            }
        }
    }

    async fn fetch_readme(&self, full_name: &str) -> Result<Option<String>, ApiError> {
        let url = format!("{}/repos/{}/readme", self.base_url, full_name);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ApiError::transport(Service::GitHub, e))?;

        // A repo without a README is a normal condition, not an error
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let response = check_status(Service::GitHub, response).await?;
        let payload: ReadmePayload = response
            .json()
            .await
            .map_err(|e| ApiError::transport(Service::GitHub, e))?;

        // The content field is base64 with embedded newlines
        let encoded: String = payload
            .content
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let bytes = BASE64
            .decode(encoded)
            .map_err(|e| ApiError::response(Service::GitHub, format!("invalid README encoding: {e}")))?;

        Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
    }
}

fn truncate_chars(content: String, max_length: usize) -> String {
    if content.chars().count() <= max_length {
        return content;
    }
    let mut cut: String = content.chars().take(max_length).collect();
    cut.push_str(TRUNCATION_MARKER);
    cut
}
