use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{check_status, ApiError, Service};
use crate::models::RepoInfo;
use crate::retry::RetryPolicy;

const NOTION_VERSION: &str = "2025-09-03";
const PAGE_SIZE: u32 = 100;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Notion caps rich-text content at 2000 characters per block
const TEXT_LIMIT: usize = 2000;
/// Keep multi-select payloads small; more topics add noise, not signal
const TOPIC_LIMIT: usize = 10;

/// Frozen view of the store, built once per sync pass. Maps repo keys to page
/// ids and records which pages still lack an AI summary.
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    pub pages: HashMap<String, String>,
    pub empty_summary: HashSet<String>,
}

/// Notion client scoped to one data source
#[derive(Debug)]
pub struct NotionStore {
    client: reqwest::Client,
    base_url: String,
    data_source_id: String,
    retry: RetryPolicy,
}

/// Notion signals rate limiting with 429; everything else is permanent
fn retryable(err: &ApiError) -> bool {
    matches!(err.status(), Some(429))
}

impl NotionStore {
    pub fn new(token: &str, data_source_id: &str, api_url: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))
            .context("Notion token contains invalid header characters")?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            HeaderName::from_static("notion-version"),
            HeaderValue::from_static(NOTION_VERSION),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create Notion client")?;

        Ok(Self {
            client,
            base_url: api_url.trim_end_matches('/').to_string(),
            data_source_id: data_source_id.to_string(),
            retry: RetryPolicy::default(),
        })
    }

    /// Override the retry policy (tests use short backoff delays)
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Read the whole data source into a snapshot: repo key to page id, plus
    /// the set of keys whose stored AI summary is empty.
    pub async fn snapshot(&self) -> Result<StoreSnapshot, ApiError> {
        let mut snapshot = StoreSnapshot::default();
        let mut cursor: Option<String> = None;

        loop {
            let mut body = json!({ "page_size": PAGE_SIZE });
            if let Some(cursor) = &cursor {
                body["start_cursor"] = json!(cursor);
            }

            let response: Value = self
                .retry
                .execute(|| self.query_page(&body), retryable)
                .await?;

            for page in response["results"].as_array().into_iter().flatten() {
                let Some(full_name) = page
                    .pointer("/properties/Name/title/0/plain_text")
                    .and_then(Value::as_str)
                    .filter(|name| !name.is_empty())
                else {
                    // Pages without a title cannot be keyed; ignore them
                    continue;
                };
                let Some(page_id) = page["id"].as_str() else {
                    continue;
                };

                snapshot
                    .pages
                    .insert(full_name.to_string(), page_id.to_string());

                let has_summary = page
                    .pointer("/properties/AI Summary/rich_text/0/plain_text")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .is_some_and(|text| !text.is_empty());
                if !has_summary {
                    snapshot.empty_summary.insert(full_name.to_string());
                }
            }

            if !response["has_more"].as_bool().unwrap_or(false) {
                break;
            }
            cursor = response["next_cursor"].as_str().map(String::from);
            if cursor.is_none() {
                break;
            }
            debug!("Fetching next snapshot page");
        }

        info!("Found {} existing entries in Notion", snapshot.pages.len());
        Ok(snapshot)
    }

    async fn query_page(&self, body: &Value) -> Result<Value, ApiError> {
        let url = format!(
            "{}/data_sources/{}/query",
            self.base_url, self.data_source_id
        );
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::transport(Service::Notion, e))?;
        let response = check_status(Service::Notion, response).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::transport(Service::Notion, e))
    }

    /// Create a page for the repo, or update `page_id` in place when given
    pub async fn upsert(&self, repo: &RepoInfo, page_id: Option<&str>) -> Result<(), ApiError> {
        let props = build_properties(repo);

        match page_id {
            Some(page_id) => {
                let url = format!("{}/pages/{}", self.base_url, page_id);
                let body = json!({ "properties": props });
                self.retry
                    .execute(|| self.send_json(self.client.patch(&url), &body), retryable)
                    .await?;
                info!("Updated: {}", repo.full_name);
            }
            None => {
                let url = format!("{}/pages", self.base_url);
                let body = json!({
                    "parent": {
                        "type": "data_source_id",
                        "data_source_id": self.data_source_id,
                    },
                    "properties": props,
                });
                self.retry
                    .execute(|| self.send_json(self.client.post(&url), &body), retryable)
                    .await?;
                info!("Created: {}", repo.full_name);
            }
        }

        Ok(())
    }

    /// Mark a page archived. Archiving an already-archived page is a no-op on
    /// the Notion side.
    pub async fn archive(&self, page_id: &str) -> Result<(), ApiError> {
        let url = format!("{}/pages/{}", self.base_url, page_id);
        let body = json!({ "archived": true });
        self.retry
            .execute(|| self.send_json(self.client.patch(&url), &body), retryable)
            .await?;
        Ok(())
    }

    /// Create the stars database under a parent page and return its
    /// data-source id. Used by the setup wizard, not by the sync pass.
    pub async fn create_database(&self, parent_page_id: &str, username: &str) -> Result<String, ApiError> {
        let title = if username.is_empty() {
            "⭐ GitHub Stars".to_string()
        } else {
            format!("⭐ {username}'s GitHub Stars")
        };
        let body = json!({
            "parent": {"type": "page_id", "page_id": parent_page_id},
            "title": [{"type": "text", "text": {"content": title}}],
            "initial_data_source": {
                "properties": {
                    "Name": {"title": {}},
                    "Description": {"rich_text": {}},
                    "Language": {"select": {}},
                    "Topics": {"multi_select": {}},
                    "Stars": {"number": {}},
                    "AI Summary": {"rich_text": {}},
                    "Owner": {"rich_text": {}},
                    "Last Synced": {"date": {}},
                }
            },
        });

        let url = format!("{}/databases", self.base_url);
        let response: Value = self
            .retry
            .execute(|| self.send_json(self.client.post(&url), &body), retryable)
            .await?;

        let data_source_id = response
            .pointer("/data_sources/0/id")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ApiError::response(Service::Notion, "created database has no data source id")
            })?;

        info!(
            "Created database {} (data source {})",
            response["id"].as_str().unwrap_or("?"),
            data_source_id
        );
        Ok(data_source_id.to_string())
    }

    async fn send_json(
        &self,
        request: reqwest::RequestBuilder,
        body: &Value,
    ) -> Result<Value, ApiError> {
        let response = request
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::transport(Service::Notion, e))?;
        let response = check_status(Service::Notion, response).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::transport(Service::Notion, e))
    }
}

/// Map a repo to the fixed page-property schema. Empty fields are omitted so
/// Notion keeps showing them as blank instead of empty rich-text blocks.
fn build_properties(repo: &RepoInfo) -> Value {
    let now = Utc::now().to_rfc3339();

    let mut props = json!({
        "Name": {
            "title": [{
                "text": {
                    "content": repo.full_name,
                    "link": {"url": repo.url},
                },
            }]
        },
        "Stars": {"number": repo.stars},
        "Last Synced": {"date": {"start": now}},
    });

    if !repo.description.is_empty() {
        props["Description"] = json!({
            "rich_text": [{"text": {"content": cap_chars(&repo.description, TEXT_LIMIT)}}]
        });
    }

    if !repo.language.is_empty() {
        props["Language"] = json!({"select": {"name": repo.language}});
    }

    if !repo.topics.is_empty() {
        let topics: Vec<Value> = repo
            .topics
            .iter()
            .take(TOPIC_LIMIT)
            .map(|topic| json!({"name": topic}))
            .collect();
        props["Topics"] = json!({"multi_select": topics});
    }

    if !repo.owner.is_empty() {
        props["Owner"] = json!({"rich_text": [{"text": {"content": repo.owner}}]});
    }

    if !repo.summary.is_empty() {
        props["AI Summary"] = json!({
            "rich_text": [{"text": {"content": cap_chars(&repo.summary, TEXT_LIMIT)}}]
        });
    }

    props
}

fn cap_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Extract a 32-char hex Notion ID from a raw string (URL, slug, or bare ID)
pub fn extract_notion_id(raw: &str) -> Result<String> {
    let tail = raw
        .split('?')
        .next()
        .unwrap_or("")
        .trim_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or("");
    let cleaned = tail.replace('-', "");

    let pattern = Regex::new(r"[0-9a-f]{32}$").context("Failed to compile page-id pattern")?;
    pattern
        .find(&cleaned)
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| anyhow!("Could not extract a valid 32-char hex page ID from: {raw}"))
}
