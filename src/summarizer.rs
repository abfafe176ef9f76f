use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::SummarizerConfig;
use crate::error::{check_status, ApiError, Service};
use crate::models::RepoInfo;
use crate::retry::RetryPolicy;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const MAX_TOKENS: u32 = 8192;
const TEMPERATURE: f64 = 0.3;
/// README excerpt cap inside the prompt, in characters
const README_PROMPT_LIMIT: usize = 20_000;

const SYSTEM_PROMPT: &str = "You are a technical project analyst. \
Given a GitHub repository's information, write a concise summary in {language}. \
Output the summary directly without any preamble or labels.";

const USER_PROMPT: &str = "Summarize this repository covering:
1. Core functionality and purpose
2. Main technology stack
3. Target use cases and audience
4. Distinctive strengths

Keep the summary within 200-300 characters. Be precise and informative.

---
Repository: {full_name}
Description: {description}
Language: {language_tech}
Topics: {topics}

README (excerpt):
{readme}
";

/// Client for the OpenAI-compatible chat-completion endpoint that turns repo
/// metadata and README content into a short summary
#[derive(Debug)]
pub struct Summarizer {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    language: String,
    retry: RetryPolicy,
}

/// Result of one summarization call. The caller decides what an empty or
/// failed summary means for the sync pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummaryOutcome {
    Summary(String),
    Empty,
    Failed(String),
}

impl SummaryOutcome {
    /// Summary text, empty for `Empty` and `Failed`
    pub fn text(&self) -> &str {
        match self {
            SummaryOutcome::Summary(text) => text,
            SummaryOutcome::Empty | SummaryOutcome::Failed(_) => "",
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

/// Rate limits and transient upstream failures are worth retrying
fn retryable(err: &ApiError) -> bool {
    matches!(err.status(), Some(429 | 500 | 502 | 503 | 504))
}

impl Summarizer {
    pub fn new(api_key: String, config: &SummarizerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create summarizer client")?;

        Ok(Self {
            client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            language: config.language.clone(),
            retry: RetryPolicy::default(),
        })
    }

    /// Override the retry policy (tests use short backoff delays)
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Generate a summary for one repo. Never fails: retry exhaustion and
    /// permanent errors degrade to `Failed`, a blank completion to `Empty`.
    pub async fn summarize(&self, repo: &RepoInfo, readme: &str) -> SummaryOutcome {
        let payload = self.build_payload(repo, readme);

        let response = match self
            .retry
            .execute(|| self.request(&payload), retryable)
            .await
        {
            Ok(response) => response,
            Err(err) => {
                error!("AI summary failed for {}: {}", repo.full_name, err);
                return SummaryOutcome::Failed(err.to_string());
            }
        };

        if let Some(usage) = &response.usage {
            info!(
                "Token usage for {}: {} prompt + {} completion = {} total",
                repo.full_name, usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
            );
        }

        let summary = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
            .unwrap_or("")
            .trim()
            .to_string();

        if summary.is_empty() {
            warn!("Empty completion for {}", repo.full_name);
            SummaryOutcome::Empty
        } else {
            info!(
                "AI summary for {}: {}",
                repo.full_name,
                truncate_for_log(&summary)
            );
            SummaryOutcome::Summary(summary)
        }
    }

    fn build_payload(&self, repo: &RepoInfo, readme: &str) -> serde_json::Value {
        let system = SYSTEM_PROMPT.replace("{language}", &self.language);

        let readme_excerpt: String = readme.chars().take(README_PROMPT_LIMIT).collect();
        let user = USER_PROMPT
            .replace("{full_name}", &repo.full_name)
            .replace("{description}", or_na(&repo.description))
            .replace("{language_tech}", or_na(&repo.language))
            .replace(
                "{topics}",
                or_na(&repo.topics.join(", ")),
            )
            .replace("{readme}", or_na(&readme_excerpt));

        json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "max_tokens": MAX_TOKENS,
            "temperature": TEMPERATURE,
        })
    }

    async fn request(&self, payload: &serde_json::Value) -> Result<ChatResponse, ApiError> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(payload)
            .send()
            .await
            .map_err(|e| ApiError::transport(Service::Summarizer, e))?;
        let response = check_status(Service::Summarizer, response).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::transport(Service::Summarizer, e))
    }
}

fn or_na(value: &str) -> &str {
    if value.is_empty() {
        "N/A"
    } else {
        value
    }
}

fn truncate_for_log(summary: &str) -> &str {
    let end = summary
        .char_indices()
        .nth(100)
        .map(|(idx, _)| idx)
        .unwrap_or(summary.len());
    &summary[..end]
}
