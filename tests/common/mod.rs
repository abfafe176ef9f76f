//! Common test utilities for StarSync integration tests

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Value};
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use starsync::Config;

/// The three remote services the engine talks to, each mocked independently
pub struct Services {
    pub github: MockServer,
    pub notion: MockServer,
    pub summarizer: MockServer,
}

impl Services {
    pub async fn start() -> Self {
        Self {
            github: MockServer::start().await,
            notion: MockServer::start().await,
            summarizer: MockServer::start().await,
        }
    }

    /// Config wired to the mock servers, credentials inline so no environment
    /// variables are involved
    pub fn config(&self) -> Config {
        let mut config = Config::default();
        config.github.token = Some("gh-test-token".to_string());
        config.github.api_url = self.github.uri();
        config.notion.token = Some("notion-test-token".to_string());
        config.notion.api_url = self.notion.uri();
        config.notion.data_source_id = "ds-test".to_string();
        config.summarizer.api_key = Some("sk-test".to_string());
        config.summarizer.base_url = self.summarizer.uri();
        config.sync.concurrency = 4;
        config
    }

    /// First starred page returns `entries`, every later page is empty
    pub async fn mock_starred(&self, entries: Vec<Value>) {
        Mock::given(method("GET"))
            .and(path("/user/starred"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(Value::Array(entries)))
            .mount(&self.github)
            .await;
        Mock::given(method("GET"))
            .and(path("/user/starred"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&self.github)
            .await;
    }

    /// Serve a README for one repo; mount before `mock_readme_missing`
    pub async fn mock_readme(&self, full_name: &str, content: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/repos/{full_name}/readme")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": BASE64.encode(content),
            })))
            .mount(&self.github)
            .await;
    }

    /// Any README not mocked explicitly is missing
    pub async fn mock_readme_missing(&self) {
        Mock::given(method("GET"))
            .and(path_regex("^/repos/.+/readme$"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&self.github)
            .await;
    }

    /// Single-page Notion snapshot
    pub async fn mock_snapshot(&self, pages: Vec<Value>) {
        Mock::given(method("POST"))
            .and(path("/data_sources/ds-test/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": pages,
                "has_more": false,
                "next_cursor": null,
            })))
            .mount(&self.notion)
            .await;
    }

    /// Every summarization call yields `content`, delayed by `delay_ms`
    pub async fn mock_completion(&self, content: &str, delay_ms: u64) {
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(chat_completion(content))
                    .set_delay(std::time::Duration::from_millis(delay_ms)),
            )
            .mount(&self.summarizer)
            .await;
    }
}

/// One starred-list entry under the star+json media type
pub fn starred_entry(full_name: &str, stars: u64) -> Value {
    let (owner, name) = full_name.split_once('/').expect("full_name needs a slash");
    json!({
        "starred_at": "2024-03-01T12:00:00Z",
        "repo": {
            "full_name": full_name,
            "name": name,
            "owner": {"login": owner},
            "html_url": format!("https://github.com/{full_name}"),
            "description": "a test repo",
            "language": "Rust",
            "topics": ["testing"],
            "stargazers_count": stars,
        }
    })
}

/// One page of an existing Notion entry, as the snapshot query returns it
pub fn notion_page(full_name: &str, page_id: &str, summary: &str) -> Value {
    json!({
        "id": page_id,
        "properties": {
            "Name": {"title": [{"plain_text": full_name}]},
            "AI Summary": {"rich_text": if summary.is_empty() {
                json!([])
            } else {
                json!([{"plain_text": summary}])
            }},
        }
    })
}

/// Minimal chat-completion response with usage counters
pub fn chat_completion(content: &str) -> Value {
    json!({
        "choices": [{"message": {"role": "assistant", "content": content}}],
        "usage": {"prompt_tokens": 100, "completion_tokens": 25, "total_tokens": 125},
    })
}
