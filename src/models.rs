use chrono::{DateTime, Utc};

use crate::github::StarredEntry;

/// Normalized representation of one starred GitHub repository.
///
/// Immutable for the duration of a sync pass except for `summary`, which the
/// worker that owns the repo's processing unit fills in before the upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct RepoInfo {
    /// Globally unique `owner/name` key
    pub full_name: String,
    pub name: String,
    pub owner: String,
    pub url: String,
    pub description: String,
    /// Primary language, empty when GitHub reports none
    pub language: String,
    /// Order-preserving, deduplicated topic tags
    pub topics: Vec<String>,
    pub stars: u64,
    /// AI-generated summary, empty until processing fills it in
    pub summary: String,
    /// When the repo was starred, from the star+json media type
    pub starred_at: Option<DateTime<Utc>>,
}

impl RepoInfo {
    /// Normalize a raw starred-list entry.
    pub fn from_starred(entry: StarredEntry) -> Self {
        let repo = entry.repo;
        Self {
            full_name: repo.full_name,
            name: repo.name,
            owner: repo.owner.login,
            url: repo.html_url,
            description: repo.description.unwrap_or_default(),
            language: repo.language.unwrap_or_default(),
            topics: dedup_preserving_order(repo.topics),
            stars: repo.stargazers_count,
            summary: String::new(),
            starred_at: entry.starred_at,
        }
    }
}

fn dedup_preserving_order(topics: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    topics
        .into_iter()
        .filter(|topic| seen.insert(topic.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::{RawOwner, RawRepo};

    fn entry(full_name: &str) -> StarredEntry {
        let (owner, name) = full_name.split_once('/').unwrap();
        StarredEntry {
            starred_at: None,
            repo: RawRepo {
                full_name: full_name.to_string(),
                name: name.to_string(),
                owner: RawOwner {
                    login: owner.to_string(),
                },
                html_url: format!("https://github.com/{full_name}"),
                description: None,
                language: None,
                topics: Vec::new(),
                stargazers_count: 0,
            },
        }
    }

    #[test]
    fn test_normalization_defaults() {
        let repo = RepoInfo::from_starred(entry("alice/widget"));

        assert_eq!(repo.full_name, "alice/widget");
        assert_eq!(repo.name, "widget");
        assert_eq!(repo.owner, "alice");
        assert_eq!(repo.url, "https://github.com/alice/widget");
        assert_eq!(repo.description, "");
        assert_eq!(repo.language, "");
        assert!(repo.topics.is_empty());
        assert_eq!(repo.stars, 0);
        assert_eq!(repo.summary, "");
        assert!(repo.starred_at.is_none());
    }

    #[test]
    fn test_topics_deduplicated_in_order() {
        let mut raw = entry("alice/widget");
        raw.repo.topics = vec![
            "rust".to_string(),
            "cli".to_string(),
            "rust".to_string(),
            "sync".to_string(),
            "cli".to_string(),
        ];

        let repo = RepoInfo::from_starred(raw);
        assert_eq!(repo.topics, vec!["rust", "cli", "sync"]);
    }
}
