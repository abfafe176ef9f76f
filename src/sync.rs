//! Sync Engine - Orchestrates one full stars-to-Notion pass
//!
//! This module provides the high-level sync orchestration: fetch the starred
//! list and the Notion snapshot, classify each repo into an action, drain the
//! resulting processing units through a bounded worker pool, then archive
//! entries that are no longer starred.

use anyhow::{Context, Result};
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::github::GitHubClient;
use crate::models::RepoInfo;
use crate::notion::{NotionStore, StoreSnapshot};
use crate::reconcile::{classify, Classification, SyncMode};
use crate::summarizer::Summarizer;

/// Per-run flags, mirroring the `sync` subcommand
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Re-summarize every repo that already has a store record
    pub force_resummarize: bool,
    /// Preview only; no remote mutation of any kind
    pub dry_run: bool,
    /// Only process the first N starred repos
    pub limit: Option<usize>,
    /// Leave unstarred records in place
    pub no_archive: bool,
    /// Also re-summarize records whose stored summary is empty, and write
    /// summaries even when they come back empty
    pub include_empty_summary: bool,
    /// Worker-pool size override
    pub concurrency: Option<usize>,
}

/// Everything the pass decided before touching the store
#[derive(Debug)]
pub struct SyncPlan {
    pub classification: Classification,
    pub snapshot: StoreSnapshot,
    pub total_starred: usize,
}

impl SyncPlan {
    /// Number of repos the parallel phase would process
    pub fn unit_count(&self) -> usize {
        self.classification.new.len() + self.classification.resummarize.len()
    }
}

/// Results from a complete sync pass
#[derive(Debug, Clone)]
pub struct SyncSummary {
    pub added: usize,
    pub updated: usize,
    pub skipped: usize,
    pub skipped_empty: usize,
    pub failed: usize,
    pub archived: usize,
    pub duration: Duration,
}

/// One pending piece of work: a repo plus the page to update, if any.
/// Consumed exactly once; only the remote calls inside it retry.
#[derive(Debug)]
pub struct ProcessingUnit {
    pub repo: RepoInfo,
    pub page_id: Option<String>,
}

/// The only mutable state shared across workers
#[derive(Debug, Default)]
struct Counters {
    added: AtomicUsize,
    updated: AtomicUsize,
    skipped_empty: AtomicUsize,
    failed: AtomicUsize,
}

impl Counters {
    fn done(&self) -> usize {
        self.added.load(Ordering::SeqCst) + self.updated.load(Ordering::SeqCst)
    }
}

/// The main sync engine that drives one pass end to end
#[derive(Debug)]
pub struct SyncEngine {
    config: Config,
    options: SyncOptions,
    github: GitHubClient,
    notion: NotionStore,
    summarizer: Summarizer,
}

impl SyncEngine {
    /// Create a new sync engine. Fails before any work begins when the data
    /// source is unconfigured or a required credential is missing.
    pub fn new(config: Config, options: SyncOptions) -> Result<Self> {
        if config.notion.data_source_id.is_empty() {
            anyhow::bail!(
                "Notion data source is not configured. Run `starsync setup` first."
            );
        }

        let github = GitHubClient::new(&config.github.resolve_token()?, &config.github.api_url)?;
        let notion = NotionStore::new(
            &config.notion.resolve_token()?,
            &config.notion.data_source_id,
            &config.notion.api_url,
        )?;
        let summarizer = Summarizer::new(config.summarizer.resolve_api_key()?, &config.summarizer)?;

        Ok(Self {
            config,
            options,
            github,
            notion,
            summarizer,
        })
    }

    /// Fetch both sides and classify. Read-only: callers print the preview
    /// from the plan, and a dry run stops after this step.
    pub async fn plan(&self) -> Result<SyncPlan> {
        info!("Fetching starred repos from GitHub");
        let mut entries = self
            .github
            .starred(self.config.github.username.as_deref())
            .await
            .context("Failed to fetch starred repositories")?;

        if let Some(limit) = self.options.limit {
            if entries.len() > limit {
                entries.truncate(limit);
                info!("Limited to first {} repos", limit);
            }
        }

        let repos: Vec<RepoInfo> = entries.into_iter().map(RepoInfo::from_starred).collect();
        let total_starred = repos.len();

        // The snapshot is read after the star list, never concurrently with
        // it, so classification sees one consistent point in time.
        info!("Loading existing Notion entries");
        let snapshot = self
            .notion
            .snapshot()
            .await
            .context("Failed to load existing Notion entries")?;

        let mode = SyncMode::from_flags(
            self.options.force_resummarize,
            self.options.include_empty_summary,
        );
        let classification = classify(repos, &snapshot, mode);

        Ok(SyncPlan {
            classification,
            snapshot,
            total_starred,
        })
    }

    /// Run the parallel processing phase, then the archive phase.
    pub async fn execute(&self, plan: SyncPlan) -> Result<SyncSummary> {
        let started = Instant::now();
        let SyncPlan {
            classification,
            snapshot,
            ..
        } = plan;
        let Classification {
            new,
            resummarize,
            skip,
            unstarred,
        } = classification;

        let skipped = skip.len();
        let units = build_units(new, resummarize, &snapshot);
        let total = units.len();

        let keep_empty = self.options.force_resummarize || self.options.include_empty_summary;
        let workers = self
            .options
            .concurrency
            .unwrap_or(self.config.sync.concurrency)
            .max(1);

        let counters = Counters::default();

        if total > 0 {
            info!("Processing {} repos (concurrency={})", total, workers);

            let semaphore = Arc::new(Semaphore::new(workers));
            let counters = &counters;
            let mut in_flight = FuturesUnordered::new();

            for unit in units {
                let semaphore = semaphore.clone();
                in_flight.push(async move {
                    let _permit = semaphore.acquire().await.expect("Semaphore closed");

                    let name = unit.repo.full_name.clone();
                    if let Err(err) = self.process_unit(unit, keep_empty, counters, total).await {
                        counters.failed.fetch_add(1, Ordering::SeqCst);
                        error!("Failed to process {}: {:#}", name, err);
                    }
                });
            }

            // Pool barrier: the archive phase must never interleave with
            // in-flight processing units.
            while in_flight.next().await.is_some() {}
        }

        let mut archived = 0;
        if !self.options.no_archive {
            for name in &unstarred {
                let Some(page_id) = snapshot.pages.get(name) else {
                    warn!("No page id recorded for unstarred repo {}", name);
                    continue;
                };
                self.notion
                    .archive(page_id)
                    .await
                    .with_context(|| format!("Failed to archive {name}"))?;
                info!("Archived: {}", name);
                archived += 1;
            }
        }

        Ok(SyncSummary {
            added: counters.added.load(Ordering::SeqCst),
            updated: counters.updated.load(Ordering::SeqCst),
            skipped,
            skipped_empty: counters.skipped_empty.load(Ordering::SeqCst),
            failed: counters.failed.load(Ordering::SeqCst),
            archived,
            duration: started.elapsed(),
        })
    }

    /// One unit end to end: README fetch, summarize, upsert. Runs entirely on
    /// one worker; the snapshot is only consulted through the unit's page id.
    async fn process_unit(
        &self,
        unit: ProcessingUnit,
        keep_empty: bool,
        counters: &Counters,
        total: usize,
    ) -> Result<()> {
        let ProcessingUnit { mut repo, page_id } = unit;

        let readme = self
            .github
            .readme(&repo.full_name, self.config.github.readme_max_length)
            .await;
        let outcome = self.summarizer.summarize(&repo, readme.text()).await;
        repo.summary = outcome.text().to_string();

        if repo.summary.is_empty() && !keep_empty {
            counters.skipped_empty.fetch_add(1, Ordering::SeqCst);
            warn!("Skipped {} (empty AI summary)", repo.full_name);
            return Ok(());
        }

        self.notion
            .upsert(&repo, page_id.as_deref())
            .await
            .with_context(|| format!("Failed to upsert {}", repo.full_name))?;

        if page_id.is_some() {
            counters.updated.fetch_add(1, Ordering::SeqCst);
        } else {
            counters.added.fetch_add(1, Ordering::SeqCst);
        }
        info!("[{}/{}] {} done", counters.done(), total, repo.full_name);

        Ok(())
    }
}

/// Units come from `new` (create path) and `resummarize` (update path); the
/// `skip` set produces none.
fn build_units(
    new: Vec<RepoInfo>,
    resummarize: Vec<RepoInfo>,
    snapshot: &StoreSnapshot,
) -> Vec<ProcessingUnit> {
    new.into_iter()
        .map(|repo| ProcessingUnit {
            repo,
            page_id: None,
        })
        .chain(resummarize.into_iter().map(|repo| {
            let page_id = snapshot.pages.get(&repo.full_name).cloned();
            ProcessingUnit { repo, page_id }
        }))
        .collect()
}
