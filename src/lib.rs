//! StarSync - GitHub Stars to Notion Synchronization
//!
//! StarSync keeps a Notion database in sync with the user's GitHub starred
//! repositories, generating a short AI summary for each new or changed entry
//! before writing it.
//!
//! ## Core Features
//!
//! - **Reconciliation**: Pure classification of starred repos into new,
//!   re-summarize, skip and unstarred sets
//! - **Bounded Parallelism**: A fixed-size worker pool drives README fetch,
//!   summarization and upsert per repo
//! - **Uniform Retries**: One retry/backoff policy wraps every call to the
//!   GitHub, Notion and summarizer services
//! - **Configuration Management**: YAML-based configuration with XDG compliance
//!
//! ## Modules
//!
//! - [`config`]: Configuration management and parsing
//! - [`sync`]: Sync engine orchestrating a full pass
//! - [`reconcile`]: Source-versus-store classification

pub mod config;
pub mod error;
pub mod github;
pub mod models;
pub mod notion;
pub mod reconcile;
pub mod retry;
pub mod summarizer;
pub mod sync;

pub use config::Config;
pub use error::{ApiError, Service};
pub use github::{GitHubClient, ReadmeOutcome};
pub use models::RepoInfo;
pub use notion::{NotionStore, StoreSnapshot};
pub use reconcile::{classify, Classification, SyncMode};
pub use retry::RetryPolicy;
pub use summarizer::{Summarizer, SummaryOutcome};
pub use sync::{SyncEngine, SyncOptions, SyncPlan, SyncSummary};
