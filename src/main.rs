use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use starsync::notion::extract_notion_id;
use starsync::{Config, GitHubClient, NotionStore, SyncEngine, SyncOptions, SyncPlan, SyncSummary};

#[derive(Parser)]
#[command(name = "starsync")]
#[command(about = "Sync GitHub stars to Notion with AI-generated summaries")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (defaults to XDG config location)
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the Notion database interactively
    Setup,

    /// Sync GitHub stars to Notion
    Sync {
        /// Re-generate AI summaries for all repos (not just new ones)
        #[arg(long)]
        force_resummarize: bool,

        /// Preview changes without writing to Notion
        #[arg(long)]
        dry_run: bool,

        /// Only process the first N starred repos (useful for testing)
        #[arg(long)]
        limit: Option<usize>,

        /// Do not archive repos that are no longer starred
        #[arg(long)]
        no_archive: bool,

        /// Include repos with empty AI summaries: re-summarize and update them
        #[arg(long)]
        include_empty_summary: bool,

        /// Max concurrent summary workers (default: sync.concurrency or 5)
        #[arg(long)]
        concurrency: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = load_config(cli.config)?;

    init_logging(cli.verbose, &config.logging.level);
    info!("Starting StarSync v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Setup => cmd_setup(config).await,
        Commands::Sync {
            force_resummarize,
            dry_run,
            limit,
            no_archive,
            include_empty_summary,
            concurrency,
        } => {
            let options = SyncOptions {
                force_resummarize,
                dry_run,
                limit,
                no_archive,
                include_empty_summary,
                concurrency,
            };
            cmd_sync(config, options).await
        }
    }
}

/// Initialize logging based on verbosity level and configuration
fn init_logging(verbose: bool, level: &str) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

/// Load configuration from specified path or default location
fn load_config(config_path: Option<std::path::PathBuf>) -> Result<Config> {
    match config_path {
        Some(path) => Config::load(&path),
        None => Config::load_or_default(),
    }
}

/// Run one sync pass: preview, then process and archive unless dry-running
async fn cmd_sync(config: Config, options: SyncOptions) -> Result<()> {
    let engine = SyncEngine::new(config, options.clone())?;

    let plan = engine.plan().await?;
    print_preview(&plan, &options);

    if options.dry_run {
        println!("  Dry-run mode - no changes made.");
        return Ok(());
    }

    if plan.unit_count() == 0
        && (options.no_archive || plan.classification.unstarred.is_empty())
    {
        println!("  Nothing to do - Notion is already up to date!");
        return Ok(());
    }

    let summary = engine.execute(plan).await?;
    print_summary(&summary);

    Ok(())
}

/// Interactively create the Notion database and save its data-source id
async fn cmd_setup(config: Config) -> Result<()> {
    let notion = NotionStore::new(&config.notion.resolve_token()?, "", &config.notion.api_url)?;
    let github = GitHubClient::new(&config.github.resolve_token()?, &config.github.api_url)?;

    let username = match &config.github.username {
        Some(username) => username.clone(),
        None => github
            .username()
            .await
            .context("Failed to look up the authenticated GitHub user")?,
    };

    println!("Enter the Notion parent page ID or URL.");
    println!("  You can paste the full page URL or just the 32-char hex ID.");
    println!("  Hint: database URLs contain '?v=', page URLs do not.");
    println!();
    print!("Parent page ID or URL: ");
    io::stdout().flush()?;

    let mut raw = String::new();
    io::stdin()
        .lock()
        .read_line(&mut raw)
        .context("Failed to read input")?;
    let parent_page_id = extract_notion_id(raw.trim())?;

    let data_source_id = match notion.create_database(&parent_page_id, &username).await {
        Ok(id) => id,
        Err(err) if err.to_string().contains("parented by a database") => {
            anyhow::bail!(
                "The ID you provided belongs to a database, not a page. \
                 Please create a new page in Notion and use that page's ID instead."
            );
        }
        Err(err) => {
            return Err(err).context("Failed to create the Notion database");
        }
    };

    let mut updated = config;
    updated.notion.data_source_id = data_source_id.clone();

    let config_path = Config::default_config_path()?;
    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
    }
    updated.save(&config_path)?;

    println!();
    println!("✅ Database created successfully!");
    println!("   Data source: {}", data_source_id);
    println!("   Config: {:?}", config_path);
    println!("   Next: run 'starsync sync'");

    Ok(())
}

/// Print the classification preview before any mutation happens
fn print_preview(plan: &SyncPlan, options: &SyncOptions) {
    let classification = &plan.classification;
    let divider = "=".repeat(60);

    println!("\n{divider}");
    println!(" Sync Preview");
    println!("{divider}");
    println!("  Starred on GitHub : {}", plan.total_starred);
    println!("  Already in Notion : {}  (skip)", classification.skip.len());
    if !classification.resummarize.is_empty() {
        let label = if options.force_resummarize {
            "force re-summarize"
        } else {
            "will re-summarize"
        };
        println!(
            "  Re-summarize      : {}  ({label})",
            classification.resummarize.len()
        );
    }
    println!("  New to add        : {}", classification.new.len());
    println!(
        "  Unstarred         : {}  {}",
        classification.unstarred.len(),
        if options.no_archive {
            "(skip archive)"
        } else {
            "(will archive)"
        }
    );
    println!("{divider}\n");

    if !classification.skip.is_empty() {
        println!("  [SKIP] Existing repos (no changes):");
        for repo in &classification.skip {
            println!("    ✓ {}  ★{}", repo.full_name, repo.stars);
        }
        println!();
    }

    if !classification.resummarize.is_empty() {
        let label = if options.force_resummarize {
            "all"
        } else {
            "empty AI summary"
        };
        println!("  [RESUMMARIZE] Existing repos ({label}):");
        for repo in &classification.resummarize {
            println!("    ↻ {}  ★{}", repo.full_name, repo.stars);
        }
        println!();
    }

    if !classification.new.is_empty() {
        println!("  [NEW] Repos to be added:");
        for repo in &classification.new {
            println!("    + {}  ★{}", repo.full_name, repo.stars);
        }
        println!();
    }

    if !classification.unstarred.is_empty() {
        let label = if options.no_archive { "skip" } else { "archive" };
        println!("  [UNSTARRED] Repos no longer starred ({label}):");
        for name in &classification.unstarred {
            println!("    - {name}");
        }
        println!();
    }
}

/// Print aggregate counts once the pass has finished
fn print_summary(summary: &SyncSummary) {
    let divider = "=".repeat(60);

    let mut parts = vec![
        format!("{} added", summary.added),
        format!("{} skipped", summary.skipped),
    ];
    if summary.updated > 0 {
        parts.push(format!("{} re-summarized", summary.updated));
    }
    if summary.skipped_empty > 0 {
        parts.push(format!("{} empty-summary", summary.skipped_empty));
    }
    if summary.failed > 0 {
        parts.push(format!("{} failed", summary.failed));
    }
    parts.push(format!("{} archived", summary.archived));

    println!("\n{divider}");
    println!(
        "  Sync complete - {}  ({:.1}s)",
        parts.join(", "),
        summary.duration.as_secs_f64()
    );
    println!("{divider}\n");
}
