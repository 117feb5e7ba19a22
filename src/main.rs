//! # Job Scout CLI (`jobscout`)
//!
//! The `jobscout` binary is the primary interface for the pipeline. It
//! provides commands for database initialization, source administration,
//! crawling, job listing and flagging, retention, and the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! jobscout --config ./jobscout.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `jobscout init` | Create the SQLite database and run schema migrations |
//! | `jobscout sources list` | List configured job sources |
//! | `jobscout sources add` | Add or reconfigure a job source |
//! | `jobscout sources remove <id>` | Delete a source and its jobs |
//! | `jobscout crawl` | Crawl all enabled sources (or one with `--source`) |
//! | `jobscout jobs` | List jobs with filters |
//! | `jobscout flag <id> <kind>` | Flag a job (skipped, not_fit, not_us) |
//! | `jobscout unflag <id>` | Remove a flag |
//! | `jobscout archive` | Move stale jobs to the archive table |
//! | `jobscout runs` | Show recent crawler runs |
//! | `jobscout stats` | Aggregate counts |
//! | `jobscout serve` | Start the JSON HTTP server |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use jobscout::config;
use jobscout::crawl;
use jobscout::db;
use jobscout::jobs::{self, JobFilter};
use jobscout::migrate;
use jobscout::models::FlagKind;
use jobscout::retention;
use jobscout::server;
use jobscout::sources;
use jobscout::stats;

/// Job Scout — a local-first job posting ingestion and tracking pipeline.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/jobscout.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "jobscout",
    about = "Job Scout — a local-first job posting ingestion and tracking pipeline",
    version,
    long_about = "Job Scout crawls ATS job boards (Ashby, Greenhouse, Lever, Workday, and \
    selector-driven custom boards), deduplicates postings into canonical job records, accepts \
    single-page captures from a browser extension, and archives stale jobs, all in one SQLite \
    database served over a CLI and a JSON HTTP API."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./jobscout.toml`. Database path, crawler behavior,
    /// retention window, and server bind address are read from this file.
    #[arg(long, global = true, default_value = "./jobscout.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables
    /// (job_sources, jobs, job_flags, crawler_runs, applications,
    /// jobs_archived). This command is idempotent.
    Init,

    /// Manage job sources.
    Sources {
        #[command(subcommand)]
        action: SourcesAction,
    },

    /// Crawl sources and ingest their postings.
    ///
    /// Every crawled source gets its own run record; one source failing
    /// never aborts the others. Counts per source are printed at the end.
    Crawl {
        /// Crawl only this source id instead of all enabled sources.
        #[arg(long)]
        source: Option<i64>,

        /// Drop postings older than this many days before ingestion.
        #[arg(long)]
        max_age_days: Option<u32>,
    },

    /// List jobs, newest first.
    Jobs {
        /// Filter to a single source id.
        #[arg(long)]
        source: Option<i64>,

        /// Substring match against title, company, or location.
        #[arg(long)]
        search: Option<String>,

        /// Include jobs no longer listed on their board.
        #[arg(long)]
        include_inactive: bool,

        /// Only jobs you have flagged.
        #[arg(long)]
        flagged: bool,

        /// Maximum number of rows.
        #[arg(long)]
        limit: Option<i64>,

        /// User the flag column is resolved for.
        #[arg(long, default_value = "default")]
        user: String,
    },

    /// Flag a job. Re-flagging replaces the previous kind.
    Flag {
        /// Job id.
        id: i64,

        /// Flag kind: `skipped`, `not_fit`, or `not_us`.
        kind: String,

        /// Optional free-text reason.
        #[arg(long)]
        reason: Option<String>,

        /// User the flag belongs to.
        #[arg(long, default_value = "default")]
        user: String,
    },

    /// Remove a flag from a job.
    Unflag {
        /// Job id.
        id: i64,

        /// User the flag belongs to.
        #[arg(long, default_value = "default")]
        user: String,
    },

    /// Archive jobs not refreshed within the retention window.
    ///
    /// Jobs with an application on file are never archived. Use
    /// `--dry-run` to preview the pass.
    Archive {
        /// Override the retention window from config.
        #[arg(long)]
        days: Option<u32>,

        /// Report what would be archived without moving anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Show recent crawler runs.
    Runs {
        /// Maximum number of runs to show.
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },

    /// Aggregate counts over sources, jobs, flags, and runs.
    Stats,

    /// Start the JSON HTTP server.
    ///
    /// Binds to the address configured in `[server].bind` and serves the
    /// job listing, capture, crawl, and retention endpoints.
    Serve,
}

/// Source administration subcommands.
#[derive(Subcommand)]
enum SourcesAction {
    /// List configured sources, enabled first.
    List,

    /// Add a source, or reconfigure the existing source with this name.
    Add {
        /// Source name; doubles as the company name on its jobs.
        name: String,

        /// Board URL the adapter fetches.
        url: String,

        /// Adapter family: `ashby`, `greenhouse`, `lever`, `workday`, `custom`.
        #[arg(long)]
        family: String,

        /// Register the source disabled; `crawl` skips it until enabled.
        #[arg(long)]
        disabled: bool,

        /// Only keep postings matching these departments (repeatable).
        #[arg(long = "department")]
        departments: Vec<String>,
    },

    /// Delete a source. Cascades to its jobs, flags, and run history.
    Remove {
        /// Source id.
        id: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Sources { action } => match action {
            SourcesAction::List => {
                let pool = db::connect(&cfg).await?;
                sources::list_sources(&pool).await?;
                pool.close().await;
            }
            SourcesAction::Add {
                name,
                url,
                family,
                disabled,
                departments,
            } => {
                let family = jobscout::models::AdapterFamily::parse(&family)
                    .ok_or_else(|| anyhow::anyhow!("unknown adapter family: {family}"))?;
                let pool = db::connect(&cfg).await?;
                let id = sources::upsert_source(
                    &pool,
                    &name,
                    &url,
                    family,
                    !disabled,
                    Some(&departments),
                )
                .await?;
                println!("source {id}: {name} ({})", family.as_str());
                pool.close().await;
            }
            SourcesAction::Remove { id } => {
                let pool = db::connect(&cfg).await?;
                sources::remove_source(&pool, id).await?;
                println!("removed source {id}");
                pool.close().await;
            }
        },
        Commands::Crawl {
            source,
            max_age_days,
        } => {
            crawl::run_crawl(&cfg, source, max_age_days).await?;
        }
        Commands::Jobs {
            source,
            search,
            include_inactive,
            flagged,
            limit,
            user,
        } => {
            let filter = JobFilter {
                source_id: source,
                active_only: !include_inactive,
                search,
                flagged: flagged.then_some(true),
                limit,
            };
            jobs::run_list(&cfg, &user, &filter).await?;
        }
        Commands::Flag {
            id,
            kind,
            reason,
            user,
        } => {
            let kind = FlagKind::parse(&kind)
                .ok_or_else(|| anyhow::anyhow!("unknown flag kind: {kind}"))?;
            jobs::run_flag(&cfg, &user, id, kind, reason.as_deref()).await?;
        }
        Commands::Unflag { id, user } => {
            jobs::run_unflag(&cfg, &user, id).await?;
        }
        Commands::Archive { days, dry_run } => {
            retention::run_archive(&cfg, days, dry_run).await?;
        }
        Commands::Runs { limit } => {
            crawl::run_history(&cfg, limit).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
