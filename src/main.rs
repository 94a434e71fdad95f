//! # Skilldex CLI (`sdx`)
//!
//! The `sdx` binary is the operational interface for Skilldex. It provides
//! commands for database initialization, submitting repositories for
//! ingestion, running the background worker, and driving the individual
//! pipeline passes by hand.
//!
//! ## Usage
//!
//! ```bash
//! sdx --config ./config/sdx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `sdx init` | Create the SQLite database and run schema migrations |
//! | `sdx submit <owner/repo>` | Queue a repository for ingestion |
//! | `sdx worker` | Run the queue consumer and scheduled passes forever |
//! | `sdx tick` | Run one refresh pass over flagged and due records |
//! | `sdx archive` | Run the monthly archive pass |
//! | `sdx resurrect` | Run the quarterly resurrection sweep |
//! | `sdx publish` | Regenerate the public listing blobs |
//! | `sdx visit <owner/repo>` | Record a catalog visit for a skill |
//! | `sdx stats` | Show catalog counts and queue depth |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! sdx init --config ./config/sdx.toml
//!
//! # Submit a repository, optionally pointing at a skill subdirectory
//! sdx submit anthropics/pdf-skill
//! sdx submit bigco/agent-tools --path skills/summarize
//!
//! # Run the worker (drains queues, fires scheduled passes)
//! sdx worker --poll-secs 30
//!
//! # Force the archive pass outside its monthly window
//! sdx archive --force
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use skilldex::archive;
use skilldex::config;
use skilldex::db;
use skilldex::listings;
use skilldex::migrate;
use skilldex::models::IngestMessage;
use skilldex::pipeline::Pipeline;
use skilldex::queue::TOPIC_INGEST;
use skilldex::resurrect;
use skilldex::stats;
use skilldex::tiers;
use skilldex::visit::{self, VisitOutcome};
use skilldex::worker;

/// Skilldex CLI — a catalog and popularity pipeline for externally-hosted
/// agent skills.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/sdx.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "sdx",
    about = "Skilldex — a catalog and popularity pipeline for externally-hosted agent skills",
    version,
    long_about = "Skilldex catalogs agent skills that live in external GitHub repositories. \
    Repositories are discovered or submitted, their content is fetched and fingerprinted, \
    skills are classified into a category vocabulary, scored for trending, placed into \
    update tiers, and published as JSON listings. Dormant records are archived to blob \
    storage and resurrected when they come back to life."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/sdx.toml`. All database, blob storage, GitHub,
    /// classification, and scheduler settings are read from this file.
    #[arg(long, global = true, default_value = "./config/sdx.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file, runs all migrations, and seeds
    /// the built-in category vocabulary. This command is idempotent —
    /// running it multiple times is safe.
    Init,

    /// Queue a repository for ingestion.
    ///
    /// Accepts `owner/repo` (a pasted GitHub URL also works). The worker
    /// picks the job up, fetches the repository, and indexes any skill it
    /// finds. Repeated submissions of unchanged repositories only refresh
    /// popularity counters.
    Submit {
        /// Repository in `owner/repo` form.
        repo: String,

        /// Skill directory inside the repository, for repositories that
        /// host a skill somewhere other than the root.
        #[arg(long)]
        path: Option<String>,

        /// Record who submitted this repository.
        #[arg(long)]
        by: Option<String>,

        /// Reindex even if the repository content is unchanged.
        #[arg(long)]
        force: bool,
    },

    /// Run the worker loop.
    ///
    /// Drains the ingest and classify queues and fires the scheduled
    /// passes (tier refresh, archival, resurrection sweep) on an hourly
    /// cycle. Runs until interrupted.
    Worker {
        /// Seconds to sleep between queue polls when no jobs are due.
        #[arg(long, default_value_t = 30)]
        poll_secs: u64,
    },

    /// Run one refresh pass.
    ///
    /// Processes visit-flagged records first, then each tier's due
    /// records, rolls up usage counters once per day, and republishes
    /// the listings.
    Tick,

    /// Run the archive pass.
    ///
    /// Moves records that are idle, unpopular, and no longer pushed to
    /// out of the live catalog and into archive blobs. Guarded to once
    /// per month unless `--force` is given.
    Archive {
        /// Run even if the pass already ran this month.
        #[arg(long)]
        force: bool,
    },

    /// Run the resurrection sweep.
    ///
    /// Re-checks every archived record against the resurrection
    /// thresholds and restores the ones that came back to life. Guarded
    /// to once per quarter unless `--force` is given.
    Resurrect {
        /// Run even if the sweep already ran this quarter.
        #[arg(long)]
        force: bool,
    },

    /// Regenerate the public listing blobs.
    ///
    /// Writes fresh `trending`, `top`, and `recent` JSON listings to
    /// blob storage from the current catalog state.
    Publish,

    /// Record a catalog visit for a skill.
    ///
    /// Bumps access counters, flags stale records for refresh, and
    /// triggers on-demand resurrection when the visited skill is
    /// archived.
    Visit {
        /// Repository in `owner/repo` form.
        repo: String,

        /// Skill directory inside the repository.
        #[arg(long)]
        path: Option<String>,
    },

    /// Show catalog counts and queue depth.
    Stats,
}

/// Parse `owner/repo`, tolerating pasted GitHub URLs.
fn parse_repo(arg: &str) -> anyhow::Result<(String, String)> {
    let trimmed = arg
        .trim()
        .trim_start_matches("https://github.com/")
        .trim_start_matches("github.com/")
        .trim_end_matches(".git")
        .trim_matches('/');
    match trimmed.split_once('/') {
        Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') => {
            Ok((owner.to_string(), repo.to_string()))
        }
        _ => anyhow::bail!("Expected OWNER/REPO, got '{}'", arg),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = env_logger::Env::default().filter_or("RUST_LOG", "info");
    env_logger::Builder::from_env(env).init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&pool).await?;
            println!("Database initialized successfully.");
        }
        Commands::Submit {
            repo,
            path,
            by,
            force,
        } => {
            let (owner, name) = parse_repo(&repo)?;
            let pipeline = Pipeline::connect(cfg).await?;
            let message = IngestMessage {
                owner: owner.clone(),
                repo: name.clone(),
                skill_path: path.unwrap_or_default(),
                submitted_by: by,
                force_reindex: force,
            };
            let job_id = pipeline.queue.enqueue(TOPIC_INGEST, &message).await?;
            println!("Queued {}/{} for ingestion (job {}).", owner, name, job_id);
        }
        Commands::Worker { poll_secs } => {
            let pipeline = Pipeline::connect(cfg).await?;
            worker::run_worker(&pipeline, poll_secs).await?;
        }
        Commands::Tick => {
            let pipeline = Pipeline::connect(cfg).await?;
            let summary = tiers::run_scheduled_pass(&pipeline).await?;
            println!(
                "Refreshed {} skills ({} visit-flagged, {} fetch failures, {} queued for reclassification).",
                summary.refreshed, summary.flagged, summary.fetch_failures, summary.reclassified
            );
            if summary.rolled_up > 0 {
                println!("Rolled up {} usage events.", summary.rolled_up);
            }
            if summary.published {
                println!("Listings published.");
            }
        }
        Commands::Archive { force } => {
            let pipeline = Pipeline::connect(cfg).await?;
            let archived = archive::run_archive_pass(&pipeline, force).await?;
            println!("Archived {} skill(s).", archived);
        }
        Commands::Resurrect { force } => {
            let pipeline = Pipeline::connect(cfg).await?;
            let summary = resurrect::run_resurrection_sweep(&pipeline, force).await?;
            println!(
                "Checked {} archived skill(s): {} resurrected, {} failed.",
                summary.checked, summary.resurrected, summary.failed
            );
        }
        Commands::Publish => {
            let pipeline = Pipeline::connect(cfg).await?;
            let size = pipeline.config.scheduler.listing_size;
            listings::publish_listings(&pipeline.store, pipeline.blobs.as_ref(), size).await?;
            println!("Listings published.");
        }
        Commands::Visit { repo, path } => {
            let (owner, name) = parse_repo(&repo)?;
            let pipeline = Pipeline::connect(cfg).await?;
            let skill_path = path.unwrap_or_default();
            match visit::record_visit(&pipeline, &owner, &name, &skill_path).await? {
                VisitOutcome::NotFound => println!("No record for {}/{}.", owner, name),
                VisitOutcome::Recorded => println!("Visit recorded."),
                VisitOutcome::FlaggedForUpdate => println!("Visit recorded; refresh flagged."),
                VisitOutcome::Resurrected => {
                    println!("Visit recorded; skill resurrected from the archive.")
                }
            }
        }
        Commands::Stats => {
            let pipeline = Pipeline::connect(cfg).await?;
            stats::print_stats(&pipeline).await?;
        }
    }

    Ok(())
}
