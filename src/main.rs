use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use cohort_tracker::storage::is_run_stamp;
use cohort_tracker::{run_pass1, run_pass2, BatchRechecker, DataLayout, Pacers, RunSelector};
use modwatch_core::{
    CoreError, ErrorExt, ErrorReporter, RedditCredentials, StorageError, TrackerConfig,
};
use reddit_client::RedditApiClient;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "modwatch=info,cohort_tracker=info,reddit_client=info";

#[derive(Parser)]
#[command(name = "modwatch", about = "Two-pass Reddit moderation cohort tracker")]
struct Cli {
    /// Path to config TOML file
    #[arg(long, default_value = "modwatch.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Capture the newest posts and their authors
    Pass1 {
        /// Overrides the configured subreddits (repeatable)
        #[arg(long = "subreddit")]
        subreddits: Vec<String>,
        /// Overrides the configured post limit per subreddit
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Re-check a captured cohort and write the combined dataset
    Pass2 {
        /// Run stamp printed by pass1 (YYYYMMDD_HHMM); newest run if omitted
        #[arg(long)]
        run: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<CoreError>() {
                Some(core) => {
                    ErrorReporter::new().report_error(core);
                    eprintln!("Error: {}", core.user_friendly_message());
                }
                None => eprintln!("Error: {:#}", e),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = TrackerConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;
    let layout = DataLayout::new(config.data_dir.clone());
    let pacers = Pacers::from_config(&config.pacing);

    let credentials = RedditCredentials::from_env().map_err(CoreError::from)?;
    tracing::info!(?credentials, "Loaded Reddit credentials");
    let client = RedditApiClient::connect(&credentials).await?;

    match cli.command {
        Command::Pass1 { subreddits, limit } => {
            if !subreddits.is_empty() {
                config.subreddits = subreddits;
            }
            if let Some(limit) = limit {
                config.post_limit = limit;
            }
            config.validate().map_err(CoreError::from)?;

            match run_pass1(&client, &config, &layout, &pacers, Utc::now()).await? {
                Some(report) => {
                    println!("Pass 1 run: {}", report.run_id);
                    println!("Posts captured: {}", report.total_posts);
                    for (state, count) in report.state_counts() {
                        println!("  {}: {}", state, count);
                    }
                    println!(
                        "Authors looked up: {} ({} cache hits)",
                        report.cache.fetches, report.cache.hits
                    );
                    for table in &report.subreddit_tables {
                        println!("  {}", table.display());
                    }
                    println!("Combined: {}", report.combined_path.display());
                    println!("Manifest: {}", report.manifest_path.display());
                    println!("Next: modwatch pass2 --run {}", report.run_id);
                }
                None => println!("No data collected"),
            }
        }
        Command::Pass2 { run } => {
            let selector = match run {
                Some(stamp) if is_run_stamp(&stamp) => RunSelector::Run(stamp),
                Some(stamp) => bail!("invalid run stamp {:?}, expected YYYYMMDD_HHMM", stamp),
                None => RunSelector::Latest,
            };
            let rechecker = BatchRechecker::new(config.batch_size, pacers.batch.clone());

            let result = run_pass2(&client, &layout, &selector, &rechecker, Utc::now()).await;
            let outcome = match result {
                Err(CoreError::Storage(e @ StorageError::ManifestNotFound { .. }))
                    if selector == RunSelector::Latest =>
                {
                    println!("{}", e.user_friendly_message());
                    return Ok(());
                }
                other => other?,
            };
            match outcome {
                Some(report) => {
                    println!("Pass 2 run: {}", report.run_id);
                    for table in &report.subreddit_tables {
                        println!("  {}", table.display());
                    }
                    if !report.skipped_subreddits.is_empty() {
                        println!("Skipped: {}", report.skipped_subreddits.join(", "));
                    }
                    println!("Combined: {}", report.combined_path.display());
                    println!("{}", report.summary);
                }
                None => println!("No data processed"),
            }
        }
    }

    let metrics = client.get_metrics().await;
    tracing::info!("{}", metrics.summary());
    Ok(())
}
