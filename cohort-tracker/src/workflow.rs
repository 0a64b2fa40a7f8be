use crate::capture::capture_cohort;
use crate::join::join_cohort;
use crate::recheck::BatchRechecker;
use crate::storage::{read_csv, read_manifest, write_csv, write_manifest, DataLayout, RunSelector};
use crate::summary::CohortSummary;
use crate::user_cache::{CacheStats, UserInfoCache};
use chrono::{DateTime, Utc};
use modwatch_core::{
    run_stamp, CohortManifest, CombinedRecord, CoreError, ErrorExt, PacingConfig, PostRecord,
    TrackerConfig, TrackingState,
};
use reddit_client::{FixedIntervalGate, NoopPacer, Pacer, RedditSource};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The three waits between outbound calls, one per component.
#[derive(Clone)]
pub struct Pacers {
    pub author_lookup: Arc<dyn Pacer>,
    pub batch: Arc<dyn Pacer>,
    pub subreddit: Arc<dyn Pacer>,
}

impl Pacers {
    pub fn from_config(pacing: &PacingConfig) -> Self {
        Self {
            author_lookup: Arc::new(FixedIntervalGate::new(pacing.author_lookup())),
            batch: Arc::new(FixedIntervalGate::new(pacing.batch())),
            subreddit: Arc::new(FixedIntervalGate::new(pacing.subreddit())),
        }
    }

    pub fn noop() -> Self {
        Self {
            author_lookup: Arc::new(NoopPacer),
            batch: Arc::new(NoopPacer),
            subreddit: Arc::new(NoopPacer),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Pass1Report {
    pub run_id: String,
    pub manifest_path: PathBuf,
    pub combined_path: PathBuf,
    pub subreddit_tables: Vec<PathBuf>,
    pub total_posts: usize,
    pub dropped: usize,
    pub cache: CacheStats,
}

impl Pass1Report {
    /// Posts per lifecycle state once the manifest is written.
    pub fn state_counts(&self) -> [(TrackingState, usize); 2] {
        [
            (TrackingState::RecheckPending, self.total_posts),
            (TrackingState::Dropped, self.dropped),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct Pass2Report {
    pub run_id: String,
    pub combined_path: PathBuf,
    pub subreddit_tables: Vec<PathBuf>,
    pub skipped_subreddits: Vec<String>,
    pub summary: CohortSummary,
}

/// Captures every configured subreddit and writes the run's tables and
/// manifest. Returns `Ok(None)` when no subreddit produced any data; nothing
/// combined is written in that case.
pub async fn run_pass1<S>(
    source: &S,
    config: &TrackerConfig,
    layout: &DataLayout,
    pacers: &Pacers,
    started_at: DateTime<Utc>,
) -> Result<Option<Pass1Report>, CoreError>
where
    S: RedditSource + ?Sized,
{
    config.validate()?;
    let run_id = run_stamp(started_at);
    layout.ensure_dirs()?;
    info!(
        "Starting Pass 1 run {} over {} subreddits",
        run_id,
        config.subreddits.len()
    );

    let mut cache = UserInfoCache::new(pacers.author_lookup.clone());
    let mut manifest = CohortManifest::new();
    let mut all_records: Vec<PostRecord> = Vec::new();
    let mut subreddit_tables = Vec::new();
    let mut dropped = 0;

    for (i, subreddit) in config.subreddits.iter().enumerate() {
        match capture_cohort(source, &mut cache, subreddit, config.post_limit).await {
            Ok(cohort) if cohort.is_empty() => {
                dropped += cohort.dropped;
                warn!("No data collected for r/{}", subreddit);
            }
            Ok(cohort) => {
                for (state, count) in cohort.state_counts() {
                    debug!(subreddit = %subreddit, %state, count, "Cohort state");
                }
                dropped += cohort.dropped;
                let path = layout.pass1_table(subreddit, &run_id);
                match write_csv(&path, &cohort.records) {
                    Ok(()) => {
                        manifest.insert(subreddit.as_str(), cohort.post_fullnames);
                        all_records.extend(cohort.records);
                        subreddit_tables.push(path);
                    }
                    Err(e) => {
                        e.log_error();
                        warn!("Skipping r/{}: Pass 1 table not written", subreddit);
                    }
                }
            }
            Err(e) => {
                e.log_error();
                warn!("Skipping r/{}: capture failed", subreddit);
            }
        }

        if i + 1 < config.subreddits.len() {
            pacers.subreddit.pause().await;
        }
    }

    if all_records.is_empty() {
        warn!("No data collected in run {}", run_id);
        return Ok(None);
    }

    let combined_path = layout.combined_pass1(&run_id);
    write_csv(&combined_path, &all_records)?;
    let manifest_path = layout.manifest(&run_id);
    write_manifest(&manifest_path, &manifest)?;

    let cache_stats = cache.stats();
    info!(
        "Pass 1 complete: {} posts, {} distinct authors, {} cache hits",
        all_records.len(),
        cache_stats.entries,
        cache_stats.hits
    );

    Ok(Some(Pass1Report {
        run_id,
        manifest_path,
        combined_path,
        subreddit_tables,
        total_posts: all_records.len(),
        dropped,
        cache: cache_stats,
    }))
}

/// Re-checks the cohort of a Pass 1 run and writes the joined tables.
///
/// A missing manifest fails the pass. Problems with a single subreddit are
/// logged and that subreddit is skipped. Returns `Ok(None)` when no
/// subreddit could be processed.
pub async fn run_pass2<S>(
    source: &S,
    layout: &DataLayout,
    selector: &RunSelector,
    rechecker: &BatchRechecker,
    finished_at: DateTime<Utc>,
) -> Result<Option<Pass2Report>, CoreError>
where
    S: RedditSource + ?Sized,
{
    let (manifest_path, pass1_run) = layout.resolve_manifest(selector)?;
    let manifest = read_manifest(&manifest_path)?;
    info!(
        "[PASS 2] Re-checking {} posts from run {} ({})",
        manifest.total_posts(),
        pass1_run,
        manifest_path.display()
    );

    layout.ensure_dirs()?;
    let run_id = run_stamp(finished_at);
    let mut all_records: Vec<CombinedRecord> = Vec::new();
    let mut subreddit_tables = Vec::new();
    let mut skipped_subreddits = Vec::new();

    for (subreddit, post_ids) in manifest.iter() {
        if post_ids.is_empty() {
            warn!("No post ids for r/{} in manifest, skipping", subreddit);
            skipped_subreddits.push(subreddit.clone());
            continue;
        }

        let outcome = recheck_subreddit(
            source, layout, selector, rechecker, subreddit, post_ids, &pass1_run, &run_id,
        )
        .await;
        match outcome {
            Ok((path, records)) => {
                subreddit_tables.push(path);
                all_records.extend(records);
            }
            Err(e) => {
                e.log_error();
                warn!("Skipping r/{}", subreddit);
                skipped_subreddits.push(subreddit.clone());
            }
        }
    }

    if all_records.is_empty() {
        warn!("No data processed for run {}", pass1_run);
        return Ok(None);
    }

    let combined_path = layout.combined_complete(&run_id);
    write_csv(&combined_path, &all_records)?;
    let summary = CohortSummary::from_records(&all_records);
    info!("Pass 2 complete: {} rows in {}", summary.total_posts, combined_path.display());

    Ok(Some(Pass2Report {
        run_id,
        combined_path,
        subreddit_tables,
        skipped_subreddits,
        summary,
    }))
}

#[allow(clippy::too_many_arguments)]
async fn recheck_subreddit<S>(
    source: &S,
    layout: &DataLayout,
    selector: &RunSelector,
    rechecker: &BatchRechecker,
    subreddit: &str,
    post_ids: &[String],
    pass1_run: &str,
    run_id: &str,
) -> Result<(PathBuf, Vec<CombinedRecord>), CoreError>
where
    S: RedditSource + ?Sized,
{
    info!("Processing r/{}", subreddit);
    let table = layout.locate_pass1_table(selector, subreddit, pass1_run)?;
    let pass1: Vec<PostRecord> = read_csv(&table)?;

    let statuses = rechecker.recheck(source, post_ids).await;
    let combined = join_cohort(pass1, &statuses);
    let resolved = combined.iter().filter(|r| r.is_resolved()).count();
    info!(
        "r/{}: {} of {} posts re-checked",
        subreddit,
        resolved,
        combined.len()
    );

    let path = layout.pass2_table(subreddit, run_id);
    write_csv(&path, &combined)?;
    Ok((path, combined))
}
