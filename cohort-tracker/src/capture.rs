use crate::user_cache::UserInfoCache;
use chrono::{DateTime, Utc};
use modwatch_core::{AuthorSnapshot, CoreError, PostRecord, TrackingState};
use reddit_client::{RedditPostData, RedditSource};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Characters of body text kept in a Pass 1 record.
pub const SELFTEXT_LIMIT: usize = 500;

const PROGRESS_EVERY: usize = 100;

/// Result of Pass 1 for one subreddit. `post_fullnames` parallels `records`.
#[derive(Debug, Clone)]
pub struct CapturedCohort {
    pub subreddit: String,
    pub records: Vec<PostRecord>,
    pub post_fullnames: Vec<String>,
    pub dropped: usize,
}

impl CapturedCohort {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn state_counts(&self) -> [(TrackingState, usize); 2] {
        [
            (TrackingState::Captured, self.records.len()),
            (TrackingState::Dropped, self.dropped),
        ]
    }
}

/// Enumerates the newest posts of `subreddit` and records their initial state.
///
/// A post whose record cannot be built is logged and left out; only a failure
/// of the listing call itself fails the capture.
pub async fn capture_cohort<S>(
    source: &S,
    cache: &mut UserInfoCache,
    subreddit: &str,
    limit: u32,
) -> Result<CapturedCohort, CoreError>
where
    S: RedditSource + ?Sized,
{
    info!("[PASS 1] Collecting fresh posts from r/{}", subreddit);

    let posts = source.new_posts(subreddit, limit).await?;
    let mut records = Vec::with_capacity(posts.len());
    let mut post_fullnames = Vec::with_capacity(posts.len());
    let mut seen = HashSet::with_capacity(posts.len());
    let mut dropped = 0;

    for (i, post) in posts.iter().enumerate() {
        let processed = i + 1;
        if processed % PROGRESS_EVERY == 0 {
            info!(subreddit, processed, "Processed {} posts", processed);
        }

        if !seen.insert(post.name.clone()) {
            debug!("Skipping repeated post {} in r/{}", post.name, subreddit);
            continue;
        }

        let author = cache.snapshot(source, post.author.as_deref()).await;
        match build_post_record(post, author, Utc::now()) {
            Ok(record) => {
                post_fullnames.push(record.post_fullname.clone());
                records.push(record);
            }
            Err(e) => {
                warn!("Error processing post {}: {}", post.id, e);
                dropped += 1;
            }
        }
    }

    info!("Collected {} posts from r/{}", records.len(), subreddit);
    Ok(CapturedCohort {
        subreddit: subreddit.to_string(),
        records,
        post_fullnames,
        dropped,
    })
}

/// Flattens a listed post and its author into a Pass 1 row.
pub fn build_post_record(
    post: &RedditPostData,
    author: AuthorSnapshot,
    captured_at: DateTime<Utc>,
) -> Result<PostRecord, CoreError> {
    if post.name.is_empty() {
        return Err(invalid(post, "missing fullname"));
    }
    let created = timestamp_to_datetime(post.created_utc)
        .ok_or_else(|| invalid(post, &format!("bad created_utc {}", post.created_utc)))?;
    let age = captured_at - created;

    Ok(PostRecord {
        post_fullname: post.name.clone(),
        created_utc: created,
        captured_at_utc: captured_at,
        post_age_seconds_at_capture: age.num_milliseconds() as f64 / 1000.0,
        subreddit: post.subreddit.clone(),
        title: post.title.clone(),
        selftext: truncate_chars(post.selftext.as_deref().unwrap_or(""), SELFTEXT_LIMIT),
        domain: post.domain.clone(),
        initial_score: post.score,
        initial_num_comments: post.num_comments,
        initial_upvote_ratio: post.upvote_ratio,
        link_flair_text: post.link_flair_text.clone(),
        author_username: author.username,
        author_account_age_days: author.account_age_days,
        author_total_karma: author.total_karma,
        author_link_karma: author.link_karma,
        author_comment_karma: author.comment_karma,
        author_is_verified: author.is_verified,
        author_unavailable: author.author_unavailable,
    })
}

/// Reddit epoch seconds to a UTC time. `None` for NaN, infinite or negative input.
pub(crate) fn timestamp_to_datetime(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    let whole = seconds.trunc();
    let nanos = ((seconds - whole) * 1e9) as u32;
    DateTime::<Utc>::from_timestamp(whole as i64, nanos)
}

fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}

fn invalid(post: &RedditPostData, reason: &str) -> CoreError {
    CoreError::InvalidRecord {
        post_id: post.id.clone(),
        reason: reason.to_string(),
    }
}
