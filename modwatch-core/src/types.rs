use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Username Reddit reports for deleted accounts, and body text of self-deleted posts.
pub const DELETED_MARKER: &str = "[deleted]";
/// Title or body text Reddit substitutes on moderator-removed posts.
pub const REMOVED_MARKER: &str = "[removed]";
/// Username recorded when a lookup failed for an unexpected reason.
pub const ERROR_USERNAME: &str = "[error]";

pub const RUN_STAMP_FORMAT: &str = "%Y%m%d_%H%M";

/// Formats the timestamp used in every output file name.
pub fn run_stamp(at: DateTime<Utc>) -> String {
    at.format(RUN_STAMP_FORMAT).to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorSnapshot {
    pub username: String,
    pub account_age_days: Option<i64>,
    pub link_karma: Option<i64>,
    pub comment_karma: Option<i64>,
    pub total_karma: Option<i64>,
    pub is_verified: Option<bool>,
    pub author_unavailable: bool,
}

impl AuthorSnapshot {
    pub fn resolved(
        username: impl Into<String>,
        account_created: DateTime<Utc>,
        link_karma: i64,
        comment_karma: i64,
        is_verified: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            username: username.into(),
            account_age_days: Some((now - account_created).num_days()),
            link_karma: Some(link_karma),
            comment_karma: Some(comment_karma),
            total_karma: Some(link_karma + comment_karma),
            is_verified: Some(is_verified),
            author_unavailable: false,
        }
    }

    pub fn unavailable(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            account_age_days: None,
            link_karma: None,
            comment_karma: None,
            total_karma: None,
            is_verified: None,
            author_unavailable: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UnavailableReason {
    /// Null author or the `[deleted]` username; no lookup is made.
    Deleted,
    NotFound,
    Forbidden,
    /// Profile came back without account data.
    Suspended,
    Error(String),
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnavailableReason::Deleted => write!(f, "deleted"),
            UnavailableReason::NotFound => write!(f, "not found"),
            UnavailableReason::Forbidden => write!(f, "forbidden"),
            UnavailableReason::Suspended => write!(f, "suspended"),
            UnavailableReason::Error(message) => write!(f, "error: {}", message),
        }
    }
}

/// Outcome of resolving a post author.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthorLookup {
    Resolved(AuthorSnapshot),
    Unavailable {
        username: String,
        reason: UnavailableReason,
    },
}

impl AuthorLookup {
    pub fn deleted() -> Self {
        AuthorLookup::Unavailable {
            username: DELETED_MARKER.to_string(),
            reason: UnavailableReason::Deleted,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, AuthorLookup::Resolved(_))
    }

    pub fn snapshot(&self) -> AuthorSnapshot {
        match self {
            AuthorLookup::Resolved(snapshot) => snapshot.clone(),
            AuthorLookup::Unavailable {
                reason: UnavailableReason::Error(_),
                ..
            } => AuthorSnapshot::unavailable(ERROR_USERNAME),
            AuthorLookup::Unavailable { username, .. } => {
                AuthorSnapshot::unavailable(username.clone())
            }
        }
    }
}

/// Initial state of a post as captured in Pass 1. One CSV row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRecord {
    pub post_fullname: String,
    pub created_utc: DateTime<Utc>,
    pub captured_at_utc: DateTime<Utc>,
    pub post_age_seconds_at_capture: f64,
    pub subreddit: String,
    pub title: String,
    pub selftext: String,
    pub domain: Option<String>,
    pub initial_score: i64,
    pub initial_num_comments: i64,
    pub initial_upvote_ratio: Option<f64>,
    pub link_flair_text: Option<String>,
    pub author_username: String,
    pub author_account_age_days: Option<i64>,
    pub author_total_karma: Option<i64>,
    pub author_link_karma: Option<i64>,
    pub author_comment_karma: Option<i64>,
    pub author_is_verified: Option<bool>,
    pub author_unavailable: bool,
}

/// State of a post at the Pass 2 re-check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub post_fullname: String,
    pub final_score: i64,
    pub final_num_comments: i64,
    pub final_upvote_ratio: Option<f64>,
    pub is_removed_official: bool,
    pub is_removed_content: bool,
    pub is_removed_inferred: bool,
    pub removed_by_category: Option<String>,
    pub is_deleted: bool,
    pub is_deleted_author: bool,
    pub is_deleted_content: bool,
    pub is_locked: bool,
    pub is_archived: bool,
    pub rechecked_at_utc: DateTime<Utc>,
}

/// Where a post is in its lifecycle across the two passes.
///
/// `Captured` -> `RecheckPending` -> `Resolved` | `Unresolved`, or `Dropped`
/// when its Pass 1 record could not be built. Only the two end states of
/// Pass 2 are ever written to a combined table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingState {
    /// Record built in memory, not yet written to a manifest.
    Captured,
    /// Listed in a written manifest, waiting for Pass 2.
    RecheckPending,
    Resolved,
    Unresolved,
    /// Never entered the manifest.
    Dropped,
}

impl fmt::Display for TrackingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TrackingState::Captured => "captured",
            TrackingState::RecheckPending => "recheck_pending",
            TrackingState::Resolved => "resolved",
            TrackingState::Unresolved => "unresolved",
            TrackingState::Dropped => "dropped",
        };
        f.write_str(name)
    }
}

/// Pass 1 row joined with its Pass 2 status. Final-state columns are empty
/// when the re-check found nothing for the post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedRecord {
    pub post_fullname: String,
    pub created_utc: DateTime<Utc>,
    pub captured_at_utc: DateTime<Utc>,
    pub post_age_seconds_at_capture: f64,
    pub subreddit: String,
    pub title: String,
    pub selftext: String,
    pub domain: Option<String>,
    pub initial_score: i64,
    pub initial_num_comments: i64,
    pub initial_upvote_ratio: Option<f64>,
    pub link_flair_text: Option<String>,
    pub author_username: String,
    pub author_account_age_days: Option<i64>,
    pub author_total_karma: Option<i64>,
    pub author_link_karma: Option<i64>,
    pub author_comment_karma: Option<i64>,
    pub author_is_verified: Option<bool>,
    pub author_unavailable: bool,
    pub final_score: Option<i64>,
    pub final_num_comments: Option<i64>,
    pub final_upvote_ratio: Option<f64>,
    pub is_removed_official: Option<bool>,
    pub is_removed_content: Option<bool>,
    pub is_removed_inferred: Option<bool>,
    pub removed_by_category: Option<String>,
    pub is_deleted: Option<bool>,
    pub is_deleted_author: Option<bool>,
    pub is_deleted_content: Option<bool>,
    pub is_locked: Option<bool>,
    pub is_archived: Option<bool>,
    pub rechecked_at_utc: Option<DateTime<Utc>>,
    pub tracking_state: TrackingState,
}

impl CombinedRecord {
    pub fn join(post: PostRecord, status: Option<&StatusRecord>) -> Self {
        let tracking_state = if status.is_some() {
            TrackingState::Resolved
        } else {
            TrackingState::Unresolved
        };

        Self {
            post_fullname: post.post_fullname,
            created_utc: post.created_utc,
            captured_at_utc: post.captured_at_utc,
            post_age_seconds_at_capture: post.post_age_seconds_at_capture,
            subreddit: post.subreddit,
            title: post.title,
            selftext: post.selftext,
            domain: post.domain,
            initial_score: post.initial_score,
            initial_num_comments: post.initial_num_comments,
            initial_upvote_ratio: post.initial_upvote_ratio,
            link_flair_text: post.link_flair_text,
            author_username: post.author_username,
            author_account_age_days: post.author_account_age_days,
            author_total_karma: post.author_total_karma,
            author_link_karma: post.author_link_karma,
            author_comment_karma: post.author_comment_karma,
            author_is_verified: post.author_is_verified,
            author_unavailable: post.author_unavailable,
            final_score: status.map(|s| s.final_score),
            final_num_comments: status.map(|s| s.final_num_comments),
            final_upvote_ratio: status.and_then(|s| s.final_upvote_ratio),
            is_removed_official: status.map(|s| s.is_removed_official),
            is_removed_content: status.map(|s| s.is_removed_content),
            is_removed_inferred: status.map(|s| s.is_removed_inferred),
            removed_by_category: status.and_then(|s| s.removed_by_category.clone()),
            is_deleted: status.map(|s| s.is_deleted),
            is_deleted_author: status.map(|s| s.is_deleted_author),
            is_deleted_content: status.map(|s| s.is_deleted_content),
            is_locked: status.map(|s| s.is_locked),
            is_archived: status.map(|s| s.is_archived),
            rechecked_at_utc: status.map(|s| s.rechecked_at_utc),
            tracking_state,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.tracking_state == TrackingState::Resolved
    }
}

/// Subreddit name to the post fullnames captured for it in one Pass 1 run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CohortManifest(BTreeMap<String, Vec<String>>);

impl CohortManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a cohort. Repeated fullnames keep their first position.
    pub fn insert(&mut self, subreddit: impl Into<String>, post_fullnames: Vec<String>) {
        let mut seen = HashSet::with_capacity(post_fullnames.len());
        let unique = post_fullnames
            .into_iter()
            .filter(|id| seen.insert(id.clone()))
            .collect();
        self.0.insert(subreddit.into(), unique);
    }

    pub fn post_ids(&self, subreddit: &str) -> Option<&[String]> {
        self.0.get(subreddit).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn total_posts(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }
}
