use crate::capture::timestamp_to_datetime;
use chrono::{DateTime, Utc};
use modwatch_core::{
    AuthorLookup, AuthorSnapshot, CoreError, RedditApiError, UnavailableReason, DELETED_MARKER,
};
use reddit_client::{Pacer, RedditSource, RedditUserData};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Per-run memo of author lookups keyed by username. Failed lookups are
/// cached too, so an unavailable author is only asked about once.
pub struct UserInfoCache {
    entries: HashMap<String, AuthorLookup>,
    pacer: Arc<dyn Pacer>,
    hits: u64,
    fetches: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub fetches: u64,
}

impl UserInfoCache {
    pub fn new(pacer: Arc<dyn Pacer>) -> Self {
        Self {
            entries: HashMap::new(),
            pacer,
            hits: 0,
            fetches: 0,
        }
    }

    pub fn get(&self, username: &str) -> Option<&AuthorLookup> {
        self.entries.get(username)
    }

    pub fn insert(&mut self, username: impl Into<String>, lookup: AuthorLookup) {
        self.entries.insert(username.into(), lookup);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits,
            fetches: self.fetches,
        }
    }

    /// Resolves a post author. Never fails: anything that keeps us from an
    /// account profile comes back as [`AuthorLookup::Unavailable`].
    pub async fn lookup<S>(&mut self, source: &S, author: Option<&str>) -> AuthorLookup
    where
        S: RedditSource + ?Sized,
    {
        let username = match author {
            Some(name) if name != DELETED_MARKER => name,
            _ => return AuthorLookup::deleted(),
        };

        if let Some(cached) = self.entries.get(username) {
            self.hits += 1;
            debug!("User info cache hit for {}", username);
            return cached.clone();
        }

        self.fetches += 1;
        let lookup = classify_profile(username, source.user_profile(username).await, Utc::now());
        if let AuthorLookup::Unavailable { reason, .. } = &lookup {
            warn!("User {} unavailable ({}), caching failure", username, reason);
        }
        self.pacer.pause().await;

        self.entries.insert(username.to_string(), lookup.clone());
        lookup
    }

    pub async fn snapshot<S>(&mut self, source: &S, author: Option<&str>) -> AuthorSnapshot
    where
        S: RedditSource + ?Sized,
    {
        self.lookup(source, author).await.snapshot()
    }
}

fn classify_profile(
    username: &str,
    result: Result<RedditUserData, CoreError>,
    now: DateTime<Utc>,
) -> AuthorLookup {
    let unavailable = |reason| AuthorLookup::Unavailable {
        username: username.to_string(),
        reason,
    };

    match result {
        Ok(profile) if profile.is_suspended == Some(true) => {
            unavailable(UnavailableReason::Suspended)
        }
        Ok(profile) => match profile.created_utc {
            None => unavailable(UnavailableReason::Suspended),
            Some(created) => match timestamp_to_datetime(created) {
                Some(account_created) => AuthorLookup::Resolved(AuthorSnapshot::resolved(
                    username,
                    account_created,
                    profile.link_karma,
                    profile.comment_karma,
                    profile.verified.unwrap_or(false),
                    now,
                )),
                None => unavailable(UnavailableReason::Error(format!(
                    "account creation time {} out of range",
                    created
                ))),
            },
        },
        Err(CoreError::RedditApi(RedditApiError::NotFound { .. })) => {
            unavailable(UnavailableReason::NotFound)
        }
        Err(CoreError::RedditApi(RedditApiError::Forbidden { .. })) => {
            unavailable(UnavailableReason::Forbidden)
        }
        Err(e) => unavailable(UnavailableReason::Error(e.to_string())),
    }
}
