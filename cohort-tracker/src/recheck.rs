use chrono::{DateTime, Utc};
use modwatch_core::{StatusRecord, DELETED_MARKER, MAX_BATCH_SIZE, REMOVED_MARKER};
use reddit_client::{Pacer, RedditPostData, RedditSource};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};

/// Derives the moderation flags of a re-fetched post.
pub fn derive_status(post: &RedditPostData, rechecked_at: DateTime<Utc>) -> StatusRecord {
    let body = post.selftext.as_deref();

    let is_removed_official = post.removed_by_category.is_some();
    let is_removed_content = body == Some(REMOVED_MARKER) || post.title == REMOVED_MARKER;
    let is_deleted_content = body == Some(DELETED_MARKER);
    let is_deleted_author = match post.author.as_deref() {
        None => true,
        Some(name) => name == DELETED_MARKER,
    };
    let hidden_from_search = post.is_robot_indexable == Some(false);

    StatusRecord {
        post_fullname: post.name.clone(),
        final_score: post.score,
        final_num_comments: post.num_comments,
        final_upvote_ratio: post.upvote_ratio,
        is_removed_official,
        is_removed_content,
        is_removed_inferred: is_removed_official || is_removed_content || hidden_from_search,
        removed_by_category: post.removed_by_category.clone(),
        is_deleted: is_deleted_author || is_deleted_content,
        is_deleted_author,
        is_deleted_content,
        is_locked: post.locked,
        is_archived: post.archived,
        rechecked_at_utc: rechecked_at,
    }
}

/// Pass 2 bulk status lookup.
pub struct BatchRechecker {
    batch_size: usize,
    pacer: Arc<dyn Pacer>,
}

impl BatchRechecker {
    /// `batch_size` is clamped to `1..=100`, the bulk endpoint's ceiling.
    pub fn new(batch_size: usize, pacer: Arc<dyn Pacer>) -> Self {
        Self {
            batch_size: batch_size.clamp(1, MAX_BATCH_SIZE),
            pacer,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Fetches current state for `fullnames` in batches. A failed batch is
    /// logged and its ids are absent from the result; the remaining batches
    /// still run.
    pub async fn recheck<S>(
        &self,
        source: &S,
        fullnames: &[String],
    ) -> HashMap<String, StatusRecord>
    where
        S: RedditSource + ?Sized,
    {
        info!(
            "Fetching final status for {} posts in batches of {}",
            fullnames.len(),
            self.batch_size
        );
        let mut status_map = HashMap::with_capacity(fullnames.len());
        let batch_count = fullnames.len().div_ceil(self.batch_size);

        for (index, batch) in fullnames.chunks(self.batch_size).enumerate() {
            let batch_start = index * self.batch_size;
            let batch_end = batch_start + batch.len();

            match source.posts_by_fullname(batch).await {
                Ok(posts) => {
                    let rechecked_at = Utc::now();
                    for post in &posts {
                        status_map.insert(post.name.clone(), derive_status(post, rechecked_at));
                    }
                }
                Err(e) => {
                    error!(
                        batch_start,
                        batch_end, "Error in batch {}-{}: {}", batch_start, batch_end, e
                    );
                }
            }

            if index + 1 < batch_count {
                self.pacer.pause().await;
            }
        }

        info!("Found status for {} posts", status_map.len());
        status_map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{post, CountingPacer, FakeSource};

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("t3_{}", i)).collect()
    }

    fn rechecker(batch_size: usize) -> (BatchRechecker, Arc<CountingPacer>) {
        let pacer = Arc::new(CountingPacer::default());
        (BatchRechecker::new(batch_size, pacer.clone()), pacer)
    }

    #[test]
    fn test_untouched_post_has_no_flags() {
        let status = derive_status(&post("t3_a", "test", Some("alice")), Utc::now());
        assert!(!status.is_removed_official);
        assert!(!status.is_removed_content);
        assert!(!status.is_removed_inferred);
        assert!(!status.is_deleted);
        assert_eq!(status.removed_by_category, None);
    }

    #[test]
    fn test_official_removal_implies_inferred() {
        for category in ["moderator", "reddit", "automod_filtered", "deleted"] {
            let mut listed = post("t3_a", "test", Some("alice"));
            listed.removed_by_category = Some(category.to_string());
            let status = derive_status(&listed, Utc::now());
            assert!(status.is_removed_official);
            assert!(status.is_removed_inferred);
        }
    }

    #[test]
    fn test_content_sentinels() {
        let mut removed_title = post("t3_a", "test", Some("alice"));
        removed_title.title = "[removed]".to_string();
        let status = derive_status(&removed_title, Utc::now());
        assert!(status.is_removed_content);
        assert!(status.is_removed_inferred);
        assert!(!status.is_removed_official);

        let mut deleted_body = post("t3_b", "test", Some("alice"));
        deleted_body.selftext = Some("[deleted]".to_string());
        let status = derive_status(&deleted_body, Utc::now());
        assert!(status.is_deleted_content);
        assert!(status.is_deleted);
        assert!(!status.is_deleted_author);
        assert!(!status.is_removed_inferred);
    }

    #[test]
    fn test_deleted_author_variants() {
        for author in [None, Some("[deleted]")] {
            let status = derive_status(&post("t3_a", "test", author), Utc::now());
            assert!(status.is_deleted_author);
            assert!(status.is_deleted);
        }
    }

    #[test]
    fn test_hidden_from_search_is_inferred_removal() {
        let mut listed = post("t3_a", "test", Some("alice"));
        listed.is_robot_indexable = Some(false);
        let status = derive_status(&listed, Utc::now());
        assert!(status.is_removed_inferred);
        assert!(!status.is_removed_official);

        listed.is_robot_indexable = Some(true);
        assert!(!derive_status(&listed, Utc::now()).is_removed_inferred);
    }

    #[tokio::test]
    async fn test_batch_count_and_pacing() {
        for (n, expected_calls) in [(1, 1), (100, 1), (101, 2), (250, 3)] {
            let source = FakeSource::new();
            let (rechecker, pacer) = rechecker(100);

            rechecker.recheck(&source, &ids(n)).await;

            let calls = source.info_calls();
            assert_eq!(calls.len(), expected_calls, "n = {}", n);
            assert!(calls.iter().all(|batch| batch.len() <= 100));
            assert_eq!(calls.iter().map(Vec::len).sum::<usize>(), n);
            assert_eq!(pacer.count(), expected_calls - 1);
        }
    }

    #[tokio::test]
    async fn test_empty_input_makes_no_calls() {
        let source = FakeSource::new();
        let (rechecker, pacer) = rechecker(100);
        assert!(rechecker.recheck(&source, &[]).await.is_empty());
        assert!(source.info_calls().is_empty());
        assert_eq!(pacer.count(), 0);
    }

    #[tokio::test]
    async fn test_failed_batch_is_omitted() {
        let all = ids(5);
        let mut source = FakeSource::new();
        for id in &all {
            source = source.with_current(post(id, "test", Some("alice")));
        }
        source.poisoned_ids.insert("t3_2".to_string());
        let (rechecker, pacer) = rechecker(2);

        let statuses = rechecker.recheck(&source, &all).await;

        assert_eq!(source.info_calls().len(), 3);
        assert_eq!(pacer.count(), 2);
        assert!(statuses.contains_key("t3_0"));
        assert!(statuses.contains_key("t3_1"));
        assert!(!statuses.contains_key("t3_2"));
        assert!(!statuses.contains_key("t3_3"));
        assert!(statuses.contains_key("t3_4"));
    }

    #[test]
    fn test_batch_size_clamped() {
        let pacer = Arc::new(CountingPacer::default());
        assert_eq!(BatchRechecker::new(0, pacer.clone()).batch_size(), 1);
        assert_eq!(BatchRechecker::new(500, pacer).batch_size(), 100);
    }
}
