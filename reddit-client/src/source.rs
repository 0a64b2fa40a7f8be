use crate::api::{RedditApiClient, RedditPostData, RedditUserData};
use async_trait::async_trait;
use modwatch_core::CoreError;

/// The three Reddit calls the cohort workflow depends on.
#[async_trait]
pub trait RedditSource: Send + Sync {
    /// Newest posts of `subreddit`, newest first, at most `limit`.
    async fn new_posts(&self, subreddit: &str, limit: u32)
        -> Result<Vec<RedditPostData>, CoreError>;

    /// Current state of the given fullnames (at most 100 per call).
    async fn posts_by_fullname(
        &self,
        fullnames: &[String],
    ) -> Result<Vec<RedditPostData>, CoreError>;

    async fn user_profile(&self, username: &str) -> Result<RedditUserData, CoreError>;
}

#[async_trait]
impl RedditSource for RedditApiClient {
    async fn new_posts(
        &self,
        subreddit: &str,
        limit: u32,
    ) -> Result<Vec<RedditPostData>, CoreError> {
        self.get_new_posts(subreddit, limit).await
    }

    async fn posts_by_fullname(
        &self,
        fullnames: &[String],
    ) -> Result<Vec<RedditPostData>, CoreError> {
        self.get_info(fullnames).await
    }

    async fn user_profile(&self, username: &str) -> Result<RedditUserData, CoreError> {
        self.get_user_about(username).await
    }
}
