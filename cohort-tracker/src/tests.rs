//! Scripted Reddit source and pacing probes shared by the unit tests.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use modwatch_core::{CoreError, RedditApiError};
use reddit_client::{Pacer, RedditPostData, RedditSource, RedditUserData};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub(crate) enum ProfileScript {
    Found(RedditUserData),
    NotFound,
    Forbidden,
    Broken(String),
}

#[derive(Default)]
pub(crate) struct FakeSource {
    pub listings: HashMap<String, Vec<RedditPostData>>,
    pub current: HashMap<String, RedditPostData>,
    pub profiles: HashMap<String, ProfileScript>,
    /// A bulk call fails when its batch contains any of these fullnames.
    pub poisoned_ids: HashSet<String>,
    pub profile_calls: Mutex<Vec<String>>,
    pub info_calls: Mutex<Vec<Vec<String>>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listing(mut self, subreddit: &str, posts: Vec<RedditPostData>) -> Self {
        self.listings.insert(subreddit.to_string(), posts);
        self
    }

    pub fn with_current(mut self, post: RedditPostData) -> Self {
        self.current.insert(post.name.clone(), post);
        self
    }

    pub fn with_profile(mut self, username: &str, script: ProfileScript) -> Self {
        self.profiles.insert(username.to_string(), script);
        self
    }

    pub fn profile_calls(&self) -> Vec<String> {
        self.profile_calls.lock().unwrap().clone()
    }

    pub fn info_calls(&self) -> Vec<Vec<String>> {
        self.info_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RedditSource for FakeSource {
    async fn new_posts(
        &self,
        subreddit: &str,
        limit: u32,
    ) -> Result<Vec<RedditPostData>, CoreError> {
        match self.listings.get(subreddit) {
            Some(posts) => Ok(posts.iter().take(limit as usize).cloned().collect()),
            None => Err(RedditApiError::NotFound {
                resource: format!("/r/{}/new", subreddit),
            }
            .into()),
        }
    }

    async fn posts_by_fullname(
        &self,
        fullnames: &[String],
    ) -> Result<Vec<RedditPostData>, CoreError> {
        self.info_calls.lock().unwrap().push(fullnames.to_vec());

        if fullnames.iter().any(|id| self.poisoned_ids.contains(id)) {
            return Err(RedditApiError::ServerError { status_code: 502 }.into());
        }
        Ok(fullnames
            .iter()
            .filter_map(|id| self.current.get(id).cloned())
            .collect())
    }

    async fn user_profile(&self, username: &str) -> Result<RedditUserData, CoreError> {
        self.profile_calls.lock().unwrap().push(username.to_string());

        match self.profiles.get(username) {
            Some(ProfileScript::Found(profile)) => Ok(profile.clone()),
            Some(ProfileScript::Forbidden) => Err(RedditApiError::Forbidden {
                resource: format!("/user/{}/about", username),
            }
            .into()),
            Some(ProfileScript::Broken(message)) => Err(CoreError::Internal {
                message: message.clone(),
            }),
            Some(ProfileScript::NotFound) | None => Err(RedditApiError::NotFound {
                resource: format!("/user/{}/about", username),
            }
            .into()),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct CountingPacer {
    pauses: AtomicUsize,
}

impl CountingPacer {
    pub fn count(&self) -> usize {
        self.pauses.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Pacer for CountingPacer {
    async fn pause(&self) {
        self.pauses.fetch_add(1, Ordering::SeqCst);
    }
}

pub(crate) fn post(fullname: &str, subreddit: &str, author: Option<&str>) -> RedditPostData {
    let created = Utc::now() - Duration::hours(1);
    RedditPostData {
        id: fullname.trim_start_matches("t3_").to_string(),
        name: fullname.to_string(),
        title: format!("Post {}", fullname),
        selftext: Some(String::new()),
        author: author.map(str::to_string),
        subreddit: subreddit.to_string(),
        created_utc: created.timestamp() as f64,
        score: 1,
        num_comments: 0,
        upvote_ratio: Some(1.0),
        domain: Some(format!("self.{}", subreddit)),
        ..Default::default()
    }
}

pub(crate) fn profile(
    name: &str,
    created: DateTime<Utc>,
    link: i64,
    comment: i64,
) -> ProfileScript {
    ProfileScript::Found(RedditUserData {
        name: name.to_string(),
        created_utc: Some(created.timestamp() as f64),
        link_karma: link,
        comment_karma: comment,
        verified: Some(true),
        is_suspended: None,
    })
}
