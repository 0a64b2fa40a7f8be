use crate::auth::{fetch_script_token, AccessToken};
use crate::metrics::{MetricsCollector, RequestMetrics};
use crate::rate_limiter::{RateLimitConfig, RateLimiter};
use modwatch_core::{CoreError, RedditApiError, RedditCredentials, MAX_BATCH_SIZE};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const REDDIT_API_BASE: &str = "https://oauth.reddit.com";

/// Largest page the listing endpoints hand out.
pub const LISTING_PAGE_MAX: u32 = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListing<T> {
    pub kind: String,
    pub data: RedditListingData<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingData<T> {
    pub children: Vec<RedditListingChild<T>>,
    pub after: Option<String>,
    pub before: Option<String>,
    pub dist: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingChild<T> {
    pub kind: String,
    pub data: T,
}

/// A `t3` thing. Fields Reddit omits or nulls on removed posts are optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedditPostData {
    pub id: String,
    /// Fullname, e.g. `t3_abc123`.
    pub name: String,
    pub title: String,
    pub selftext: Option<String>,
    pub author: Option<String>,
    pub subreddit: String,
    pub created_utc: f64,
    pub score: i64,
    pub num_comments: i64,
    pub upvote_ratio: Option<f64>,
    pub domain: Option<String>,
    pub link_flair_text: Option<String>,
    pub removed_by_category: Option<String>,
    pub locked: bool,
    pub archived: bool,
    pub is_robot_indexable: Option<bool>,
}

/// A `t2` thing from `/user/{name}/about`. Suspended accounts come back
/// with little more than the name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedditUserData {
    pub name: String,
    pub created_utc: Option<f64>,
    pub link_karma: i64,
    pub comment_karma: i64,
    pub verified: Option<bool>,
    pub is_suspended: Option<bool>,
}

#[derive(Debug)]
pub struct RedditApiClient {
    http_client: Client,
    rate_limiter: Arc<RateLimiter>,
    metrics: Arc<MetricsCollector>,
    user_agent: String,
    access_token: String,
}

impl RedditApiClient {
    pub fn new(user_agent: String, access_token: String) -> Result<Self, CoreError> {
        let http_client = build_http_client(&user_agent)?;
        Ok(Self::with_http_client(http_client, user_agent, access_token))
    }

    /// Fetches a script-app token and builds a client around it.
    pub async fn connect(credentials: &RedditCredentials) -> Result<Self, CoreError> {
        let user_agent = credentials.user_agent();
        let http_client = build_http_client(&user_agent)?;
        let AccessToken { access_token, .. } =
            fetch_script_token(&http_client, credentials).await?;

        let client = Self::with_http_client(http_client, user_agent, access_token);
        let me = client.get_me().await?;
        info!("Connected to Reddit as: {}", me.name);
        Ok(client)
    }

    fn with_http_client(http_client: Client, user_agent: String, access_token: String) -> Self {
        Self {
            http_client,
            rate_limiter: Arc::new(RateLimiter::new(RateLimitConfig::reddit_oauth())),
            metrics: Arc::new(MetricsCollector::new()),
            user_agent,
            access_token,
        }
    }

    pub async fn make_request(
        &self,
        route: &'static str,
        endpoint: &str,
        query_params: &[(&str, &str)],
    ) -> Result<Response, CoreError> {
        let url = format!("{}{}", REDDIT_API_BASE, endpoint);

        let permit = self.rate_limiter.acquire_permit().await;
        debug!(
            "Acquired rate limit permit for GET {} after {:?}",
            endpoint, permit.queue_wait_time
        );

        let start_time = Instant::now();
        let result = self
            .http_client
            .get(&url)
            .bearer_auth(&self.access_token)
            .header("User-Agent", &self.user_agent)
            .query(&[("raw_json", "1")])
            .query(query_params)
            .send()
            .await;

        let (outcome, status_code) = match result {
            Ok(response) => {
                let status = response.status();
                (check_status(response, endpoint), Some(status.as_u16()))
            }
            Err(e) => {
                error!("Network error for GET {}: {}", endpoint, e);
                if e.is_timeout() {
                    (Err(RedditApiError::RequestTimeout.into()), None)
                } else {
                    (Err(CoreError::Network(e)), None)
                }
            }
        };

        self.metrics
            .record_request(RequestMetrics {
                route,
                status_code,
                response_time: start_time.elapsed(),
                success: outcome.is_ok(),
                rate_limited: status_code == Some(429),
            })
            .await;

        outcome
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        route: &'static str,
        endpoint: &str,
        query_params: &[(&str, &str)],
    ) -> Result<T, CoreError> {
        let response = self.make_request(route, endpoint, query_params).await?;
        response.json::<T>().await.map_err(|e| {
            error!("Failed to parse response from {}: {}", endpoint, e);
            CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: format!("Failed to parse response from {}", endpoint),
            })
        })
    }

    pub async fn get_me(&self) -> Result<RedditUserData, CoreError> {
        self.get_json("/api/v1/me", "/api/v1/me", &[]).await
    }

    /// Newest posts of a subreddit, newest first, following `after` cursors
    /// until `limit` posts are collected or the listing runs out.
    pub async fn get_new_posts(
        &self,
        subreddit: &str,
        limit: u32,
    ) -> Result<Vec<RedditPostData>, CoreError> {
        let endpoint = format!("/r/{}/new", subreddit);
        let mut posts: Vec<RedditPostData> = Vec::with_capacity(limit as usize);
        let mut after: Option<String> = None;

        while posts.len() < limit as usize {
            let page_size = (limit - posts.len() as u32).min(LISTING_PAGE_MAX).to_string();
            let mut params = vec![("limit", page_size.as_str())];
            if let Some(ref cursor) = after {
                params.push(("after", cursor.as_str()));
            }

            let listing: RedditListing<RedditPostData> =
                self.get_json("/r/{sub}/new", &endpoint, &params).await?;
            let page_len = listing.data.children.len();
            posts.extend(listing.data.children.into_iter().map(|child| child.data));
            debug!("Fetched {} posts from r/{} (total {})", page_len, subreddit, posts.len());

            match listing.data.after {
                Some(next) if page_len > 0 => after = Some(next),
                _ => break,
            }
        }

        posts.truncate(limit as usize);
        info!("Retrieved {} posts from r/{}", posts.len(), subreddit);
        Ok(posts)
    }

    /// Current state of up to 100 posts by fullname. Posts Reddit no longer
    /// resolves are simply missing from the result.
    pub async fn get_info(&self, fullnames: &[String]) -> Result<Vec<RedditPostData>, CoreError> {
        if fullnames.len() > MAX_BATCH_SIZE {
            return Err(CoreError::InvalidInput {
                message: format!(
                    "/api/info accepts at most {} ids, got {}",
                    MAX_BATCH_SIZE,
                    fullnames.len()
                ),
            });
        }
        if fullnames.is_empty() {
            return Ok(Vec::new());
        }

        let ids = fullnames.join(",");
        let listing: RedditListing<RedditPostData> = self
            .get_json("/api/info", "/api/info", &[("id", ids.as_str())])
            .await?;

        debug!(
            "Resolved {} of {} requested posts",
            listing.data.children.len(),
            fullnames.len()
        );
        Ok(listing
            .data
            .children
            .into_iter()
            .map(|child| child.data)
            .collect())
    }

    pub async fn get_user_about(&self, username: &str) -> Result<RedditUserData, CoreError> {
        let endpoint = format!("/user/{}/about", username);
        let about: RedditListingChild<RedditUserData> = self
            .get_json("/user/{name}/about", &endpoint, &[])
            .await?;
        Ok(about.data)
    }

    pub async fn get_metrics(&self) -> crate::metrics::ApiMetrics {
        self.metrics.get_metrics().await
    }

    pub async fn get_rate_limit_status(&self) -> crate::rate_limiter::RateLimitStatus {
        self.rate_limiter.get_rate_limit_status().await
    }
}

pub(crate) fn build_http_client(user_agent: &str) -> Result<Client, CoreError> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(CoreError::Network)
}

fn check_status(response: Response, endpoint: &str) -> Result<Response, CoreError> {
    let status = response.status();
    if status.is_success() {
        debug!("Request successful: {} {}", status, endpoint);
        return Ok(response);
    }

    warn!("Request failed with status: {} for {}", status, endpoint);
    let error = match status {
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse::<u64>().ok())
                .unwrap_or(60);
            RedditApiError::RateLimitExceeded { retry_after }
        }
        StatusCode::UNAUTHORIZED => RedditApiError::InvalidToken,
        StatusCode::FORBIDDEN => RedditApiError::Forbidden {
            resource: endpoint.to_string(),
        },
        StatusCode::NOT_FOUND => RedditApiError::NotFound {
            resource: endpoint.to_string(),
        },
        s if s.is_server_error() => RedditApiError::ServerError {
            status_code: s.as_u16(),
        },
        s => RedditApiError::InvalidResponse {
            details: format!("Unexpected status {} from {}", s, endpoint),
        },
    };
    Err(error.into())
}
