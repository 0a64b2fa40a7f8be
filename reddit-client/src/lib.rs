pub mod api;
pub mod auth;
pub mod metrics;
pub mod rate_limiter;
pub mod source;

pub use api::{RedditApiClient, RedditListing, RedditPostData, RedditUserData};
pub use auth::{fetch_script_token, AccessToken};
pub use metrics::{ApiMetrics, MetricsCollector};
pub use rate_limiter::{FixedIntervalGate, NoopPacer, Pacer, RateLimitConfig, RateLimiter};
pub use source::RedditSource;
