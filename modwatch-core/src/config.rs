use crate::error::{ConfigError, CoreError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound on identifiers per `/api/info` call.
pub const MAX_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub subreddits: Vec<String>,
    pub post_limit: u32,
    pub data_dir: PathBuf,
    pub batch_size: usize,
    pub pacing: PacingConfig,
}

/// Fixed delays between external calls, in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    pub author_lookup_ms: u64,
    pub batch_ms: u64,
    pub subreddit_ms: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            subreddits: vec!["AskReddit".to_string()],
            post_limit: 100,
            data_dir: PathBuf::from("data"),
            batch_size: MAX_BATCH_SIZE,
            pacing: PacingConfig::default(),
        }
    }
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            author_lookup_ms: 600,
            batch_ms: 2000,
            subreddit_ms: 5000,
        }
    }
}

impl PacingConfig {
    pub fn author_lookup(&self) -> Duration {
        Duration::from_millis(self.author_lookup_ms)
    }

    pub fn batch(&self) -> Duration {
        Duration::from_millis(self.batch_ms)
    }

    pub fn subreddit(&self) -> Duration {
        Duration::from_millis(self.subreddit_ms)
    }
}

impl TrackerConfig {
    pub fn from_file(path: &Path) -> Result<Self, CoreError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.display().to_string(),
            }
            .into());
        }
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Reads `path` if it exists, otherwise starts from the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, CoreError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::info!("No config at {}, using defaults", path.display());
            let config = Self::default();
            config.validate()?;
            Ok(config)
        }
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, CoreError> {
        let config: Self = toml::from_str(raw).map_err(ConfigError::from)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.subreddits.is_empty() {
            return Err(ConfigError::ValidationFailed {
                reason: "at least one subreddit is required".to_string(),
            });
        }
        if let Some(blank) = self.subreddits.iter().find(|s| s.trim().is_empty()) {
            return Err(ConfigError::InvalidValue {
                field: "subreddits".to_string(),
                value: format!("{:?}", blank),
            });
        }
        let mut seen = HashSet::with_capacity(self.subreddits.len());
        if let Some(repeated) = self
            .subreddits
            .iter()
            .find(|s| !seen.insert(s.trim().to_ascii_lowercase()))
        {
            return Err(ConfigError::InvalidValue {
                field: "subreddits".to_string(),
                value: format!("{:?} listed more than once", repeated),
            });
        }
        if self.post_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "post_limit".to_string(),
                value: "0".to_string(),
            });
        }
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(ConfigError::InvalidValue {
                field: "batch_size".to_string(),
                value: self.batch_size.to_string(),
            });
        }
        Ok(())
    }
}

/// Reddit "script" application credentials.
#[derive(Clone)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
}

impl RedditCredentials {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            client_id: require_env("REDDIT_CLIENT_ID")?,
            client_secret: require_env("REDDIT_CLIENT_SECRET")?,
            username: require_env("REDDIT_USERNAME")?,
            password: require_env("REDDIT_PASSWORD")?,
        })
    }

    pub fn user_agent(&self) -> String {
        format!("moderation_research_bot v1.0 by /u/{}", self.username)
    }
}

impl std::fmt::Debug for RedditCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedditCredentials")
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

fn require_env(var_name: &str) -> Result<String, ConfigError> {
    match std::env::var(var_name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::MissingEnvironmentVariable {
            var_name: var_name.to_string(),
        }),
    }
}
