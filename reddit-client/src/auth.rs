use modwatch_core::{CoreError, RedditApiError, RedditCredentials};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error};

const REDDIT_TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";

#[derive(Debug, Clone, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    #[serde(default)]
    pub scope: String,
}

/// Reddit answers a bad password grant with 200 and an `error` body.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TokenResponse {
    Token(AccessToken),
    Error { error: String },
}

/// Password grant for a Reddit "script" app.
pub async fn fetch_script_token(
    http_client: &Client,
    credentials: &RedditCredentials,
) -> Result<AccessToken, CoreError> {
    debug!("Requesting access token for /u/{}", credentials.username);

    let response = http_client
        .post(REDDIT_TOKEN_URL)
        .basic_auth(&credentials.client_id, Some(&credentials.client_secret))
        .form(&[
            ("grant_type", "password"),
            ("username", credentials.username.as_str()),
            ("password", credentials.password.as_str()),
        ])
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        error!("Token request failed with status {}", status);
        return Err(RedditApiError::AuthenticationFailed {
            reason: format!("token endpoint returned {}", status),
        }
        .into());
    }

    let body: TokenResponse = response.json().await.map_err(|e| {
        error!("Failed to parse token response: {}", e);
        RedditApiError::InvalidResponse {
            details: "Failed to parse token response".to_string(),
        }
    })?;

    parse_token_response(body)
}

fn parse_token_response(body: TokenResponse) -> Result<AccessToken, CoreError> {
    match body {
        TokenResponse::Token(token) => {
            debug!(
                "Obtained {} token, expires in {}s",
                token.token_type, token.expires_in
            );
            Ok(token)
        }
        TokenResponse::Error { error } => {
            Err(RedditApiError::AuthenticationFailed { reason: error }.into())
        }
    }
}
