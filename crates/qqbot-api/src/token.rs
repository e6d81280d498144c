//! Authorization header sources.

use crate::error::ApiError;
use crate::Result;
use qqbot_core::config::CredentialsConfig;
use qqbot_core::SecretString;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Endpoint that exchanges an app secret for an access token.
pub const ACCESS_TOKEN_URL: &str = "https://bots.qq.com/app/getAppAccessToken";

/// Refresh this long before the platform-reported expiry.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// How the bot authenticates.
#[derive(Debug, Clone)]
pub enum Credential {
    /// Legacy static token: `Bot {app_id}.{token}`.
    BotToken { app_id: String, token: SecretString },
    /// App secret exchanged for `QQBot {access_token}`.
    AppSecret { app_id: String, secret: SecretString },
}

impl Credential {
    /// Pick a credential from config, preferring the app secret.
    pub fn from_config(config: &CredentialsConfig) -> Result<Self> {
        let app_id = config.app_id.trim().to_string();
        if app_id.is_empty() {
            return Err(ApiError::Credentials("app_id is empty".to_string()));
        }

        if let Some(secret) = config.secret.as_ref().filter(|s| !s.is_blank()) {
            return Ok(Self::AppSecret {
                app_id,
                secret: secret.clone(),
            });
        }
        if let Some(token) = config.token.as_ref().filter(|t| !t.is_blank()) {
            return Ok(Self::BotToken {
                app_id,
                token: token.clone(),
            });
        }

        Err(ApiError::Credentials(
            "neither token nor secret is configured".to_string(),
        ))
    }

    /// The application id.
    pub fn app_id(&self) -> &str {
        match self {
            Self::BotToken { app_id, .. } | Self::AppSecret { app_id, .. } => app_id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    // The platform sends this as a string
    #[serde(default)]
    expires_in: Value,
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug)]
struct CachedToken {
    value: SecretString,
    refresh_at: Instant,
}

/// Produces the `Authorization` header value, caching access tokens.
#[derive(Debug)]
pub struct TokenSource {
    credential: Credential,
    token_url: String,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenSource {
    /// Create a source for `credential`.
    pub fn new(credential: Credential) -> Self {
        Self {
            credential,
            token_url: ACCESS_TOKEN_URL.to_string(),
            cached: Mutex::new(None),
        }
    }

    /// Override the token endpoint.
    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    /// The credential in use.
    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Current header value, fetching a fresh access token if needed.
    pub async fn authorization(&self, client: &reqwest::Client) -> Result<String> {
        let (app_id, secret) = match &self.credential {
            Credential::BotToken { app_id, token } => {
                return Ok(format!("Bot {}.{}", app_id, token.expose_secret()));
            }
            Credential::AppSecret { app_id, secret } => (app_id, secret),
        };

        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(format!("QQBot {}", token.value.expose_secret()));
            }
        }

        debug!("Fetching access token for app {}", app_id);
        let response = client
            .post(&self.token_url)
            .json(&json!({ "appId": app_id, "clientSecret": secret.expose_secret() }))
            .send()
            .await?;
        let status = response.status();
        let body: AccessTokenResponse = response.json().await?;

        let Some(access_token) = body.access_token.filter(|t| !t.is_empty()) else {
            return Err(ApiError::Unauthorized(format!(
                "token endpoint returned {} (code {:?}): {}",
                status,
                body.code,
                body.message.unwrap_or_default()
            )));
        };

        let lifetime = parse_expires_in(&body.expires_in);
        info!("Obtained access token, valid for {}s", lifetime.as_secs());
        *cached = Some(CachedToken {
            value: SecretString::new(access_token.clone()),
            refresh_at: Instant::now() + lifetime.saturating_sub(REFRESH_MARGIN),
        });

        Ok(format!("QQBot {}", access_token))
    }

    /// Drop the cached access token so the next call refetches.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }
}

fn parse_expires_in(value: &Value) -> Duration {
    let secs = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    Duration::from_secs(secs.unwrap_or(7200))
}
