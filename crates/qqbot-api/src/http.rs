//! reqwest-backed [`BotApi`].

use crate::client::{BotApi, BotInfo, GatewayInfo, SentMessage};
use crate::error::ApiError;
use crate::gate::AdmissionGate;
use crate::token::{Credential, TokenSource};
use crate::Result;
use async_trait::async_trait;
use qqbot_core::{BotConfig, OutboundMessage};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Header carrying the platform trace id.
const TRACE_HEADER: &str = "X-Tps-trace-ID";

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

/// HTTP client for the open API.
#[derive(Debug)]
pub struct HttpApi {
    client: reqwest::Client,
    base_url: String,
    tokens: TokenSource,
    gate: AdmissionGate,
}

impl HttpApi {
    /// Build a client from config.
    pub fn from_config(config: &BotConfig) -> Result<Self> {
        let credential = Credential::from_config(&config.credentials)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.api.timeout_secs))
            .user_agent(concat!("qqbot-rs/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: config.api.resolved_base_url(),
            tokens: TokenSource::new(credential),
            gate: AdmissionGate::new(config.api.max_concurrency),
        })
    }

    /// Replace the token source (e.g. to point at another token endpoint).
    pub fn with_token_source(mut self, tokens: TokenSource) -> Self {
        self.tokens = tokens;
        self
    }

    /// The admission gate bounding concurrent calls.
    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    /// Full URL for an API path.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&OutboundMessage>,
    ) -> Result<T> {
        let _permit = self.gate.acquire().await?;
        let authorization = self.tokens.authorization(&self.client).await?;

        let mut request = self
            .client
            .request(method.clone(), self.url(path))
            .header("Authorization", authorization)
            .header("X-Union-Appid", self.tokens.credential().app_id());
        if let Some(body) = body {
            request = request.json(body);
        }

        debug!("{} {}", method, path);
        let response = request.send().await?;
        let status = response.status();
        let trace_id = response
            .headers()
            .get(TRACE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let bytes = response.bytes().await?;

        if status.is_success() {
            let body: &[u8] = if bytes.is_empty() { b"{}" } else { &bytes };
            return Ok(serde_json::from_slice(body)?);
        }

        let error: ErrorBody = serde_json::from_slice(&bytes).unwrap_or_default();
        let err = map_status(status, error, trace_id);
        if matches!(err, ApiError::Unauthorized(_)) {
            self.tokens.invalidate().await;
        }
        warn!("{} {} failed: {}", method, path, err);
        Err(err)
    }
}

fn map_status(status: StatusCode, body: ErrorBody, trace_id: String) -> ApiError {
    match status {
        StatusCode::UNAUTHORIZED => ApiError::Unauthorized(body.message),
        StatusCode::TOO_MANY_REQUESTS => ApiError::RateLimited(body.message),
        _ => ApiError::Status {
            status: status.as_u16(),
            code: body.code,
            message: body.message,
            trace_id,
        },
    }
}

#[async_trait]
impl BotApi for HttpApi {
    async fn authorization(&self) -> Result<String> {
        self.tokens.authorization(&self.client).await
    }

    async fn bot_info(&self) -> Result<BotInfo> {
        self.request(Method::GET, "/users/@me", None).await
    }

    async fn gateway(&self) -> Result<GatewayInfo> {
        self.request(Method::GET, "/gateway/bot", None).await
    }

    async fn send_message(&self, channel_id: &str, message: &OutboundMessage) -> Result<SentMessage> {
        let path = format!("/channels/{}/messages", channel_id);
        self.request(Method::POST, &path, Some(message)).await
    }

    async fn send_direct_message(
        &self,
        guild_id: &str,
        message: &OutboundMessage,
    ) -> Result<SentMessage> {
        let path = format!("/dms/{}/messages", guild_id);
        self.request(Method::POST, &path, Some(message)).await
    }

    async fn send_group_message(
        &self,
        group_openid: &str,
        message: &OutboundMessage,
    ) -> Result<SentMessage> {
        let path = format!("/v2/groups/{}/messages", group_openid);
        self.request(Method::POST, &path, Some(message)).await
    }

    async fn send_c2c_message(&self, openid: &str, message: &OutboundMessage) -> Result<SentMessage> {
        let path = format!("/v2/users/{}/messages", openid);
        self.request(Method::POST, &path, Some(message)).await
    }
}
