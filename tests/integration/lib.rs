//! Fakes shared by the integration tests: a loopback gateway server and a
//! recording REST client.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use qqbot_api::{ApiError, BotApi, BotInfo, GatewayInfo, SentMessage};
use qqbot_core::config::{DispatchConfig, ExecutionMode, GatewayConfig};
use qqbot_core::{DispatchFrame, OutboundMessage};
use qqbot_dispatch::{DispatchEngine, Registry};
use qqbot_session::SessionManager;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

/// How long a test waits for any single expected frame.
pub const STEP: Duration = Duration::from_secs(5);

/// REST client that points at a [`FakeGateway`] and records sends.
#[derive(Debug)]
pub struct FakeApi {
    gateway_url: String,
    pub sent: Mutex<Vec<(String, OutboundMessage)>>,
}

impl FakeApi {
    pub fn new(gateway_url: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            gateway_url: gateway_url.into(),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter_map(|(_, m)| m.content.clone())
            .collect()
    }

    fn record(&self, to: &str, message: &OutboundMessage) -> qqbot_api::Result<SentMessage> {
        self.sent.lock().push((to.to_string(), message.clone()));
        Ok(SentMessage::default())
    }
}

#[async_trait]
impl BotApi for FakeApi {
    async fn authorization(&self) -> qqbot_api::Result<String> {
        Ok("QQBot test-token".to_string())
    }

    async fn bot_info(&self) -> qqbot_api::Result<BotInfo> {
        Ok(BotInfo {
            id: "42".to_string(),
            username: "testbot".to_string(),
            ..Default::default()
        })
    }

    async fn gateway(&self) -> qqbot_api::Result<GatewayInfo> {
        if self.gateway_url.is_empty() {
            return Err(ApiError::Closed);
        }
        Ok(GatewayInfo {
            url: self.gateway_url.clone(),
            shards: 1,
            session_start_limit: None,
        })
    }

    async fn send_message(&self, channel_id: &str, message: &OutboundMessage) -> qqbot_api::Result<SentMessage> {
        self.record(channel_id, message)
    }

    async fn send_direct_message(&self, guild_id: &str, message: &OutboundMessage) -> qqbot_api::Result<SentMessage> {
        self.record(guild_id, message)
    }

    async fn send_group_message(&self, group_openid: &str, message: &OutboundMessage) -> qqbot_api::Result<SentMessage> {
        self.record(group_openid, message)
    }

    async fn send_c2c_message(&self, openid: &str, message: &OutboundMessage) -> qqbot_api::Result<SentMessage> {
        self.record(openid, message)
    }
}

/// A gateway server bound to an ephemeral loopback port.
pub struct FakeGateway {
    listener: TcpListener,
    url: String,
}

impl FakeGateway {
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        Self { listener, url }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Accept the next client socket.
    pub async fn accept(&self) -> FakeSocket {
        let (stream, _) = tokio::time::timeout(STEP, self.listener.accept())
            .await
            .expect("client did not connect")
            .unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        FakeSocket { ws }
    }
}

/// Server side of one client connection.
pub struct FakeSocket {
    ws: WebSocketStream<TcpStream>,
}

impl FakeSocket {
    pub async fn send(&mut self, frame: &DispatchFrame) {
        self.ws.send(Message::Text(frame.encode())).await.unwrap();
    }

    pub async fn hello(&mut self, heartbeat_interval_ms: u64) {
        let hello = json!({"op": 10, "d": {"heartbeat_interval": heartbeat_interval_ms}});
        self.ws.send(Message::Text(hello.to_string())).await.unwrap();
    }

    /// Next client frame, or `None` once the client hangs up.
    pub async fn recv(&mut self) -> Option<DispatchFrame> {
        loop {
            let next = tokio::time::timeout(STEP, self.ws.next())
                .await
                .expect("no frame from client");
            match next? {
                Ok(Message::Text(text)) => return Some(DispatchFrame::decode(&text).unwrap()),
                Ok(Message::Close(_)) | Err(_) => return None,
                Ok(_) => continue,
            }
        }
    }

    /// Next client frame with op `op`, skipping others (heartbeats).
    pub async fn recv_op(&mut self, op: u8) -> DispatchFrame {
        loop {
            let frame = self.recv().await.expect("client closed");
            if frame.op == op {
                return frame;
            }
        }
    }

    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}

pub fn ready_frame(seq: u64, session_id: &str) -> DispatchFrame {
    DispatchFrame::dispatch(
        seq,
        "READY",
        json!({
            "version": 1,
            "session_id": session_id,
            "user": {"id": "42", "username": "testbot", "bot": true},
            "shard": [0, 1],
        }),
    )
}

pub fn message_frame(seq: u64, content: &str) -> DispatchFrame {
    DispatchFrame::dispatch(
        seq,
        "AT_MESSAGE_CREATE",
        json!({
            "id": format!("m{}", seq),
            "content": content,
            "channel_id": "c1",
            "guild_id": "g1",
            "author": {"id": "u1", "username": "alice"},
            "member": {"roles": ["1"]},
        }),
    )
}

/// Gateway settings with short delays.
pub fn fast_gateway_config() -> GatewayConfig {
    GatewayConfig {
        reconnect_delay_ms: 10,
        long_backoff_ms: 0,
        invalid_session_delay_min_ms: 10,
        invalid_session_delay_max_ms: 20,
        ..GatewayConfig::default()
    }
}

/// An inline engine over `registry`.
pub fn engine(registry: Registry, api: Arc<FakeApi>) -> Arc<DispatchEngine> {
    let config = DispatchConfig {
        execution: ExecutionMode::Inline,
        ..DispatchConfig::default()
    };
    let sessions = Arc::new(SessionManager::new("42").with_api(api.clone()));
    Arc::new(DispatchEngine::new(registry, api, sessions, &config))
}
