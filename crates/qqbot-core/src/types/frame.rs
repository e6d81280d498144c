//! Gateway wire envelope and op codes.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Gateway op codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    /// Server pushes an event.
    Dispatch,
    /// Client keep-alive carrying the last sequence.
    Heartbeat,
    /// Client starts a fresh session.
    Identify,
    /// Client continues a previous session.
    Resume,
    /// Server asks the client to reconnect.
    Reconnect,
    /// Server rejected identify/resume.
    InvalidSession,
    /// First frame after the socket opens.
    Hello,
    /// Server acknowledged a heartbeat.
    HeartbeatAck,
}

impl OpCode {
    /// The integer value on the wire.
    pub fn code(self) -> u8 {
        match self {
            Self::Dispatch => 0,
            Self::Heartbeat => 1,
            Self::Identify => 2,
            Self::Resume => 6,
            Self::Reconnect => 7,
            Self::InvalidSession => 9,
            Self::Hello => 10,
            Self::HeartbeatAck => 11,
        }
    }

    /// Map a wire value to an op code.
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::Dispatch,
            1 => Self::Heartbeat,
            2 => Self::Identify,
            6 => Self::Resume,
            7 => Self::Reconnect,
            9 => Self::InvalidSession,
            10 => Self::Hello,
            11 => Self::HeartbeatAck,
            _ => return None,
        })
    }
}

/// One gateway frame: `{op, d, s, t, id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchFrame {
    /// Raw op code.
    pub op: u8,

    /// Sequence number (dispatch frames only).
    #[serde(rename = "s", default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,

    /// Event type (dispatch frames only).
    #[serde(rename = "t", default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,

    /// Event payload.
    #[serde(rename = "d", default)]
    pub payload: Value,

    /// Event id, used for passive replies to non-message events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl DispatchFrame {
    /// Decode a text frame.
    pub fn decode(text: &str) -> Result<Self, Error> {
        let frame: Self = serde_json::from_str(text)?;
        Ok(frame)
    }

    /// Encode as a text frame.
    pub fn encode(&self) -> String {
        // A Value-backed struct always serializes
        serde_json::to_string(self).unwrap_or_default()
    }

    /// The op code, if known.
    pub fn op_code(&self) -> Option<OpCode> {
        OpCode::from_code(self.op)
    }

    /// Build a client frame.
    pub fn outbound(op: OpCode, payload: Value) -> Self {
        Self {
            op: op.code(),
            seq: None,
            event_type: None,
            payload,
            id: None,
        }
    }

    /// Build a dispatch frame (used by tests and alternate transports).
    pub fn dispatch(seq: u64, event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            op: OpCode::Dispatch.code(),
            seq: Some(seq),
            event_type: Some(event_type.into()),
            payload,
            id: None,
        }
    }

    /// Heartbeat carrying the last seen sequence (`null` before the first dispatch).
    pub fn heartbeat(last_seq: Option<u64>) -> Self {
        Self::outbound(OpCode::Heartbeat, json!(last_seq))
    }

    /// Identify for a fresh session.
    pub fn identify(token: &str, intents: u32, shard: [u32; 2]) -> Self {
        Self::outbound(
            OpCode::Identify,
            json!({
                "token": token,
                "intents": intents,
                "shard": shard,
                "properties": {
                    "$os": std::env::consts::OS,
                    "$browser": "qqbot-rs",
                    "$device": "qqbot-rs",
                },
            }),
        )
    }

    /// Resume a previous session from `seq`.
    pub fn resume(token: &str, session_id: &str, seq: Option<u64>) -> Self {
        Self::outbound(
            OpCode::Resume,
            json!({
                "token": token,
                "session_id": session_id,
                "seq": seq.unwrap_or(0),
            }),
        )
    }
}

/// Payload of op 10.
#[derive(Debug, Clone, Deserialize)]
pub struct HelloPayload {
    /// Heartbeat interval in milliseconds.
    pub heartbeat_interval: u64,
}

/// Bot user as reported by READY.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BotUser {
    /// Bot user id.
    #[serde(default)]
    pub id: String,

    /// Bot display name.
    #[serde(default)]
    pub username: String,

    /// Always true for bot accounts.
    #[serde(default)]
    pub bot: bool,
}

/// Payload of the READY dispatch.
#[derive(Debug, Clone, Deserialize)]
pub struct ReadyPayload {
    /// Protocol version.
    #[serde(default)]
    pub version: u32,

    /// Session id to resume with.
    pub session_id: String,

    /// The bot's own user.
    #[serde(default)]
    pub user: BotUser,

    /// `[shard_index, shard_total]`.
    #[serde(default)]
    pub shard: Option<[u32; 2]>,
}
