//! WebSocket message shapes.
//!
//! Client to server: `{"type": "subscribe" | "unsubscribe", "topic": "100001:1101"}`.
//! Server to client: `{"type", "topic", "data"}` where `data` is `"ack"`,
//! `{"error": ...}` or an order update.

use broker_core::OrderUpdate;
use serde::{Deserialize, Serialize};

pub const TYPE_SUBSCRIBE: &str = "subscribe";
pub const TYPE_UPDATE: &str = "update";
pub const ACK: &str = "ack";

/// What a client asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Subscribe,
    Unsubscribe,
    Other,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawRequest {
    #[serde(rename = "type")]
    kind: String,
    topic: String,
}

/// A parsed client request with type and topic trimmed and lowercased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRequest {
    pub kind: RequestKind,
    pub topic: String,
}

impl ClientRequest {
    /// Parse a text frame. Returns `None` for anything that is not a JSON object.
    pub fn parse(text: &str) -> Option<Self> {
        let raw: RawRequest = serde_json::from_str(text).ok()?;
        let kind = match raw.kind.trim().to_lowercase().as_str() {
            "subscribe" => RequestKind::Subscribe,
            "unsubscribe" => RequestKind::Unsubscribe,
            _ => RequestKind::Other,
        };
        Some(Self {
            kind,
            topic: raw.topic.trim().to_lowercase(),
        })
    }
}

/// Payload of a server message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageData {
    Text(String),
    Error { error: String },
    Update(OrderUpdate),
}

/// Message sent to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub topic: String,
    pub data: MessageData,
}

impl ServerMessage {
    pub fn ack(topic: &str) -> Self {
        Self {
            kind: TYPE_SUBSCRIBE.to_string(),
            topic: topic.to_string(),
            data: MessageData::Text(ACK.to_string()),
        }
    }

    pub fn error(kind: &str, topic: &str, error: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            topic: topic.to_string(),
            data: MessageData::Error {
                error: error.into(),
            },
        }
    }

    pub fn update(topic: &str, update: OrderUpdate) -> Self {
        Self {
            kind: TYPE_UPDATE.to_string(),
            topic: topic.to_string(),
            data: MessageData::Update(update),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
