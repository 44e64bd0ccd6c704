//! WebSocket Protocol Messages
//!
//! Every frame on the socket is a JSON envelope `{"event": ..., "data": ...}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

/// Event names the transport itself publishes
pub mod events {
    pub const CONNECTED: &str = "connected";
    pub const DISCONNECTED: &str = "disconnected";
    pub const RECONNECTING: &str = "reconnecting";
    pub const ERROR: &str = "error";
    /// Scene document pushed by the authority
    pub const SCENE: &str = "scene";
    /// Announced mesh list. Not used yet.
    pub const COLLADA_LIST: &str = "colladaList";
}

/// Close code used when the socket went away without a close handshake
pub const ABNORMAL_CLOSE: u16 = 1006;

/// Wire envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

/// Connection state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// How a connection ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloseReason {
    /// The close handshake completed
    Clean,
    /// The connection failed or dropped
    Failed,
}

/// Details of a closed connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub clean: bool,
    pub code: u16,
    pub reason: String,
}

impl CloseInfo {
    /// Connection lost without a close frame.
    pub fn abnormal() -> Self {
        Self {
            clean: false,
            code: ABNORMAL_CLOSE,
            reason: String::new(),
        }
    }

    /// Close handshake initiated by the peer.
    pub fn from_frame(frame: Option<CloseFrame<'_>>) -> Self {
        match frame {
            Some(frame) => Self {
                clean: true,
                code: u16::from(frame.code),
                reason: frame.reason.into_owned(),
            },
            None => Self {
                clean: true,
                code: u16::from(CloseCode::Status),
                reason: String::new(),
            },
        }
    }
}

/// Lifecycle events published by the transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum ConnectionEvent {
    Connected {
        endpoint: String,
    },
    Disconnected {
        endpoint: String,
        reason: CloseReason,
        code: u16,
    },
    Reconnecting {
        endpoint: String,
        attempt: u32,
    },
    Error {
        endpoint: String,
        message: String,
    },
}

impl ConnectionEvent {
    /// Name the event is published under.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected { .. } => events::CONNECTED,
            Self::Disconnected { .. } => events::DISCONNECTED,
            Self::Reconnecting { .. } => events::RECONNECTING,
            Self::Error { .. } => events::ERROR,
        }
    }

    /// Payload for name-based subscribers.
    pub fn data(&self) -> Value {
        match self {
            Self::Connected { endpoint } => Value::String(endpoint.clone()),
            Self::Disconnected {
                endpoint,
                reason,
                code,
            } => serde_json::json!({ "endpoint": endpoint, "reason": reason, "code": code }),
            Self::Reconnecting { endpoint, attempt } => {
                serde_json::json!({ "endpoint": endpoint, "attempt": attempt })
            }
            Self::Error { message, .. } => Value::String(message.clone()),
        }
    }
}
