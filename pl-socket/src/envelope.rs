//! Message envelope types and the inbound message dispatcher.
//!
//! Defines the JSON envelope carried over the realtime channel and provides
//! a broadcast-based dispatcher so any number of consumers can independently
//! receive collaboration messages.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tokio::sync::broadcast;
use tracing::debug;

use pl_core::error::{PlError, PlResult};

/// All message types carried over the realtime channel.
///
/// These map 1:1 to the `type` field of the JSON envelope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// A client joined a collaboration session (`join_session`).
    JoinSession,
    /// A client left a collaboration session (`leave_session`).
    LeaveSession,
    /// A participant's cursor moved (`cursor_position`).
    CursorPosition,
    /// A collaborative edit operation (`edit_operation`).
    EditOperation,
    /// Heartbeat probe (`ping`).
    Ping,
    /// Heartbeat response (`pong`).
    Pong,
    /// Post-handshake authentication (`auth`).
    Auth,
    /// Connectivity test message (`test`).
    Test,
    /// Unknown/unhandled message type.
    Unknown(String),
}

impl MessageType {
    /// Parse a message type string from the wire.
    pub fn from_str(s: &str) -> Self {
        match s {
            "join_session" => Self::JoinSession,
            "leave_session" => Self::LeaveSession,
            "cursor_position" => Self::CursorPosition,
            "edit_operation" => Self::EditOperation,
            "ping" => Self::Ping,
            "pong" => Self::Pong,
            "auth" => Self::Auth,
            "test" => Self::Test,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Convert to the wire type string.
    pub fn as_str(&self) -> &str {
        match self {
            Self::JoinSession => "join_session",
            Self::LeaveSession => "leave_session",
            Self::CursorPosition => "cursor_position",
            Self::EditOperation => "edit_operation",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Auth => "auth",
            Self::Test => "test",
            Self::Unknown(s) => s.as_str(),
        }
    }

    /// Whether this type belongs to the transport layer (heartbeat, auth)
    /// rather than the collaboration payload stream.
    pub fn is_transport_message(&self) -> bool {
        matches!(self, Self::Ping | Self::Pong | Self::Auth)
    }

    /// Whether this type is recognized by this client.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }

    /// All message type strings this client recognizes.
    pub fn all_type_names() -> &'static [&'static str] {
        &[
            "join_session",
            "leave_session",
            "cursor_position",
            "edit_operation",
            "ping",
            "pong",
            "auth",
            "test",
        ]
    }
}

impl Serialize for MessageType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MessageType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(MessageType::from_str(&s))
    }
}

/// A message envelope as carried in JSON text frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// The message type.
    #[serde(rename = "type")]
    pub message_type: MessageType,

    /// Collaboration session identifier, when the message targets one.
    #[serde(rename = "sessionId", default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Originating user identifier.
    #[serde(rename = "userId", default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<u64>,

    /// Originating user display name.
    #[serde(rename = "userName", default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,

    /// Epoch milliseconds at which the message was created.
    #[serde(default)]
    pub timestamp: i64,

    /// Type-specific payload, carried opaquely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl Envelope {
    /// Create a new envelope of the given type, stamped with the current time.
    pub fn new(message_type: MessageType) -> Self {
        Self {
            message_type,
            session_id: None,
            user_id: None,
            user_name: None,
            timestamp: now_ms(),
            payload: None,
        }
    }

    /// Create an envelope with a payload.
    pub fn with_payload(message_type: MessageType, payload: serde_json::Value) -> Self {
        Self {
            payload: Some(payload),
            ..Self::new(message_type)
        }
    }

    /// Heartbeat ping envelope.
    pub fn ping() -> Self {
        Self::new(MessageType::Ping)
    }

    /// Heartbeat pong envelope.
    pub fn pong() -> Self {
        Self::new(MessageType::Pong)
    }

    /// Post-handshake authentication envelope carrying the user identity.
    pub fn auth(user_id: u64, user_name: &str) -> Self {
        Self {
            user_id: Some(user_id),
            user_name: Some(user_name.to_string()),
            ..Self::new(MessageType::Auth)
        }
    }

    /// Parse an envelope from a JSON text frame.
    pub fn from_json(text: &str) -> PlResult<Self> {
        serde_json::from_str(text).map_err(|e| PlError::MalformedMessage(e.to_string()))
    }

    /// Serialize the envelope to a JSON text frame.
    pub fn to_json(&self) -> PlResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Current time in epoch milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Broadcast-based dispatcher for inbound collaboration messages.
///
/// Uses tokio::broadcast channels so multiple consumers can independently
/// receive and process messages without blocking each other.
#[derive(Clone)]
pub struct MessageDispatcher {
    sender: broadcast::Sender<Envelope>,
}

impl MessageDispatcher {
    /// Create a new MessageDispatcher with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to receive inbound messages.
    ///
    /// Returns a broadcast receiver. Slow consumers that fall behind
    /// will receive a RecvError::Lagged and may miss messages.
    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.sender.subscribe()
    }

    /// Dispatch a message to all active subscribers.
    pub fn dispatch(&self, envelope: Envelope) {
        let kind = envelope.message_type.as_str().to_string();
        match self.sender.send(envelope) {
            Ok(count) => {
                debug!("dispatched {kind} to {count} subscriber(s)");
            }
            Err(_) => {
                // No active receivers -- fine during startup/shutdown
                debug!("no subscribers for message {kind}");
            }
        }
    }

    /// Get the current number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
