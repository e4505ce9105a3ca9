//! Feishu Callback Events
//!
//! A callback body is either a plain event, an `{"encrypt": ...}` envelope
//! wrapping one, or a URL-verification handshake carrying `challenge`.
//! Only the fields the bridge routes on are typed; the rest of the event is
//! kept as raw JSON until a handler needs it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BridgeError, Result};

/// Event type tag for a chat message delivered to the bot
pub const MESSAGE_RECEIVE_V1: &str = "im.message.receive_v1";

/// Routing decision for one callback
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackEvent {
    /// URL verification handshake; echo the challenge back
    Challenge(String),
    /// `im.message.receive_v1`; the raw `event` object
    MessageReceive(Value),
    /// Any other event type (or none at all)
    Other(Option<String>),
}

impl CallbackEvent {
    /// Classify a decrypted (or plaintext) callback body
    pub fn classify(payload: Value) -> Self {
        if let Some(challenge) = payload.get("challenge").and_then(Value::as_str) {
            if !challenge.is_empty() {
                return CallbackEvent::Challenge(challenge.to_string());
            }
        }

        let event_type = payload
            .get("header")
            .and_then(|h| h.get("event_type"))
            .and_then(Value::as_str)
            .map(str::to_string);

        match event_type.as_deref() {
            Some(MESSAGE_RECEIVE_V1) => {
                let event = match payload {
                    Value::Object(mut map) => map.remove("event").unwrap_or(Value::Null),
                    _ => Value::Null,
                };
                CallbackEvent::MessageReceive(event)
            }
            _ => CallbackEvent::Other(event_type),
        }
    }

    /// Short label used in logs and metrics
    pub fn label(&self) -> &str {
        match self {
            CallbackEvent::Challenge(_) => "challenge",
            CallbackEvent::MessageReceive(_) => MESSAGE_RECEIVE_V1,
            CallbackEvent::Other(Some(t)) => t.as_str(),
            CallbackEvent::Other(None) => "unknown",
        }
    }
}

/// Text and sender extracted from an `im.message.receive_v1` event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub text: String,
    pub open_id: String,
}

#[derive(Deserialize)]
struct MessageEvent {
    message: MessageBody,
    sender: Sender,
}

#[derive(Deserialize)]
struct MessageBody {
    content: String,
}

#[derive(Deserialize)]
struct Sender {
    sender_id: SenderId,
}

#[derive(Deserialize)]
struct SenderId {
    open_id: String,
}

#[derive(Deserialize)]
struct TextContent {
    text: String,
}

impl ReceivedMessage {
    /// Extract the message text and sender `open_id`
    ///
    /// `message.content` is itself a JSON-encoded string, e.g.
    /// `"{\"text\":\"hello\"}"`, so it is parsed a second time.
    pub fn from_event(event: &Value) -> Result<Self> {
        let parsed = MessageEvent::deserialize(event)
            .map_err(|e| BridgeError::Forwarding(format!("malformed message event: {}", e)))?;

        let content: TextContent = serde_json::from_str(&parsed.message.content)
            .map_err(|e| BridgeError::Forwarding(format!("malformed message content: {}", e)))?;

        Ok(Self {
            text: content.text,
            open_id: parsed.sender.sender_id.open_id,
        })
    }
}

/// Body returned to Feishu for every callback (always HTTP 200)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CallbackResponse {
    Challenge { challenge: String },
    Message { msg: String },
}

impl CallbackResponse {
    pub fn ok() -> Self {
        CallbackResponse::Message {
            msg: "ok".to_string(),
        }
    }

    pub fn challenge(challenge: impl Into<String>) -> Self {
        CallbackResponse::Challenge {
            challenge: challenge.into(),
        }
    }

    pub fn from_error(err: &BridgeError) -> Self {
        CallbackResponse::Message {
            msg: err.response_message().to_string(),
        }
    }
}
