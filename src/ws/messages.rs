//! WebSocket message types: envelope and commands.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Top-level WebSocket message envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsMessage {
    /// Client-provided ID for requests; server-generated for events.
    pub id: String,
    /// Message type discriminator.
    #[serde(rename = "type")]
    pub msg_type: WsMessageType,
    /// ISO-8601 timestamp. Optional on client commands.
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    /// Variant-specific payload.
    pub payload: serde_json::Value,
}

impl WsMessage {
    /// Builds a server message stamped now.
    #[must_use]
    pub fn new(id: impl Into<String>, msg_type: WsMessageType, payload: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            msg_type,
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Builds an error reply with a numeric code.
    #[must_use]
    pub fn error(id: impl Into<String>, code: u16, message: &str) -> Self {
        Self::new(
            id,
            WsMessageType::Error,
            serde_json::json!({ "code": code, "message": message }),
        )
    }

    /// Serializes the message, or `None` if it cannot be encoded.
    #[must_use]
    pub fn to_json(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }
}

/// Discriminator for WebSocket message types.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WsMessageType {
    /// Client → Server command.
    Command,
    /// Server → Client response to a command.
    Response,
    /// Server → Client broadcast event.
    Event,
    /// Server → Client error.
    Error,
}

/// Commands a client can send in the payload of a `command` message.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum WsCommand {
    /// Subscribe to events for specific loans.
    Subscribe {
        /// Loan UUIDs or codes. Use `["*"]` for all loans.
        loan_ids: Vec<String>,
    },
    /// Unsubscribe from events for specific loans.
    Unsubscribe {
        /// Loan UUIDs or codes. `"*"` drops the wildcard.
        loan_ids: Vec<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_is_tagged() {
        let json = serde_json::json!({"command": "subscribe", "loan_ids": ["*"]});
        let cmd = serde_json::from_value::<WsCommand>(json);
        assert!(matches!(cmd, Ok(WsCommand::Subscribe { ref loan_ids }) if loan_ids.len() == 1));

        let bad = serde_json::json!({"command": "transfer"});
        assert!(serde_json::from_value::<WsCommand>(bad).is_err());
    }

    #[test]
    fn envelope_uses_type_key() {
        let msg = WsMessage::error("abc", 400, "malformed JSON");
        let json = msg.to_json().unwrap_or_default();
        assert!(json.contains("\"type\":\"error\""));
        assert!(json.contains("\"code\":400"));
    }
}
