// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Message Envelope
//!
//! The application-level envelope carried on the wire as JSON:
//! `{"id": 1, "action": "...", "content": {...}, "callback": "..."}`.

use crate::errors::AmqpError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::error;

/// Content type set on every published envelope
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Message published to the work queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    /// Name of the action the consumer should perform.
    pub action: String,
    /// Free-form action payload.
    #[serde(default)]
    pub content: Map<String, Value>,
    /// Function the consumer invokes after the message was handled.
    #[serde(default)]
    pub callback: Option<String>,
}

impl Message {
    pub fn new(id: i64, action: &str) -> Message {
        Message {
            id,
            action: action.to_owned(),
            ..Message::default()
        }
    }

    pub fn with_content(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.content.insert(key.to_owned(), value.into());
        self
    }

    pub fn with_callback(mut self, callback: &str) -> Self {
        self.callback = Some(callback.to_owned());
        self
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, AmqpError> {
        serde_json::to_vec(self).map_err(|err| {
            error!(error = err.to_string(), id = self.id, "failure to serialize message");
            AmqpError::ParsePayloadError
        })
    }

    pub fn from_bytes(data: &[u8]) -> Result<Message, AmqpError> {
        serde_json::from_slice(data).map_err(|err| {
            error!(error = err.to_string(), "failure to parse message");
            AmqpError::ParsePayloadError
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decoding_an_encoded_message_keeps_every_field() {
        let msg = Message::new(42, "user.created")
            .with_content("email", "ada@example.com")
            .with_content("roles", json!(["admin", "ops"]))
            .with_content("nested", json!({"depth": 2, "ok": true}))
            .with_callback("notify_user");

        let decoded = Message::from_bytes(&msg.to_bytes().unwrap()).unwrap();

        assert_eq!(decoded, msg);
    }

    #[test]
    fn wire_format_uses_plain_field_names() {
        let msg = Message::new(7, "ping").with_callback("pong");
        let value: Value = serde_json::from_slice(&msg.to_bytes().unwrap()).unwrap();

        assert_eq!(
            value,
            json!({"id": 7, "action": "ping", "content": {}, "callback": "pong"})
        );
    }

    #[test]
    fn callback_key_is_always_on_the_wire() {
        let bytes = Message::new(3, "noop").to_bytes().unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(
            value,
            json!({"id": 3, "action": "noop", "content": {}, "callback": null})
        );
    }

    #[test]
    fn missing_content_and_callback_default() {
        let msg = Message::from_bytes(br#"{"id": 1, "action": "noop"}"#).unwrap();
        assert!(msg.content.is_empty());
        assert_eq!(msg.callback, None);
    }

    #[test]
    fn rejects_malformed_payload() {
        assert_eq!(
            Message::from_bytes(b"{\"id\": \"one\"}"),
            Err(AmqpError::ParsePayloadError)
        );
    }
}
