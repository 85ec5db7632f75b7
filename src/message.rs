// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Event Message Envelope
//!
//! The envelope carried over the bus. The topic doubles as the AMQP routing key,
//! while the correlation id, timestamp and event type travel as message properties.

use crate::errors::AmqpError;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

/// An event published on, or received from, the topic exchange.
///
/// The default value has an empty topic, the nil correlation id, a zero
/// timestamp, no event type and an empty body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMessage {
    pub topic: String,
    pub correlation_id: Uuid,
    /// Unix time in seconds.
    pub timestamp: i64,
    pub event_type: Option<String>,
    pub body: Vec<u8>,
}

impl EventMessage {
    pub fn new(topic: &str) -> EventMessage {
        EventMessage {
            topic: topic.to_owned(),
            ..EventMessage::default()
        }
    }

    pub fn correlation_id(mut self, id: Uuid) -> Self {
        self.correlation_id = id;
        self
    }

    pub fn timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn event_type(mut self, event_type: &str) -> Self {
        self.event_type = Some(event_type.to_owned());
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Serializes `payload` as JSON and uses it as the message body.
    pub fn with_json_body<T: Serialize>(mut self, payload: &T) -> Result<Self, AmqpError> {
        self.body = serde_json::to_vec(payload).map_err(|err| {
            error!(error = err.to_string(), "failure to serialize payload");
            AmqpError::ParsePayloadError(err.to_string())
        })?;
        Ok(self)
    }

    /// Parses the message body as JSON.
    pub fn json_body<T: DeserializeOwned>(&self) -> Result<T, AmqpError> {
        serde_json::from_slice(&self.body).map_err(|err| {
            error!(
                error = err.to_string(),
                topic = self.topic.as_str(),
                "failure to parse payload"
            );
            AmqpError::ParsePayloadError(err.to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct OrderCompleted {
        order: u32,
    }

    #[test]
    fn default_message_is_empty() {
        let msg = EventMessage::default();

        assert_eq!(msg.topic, "");
        assert_eq!(msg.correlation_id, Uuid::nil());
        assert_eq!(msg.timestamp, 0);
        assert_eq!(msg.event_type, None);
        assert!(msg.body.is_empty());
    }

    #[test]
    fn builds_message_fluently() {
        let id = Uuid::new_v4();
        let msg = EventMessage::new("Orders.Completed")
            .correlation_id(id)
            .timestamp(100000)
            .event_type("string")
            .body("Order #152 done");

        assert_eq!(msg.topic, "Orders.Completed");
        assert_eq!(msg.correlation_id, id);
        assert_eq!(msg.timestamp, 100000);
        assert_eq!(msg.event_type.as_deref(), Some("string"));
        assert_eq!(msg.body, b"Order #152 done".to_vec());
    }

    #[test]
    fn json_body_helpers() {
        let msg = EventMessage::new("Orders.Completed")
            .with_json_body(&OrderCompleted { order: 152 })
            .unwrap();

        assert_eq!(msg.body, br#"{"order":152}"#.to_vec());
        assert_eq!(
            msg.json_body::<OrderCompleted>().unwrap(),
            OrderCompleted { order: 152 }
        );
    }

    #[test]
    fn json_body_rejects_garbage() {
        let msg = EventMessage::new("Orders.Completed").body("not json");

        let err = msg.json_body::<OrderCompleted>().unwrap_err();
        assert!(matches!(err, AmqpError::ParsePayloadError(_)));
    }
}
