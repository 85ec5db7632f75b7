// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Message Sender
//!
//! This module provides functionality for publishing event messages on the bus
//! exchange. The message topic is used as routing key, and the correlation id,
//! timestamp and event type travel as AMQP message properties. The current
//! OpenTelemetry context is propagated in the message headers.

use crate::{
    channel::AmqpChannel, errors::AmqpError, exchange::ExchangeDefinition,
    message::EventMessage, otel,
};
use async_trait::async_trait;
use lapin::{
    types::{FieldTable, ShortString},
    BasicProperties,
};
use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tracing::debug;
use uuid::Uuid;

/// Event type sent when a message does not carry one
pub const DEFAULT_EVENT_TYPE: &str = "void";

/// Publishes event messages on the bus.
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Publishes `message` with its topic as routing key.
    ///
    /// Resolves once the broker client accepted the message, without waiting
    /// for a broker confirmation.
    async fn send_message(&self, message: &EventMessage) -> Result<(), AmqpError>;

    /// Closes the sender channel. Calling it again is a no-op.
    async fn dispose(&self) -> Result<(), AmqpError>;
}

/// RabbitMQ implementation of the `MessageSender` trait.
///
/// Owns its channel; several senders can share one connection.
pub struct RabbitMQMessageSender {
    channel: Arc<dyn AmqpChannel>,
    exchange_name: String,
    disposed: AtomicBool,
}

impl RabbitMQMessageSender {
    /// Creates a sender on `channel` and declares `exchange_name` as a topic exchange.
    ///
    /// # Parameters
    /// * `channel` - A channel owned by the new sender
    /// * `exchange_name` - The exchange messages are published on
    ///
    /// # Returns
    /// The sender, or the error raised while declaring the exchange
    pub async fn new(
        channel: Arc<dyn AmqpChannel>,
        exchange_name: &str,
    ) -> Result<RabbitMQMessageSender, AmqpError> {
        channel
            .declare_exchange(&ExchangeDefinition::new(exchange_name).topic())
            .await?;

        Ok(RabbitMQMessageSender {
            channel,
            exchange_name: exchange_name.to_owned(),
            disposed: AtomicBool::new(false),
        })
    }

    pub fn exchange_name(&self) -> &str {
        &self.exchange_name
    }

    /// Builds the AMQP properties carried by `message`.
    ///
    /// The timestamp keeps its two's-complement bits on the unsigned wire field.
    fn properties(message: &EventMessage) -> BasicProperties {
        let event_type = match message.event_type.as_deref() {
            Some(kind) if !kind.is_empty() => kind,
            _ => DEFAULT_EVENT_TYPE,
        };

        let mut props = BasicProperties::default()
            .with_correlation_id(ShortString::from(message.correlation_id.to_string()))
            .with_timestamp(message.timestamp as u64)
            .with_type(ShortString::from(event_type))
            .with_message_id(ShortString::from(Uuid::new_v4().to_string()));

        let mut headers = BTreeMap::default();
        otel::inject_current_context(&mut headers);
        if !headers.is_empty() {
            props = props.with_headers(FieldTable::from(headers));
        }

        props
    }
}

#[async_trait]
impl MessageSender for RabbitMQMessageSender {
    async fn send_message(&self, message: &EventMessage) -> Result<(), AmqpError> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(AmqpError::Disposed("RabbitMQMessageSender"));
        }

        let props = Self::properties(message);

        self.channel
            .publish(&self.exchange_name, &message.topic, &message.body, props)
            .await?;

        debug!(
            "published: {} - exchange: {}",
            message.topic, self.exchange_name
        );

        Ok(())
    }

    async fn dispose(&self) -> Result<(), AmqpError> {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.channel.close().await
    }
}
