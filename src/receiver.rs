// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Message Receiver
//!
//! This module provides functionality for consuming event messages from a queue
//! bound to the bus exchange. A receiver goes through a fixed lifecycle:
//!
//! 1. `start_receiving_messages` declares the exchange, the queue and one binding
//!    per topic expression
//! 2. `start_handling_messages` registers the single callback and starts consuming
//! 3. `dispose` stops consuming and closes the channel
//!
//! Calls out of order are rejected with a sequencing error, calls after disposal
//! with a disposed error.

use crate::{
    channel::AmqpChannel,
    consumer::{consume, EventMessageCallback},
    errors::AmqpError,
    exchange::ExchangeDefinition,
    otel,
    queue::{QueueBinding, QueueDefinition},
    topology::AmqpTopology,
};
use async_trait::async_trait;
use futures_util::StreamExt;
use opentelemetry::global;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error};
use uuid::Uuid;

const RECEIVER_NAME: &str = "RabbitMQMessageReceiver";

/// Lifecycle state of a receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    Created,
    ReceivingStarted,
    HandlingStarted,
    Disposed,
}

/// Consumes event messages from a queue bound to topic expressions.
#[async_trait]
pub trait MessageReceiver: Send {
    fn queue_name(&self) -> &str;

    fn topic_expressions(&self) -> &[String];

    /// Declares the exchange, the durable queue and its topic bindings.
    async fn start_receiving_messages(&mut self) -> Result<(), AmqpError>;

    /// Registers `callback` and starts consuming; the callback is invoked once
    /// per delivered message.
    async fn start_handling_messages(
        &mut self,
        callback: EventMessageCallback,
    ) -> Result<(), AmqpError>;

    /// Stops consuming and closes the receiver channel.
    async fn dispose(&mut self) -> Result<(), AmqpError>;
}

/// RabbitMQ implementation of the `MessageReceiver` trait.
///
/// Messages are consumed with automatic acknowledgement on a dedicated Tokio
/// task; the callback runs on that task, one message at a time.
pub struct RabbitMQMessageReceiver {
    channel: Arc<dyn AmqpChannel>,
    exchange_name: String,
    queue_name: String,
    topic_expressions: Vec<String>,
    state: ReceiverState,
    consumer_task: Option<JoinHandle<()>>,
}

impl RabbitMQMessageReceiver {
    /// Creates a receiver on `channel`. Nothing is declared until
    /// `start_receiving_messages` is called.
    pub fn new(
        channel: Arc<dyn AmqpChannel>,
        exchange_name: &str,
        queue_name: &str,
        topic_expressions: Vec<String>,
    ) -> RabbitMQMessageReceiver {
        RabbitMQMessageReceiver {
            channel,
            exchange_name: exchange_name.to_owned(),
            queue_name: queue_name.to_owned(),
            topic_expressions,
            state: ReceiverState::Created,
            consumer_task: None,
        }
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    fn topology(&self) -> AmqpTopology {
        let topology = AmqpTopology::new(self.channel.clone())
            .exchange(ExchangeDefinition::new(&self.exchange_name).topic())
            .queue(QueueDefinition::new(&self.queue_name).durable());

        self.topic_expressions
            .iter()
            .fold(topology, |topology, expression| {
                topology.queue_binding(
                    QueueBinding::new(&self.queue_name)
                        .exchange(&self.exchange_name)
                        .routing_key(expression),
                )
            })
    }
}

#[async_trait]
impl MessageReceiver for RabbitMQMessageReceiver {
    fn queue_name(&self) -> &str {
        &self.queue_name
    }

    fn topic_expressions(&self) -> &[String] {
        &self.topic_expressions
    }

    async fn start_receiving_messages(&mut self) -> Result<(), AmqpError> {
        match self.state {
            ReceiverState::Disposed => return Err(AmqpError::Disposed(RECEIVER_NAME)),
            ReceiverState::Created => {}
            _ => return Err(AmqpError::ReceivingAlreadyStarted),
        }

        // The state advances even when a declaration below fails.
        self.state = ReceiverState::ReceivingStarted;
        self.topology().install().await?;

        debug!(
            queue = self.queue_name.as_str(),
            exchange = self.exchange_name.as_str(),
            "receiving messages"
        );

        Ok(())
    }

    async fn start_handling_messages(
        &mut self,
        callback: EventMessageCallback,
    ) -> Result<(), AmqpError> {
        match self.state {
            ReceiverState::Disposed => return Err(AmqpError::Disposed(RECEIVER_NAME)),
            ReceiverState::Created => return Err(AmqpError::HandlingBeforeReceiving),
            ReceiverState::HandlingStarted => return Err(AmqpError::HandlingAlreadyStarted),
            ReceiverState::ReceivingStarted => {}
        }

        self.state = ReceiverState::HandlingStarted;

        let consumer_tag = format!("{}.{}", self.queue_name, Uuid::new_v4());
        let mut deliveries = self
            .channel
            .consume(&self.queue_name, &consumer_tag)
            .await?;

        self.consumer_task = Some(tokio::spawn(async move {
            let tracer = global::tracer(otel::CONSUMER_TRACER);

            while let Some(result) = deliveries.next().await {
                match result {
                    Ok(delivery) => consume(&tracer, delivery, &callback),
                    Err(err) => error!(error = err.to_string(), "errors consume msg"),
                }
            }

            debug!("consumer stream ended");
        }));

        debug!(
            queue = self.queue_name.as_str(),
            consumer_tag = consumer_tag.as_str(),
            "handling messages"
        );

        Ok(())
    }

    async fn dispose(&mut self) -> Result<(), AmqpError> {
        if self.state == ReceiverState::Disposed {
            return Ok(());
        }

        self.state = ReceiverState::Disposed;

        if let Some(task) = self.consumer_task.take() {
            task.abort();
        }

        self.channel.close().await
    }
}

impl Drop for RabbitMQMessageReceiver {
    fn drop(&mut self) {
        if let Some(task) = self.consumer_task.take() {
            task.abort();
        }
    }
}
