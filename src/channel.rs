// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Connection and Channel Management
//!
//! This module defines the broker operations the event bus relies on as two
//! traits, `AmqpConnection` and `AmqpChannel`, and implements them on top of
//! lapin. Contexts, senders and receivers only talk to the traits, so any
//! broker client (or a test double) can be plugged in.

use crate::{
    config::BusConfig,
    errors::AmqpError,
    exchange::ExchangeDefinition,
    queue::{QueueBinding, QueueDefinition},
};
use async_trait::async_trait;
use futures_util::{stream::BoxStream, StreamExt};
use lapin::{
    message::Delivery,
    options::{
        BasicConsumeOptions, BasicPublishOptions, ExchangeDeclareOptions, QueueBindOptions,
        QueueDeclareOptions,
    },
    types::{FieldTable, LongString},
    BasicProperties, Channel, Connection, ConnectionProperties,
};
use std::sync::Arc;
use tracing::{debug, error};

#[cfg(test)]
use mockall::automock;

/// Reply code sent when closing channels and connections normally.
const REPLY_SUCCESS: u16 = 200;

/// A message pushed by the broker to a consumer.
///
/// Carries the parts of a delivery the bus reads: routing key, properties and payload.
#[derive(Debug, Clone, Default)]
pub struct InboundDelivery {
    pub routing_key: String,
    pub properties: BasicProperties,
    pub data: Vec<u8>,
}

impl From<Delivery> for InboundDelivery {
    fn from(delivery: Delivery) -> Self {
        InboundDelivery {
            routing_key: delivery.routing_key.to_string(),
            properties: delivery.properties,
            data: delivery.data,
        }
    }
}

/// Stream of deliveries returned by `AmqpChannel::consume`.
pub type DeliveryStream = BoxStream<'static, Result<InboundDelivery, AmqpError>>;

/// A connection to the broker, able to open independent channels.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AmqpConnection: Send + Sync {
    /// Opens a new channel on this connection.
    async fn create_channel(&self) -> Result<Arc<dyn AmqpChannel>, AmqpError>;

    /// Closes the connection and every channel opened on it.
    async fn close(&self) -> Result<(), AmqpError>;
}

/// A channel on a broker connection.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AmqpChannel: Send + Sync {
    async fn declare_exchange(&self, def: &ExchangeDefinition) -> Result<(), AmqpError>;

    async fn declare_queue(&self, def: &QueueDefinition) -> Result<(), AmqpError>;

    async fn bind_queue(&self, binding: &QueueBinding) -> Result<(), AmqpError>;

    /// Publishes `payload` on `exchange` with the given routing key and properties.
    ///
    /// Resolves once the message was handed to the broker client; it does not
    /// wait for a broker confirmation.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        properties: BasicProperties,
    ) -> Result<(), AmqpError>;

    /// Starts an auto-ack consumer on `queue`.
    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream, AmqpError>;

    async fn close(&self) -> Result<(), AmqpError>;
}

/// Opens a lapin connection to the broker described by `cfg`.
///
/// Errors from the underlying client are reported with their original message.
///
/// # Example
/// ```no_run
/// # async fn run() -> Result<(), eventbus::errors::AmqpError> {
/// let conn = eventbus::channel::connect(&eventbus::config::BusConfig::default()).await?;
/// # Ok(())
/// # }
/// ```
pub async fn connect(cfg: &BusConfig) -> Result<Arc<dyn AmqpConnection>, AmqpError> {
    debug!("creating amqp connection...");
    let options = ConnectionProperties::default()
        .with_connection_name(LongString::from(cfg.exchange_name.clone()));

    let conn = match Connection::connect(&cfg.amqp_uri(), options).await {
        Ok(c) => Ok(c),
        Err(err) => {
            error!(
                error = err.to_string(),
                host = cfg.host_name.as_str(),
                port = cfg.port,
                "failure to connect"
            );
            Err(AmqpError::ConnectionError(err.to_string()))
        }
    }?;
    debug!("amqp connected");

    Ok(Arc::new(LapinConnection { inner: conn }))
}

/// `AmqpConnection` backed by a lapin connection.
pub struct LapinConnection {
    inner: Connection,
}

#[async_trait]
impl AmqpConnection for LapinConnection {
    async fn create_channel(&self) -> Result<Arc<dyn AmqpChannel>, AmqpError> {
        debug!("creating amqp channel...");
        match self.inner.create_channel().await {
            Ok(c) => {
                debug!("channel created");
                Ok(Arc::new(LapinChannel { inner: c }))
            }
            Err(err) => {
                error!(error = err.to_string(), "error to create the channel");
                Err(AmqpError::ChannelError(err.to_string()))
            }
        }
    }

    async fn close(&self) -> Result<(), AmqpError> {
        if !self.inner.status().connected() {
            return Ok(());
        }

        self.inner
            .close(REPLY_SUCCESS, "bye")
            .await
            .map_err(|err| {
                error!(error = err.to_string(), "error to close the connection");
                AmqpError::CloseError(err.to_string())
            })?;

        debug!("amqp connection closed");
        Ok(())
    }
}

/// `AmqpChannel` backed by a lapin channel.
pub struct LapinChannel {
    inner: Channel,
}

#[async_trait]
impl AmqpChannel for LapinChannel {
    async fn declare_exchange(&self, def: &ExchangeDefinition) -> Result<(), AmqpError> {
        debug!("creating exchange: {}", def.name);

        match self
            .inner
            .exchange_declare(
                &def.name,
                (&def.kind).into(),
                ExchangeDeclareOptions::default(),
                FieldTable::default(),
            )
            .await
        {
            Err(err) => {
                error!(
                    error = err.to_string(),
                    name = def.name.as_str(),
                    "error to declare the exchange"
                );
                Err(AmqpError::DeclareExchangeError(def.name.clone()))
            }
            _ => {
                debug!("exchange: {} was created", def.name);
                Ok(())
            }
        }
    }

    async fn declare_queue(&self, def: &QueueDefinition) -> Result<(), AmqpError> {
        debug!("creating queue: {}", def.name);

        match self
            .inner
            .queue_declare(
                &def.name,
                QueueDeclareOptions {
                    durable: def.durable,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
        {
            Err(err) => {
                error!(
                    error = err.to_string(),
                    name = def.name.as_str(),
                    "error to declare the queue"
                );
                Err(AmqpError::DeclareQueueError(def.name.clone()))
            }
            _ => {
                debug!("queue: {} was created", def.name);
                Ok(())
            }
        }
    }

    async fn bind_queue(&self, binding: &QueueBinding) -> Result<(), AmqpError> {
        debug!(
            "binding queue: {} to the exchange: {} with the key: {}",
            binding.queue_name, binding.exchange_name, binding.routing_key
        );

        match self
            .inner
            .queue_bind(
                &binding.queue_name,
                &binding.exchange_name,
                &binding.routing_key,
                QueueBindOptions { nowait: false },
                FieldTable::default(),
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error to bind queue to exchange");
                Err(AmqpError::BindingExchangeToQueueError(
                    binding.exchange_name.clone(),
                    binding.queue_name.clone(),
                ))
            }
            _ => Ok(()),
        }
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        properties: BasicProperties,
    ) -> Result<(), AmqpError> {
        // The returned confirmation is dropped: publishing does not wait for the broker.
        match self
            .inner
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions {
                    immediate: false,
                    mandatory: false,
                },
                payload,
                properties,
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error publishing message");
                Err(AmqpError::PublishingError(err.to_string()))
            }
            _ => Ok(()),
        }
    }

    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream, AmqpError> {
        let consumer = match self
            .inner
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions {
                    no_local: false,
                    no_ack: true,
                    exclusive: false,
                    nowait: false,
                },
                FieldTable::default(),
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error to create the consumer");
                Err(AmqpError::ConsumerDeclarationError(queue.to_owned()))
            }
            Ok(c) => Ok(c),
        }?;

        Ok(consumer
            .map(|result| {
                result
                    .map(InboundDelivery::from)
                    .map_err(|err| AmqpError::ConsumerError(err.to_string()))
            })
            .boxed())
    }

    async fn close(&self) -> Result<(), AmqpError> {
        if !self.inner.status().connected() {
            return Ok(());
        }

        self.inner
            .close(REPLY_SUCCESS, "bye")
            .await
            .map_err(|err| {
                error!(error = err.to_string(), "error to close the channel");
                AmqpError::CloseError(err.to_string())
            })?;

        debug!("channel closed");
        Ok(())
    }
}
