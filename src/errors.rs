// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for the Event Bus
//!
//! This module provides the error type shared by every event bus operation.
//! The `AmqpError` enum covers broker failures (connection, channel, topology,
//! publishing and consuming) as well as the lifecycle errors raised when a
//! sender or receiver is driven out of order or after disposal.

use thiserror::Error;

/// Represents errors that can occur while using the event bus.
///
/// Broker failures carry the message reported by the underlying AMQP client.
/// Lifecycle failures carry a fixed human readable message per case.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AmqpError {
    /// Error establishing a connection to the RabbitMQ server
    #[error("failure to connect: {0}")]
    ConnectionError(String),

    /// Error creating a channel from an established connection
    #[error("failure to create a channel: {0}")]
    ChannelError(String),

    /// Error closing a channel or a connection
    #[error("failure to close: {0}")]
    CloseError(String),

    /// Error declaring an exchange with the given name
    #[error("failure to declare an exchange `{0}`")]
    DeclareExchangeError(String),

    /// Error declaring a queue with the given name
    #[error("failure to declare a queue `{0}`")]
    DeclareQueueError(String),

    /// Error binding an exchange to a queue
    #[error("failure to binding exchange `{0}` to queue `{1}`")]
    BindingExchangeToQueueError(String, String),

    /// Error publishing a message
    #[error("failure to publish: {0}")]
    PublishingError(String),

    /// Error serializing or parsing a message payload
    #[error("failure to parse payload: {0}")]
    ParsePayloadError(String),

    /// Error declaring a consumer on a queue
    #[error("failure to declare consumer `{0}`")]
    ConsumerDeclarationError(String),

    /// Error consuming a message
    #[error("failure to consume message `{0}`")]
    ConsumerError(String),

    /// A lifecycle method was called after `dispose`
    #[error("cannot access a disposed object: `{0}`")]
    Disposed(&'static str),

    #[error("Cannot call 'start_receiving_messages' multiple times.")]
    ReceivingAlreadyStarted,

    #[error("Before calling 'start_handling_messages', call 'start_receiving_messages' first to declare queue and topics.")]
    HandlingBeforeReceiving,

    #[error("Cannot call 'start_handling_messages' multiple times.")]
    HandlingAlreadyStarted,
}

impl AmqpError {
    /// True for errors raised when lifecycle methods are called out of order or repeated.
    pub fn is_sequencing(&self) -> bool {
        matches!(
            self,
            AmqpError::ReceivingAlreadyStarted
                | AmqpError::HandlingBeforeReceiving
                | AmqpError::HandlingAlreadyStarted
        )
    }

    /// True for errors raised when a disposed object is used.
    pub fn is_disposed(&self) -> bool {
        matches!(self, AmqpError::Disposed(_))
    }
}
