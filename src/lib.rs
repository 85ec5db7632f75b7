// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Event Bus over RabbitMQ
//!
//! Publishes and consumes topic-routed `EventMessage`s through a RabbitMQ topic
//! exchange. A `BusContextBuilder` opens the connection, the resulting
//! `BusContext` creates senders and receivers, each on its own channel.

mod consumer;
mod otel;

pub mod channel;
pub mod config;
pub mod context;
pub mod errors;
pub mod exchange;
pub mod message;
pub mod queue;
pub mod receiver;
pub mod sender;
pub mod topology;

pub use consumer::EventMessageCallback;
pub use context::{BusContext, BusContextBuilder};
pub use errors::AmqpError;
pub use message::EventMessage;
pub use receiver::{MessageReceiver, RabbitMQMessageReceiver};
pub use sender::{MessageSender, RabbitMQMessageSender};
