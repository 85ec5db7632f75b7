// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Bus Context
//!
//! `BusContextBuilder` accumulates the connection configuration and opens the
//! broker connection; `BusContext` owns that connection and creates senders and
//! receivers, each on its own channel.
//!
//! # Example
//! ```no_run
//! use eventbus::{context::BusContextBuilder, message::EventMessage, sender::MessageSender};
//!
//! # async fn run() -> Result<(), eventbus::errors::AmqpError> {
//! let context = BusContextBuilder::new()
//!     .with_exchange("Webshop.Eventbus")
//!     .with_address("localhost", 5672)
//!     .read_from_environment_variables()
//!     .create_context()
//!     .await?;
//!
//! let sender = context.create_message_sender().await?;
//! sender.send_message(&EventMessage::new("Orders.Completed")).await?;
//! context.dispose().await?;
//! # Ok(())
//! # }
//! ```

use crate::{
    channel::{self, AmqpConnection},
    config::BusConfig,
    errors::AmqpError,
    receiver::RabbitMQMessageReceiver,
    sender::RabbitMQMessageSender,
};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tracing::debug;

const CONTEXT_NAME: &str = "BusContext";

/// Builds a `BusContext` from defaults, explicit settings and variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BusContextBuilder {
    config: BusConfig,
}

impl BusContextBuilder {
    pub fn new() -> BusContextBuilder {
        BusContextBuilder::default()
    }

    /// Starts from an existing configuration.
    pub fn from_config(config: BusConfig) -> BusContextBuilder {
        BusContextBuilder { config }
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    pub fn exchange_name(&self) -> &str {
        &self.config.exchange_name
    }

    pub fn host_name(&self) -> &str {
        &self.config.host_name
    }

    pub fn port(&self) -> u16 {
        self.config.port
    }

    pub fn user_name(&self) -> &str {
        &self.config.user_name
    }

    pub fn password(&self) -> &str {
        &self.config.password
    }

    pub fn with_exchange(&mut self, exchange_name: &str) -> &mut Self {
        self.config.exchange_name = exchange_name.to_owned();
        self
    }

    pub fn with_address(&mut self, host_name: &str, port: u16) -> &mut Self {
        self.config.host_name = host_name.to_owned();
        self.config.port = port;
        self
    }

    pub fn with_credentials(&mut self, user_name: &str, password: &str) -> &mut Self {
        self.config.user_name = user_name.to_owned();
        self.config.password = password.to_owned();
        self
    }

    /// Applies the recognized `eventbus-*` entries of `vars`.
    ///
    /// See `BusConfig::merge_variables` for the override rules.
    pub fn read_from_variables(&mut self, vars: &HashMap<String, String>) -> &mut Self {
        self.config.merge_variables(vars);
        self
    }

    /// Applies the recognized `eventbus-*` variables of the process environment.
    ///
    /// Variables that are not valid unicode are skipped.
    pub fn read_from_environment_variables(&mut self) -> &mut Self {
        let vars: HashMap<String, String> = std::env::vars_os()
            .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
            .collect();
        self.read_from_variables(&vars)
    }

    /// Connects to the broker and wraps the connection in a context.
    ///
    /// Fails with `AmqpError::ConnectionError` when the broker is unreachable
    /// or rejects the credentials.
    pub async fn create_context(&self) -> Result<BusContext, AmqpError> {
        let connection = channel::connect(&self.config).await?;
        Ok(BusContext::new(&self.config.exchange_name, connection))
    }
}

/// Owns a broker connection and the name of the bus exchange.
pub struct BusContext {
    exchange_name: String,
    connection: Arc<dyn AmqpConnection>,
    disposed: AtomicBool,
}

impl BusContext {
    pub fn new(exchange_name: &str, connection: Arc<dyn AmqpConnection>) -> BusContext {
        BusContext {
            exchange_name: exchange_name.to_owned(),
            connection,
            disposed: AtomicBool::new(false),
        }
    }

    pub fn exchange_name(&self) -> &str {
        &self.exchange_name
    }

    pub fn connection(&self) -> &Arc<dyn AmqpConnection> {
        &self.connection
    }

    fn ensure_not_disposed(&self) -> Result<(), AmqpError> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(AmqpError::Disposed(CONTEXT_NAME));
        }
        Ok(())
    }

    /// Opens a channel and returns a sender publishing on the bus exchange.
    ///
    /// The exchange is declared as a topic exchange.
    pub async fn create_message_sender(&self) -> Result<RabbitMQMessageSender, AmqpError> {
        self.ensure_not_disposed()?;

        let channel = self.connection.create_channel().await?;
        RabbitMQMessageSender::new(channel, &self.exchange_name).await
    }

    /// Opens a channel and returns a receiver for `queue_name` bound to
    /// `topic_expressions`. Nothing is declared yet.
    pub async fn create_message_receiver<I, S>(
        &self,
        queue_name: &str,
        topic_expressions: I,
    ) -> Result<RabbitMQMessageReceiver, AmqpError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ensure_not_disposed()?;

        let channel = self.connection.create_channel().await?;
        Ok(RabbitMQMessageReceiver::new(
            channel,
            &self.exchange_name,
            queue_name,
            topic_expressions.into_iter().map(Into::into).collect(),
        ))
    }

    /// Closes the connection. Calling it again is a no-op.
    pub async fn dispose(&self) -> Result<(), AmqpError> {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        debug!(exchange = self.exchange_name.as_str(), "disposing bus context");
        self.connection.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        channel::{AmqpChannel, MockAmqpChannel, MockAmqpConnection},
        config::{ENV_EXCHANGE_NAME, ENV_HOST_NAME, ENV_PASSWORD, ENV_PORT, ENV_USER_NAME},
        exchange::ExchangeKind,
        receiver::{MessageReceiver, ReceiverState},
    };

    const EXCHANGE: &str = "Webshop.ExchangeName";

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn builder_has_default_values() {
        let target = BusContextBuilder::new();

        assert_eq!(target.exchange_name(), "RogerFramework.EventBus");
        assert_eq!(target.host_name(), "localhost");
        assert_eq!(target.port(), 5672);
        assert_eq!(target.user_name(), "guest");
        assert_eq!(target.password(), "guest");
    }

    #[test]
    fn fluent_setters_change_values() {
        let mut target = BusContextBuilder::new();

        target
            .with_exchange("Webshop.Exchange")
            .with_address("rabbit", 1234)
            .with_credentials("Username", "Password");

        assert_eq!(target.exchange_name(), "Webshop.Exchange");
        assert_eq!(target.host_name(), "rabbit");
        assert_eq!(target.port(), 1234);
        assert_eq!(target.user_name(), "Username");
        assert_eq!(target.password(), "Password");
    }

    #[test]
    fn fluent_setters_return_same_builder() {
        let mut target = BusContextBuilder::new();
        let target_ptr: *const BusContextBuilder = &target;

        let result: *const BusContextBuilder = target.with_exchange("Webshop.Exchange");

        assert_eq!(target_ptr, result);
    }

    #[test]
    fn variables_override_explicit_settings() {
        let mut target = BusContextBuilder::new();
        target.with_exchange("BadWebshop.Exchange");
        assert_eq!(target.exchange_name(), "BadWebshop.Exchange");

        target.read_from_variables(&vars(&[(ENV_EXCHANGE_NAME, "Webshop.Exchange")]));

        assert_eq!(target.exchange_name(), "Webshop.Exchange");
        assert_eq!(target.host_name(), "localhost");
        assert_eq!(target.port(), 5672);
        assert_eq!(target.user_name(), "guest");
        assert_eq!(target.password(), "guest");
    }

    #[test]
    fn reads_process_environment() {
        std::env::set_var(ENV_HOST_NAME, "Webshop.host");
        std::env::set_var(ENV_PORT, "1234");
        std::env::set_var(ENV_USER_NAME, "Username@username");
        std::env::set_var(ENV_PASSWORD, "Password1234");

        let mut target = BusContextBuilder::new();
        target.read_from_environment_variables();

        for key in [ENV_HOST_NAME, ENV_PORT, ENV_USER_NAME, ENV_PASSWORD] {
            std::env::remove_var(key);
        }

        assert_eq!(target.exchange_name(), "RogerFramework.EventBus");
        assert_eq!(target.host_name(), "Webshop.host");
        assert_eq!(target.port(), 1234);
        assert_eq!(target.user_name(), "Username@username");
        assert_eq!(target.password(), "Password1234");
    }

    #[test]
    fn from_config_keeps_configuration() {
        let cfg = BusConfig {
            exchange_name: EXCHANGE.to_owned(),
            ..BusConfig::default()
        };

        assert_eq!(BusContextBuilder::from_config(cfg.clone()).config(), &cfg);
    }

    #[tokio::test]
    async fn create_message_sender_opens_channel_and_declares_exchange() {
        let mut connection = MockAmqpConnection::new();
        connection.expect_create_channel().times(1).returning(|| {
            let mut channel = MockAmqpChannel::new();
            channel
                .expect_declare_exchange()
                .withf(|def| {
                    def.name() == EXCHANGE && def.exchange_kind() == &ExchangeKind::Topic
                })
                .times(1)
                .returning(|_| Ok(()));
            Ok(Arc::new(channel) as Arc<dyn AmqpChannel>)
        });

        let context = BusContext::new(EXCHANGE, Arc::new(connection));
        let sender = context.create_message_sender().await.unwrap();

        assert_eq!(sender.exchange_name(), EXCHANGE);
    }

    #[tokio::test]
    async fn create_message_receiver_opens_channel_without_declaring() {
        let mut connection = MockAmqpConnection::new();
        connection
            .expect_create_channel()
            .times(1)
            .returning(|| Ok(Arc::new(MockAmqpChannel::new()) as Arc<dyn AmqpChannel>));

        let context = BusContext::new(EXCHANGE, Arc::new(connection));
        let receiver = context
            .create_message_receiver("Webshop.ListenQueue", ["Webshop.Topic"])
            .await
            .unwrap();

        assert_eq!(receiver.queue_name(), "Webshop.ListenQueue");
        assert_eq!(receiver.topic_expressions(), ["Webshop.Topic".to_owned()]);
        assert_eq!(receiver.state(), ReceiverState::Created);
    }

    #[tokio::test]
    async fn create_surfaces_channel_failure() {
        let mut connection = MockAmqpConnection::new();
        connection
            .expect_create_channel()
            .returning(|| Err(AmqpError::ChannelError("connection closed".to_owned())));

        let context = BusContext::new(EXCHANGE, Arc::new(connection));

        assert!(matches!(
            context.create_message_sender().await,
            Err(AmqpError::ChannelError(_))
        ));
    }

    #[tokio::test]
    async fn dispose_closes_connection_once() {
        let mut connection = MockAmqpConnection::new();
        connection.expect_close().times(1).returning(|| Ok(()));
        connection.expect_create_channel().never();

        let context = BusContext::new(EXCHANGE, Arc::new(connection));
        context.dispose().await.unwrap();
        context.dispose().await.unwrap();

        assert!(matches!(
            context.create_message_sender().await,
            Err(AmqpError::Disposed("BusContext"))
        ));
        assert!(matches!(
            context
                .create_message_receiver("Webshop.ListenQueue", Vec::<String>::new())
                .await,
            Err(AmqpError::Disposed("BusContext"))
        ));
    }
}
