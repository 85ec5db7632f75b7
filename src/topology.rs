// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Topology Management
//!
//! This module collects exchanges, queues and the bindings between them and
//! installs them on a channel in dependency order: exchanges first, then queues,
//! then queue bindings.

use crate::{
    channel::AmqpChannel,
    errors::AmqpError,
    exchange::ExchangeDefinition,
    queue::{QueueBinding, QueueDefinition},
};
use std::sync::Arc;
use tracing::debug;

/// A set of topology definitions to declare on a channel.
///
/// Declarations are idempotent on the broker side as long as the definitions
/// match what already exists.
pub struct AmqpTopology {
    channel: Arc<dyn AmqpChannel>,
    pub(crate) exchanges: Vec<ExchangeDefinition>,
    pub(crate) queues: Vec<QueueDefinition>,
    pub(crate) queues_binding: Vec<QueueBinding>,
}

impl AmqpTopology {
    /// Creates an empty topology bound to `channel`.
    pub fn new(channel: Arc<dyn AmqpChannel>) -> AmqpTopology {
        AmqpTopology {
            channel,
            exchanges: vec![],
            queues: vec![],
            queues_binding: vec![],
        }
    }

    /// Adds an exchange definition to the topology.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn exchange(mut self, def: ExchangeDefinition) -> Self {
        self.exchanges.push(def);
        self
    }

    /// Adds a queue definition to the topology.
    pub fn queue(mut self, def: QueueDefinition) -> Self {
        self.queues.push(def);
        self
    }

    /// Adds a queue-to-exchange binding to the topology.
    pub fn queue_binding(mut self, binding: QueueBinding) -> Self {
        self.queues_binding.push(binding);
        self
    }

    /// Installs the topology on the broker.
    ///
    /// Stops at the first failing declaration and returns its error.
    pub async fn install(&self) -> Result<(), AmqpError> {
        for exch in &self.exchanges {
            self.channel.declare_exchange(exch).await?;
        }

        for queue in &self.queues {
            self.channel.declare_queue(queue).await?;
        }

        for binding in &self.queues_binding {
            self.channel.bind_queue(binding).await?;
        }

        debug!(
            exchanges = self.exchanges.len(),
            queues = self.queues.len(),
            bindings = self.queues_binding.len(),
            "topology installed"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MockAmqpChannel;
    use mockall::Sequence;

    #[tokio::test]
    async fn installs_in_dependency_order() {
        let mut seq = Sequence::new();
        let mut channel = MockAmqpChannel::new();
        channel
            .expect_declare_exchange()
            .withf(|def| def.name() == "Webshop.Exchange")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        channel
            .expect_declare_queue()
            .withf(|def| def.name() == "Webshop.ListenQueue")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        channel
            .expect_bind_queue()
            .withf(|b| b.key() == "Webshop.#")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        AmqpTopology::new(Arc::new(channel))
            .exchange(ExchangeDefinition::new("Webshop.Exchange").topic())
            .queue(QueueDefinition::new("Webshop.ListenQueue"))
            .queue_binding(
                QueueBinding::new("Webshop.ListenQueue")
                    .exchange("Webshop.Exchange")
                    .routing_key("Webshop.#"),
            )
            .install()
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn stops_at_first_failure() {
        let mut channel = MockAmqpChannel::new();
        channel
            .expect_declare_exchange()
            .times(1)
            .returning(|def| Err(AmqpError::DeclareExchangeError(def.name().to_owned())));
        channel.expect_declare_queue().never();
        channel.expect_bind_queue().never();

        let err = AmqpTopology::new(Arc::new(channel))
            .exchange(ExchangeDefinition::new("Webshop.Exchange").topic())
            .queue(QueueDefinition::new("Webshop.ListenQueue"))
            .install()
            .await
            .unwrap_err();

        assert_eq!(
            err,
            AmqpError::DeclareExchangeError("Webshop.Exchange".to_owned())
        );
    }
}
