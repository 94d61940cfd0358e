// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Topology Management
//!
//! This module declares the broker entities the publisher relies on: the work
//! queue (with its dead-letter arguments), the exchange it is bound to, and one
//! binding per configured routing key.
//!
//! The main components are:
//! - `declare_queue`, `declare_exchange`, `bind_queue`: single declarations
//! - `Topology` trait: Interface for collecting and installing a topology
//! - `AmqpTopology`: Implementation of the Topology trait over a `BrokerChannel`
//!
//! Every declaration is idempotent on the broker as long as its arguments are
//! unchanged. A re-declaration with different arguments is refused by the
//! broker and surfaces as a declaration error. Bindings are applied one at a
//! time; the first failure stops the installation and bindings created before
//! it are left in place.

use crate::{
    broker::BrokerChannel,
    errors::AmqpError,
    exchange::ExchangeDefinition,
    queue::{bindings_for, QueueBinding, QueueDefinition},
};
use async_trait::async_trait;
use lapin::options::{ExchangeDeclareOptions, QueueDeclareOptions};
use std::sync::Arc;
use tracing::debug;

/// Declares a queue, attaching its dead-letter arguments.
pub async fn declare_queue<C>(channel: &C, def: &QueueDefinition) -> Result<(), AmqpError>
where
    C: BrokerChannel + ?Sized,
{
    debug!("creating queue: {}", def.name);

    channel
        .queue_declare(
            &def.name,
            QueueDeclareOptions {
                passive: false,
                durable: def.durable,
                exclusive: false,
                auto_delete: false,
                nowait: false,
            },
            def.arguments(),
        )
        .await?;

    debug!("queue: {} was created", def.name);
    Ok(())
}

/// Declares an exchange.
pub async fn declare_exchange<C>(channel: &C, def: &ExchangeDefinition<'_>) -> Result<(), AmqpError>
where
    C: BrokerChannel + ?Sized,
{
    debug!("creating exchange: {} ({})", def.name, def.kind.as_str());

    channel
        .exchange_declare(
            def.name,
            def.kind.clone(),
            ExchangeDeclareOptions {
                passive: false,
                durable: def.durable,
                auto_delete: false,
                internal: false,
                nowait: false,
            },
        )
        .await?;

    debug!("exchange: {} was created", def.name);
    Ok(())
}

/// Binds `queue` to `exchange` once for every key in `route_keys`.
///
/// Returns the number of bindings applied.
pub async fn bind_queue<C>(
    channel: &C,
    queue: &str,
    route_keys: &[String],
    exchange: &str,
) -> Result<usize, AmqpError>
where
    C: BrokerChannel + ?Sized,
{
    let bindings = bindings_for(queue, exchange, route_keys);
    apply_bindings(channel, &bindings).await
}

async fn apply_bindings<C>(channel: &C, bindings: &[QueueBinding<'_>]) -> Result<usize, AmqpError>
where
    C: BrokerChannel + ?Sized,
{
    for binding in bindings {
        debug!(
            "binding queue: {} to the exchange: {} with the key: {}",
            binding.queue_name, binding.exchange_name, binding.routing_key
        );

        channel
            .queue_bind(
                binding.queue_name,
                binding.exchange_name,
                binding.routing_key,
            )
            .await?;
    }

    debug!("queue was bounded");
    Ok(bindings.len())
}

/// Trait defining the interface for topology management.
///
/// This trait provides methods for registering exchanges, queues, and bindings,
/// as well as installing the topology to the RabbitMQ server.
#[async_trait]
pub trait Topology<'tp> {
    /// Adds an exchange definition to the topology.
    fn exchange(self, def: &'tp ExchangeDefinition<'tp>) -> Self;

    /// Adds a queue definition to the topology.
    fn queue(self, def: &'tp QueueDefinition) -> Self;

    /// Installs the topology to the RabbitMQ server.
    async fn install(&self) -> Result<(), AmqpError>;
}

/// RabbitMQ implementation of the Topology trait.
///
/// This struct maintains collections of exchanges, queues, and bindings,
/// and installs them through a `BrokerChannel`.
pub struct AmqpTopology<'tp, C: ?Sized> {
    channel: Arc<C>,
    pub(crate) queues: Vec<&'tp QueueDefinition>,
    pub(crate) queues_binding: Vec<QueueBinding<'tp>>,
    pub(crate) exchanges: Vec<&'tp ExchangeDefinition<'tp>>,
}

impl<'tp, C: ?Sized> AmqpTopology<'tp, C> {
    /// Creates a new, empty topology bound to `channel`.
    pub fn new(channel: Arc<C>) -> AmqpTopology<'tp, C> {
        AmqpTopology {
            channel,
            queues: vec![],
            queues_binding: vec![],
            exchanges: vec![],
        }
    }

    /// Adds one binding per routing key between `queue` and `exchange`.
    pub fn route_keys(mut self, queue: &'tp str, exchange: &'tp str, keys: &'tp [String]) -> Self {
        self.queues_binding
            .extend(bindings_for(queue, exchange, keys));
        self
    }

    pub fn bindings(&self) -> &[QueueBinding<'tp>] {
        &self.queues_binding
    }
}

#[async_trait]
impl<'tp, C> Topology<'tp> for AmqpTopology<'tp, C>
where
    C: BrokerChannel + ?Sized,
{
    fn exchange(mut self, def: &'tp ExchangeDefinition<'tp>) -> Self {
        self.exchanges.push(def);
        self
    }

    /// Adds a queue definition; a later definition with the same name replaces it.
    fn queue(mut self, def: &'tp QueueDefinition) -> Self {
        self.queues.retain(|q| q.name != def.name);
        self.queues.push(def);
        self
    }

    /// Installs the topology to the RabbitMQ server.
    ///
    /// This method performs the following operations in order:
    /// 1. Creates all queues with their dead-letter arguments
    /// 2. Creates all exchanges
    /// 3. Sets up queue-to-exchange bindings
    async fn install(&self) -> Result<(), AmqpError> {
        for def in &self.queues {
            declare_queue(self.channel.as_ref(), def).await?;
        }

        for def in &self.exchanges {
            declare_exchange(self.channel.as_ref(), def).await?;
        }

        apply_bindings(self.channel.as_ref(), &self.queues_binding).await?;
        Ok(())
    }
}
