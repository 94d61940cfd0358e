// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Broker Service
//!
//! `Broker` owns the connection, the shared channel and the publisher. It is
//! built once at startup and handed to whoever needs to publish. Every startup
//! stage returns its own `AmqpError` so the entry point can report which one
//! failed before exiting.

use crate::{
    broker::BrokerChannel,
    channel,
    configs::RabbitConfigs,
    errors::AmqpError,
    exchange::{ExchangeDefinition, ExchangeKind},
    publisher::{PublishOptions, Publisher, RabbitMQPublisher},
    queue::QueueDefinition,
    topology::{AmqpTopology, Topology},
};
use lapin::{Channel, Connection};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Declares the dead-letter-enabled queue, its exchange and every binding.
///
/// Declarations are idempotent, so running this again with the same
/// configuration leaves the broker unchanged.
///
/// # Parameters
/// * `channel` - Channel used for every declaration
/// * `cfg` - Broker section naming the queue, exchange, routing keys and
///   dead-letter target
///
/// # Returns
/// The number of bindings installed, or the first declaration error
pub async fn install_topology<C>(channel: Arc<C>, cfg: &RabbitConfigs) -> Result<usize, AmqpError>
where
    C: BrokerChannel + ?Sized,
{
    let kind: ExchangeKind = cfg.exchange_kind.parse()?;
    let route_keys = cfg.route_keys();

    let queue = QueueDefinition::new(&cfg.queue)
        .durable()
        .with_dead_letter(&cfg.dead_exchange, &cfg.dead_route_key);
    let exchange = ExchangeDefinition::new(&cfg.exchange).kind(kind).durable();

    let topology = AmqpTopology::new(channel)
        .queue(&queue)
        .exchange(&exchange)
        .route_keys(&cfg.queue, &cfg.exchange, &route_keys);

    topology.install().await?;

    info!(
        queue = cfg.queue,
        exchange = cfg.exchange,
        bindings = route_keys.len(),
        "topology installed"
    );
    Ok(route_keys.len())
}

/// Puts `channel` in confirm mode, installs the topology and builds the publisher.
///
/// # Parameters
/// * `channel` - Freshly opened channel
/// * `cfg` - Broker section of the process configuration
///
/// # Returns
/// A publisher on the prepared channel, or the failing setup stage's error
pub async fn prepare_channel<C>(
    channel: Arc<C>,
    cfg: &RabbitConfigs,
) -> Result<Arc<RabbitMQPublisher<C>>, AmqpError>
where
    C: BrokerChannel + ?Sized,
{
    channel::enable_confirm(channel.as_ref()).await?;
    install_topology(channel.clone(), cfg).await?;
    Ok(RabbitMQPublisher::new(channel))
}

/// Process-wide broker state: one connection, one channel, one publisher.
pub struct Broker {
    connection: Connection,
    channel: Arc<Channel>,
    publisher: Arc<RabbitMQPublisher<Channel>>,
    options: PublishOptions,
}

impl Broker {
    /// Connects, opens the confirm-mode channel and installs the topology.
    pub async fn init(cfg: &RabbitConfigs, connection_name: &str) -> Result<Broker, AmqpError> {
        let connection = channel::connect(cfg, connection_name).await?;
        let channel = Arc::new(channel::open_channel(&connection).await?);
        let publisher = prepare_channel(channel.clone(), cfg).await?;

        info!(host = %cfg.host, queue = %cfg.queue, "broker ready");

        Ok(Broker {
            connection,
            channel,
            publisher,
            options: PublishOptions::from_configs(cfg),
        })
    }

    pub fn publisher(&self) -> Arc<dyn Publisher> {
        self.publisher.clone()
    }

    /// Publish options derived from configuration.
    pub fn options(&self) -> &PublishOptions {
        &self.options
    }

    /// Closes the channel, then the connection.
    ///
    /// Publishes still waiting for a confirmation are abandoned.
    pub async fn close(self) -> Result<(), AmqpError> {
        debug!("closing amqp channel...");
        if let Err(err) = self.channel.close(200, "shutdown").await {
            error!(error = err.to_string(), "error closing the channel");
            return Err(AmqpError::CloseError("channel".to_owned()));
        }

        debug!("closing amqp connection...");
        if let Err(err) = self.connection.close(200, "shutdown").await {
            error!(error = err.to_string(), "error closing the connection");
            return Err(AmqpError::CloseError("connection".to_owned()));
        }

        info!("broker connection closed");
        Ok(())
    }
}
