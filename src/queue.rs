// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Queue Management for RabbitMQ
//!
//! This module provides types for defining the work queue and its bindings.
//! Dead-lettering is attached through queue arguments at declaration time, so
//! rejected, expired or overflowing messages are re-routed by the broker to the
//! dead-letter exchange under the dead-letter routing key.

use lapin::types::{AMQPValue, FieldTable, LongString, ShortString};
use std::collections::BTreeMap;

/// Queue argument naming the dead-letter exchange
pub const AMQP_HEADERS_DEAD_LETTER_EXCHANGE: &str = "x-dead-letter-exchange";
/// Queue argument naming the dead-letter routing key
pub const AMQP_HEADERS_DEAD_LETTER_ROUTING_KEY: &str = "x-dead-letter-routing-key";

/// Delimiter between routing keys in the `routeKey` setting.
pub const ROUTE_KEY_DELIMITER: char = ',';

/// Dead-letter target referenced by a queue.
///
/// The exchange does not have to be declared by this process; the queue only
/// references it by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    pub exchange: String,
    pub routing_key: String,
}

/// Definition of a RabbitMQ queue with its configuration parameters.
///
/// This struct implements the builder pattern to create and configure queue definitions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueDefinition {
    pub(crate) name: String,
    pub(crate) durable: bool,
    pub(crate) dead_letter: Option<DeadLetter>,
}

impl QueueDefinition {
    /// Creates a new queue definition with the given name.
    ///
    /// By default, the queue is created with standard settings (non-durable,
    /// without dead-lettering).
    pub fn new(name: &str) -> QueueDefinition {
        QueueDefinition {
            name: name.to_owned(),
            ..QueueDefinition::default()
        }
    }

    /// Makes the queue durable, persisting across broker restarts.
    pub fn durable(mut self) -> Self {
        self.durable = true;
        self
    }

    /// Routes dead messages to `exchange` under `routing_key`.
    pub fn with_dead_letter(mut self, exchange: &str, routing_key: &str) -> Self {
        self.dead_letter = Some(DeadLetter {
            exchange: exchange.to_owned(),
            routing_key: routing_key.to_owned(),
        });
        self
    }

    /// Builds the declaration arguments for this queue.
    pub fn arguments(&self) -> FieldTable {
        let mut args = BTreeMap::<ShortString, AMQPValue>::new();

        if let Some(dl) = &self.dead_letter {
            args.insert(
                ShortString::from(AMQP_HEADERS_DEAD_LETTER_EXCHANGE),
                AMQPValue::LongString(LongString::from(dl.exchange.clone())),
            );
            args.insert(
                ShortString::from(AMQP_HEADERS_DEAD_LETTER_ROUTING_KEY),
                AMQPValue::LongString(LongString::from(dl.routing_key.clone())),
            );
        }

        FieldTable::from(args)
    }
}

/// Configuration for binding a queue to an exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueBinding<'qeb> {
    pub(crate) queue_name: &'qeb str,
    pub(crate) exchange_name: &'qeb str,
    pub(crate) routing_key: &'qeb str,
}

impl<'qeb> QueueBinding<'qeb> {
    /// Creates a new queue binding for the given queue.
    ///
    /// By default, the exchange name and routing key are empty strings.
    pub fn new(queue: &'qeb str) -> QueueBinding<'qeb> {
        QueueBinding {
            queue_name: queue,
            exchange_name: "",
            routing_key: "",
        }
    }

    /// Sets the exchange to bind the queue to.
    pub fn exchange(mut self, exchange: &'qeb str) -> Self {
        self.exchange_name = exchange;
        self
    }

    /// Sets the routing key for the binding.
    pub fn routing_key(mut self, key: &'qeb str) -> Self {
        self.routing_key = key;
        self
    }
}

/// Splits a comma-separated routing key list.
///
/// Whitespace around each key is removed and empty entries are skipped.
pub fn split_route_keys(route_keys: &str) -> Vec<String> {
    route_keys
        .split(ROUTE_KEY_DELIMITER)
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_owned)
        .collect()
}

/// One binding per routing key, all targeting the same queue and exchange.
pub fn bindings_for<'qeb>(
    queue: &'qeb str,
    exchange: &'qeb str,
    route_keys: &'qeb [String],
) -> Vec<QueueBinding<'qeb>> {
    route_keys
        .iter()
        .map(|key| QueueBinding::new(queue).exchange(exchange).routing_key(key))
        .collect()
}
