// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Broker Channel Abstraction
//!
//! `BrokerChannel` is the narrow set of channel operations the topology and the
//! publisher need. It is implemented for `lapin::Channel` and mocked in tests,
//! so declaration and confirmation handling can be exercised without a broker.
//!
//! Publishing returns a [`PendingConfirm`]: a future that resolves once the
//! broker acknowledges or rejects that specific publish. lapin tracks the
//! delivery tag of every publish on a confirm-mode channel, so each pending
//! confirmation is correlated to its own message rather than to its position
//! on a shared stream.

use crate::{errors::AmqpError, exchange::ExchangeKind};
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use lapin::{
    options::{
        BasicPublishOptions, ConfirmSelectOptions, ExchangeDeclareOptions, QueueBindOptions,
        QueueDeclareOptions,
    },
    publisher_confirm::Confirmation as LapinConfirmation,
    types::FieldTable,
    BasicProperties, Channel,
};
use tracing::{debug, error};

/// Outcome reported by the broker for one publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Ack,
    Nack,
}

/// Future resolving to the broker confirmation of a single publish.
pub type PendingConfirm = BoxFuture<'static, Result<Confirmation, AmqpError>>;

/// Channel operations used for topology declaration and reliable publishing.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    /// Declares an exchange without extra arguments.
    async fn exchange_declare(
        &self,
        name: &str,
        kind: ExchangeKind,
        options: ExchangeDeclareOptions,
    ) -> Result<(), AmqpError>;

    /// Declares a queue with the given arguments.
    async fn queue_declare(
        &self,
        name: &str,
        options: QueueDeclareOptions,
        arguments: FieldTable,
    ) -> Result<(), AmqpError>;

    /// Binds `queue` to `exchange` under `routing_key`.
    async fn queue_bind(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), AmqpError>;

    /// Puts the channel in publisher-confirmation mode.
    async fn confirm_select(&self) -> Result<(), AmqpError>;

    /// Hands a message to the broker and returns its pending confirmation.
    ///
    /// Both `mandatory` and `immediate` are off: unroutable messages may be
    /// dropped by the broker and still be acknowledged.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        properties: BasicProperties,
    ) -> Result<PendingConfirm, AmqpError>;
}

#[async_trait]
impl BrokerChannel for Channel {
    async fn exchange_declare(
        &self,
        name: &str,
        kind: ExchangeKind,
        options: ExchangeDeclareOptions,
    ) -> Result<(), AmqpError> {
        match Channel::exchange_declare(self, name, kind.into(), options, FieldTable::default())
            .await
        {
            Err(err) => {
                error!(
                    error = err.to_string(),
                    name = name,
                    "error to declare the exchange"
                );
                Err(AmqpError::DeclareExchangeError(name.to_owned()))
            }
            _ => Ok(()),
        }
    }

    async fn queue_declare(
        &self,
        name: &str,
        options: QueueDeclareOptions,
        arguments: FieldTable,
    ) -> Result<(), AmqpError> {
        match Channel::queue_declare(self, name, options, arguments).await {
            Err(err) => {
                error!(error = err.to_string(), name = name, "error to declare the queue");
                Err(AmqpError::DeclareQueueError(name.to_owned()))
            }
            Ok(queue) => {
                debug!(
                    name = name,
                    messages = queue.message_count(),
                    consumers = queue.consumer_count(),
                    "queue declared"
                );
                Ok(())
            }
        }
    }

    async fn queue_bind(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), AmqpError> {
        match Channel::queue_bind(
            self,
            queue,
            exchange,
            routing_key,
            QueueBindOptions { nowait: false },
            FieldTable::default(),
        )
        .await
        {
            Err(err) => {
                error!(
                    error = err.to_string(),
                    queue = queue,
                    exchange = exchange,
                    routing_key = routing_key,
                    "error to bind queue to exchange"
                );
                Err(AmqpError::BindingExchangeToQueueError(
                    exchange.to_owned(),
                    queue.to_owned(),
                ))
            }
            _ => Ok(()),
        }
    }

    async fn confirm_select(&self) -> Result<(), AmqpError> {
        match Channel::confirm_select(self, ConfirmSelectOptions { nowait: false }).await {
            Err(err) => {
                error!(error = err.to_string(), "error to open channel confirm mode");
                Err(AmqpError::ConfirmModeError)
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
    ) -> Result<PendingConfirm, AmqpError> {
        let confirm = match Channel::basic_publish(
            self,
            exchange,
            routing_key,
            BasicPublishOptions {
                mandatory: false,
                immediate: false,
            },
            payload,
            properties,
        )
        .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error publishing message");
                Err(AmqpError::PublishingError)
            }
            Ok(confirm) => Ok(confirm),
        }?;

        Ok(Box::pin(async move {
            match confirm.await {
                Ok(LapinConfirmation::Ack(_)) => Ok(Confirmation::Ack),
                Ok(LapinConfirmation::Nack(_)) => Ok(Confirmation::Nack),
                Ok(LapinConfirmation::NotRequested) => {
                    error!("publish confirmation not requested, channel is not in confirm mode");
                    Err(AmqpError::ConfirmModeError)
                }
                Err(err) => {
                    error!(error = err.to_string(), "error awaiting publish confirmation");
                    Err(AmqpError::PublishingError)
                }
            }
        }))
    }
}
