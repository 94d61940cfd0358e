// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Message Publisher
//!
//! Reliable publishing on a confirm-mode channel. Every attempt publishes the
//! serialized envelope and then waits, bounded by the configured timeout, for
//! the broker to acknowledge it. A negative acknowledgment, a timeout or a
//! transport failure uses up one attempt; the next attempt starts immediately.
//!
//! Delivery is at-least-once: an attempt that timed out may still have reached
//! the queue, so a retry can produce a duplicate. All attempts of a message
//! carry the same `message_id` so consumers can detect that.

use crate::{
    broker::{BrokerChannel, Confirmation},
    configs::RabbitConfigs,
    errors::AmqpError,
    message::{Message, JSON_CONTENT_TYPE},
    otel,
};
use async_trait::async_trait;
use lapin::{
    types::{AMQPValue, FieldTable, ShortString},
    BasicProperties, Channel,
};
use opentelemetry::Context;
use std::{collections::BTreeMap, sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// AMQP delivery mode for messages that survive a broker restart
pub const PERSISTENT_DELIVERY_MODE: u8 = 2;

/// Where and how a message is published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOptions {
    pub exchange: String,
    pub routing_key: String,
    /// Bound on the wait for a single confirmation.
    pub timeout: Duration,
    /// Total number of attempts, the first one included. Zero counts as one.
    pub max_attempts: u32,
}

impl PublishOptions {
    pub fn new(exchange: &str, routing_key: &str) -> PublishOptions {
        PublishOptions {
            exchange: exchange.to_owned(),
            routing_key: routing_key.to_owned(),
            timeout: Duration::from_secs(5),
            max_attempts: 3,
        }
    }

    /// Publishes to the configured exchange under its first routing key.
    pub fn from_configs(cfg: &RabbitConfigs) -> PublishOptions {
        PublishOptions {
            exchange: cfg.exchange.clone(),
            routing_key: cfg.route_keys().into_iter().next().unwrap_or_default(),
            timeout: cfg.publish_timeout(),
            max_attempts: cfg.publish_max_attempts,
        }
    }

    pub fn routing_key(mut self, key: &str) -> Self {
        self.routing_key = key.to_owned();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }
}

/// Publishes messages and reports whether the broker accepted them.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(
        &self,
        ctx: &Context,
        message: &Message,
        options: &PublishOptions,
    ) -> Result<(), AmqpError>;
}

/// Publisher over a shared confirm-mode channel.
///
/// Only one publish-and-confirm cycle runs at a time on the channel; concurrent
/// callers queue on an internal lock, and each retry takes the lock again.
pub struct RabbitMQPublisher<C: ?Sized = Channel> {
    channel: Arc<C>,
    in_flight: Mutex<()>,
}

impl<C> RabbitMQPublisher<C>
where
    C: BrokerChannel + ?Sized,
{
    /// Creates a publisher on a channel already in confirm mode.
    ///
    /// # Parameters
    /// * `channel` - Channel shared with the topology setup, in confirm mode
    ///
    /// # Returns
    /// The publisher wrapped in an `Arc`, ready to be shared between callers
    pub fn new(channel: Arc<C>) -> Arc<RabbitMQPublisher<C>> {
        Arc::new(RabbitMQPublisher {
            channel,
            in_flight: Mutex::new(()),
        })
    }

    async fn attempt(
        &self,
        attempt: u32,
        payload: &[u8],
        properties: BasicProperties,
        options: &PublishOptions,
    ) -> Result<Confirmation, AmqpError> {
        let _guard = self.in_flight.lock().await;

        let pending = self
            .channel
            .publish(&options.exchange, &options.routing_key, payload, properties)
            .await?;

        match tokio::time::timeout(options.timeout, pending).await {
            Err(_) => Err(AmqpError::SendMessageTimeout(attempt)),
            Ok(confirmation) => confirmation,
        }
    }
}

#[async_trait]
impl<C> Publisher for RabbitMQPublisher<C>
where
    C: BrokerChannel + ?Sized,
{
    async fn publish(
        &self,
        ctx: &Context,
        message: &Message,
        options: &PublishOptions,
    ) -> Result<(), AmqpError> {
        let payload = message.to_bytes()?;
        let properties = properties_for(ctx, message);
        let max_attempts = options.max_attempts.max(1);
        let mut last_err = AmqpError::SendMessageError(max_attempts);

        for attempt in 1..=max_attempts {
            match self
                .attempt(attempt, &payload, properties.clone(), options)
                .await
            {
                Ok(Confirmation::Ack) => {
                    debug!(
                        id = message.id,
                        action = message.action,
                        attempt = attempt,
                        "message confirmed"
                    );
                    return Ok(());
                }
                Ok(Confirmation::Nack) => {
                    warn!(id = message.id, attempt = attempt, "message nacked by the broker");
                    last_err = AmqpError::SendMessageError(max_attempts);
                }
                Err(AmqpError::SendMessageTimeout(_)) => {
                    warn!(
                        id = message.id,
                        attempt = attempt,
                        timeout_ms = options.timeout.as_millis() as u64,
                        "no confirmation within timeout"
                    );
                    last_err = AmqpError::SendMessageTimeout(max_attempts);
                }
                Err(AmqpError::ConfirmModeError) => return Err(AmqpError::ConfirmModeError),
                Err(err) => {
                    warn!(
                        id = message.id,
                        attempt = attempt,
                        error = err.to_string(),
                        "publish attempt failed"
                    );
                    last_err = AmqpError::SendMessageError(max_attempts);
                }
            }
        }

        error!(
            id = message.id,
            exchange = options.exchange,
            routing_key = options.routing_key,
            error = last_err.to_string(),
            "giving up on message"
        );
        Err(last_err)
    }
}

fn properties_for(ctx: &Context, message: &Message) -> BasicProperties {
    let mut headers = BTreeMap::<ShortString, AMQPValue>::default();
    otel::inject_context(ctx, &mut headers);

    BasicProperties::default()
        .with_content_type(ShortString::from(JSON_CONTENT_TYPE))
        .with_type(ShortString::from(message.action.clone()))
        .with_message_id(ShortString::from(Uuid::new_v4().to_string()))
        .with_delivery_mode(PERSISTENT_DELIVERY_MODE)
        .with_headers(FieldTable::from(headers))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{MockBrokerChannel, PendingConfirm};
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex as StdMutex,
    };

    fn confirm(c: Confirmation) -> Result<PendingConfirm, AmqpError> {
        Ok(Box::pin(async move { Ok::<_, AmqpError>(c) }))
    }

    fn never() -> Result<PendingConfirm, AmqpError> {
        Ok(Box::pin(futures_util::future::pending::<
            Result<Confirmation, AmqpError>,
        >()))
    }

    fn options(attempts: u32) -> PublishOptions {
        PublishOptions::new("jobs.direct", "job.created")
            .timeout(Duration::from_secs(2))
            .max_attempts(attempts)
    }

    async fn send(channel: MockBrokerChannel, opts: &PublishOptions) -> Result<(), AmqpError> {
        let publisher = RabbitMQPublisher::new(Arc::new(channel));
        publisher
            .publish(&Context::new(), &Message::new(1, "job.created"), opts)
            .await
    }

    #[tokio::test]
    async fn ack_on_first_attempt_succeeds_once() {
        let mut channel = MockBrokerChannel::new();
        channel
            .expect_publish()
            .withf(|exchange, key, payload, props| {
                exchange == "jobs.direct"
                    && key == "job.created"
                    && Message::from_bytes(payload).map(|m| m.id) == Ok(1)
                    && props.content_type() == &Some(ShortString::from(JSON_CONTENT_TYPE))
                    && props.kind() == &Some(ShortString::from("job.created"))
                    && props.delivery_mode() == &Some(PERSISTENT_DELIVERY_MODE)
            })
            .times(1)
            .returning(|_, _, _, _| confirm(Confirmation::Ack));

        assert_eq!(send(channel, &options(3)).await, Ok(()));
    }

    #[tokio::test]
    async fn every_attempt_nacked_exhausts_attempts() {
        let mut channel = MockBrokerChannel::new();
        channel
            .expect_publish()
            .times(3)
            .returning(|_, _, _, _| confirm(Confirmation::Nack));

        assert_eq!(
            send(channel, &options(3)).await,
            Err(AmqpError::SendMessageError(3))
        );
    }

    #[tokio::test]
    async fn nack_then_ack_retries_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let mut channel = MockBrokerChannel::new();
        channel.expect_publish().returning(move |_, _, _, _| {
            match counter.fetch_add(1, Ordering::SeqCst) {
                0 => confirm(Confirmation::Nack),
                _ => confirm(Confirmation::Ack),
            }
        });

        assert_eq!(send(channel, &options(3)).await, Ok(()));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_confirmation_times_out_after_the_bound() {
        let mut channel = MockBrokerChannel::new();
        channel
            .expect_publish()
            .times(1)
            .returning(|_, _, _, _| never());

        let start = tokio::time::Instant::now();
        let result = send(channel, &options(1)).await;
        let elapsed = start.elapsed();

        assert_eq!(result, Err(AmqpError::SendMessageTimeout(1)));
        assert!(elapsed >= Duration::from_secs(2));
        assert!(elapsed < Duration::from_millis(2100));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_on_last_attempt_reports_timeout() {
        let mut channel = MockBrokerChannel::new();
        channel
            .expect_publish()
            .times(3)
            .returning(|_, _, _, _| never());

        let start = tokio::time::Instant::now();
        assert_eq!(
            send(channel, &options(3)).await,
            Err(AmqpError::SendMessageTimeout(3))
        );
        assert!(start.elapsed() >= Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn nack_after_timeout_reports_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let mut channel = MockBrokerChannel::new();
        channel.expect_publish().times(2).returning(move |_, _, _, _| {
            match counter.fetch_add(1, Ordering::SeqCst) {
                0 => never(),
                _ => confirm(Confirmation::Nack),
            }
        });

        assert_eq!(
            send(channel, &options(2)).await,
            Err(AmqpError::SendMessageError(2))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_then_ack_succeeds() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let mut channel = MockBrokerChannel::new();
        channel.expect_publish().times(2).returning(move |_, _, _, _| {
            match counter.fetch_add(1, Ordering::SeqCst) {
                0 => never(),
                _ => confirm(Confirmation::Ack),
            }
        });

        assert_eq!(send(channel, &options(3)).await, Ok(()));
    }

    #[tokio::test]
    async fn transport_failure_is_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let mut channel = MockBrokerChannel::new();
        channel.expect_publish().times(2).returning(move |_, _, _, _| {
            match counter.fetch_add(1, Ordering::SeqCst) {
                0 => Err(AmqpError::PublishingError),
                _ => confirm(Confirmation::Ack),
            }
        });

        assert_eq!(send(channel, &options(3)).await, Ok(()));
    }

    #[tokio::test]
    async fn channel_without_confirm_mode_is_not_retried() {
        let mut channel = MockBrokerChannel::new();
        channel
            .expect_publish()
            .times(1)
            .returning(|_, _, _, _| {
                Ok(Box::pin(async {
                    Err::<Confirmation, _>(AmqpError::ConfirmModeError)
                }))
            });

        assert_eq!(
            send(channel, &options(3)).await,
            Err(AmqpError::ConfirmModeError)
        );
    }

    #[tokio::test]
    async fn zero_attempts_still_publishes_once() {
        let mut channel = MockBrokerChannel::new();
        channel
            .expect_publish()
            .times(1)
            .returning(|_, _, _, _| confirm(Confirmation::Nack));

        assert_eq!(
            send(channel, &options(0)).await,
            Err(AmqpError::SendMessageError(1))
        );
    }

    #[tokio::test]
    async fn retries_reuse_the_message_id() {
        let ids = Arc::new(StdMutex::new(Vec::new()));
        let seen = ids.clone();

        let mut channel = MockBrokerChannel::new();
        channel.expect_publish().times(2).returning(move |_, _, _, props| {
            seen.lock().unwrap().push(props.message_id().clone());
            confirm(Confirmation::Nack)
        });

        let _ = send(channel, &options(2)).await;

        let ids = ids.lock().unwrap();
        assert!(ids[0].is_some());
        assert_eq!(ids[0], ids[1]);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_publishes_are_serialized() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (current, max) = (in_flight.clone(), peak.clone());

        let mut channel = MockBrokerChannel::new();
        channel.expect_publish().times(2).returning(move |_, _, _, _| {
            let now = current.fetch_add(1, Ordering::SeqCst) + 1;
            max.fetch_max(now, Ordering::SeqCst);
            let current = current.clone();
            Ok(Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                current.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, AmqpError>(Confirmation::Ack)
            }))
        });

        let publisher = RabbitMQPublisher::new(Arc::new(channel));
        let (ctx, opts) = (Context::new(), options(1));
        let (a, b) = (Message::new(1, "a"), Message::new(2, "b"));

        let (first, second) = tokio::join!(
            publisher.publish(&ctx, &a, &opts),
            publisher.publish(&ctx, &b, &opts)
        );

        assert_eq!(first, Ok(()));
        assert_eq!(second, Ok(()));
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn options_from_configs_use_first_route_key() {
        let cfg = RabbitConfigs {
            username: "guest".into(),
            password: "guest".into(),
            host: "localhost".into(),
            port: 5672,
            vhost: "/".into(),
            queue: "jobs".into(),
            exchange: "jobs.direct".into(),
            exchange_kind: "direct".into(),
            route_key: "job.created,job.updated".into(),
            dead_exchange: "dead_message_exchange".into(),
            dead_route_key: "dead_key".into(),
            dial_timeout_ms: 2000,
            heartbeat_secs: 2,
            publish_timeout_ms: 1500,
            publish_max_attempts: 4,
        };

        let opts = PublishOptions::from_configs(&cfg);
        assert_eq!(opts.exchange, "jobs.direct");
        assert_eq!(opts.routing_key, "job.created");
        assert_eq!(opts.timeout, Duration::from_millis(1500));
        assert_eq!(opts.max_attempts, 4);
    }
}
