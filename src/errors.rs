// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for the Broker Integration
//!
//! `AmqpError` covers every failure of the reliable-publish protocol. Setup
//! variants (connect, channel, confirm mode, declarations, bindings) are
//! returned by the initialization functions and are meant to stop the process;
//! publish variants are handed back to the caller after retries are exhausted.

use thiserror::Error;

/// Represents errors that can occur while wiring or using the broker.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmqpError {
    /// Error establishing a connection to the RabbitMQ server
    #[error("failure to connect")]
    ConnectionError,

    /// The TCP dial did not complete within the configured bound
    #[error("connection attempt timed out after {0}ms")]
    ConnectionTimeout(u64),

    /// Error creating a channel from an established connection
    #[error("failure to create a channel")]
    ChannelError,

    /// Error switching the channel into publisher-confirmation mode
    #[error("failure to open channel confirm mode")]
    ConfirmModeError,

    /// Error declaring an exchange with the given name
    #[error("failure to declare an exchange `{0}`")]
    DeclareExchangeError(String),

    /// Error declaring a queue with the given name
    #[error("failure to declare a queue `{0}`")]
    DeclareQueueError(String),

    /// Error binding an exchange to a queue
    #[error("failure to binding exchange `{0}` to queue `{1}`")]
    BindingExchangeToQueueError(String, String),

    /// Error handing a message to the channel
    #[error("failure to publish")]
    PublishingError,

    /// No positive confirmation after every attempt was used
    #[error("failure to send message after {0} attempts")]
    SendMessageError(u32),

    /// The last attempt received no confirmation within the timeout
    #[error("send message timeout after {0} attempts")]
    SendMessageTimeout(u32),

    /// Error serializing or parsing a message payload
    #[error("failure to parse payload")]
    ParsePayloadError,

    /// Error closing the channel or the connection
    #[error("failure to close `{0}`")]
    CloseError(String),
}

impl AmqpError {
    /// Whether the error belongs to the startup phase.
    ///
    /// Startup errors leave the process without a usable topology.
    pub fn is_setup(&self) -> bool {
        matches!(
            self,
            AmqpError::ConnectionError
                | AmqpError::ConnectionTimeout(_)
                | AmqpError::ChannelError
                | AmqpError::ConfirmModeError
                | AmqpError::DeclareExchangeError(_)
                | AmqpError::DeclareQueueError(_)
                | AmqpError::BindingExchangeToQueueError(_, _)
        )
    }
}
