// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Connection and Channel Management
//!
//! This module dials the broker and opens the channel used for every
//! declaration and publish. The dial is bounded by the configured timeout and
//! the connection negotiates a heartbeat so a dead peer is noticed without
//! waiting for a publish to fail.

use crate::{broker::BrokerChannel, configs::RabbitConfigs, errors::AmqpError};
use lapin::{types::LongString, Channel, Connection, ConnectionProperties};
use tracing::{debug, error};

/// Builds the AMQP URI for the configured broker.
///
/// The heartbeat and the dial timeout travel as URI query parameters, which is
/// how lapin reads its tuning options. Credentials and the vhost are
/// percent-encoded, so reserved characters in a password survive parsing.
///
/// # Parameters
/// * `cfg` - Broker section of the process configuration
///
/// # Returns
/// The `amqp://` URI handed to `Connection::connect`
pub fn amqp_uri(cfg: &RabbitConfigs) -> String {
    format!(
        "amqp://{}:{}@{}:{}/{}?heartbeat={}&connection_timeout={}",
        urlencoding::encode(&cfg.username),
        urlencoding::encode(&cfg.password),
        cfg.host,
        cfg.port,
        urlencoding::encode(&cfg.vhost),
        cfg.heartbeat_secs,
        cfg.dial_timeout_ms
    )
}

/// Establishes the broker connection.
///
/// There is no retry here; a broker that cannot be reached within the dial
/// timeout is reported to the caller as a startup failure.
///
/// # Parameters
/// * `cfg` - Broker section of the process configuration
/// * `connection_name` - Name shown for this client in the broker UI
///
/// # Returns
/// The open connection, `AmqpError::ConnectionTimeout` when the dial and
/// handshake exceed `dialTimeoutMs`, or `AmqpError::ConnectionError` otherwise
pub async fn connect(cfg: &RabbitConfigs, connection_name: &str) -> Result<Connection, AmqpError> {
    debug!(host = %cfg.host, port = cfg.port, "creating amqp connection...");
    let options = ConnectionProperties::default()
        .with_connection_name(LongString::from(connection_name.to_owned()));

    let uri = amqp_uri(cfg);

    let conn = match tokio::time::timeout(cfg.dial_timeout(), Connection::connect(&uri, options))
        .await
    {
        Err(_) => {
            error!(
                timeout_ms = cfg.dial_timeout_ms,
                host = %cfg.host,
                "timed out connecting to the broker"
            );
            Err(AmqpError::ConnectionTimeout(cfg.dial_timeout_ms))
        }
        Ok(Err(err)) => {
            error!(error = err.to_string(), "failure to connect");
            Err(AmqpError::ConnectionError)
        }
        Ok(Ok(c)) => Ok(c),
    }?;
    debug!("amqp connected");

    Ok(conn)
}

/// Opens the single channel shared by the process.
///
/// # Parameters
/// * `conn` - An established connection
///
/// # Returns
/// A new channel, or `AmqpError::ChannelError` if the broker refuses it
pub async fn open_channel(conn: &Connection) -> Result<Channel, AmqpError> {
    debug!("creating amqp channel...");
    match conn.create_channel().await {
        Ok(c) => {
            debug!(id = c.id(), "channel created");
            Ok(c)
        }
        Err(err) => {
            error!(error = err.to_string(), "error to create the channel");
            Err(AmqpError::ChannelError)
        }
    }
}

/// Switches the channel into publisher-confirmation mode.
///
/// From here on every publish yields exactly one confirmation.
pub async fn enable_confirm<C>(channel: &C) -> Result<(), AmqpError>
where
    C: BrokerChannel + ?Sized,
{
    channel.confirm_select().await?;
    debug!("channel in confirm mode");
    Ok(())
}
