// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Process Configuration
//!
//! Layered configuration built with the `config` crate. The broker section is
//! looked up under a prefix derived from the deployment-environment tag, so a
//! single file can carry `dev.rabbit`, `prod.rabbit` and so on:
//!
//! ```toml
//! env = "dev"
//!
//! [dev.rabbit]
//! username = "guest"
//! password = "guest"
//! host = "localhost"
//! port = "5672"
//! queue = "jobs"
//! exchange = "jobs.direct"
//! routeKey = "job.created,job.updated"
//! ```
//!
//! Environment variables prefixed with `MINERVA` override file values, using
//! `__` as the path separator (`MINERVA_DEV__RABBIT__HOST=broker`).

use crate::{exchange::ExchangeKind, queue::split_route_keys};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::{collections::HashMap, path::Path, time::Duration};
use thiserror::Error;
use tracing::debug;

const DEFAULT_ENV: &str = "dev";
const ENV_PREFIX: &str = "MINERVA";

/// Errors raised while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failure to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration `{0}`: {1}")]
    Invalid(String, String),
}

/// Application identity.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfigs {
    #[serde(default = "default_app_name")]
    pub name: String,
}

impl Default for AppConfigs {
    fn default() -> Self {
        AppConfigs {
            name: default_app_name(),
        }
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfigs {
    #[serde(default = "default_http_addr")]
    pub addr: String,
}

impl Default for HttpConfigs {
    fn default() -> Self {
        HttpConfigs {
            addr: default_http_addr(),
        }
    }
}

/// Token signing settings.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfigs {
    #[serde(default)]
    pub key: String,
    #[serde(
        default = "default_jwt_expire_secs",
        rename = "expireSecs",
        alias = "expiresecs",
        alias = "expire_secs"
    )]
    pub expire_secs: u64,
}

impl Default for JwtConfigs {
    fn default() -> Self {
        JwtConfigs {
            key: String::new(),
            expire_secs: default_jwt_expire_secs(),
        }
    }
}

impl JwtConfigs {
    pub fn expire(&self) -> Duration {
        Duration::from_secs(self.expire_secs)
    }
}

/// Accounts accepted by the built-in credential verifier, keyed by email.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfigs {
    #[serde(default)]
    pub users: HashMap<String, String>,
}

/// Broker connection and topology settings found under `<env>.rabbit`.
#[derive(Debug, Clone, Deserialize)]
pub struct RabbitConfigs {
    pub username: String,
    pub password: String,
    pub host: String,
    #[serde(deserialize_with = "port_from_any")]
    pub port: u16,
    #[serde(default = "default_vhost")]
    pub vhost: String,
    pub queue: String,
    pub exchange: String,
    #[serde(
        default = "default_exchange_kind",
        rename = "exchangeKind",
        alias = "exchangekind",
        alias = "exchange_kind"
    )]
    pub exchange_kind: String,
    #[serde(rename = "routeKey", alias = "routekey", alias = "route_key")]
    pub route_key: String,
    #[serde(
        default = "default_dead_exchange",
        rename = "deadExchange",
        alias = "deadexchange",
        alias = "dead_exchange"
    )]
    pub dead_exchange: String,
    #[serde(
        default = "default_dead_route_key",
        rename = "deadRouteKey",
        alias = "deadroutekey",
        alias = "dead_route_key"
    )]
    pub dead_route_key: String,
    #[serde(
        default = "default_dial_timeout_ms",
        rename = "dialTimeoutMs",
        alias = "dialtimeoutms",
        alias = "dial_timeout_ms"
    )]
    pub dial_timeout_ms: u64,
    #[serde(
        default = "default_heartbeat_secs",
        rename = "heartbeatSecs",
        alias = "heartbeatsecs",
        alias = "heartbeat_secs"
    )]
    pub heartbeat_secs: u16,
    #[serde(
        default = "default_publish_timeout_ms",
        rename = "publishTimeoutMs",
        alias = "publishtimeoutms",
        alias = "publish_timeout_ms"
    )]
    pub publish_timeout_ms: u64,
    #[serde(
        default = "default_publish_max_attempts",
        rename = "publishMaxAttempts",
        alias = "publishmaxattempts",
        alias = "publish_max_attempts"
    )]
    pub publish_max_attempts: u32,
}

impl RabbitConfigs {
    /// Routing keys to bind, split from the comma-separated `routeKey`.
    pub fn route_keys(&self) -> Vec<String> {
        split_route_keys(&self.route_key)
    }

    pub fn exchange_kind(&self) -> Result<ExchangeKind, ConfigError> {
        self.exchange_kind
            .parse()
            .map_err(|_| ConfigError::Invalid("exchangeKind".into(), self.exchange_kind.clone()))
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }
}

/// Full process configuration.
#[derive(Debug, Clone)]
pub struct Configs {
    /// Deployment-environment tag used to locate the broker section.
    pub env: String,
    pub app: AppConfigs,
    pub http: HttpConfigs,
    pub jwt: JwtConfigs,
    pub auth: AuthConfigs,
    pub rabbitmq: RabbitConfigs,
}

impl Configs {
    /// Loads `.env`, `config/default.*`, `config/<env>.*` and the environment.
    pub fn load() -> Result<Configs, ConfigError> {
        let _ = dotenvy::dotenv();
        Configs::load_from(Path::new("config"))
    }

    /// Loads configuration files from `dir` plus environment overrides.
    pub fn load_from(dir: &Path) -> Result<Configs, ConfigError> {
        let env =
            std::env::var(format!("{ENV_PREFIX}_ENV")).unwrap_or_else(|_| DEFAULT_ENV.to_owned());
        debug!(env = %env, dir = %dir.display(), "loading configuration");

        let cfg = Config::builder()
            .set_default("env", env.clone())?
            .add_source(File::from(dir.join("default")).required(false))
            .add_source(File::from(dir.join(&env)).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        Configs::from_config(&cfg)
    }

    /// Extracts typed sections from an already built `Config`.
    pub fn from_config(cfg: &Config) -> Result<Configs, ConfigError> {
        let env = cfg
            .get_string("env")
            .unwrap_or_else(|_| DEFAULT_ENV.to_owned());

        let rabbitmq: RabbitConfigs = cfg.get(&rabbit_prefix(&env))?;
        if rabbitmq.queue.is_empty() {
            return Err(ConfigError::Invalid(
                format!("{}.queue", rabbit_prefix(&env)),
                "empty queue name".into(),
            ));
        }
        if rabbitmq.route_keys().is_empty() {
            return Err(ConfigError::Invalid(
                format!("{}.routeKey", rabbit_prefix(&env)),
                "no routing key to bind".into(),
            ));
        }
        if rabbitmq.publish_max_attempts == 0 {
            return Err(ConfigError::Invalid(
                format!("{}.publishMaxAttempts", rabbit_prefix(&env)),
                "must be at least 1".into(),
            ));
        }
        rabbitmq.exchange_kind()?;

        Ok(Configs {
            app: optional_section(cfg, "app")?,
            http: optional_section(cfg, "http")?,
            jwt: optional_section(cfg, "jwt")?,
            auth: optional_section(cfg, "auth")?,
            rabbitmq,
            env,
        })
    }
}

/// Key prefix of the broker section for a deployment environment.
pub fn rabbit_prefix(env: &str) -> String {
    format!("{env}.rabbit")
}

fn optional_section<T>(cfg: &Config, key: &str) -> Result<T, ConfigError>
where
    T: Default + serde::de::DeserializeOwned,
{
    match cfg.get::<T>(key) {
        Ok(section) => Ok(section),
        Err(config::ConfigError::NotFound(_)) => Ok(T::default()),
        Err(err) => Err(err.into()),
    }
}

fn port_from_any<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u16),
        Text(String),
    }

    match Port::deserialize(deserializer)? {
        Port::Number(port) => Ok(port),
        Port::Text(port) => port.trim().parse().map_err(serde::de::Error::custom),
    }
}

fn default_app_name() -> String {
    "minerva".to_owned()
}

fn default_http_addr() -> String {
    "0.0.0.0:8080".to_owned()
}

fn default_jwt_expire_secs() -> u64 {
    3600
}

fn default_vhost() -> String {
    "/".to_owned()
}

fn default_exchange_kind() -> String {
    "direct".to_owned()
}

fn default_dead_exchange() -> String {
    "dead_message_exchange".to_owned()
}

fn default_dead_route_key() -> String {
    "dead_key".to_owned()
}

fn default_dial_timeout_ms() -> u64 {
    2000
}

fn default_heartbeat_secs() -> u16 {
    2
}

fn default_publish_timeout_ms() -> u64 {
    5000
}

fn default_publish_max_attempts() -> u32 {
    3
}
