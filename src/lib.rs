// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Broker wiring for the minerva service: a confirm-mode RabbitMQ channel with
//! a dead-lettered work queue, a retrying publisher, and the HTTP login
//! endpoint.

mod otel;

pub mod auth;
pub mod broker;
pub mod channel;
pub mod configs;
pub mod errors;
pub mod exchange;
pub mod http;
pub mod logging;
pub mod message;
pub mod publisher;
pub mod queue;
pub mod service;
pub mod topology;
