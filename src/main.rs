// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

use minerva::{
    auth::AuthService,
    configs::Configs,
    http::{router, AppState},
    logging,
    service::Broker,
};
use std::process::ExitCode;
use tracing::{error, info, Level};

#[tokio::main]
async fn main() -> ExitCode {
    logging::init(Level::INFO);

    let cfg = match Configs::load() {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(stage = "config", error = err.to_string(), "startup failed");
            return ExitCode::FAILURE;
        }
    };

    let broker = match Broker::init(&cfg.rabbitmq, &cfg.app.name).await {
        Ok(broker) => broker,
        Err(err) => {
            error!(stage = "broker", error = err.to_string(), "startup failed");
            return ExitCode::FAILURE;
        }
    };

    let state = AppState {
        auth: AuthService::from_configs(&cfg.jwt, &cfg.auth),
        publisher: broker.publisher(),
        options: broker.options().clone(),
    };

    let listener = match tokio::net::TcpListener::bind(&cfg.http.addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(
                stage = "http",
                addr = %cfg.http.addr,
                error = err.to_string(),
                "startup failed"
            );
            return ExitCode::FAILURE;
        }
    };
    info!(addr = %cfg.http.addr, env = %cfg.env, "listening");

    let served = axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
        })
        .await;

    if let Err(err) = broker.close().await {
        error!(error = err.to_string(), "broker shutdown failed");
    }

    match served {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = err.to_string(), "http server failed");
            ExitCode::FAILURE
        }
    }
}
