// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # HTTP Endpoints
//!
//! - `POST /minerva/login`: form `email` + `password`, answers `{"token": ...}`
//! - `POST /minerva/messages`: JSON `Message`, published with confirmation

use crate::{
    auth::{AuthError, AuthService},
    errors::AmqpError,
    message::Message,
    publisher::{PublishOptions, Publisher},
};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Form, Json, Router,
};
use opentelemetry::Context;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::error;

/// Result text returned once a message is confirmed
pub const MESSAGE_SUCCESS: &str = "send message success";

/// Errors returned by the HTTP handlers.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Publish(#[from] AmqpError),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Auth(AuthError::InvalidCredentials) => StatusCode::UNAUTHORIZED,
            ApiError::Auth(AuthError::InvalidToken(_)) => StatusCode::UNAUTHORIZED,
            ApiError::Auth(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Publish(AmqpError::SendMessageTimeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Publish(AmqpError::ParsePayloadError) => StatusCode::BAD_REQUEST,
            ApiError::Publish(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::Auth(_) => "auth",
            ApiError::Publish(_) => "publish",
        }
    }
}

/// Error body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub code: u16,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = self.to_string(), kind = self.kind(), "request failed");
        }

        let body = ErrorResponse {
            error: self.kind().to_owned(),
            message: self.to_string(),
            code: status.as_u16(),
        };

        (status, Json(body)).into_response()
    }
}

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub auth: AuthService,
    pub publisher: Arc<dyn Publisher>,
    pub options: PublishOptions,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct PublishQuery {
    #[serde(rename = "routeKey")]
    pub route_key: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/minerva/login", post(login))
        .route("/minerva/messages", post(publish_message))
        .with_state(state)
}

async fn login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Result<Json<TokenResponse>, ApiError> {
    let token = state.auth.login(&form.email, &form.password).await?;
    Ok(Json(TokenResponse { token }))
}

async fn publish_message(
    State(state): State<AppState>,
    Query(query): Query<PublishQuery>,
    Json(message): Json<Message>,
) -> Result<impl IntoResponse, ApiError> {
    let options = match query.route_key {
        Some(key) => state.options.clone().routing_key(&key),
        None => state.options.clone(),
    };

    state
        .publisher
        .publish(&Context::current(), &message, &options)
        .await?;

    Ok((StatusCode::ACCEPTED, Json(json!({ "result": MESSAGE_SUCCESS }))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::{StaticCredentials, validate_token},
        publisher::MockPublisher,
    };
    use axum::{body::Body, http::Request};
    use std::{collections::HashMap, time::Duration};
    use tower::ServiceExt;

    const KEY: &[u8] = b"http-test-key";

    fn app(publisher: MockPublisher) -> Router {
        let users = HashMap::from([("ada@example.com".to_owned(), "lovelace".to_owned())]);
        router(AppState {
            auth: AuthService::new(
                Arc::new(StaticCredentials::new(users)),
                KEY,
                Duration::from_secs(600),
            ),
            publisher: Arc::new(publisher),
            options: PublishOptions::new("jobs.direct", "job.created"),
        })
    }

    fn form(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/minerva/login")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(body.to_owned()))
            .unwrap()
    }

    fn message(uri: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(
                r#"{"id": 9, "action": "job.created", "content": {"job": 1}, "callback": "done"}"#,
            ))
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn login_returns_token() {
        let response = app(MockPublisher::new())
            .oneshot(form("email=ada%40example.com&password=lovelace"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let claims = validate_token(body["token"].as_str().unwrap(), KEY).unwrap();
        assert_eq!(claims.email, "ada@example.com");
    }

    #[tokio::test]
    async fn login_with_bad_password_is_unauthorized() {
        let response = app(MockPublisher::new())
            .oneshot(form("email=ada%40example.com&password=nope"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error"], "auth");
    }

    #[tokio::test]
    async fn confirmed_message_is_accepted() {
        let mut publisher = MockPublisher::new();
        publisher
            .expect_publish()
            .withf(|_, msg, opts| {
                msg.id == 9
                    && msg.callback.as_deref() == Some("done")
                    && opts.routing_key == "job.created"
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let response = app(publisher)
            .oneshot(message("/minerva/messages"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(body_json(response).await["result"], MESSAGE_SUCCESS);
    }

    #[tokio::test]
    async fn route_key_can_be_overridden() {
        let mut publisher = MockPublisher::new();
        publisher
            .expect_publish()
            .withf(|_, _, opts| opts.routing_key == "job.updated")
            .times(1)
            .returning(|_, _, _| Ok(()));

        let response = app(publisher)
            .oneshot(message("/minerva/messages?routeKey=job.updated"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn publish_timeout_maps_to_gateway_timeout() {
        let mut publisher = MockPublisher::new();
        publisher
            .expect_publish()
            .returning(|_, _, _| Err(AmqpError::SendMessageTimeout(3)));

        let response = app(publisher)
            .oneshot(message("/minerva/messages"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn exhausted_attempts_map_to_server_error() {
        let mut publisher = MockPublisher::new();
        publisher
            .expect_publish()
            .returning(|_, _, _| Err(AmqpError::SendMessageError(3)));

        let response = app(publisher)
            .oneshot(message("/minerva/messages"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["code"], 500);
    }
}
