// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Login and Token Issuance
//!
//! Credentials are checked through a `CredentialVerifier`; a successful login
//! yields an HS256 JWT carrying the user's email and admin flag.

use crate::configs::{AuthConfigs, JwtConfigs};
use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, error, warn};

/// Errors raised by credential checks and token handling.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("token signing key is not configured")]
    MissingSigningKey,

    #[error("failure to sign token: {0}")]
    Signing(String),

    #[error("invalid token: {0}")]
    InvalidToken(String),
}

/// Claims supplied by the caller of [`issue_token`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginClaims {
    pub email: String,
    pub admin: bool,
}

/// Claims encoded in the token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub email: String,
    pub admin: bool,
    /// Expiration as a unix timestamp.
    pub exp: i64,
}

/// Signs `claims` with `signing_key`, expiring `expiry` from now.
pub fn issue_token(
    claims: &LoginClaims,
    signing_key: &[u8],
    expiry: Duration,
) -> Result<String, AuthError> {
    if signing_key.is_empty() {
        return Err(AuthError::MissingSigningKey);
    }

    let expiry = chrono::Duration::from_std(expiry)
        .map_err(|err| AuthError::Signing(err.to_string()))?;
    let claims = Claims {
        email: claims.email.clone(),
        admin: claims.admin,
        exp: (Utc::now() + expiry).timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(signing_key),
    )
    .map_err(|err| {
        error!(error = err.to_string(), "failure to sign token");
        AuthError::Signing(err.to_string())
    })
}

/// Checks signature and expiry of a token issued by [`issue_token`].
pub fn validate_token(token: &str, signing_key: &[u8]) -> Result<Claims, AuthError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(signing_key),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|err| AuthError::InvalidToken(err.to_string()))
}

/// Verifies a user's credentials.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify(&self, email: &str, password: &str) -> Result<(), AuthError>;
}

/// Verifier backed by the `auth.users` configuration map.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    users: HashMap<String, String>,
}

impl StaticCredentials {
    pub fn new(users: HashMap<String, String>) -> Self {
        StaticCredentials { users }
    }

    pub fn from_configs(cfg: &AuthConfigs) -> Self {
        StaticCredentials::new(cfg.users.clone())
    }
}

#[async_trait]
impl CredentialVerifier for StaticCredentials {
    async fn verify(&self, email: &str, password: &str) -> Result<(), AuthError> {
        if email.is_empty() || password.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }

        match self.users.get(email) {
            Some(expected) if expected == password => Ok(()),
            _ => Err(AuthError::InvalidCredentials),
        }
    }
}

/// Login flow: verify credentials, then issue a token.
#[derive(Clone)]
pub struct AuthService {
    verifier: Arc<dyn CredentialVerifier>,
    signing_key: Arc<[u8]>,
    expiry: Duration,
}

impl AuthService {
    pub fn new(
        verifier: Arc<dyn CredentialVerifier>,
        signing_key: &[u8],
        expiry: Duration,
    ) -> Self {
        AuthService {
            verifier,
            signing_key: Arc::from(signing_key),
            expiry,
        }
    }

    pub fn from_configs(jwt: &JwtConfigs, auth: &AuthConfigs) -> Self {
        AuthService::new(
            Arc::new(StaticCredentials::from_configs(auth)),
            jwt.key.as_bytes(),
            jwt.expire(),
        )
    }

    /// Returns a signed token for valid credentials.
    pub async fn login(&self, email: &str, password: &str) -> Result<String, AuthError> {
        if let Err(err) = self.verifier.verify(email, password).await {
            warn!(email = email, error = err.to_string(), "login rejected");
            return Err(err);
        }

        let token = issue_token(
            &LoginClaims {
                email: email.to_owned(),
                admin: true,
            },
            &self.signing_key,
            self.expiry,
        )?;

        debug!(email = email, "token issued");
        Ok(token)
    }

    pub fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        validate_token(token, &self.signing_key)
    }
}
