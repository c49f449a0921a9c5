//! Bearer-token sessions.
//!
//! A `Session` is resolved per request from the `Authorization` header and
//! handed to handlers as an extractor; nothing about the caller is kept in
//! process-wide state.

use crate::{
    backend::AppointmentBackend,
    error::ApiError,
    http::AppState,
    types::{Appointment, Role, User},
};
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct SessionKeys {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_duration: Duration,
}

impl SessionKeys {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            token_duration: Duration::days(7),
        }
    }

    pub fn issue(&self, user: &User) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id,
            iat: now.timestamp(),
            exp: (now + self.token_duration).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding_key)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        decode::<Claims>(token, &self.decoding_key, &Validation::default()).map(|data| data.claims)
    }
}

/// The authenticated caller of a request.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: User,
}

impl Session {
    pub fn is_admin(&self) -> bool {
        self.user.role == Role::Admin
    }

    pub fn can_access(&self, appointment: &Appointment) -> bool {
        self.is_admin() || appointment.is_participant(self.user.id)
    }
}

impl<T: AppointmentBackend> FromRequestParts<AppState<T>> for Session {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState<T>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| ApiError::Unauthorized("Access denied. No token provided.".into()))?;

        let claims = state.sessions.verify(token).map_err(|err| {
            warn!(?err, "Token verification failed");
            ApiError::Unauthorized("Token is not valid.".into())
        })?;

        let user = state
            .backend
            .user(claims.sub)?
            .ok_or_else(|| ApiError::Unauthorized("Token is not valid. User not found.".into()))?;
        if !user.is_active {
            return Err(ApiError::Unauthorized("Account is deactivated.".into()));
        }

        Ok(Session { user })
    }
}
