//! Request extractors: JSON bodies, bearer identities, client address.

use std::net::SocketAddr;

use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, FromRequest, FromRequestParts, Request};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::Json;
use serde::de::DeserializeOwned;

use super::AppState;
use super::response::ApiError;
use crate::auth::model::User;
use crate::conversations::Caller;
use crate::error::ServiceError;

/// `Json<T>` whose rejection is a 422 on field `body` instead of axum's
/// plain-text error.
#[derive(Debug)]
pub struct ValidJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(json_rejection(rejection).into()),
        }
    }
}

fn json_rejection(rejection: JsonRejection) -> ServiceError {
    ServiceError::invalid("body", rejection.body_text())
}

/// Source address of the connection, or `unknown` when the server was not
/// started with connect info.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAddr(pub String);

impl std::fmt::Display for ClientAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<S: Send + Sync> FromRequestParts<S> for ClientAddr {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let addr = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        Ok(Self(addr))
    }
}

/// Secret from `Authorization: Bearer <secret>`, if the header is present.
///
/// A present header that is not a bearer credential counts as an invalid
/// token rather than a missing one.
fn bearer_secret(parts: &Parts) -> Option<Result<String, ServiceError>> {
    let value = parts.headers.get(AUTHORIZATION)?;
    let secret = value
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    Some(secret.ok_or(ServiceError::Unauthenticated))
}

/// An authenticated user and the token they presented.
#[derive(Debug)]
pub struct AuthUser {
    pub user: User,
    pub token: String,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_secret(parts).unwrap_or(Err(ServiceError::Unauthenticated))?;
        let user = state.auth.authenticate(&token).await.map_err(|e| state.error(e))?;
        Ok(Self { user, token })
    }
}

/// Identity for conversation routes.
///
/// With anonymous access enabled, a request without an `Authorization`
/// header is the anonymous caller. A bad token is always rejected.
#[derive(Debug)]
pub struct ConversationCaller(pub Caller);

impl FromRequestParts<AppState> for ConversationCaller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = match bearer_secret(parts) {
            Some(token) => token?,
            None if state.allow_anonymous => return Ok(Self(Caller::Anonymous)),
            None => return Err(ServiceError::Unauthenticated.into()),
        };
        let user = state.auth.authenticate(&token).await.map_err(|e| state.error(e))?;
        Ok(Self(Caller::User(user.id)))
    }
}
