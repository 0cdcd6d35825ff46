//! Account endpoints under `/auth`.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use secrecy::SecretString;
use serde::Deserialize;
use serde_json::json;

use super::AppState;
use super::extract::{AuthUser, ClientAddr, ValidJson};
use super::response::ApiError;
use crate::auth::{Credentials, Registration, Session};

#[derive(Debug, Deserialize)]
struct RegisterBody {
    name: Option<String>,
    email: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginBody {
    email: Option<String>,
    password: Option<String>,
}

fn session_body(message: &str, session: Session) -> Json<serde_json::Value> {
    Json(json!({
        "message": message,
        "user": session.user,
        "access_token": session.access_token,
        "token_type": "Bearer",
    }))
}

/// POST /auth/register
async fn register(
    State(state): State<AppState>,
    client: ClientAddr,
    ValidJson(body): ValidJson<RegisterBody>,
) -> Result<impl IntoResponse, ApiError> {
    let form = Registration {
        name: body.name,
        email: body.email,
        password: body.password.map(SecretString::from),
    };
    let session = state
        .auth
        .register(form)
        .await
        .map_err(|e| state.reject(e, &client))?;
    Ok((
        StatusCode::CREATED,
        session_body("User registered successfully", session),
    ))
}

/// POST /auth/login
async fn login(
    State(state): State<AppState>,
    client: ClientAddr,
    ValidJson(body): ValidJson<LoginBody>,
) -> Result<impl IntoResponse, ApiError> {
    let form = Credentials {
        email: body.email,
        password: body.password.map(SecretString::from),
    };
    let session = state
        .auth
        .login(form)
        .await
        .map_err(|e| state.reject(e, &client))?;
    Ok(session_body("Login successful", session))
}

/// POST /auth/logout
async fn logout(
    State(state): State<AppState>,
    client: ClientAddr,
    auth: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    state
        .auth
        .logout(&auth.token)
        .await
        .map_err(|e| state.reject(e, &client))?;
    Ok(Json(json!({"message": "Logged out successfully"})))
}

/// GET /auth/me
async fn me(auth: AuthUser) -> impl IntoResponse {
    Json(json!({"user": auth.user}))
}

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
}
