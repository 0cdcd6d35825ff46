//! Stand-alone content generation: `/content/generate` (public, rate limited)
//! and `/content/generate-unlimited` (bearer token).

use axum::extract::State;
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use super::AppState;
use super::extract::{AuthUser, ClientAddr, ValidJson};
use super::rate_limit::limit_by_address;
use super::response::ApiError;
use crate::error::ServiceError;
use crate::generation::GenerationRequest;
use crate::validation::Validator;

#[derive(Debug, Deserialize)]
struct GenerateBody {
    details: Option<String>,
    theme: Option<String>,
    platform: Option<String>,
}

impl GenerateBody {
    fn validate(self) -> Result<GenerationRequest, ServiceError> {
        let mut v = Validator::new();
        let details = v.required("details", self.details.as_deref()).to_string();
        let theme = v.required("theme", self.theme.as_deref()).to_string();
        let platform = v.required("platform", self.platform.as_deref()).to_string();
        v.finish()?;
        Ok(GenerationRequest {
            details,
            theme,
            platform,
        })
    }
}

async fn run(
    state: &AppState,
    client: &ClientAddr,
    body: GenerateBody,
) -> Result<Json<Value>, ApiError> {
    let request = body.validate().map_err(|e| state.reject(e, client))?;
    let (status, data) = state
        .generator
        .generate(&request)
        .await
        .into_result()
        .map_err(|e| state.reject(e, client))?;
    debug!(client = %client, platform = %request.platform, "Content generated");
    Ok(Json(json!({
        "success": true,
        "data": data,
        "status": status,
    })))
}

/// POST /content/generate
async fn generate(
    State(state): State<AppState>,
    client: ClientAddr,
    ValidJson(body): ValidJson<GenerateBody>,
) -> Result<impl IntoResponse, ApiError> {
    run(&state, &client, body).await
}

/// POST /content/generate-unlimited
async fn generate_unlimited(
    State(state): State<AppState>,
    client: ClientAddr,
    _auth: AuthUser,
    ValidJson(body): ValidJson<GenerateBody>,
) -> Result<impl IntoResponse, ApiError> {
    run(&state, &client, body).await
}

pub fn content_routes(state: AppState) -> Router<AppState> {
    let limited = Router::new()
        .route("/content/generate", post(generate))
        .route_layer(middleware::from_fn_with_state(state, limit_by_address));

    Router::new()
        .route("/content/generate-unlimited", post(generate_unlimited))
        .merge(limited)
}
