//! HTTP API: router, shared state, and server entry point.

pub mod auth;
pub mod content;
pub mod conversations;
pub mod extract;
pub mod rate_limit;
pub mod response;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::auth::AuthService;
use crate::config::ServerConfig;
use crate::conversations::ConversationService;
use crate::error::ServiceError;
use crate::generation::ContentGenerator;
use crate::store::Store;
use extract::ClientAddr;
use rate_limit::RateLimiter;
use response::ApiError;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub conversations: Arc<ConversationService>,
    pub generator: Arc<dyn ContentGenerator>,
    pub limiter: Arc<RateLimiter>,
    /// Expose internal error detail in 500 responses.
    pub debug: bool,
    /// Serve conversation routes to callers without a token.
    pub allow_anonymous: bool,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        generator: Arc<dyn ContentGenerator>,
        config: &ServerConfig,
    ) -> Self {
        Self {
            auth: Arc::new(AuthService::new(store.clone(), config.bcrypt_cost)),
            conversations: Arc::new(ConversationService::new(store, generator.clone())),
            generator,
            limiter: Arc::new(RateLimiter::new(config.rate_limit_max)),
            debug: config.debug,
            allow_anonymous: config.allow_anonymous,
        }
    }

    /// Wrap a failure for the response without logging it.
    pub fn error(&self, error: ServiceError) -> ApiError {
        ApiError::new(error, self.debug)
    }

    /// Log a failed request and wrap it for the response.
    pub fn reject(&self, error: ServiceError, client: &ClientAddr) -> ApiError {
        match &error {
            e if e.is_expected() => debug!(client = %client, error = %e, "Request rejected"),
            ServiceError::Forbidden { entity, id } => {
                warn!(client = %client, entity, id = %id, "Access denied")
            }
            ServiceError::UpstreamHttpFailure { status, body } => {
                error!(client = %client, status, body = %body, "Content generation failed")
            }
            ServiceError::UpstreamUnreachable { reason } => {
                error!(client = %client, error = %reason, "Content generation service unreachable")
            }
            e => error!(client = %client, error = %e, "Request failed"),
        }
        self.error(error)
    }
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Build the full router with CORS and request tracing.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .merge(auth::auth_routes())
        .merge(content::content_routes(state.clone()))
        .merge(conversations::conversation_routes())
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
}

/// Serve `state` on `listener` until `shutdown` completes.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!("Content desk listening on http://{}", addr);

    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}
