//! Outbound content generation.
//!
//! One POST to a configured webhook turns `{details, theme, platform}` into
//! opaque JSON. Every outcome comes back as a [`GenerationResult`]; the
//! client never fails past this boundary and never touches storage.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::config::GenerationConfig;
use crate::error::ServiceError;

/// Parameters of a generation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub details: String,
    pub theme: String,
    pub platform: String,
}

/// Outcome of a generation call.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationResult {
    /// 2xx response; `body` is `null` if it was not JSON.
    Success { status: u16, body: Value },
    /// Non-2xx response, body kept verbatim.
    HttpFailure { status: u16, body: String },
    /// Timeout, refused connection, or a body that could not be read.
    ConnectionFailure { cause: String },
}

impl GenerationResult {
    /// Status and payload of a success, or the failure callers report.
    pub fn into_result(self) -> Result<(u16, Value), ServiceError> {
        match self {
            Self::Success { status, body } => Ok((status, body)),
            Self::HttpFailure { status, body } => {
                Err(ServiceError::UpstreamHttpFailure { status, body })
            }
            Self::ConnectionFailure { cause } => {
                Err(ServiceError::UpstreamUnreachable { reason: cause })
            }
        }
    }
}

/// Something that can generate content.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Run one generation. At most once per call; no retries.
    async fn generate(&self, request: &GenerationRequest) -> GenerationResult;
}

/// [`ContentGenerator`] backed by the configured webhook.
pub struct WebhookGenerator {
    client: reqwest::Client,
    url: Url,
}

impl WebhookGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            url: config.webhook_url.clone(),
        })
    }

    /// Build as a shared trait object.
    pub fn shared(config: &GenerationConfig) -> Result<Arc<dyn ContentGenerator>, reqwest::Error> {
        Ok(Arc::new(Self::new(config)?))
    }
}

#[async_trait]
impl ContentGenerator for WebhookGenerator {
    async fn generate(&self, request: &GenerationRequest) -> GenerationResult {
        let resp = match self.client.post(self.url.clone()).json(request).send().await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!(url = %self.url, error = %e, "Generation webhook unreachable");
                return GenerationResult::ConnectionFailure {
                    cause: e.to_string(),
                };
            }
        };

        let status = resp.status();
        let text = match resp.text().await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(url = %self.url, error = %e, "Generation webhook body unreadable");
                return GenerationResult::ConnectionFailure {
                    cause: e.to_string(),
                };
            }
        };

        if status.is_success() {
            let body = serde_json::from_str(&text).unwrap_or(Value::Null);
            tracing::debug!(status = status.as_u16(), "Generation succeeded");
            GenerationResult::Success {
                status: status.as_u16(),
                body,
            }
        } else {
            tracing::debug!(status = status.as_u16(), "Generation webhook returned failure");
            GenerationResult::HttpFailure {
                status: status.as_u16(),
                body: text,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::Json;
    use serde_json::json;
    use tokio::net::TcpListener;

    use super::*;

    async fn serve(app: Router) -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Url::parse(&format!("http://127.0.0.1:{port}/hook")).unwrap()
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            details: "spring launch".into(),
            theme: "playful".into(),
            platform: "instagram".into(),
        }
    }

    #[tokio::test]
    async fn success_returns_json_body_and_forwards_parameters() {
        let app = Router::new().route(
            "/hook",
            post(|Json(body): Json<GenerationRequest>| async move {
                Json(json!({"echo": body.details, "platform": body.platform}))
            }),
        );
        let url = serve(app).await;
        let generator = WebhookGenerator::new(&GenerationConfig::new(url)).unwrap();

        let result = generator.generate(&request()).await;
        assert_eq!(
            result,
            GenerationResult::Success {
                status: 200,
                body: json!({"echo": "spring launch", "platform": "instagram"}),
            }
        );
    }

    #[tokio::test]
    async fn non_json_success_body_is_null() {
        let app = Router::new().route("/hook", post(|| async { "plain text" }));
        let url = serve(app).await;
        let generator = WebhookGenerator::new(&GenerationConfig::new(url)).unwrap();

        match generator.generate(&request()).await {
            GenerationResult::Success { status, body } => {
                assert_eq!(status, 200);
                assert!(body.is_null());
            }
            other => panic!("expected Success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn error_status_is_http_failure_with_raw_body() {
        let app = Router::new().route(
            "/hook",
            post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "overloaded") }),
        );
        let url = serve(app).await;
        let generator = WebhookGenerator::new(&GenerationConfig::new(url)).unwrap();

        assert_eq!(
            generator.generate(&request()).await,
            GenerationResult::HttpFailure {
                status: 503,
                body: "overloaded".into(),
            }
        );
    }

    #[tokio::test]
    async fn refused_connection_is_connection_failure() {
        // Bind then drop to get a port nobody listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let url = Url::parse(&format!("http://127.0.0.1:{port}/hook")).unwrap();
        let generator = WebhookGenerator::new(&GenerationConfig::new(url)).unwrap();
        let result = generator.generate(&request()).await;
        assert!(matches!(result, GenerationResult::ConnectionFailure { .. }));
        assert!(matches!(
            result.into_result(),
            Err(ServiceError::UpstreamUnreachable { .. })
        ));
    }

    #[tokio::test]
    async fn timeout_is_connection_failure() {
        let app = Router::new().route(
            "/hook",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({}))
            }),
        );
        let url = serve(app).await;
        let config = GenerationConfig {
            webhook_url: url,
            timeout: Duration::from_millis(200),
        };
        let generator = WebhookGenerator::new(&config).unwrap();

        let result = generator.generate(&request()).await;
        assert!(matches!(result, GenerationResult::ConnectionFailure { .. }));
    }
}
