//! Per-address request budget for the public generation endpoint.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::Json;
use axum::extract::{Request, State};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::warn;

use super::AppState;
use super::extract::ClientAddr;

pub const LIMIT_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const REMAINING_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

/// Outcome of counting one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed { remaining: u32 },
    Limited,
}

#[derive(Debug)]
struct Window {
    /// Last counted request; the window runs `window` from here.
    refreshed: Instant,
    count: u32,
}

#[derive(Debug)]
struct Hits {
    windows: HashMap<String, Window>,
    swept: Instant,
}

/// Request counter keyed by client address.
///
/// Every counted request restarts its address's window, so the budget
/// recovers only after `window` without an allowed request. Rejected
/// requests do not extend it. Idle addresses are swept at most once per
/// `window`.
#[derive(Debug)]
pub struct RateLimiter {
    max: u32,
    window: Duration,
    hits: Mutex<Hits>,
}

impl RateLimiter {
    pub const DEFAULT_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

    pub fn new(max: u32) -> Self {
        Self::with_window(max, Self::DEFAULT_WINDOW)
    }

    pub fn with_window(max: u32, window: Duration) -> Self {
        Self {
            max,
            window,
            hits: Mutex::new(Hits {
                windows: HashMap::new(),
                swept: Instant::now(),
            }),
        }
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    fn expired(&self, window: &Window, now: Instant) -> bool {
        now.duration_since(window.refreshed) >= self.window
    }

    /// Count a request from `key` at `now`.
    pub fn check(&self, key: &str, now: Instant) -> Decision {
        let mut hits = self.hits.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if now.duration_since(hits.swept) >= self.window {
            hits.windows.retain(|_, w| !self.expired(w, now));
            hits.swept = now;
        }

        let window = hits.windows.entry(key.to_string()).or_insert(Window {
            refreshed: now,
            count: 0,
        });
        if self.expired(window, now) {
            window.count = 0;
        }
        if window.count >= self.max {
            return Decision::Limited;
        }
        window.count += 1;
        window.refreshed = now;
        Decision::Allowed {
            remaining: self.max - window.count,
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.hits.lock().unwrap().windows.len()
    }
}

/// Middleware: reject over-budget addresses with 429, annotate the rest.
pub async fn limit_by_address(
    State(state): State<AppState>,
    client: ClientAddr,
    request: Request,
    next: Next,
) -> Response {
    let limiter = &state.limiter;
    match limiter.check(&client.0, Instant::now()) {
        Decision::Limited => {
            warn!(client = %client, max = limiter.max(), "Rate limit exceeded");
            (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({
                    "message": format!(
                        "Too many requests. Maximum {} attempts allowed per IP address.",
                        limiter.max()
                    ),
                    "remaining": 0,
                })),
            )
                .into_response()
        }
        Decision::Allowed { remaining } => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert(LIMIT_HEADER, HeaderValue::from(limiter.max()));
            headers.insert(REMAINING_HEADER, HeaderValue::from(remaining));
            response
        }
    }
}
