use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use tokio::time::Instant;

const WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug)]
struct Window {
    start: Instant,
    count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Allowed,
    Limited { retry_after: Duration },
}

/// Fixed one-second windows for the unauthenticated relay routes, one per
/// request path so a burst on one route does not starve the other.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    rps: u32,
    windows: Arc<Mutex<HashMap<String, Window>>>,
}

impl RateLimiter {
    pub fn new(rps: u32) -> Self {
        Self {
            rps: rps.max(1),
            windows: Arc::default(),
        }
    }

    fn admit(&self, path: &str) -> Admission {
        let mut windows = self.windows.lock().unwrap_or_else(|p| p.into_inner());
        let now = Instant::now();
        let window = windows.entry(path.to_string()).or_insert(Window {
            start: now,
            count: 0,
        });
        let elapsed = now.duration_since(window.start);
        if elapsed >= WINDOW {
            window.start = now;
            window.count = 0;
        }
        if window.count < self.rps {
            window.count += 1;
            Admission::Allowed
        } else {
            Admission::Limited {
                retry_after: WINDOW.saturating_sub(now.duration_since(window.start)),
            }
        }
    }
}

pub async fn rps_middleware(
    State(limiter): State<RateLimiter>,
    req: Request<Body>,
    next: Next,
) -> Response {
    match limiter.admit(req.uri().path()) {
        Admission::Allowed => next.run(req).await,
        Admission::Limited { retry_after } => {
            tracing::debug!(path = %req.uri().path(), "Relay rate limit exceeded");
            // Retry-After is whole seconds.
            let secs = retry_after.as_secs_f64().ceil().max(1.0) as u64;
            (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, secs.to_string())],
                Json(json!({ "error": "rate_limit_exceeded" })),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Router};
    use tower::ServiceExt;

    #[tokio::test(start_paused = true)]
    async fn each_path_gets_its_own_window() {
        let limiter = RateLimiter::new(2);
        assert_eq!(limiter.admit("/api/submit-audio"), Admission::Allowed);
        assert_eq!(limiter.admit("/api/submit-audio"), Admission::Allowed);
        assert!(matches!(
            limiter.admit("/api/submit-audio"),
            Admission::Limited { .. }
        ));
        assert_eq!(limiter.admit("/api/connection-details"), Admission::Allowed);

        tokio::time::advance(Duration::from_millis(400)).await;
        assert_eq!(
            limiter.admit("/api/submit-audio"),
            Admission::Limited {
                retry_after: Duration::from_millis(600)
            }
        );

        tokio::time::advance(Duration::from_millis(600)).await;
        assert_eq!(limiter.admit("/api/submit-audio"), Admission::Allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_rps_still_admits_one() {
        let limiter = RateLimiter::new(0);
        assert_eq!(limiter.admit("/"), Admission::Allowed);
        assert!(matches!(limiter.admit("/"), Admission::Limited { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn limited_request_gets_retry_after() {
        let app = Router::new()
            .route("/api/submit-audio", get(|| async { "ok" }))
            .layer(axum::middleware::from_fn_with_state(
                RateLimiter::new(1),
                rps_middleware,
            ));
        let request = || {
            Request::builder()
                .uri("/api/submit-audio")
                .body(Body::empty())
                .unwrap()
        };

        let resp = app.clone().oneshot(request()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app.oneshot(request()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(resp.headers()[header::RETRY_AFTER], "1");
    }
}
