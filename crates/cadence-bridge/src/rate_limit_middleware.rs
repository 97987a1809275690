//! Rate limiting middleware for the HTTP API: a [`tower::Layer`] wrapping
//! [`cadence_harness::rate_limiter::RateLimiter`], keyed by client IP.
//!
//! Client IP is taken from `X-Forwarded-For` (first entry) or
//! `X-Real-IP`, falling back to `"unknown"` so an unidentifiable caller
//! still shares one bucket rather than bypassing the limit entirely.
//! A rejected request never reaches the inner service — it gets a
//! `CoreError::RateLimit` turned into a 429 by [`crate::api_error::ApiError`].

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::{body::Body, extract::Request, http::Response, response::IntoResponse};
use cadence_core::error::CoreError;
use cadence_harness::rate_limiter::{RateLimitError, RateLimiter};
use tower::{Layer, Service};
use tracing::warn;

use crate::api_error::ApiError;

#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: Arc<RateLimiter>,
}

impl RateLimitLayer {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitMiddleware {
            inner,
            limiter: self.limiter.clone(),
        }
    }
}

#[derive(Clone)]
pub struct RateLimitMiddleware<S> {
    inner: S,
    limiter: Arc<RateLimiter>,
}

impl<S> Service<Request<Body>> for RateLimitMiddleware<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future =
        std::pin::Pin<Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let limiter = self.limiter.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let client_ip = client_ip(&req);

            match limiter.check(&client_ip) {
                Ok(()) => inner.call(req).await,
                Err(RateLimitError::Exceeded { key, retry_after }) => {
                    warn!(client_ip = %key, "rate limit exceeded");
                    let err = CoreError::RateLimit {
                        retry_after_secs: retry_after.as_secs().max(1),
                    };
                    Ok(ApiError::from(err).into_response())
                }
            }
        })
    }
}

fn client_ip(req: &Request<Body>) -> String {
    req.headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .or_else(|| {
            req.headers()
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use axum::Router;
    use cadence_harness::rate_limiter::RateLimitConfig;
    use tower::ServiceExt;

    fn test_router(limiter: Arc<RateLimiter>) -> Router {
        Router::new()
            .route("/ping", get(|| async { "pong" }))
            .layer(RateLimitLayer::new(limiter))
    }

    #[tokio::test]
    async fn allows_requests_within_limit() {
        let limiter = Arc::new(RateLimiter::new(RateLimitConfig::requests_per_minute(100)));
        let app = test_router(limiter);

        let req = Request::builder().uri("/ping").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), axum::http::StatusCode::OK);
    }

    #[tokio::test]
    async fn rejects_requests_exceeding_limit() {
        let limiter = Arc::new(RateLimiter::new(RateLimitConfig::requests_per_minute(1)));
        let app = test_router(limiter);

        let req = Request::builder()
            .uri("/ping")
            .header("x-forwarded-for", "203.0.113.5")
            .body(Body::empty())
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), axum::http::StatusCode::OK);

        let req = Request::builder()
            .uri("/ping")
            .header("x-forwarded-for", "203.0.113.5")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), axum::http::StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn distinct_client_ips_get_separate_buckets() {
        let limiter = Arc::new(RateLimiter::new(RateLimitConfig::requests_per_minute(1)));
        let app = test_router(limiter);

        let req = Request::builder()
            .uri("/ping")
            .header("x-forwarded-for", "203.0.113.10")
            .body(Body::empty())
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), axum::http::StatusCode::OK);

        let req = Request::builder()
            .uri("/ping")
            .header("x-forwarded-for", "203.0.113.11")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), axum::http::StatusCode::OK);
    }
}
