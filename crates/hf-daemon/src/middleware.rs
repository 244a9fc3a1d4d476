//! Middleware stack for the REST surface: request id, request logging,
//! rate limiting, CORS, and API key auth (spec.md §6).

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use hf_core::EventId;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tracing::info;

use crate::AppState;

/// A unique per-request identifier, carried as an Axum extension and
/// echoed as the `X-Request-Id` response header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestId(pub EventId);

pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let id = RequestId(EventId::new());
    req.extensions_mut().insert(id);
    let mut resp = next.run(req).await;
    resp.headers_mut()
        .insert("x-request-id", HeaderValue::from_str(&id.0.to_string()).unwrap());
    resp
}

pub struct RequestLogger;

impl RequestLogger {
    pub async fn layer(req: Request, next: Next) -> Response {
        let method = req.method().clone();
        let path = req.uri().path().to_owned();
        let start = Instant::now();

        let resp = next.run(req).await;

        let duration = start.elapsed();
        info!(
            http.method = %method,
            http.path = %path,
            http.status = resp.status().as_u16(),
            http.duration_ms = duration.as_millis() as u64,
            "request completed"
        );
        resp
    }
}

/// Shared-secret auth over `X-API-Key` or `Authorization: Bearer` (spec.md
/// §6). Disabled when `state.config.api_key` is `None`. `/health`, `/docs`,
/// and `/openapi.json` are always excluded.
pub async fn api_key_auth(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    const EXCLUDED: &[&str] = &["/health", "/docs", "/openapi.json"];

    let Some(expected) = state.config.api_key.as_deref() else {
        return next.run(req).await;
    };
    if EXCLUDED.contains(&req.uri().path()) {
        return next.run(req).await;
    }

    let provided = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| {
            req.headers()
                .get(axum::http::header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(str::to_string)
        });

    match provided {
        Some(key) if key == expected => next.run(req).await,
        _ => (StatusCode::UNAUTHORIZED, axum::Json(serde_json::json!({"detail": "invalid or missing API key"})))
            .into_response(),
    }
}

/// In-memory sliding-window limiter over the whole REST surface (distinct
/// from the per-provider token-bucket limiter in `hf-ratelimit`, which
/// governs outbound LLM calls, not inbound HTTP traffic).
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Mutex<VecDeque<Instant>>>,
    max_requests: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        RateLimiter { inner: Arc::new(Mutex::new(VecDeque::new())), max_requests, window }
    }

    pub async fn check(&self) -> Result<(), StatusCode> {
        let now = Instant::now();
        let mut timestamps = self.inner.lock().await;
        while let Some(&front) = timestamps.front() {
            if now.duration_since(front) > self.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }
        if timestamps.len() as u32 >= self.max_requests {
            return Err(StatusCode::TOO_MANY_REQUESTS);
        }
        timestamps.push_back(now);
        Ok(())
    }

    pub fn into_layer(self) -> RateLimiterLayer {
        RateLimiterLayer(self)
    }
}

#[derive(Clone)]
pub struct RateLimiterLayer(RateLimiter);

impl<S: Clone> tower::Layer<S> for RateLimiterLayer {
    type Service = RateLimiterService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimiterService { limiter: self.0.clone(), inner }
    }
}

#[derive(Clone)]
pub struct RateLimiterService<S> {
    limiter: RateLimiter,
    inner: S,
}

impl<S> tower::Service<Request<Body>> for RateLimiterService<S>
where
    S: tower::Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: IntoResponse,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<Box<dyn std::future::Future<Output = Result<Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut std::task::Context<'_>) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let limiter = self.limiter.clone();
        let mut inner = self.inner.clone();
        Box::pin(async move {
            if let Err(status) = limiter.check().await {
                return Ok((status, "too many requests").into_response());
            }
            inner.call(req).await
        })
    }
}

/// Restrictive by default: no wildcard origins, explicit method list
/// (spec.md §6 "CORS default").
#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        CorsConfig {
            allowed_origins: Vec::new(),
            allowed_methods: vec!["GET".to_string(), "POST".to_string()],
            allowed_headers: vec!["content-type".to_string(), "x-api-key".to_string()],
        }
    }
}

impl CorsConfig {
    pub fn to_cors_layer(&self) -> CorsLayer {
        let origins: Vec<HeaderValue> = self.allowed_origins.iter().filter_map(|o| HeaderValue::from_str(o).ok()).collect();
        let methods: Vec<axum::http::Method> = self.allowed_methods.iter().filter_map(|m| m.parse().ok()).collect();
        let headers: Vec<axum::http::HeaderName> = self.allowed_headers.iter().filter_map(|h| h.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(AllowMethods::list(methods))
            .allow_headers(AllowHeaders::list(headers))
            .allow_credentials(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rate_limiter_rejects_beyond_the_window_budget() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        assert!(limiter.check().await.is_ok());
        assert!(limiter.check().await.is_ok());
        assert_eq!(limiter.check().await, Err(StatusCode::TOO_MANY_REQUESTS));
    }

    #[tokio::test]
    async fn rate_limiter_recovers_once_the_window_elapses() {
        let limiter = RateLimiter::new(1, Duration::from_millis(20));
        assert!(limiter.check().await.is_ok());
        assert_eq!(limiter.check().await, Err(StatusCode::TOO_MANY_REQUESTS));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(limiter.check().await.is_ok());
    }
}
