//! Cross-cutting HTTP layers: request logging, security headers and the
//! shared rate limiter.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Request, State};
use axum::http::{header, HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{info, warn};

use super::limiter::RateLimiter;
use crate::error::AppError;
use crate::identity::SessionContext;

/// Seeds the request's `SessionContext` with a fresh request id and logs the
/// outcome once the response is ready.
pub async fn request_log(mut req: Request, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4().simple().to_string();
    let method = req.method().clone();
    let uri = req.uri().clone();
    req.extensions_mut().insert(SessionContext::with_request_id(request_id.clone()));
    let started = Instant::now();
    let mut resp = next.run(req).await;
    let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
    info!(
        target: "http",
        request_id = %request_id,
        method = %method,
        uri = %uri,
        status = resp.status().as_u16(),
        latency_ms,
        "request"
    );
    if let Ok(v) = HeaderValue::from_str(&request_id) {
        resp.headers_mut().insert(HeaderName::from_static("x-request-id"), v);
    }
    resp
}

const SECURITY_HEADERS: [(HeaderName, &str); 5] = [
    (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
    (header::X_FRAME_OPTIONS, "DENY"),
    (header::X_XSS_PROTECTION, "1; mode=block"),
    (header::STRICT_TRANSPORT_SECURITY, "max-age=63072000; includeSubDomains"),
    (header::CONTENT_SECURITY_POLICY, "default-src 'self'"),
];

pub async fn security_headers(req: Request, next: Next) -> Response {
    let mut resp = next.run(req).await;
    let headers = resp.headers_mut();
    for (name, value) in SECURITY_HEADERS {
        headers.insert(name, HeaderValue::from_static(value));
    }
    resp
}

pub async fn rate_limit(State(limiter): State<Arc<RateLimiter>>, req: Request, next: Next) -> Response {
    if limiter.allow() {
        return next.run(req).await;
    }
    warn!(target: "http", uri = %req.uri(), "rate limit exceeded");
    let mut resp = AppError::rate_limited("rate_limited", "rate limit exceeded").into_response();
    let secs = limiter.retry_after().as_secs().max(1);
    if let Ok(v) = HeaderValue::from_str(&secs.to_string()) {
        resp.headers_mut().insert(header::RETRY_AFTER, v);
    }
    resp
}
