//! Auth gate: pulls a bearer credential off the request, validates it for one
//! token flavor, and attaches the identity to the request's `SessionContext`.
//! Any failure short-circuits with the generic 401; the reason is only logged.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{debug, warn};

use super::principal::Identity;
use super::request_context::{Attach, SessionContext};
use super::tokens::{Flavor, TokenService};
use crate::error::{AppError, AuthError};

const BEARER_PREFIX: &str = "Bearer ";

pub(crate) fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    for cookie in headers.get_all(axum::http::header::COOKIE) {
        let Ok(s) = cookie.to_str() else { continue };
        for part in s.split(';') {
            let p = part.trim();
            if let Some((k, v)) = p.split_once('=') {
                if k == name { return Some(v.to_string()); }
            }
        }
    }
    None
}

/// Authorization header first; the flavor's cookie only when no header (or
/// a blank one) was sent. A header with another scheme does not fall back to
/// the cookie.
pub fn extract_credential(headers: &HeaderMap, flavor: Flavor) -> Result<String, AuthError> {
    let header = headers.get(axum::http::header::AUTHORIZATION).filter(|v| !v.as_bytes().trim_ascii().is_empty());
    if let Some(value) = header {
        let raw = value.to_str().map_err(|_| AuthError::CredentialMissing)?;
        let token = raw.strip_prefix(BEARER_PREFIX).ok_or(AuthError::CredentialMissing)?.trim();
        if token.is_empty() {
            return Err(AuthError::CredentialMissing);
        }
        return Ok(token.to_string());
    }
    match parse_cookie(headers, flavor.cookie_name()) {
        Some(token) if !token.is_empty() => Ok(token),
        _ => Err(AuthError::CredentialMissing),
    }
}

/// Extract and validate. The store lookup may block, so it runs off the
/// async worker.
pub async fn authorize(tokens: &Arc<TokenService>, flavor: Flavor, headers: &HeaderMap) -> Result<Identity, AuthError> {
    let token = extract_credential(headers, flavor)?;
    let service = Arc::clone(tokens);
    tokio::task::spawn_blocking(move || service.validate(&token, flavor))
        .await
        .map_err(|e| AuthError::StoreUnavailable(format!("validation task failed: {e}")))?
}

/// Gate for every protected endpoint except token refresh.
pub async fn require_access(State(tokens): State<Arc<TokenService>>, req: Request, next: Next) -> Response {
    gate(&tokens, Flavor::Access, req, next).await
}

/// Gate for the token refresh endpoint.
pub async fn require_refresh(State(tokens): State<Arc<TokenService>>, req: Request, next: Next) -> Response {
    gate(&tokens, Flavor::Refresh, req, next).await
}

async fn gate(tokens: &Arc<TokenService>, flavor: Flavor, mut req: Request, next: Next) -> Response {
    let identity = match authorize(tokens, flavor, req.headers()).await {
        Ok(identity) => identity,
        Err(err) => {
            warn!(
                target: "auth",
                flavor = flavor.label(),
                kind = err.kind(),
                path = %req.uri().path(),
                "rejected credential: {err}"
            );
            return AppError::from(err).into_response();
        }
    };
    let user = identity.id.clone();
    let outcome = match req.extensions_mut().get_mut::<SessionContext>() {
        Some(ctx) => ctx.attach(identity),
        None => {
            let mut ctx = SessionContext::default();
            let outcome = ctx.attach(identity);
            req.extensions_mut().insert(ctx);
            outcome
        }
    };
    if outcome != Attach::Unchanged {
        debug!(target: "auth", flavor = flavor.label(), user = %user, ?outcome, "session attached");
    }
    next.run(req).await
}
