//! Unified application error model and mapping helpers.
//! `AppError` is the only error that crosses the HTTP boundary. The internal
//! taxonomies (`AuthError`, `RealtimeError`, `StoreError`) are for logs and
//! tests; every auth failure collapses to one generic unauthorized response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Message every rejected credential gets, whatever the internal cause.
pub const UNAUTHORIZED_MESSAGE: &str = "unauthorized access";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    UserInput { code: String, message: String },
    NotFound { code: String, message: String },
    Conflict { code: String, message: String },
    Auth { code: String, message: String },
    Forbidden { code: String, message: String },
    RateLimited { code: String, message: String },
    Io { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::UserInput { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::Conflict { code, .. }
            | AppError::Auth { code, .. }
            | AppError::Forbidden { code, .. }
            | AppError::RateLimited { code, .. }
            | AppError::Io { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::UserInput { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::Conflict { message, .. }
            | AppError::Auth { message, .. }
            | AppError::Forbidden { message, .. }
            | AppError::RateLimited { message, .. }
            | AppError::Io { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn user<S: Into<String>>(code: S, msg: S) -> Self { AppError::UserInput { code: code.into(), message: msg.into() } }
    pub fn not_found<S: Into<String>>(code: S, msg: S) -> Self { AppError::NotFound { code: code.into(), message: msg.into() } }
    pub fn conflict<S: Into<String>>(code: S, msg: S) -> Self { AppError::Conflict { code: code.into(), message: msg.into() } }
    pub fn auth<S: Into<String>>(code: S, msg: S) -> Self { AppError::Auth { code: code.into(), message: msg.into() } }
    pub fn forbidden<S: Into<String>>(code: S, msg: S) -> Self { AppError::Forbidden { code: code.into(), message: msg.into() } }
    pub fn rate_limited<S: Into<String>>(code: S, msg: S) -> Self { AppError::RateLimited { code: code.into(), message: msg.into() } }
    pub fn io<S: Into<String>>(code: S, msg: S) -> Self { AppError::Io { code: code.into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// The single response used for every rejected credential.
    pub fn unauthorized() -> Self { AppError::auth("unauthorized", UNAUTHORIZED_MESSAGE) }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::UserInput { .. } => 400,
            AppError::NotFound { .. } => 404,
            AppError::Conflict { .. } => 409,
            AppError::Auth { .. } => 401,
            AppError::Forbidden { .. } => 403,
            AppError::RateLimited { .. } => 429,
            AppError::Io { .. } => 503,
            AppError::Internal { .. } => 500,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = serde_json::json!({
            "status": "error",
            "code": self.code_str(),
            "message": self.message(),
        });
        (status, Json(body)).into_response()
    }
}

/// Generic text for server faults; the cause goes to the log only.
pub const INTERNAL_MESSAGE: &str = "internal server error";

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!("internal error: {err:#}");
        AppError::internal("internal_error", INTERNAL_MESSAGE)
    }
}

/// Why a credential was refused. Never rendered to clients.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("no bearer credential in header or cookie")]
    CredentialMissing,
    #[error("token cannot be decoded: {0}")]
    MalformedToken(String),
    #[error("token signature does not verify")]
    SignatureMismatch,
    #[error("token declares unexpected signing algorithm {0}")]
    AlgorithmMismatch(String),
    #[error("token expired")]
    TokenExpired,
    #[error("no live identity matches token subject")]
    IdentityNotFound,
    #[error("identity store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("token signing failed: {0}")]
    SigningFailed(String),
}

impl AuthError {
    /// Short stable label for structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::CredentialMissing => "credential_missing",
            AuthError::MalformedToken(_) => "malformed_token",
            AuthError::SignatureMismatch => "signature_mismatch",
            AuthError::AlgorithmMismatch(_) => "algorithm_mismatch",
            AuthError::TokenExpired => "token_expired",
            AuthError::IdentityNotFound => "identity_not_found",
            AuthError::StoreUnavailable(_) => "store_unavailable",
            AuthError::SigningFailed(_) => "signing_failed",
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            // Issuance failures are server faults, not credential problems.
            AuthError::SigningFailed(msg) => {
                tracing::error!(target: "auth", "token signing failed: {msg}");
                AppError::internal("token_issue_failed", INTERNAL_MESSAGE)
            }
            _ => AppError::unauthorized(),
        }
    }
}

/// Local-only failures of the real-time side. Never fatal to the hub.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RealtimeError {
    #[error("origin {0:?} is not allowed")]
    OriginRejected(Option<String>),
    #[error("write to connection failed: {0}")]
    ConnectionWriteFailed(String),
}

/// Failures reported by the storage collaborators.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("record conflicts with an existing one: {0}")]
    Conflict(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => AppError::not_found("not_found", "record not found"),
            StoreError::Conflict(msg) => AppError::conflict("conflict".to_string(), msg),
            StoreError::Unavailable(msg) => {
                tracing::warn!("store unavailable: {msg}");
                AppError::io("store_unavailable", "service temporarily unavailable")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_mapping() {
        assert_eq!(AppError::user("bad_input", "oops").http_status(), 400);
        assert_eq!(AppError::not_found("not_found", "missing").http_status(), 404);
        assert_eq!(AppError::conflict("conflict", "dup").http_status(), 409);
        assert_eq!(AppError::auth("auth", "no").http_status(), 401);
        assert_eq!(AppError::forbidden("origin", "blocked").http_status(), 403);
        assert_eq!(AppError::rate_limited("rate_limited", "slow down").http_status(), 429);
        assert_eq!(AppError::io("io", "io").http_status(), 503);
        assert_eq!(AppError::internal("internal", "panic").http_status(), 500);
    }

    #[test]
    fn every_auth_failure_collapses_to_one_message() {
        let kinds = vec![
            AuthError::CredentialMissing,
            AuthError::MalformedToken("bad base64".into()),
            AuthError::SignatureMismatch,
            AuthError::AlgorithmMismatch("RS256".into()),
            AuthError::TokenExpired,
            AuthError::IdentityNotFound,
            AuthError::StoreUnavailable("down".into()),
        ];
        for kind in kinds {
            let app: AppError = kind.into();
            assert_eq!(app.http_status(), 401);
            assert_eq!(app.message(), UNAUTHORIZED_MESSAGE);
            assert_eq!(app.code_str(), "unauthorized");
        }
    }

    #[test]
    fn signing_failure_is_a_server_error() {
        let app: AppError = AuthError::SigningFailed("key".into()).into();
        assert_eq!(app.http_status(), 500);
        assert_eq!(app.message(), INTERNAL_MESSAGE);
    }

    #[test]
    fn internal_details_stay_out_of_the_body() {
        let err = anyhow::anyhow!("argon2: salt encoding failed").context("While hashing password");
        let app = AppError::from(err);
        assert_eq!(app.http_status(), 500);
        assert_eq!(app.message(), INTERNAL_MESSAGE);
        let app = AppError::from(StoreError::Unavailable("pool exhausted at 10.0.0.7".into()));
        assert!(!app.message().contains("10.0.0.7"));
    }

    #[test]
    fn store_errors_map_to_statuses() {
        assert_eq!(AppError::from(StoreError::NotFound).http_status(), 404);
        assert_eq!(AppError::from(StoreError::Conflict("email".into())).http_status(), 409);
        assert_eq!(AppError::from(StoreError::Unavailable("down".into())).http_status(), 503);
    }
}
