use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use tracing::error;

use super::principal::Identity;
use crate::error::{AppError, INTERNAL_MESSAGE};

/// Per-request slot for the resolved identity. The request logger seeds it
/// with a request id; the auth gate fills in the identity.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    identity: Option<Identity>,
    pub request_id: Option<String>,
}

/// Outcome of writing an identity into the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attach {
    Attached,
    Replaced,
    Unchanged,
}

impl SessionContext {
    pub fn with_request_id(request_id: impl Into<String>) -> Self {
        Self { identity: None, request_id: Some(request_id.into()) }
    }

    /// Same identity (by id) is a no-op; a different one replaces the old.
    pub fn attach(&mut self, identity: Identity) -> Attach {
        match &self.identity {
            Some(current) if current.id == identity.id => Attach::Unchanged,
            Some(_) => {
                self.identity = Some(identity);
                Attach::Replaced
            }
            None => {
                self.identity = Some(identity);
                Attach::Attached
            }
        }
    }

    pub fn identity(&self) -> Option<&Identity> { self.identity.as_ref() }

    pub fn is_authenticated(&self) -> bool { self.identity.is_some() }

    /// Clear the slot, returning what it held.
    pub fn take(&mut self) -> Option<Identity> { self.identity.take() }
}

/// Extractor for the identity the auth gate attached. Only mount handlers
/// using it behind a gate; a missing identity is a wiring bug and answers 500.
#[derive(Debug, Clone)]
pub struct Me(pub Identity);

impl<S: Send + Sync> FromRequestParts<S> for Me {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<SessionContext>().and_then(|ctx| ctx.identity()) {
            Some(identity) => Ok(Me(identity.clone())),
            None => {
                error!(target: "auth", path = %parts.uri.path(), "handler reached without an authenticated session context");
                Err(AppError::internal("missing_session", INTERNAL_MESSAGE))
            }
        }
    }
}
