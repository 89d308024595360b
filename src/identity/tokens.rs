//! Token service: issues access/refresh tokens and validates presented ones
//! against the codec, the clock and a live identity lookup.

use std::sync::Arc;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::clock::Clock;
use super::codec::{ClaimSet, CredentialCodec};
use super::principal::Identity;
use super::provider::IdentityStore;
use super::secrets::TokenSecrets;
use crate::error::{AuthError, StoreError};

pub const DEFAULT_ACCESS_TTL_SECS: i64 = 60 * 60;
pub const DEFAULT_REFRESH_TTL_SECS: i64 = 24 * 60 * 60;

/// Which secret signed a token. Never encoded in the claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flavor {
    Access,
    Refresh,
}

impl Flavor {
    /// Cookie consulted when no Authorization header is sent.
    pub fn cookie_name(self) -> &'static str {
        match self {
            Flavor::Access => "access_token",
            Flavor::Refresh => "refresh_token",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Flavor::Access => "access",
            Flavor::Refresh => "refresh",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, Copy)]
pub struct TokenTtls {
    pub access: Duration,
    pub refresh: Duration,
}

impl Default for TokenTtls {
    fn default() -> Self {
        Self {
            access: Duration::seconds(DEFAULT_ACCESS_TTL_SECS),
            refresh: Duration::seconds(DEFAULT_REFRESH_TTL_SECS),
        }
    }
}

pub struct TokenService {
    access: CredentialCodec,
    refresh: CredentialCodec,
    ttls: TokenTtls,
    identities: Arc<dyn IdentityStore>,
    clock: Arc<dyn Clock>,
}

impl TokenService {
    pub fn new(secrets: &TokenSecrets, ttls: TokenTtls, identities: Arc<dyn IdentityStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            access: CredentialCodec::new(&secrets.access),
            refresh: CredentialCodec::new(&secrets.refresh),
            ttls,
            identities,
            clock,
        }
    }

    pub fn ttl(&self, flavor: Flavor) -> Duration {
        match flavor {
            Flavor::Access => self.ttls.access,
            Flavor::Refresh => self.ttls.refresh,
        }
    }

    fn codec(&self, flavor: Flavor) -> &CredentialCodec {
        match flavor {
            Flavor::Access => &self.access,
            Flavor::Refresh => &self.refresh,
        }
    }

    pub fn issue(&self, identity: &Identity, flavor: Flavor) -> Result<String, AuthError> {
        let now = self.clock.now();
        let expires = now
            .checked_add_signed(self.ttl(flavor))
            .ok_or_else(|| AuthError::SigningFailed(format!("{} lifetime overflows the clock", flavor.label())))?;
        let claims = ClaimSet {
            id: identity.id.clone(),
            email: identity.email.clone(),
            iat: now.timestamp(),
            exp: expires.timestamp(),
            jti: uuid::Uuid::new_v4().to_string(),
        };
        let token = self.codec(flavor).sign(&claims)?;
        debug!(target: "auth", flavor = flavor.label(), user = %claims.id, jti = %claims.jti, exp = claims.exp, "token issued");
        Ok(token)
    }

    pub fn issue_access_token(&self, identity: &Identity) -> Result<String, AuthError> {
        self.issue(identity, Flavor::Access)
    }

    pub fn issue_refresh_token(&self, identity: &Identity) -> Result<String, AuthError> {
        self.issue(identity, Flavor::Refresh)
    }

    pub fn issue_pair(&self, identity: &Identity) -> Result<TokenPair, AuthError> {
        Ok(TokenPair {
            access_token: self.issue_access_token(identity)?,
            refresh_token: self.issue_refresh_token(identity)?,
        })
    }

    /// Validate `token` as `flavor` and return the identity as currently stored.
    ///
    /// Valid up to and including the expiry second. The subject must still
    /// exist, not be soft-deleted, and carry the same email as at issuance.
    /// A failing store denies.
    pub fn validate(&self, token: &str, flavor: Flavor) -> Result<Identity, AuthError> {
        let claims = self.codec(flavor).verify(token)?;
        if self.clock.now().timestamp() > claims.exp {
            return Err(AuthError::TokenExpired);
        }
        match self.identities.find_by_id_and_email(&claims.id, &claims.email) {
            Ok(identity) => Ok(identity),
            Err(StoreError::NotFound) | Err(StoreError::Conflict(_)) => Err(AuthError::IdentityNotFound),
            Err(StoreError::Unavailable(msg)) => {
                warn!(target: "auth", sub = %claims.id, "identity store unavailable during validation: {msg}");
                Err(AuthError::StoreUnavailable(msg))
            }
        }
    }
}
