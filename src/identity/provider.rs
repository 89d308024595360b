use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Deserialize;
use tracing::debug;

use super::principal::Identity;
use crate::error::{AppError, StoreError};

/// Read side of the identity store. Every lookup excludes soft-deleted rows.
/// Implementations may block on I/O; callers on async paths go through
/// `spawn_blocking`.
pub trait IdentityStore: Send + Sync {
    fn find_by_id(&self, id: &str) -> Result<Identity, StoreError>;
    fn find_by_email(&self, email: &str) -> Result<Identity, StoreError>;
    fn find_by_id_and_email(&self, id: &str, email: &str) -> Result<Identity, StoreError>;
    fn insert(&self, identity: Identity) -> Result<Identity, StoreError>;
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// In-process identity store used by the server binary and tests.
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    rows: RwLock<HashMap<String, Identity>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self { Self::default() }

    /// Change profile fields in place. An email change leaves previously issued
    /// tokens pointing at the old email, so they stop validating.
    pub fn update_profile(
        &self,
        id: &str,
        first_name: Option<&str>,
        last_name: Option<&str>,
        email: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Identity, StoreError> {
        let mut rows = self.rows.write();
        if let Some(new_email) = email {
            let taken = rows.values().any(|r| r.is_live() && r.id != id && r.email.eq_ignore_ascii_case(new_email));
            if taken {
                return Err(StoreError::Conflict(format!("email {new_email} already registered")));
            }
        }
        let row = rows.get_mut(id).filter(|r| r.is_live()).ok_or(StoreError::NotFound)?;
        if let Some(v) = first_name { row.first_name = v.to_string(); }
        if let Some(v) = last_name { row.last_name = v.to_string(); }
        if let Some(v) = email { row.email = v.to_string(); }
        row.updated_at = now;
        Ok(row.clone())
    }

    pub fn soft_delete(&self, id: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
        let mut rows = self.rows.write();
        let row = rows.get_mut(id).filter(|r| r.is_live()).ok_or(StoreError::NotFound)?;
        row.deleted_at = Some(now);
        Ok(())
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn find_by_id(&self, id: &str) -> Result<Identity, StoreError> {
        self.rows.read().get(id).filter(|r| r.is_live()).cloned().ok_or(StoreError::NotFound)
    }

    fn find_by_email(&self, email: &str) -> Result<Identity, StoreError> {
        self.rows
            .read()
            .values()
            .find(|r| r.is_live() && r.email.eq_ignore_ascii_case(email))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn find_by_id_and_email(&self, id: &str, email: &str) -> Result<Identity, StoreError> {
        self.rows
            .read()
            .get(id)
            .filter(|r| r.is_live() && r.email == email)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn insert(&self, identity: Identity) -> Result<Identity, StoreError> {
        let mut rows = self.rows.write();
        if rows.values().any(|r| r.is_live() && r.email.eq_ignore_ascii_case(&identity.email)) {
            return Err(StoreError::Conflict(format!("email {} already registered", identity.email)));
        }
        rows.insert(identity.id.clone(), identity.clone());
        Ok(identity)
    }
}

/// Resolve an identity from email + password. Unknown email and wrong password
/// produce the same error.
pub fn authenticate(store: &dyn IdentityStore, req: &LoginRequest) -> Result<Identity, AppError> {
    let invalid = || AppError::user("invalid_credentials", "invalid email and/or password");
    let identity = match store.find_by_email(&req.email) {
        Ok(identity) => identity,
        Err(StoreError::NotFound) => return Err(invalid()),
        Err(e) => return Err(e.into()),
    };
    if !crate::security::verify_password(&identity.password_hash, &req.password) {
        debug!(target: "auth", user = %identity.id, "password mismatch");
        return Err(invalid());
    }
    Ok(identity)
}
