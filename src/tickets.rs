//! Ticket storage collaborator: owner-scoped CRUD with soft delete.
//! Field validation is not done here; callers hand in accepted drafts.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub description: String,
    pub assignees: Vec<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Create/update request body.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TicketDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub assignees: Vec<String>,
    pub status: String,
}

/// Wire shape of a ticket. `Default` is the empty shape sent with `deleted` events.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TicketResponse {
    pub id: String,
    pub title: String,
    pub description: String,
    pub assignees: Vec<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Ticket> for TicketResponse {
    fn from(t: &Ticket) -> Self {
        Self {
            id: t.id.clone(),
            title: t.title.clone(),
            description: t.description.clone(),
            assignees: t.assignees.clone(),
            status: t.status.clone(),
            created_at: t.created_at,
            updated_at: t.updated_at,
        }
    }
}

pub trait TicketStore: Send + Sync {
    fn create(&self, owner_id: &str, draft: TicketDraft, now: DateTime<Utc>) -> Result<Ticket, StoreError>;
    /// Live tickets of `owner_id`, oldest first. `title` keeps only tickets
    /// whose title contains it, ignoring case.
    fn list(&self, owner_id: &str, title: Option<&str>) -> Result<Vec<Ticket>, StoreError>;
    fn get(&self, owner_id: &str, ticket_id: &str) -> Result<Ticket, StoreError>;
    fn update(&self, owner_id: &str, ticket_id: &str, draft: TicketDraft, now: DateTime<Utc>) -> Result<Ticket, StoreError>;
    fn delete(&self, owner_id: &str, ticket_id: &str, now: DateTime<Utc>) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryTicketStore {
    rows: RwLock<HashMap<String, Ticket>>,
}

impl MemoryTicketStore {
    pub fn new() -> Self { Self::default() }
}

impl TicketStore for MemoryTicketStore {
    fn create(&self, owner_id: &str, draft: TicketDraft, now: DateTime<Utc>) -> Result<Ticket, StoreError> {
        let ticket = Ticket {
            id: uuid::Uuid::new_v4().simple().to_string(),
            owner_id: owner_id.to_string(),
            title: draft.title,
            description: draft.description,
            assignees: draft.assignees,
            status: draft.status,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        self.rows.write().insert(ticket.id.clone(), ticket.clone());
        Ok(ticket)
    }

    fn list(&self, owner_id: &str, title: Option<&str>) -> Result<Vec<Ticket>, StoreError> {
        let needle = title.map(str::to_lowercase).filter(|n| !n.is_empty());
        let mut out: Vec<Ticket> = self
            .rows
            .read()
            .values()
            .filter(|t| t.owner_id == owner_id && t.deleted_at.is_none())
            .filter(|t| needle.as_deref().map_or(true, |n| t.title.to_lowercase().contains(n)))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(out)
    }

    fn get(&self, owner_id: &str, ticket_id: &str) -> Result<Ticket, StoreError> {
        self.rows
            .read()
            .get(ticket_id)
            .filter(|t| t.owner_id == owner_id && t.deleted_at.is_none())
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn update(&self, owner_id: &str, ticket_id: &str, draft: TicketDraft, now: DateTime<Utc>) -> Result<Ticket, StoreError> {
        let mut rows = self.rows.write();
        let t = rows
            .get_mut(ticket_id)
            .filter(|t| t.owner_id == owner_id && t.deleted_at.is_none())
            .ok_or(StoreError::NotFound)?;
        t.title = draft.title;
        t.description = draft.description;
        t.assignees = draft.assignees;
        t.status = draft.status;
        t.updated_at = now;
        Ok(t.clone())
    }

    fn delete(&self, owner_id: &str, ticket_id: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
        let mut rows = self.rows.write();
        let t = rows
            .get_mut(ticket_id)
            .filter(|t| t.owner_id == owner_id && t.deleted_at.is_none())
            .ok_or(StoreError::NotFound)?;
        t.deleted_at = Some(now);
        Ok(())
    }
}
