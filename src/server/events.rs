use serde::{Deserialize, Serialize};

use crate::tickets::TicketResponse;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Created,
    Updated,
    Deleted,
}

/// A completed ticket mutation, as pushed to real-time clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainEvent {
    pub event: EventKind,
    pub ticket: TicketResponse,
}

impl DomainEvent {
    pub fn created(ticket: TicketResponse) -> Self { Self { event: EventKind::Created, ticket } }

    pub fn updated(ticket: TicketResponse) -> Self { Self { event: EventKind::Updated, ticket } }

    /// Deletions carry the empty ticket shape; clients reload state.
    pub fn deleted() -> Self { Self { event: EventKind::Deleted, ticket: TicketResponse::default() } }

    pub fn to_frame(&self) -> serde_json::Result<String> { serde_json::to_string(self) }
}
