use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Ticket {
    pub id: Uuid,
    pub registration_id: Uuid,
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub ticket_number: String,
    /// JSON [`ScanPayload`] rendered into the ticket's QR code.
    pub qr_payload: String,
    pub checked_in: bool,
    pub checked_in_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// What a scanner reads off a ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanPayload {
    pub ticket_number: String,
    pub event_id: Uuid,
    pub user_id: Uuid,
}
