use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::TicketType;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WaitlistEntry {
    pub id: Uuid,
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub ticket_type: TicketType,
    /// 1-based, unique per event. Kept contiguous: removing an entry moves
    /// everyone behind it up by one.
    pub position: i32,
    pub created_at: DateTime<Utc>,
}
