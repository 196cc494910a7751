use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "registration_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    Pending,
    Confirmed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "ticket_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TicketType {
    #[default]
    Regular,
    Vip,
    Student,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Registration {
    pub id: Uuid,
    pub user_id: Uuid,
    pub event_id: Uuid,
    pub ticket_type: TicketType,
    pub status: RegistrationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Registration {
    pub fn new(
        user_id: Uuid,
        event_id: Uuid,
        ticket_type: TicketType,
        status: RegistrationStatus,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            event_id,
            ticket_type,
            status,
            created_at: now,
            updated_at: now,
        }
    }

    /// Pending and confirmed registrations both hold a seat.
    pub fn holds_seat(&self) -> bool {
        self.status != RegistrationStatus::Cancelled
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistrationCounts {
    pub pending: i64,
    pub confirmed: i64,
    pub cancelled: i64,
}

impl RegistrationCounts {
    pub fn active(&self) -> i64 {
        self.pending + self.confirmed
    }

    pub fn add(&mut self, status: RegistrationStatus, count: i64) {
        match status {
            RegistrationStatus::Pending => self.pending += count,
            RegistrationStatus::Confirmed => self.confirmed += count,
            RegistrationStatus::Cancelled => self.cancelled += count,
        }
    }
}
