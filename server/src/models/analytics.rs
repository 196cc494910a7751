use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::auth::Role;
use crate::models::{PaymentStatus, RegistrationStatus, TicketType};

/// Rows created inside one reporting window.
#[derive(Debug, Clone, Default, PartialEq, Eq, FromRow)]
pub struct ActivityCounts {
    pub users: i64,
    pub events: i64,
    pub registrations: i64,
    /// Successful payments settled inside the window.
    pub revenue: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, FromRow)]
pub struct RoleCount {
    pub role: Role,
    pub count: i64,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ExportFilter {
    pub event_id: Option<Uuid>,
    pub status: Option<RegistrationStatus>,
}

/// One line of the registrations export, newest registration first.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct RegistrationExportRow {
    pub registration_id: Uuid,
    pub ticket_number: Option<String>,
    pub full_name: String,
    pub email: String,
    pub event_title: String,
    pub event_start: DateTime<Utc>,
    pub venue: String,
    pub ticket_type: TicketType,
    pub status: RegistrationStatus,
    pub payment_reference: Option<String>,
    pub payment_status: Option<PaymentStatus>,
    pub checked_in: bool,
    pub checked_in_at: Option<DateTime<Utc>>,
    pub registered_at: DateTime<Utc>,
}
