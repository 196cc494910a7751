//! Persistence gateway.
//!
//! All reads and writes go through a [`StoreTx`] obtained from
//! [`Store::begin`]. A transaction that is dropped without `commit` is rolled
//! back. `lock_*` reads take a row lock held until the transaction ends; that
//! is what serializes capacity checks and waitlist positions per event.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::{
    ActivityCounts, Event, EventStatus, ExportFilter, Notification, NotificationQuery,
    PageRevision, PageState, Payment, PaymentStatus, Registration, RegistrationCounts,
    RegistrationExportRow, RoleCount, Ticket, User, WaitlistEntry,
};
use crate::utils::error::AppResult;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> AppResult<Box<dyn StoreTx>>;
}

#[async_trait]
pub trait StoreTx: Send {
    async fn commit(&mut self) -> AppResult<()>;
    async fn rollback(&mut self) -> AppResult<()>;

    // Users
    async fn insert_user(&mut self, user: &User) -> AppResult<()>;
    async fn find_user(&mut self, id: Uuid) -> AppResult<Option<User>>;
    async fn update_user(&mut self, user: &User) -> AppResult<()>;

    // Events
    async fn insert_event(&mut self, event: &Event) -> AppResult<()>;
    async fn find_event(&mut self, id: Uuid) -> AppResult<Option<Event>>;
    /// `SELECT ... FOR UPDATE` on the event row.
    async fn lock_event(&mut self, id: Uuid) -> AppResult<Option<Event>>;
    async fn update_event(&mut self, event: &Event) -> AppResult<()>;
    async fn list_events(&mut self, status: Option<EventStatus>) -> AppResult<Vec<Event>>;

    // Registrations
    async fn insert_registration(&mut self, registration: &Registration) -> AppResult<()>;
    async fn find_registration(&mut self, id: Uuid) -> AppResult<Option<Registration>>;
    /// The user's pending or confirmed registration for the event, if any.
    async fn find_active_registration(
        &mut self,
        event_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Option<Registration>>;
    async fn update_registration(&mut self, registration: &Registration) -> AppResult<()>;
    async fn registration_counts(&mut self, event_id: Uuid) -> AppResult<RegistrationCounts>;

    // Payments
    async fn insert_payment(&mut self, payment: &Payment) -> AppResult<()>;
    async fn lock_payment(&mut self, id: Uuid) -> AppResult<Option<Payment>>;
    async fn lock_payment_by_reference(&mut self, reference: &str) -> AppResult<Option<Payment>>;
    async fn find_payment_for_registration(
        &mut self,
        registration_id: Uuid,
    ) -> AppResult<Option<Payment>>;
    async fn update_payment(&mut self, payment: &Payment) -> AppResult<()>;
    async fn list_payments(
        &mut self,
        status: PaymentStatus,
        created_before: DateTime<Utc>,
    ) -> AppResult<Vec<Payment>>;
    /// Sum of successful payment amounts for the event.
    async fn event_revenue(&mut self, event_id: Uuid) -> AppResult<Decimal>;

    // Tickets
    /// Fails with `AlreadyExists` when the registration already has a ticket
    /// or the ticket number is taken.
    async fn insert_ticket(&mut self, ticket: &Ticket) -> AppResult<()>;
    async fn lock_ticket_by_number(&mut self, ticket_number: &str) -> AppResult<Option<Ticket>>;
    async fn find_ticket_for_registration(
        &mut self,
        registration_id: Uuid,
    ) -> AppResult<Option<Ticket>>;
    async fn update_ticket(&mut self, ticket: &Ticket) -> AppResult<()>;
    async fn count_checked_in(&mut self, event_id: Uuid) -> AppResult<i64>;

    // Waitlist
    async fn insert_waitlist_entry(&mut self, entry: &WaitlistEntry) -> AppResult<()>;
    async fn find_waitlist_entry(&mut self, id: Uuid) -> AppResult<Option<WaitlistEntry>>;
    async fn find_waitlist_entry_for_user(
        &mut self,
        event_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Option<WaitlistEntry>>;
    /// Highest position on the event's waitlist, 0 when empty.
    async fn max_waitlist_position(&mut self, event_id: Uuid) -> AppResult<i32>;
    async fn delete_waitlist_entry(&mut self, id: Uuid) -> AppResult<()>;
    /// Moves every entry behind `position` up by one.
    async fn close_waitlist_gap(&mut self, event_id: Uuid, position: i32) -> AppResult<()>;
    async fn list_waitlist(&mut self, event_id: Uuid) -> AppResult<Vec<WaitlistEntry>>;

    // Notifications
    async fn insert_notification(&mut self, notification: &Notification) -> AppResult<()>;
    async fn find_notification(&mut self, id: Uuid) -> AppResult<Option<Notification>>;
    async fn list_notifications(
        &mut self,
        user_id: Uuid,
        query: &NotificationQuery,
    ) -> AppResult<Vec<Notification>>;
    /// `(total, unread)` for the user.
    async fn notification_counts(&mut self, user_id: Uuid) -> AppResult<(i64, i64)>;
    async fn mark_notification_read(&mut self, id: Uuid, at: DateTime<Utc>) -> AppResult<()>;
    async fn mark_all_notifications_read(
        &mut self,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<u64>;

    // Pages
    async fn insert_page_revision(&mut self, revision: &PageRevision) -> AppResult<()>;
    async fn latest_page_revision(
        &mut self,
        slug: &str,
        state: PageState,
    ) -> AppResult<Option<PageRevision>>;
    /// Highest version saved for the slug in any state, 0 when none.
    async fn max_page_version(&mut self, slug: &str) -> AppResult<i32>;

    // Analytics
    /// Users, events and registrations created in `[from, until)`, plus the
    /// amount of successful payments settled in that window.
    async fn activity_counts(
        &mut self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> AppResult<ActivityCounts>;
    /// Non-archived users per role, roles without users omitted.
    async fn users_by_role(&mut self) -> AppResult<Vec<RoleCount>>;
    async fn registration_export(
        &mut self,
        filter: &ExportFilter,
    ) -> AppResult<Vec<RegistrationExportRow>>;
}
