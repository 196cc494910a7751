//! PostgreSQL backend.
//!
//! Queries are checked at runtime (`query_as` + `FromRow`) so the crate builds
//! without a live database. Uniqueness violations surface as
//! `AppError::AlreadyExists` through `From<sqlx::Error>`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use super::{Store, StoreTx};
use crate::models::{
    ActivityCounts, Event, EventStatus, ExportFilter, Notification, NotificationQuery,
    PageRevision, PageState, Payment, PaymentStatus, Registration, RegistrationCounts,
    RegistrationExportRow, RegistrationStatus, RoleCount, Ticket, User, WaitlistEntry,
};
use crate::utils::error::{AppError, AppResult};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> AppResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> AppResult<()> {
        sqlx::migrate!()
            .run(&self.pool)
            .await
            .map_err(|e| AppError::InternalServerError(format!("Migration failed: {e}")))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> AppResult<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx: Some(tx) }))
    }
}

pub struct PgTx {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgTx {
    fn conn(&mut self) -> AppResult<&mut PgConnection> {
        self.tx
            .as_deref_mut()
            .ok_or_else(|| AppError::InternalServerError("Transaction already finished".to_string()))
    }
}

fn expect_one(rows_affected: u64, entity: &str, id: impl std::fmt::Display) -> AppResult<()> {
    if rows_affected == 0 {
        Err(AppError::not_found(entity, id))
    } else {
        Ok(())
    }
}

#[async_trait]
impl StoreTx for PgTx {
    async fn commit(&mut self) -> AppResult<()> {
        if let Some(tx) = self.tx.take() {
            tx.commit().await?;
        }
        Ok(())
    }

    async fn rollback(&mut self) -> AppResult<()> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
        }
        Ok(())
    }

    async fn insert_user(&mut self, user: &User) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, full_name, role, status, membership_tier, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.full_name)
        .bind(user.role)
        .bind(user.status)
        .bind(user.membership_tier)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(self.conn()?)
        .await?;
        Ok(())
    }

    async fn find_user(&mut self, id: Uuid) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(self.conn()?)
            .await?;
        Ok(user)
    }

    async fn update_user(&mut self, user: &User) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET email = $2, full_name = $3, role = $4, status = $5, membership_tier = $6, updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.full_name)
        .bind(user.role)
        .bind(user.status)
        .bind(user.membership_tier)
        .bind(user.updated_at)
        .execute(self.conn()?)
        .await?;
        expect_one(result.rows_affected(), "User", user.id)
    }

    async fn insert_event(&mut self, event: &Event) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO events (id, organizer_id, title, description, venue, start_time, end_time,
                                capacity, price, currency, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(event.id)
        .bind(event.organizer_id)
        .bind(&event.title)
        .bind(&event.description)
        .bind(&event.venue)
        .bind(event.start_time)
        .bind(event.end_time)
        .bind(event.capacity)
        .bind(event.price)
        .bind(&event.currency)
        .bind(event.status)
        .bind(event.created_at)
        .bind(event.updated_at)
        .execute(self.conn()?)
        .await?;
        Ok(())
    }

    async fn find_event(&mut self, id: Uuid) -> AppResult<Option<Event>> {
        let event = sqlx::query_as::<_, Event>("SELECT * FROM events WHERE id = $1")
            .bind(id)
            .fetch_optional(self.conn()?)
            .await?;
        Ok(event)
    }

    async fn lock_event(&mut self, id: Uuid) -> AppResult<Option<Event>> {
        let event = sqlx::query_as::<_, Event>("SELECT * FROM events WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(self.conn()?)
            .await?;
        Ok(event)
    }

    async fn update_event(&mut self, event: &Event) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE events
            SET title = $2, description = $3, venue = $4, start_time = $5, end_time = $6,
                capacity = $7, price = $8, currency = $9, status = $10, updated_at = $11
            WHERE id = $1
            "#,
        )
        .bind(event.id)
        .bind(&event.title)
        .bind(&event.description)
        .bind(&event.venue)
        .bind(event.start_time)
        .bind(event.end_time)
        .bind(event.capacity)
        .bind(event.price)
        .bind(&event.currency)
        .bind(event.status)
        .bind(event.updated_at)
        .execute(self.conn()?)
        .await?;
        expect_one(result.rows_affected(), "Event", event.id)
    }

    async fn list_events(&mut self, status: Option<EventStatus>) -> AppResult<Vec<Event>> {
        let events = sqlx::query_as::<_, Event>(
            r#"
            SELECT * FROM events
            WHERE $1::event_status IS NULL OR status = $1
            ORDER BY start_time ASC
            "#,
        )
        .bind(status)
        .fetch_all(self.conn()?)
        .await?;
        Ok(events)
    }

    async fn insert_registration(&mut self, registration: &Registration) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO registrations (id, user_id, event_id, ticket_type, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(registration.id)
        .bind(registration.user_id)
        .bind(registration.event_id)
        .bind(registration.ticket_type)
        .bind(registration.status)
        .bind(registration.created_at)
        .bind(registration.updated_at)
        .execute(self.conn()?)
        .await?;
        Ok(())
    }

    async fn find_registration(&mut self, id: Uuid) -> AppResult<Option<Registration>> {
        let registration =
            sqlx::query_as::<_, Registration>("SELECT * FROM registrations WHERE id = $1")
                .bind(id)
                .fetch_optional(self.conn()?)
                .await?;
        Ok(registration)
    }

    async fn find_active_registration(
        &mut self,
        event_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Option<Registration>> {
        let registration = sqlx::query_as::<_, Registration>(
            r#"
            SELECT * FROM registrations
            WHERE event_id = $1 AND user_id = $2 AND status <> 'cancelled'
            "#,
        )
        .bind(event_id)
        .bind(user_id)
        .fetch_optional(self.conn()?)
        .await?;
        Ok(registration)
    }

    async fn update_registration(&mut self, registration: &Registration) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE registrations SET status = $2, ticket_type = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(registration.id)
        .bind(registration.status)
        .bind(registration.ticket_type)
        .bind(registration.updated_at)
        .execute(self.conn()?)
        .await?;
        expect_one(result.rows_affected(), "Registration", registration.id)
    }

    async fn registration_counts(&mut self, event_id: Uuid) -> AppResult<RegistrationCounts> {
        let rows = sqlx::query_as::<_, (RegistrationStatus, i64)>(
            "SELECT status, COUNT(*) FROM registrations WHERE event_id = $1 GROUP BY status",
        )
        .bind(event_id)
        .fetch_all(self.conn()?)
        .await?;

        let mut counts = RegistrationCounts::default();
        for (status, count) in rows {
            counts.add(status, count);
        }
        Ok(counts)
    }

    async fn insert_payment(&mut self, payment: &Payment) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO payments (id, registration_id, amount, currency, status, reference,
                                  paid_at, gateway_response, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(payment.id)
        .bind(payment.registration_id)
        .bind(payment.amount)
        .bind(&payment.currency)
        .bind(payment.status)
        .bind(&payment.reference)
        .bind(payment.paid_at)
        .bind(&payment.gateway_response)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(self.conn()?)
        .await?;
        Ok(())
    }

    async fn lock_payment(&mut self, id: Uuid) -> AppResult<Option<Payment>> {
        let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(self.conn()?)
            .await?;
        Ok(payment)
    }

    async fn lock_payment_by_reference(&mut self, reference: &str) -> AppResult<Option<Payment>> {
        let payment =
            sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE reference = $1 FOR UPDATE")
                .bind(reference)
                .fetch_optional(self.conn()?)
                .await?;
        Ok(payment)
    }

    async fn find_payment_for_registration(
        &mut self,
        registration_id: Uuid,
    ) -> AppResult<Option<Payment>> {
        let payment = sqlx::query_as::<_, Payment>(
            r#"
            SELECT * FROM payments
            WHERE registration_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(registration_id)
        .fetch_optional(self.conn()?)
        .await?;
        Ok(payment)
    }

    async fn update_payment(&mut self, payment: &Payment) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = $2, paid_at = $3, gateway_response = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(payment.id)
        .bind(payment.status)
        .bind(payment.paid_at)
        .bind(&payment.gateway_response)
        .bind(payment.updated_at)
        .execute(self.conn()?)
        .await?;
        expect_one(result.rows_affected(), "Payment", payment.id)
    }

    async fn list_payments(
        &mut self,
        status: PaymentStatus,
        created_before: DateTime<Utc>,
    ) -> AppResult<Vec<Payment>> {
        let payments = sqlx::query_as::<_, Payment>(
            r#"
            SELECT * FROM payments
            WHERE status = $1 AND created_at < $2
            ORDER BY created_at ASC
            "#,
        )
        .bind(status)
        .bind(created_before)
        .fetch_all(self.conn()?)
        .await?;
        Ok(payments)
    }

    async fn event_revenue(&mut self, event_id: Uuid) -> AppResult<Decimal> {
        let revenue = sqlx::query_scalar::<_, Decimal>(
            r#"
            SELECT COALESCE(SUM(p.amount), 0)
            FROM payments p
            JOIN registrations r ON r.id = p.registration_id
            WHERE r.event_id = $1 AND p.status = 'success'
            "#,
        )
        .bind(event_id)
        .fetch_one(self.conn()?)
        .await?;
        Ok(revenue)
    }

    async fn insert_ticket(&mut self, ticket: &Ticket) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO tickets (id, registration_id, event_id, user_id, ticket_number, qr_payload,
                                 checked_in, checked_in_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(ticket.id)
        .bind(ticket.registration_id)
        .bind(ticket.event_id)
        .bind(ticket.user_id)
        .bind(&ticket.ticket_number)
        .bind(&ticket.qr_payload)
        .bind(ticket.checked_in)
        .bind(ticket.checked_in_at)
        .bind(ticket.created_at)
        .execute(self.conn()?)
        .await?;
        Ok(())
    }

    async fn lock_ticket_by_number(&mut self, ticket_number: &str) -> AppResult<Option<Ticket>> {
        let ticket =
            sqlx::query_as::<_, Ticket>("SELECT * FROM tickets WHERE ticket_number = $1 FOR UPDATE")
                .bind(ticket_number)
                .fetch_optional(self.conn()?)
                .await?;
        Ok(ticket)
    }

    async fn find_ticket_for_registration(
        &mut self,
        registration_id: Uuid,
    ) -> AppResult<Option<Ticket>> {
        let ticket = sqlx::query_as::<_, Ticket>("SELECT * FROM tickets WHERE registration_id = $1")
            .bind(registration_id)
            .fetch_optional(self.conn()?)
            .await?;
        Ok(ticket)
    }

    async fn update_ticket(&mut self, ticket: &Ticket) -> AppResult<()> {
        let result =
            sqlx::query("UPDATE tickets SET checked_in = $2, checked_in_at = $3 WHERE id = $1")
                .bind(ticket.id)
                .bind(ticket.checked_in)
                .bind(ticket.checked_in_at)
                .execute(self.conn()?)
                .await?;
        expect_one(result.rows_affected(), "Ticket", &ticket.ticket_number)
    }

    async fn count_checked_in(&mut self, event_id: Uuid) -> AppResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM tickets WHERE event_id = $1 AND checked_in",
        )
        .bind(event_id)
        .fetch_one(self.conn()?)
        .await?;
        Ok(count)
    }

    async fn insert_waitlist_entry(&mut self, entry: &WaitlistEntry) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO waitlist_entries (id, event_id, user_id, ticket_type, position, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(entry.id)
        .bind(entry.event_id)
        .bind(entry.user_id)
        .bind(entry.ticket_type)
        .bind(entry.position)
        .bind(entry.created_at)
        .execute(self.conn()?)
        .await?;
        Ok(())
    }

    async fn find_waitlist_entry(&mut self, id: Uuid) -> AppResult<Option<WaitlistEntry>> {
        let entry = sqlx::query_as::<_, WaitlistEntry>("SELECT * FROM waitlist_entries WHERE id = $1")
            .bind(id)
            .fetch_optional(self.conn()?)
            .await?;
        Ok(entry)
    }

    async fn find_waitlist_entry_for_user(
        &mut self,
        event_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Option<WaitlistEntry>> {
        let entry = sqlx::query_as::<_, WaitlistEntry>(
            "SELECT * FROM waitlist_entries WHERE event_id = $1 AND user_id = $2",
        )
        .bind(event_id)
        .bind(user_id)
        .fetch_optional(self.conn()?)
        .await?;
        Ok(entry)
    }

    async fn max_waitlist_position(&mut self, event_id: Uuid) -> AppResult<i32> {
        let position = sqlx::query_scalar::<_, i32>(
            "SELECT COALESCE(MAX(position), 0) FROM waitlist_entries WHERE event_id = $1",
        )
        .bind(event_id)
        .fetch_one(self.conn()?)
        .await?;
        Ok(position)
    }

    async fn delete_waitlist_entry(&mut self, id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM waitlist_entries WHERE id = $1")
            .bind(id)
            .execute(self.conn()?)
            .await?;
        expect_one(result.rows_affected(), "Waitlist entry", id)
    }

    async fn close_waitlist_gap(&mut self, event_id: Uuid, position: i32) -> AppResult<()> {
        sqlx::query(
            "UPDATE waitlist_entries SET position = position - 1 WHERE event_id = $1 AND position > $2",
        )
        .bind(event_id)
        .bind(position)
        .execute(self.conn()?)
        .await?;
        Ok(())
    }

    async fn list_waitlist(&mut self, event_id: Uuid) -> AppResult<Vec<WaitlistEntry>> {
        let entries = sqlx::query_as::<_, WaitlistEntry>(
            "SELECT * FROM waitlist_entries WHERE event_id = $1 ORDER BY position ASC",
        )
        .bind(event_id)
        .fetch_all(self.conn()?)
        .await?;
        Ok(entries)
    }

    async fn insert_notification(&mut self, notification: &Notification) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO notifications (id, user_id, category, title, body, read, read_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(notification.id)
        .bind(notification.user_id)
        .bind(notification.category)
        .bind(&notification.title)
        .bind(&notification.body)
        .bind(notification.read)
        .bind(notification.read_at)
        .bind(notification.created_at)
        .execute(self.conn()?)
        .await?;
        Ok(())
    }

    async fn find_notification(&mut self, id: Uuid) -> AppResult<Option<Notification>> {
        let notification =
            sqlx::query_as::<_, Notification>("SELECT * FROM notifications WHERE id = $1")
                .bind(id)
                .fetch_optional(self.conn()?)
                .await?;
        Ok(notification)
    }

    async fn list_notifications(
        &mut self,
        user_id: Uuid,
        query: &NotificationQuery,
    ) -> AppResult<Vec<Notification>> {
        let notifications = sqlx::query_as::<_, Notification>(
            r#"
            SELECT * FROM notifications
            WHERE user_id = $1 AND (NOT $2 OR NOT read)
            ORDER BY created_at DESC, id DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(user_id)
        .bind(query.unread_only)
        .bind(query.limit())
        .bind(query.offset())
        .fetch_all(self.conn()?)
        .await?;
        Ok(notifications)
    }

    async fn notification_counts(&mut self, user_id: Uuid) -> AppResult<(i64, i64)> {
        let counts = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT COUNT(*), COUNT(*) FILTER (WHERE NOT read)
            FROM notifications
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_one(self.conn()?)
        .await?;
        Ok(counts)
    }

    async fn mark_notification_read(&mut self, id: Uuid, at: DateTime<Utc>) -> AppResult<()> {
        sqlx::query("UPDATE notifications SET read = TRUE, read_at = $2 WHERE id = $1 AND NOT read")
            .bind(id)
            .bind(at)
            .execute(self.conn()?)
            .await?;
        Ok(())
    }

    async fn mark_all_notifications_read(
        &mut self,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET read = TRUE, read_at = $2 WHERE user_id = $1 AND NOT read",
        )
        .bind(user_id)
        .bind(at)
        .execute(self.conn()?)
        .await?;
        Ok(result.rows_affected())
    }

    async fn insert_page_revision(&mut self, revision: &PageRevision) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO page_revisions (id, slug, version, state, content, author_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(revision.id)
        .bind(&revision.slug)
        .bind(revision.version)
        .bind(revision.state)
        .bind(&revision.content)
        .bind(revision.author_id)
        .bind(revision.created_at)
        .execute(self.conn()?)
        .await?;
        Ok(())
    }

    async fn latest_page_revision(
        &mut self,
        slug: &str,
        state: PageState,
    ) -> AppResult<Option<PageRevision>> {
        let revision = sqlx::query_as::<_, PageRevision>(
            r#"
            SELECT * FROM page_revisions
            WHERE slug = $1 AND state = $2
            ORDER BY version DESC
            LIMIT 1
            "#,
        )
        .bind(slug)
        .bind(state)
        .fetch_optional(self.conn()?)
        .await?;
        Ok(revision)
    }

    async fn max_page_version(&mut self, slug: &str) -> AppResult<i32> {
        let version = sqlx::query_scalar::<_, i32>(
            "SELECT COALESCE(MAX(version), 0) FROM page_revisions WHERE slug = $1",
        )
        .bind(slug)
        .fetch_one(self.conn()?)
        .await?;
        Ok(version)
    }

    async fn activity_counts(
        &mut self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> AppResult<ActivityCounts> {
        let counts = sqlx::query_as::<_, ActivityCounts>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM users WHERE created_at >= $1 AND created_at < $2) AS users,
                (SELECT COUNT(*) FROM events WHERE created_at >= $1 AND created_at < $2) AS events,
                (SELECT COUNT(*) FROM registrations
                    WHERE created_at >= $1 AND created_at < $2) AS registrations,
                (SELECT COALESCE(SUM(amount), 0) FROM payments
                    WHERE status = 'success' AND paid_at >= $1 AND paid_at < $2) AS revenue
            "#,
        )
        .bind(from)
        .bind(until)
        .fetch_one(self.conn()?)
        .await?;
        Ok(counts)
    }

    async fn users_by_role(&mut self) -> AppResult<Vec<RoleCount>> {
        let counts = sqlx::query_as::<_, RoleCount>(
            "SELECT role, COUNT(*) AS count FROM users WHERE status <> 'archived' \
             GROUP BY role ORDER BY role",
        )
        .fetch_all(self.conn()?)
        .await?;
        Ok(counts)
    }

    async fn registration_export(
        &mut self,
        filter: &ExportFilter,
    ) -> AppResult<Vec<RegistrationExportRow>> {
        let rows = sqlx::query_as::<_, RegistrationExportRow>(
            r#"
            SELECT
                r.id AS registration_id,
                t.ticket_number,
                u.full_name,
                u.email,
                e.title AS event_title,
                e.start_time AS event_start,
                e.venue,
                r.ticket_type,
                r.status,
                p.reference AS payment_reference,
                p.status AS payment_status,
                COALESCE(t.checked_in, FALSE) AS checked_in,
                t.checked_in_at,
                r.created_at AS registered_at
            FROM registrations r
            JOIN users u ON u.id = r.user_id
            JOIN events e ON e.id = r.event_id
            LEFT JOIN tickets t ON t.registration_id = r.id
            LEFT JOIN LATERAL (
                SELECT reference, status FROM payments
                WHERE registration_id = r.id
                ORDER BY created_at DESC
                LIMIT 1
            ) p ON TRUE
            WHERE ($1::uuid IS NULL OR r.event_id = $1)
              AND ($2::registration_status IS NULL OR r.status = $2)
            ORDER BY r.created_at DESC
            "#,
        )
        .bind(filter.event_id)
        .bind(filter.status)
        .fetch_all(self.conn()?)
        .await?;
        Ok(rows)
    }
}
