//! In-memory backend used by tests and local runs without a database.
//!
//! A transaction holds the store-wide lock from `begin` until it finishes and
//! works on a copy of the tables, so transactions are fully serialized and an
//! uncommitted one leaves no trace. Unique constraints mirror the migration.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{Store, StoreTx};
use crate::models::{
    ActivityCounts, Event, EventStatus, ExportFilter, Notification, NotificationQuery,
    PageRevision, PageState, Payment, PaymentStatus, Registration, RegistrationCounts,
    RegistrationExportRow, RoleCount, Ticket, User, UserStatus, WaitlistEntry,
};
use crate::utils::error::{AppError, AppResult};

#[derive(Debug, Clone, Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    events: HashMap<Uuid, Event>,
    registrations: HashMap<Uuid, Registration>,
    payments: HashMap<Uuid, Payment>,
    tickets: HashMap<Uuid, Ticket>,
    waitlist: HashMap<Uuid, WaitlistEntry>,
    notifications: HashMap<Uuid, Notification>,
    pages: HashMap<Uuid, PageRevision>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> AppResult<Box<dyn StoreTx>> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        let work = Tables::clone(&guard);
        Ok(Box::new(MemoryTx {
            guard: Some(guard),
            work,
        }))
    }
}

pub struct MemoryTx {
    guard: Option<OwnedMutexGuard<Tables>>,
    work: Tables,
}

impl MemoryTx {
    fn tables(&mut self) -> AppResult<&mut Tables> {
        if self.guard.is_some() {
            Ok(&mut self.work)
        } else {
            Err(AppError::InternalServerError(
                "Transaction already finished".to_string(),
            ))
        }
    }
}

fn violation(constraint: &str) -> AppError {
    AppError::AlreadyExists(format!("Record violates {constraint}"))
}

fn replace<T: Clone>(
    map: &mut HashMap<Uuid, T>,
    id: Uuid,
    value: &T,
    entity: &str,
) -> AppResult<()> {
    match map.get_mut(&id) {
        Some(slot) => {
            *slot = value.clone();
            Ok(())
        }
        None => Err(AppError::not_found(entity, id)),
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn commit(&mut self) -> AppResult<()> {
        if let Some(mut guard) = self.guard.take() {
            *guard = std::mem::take(&mut self.work);
        }
        Ok(())
    }

    async fn rollback(&mut self) -> AppResult<()> {
        self.guard = None;
        self.work = Tables::default();
        Ok(())
    }

    async fn insert_user(&mut self, user: &User) -> AppResult<()> {
        let tables = self.tables()?;
        let email = user.email.to_lowercase();
        if tables.users.contains_key(&user.id) {
            return Err(violation("users_pkey"));
        }
        if tables
            .users
            .values()
            .any(|u| u.email.to_lowercase() == email)
        {
            return Err(violation("users_email_key"));
        }
        tables.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn find_user(&mut self, id: Uuid) -> AppResult<Option<User>> {
        Ok(self.tables()?.users.get(&id).cloned())
    }

    async fn update_user(&mut self, user: &User) -> AppResult<()> {
        let tables = self.tables()?;
        let email = user.email.to_lowercase();
        if tables
            .users
            .values()
            .any(|u| u.id != user.id && u.email.to_lowercase() == email)
        {
            return Err(violation("users_email_key"));
        }
        replace(&mut tables.users, user.id, user, "User")
    }

    async fn insert_event(&mut self, event: &Event) -> AppResult<()> {
        let tables = self.tables()?;
        if tables.events.contains_key(&event.id) {
            return Err(violation("events_pkey"));
        }
        tables.events.insert(event.id, event.clone());
        Ok(())
    }

    async fn find_event(&mut self, id: Uuid) -> AppResult<Option<Event>> {
        Ok(self.tables()?.events.get(&id).cloned())
    }

    async fn lock_event(&mut self, id: Uuid) -> AppResult<Option<Event>> {
        self.find_event(id).await
    }

    async fn update_event(&mut self, event: &Event) -> AppResult<()> {
        replace(&mut self.tables()?.events, event.id, event, "Event")
    }

    async fn list_events(&mut self, status: Option<EventStatus>) -> AppResult<Vec<Event>> {
        let mut events: Vec<Event> = self
            .tables()?
            .events
            .values()
            .filter(|e| status.map_or(true, |s| e.status == s))
            .cloned()
            .collect();
        events.sort_by_key(|e| e.start_time);
        Ok(events)
    }

    async fn insert_registration(&mut self, registration: &Registration) -> AppResult<()> {
        let tables = self.tables()?;
        if tables.registrations.contains_key(&registration.id) {
            return Err(violation("registrations_pkey"));
        }
        if registration.holds_seat()
            && tables.registrations.values().any(|r| {
                r.holds_seat()
                    && r.event_id == registration.event_id
                    && r.user_id == registration.user_id
            })
        {
            return Err(violation("registrations_active_user_key"));
        }
        tables
            .registrations
            .insert(registration.id, registration.clone());
        Ok(())
    }

    async fn find_registration(&mut self, id: Uuid) -> AppResult<Option<Registration>> {
        Ok(self.tables()?.registrations.get(&id).cloned())
    }

    async fn find_active_registration(
        &mut self,
        event_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Option<Registration>> {
        Ok(self
            .tables()?
            .registrations
            .values()
            .find(|r| r.holds_seat() && r.event_id == event_id && r.user_id == user_id)
            .cloned())
    }

    async fn update_registration(&mut self, registration: &Registration) -> AppResult<()> {
        replace(
            &mut self.tables()?.registrations,
            registration.id,
            registration,
            "Registration",
        )
    }

    async fn registration_counts(&mut self, event_id: Uuid) -> AppResult<RegistrationCounts> {
        let mut counts = RegistrationCounts::default();
        for registration in self
            .tables()?
            .registrations
            .values()
            .filter(|r| r.event_id == event_id)
        {
            counts.add(registration.status, 1);
        }
        Ok(counts)
    }

    async fn insert_payment(&mut self, payment: &Payment) -> AppResult<()> {
        let tables = self.tables()?;
        if tables.payments.contains_key(&payment.id) {
            return Err(violation("payments_pkey"));
        }
        if tables
            .payments
            .values()
            .any(|p| p.reference == payment.reference)
        {
            return Err(violation("payments_reference_key"));
        }
        tables.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn lock_payment(&mut self, id: Uuid) -> AppResult<Option<Payment>> {
        Ok(self.tables()?.payments.get(&id).cloned())
    }

    async fn lock_payment_by_reference(&mut self, reference: &str) -> AppResult<Option<Payment>> {
        Ok(self
            .tables()?
            .payments
            .values()
            .find(|p| p.reference == reference)
            .cloned())
    }

    async fn find_payment_for_registration(
        &mut self,
        registration_id: Uuid,
    ) -> AppResult<Option<Payment>> {
        Ok(self
            .tables()?
            .payments
            .values()
            .filter(|p| p.registration_id == registration_id)
            .max_by_key(|p| p.created_at)
            .cloned())
    }

    async fn update_payment(&mut self, payment: &Payment) -> AppResult<()> {
        replace(&mut self.tables()?.payments, payment.id, payment, "Payment")
    }

    async fn list_payments(
        &mut self,
        status: PaymentStatus,
        created_before: DateTime<Utc>,
    ) -> AppResult<Vec<Payment>> {
        let mut payments: Vec<Payment> = self
            .tables()?
            .payments
            .values()
            .filter(|p| p.status == status && p.created_at < created_before)
            .cloned()
            .collect();
        payments.sort_by_key(|p| p.created_at);
        Ok(payments)
    }

    async fn event_revenue(&mut self, event_id: Uuid) -> AppResult<Decimal> {
        let tables = self.tables()?;
        let revenue: Decimal = tables
            .payments
            .values()
            .filter(|p| p.status == PaymentStatus::Success)
            .filter(|p| {
                tables
                    .registrations
                    .get(&p.registration_id)
                    .is_some_and(|r| r.event_id == event_id)
            })
            .map(|p| p.amount)
            .sum();
        Ok(revenue)
    }

    async fn insert_ticket(&mut self, ticket: &Ticket) -> AppResult<()> {
        let tables = self.tables()?;
        if tables.tickets.contains_key(&ticket.id) {
            return Err(violation("tickets_pkey"));
        }
        if tables
            .tickets
            .values()
            .any(|t| t.registration_id == ticket.registration_id)
        {
            return Err(violation("tickets_registration_key"));
        }
        if tables
            .tickets
            .values()
            .any(|t| t.ticket_number == ticket.ticket_number)
        {
            return Err(violation("tickets_number_key"));
        }
        tables.tickets.insert(ticket.id, ticket.clone());
        Ok(())
    }

    async fn lock_ticket_by_number(&mut self, ticket_number: &str) -> AppResult<Option<Ticket>> {
        Ok(self
            .tables()?
            .tickets
            .values()
            .find(|t| t.ticket_number == ticket_number)
            .cloned())
    }

    async fn find_ticket_for_registration(
        &mut self,
        registration_id: Uuid,
    ) -> AppResult<Option<Ticket>> {
        Ok(self
            .tables()?
            .tickets
            .values()
            .find(|t| t.registration_id == registration_id)
            .cloned())
    }

    async fn update_ticket(&mut self, ticket: &Ticket) -> AppResult<()> {
        replace(&mut self.tables()?.tickets, ticket.id, ticket, "Ticket")
    }

    async fn count_checked_in(&mut self, event_id: Uuid) -> AppResult<i64> {
        let count = self
            .tables()?
            .tickets
            .values()
            .filter(|t| t.event_id == event_id && t.checked_in)
            .count();
        Ok(count as i64)
    }

    async fn insert_waitlist_entry(&mut self, entry: &WaitlistEntry) -> AppResult<()> {
        let tables = self.tables()?;
        if tables.waitlist.contains_key(&entry.id) {
            return Err(violation("waitlist_entries_pkey"));
        }
        let same_event = || tables.waitlist.values().filter(|w| w.event_id == entry.event_id);
        if same_event().any(|w| w.user_id == entry.user_id) {
            return Err(violation("waitlist_entries_user_key"));
        }
        if same_event().any(|w| w.position == entry.position) {
            return Err(violation("waitlist_entries_position_key"));
        }
        tables.waitlist.insert(entry.id, entry.clone());
        Ok(())
    }

    async fn find_waitlist_entry(&mut self, id: Uuid) -> AppResult<Option<WaitlistEntry>> {
        Ok(self.tables()?.waitlist.get(&id).cloned())
    }

    async fn find_waitlist_entry_for_user(
        &mut self,
        event_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Option<WaitlistEntry>> {
        Ok(self
            .tables()?
            .waitlist
            .values()
            .find(|w| w.event_id == event_id && w.user_id == user_id)
            .cloned())
    }

    async fn max_waitlist_position(&mut self, event_id: Uuid) -> AppResult<i32> {
        Ok(self
            .tables()?
            .waitlist
            .values()
            .filter(|w| w.event_id == event_id)
            .map(|w| w.position)
            .max()
            .unwrap_or(0))
    }

    async fn delete_waitlist_entry(&mut self, id: Uuid) -> AppResult<()> {
        self.tables()?
            .waitlist
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| AppError::not_found("Waitlist entry", id))
    }

    async fn close_waitlist_gap(&mut self, event_id: Uuid, position: i32) -> AppResult<()> {
        for entry in self
            .tables()?
            .waitlist
            .values_mut()
            .filter(|w| w.event_id == event_id && w.position > position)
        {
            entry.position -= 1;
        }
        Ok(())
    }

    async fn list_waitlist(&mut self, event_id: Uuid) -> AppResult<Vec<WaitlistEntry>> {
        let mut entries: Vec<WaitlistEntry> = self
            .tables()?
            .waitlist
            .values()
            .filter(|w| w.event_id == event_id)
            .cloned()
            .collect();
        entries.sort_by_key(|w| w.position);
        Ok(entries)
    }

    async fn insert_notification(&mut self, notification: &Notification) -> AppResult<()> {
        let tables = self.tables()?;
        if tables.notifications.contains_key(&notification.id) {
            return Err(violation("notifications_pkey"));
        }
        tables
            .notifications
            .insert(notification.id, notification.clone());
        Ok(())
    }

    async fn find_notification(&mut self, id: Uuid) -> AppResult<Option<Notification>> {
        Ok(self.tables()?.notifications.get(&id).cloned())
    }

    async fn list_notifications(
        &mut self,
        user_id: Uuid,
        query: &NotificationQuery,
    ) -> AppResult<Vec<Notification>> {
        let mut items: Vec<Notification> = self
            .tables()?
            .notifications
            .values()
            .filter(|n| n.user_id == user_id && (!query.unread_only || !n.read))
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        Ok(items
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.limit() as usize)
            .collect())
    }

    async fn notification_counts(&mut self, user_id: Uuid) -> AppResult<(i64, i64)> {
        let (total, unread) = self
            .tables()?
            .notifications
            .values()
            .filter(|n| n.user_id == user_id)
            .fold((0, 0), |(total, unread), n| {
                (total + 1, unread + i64::from(!n.read))
            });
        Ok((total, unread))
    }

    async fn mark_notification_read(&mut self, id: Uuid, at: DateTime<Utc>) -> AppResult<()> {
        if let Some(notification) = self.tables()?.notifications.get_mut(&id) {
            if !notification.read {
                notification.read = true;
                notification.read_at = Some(at);
            }
        }
        Ok(())
    }

    async fn mark_all_notifications_read(
        &mut self,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<u64> {
        let mut updated = 0;
        for notification in self
            .tables()?
            .notifications
            .values_mut()
            .filter(|n| n.user_id == user_id && !n.read)
        {
            notification.read = true;
            notification.read_at = Some(at);
            updated += 1;
        }
        Ok(updated)
    }

    async fn insert_page_revision(&mut self, revision: &PageRevision) -> AppResult<()> {
        let tables = self.tables()?;
        if tables.pages.values().any(|p| {
            p.slug == revision.slug && p.version == revision.version && p.state == revision.state
        }) {
            return Err(violation("page_revisions_version_key"));
        }
        tables.pages.insert(revision.id, revision.clone());
        Ok(())
    }

    async fn latest_page_revision(
        &mut self,
        slug: &str,
        state: PageState,
    ) -> AppResult<Option<PageRevision>> {
        Ok(self
            .tables()?
            .pages
            .values()
            .filter(|p| p.slug == slug && p.state == state)
            .max_by_key(|p| p.version)
            .cloned())
    }

    async fn max_page_version(&mut self, slug: &str) -> AppResult<i32> {
        Ok(self
            .tables()?
            .pages
            .values()
            .filter(|p| p.slug == slug)
            .map(|p| p.version)
            .max()
            .unwrap_or(0))
    }

    async fn activity_counts(
        &mut self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> AppResult<ActivityCounts> {
        let tables = self.tables()?;
        let within = |at: DateTime<Utc>| at >= from && at < until;
        let count = |n: usize| i64::try_from(n).unwrap_or(i64::MAX);
        Ok(ActivityCounts {
            users: count(tables.users.values().filter(|u| within(u.created_at)).count()),
            events: count(tables.events.values().filter(|e| within(e.created_at)).count()),
            registrations: count(
                tables
                    .registrations
                    .values()
                    .filter(|r| within(r.created_at))
                    .count(),
            ),
            revenue: tables
                .payments
                .values()
                .filter(|p| p.status == PaymentStatus::Success)
                .filter(|p| p.paid_at.is_some_and(&within))
                .map(|p| p.amount)
                .sum(),
        })
    }

    async fn users_by_role(&mut self) -> AppResult<Vec<RoleCount>> {
        let mut counts: Vec<RoleCount> = Vec::new();
        for user in self
            .tables()?
            .users
            .values()
            .filter(|u| u.status != UserStatus::Archived)
        {
            match counts.iter_mut().find(|c| c.role == user.role) {
                Some(slot) => slot.count += 1,
                None => counts.push(RoleCount {
                    role: user.role,
                    count: 1,
                }),
            }
        }
        counts.sort_by_key(|c| c.role as u8);
        Ok(counts)
    }

    async fn registration_export(
        &mut self,
        filter: &ExportFilter,
    ) -> AppResult<Vec<RegistrationExportRow>> {
        let tables = self.tables()?;
        let mut rows: Vec<RegistrationExportRow> = tables
            .registrations
            .values()
            .filter(|r| filter.event_id.map_or(true, |id| r.event_id == id))
            .filter(|r| filter.status.map_or(true, |status| r.status == status))
            .filter_map(|r| {
                let user = tables.users.get(&r.user_id)?;
                let event = tables.events.get(&r.event_id)?;
                let ticket = tables
                    .tickets
                    .values()
                    .find(|t| t.registration_id == r.id);
                let payment = tables
                    .payments
                    .values()
                    .filter(|p| p.registration_id == r.id)
                    .max_by_key(|p| p.created_at);
                Some(RegistrationExportRow {
                    registration_id: r.id,
                    ticket_number: ticket.map(|t| t.ticket_number.clone()),
                    full_name: user.full_name.clone(),
                    email: user.email.clone(),
                    event_title: event.title.clone(),
                    event_start: event.start_time,
                    venue: event.venue.clone(),
                    ticket_type: r.ticket_type,
                    status: r.status,
                    payment_reference: payment.map(|p| p.reference.clone()),
                    payment_status: payment.map(|p| p.status),
                    checked_in: ticket.is_some_and(|t| t.checked_in),
                    checked_in_at: ticket.and_then(|t| t.checked_in_at),
                    registered_at: r.created_at,
                })
            })
            .collect();
        rows.sort_by(|a, b| b.registered_at.cmp(&a.registered_at));
        Ok(rows)
    }
}
