//! Event capacity and waitlist engine.
//!
//! Every check-then-write runs in one transaction that starts by locking the
//! event row. Two admissions for the same event therefore never interleave:
//! the seat count, the waitlist tail and the insert are all read and written
//! under the same lock.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{
    Event, EventStatus, NotificationCategory, Payment, Registration, RegistrationStatus, Ticket,
    TicketType, User, WaitlistEntry,
};
use crate::payments::{Checkout, InitializePayment, PaymentGateway};
use crate::services::notifications::NotificationDispatcher;
use crate::services::tickets::TicketIssuer;
use crate::store::{Store, StoreTx};
use crate::utils::error::{AppError, AppResult};
use crate::utils::{ids, money};

/// Registrations can be cancelled until this long before the event starts.
pub const CANCELLATION_CUTOFF_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CapacitySnapshot {
    pub capacity: i64,
    /// Pending plus confirmed registrations.
    pub current_registrations: i64,
    pub waitlist_count: i64,
    pub available: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventStats {
    pub pending: i64,
    pub confirmed: i64,
    pub cancelled: i64,
    pub waitlisted: i64,
    pub checked_in: i64,
    pub revenue: Decimal,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RegistrationOutcome {
    Registered {
        registration: Registration,
        /// Pending payment for priced events.
        payment: Option<Payment>,
        /// Issued straight away for free events.
        ticket: Option<Ticket>,
        checkout: Option<Checkout>,
    },
    Waitlisted {
        entry: WaitlistEntry,
    },
}

impl RegistrationOutcome {
    pub fn registration(&self) -> Option<&Registration> {
        match self {
            RegistrationOutcome::Registered { registration, .. } => Some(registration),
            RegistrationOutcome::Waitlisted { .. } => None,
        }
    }

    pub fn waitlist_entry(&self) -> Option<&WaitlistEntry> {
        match self {
            RegistrationOutcome::Registered { .. } => None,
            RegistrationOutcome::Waitlisted { entry } => Some(entry),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CancellationOutcome {
    pub registration: Registration,
    /// Head of the waitlist when the cancellation freed a seat. It is not
    /// promoted automatically.
    pub next_in_line: Option<WaitlistEntry>,
}

#[derive(Clone)]
pub struct CapacityEngine {
    store: Arc<dyn Store>,
    gateway: Arc<dyn PaymentGateway>,
    callback_url: Option<String>,
}

impl CapacityEngine {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn PaymentGateway>,
        callback_url: Option<String>,
    ) -> Self {
        Self {
            store,
            gateway,
            callback_url,
        }
    }

    pub async fn check_capacity(&self, event_id: Uuid) -> AppResult<CapacitySnapshot> {
        let mut tx = self.store.begin().await?;
        let event = tx
            .find_event(event_id)
            .await?
            .ok_or_else(|| AppError::not_found("Event", event_id))?;

        let counts = tx.registration_counts(event_id).await?;
        let waitlist_count = tx.list_waitlist(event_id).await?.len() as i64;
        tx.commit().await?;

        let capacity = i64::from(event.capacity);
        Ok(CapacitySnapshot {
            capacity,
            current_registrations: counts.active(),
            waitlist_count,
            available: (capacity - counts.active()).max(0),
        })
    }

    pub async fn get_event_stats(&self, event_id: Uuid) -> AppResult<EventStats> {
        let mut tx = self.store.begin().await?;
        if tx.find_event(event_id).await?.is_none() {
            return Err(AppError::not_found("Event", event_id));
        }

        let counts = tx.registration_counts(event_id).await?;
        let waitlisted = tx.list_waitlist(event_id).await?.len() as i64;
        let checked_in = tx.count_checked_in(event_id).await?;
        let revenue = tx.event_revenue(event_id).await?;
        tx.commit().await?;

        Ok(EventStats {
            pending: counts.pending,
            confirmed: counts.confirmed,
            cancelled: counts.cancelled,
            waitlisted,
            checked_in,
            revenue,
        })
    }

    /// Takes a seat if one is free, otherwise joins the waitlist.
    pub async fn register_for_event(
        &self,
        user_id: Uuid,
        event_id: Uuid,
        ticket_type: TicketType,
    ) -> AppResult<RegistrationOutcome> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;

        let event = tx
            .lock_event(event_id)
            .await?
            .ok_or_else(|| AppError::not_found("Event", event_id))?;
        let user = tx
            .find_user(user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User", user_id))?;

        if !user.is_active() {
            return Err(AppError::InvalidState(format!(
                "Account is {:?} and cannot register for events",
                user.status
            )));
        }
        ensure_open(&event, now)?;

        if tx.find_active_registration(event_id, user_id).await?.is_some() {
            return Err(AppError::AlreadyExists(
                "You are already registered for this event".to_string(),
            ));
        }
        if tx
            .find_waitlist_entry_for_user(event_id, user_id)
            .await?
            .is_some()
        {
            return Err(AppError::AlreadyExists(
                "You are already on the waitlist for this event".to_string(),
            ));
        }

        let counts = tx.registration_counts(event_id).await?;
        let outcome = if counts.active() < i64::from(event.capacity) {
            self.admit(tx.as_mut(), &user, &event, ticket_type, now)
                .await?
        } else {
            let position = tx.max_waitlist_position(event_id).await? + 1;
            let entry = WaitlistEntry {
                id: Uuid::new_v4(),
                event_id,
                user_id,
                ticket_type,
                position,
                created_at: now,
            };
            tx.insert_waitlist_entry(&entry).await?;
            NotificationDispatcher::notify_in(
                tx.as_mut(),
                user_id,
                NotificationCategory::Waitlisted,
                "Added to waitlist",
                &format!(
                    "{} is full. You are number {} on the waitlist.",
                    event.title, position
                ),
                now,
            )
            .await?;

            info!(event_id = %event_id, user_id = %user_id, position, "Registration waitlisted");
            RegistrationOutcome::Waitlisted { entry }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    /// Moves a waitlisted user into a seat. Capacity is checked again under
    /// the event lock, so a stale "next in line" report cannot overfill.
    pub async fn convert_waitlist_to_registration(
        &self,
        entry_id: Uuid,
    ) -> AppResult<RegistrationOutcome> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;

        let event_id = tx
            .find_waitlist_entry(entry_id)
            .await?
            .ok_or_else(|| AppError::not_found("Waitlist entry", entry_id))?
            .event_id;
        let event = tx
            .lock_event(event_id)
            .await?
            .ok_or_else(|| AppError::not_found("Event", event_id))?;
        // Positions may have shifted, or the entry been converted, while we
        // waited for the event lock.
        let entry = tx
            .find_waitlist_entry(entry_id)
            .await?
            .ok_or_else(|| AppError::not_found("Waitlist entry", entry_id))?;

        if event.status != EventStatus::Published {
            return Err(AppError::InvalidState(format!(
                "Event is {:?}; waitlist is closed",
                event.status
            )));
        }

        let counts = tx.registration_counts(event.id).await?;
        if counts.active() >= i64::from(event.capacity) {
            return Err(AppError::CapacityExceeded(format!(
                "{} has no free seats",
                event.title
            )));
        }

        let user = tx
            .find_user(entry.user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User", entry.user_id))?;
        if tx
            .find_active_registration(event.id, user.id)
            .await?
            .is_some()
        {
            return Err(AppError::AlreadyExists(
                "User already holds a registration for this event".to_string(),
            ));
        }

        let outcome = self
            .admit(tx.as_mut(), &user, &event, entry.ticket_type, now)
            .await?;

        tx.delete_waitlist_entry(entry.id).await?;
        tx.close_waitlist_gap(event.id, entry.position).await?;
        NotificationDispatcher::notify_in(
            tx.as_mut(),
            user.id,
            NotificationCategory::WaitlistPromoted,
            "A seat opened up",
            &format!("You have been moved off the waitlist for {}.", event.title),
            now,
        )
        .await?;

        tx.commit().await?;
        info!(
            event_id = %event.id,
            user_id = %user.id,
            former_position = entry.position,
            "Waitlist entry converted"
        );
        Ok(outcome)
    }

    /// Cancels a registration and reports who is next in line. Nobody is
    /// promoted here; an organizer converts the entry explicitly.
    pub async fn cancel_registration(&self, registration_id: Uuid) -> AppResult<CancellationOutcome> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;

        let mut registration = tx
            .find_registration(registration_id)
            .await?
            .ok_or_else(|| AppError::not_found("Registration", registration_id))?;
        let event = tx
            .lock_event(registration.event_id)
            .await?
            .ok_or_else(|| AppError::not_found("Event", registration.event_id))?;

        if registration.status == RegistrationStatus::Cancelled {
            return Err(AppError::InvalidState(
                "Registration is already cancelled".to_string(),
            ));
        }
        if event.start_time - now <= Duration::hours(CANCELLATION_CUTOFF_HOURS) {
            return Err(AppError::InvalidState(format!(
                "Registrations can only be cancelled more than {CANCELLATION_CUTOFF_HOURS} hours before the event"
            )));
        }

        registration.status = RegistrationStatus::Cancelled;
        registration.updated_at = now;
        tx.update_registration(&registration).await?;
        NotificationDispatcher::notify_in(
            tx.as_mut(),
            registration.user_id,
            NotificationCategory::RegistrationCancelled,
            "Registration cancelled",
            &format!("Your registration for {} was cancelled.", event.title),
            now,
        )
        .await?;

        let counts = tx.registration_counts(event.id).await?;
        let next_in_line = if counts.active() < i64::from(event.capacity) {
            tx.list_waitlist(event.id).await?.into_iter().next()
        } else {
            None
        };

        tx.commit().await?;
        info!(
            registration_id = %registration.id,
            event_id = %event.id,
            next_in_line = ?next_in_line.as_ref().map(|e| e.id),
            "Registration cancelled"
        );
        Ok(CancellationOutcome {
            registration,
            next_in_line,
        })
    }

    pub async fn get_registration(&self, registration_id: Uuid) -> AppResult<Registration> {
        let mut tx = self.store.begin().await?;
        let registration = tx
            .find_registration(registration_id)
            .await?
            .ok_or_else(|| AppError::not_found("Registration", registration_id))?;
        tx.commit().await?;
        Ok(registration)
    }

    pub async fn list_waitlist(&self, event_id: Uuid) -> AppResult<Vec<WaitlistEntry>> {
        let mut tx = self.store.begin().await?;
        if tx.find_event(event_id).await?.is_none() {
            return Err(AppError::not_found("Event", event_id));
        }
        let entries = tx.list_waitlist(event_id).await?;
        tx.commit().await?;
        Ok(entries)
    }

    /// Creates the registration for a user who has a seat. Free events are
    /// confirmed and ticketed at once; priced events get a pending payment
    /// and a checkout from the processor. A gateway failure aborts the
    /// caller's transaction, so no seat is taken without a checkout.
    async fn admit(
        &self,
        tx: &mut dyn StoreTx,
        user: &User,
        event: &Event,
        ticket_type: TicketType,
        now: DateTime<Utc>,
    ) -> AppResult<RegistrationOutcome> {
        if event.is_free() {
            let registration = Registration::new(
                user.id,
                event.id,
                ticket_type,
                RegistrationStatus::Confirmed,
                now,
            );
            tx.insert_registration(&registration).await?;
            let ticket = TicketIssuer::issue_in(tx, &registration, now).await?;
            NotificationDispatcher::notify_in(
                tx,
                user.id,
                NotificationCategory::RegistrationConfirmed,
                "Registration confirmed",
                &format!(
                    "You're in for {}. Your ticket number is {}.",
                    event.title, ticket.ticket_number
                ),
                now,
            )
            .await?;

            info!(event_id = %event.id, user_id = %user.id, "Free registration confirmed");
            return Ok(RegistrationOutcome::Registered {
                registration,
                payment: None,
                ticket: Some(ticket),
                checkout: None,
            });
        }

        let amount_minor = money::to_minor_units(event.price)?;
        let registration = Registration::new(
            user.id,
            event.id,
            ticket_type,
            RegistrationStatus::Pending,
            now,
        );
        tx.insert_registration(&registration).await?;

        let payment = Payment::pending(
            registration.id,
            event.price,
            &event.currency,
            ids::payment_reference(now),
            now,
        );
        tx.insert_payment(&payment).await?;
        NotificationDispatcher::notify_in(
            tx,
            user.id,
            NotificationCategory::RegistrationPending,
            "Complete your payment",
            &format!(
                "A seat at {} is held for you pending payment of {} {}.",
                event.title, event.currency, event.price
            ),
            now,
        )
        .await?;

        let checkout = self
            .gateway
            .initialize(InitializePayment {
                email: user.email.clone(),
                amount_minor,
                currency: event.currency.clone(),
                reference: payment.reference.clone(),
                callback_url: self.callback_url.clone(),
                metadata: json!({
                    "registration_id": registration.id,
                    "event_id": event.id,
                    "user_id": user.id,
                }),
            })
            .await
            .map_err(|err| {
                warn!(
                    event_id = %event.id,
                    reference = %payment.reference,
                    error = %err,
                    "Payment initialization failed; admission rolled back"
                );
                AppError::Gateway(err)
            })?;

        info!(
            event_id = %event.id,
            user_id = %user.id,
            reference = %payment.reference,
            "Registration pending payment"
        );
        Ok(RegistrationOutcome::Registered {
            registration,
            payment: Some(payment),
            ticket: None,
            checkout: Some(checkout),
        })
    }
}

fn ensure_open(event: &Event, now: DateTime<Utc>) -> AppResult<()> {
    if event.status != EventStatus::Published {
        return Err(AppError::InvalidState(format!(
            "Event is {:?} and not open for registration",
            event.status
        )));
    }
    if event.has_started(now) {
        return Err(AppError::InvalidState(
            "Registration closed when the event started".to_string(),
        ));
    }
    Ok(())
}
