use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::models::{NotificationCategory, Registration, RegistrationStatus, ScanPayload, Ticket};
use crate::services::notifications::NotificationDispatcher;
use crate::store::{Store, StoreTx};
use crate::utils::error::{AppError, AppResult};
use crate::utils::ids;

#[derive(Debug, Clone, Serialize)]
pub struct CheckIn {
    pub ticket: Ticket,
    /// The ticket had been scanned before; its original timestamp is kept.
    pub already_checked_in: bool,
}

#[derive(Clone)]
pub struct TicketIssuer {
    store: Arc<dyn Store>,
}

impl TicketIssuer {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn issue_ticket(&self, registration_id: Uuid) -> AppResult<Ticket> {
        let mut tx = self.store.begin().await?;
        let registration = tx
            .find_registration(registration_id)
            .await?
            .ok_or_else(|| AppError::not_found("Registration", registration_id))?;

        if registration.status != RegistrationStatus::Confirmed {
            return Err(AppError::InvalidState(format!(
                "Registration is {:?}; only confirmed registrations get tickets",
                registration.status
            )));
        }
        if tx.find_ticket_for_registration(registration_id).await?.is_some() {
            return Err(AppError::AlreadyExists(
                "A ticket was already issued for this registration".to_string(),
            ));
        }

        let ticket = Self::issue_in(tx.as_mut(), &registration, Utc::now()).await?;
        tx.commit().await?;
        Ok(ticket)
    }

    /// Creates the ticket inside the caller's transaction. The store rejects
    /// a second ticket for the same registration.
    pub(crate) async fn issue_in(
        tx: &mut dyn StoreTx,
        registration: &Registration,
        now: DateTime<Utc>,
    ) -> AppResult<Ticket> {
        let ticket_number = ids::ticket_number(now);
        let payload = ScanPayload {
            ticket_number: ticket_number.clone(),
            event_id: registration.event_id,
            user_id: registration.user_id,
        };
        let qr_payload = serde_json::to_string(&payload)
            .map_err(|e| AppError::InternalServerError(format!("Ticket payload: {e}")))?;

        let ticket = Ticket {
            id: Uuid::new_v4(),
            registration_id: registration.id,
            event_id: registration.event_id,
            user_id: registration.user_id,
            ticket_number,
            qr_payload,
            checked_in: false,
            checked_in_at: None,
            created_at: now,
        };
        tx.insert_ticket(&ticket).await?;

        info!(
            registration_id = %registration.id,
            ticket_number = %ticket.ticket_number,
            "Ticket issued"
        );
        Ok(ticket)
    }

    /// Admits the ticket holder. Scanning an admitted ticket again succeeds
    /// and reports `already_checked_in`.
    pub async fn check_in(
        &self,
        ticket_number: &str,
        expected_event: Option<Uuid>,
    ) -> AppResult<CheckIn> {
        let mut tx = self.store.begin().await?;
        let mut ticket = tx
            .lock_ticket_by_number(ticket_number)
            .await?
            .ok_or_else(|| AppError::not_found("Ticket", ticket_number))?;

        if let Some(event_id) = expected_event {
            if ticket.event_id != event_id {
                return Err(AppError::InvalidState(
                    "Ticket is for a different event".to_string(),
                ));
            }
        }

        if ticket.checked_in {
            return Ok(CheckIn {
                ticket,
                already_checked_in: true,
            });
        }

        let registration = tx
            .find_registration(ticket.registration_id)
            .await?
            .ok_or_else(|| AppError::not_found("Registration", ticket.registration_id))?;
        if registration.status == RegistrationStatus::Cancelled {
            return Err(AppError::InvalidState(
                "Registration for this ticket was cancelled".to_string(),
            ));
        }

        let now = Utc::now();
        ticket.checked_in = true;
        ticket.checked_in_at = Some(now);
        tx.update_ticket(&ticket).await?;
        NotificationDispatcher::notify_in(
            tx.as_mut(),
            ticket.user_id,
            NotificationCategory::CheckedIn,
            "Checked in",
            &format!("Ticket {} was checked in. Enjoy the event!", ticket.ticket_number),
            now,
        )
        .await?;
        tx.commit().await?;

        info!(
            ticket_number = %ticket.ticket_number,
            event_id = %ticket.event_id,
            "Attendee checked in"
        );
        Ok(CheckIn {
            ticket,
            already_checked_in: false,
        })
    }

    /// Checks in from the raw JSON a scanner read off the ticket.
    pub async fn check_in_scan(
        &self,
        payload: &str,
        expected_event: Option<Uuid>,
    ) -> AppResult<CheckIn> {
        let scanned: ScanPayload = serde_json::from_str(payload)
            .map_err(|e| AppError::ValidationError(format!("Unreadable ticket code: {e}")))?;

        let ticket = self.find_ticket(&scanned.ticket_number).await?;
        if ticket.event_id != scanned.event_id || ticket.user_id != scanned.user_id {
            return Err(AppError::InvalidState(
                "Scanned code does not match the ticket on record".to_string(),
            ));
        }

        self.check_in(&scanned.ticket_number, expected_event).await
    }

    pub async fn find_ticket(&self, ticket_number: &str) -> AppResult<Ticket> {
        let mut tx = self.store.begin().await?;
        let ticket = tx
            .lock_ticket_by_number(ticket_number)
            .await?
            .ok_or_else(|| AppError::not_found("Ticket", ticket_number))?;
        tx.commit().await?;
        Ok(ticket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Role, TicketType};
    use crate::services::fixtures;
    use crate::store::MemoryStore;
    use rust_decimal::Decimal;

    async fn confirmed_registration(store: &MemoryStore) -> Registration {
        let organizer = fixtures::seed_user(store, Role::Organizer).await;
        let member = fixtures::seed_user(store, Role::Member).await;
        let event = fixtures::seed_event(store, organizer.id, 10, Decimal::ZERO).await;
        fixtures::seed_registration(store, member.id, event.id, RegistrationStatus::Confirmed)
            .await
    }

    #[tokio::test]
    async fn test_issue_ticket_twice_is_rejected() {
        let store = MemoryStore::new();
        let registration = confirmed_registration(&store).await;
        let issuer = TicketIssuer::new(Arc::new(store));

        let ticket = issuer.issue_ticket(registration.id).await.unwrap();
        assert!(ticket.ticket_number.starts_with("TKT-"));
        let payload: ScanPayload = serde_json::from_str(&ticket.qr_payload).unwrap();
        assert_eq!(payload.ticket_number, ticket.ticket_number);
        assert_eq!(payload.event_id, registration.event_id);

        assert!(matches!(
            issuer.issue_ticket(registration.id).await,
            Err(AppError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_pending_registration_gets_no_ticket() {
        let store = MemoryStore::new();
        let organizer = fixtures::seed_user(&store, Role::Organizer).await;
        let member = fixtures::seed_user(&store, Role::Member).await;
        let event = fixtures::seed_event(&store, organizer.id, 10, Decimal::new(5000, 0)).await;
        let registration =
            fixtures::seed_registration(&store, member.id, event.id, RegistrationStatus::Pending)
                .await;
        let issuer = TicketIssuer::new(Arc::new(store));

        assert!(matches!(
            issuer.issue_ticket(registration.id).await,
            Err(AppError::InvalidState(_))
        ));
        assert!(matches!(
            issuer.issue_ticket(Uuid::new_v4()).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_check_in_twice_keeps_first_timestamp() {
        let store = MemoryStore::new();
        let registration = confirmed_registration(&store).await;
        let issuer = TicketIssuer::new(Arc::new(store));
        let ticket = issuer.issue_ticket(registration.id).await.unwrap();

        let first = issuer
            .check_in(&ticket.ticket_number, Some(registration.event_id))
            .await
            .unwrap();
        assert!(!first.already_checked_in);
        assert!(first.ticket.checked_in);

        let second = issuer.check_in(&ticket.ticket_number, None).await.unwrap();
        assert!(second.already_checked_in);
        assert_eq!(second.ticket.checked_in_at, first.ticket.checked_in_at);
    }

    #[tokio::test]
    async fn test_rescan_after_cancellation_stays_checked_in() {
        let store = MemoryStore::new();
        let mut registration = confirmed_registration(&store).await;
        let issuer = TicketIssuer::new(Arc::new(store.clone()));
        let admitted = issuer.issue_ticket(registration.id).await.unwrap();
        let unused = {
            let organizer = fixtures::seed_user(&store, Role::Organizer).await;
            let member = fixtures::seed_user(&store, Role::Member).await;
            let event = fixtures::seed_event(&store, organizer.id, 10, Decimal::ZERO).await;
            let other = fixtures::seed_registration(
                &store,
                member.id,
                event.id,
                RegistrationStatus::Confirmed,
            )
            .await;
            let ticket = issuer.issue_ticket(other.id).await.unwrap();
            let mut cancelled = other;
            cancelled.status = RegistrationStatus::Cancelled;
            let mut tx = store.begin().await.unwrap();
            tx.update_registration(&cancelled).await.unwrap();
            tx.commit().await.unwrap();
            ticket
        };

        let first = issuer.check_in(&admitted.ticket_number, None).await.unwrap();

        registration.status = RegistrationStatus::Cancelled;
        let mut tx = store.begin().await.unwrap();
        tx.update_registration(&registration).await.unwrap();
        tx.commit().await.unwrap();

        let again = issuer.check_in(&admitted.ticket_number, None).await.unwrap();
        assert!(again.already_checked_in);
        assert_eq!(again.ticket.checked_in_at, first.ticket.checked_in_at);

        assert!(matches!(
            issuer.check_in(&unused.ticket_number, None).await,
            Err(AppError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_check_in_rejects_wrong_event_and_unknown_ticket() {
        let store = MemoryStore::new();
        let registration = confirmed_registration(&store).await;
        let issuer = TicketIssuer::new(Arc::new(store));
        let ticket = issuer.issue_ticket(registration.id).await.unwrap();

        assert!(matches!(
            issuer
                .check_in(&ticket.ticket_number, Some(Uuid::new_v4()))
                .await,
            Err(AppError::InvalidState(_))
        ));
        assert!(matches!(
            issuer.check_in("TKT-NOPE-000000", None).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_scan_payload_check_in() {
        let store = MemoryStore::new();
        let registration = confirmed_registration(&store).await;
        let issuer = TicketIssuer::new(Arc::new(store));
        let ticket = issuer.issue_ticket(registration.id).await.unwrap();

        let result = issuer.check_in_scan(&ticket.qr_payload, None).await.unwrap();
        assert!(result.ticket.checked_in);

        assert!(matches!(
            issuer.check_in_scan("{not json", None).await,
            Err(AppError::ValidationError(_))
        ));

        let forged = serde_json::to_string(&ScanPayload {
            ticket_number: ticket.ticket_number.clone(),
            event_id: ticket.event_id,
            user_id: Uuid::new_v4(),
        })
        .unwrap();
        assert!(matches!(
            issuer.check_in_scan(&forged, None).await,
            Err(AppError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_issue_in_links_ticket_to_registration() {
        let store = MemoryStore::new();
        let registration = confirmed_registration(&store).await;
        let mut tx = store.begin().await.unwrap();
        let ticket = TicketIssuer::issue_in(tx.as_mut(), &registration, Utc::now())
            .await
            .unwrap();
        assert_eq!(ticket.registration_id, registration.id);
        assert_eq!(registration.ticket_type, TicketType::Regular);
    }
}
