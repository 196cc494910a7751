//! Payment reconciliation.
//!
//! Verification results (polled, pushed by webhook, or confirmed by an admin)
//! are applied under a row lock on the payment. Only pending payments move,
//! so applying the same result twice is a no-op and a registration never gets
//! a second ticket.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{
    NotificationCategory, Payment, PaymentStatus, Registration, RegistrationStatus, Ticket,
};
use crate::payments::webhook::{self, WebhookEvent};
use crate::payments::{GatewayStatus, PaymentGateway, Verification};
use crate::services::notifications::NotificationDispatcher;
use crate::services::tickets::TicketIssuer;
use crate::store::{Store, StoreTx};
use crate::utils::error::{AppError, AppResult};
use crate::utils::money;
use crate::utils::retry::{retry_if, RetryPolicy};

#[derive(Debug, Clone, Serialize)]
pub struct PaymentConfirmation {
    pub payment: Payment,
    pub registration: Registration,
    pub ticket: Option<Ticket>,
    /// False when the payment was already final or the processor had no
    /// final answer yet.
    pub changed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    pub checked: usize,
    pub confirmed: usize,
    pub failed: usize,
    pub still_pending: usize,
    pub errors: usize,
}

#[derive(Clone)]
pub struct CheckoutService {
    store: Arc<dyn Store>,
    gateway: Arc<dyn PaymentGateway>,
    webhook_secret: String,
    retry: RetryPolicy,
}

impl CheckoutService {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn PaymentGateway>,
        webhook_secret: impl Into<String>,
    ) -> Self {
        Self {
            store,
            gateway,
            webhook_secret: webhook_secret.into(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The user who owes the payment behind `reference`.
    pub async fn payer_of(&self, reference: &str) -> AppResult<Uuid> {
        let mut tx = self.store.begin().await?;
        let payment = tx
            .lock_payment_by_reference(reference)
            .await?
            .ok_or_else(|| AppError::not_found("Payment", reference))?;
        let registration = load_registration(tx.as_mut(), &payment).await?;
        tx.commit().await?;
        Ok(registration.user_id)
    }

    /// Asks the processor about `reference` and records the answer.
    pub async fn verify_payment(&self, reference: &str) -> AppResult<PaymentConfirmation> {
        {
            let mut tx = self.store.begin().await?;
            let payment = tx
                .lock_payment_by_reference(reference)
                .await?
                .ok_or_else(|| AppError::not_found("Payment", reference))?;
            if payment.status.is_terminal() {
                let confirmation = unchanged(tx.as_mut(), payment).await?;
                tx.commit().await?;
                return Ok(confirmation);
            }
        }

        let verification = self.gateway.verify(reference).await?;
        self.apply_verification(verification).await
    }

    /// Records a processor answer. Safe to call any number of times with the
    /// same result.
    pub async fn apply_verification(
        &self,
        verification: Verification,
    ) -> AppResult<PaymentConfirmation> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;

        let payment = tx
            .lock_payment_by_reference(&verification.reference)
            .await?
            .ok_or_else(|| AppError::not_found("Payment", &verification.reference))?;

        if payment.status.is_terminal() {
            let confirmation = unchanged(tx.as_mut(), payment).await?;
            tx.commit().await?;
            return Ok(confirmation);
        }

        let confirmation = match verification.status {
            GatewayStatus::Success => match mismatch(&payment, &verification)? {
                None => {
                    settle_success(
                        tx.as_mut(),
                        payment,
                        verification.paid_at.unwrap_or(now),
                        verification.gateway_response,
                        now,
                    )
                    .await?
                }
                Some(reason) => {
                    warn!(
                        reference = %payment.reference,
                        %reason,
                        "Charge does not match payment"
                    );
                    settle_failure(tx.as_mut(), payment, reason, now).await?
                }
            },
            GatewayStatus::Failed => {
                let reason = verification
                    .gateway_response
                    .unwrap_or_else(|| "Payment failed".to_string());
                settle_failure(tx.as_mut(), payment, reason, now).await?
            }
            GatewayStatus::Pending | GatewayStatus::Unknown => {
                info!(
                    reference = %payment.reference,
                    status = ?verification.status,
                    "Payment not final yet"
                );
                unchanged(tx.as_mut(), payment).await?
            }
        };

        tx.commit().await?;
        Ok(confirmation)
    }

    /// Verifies the signature and applies charge events. Events for other
    /// products and references this portal never issued are acknowledged and
    /// dropped, so the processor does not keep redelivering them.
    pub async fn handle_webhook(
        &self,
        signature: Option<&str>,
        body: &[u8],
    ) -> AppResult<Option<PaymentConfirmation>> {
        webhook::verify_signature(&self.webhook_secret, body, signature)?;
        let event = WebhookEvent::parse(body)?;
        let name = event.event.clone();

        let Some(verification) = event.into_verification() else {
            info!(event = %name, "Ignoring webhook event");
            return Ok(None);
        };

        match self.apply_verification(verification).await {
            Ok(confirmation) => Ok(Some(confirmation)),
            Err(AppError::NotFound(msg)) => {
                warn!(event = %name, %msg, "Webhook for unknown payment ignored");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Admin confirmation of an offline payment (bank transfer, cash).
    pub async fn confirm_manually(&self, payment_id: Uuid) -> AppResult<PaymentConfirmation> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let payment = tx
            .lock_payment(payment_id)
            .await?
            .ok_or_else(|| AppError::not_found("Payment", payment_id))?;

        let confirmation = match payment.status {
            PaymentStatus::Pending => {
                settle_success(
                    tx.as_mut(),
                    payment,
                    now,
                    Some("Confirmed manually".to_string()),
                    now,
                )
                .await?
            }
            PaymentStatus::Success => unchanged(tx.as_mut(), payment).await?,
            PaymentStatus::Failed => {
                return Err(AppError::InvalidState(
                    "Payment already failed and cannot be confirmed".to_string(),
                ));
            }
        };

        tx.commit().await?;
        info!(
            payment_id = %payment_id,
            changed = confirmation.changed,
            "Manual payment confirmation"
        );
        Ok(confirmation)
    }

    /// Re-verifies payments left pending for longer than `older_than`.
    /// Transient gateway failures are retried with backoff; a payment that
    /// still errors is counted and left for the next sweep.
    pub async fn reconcile_pending(&self, older_than: Duration) -> AppResult<ReconcileSummary> {
        let cutoff = Utc::now() - older_than;
        let stale = {
            let mut tx = self.store.begin().await?;
            let payments = tx.list_payments(PaymentStatus::Pending, cutoff).await?;
            tx.commit().await?;
            payments
        };

        let mut summary = ReconcileSummary::default();
        for payment in stale {
            summary.checked += 1;
            let verified = retry_if(&self.retry, AppError::is_transient, || {
                self.verify_remote(&payment.reference)
            })
            .await;

            match verified {
                Ok(verification) => match self.apply_verification(verification).await {
                    Ok(confirmation) => match confirmation.payment.status {
                        PaymentStatus::Success => summary.confirmed += 1,
                        PaymentStatus::Failed => summary.failed += 1,
                        PaymentStatus::Pending => summary.still_pending += 1,
                    },
                    Err(err) => {
                        warn!(
                            reference = %payment.reference,
                            error = %err,
                            "Could not apply verification"
                        );
                        summary.errors += 1;
                    }
                },
                Err(err) => {
                    warn!(
                        reference = %payment.reference,
                        error = %err,
                        "Verification failed after retries"
                    );
                    summary.errors += 1;
                }
            }
        }

        info!(
            checked = summary.checked,
            confirmed = summary.confirmed,
            failed = summary.failed,
            still_pending = summary.still_pending,
            errors = summary.errors,
            "Pending payments reconciled"
        );
        Ok(summary)
    }

    async fn verify_remote(&self, reference: &str) -> AppResult<Verification> {
        Ok(self.gateway.verify(reference).await?)
    }
}

/// Why a reported success cannot be accepted for `payment`, if it can't.
fn mismatch(payment: &Payment, verification: &Verification) -> AppResult<Option<String>> {
    let expected = money::to_minor_units(payment.amount)?;
    if verification.amount_minor != expected {
        return Ok(Some(format!(
            "Amount mismatch: expected {expected}, charged {}",
            verification.amount_minor
        )));
    }
    if let Some(currency) = &verification.currency {
        if !currency.eq_ignore_ascii_case(&payment.currency) {
            return Ok(Some(format!(
                "Currency mismatch: expected {}, charged {currency}",
                payment.currency
            )));
        }
    }
    Ok(None)
}

async fn load_registration(tx: &mut dyn StoreTx, payment: &Payment) -> AppResult<Registration> {
    tx.find_registration(payment.registration_id)
        .await?
        .ok_or_else(|| AppError::not_found("Registration", payment.registration_id))
}

async fn unchanged(tx: &mut dyn StoreTx, payment: Payment) -> AppResult<PaymentConfirmation> {
    let registration = load_registration(tx, &payment).await?;
    let ticket = tx.find_ticket_for_registration(registration.id).await?;
    Ok(PaymentConfirmation {
        payment,
        registration,
        ticket,
        changed: false,
    })
}

async fn settle_success(
    tx: &mut dyn StoreTx,
    mut payment: Payment,
    paid_at: DateTime<Utc>,
    gateway_response: Option<String>,
    now: DateTime<Utc>,
) -> AppResult<PaymentConfirmation> {
    let mut registration = load_registration(tx, &payment).await?;

    payment.status = PaymentStatus::Success;
    payment.paid_at = Some(paid_at);
    payment.gateway_response = gateway_response;
    payment.updated_at = now;
    tx.update_payment(&payment).await?;
    NotificationDispatcher::notify_in(
        tx,
        registration.user_id,
        NotificationCategory::PaymentReceived,
        "Payment received",
        &format!(
            "We received {} {} (ref {}).",
            payment.currency, payment.amount, payment.reference
        ),
        now,
    )
    .await?;

    if registration.status == RegistrationStatus::Cancelled {
        warn!(
            reference = %payment.reference,
            registration_id = %registration.id,
            "Payment succeeded for a cancelled registration; no ticket issued"
        );
        return Ok(PaymentConfirmation {
            payment,
            registration,
            ticket: None,
            changed: true,
        });
    }

    registration.status = RegistrationStatus::Confirmed;
    registration.updated_at = now;
    tx.update_registration(&registration).await?;

    let ticket = match tx.find_ticket_for_registration(registration.id).await? {
        Some(existing) => existing,
        None => TicketIssuer::issue_in(tx, &registration, now).await?,
    };
    NotificationDispatcher::notify_in(
        tx,
        registration.user_id,
        NotificationCategory::RegistrationConfirmed,
        "Registration confirmed",
        &format!("You're in. Your ticket number is {}.", ticket.ticket_number),
        now,
    )
    .await?;

    info!(
        reference = %payment.reference,
        registration_id = %registration.id,
        "Payment confirmed"
    );
    Ok(PaymentConfirmation {
        payment,
        registration,
        ticket: Some(ticket),
        changed: true,
    })
}

async fn settle_failure(
    tx: &mut dyn StoreTx,
    mut payment: Payment,
    reason: String,
    now: DateTime<Utc>,
) -> AppResult<PaymentConfirmation> {
    let mut registration = load_registration(tx, &payment).await?;

    payment.status = PaymentStatus::Failed;
    payment.gateway_response = Some(reason.clone());
    payment.updated_at = now;
    tx.update_payment(&payment).await?;

    if registration.status != RegistrationStatus::Cancelled {
        registration.status = RegistrationStatus::Cancelled;
        registration.updated_at = now;
        tx.update_registration(&registration).await?;
    }

    NotificationDispatcher::notify_in(
        tx,
        registration.user_id,
        NotificationCategory::PaymentFailed,
        "Payment failed",
        &format!(
            "Payment {} did not go through ({reason}). Your seat has been released.",
            payment.reference
        ),
        now,
    )
    .await?;

    info!(
        reference = %payment.reference,
        registration_id = %registration.id,
        "Payment failed"
    );
    Ok(PaymentConfirmation {
        payment,
        registration,
        ticket: None,
        changed: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    use rust_decimal::Decimal;

    use crate::models::{Role, TicketType};
    use crate::payments::mock::MockGateway;
    use crate::services::capacity::CapacityEngine;
    use crate::services::fixtures;
    use crate::store::MemoryStore;

    const SECRET: &str = "sk_test_webhook";

    struct Harness {
        store: MemoryStore,
        gateway: Arc<MockGateway>,
        engine: CapacityEngine,
        checkout: CheckoutService,
    }

    fn harness() -> Harness {
        let store = MemoryStore::new();
        let gateway = Arc::new(MockGateway::new());
        let engine = CapacityEngine::new(Arc::new(store.clone()), gateway.clone(), None);
        let checkout = CheckoutService::new(Arc::new(store.clone()), gateway.clone(), SECRET)
            .with_retry_policy(RetryPolicy {
                max_attempts: 3,
                initial_delay: StdDuration::from_millis(1),
                max_delay: StdDuration::from_millis(5),
                multiplier: 2.0,
            });
        Harness {
            store,
            gateway,
            engine,
            checkout,
        }
    }

    async fn pending_payment(h: &Harness, capacity: i32) -> Payment {
        let organizer = fixtures::seed_user(&h.store, Role::Organizer).await;
        let member = fixtures::seed_user(&h.store, Role::Member).await;
        let event =
            fixtures::seed_event(&h.store, organizer.id, capacity, Decimal::new(5_000, 0)).await;
        match h
            .engine
            .register_for_event(member.id, event.id, TicketType::Regular)
            .await
            .unwrap()
        {
            crate::services::RegistrationOutcome::Registered { payment, .. } => payment.unwrap(),
            other => panic!("expected a seat, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_verify_twice_issues_one_ticket() {
        let h = harness();
        let payment = pending_payment(&h, 5).await;
        h.gateway.settle(&payment.reference, GatewayStatus::Success);

        let first = h.checkout.verify_payment(&payment.reference).await.unwrap();
        assert!(first.changed);
        assert_eq!(first.payment.status, PaymentStatus::Success);
        assert_eq!(first.registration.status, RegistrationStatus::Confirmed);
        let ticket = first.ticket.unwrap();

        let second = h.checkout.verify_payment(&payment.reference).await.unwrap();
        assert!(!second.changed);
        assert_eq!(second.payment.status, PaymentStatus::Success);
        assert_eq!(second.ticket.unwrap().id, ticket.id);
        // The second call never reached the processor.
        assert_eq!(h.gateway.verify_calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_charge_releases_the_seat() {
        let h = harness();
        let payment = pending_payment(&h, 1).await;
        h.gateway.settle(&payment.reference, GatewayStatus::Failed);

        let result = h.checkout.verify_payment(&payment.reference).await.unwrap();
        assert_eq!(result.payment.status, PaymentStatus::Failed);
        assert_eq!(result.registration.status, RegistrationStatus::Cancelled);
        assert!(result.ticket.is_none());

        let snapshot = h
            .engine
            .check_capacity(result.registration.event_id)
            .await
            .unwrap();
        assert_eq!(snapshot.available, 1);
    }

    #[tokio::test]
    async fn test_amount_mismatch_is_treated_as_failure() {
        let h = harness();
        let payment = pending_payment(&h, 5).await;
        h.gateway.script(Verification {
            reference: payment.reference.clone(),
            status: GatewayStatus::Success,
            amount_minor: 100,
            currency: Some("NGN".to_string()),
            paid_at: None,
            gateway_response: Some("Approved".to_string()),
        });

        let result = h.checkout.verify_payment(&payment.reference).await.unwrap();
        assert_eq!(result.payment.status, PaymentStatus::Failed);
        assert!(result
            .payment
            .gateway_response
            .unwrap()
            .contains("Amount mismatch"));
    }

    #[tokio::test]
    async fn test_pending_answer_changes_nothing() {
        let h = harness();
        let payment = pending_payment(&h, 5).await;

        let result = h.checkout.verify_payment(&payment.reference).await.unwrap();
        assert!(!result.changed);
        assert_eq!(result.payment.status, PaymentStatus::Pending);
        assert_eq!(result.registration.status, RegistrationStatus::Pending);

        assert!(matches!(
            h.checkout.verify_payment("REG_0_NOPE").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_success_after_cancellation_issues_no_ticket() {
        let h = harness();
        let payment = pending_payment(&h, 5).await;
        h.engine
            .cancel_registration(payment.registration_id)
            .await
            .unwrap();
        h.gateway.settle(&payment.reference, GatewayStatus::Success);

        let result = h.checkout.verify_payment(&payment.reference).await.unwrap();
        assert_eq!(result.payment.status, PaymentStatus::Success);
        assert_eq!(result.registration.status, RegistrationStatus::Cancelled);
        assert!(result.ticket.is_none());
    }

    #[tokio::test]
    async fn test_signed_webhook_confirms_payment() {
        let h = harness();
        let payment = pending_payment(&h, 5).await;
        let body = serde_json::json!({
            "event": "charge.success",
            "data": {
                "reference": payment.reference,
                "amount": 500_000,
                "currency": "NGN",
                "status": "success"
            }
        })
        .to_string();
        let signature = webhook::sign(SECRET, body.as_bytes()).unwrap();

        let applied = h
            .checkout
            .handle_webhook(Some(&signature), body.as_bytes())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(applied.payment.status, PaymentStatus::Success);
        assert!(applied.ticket.is_some());

        // Redelivery is harmless.
        let again = h
            .checkout
            .handle_webhook(Some(&signature), body.as_bytes())
            .await
            .unwrap()
            .unwrap();
        assert!(!again.changed);
        assert_eq!(again.ticket.unwrap().id, applied.ticket.unwrap().id);
    }

    #[tokio::test]
    async fn test_webhook_rejects_bad_signature_and_ignores_strangers() {
        let h = harness();
        let body = br#"{"event":"charge.success","data":{"reference":"REG_0_UNKNOWN","amount":1}}"#;

        assert!(matches!(
            h.checkout.handle_webhook(Some("deadbeef"), body).await,
            Err(AppError::AuthError(_))
        ));

        let signature = webhook::sign(SECRET, body).unwrap();
        assert!(h
            .checkout
            .handle_webhook(Some(&signature), body)
            .await
            .unwrap()
            .is_none());

        let transfer = br#"{"event":"transfer.success","data":{"reference":"TRF_1"}}"#;
        let signature = webhook::sign(SECRET, transfer).unwrap();
        assert!(h
            .checkout
            .handle_webhook(Some(&signature), transfer)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_manual_confirmation() {
        let h = harness();
        let payment = pending_payment(&h, 5).await;

        let confirmed = h.checkout.confirm_manually(payment.id).await.unwrap();
        assert!(confirmed.changed);
        assert!(confirmed.ticket.is_some());

        let again = h.checkout.confirm_manually(payment.id).await.unwrap();
        assert!(!again.changed);

        assert!(matches!(
            h.checkout.confirm_manually(Uuid::new_v4()).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_reconcile_retries_transient_failures() {
        let h = harness();
        let settled = pending_payment(&h, 5).await;
        let abandoned = pending_payment(&h, 5).await;
        let _waiting = pending_payment(&h, 5).await;
        h.gateway.settle(&settled.reference, GatewayStatus::Success);
        h.gateway.settle(&abandoned.reference, GatewayStatus::Failed);
        h.gateway.fail_next_verifications(2);

        let summary = h
            .checkout
            .reconcile_pending(Duration::seconds(-1))
            .await
            .unwrap();

        assert_eq!(summary.checked, 3);
        assert_eq!(summary.confirmed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.still_pending, 1);
        assert_eq!(summary.errors, 0);
        // Three payments plus the two injected timeouts.
        assert_eq!(h.gateway.verify_calls(), 5);

    }

    #[tokio::test]
    async fn test_reconcile_gives_up_after_policy_attempts() {
        let h = harness();
        pending_payment(&h, 5).await;
        h.gateway.fail_next_verifications(10);

        let summary = h
            .checkout
            .reconcile_pending(Duration::seconds(-1))
            .await
            .unwrap();
        assert_eq!(summary.checked, 1);
        assert_eq!(summary.errors, 1);
        assert_eq!(h.gateway.verify_calls(), 3);
    }
}
