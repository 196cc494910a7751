//! In-process gateway for tests: records initializations and answers
//! verifications from a script.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;

use super::{Checkout, GatewayError, GatewayStatus, InitializePayment, PaymentGateway, Verification};

#[derive(Default)]
struct MockState {
    initialized: Vec<InitializePayment>,
    verifications: HashMap<String, Verification>,
    fail_initialize: bool,
    verify_failures_remaining: u32,
    verify_calls: u32,
}

#[derive(Default)]
pub struct MockGateway {
    state: Mutex<MockState>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes every subsequent `initialize` fail as if the processor were down.
    pub fn fail_initialize(&self, fail: bool) {
        self.state().fail_initialize = fail;
    }

    /// The next `count` verifications fail with a transport error.
    pub fn fail_next_verifications(&self, count: u32) {
        self.state().verify_failures_remaining = count;
    }

    /// Scripts the processor's answer for `reference`, charging the amount it
    /// was initialized with.
    pub fn settle(&self, reference: &str, status: GatewayStatus) {
        let mut state = self.state();
        let amount_minor = state
            .initialized
            .iter()
            .find(|req| req.reference == reference)
            .map(|req| req.amount_minor)
            .unwrap_or_default();
        state.verifications.insert(
            reference.to_string(),
            Verification {
                reference: reference.to_string(),
                status,
                amount_minor,
                currency: Some("NGN".to_string()),
                paid_at: (status == GatewayStatus::Success).then(Utc::now),
                gateway_response: Some(format!("{status:?}")),
            },
        );
    }

    /// Scripts an arbitrary verification result.
    pub fn script(&self, verification: Verification) {
        self.state()
            .verifications
            .insert(verification.reference.clone(), verification);
    }

    pub fn initialized(&self) -> Vec<InitializePayment> {
        self.state().initialized.clone()
    }

    pub fn verify_calls(&self) -> u32 {
        self.state().verify_calls
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn initialize(&self, request: InitializePayment) -> Result<Checkout, GatewayError> {
        let mut state = self.state();
        if state.fail_initialize {
            return Err(GatewayError::Transport("connection refused".to_string()));
        }

        let checkout = Checkout {
            authorization_url: format!("https://checkout.test/{}", request.reference),
            access_code: Some(format!("ac_{}", request.reference)),
            reference: request.reference.clone(),
        };
        state.initialized.push(request);
        Ok(checkout)
    }

    async fn verify(&self, reference: &str) -> Result<Verification, GatewayError> {
        let mut state = self.state();
        state.verify_calls += 1;

        if state.verify_failures_remaining > 0 {
            state.verify_failures_remaining -= 1;
            return Err(GatewayError::Timeout);
        }

        if let Some(verification) = state.verifications.get(reference) {
            return Ok(verification.clone());
        }

        let pending = state
            .initialized
            .iter()
            .find(|req| req.reference == reference)
            .map(|req| Verification {
                reference: reference.to_string(),
                status: GatewayStatus::Pending,
                amount_minor: req.amount_minor,
                currency: Some(req.currency.clone()),
                paid_at: None,
                gateway_response: None,
            });

        Ok(pending.unwrap_or_else(|| Verification::unknown(reference, "Transaction reference not found")))
    }
}
