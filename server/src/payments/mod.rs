//! Payment processor adapter.
//!
//! The gateway is stateless: it initializes and verifies transactions and maps
//! the processor's answer onto [`GatewayStatus`]. Persisting the outcome (and
//! refusing to apply a second success) is the reconciliation service's job.

pub mod paystack;
pub mod webhook;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use paystack::PaystackClient;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("request to payment processor timed out")]
    Timeout,

    #[error("could not reach payment processor: {0}")]
    Transport(String),

    #[error("payment processor rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("payment processor returned an unreadable response: {0}")]
    Decode(String),
}

impl GatewayError {
    /// Timeouts, transport failures and processor-side 5xx are worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            GatewayError::Timeout | GatewayError::Transport(_) => true,
            GatewayError::Rejected { status, .. } => *status >= 500,
            GatewayError::Decode(_) => false,
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout
        } else if err.is_decode() {
            GatewayError::Decode(err.to_string())
        } else {
            GatewayError::Transport(err.to_string())
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InitializePayment {
    pub email: String,
    /// Minor currency units (kobo).
    pub amount_minor: i64,
    pub currency: String,
    pub reference: String,
    pub callback_url: Option<String>,
    pub metadata: Value,
}

/// Where to send the payer to complete a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkout {
    pub authorization_url: String,
    pub access_code: Option<String>,
    pub reference: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayStatus {
    Success,
    Failed,
    Pending,
    /// The processor answered but reported a failure of its own (unknown
    /// reference, bad request). Not an error; nothing should change.
    Unknown,
}

impl GatewayStatus {
    pub fn from_processor(status: &str) -> Self {
        match status {
            "success" => GatewayStatus::Success,
            "failed" | "abandoned" | "reversed" => GatewayStatus::Failed,
            _ => GatewayStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    pub reference: String,
    pub status: GatewayStatus,
    pub amount_minor: i64,
    pub currency: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub gateway_response: Option<String>,
}

impl Verification {
    pub fn unknown(reference: &str, message: impl Into<String>) -> Self {
        Self {
            reference: reference.to_string(),
            status: GatewayStatus::Unknown,
            amount_minor: 0,
            currency: None,
            paid_at: None,
            gateway_response: Some(message.into()),
        }
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initialize(&self, request: InitializePayment) -> Result<Checkout, GatewayError>;

    async fn verify(&self, reference: &str) -> Result<Verification, GatewayError>;
}
