use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha512;

use super::{GatewayStatus, Verification};
use crate::utils::error::AppError;

pub const SIGNATURE_HEADER: &str = "x-paystack-signature";

type HmacSha512 = Hmac<Sha512>;

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Hex HMAC-SHA512 of `body` keyed by the processor secret.
pub fn sign(secret: &str, body: &[u8]) -> Result<String, AppError> {
    let mut mac = HmacSha512::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::InternalServerError(format!("Invalid webhook key: {e}")))?;
    mac.update(body);
    Ok(hex(&mac.finalize().into_bytes()))
}

pub fn verify_signature(secret: &str, body: &[u8], signature: Option<&str>) -> Result<(), AppError> {
    let signature = signature
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::AuthError("Missing webhook signature".to_string()))?;
    let expected = sign(secret, body)?;

    if constant_time_eq::constant_time_eq(
        expected.as_bytes(),
        signature.to_ascii_lowercase().as_bytes(),
    ) {
        Ok(())
    } else {
        Err(AppError::AuthError("Invalid webhook signature".to_string()))
    }
}

#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    pub data: WebhookData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookData {
    pub reference: String,
    #[serde(default)]
    pub amount: i64,
    pub status: Option<String>,
    pub currency: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub gateway_response: Option<String>,
}

impl WebhookEvent {
    pub fn parse(body: &[u8]) -> Result<Self, AppError> {
        serde_json::from_slice(body)
            .map_err(|e| AppError::ValidationError(format!("Malformed webhook payload: {e}")))
    }

    /// Charge events carry an authenticated verification result; anything
    /// else (transfers, subscriptions) is not ours to apply.
    pub fn into_verification(self) -> Option<Verification> {
        let status = match self.event.as_str() {
            "charge.success" => GatewayStatus::Success,
            "charge.failed" => GatewayStatus::Failed,
            _ => return None,
        };

        Some(Verification {
            reference: self.data.reference,
            status,
            amount_minor: self.data.amount,
            currency: self.data.currency,
            paid_at: self.data.paid_at,
            gateway_response: self.data.gateway_response.or(self.data.status),
        })
    }
}
