use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::{Checkout, GatewayError, GatewayStatus, InitializePayment, PaymentGateway, Verification};
use crate::config::PaystackConfig;

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: bool,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct InitializeData {
    authorization_url: String,
    access_code: Option<String>,
    reference: String,
}

#[derive(Debug, Deserialize)]
struct VerifyData {
    status: String,
    reference: String,
    amount: i64,
    currency: Option<String>,
    paid_at: Option<String>,
    gateway_response: Option<String>,
}

/// Paystack REST client. Every call is bounded by the configured timeout.
#[derive(Clone)]
pub struct PaystackClient {
    client: Client,
    secret_key: String,
    base_url: String,
}

impl PaystackClient {
    pub fn new(config: &PaystackConfig) -> Result<Self, GatewayError> {
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            secret_key: config.secret_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn error_message(response: reqwest::Response) -> String {
        let text = response.text().await.unwrap_or_default();
        serde_json::from_str::<Envelope<serde_json::Value>>(&text)
            .map(|envelope| envelope.message)
            .unwrap_or(text)
    }
}

/// References go into the URL path, so only the characters we generate are accepted.
fn is_safe_reference(reference: &str) -> bool {
    !reference.is_empty()
        && reference
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

fn parse_paid_at(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|at| at.with_timezone(&Utc))
}

#[async_trait]
impl PaymentGateway for PaystackClient {
    async fn initialize(&self, request: InitializePayment) -> Result<Checkout, GatewayError> {
        let response = self
            .client
            .post(format!("{}/transaction/initialize", self.base_url))
            .bearer_auth(&self.secret_key)
            .json(&json!({
                "email": request.email,
                "amount": request.amount_minor,
                "currency": request.currency,
                "reference": request.reference,
                "callback_url": request.callback_url,
                "metadata": request.metadata,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = Self::error_message(response).await;
            warn!(status = status.as_u16(), %message, "Paystack initialize rejected");
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let envelope: Envelope<InitializeData> = response.json().await?;
        match envelope.data {
            Some(data) if envelope.status => {
                debug!(reference = %data.reference, "Paystack transaction initialized");
                Ok(Checkout {
                    authorization_url: data.authorization_url,
                    access_code: data.access_code,
                    reference: data.reference,
                })
            }
            _ => Err(GatewayError::Rejected {
                status: status.as_u16(),
                message: envelope.message,
            }),
        }
    }

    async fn verify(&self, reference: &str) -> Result<Verification, GatewayError> {
        if !is_safe_reference(reference) {
            return Ok(Verification::unknown(reference, "Malformed reference"));
        }

        let response = self
            .client
            .get(format!("{}/transaction/verify/{reference}", self.base_url))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;

        let status = response.status();
        if status.is_server_error() {
            let message = Self::error_message(response).await;
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        if status.is_client_error() || status == StatusCode::NO_CONTENT {
            let message = Self::error_message(response).await;
            debug!(%reference, status = status.as_u16(), %message, "Paystack could not verify reference");
            return Ok(Verification::unknown(reference, message));
        }

        let envelope: Envelope<VerifyData> = response.json().await?;
        let data = match envelope.data {
            Some(data) if envelope.status => data,
            _ => return Ok(Verification::unknown(reference, envelope.message)),
        };

        Ok(Verification {
            status: GatewayStatus::from_processor(&data.status),
            paid_at: parse_paid_at(data.paid_at.as_deref()),
            reference: data.reference,
            amount_minor: data.amount,
            currency: data.currency,
            gateway_response: data.gateway_response,
        })
    }
}
