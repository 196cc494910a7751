use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Json;
use chrono::Duration;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::{Capability, Identity};
use crate::payments::webhook::SIGNATURE_HEADER;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{empty_success, success};

const DEFAULT_RECONCILE_AGE_MINUTES: i64 = 30;

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    pub reference: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReconcileRequest {
    pub older_than_minutes: Option<i64>,
}

/// Landing point of the processor's checkout redirect.
pub async fn verify_payment(
    State(state): State<AppState>,
    identity: Identity,
    Query(query): Query<VerifyQuery>,
) -> Result<Response, AppError> {
    let reference = query.reference.trim();
    if reference.is_empty() {
        return Err(AppError::ValidationError(
            "Payment reference is required".to_string(),
        ));
    }

    let payer = state.checkout.payer_of(reference).await?;
    identity.require_owner_or(payer, Capability::VerifyPayments)?;

    let confirmation = state.checkout.verify_payment(reference).await?;
    Ok(success(confirmation, "Payment verified"))
}

pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    match state.checkout.handle_webhook(signature, &body).await? {
        Some(confirmation) => Ok(success(confirmation, "Webhook processed")),
        None => Ok(empty_success("Webhook acknowledged")),
    }
}

pub async fn confirm_payment(
    State(state): State<AppState>,
    identity: Identity,
    Path(payment_id): Path<Uuid>,
) -> Result<Response, AppError> {
    identity.require(Capability::VerifyPayments)?;
    let confirmation = state.checkout.confirm_manually(payment_id).await?;
    Ok(success(confirmation, "Payment confirmed"))
}

pub async fn reconcile(
    State(state): State<AppState>,
    identity: Identity,
    body: Option<Json<ReconcileRequest>>,
) -> Result<Response, AppError> {
    identity.require(Capability::VerifyPayments)?;
    let minutes = body
        .and_then(|Json(b)| b.older_than_minutes)
        .unwrap_or(DEFAULT_RECONCILE_AGE_MINUTES);
    if minutes < 0 {
        return Err(AppError::ValidationError(
            "older_than_minutes cannot be negative".to_string(),
        ));
    }

    let summary = state
        .checkout
        .reconcile_pending(Duration::minutes(minutes))
        .await?;
    Ok(success(summary, "Pending payments reconciled"))
}
