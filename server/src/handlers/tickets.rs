use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::{Capability, Identity};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::success;

/// Door staff either type the ticket number or submit what the scanner read.
#[derive(Debug, Deserialize)]
pub struct CheckInRequest {
    pub ticket_number: Option<String>,
    pub payload: Option<String>,
    pub event_id: Option<Uuid>,
}

pub async fn check_in(
    State(state): State<AppState>,
    identity: Identity,
    Json(body): Json<CheckInRequest>,
) -> Result<Response, AppError> {
    identity.require(Capability::CheckInAttendees)?;

    let result = match (body.ticket_number, body.payload) {
        (_, Some(payload)) => state.tickets.check_in_scan(&payload, body.event_id).await?,
        (Some(number), None) => state.tickets.check_in(number.trim(), body.event_id).await?,
        (None, None) => {
            return Err(AppError::ValidationError(
                "Either ticket_number or payload is required".to_string(),
            ))
        }
    };

    let message = if result.already_checked_in {
        "Ticket was already checked in"
    } else {
        "Attendee checked in"
    };
    Ok(success(result, message))
}

pub async fn get_ticket(
    State(state): State<AppState>,
    identity: Identity,
    Path(ticket_number): Path<String>,
) -> Result<Response, AppError> {
    identity.require(Capability::CheckInAttendees)?;
    let ticket = state.tickets.find_ticket(&ticket_number).await?;
    Ok(success(ticket, "Ticket retrieved"))
}
