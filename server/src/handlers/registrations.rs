use axum::extract::{Path, State};
use axum::response::Response;
use uuid::Uuid;

use crate::auth::{Capability, Identity};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

pub async fn get_registration(
    State(state): State<AppState>,
    identity: Identity,
    Path(registration_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let registration = state.capacity.get_registration(registration_id).await?;
    identity.require_owner_or(registration.user_id, Capability::CancelAnyRegistration)?;
    Ok(success(registration, "Registration retrieved"))
}

pub async fn cancel_registration(
    State(state): State<AppState>,
    identity: Identity,
    Path(registration_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let registration = state.capacity.get_registration(registration_id).await?;
    identity.require_owner_or(registration.user_id, Capability::CancelAnyRegistration)?;

    let outcome = state.capacity.cancel_registration(registration_id).await?;
    Ok(success(outcome, "Registration cancelled"))
}

pub async fn issue_ticket(
    State(state): State<AppState>,
    identity: Identity,
    Path(registration_id): Path<Uuid>,
) -> Result<Response, AppError> {
    identity.require(Capability::IssueTickets)?;
    let ticket = state.tickets.issue_ticket(registration_id).await?;
    Ok(created(ticket, "Ticket issued"))
}
