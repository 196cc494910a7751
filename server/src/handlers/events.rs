use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::{Capability, Identity};
use crate::models::{EventStatus, NewEvent, TicketType};
use crate::services::RegistrationOutcome;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

#[derive(Debug, Default, Deserialize)]
pub struct EventListQuery {
    pub status: Option<EventStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub ticket_type: TicketType,
}

fn can_manage(identity: Option<&Identity>) -> bool {
    identity.is_some_and(|id| id.can(Capability::ManageEvents))
}

/// Members and anonymous visitors only ever see published events.
pub async fn list_events(
    State(state): State<AppState>,
    identity: Option<Identity>,
    Query(query): Query<EventListQuery>,
) -> Result<Response, AppError> {
    let status = if can_manage(identity.as_ref()) {
        query.status
    } else {
        Some(EventStatus::Published)
    };
    let events = state.events.list_events(status).await?;
    Ok(success(events, "Events retrieved"))
}

pub async fn create_event(
    State(state): State<AppState>,
    identity: Identity,
    Json(body): Json<NewEvent>,
) -> Result<Response, AppError> {
    identity.require(Capability::ManageEvents)?;
    let event = state.events.create_event(identity.user_id, body).await?;
    Ok(created(event, "Event created"))
}

pub async fn get_event(
    State(state): State<AppState>,
    identity: Option<Identity>,
    Path(event_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let event = state.events.get_event(event_id).await?;
    if event.status == EventStatus::Draft && !can_manage(identity.as_ref()) {
        return Err(AppError::not_found("Event", event_id));
    }
    Ok(success(event, "Event retrieved"))
}

pub async fn publish_event(
    State(state): State<AppState>,
    identity: Identity,
    Path(event_id): Path<Uuid>,
) -> Result<Response, AppError> {
    identity.require(Capability::ManageEvents)?;
    let event = state.events.publish_event(event_id).await?;
    Ok(success(event, "Event published"))
}

pub async fn complete_event(
    State(state): State<AppState>,
    identity: Identity,
    Path(event_id): Path<Uuid>,
) -> Result<Response, AppError> {
    identity.require(Capability::ManageEvents)?;
    let event = state.events.complete_event(event_id).await?;
    Ok(success(event, "Event completed"))
}

pub async fn check_capacity(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let snapshot = state.capacity.check_capacity(event_id).await?;
    Ok(success(snapshot, "Capacity retrieved"))
}

pub async fn event_stats(
    State(state): State<AppState>,
    identity: Identity,
    Path(event_id): Path<Uuid>,
) -> Result<Response, AppError> {
    identity.require(Capability::ViewEventStats)?;
    let stats = state.capacity.get_event_stats(event_id).await?;
    Ok(success(stats, "Event statistics retrieved"))
}

pub async fn register(
    State(state): State<AppState>,
    identity: Identity,
    Path(event_id): Path<Uuid>,
    body: Option<Json<RegisterRequest>>,
) -> Result<Response, AppError> {
    identity.require(Capability::RegisterForEvents)?;
    let ticket_type = body.map(|Json(b)| b.ticket_type).unwrap_or_default();

    let outcome = state
        .capacity
        .register_for_event(identity.user_id, event_id, ticket_type)
        .await?;
    Ok(match outcome {
        RegistrationOutcome::Registered { .. } => created(outcome, "Registration created"),
        RegistrationOutcome::Waitlisted { .. } => {
            success(outcome, "Event is full; added to the waitlist")
        }
    })
}

pub async fn list_waitlist(
    State(state): State<AppState>,
    identity: Identity,
    Path(event_id): Path<Uuid>,
) -> Result<Response, AppError> {
    identity.require(Capability::ManageWaitlist)?;
    let entries = state.capacity.list_waitlist(event_id).await?;
    Ok(success(entries, "Waitlist retrieved"))
}

pub async fn convert_waitlist_entry(
    State(state): State<AppState>,
    identity: Identity,
    Path(entry_id): Path<Uuid>,
) -> Result<Response, AppError> {
    identity.require(Capability::ManageWaitlist)?;
    let outcome = state
        .capacity
        .convert_waitlist_to_registration(entry_id)
        .await?;
    Ok(created(outcome, "Waitlist entry converted"))
}
