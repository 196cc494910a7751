use axum::extract::{Path, Query, State};
use axum::response::Response;
use serde::Serialize;
use uuid::Uuid;

use crate::auth::{Capability, Identity};
use crate::models::NotificationQuery;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::success;

#[derive(Serialize)]
struct MarkedRead {
    updated: u64,
}

pub async fn list_notifications(
    State(state): State<AppState>,
    identity: Identity,
    Query(query): Query<NotificationQuery>,
) -> Result<Response, AppError> {
    identity.require(Capability::ReadOwnNotifications)?;
    let page = state.notifications.list(identity.user_id, &query).await?;
    Ok(success(page, "Notifications retrieved"))
}

pub async fn mark_read(
    State(state): State<AppState>,
    identity: Identity,
    Path(notification_id): Path<Uuid>,
) -> Result<Response, AppError> {
    identity.require(Capability::ReadOwnNotifications)?;
    let notification = state
        .notifications
        .mark_read(notification_id, identity.user_id)
        .await?;
    Ok(success(notification, "Notification marked as read"))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<Response, AppError> {
    identity.require(Capability::ReadOwnNotifications)?;
    let updated = state.notifications.mark_all_read(identity.user_id).await?;
    Ok(success(MarkedRead { updated }, "Notifications marked as read"))
}
