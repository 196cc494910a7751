use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::{Capability, Identity};
use crate::models::{NewUser, Role, UserStatus};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

#[derive(Debug, Deserialize)]
pub struct ChangeRoleRequest {
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct SetStatusRequest {
    pub status: UserStatus,
}

/// Called once after signup so the portal has a profile for the provider's
/// user id.
pub async fn register_profile(
    State(state): State<AppState>,
    identity: Identity,
    Json(body): Json<NewUser>,
) -> Result<Response, AppError> {
    let user = state.users.register_user(identity.user_id, body).await?;
    Ok(created(user, "Profile created"))
}

pub async fn my_profile(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<Response, AppError> {
    let user = state.users.get_user(identity.user_id).await?;
    Ok(success(user, "Profile retrieved"))
}

pub async fn change_role(
    State(state): State<AppState>,
    identity: Identity,
    Path(user_id): Path<Uuid>,
    Json(body): Json<ChangeRoleRequest>,
) -> Result<Response, AppError> {
    identity.require(Capability::ManageUsers)?;
    let user = state.users.change_role(user_id, body.role).await?;
    Ok(success(user, "Role updated"))
}

pub async fn set_status(
    State(state): State<AppState>,
    identity: Identity,
    Path(user_id): Path<Uuid>,
    Json(body): Json<SetStatusRequest>,
) -> Result<Response, AppError> {
    identity.require(Capability::ManageUsers)?;
    let user = state.users.set_status(user_id, body.status).await?;
    Ok(success(user, "Status updated"))
}

pub async fn archive(
    State(state): State<AppState>,
    identity: Identity,
    Path(user_id): Path<Uuid>,
) -> Result<Response, AppError> {
    identity.require(Capability::ManageUsers)?;
    let user = state.users.archive(user_id).await?;
    Ok(success(user, "User archived"))
}
