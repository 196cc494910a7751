use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use crate::auth::{Capability, Identity};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

#[derive(Debug, Deserialize)]
pub struct SaveDraftRequest {
    pub content: Value,
}

pub async fn get_published(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Response, AppError> {
    let page = state.pages.published(&slug).await?;
    Ok(success(page, "Page retrieved"))
}

pub async fn get_draft(
    State(state): State<AppState>,
    identity: Identity,
    Path(slug): Path<String>,
) -> Result<Response, AppError> {
    identity.require(Capability::EditPages)?;
    let draft = state.pages.latest_draft(&slug).await?;
    Ok(success(draft, "Draft retrieved"))
}

pub async fn save_draft(
    State(state): State<AppState>,
    identity: Identity,
    Path(slug): Path<String>,
    Json(body): Json<SaveDraftRequest>,
) -> Result<Response, AppError> {
    identity.require(Capability::EditPages)?;
    let draft = state
        .pages
        .save_draft(&slug, body.content, identity.user_id)
        .await?;
    Ok(created(draft, "Draft saved"))
}

pub async fn publish(
    State(state): State<AppState>,
    identity: Identity,
    Path(slug): Path<String>,
) -> Result<Response, AppError> {
    identity.require(Capability::PublishPages)?;
    let page = state.pages.publish(&slug, identity.user_id).await?;
    Ok(success(page, "Page published"))
}
