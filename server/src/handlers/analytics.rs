use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::auth::{Capability, Identity};
use crate::models::ExportFilter;
use crate::services::analytics::DEFAULT_RANGE_DAYS;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::success;

#[derive(Debug, Default, Deserialize)]
pub struct OverviewQuery {
    pub range_days: Option<i64>,
}

pub async fn overview(
    State(state): State<AppState>,
    identity: Identity,
    Query(query): Query<OverviewQuery>,
) -> Result<Response, AppError> {
    identity.require(Capability::ManageUsers)?;
    let range_days = query.range_days.unwrap_or(DEFAULT_RANGE_DAYS);
    let overview = state.analytics.overview(range_days).await?;
    Ok(success(overview, "Analytics retrieved"))
}

/// Organizers export one event at a time; admins may export everything.
pub async fn export_registrations(
    State(state): State<AppState>,
    identity: Identity,
    Query(filter): Query<ExportFilter>,
) -> Result<Response, AppError> {
    identity.require(Capability::ViewEventStats)?;
    if filter.event_id.is_none() && !identity.can(Capability::ManageUsers) {
        return Err(AppError::Forbidden(
            "Exporting every event requires an administrator".to_string(),
        ));
    }

    let body = state.analytics.export_registrations(&filter).await?;
    let filename = match filter.event_id {
        Some(event_id) => format!("registrations-{event_id}.csv"),
        None => "registrations.csv".to_string(),
    };
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    )
        .into_response())
}
