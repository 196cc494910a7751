use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::models::{ExportFilter, RoleCount};
use crate::store::Store;
use crate::utils::error::{AppError, AppResult};

pub const MAX_RANGE_DAYS: i64 = 366;
pub const DEFAULT_RANGE_DAYS: i64 = 30;

const EXPORT_COLUMNS: [&str; 14] = [
    "registration_id",
    "ticket_number",
    "full_name",
    "email",
    "event_title",
    "event_start",
    "venue",
    "ticket_type",
    "status",
    "payment_reference",
    "payment_status",
    "checked_in",
    "checked_in_at",
    "registered_at",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Up,
    Down,
    Flat,
}

/// A figure for the current window next to the one before it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metric<T> {
    pub value: T,
    pub previous: T,
    pub change_percent: f64,
    pub trend: Trend,
}

impl<T: Copy> Metric<T> {
    fn compare(value: T, previous: T, as_f64: impl Fn(T) -> f64) -> Self {
        let (current, before) = (as_f64(value), as_f64(previous));
        let change = if before == 0.0 {
            if current > 0.0 {
                100.0
            } else {
                0.0
            }
        } else {
            (current - before) / before * 100.0
        };
        let trend = if current > before {
            Trend::Up
        } else if current < before {
            Trend::Down
        } else {
            Trend::Flat
        };
        Self {
            value,
            previous,
            change_percent: (change * 100.0).round() / 100.0,
            trend,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlatformOverview {
    pub range_days: i64,
    pub generated_at: DateTime<Utc>,
    pub total_users: i64,
    pub users_by_role: Vec<RoleCount>,
    pub new_users: Metric<i64>,
    pub new_events: Metric<i64>,
    pub registrations: Metric<i64>,
    pub revenue: Metric<Decimal>,
}

/// Admin dashboard figures and the registrations export.
#[derive(Clone)]
pub struct AnalyticsService {
    store: Arc<dyn Store>,
}

impl AnalyticsService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Activity over the last `range_days`, compared with the window of the
    /// same length just before it.
    pub async fn overview(&self, range_days: i64) -> AppResult<PlatformOverview> {
        if !(1..=MAX_RANGE_DAYS).contains(&range_days) {
            return Err(AppError::ValidationError(format!(
                "range_days must be between 1 and {MAX_RANGE_DAYS}"
            )));
        }

        let now = Utc::now();
        let window = Duration::days(range_days);
        let mut tx = self.store.begin().await?;
        let current = tx.activity_counts(now - window, now).await?;
        let previous = tx.activity_counts(now - window - window, now - window).await?;
        let users_by_role = tx.users_by_role().await?;
        tx.commit().await?;

        let count = |n: i64| n as f64;
        Ok(PlatformOverview {
            range_days,
            generated_at: now,
            total_users: users_by_role.iter().map(|r| r.count).sum(),
            users_by_role,
            new_users: Metric::compare(current.users, previous.users, count),
            new_events: Metric::compare(current.events, previous.events, count),
            registrations: Metric::compare(current.registrations, previous.registrations, count),
            revenue: Metric::compare(current.revenue, previous.revenue, |d| {
                d.to_f64().unwrap_or_default()
            }),
        })
    }

    /// Registrations as CSV, header row first, newest registration first.
    pub async fn export_registrations(&self, filter: &ExportFilter) -> AppResult<String> {
        let mut tx = self.store.begin().await?;
        let rows = tx.registration_export(filter).await?;
        tx.commit().await?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        writer.write_record(EXPORT_COLUMNS).map_err(export_error)?;
        for row in &rows {
            writer.serialize(row).map_err(export_error)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| export_error(e.into_error()))?;

        info!(rows = rows.len(), event_id = ?filter.event_id, "Registrations exported");
        String::from_utf8(bytes)
            .map_err(|e| AppError::InternalServerError(format!("Export is not UTF-8: {e}")))
    }
}

fn export_error(e: impl std::fmt::Display) -> AppError {
    AppError::InternalServerError(format!("Failed to write export: {e}"))
}
