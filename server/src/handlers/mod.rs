use axum::response::Response;
use serde::Serialize;

use crate::utils::response::success;

pub mod analytics;
pub mod events;
pub mod notifications;
pub mod pages;
pub mod payments;
pub mod registrations;
pub mod tickets;
pub mod users;

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

pub async fn health_check() -> Response {
    let payload = HealthPayload {
        status: "ok",
        service: "alumni-portal-api",
        version: env!("CARGO_PKG_VERSION"),
    };

    success(payload, "Health check successful")
}
