use axum::{
    routing::{get, patch, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::config::{create_cors_layer, create_security_headers_layer, Config};
use crate::handlers::{
    analytics, events, health_check, notifications, pages, payments, registrations, tickets,
    users,
};
use crate::state::AppState;

pub fn create_routes(state: AppState, config: &Config) -> Router {
    create_router(state)
        .layer(create_security_headers_layer(config.production))
        .layer(create_cors_layer(&config.cors_allowed_origins))
        .layer(TraceLayer::new_for_http())
}

/// The API without transport middleware.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .merge(user_routes())
        .merge(event_routes())
        .merge(registration_routes())
        .merge(payment_routes())
        .merge(ticket_routes())
        .merge(notification_routes())
        .merge(page_routes())
        .merge(analytics_routes())
        .with_state(state)
}

fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", post(users::register_profile))
        .route("/users/me", get(users::my_profile))
        .route("/admin/users/:id/role", patch(users::change_role))
        .route("/admin/users/:id/status", patch(users::set_status))
        .route("/admin/users/:id/archive", post(users::archive))
}

fn event_routes() -> Router<AppState> {
    Router::new()
        .route("/events", get(events::list_events).post(events::create_event))
        .route("/events/:id", get(events::get_event))
        .route("/events/:id/publish", post(events::publish_event))
        .route("/events/:id/complete", post(events::complete_event))
        .route("/events/:id/capacity", get(events::check_capacity))
        .route("/events/:id/stats", get(events::event_stats))
        .route("/events/:id/registrations", post(events::register))
        .route("/events/:id/waitlist", get(events::list_waitlist))
        .route("/waitlist/:id/convert", post(events::convert_waitlist_entry))
}

fn registration_routes() -> Router<AppState> {
    Router::new()
        .route("/registrations/:id", get(registrations::get_registration))
        .route(
            "/registrations/:id/cancel",
            post(registrations::cancel_registration),
        )
        .route("/registrations/:id/ticket", post(registrations::issue_ticket))
}

fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/payments/verify", get(payments::verify_payment))
        .route("/payments/webhook", post(payments::webhook))
        .route("/admin/payments/:id/confirm", post(payments::confirm_payment))
        .route("/admin/payments/reconcile", post(payments::reconcile))
}

fn ticket_routes() -> Router<AppState> {
    Router::new()
        .route("/tickets/check-in", post(tickets::check_in))
        .route("/tickets/:number", get(tickets::get_ticket))
}

fn notification_routes() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(notifications::list_notifications))
        .route("/notifications/read-all", post(notifications::mark_all_read))
        .route("/notifications/:id/read", post(notifications::mark_read))
}

fn page_routes() -> Router<AppState> {
    Router::new()
        .route("/pages/:slug", get(pages::get_published))
        .route(
            "/pages/:slug/draft",
            get(pages::get_draft).put(pages::save_draft),
        )
        .route("/pages/:slug/publish", post(pages::publish))
}

fn analytics_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/analytics", get(analytics::overview))
        .route(
            "/admin/registrations/export",
            get(analytics::export_registrations),
        )
}
