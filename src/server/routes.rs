//! Router configuration.

use super::health::{health_check, readiness_check};
use super::state::AppState;
use crate::api::{payments, registrations};
use axum::{
    routing::{get, post},
    Router,
};

/// Build the complete Axum router.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/events/:id/register", post(registrations::register))
        .route("/events/:id/cancel", post(registrations::cancel))
        .route("/events/:id/availability", get(registrations::availability))
        .route(
            "/events/:id/waitlist/:user_id",
            get(registrations::waitlist_position),
        )
        .route(
            "/registrations/:user_id",
            get(registrations::list_registrations),
        )
        .route("/payments/verify", post(payments::verify_payment))
        .route("/orders/:internal_order_id", get(payments::order_status));

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/webhooks/payment", post(payments::payment_webhook))
        .nest("/api", api_routes)
        .with_state(state)
}
