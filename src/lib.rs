use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod services;
pub mod state;

use state::AppState;

/// The full route table, shared between the binary and the integration
/// tests.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        // Identity
        .route("/api/auth/register", post(handlers::auth::register))
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route(
            "/api/auth/profile",
            get(handlers::auth::get_profile).put(handlers::auth::update_profile),
        )
        .route("/api/auth/verify-email", get(handlers::auth::verify_email))
        .route("/api/auth/verify-phone", post(handlers::auth::verify_phone))
        .route("/api/auth/verify-otp", post(handlers::auth::verify_otp))
        // Catalog
        .route("/api/services", get(handlers::services::list_services))
        .route("/api/services/:slug", get(handlers::services::get_service))
        .route("/api/staff", get(handlers::staff::list_staff))
        .route("/api/staff/:slug", get(handlers::staff::get_staff))
        .route("/api/staff/:slug/slots", get(handlers::staff::staff_slots))
        .route("/api/slots", get(handlers::slots::list_slots))
        .route("/api/opening-hours", get(handlers::slots::opening_hours))
        // Bookings
        .route(
            "/api/bookings",
            post(handlers::bookings::create_booking).get(handlers::bookings::my_bookings),
        )
        .route("/api/bookings/:code", get(handlers::bookings::get_booking))
        .route(
            "/api/bookings/:code/confirm",
            post(handlers::bookings::confirm_booking),
        )
        .route(
            "/api/bookings/:code/cancel",
            post(handlers::bookings::cancel_booking),
        )
        // Admin
        .route("/api/admin/status", get(handlers::admin::get_status))
        .route("/api/admin/bookings", get(handlers::admin::get_bookings))
        .route(
            "/api/admin/bookings/:id/confirm",
            post(handlers::admin::confirm_booking),
        )
        .route(
            "/api/admin/bookings/:id/cancel",
            post(handlers::admin::cancel_booking),
        )
        .route(
            "/api/admin/bookings/:id/complete",
            post(handlers::admin::complete_booking),
        )
        .route(
            "/api/admin/bookings/:id/no-show",
            post(handlers::admin::no_show_booking),
        )
        .route("/api/admin/services", post(handlers::admin::create_service))
        .route(
            "/api/admin/services/:id",
            put(handlers::admin::update_service).delete(handlers::admin::delete_service),
        )
        .route("/api/admin/staff", post(handlers::admin::create_staff))
        .route("/api/admin/staff/:id", put(handlers::admin::update_staff))
        .route(
            "/api/admin/staff/:id/services",
            put(handlers::admin::set_staff_services),
        )
        .route("/api/admin/slots", post(handlers::admin::create_slot))
        .route(
            "/api/admin/slots/:id/block",
            post(handlers::admin::block_slot),
        )
        .route(
            "/api/admin/slots/:id/unblock",
            post(handlers::admin::unblock_slot),
        )
        .route(
            "/api/admin/opening-hours",
            put(handlers::admin::set_opening_hours),
        )
        .route(
            "/api/admin/reminders/run",
            post(handlers::admin::run_reminders),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
