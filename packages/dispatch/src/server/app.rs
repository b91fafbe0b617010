//! Application setup and server configuration.

use axum::{
    http::{header::CONTENT_TYPE, HeaderValue, Method},
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::kernel::sse::stream_handler;
use crate::kernel::ServerDeps;
use crate::server::routes::{bookings, health_handler, helpers, stats};

/// Build the Axum application router
///
/// An empty `allowed_origins` allows any origin (development).
pub fn build_app(deps: ServerDeps, allowed_origins: &[String]) -> Router {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    let allow_origin = if origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(origins)
    };

    let cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/service-types", get(stats::service_types_handler))
        .route("/api/stats", get(stats::stats_handler))
        // Helpers
        .route(
            "/api/helpers",
            get(helpers::list_helpers).post(helpers::register_helper),
        )
        .route("/api/helpers/{id}", get(helpers::get_helper))
        .route("/api/helpers/{id}/status", put(helpers::set_status))
        .route("/api/helpers/{id}/location", put(helpers::set_location))
        .route("/api/helpers/{id}/skills", put(helpers::set_skills))
        // Bookings
        .route(
            "/api/bookings",
            get(bookings::list_bookings).post(bookings::submit_booking),
        )
        .route("/api/bookings/{id}", get(bookings::get_booking))
        .route("/api/bookings/{id}/accept", post(bookings::accept))
        .route("/api/bookings/{id}/decline", post(bookings::decline))
        .route("/api/bookings/{id}/start", post(bookings::start))
        .route("/api/bookings/{id}/complete", post(bookings::complete))
        .route("/api/bookings/{id}/cancel", post(bookings::cancel))
        .route("/api/bookings/{id}/dispatch", post(bookings::dispatch))
        // Streams
        .route("/api/streams/{topic}", get(stream_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(deps)
}
