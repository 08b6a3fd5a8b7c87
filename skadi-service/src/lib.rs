//! Skadi Service Library
//!
//! HTTP handlers, router and OpenAPI document for the elevation service.
//! This library is used by both the skadi-service binary and integration tests.

pub mod handlers;

use std::sync::Arc;

use axum::{
    routing::{delete, get},
    Router,
};
use skadi::ElevationService;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Application state shared across handlers.
pub struct AppState {
    /// Elevation service for queries.
    pub service: ElevationService,
}

// Re-export commonly used types for convenience
pub use handlers::{
    BatchRequest, BatchResponse, ElevationQuery, ElevationResponse, ErrorResponse,
    HealthResponse, Point, StatsResponse, MAX_BATCH_POINTS,
};

/// OpenAPI documentation for the skadi service.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Skadi Elevation Service",
        version = "0.1.0",
        description = "REST API for elevation queries over tiered Skadi terrain tiles.",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    paths(
        handlers::get_elevation,
        handlers::post_elevation,
        handlers::health_check,
        handlers::get_stats,
        handlers::clear_cache,
    ),
    components(
        schemas(
            handlers::ElevationQuery,
            handlers::ElevationResponse,
            handlers::Point,
            handlers::BatchRequest,
            handlers::BatchResponse,
            handlers::ErrorResponse,
            handlers::HealthResponse,
            handlers::StatsResponse,
        )
    ),
    tags(
        (name = "elevation", description = "Elevation query endpoints"),
        (name = "system", description = "System and health endpoints")
    )
)]
pub struct ApiDoc;

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route(
            "/elevation",
            get(handlers::get_elevation).post(handlers::post_elevation),
        )
        .route("/stats", get(handlers::get_stats))
        .route("/cache", delete(handlers::clear_cache))
        .route("/health", get(handlers::health_check))
        .layer(
            ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            ),
        )
        .with_state(state)
}
