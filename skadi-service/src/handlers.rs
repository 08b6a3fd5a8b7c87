//! HTTP request handlers for the elevation service.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use skadi::LocationData;
use utoipa::{IntoParams, ToSchema};

use crate::AppState;

/// Largest batch accepted by `POST /elevation`.
pub const MAX_BATCH_POINTS: usize = 10_000;

/// Query parameters for the single-point elevation endpoint.
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct ElevationQuery {
    /// Latitude in decimal degrees (-90 to 90).
    pub lat: f64,
    /// Longitude in decimal degrees (-180 to 180).
    pub lon: f64,
}

/// Successful elevation response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ElevationResponse {
    /// Latitude queried.
    pub lat: f64,
    /// Longitude queried.
    pub lon: f64,
    /// Elevation in meters, bilinearly interpolated.
    pub elevation: f64,
}

/// A point in a batch request.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, ToSchema)]
pub struct Point {
    pub lat: f64,
    pub lon: f64,
}

impl From<Point> for LocationData {
    fn from(p: Point) -> Self {
        LocationData::new(p.lat, p.lon)
    }
}

/// Batch elevation request.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct BatchRequest {
    /// Points to look up, at most 10 000.
    pub points: Vec<Point>,
}

/// Batch elevation response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BatchResponse {
    /// One entry per requested point, in request order.
    /// `null` where the elevation is unavailable.
    pub elevations: Vec<Option<f64>>,
}

/// Error response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Error message.
    pub error: String,
}

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Service version.
    pub version: String,
}

/// Cache statistics response.
#[derive(Debug, Serialize, ToSchema)]
pub struct StatsResponse {
    /// Number of tiles resident in memory.
    pub resident: u64,
    /// Number of tiles currently being fetched.
    pub in_flight: u64,
    /// Memory tier hit count.
    pub hits: u64,
    /// Memory tier miss count.
    pub misses: u64,
    /// Hit rate (0.0 to 1.0).
    pub hit_rate: f64,
}

fn error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Get elevation for given coordinates.
///
/// # Returns
///
/// - `200 OK` with elevation data on success
/// - `400 Bad Request` if coordinates are invalid
/// - `404 Not Found` if the elevation is unavailable
#[utoipa::path(
    get,
    path = "/elevation",
    tag = "elevation",
    params(ElevationQuery),
    responses(
        (status = 200, description = "Elevation found", body = ElevationResponse),
        (status = 400, description = "Invalid coordinates", body = ErrorResponse),
        (status = 404, description = "Elevation unavailable", body = ErrorResponse)
    )
)]
pub async fn get_elevation(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ElevationQuery>,
) -> Response {
    tracing::debug!(lat = query.lat, lon = query.lon, "Elevation query");

    let point = LocationData::new(query.lat, query.lon);
    if !point.is_valid() {
        return error(
            StatusCode::BAD_REQUEST,
            format!(
                "Invalid coordinates: lat={}, lon={} (expected -90..=90, -180..=180)",
                query.lat, query.lon
            ),
        );
    }

    match state.service.fetch_elevation(point).await {
        Some(elevation) => {
            tracing::info!(lat = query.lat, lon = query.lon, elevation, "Elevation found");
            (
                StatusCode::OK,
                Json(ElevationResponse {
                    lat: query.lat,
                    lon: query.lon,
                    elevation,
                }),
            )
                .into_response()
        }
        None => {
            tracing::warn!(lat = query.lat, lon = query.lon, "Elevation unavailable");
            error(
                StatusCode::NOT_FOUND,
                format!(
                    "Elevation unavailable at lat={}, lon={} (tile {})",
                    query.lat,
                    query.lon,
                    point.tile_key()
                ),
            )
        }
    }
}

/// Get elevations for a batch of points.
///
/// Unavailable elevations are `null`; the request itself only fails when the
/// batch is empty or too large.
#[utoipa::path(
    post,
    path = "/elevation",
    tag = "elevation",
    request_body = BatchRequest,
    responses(
        (status = 200, description = "Elevations in request order", body = BatchResponse),
        (status = 400, description = "Empty or oversized batch", body = ErrorResponse)
    )
)]
pub async fn post_elevation(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BatchRequest>,
) -> Response {
    let count = request.points.len();
    if count == 0 {
        return error(StatusCode::BAD_REQUEST, "Batch contains no points");
    }
    if count > MAX_BATCH_POINTS {
        return error(
            StatusCode::BAD_REQUEST,
            format!(
                "Batch of {} points exceeds the limit of {}",
                count, MAX_BATCH_POINTS
            ),
        );
    }

    let points: Vec<LocationData> = request.points.into_iter().map(Into::into).collect();

    // Out-of-range points are answered with null and never looked up
    let valid: Vec<usize> = (0..count).filter(|&i| points[i].is_valid()).collect();
    let lookups: Vec<LocationData> = valid.iter().map(|&i| points[i]).collect();
    let mut elevations = vec![None; count];
    for (i, elevation) in valid
        .into_iter()
        .zip(state.service.fetch_elevations(&lookups).await)
    {
        elevations[i] = elevation;
    }

    let unavailable = elevations.iter().filter(|e| e.is_none()).count();
    tracing::info!(points = count, unavailable, "Batch elevation query");

    (StatusCode::OK, Json(BatchResponse { elevations })).into_response()
}

/// Health check endpoint.
#[utoipa::path(
    get,
    path = "/health",
    tag = "system",
    responses((status = 200, description = "Service is healthy", body = HealthResponse))
)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Get cache statistics.
#[utoipa::path(
    get,
    path = "/stats",
    tag = "system",
    responses((status = 200, description = "Memory tier statistics", body = StatsResponse))
)]
pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let stats = state.service.stats();

    Json(StatsResponse {
        resident: stats.resident,
        in_flight: stats.in_flight,
        hits: stats.hit_count,
        misses: stats.miss_count,
        hit_rate: stats.hit_rate(),
    })
}

/// Drop every tile from the memory tier.
#[utoipa::path(
    delete,
    path = "/cache",
    tag = "system",
    responses((status = 204, description = "Memory tier cleared"))
)]
pub async fn clear_cache(State(state): State<Arc<AppState>>) -> StatusCode {
    state.service.clear();
    tracing::info!("Memory tier cleared");
    StatusCode::NO_CONTENT
}
