//! Skadi Service - HTTP microservice for elevation queries.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `SKADI_PORT` | HTTP server port | 8080 |
//! | `SKADI_PRELOAD` | Bounding boxes to warm at startup, `min_lat,min_lon,max_lat,max_lon[;...]` | None |
//! | `SKADI_CACHE_TTL` | Sliding TTL of the memory tier, seconds | 3600 |
//! | `SKADI_CACHE_MAX_TILES` | Maximum resident tiles | 100 |
//! | `SKADI_CONCURRENCY` | Tiles resolved concurrently per batch | 8 |
//! | `SKADI_ORIGIN_URL` | Origin archive base URL | public Skadi archive |
//! | `SKADI_DATA_DIR` | Local durable tier directory | None |
//! | `SKADI_S3_*` | S3 durable tier (see the `skadi` crate) | None |
//! | `RUST_LOG` | Log filter | `skadi=info,skadi_service=info,tower_http=info` |
//!
//! ## Endpoints
//!
//! - `GET /elevation?lat=X&lon=Y` - Elevation at coordinates
//! - `POST /elevation` - Batch elevation query
//! - `GET /stats` - Cache statistics
//! - `DELETE /cache` - Clear the memory tier
//! - `GET /health` - Health check
//! - `GET /docs` - OpenAPI documentation (Swagger UI)

use std::net::SocketAddr;
use std::sync::Arc;

use skadi::{BoundingBox, ElevationServiceBuilder};
use skadi_service::{router, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "skadi=info,skadi_service=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let port: u16 = std::env::var("SKADI_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8080);

    // The library handles the SKADI_CACHE_*, SKADI_ORIGIN_* and durable tier variables
    let service = ElevationServiceBuilder::from_env()?.build()?;

    let stats = service.stats();
    tracing::info!(
        ttl_secs = service.resolver().cache().ttl().as_secs(),
        max_tiles = ?service.resolver().cache().capacity(),
        concurrency = service.concurrency(),
        durable = service.resolver().has_durable(),
        resident = stats.resident,
        port,
        "Starting skadi service"
    );

    if let Ok(value) = std::env::var("SKADI_PRELOAD") {
        let bounds = parse_preload_bounds(&value);
        if bounds.is_empty() {
            tracing::warn!(value = %value, "SKADI_PRELOAD has no valid bounding boxes, skipping preload");
        } else {
            tracing::info!(boxes = bounds.len(), "Preloading tiles into cache");
            service.preload(&bounds).await;
        }
    }

    let app = router(Arc::new(AppState { service }));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Parse `SKADI_PRELOAD`: bounding boxes separated by `;`.
///
/// Malformed boxes are logged and skipped.
fn parse_preload_bounds(value: &str) -> Vec<BoundingBox> {
    value
        .split(';')
        .filter(|s| !s.trim().is_empty())
        .filter_map(|bbox| {
            let parsed = BoundingBox::parse(bbox);
            if parsed.is_none() {
                tracing::warn!(
                    bbox,
                    "Invalid bounding box format, expected min_lat,min_lon,max_lat,max_lon"
                );
            }
            parsed
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_box() {
        let bounds = parse_preload_bounds("24,-125,50,-66");
        assert_eq!(bounds, vec![BoundingBox::new(24.0, -125.0, 50.0, -66.0)]);
    }

    #[test]
    fn test_parse_multiple_boxes_skips_invalid() {
        let bounds = parse_preload_bounds("35,138,36,139; nonsense ;40,-75,41,-74;");
        assert_eq!(bounds.len(), 2);
        assert_eq!(bounds[1].min_lat, 40.0);
    }

    #[test]
    fn test_parse_empty() {
        assert!(parse_preload_bounds("").is_empty());
        assert!(parse_preload_bounds("all").is_empty());
    }
}
