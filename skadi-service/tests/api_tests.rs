//! Integration tests for the HTTP API.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{json, Value};
use skadi::durable::MemoryStore;
use skadi::{
    DurableStore, ElevationError, ElevationServiceBuilder, Tile, TileKey, TileOrigin, TILE_SIZE,
};
use skadi_service::{router, AppState, MAX_BATCH_POINTS};

/// In-process origin archive; unknown tiles are 404s.
#[derive(Default)]
struct FakeArchive {
    tiles: HashMap<TileKey, Vec<u8>>,
    fetches: AtomicUsize,
}

impl FakeArchive {
    fn with(mut self, tile: Tile) -> Self {
        self.tiles.insert(tile.key(), tile.encode_gz().unwrap());
        self
    }
}

#[async_trait]
impl TileOrigin for FakeArchive {
    async fn fetch(&self, key: &TileKey) -> skadi::Result<Vec<u8>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.tiles
            .get(key)
            .cloned()
            .ok_or_else(|| ElevationError::Origin {
                key: key.encode(),
                reason: "HTTP 404 Not Found".to_string(),
            })
    }
}

fn fuji_key() -> TileKey {
    TileKey::new(35, 138)
}

fn archive() -> Arc<FakeArchive> {
    // sample_from_south(r, _) == r / 2 on the Fuji tile
    let fuji = Tile::from_fn(fuji_key(), |row, _| ((TILE_SIZE - 1 - row) / 2) as i16);
    let nyc = Tile::filled(TileKey::new(40, -75), 10);
    Arc::new(FakeArchive::default().with(fuji).with(nyc))
}

/// Create a test server over the fake archive and an in-memory durable tier.
fn create_test_server(archive: Arc<FakeArchive>) -> (TestServer, Arc<MemoryStore>) {
    let durable = Arc::new(MemoryStore::default());
    let service = ElevationServiceBuilder::new()
        .origin(archive)
        .durable(durable.clone())
        .build()
        .unwrap();
    let state = Arc::new(AppState { service });

    (TestServer::new(router(state)).unwrap(), durable)
}

#[tokio::test]
async fn test_elevation_endpoint_success() {
    let (server, _) = create_test_server(archive());

    let response = server
        .get("/elevation")
        .add_query_param("lat", 35.5)
        .add_query_param("lon", 138.5)
        .await;

    response.assert_status_ok();
    let json: Value = response.json();
    assert_eq!(json["lat"], 35.5);
    assert_eq!(json["lon"], 138.5);
    // Row 1800 of the south-up gradient
    assert_eq!(json["elevation"], 900.0);
}

#[tokio::test]
async fn test_elevation_endpoint_end_to_end_point() {
    let (server, durable) = create_test_server(archive());

    let response = server
        .get("/elevation")
        .add_query_param("lat", 40.7128)
        .add_query_param("lon", -74.0060)
        .await;

    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["elevation"], 10.0);
    // Written through under the canonical key
    assert_eq!(durable.len(), 1);
    assert!(durable.exists("N40/N40W075.hgt.gz").await.unwrap());
}

#[tokio::test]
async fn test_elevation_endpoint_invalid_coordinates() {
    let (server, _) = create_test_server(archive());

    let response = server
        .get("/elevation")
        .add_query_param("lat", 91.0)
        .add_query_param("lon", 0.0)
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let json: Value = response.json();
    assert!(json["error"].as_str().unwrap().contains("Invalid coordinates"));
}

#[tokio::test]
async fn test_elevation_endpoint_missing_params() {
    let (server, _) = create_test_server(archive());

    let response = server
        .get("/elevation")
        .add_query_param("lat", 35.5)
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = server
        .get("/elevation")
        .add_query_param("lat", "north")
        .add_query_param("lon", 138.5)
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_elevation_endpoint_unavailable_tile() {
    let (server, _) = create_test_server(archive());

    let response = server
        .get("/elevation")
        .add_query_param("lat", 0.5)
        .add_query_param("lon", -150.5)
        .await;

    response.assert_status(StatusCode::NOT_FOUND);
    let json: Value = response.json();
    assert!(json["error"].as_str().unwrap().contains("N00/N00W151.hgt.gz"));
}

#[tokio::test]
async fn test_batch_endpoint_preserves_order() {
    let archive = archive();
    let (server, _) = create_test_server(archive.clone());

    let response = server
        .post("/elevation")
        .json(&json!({
            "points": [
                {"lat": 35.5, "lon": 138.5},
                {"lat": 0.5, "lon": -150.5},
                {"lat": 40.7128, "lon": -74.0060},
                {"lat": 95.0, "lon": 0.0},
                {"lat": 35.0, "lon": 138.9}
            ]
        }))
        .await;

    response.assert_status_ok();
    let json: Value = response.json();
    assert_eq!(json["elevations"], json!([900.0, null, 10.0, null, 0.0]));
    // Fuji, ocean and NYC tiles; the out-of-range point never reaches a tier
    assert_eq!(archive.fetches.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_batch_endpoint_rejects_empty_and_oversized() {
    let (server, _) = create_test_server(archive());

    let response = server
        .post("/elevation")
        .json(&json!({ "points": [] }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let points: Vec<Value> = (0..=MAX_BATCH_POINTS)
        .map(|_| json!({"lat": 35.5, "lon": 138.5}))
        .collect();
    let response = server
        .post("/elevation")
        .json(&json!({ "points": points }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let json: Value = response.json();
    assert!(json["error"].as_str().unwrap().contains("10000"));
}

#[tokio::test]
async fn test_batch_endpoint_malformed_body() {
    let (server, _) = create_test_server(archive());

    let response = server
        .post("/elevation")
        .json(&json!({ "coordinates": [[35.5, 138.5]] }))
        .await;
    assert!(response.status_code().is_client_error());
}

#[tokio::test]
async fn test_health_endpoint() {
    let (server, _) = create_test_server(archive());

    let response = server.get("/health").await;

    response.assert_status_ok();
    let json: Value = response.json();
    assert_eq!(json["status"], "healthy");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_stats_and_clear_cache() {
    let archive = archive();
    let (server, _) = create_test_server(archive.clone());

    let json: Value = server.get("/stats").await.json();
    assert_eq!(json["resident"], 0);
    assert_eq!(json["in_flight"], 0);
    assert_eq!(json["hit_rate"], 0.0);

    for _ in 0..2 {
        server
            .get("/elevation")
            .add_query_param("lat", 35.5)
            .add_query_param("lon", 138.5)
            .await
            .assert_status_ok();
    }

    let json: Value = server.get("/stats").await.json();
    assert_eq!(json["resident"], 1);
    assert_eq!(json["hits"], 1);
    assert_eq!(json["misses"], 1);
    assert_eq!(json["hit_rate"], 0.5);

    server
        .delete("/cache")
        .await
        .assert_status(StatusCode::NO_CONTENT);
    let json: Value = server.get("/stats").await.json();
    assert_eq!(json["resident"], 0);

    // Served from the durable tier after the memory tier is cleared
    server
        .get("/elevation")
        .add_query_param("lat", 35.5)
        .add_query_param("lon", 138.5)
        .await
        .assert_status_ok();
    assert_eq!(archive.fetches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_openapi_document() {
    let (server, _) = create_test_server(archive());

    let response = server.get("/api-docs/openapi.json").await;

    response.assert_status_ok();
    let json: Value = response.json();
    assert!(json["paths"]["/elevation"]["get"].is_object());
    assert!(json["paths"]["/elevation"]["post"].is_object());
    assert!(json["paths"]["/cache"]["delete"].is_object());
}
