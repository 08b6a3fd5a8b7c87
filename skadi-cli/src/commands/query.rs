use anyhow::{bail, Result};
use serde::Serialize;
use skadi::LocationData;

use super::{build_service, runtime};
use crate::TierArgs;

#[derive(Serialize)]
struct ElevationResponse {
    lat: f64,
    lon: f64,
    tile: String,
    elevation: Option<f64>,
}

pub fn run(tiers: &TierArgs, lat: f64, lon: f64, json: bool) -> Result<()> {
    let point = LocationData::new(lat, lon);
    if !point.is_valid() {
        bail!("Invalid coordinates: lat={}, lon={}", lat, lon);
    }

    let service = build_service(tiers)?;
    let elevation = runtime()?.block_on(service.fetch_elevation(point));

    if json {
        let response = ElevationResponse {
            lat,
            lon,
            tile: point.tile_key().encode(),
            elevation,
        };
        println!("{}", serde_json::to_string(&response)?);
    } else {
        println!("{}", format_elevation(elevation));
    }

    Ok(())
}

/// Render an elevation for output, `void` when unavailable.
pub fn format_elevation(elevation: Option<f64>) -> String {
    match elevation {
        Some(e) => format!("{:.2}", e),
        None => "void".to_string(),
    }
}
