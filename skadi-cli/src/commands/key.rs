use anyhow::{bail, Result};
use skadi::{LocationData, OriginConfig};

use crate::TierArgs;

pub fn run(tiers: &TierArgs, lat: f64, lon: f64) -> Result<()> {
    let point = LocationData::new(lat, lon);
    if !point.is_valid() {
        bail!("Invalid coordinates: lat={}, lon={}", lat, lon);
    }

    let origin = match &tiers.origin_url {
        Some(url) => OriginConfig::with_base_url(url.clone()),
        None => OriginConfig::default(),
    };
    let key = point.tile_key();

    println!("Tile:   {}", key);
    println!("Origin: {}", origin.tile_url(&key));
    if let Some(dir) = &tiers.data_dir {
        println!("Local:  {}", dir.join(key.encode()).display());
    }

    Ok(())
}
