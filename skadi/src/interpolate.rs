//! Elevation lookup within a decoded tile.
//!
//! Both lookups take the point's absolute coordinates and use only their
//! fractional part; callers are expected to pass a tile whose key matches
//! `TileKey::from_coords(lat, lon)`.
//!
//! # Edge policy
//!
//! A tile spans `TILE_SIZE - 1` cells per degree. The fractional position is
//! clamped to `[0, 1]` and the upper neighbour index to `TILE_SIZE - 1`, so a
//! point whose fraction rounds up to exactly `1.0` (e.g. a tiny negative
//! latitude) reads the tile's own northern/eastern edge row instead of an
//! index one past the grid.

use crate::tile::{Tile, TILE_SIZE, VOID_VALUE};

/// Cells spanning one degree.
const UNIT: f64 = (TILE_SIZE - 1) as f64;

/// Grid position of a point, south-up rows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridPosition {
    /// Fractional row, 0 at the southern edge.
    pub row: f64,
    /// Fractional column, 0 at the western edge.
    pub col: f64,
}

impl GridPosition {
    /// Compute the fractional grid position of `(lat, lon)` inside its tile.
    pub fn of(lat: f64, lon: f64) -> Self {
        let lat_frac = (lat - lat.floor()).clamp(0.0, 1.0);
        let lon_frac = (lon - lon.floor()).clamp(0.0, 1.0);
        Self {
            row: lat_frac * UNIT,
            col: lon_frac * UNIT,
        }
    }
}

#[inline]
fn lerp(a: f64, b: f64, f: f64) -> f64 {
    a + (b - a) * f
}

/// Split a fractional index into `(low, high, fraction)` with both indices in range.
#[inline]
fn bracket(pos: f64) -> (usize, usize, f64) {
    let low = (pos.floor() as usize).min(TILE_SIZE - 1);
    let high = (low + 1).min(TILE_SIZE - 1);
    let frac = pos - low as f64;
    (low, high, frac)
}

/// Bilinear interpolation between the four samples surrounding `(lat, lon)`.
///
/// Returns `None` if any of the four surrounding samples is void.
///
/// # Example
///
/// ```
/// use skadi::{interpolate, Tile, TileKey};
///
/// let tile = Tile::filled(TileKey::new(35, 138), 250);
/// assert_eq!(interpolate::bilinear(&tile, 35.3606, 138.7274), Some(250.0));
/// ```
pub fn bilinear(tile: &Tile, lat: f64, lon: f64) -> Option<f64> {
    let pos = GridPosition::of(lat, lon);
    let (row_lo, row_hi, row_frac) = bracket(pos.row);
    let (col_lo, col_hi, col_frac) = bracket(pos.col);

    let corners = [
        tile.sample_from_south(row_lo, col_lo),
        tile.sample_from_south(row_lo, col_hi),
        tile.sample_from_south(row_hi, col_hi),
        tile.sample_from_south(row_hi, col_lo),
    ];
    if corners.contains(&VOID_VALUE) {
        return None;
    }
    let [ll, lh, hh, hl] = corners.map(f64::from);

    let low_row = lerp(ll, lh, col_frac);
    let high_row = lerp(hl, hh, col_frac);
    Some(lerp(low_row, high_row, row_frac))
}

/// Nearest-neighbour lookup of the sample closest to `(lat, lon)`.
///
/// Returns `None` if that sample is void.
pub fn nearest(tile: &Tile, lat: f64, lon: f64) -> Option<i16> {
    let pos = GridPosition::of(lat, lon);
    let row = (pos.row.round() as usize).min(TILE_SIZE - 1);
    let col = (pos.col.round() as usize).min(TILE_SIZE - 1);

    match tile.sample_from_south(row, col) {
        VOID_VALUE => None,
        v => Some(v),
    }
}
