//! Tile addressing.
//!
//! Every tier (memory, durable, origin) addresses a tile by the same
//! canonical key, derived from the integer floor of the query coordinates.
//!
//! # Key Format
//!
//! Keys follow the Skadi layout: `{N|S}{lat}/{N|S}{lat}{E|W}{lon}.hgt.gz`
//!
//! - Latitude: 2 digits with N/S prefix (e.g., N35, S05)
//! - Longitude: 3 digits with E/W prefix (e.g., E138, W074)
//!
//! The key names the **southwest corner** of the 1° × 1° tile, and the
//! directory component repeats the latitude part of the filename.

use std::fmt;

/// File extension shared by every tile key.
pub const TILE_EXTENSION: &str = ".hgt.gz";

/// Integer (latitude band, longitude band) address of a 1° × 1° tile.
///
/// # Examples
///
/// ```
/// use skadi::TileKey;
///
/// let key = TileKey::from_coords(40.7128, -74.0060);
/// assert_eq!(key.encode(), "N40/N40W075.hgt.gz");
///
/// assert_eq!(TileKey::new(42, 0).encode(), "N42/N42E000.hgt.gz");
/// assert_eq!(TileKey::new(-5, -100).encode(), "S05/S05W100.hgt.gz");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    /// Latitude of the southwest corner.
    pub lat_band: i32,
    /// Longitude of the southwest corner.
    pub lon_band: i32,
}

impl TileKey {
    /// Create a key from already-floored bands.
    pub fn new(lat_band: i32, lon_band: i32) -> Self {
        Self { lat_band, lon_band }
    }

    /// Create the key of the tile containing `(lat, lon)`.
    pub fn from_coords(lat: f64, lon: f64) -> Self {
        Self::new(lat.floor() as i32, lon.floor() as i32)
    }

    /// The latitude directory component, e.g. `"N40"`.
    pub fn lat_dir(&self) -> String {
        let prefix = if self.lat_band < 0 { 'S' } else { 'N' };
        format!("{}{:02}", prefix, self.lat_band.unsigned_abs())
    }

    /// The filename without extension, e.g. `"N40W074"`.
    pub fn file_stem(&self) -> String {
        let prefix = if self.lon_band < 0 { 'W' } else { 'E' };
        format!(
            "{}{}{:03}",
            self.lat_dir(),
            prefix,
            self.lon_band.unsigned_abs()
        )
    }

    /// The canonical key string, e.g. `"N40/N40W074.hgt.gz"`.
    pub fn encode(&self) -> String {
        format!("{}/{}{}", self.lat_dir(), self.file_stem(), TILE_EXTENSION)
    }

    /// Parse a key string back into bands.
    ///
    /// Accepts the full key, a bare filename, or a stem; the directory
    /// component and the `.hgt`/`.hgt.gz` extension are optional and the
    /// hemisphere letters are case-insensitive.
    ///
    /// ```
    /// use skadi::TileKey;
    ///
    /// assert_eq!(TileKey::parse("N40/N40W074.hgt.gz"), Some(TileKey::new(40, -74)));
    /// assert_eq!(TileKey::parse("s12e077.hgt"), Some(TileKey::new(-12, 77)));
    /// assert_eq!(TileKey::parse("invalid"), None);
    /// ```
    pub fn parse(key: &str) -> Option<Self> {
        let name = key.rsplit('/').next().unwrap_or(key);
        let name = name.strip_suffix(".gz").unwrap_or(name);
        let name = name.strip_suffix(".hgt").unwrap_or(name);

        // N00E000
        if name.len() != 7 || !name.is_ascii() {
            return None;
        }

        let bytes = name.as_bytes();
        let lat_sign = match bytes[0].to_ascii_uppercase() {
            b'N' => 1,
            b'S' => -1,
            _ => return None,
        };
        let lon_sign = match bytes[3].to_ascii_uppercase() {
            b'E' => 1,
            b'W' => -1,
            _ => return None,
        };

        let lat: i32 = name[1..3].parse().ok()?;
        let lon: i32 = name[4..7].parse().ok()?;

        Some(Self::new(lat * lat_sign, lon * lon_sign))
    }

    /// Whether `(lat, lon)` falls inside this tile's half-open square.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        Self::from_coords(lat, lon) == *self
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}
