//! Tile decoding and sample access.
//!
//! This module provides the [`Tile`] struct, a fully decoded 3601 × 3601 grid
//! of elevation samples built from a gzip-compressed `.hgt.gz` payload.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::error::{ElevationError, Result};
use crate::key::TileKey;

/// Number of samples per row/column (1 arc-second, ~30m resolution).
pub const TILE_SIZE: usize = 3601;

/// Decompressed payload size: 3601 × 3601 × 2 bytes
pub const TILE_BYTES: usize = TILE_SIZE * TILE_SIZE * 2; // 25,934,402 bytes

/// Value indicating no data (void) in SRTM-derived tiles
pub const VOID_VALUE: i16 = -32768;

/// A decoded elevation tile.
///
/// Samples are kept in file order: row-major, row 0 at the northern edge,
/// column 0 at the western edge. A `Tile` is immutable once built and is
/// shared between readers behind an `Arc`.
///
/// # Example
///
/// ```
/// use skadi::{Tile, TileKey};
///
/// let tile = Tile::filled(TileKey::new(35, 138), 120);
/// let gz = tile.encode_gz().unwrap();
///
/// let decoded = Tile::decode(TileKey::new(35, 138), &gz).unwrap();
/// assert_eq!(decoded.sample(0, 0), 120);
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Tile {
    key: TileKey,
    samples: Box<[i16]>,
}

impl Tile {
    /// Decode a gzip-compressed `.hgt.gz` payload.
    ///
    /// # Errors
    ///
    /// Returns [`ElevationError::CorruptTile`] if the payload fails to
    /// decompress or does not decompress to exactly [`TILE_BYTES`] bytes.
    pub fn decode(key: TileKey, compressed: &[u8]) -> Result<Self> {
        let mut raw = Vec::with_capacity(TILE_BYTES);
        GzDecoder::new(compressed)
            // One byte of slack so oversized payloads are detected without
            // inflating an arbitrarily large stream.
            .take(TILE_BYTES as u64 + 1)
            .read_to_end(&mut raw)
            .map_err(|e| ElevationError::CorruptTile {
                key: key.encode(),
                reason: format!("Failed to decompress gzip: {}", e),
            })?;

        Self::from_raw(key, &raw)
    }

    /// Build a tile from an uncompressed big-endian `.hgt` payload.
    pub fn from_raw(key: TileKey, raw: &[u8]) -> Result<Self> {
        if raw.len() != TILE_BYTES {
            return Err(ElevationError::CorruptTile {
                key: key.encode(),
                reason: format!("expected {} bytes, got {}", TILE_BYTES, raw.len()),
            });
        }

        let samples = raw
            .chunks_exact(2)
            .map(|pair| i16::from_be_bytes([pair[0], pair[1]]))
            .collect();

        Ok(Self { key, samples })
    }

    /// Build a tile where every sample has the same elevation.
    pub fn filled(key: TileKey, elevation: i16) -> Self {
        Self {
            key,
            samples: vec![elevation; TILE_SIZE * TILE_SIZE].into_boxed_slice(),
        }
    }

    /// Build a tile from a function of `(row, col)`, row 0 at the north edge.
    pub fn from_fn(key: TileKey, f: impl Fn(usize, usize) -> i16) -> Self {
        let mut samples = Vec::with_capacity(TILE_SIZE * TILE_SIZE);
        for row in 0..TILE_SIZE {
            for col in 0..TILE_SIZE {
                samples.push(f(row, col));
            }
        }
        Self {
            key,
            samples: samples.into_boxed_slice(),
        }
    }

    /// Re-encode the tile as a gzip-compressed big-endian payload.
    pub fn encode_gz(&self) -> Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::fast());
        let mut row_bytes = Vec::with_capacity(TILE_SIZE * 2);
        let to_err = |e: std::io::Error| ElevationError::CorruptTile {
            key: self.key.encode(),
            reason: format!("Failed to compress gzip: {}", e),
        };

        for row in self.samples.chunks_exact(TILE_SIZE) {
            row_bytes.clear();
            for sample in row {
                row_bytes.extend_from_slice(&sample.to_be_bytes());
            }
            encoder.write_all(&row_bytes).map_err(to_err)?;
        }

        encoder.finish().map_err(to_err)
    }

    /// Sample at `(row, col)` where row 0 is the northern edge.
    ///
    /// # Panics
    ///
    /// Panics if `row` or `col` is not below [`TILE_SIZE`].
    #[inline]
    pub fn sample(&self, row: usize, col: usize) -> i16 {
        assert!(row < TILE_SIZE && col < TILE_SIZE, "sample index out of range");
        self.samples[row * TILE_SIZE + col]
    }

    /// Sample at `(row, col)` where row 0 is the **southern** edge.
    ///
    /// This is the orientation the interpolator works in, since latitude
    /// grows northward; it reads the buffer at
    /// `((TILE_SIZE - row - 1) * TILE_SIZE + col)`.
    #[inline]
    pub fn sample_from_south(&self, row: usize, col: usize) -> i16 {
        assert!(row < TILE_SIZE, "sample index out of range");
        self.sample(TILE_SIZE - row - 1, col)
    }

    /// Returns the key this tile was decoded for.
    pub fn key(&self) -> TileKey {
        self.key
    }

    /// Returns the number of samples per row/column.
    pub fn size(&self) -> usize {
        TILE_SIZE
    }

    /// Lowest and highest non-void elevations, or `None` if all samples are void.
    pub fn min_max(&self) -> Option<(i16, i16)> {
        self.samples
            .iter()
            .copied()
            .filter(|&v| v != VOID_VALUE)
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }

    /// Number of void samples in the tile.
    pub fn void_count(&self) -> usize {
        self.samples.iter().filter(|&&v| v == VOID_VALUE).count()
    }
}

impl std::fmt::Debug for Tile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tile")
            .field("key", &self.key.encode())
            .field("size", &TILE_SIZE)
            .finish()
    }
}
