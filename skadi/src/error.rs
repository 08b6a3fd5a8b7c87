//! Error types for the skadi library.

use thiserror::Error;

/// Errors that can occur while resolving tiles or computing elevations.
///
/// The error is `Clone` so that a single in-flight resolution can hand the
/// same outcome to every caller waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ElevationError {
    /// No tier (memory, durable, origin) could produce the tile.
    #[error("Tile {key} unavailable: {reason}")]
    TileUnavailable { key: String, reason: String },

    /// The tile payload failed to decompress or has the wrong size.
    #[error("Corrupt tile {key}: {reason}")]
    CorruptTile { key: String, reason: String },

    /// A durable tier operation failed.
    #[error("Durable tier error for {key}: {reason}")]
    DurableTier { key: String, reason: String },

    /// A single request to the origin archive failed.
    #[error("Origin fetch failed for {key}: {reason}")]
    Origin { key: String, reason: String },

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ElevationError {
    /// Returns the tile key this error refers to, if any.
    pub fn key(&self) -> Option<&str> {
        match self {
            ElevationError::TileUnavailable { key, .. }
            | ElevationError::CorruptTile { key, .. }
            | ElevationError::DurableTier { key, .. }
            | ElevationError::Origin { key, .. } => Some(key),
            ElevationError::Config(_) => None,
        }
    }
}

/// Result type alias using [`ElevationError`].
pub type Result<T> = std::result::Result<T, ElevationError>;
