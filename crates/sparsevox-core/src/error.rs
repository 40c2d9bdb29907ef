//! Error types for sparsevox.

use glam::IVec3;
use thiserror::Error;

/// Library-wide error type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Configuration rejected at construction time
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Voxel write outside the volume
    #[error("Out of bounds: voxel {pos} is outside the {dimensions}^3 volume")]
    OutOfBounds {
        /// Offending voxel coordinate
        pos: IVec3,
        /// Edge length of the finest level
        dimensions: u32,
    },
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
