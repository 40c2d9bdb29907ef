//! Core types, math, and configuration for sparsevox.
//!
//! This crate provides the foundational types shared by the octree and its
//! tools:
//! - Rays, bounding boxes and axis helpers
//! - The world <-> voxel space transform
//! - Octree configuration
//! - Common error types

pub mod config;
pub mod error;
pub mod math;
pub mod transform;

pub use config::OctreeConfig;
pub use error::{Error, Result};
pub use math::{Aabb, Axis, Ray};
pub use transform::VoxelSpaceTransform;

/// Volume-wide constants
pub mod constants {
    /// Maximum number of mip levels in one octree (finest included)
    pub const MAX_VOXEL_LEVELS: usize = 15;
    /// Page budget used when the caller passes 0 (64 KiB, one allocation granule)
    pub const DEFAULT_PAGE_BYTES: usize = 64 * 1024;
    /// Levels smaller than this many pages are stored directly on the heap
    pub const DIRECT_PAGING_THRESHOLD: usize = 10;
    /// Iteration budget for a single hierarchical ray march
    pub const MAX_RAY_ITERATIONS: u32 = 128;
    /// Bytes stored per voxel
    pub const VOXEL_BYTE_SIZE: usize = 1;
}
