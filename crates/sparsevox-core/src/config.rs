//! Octree construction parameters.

use glam::{DVec3, Vec3};
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_PAGE_BYTES, DIRECT_PAGING_THRESHOLD, MAX_VOXEL_LEVELS};
use crate::error::{Error, Result};
use crate::transform::VoxelSpaceTransform;

/// Parameters for building a sparse virtualized voxel octree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OctreeConfig {
    /// World-space center of the volume
    pub center: DVec3,
    /// Half-size of the region to cover, in world units
    pub extent: Vec3,
    /// Edge length of one finest-level voxel
    pub voxel_size: f32,
    /// Target bytes per page cube (0 selects the default)
    pub desired_page_bytes: usize,
    /// Levels with fewer pages than this are allocated directly
    pub direct_paging_threshold: usize,
}

impl Default for OctreeConfig {
    fn default() -> Self {
        Self {
            center: DVec3::ZERO,
            extent: Vec3::splat(16.0),
            voxel_size: 1.0,
            desired_page_bytes: DEFAULT_PAGE_BYTES,
            direct_paging_threshold: DIRECT_PAGING_THRESHOLD,
        }
    }
}

impl OctreeConfig {
    /// Create a config with the default paging policy.
    pub fn new(center: DVec3, extent: Vec3, voxel_size: f32) -> Self {
        Self {
            center,
            extent,
            voxel_size,
            ..Default::default()
        }
    }

    /// Override the page budget.
    #[must_use]
    pub const fn with_page_bytes(mut self, desired_page_bytes: usize) -> Self {
        self.desired_page_bytes = desired_page_bytes;
        self
    }

    /// Override the direct paging threshold.
    #[must_use]
    pub const fn with_direct_paging_threshold(mut self, pages: usize) -> Self {
        self.direct_paging_threshold = pages;
        self
    }

    /// Page budget with the 0 = default rule applied
    pub const fn effective_page_bytes(&self) -> usize {
        if self.desired_page_bytes == 0 {
            DEFAULT_PAGE_BYTES
        } else {
            self.desired_page_bytes
        }
    }

    /// Check the config and build its voxel space transform.
    pub fn transform(&self) -> Result<VoxelSpaceTransform> {
        let transform = VoxelSpaceTransform::new(self.center, self.extent, self.voxel_size)?;
        if transform.level_count() > MAX_VOXEL_LEVELS {
            return Err(Error::InvalidConfig(format!(
                "{}^3 voxels needs {} levels, at most {MAX_VOXEL_LEVELS} are supported",
                transform.dimensions(),
                transform.level_count(),
            )));
        }
        Ok(transform)
    }

    /// Validate without keeping the transform.
    pub fn validate(&self) -> Result<()> {
        self.transform().map(|_| ())
    }
}
