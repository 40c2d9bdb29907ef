//! World <-> voxel space conversion.
//!
//! Voxel space has its origin at the minimum corner of the volume and one
//! unit per finest-level voxel. The volume is always a power-of-two cube
//! centered on the world-space center.

use glam::{DMat4, DVec3, IVec3, Vec3};

use crate::error::{Error, Result};
use crate::math::Aabb;

/// Fixed mapping between world positions and voxel coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct VoxelSpaceTransform {
    center: DVec3,
    extent: Vec3,
    voxel_size: f32,
    dimensions: u32,
    world_to_voxel: DMat4,
    voxel_to_world: DMat4,
}

impl VoxelSpaceTransform {
    /// Create a transform for a volume of half-size `extent` around `center`.
    ///
    /// The grid edge is `extent / voxel_size` (largest axis) rounded up to a
    /// power of two and doubled, so the cube spans the extent on both sides.
    pub fn new(center: DVec3, extent: Vec3, voxel_size: f32) -> Result<Self> {
        if !voxel_size.is_finite() || voxel_size <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "voxel size must be positive, got {voxel_size}"
            )));
        }
        if !extent.is_finite() || extent.min_element() <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "extent must be positive on every axis, got {extent}"
            )));
        }
        if !center.is_finite() {
            return Err(Error::InvalidConfig(format!(
                "center must be finite, got {center}"
            )));
        }

        let dimensions = grid_dimensions(extent, voxel_size).ok_or_else(|| {
            Error::InvalidConfig(format!(
                "extent {extent} at voxel size {voxel_size} exceeds the addressable grid"
            ))
        })?;

        let scale = f64::from(voxel_size);
        let half = DVec3::splat(f64::from(dimensions / 2));
        let world_to_voxel = DMat4::from_translation(half)
            * DMat4::from_scale(DVec3::splat(scale.recip()))
            * DMat4::from_translation(-center);
        let voxel_to_world = DMat4::from_translation(center)
            * DMat4::from_scale(DVec3::splat(scale))
            * DMat4::from_translation(-half);

        Ok(Self {
            center,
            extent,
            voxel_size,
            dimensions,
            world_to_voxel,
            voxel_to_world,
        })
    }

    /// World-space center of the volume
    #[inline]
    pub const fn center(&self) -> DVec3 {
        self.center
    }

    /// Requested half-extent in world units
    #[inline]
    pub const fn extent(&self) -> Vec3 {
        self.extent
    }

    /// Edge length of one finest-level voxel in world units
    #[inline]
    pub const fn voxel_size(&self) -> f32 {
        self.voxel_size
    }

    /// Voxels per axis of the finest level (power of two)
    #[inline]
    pub const fn dimensions(&self) -> u32 {
        self.dimensions
    }

    /// Number of mip levels, down to and including the 1^3 level
    #[inline]
    pub const fn level_count(&self) -> usize {
        self.dimensions.trailing_zeros() as usize + 1
    }

    /// Affine world -> voxel matrix
    #[inline]
    pub const fn world_to_voxel(&self) -> DMat4 {
        self.world_to_voxel
    }

    /// Affine voxel -> world matrix
    #[inline]
    pub const fn voxel_to_world(&self) -> DMat4 {
        self.voxel_to_world
    }

    /// Continuous voxel-space position of a world point
    #[inline]
    pub fn to_voxel_space(&self, world: DVec3) -> DVec3 {
        self.world_to_voxel.transform_point3(world)
    }

    /// World position of a continuous voxel-space point
    #[inline]
    pub fn to_world_space(&self, voxel: DVec3) -> DVec3 {
        self.voxel_to_world.transform_point3(voxel)
    }

    /// Integer voxel containing a world point (may lie outside the volume)
    #[inline]
    pub fn voxel_at(&self, world: DVec3) -> IVec3 {
        self.to_voxel_space(world).floor().as_ivec3()
    }

    /// World-space center of a finest-level voxel
    #[inline]
    pub fn voxel_center(&self, voxel: IVec3) -> DVec3 {
        self.to_world_space(voxel.as_dvec3() + 0.5)
    }

    /// Whether a finest-level voxel coordinate lies inside the volume
    #[inline]
    pub fn contains_voxel(&self, voxel: IVec3) -> bool {
        let dim = self.dimensions as i32;
        voxel.cmpge(IVec3::ZERO).all() && voxel.cmplt(IVec3::splat(dim)).all()
    }

    /// Volume bounds in voxel space
    #[inline]
    pub fn voxel_bounds(&self) -> Aabb {
        Aabb::new(DVec3::ZERO, DVec3::splat(f64::from(self.dimensions)))
    }

    /// Volume bounds in world space
    #[inline]
    pub fn world_bounds(&self) -> Aabb {
        let half = f64::from(self.dimensions) * f64::from(self.voxel_size) * 0.5;
        Aabb::from_center_half_extents(self.center, DVec3::splat(half))
    }
}

/// Power-of-two grid edge covering `extent` on both sides of the center.
///
/// Returns `None` when the grid would not fit in 32-bit voxel coordinates.
pub fn grid_dimensions(extent: Vec3, voxel_size: f32) -> Option<u32> {
    let voxels = (f64::from(extent.max_element()) / f64::from(voxel_size)).ceil();
    if !voxels.is_finite() || voxels > f64::from(1u32 << 29) {
        return None;
    }
    (voxels as u32).max(1).next_power_of_two().checked_mul(2)
}
