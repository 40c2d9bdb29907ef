//! Axis-aligned 2D cuts through one level, for debug views.

use glam::{DVec3, IVec3};
use sparsevox_core::Axis;

use crate::octree::SparseVirtualizedVoxelOctree;

/// Raw bytes of one plane of a level.
///
/// Rows run along the second plane axis, columns along the first (see
/// [`Axis::plane_axes`]).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoxelSlice {
    pub axis: Axis,
    pub level: u8,
    /// Plane coordinate along `axis`, in level voxels
    pub depth: i32,
    pub width: u32,
    pub height: u32,
    pub values: Vec<u8>,
}

impl VoxelSlice {
    /// Byte at column `u`, row `v`
    pub fn get(&self, u: u32, v: u32) -> u8 {
        if u >= self.width || v >= self.height {
            return 0;
        }
        self.values[(v * self.width + u) as usize]
    }

    /// Number of non-zero cells
    pub fn occupied(&self) -> usize {
        self.values.iter().filter(|&&value| value != 0).count()
    }
}

impl SparseVirtualizedVoxelOctree {
    /// Extract the plane of `level` perpendicular to `axis` through a world position.
    ///
    /// The position is clamped into the volume; returns `None` for a missing level.
    pub fn slice(&self, world_position: DVec3, axis: Axis, level: u8) -> Option<VoxelSlice> {
        let source = self.level(level)?;
        let dim = source.dimensions() as i32;
        let voxel = self.transform().voxel_at(world_position) >> i32::from(level);
        let depth = voxel[axis.index()].clamp(0, dim - 1);
        let (u_axis, v_axis) = axis.plane_axes();

        let mut values = Vec::with_capacity((dim * dim) as usize);
        let mut pos = IVec3::ZERO;
        pos[axis.index()] = depth;
        for v in 0..dim {
            pos[v_axis.index()] = v;
            for u in 0..dim {
                pos[u_axis.index()] = u;
                values.push(source.get(pos));
            }
        }

        Some(VoxelSlice {
            axis,
            level,
            depth,
            width: source.dimensions(),
            height: source.dimensions(),
            values,
        })
    }
}
