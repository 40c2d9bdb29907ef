//! Sparse virtualized voxel octree.
//!
//! A cubic byte volume stored as a chain of levels: level 0 holds voxel
//! values, every coarser level holds one child-occupancy mask per cell.
//! Level storage is split into page cubes that only receive memory when
//! first written, so a mostly empty volume costs little more than its page
//! tables. The level chain doubles as an acceleration structure for
//! hierarchical ray marching.

pub mod arena;
pub mod batch;
pub mod level;
pub mod octree;
pub mod ray_march;
pub mod slice;

pub use arena::{PagedArena, PagingMode};
pub use batch::{PageUpdate, PageUpdateKind};
pub use level::{Level, LevelInfo};
pub use octree::SparseVirtualizedVoxelOctree;
pub use ray_march::{RayMarchConfig, RayTrace, Termination, VoxelHit};
pub use slice::VoxelSlice;
