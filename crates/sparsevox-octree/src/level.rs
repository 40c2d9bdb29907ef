//! One resolution of the mip chain.
//!
//! A level is a dense cube of bytes tiled into page cubes. At level 0 the
//! bytes are voxel values; at every coarser level each byte is an 8-bit
//! occupancy mask with one bit per child octant of the next finer level.
//! Writes propagate upward through the rest of the chain and stop at the
//! first level whose byte does not change. A virtual page whose bytes all
//! return to zero is released.

use glam::IVec3;
use sparsevox_core::constants::VOXEL_BYTE_SIZE;

use crate::arena::{PagedArena, PagingMode};
use crate::batch::{DirtyLog, DirtyPage, PageUpdateKind};

/// Summary of one level's geometry and paging state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LevelInfo {
    pub index: u8,
    /// Voxels per axis
    pub dimensions: u32,
    /// Voxels per axis of one page cube
    pub page_cube_dimensions: u32,
    /// Page cubes per axis
    pub pages_per_axis: u32,
    pub page_bytes: usize,
    pub paging_mode: PagingMode,
    pub committed_pages: usize,
    pub reserved_bytes: usize,
}

/// Dense, demand-paged byte cube for one mip level.
#[derive(Debug)]
pub struct Level {
    index: u8,
    dimensions: u32,
    page_cube_dimensions: u32,
    page_cube_shift: u32,
    pages_per_axis: u32,
    arena: PagedArena,
    dirty_generation: Vec<u64>,
}

impl Level {
    /// Build a level of `dimensions`^3 voxels.
    ///
    /// Page cubes are sized from `desired_page_bytes`; levels with fewer than
    /// `direct_paging_threshold` pages are allocated directly.
    pub fn new(
        index: u8,
        dimensions: u32,
        desired_page_bytes: usize,
        direct_paging_threshold: usize,
    ) -> Self {
        debug_assert!(dimensions.is_power_of_two());
        let page_cube_dimensions = page_cube_dimensions(desired_page_bytes).min(dimensions);
        let page_cube_shift = page_cube_dimensions.trailing_zeros();
        let pages_per_axis = dimensions >> page_cube_shift;

        let page_bytes = (page_cube_dimensions as usize).pow(3) * VOXEL_BYTE_SIZE;
        let page_count = (pages_per_axis as usize).pow(3);
        let mode = if page_count < direct_paging_threshold {
            PagingMode::Direct
        } else {
            PagingMode::Virtual
        };

        tracing::debug!(
            level = index,
            top = index == 0,
            dimensions,
            page_cube_dimensions,
            page_count,
            ?mode,
            "built level"
        );

        Self {
            index,
            dimensions,
            page_cube_dimensions,
            page_cube_shift,
            pages_per_axis,
            arena: PagedArena::new(mode, page_bytes, page_count),
            dirty_generation: vec![0; page_count],
        }
    }

    /// Position of this level in the chain (0 = finest)
    pub const fn index(&self) -> u8 {
        self.index
    }

    /// Voxels per axis
    pub const fn dimensions(&self) -> u32 {
        self.dimensions
    }

    pub const fn page_cube_dimensions(&self) -> u32 {
        self.page_cube_dimensions
    }

    pub const fn paging_mode(&self) -> PagingMode {
        self.arena.mode()
    }

    pub const fn committed_pages(&self) -> usize {
        self.arena.committed_pages()
    }

    /// Address space reserved for this level
    pub const fn reserved_bytes(&self) -> usize {
        self.arena.reserved_bytes()
    }

    pub fn memory_usage(&self) -> usize {
        self.arena.memory_usage() + self.dirty_generation.len() * std::mem::size_of::<u64>()
    }

    pub const fn info(&self) -> LevelInfo {
        LevelInfo {
            index: self.index,
            dimensions: self.dimensions,
            page_cube_dimensions: self.page_cube_dimensions,
            pages_per_axis: self.pages_per_axis,
            page_bytes: self.arena.page_bytes(),
            paging_mode: self.arena.mode(),
            committed_pages: self.arena.committed_pages(),
            reserved_bytes: self.arena.reserved_bytes(),
        }
    }

    /// Whether `pos` addresses a voxel of this level
    #[inline]
    pub fn contains(&self, pos: IVec3) -> bool {
        let dim = self.dimensions as i32;
        pos.cmpge(IVec3::ZERO).all() && pos.cmplt(IVec3::splat(dim)).all()
    }

    /// Split a voxel position into (page index, byte offset within the page).
    ///
    /// Pages are cubes of the volume rather than linear runs, so voxels that
    /// are close in space tend to share a page.
    ///
    /// # Panics
    ///
    /// Panics if `pos` lies outside the level.
    #[inline]
    pub fn offsets(&self, pos: IVec3) -> (usize, usize) {
        assert!(
            self.contains(pos),
            "voxel {pos} outside level {} ({}^3)",
            self.index,
            self.dimensions
        );
        let (x, y, z) = (pos.x as usize, pos.y as usize, pos.z as usize);
        let shift = self.page_cube_shift;
        let pages = self.pages_per_axis as usize;
        let page = (x >> shift) + ((y >> shift) + (z >> shift) * pages) * pages;

        let mask = (self.page_cube_dimensions - 1) as usize;
        let cube = self.page_cube_dimensions as usize;
        let local = (x & mask) + ((y & mask) + (z & mask) * cube) * cube;
        (page, local * VOXEL_BYTE_SIZE)
    }

    /// Voxel coordinate of a page's minimum corner
    pub fn page_origin(&self, page: usize) -> IVec3 {
        let pages = self.pages_per_axis as usize;
        let x = page % pages;
        let y = (page / pages) % pages;
        let z = page / (pages * pages);
        IVec3::new(x as i32, y as i32, z as i32) << self.page_cube_shift as i32
    }

    /// Contents of a committed page
    pub fn page_data(&self, page: usize) -> Option<&[u8]> {
        self.arena.page(page)
    }

    /// Read a voxel; uncommitted pages read as 0 and stay uncommitted.
    #[inline]
    pub fn get(&self, pos: IVec3) -> u8 {
        let (page, offset) = self.offsets(pos);
        self.arena.read(page, offset)
    }

    /// Store `value` and keep the coarser levels' occupancy in sync.
    ///
    /// `coarser` is the remainder of the chain above this level. Returns
    /// `false` without touching anything if the voxel already holds `value`.
    pub fn set(&mut self, coarser: &mut [Self], pos: IVec3, value: u8, log: &mut DirtyLog) -> bool {
        self.combine(coarser, pos, |_| value, log)
    }

    /// Set bits of `mask` in the byte at `pos`, propagating if it changed.
    pub fn or(&mut self, coarser: &mut [Self], pos: IVec3, mask: u8, log: &mut DirtyLog) -> bool {
        self.combine(coarser, pos, |old| old | mask, log)
    }

    /// Keep only the bits of `mask` in the byte at `pos`, propagating if it changed.
    pub fn and(&mut self, coarser: &mut [Self], pos: IVec3, mask: u8, log: &mut DirtyLog) -> bool {
        self.combine(coarser, pos, |old| old & mask, log)
    }

    fn combine(
        &mut self,
        coarser: &mut [Self],
        pos: IVec3,
        op: impl FnOnce(u8) -> u8,
        log: &mut DirtyLog,
    ) -> bool {
        let (page, offset) = self.offsets(pos);
        let old = self.arena.read(page, offset);
        let new = op(old);
        if new == old {
            return false;
        }

        let newly_committed = self.arena.write(page, offset, new);
        if new == 0 {
            self.arena.decommit_if_empty(page);
        }
        self.mark_dirty(page, newly_committed, log);
        propagate(coarser, pos, new != 0, log);
        true
    }

    fn mark_dirty(&mut self, page: usize, newly_committed: bool, log: &mut DirtyLog) {
        let generation = log.generation();
        if self.dirty_generation[page] == generation {
            return;
        }
        self.dirty_generation[page] = generation;
        let kind = if newly_committed {
            PageUpdateKind::Added
        } else {
            PageUpdateKind::Updated
        };
        log.record(
            usize::from(self.index),
            DirtyPage {
                page: page as u32,
                kind,
            },
        );
    }
}

/// Push an occupancy change of the voxel at `pos` into the next coarser level.
fn propagate(coarser: &mut [Level], pos: IVec3, occupied: bool, log: &mut DirtyLog) {
    let Some((next, rest)) = coarser.split_first_mut() else {
        return;
    };
    let (parent, bit) = child_position_and_mask(pos);
    if occupied {
        next.or(rest, parent, bit, log);
    } else {
        next.and(rest, parent, !bit, log);
    }
}

/// Parent coordinate at the next coarser level and the octant bit `pos` owns there.
///
/// Octant index is `x | y << 1 | z << 2` of the low coordinate bits.
#[inline]
pub fn child_position_and_mask(pos: IVec3) -> (IVec3, u8) {
    let octant = (pos.x & 1) | ((pos.y & 1) << 1) | ((pos.z & 1) << 2);
    (pos >> 1, 1u8 << octant)
}

/// Largest power-of-two cube edge whose bytes fit in `desired_page_bytes`.
pub fn page_cube_dimensions(desired_page_bytes: usize) -> u32 {
    let voxels = (desired_page_bytes / VOXEL_BYTE_SIZE).max(1);
    let mut edge = 1usize;
    while let Some(next) = (edge * 2).checked_pow(3) {
        if next > voxels {
            break;
        }
        edge *= 2;
    }
    edge as u32
}
