//! Sparse virtualized voxel octree.
//!
//! Owns the level chain (index 0 = finest) and the world <-> voxel transform.
//! All writes enter at level 0 and propagate occupancy upward; the chain is
//! built once at construction and never resized.

use glam::{DMat4, DVec3, IVec3, Vec3};
use sparsevox_core::{Error, OctreeConfig, Result, VoxelSpaceTransform};
use tracing::{debug, info};

use crate::batch::{DirtyLog, PageUpdate, PageUpdateKind};
use crate::level::{Level, LevelInfo};

/// Multi-resolution, demand-paged byte volume.
#[derive(Debug)]
pub struct SparseVirtualizedVoxelOctree {
    transform: VoxelSpaceTransform,
    levels: Vec<Level>,
    dirty: DirtyLog,
}

impl SparseVirtualizedVoxelOctree {
    /// Build an octree covering `extent` around `center`.
    ///
    /// A `desired_page_bytes` of 0 selects the default page budget.
    pub fn new(
        center: DVec3,
        extent: Vec3,
        voxel_size: f32,
        desired_page_bytes: usize,
    ) -> Result<Self> {
        Self::from_config(
            &OctreeConfig::new(center, extent, voxel_size).with_page_bytes(desired_page_bytes),
        )
    }

    /// Build an octree from a full config.
    pub fn from_config(config: &OctreeConfig) -> Result<Self> {
        let transform = config.transform()?;
        let page_bytes = config.effective_page_bytes();

        let levels: Vec<Level> = (0..transform.level_count())
            .map(|index| {
                Level::new(
                    index as u8,
                    transform.dimensions() >> index,
                    page_bytes,
                    config.direct_paging_threshold,
                )
            })
            .collect();

        let reserved: usize = levels.iter().map(Level::reserved_bytes).sum();
        info!(
            dimensions = transform.dimensions(),
            levels = levels.len(),
            voxel_size = transform.voxel_size(),
            reserved_bytes = reserved,
            "created sparse voxel octree"
        );

        Ok(Self {
            dirty: DirtyLog::new(levels.len()),
            transform,
            levels,
        })
    }

    /// World <-> voxel mapping
    pub const fn transform(&self) -> &VoxelSpaceTransform {
        &self.transform
    }

    /// Finest-level voxels per axis
    pub const fn dimensions(&self) -> u32 {
        self.transform.dimensions()
    }

    pub const fn voxel_size(&self) -> f32 {
        self.transform.voxel_size()
    }

    pub const fn world_to_voxel(&self) -> DMat4 {
        self.transform.world_to_voxel()
    }

    pub const fn voxel_to_world(&self) -> DMat4 {
        self.transform.voxel_to_world()
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn level(&self, level: u8) -> Option<&Level> {
        self.levels.get(usize::from(level))
    }

    pub(crate) fn levels(&self) -> &[Level] {
        &self.levels
    }

    /// Geometry and paging state of every level, finest first
    pub fn level_infos(&self) -> Vec<LevelInfo> {
        self.levels.iter().map(Level::info).collect()
    }

    /// Reserved bytes of one level (0 for a level that does not exist)
    pub fn level_max_size(&self, level: u8) -> usize {
        self.level(level).map_or(0, Level::reserved_bytes)
    }

    /// Committed pages summed over all levels
    pub fn committed_pages(&self) -> usize {
        self.levels.iter().map(Level::committed_pages).sum()
    }

    /// Bytes held by this octree (committed pages plus bookkeeping)
    pub fn memory_usage(&self) -> usize {
        std::mem::size_of::<Self>() + self.levels.iter().map(Level::memory_usage).sum::<usize>()
    }

    /// Generation of the current write batch
    pub const fn dirty_counter(&self) -> u64 {
        self.dirty.generation()
    }

    /// Pages dirtied since the last `end_write`
    pub fn pending_page_updates(&self) -> usize {
        self.dirty.pending()
    }

    /// Whether a finest-level voxel lies inside the volume
    #[inline]
    pub fn contains(&self, pos: IVec3) -> bool {
        self.transform.contains_voxel(pos)
    }

    /// Write one finest-level voxel.
    ///
    /// Returns whether the stored value changed, or `OutOfBounds` if `pos`
    /// lies outside the volume.
    pub fn set(&mut self, pos: IVec3, value: u8) -> Result<bool> {
        if !self.contains(pos) {
            return Err(Error::OutOfBounds {
                pos,
                dimensions: self.dimensions(),
            });
        }
        Ok(self.write_voxel(pos, value))
    }

    /// Write the voxel containing a world position.
    pub fn set_world(&mut self, world: DVec3, value: u8) -> Result<bool> {
        self.set(self.transform.voxel_at(world), value)
    }

    /// Read a finest-level voxel; positions outside the volume read as 0.
    pub fn get(&self, pos: IVec3) -> u8 {
        if !self.contains(pos) {
            return 0;
        }
        self.levels.first().map_or(0, |finest| finest.get(pos))
    }

    /// Read the voxel containing a world position.
    pub fn get_world(&self, world: DVec3) -> u8 {
        self.get(self.transform.voxel_at(world))
    }

    /// Read a byte of `level` using that level's own coordinates.
    ///
    /// At level 0 this is the voxel value; above it, the child occupancy mask.
    /// Missing levels and out-of-range positions read as 0.
    #[inline]
    pub fn get_unscaled_at_level(&self, pos: IVec3, level: u8) -> u8 {
        match self.levels.get(usize::from(level)) {
            Some(level) if level.contains(pos) => level.get(pos),
            _ => 0,
        }
    }

    /// Fill every voxel whose center lies in the world-space box.
    ///
    /// Returns the number of voxels that changed. The box is clipped to the volume.
    #[tracing::instrument(level = "trace", skip_all)]
    pub fn set_box(&mut self, center: DVec3, extents: Vec3, value: u8) -> usize {
        let extents = extents.as_dvec3();
        let min = self.transform.to_voxel_space(center - extents);
        let max = self.transform.to_voxel_space(center + extents);
        let Some((lo, hi)) = self.voxel_range(min, max) else {
            return 0;
        };

        let mut changed = 0;
        for z in lo.z..=hi.z {
            for y in lo.y..=hi.y {
                for x in lo.x..=hi.x {
                    changed += usize::from(self.write_voxel(IVec3::new(x, y, z), value));
                }
            }
        }
        changed
    }

    /// Fill every voxel whose center lies within `radius` of `center`.
    ///
    /// Returns the number of voxels that changed. The sphere is clipped to the volume.
    #[tracing::instrument(level = "trace", skip_all)]
    pub fn set_sphere(&mut self, center: DVec3, radius: f32, value: u8) -> usize {
        let center = self.transform.to_voxel_space(center);
        let radius = f64::from(radius) / f64::from(self.voxel_size());
        let Some((lo, hi)) = self.voxel_range(center - radius, center + radius) else {
            return 0;
        };

        let radius_sq = radius * radius;
        let mut changed = 0;
        for z in lo.z..=hi.z {
            for y in lo.y..=hi.y {
                for x in lo.x..=hi.x {
                    let pos = IVec3::new(x, y, z);
                    if (pos.as_dvec3() + 0.5).distance_squared(center) <= radius_sq {
                        changed += usize::from(self.write_voxel(pos, value));
                    }
                }
            }
        }
        changed
    }

    /// Start a write batch; returns the new dirty counter.
    pub fn begin_write(&mut self) -> u64 {
        self.dirty.advance()
    }

    /// Report every page dirtied since the last flush, once each.
    ///
    /// The callback sees each page's level, index, kind and current bytes.
    /// Nested `begin_write` calls do not split a page's report. A page that
    /// was released during the span is reported as removed, unless it was
    /// also added in that span, in which case it is not reported at all.
    /// Returns the number of pages reported.
    pub fn end_write<F>(&mut self, mut on_page: F) -> usize
    where
        F: FnMut(PageUpdate<'_>),
    {
        let generation = self.dirty.generation();
        let mut reported = 0;
        for level in &self.levels {
            for dirty in self.dirty.take(usize::from(level.index())) {
                let (kind, data) = match (dirty.kind, level.page_data(dirty.page as usize)) {
                    (kind, Some(data)) => (kind, data),
                    (PageUpdateKind::Added, None) => continue,
                    (_, None) => (PageUpdateKind::Removed, &[][..]),
                };
                on_page(PageUpdate {
                    level: level.index(),
                    page: dirty.page,
                    kind,
                    data,
                });
                reported += 1;
            }
        }
        // Writes after the flush belong to a fresh generation.
        self.dirty.advance();
        debug!(generation, reported, "flushed write batch");
        reported
    }

    fn write_voxel(&mut self, pos: IVec3, value: u8) -> bool {
        let Some((finest, coarser)) = self.levels.split_first_mut() else {
            return false;
        };
        finest.set(coarser, pos, value, &mut self.dirty)
    }

    /// Voxels whose centers fall in the voxel-space box `[min, max]`, clipped to the volume.
    fn voxel_range(&self, min: DVec3, max: DVec3) -> Option<(IVec3, IVec3)> {
        let last = IVec3::splat(self.dimensions() as i32 - 1);
        let lo = (min - 0.5).ceil().max(DVec3::ZERO).as_ivec3();
        let hi = (max - 0.5).floor().min(last.as_dvec3()).as_ivec3();
        hi.cmpge(lo).all().then_some((lo, hi))
    }
}
