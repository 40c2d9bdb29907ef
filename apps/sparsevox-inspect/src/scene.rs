//! Demo volume construction and ASCII views.

use std::time::Instant;

use glam::{DVec3, Vec3};
use sparsevox_core::{Axis, OctreeConfig, Ray};
use sparsevox_octree::{
    PageUpdateKind, RayMarchConfig, SparseVirtualizedVoxelOctree, Termination,
};
use tracing::info;

/// Value stored in sphere voxels.
pub const SPHERE_VALUE: u8 = 200;

/// Value stored in floor voxels.
pub const FLOOR_VALUE: u8 = 64;

/// Widest slice printed before cells are skipped.
const MAX_SLICE_COLUMNS: u32 = 96;

/// Nearest to farthest.
const DEPTH_RAMP: &[u8] = b"@%#*+=-:.";

/// Shapes written into the demo volume.
#[derive(Debug, Clone)]
pub struct SceneParams {
    pub sphere_radius: f32,
}

/// 2048^3 voxels of 0.1 units: a 180 x 60 x 180 region around the origin.
pub fn default_config() -> OctreeConfig {
    OctreeConfig::new(DVec3::ZERO, Vec3::new(90.0, 30.0, 90.0), 0.1)
}

/// Build the octree and fill it with a sphere above a floor slab.
pub fn build(
    config: &OctreeConfig,
    params: &SceneParams,
) -> anyhow::Result<SparseVirtualizedVoxelOctree> {
    let mut octree = SparseVirtualizedVoxelOctree::from_config(config)?;
    let start = Instant::now();

    octree.begin_write();
    let radius = params.sphere_radius;
    let sphere = octree.set_sphere(config.center, radius, SPHERE_VALUE);
    let floor_center = config.center - DVec3::Y * f64::from(radius + 1.0);
    let floor = octree.set_box(
        floor_center,
        Vec3::new(radius * 3.0, octree.voxel_size(), radius * 3.0),
        FLOOR_VALUE,
    );

    let mut added = 0usize;
    let mut updated = 0usize;
    let mut removed = 0usize;
    let pages = octree.end_write(|update| match update.kind {
        PageUpdateKind::Added => added += 1,
        PageUpdateKind::Updated => updated += 1,
        PageUpdateKind::Removed => removed += 1,
    });

    info!(
        sphere,
        floor,
        pages,
        added,
        updated,
        removed,
        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
        "filled demo volume"
    );
    Ok(octree)
}

/// One line per level with its geometry and paging state.
pub fn level_table(octree: &SparseVirtualizedVoxelOctree) -> String {
    let mut lines = vec![format!(
        "{:>5} {:>6} {:>5} {:>10} {:>8} {:>10} {:>14}",
        "level", "dims", "cube", "pages/axis", "mode", "committed", "reserved"
    )];
    for info in octree.level_infos() {
        lines.push(format!(
            "{:>5} {:>6} {:>5} {:>10} {:>8} {:>10} {:>14}",
            info.index,
            info.dimensions,
            info.page_cube_dimensions,
            info.pages_per_axis,
            format!("{:?}", info.paging_mode),
            info.committed_pages,
            info.reserved_bytes,
        ));
    }
    lines.push(format!(
        "committed pages: {}, resident bytes: {}, dirty counter: {}",
        octree.committed_pages(),
        octree.memory_usage(),
        octree.dirty_counter(),
    ));
    lines.join("\n")
}

/// ASCII view of the slice through the volume center.
///
/// Level 0 shows stored values; coarser levels show how many child octants are occupied.
pub fn render_slice(octree: &SparseVirtualizedVoxelOctree, axis: Axis, level: u8) -> Option<String> {
    let slice = octree.slice(octree.transform().center(), axis, level)?;
    let stride = (slice.width / MAX_SLICE_COLUMNS).max(1);

    let mut lines = vec![format!(
        "{axis:?} slice of level {level} at {} ({}x{}, {} occupied)",
        slice.depth,
        slice.width,
        slice.height,
        slice.occupied()
    )];
    for v in (0..slice.height).step_by(stride as usize).rev() {
        let row: String = (0..slice.width)
            .step_by(stride as usize)
            .map(|u| slice_glyph(slice.get(u, v), level))
            .collect();
        lines.push(row);
    }
    Some(lines.join("\n"))
}

fn slice_glyph(value: u8, level: u8) -> char {
    match (value, level) {
        (0, _) => '.',
        (SPHERE_VALUE, 0) => '#',
        (FLOOR_VALUE, 0) => '=',
        (_, 0) => '?',
        (mask, _) => char::from_digit(mask.count_ones(), 10).unwrap_or('?'),
    }
}

/// Pinhole camera producing one ray per character cell.
#[derive(Debug, Clone)]
pub struct DepthView {
    pub eye: DVec3,
    pub target: DVec3,
    /// Vertical field of view in radians
    pub fov_y: f64,
    pub width: u32,
    pub height: u32,
}

impl DepthView {
    /// Camera above and in front of the volume center, looking at it.
    pub fn looking_at_origin(config: &OctreeConfig) -> Self {
        Self {
            eye: config.center + DVec3::new(0.0, 4.0, 12.0),
            target: config.center,
            fov_y: 50f64.to_radians(),
            width: 72,
            height: 32,
        }
    }

    /// Ray through the center of cell (`column`, `row`), row 0 at the top.
    pub fn ray(&self, column: u32, row: u32) -> Ray {
        let forward = (self.target - self.eye).normalize();
        let right = forward.cross(DVec3::Y).normalize();
        let up = right.cross(forward);

        // Terminal cells are roughly twice as tall as they are wide.
        let aspect = f64::from(self.width) / f64::from(self.height) * 0.5;
        let half_height = (self.fov_y * 0.5).tan();
        let u = ((f64::from(column) + 0.5) / f64::from(self.width) * 2.0 - 1.0) * half_height * aspect;
        let v = (1.0 - (f64::from(row) + 0.5) / f64::from(self.height) * 2.0) * half_height;
        Ray::new(self.eye, forward + right * u + up * v)
    }
}

/// Ray cast every cell of the view and shade hits by distance.
pub fn render_depth(octree: &SparseVirtualizedVoxelOctree, view: &DepthView) -> String {
    let config = RayMarchConfig::default();
    let start = Instant::now();

    let mut distances = Vec::with_capacity((view.width * view.height) as usize);
    let mut checks = 0u64;
    let mut exhausted = 0usize;
    for row in 0..view.height {
        for column in 0..view.width {
            let trace = octree.trace_ray(&view.ray(column, row), &config);
            checks += u64::from(trace.total_checks);
            if trace.termination == Termination::BudgetExhausted {
                exhausted += 1;
            }
            distances.push(trace.hit.map(|hit| hit.distance));
        }
    }

    let hits: Vec<f64> = distances.iter().flatten().copied().collect();
    let near = hits.iter().copied().fold(f64::INFINITY, f64::min);
    let far = hits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let rays = distances.len().max(1);
    info!(
        rays,
        hits = hits.len(),
        exhausted,
        mean_checks = checks as f64 / rays as f64,
        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
        "rendered depth view"
    );

    distances
        .chunks(view.width.max(1) as usize)
        .map(|row| {
            row.iter()
                .map(|distance| distance.map_or(' ', |d| depth_glyph(d, near, far)))
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn depth_glyph(distance: f64, near: f64, far: f64) -> char {
    let span = (far - near).max(f64::EPSILON);
    let t = ((distance - near) / span).clamp(0.0, 1.0);
    let index = (t * (DEPTH_RAMP.len() - 1) as f64).round() as usize;
    char::from(DEPTH_RAMP[index])
}
