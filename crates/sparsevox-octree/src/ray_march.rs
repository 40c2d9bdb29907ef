//! Hierarchical DDA ray marching over the level chain.
//!
//! The march starts at the coarsest level, descends into occupied cells and
//! climbs back up after a run of empty steps. On every level change the ray
//! origin is re-projected onto the face it last crossed, so the new level's
//! DDA state starts from an exact cell boundary instead of inheriting the
//! coarser level's accumulated error.

use glam::{DVec3, IVec3};
use sparsevox_core::constants::{MAX_RAY_ITERATIONS, MAX_VOXEL_LEVELS};
use sparsevox_core::{Aabb, Ray};
use tracing::debug;

use crate::octree::SparseVirtualizedVoxelOctree;

/// Configuration for the ray marcher.
#[derive(Debug, Clone, PartialEq)]
pub struct RayMarchConfig {
    /// Cell visits before the march gives up
    pub max_iterations: u32,
    /// Consecutive empty steps before trying the next coarser level
    pub ascend_after_misses: u32,
    /// Distance, in finest voxels, a re-projected origin is pushed past the crossed face
    pub reproject_epsilon: f64,
}

impl Default for RayMarchConfig {
    fn default() -> Self {
        Self {
            max_iterations: MAX_RAY_ITERATIONS,
            ascend_after_misses: 2,
            reproject_epsilon: 1e-6,
        }
    }
}

/// Why a march stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Termination {
    /// Reached an occupied finest-level voxel
    Hit,
    /// The ray never intersects the volume
    MissedVolume,
    /// The ray walked out of the volume through empty space
    LeftVolume,
    /// The iteration budget ran out first
    BudgetExhausted,
}

/// First occupied voxel along a ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoxelHit {
    /// World-space point where the ray enters the voxel
    pub location: DVec3,
    /// Face normal pointing back along the ray; zero if the ray started inside the voxel
    pub normal: DVec3,
    /// Finest-level voxel coordinate
    pub voxel: IVec3,
    /// Stored value of the voxel
    pub value: u8,
    /// World-space distance from the ray origin
    pub distance: f64,
}

/// Full result of a march, including its cost.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayTrace {
    pub hit: Option<VoxelHit>,
    /// Level reads performed
    pub total_checks: u32,
    pub termination: Termination,
}

impl RayTrace {
    const fn miss(termination: Termination, total_checks: u32) -> Self {
        Self {
            hit: None,
            total_checks,
            termination,
        }
    }
}

/// Per-level stepping constants.
#[derive(Debug, Clone, Copy, Default)]
struct LevelStep {
    voxel_size: f64,
    half_voxel: f64,
    step: DVec3,
    t_delta: DVec3,
}

/// Mutable state of one march, all in voxel space.
#[derive(Debug)]
struct RayMarchState {
    /// Effective origin, moved on every re-projection
    origin: DVec3,
    direction: DVec3,
    sign: DVec3,
    steps: [LevelStep; MAX_VOXEL_LEVELS],
    level: usize,
    cell: IVec3,
    t_max: DVec3,
    /// Ray parameter at which the current cell was entered, from `origin`
    t_entry: f64,
    /// Ray parameter of `origin`, from the caller's origin
    t_origin: f64,
    last_axis: Option<usize>,
    steps_at_level: u32,
    misses: u32,
    total_checks: u32,
}

impl RayMarchState {
    fn new(origin: DVec3, direction: DVec3, level_count: usize) -> Self {
        let sign = DVec3::new(
            axis_sign(direction.x),
            axis_sign(direction.y),
            axis_sign(direction.z),
        );

        let mut steps = [LevelStep::default(); MAX_VOXEL_LEVELS];
        for (level, entry) in steps.iter_mut().enumerate().take(level_count) {
            let voxel_size = f64::from(1u32 << level);
            *entry = LevelStep {
                voxel_size,
                half_voxel: voxel_size * 0.5,
                step: sign * voxel_size,
                t_delta: DVec3::splat(voxel_size) / direction.abs(),
            };
        }

        Self {
            origin,
            direction,
            sign,
            steps,
            level: 0,
            cell: IVec3::ZERO,
            t_max: DVec3::INFINITY,
            t_entry: 0.0,
            t_origin: 0.0,
            last_axis: None,
            steps_at_level: 0,
            misses: 0,
            total_checks: 0,
        }
    }

    /// Move the origin onto the volume boundary the ray enters through.
    fn enter_volume(&mut self, bounds: &Aabb, t_near: f64, epsilon: f64) {
        let mut entry_axis = None;
        let mut latest = f64::NEG_INFINITY;
        for axis in 0..3 {
            if self.sign[axis] == 0.0 {
                continue;
            }
            let t1 = (bounds.min[axis] - self.origin[axis]) / self.direction[axis];
            let t2 = (bounds.max[axis] - self.origin[axis]) / self.direction[axis];
            let t = t1.min(t2);
            if t > latest {
                latest = t;
                entry_axis = Some(axis);
            }
        }

        let t = t_near + epsilon;
        self.origin += self.direction * t;
        self.t_origin = t;
        self.last_axis = entry_axis;
    }

    /// Rebuild the DDA state for `level` from the current origin.
    fn enter_level(&mut self, level: usize) {
        let LevelStep {
            voxel_size,
            half_voxel,
            step,
            ..
        } = self.steps[level];
        let anchor = (self.origin / voxel_size).floor() * voxel_size;
        let center = anchor + half_voxel;

        self.level = level;
        self.cell = (anchor / voxel_size).as_ivec3();
        for axis in 0..3 {
            // The exit face in each direction is half a step from the center.
            self.t_max[axis] = if self.sign[axis] == 0.0 {
                f64::INFINITY
            } else {
                (center[axis] + step[axis] * 0.5 - self.origin[axis]) / self.direction[axis]
            };
        }
        self.t_entry = 0.0;
        self.steps_at_level = 0;
    }

    /// Switch levels, re-projecting first if this level has been stepped through.
    fn change_level(&mut self, level: usize, epsilon: f64) {
        if self.steps_at_level > 0 {
            self.reproject(epsilon);
        }
        self.enter_level(level);
    }

    /// Intersect the ray with the face plane crossed by the last step.
    fn reproject(&mut self, epsilon: f64) {
        let Some(axis) = self.last_axis else {
            return;
        };
        let voxel_size = self.steps[self.level].voxel_size;
        let face = if self.sign[axis] > 0.0 {
            self.cell[axis]
        } else {
            self.cell[axis] + 1
        };
        let plane = f64::from(face) * voxel_size;
        let t = (plane - self.origin[axis]) / self.direction[axis];

        let mut origin = self.origin + self.direction * t;
        origin[axis] = plane;
        self.origin = origin + self.direction * epsilon;
        self.t_origin += t + epsilon;
    }

    /// Single-axis DDA step to the neighbouring cell.
    fn advance(&mut self) {
        let axis = min_axis(self.t_max);
        self.t_entry = self.t_max[axis];
        self.t_max[axis] += self.steps[self.level].t_delta[axis];
        self.cell[axis] += self.sign[axis] as i32;
        self.last_axis = Some(axis);
        self.steps_at_level += 1;
        self.misses += 1;
    }

    /// Outward normal of the face the ray entered the current cell through
    fn normal(&self) -> DVec3 {
        let mut normal = DVec3::ZERO;
        if let Some(axis) = self.last_axis {
            normal[axis] = -self.sign[axis];
        }
        normal
    }
}

/// Index of the smallest component, preferring x then y on ties
fn min_axis(v: DVec3) -> usize {
    if v.x <= v.y && v.x <= v.z {
        0
    } else if v.y <= v.z {
        1
    } else {
        2
    }
}

/// -1, 0 or 1; unlike `f64::signum`, zero maps to zero.
fn axis_sign(value: f64) -> f64 {
    if value > 0.0 {
        1.0
    } else if value < 0.0 {
        -1.0
    } else {
        0.0
    }
}

impl SparseVirtualizedVoxelOctree {
    /// First occupied voxel along a world-space ray, with default settings.
    pub fn cast_ray(&self, ray: &Ray) -> Option<VoxelHit> {
        self.trace_ray(ray, &RayMarchConfig::default()).hit
    }

    /// March a world-space ray through the level chain.
    #[tracing::instrument(level = "trace", skip_all)]
    pub fn trace_ray(&self, ray: &Ray, config: &RayMarchConfig) -> RayTrace {
        let Some(max_level) = self.level_count().checked_sub(1) else {
            return RayTrace::miss(Termination::MissedVolume, 0);
        };
        if !ray.is_valid() {
            return RayTrace::miss(Termination::MissedVolume, 0);
        }

        let local = ray.transform(self.world_to_voxel());
        let bounds = self.transform().voxel_bounds();
        let Some((t_near, _)) = bounds.intersect_ray(&local) else {
            return RayTrace::miss(Termination::MissedVolume, 0);
        };

        let epsilon = config.reproject_epsilon;
        let mut state = RayMarchState::new(local.origin, local.direction, self.level_count());
        if t_near > 0.0 {
            state.enter_volume(&bounds, t_near, epsilon);
        }
        state.enter_level(max_level);

        let levels = self.levels();
        for _ in 0..config.max_iterations {
            let level = state.level;
            if !levels[level].contains(state.cell) {
                return RayTrace::miss(Termination::LeftVolume, state.total_checks);
            }

            state.total_checks += 1;
            let value = levels[level].get(state.cell);
            if value != 0 {
                state.misses = 0;
                if level == 0 {
                    return self.hit(&state, value);
                }
                state.change_level(level - 1, epsilon);
                continue;
            }

            state.advance();
            if state.misses > config.ascend_after_misses && level < max_level {
                let parent = state.cell >> 1;
                let coarser = &levels[level + 1];
                if coarser.contains(parent) {
                    state.total_checks += 1;
                    if coarser.get(parent) == 0 {
                        state.change_level(level + 1, epsilon);
                    }
                }
            }
        }

        debug!(
            checks = state.total_checks,
            level = state.level,
            "ray march ran out of iterations"
        );
        RayTrace::miss(Termination::BudgetExhausted, state.total_checks)
    }

    fn hit(&self, state: &RayMarchState, value: u8) -> RayTrace {
        let local = state.origin + state.direction * state.t_entry;
        let distance = (state.t_origin + state.t_entry) * f64::from(self.voxel_size());
        RayTrace {
            hit: Some(VoxelHit {
                location: self.transform().to_world_space(local),
                normal: state.normal(),
                voxel: state.cell,
                value,
                distance,
            }),
            total_checks: state.total_checks,
            termination: Termination::Hit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::octree::tests::{large_octree, XorShift};
    use approx::assert_relative_eq;
    use glam::Vec3;

    fn single_voxel_octree(pos: IVec3) -> SparseVirtualizedVoxelOctree {
        // 64^3 voxels of size 1; voxel (32, 32, 32) starts at the world origin.
        let mut octree =
            SparseVirtualizedVoxelOctree::new(DVec3::ZERO, Vec3::splat(32.0), 1.0, 4096).unwrap();
        octree.set(pos, 9).unwrap();
        octree
    }

    #[test]
    fn sign_treats_zero_as_zero() {
        assert_eq!(axis_sign(2.5), 1.0);
        assert_eq!(axis_sign(-0.1), -1.0);
        assert_eq!(axis_sign(0.0), 0.0);
        assert_eq!(axis_sign(-0.0), 0.0);
    }

    #[test]
    fn hits_sphere_surface() {
        let mut octree = large_octree();
        octree.set_sphere(DVec3::ZERO, 3.0, 200);

        let ray = Ray::towards(DVec3::new(1.0, 10.0, 1.0), DVec3::ZERO);
        let trace = octree.trace_ray(&ray, &RayMarchConfig::default());
        assert_eq!(trace.termination, Termination::Hit);
        assert!(trace.total_checks <= MAX_RAY_ITERATIONS);

        let hit = trace.hit.unwrap();
        assert!((hit.location.length() - 3.0).abs() < 0.1, "{hit:?}");
        assert_eq!(hit.value, 200);
        assert_relative_eq!(hit.distance, hit.location.distance(ray.origin), epsilon = 1e-4);
        // Mostly travelling down, so the top face is the likely entry.
        assert_eq!(hit.normal.length(), 1.0);
        assert!(hit.normal.dot(ray.direction) < 0.0);
    }

    #[test]
    fn axis_aligned_hit_from_inside() {
        let octree = single_voxel_octree(IVec3::new(40, 32, 32));
        let hit = octree
            .cast_ray(&Ray::new(DVec3::new(-20.0, 0.5, 0.5), DVec3::X))
            .unwrap();
        assert_eq!(hit.voxel, IVec3::new(40, 32, 32));
        assert_eq!(hit.normal, DVec3::NEG_X);
        assert_relative_eq!(hit.location.x, 8.0, epsilon = 1e-4);
        assert_relative_eq!(hit.location.y, 0.5, epsilon = 1e-9);
        assert_relative_eq!(hit.distance, 28.0, epsilon = 1e-4);
    }

    #[test]
    fn negative_direction_hits_far_face() {
        let octree = single_voxel_octree(IVec3::new(40, 32, 32));
        let hit = octree
            .cast_ray(&Ray::new(DVec3::new(20.0, 0.5, 0.5), DVec3::NEG_X))
            .unwrap();
        assert_eq!(hit.normal, DVec3::X);
        assert_relative_eq!(hit.location.x, 9.0, epsilon = 1e-4);
    }

    #[test]
    fn entering_from_outside_uses_boundary_face() {
        let octree = single_voxel_octree(IVec3::new(0, 32, 32));
        let hit = octree
            .cast_ray(&Ray::new(DVec3::new(-100.0, 0.5, 0.5), DVec3::X))
            .unwrap();
        assert_eq!(hit.voxel, IVec3::new(0, 32, 32));
        assert_eq!(hit.normal, DVec3::NEG_X);
        assert_relative_eq!(hit.location.x, -32.0, epsilon = 1e-4);
        assert_relative_eq!(hit.distance, 68.0, epsilon = 1e-4);
    }

    #[test]
    fn origin_inside_voxel_hits_immediately() {
        let octree = single_voxel_octree(IVec3::new(32, 32, 32));
        let hit = octree
            .cast_ray(&Ray::new(DVec3::splat(0.5), DVec3::Y))
            .unwrap();
        assert_eq!(hit.normal, DVec3::ZERO);
        assert_relative_eq!(hit.distance, 0.0);
    }

    #[test]
    fn ray_outside_volume_misses_without_checks() {
        let octree = single_voxel_octree(IVec3::new(32, 32, 32));
        let trace = octree.trace_ray(
            &Ray::new(DVec3::new(100.0, 100.0, 100.0), DVec3::ONE),
            &RayMarchConfig::default(),
        );
        assert_eq!(trace.termination, Termination::MissedVolume);
        assert_eq!(trace.total_checks, 0);
        assert!(trace.hit.is_none());
    }

    #[test]
    fn ray_through_empty_space_leaves_volume() {
        let mut octree = large_octree();
        octree.set_sphere(DVec3::ZERO, 3.0, 200);
        let trace = octree.trace_ray(
            &Ray::new(DVec3::new(20.0, 10.0, -20.0), DVec3::new(0.3, 1.0, 0.2)),
            &RayMarchConfig::default(),
        );
        assert_eq!(trace.termination, Termination::LeftVolume);
        assert!(trace.total_checks <= MAX_RAY_ITERATIONS);
    }

    #[test]
    fn empty_octree_exits_after_root_check() {
        let octree =
            SparseVirtualizedVoxelOctree::new(DVec3::ZERO, Vec3::splat(32.0), 1.0, 4096).unwrap();
        let trace = octree.trace_ray(
            &Ray::new(DVec3::ZERO, DVec3::new(1.0, 0.5, 0.25)),
            &RayMarchConfig::default(),
        );
        assert_eq!(trace.termination, Termination::LeftVolume);
        assert_eq!(trace.total_checks, 1);
    }

    #[test]
    fn budget_exhaustion_is_a_miss() {
        let mut octree = large_octree();
        octree.set_sphere(DVec3::ZERO, 3.0, 200);
        let config = RayMarchConfig {
            max_iterations: 3,
            ..Default::default()
        };
        let trace = octree.trace_ray(&Ray::towards(DVec3::new(1.0, 10.0, 1.0), DVec3::ZERO), &config);
        assert_eq!(trace.termination, Termination::BudgetExhausted);
        assert!(trace.hit.is_none());
    }

    #[test]
    fn zero_direction_misses() {
        let octree = single_voxel_octree(IVec3::new(32, 32, 32));
        assert!(octree.cast_ray(&Ray::new(DVec3::ZERO, DVec3::ZERO)).is_none());
    }

    /// First occupied voxel found by stepping through every finest-level cell.
    fn walk_finest_level(octree: &SparseVirtualizedVoxelOctree, ray: &Ray) -> Option<IVec3> {
        let local = ray.transform(octree.world_to_voxel());
        let (t_near, _) = octree.transform().voxel_bounds().intersect_ray(&local)?;
        let start = local.at(t_near);
        let last = IVec3::splat(octree.dimensions() as i32 - 1);
        let mut cell = start.floor().as_ivec3().clamp(IVec3::ZERO, last);

        let mut step = IVec3::ZERO;
        let mut t_max = DVec3::INFINITY;
        let mut t_delta = DVec3::INFINITY;
        for axis in 0..3 {
            let d = local.direction[axis];
            if d == 0.0 {
                continue;
            }
            step[axis] = axis_sign(d) as i32;
            let boundary = f64::from(cell[axis] + i32::from(d > 0.0));
            t_max[axis] = (boundary - start[axis]) / d;
            t_delta[axis] = 1.0 / d.abs();
        }

        while octree.contains(cell) {
            if octree.get(cell) != 0 {
                return Some(cell);
            }
            let axis = min_axis(t_max);
            t_max[axis] += t_delta[axis];
            cell[axis] += step[axis];
        }
        None
    }

    #[test]
    fn random_rays_match_finest_level_walk() {
        // 64^3 voxels of size 1 spanning -32..32 world units.
        let mut octree =
            SparseVirtualizedVoxelOctree::new(DVec3::ZERO, Vec3::splat(32.0), 1.0, 4096).unwrap();
        let mut rng = XorShift(0x2545_F491_4F6C_DD1D);
        for _ in 0..12 {
            let center = rng.vector(-28.0, 28.0);
            let radius = 1.0 + rng.unit() * 5.0;
            octree.set_sphere(center, radius as f32, (rng.below(200) + 1) as u8);
        }
        for _ in 0..300 {
            let pos = IVec3::new(rng.below(64), rng.below(64), rng.below(64));
            octree.set(pos, 7).unwrap();
        }

        let config = RayMarchConfig {
            max_iterations: 100_000,
            ..RayMarchConfig::default()
        };
        let mut hits = 0;
        for i in 0..2000 {
            let origin = rng.vector(-48.0, 48.0);
            // Half the rays aim into the volume, the rest go anywhere.
            let ray = if i % 2 == 0 {
                Ray::towards(origin, rng.vector(-30.0, 30.0))
            } else {
                Ray::new(origin, rng.vector(-1.0, 1.0))
            };
            if !ray.is_valid() {
                continue;
            }

            let trace = octree.trace_ray(&ray, &config);
            assert_ne!(trace.termination, Termination::BudgetExhausted, "ray {i}: {ray:?}");
            let expected = walk_finest_level(&octree, &ray);
            assert_eq!(trace.hit.map(|hit| hit.voxel), expected, "ray {i}: {ray:?}");
            if let Some(hit) = trace.hit {
                assert_eq!(hit.value, octree.get(hit.voxel));
                hits += 1;
            }
        }
        assert!(hits > 100, "only {hits} hits");
    }
}
