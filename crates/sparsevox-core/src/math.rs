//! Math utilities and helpers.

use glam::{DMat4, DVec3};
use serde::{Deserialize, Serialize};

/// Ray for raycasting operations, in double precision world units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ray {
    /// Ray origin
    pub origin: DVec3,
    /// Ray direction (normalized by the constructors)
    pub direction: DVec3,
}

impl Ray {
    /// Create a new ray
    #[inline]
    pub fn new(origin: DVec3, direction: DVec3) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
        }
    }

    /// Create a ray starting at `origin` and pointing at `target`
    #[inline]
    pub fn towards(origin: DVec3, target: DVec3) -> Self {
        Self::new(origin, target - origin)
    }

    /// Get a point along the ray at distance t
    #[inline]
    pub fn at(&self, t: f64) -> DVec3 {
        self.origin + self.direction * t
    }

    /// Whether the direction is usable for marching
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.origin.is_finite() && self.direction.is_finite() && self.direction != DVec3::ZERO
    }

    /// Transform ray by a matrix
    #[inline]
    pub fn transform(&self, matrix: DMat4) -> Self {
        let origin = matrix.transform_point3(self.origin);
        let direction = matrix.transform_vector3(self.direction).normalize_or_zero();
        Self { origin, direction }
    }
}

/// Axis-Aligned Bounding Box.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Aabb {
    /// Minimum corner
    pub min: DVec3,
    /// Maximum corner
    pub max: DVec3,
}

impl Aabb {
    /// Create a new AABB from min and max corners
    #[inline]
    pub const fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    /// Create an AABB around `center` with given half-extents
    #[inline]
    pub fn from_center_half_extents(center: DVec3, half_extents: DVec3) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    /// Check if a point is inside the AABB
    #[inline]
    pub fn contains_point(&self, point: DVec3) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
            && point.z >= self.min.z
            && point.z <= self.max.z
    }

    /// Ray-AABB intersection test, returns (t_near, t_far) or None if no intersection
    pub fn intersect_ray(&self, ray: &Ray) -> Option<(f64, f64)> {
        let inv_dir = DVec3::ONE / ray.direction;

        let t1 = (self.min - ray.origin) * inv_dir;
        let t2 = (self.max - ray.origin) * inv_dir;

        let t_min = t1.min(t2);
        let t_max = t1.max(t2);

        let t_near = t_min.x.max(t_min.y).max(t_min.z);
        let t_far = t_max.x.min(t_max.y).min(t_max.z);

        if t_near <= t_far && t_far >= 0.0 {
            Some((t_near.max(0.0), t_far))
        } else {
            None
        }
    }
}

/// A principal axis, used to isolate slices of a volume.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    #[default]
    X,
    Y,
    Z,
}

impl Axis {
    /// All axes in index order
    pub const ALL: [Self; 3] = [Self::X, Self::Y, Self::Z];

    /// Component index of this axis
    #[inline]
    pub const fn index(self) -> usize {
        match self {
            Self::X => 0,
            Self::Y => 1,
            Self::Z => 2,
        }
    }

    /// The two remaining axes, as (horizontal, vertical) of a slice
    #[inline]
    pub const fn plane_axes(self) -> (Self, Self) {
        match self {
            Self::X => (Self::Y, Self::Z),
            Self::Y => (Self::X, Self::Z),
            Self::Z => (Self::X, Self::Y),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn ray_at() {
        let ray = Ray::new(DVec3::ZERO, DVec3::X);
        assert_eq!(ray.at(0.0), DVec3::ZERO);
        assert_eq!(ray.at(1.0), DVec3::X);
        assert_eq!(ray.at(5.0), DVec3::new(5.0, 0.0, 0.0));
    }

    #[test]
    fn ray_towards_is_normalized() {
        let ray = Ray::towards(DVec3::new(1.0, 10.0, 1.0), DVec3::ZERO);
        assert_relative_eq!(ray.direction.length(), 1.0, epsilon = 1e-12);
        assert!(ray.direction.y < 0.0);
        assert!(ray.is_valid());
    }

    #[test]
    fn zero_direction_is_invalid() {
        let ray = Ray::towards(DVec3::ONE, DVec3::ONE);
        assert!(!ray.is_valid());
    }

    #[test]
    fn transform_moves_origin_and_renormalizes_direction() {
        let matrix = DMat4::from_translation(DVec3::splat(32.0)) * DMat4::from_scale(DVec3::splat(10.0));
        let ray = Ray::new(DVec3::new(1.0, -2.0, 0.5), DVec3::new(0.0, 3.0, 4.0));
        let local = ray.transform(matrix);
        assert_relative_eq!(local.origin.x, 42.0, epsilon = 1e-12);
        assert_relative_eq!(local.origin.y, 12.0, epsilon = 1e-12);
        assert_relative_eq!(local.origin.z, 37.0, epsilon = 1e-12);
        assert_relative_eq!(local.direction.length(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(local.direction.y, 0.6, epsilon = 1e-12);
        assert_relative_eq!(local.direction.z, 0.8, epsilon = 1e-12);
    }

    #[test]
    fn aabb_contains_point() {
        let aabb = Aabb::new(DVec3::ZERO, DVec3::ONE);
        assert!(aabb.contains_point(DVec3::splat(0.5)));
        assert!(aabb.contains_point(DVec3::ZERO));
        assert!(aabb.contains_point(DVec3::ONE));
        assert!(!aabb.contains_point(DVec3::new(2.0, 0.5, 0.5)));
    }

    #[test]
    fn aabb_ray_intersection() {
        let aabb = Aabb::new(DVec3::ZERO, DVec3::ONE);

        // Ray hitting the box
        let ray = Ray::new(DVec3::new(-1.0, 0.5, 0.5), DVec3::X);
        let (t_near, t_far) = aabb.intersect_ray(&ray).expect("ray should hit");
        assert_relative_eq!(t_near, 1.0, epsilon = 1e-9);
        assert_relative_eq!(t_far, 2.0, epsilon = 1e-9);

        // Ray missing the box
        let ray = Ray::new(DVec3::new(-1.0, 2.0, 0.5), DVec3::X);
        assert!(aabb.intersect_ray(&ray).is_none());

        // Box behind the ray
        let ray = Ray::new(DVec3::new(3.0, 0.5, 0.5), DVec3::X);
        assert!(aabb.intersect_ray(&ray).is_none());
    }

    #[test]
    fn aabb_ray_from_inside_clamps_near() {
        let aabb = Aabb::from_center_half_extents(DVec3::ZERO, DVec3::ONE);
        let ray = Ray::new(DVec3::ZERO, DVec3::Y);
        let (t_near, t_far) = aabb.intersect_ray(&ray).expect("ray starts inside");
        assert_eq!(t_near, 0.0);
        assert_relative_eq!(t_far, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn plane_axes_exclude_isolated_axis() {
        for axis in Axis::ALL {
            let (u, v) = axis.plane_axes();
            assert_ne!(u, axis);
            assert_ne!(v, axis);
            assert_ne!(u, v);
        }
    }
}
