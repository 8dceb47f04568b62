//! Rays and ray/box intersection

use super::BoundingBox;
use crate::foundation::math::{Mat4, Mat4Ext, Vec3};

/// Half line used for picking and ray queries
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    /// Ray start point
    pub origin: Vec3,
    /// Ray direction, normalized on construction
    pub direction: Vec3,
}

impl Ray {
    /// Create a ray; the direction is normalized
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        let direction = direction.try_normalize(f32::EPSILON).unwrap_or_else(Vec3::z);
        Self { origin, direction }
    }

    /// Point at a distance along the ray
    pub fn point_at(&self, distance: f32) -> Vec3 {
        self.origin + self.direction * distance
    }

    /// Distance to the entry point of a box, or `None` on a miss
    ///
    /// Slab method; a ray starting inside the box reports zero.
    pub fn hit_distance(&self, aabb: &BoundingBox) -> Option<f32> {
        self.hit_box(aabb).map(|(distance, _)| distance)
    }

    /// Entry distance and outward face normal of a box hit
    ///
    /// The normal is the face crossed on entry; for a ray starting inside the
    /// box it is the negated ray direction.
    pub fn hit_box(&self, aabb: &BoundingBox) -> Option<(f32, Vec3)> {
        let mut t_min = f32::NEG_INFINITY;
        let mut t_max = f32::INFINITY;
        let mut entry_normal = -self.direction;

        for axis in 0..3 {
            let origin = self.origin[axis];
            let direction = self.direction[axis];

            if direction.abs() < f32::EPSILON {
                // Parallel to this slab: must already be between its planes
                if origin < aabb.min[axis] || origin > aabb.max[axis] {
                    return None;
                }
                continue;
            }

            let inv = 1.0 / direction;
            let mut near = (aabb.min[axis] - origin) * inv;
            let mut far = (aabb.max[axis] - origin) * inv;
            let mut sign = -1.0;
            if near > far {
                std::mem::swap(&mut near, &mut far);
                sign = 1.0;
            }

            if near > t_min {
                t_min = near;
                entry_normal = Vec3::zeros();
                entry_normal[axis] = sign;
            }
            t_max = t_max.min(far);

            if t_min > t_max {
                return None;
            }
        }

        if t_max < 0.0 {
            return None;
        }

        if t_min < 0.0 {
            Some((0.0, -self.direction))
        } else {
            Some((t_min, entry_normal))
        }
    }

    /// Ray mapped through an affine transform
    ///
    /// The direction is renormalized, so distances along the result are in
    /// the target space's units.
    pub fn transformed(&self, transform: &Mat4) -> Ray {
        Ray::new(
            transform.transform_point3(self.origin),
            transform.transform_vector3(self.direction),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_box() -> BoundingBox {
        BoundingBox::new(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(1.0, 1.0, 1.0))
    }

    #[test]
    fn test_hit_from_outside() {
        let ray = Ray::new(Vec3::new(-10.0, 0.0, 0.0), Vec3::x());
        let (distance, normal) = ray.hit_box(&unit_box()).unwrap();

        assert_relative_eq!(distance, 9.0);
        assert_relative_eq!(normal, Vec3::new(-1.0, 0.0, 0.0));
        assert_relative_eq!(ray.point_at(distance), Vec3::new(-1.0, 0.0, 0.0));
    }

    #[test]
    fn test_miss_and_behind() {
        let parallel_miss = Ray::new(Vec3::new(-10.0, 5.0, 0.0), Vec3::x());
        assert!(parallel_miss.hit_distance(&unit_box()).is_none());

        let pointing_away = Ray::new(Vec3::new(-10.0, 0.0, 0.0), -Vec3::x());
        assert!(pointing_away.hit_distance(&unit_box()).is_none());
    }

    #[test]
    fn test_origin_inside_reports_zero() {
        let ray = Ray::new(Vec3::zeros(), Vec3::new(1.0, 1.0, 0.0));
        assert_eq!(ray.hit_distance(&unit_box()), Some(0.0));
    }

    #[test]
    fn test_hit_from_above_reports_top_face() {
        let ray = Ray::new(Vec3::new(0.2, 10.0, 0.3), -Vec3::y());
        let (distance, normal) = ray.hit_box(&unit_box()).unwrap();

        assert_relative_eq!(distance, 9.0);
        assert_relative_eq!(normal, Vec3::y());
    }

    #[test]
    fn test_transformed_ray() {
        let ray = Ray::new(Vec3::zeros(), Vec3::x());
        let moved = ray.transformed(&Mat4::new_translation(&Vec3::new(0.0, 3.0, 0.0)));

        assert_relative_eq!(moved.origin, Vec3::new(0.0, 3.0, 0.0));
        assert_relative_eq!(moved.direction, Vec3::x());
    }
}
