//! View frustum and planes for visibility culling

use super::{BoundingBox, Intersection, Sphere};
use crate::foundation::math::{Mat4, Vec3, Vec4};

/// Plane defined by normal and distance from origin
///
/// Points with a positive signed distance lie on the inner side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Normal vector (should be normalized)
    pub normal: Vec3,
    /// Distance from origin along the normal
    pub distance: f32,
}

impl Plane {
    /// Create a new plane from normal and distance
    pub fn new(normal: Vec3, distance: f32) -> Self {
        Self { normal: normal.normalize(), distance }
    }

    /// Plane through a point, facing along a normal
    pub fn from_normal_point(normal: Vec3, point: Vec3) -> Self {
        let normal = normal.normalize();
        Self { normal, distance: -normal.dot(&point) }
    }

    /// Plane from `a*x + b*y + c*z + d` coefficients, normalized
    fn from_coefficients(coefficients: Vec4) -> Self {
        let normal = coefficients.xyz();
        let length = normal.magnitude();
        if length <= f32::EPSILON {
            return Self { normal: Vec3::zeros(), distance: 0.0 };
        }
        Self {
            normal: normal / length,
            distance: coefficients.w / length,
        }
    }

    /// Calculate signed distance from plane to point
    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        self.normal.dot(&point) + self.distance
    }
}

/// Frustum for visibility culling
#[derive(Debug, Clone, PartialEq)]
pub struct Frustum {
    /// Six inward-facing planes (left, right, bottom, top, near, far)
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Create a frustum from six planes
    pub fn new(planes: [Plane; 6]) -> Self {
        Self { planes }
    }

    /// Extract frustum planes from a view-projection matrix
    ///
    /// Gribb-Hartmann extraction for a right-handed projection with a
    /// `[-1, 1]` clip depth range, as produced by `nalgebra::Perspective3`.
    pub fn from_matrix(view_projection: &Mat4) -> Self {
        let row = |i: usize| -> Vec4 { view_projection.row(i).transpose() };
        let (r0, r1, r2, r3) = (row(0), row(1), row(2), row(3));

        Self {
            planes: [
                Plane::from_coefficients(r3 + r0),
                Plane::from_coefficients(r3 - r0),
                Plane::from_coefficients(r3 + r1),
                Plane::from_coefficients(r3 - r1),
                Plane::from_coefficients(r3 + r2),
                Plane::from_coefficients(r3 - r2),
            ],
        }
    }

    /// Check if a point lies inside the frustum
    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes.iter().all(|plane| plane.distance_to_point(point) >= 0.0)
    }

    /// Classify a box against the frustum
    pub fn is_inside(&self, aabb: &BoundingBox) -> Intersection {
        let mut all_inside = true;

        for plane in &self.planes {
            // Corner furthest along the normal and the one opposite to it
            let mut positive = aabb.min;
            let mut negative = aabb.max;
            for axis in 0..3 {
                if plane.normal[axis] >= 0.0 {
                    positive[axis] = aabb.max[axis];
                    negative[axis] = aabb.min[axis];
                }
            }

            if plane.distance_to_point(positive) < 0.0 {
                return Intersection::Outside;
            }
            if plane.distance_to_point(negative) < 0.0 {
                all_inside = false;
            }
        }

        if all_inside {
            Intersection::Inside
        } else {
            Intersection::Intersects
        }
    }

    /// Check if an AABB is inside or intersects the frustum
    pub fn intersects_aabb(&self, aabb: &BoundingBox) -> bool {
        self.is_inside(aabb) != Intersection::Outside
    }

    /// Classify a sphere against the frustum
    pub fn is_sphere_inside(&self, sphere: &Sphere) -> Intersection {
        let mut all_inside = true;
        for plane in &self.planes {
            let distance = plane.distance_to_point(sphere.center);
            if distance < -sphere.radius {
                return Intersection::Outside;
            }
            if distance < sphere.radius {
                all_inside = false;
            }
        }
        if all_inside {
            Intersection::Inside
        } else {
            Intersection::Intersects
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Point3;
    use approx::assert_relative_eq;
    use nalgebra::Perspective3;

    /// Camera at the origin looking down -Z, 90 degree fov, near 1, far 100
    fn test_frustum() -> Frustum {
        let projection = Perspective3::new(1.0, std::f32::consts::FRAC_PI_2, 1.0, 100.0);
        let view = Mat4::look_at_rh(
            &Point3::origin(),
            &Point3::new(0.0, 0.0, -1.0),
            &Vec3::y(),
        );
        Frustum::from_matrix(&(projection.to_homogeneous() * view))
    }

    #[test]
    fn test_plane_distance() {
        let plane = Plane::from_normal_point(Vec3::y(), Vec3::new(0.0, 2.0, 0.0));
        assert_relative_eq!(plane.distance_to_point(Vec3::new(5.0, 3.0, 1.0)), 1.0);
        assert_relative_eq!(plane.distance_to_point(Vec3::zeros()), -2.0);
    }

    #[test]
    fn test_extracted_planes_are_normalized() {
        for plane in test_frustum().planes {
            assert_relative_eq!(plane.normal.magnitude(), 1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_point_containment() {
        let frustum = test_frustum();
        assert!(frustum.contains_point(Vec3::new(0.0, 0.0, -10.0)));
        assert!(!frustum.contains_point(Vec3::new(0.0, 0.0, 10.0)));
        assert!(!frustum.contains_point(Vec3::new(0.0, 0.0, -200.0)));
        assert!(!frustum.contains_point(Vec3::new(50.0, 0.0, -10.0)));
    }

    #[test]
    fn test_box_classification() {
        let frustum = test_frustum();

        let ahead = BoundingBox::from_center_half_size(Vec3::new(0.0, 0.0, -20.0), 1.0);
        let behind = BoundingBox::from_center_half_size(Vec3::new(0.0, 0.0, 20.0), 1.0);
        let straddling_far = BoundingBox::from_center_half_size(Vec3::new(0.0, 0.0, -100.0), 5.0);

        assert_eq!(frustum.is_inside(&ahead), Intersection::Inside);
        assert_eq!(frustum.is_inside(&behind), Intersection::Outside);
        assert_eq!(frustum.is_inside(&straddling_far), Intersection::Intersects);
        assert!(frustum.intersects_aabb(&straddling_far));
    }

    #[test]
    fn test_sphere_classification() {
        let frustum = test_frustum();
        assert_eq!(
            frustum.is_sphere_inside(&Sphere::new(Vec3::new(0.0, 0.0, -20.0), 1.0)),
            Intersection::Inside
        );
        assert_eq!(
            frustum.is_sphere_inside(&Sphere::new(Vec3::new(0.0, 0.0, 20.0), 1.0)),
            Intersection::Outside
        );
    }
}
