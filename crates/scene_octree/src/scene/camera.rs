//! # Camera
//!
//! Perspective camera used as the viewpoint for frustum queries, batch
//! distance sorting and LOD selection. Matrices use the right-handed Y-up
//! convention with a `[-1, 1]` clip depth range.

use crate::foundation::math::{Mat4, Point3, Vec3, Vec4};
use crate::spatial::{BoundingBox, Frustum, Intersection, Ray};

/// Perspective camera
#[derive(Debug, Clone)]
pub struct Camera {
    /// Camera position in world space
    pub position: Vec3,

    /// Point the camera is looking at in world space
    pub target: Vec3,

    /// Up vector for camera orientation (typically [0, 1, 0])
    pub up: Vec3,

    /// Vertical field of view in radians
    pub fov: f32,

    /// Aspect ratio (width / height)
    pub aspect: f32,

    /// Distance to near clipping plane
    pub near: f32,

    /// Distance to far clipping plane
    pub far: f32,

    /// Global LOD bias; higher values keep detailed LODs longer
    pub lod_bias: f32,

    /// Zoom factor applied to LOD distances
    pub zoom: f32,
}

impl Camera {
    /// Create a perspective camera looking at the origin
    ///
    /// # Arguments
    /// * `position` - Camera position in world space
    /// * `fov_degrees` - Vertical field of view in degrees
    /// * `aspect` - Viewport width / height
    /// * `near` - Near plane distance (must be > 0)
    /// * `far` - Far plane distance (must be > near)
    pub fn perspective(position: Vec3, fov_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            position,
            target: Vec3::zeros(),
            up: Vec3::y(),
            fov: fov_degrees.to_radians(),
            aspect,
            near,
            far,
            lod_bias: 1.0,
            zoom: 1.0,
        }
    }

    /// Move the camera, keeping its target
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    /// Point the camera at a world-space target
    pub fn look_at(&mut self, target: Vec3, up: Vec3) {
        self.target = target;
        self.up = up;
    }

    /// Width over height of the viewport
    pub fn set_aspect_ratio(&mut self, aspect: f32) {
        self.aspect = aspect;
    }

    /// World-to-view matrix
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(
            &Point3::from(self.position),
            &Point3::from(self.target),
            &self.up,
        )
    }

    /// View-to-clip matrix
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::new_perspective(self.aspect, self.fov, self.near, self.far)
    }

    /// World-to-clip matrix
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// World-space view frustum
    pub fn frustum(&self) -> Frustum {
        Frustum::from_matrix(&self.view_projection_matrix())
    }

    /// Classify a world-space box against the view frustum
    pub fn is_inside(&self, aabb: &BoundingBox) -> Intersection {
        self.frustum().is_inside(aabb)
    }

    /// Distance from the camera to a world-space point
    pub fn distance(&self, point: Vec3) -> f32 {
        (point - self.position).magnitude()
    }

    /// Distance used for LOD selection
    ///
    /// `scale` is the object's size factor and `bias` its own LOD bias; both
    /// shrink the effective distance.
    pub fn lod_distance(&self, distance: f32, scale: f32, bias: f32) -> f32 {
        let divisor = (self.lod_bias * bias * scale * self.zoom).max(f32::EPSILON);
        distance / divisor
    }

    /// World-space ray through a point in normalized device coordinates
    ///
    /// `x` and `y` run from -1 to 1, bottom-left to top-right. Returns `None`
    /// when the view-projection matrix is not invertible.
    pub fn screen_to_world_ray(&self, x: f32, y: f32) -> Option<Ray> {
        let inverse = self.view_projection_matrix().try_inverse()?;

        let unproject = |depth: f32| {
            let point = inverse * Vec4::new(x, y, depth, 1.0);
            point.xyz() / point.w
        };
        let near = unproject(-1.0);
        let far = unproject(1.0);

        Some(Ray::new(near, far - near))
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::perspective(Vec3::new(0.0, 0.0, 10.0), 60.0, 16.0 / 9.0, 0.1, 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_frustum_sees_target() {
        let camera = Camera::perspective(Vec3::new(0.0, 0.0, 20.0), 60.0, 1.0, 0.1, 100.0);

        let at_target = BoundingBox::from_center_half_size(Vec3::zeros(), 1.0);
        let behind = BoundingBox::from_center_half_size(Vec3::new(0.0, 0.0, 40.0), 1.0);

        assert_eq!(camera.is_inside(&at_target), Intersection::Inside);
        assert_eq!(camera.is_inside(&behind), Intersection::Outside);
    }

    #[test]
    fn test_distance_and_lod_distance() {
        let mut camera = Camera::perspective(Vec3::new(3.0, 4.0, 0.0), 60.0, 1.0, 0.1, 100.0);

        assert_relative_eq!(camera.distance(Vec3::zeros()), 5.0);
        assert_relative_eq!(camera.lod_distance(10.0, 2.0, 1.0), 5.0);

        camera.lod_bias = 0.0;
        assert!(camera.lod_distance(10.0, 1.0, 1.0) > 1.0e6);
    }

    #[test]
    fn test_center_ray_points_at_target() {
        let camera = Camera::perspective(Vec3::new(0.0, 0.0, 20.0), 60.0, 1.0, 0.1, 100.0);
        let ray = camera.screen_to_world_ray(0.0, 0.0).unwrap();

        assert_relative_eq!(ray.direction, -Vec3::z(), epsilon = 1e-4);
        assert_relative_eq!(ray.origin.z, 19.9, epsilon = 1e-3);
    }
}
