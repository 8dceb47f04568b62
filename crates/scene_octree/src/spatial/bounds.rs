//! Bounding volumes and containment tests

use crate::foundation::math::{Mat4, Mat4Ext, Vec3};

/// Result of classifying one volume against another
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intersection {
    /// Completely outside
    Outside,
    /// Partially inside
    Intersects,
    /// Completely inside
    Inside,
}

/// Axis-Aligned Bounding Box for spatial queries
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    /// Minimum corner of the bounding box
    pub min: Vec3,
    /// Maximum corner of the bounding box
    pub max: Vec3,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::new(Vec3::zeros(), Vec3::zeros())
    }
}

impl BoundingBox {
    /// Create a new box from min and max points
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create a box centered at a point with given extents
    pub fn from_center_extents(center: Vec3, extents: Vec3) -> Self {
        Self {
            min: center - extents,
            max: center + extents,
        }
    }

    /// Cube of the given half size around a point
    pub fn from_center_half_size(center: Vec3, half_size: f32) -> Self {
        Self::from_center_extents(center, Vec3::new(half_size, half_size, half_size))
    }

    /// Get the center of the box
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Full edge lengths
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Get the extents (half-size) of the box
    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Check if this box contains a point
    pub fn contains_point(&self, point: Vec3) -> bool {
        point.x >= self.min.x && point.x <= self.max.x &&
        point.y >= self.min.y && point.y <= self.max.y &&
        point.z >= self.min.z && point.z <= self.max.z
    }

    /// Check if this box intersects another box
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min.x <= other.max.x && self.max.x >= other.min.x &&
        self.min.y <= other.max.y && self.max.y >= other.min.y &&
        self.min.z <= other.max.z && self.max.z >= other.min.z
    }

    /// Classify another box against this one
    pub fn is_inside(&self, other: &BoundingBox) -> Intersection {
        if !self.intersects(other) {
            Intersection::Outside
        } else if other.min.x < self.min.x || other.max.x > self.max.x ||
            other.min.y < self.min.y || other.max.y > self.max.y ||
            other.min.z < self.min.z || other.max.z > self.max.z
        {
            Intersection::Intersects
        } else {
            Intersection::Inside
        }
    }

    /// Squared distance from a point to the closest point of this box
    pub fn distance_squared_to_point(&self, point: Vec3) -> f32 {
        let closest = Vec3::new(
            point.x.clamp(self.min.x, self.max.x),
            point.y.clamp(self.min.y, self.max.y),
            point.z.clamp(self.min.z, self.max.z),
        );
        (closest - point).magnitude_squared()
    }

    /// Smallest box containing both boxes
    pub fn merged(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox::new(self.min.inf(&other.min), self.max.sup(&other.max))
    }

    /// Box grown outward by the given amount on every side
    pub fn expanded(&self, amount: Vec3) -> BoundingBox {
        BoundingBox::new(self.min - amount, self.max + amount)
    }

    /// Axis-aligned box enclosing this box after an affine transform
    pub fn transformed(&self, transform: &Mat4) -> BoundingBox {
        let center = transform.transform_point3(self.center());
        let extents = self.extents();
        let abs = transform.fixed_view::<3, 3>(0, 0).abs();
        let new_extents = abs * extents;
        BoundingBox::from_center_extents(center, new_extents)
    }

    /// The eight corners, indexed by the same bit layout as octant children
    pub fn corners(&self) -> [Vec3; 8] {
        std::array::from_fn(|i| {
            Vec3::new(
                if i & 1 != 0 { self.max.x } else { self.min.x },
                if i & 2 != 0 { self.max.y } else { self.min.y },
                if i & 4 != 0 { self.max.z } else { self.min.z },
            )
        })
    }
}

/// Bounding sphere
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    /// Sphere center
    pub center: Vec3,
    /// Sphere radius
    pub radius: f32,
}

impl Sphere {
    /// Create a sphere
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Check if the sphere touches a box
    pub fn intersects_box(&self, aabb: &BoundingBox) -> bool {
        aabb.distance_squared_to_point(self.center) <= self.radius * self.radius
    }

    /// Classify a box against this sphere
    pub fn is_inside(&self, aabb: &BoundingBox) -> Intersection {
        if !self.intersects_box(aabb) {
            return Intersection::Outside;
        }

        // Inside only when the farthest corner is within the radius
        let farthest = Vec3::new(
            (aabb.min.x - self.center.x).abs().max((aabb.max.x - self.center.x).abs()),
            (aabb.min.y - self.center.y).abs().max((aabb.max.y - self.center.y).abs()),
            (aabb.min.z - self.center.z).abs().max((aabb.max.z - self.center.z).abs()),
        );
        if farthest.magnitude_squared() <= self.radius * self.radius {
            Intersection::Inside
        } else {
            Intersection::Intersects
        }
    }
}
