//! Octree query protocols
//!
//! Containment queries implement [`OctreeQuery`]: the octree walks its
//! octants, asks the query to classify each culling box and hands the
//! residents of every surviving octant to [`OctreeQuery::test_drawables`].
//! Ray queries are described by [`RayOctreeQuery`] and produce
//! [`RayQueryResult`] records.

use super::octree::{Candidates, OctreeEntry};
use super::{BoundingBox, Frustum, Intersection, Ray, Sphere};
use crate::foundation::collections::{DrawableId, NodeId};
use crate::foundation::math::{Vec2, Vec3};

/// View mask accepting every view
pub const DEFAULT_VIEW_MASK: u32 = u32::MAX;

bitflags::bitflags! {
    /// Kind of a drawable, used to filter query results
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct DrawableFlags: u8 {
        /// Renderable geometry
        const GEOMETRY    = 0b0000_0001;
        /// Light source
        const LIGHT       = 0b0000_0010;
        /// Environment zone
        const ZONE        = 0b0000_0100;
        /// Screen-space or sprite geometry
        const GEOMETRY_2D = 0b0000_1000;
        /// Matches every kind
        const ANY         = 0b1111_1111;
    }
}

impl Default for DrawableFlags {
    fn default() -> Self {
        Self::GEOMETRY
    }
}

/// Containment query run against the octree
pub trait OctreeQuery {
    /// Classify an octant's culling box. `inside` is set when an ancestor
    /// was already fully inside, in which case no test is needed.
    fn test_octant(&self, culling_box: &BoundingBox, inside: bool) -> Intersection;

    /// Append the matching residents of one octant to `results`
    fn test_drawables(&self, candidates: Candidates<'_>, inside: bool, results: &mut Vec<DrawableId>);
}

fn accepts(entry: &OctreeEntry, drawable_flags: DrawableFlags, view_mask: u32) -> bool {
    entry.flags().intersects(drawable_flags) && entry.view_mask() & view_mask != 0
}

/// Drawables whose bounds contain a point
#[derive(Debug, Clone, Copy)]
pub struct PointOctreeQuery {
    /// Point to test
    pub point: Vec3,
    /// Drawable kinds to accept; any shared bit matches
    pub drawable_flags: DrawableFlags,
    /// Layers to accept; any shared bit matches
    pub view_mask: u32,
}

impl PointOctreeQuery {
    /// Query accepting every drawable kind on the default layers
    pub fn new(point: Vec3) -> Self {
        Self { point, drawable_flags: DrawableFlags::ANY, view_mask: DEFAULT_VIEW_MASK }
    }

    /// Restrict the query to drawable kinds and layers
    pub fn with_filter(mut self, drawable_flags: DrawableFlags, view_mask: u32) -> Self {
        self.drawable_flags = drawable_flags;
        self.view_mask = view_mask;
        self
    }
}

impl OctreeQuery for PointOctreeQuery {
    fn test_octant(&self, culling_box: &BoundingBox, inside: bool) -> Intersection {
        if inside {
            Intersection::Inside
        } else if culling_box.contains_point(self.point) {
            Intersection::Intersects
        } else {
            Intersection::Outside
        }
    }

    fn test_drawables(&self, candidates: Candidates<'_>, _inside: bool, results: &mut Vec<DrawableId>) {
        for (id, entry) in candidates {
            if accepts(entry, self.drawable_flags, self.view_mask)
                && entry.world_bounding_box().contains_point(self.point)
            {
                results.push(id);
            }
        }
    }
}

/// Drawables touching a sphere; the range query
#[derive(Debug, Clone, Copy)]
pub struct SphereOctreeQuery {
    /// Sphere to test
    pub sphere: Sphere,
    /// Drawable kinds to accept; any shared bit matches
    pub drawable_flags: DrawableFlags,
    /// Layers to accept; any shared bit matches
    pub view_mask: u32,
}

impl SphereOctreeQuery {
    /// Query accepting every drawable kind on the default layers
    pub fn new(sphere: Sphere) -> Self {
        Self { sphere, drawable_flags: DrawableFlags::ANY, view_mask: DEFAULT_VIEW_MASK }
    }

    /// Restrict the query to drawable kinds and layers
    pub fn with_filter(mut self, drawable_flags: DrawableFlags, view_mask: u32) -> Self {
        self.drawable_flags = drawable_flags;
        self.view_mask = view_mask;
        self
    }
}

impl OctreeQuery for SphereOctreeQuery {
    fn test_octant(&self, culling_box: &BoundingBox, inside: bool) -> Intersection {
        if inside {
            Intersection::Inside
        } else {
            self.sphere.is_inside(culling_box)
        }
    }

    fn test_drawables(&self, candidates: Candidates<'_>, inside: bool, results: &mut Vec<DrawableId>) {
        for (id, entry) in candidates {
            if accepts(entry, self.drawable_flags, self.view_mask)
                && (inside || self.sphere.intersects_box(entry.world_bounding_box()))
            {
                results.push(id);
            }
        }
    }
}

/// Drawables overlapping a box
#[derive(Debug, Clone, Copy)]
pub struct BoxOctreeQuery {
    /// Box to test
    pub aabb: BoundingBox,
    /// Drawable kinds to accept; any shared bit matches
    pub drawable_flags: DrawableFlags,
    /// Layers to accept; any shared bit matches
    pub view_mask: u32,
}

impl BoxOctreeQuery {
    /// Query accepting every drawable kind on the default layers
    pub fn new(aabb: BoundingBox) -> Self {
        Self { aabb, drawable_flags: DrawableFlags::ANY, view_mask: DEFAULT_VIEW_MASK }
    }

    /// Restrict the query to drawable kinds and layers
    pub fn with_filter(mut self, drawable_flags: DrawableFlags, view_mask: u32) -> Self {
        self.drawable_flags = drawable_flags;
        self.view_mask = view_mask;
        self
    }
}

impl OctreeQuery for BoxOctreeQuery {
    fn test_octant(&self, culling_box: &BoundingBox, inside: bool) -> Intersection {
        if inside {
            Intersection::Inside
        } else {
            self.aabb.is_inside(culling_box)
        }
    }

    fn test_drawables(&self, candidates: Candidates<'_>, inside: bool, results: &mut Vec<DrawableId>) {
        for (id, entry) in candidates {
            if accepts(entry, self.drawable_flags, self.view_mask)
                && (inside || self.aabb.intersects(entry.world_bounding_box()))
            {
                results.push(id);
            }
        }
    }
}

/// Drawables inside or crossing a view frustum
#[derive(Debug, Clone)]
pub struct FrustumOctreeQuery {
    /// Frustum to test
    pub frustum: Frustum,
    /// Drawable kinds to accept; any shared bit matches
    pub drawable_flags: DrawableFlags,
    /// Layers to accept; any shared bit matches
    pub view_mask: u32,
}

impl FrustumOctreeQuery {
    /// Query accepting every drawable kind on the default layers
    pub fn new(frustum: Frustum) -> Self {
        Self { frustum, drawable_flags: DrawableFlags::ANY, view_mask: DEFAULT_VIEW_MASK }
    }

    /// Restrict the query to drawable kinds and layers
    pub fn with_filter(mut self, drawable_flags: DrawableFlags, view_mask: u32) -> Self {
        self.drawable_flags = drawable_flags;
        self.view_mask = view_mask;
        self
    }
}

impl OctreeQuery for FrustumOctreeQuery {
    fn test_octant(&self, culling_box: &BoundingBox, inside: bool) -> Intersection {
        if inside {
            Intersection::Inside
        } else {
            self.frustum.is_inside(culling_box)
        }
    }

    fn test_drawables(&self, candidates: Candidates<'_>, inside: bool, results: &mut Vec<DrawableId>) {
        for (id, entry) in candidates {
            if accepts(entry, self.drawable_flags, self.view_mask)
                && (inside || self.frustum.intersects_aabb(entry.world_bounding_box()))
            {
                results.push(id);
            }
        }
    }
}

/// Precision of ray hits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RayQueryLevel {
    /// Hit the world-space bounding box
    #[default]
    Aabb,
    /// Hit the local bounding box transformed by the node
    Obb,
}

/// Ray query description
#[derive(Debug, Clone, Copy)]
pub struct RayOctreeQuery {
    /// World-space ray
    pub ray: Ray,
    /// Drawable kinds to accept; any shared bit matches
    pub drawable_flags: DrawableFlags,
    /// Layers to accept; any shared bit matches
    pub view_mask: u32,
    /// Hits at or beyond this distance are ignored
    pub max_distance: f32,
    /// Hit precision
    pub level: RayQueryLevel,
}

impl RayOctreeQuery {
    /// Query accepting every drawable kind on the default layers
    pub fn new(ray: Ray, max_distance: f32) -> Self {
        Self {
            ray,
            drawable_flags: DrawableFlags::ANY,
            view_mask: DEFAULT_VIEW_MASK,
            max_distance,
            level: RayQueryLevel::Aabb,
        }
    }

    /// Restrict the query to drawable kinds and layers
    pub fn with_filter(mut self, drawable_flags: DrawableFlags, view_mask: u32) -> Self {
        self.drawable_flags = drawable_flags;
        self.view_mask = view_mask;
        self
    }

    /// Choose the hit precision
    pub fn with_level(mut self, level: RayQueryLevel) -> Self {
        self.level = level;
        self
    }

    pub(crate) fn accepts(&self, entry: &OctreeEntry) -> bool {
        accepts(entry, self.drawable_flags, self.view_mask)
    }
}

/// One ray hit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayQueryResult {
    /// World-space hit point
    pub position: Vec3,
    /// World-space surface normal at the hit
    pub normal: Vec3,
    /// Texture coordinate at the hit, zero when not computed
    pub texture_uv: Vec2,
    /// Distance from the ray origin
    pub distance: f32,
    /// Drawable that was hit
    pub drawable: DrawableId,
    /// Node the drawable is attached to
    pub node: Option<NodeId>,
    /// Drawable-specific sub-object, e.g. geometry index
    pub sub_object: u32,
}
