//! Spatial partitioning and queries
//!
//! Bounding volumes, rays and frusta, plus the loose [`Octree`] that indexes
//! drawables by their world-space bounds.

mod bounds;
mod frustum;
mod octant;
mod octree;
mod query;
mod ray;

pub use bounds::{BoundingBox, Intersection, Sphere};
pub use frustum::{Frustum, Plane};
pub use octant::{Octant, NUM_OCTANTS, ROOT_INDEX};
pub use octree::{Candidates, Octree, OctreeEntry, OctreeError};
pub use query::{
    BoxOctreeQuery, DrawableFlags, FrustumOctreeQuery, OctreeQuery, PointOctreeQuery,
    RayOctreeQuery, RayQueryLevel, RayQueryResult, SphereOctreeQuery, DEFAULT_VIEW_MASK,
};
pub use ray::Ray;
