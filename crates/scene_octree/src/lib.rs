//! # Scene Octree
//!
//! Scene node hierarchy with lazily cached world transforms, plus a loose
//! octree over the world-space bounds of the drawables attached to it.
//!
//! ## Features
//!
//! - **Node Hierarchy**: Parent/child transforms resolved on demand, with
//!   dirty flags that stop at already-dirty subtrees
//! - **Loose Octree**: Lazily subdivided octants whose culling boxes are
//!   expanded by their half-size on every side, with empty-branch pruning
//! - **Deferred Reinsertion**: Moved drawables are queued and re-bucketed
//!   once per frame, including from the parallel update phase
//! - **Queries**: Point, sphere, box, frustum and ray queries with type and
//!   view mask filtering
//!
//! ## Quick Start
//!
//! ```rust
//! use scene_octree::prelude::*;
//!
//! fn main() -> Result<(), SceneError> {
//!     let mut scene = Scene::new(SceneConfig::default())?;
//!
//!     let node = scene.create_child(scene.root(), "crate")?;
//!     scene.set_position(node, Vec3::new(10.0, 0.0, 0.0))?;
//!
//!     let model = scene.create_drawable(StaticModel::new(
//!         BoundingBox::from_center_half_size(Vec3::zeros(), 1.0),
//!     ));
//!     scene.attach_drawable(node, model)?;
//!     scene.update(&FrameInfo::default());
//!
//!     let nearby = scene.get_objects_in_range(Vec3::new(10.0, 0.0, 0.0), 2.0);
//!     assert_eq!(nearby, vec![model]);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod foundation;
pub mod scene;
pub mod spatial;

/// Common imports for crate users
pub mod prelude {
    pub use crate::{
        config::{Config, ConfigError, OctreeConfig, SceneConfig},
        foundation::{
            collections::{DrawableId, GeometryId, MaterialId, NodeId, OctantId},
            math::{Mat4, Quat, Transform, TransformSpace, Vec3},
        },
        scene::{
            Camera, Drawable, DrawableBase, FrameInfo, HierarchyError, Scene, SceneError,
            StaticModel,
        },
        spatial::{
            BoundingBox, DrawableFlags, Frustum, Intersection, Octree, OctreeQuery, Ray,
            RayOctreeQuery, RayQueryResult,
        },
    };
}
