//! Scene graph and drawables
//!
//! Nodes carry local transforms and lazily cached world transforms.
//! Drawables hang off nodes and are indexed by the scene's octree.

pub mod camera;
pub mod drawable;
pub mod error;
pub mod hierarchy;
pub mod node;
#[allow(clippy::module_inception)]
pub mod scene;
pub mod static_model;

#[cfg(test)]
mod tests;

pub use camera::Camera;
pub use drawable::{
    process_ray_query_default, update_batches_default, Drawable, DrawableBase, DrawableContext,
    FrameInfo, GeometryType, SourceBatch,
};
pub use error::SceneError;
pub use hierarchy::{HierarchyError, NodeGraph};
pub use node::Node;
pub use scene::Scene;
pub use static_model::{GeometryLod, StaticModel};
