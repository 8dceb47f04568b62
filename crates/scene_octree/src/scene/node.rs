//! Scene node data

use crate::foundation::collections::{DrawableId, NodeId};
use crate::foundation::math::{Mat4, Quat, Transform, Vec3};

/// A transformable node in the scene hierarchy
///
/// Nodes are owned by a [`NodeGraph`](super::NodeGraph) and refer to their
/// parent and children by [`NodeId`]. The world transform is cached and only
/// recomputed when the node has been marked dirty.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) name: String,
    pub(crate) enabled: bool,
    pub(crate) flags: u32,
    pub(crate) layer: u32,
    pub(crate) position: Vec3,
    pub(crate) rotation: Quat,
    pub(crate) scale: Vec3,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) listeners: Vec<DrawableId>,
    pub(crate) dirty: bool,
    pub(crate) world_transform: Mat4,
    pub(crate) world_rotation: Quat,
    pub(crate) in_scene: bool,
}

impl Node {
    /// Create a standalone node with an identity transform
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            flags: 0,
            layer: 0,
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
            parent: None,
            children: Vec::new(),
            listeners: Vec::new(),
            dirty: true,
            world_transform: Mat4::identity(),
            world_rotation: Quat::identity(),
            in_scene: false,
        }
    }

    /// Display name, not required to be unique
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Own enabled flag
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// User-defined flag bits
    pub fn flags(&self) -> u32 {
        self.flags
    }

    /// User-defined layer
    pub fn layer(&self) -> u32 {
        self.layer
    }

    /// Local position
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Local rotation
    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    /// Local scale
    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    /// Local transform relative to the parent
    pub fn transform(&self) -> Transform {
        Transform {
            position: self.position,
            rotation: self.rotation,
            scale: self.scale,
        }
    }

    /// Parent node, `None` for the root and detached nodes
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Direct children in insertion order
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Drawables notified when this node's world transform changes
    pub fn listeners(&self) -> &[DrawableId] {
        &self.listeners
    }

    /// Whether the cached world transform is stale
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Whether the node hangs below a scene root
    pub fn is_in_scene(&self) -> bool {
        self.in_scene
    }

    /// Local transform matrix (translation * rotation * scale)
    pub(crate) fn local_matrix(&self) -> Mat4 {
        self.transform().to_matrix()
    }
}
