//! Node hierarchy with lazily cached world transforms
//!
//! Every transform mutation marks the node dirty. Marking stops at nodes that
//! are already dirty, so a node that is dirty always has dirty descendants and
//! a clean node always has clean ancestors. World transforms are resolved on
//! read, from the topmost dirty ancestor down.
//!
//! Drawables register as listeners on a node. When the node turns dirty the
//! listener ids are pushed to an outbox which the owner drains with
//! [`NodeGraph::drain_notifications`].

use thiserror::Error;

use super::Node;
use crate::foundation::collections::{DrawableId, NodeId, SlotMap};
use crate::foundation::math::{Mat4, Mat4Ext, Quat, Transform, TransformSpace, Vec3};

/// Structural errors from hierarchy mutations
///
/// A failed operation leaves the hierarchy untouched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HierarchyError {
    /// Node passed as both parent and child
    #[error("node {0:?} cannot be its own parent")]
    SelfParent(NodeId),

    /// Parent lies inside the child's subtree
    #[error("node {parent:?} is a descendant of {child:?}; reparenting would create a cycle")]
    Cycle {
        /// Requested new parent
        parent: NodeId,
        /// Node being reparented
        child: NodeId,
    },

    /// Handle is stale or from another graph
    #[error("node {0:?} not found")]
    NodeNotFound(NodeId),

    /// Child has a different parent
    #[error("node {child:?} is not a child of {parent:?}")]
    NotAChild {
        /// Claimed parent
        parent: NodeId,
        /// Node that is not under it
        child: NodeId,
    },
}

/// Arena of scene nodes
#[derive(Debug, Default)]
pub struct NodeGraph {
    nodes: SlotMap<NodeId, Node>,
    notifications: Vec<DrawableId>,
}

impl NodeGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a standalone node
    pub fn create_node(&mut self, name: impl Into<String>) -> NodeId {
        self.nodes.insert(Node::new(name))
    }

    /// Number of nodes, attached or not
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph holds no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether the handle is live
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Look up a node
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// All nodes in arena order
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter()
    }

    fn node(&self, id: NodeId) -> Result<&Node, HierarchyError> {
        self.nodes.get(id).ok_or(HierarchyError::NodeNotFound(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, HierarchyError> {
        self.nodes.get_mut(id).ok_or(HierarchyError::NodeNotFound(id))
    }

    /// Make `child` the last child of `parent`
    ///
    /// Reparenting to the current parent is a no-op.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), HierarchyError> {
        if let Err(err) = self.check_reparent(parent, child) {
            log::debug!("Rejected reparent of {:?} under {:?}: {}", child, parent, err);
            return Err(err);
        }
        if self.nodes[child].parent == Some(parent) {
            return Ok(());
        }

        self.unlink(child);
        self.nodes[parent].children.push(child);
        self.nodes[child].parent = Some(parent);

        let in_scene = self.nodes[parent].in_scene;
        self.set_in_scene(child, in_scene);
        self.mark_dirty(child);
        Ok(())
    }

    fn check_reparent(&self, parent: NodeId, child: NodeId) -> Result<(), HierarchyError> {
        if parent == child {
            return Err(HierarchyError::SelfParent(child));
        }
        self.node(parent)?;
        self.node(child)?;
        if self.is_child_of(parent, child) {
            return Err(HierarchyError::Cycle { parent, child });
        }
        Ok(())
    }

    /// Detach `child` from `parent`, leaving it as a standalone subtree
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), HierarchyError> {
        if self.node(child)?.parent != Some(parent) {
            return Err(HierarchyError::NotAChild { parent, child });
        }
        self.detach(child)
    }

    /// Detach a node from its parent, if any
    pub fn detach(&mut self, id: NodeId) -> Result<(), HierarchyError> {
        if self.node(id)?.parent.is_none() {
            return Ok(());
        }
        self.unlink(id);
        self.set_in_scene(id, false);
        self.mark_dirty(id);
        Ok(())
    }

    /// Destroy a node and its whole subtree; returns the removed ids
    pub fn remove_node(&mut self, id: NodeId) -> Result<Vec<NodeId>, HierarchyError> {
        self.node(id)?;
        self.unlink(id);

        let removed = self.subtree(id);
        for &node in &removed {
            self.nodes.remove(node);
        }
        Ok(removed)
    }

    fn unlink(&mut self, id: NodeId) {
        let Some(parent) = self.nodes.get_mut(id).and_then(|node| node.parent.take()) else {
            return;
        };
        if let Some(parent) = self.nodes.get_mut(parent) {
            parent.children.retain(|&c| c != id);
        }
    }

    /// The node and all of its descendants, parents before children
    pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get(current) else { continue };
            result.push(current);
            stack.extend(node.children.iter().rev());
        }
        result
    }

    /// Whether `ancestor` is a proper ancestor of `id`
    pub fn is_child_of(&self, id: NodeId, ancestor: NodeId) -> bool {
        let mut current = self.nodes.get(id).and_then(|node| node.parent);
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.nodes.get(node).and_then(|n| n.parent);
        }
        false
    }

    /// Children of a node, optionally including all descendants
    pub fn children(&self, id: NodeId, recursive: bool) -> Vec<NodeId> {
        let Some(node) = self.nodes.get(id) else {
            return Vec::new();
        };
        if !recursive {
            return node.children.clone();
        }
        let mut all = self.subtree(id);
        all.remove(0);
        all
    }

    /// Number of children, optionally counting all descendants
    pub fn num_children(&self, id: NodeId, recursive: bool) -> usize {
        if recursive {
            self.subtree(id).len().saturating_sub(1)
        } else {
            self.nodes.get(id).map_or(0, |node| node.children.len())
        }
    }

    /// First child with the given name
    pub fn child_by_name(&self, id: NodeId, name: &str, recursive: bool) -> Option<NodeId> {
        self.children(id, recursive)
            .into_iter()
            .find(|&child| self.nodes.get(child).is_some_and(|node| node.name == name))
    }

    /// Rename a node
    pub fn set_name(&mut self, id: NodeId, name: impl Into<String>) -> Result<(), HierarchyError> {
        self.node_mut(id)?.name = name.into();
        Ok(())
    }

    /// Set the node's own enabled flag
    pub fn set_enabled(&mut self, id: NodeId, enabled: bool) -> Result<(), HierarchyError> {
        self.node_mut(id)?.enabled = enabled;
        Ok(())
    }

    /// Set the enabled flag on a node and all of its descendants
    pub fn set_deep_enabled(&mut self, id: NodeId, enabled: bool) -> Result<(), HierarchyError> {
        self.node(id)?;
        for node in self.subtree(id) {
            self.nodes[node].enabled = enabled;
        }
        Ok(())
    }

    /// Replace the user flag bits
    pub fn set_flags(&mut self, id: NodeId, flags: u32) -> Result<(), HierarchyError> {
        self.node_mut(id)?.flags = flags;
        Ok(())
    }

    /// Replace the user layer
    pub fn set_layer(&mut self, id: NodeId, layer: u32) -> Result<(), HierarchyError> {
        self.node_mut(id)?.layer = layer;
        Ok(())
    }

    /// Flag a subtree as attached to, or detached from, a scene root
    pub(crate) fn set_in_scene(&mut self, id: NodeId, in_scene: bool) {
        for node in self.subtree(id) {
            self.nodes[node].in_scene = in_scene;
        }
    }

    /// Set the local position and dirty the subtree
    pub fn set_position(&mut self, id: NodeId, position: Vec3) -> Result<(), HierarchyError> {
        self.node_mut(id)?.position = position;
        self.mark_dirty(id);
        Ok(())
    }

    /// Set the local rotation and dirty the subtree
    pub fn set_rotation(&mut self, id: NodeId, rotation: Quat) -> Result<(), HierarchyError> {
        self.node_mut(id)?.rotation = rotation;
        self.mark_dirty(id);
        Ok(())
    }

    /// Set the local scale and dirty the subtree
    pub fn set_scale(&mut self, id: NodeId, scale: Vec3) -> Result<(), HierarchyError> {
        self.node_mut(id)?.scale = scale;
        self.mark_dirty(id);
        Ok(())
    }

    /// Set position, rotation and scale at once
    pub fn set_transform(&mut self, id: NodeId, transform: Transform) -> Result<(), HierarchyError> {
        let node = self.node_mut(id)?;
        node.position = transform.position;
        node.rotation = transform.rotation;
        node.scale = transform.scale;
        self.mark_dirty(id);
        Ok(())
    }

    /// Move a node by `delta` expressed in `space`
    pub fn translate(&mut self, id: NodeId, delta: Vec3, space: TransformSpace) -> Result<(), HierarchyError> {
        let node = self.node(id)?;
        let (position, rotation, parent) = (node.position, node.rotation, node.parent);

        let offset = match (space, parent) {
            (TransformSpace::Local, _) => rotation * delta,
            (TransformSpace::Parent, _) | (TransformSpace::World, None) => delta,
            (TransformSpace::World, Some(parent)) => self.world_inverse(parent).transform_vector3(delta),
        };
        self.set_position(id, position + offset)
    }

    /// Rotate a node by `delta` expressed in `space`
    pub fn rotate(&mut self, id: NodeId, delta: Quat, space: TransformSpace) -> Result<(), HierarchyError> {
        let node = self.node(id)?;
        let (rotation, parent) = (node.rotation, node.parent);

        let rotated = match (space, parent) {
            (TransformSpace::Local, _) => rotation * delta,
            (TransformSpace::Parent, _) | (TransformSpace::World, None) => delta * rotation,
            (TransformSpace::World, Some(_)) => {
                let world = self.world_rotation(id).unwrap_or_else(Quat::identity);
                rotation * world.inverse() * delta * world
            }
        };
        self.set_rotation(id, rotated)
    }

    /// Place a node at a world-space position
    pub fn set_world_position(&mut self, id: NodeId, position: Vec3) -> Result<(), HierarchyError> {
        let local = match self.node(id)?.parent {
            Some(parent) => self.world_inverse(parent).transform_point3(position),
            None => position,
        };
        self.set_position(id, local)
    }

    /// Orient a node in world space
    pub fn set_world_rotation(&mut self, id: NodeId, rotation: Quat) -> Result<(), HierarchyError> {
        let local = match self.node(id)?.parent {
            Some(parent) => {
                self.world_rotation(parent).unwrap_or_else(Quat::identity).inverse() * rotation
            }
            None => rotation,
        };
        self.set_rotation(id, local)
    }

    /// Turn a node so its +Z axis faces a world-space target
    ///
    /// Returns `false` and leaves the node alone when the target coincides
    /// with the node or lies along `up`.
    pub fn look_at(&mut self, id: NodeId, target: Vec3, up: Vec3) -> Result<bool, HierarchyError> {
        self.node(id)?;
        let position = self.world_position(id).unwrap_or_else(Vec3::zeros);
        let direction = target - position;

        if direction.magnitude_squared() <= f32::EPSILON
            || direction.cross(&up).magnitude_squared() <= f32::EPSILON
        {
            return Ok(false);
        }

        self.set_world_rotation(id, Quat::face_towards(&direction, &up))?;
        Ok(true)
    }

    /// Register a drawable to be told when this node turns dirty
    ///
    /// A listener added to a node that is already dirty is notified at once.
    pub fn add_listener(&mut self, id: NodeId, drawable: DrawableId) -> Result<(), HierarchyError> {
        let node = self.node_mut(id)?;
        if !node.listeners.contains(&drawable) {
            node.listeners.push(drawable);
        }
        if node.dirty {
            self.notifications.push(drawable);
        }
        Ok(())
    }

    /// Stop notifying a drawable about this node
    pub fn remove_listener(&mut self, id: NodeId, drawable: DrawableId) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.listeners.retain(|&d| d != drawable);
        }
    }

    /// Listener ids notified since the last drain
    pub fn drain_notifications(&mut self) -> Vec<DrawableId> {
        std::mem::take(&mut self.notifications)
    }

    /// Mark a node and its descendants dirty, queuing listener notifications
    pub fn mark_dirty(&mut self, id: NodeId) {
        let mut outbox = std::mem::take(&mut self.notifications);
        self.mark_dirty_with(id, &mut |_, drawable| outbox.push(drawable));
        self.notifications = outbox;
    }

    /// Mark a node and its descendants dirty, calling `notify` per listener
    ///
    /// Descent stops at nodes that are already dirty, so marking twice
    /// without a transform read in between visits nothing the second time.
    pub fn mark_dirty_with<F>(&mut self, id: NodeId, notify: &mut F)
    where
        F: FnMut(NodeId, DrawableId),
    {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get_mut(current) else { continue };
            if node.dirty {
                continue;
            }
            node.dirty = true;

            for &listener in &node.listeners {
                notify(current, listener);
            }
            stack.extend(node.children.iter().rev());
        }
    }

    /// World transform, recomputing stale ancestors first
    pub fn world_transform(&mut self, id: NodeId) -> Option<Mat4> {
        self.resolve(id)?;
        self.nodes.get(id).map(|node| node.world_transform)
    }

    /// World rotation, recomputing stale ancestors first
    pub fn world_rotation(&mut self, id: NodeId) -> Option<Quat> {
        self.resolve(id)?;
        self.nodes.get(id).map(|node| node.world_rotation)
    }

    /// World position, recomputing stale ancestors first
    pub fn world_position(&mut self, id: NodeId) -> Option<Vec3> {
        self.world_transform(id).map(|transform| transform.translation_part())
    }

    /// Map a point from node space to world space
    pub fn local_to_world(&mut self, id: NodeId, point: Vec3) -> Option<Vec3> {
        self.world_transform(id).map(|transform| transform.transform_point3(point))
    }

    /// Map a point from world space to node space
    pub fn world_to_local(&mut self, id: NodeId, point: Vec3) -> Option<Vec3> {
        self.node(id).ok()?;
        Some(self.world_inverse(id).transform_point3(point))
    }

    fn world_inverse(&mut self, id: NodeId) -> Mat4 {
        self.world_transform(id)
            .and_then(|transform| transform.try_inverse())
            .unwrap_or_else(Mat4::identity)
    }

    /// Recompute the dirty chain above and including `id`
    fn resolve(&mut self, id: NodeId) -> Option<()> {
        let mut chain = Vec::new();
        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = self.nodes.get(node_id)?;
            if !node.dirty {
                break;
            }
            chain.push(node_id);
            current = node.parent;
        }

        for node_id in chain.into_iter().rev() {
            let node = &self.nodes[node_id];
            let local = node.local_matrix();
            let rotation = node.rotation;
            let (parent_transform, parent_rotation) = node
                .parent
                .and_then(|parent| self.nodes.get(parent))
                .map_or((Mat4::identity(), Quat::identity()), |parent| {
                    (parent.world_transform, parent.world_rotation)
                });

            let node = &mut self.nodes[node_id];
            node.world_transform = parent_transform * local;
            node.world_rotation = parent_rotation * rotation;
            node.dirty = false;
        }
        Some(())
    }
}
