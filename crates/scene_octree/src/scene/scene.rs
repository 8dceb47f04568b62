//! # Scene
//!
//! Owns the node hierarchy, the drawables attached to it and the octree that
//! indexes them. Every node mutation is followed by a flush of the node
//! graph's dirty notifications, so moved drawables are queued for deferred
//! reinsertion and picked up by the next [`Scene::update`].
//!
//! A drawable is indexed while it is enabled and either manual, or attached
//! to an enabled node that is connected to the scene root.
//!
//! Queries take `&self` and see drawables where they were last indexed:
//! node moves become visible to range, frustum and ray queries after the
//! next [`Scene::update`].

use rayon::prelude::*;

use super::drawable::{Drawable, DrawableContext, FrameInfo};
use super::error::SceneError;
use super::hierarchy::{HierarchyError, NodeGraph};
use super::node::Node;
use crate::config::{OctreeConfig, SceneConfig};
use crate::foundation::collections::{DrawableId, MaterialId, NodeId, SecondaryMap, SlotMap};
use crate::foundation::math::{Mat4, Quat, Transform, TransformSpace, Vec3};
use crate::spatial::{
    BoundingBox, DrawableFlags, Frustum, FrustumOctreeQuery, Octree, OctreeQuery, RayOctreeQuery,
    RayQueryResult, DEFAULT_VIEW_MASK,
};

/// Node hierarchy plus spatial index
pub struct Scene {
    config: SceneConfig,
    nodes: NodeGraph,
    root: NodeId,
    drawables: SlotMap<DrawableId, Box<dyn Drawable>>,
    /// Placement each indexed drawable was last inserted or reinserted with
    placements: SecondaryMap<DrawableId, DrawableContext>,
    octree: Octree,
}

impl Scene {
    /// Create a scene from a validated configuration
    pub fn new(config: SceneConfig) -> Result<Self, SceneError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: SceneConfig) -> Self {
        let mut nodes = NodeGraph::new();
        let root = nodes.create_node("Scene");
        nodes.set_in_scene(root, true);
        let octree = Octree::new(&config.octree);

        log::debug!(
            "Scene created: octree {:?} with {} levels, threaded update {}",
            octree.world_bounding_box(),
            octree.num_levels(),
            config.threaded_update
        );

        Self {
            config,
            nodes,
            root,
            drawables: SlotMap::with_key(),
            placements: SecondaryMap::new(),
            octree,
        }
    }

    /// Active configuration
    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// Permanent root node
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Read access to the node graph
    pub fn nodes(&self) -> &NodeGraph {
        &self.nodes
    }

    /// Look up a node
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Read access to the spatial index
    pub fn octree(&self) -> &Octree {
        &self.octree
    }

    /// Resize the octree and reindex every drawable
    pub fn set_octree_size(&mut self, bounds: BoundingBox, num_levels: u32) {
        self.octree.set_size(bounds, num_levels);
        self.config.octree = OctreeConfig::new(&bounds, self.octree.num_levels());
    }

    // ========================================================================
    // Node hierarchy
    // ========================================================================

    /// Create a detached node
    ///
    /// The node is not part of the scene until it is attached below the root.
    pub fn create_node(&mut self, name: impl Into<String>) -> NodeId {
        self.nodes.create_node(name)
    }

    /// Create a node as the last child of `parent`
    pub fn create_child(&mut self, parent: NodeId, name: impl Into<String>) -> Result<NodeId, SceneError> {
        if !self.nodes.contains(parent) {
            return Err(SceneError::NodeNotFound(parent));
        }
        let child = self.nodes.create_node(name);
        self.add_child(parent, child)?;
        Ok(child)
    }

    /// Reparent `child` under `parent`
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), SceneError> {
        if child == self.root {
            return Err(SceneError::RootNode);
        }
        self.change_membership(child, |nodes| nodes.add_child(parent, child))
    }

    /// Detach `child` from `parent`; fails if it has another parent
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), SceneError> {
        self.change_membership(child, |nodes| nodes.remove_child(parent, child))
    }

    /// Detach a node from its parent, keeping its subtree
    pub fn detach(&mut self, id: NodeId) -> Result<(), SceneError> {
        self.change_membership(id, |nodes| nodes.detach(id))
    }

    /// Destroy a node, its subtree and every drawable attached to them
    pub fn remove_node(&mut self, id: NodeId) -> Result<(), SceneError> {
        if id == self.root {
            return Err(SceneError::RootNode);
        }
        if !self.nodes.contains(id) {
            return Err(SceneError::NodeNotFound(id));
        }

        let attached: Vec<DrawableId> = self
            .nodes
            .subtree(id)
            .into_iter()
            .filter_map(|node| self.nodes.get(node))
            .flat_map(|node| node.listeners().iter().copied())
            .collect();
        for drawable in &attached {
            self.unindex(*drawable);
            self.drawables.remove(*drawable);
        }

        let removed = self.nodes.remove_node(id)?;
        self.flush_notifications();
        log::debug!("Removed {} nodes and {} drawables", removed.len(), attached.len());
        Ok(())
    }

    /// Set a node's own enabled flag and reindex its drawables
    pub fn set_node_enabled(&mut self, id: NodeId, enabled: bool) -> Result<(), SceneError> {
        self.nodes.set_enabled(id, enabled)?;
        self.refresh_node(id);
        Ok(())
    }

    /// Set the enabled flag on a node and its whole subtree
    pub fn set_node_deep_enabled(&mut self, id: NodeId, enabled: bool) -> Result<(), SceneError> {
        self.nodes.set_deep_enabled(id, enabled)?;
        self.refresh_subtree(id);
        Ok(())
    }

    /// Set a node's local position
    pub fn set_position(&mut self, id: NodeId, position: Vec3) -> Result<(), SceneError> {
        self.mutate_node(|nodes| nodes.set_position(id, position))
    }

    /// Set a node's local rotation
    pub fn set_rotation(&mut self, id: NodeId, rotation: Quat) -> Result<(), SceneError> {
        self.mutate_node(|nodes| nodes.set_rotation(id, rotation))
    }

    /// Set a node's local scale
    pub fn set_scale(&mut self, id: NodeId, scale: Vec3) -> Result<(), SceneError> {
        self.mutate_node(|nodes| nodes.set_scale(id, scale))
    }

    /// Set a node's local position, rotation and scale
    pub fn set_transform(&mut self, id: NodeId, transform: Transform) -> Result<(), SceneError> {
        self.mutate_node(|nodes| nodes.set_transform(id, transform))
    }

    /// Move a node in the given space
    pub fn translate(&mut self, id: NodeId, delta: Vec3, space: TransformSpace) -> Result<(), SceneError> {
        self.mutate_node(|nodes| nodes.translate(id, delta, space))
    }

    /// Rotate a node in the given space
    pub fn rotate(&mut self, id: NodeId, delta: Quat, space: TransformSpace) -> Result<(), SceneError> {
        self.mutate_node(|nodes| nodes.rotate(id, delta, space))
    }

    /// Place a node at a world-space position
    pub fn set_world_position(&mut self, id: NodeId, position: Vec3) -> Result<(), SceneError> {
        self.mutate_node(|nodes| nodes.set_world_position(id, position))
    }

    /// Orient a node in world space
    pub fn set_world_rotation(&mut self, id: NodeId, rotation: Quat) -> Result<(), SceneError> {
        self.mutate_node(|nodes| nodes.set_world_rotation(id, rotation))
    }

    /// Turn a node to face a world-space target; `false` if the target
    /// coincides with the node position
    pub fn look_at(&mut self, id: NodeId, target: Vec3, up: Vec3) -> Result<bool, SceneError> {
        let turned = self.nodes.look_at(id, target, up)?;
        self.flush_notifications();
        Ok(turned)
    }

    /// World transform of a node, resolving stale ancestors
    pub fn world_transform(&mut self, id: NodeId) -> Option<Mat4> {
        self.nodes.world_transform(id)
    }

    /// World position of a node
    pub fn world_position(&mut self, id: NodeId) -> Option<Vec3> {
        self.nodes.world_position(id)
    }

    /// World rotation of a node
    pub fn world_rotation(&mut self, id: NodeId) -> Option<Quat> {
        self.nodes.world_rotation(id)
    }

    fn mutate_node<F>(&mut self, op: F) -> Result<(), SceneError>
    where
        F: FnOnce(&mut NodeGraph) -> Result<(), HierarchyError>,
    {
        op(&mut self.nodes)?;
        self.flush_notifications();
        Ok(())
    }

    /// Run a structural change and reindex the subtree if it entered or left
    /// the scene
    fn change_membership<F>(&mut self, id: NodeId, op: F) -> Result<(), SceneError>
    where
        F: FnOnce(&mut NodeGraph) -> Result<(), HierarchyError>,
    {
        let was_in_scene = self.nodes.get(id).is_some_and(Node::is_in_scene);
        op(&mut self.nodes)?;
        self.flush_notifications();

        if self.nodes.get(id).is_some_and(Node::is_in_scene) != was_in_scene {
            self.refresh_subtree(id);
        }
        Ok(())
    }

    /// Hand node dirty notifications to the drawables and the octree queue
    fn flush_notifications(&mut self) {
        for id in self.nodes.drain_notifications() {
            if let Some(drawable) = self.drawables.get_mut(id) {
                drawable.base_mut().world_box_dirty = true;
                self.octree.queue_update(id);
            }
        }
    }

    // ========================================================================
    // Drawable registration
    // ========================================================================

    /// Take ownership of a drawable; it stays unindexed until attached
    pub fn create_drawable<D: Drawable + 'static>(&mut self, drawable: D) -> DrawableId {
        self.drawables.insert(Box::new(drawable))
    }

    /// Number of owned drawables, indexed or not
    pub fn num_drawables(&self) -> usize {
        self.drawables.len()
    }

    /// Handles of every owned drawable
    pub fn drawable_ids(&self) -> impl Iterator<Item = DrawableId> + '_ {
        self.drawables.keys()
    }

    /// Look up a drawable
    pub fn drawable(&self, id: DrawableId) -> Option<&dyn Drawable> {
        let drawable = self.drawables.get(id)?;
        Some(drawable.as_ref())
    }

    /// Mutable access to a drawable
    ///
    /// Changes to the local box made through here are not tracked; use
    /// [`set_local_bounding_box`](Self::set_local_bounding_box) instead.
    pub fn drawable_mut(&mut self, id: DrawableId) -> Option<&mut dyn Drawable> {
        let drawable = self.drawables.get_mut(id)?;
        Some(drawable.as_mut())
    }

    /// Attach a drawable to a node, moving it off any previous node
    pub fn attach_drawable(&mut self, node: NodeId, id: DrawableId) -> Result<(), SceneError> {
        if !self.nodes.contains(node) {
            return Err(SceneError::NodeNotFound(node));
        }
        let drawable = self.drawables.get_mut(id).ok_or(SceneError::DrawableNotFound(id))?;

        let base = drawable.base_mut();
        if let Some(previous) = base.node.replace(node) {
            self.nodes.remove_listener(previous, id);
        }
        base.world_box_dirty = true;

        self.nodes.add_listener(node, id)?;
        self.flush_notifications();
        // A clean new node sends no notification
        self.octree.queue_update(id);
        self.refresh_drawable(id, true);
        Ok(())
    }

    /// Detach a drawable from its node; it leaves the octree unless manual
    pub fn detach_drawable(&mut self, id: DrawableId) -> Result<(), SceneError> {
        let drawable = self.drawables.get_mut(id).ok_or(SceneError::DrawableNotFound(id))?;
        let base = drawable.base_mut();
        if let Some(node) = base.node.take() {
            self.nodes.remove_listener(node, id);
        }
        base.world_box_dirty = true;

        self.refresh_drawable(id, false);
        // Manual drawables stay indexed and fall back to the local box
        self.octree.queue_update(id);
        Ok(())
    }

    /// Remove a drawable from the scene and hand it back
    pub fn remove_drawable(&mut self, id: DrawableId) -> Option<Box<dyn Drawable>> {
        let drawable = self.drawables.remove(id)?;
        if let Some(node) = drawable.base().node {
            self.nodes.remove_listener(node, id);
        }
        self.unindex(id);
        Some(drawable)
    }

    /// Set a drawable's own enabled flag and reindex it
    pub fn set_drawable_enabled(&mut self, id: DrawableId, enabled: bool) -> Result<(), SceneError> {
        let drawable = self.drawables.get_mut(id).ok_or(SceneError::DrawableNotFound(id))?;
        drawable.base_mut().enabled = enabled;
        self.refresh_drawable(id, enabled);
        Ok(())
    }

    /// Replace the local box and queue the drawable for reinsertion
    pub fn set_local_bounding_box(&mut self, id: DrawableId, local_bounding_box: BoundingBox) -> Result<(), SceneError> {
        let drawable = self.drawables.get_mut(id).ok_or(SceneError::DrawableNotFound(id))?;
        drawable.base_mut().set_local_bounding_box(local_bounding_box);
        self.octree.queue_update(id);
        Ok(())
    }

    /// Change the type flags and view mask used by query filtering
    pub fn set_drawable_filter(&mut self, id: DrawableId, flags: DrawableFlags, view_mask: u32) -> Result<(), SceneError> {
        let drawable = self.drawables.get_mut(id).ok_or(SceneError::DrawableNotFound(id))?;
        let base = drawable.base_mut();
        base.flags = flags;
        base.view_mask = view_mask;
        self.octree.set_filter(id, flags, view_mask);
        Ok(())
    }

    /// Assign a material to one of a drawable's batches
    pub fn set_drawable_material(&mut self, id: DrawableId, index: usize, material: MaterialId) -> Result<(), SceneError> {
        let drawable = self.drawables.get_mut(id).ok_or(SceneError::DrawableNotFound(id))?;
        if drawable.set_material(index, material) {
            Ok(())
        } else {
            Err(SceneError::IndexOutOfRange {
                index,
                len: drawable.base().batches.len(),
            })
        }
    }

    /// Current world box, recomputed if stale
    pub fn world_bounding_box(&mut self, id: DrawableId) -> Option<BoundingBox> {
        let drawable = self.drawables.get_mut(id)?;
        Some(resolve_world_box(&mut self.nodes, drawable.as_mut()))
    }

    /// Index a drawable without requiring a node in the scene
    ///
    /// Its world box follows the node if it has one, otherwise the local box
    /// is used as-is.
    pub fn insert_manual(&mut self, id: DrawableId) -> Result<(), SceneError> {
        let drawable = self.drawables.get_mut(id).ok_or(SceneError::DrawableNotFound(id))?;
        drawable.base_mut().manual = true;
        if self.octree.contains(id) {
            return Ok(());
        }

        let context = drawable_context(&mut self.nodes, id, drawable.as_mut());
        let base = drawable.base();
        self.octree
            .add_manual_drawable(id, context.world_bounding_box, base.flags, base.view_mask);
        self.placements.insert(id, context);
        Ok(())
    }

    /// Clear the manual flag; the drawable stays indexed only if its node
    /// keeps it in the scene
    pub fn remove_manual(&mut self, id: DrawableId) -> Result<(), SceneError> {
        let drawable = self.drawables.get_mut(id).ok_or(SceneError::DrawableNotFound(id))?;
        drawable.base_mut().manual = false;
        self.refresh_drawable(id, false);
        Ok(())
    }

    fn should_index(&self, id: DrawableId) -> bool {
        let Some(drawable) = self.drawables.get(id) else {
            return false;
        };
        let base = drawable.base();
        base.enabled
            && (base.manual
                || base
                    .node
                    .and_then(|node| self.nodes.get(node))
                    .is_some_and(|node| node.is_in_scene() && node.is_enabled()))
    }

    /// Insert or remove a drawable so the octree matches its enabled state
    fn refresh_drawable(&mut self, id: DrawableId, warn_orphan: bool) {
        let index = self.should_index(id);
        let indexed = self.octree.contains(id);
        let Some(drawable) = self.drawables.get_mut(id) else {
            return;
        };

        if index && !indexed {
            let context = drawable_context(&mut self.nodes, id, drawable.as_mut());
            let base = drawable.base();
            self.octree.insert(id, context.world_bounding_box, base.flags, base.view_mask);
            self.placements.insert(id, context);
        } else if !index && indexed {
            self.octree.remove(id);
            self.placements.remove(id);
        }

        let base = drawable.base();
        let in_scene = base
            .node
            .and_then(|node| self.nodes.get(node))
            .is_some_and(Node::is_in_scene);
        if warn_orphan && base.enabled && !base.manual && !in_scene {
            log::warn!(
                "Drawable {:?} enabled on node {:?} outside the scene, not indexed",
                id,
                base.node
            );
        }
    }

    fn unindex(&mut self, id: DrawableId) {
        self.octree.remove(id);
        self.placements.remove(id);
    }

    fn refresh_node(&mut self, node: NodeId) {
        let listeners = self.nodes.get(node).map(|n| n.listeners().to_vec()).unwrap_or_default();
        for id in listeners {
            self.refresh_drawable(id, false);
        }
    }

    fn refresh_subtree(&mut self, node: NodeId) {
        for id in self.nodes.subtree(node) {
            self.refresh_node(id);
        }
    }

    // ========================================================================
    // Spatial queries
    // ========================================================================

    /// Run a containment query against the octree
    pub fn get_drawables<Q: OctreeQuery + ?Sized>(&self, query: &Q) -> Vec<DrawableId> {
        self.octree.get_drawables(query)
    }

    /// Drawables whose bounds touch a sphere
    pub fn get_objects_in_range(&self, center: Vec3, radius: f32) -> Vec<DrawableId> {
        self.octree.get_objects_in_range(center, radius)
    }

    /// Drawables of the given kinds inside or intersecting a frustum
    pub fn frustum_query(&self, frustum: &Frustum, flags: DrawableFlags) -> Vec<DrawableId> {
        let query = FrustumOctreeQuery::new(frustum.clone()).with_filter(flags, DEFAULT_VIEW_MASK);
        self.octree.get_drawables(&query)
    }

    /// Every ray hit, nearest first
    ///
    /// Drawables are hit at their indexed placement; pending moves apply
    /// after the next [`update`](Self::update).
    pub fn raycast(&self, query: &RayOctreeQuery) -> Vec<RayQueryResult> {
        self.octree.raycast(query, |id, query, results| self.ray_hit(id, query, results))
    }

    /// Nearest ray hit, agreeing with the first result of [`raycast`](Self::raycast)
    pub fn raycast_single(&self, query: &RayOctreeQuery) -> Option<RayQueryResult> {
        self.octree.raycast_single(query, |id, query, results| self.ray_hit(id, query, results))
    }

    fn ray_hit(&self, id: DrawableId, query: &RayOctreeQuery, results: &mut Vec<RayQueryResult>) {
        if let (Some(drawable), Some(context)) = (self.drawables.get(id), self.placements.get(id)) {
            drawable.process_ray_query(query, context, results);
        }
    }

    // ========================================================================
    // Frame update
    // ========================================================================

    /// Run drawable update hooks, then drain the octree reinsertion queue
    ///
    /// With `threaded_update` set, hooks run on the rayon pool and drawables
    /// reporting changed bounds are queued through the octree's threaded
    /// queue. Returns the number of drawables that changed octant.
    pub fn update(&mut self, frame: &FrameInfo<'_>) -> usize {
        if self.config.threaded_update {
            self.octree.set_threaded_update(true);
            {
                let Self { drawables, octree, .. } = self;
                let octree = &*octree;
                let mut active: Vec<(DrawableId, &mut Box<dyn Drawable>)> = drawables
                    .iter_mut()
                    .filter(|(id, _)| octree.contains(*id))
                    .collect();

                active.par_iter_mut().for_each(|(id, drawable)| {
                    if drawable.update(frame) {
                        drawable.base_mut().world_box_dirty = true;
                        octree.queue_update_threaded(*id);
                    }
                });
            }
            self.octree.set_threaded_update(false);
        } else {
            let Self { drawables, octree, .. } = self;
            for (id, drawable) in drawables.iter_mut() {
                if octree.contains(id) && drawable.update(frame) {
                    drawable.base_mut().world_box_dirty = true;
                    octree.queue_update(id);
                }
            }
        }

        self.flush_notifications();

        let Self { nodes, drawables, placements, octree, .. } = self;
        octree.update(|id| match drawables.get_mut(id) {
            Some(drawable) => {
                let context = drawable_context(nodes, id, drawable.as_mut());
                placements.insert(id, context);
                context.world_bounding_box
            }
            None => BoundingBox::default(),
        })
    }

    /// Refresh batches of the drawables the camera can see
    ///
    /// Without a camera every indexed drawable is visited. Returns the
    /// visited drawables.
    pub fn update_batches(&mut self, frame: &FrameInfo<'_>) -> Vec<DrawableId> {
        let visible = match frame.camera {
            Some(camera) => self.frustum_query(&camera.frustum(), DrawableFlags::ANY),
            None => self
                .drawables
                .keys()
                .filter(|id| self.octree.contains(*id))
                .collect(),
        };

        let Self { nodes, drawables, .. } = self;
        for &id in &visible {
            if let Some(drawable) = drawables.get_mut(id) {
                let context = drawable_context(nodes, id, drawable.as_mut());
                drawable.update_batches(frame, &context);
            }
        }
        visible
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::build(SceneConfig::default())
    }
}

fn node_transform(nodes: &mut NodeGraph, node: Option<NodeId>) -> Mat4 {
    node.and_then(|node| nodes.world_transform(node))
        .unwrap_or_else(Mat4::identity)
}

fn resolve_world_box(nodes: &mut NodeGraph, drawable: &mut dyn Drawable) -> BoundingBox {
    let base = drawable.base_mut();
    if !base.world_box_dirty {
        return base.world_bounding_box;
    }
    let transform = node_transform(nodes, base.node);
    base.refresh_world_box(&transform)
}

fn drawable_context(nodes: &mut NodeGraph, id: DrawableId, drawable: &mut dyn Drawable) -> DrawableContext {
    let base = drawable.base_mut();
    let world_transform = node_transform(nodes, base.node);
    let world_bounding_box = base.refresh_world_box(&world_transform);
    DrawableContext {
        id,
        node: base.node,
        world_transform,
        local_bounding_box: base.local_bounding_box,
        world_bounding_box,
    }
}
