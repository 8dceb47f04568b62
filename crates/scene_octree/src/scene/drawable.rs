//! Drawable contract
//!
//! A drawable is anything with a bounding box that the octree should index:
//! renderable geometry, lights, zones. Concrete kinds implement [`Drawable`]
//! and keep the shared state in a [`DrawableBase`]. The scene owns drawables
//! and keeps their cached world boxes in sync with the node they are attached
//! to.

use super::Camera;
use crate::foundation::collections::{DrawableId, GeometryId, MaterialId, NodeId};
use crate::foundation::math::{Mat4, Mat4Ext, Vec2, Vec3};
use crate::spatial::{
    BoundingBox, DrawableFlags, RayOctreeQuery, RayQueryLevel, RayQueryResult, DEFAULT_VIEW_MASK,
};

/// Per-frame information handed to drawable hooks
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameInfo<'a> {
    /// Frame counter
    pub frame_number: u32,
    /// Seconds since the previous frame
    pub time_step: f32,
    /// Viewport size in pixels
    pub view_size: [u32; 2],
    /// Camera of the view being prepared, if any
    pub camera: Option<&'a Camera>,
}

/// How a batch's geometry is transformed when drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GeometryType {
    /// Drawn with the drawable's world transform
    #[default]
    Static,
    /// Deformed by a skeleton
    Skinned,
    /// One of many copies drawn in a single call
    Instanced,
    /// Always faces the camera
    Billboard,
}

/// One draw of one geometry with one material
#[derive(Debug, Clone, PartialEq)]
pub struct SourceBatch {
    /// Distance from the camera, for sorting
    pub distance: f32,
    /// Geometry drawn by this batch
    pub geometry: Option<GeometryId>,
    /// Material to draw it with
    pub material: Option<MaterialId>,
    /// Copied from the drawable on each batch update
    pub world_transform: Mat4,
    /// How the geometry is transformed
    pub geometry_type: GeometryType,
}

impl Default for SourceBatch {
    fn default() -> Self {
        Self {
            distance: 0.0,
            geometry: None,
            material: None,
            world_transform: Mat4::identity(),
            geometry_type: GeometryType::Static,
        }
    }
}

/// Resolved placement of a drawable, built by the scene for hook calls
///
/// Ray queries receive the placement recorded when the drawable was last
/// indexed, so `world_bounding_box` always matches the octree entry.
#[derive(Debug, Clone, Copy)]
pub struct DrawableContext {
    /// Drawable the hook runs for
    pub id: DrawableId,
    /// Node it is attached to
    pub node: Option<NodeId>,
    /// Node world transform, identity without a node
    pub world_transform: Mat4,
    /// Local box at the time `world_bounding_box` was computed
    pub local_bounding_box: BoundingBox,
    /// World-space bounds
    pub world_bounding_box: BoundingBox,
}

/// State shared by every drawable kind
#[derive(Debug, Clone)]
pub struct DrawableBase {
    pub(crate) node: Option<NodeId>,
    pub(crate) enabled: bool,
    pub(crate) manual: bool,
    pub(crate) local_bounding_box: BoundingBox,
    pub(crate) world_bounding_box: BoundingBox,
    pub(crate) world_box_dirty: bool,
    pub(crate) flags: DrawableFlags,
    pub(crate) view_mask: u32,
    /// Draw calls, one per geometry
    pub batches: Vec<SourceBatch>,
    /// Multiplier applied to the LOD distance
    pub lod_bias: f32,
    /// Camera distance from the last batch update
    pub distance: f32,
    /// Distance used for LOD selection
    pub lod_distance: f32,
    /// Frame of the last batch update
    pub view_frame_number: u32,
}

impl DrawableBase {
    /// Create base state with a local-space bounding box
    pub fn new(flags: DrawableFlags, local_bounding_box: BoundingBox) -> Self {
        Self {
            node: None,
            enabled: true,
            manual: false,
            local_bounding_box,
            world_bounding_box: local_bounding_box,
            world_box_dirty: true,
            flags,
            view_mask: DEFAULT_VIEW_MASK,
            batches: Vec::new(),
            lod_bias: 1.0,
            distance: 0.0,
            lod_distance: 0.0,
            view_frame_number: 0,
        }
    }

    /// Node the drawable is attached to
    pub fn node(&self) -> Option<NodeId> {
        self.node
    }

    /// Own enabled flag, ignoring the node
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether the drawable is indexed without a node
    pub fn is_manual(&self) -> bool {
        self.manual
    }

    /// Bounds in node space
    pub fn local_bounding_box(&self) -> &BoundingBox {
        &self.local_bounding_box
    }

    /// Last computed world box; may be stale, see [`is_world_box_dirty`](Self::is_world_box_dirty)
    pub fn world_bounding_box(&self) -> &BoundingBox {
        &self.world_bounding_box
    }

    /// Whether the world box needs recomputing
    pub fn is_world_box_dirty(&self) -> bool {
        self.world_box_dirty
    }

    /// Type flags used by query filtering
    pub fn flags(&self) -> DrawableFlags {
        self.flags
    }

    /// Layer mask used by query filtering
    pub fn view_mask(&self) -> u32 {
        self.view_mask
    }

    /// Change the local box from inside a drawable hook
    ///
    /// The world box is flagged stale; the hook must report the change so the
    /// drawable gets requeued.
    pub fn set_local_bounding_box(&mut self, local_bounding_box: BoundingBox) {
        self.local_bounding_box = local_bounding_box;
        self.world_box_dirty = true;
    }

    /// Recompute the world box if stale
    pub(crate) fn refresh_world_box(&mut self, world_transform: &Mat4) -> BoundingBox {
        if self.world_box_dirty {
            self.world_bounding_box = self.local_bounding_box.transformed(world_transform);
            self.world_box_dirty = false;
        }
        self.world_bounding_box
    }
}

/// Renderable object contract
///
/// Only [`base`](Drawable::base) and [`base_mut`](Drawable::base_mut) are
/// required; the rest have defaults that work on the base state.
pub trait Drawable: Send + Sync {
    /// Shared state
    fn base(&self) -> &DrawableBase;

    /// Shared state, mutable
    fn base_mut(&mut self) -> &mut DrawableBase;

    /// Resize the batch list
    fn set_num_geometries(&mut self, count: usize) {
        self.base_mut().batches.resize_with(count, SourceBatch::default);
    }

    /// Assign a material to one batch; `false` if the index is out of range
    fn set_material(&mut self, index: usize, material: MaterialId) -> bool {
        let batches = &mut self.base_mut().batches;
        let len = batches.len();
        match batches.get_mut(index) {
            Some(batch) => {
                batch.material = Some(material);
                true
            }
            None => {
                log::error!("Material index {} out of range ({} batches)", index, len);
                false
            }
        }
    }

    /// Geometry used by a batch at a LOD level
    fn lod_geometry(&self, batch: usize, _level: usize) -> Option<GeometryId> {
        self.base().batches.get(batch).and_then(|batch| batch.geometry)
    }

    /// Per-frame update; return `true` if the local bounds changed
    ///
    /// May be called from worker threads during the threaded update phase.
    fn update(&mut self, _frame: &FrameInfo<'_>) -> bool {
        false
    }

    /// Refresh batch distances and transforms for the current view
    fn update_batches(&mut self, frame: &FrameInfo<'_>, context: &DrawableContext) {
        update_batches_default(self.base_mut(), frame, context);
    }

    /// Add ray hits against this drawable to `results`
    fn process_ray_query(&self, query: &RayOctreeQuery, context: &DrawableContext, results: &mut Vec<RayQueryResult>) {
        process_ray_query_default(query, context, results);
    }
}

/// Batch update shared by drawable kinds
///
/// Sets the camera distance on the drawable and all of its batches, copies
/// the world transform into the batches and recomputes the LOD distance.
pub fn update_batches_default(base: &mut DrawableBase, frame: &FrameInfo<'_>, context: &DrawableContext) {
    let center = context.world_bounding_box.center();
    let distance = frame.camera.map_or(0.0, |camera| camera.distance(center));

    base.distance = distance;
    for batch in &mut base.batches {
        batch.distance = distance;
        batch.world_transform = context.world_transform;
    }

    let scale = context.world_bounding_box.size().dot(&Vec3::repeat(1.0 / 3.0));
    base.lod_distance = frame
        .camera
        .map_or(distance, |camera| camera.lod_distance(distance, scale, base.lod_bias));
    base.view_frame_number = frame.frame_number;
}

/// Ray hit against the world box, or the local box in node space for
/// [`RayQueryLevel::Obb`]
pub fn process_ray_query_default(
    query: &RayOctreeQuery,
    context: &DrawableContext,
    results: &mut Vec<RayQueryResult>,
) {
    let hit = match query.level {
        RayQueryLevel::Aabb => query.ray.hit_box(&context.world_bounding_box),
        RayQueryLevel::Obb => obb_hit(query, context),
    };

    if let Some((distance, normal)) = hit {
        if distance < query.max_distance {
            results.push(RayQueryResult {
                position: query.ray.point_at(distance),
                normal,
                texture_uv: Vec2::zeros(),
                distance,
                drawable: context.id,
                node: context.node,
                sub_object: 0,
            });
        }
    }
}

fn obb_hit(query: &RayOctreeQuery, context: &DrawableContext) -> Option<(f32, Vec3)> {
    let inverse = context.world_transform.try_inverse()?;
    let local_ray = query.ray.transformed(&inverse);
    let (local_distance, local_normal) = local_ray.hit_box(&context.local_bounding_box)?;

    let world_point = context.world_transform.transform_point3(local_ray.point_at(local_distance));
    let distance = (world_point - query.ray.origin).magnitude();

    // Normals transform by the inverse transpose
    let normal = (inverse.fixed_view::<3, 3>(0, 0).transpose() * local_normal)
        .try_normalize(f32::EPSILON)
        .unwrap_or(-query.ray.direction);

    Some((distance, normal))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::collections::SlotMap;
    use crate::foundation::math::{Quat, Transform};
    use crate::spatial::Ray;
    use approx::assert_relative_eq;

    struct Marker {
        base: DrawableBase,
    }

    impl Drawable for Marker {
        fn base(&self) -> &DrawableBase {
            &self.base
        }

        fn base_mut(&mut self) -> &mut DrawableBase {
            &mut self.base
        }
    }

    fn marker() -> Marker {
        Marker {
            base: DrawableBase::new(
                DrawableFlags::GEOMETRY,
                BoundingBox::from_center_half_size(Vec3::zeros(), 1.0),
            ),
        }
    }

    fn context(world_transform: Mat4) -> DrawableContext {
        let mut arena: SlotMap<DrawableId, ()> = SlotMap::with_key();
        let local_bounding_box = BoundingBox::from_center_half_size(Vec3::zeros(), 1.0);
        DrawableContext {
            id: arena.insert(()),
            node: None,
            world_transform,
            local_bounding_box,
            world_bounding_box: local_bounding_box.transformed(&world_transform),
        }
    }

    #[test]
    fn test_set_material_checks_range() {
        let mut drawable = marker();
        drawable.set_num_geometries(2);

        assert!(drawable.set_material(1, MaterialId(7)));
        assert_eq!(drawable.base().batches[1].material, Some(MaterialId(7)));
        assert!(!drawable.set_material(2, MaterialId(7)));
    }

    #[test]
    fn test_world_box_refresh_is_lazy() {
        let mut base = marker().base;
        let moved = Mat4::new_translation(&Vec3::new(5.0, 0.0, 0.0));

        assert_relative_eq!(base.refresh_world_box(&moved).center(), Vec3::new(5.0, 0.0, 0.0));
        assert!(!base.is_world_box_dirty());

        // Clean box ignores a different transform until flagged again
        assert_relative_eq!(base.refresh_world_box(&Mat4::identity()).center(), Vec3::new(5.0, 0.0, 0.0));
        base.set_local_bounding_box(BoundingBox::from_center_half_size(Vec3::zeros(), 2.0));
        assert_relative_eq!(base.refresh_world_box(&Mat4::identity()).max, Vec3::new(2.0, 2.0, 2.0));
    }

    #[test]
    fn test_update_batches_sets_distance_and_transform() {
        let mut drawable = marker();
        drawable.set_num_geometries(2);
        let camera = Camera::perspective(Vec3::new(0.0, 0.0, 10.0), 60.0, 1.0, 0.1, 100.0);
        let frame = FrameInfo { frame_number: 42, camera: Some(&camera), ..Default::default() };
        let transform = Mat4::new_translation(&Vec3::new(0.0, 0.0, 4.0));

        drawable.update_batches(&frame, &context(transform));

        let base = drawable.base();
        assert_relative_eq!(base.distance, 6.0);
        assert_eq!(base.view_frame_number, 42);
        for batch in &base.batches {
            assert_relative_eq!(batch.distance, 6.0);
            assert_relative_eq!(batch.world_transform, transform);
        }
        // Box size 2 on every axis gives a scale of 2
        assert_relative_eq!(base.lod_distance, 3.0, epsilon = 1e-5);
    }

    #[test]
    fn test_ray_hit_levels() {
        let drawable = marker();
        // Rotated 45 degrees: the world box is wider than the oriented box
        let transform = Transform {
            rotation: Quat::from_axis_angle(&Vec3::y_axis(), std::f32::consts::FRAC_PI_4),
            ..Default::default()
        }
        .to_matrix();
        let ctx = context(transform);
        let ray = Ray::new(Vec3::new(-10.0, 0.0, 0.0), Vec3::x());

        let mut results = Vec::new();
        let aabb = RayOctreeQuery::new(ray, 100.0);
        drawable.process_ray_query(&aabb, &ctx, &mut results);
        assert_relative_eq!(results[0].distance, 10.0 - std::f32::consts::SQRT_2, epsilon = 1e-4);

        results.clear();
        let obb = RayOctreeQuery::new(ray, 100.0).with_level(RayQueryLevel::Obb);
        drawable.process_ray_query(&obb, &ctx, &mut results);
        assert_relative_eq!(results[0].distance, 10.0 - std::f32::consts::SQRT_2, epsilon = 1e-4);
        assert_relative_eq!(results[0].position.x, -std::f32::consts::SQRT_2, epsilon = 1e-4);

        // A diagonal ray through the corner of the world box misses the oriented box
        let diagonal = Ray::new(Vec3::new(-10.0, 0.0, -8.0), Vec3::new(1.0, 0.0, 1.0));
        results.clear();
        drawable.process_ray_query(&RayOctreeQuery::new(diagonal, 100.0), &ctx, &mut results);
        assert_eq!(results.len(), 1);

        results.clear();
        let grazing = RayOctreeQuery::new(diagonal, 100.0).with_level(RayQueryLevel::Obb);
        drawable.process_ray_query(&grazing, &ctx, &mut results);
        assert!(results.is_empty());
    }
}
