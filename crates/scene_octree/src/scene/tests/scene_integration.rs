//! Integration tests for the scene graph and its octree
//!
//! Exercises node transforms, drawable registration and the deferred octree
//! update together through the public `Scene` API.

use crate::config::{OctreeConfig, SceneConfig};
use crate::foundation::collections::{DrawableId, GeometryId, NodeId};
use crate::foundation::math::{Vec3, TransformSpace};
use crate::scene::{
    Camera, Drawable, DrawableBase, FrameInfo, GeometryLod, HierarchyError, Scene, SceneError,
    StaticModel,
};
use crate::spatial::{BoundingBox, DrawableFlags, Ray, RayOctreeQuery};
use approx::assert_relative_eq;

fn sequential_scene() -> Scene {
    Scene::new(SceneConfig::new().with_threaded_update(false)).unwrap()
}

fn cube(half_size: f32) -> BoundingBox {
    BoundingBox::from_center_half_size(Vec3::zeros(), half_size)
}

/// Node under the root at `position` carrying a unit model
fn place_model(scene: &mut Scene, name: &str, position: Vec3) -> (NodeId, DrawableId) {
    let node = scene.create_child(scene.root(), name).unwrap();
    scene.set_position(node, position).unwrap();
    let drawable = scene.create_drawable(StaticModel::new(cube(1.0)));
    scene.attach_drawable(node, drawable).unwrap();
    (node, drawable)
}

/// Drawable whose update hook grows its local box once
struct Grower {
    base: DrawableBase,
    target: Option<BoundingBox>,
}

impl Drawable for Grower {
    fn base(&self) -> &DrawableBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut DrawableBase {
        &mut self.base
    }

    fn update(&mut self, _frame: &FrameInfo<'_>) -> bool {
        match self.target.take() {
            Some(bounds) => {
                self.base.set_local_bounding_box(bounds);
                true
            }
            None => false,
        }
    }
}

#[test]
fn test_chain_world_position() {
    let mut scene = sequential_scene();
    let a = scene.create_child(scene.root(), "A").unwrap();
    let b = scene.create_child(a, "B").unwrap();
    let c = scene.create_child(b, "C").unwrap();

    scene.set_position(a, Vec3::new(10.0, 0.0, 0.0)).unwrap();
    scene.set_position(b, Vec3::new(0.0, 5.0, 0.0)).unwrap();
    scene.set_position(c, Vec3::new(0.0, 0.0, 1.0)).unwrap();

    assert_relative_eq!(scene.world_position(c).unwrap(), Vec3::new(10.0, 5.0, 1.0), epsilon = 1e-5);

    scene.translate(a, Vec3::new(0.0, 0.0, -1.0), TransformSpace::Parent).unwrap();
    assert_relative_eq!(scene.world_position(c).unwrap(), Vec3::new(10.0, 5.0, 0.0), epsilon = 1e-5);
}

#[test]
fn test_range_query_around_origin() {
    let mut scene = sequential_scene();
    let (_, drawable) = place_model(&mut scene, "box", Vec3::zeros());

    assert_eq!(scene.get_objects_in_range(Vec3::zeros(), 5.0), vec![drawable]);
    assert!(scene.get_objects_in_range(Vec3::new(2000.0, 0.0, 0.0), 5.0).is_empty());
}

#[test]
fn test_cycle_rejection_keeps_topology() {
    let mut scene = sequential_scene();
    let a = scene.create_child(scene.root(), "A").unwrap();
    let b = scene.create_child(a, "B").unwrap();
    let c = scene.create_child(b, "C").unwrap();

    let result = scene.add_child(c, a);
    assert!(matches!(
        result,
        Err(SceneError::Hierarchy(HierarchyError::Cycle { parent, child })) if parent == c && child == a
    ));

    assert_eq!(scene.node(a).unwrap().parent(), Some(scene.root()));
    assert_eq!(scene.node(b).unwrap().parent(), Some(a));
    assert_eq!(scene.node(c).unwrap().parent(), Some(b));
    assert!(scene.node(c).unwrap().children().is_empty());
}

#[test]
fn test_range_results_ignore_insertion_order() {
    let positions: Vec<Vec3> = (0..40)
        .map(|i| {
            let f = i as f32;
            Vec3::new((f * 37.0) % 90.0 - 45.0, (f * 13.0) % 60.0 - 30.0, (f * 7.0) % 50.0 - 25.0)
        })
        .collect();

    let names_in_range = |order: &[usize]| {
        let mut scene = sequential_scene();
        for &i in order {
            place_model(&mut scene, &format!("n{}", i), positions[i]);
        }

        let mut names: Vec<String> = scene
            .get_objects_in_range(Vec3::new(5.0, 0.0, 0.0), 30.0)
            .into_iter()
            .filter_map(|id| {
                let node = scene.drawable(id)?.base().node()?;
                Some(scene.node(node)?.name().to_string())
            })
            .collect();
        names.sort();
        names
    };

    let forward: Vec<usize> = (0..positions.len()).collect();
    let shuffled: Vec<usize> = (0..positions.len()).map(|i| (i * 17) % positions.len()).collect();

    let expected = names_in_range(&forward);
    assert!(!expected.is_empty());
    assert_eq!(names_in_range(&forward.iter().rev().copied().collect::<Vec<_>>()), expected);
    assert_eq!(names_in_range(&shuffled), expected);
}

#[test]
fn test_orphaned_drawable_is_not_indexed_until_attached() {
    let mut scene = sequential_scene();
    let orphan = scene.create_node("orphan");
    let drawable = scene.create_drawable(StaticModel::new(cube(1.0)));

    scene.attach_drawable(orphan, drawable).unwrap();
    scene.set_drawable_enabled(drawable, true).unwrap();
    assert!(!scene.octree().contains(drawable));
    assert!(scene.get_objects_in_range(Vec3::zeros(), 5.0).is_empty());

    let root = scene.root();
    scene.add_child(root, orphan).unwrap();
    assert_eq!(scene.get_objects_in_range(Vec3::zeros(), 5.0), vec![drawable]);
}

#[test]
fn test_moved_node_is_reinserted_on_update() {
    let mut scene = sequential_scene();
    let (node, drawable) = place_model(&mut scene, "mover", Vec3::zeros());
    let target = Vec3::new(500.0, 500.0, 500.0);

    scene.set_position(node, target).unwrap();
    assert_eq!(scene.octree().num_pending_updates(), 1);
    // Index keeps the old bounds until the deferred update runs
    assert_eq!(scene.get_objects_in_range(Vec3::zeros(), 2.0), vec![drawable]);

    let moved = scene.update(&FrameInfo::default());

    assert_eq!(moved, 1);
    assert!(scene.get_objects_in_range(Vec3::zeros(), 2.0).is_empty());
    assert_eq!(scene.get_objects_in_range(target, 2.0), vec![drawable]);
    assert!(scene.octree().validate().is_ok());
}

#[test]
fn test_child_drawables_follow_parent_move() {
    let mut scene = sequential_scene();
    let (parent, _) = place_model(&mut scene, "parent", Vec3::zeros());
    let child = scene.create_child(parent, "child").unwrap();
    scene.set_position(child, Vec3::new(0.0, 10.0, 0.0)).unwrap();
    let drawable = scene.create_drawable(StaticModel::new(cube(1.0)));
    scene.attach_drawable(child, drawable).unwrap();
    scene.update(&FrameInfo::default());

    scene.set_position(parent, Vec3::new(-300.0, 0.0, 0.0)).unwrap();
    scene.update(&FrameInfo::default());

    let bounds = scene.world_bounding_box(drawable).unwrap();
    assert_relative_eq!(bounds.center(), Vec3::new(-300.0, 10.0, 0.0), epsilon = 1e-4);
    assert!(scene.get_objects_in_range(Vec3::new(-300.0, 10.0, 0.0), 0.5).contains(&drawable));
}

#[test]
fn test_threaded_update_requeues_grown_drawable() {
    let config = SceneConfig::new()
        .with_threaded_update(true)
        .with_octree(OctreeConfig::cube(1000.0, 8));
    let mut scene = Scene::new(config).unwrap();

    let node = scene.create_child(scene.root(), "grower").unwrap();
    scene.set_position(node, Vec3::new(100.0, 100.0, 100.0)).unwrap();
    let drawable = scene.create_drawable(Grower {
        base: DrawableBase::new(DrawableFlags::GEOMETRY, cube(0.5)),
        target: Some(cube(600.0)),
    });
    scene.attach_drawable(node, drawable).unwrap();

    let root = scene.octree().root();
    assert_ne!(scene.octree().octant_of(drawable), Some(root));

    let moved = scene.update(&FrameInfo::default());

    assert_eq!(moved, 1);
    assert_eq!(scene.octree().octant_of(drawable), Some(root));
    assert!(!scene.octree().is_threaded_update());
    assert_eq!(scene.octree().num_pending_updates(), 0);

    // Nothing changes on the following frame
    assert_eq!(scene.update(&FrameInfo::default()), 0);
}

#[test]
fn test_raycast_through_scene() {
    let mut scene = sequential_scene();
    let (_, near) = place_model(&mut scene, "near", Vec3::new(0.0, 0.0, -10.0));
    let (_, far) = place_model(&mut scene, "far", Vec3::new(0.0, 0.0, -20.0));
    place_model(&mut scene, "aside", Vec3::new(50.0, 0.0, -10.0));

    let query = RayOctreeQuery::new(Ray::new(Vec3::zeros(), -Vec3::z()), 100.0);

    let hits = scene.raycast(&query);
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].drawable, near);
    assert_eq!(hits[1].drawable, far);
    assert_relative_eq!(hits[0].distance, 9.0, epsilon = 1e-4);
    assert_relative_eq!(hits[0].normal, Vec3::z(), epsilon = 1e-4);

    let single = scene.raycast_single(&query).unwrap();
    assert_eq!(single.drawable, near);

    let short = RayOctreeQuery::new(Ray::new(Vec3::zeros(), -Vec3::z()), 5.0);
    assert!(scene.raycast(&short).is_empty());
    assert!(scene.raycast_single(&short).is_none());
}

#[test]
fn test_ray_queries_agree_while_moves_are_pending() {
    let mut scene = sequential_scene();
    let (_, near) = place_model(&mut scene, "near", Vec3::new(0.0, 0.0, -10.0));
    let (far_node, far) = place_model(&mut scene, "far", Vec3::new(0.0, 0.0, -20.0));
    scene.update(&FrameInfo::default());

    scene.set_position(far_node, Vec3::new(0.0, 0.0, -5.0)).unwrap();
    let query = RayOctreeQuery::new(Ray::new(Vec3::zeros(), -Vec3::z()), 100.0);

    // Both queries still see the indexed placement
    let view: &Scene = &scene;
    let hits = view.raycast(&query);
    let single = view.raycast_single(&query).unwrap();
    assert_eq!(hits[0].drawable, near);
    assert_eq!(single.drawable, near);
    assert_relative_eq!(single.distance, hits[0].distance, epsilon = 1e-5);
    assert_relative_eq!(single.distance, 9.0, epsilon = 1e-4);

    scene.update(&FrameInfo::default());
    let hits = scene.raycast(&query);
    let single = scene.raycast_single(&query).unwrap();
    assert_eq!(hits[0].drawable, far);
    assert_eq!(single.drawable, far);
    assert_relative_eq!(single.distance, 4.0, epsilon = 1e-4);
}

#[test]
fn test_reattach_to_resolved_node_reinserts() {
    let mut scene = sequential_scene();
    let (_, drawable) = place_model(&mut scene, "a", Vec3::zeros());
    scene.update(&FrameInfo::default());

    let b = scene.create_child(scene.root(), "b").unwrap();
    scene.set_position(b, Vec3::new(500.0, 0.0, 0.0)).unwrap();
    assert_relative_eq!(scene.world_position(b).unwrap(), Vec3::new(500.0, 0.0, 0.0));

    scene.attach_drawable(b, drawable).unwrap();
    assert_eq!(scene.octree().num_pending_updates(), 1);

    scene.update(&FrameInfo::default());
    assert_eq!(scene.get_objects_in_range(Vec3::new(500.0, 0.0, 0.0), 2.0), vec![drawable]);
    assert!(scene.get_objects_in_range(Vec3::zeros(), 2.0).is_empty());
    assert!(scene.octree().validate().is_ok());
}

#[test]
fn test_detached_manual_drawable_uses_local_box() {
    let mut scene = sequential_scene();
    let (_, drawable) = place_model(&mut scene, "holder", Vec3::new(300.0, 0.0, 0.0));
    scene.insert_manual(drawable).unwrap();
    scene.update(&FrameInfo::default());

    scene.detach_drawable(drawable).unwrap();
    assert!(scene.octree().contains(drawable));
    assert_eq!(scene.octree().num_pending_updates(), 1);

    scene.update(&FrameInfo::default());
    assert_eq!(scene.get_objects_in_range(Vec3::zeros(), 2.0), vec![drawable]);
    assert!(scene.get_objects_in_range(Vec3::new(300.0, 0.0, 0.0), 2.0).is_empty());
}

#[test]
fn test_update_batches_visits_visible_drawables() {
    let mut scene = sequential_scene();
    let (_, visible) = place_model(&mut scene, "visible", Vec3::zeros());
    let (_, hidden) = place_model(&mut scene, "hidden", Vec3::new(0.0, 0.0, 40.0));
    scene.drawable_mut(visible).unwrap().set_num_geometries(1);

    let camera = Camera::perspective(Vec3::new(0.0, 0.0, 20.0), 60.0, 1.0, 0.1, 100.0);
    let frame = FrameInfo {
        frame_number: 7,
        camera: Some(&camera),
        ..Default::default()
    };

    let visited = scene.update_batches(&frame);

    assert_eq!(visited, vec![visible]);
    assert!(!visited.contains(&hidden));
    let base = scene.drawable(visible).unwrap().base();
    assert_relative_eq!(base.distance, 20.0, epsilon = 1e-4);
    assert_relative_eq!(base.batches[0].distance, 20.0, epsilon = 1e-4);
    assert_eq!(base.view_frame_number, 7);
}

#[test]
fn test_static_model_lod_through_scene() {
    let mut scene = sequential_scene();
    let node = scene.create_child(scene.root(), "model").unwrap();
    let drawable = scene.create_drawable(StaticModel::with_geometries(
        cube(1.0),
        vec![vec![GeometryLod::new(GeometryId(1), 0.0), GeometryLod::new(GeometryId(2), 30.0)]],
    ));
    scene.attach_drawable(node, drawable).unwrap();

    let mut camera = Camera::perspective(Vec3::new(0.0, 0.0, 10.0), 60.0, 1.0, 0.1, 1000.0);
    scene.update_batches(&FrameInfo { camera: Some(&camera), ..Default::default() });
    assert_eq!(scene.drawable(drawable).unwrap().base().batches[0].geometry, Some(GeometryId(1)));

    camera.set_position(Vec3::new(0.0, 0.0, 200.0));
    scene.update_batches(&FrameInfo { camera: Some(&camera), ..Default::default() });
    assert_eq!(scene.drawable(drawable).unwrap().base().batches[0].geometry, Some(GeometryId(2)));
}

#[test]
fn test_octree_stays_consistent_under_churn() {
    let mut scene = sequential_scene();
    let mut placed: Vec<(NodeId, DrawableId)> = (0..30)
        .map(|i| place_model(&mut scene, &format!("n{}", i), Vec3::new(i as f32 * 3.0, 0.0, 0.0)))
        .collect();

    let mut seed = 0x2545_f491_u32;
    let mut next = move || {
        seed ^= seed << 13;
        seed ^= seed >> 17;
        seed ^= seed << 5;
        seed
    };

    for frame in 0..20 {
        for &(node, _) in &placed {
            let r = next();
            let position = Vec3::new(
                (r % 1800) as f32 - 900.0,
                ((r >> 8) % 1800) as f32 - 900.0,
                ((r >> 16) % 1800) as f32 - 900.0,
            );
            scene.set_position(node, position).unwrap();
        }
        if frame % 5 == 4 {
            let (node, _) = placed.remove(0);
            scene.remove_node(node).unwrap();
        }
        scene.update(&FrameInfo::default());
        assert!(scene.octree().validate().is_ok());
    }

    assert_eq!(scene.octree().num_drawables(), placed.len());
}
