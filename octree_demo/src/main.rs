//! Octree Demo
//!
//! Headless run of the scene octree:
//! - Ships fly around a bounded world and bounce off its walls
//! - A wingman node follows each ship as a child with its own drawable
//! - Each frame runs the update phase, a camera frustum query and a ray pick
//! - Octree statistics are logged every few frames
//!
//! Pass a `.toml` or `.ron` scene configuration path to override the defaults.

use scene_octree::config::{Config, OctreeConfig, SceneConfig};
use scene_octree::foundation::collections::{DrawableId, GeometryId, NodeId};
use scene_octree::foundation::logging;
use scene_octree::foundation::math::Vec3;
use scene_octree::scene::{Camera, FrameInfo, GeometryLod, Scene, StaticModel};
use scene_octree::spatial::{BoundingBox, DrawableFlags, RayOctreeQuery};

// World bounds: -WORLD_HALF_SIZE to +WORLD_HALF_SIZE on each axis
const WORLD_HALF_SIZE: f32 = 100.0;
const OCTREE_LEVELS: u32 = 6;

const NUM_SMALL_SHIPS: usize = 40;
const NUM_LARGE_SHIPS: usize = 6;
const SMALL_SHIP_SIZE: f32 = 0.8;
const LARGE_SHIP_SIZE: f32 = 6.0;
const SMALL_SHIP_SPEED: f32 = 12.0;
const LARGE_SHIP_SPEED: f32 = 4.0;

const FRAME_COUNT: u32 = 300;
const TIME_STEP: f32 = 1.0 / 60.0;
const STATS_INTERVAL: u32 = 60;

struct Ship {
    node: NodeId,
    drawable: DrawableId,
    velocity: Vec3,
}

/// Small xorshift generator so runs are repeatable
struct Rng(u32);

impl Rng {
    fn next_f32(&mut self) -> f32 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 17;
        self.0 ^= self.0 << 5;
        (self.0 % 10_000) as f32 / 10_000.0
    }

    fn range(&mut self, min: f32, max: f32) -> f32 {
        min + (max - min) * self.next_f32()
    }

    fn direction(&mut self) -> Vec3 {
        Vec3::new(self.range(-1.0, 1.0), self.range(-1.0, 1.0), self.range(-1.0, 1.0))
            .try_normalize(f32::EPSILON)
            .unwrap_or_else(Vec3::x)
    }
}

fn ship_model(size: f32) -> StaticModel {
    StaticModel::with_geometries(
        BoundingBox::from_center_half_size(Vec3::zeros(), size * 0.5),
        vec![vec![
            GeometryLod::new(GeometryId(0), 0.0),
            GeometryLod::new(GeometryId(1), 40.0),
        ]],
    )
}

fn spawn_ship(scene: &mut Scene, rng: &mut Rng, name: &str, size: f32, speed: f32) -> Result<Ship, Box<dyn std::error::Error>> {
    let limit = WORLD_HALF_SIZE - size;
    let node = scene.create_child(scene.root(), name)?;
    scene.set_position(
        node,
        Vec3::new(rng.range(-limit, limit), rng.range(-limit, limit), rng.range(-limit, limit)),
    )?;

    let drawable = scene.create_drawable(ship_model(size));
    scene.attach_drawable(node, drawable)?;

    // Wingman trails the ship as a child node
    let wingman = scene.create_child(node, format!("{}_wingman", name))?;
    scene.set_position(wingman, Vec3::new(0.0, size, -2.0 * size))?;
    let wingman_model = scene.create_drawable(ship_model(size * 0.5));
    scene.attach_drawable(wingman, wingman_model)?;

    Ok(Ship {
        node,
        drawable,
        velocity: rng.direction() * speed,
    })
}

fn move_ship(scene: &mut Scene, ship: &mut Ship, time_step: f32) -> Result<(), Box<dyn std::error::Error>> {
    let Some(position) = scene.node(ship.node).map(|node| node.position()) else {
        return Ok(());
    };
    let mut next = position + ship.velocity * time_step;

    for axis in 0..3 {
        if next[axis].abs() > WORLD_HALF_SIZE {
            ship.velocity[axis] = -ship.velocity[axis];
            next[axis] = next[axis].clamp(-WORLD_HALF_SIZE, WORLD_HALF_SIZE);
        }
    }
    scene.set_position(ship.node, next)?;
    Ok(())
}

fn log_stats(scene: &Scene, frame: u32, moved: usize, visible: usize) {
    let octree = scene.octree();
    log::info!(
        "Frame {}: {} drawables, {} octants, {} moved, {} visible",
        frame,
        octree.num_drawables(),
        octree.num_octants(),
        moved,
        visible
    );
    if let Err(err) = octree.validate() {
        log::error!("Octree invariant broken: {}", err);
    }
}

fn load_config() -> Result<SceneConfig, Box<dyn std::error::Error>> {
    match std::env::args().nth(1) {
        Some(path) => Ok(SceneConfig::load_from_file(path)?),
        None => Ok(SceneConfig::new().with_octree(OctreeConfig::cube(WORLD_HALF_SIZE, OCTREE_LEVELS))),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    logging::init_with_level(&config.log_level);

    log::info!("=== Octree Demo ===");
    let mut scene = Scene::new(config)?;
    let mut rng = Rng(0x9e37_79b9);

    let mut ships = Vec::with_capacity(NUM_SMALL_SHIPS + NUM_LARGE_SHIPS);
    for i in 0..NUM_SMALL_SHIPS {
        ships.push(spawn_ship(&mut scene, &mut rng, &format!("small_{}", i), SMALL_SHIP_SIZE, SMALL_SHIP_SPEED)?);
    }
    for i in 0..NUM_LARGE_SHIPS {
        ships.push(spawn_ship(&mut scene, &mut rng, &format!("large_{}", i), LARGE_SHIP_SIZE, LARGE_SHIP_SPEED)?);
    }
    log::info!("Spawned {} ships ({} drawables)", ships.len(), scene.num_drawables());

    let mut camera = Camera::perspective(Vec3::new(0.0, 60.0, 180.0), 60.0, 16.0 / 9.0, 0.1, 500.0);
    camera.look_at(Vec3::zeros(), Vec3::y());

    for frame_number in 1..=FRAME_COUNT {
        for ship in &mut ships {
            move_ship(&mut scene, ship, TIME_STEP)?;
        }

        let frame = FrameInfo {
            frame_number,
            time_step: TIME_STEP,
            view_size: [1280, 720],
            camera: Some(&camera),
        };
        let moved = scene.update(&frame);
        let visible = scene.update_batches(&frame);

        if frame_number % STATS_INTERVAL == 0 {
            log_stats(&scene, frame_number, moved, visible.len());

            if let Some(ray) = camera.screen_to_world_ray(0.0, 0.0) {
                let query = RayOctreeQuery::new(ray, camera.far).with_filter(DrawableFlags::GEOMETRY, u32::MAX);
                match scene.raycast_single(&query) {
                    Some(hit) => log::info!("Center pick: {:?} at distance {:.2}", hit.node, hit.distance),
                    None => log::info!("Center pick: nothing"),
                }
            }
        }
    }

    // Tear down the first large ship and its wingman
    if let Some(ship) = ships
        .iter()
        .find(|ship| scene.node(ship.node).is_some_and(|node| node.name().starts_with("large")))
    {
        scene.remove_node(ship.node)?;
        log::info!("Removed ship node {:?} with drawable {:?}", ship.node, ship.drawable);
    }
    scene.update(&FrameInfo::default());
    log_stats(&scene, FRAME_COUNT, 0, 0);

    log::info!("Demo complete");
    Ok(())
}
