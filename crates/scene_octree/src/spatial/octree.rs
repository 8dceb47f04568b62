//! Loose octree spatial partitioning structure
//!
//! Indexes drawables by their world-space bounding boxes. Octants are created
//! on demand when an occupant is small enough to descend and are deleted by
//! their parent as soon as their subtree becomes empty; the root is permanent.
//!
//! Moving occupants are not reinserted immediately. They are queued with
//! [`Octree::queue_update`] (or [`Octree::queue_update_threaded`] from worker
//! threads) and re-bucketed by [`Octree::update`] once per frame.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use thiserror::Error;

use super::octant::{Octant, NUM_OCTANTS, ROOT_INDEX};
use super::query::{
    DrawableFlags, OctreeQuery, RayOctreeQuery, RayQueryResult, SphereOctreeQuery,
};
use super::{BoundingBox, Intersection, Sphere};
use crate::config::{OctreeConfig, MAX_OCTREE_LEVELS};
use crate::foundation::collections::{DrawableId, OctantId, SecondaryMap, SlotMap};
use crate::foundation::math::Vec3;

/// Structural invariant violations reported by [`Octree::validate`]
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OctreeError {
    /// Stored subtree count differs from the actual one
    #[error("octant {0:?} stores a drawable count of {1} but holds {2}")]
    CountMismatch(OctantId, usize, usize),

    /// Pruning missed an empty branch
    #[error("non-root octant {0:?} is empty but still linked")]
    EmptyOctant(OctantId),

    /// Drawable listed by several octants
    #[error("drawable {0:?} is resident in more than one octant")]
    MultipleResidency(DrawableId),

    /// Occupant table disagrees with the octant lists
    #[error("drawable {0:?} points at octant {1:?} which does not hold it")]
    BrokenBackReference(DrawableId, OctantId),

    /// Child slot points at a missing octant or one with another parent
    #[error("octant {0:?} links to missing or mismatched child {1:?}")]
    BrokenChildLink(OctantId, OctantId),

    /// Leaked octants
    #[error("{0} octants are allocated but unreachable from the root")]
    Unreachable(usize),
}

/// Per-occupant record: where it lives and what it looks like to queries
#[derive(Debug)]
pub struct OctreeEntry {
    octant: OctantId,
    world_bounding_box: BoundingBox,
    flags: DrawableFlags,
    view_mask: u32,
    update_queued: AtomicBool,
}

impl OctreeEntry {
    /// Octant currently holding the occupant
    pub fn octant(&self) -> OctantId {
        self.octant
    }

    /// World bounds the occupant was last placed with
    pub fn world_bounding_box(&self) -> &BoundingBox {
        &self.world_bounding_box
    }

    /// Query filter flags
    pub fn flags(&self) -> DrawableFlags {
        self.flags
    }

    /// Query view mask
    pub fn view_mask(&self) -> u32 {
        self.view_mask
    }

    /// Whether the occupant waits in an update queue
    pub fn is_update_queued(&self) -> bool {
        self.update_queued.load(Ordering::Acquire)
    }
}

/// Residents of one octant, resolved against the occupant table
pub struct Candidates<'a> {
    ids: std::slice::Iter<'a, DrawableId>,
    entries: &'a SecondaryMap<DrawableId, OctreeEntry>,
}

impl<'a> Iterator for Candidates<'a> {
    type Item = (DrawableId, &'a OctreeEntry);

    fn next(&mut self) -> Option<Self::Item> {
        for &id in self.ids.by_ref() {
            if let Some(entry) = self.entries.get(id) {
                return Some((id, entry));
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, self.ids.size_hint().1)
    }
}

/// Loose octree over drawable bounding boxes
#[derive(Debug)]
pub struct Octree {
    octants: SlotMap<OctantId, Octant>,
    root: OctantId,
    num_levels: u32,
    entries: SecondaryMap<DrawableId, OctreeEntry>,
    update_queue: Vec<DrawableId>,
    threaded_queue: Mutex<Vec<DrawableId>>,
    threaded_update: AtomicBool,
}

impl Octree {
    /// Create an empty octree from a configuration
    pub fn new(config: &OctreeConfig) -> Self {
        Self::with_bounds(config.bounds(), config.num_levels)
    }

    /// Create an empty octree covering `bounds`
    pub fn with_bounds(bounds: BoundingBox, num_levels: u32) -> Self {
        let mut octants = SlotMap::with_key();
        let root = octants.insert(Octant::new(bounds, 0, None, ROOT_INDEX));
        Self {
            octants,
            root,
            num_levels: clamp_levels(num_levels),
            entries: SecondaryMap::new(),
            update_queue: Vec::new(),
            threaded_queue: Mutex::new(Vec::new()),
            threaded_update: AtomicBool::new(false),
        }
    }

    /// Rebuild the tree for new world bounds and depth
    ///
    /// All child octants are discarded and every occupant is moved to the
    /// root and queued, so the next [`update`](Self::update) redistributes
    /// them.
    pub fn set_size(&mut self, bounds: BoundingBox, num_levels: u32) {
        let root = self.root;
        let children: Vec<OctantId> = self.octants[root].children().collect();
        for child in children {
            self.delete_subtree(child);
        }

        let num_drawables = self.entries.len();
        if let Some(octant) = self.octants.get_mut(root) {
            octant.initialize(bounds);
            octant.children = [None; NUM_OCTANTS];
            octant.drawables = self.entries.keys().collect();
            octant.num_drawables = num_drawables;
        }
        self.num_levels = clamp_levels(num_levels);

        let ids: Vec<DrawableId> = self.entries.keys().collect();
        for id in ids {
            if let Some(entry) = self.entries.get_mut(id) {
                entry.octant = root;
            }
            self.queue_update(id);
        }

        log::debug!(
            "Octree resized to {:?}..{:?} with {} levels, {} drawables queued",
            bounds.min,
            bounds.max,
            self.num_levels,
            num_drawables
        );
    }

    /// Root octant id
    pub fn root(&self) -> OctantId {
        self.root
    }

    /// World box of the root octant
    pub fn world_bounding_box(&self) -> BoundingBox {
        self.octants[self.root].world_bounding_box
    }

    /// Maximum subdivision depth
    pub fn num_levels(&self) -> u32 {
        self.num_levels
    }

    /// Look up an octant
    pub fn octant(&self, id: OctantId) -> Option<&Octant> {
        self.octants.get(id)
    }

    /// Number of live octants, root included
    pub fn num_octants(&self) -> usize {
        self.octants.len()
    }

    /// Number of indexed drawables
    pub fn num_drawables(&self) -> usize {
        self.octants[self.root].num_drawables
    }

    /// Whether a drawable is indexed
    pub fn contains(&self, id: DrawableId) -> bool {
        self.entries.contains_key(id)
    }

    /// Octant holding a drawable
    pub fn octant_of(&self, id: DrawableId) -> Option<OctantId> {
        self.entries.get(id).map(|entry| entry.octant)
    }

    /// Occupant record of a drawable
    pub fn entry(&self, id: DrawableId) -> Option<&OctreeEntry> {
        self.entries.get(id)
    }

    /// Insert or move a drawable
    ///
    /// An already indexed drawable takes the new bounds and filter and is
    /// re-bucketed immediately.
    pub fn insert(&mut self, id: DrawableId, bounds: BoundingBox, flags: DrawableFlags, view_mask: u32) {
        if let Some(entry) = self.entries.get_mut(id) {
            entry.world_bounding_box = bounds;
        }
        self.insert_drawable(id, bounds);
        if let Some(entry) = self.entries.get_mut(id) {
            entry.flags = flags;
            entry.view_mask = view_mask;
        }
    }

    /// Remove a drawable; returns whether it was indexed
    pub fn remove(&mut self, id: DrawableId) -> bool {
        let Some(entry) = self.entries.remove(id) else {
            return false;
        };
        if entry.update_queued.load(Ordering::Acquire) {
            self.remove_from_queues(id);
        }
        self.remove_from_octant(entry.octant, id);
        true
    }

    /// Insert without going through the update queue
    ///
    /// For occupants that are not driven by scene nodes; they stay where
    /// they are put until moved with another call.
    pub fn add_manual_drawable(&mut self, id: DrawableId, bounds: BoundingBox, flags: DrawableFlags, view_mask: u32) {
        self.insert(id, bounds, flags, view_mask);
        log::trace!("Manual drawable {:?} placed in octant {:?}", id, self.octant_of(id));
    }

    /// Remove an occupant added with [`add_manual_drawable`](Self::add_manual_drawable)
    pub fn remove_manual_drawable(&mut self, id: DrawableId) -> bool {
        self.remove(id)
    }

    /// Change the query filter of an indexed drawable
    pub fn set_filter(&mut self, id: DrawableId, flags: DrawableFlags, view_mask: u32) -> bool {
        match self.entries.get_mut(id) {
            Some(entry) => {
                entry.flags = flags;
                entry.view_mask = view_mask;
                true
            }
            None => false,
        }
    }

    /// Queue a drawable for reinsertion on the next update
    ///
    /// Routed to the secondary queue while a threaded update is running.
    /// Queuing twice before an update has no further effect.
    pub fn queue_update(&mut self, id: DrawableId) {
        if self.threaded_update.load(Ordering::Acquire) {
            self.queue_update_threaded(id);
            return;
        }
        let Some(entry) = self.entries.get(id) else {
            return;
        };
        if !entry.update_queued.swap(true, Ordering::AcqRel) {
            self.update_queue.push(id);
        }
    }

    /// Queue a drawable from a worker thread during the threaded update
    pub fn queue_update_threaded(&self, id: DrawableId) {
        let Some(entry) = self.entries.get(id) else {
            return;
        };
        if !entry.update_queued.swap(true, Ordering::AcqRel) {
            self.threaded_queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(id);
        }
    }

    /// Drop a drawable from the pending updates
    pub fn cancel_update(&mut self, id: DrawableId) {
        if let Some(entry) = self.entries.get(id) {
            entry.update_queued.store(false, Ordering::Release);
        }
        self.remove_from_queues(id);
    }

    /// Enter or leave the threaded update phase
    ///
    /// Leaving the phase moves everything queued by worker threads into the
    /// main queue.
    pub fn set_threaded_update(&mut self, enabled: bool) {
        self.threaded_update.store(enabled, Ordering::Release);
        if !enabled {
            self.merge_threaded_queue();
        }
    }

    /// Whether the threaded update phase is active
    pub fn is_threaded_update(&self) -> bool {
        self.threaded_update.load(Ordering::Acquire)
    }

    /// Number of drawables waiting for reinsertion
    pub fn num_pending_updates(&self) -> usize {
        self.update_queue.len()
            + self.threaded_queue.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Reinsert queued drawables whose bounds no longer fit their octant
    ///
    /// `resolve` returns the current world box of a queued drawable. Returns
    /// the number of drawables that moved.
    pub fn update<F>(&mut self, mut resolve: F) -> usize
    where
        F: FnMut(DrawableId) -> BoundingBox,
    {
        self.merge_threaded_queue();
        let queue = std::mem::take(&mut self.update_queue);
        let queued = queue.len();
        let mut moved = 0;

        for id in queue {
            let Some(entry) = self.entries.get_mut(id) else {
                continue;
            };
            entry.update_queued.store(false, Ordering::Release);
            let bounds = resolve(id);
            entry.world_bounding_box = bounds;

            let Some(octant) = self.octants.get(entry.octant) else {
                continue;
            };
            let inside = octant.culling_box.is_inside(&bounds) == Intersection::Inside;
            let fits = octant.check_drawable_fit(&bounds, self.num_levels);
            let reinsert = if octant.is_root() {
                inside && !fits
            } else {
                !inside || !fits
            };

            if reinsert {
                let before = entry.octant;
                self.insert_drawable(id, bounds);
                if self.octant_of(id) != Some(before) {
                    moved += 1;
                }
            }
        }

        log::trace!("Octree update: {} queued, {} moved", queued, moved);
        moved
    }

    /// Run a containment query
    pub fn get_drawables<Q: OctreeQuery + ?Sized>(&self, query: &Q) -> Vec<DrawableId> {
        let mut results = Vec::new();
        self.get_drawables_into(query, &mut results);
        results
    }

    /// Run a containment query, appending to `results`
    pub fn get_drawables_into<Q: OctreeQuery + ?Sized>(&self, query: &Q, results: &mut Vec<DrawableId>) {
        self.collect_drawables(self.root, query, false, results);
    }

    /// Drawables whose bounds touch a sphere
    pub fn get_objects_in_range(&self, center: Vec3, radius: f32) -> Vec<DrawableId> {
        self.get_drawables(&SphereOctreeQuery::new(Sphere::new(center, radius)))
    }

    /// Every ray hit, nearest first
    ///
    /// `hit` contributes zero or more results for each drawable that passes
    /// the query's filter inside the visited octants.
    pub fn raycast<F>(&self, query: &RayOctreeQuery, mut hit: F) -> Vec<RayQueryResult>
    where
        F: FnMut(DrawableId, &RayOctreeQuery, &mut Vec<RayQueryResult>),
    {
        let mut candidates = Vec::new();
        self.collect_ray_candidates(self.root, query, &mut candidates);

        let mut results = Vec::new();
        for id in candidates {
            hit(id, query, &mut results);
        }
        results.retain(|result| result.distance < query.max_distance);
        results.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        results
    }

    /// Nearest ray hit
    ///
    /// Candidates are visited in order of their bounding box distance and
    /// the search stops once no remaining box can beat the best hit.
    pub fn raycast_single<F>(&self, query: &RayOctreeQuery, mut hit: F) -> Option<RayQueryResult>
    where
        F: FnMut(DrawableId, &RayOctreeQuery, &mut Vec<RayQueryResult>),
    {
        let mut candidates = Vec::new();
        self.collect_ray_candidates(self.root, query, &mut candidates);

        let mut ordered: Vec<(f32, DrawableId)> = candidates
            .into_iter()
            .filter_map(|id| {
                let entry = self.entries.get(id)?;
                let distance = query.ray.hit_distance(&entry.world_bounding_box)?;
                (distance < query.max_distance).then_some((distance, id))
            })
            .collect();
        ordered.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut best: Option<RayQueryResult> = None;
        let mut scratch = Vec::new();
        for (lower_bound, id) in ordered {
            if best.is_some_and(|best| lower_bound >= best.distance) {
                break;
            }

            scratch.clear();
            hit(id, query, &mut scratch);
            for result in scratch.drain(..) {
                let closer = best.map_or(true, |best| result.distance < best.distance);
                if result.distance < query.max_distance && closer {
                    best = Some(result);
                }
            }
        }
        best
    }

    /// Check every structural invariant
    pub fn validate(&self) -> Result<(), OctreeError> {
        let mut seen: SecondaryMap<DrawableId, OctantId> = SecondaryMap::new();
        let mut reachable = 0;
        let mut stack = vec![self.root];

        while let Some(id) = stack.pop() {
            reachable += 1;
            let octant = &self.octants[id];

            if !octant.is_root() && octant.num_drawables == 0 {
                return Err(OctreeError::EmptyOctant(id));
            }

            let mut actual = octant.drawables.len();
            for (index, child) in octant.children.iter().enumerate() {
                let Some(child) = *child else { continue };
                match self.octants.get(child) {
                    Some(c) if c.parent == Some(id) && c.index == index && c.level == octant.level + 1 => {
                        actual += c.num_drawables;
                        stack.push(child);
                    }
                    _ => return Err(OctreeError::BrokenChildLink(id, child)),
                }
            }
            if actual != octant.num_drawables {
                return Err(OctreeError::CountMismatch(id, octant.num_drawables, actual));
            }

            for &drawable in &octant.drawables {
                if seen.insert(drawable, id).is_some() {
                    return Err(OctreeError::MultipleResidency(drawable));
                }
                match self.entries.get(drawable) {
                    Some(entry) if entry.octant == id => {}
                    _ => return Err(OctreeError::BrokenBackReference(drawable, id)),
                }
            }
        }

        for (drawable, entry) in &self.entries {
            if !seen.contains_key(drawable) {
                return Err(OctreeError::BrokenBackReference(drawable, entry.octant));
            }
        }

        if reachable != self.octants.len() {
            return Err(OctreeError::Unreachable(self.octants.len() - reachable));
        }
        Ok(())
    }

    /// Place a drawable, descending from the root and creating octants
    fn insert_drawable(&mut self, id: DrawableId, bounds: BoundingBox) {
        let target = self.find_octant(bounds);
        let old = self.entries.get(id).map(|entry| entry.octant);

        if old == Some(target) {
            return;
        }

        // Add first: the old octant may be pruned when its count hits zero
        self.add_to_octant(target, id);
        match self.entries.get_mut(id) {
            Some(entry) => entry.octant = target,
            None => {
                self.entries.insert(
                    id,
                    OctreeEntry {
                        octant: target,
                        world_bounding_box: bounds,
                        flags: DrawableFlags::default(),
                        view_mask: super::query::DEFAULT_VIEW_MASK,
                        update_queued: AtomicBool::new(false),
                    },
                );
            }
        }
        if let Some(old) = old {
            self.remove_from_octant(old, id);
        }
    }

    /// Octant a box belongs to, creating missing children on the way
    fn find_octant(&mut self, bounds: BoundingBox) -> OctantId {
        let mut current = self.root;
        loop {
            let octant = &self.octants[current];
            let insert_here = if octant.is_root() {
                octant.culling_box.is_inside(&bounds) != Intersection::Inside
                    || octant.check_drawable_fit(&bounds, self.num_levels)
            } else {
                octant.check_drawable_fit(&bounds, self.num_levels)
            };
            if insert_here {
                return current;
            }

            let index = octant.child_index(bounds.center());
            current = self.get_or_create_child(current, index);
        }
    }

    fn get_or_create_child(&mut self, parent: OctantId, index: usize) -> OctantId {
        let octant = &self.octants[parent];
        if let Some(child) = octant.children[index] {
            return child;
        }

        let child = Octant::new(octant.child_bounds(index), octant.level + 1, Some(parent), index);
        let child = self.octants.insert(child);
        self.octants[parent].children[index] = Some(child);
        child
    }

    fn add_to_octant(&mut self, octant: OctantId, id: DrawableId) {
        self.octants[octant].drawables.push(id);

        let mut current = Some(octant);
        while let Some(octant_id) = current {
            let octant = &mut self.octants[octant_id];
            octant.num_drawables += 1;
            current = octant.parent;
        }
    }

    fn remove_from_octant(&mut self, octant: OctantId, id: DrawableId) {
        let Some(holder) = self.octants.get_mut(octant) else {
            return;
        };
        let Some(position) = holder.drawables.iter().position(|&d| d == id) else {
            return;
        };
        holder.drawables.swap_remove(position);

        let mut current = Some(octant);
        while let Some(octant_id) = current {
            let Some(octant) = self.octants.get_mut(octant_id) else {
                break;
            };
            octant.num_drawables -= 1;
            let (parent, index, empty) = (octant.parent, octant.index, octant.num_drawables == 0);

            if let Some(parent) = parent {
                if empty {
                    self.octants[parent].children[index] = None;
                    self.delete_subtree(octant_id);
                }
            }
            current = parent;
        }
    }

    /// Free an octant and all of its descendants
    fn delete_subtree(&mut self, octant: OctantId) {
        let mut stack = vec![octant];
        while let Some(id) = stack.pop() {
            if let Some(removed) = self.octants.remove(id) {
                stack.extend(removed.children());
            }
        }
    }

    fn collect_drawables<Q: OctreeQuery + ?Sized>(
        &self,
        id: OctantId,
        query: &Q,
        mut inside: bool,
        results: &mut Vec<DrawableId>,
    ) {
        let octant = &self.octants[id];

        if !octant.is_root() {
            match query.test_octant(&octant.culling_box, inside) {
                Intersection::Inside => inside = true,
                Intersection::Outside => return,
                Intersection::Intersects => {}
            }
        }

        if !octant.drawables.is_empty() {
            let candidates = Candidates { ids: octant.drawables.iter(), entries: &self.entries };
            query.test_drawables(candidates, inside, results);
        }

        for child in octant.children() {
            self.collect_drawables(child, query, inside, results);
        }
    }

    fn collect_ray_candidates(&self, id: OctantId, query: &RayOctreeQuery, candidates: &mut Vec<DrawableId>) {
        let octant = &self.octants[id];

        match query.ray.hit_distance(&octant.culling_box) {
            Some(distance) if distance < query.max_distance => {}
            _ => return,
        }

        candidates.extend(
            octant
                .drawables
                .iter()
                .filter(|&&d| self.entries.get(d).is_some_and(|entry| query.accepts(entry))),
        );

        for child in octant.children() {
            self.collect_ray_candidates(child, query, candidates);
        }
    }

    fn merge_threaded_queue(&mut self) {
        let pending = std::mem::take(
            self.threaded_queue.get_mut().unwrap_or_else(PoisonError::into_inner),
        );
        self.update_queue.extend(pending);
    }

    fn remove_from_queues(&mut self, id: DrawableId) {
        self.update_queue.retain(|&queued| queued != id);
        self.threaded_queue
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|&queued| queued != id);
    }
}

impl Default for Octree {
    fn default() -> Self {
        Self::new(&OctreeConfig::default())
    }
}

fn clamp_levels(num_levels: u32) -> u32 {
    let clamped = num_levels.clamp(1, MAX_OCTREE_LEVELS);
    if clamped != num_levels {
        log::warn!("Octree levels {} clamped to {}", num_levels, clamped);
    }
    clamped
}
