//! A single cell of the loose octree
//!
//! Octants live in the octree's arena and refer to each other by
//! [`OctantId`]. Each one keeps two boxes: the world box it was carved out of
//! and a "loose" culling box, expanded by its full half-size on every side,
//! which is what fit, containment and pruning decisions are made against.
//! Measured against the parent, a child's culling box reaches half the
//! parent's half-size past the parent's world box.

use super::BoundingBox;
use crate::foundation::collections::{DrawableId, OctantId};
use crate::foundation::math::Vec3;

/// Number of children per octant
pub const NUM_OCTANTS: usize = 8;

/// Sibling index reported by the root octant
pub const ROOT_INDEX: usize = usize::MAX;

/// Octree cell
#[derive(Debug, Clone)]
pub struct Octant {
    pub(crate) world_bounding_box: BoundingBox,
    pub(crate) culling_box: BoundingBox,
    pub(crate) center: Vec3,
    pub(crate) half_size: Vec3,
    pub(crate) children: [Option<OctantId>; NUM_OCTANTS],
    pub(crate) parent: Option<OctantId>,
    pub(crate) drawables: Vec<DrawableId>,
    pub(crate) num_drawables: usize,
    pub(crate) level: u32,
    pub(crate) index: usize,
}

impl Octant {
    /// Create an empty octant covering `bounds`
    pub fn new(bounds: BoundingBox, level: u32, parent: Option<OctantId>, index: usize) -> Self {
        let mut octant = Self {
            world_bounding_box: bounds,
            culling_box: bounds,
            center: Vec3::zeros(),
            half_size: Vec3::zeros(),
            children: [None; NUM_OCTANTS],
            parent,
            drawables: Vec::new(),
            num_drawables: 0,
            level,
            index,
        };
        octant.initialize(bounds);
        octant
    }

    /// Reset the geometry of this octant to cover `bounds`
    pub(crate) fn initialize(&mut self, bounds: BoundingBox) {
        self.world_bounding_box = bounds;
        self.center = bounds.center();
        self.half_size = bounds.extents();
        self.culling_box = bounds.expanded(self.half_size);
    }

    /// World box this octant subdivides
    pub fn world_bounding_box(&self) -> &BoundingBox {
        &self.world_bounding_box
    }

    /// Loose box used for fitting and culling
    pub fn culling_box(&self) -> &BoundingBox {
        &self.culling_box
    }

    /// Center of the world box
    pub fn center(&self) -> Vec3 {
        self.center
    }

    /// Half size of the world box
    pub fn half_size(&self) -> Vec3 {
        self.half_size
    }

    /// Subdivision level; the root is level 0
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Index among the parent's children, [`ROOT_INDEX`] for the root
    pub fn index(&self) -> usize {
        self.index
    }

    /// Parent octant
    pub fn parent(&self) -> Option<OctantId> {
        self.parent
    }

    /// Child slot contents
    pub fn child(&self, index: usize) -> Option<OctantId> {
        self.children.get(index).copied().flatten()
    }

    /// Existing children
    pub fn children(&self) -> impl Iterator<Item = OctantId> + '_ {
        self.children.iter().flatten().copied()
    }

    /// Drawables resident in this octant only
    pub fn drawables(&self) -> &[DrawableId] {
        &self.drawables
    }

    /// Drawables in this octant and all of its descendants
    pub fn num_drawables(&self) -> usize {
        self.num_drawables
    }

    /// Whether this is the root octant
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// World box of the child at `index`, made by bisecting this octant
    pub fn child_bounds(&self, index: usize) -> BoundingBox {
        let mut min = self.world_bounding_box.min;
        let mut max = self.world_bounding_box.max;

        for (axis, bit) in [1, 2, 4].into_iter().enumerate() {
            if index & bit != 0 {
                min[axis] = self.center[axis];
            } else {
                max[axis] = self.center[axis];
            }
        }

        BoundingBox::new(min, max)
    }

    /// Child index for a box centered at `point`
    pub fn child_index(&self, point: Vec3) -> usize {
        let x = if point.x < self.center.x { 0 } else { 1 };
        let y = if point.y < self.center.y { 0 } else { 2 };
        let z = if point.z < self.center.z { 0 } else { 4 };
        x + y + z
    }

    /// Check whether a box belongs at this octant rather than in a child
    ///
    /// A box fits here when the octant is at the deepest allowed level, when
    /// the box is at least half the octant on any axis, or when it would not
    /// fit inside the culling box of the child it would go to.
    pub fn check_drawable_fit(&self, aabb: &BoundingBox, num_levels: u32) -> bool {
        let size = aabb.size();

        if self.level >= num_levels
            || size.x >= self.half_size.x
            || size.y >= self.half_size.y
            || size.z >= self.half_size.z
        {
            return true;
        }

        let world = &self.world_bounding_box;
        let margin = self.half_size * 0.5;
        (0..3).any(|axis| {
            aabb.min[axis] <= world.min[axis] - margin[axis]
                || aabb.max[axis] >= world.max[axis] + margin[axis]
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn root() -> Octant {
        Octant::new(
            BoundingBox::new(Vec3::new(-100.0, -100.0, -100.0), Vec3::new(100.0, 100.0, 100.0)),
            0,
            None,
            ROOT_INDEX,
        )
    }

    #[test]
    fn test_culling_box_is_loose() {
        let octant = root();
        assert_relative_eq!(octant.culling_box().min, Vec3::new(-200.0, -200.0, -200.0));
        assert_relative_eq!(octant.culling_box().max, Vec3::new(200.0, 200.0, 200.0));
        assert!(octant.is_root());
    }

    #[test]
    fn test_child_index_and_bounds_agree() {
        let octant = root();

        for index in 0..NUM_OCTANTS {
            let bounds = octant.child_bounds(index);
            assert_eq!(octant.child_index(bounds.center()), index);
            assert_relative_eq!(bounds.size(), Vec3::new(100.0, 100.0, 100.0));
        }

        // Points on the center plane go to the upper half
        assert_eq!(octant.child_index(Vec3::zeros()), 7);
        assert_eq!(octant.child_index(Vec3::new(-1.0, 0.0, -1.0)), 2);
    }

    #[test]
    fn test_fit_by_size() {
        let octant = root();
        let small = BoundingBox::from_center_half_size(Vec3::new(50.0, 50.0, 50.0), 1.0);
        let large = BoundingBox::from_center_half_size(Vec3::new(50.0, 50.0, 50.0), 60.0);

        assert!(!octant.check_drawable_fit(&small, 8));
        assert!(octant.check_drawable_fit(&large, 8));
    }

    #[test]
    fn test_fit_at_max_level() {
        let octant = root();
        let small = BoundingBox::from_center_half_size(Vec3::zeros(), 1.0);

        assert!(octant.check_drawable_fit(&small, 0));
    }

    #[test]
    fn test_fit_when_poking_out_of_child_culling_box() {
        let octant = root();
        // Small, but reaches past the expanded edge of any child
        let edge = BoundingBox::new(Vec3::new(145.0, 0.0, 0.0), Vec3::new(155.0, 10.0, 10.0));

        assert!(octant.check_drawable_fit(&edge, 8));
    }

    #[test]
    fn test_child_culling_box_matches_fit_margin() {
        let parent = root();
        let margin = parent.half_size() * 0.5;
        let outer = parent.world_bounding_box().expanded(margin);

        for index in 0..NUM_OCTANTS {
            let child = Octant::new(parent.child_bounds(index), 1, None, index);
            assert_relative_eq!(child.half_size(), margin);

            let culling = child.culling_box();
            for axis in 0..3 {
                if index & (1 << axis) != 0 {
                    assert_relative_eq!(culling.max[axis], outer.max[axis]);
                    assert_relative_eq!(culling.min[axis], parent.center()[axis] - margin[axis]);
                } else {
                    assert_relative_eq!(culling.min[axis], outer.min[axis]);
                    assert_relative_eq!(culling.max[axis], parent.center()[axis] + margin[axis]);
                }
            }
        }

        // Just inside the child culling box goes down a level
        let inside = BoundingBox::new(Vec3::new(140.0, 0.0, 0.0), Vec3::new(149.0, 10.0, 10.0));
        assert!(!parent.check_drawable_fit(&inside, 8));
    }
}
