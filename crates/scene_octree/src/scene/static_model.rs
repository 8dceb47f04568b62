//! Static model drawable
//!
//! Geometry with one batch per sub-mesh. Each batch has a list of LOD
//! geometries ordered by the distance at which they take over; the active
//! level is picked from the LOD distance computed in the batch update.

use super::drawable::{update_batches_default, Drawable, DrawableBase, DrawableContext, FrameInfo};
use crate::foundation::collections::GeometryId;
use crate::spatial::{BoundingBox, DrawableFlags};

/// One LOD level of a batch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometryLod {
    /// Geometry drawn at this level
    pub geometry: GeometryId,
    /// LOD distance from which this level is used
    pub lod_distance: f32,
}

impl GeometryLod {
    /// Level using `geometry` from `lod_distance` on
    pub fn new(geometry: GeometryId, lod_distance: f32) -> Self {
        Self { geometry, lod_distance }
    }
}

/// Drawable with per-batch LOD geometry
#[derive(Debug, Clone)]
pub struct StaticModel {
    base: DrawableBase,
    geometries: Vec<Vec<GeometryLod>>,
    lod_levels: Vec<usize>,
}

impl StaticModel {
    /// Create a model without geometry
    pub fn new(local_bounding_box: BoundingBox) -> Self {
        Self {
            base: DrawableBase::new(DrawableFlags::GEOMETRY, local_bounding_box),
            geometries: Vec::new(),
            lod_levels: Vec::new(),
        }
    }

    /// Create a model from per-batch LOD lists
    pub fn with_geometries(local_bounding_box: BoundingBox, geometries: Vec<Vec<GeometryLod>>) -> Self {
        let mut model = Self::new(local_bounding_box);
        model.set_geometries(geometries);
        model
    }

    /// Replace all batches; LOD lists are sorted by distance
    pub fn set_geometries(&mut self, geometries: Vec<Vec<GeometryLod>>) {
        self.set_num_geometries(geometries.len());
        for (batch, mut lods) in geometries.into_iter().enumerate() {
            lods.sort_by(|a, b| a.lod_distance.total_cmp(&b.lod_distance));
            self.base.batches[batch].geometry = lods.first().map(|lod| lod.geometry);
            self.geometries[batch] = lods;
            self.lod_levels[batch] = 0;
        }
    }

    /// LOD list of one batch
    pub fn geometry_lods(&self, batch: usize) -> Option<&[GeometryLod]> {
        self.geometries.get(batch).map(Vec::as_slice)
    }

    /// Currently selected LOD level of one batch
    pub fn lod_level(&self, batch: usize) -> Option<usize> {
        self.lod_levels.get(batch).copied()
    }

    fn calculate_lod_levels(&mut self) {
        let lod_distance = self.base.lod_distance;

        for (batch, lods) in self.geometries.iter().enumerate() {
            if lods.len() <= 1 {
                continue;
            }
            let level = lods
                .iter()
                .skip(1)
                .take_while(|lod| lod.lod_distance <= lod_distance)
                .count();

            if self.lod_levels[batch] != level {
                self.lod_levels[batch] = level;
                self.base.batches[batch].geometry = Some(lods[level].geometry);
            }
        }
    }
}

impl Drawable for StaticModel {
    fn base(&self) -> &DrawableBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut DrawableBase {
        &mut self.base
    }

    fn set_num_geometries(&mut self, count: usize) {
        self.base.batches.resize_with(count, Default::default);
        self.geometries.resize_with(count, Vec::new);
        self.lod_levels.resize(count, 0);
    }

    /// Out-of-range levels fall back to the batch's current geometry
    fn lod_geometry(&self, batch: usize, level: usize) -> Option<GeometryId> {
        let lods = self.geometries.get(batch)?;
        match lods.get(level) {
            Some(lod) => Some(lod.geometry),
            None => self.base.batches.get(batch).and_then(|batch| batch.geometry),
        }
    }

    fn update_batches(&mut self, frame: &FrameInfo<'_>, context: &DrawableContext) {
        update_batches_default(&mut self.base, frame, context);
        self.calculate_lod_levels();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::collections::{DrawableId, MaterialId, SlotMap};
    use crate::foundation::math::{Mat4, Vec3};
    use crate::scene::Camera;

    fn model() -> StaticModel {
        StaticModel::with_geometries(
            BoundingBox::from_center_half_size(Vec3::zeros(), 1.0),
            vec![
                vec![
                    GeometryLod::new(GeometryId(3), 50.0),
                    GeometryLod::new(GeometryId(1), 0.0),
                    GeometryLod::new(GeometryId(2), 20.0),
                ],
                vec![GeometryLod::new(GeometryId(9), 0.0)],
            ],
        )
    }

    fn context_at(z: f32) -> DrawableContext {
        let mut arena: SlotMap<DrawableId, ()> = SlotMap::with_key();
        let world_transform = Mat4::new_translation(&Vec3::new(0.0, 0.0, z));
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
    fn test_lod_lists_are_sorted() {
        let model = model();

        assert_eq!(model.base().batches.len(), 2);
        assert_eq!(model.lod_geometry(0, 0), Some(GeometryId(1)));
        assert_eq!(model.lod_geometry(0, 2), Some(GeometryId(3)));
        assert_eq!(model.lod_geometry(0, 7), Some(GeometryId(1)));
        assert_eq!(model.lod_geometry(5, 0), None);
    }

    #[test]
    fn test_lod_selection_follows_distance() {
        let mut model = model();
        let camera = Camera::perspective(Vec3::zeros(), 60.0, 1.0, 0.1, 1000.0);
        let frame = FrameInfo { camera: Some(&camera), ..Default::default() };

        // Box size 2 gives a scale of 2, so LOD distance is half the distance
        model.update_batches(&frame, &context_at(-10.0));
        assert_eq!(model.lod_level(0), Some(0));

        model.update_batches(&frame, &context_at(-60.0));
        assert_eq!(model.lod_level(0), Some(1));
        assert_eq!(model.base().batches[0].geometry, Some(GeometryId(2)));

        model.update_batches(&frame, &context_at(-200.0));
        assert_eq!(model.lod_level(0), Some(2));
        assert_eq!(model.base().batches[0].geometry, Some(GeometryId(3)));
        assert_eq!(model.base().batches[1].geometry, Some(GeometryId(9)));
    }

    #[test]
    fn test_material_slots() {
        let mut model = model();

        assert!(model.set_material(0, MaterialId(4)));
        assert!(!model.set_material(2, MaterialId(4)));
    }
}
