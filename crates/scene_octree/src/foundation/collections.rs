//! Arena handle types
//!
//! Nodes, drawables and octants live in slot maps. Every cross reference
//! between them (parent links, listener lists, octant back references) is a
//! key into one of these arenas, never an owning pointer.

pub use slotmap::{SecondaryMap, SlotMap};

slotmap::new_key_type! {
    /// Handle to a scene node
    pub struct NodeId;

    /// Handle to a drawable owned by a scene
    pub struct DrawableId;

    /// Handle to one cell of an octree
    pub struct OctantId;
}

/// Opaque reference to geometry owned by the renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GeometryId(pub u32);

/// Opaque reference to a material owned by the renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaterialId(pub u32);
