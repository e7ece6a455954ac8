//! # Entity state
//!
//! Immutable per-entity snapshots, as handed out by the external state container.
//! A snapshot is a value - the container never mutates one after publishing it, so
//! `Arc::ptr_eq` on the snapshot (and on its `objects` list) is a sound and
//! *required* "anything changed?" test. The engine skips all work on identical
//! identity.

pub mod object;

use std::sync::Arc;

use crate::color::Color;
pub use object::{ObjectId, ObjectState};

pub type EntityId = crate::Id<EntityState>;

/// A snapshot of one entity's document state.
pub type Snapshot = Arc<EntityState>;

#[derive(Clone, Debug)]
pub struct EntityState {
    /// Committed objects, in paint order.
    ///
    /// Shared so that an unchanged list keeps its identity across snapshots even
    /// when sibling fields change.
    pub objects: Arc<[Arc<ObjectState>]>,
    /// Entity offset in canvas units. Consumed by the transform collaborator, not
    /// applied by the rendering engine itself.
    pub position: [f32; 2],
    pub is_enabled: bool,
}

impl EntityState {
    /// An empty, enabled entity at the origin.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            objects: Arc::from([]),
            position: [0.0; 2],
            is_enabled: true,
        }
    }
    /// Next snapshot with a replaced object list. The list identity changes; the
    /// surviving object `Arc`s keep theirs.
    #[must_use]
    pub fn with_objects(&self, objects: impl Into<Arc<[Arc<ObjectState>]>>) -> Self {
        Self {
            objects: objects.into(),
            ..self.clone()
        }
    }
    #[must_use]
    pub fn with_enabled(&self, is_enabled: bool) -> Self {
        Self {
            is_enabled,
            ..self.clone()
        }
    }
    #[must_use]
    pub fn with_position(&self, position: [f32; 2]) -> Self {
        Self {
            position,
            ..self.clone()
        }
    }
}

impl Default for EntityState {
    fn default() -> Self {
        Self::empty()
    }
}

/// What an entity is *for*. Mask-like kinds get the uniform-opacity compositing
/// treatment; raster layers paint their objects as-is.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, strum::AsRefStr, strum::EnumIter)]
pub enum EntityKind {
    RasterLayer,
    InpaintMask,
    RegionalGuidance,
}

impl EntityKind {
    /// Does this kind synthesize a compositing rect over its objects?
    #[must_use]
    pub fn is_masked(self) -> bool {
        match self {
            Self::RasterLayer => false,
            Self::InpaintMask | Self::RegionalGuidance => true,
        }
    }
}

/// Per-entity rendering configuration. For mask-like kinds, `fill` is the uniform
/// color every covered pixel ends up with and `opacity` its uniform alpha,
/// independent of how many strokes overlap.
#[derive(Copy, Clone, Debug)]
pub struct EntityConfig {
    pub kind: EntityKind,
    pub fill: Color,
    pub opacity: f32,
}

impl EntityConfig {
    #[must_use]
    pub fn raster_layer() -> Self {
        Self {
            kind: EntityKind::RasterLayer,
            fill: Color::TRANSPARENT,
            opacity: 1.0,
        }
    }
    #[must_use]
    pub fn inpaint_mask(fill: Color) -> Self {
        Self {
            kind: EntityKind::InpaintMask,
            fill,
            opacity: 0.5,
        }
    }
    #[must_use]
    pub fn regional_guidance(fill: Color) -> Self {
        Self {
            kind: EntityKind::RegionalGuidance,
            fill,
            opacity: 0.35,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn with_objects_preserves_member_identity() {
        let object = Arc::new(ObjectState::Rect(object::RectShape {
            id: ObjectId::fresh(),
            rect: crate::units::Rect::new(0.0, 0.0, 1.0, 1.0),
            color: Color::BLACK,
        }));
        let a = EntityState::empty().with_objects(vec![object.clone()]);
        let b = a.with_objects(vec![object.clone(), object.clone()]);
        assert!(!Arc::ptr_eq(&a.objects, &b.objects));
        assert!(Arc::ptr_eq(&a.objects[0], &b.objects[0]));
    }
    #[test]
    fn mask_kinds() {
        assert!(!EntityKind::RasterLayer.is_masked());
        assert!(EntityKind::InpaintMask.is_masked());
        assert!(EntityKind::RegionalGuidance.is_masked());
    }
}
