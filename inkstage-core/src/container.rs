//! Mutation interface of the external state container.
//!
//! The engine never edits a snapshot. It *requests* changes through this trait and
//! waits for the container to publish the next snapshot. All requests are
//! fire-and-forget: the container owns ordering, dedup, and undo.

use crate::state::object::{BrushLine, EraserLine, ImageObject, RectShape};
use crate::state::EntityId;

pub trait StateWriter: Send + Sync {
    /// Append a committed brush line to the entity's object list.
    fn add_brush_line(&self, entity: EntityId, line: BrushLine);
    /// Append a committed eraser line to the entity's object list.
    fn add_eraser_line(&self, entity: EntityId, line: EraserLine);
    /// Append a committed rectangle to the entity's object list.
    fn add_rect(&self, entity: EntityId, rect: RectShape);
    /// Replace the entity's content with a single rasterized image placed at
    /// `position`. Irreversible from the engine's perspective.
    fn rasterize_entity(&self, entity: EntityId, image: ImageObject, position: [f32; 2]);
}
