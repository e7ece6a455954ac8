//! Interface of the transform/selection-handle collaborator.
//!
//! The engine does not move or resize entities itself; it reports when bounds went
//! stale and forwards position updates, and the collaborator owns the handles,
//! drag logic, and bounding-box math. Only the call contract is fixed here.

use inkstage_core::units::Rect;

use crate::scene::{Graph, NodeId};

pub trait TransformController: Send {
    /// The entity moved in the document.
    fn update_position(&mut self, position: [f32; 2]);
    /// Content changed; bounds should be recomputed *lazily*, at the collaborator's
    /// convenience.
    fn request_bounds_recalculation(&mut self);
    /// Recompute bounds now. Called once on an entity's first render.
    fn update_bounds(&mut self);
    /// Create the collaborator's scene nodes (handles, outlines) under `parent`,
    /// topmost in the entity's subtree, and return them.
    fn nodes_to_attach(&mut self, graph: &mut Graph, parent: NodeId) -> Vec<NodeId>;
    /// Current selection extent in canvas units; the region `rasterize()` resolves.
    fn relative_rect(&self) -> Rect;
    /// Tear down collaborator-owned nodes. Called before the entity removes its
    /// subtree.
    fn destroy(&mut self, graph: &mut Graph);
}
