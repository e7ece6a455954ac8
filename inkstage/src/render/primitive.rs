//! # Primitive object renderers
//!
//! One renderer per live object, keyed 1:1 by the object's id, each owning a small
//! subtree of scene nodes. `update` is identity-gated: an un-forced update with a
//! pointer-identical state is a no-op - the primary work-avoidance mechanism, which
//! is sound because committed states are never mutated in place.
//!
//! Brush and eraser share geometry handling; the eraser only swaps the compositing
//! rule to [`CompositeMode::DestinationOut`]. Images are the one asynchronous
//! renderer - see [`ImageRenderer`] for the fetch/swap discipline.

use std::sync::Arc;

use inkstage_core::color::Color;
use inkstage_core::state::object::{ImageFilter, ImageRef, ObjectId, ObjectState};
use inkstage_core::units::Rect;

use crate::loader::BitmapLoader;
use crate::scene::{CompositeMode, Node, NodeId, NodeKind, SharedGraph};

/// Closed set of renderer kinds. Construction matches exhaustively on the object
/// kind; adding an object kind means adding an arm (and renderer) here.
pub enum PrimitiveRenderer {
    Stroke(StrokeRenderer),
    Rect(RectRenderer),
    Image(ImageRenderer),
}

impl PrimitiveRenderer {
    /// Build the renderer for `state`'s kind and attach its subtree topmost under
    /// `parent`. Geometry is filled in by the `update` the caller must follow with.
    pub fn attach(
        graph: &SharedGraph,
        parent: NodeId,
        state: &Arc<ObjectState>,
        loader: &BitmapLoader,
    ) -> Self {
        match &**state {
            ObjectState::BrushLine(_) => {
                Self::Stroke(StrokeRenderer::attach(graph, parent, state, false))
            }
            ObjectState::EraserLine(_) => {
                Self::Stroke(StrokeRenderer::attach(graph, parent, state, true))
            }
            ObjectState::Rect(_) => Self::Rect(RectRenderer::attach(graph, parent, state)),
            ObjectState::Image(_) => {
                Self::Image(ImageRenderer::attach(graph, parent, state, loader.clone()))
            }
        }
    }
    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.state().id()
    }
    #[must_use]
    pub fn state(&self) -> &Arc<ObjectState> {
        match self {
            Self::Stroke(r) => &r.state,
            Self::Rect(r) => &r.state,
            Self::Image(r) => &r.state,
        }
    }
    /// Root of this renderer's subtree, for paint-order bookkeeping.
    #[must_use]
    pub fn root_node(&self) -> NodeId {
        match self {
            Self::Stroke(r) => r.node,
            Self::Rect(r) => r.node,
            Self::Image(r) => r.group,
        }
    }
    /// Returns whether anything about the scene changed.
    pub fn update(&mut self, state: &Arc<ObjectState>, force: bool) -> bool {
        match self {
            Self::Stroke(r) => r.update(state, force),
            Self::Rect(r) => r.update(state, force),
            Self::Image(r) => r.update(state, force),
        }
    }
    /// Remove the subtree. Synchronous and final; in-flight work belonging to this
    /// renderer becomes a no-op.
    pub fn destroy(&mut self) {
        match self {
            Self::Stroke(r) => r.destroy(),
            Self::Rect(r) => r.destroy(),
            Self::Image(r) => r.destroy(),
        }
    }
    /// True when a geometry-only extent over this renderer is inaccurate: erasers
    /// subtract area, images may be transparent, clips cut visible area. Consumers
    /// must pixel-scan instead.
    #[must_use]
    pub fn defeats_geometry_extent(&self) -> bool {
        match &**self.state() {
            ObjectState::EraserLine(_) | ObjectState::Image(_) => true,
            ObjectState::BrushLine(line) => line.clip.is_some(),
            ObjectState::Rect(_) => false,
        }
    }
    /// Fast, shape-extent bounding box of this renderer's content.
    #[must_use]
    pub fn extent(&self) -> Rect {
        self.state().extent()
    }
}

// -- Strokes --------------------------------------------------------------------

pub struct StrokeRenderer {
    graph: SharedGraph,
    node: NodeId,
    state: Arc<ObjectState>,
}

impl StrokeRenderer {
    fn attach(graph: &SharedGraph, parent: NodeId, state: &Arc<ObjectState>, erase: bool) -> Self {
        let composite = if erase {
            CompositeMode::DestinationOut
        } else {
            CompositeMode::SourceOver
        };
        let node = graph.write().attach(
            parent,
            Node::new(NodeKind::Line {
                points: Vec::new(),
                width: 0.0,
                color: Color::TRANSPARENT,
                clip: None,
            })
            .with_composite(composite),
        );
        Self {
            graph: graph.clone(),
            node,
            state: state.clone(),
        }
    }
    fn update(&mut self, state: &Arc<ObjectState>, force: bool) -> bool {
        if !force && Arc::ptr_eq(state, &self.state) {
            return false;
        }
        let (points, width, color, clip) = match &**state {
            ObjectState::BrushLine(line) => (&line.points, line.width, line.color, line.clip),
            // Erasers only remove coverage; their color never shows. Alpha is what
            // drives the subtraction.
            ObjectState::EraserLine(line) => (&line.points, line.width, Color::BLACK, line.clip),
            // Ids are kind-stable and never reused, so a kind mismatch cannot
            // happen without a reconciler bug.
            _ => unreachable!("stroke renderer fed a {} state", state.kind().as_ref()),
        };
        let mut graph = self.graph.write();
        let Some(node) = graph.get_mut(self.node) else {
            return false;
        };
        node.kind = NodeKind::Line {
            points: points
                .iter()
                .map(|p| ultraviolet::Vec2::new(p[0], p[1]))
                .collect(),
            width,
            color,
            clip,
        };
        drop(graph);
        self.state = state.clone();
        true
    }
    fn destroy(&mut self) {
        self.graph.write().remove(self.node);
    }
}

// -- Rectangles -----------------------------------------------------------------

pub struct RectRenderer {
    graph: SharedGraph,
    node: NodeId,
    state: Arc<ObjectState>,
}

impl RectRenderer {
    fn attach(graph: &SharedGraph, parent: NodeId, state: &Arc<ObjectState>) -> Self {
        let node = graph.write().attach(
            parent,
            Node::new(NodeKind::Rect {
                rect: Rect::EMPTY,
                color: Color::TRANSPARENT,
            }),
        );
        Self {
            graph: graph.clone(),
            node,
            state: state.clone(),
        }
    }
    fn update(&mut self, state: &Arc<ObjectState>, force: bool) -> bool {
        if !force && Arc::ptr_eq(state, &self.state) {
            return false;
        }
        let ObjectState::Rect(shape) = &**state else {
            unreachable!("rect renderer fed a {} state", state.kind().as_ref());
        };
        let mut graph = self.graph.write();
        let Some(node) = graph.get_mut(self.node) else {
            return false;
        };
        node.kind = NodeKind::Rect {
            rect: shape.rect,
            color: shape.color,
        };
        drop(graph);
        self.state = state.clone();
        true
    }
    fn destroy(&mut self) {
        self.graph.write().remove(self.node);
    }
}

// -- Images ---------------------------------------------------------------------

pub const LOADING_TEXT: &str = "loading image";
pub const ERROR_TEXT: &str = "image failed to load";

const PLACEHOLDER_FILL: Color = Color::opaque(90, 90, 90);

/// Where an image renderer is in its content lifecycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImagePhase {
    /// Nothing fetched yet; neutral block + loading label shown.
    Placeholder,
    /// A fetch for this reference is in flight.
    Loading(ImageRef),
    /// This reference's bitmap is on screen.
    Loaded(ImageRef),
    /// This reference failed to load; error label shown.
    Errored(ImageRef),
}

/// Renderer for image objects: a placeholder that asynchronously swaps to the
/// fetched bitmap.
///
/// Fetches are never serialized against each other - only the *swap* is, behind a
/// `tokio::sync::Mutex`. Each fetch additionally captures a generation number and a
/// swap whose generation is no longer current is discarded, so the bitmap that
/// stays on screen is the newest *started* fetch that completed, and a completion
/// arriving after [`PrimitiveRenderer::destroy`] finds its nodes gone and does
/// nothing.
pub struct ImageRenderer {
    graph: SharedGraph,
    loader: BitmapLoader,
    state: Arc<ObjectState>,
    group: NodeId,
    shared: Arc<ImageShared>,
    nodes: ImageNodes,
}

#[derive(Copy, Clone)]
struct ImageNodes {
    group: NodeId,
    placeholder_rect: NodeId,
    placeholder_label: NodeId,
    image: NodeId,
}

struct ImageShared {
    phase: parking_lot::Mutex<ImagePhase>,
    generation: std::sync::atomic::AtomicU64,
    /// Serializes bitmap-swap commits, not fetches.
    swap: tokio::sync::Mutex<()>,
}

impl ImageRenderer {
    fn attach(
        graph: &SharedGraph,
        parent: NodeId,
        state: &Arc<ObjectState>,
        loader: BitmapLoader,
    ) -> Self {
        let nodes = {
            let mut write = graph.write();
            let group = write.attach(parent, Node::group(false));
            let placeholder_rect = write.attach(
                group,
                Node::new(NodeKind::Rect {
                    rect: Rect::EMPTY,
                    color: PLACEHOLDER_FILL,
                }),
            );
            let placeholder_label = write.attach(group, Node::label(LOADING_TEXT));
            let image = write.attach(
                group,
                Node::new(NodeKind::Image {
                    bitmap: None,
                    size: [0.0; 2],
                    offset: ultraviolet::Vec2::zero(),
                }),
            );
            write.get_mut(image).unwrap().visible = false;
            ImageNodes {
                group,
                placeholder_rect,
                placeholder_label,
                image,
            }
        };
        Self {
            graph: graph.clone(),
            loader,
            state: state.clone(),
            group: nodes.group,
            shared: Arc::new(ImageShared {
                phase: parking_lot::Mutex::new(ImagePhase::Placeholder),
                generation: std::sync::atomic::AtomicU64::new(0),
                swap: tokio::sync::Mutex::new(()),
            }),
            nodes,
        }
    }
    /// Current lifecycle phase (snapshot; may advance immediately after).
    #[must_use]
    pub fn phase(&self) -> ImagePhase {
        self.shared.phase.lock().clone()
    }
    fn update(&mut self, state: &Arc<ObjectState>, force: bool) -> bool {
        if !force && Arc::ptr_eq(state, &self.state) {
            return false;
        }
        let ObjectState::Image(object) = &**state else {
            unreachable!("image renderer fed a {} state", state.kind().as_ref());
        };
        let declared = [object.image.width as f32, object.image.height as f32];
        {
            let mut graph = self.graph.write();
            if !graph.contains(self.group) {
                // Destroyed; a late update has nothing to act on.
                return false;
            }
            if let Some(node) = graph.get_mut(self.nodes.placeholder_rect) {
                node.kind = NodeKind::Rect {
                    rect: Rect::new(0.0, 0.0, declared[0], declared[1]),
                    color: PLACEHOLDER_FILL,
                };
            }
            if let Some(node) = graph.get_mut(self.nodes.image) {
                if let NodeKind::Image { size, .. } = &mut node.kind {
                    *size = declared;
                }
            }
        }
        // Start a fetch only when the reference actually changed; a same-reference
        // update while loading must not double-fetch.
        let needs_fetch = match &*self.shared.phase.lock() {
            ImagePhase::Placeholder => true,
            ImagePhase::Loading(pending) => *pending != object.image,
            ImagePhase::Loaded(shown) => *shown != object.image,
            ImagePhase::Errored(failed) => *failed != object.image,
        };
        if needs_fetch {
            self.start_fetch(object.image.clone(), object.filters.to_vec());
        }
        self.state = state.clone();
        true
    }
    fn start_fetch(&self, reference: ImageRef, filters: Vec<ImageFilter>) {
        use std::sync::atomic::Ordering;

        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.shared.phase.lock() = ImagePhase::Loading(reference.clone());
        log::debug!("fetching bitmap {:?} (generation {generation})", reference.name);

        let graph = self.graph.clone();
        let loader = self.loader.clone();
        let shared = self.shared.clone();
        let nodes = self.nodes;
        tokio::task::spawn(async move {
            let result = loader.fetch(&reference, &filters).await;
            // Fetches race freely; commits are serialized here, and a commit whose
            // generation has been superseded is dropped unseen.
            let _swap = shared.swap.lock().await;
            if shared.generation.load(Ordering::SeqCst) != generation {
                log::trace!("dropping superseded bitmap {:?}", reference.name);
                return;
            }
            let mut graph = graph.write();
            if !graph.contains(nodes.group) {
                // Renderer destroyed while we were fetching.
                return;
            }
            match result {
                Ok(bitmap) => {
                    if let Some(node) = graph.get_mut(nodes.image) {
                        if let NodeKind::Image { bitmap: slot, .. } = &mut node.kind {
                            *slot = Some(Arc::new(bitmap));
                        }
                        node.visible = true;
                    }
                    graph.set_visible(nodes.placeholder_rect, false);
                    graph.set_visible(nodes.placeholder_label, false);
                    drop(graph);
                    *shared.phase.lock() = ImagePhase::Loaded(reference);
                }
                Err(e) => {
                    log::warn!("bitmap {:?} failed to load: {e}", reference.name);
                    if let Some(node) = graph.get_mut(nodes.placeholder_label) {
                        node.kind = NodeKind::Label {
                            text: ERROR_TEXT.to_owned(),
                        };
                        node.visible = true;
                    }
                    graph.set_visible(nodes.image, false);
                    graph.set_visible(nodes.placeholder_rect, true);
                    drop(graph);
                    *shared.phase.lock() = ImagePhase::Errored(reference);
                }
            }
        });
    }
    fn destroy(&mut self) {
        self.graph.write().remove(self.group);
    }
}
