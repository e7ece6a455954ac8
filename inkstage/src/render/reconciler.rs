//! # Object renderer
//!
//! Reconciles one entity's committed object list (plus its draft buffer) against
//! the set of live primitive renderers: renderers are created lazily on first
//! encounter, reused as long as their id stays in the list, and destroyed exactly
//! once when it vanishes. Paint order is list order, buffer always last.
//!
//! Mask-like entities additionally own the *compositing rect*: painting N
//! semi-transparent shapes directly would darken every overlap, but a mask must
//! read at one uniform opacity however many strokes cover a pixel. So shapes paint
//! fully opaque inside the entity's isolated group and a full-viewport rect is
//! painted over them with [`CompositeMode::SourceIn`] - clipped to exactly the
//! shapes' silhouette, at exactly the configured opacity. The rect lives in the
//! same coordinate space as the shapes, so it must re-cover the screen on every
//! viewport change, not just on content change.

use std::sync::Arc;

use inkstage_core::bitmap::{BitmapCategory, BitmapService, EncodedBitmap};
use inkstage_core::container::StateWriter;
use inkstage_core::state::object::{BrushLine, EraserLine, ImageObject, ImageRef, RectShape};
use inkstage_core::state::{EntityConfig, EntityId, ObjectId, ObjectState};
use inkstage_core::units::Rect;

use super::primitive::PrimitiveRenderer;
use crate::loader::BitmapLoader;
use crate::scene::{raster, CompositeMode, Node, NodeId, NodeKind, SharedGraph};
use crate::viewport::ViewportTransform;

pub struct ObjectRenderer {
    entity: EntityId,
    graph: SharedGraph,
    writer: Arc<dyn StateWriter>,
    loader: BitmapLoader,
    /// Isolated group holding every renderer subtree (and the compositing rect).
    group: NodeId,
    /// Present iff the entity's kind is mask-like.
    compositing_rect: Option<NodeId>,
    renderers: hashbrown::HashMap<ObjectId, PrimitiveRenderer>,
    /// Paint order of the committed set, as of the last `render`.
    committed_order: Vec<ObjectId>,
    buffer: Option<BufferSlot>,
}

struct BufferSlot {
    state: Arc<ObjectState>,
    renderer: PrimitiveRenderer,
}

impl ObjectRenderer {
    pub fn new(
        entity: EntityId,
        config: EntityConfig,
        graph: &SharedGraph,
        parent: NodeId,
        writer: Arc<dyn StateWriter>,
        service: Arc<dyn BitmapService>,
    ) -> Self {
        let mut write = graph.write();
        let group = write.attach(parent, Node::group(true));
        let compositing_rect = config.kind.is_masked().then(|| {
            write.attach(
                group,
                Node::new(NodeKind::Rect {
                    rect: Rect::EMPTY,
                    color: config.fill.modulate_alpha(config.opacity),
                })
                .with_composite(CompositeMode::SourceIn),
            )
        });
        drop(write);
        Self {
            entity,
            graph: graph.clone(),
            writer,
            loader: BitmapLoader::new(service),
            group,
            compositing_rect,
            renderers: hashbrown::HashMap::new(),
            committed_order: Vec::new(),
            buffer: None,
        }
    }

    #[must_use]
    pub fn group(&self) -> NodeId {
        self.group
    }

    /// Reconcile against `objects`. Returns whether anything in the scene changed.
    pub fn render(&mut self, objects: &[Arc<ObjectState>]) -> bool {
        let mut changed = false;

        let mut keep: hashbrown::HashSet<ObjectId> = objects.iter().map(|s| s.id()).collect();
        if let Some(buffer) = &self.buffer {
            keep.insert(buffer.state.id());
        }
        self.renderers.retain(|id, renderer| {
            if keep.contains(id) {
                true
            } else {
                log::debug!("object {id} left the list; destroying its renderer");
                renderer.destroy();
                changed = true;
                false
            }
        });

        for state in objects {
            let id = state.id();
            let first = !self.renderers.contains_key(&id);
            if first {
                let renderer =
                    PrimitiveRenderer::attach(&self.graph, self.group, state, &self.loader);
                self.renderers.insert(id, renderer);
            }
            // Unwrap: present by construction just above.
            changed |= self.renderers.get_mut(&id).unwrap().update(state, first);
        }

        // The draft always paints last, so an in-progress stroke is never occluded
        // by committed content.
        if let Some(buffer) = &mut self.buffer {
            changed |= buffer.renderer.update(&buffer.state, true);
        }

        self.committed_order = objects.iter().map(|s| s.id()).collect();
        self.restack();
        changed
    }

    /// Replace the draft buffer and force-render it. Returns whether a render
    /// occurred (it always does - the buffer is never identity-skipped).
    pub fn set_buffer(&mut self, state: Arc<ObjectState>) -> bool {
        let reuse = self
            .buffer
            .as_ref()
            .is_some_and(|slot| slot.state.id() == state.id());
        if reuse {
            // Unwrap: checked above.
            let slot = self.buffer.as_mut().unwrap();
            slot.state = state;
            slot.renderer.update(&slot.state, true);
        } else {
            if let Some(mut old) = self.buffer.take() {
                old.renderer.destroy();
            }
            let renderer = PrimitiveRenderer::attach(&self.graph, self.group, &state, &self.loader);
            let mut slot = BufferSlot { state, renderer };
            slot.renderer.update(&slot.state, true);
            self.buffer = Some(slot);
        }
        self.restack();
        true
    }

    /// Drop the draft without committing (cancel).
    pub fn clear_buffer(&mut self) {
        if let Some(mut slot) = self.buffer.take() {
            slot.renderer.destroy();
            self.restack();
        }
    }

    /// Commit the draft to the state container and clear it. The committed copy
    /// gets a fresh id so downstream caches keyed by id re-evaluate.
    ///
    /// No-op without a buffer. An image draft has no "add" mutation; that request
    /// is an integration bug, logged and skipped without touching state.
    pub fn commit_buffer(&mut self) {
        let Some(slot) = &self.buffer else {
            return;
        };
        match &*slot.state {
            ObjectState::BrushLine(line) => self.writer.add_brush_line(
                self.entity,
                BrushLine {
                    id: ObjectId::fresh(),
                    ..line.clone()
                },
            ),
            ObjectState::EraserLine(line) => self.writer.add_eraser_line(
                self.entity,
                EraserLine {
                    id: ObjectId::fresh(),
                    ..line.clone()
                },
            ),
            ObjectState::Rect(rect) => self.writer.add_rect(
                self.entity,
                RectShape {
                    id: ObjectId::fresh(),
                    ..rect.clone()
                },
            ),
            other @ ObjectState::Image(_) => {
                log::warn!(
                    "refusing to commit a {} draft for {}; no such mutation",
                    other.kind().as_ref(),
                    self.entity
                );
                return;
            }
        }
        // Unwrap: still set, nothing above could take it.
        let mut slot = self.buffer.take().unwrap();
        slot.renderer.destroy();
        self.restack();
    }

    #[must_use]
    pub fn has_buffer(&self) -> bool {
        self.buffer.is_some()
    }
    /// Anything paintable at all, committed or draft.
    #[must_use]
    pub fn has_objects(&self) -> bool {
        !self.renderers.is_empty() || self.buffer.is_some()
    }

    fn live_renderers(&self) -> impl Iterator<Item = &PrimitiveRenderer> {
        self.renderers
            .values()
            .chain(self.buffer.as_ref().map(|slot| &slot.renderer))
    }

    /// True when a geometry-only bounding box would be wrong for the current
    /// content (erasers, images, clipped strokes) and the consumer should pixel-scan.
    #[must_use]
    pub fn needs_pixel_extent_computation(&self) -> bool {
        self.live_renderers()
            .any(PrimitiveRenderer::defeats_geometry_extent)
    }

    /// Fast analytic bounding box over all live content; the path chosen when
    /// [`Self::needs_pixel_extent_computation`] is false. `None` when empty.
    #[must_use]
    pub fn geometry_extent(&self) -> Option<Rect> {
        let mut extent: Option<Rect> = None;
        for renderer in self.live_renderers() {
            let e = renderer.extent();
            if e.is_empty() {
                continue;
            }
            extent = Some(match extent {
                Some(acc) => acc.union(&e),
                None => e,
            });
        }
        extent
    }

    /// Re-cover the visible viewport with the compositing rect. Called on every
    /// viewport change; content changes don't matter to it. No-op for kinds
    /// without one.
    ///
    /// # Panics
    /// If this entity *should* have a compositing rect but its node is gone -
    /// that's a construction-order bug, not a runtime condition.
    pub fn align_compositing_rect(&self, viewport: &ViewportTransform) {
        let Some(rect_id) = self.compositing_rect else {
            return;
        };
        let visible = viewport.visible_canvas_rect();
        let mut graph = self.graph.write();
        let node = graph
            .get_mut(rect_id)
            .unwrap_or_else(|| panic!("compositing rect for {} vanished", self.entity));
        let NodeKind::Rect { rect, .. } = &mut node.kind else {
            panic!("compositing rect for {} is not a rect node", self.entity);
        };
        *rect = visible;
    }

    /// Flatten current content over `region` into a single uploaded image: render
    /// the subtree to pixels, upload, force-render the result on top, and report
    /// the replacement to the state container. Undo is the container's concern.
    pub async fn rasterize(&mut self, region: Rect) -> anyhow::Result<ImageObject> {
        let pixels = {
            let graph = self.graph.read();
            raster::rasterize(&graph, self.group, region)
        };
        let (width, height) = (pixels.width(), pixels.height());
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgba8(pixels).write_to(
            &mut std::io::Cursor::new(&mut bytes),
            image::ImageFormat::Png,
        )?;
        let generated = ImageRef::generate(width, height);
        let reference = self
            .loader
            .service()
            .upload_bitmap(
                EncodedBitmap::new(bytes),
                &generated.name,
                BitmapCategory::General,
                true,
            )
            .await?;
        log::debug!("rasterized {} into {:?}", self.entity, reference.name);

        let object = ImageObject {
            id: ObjectId::fresh(),
            image: reference,
            filters: smallvec::SmallVec::new(),
        };
        let state = Arc::new(ObjectState::Image(object.clone()));
        let id = state.id();
        let renderer = PrimitiveRenderer::attach(&self.graph, self.group, &state, &self.loader);
        self.renderers.insert(id, renderer);
        self.committed_order.push(id);
        // Unwrap: just inserted.
        self.renderers.get_mut(&id).unwrap().update(&state, true);
        self.restack();

        self.writer
            .rasterize_entity(self.entity, object.clone(), region.position());
        Ok(object)
    }

    /// Destroy every renderer, then the group subtree (compositing rect included).
    pub fn destroy(mut self) {
        for (_, mut renderer) in self.renderers.drain() {
            renderer.destroy();
        }
        if let Some(mut slot) = self.buffer.take() {
            slot.renderer.destroy();
        }
        self.graph.write().remove(self.group);
    }

    /// Committed objects first in list order, then the draft, then the compositing
    /// rect on the very top.
    fn restack(&self) {
        let mut order: Vec<NodeId> = self
            .committed_order
            .iter()
            .filter_map(|id| self.renderers.get(id).map(PrimitiveRenderer::root_node))
            .collect();
        if let Some(buffer) = &self.buffer {
            order.push(buffer.renderer.root_node());
        }
        if let Some(rect) = self.compositing_rect {
            order.push(rect);
        }
        self.graph.write().set_child_order(self.group, &order);
    }

    #[cfg(test)]
    fn renderer_root(&self, id: ObjectId) -> Option<NodeId> {
        self.renderers.get(&id).map(PrimitiveRenderer::root_node)
    }
    #[cfg(test)]
    fn buffer_root(&self) -> Option<NodeId> {
        self.buffer.as_ref().map(|slot| slot.renderer.root_node())
    }
}
