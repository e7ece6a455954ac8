//! # Entity controller
//!
//! One per canvas entity (raster layer, inpaint mask, guidance region). Owns the
//! entity's scene subtree, its [`ObjectRenderer`], and the transform collaborator,
//! and mediates snapshot diffs: snapshots are immutable, so every "did it change"
//! question is answered by pointer identity before any work happens.

use std::sync::Arc;

use inkstage_core::bitmap::BitmapService;
use inkstage_core::container::StateWriter;
use inkstage_core::state::object::ImageObject;
use inkstage_core::state::{EntityConfig, EntityId, ObjectState, Snapshot};

use super::reconciler::ObjectRenderer;
use crate::scene::{Node, NodeId, SharedGraph};
use crate::transform::TransformController;
use crate::viewport::ViewportWatcher;

pub struct EntityController {
    entity: EntityId,
    graph: SharedGraph,
    /// Entity root group; visibility toggles here, nodes are never detached for it.
    group: NodeId,
    objects: ObjectRenderer,
    transform: Box<dyn TransformController>,
    previous: Option<Snapshot>,
    viewport: ViewportWatcher,
}

impl EntityController {
    pub fn new(
        entity: EntityId,
        config: EntityConfig,
        graph: &SharedGraph,
        writer: Arc<dyn StateWriter>,
        service: Arc<dyn BitmapService>,
        mut transform: Box<dyn TransformController>,
        mut viewport: ViewportWatcher,
    ) -> Self {
        let group = {
            let mut write = graph.write();
            let root = write.root();
            write.attach(root, Node::group(false))
        };
        let objects = ObjectRenderer::new(entity, config, graph, group, writer, service);
        {
            let mut write = graph.write();
            let attached = transform.nodes_to_attach(&mut write, group);
            log::debug!("{entity}: transform collaborator attached {} nodes", attached.len());
        }
        // Cover the screen for the current transform before any content arrives.
        let initial = *viewport.borrow_and_update();
        objects.align_compositing_rect(&initial);
        Self {
            entity,
            graph: graph.clone(),
            group,
            objects,
            transform,
            previous: None,
            viewport,
        }
    }

    #[must_use]
    pub fn entity(&self) -> EntityId {
        self.entity
    }
    #[must_use]
    pub fn group(&self) -> NodeId {
        self.group
    }
    #[must_use]
    pub fn objects(&self) -> &ObjectRenderer {
        &self.objects
    }
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.graph
            .read()
            .get(self.group)
            .is_some_and(|node| node.visible)
    }

    /// Reconcile against the latest snapshot. `None` (entity absent from the
    /// document) leaves everything as-is.
    pub fn update(&mut self, snapshot: Option<Snapshot>) {
        let Some(snapshot) = snapshot else {
            return;
        };
        let first = self.previous.is_none();
        if let Some(previous) = &self.previous {
            if Arc::ptr_eq(previous, &snapshot) {
                // Same value, definitionally unchanged.
                return;
            }
        }

        let objects_changed = self
            .previous
            .as_ref()
            .map_or(true, |p| !Arc::ptr_eq(&p.objects, &snapshot.objects));
        if objects_changed && self.objects.render(&snapshot.objects) {
            // Lazy by contract: the collaborator recomputes when it gets around to it.
            self.transform.request_bounds_recalculation();
        }

        if self
            .previous
            .as_ref()
            .map_or(true, |p| p.position != snapshot.position)
        {
            self.transform.update_position(snapshot.position);
        }

        let enabled_changed = self
            .previous
            .as_ref()
            .map_or(true, |p| p.is_enabled != snapshot.is_enabled);
        if enabled_changed || objects_changed {
            self.sync_visibility(snapshot.is_enabled);
        }

        if first {
            self.transform.update_bounds();
        }
        self.previous = Some(snapshot);
    }

    /// Drain the viewport stream and realign the compositing rect if the transform
    /// moved. Content changes play no part here.
    pub fn poll_viewport(&mut self) {
        if self.viewport.has_changed().unwrap_or(false) {
            let current = *self.viewport.borrow_and_update();
            self.objects.align_compositing_rect(&current);
        }
    }

    /// Visibility is `is_enabled && has_content`: an empty, enabled entity stays
    /// hidden. Toggled on the root group only - nodes are never detached for it.
    fn sync_visibility(&mut self, enabled: bool) {
        let visible = enabled && self.objects.has_objects();
        self.graph.write().set_visible(self.group, visible);
    }
    fn refresh_visibility(&mut self) {
        let enabled = self.previous.as_ref().map_or(true, |s| s.is_enabled);
        self.sync_visibility(enabled);
    }

    // Draft passthroughs. The draft adds/removes content, which feeds visibility.
    pub fn set_buffer(&mut self, state: Arc<ObjectState>) -> bool {
        let rendered = self.objects.set_buffer(state);
        self.refresh_visibility();
        rendered
    }
    pub fn clear_buffer(&mut self) {
        self.objects.clear_buffer();
        self.refresh_visibility();
    }
    pub fn commit_buffer(&mut self) {
        self.objects.commit_buffer();
        self.refresh_visibility();
    }
    /// Reconcile the committed list directly (bypassing snapshot identity), for
    /// hosts that drive the object renderer themselves.
    pub fn render_objects(&mut self, objects: &[Arc<ObjectState>]) -> bool {
        let changed = self.objects.render(objects);
        self.refresh_visibility();
        changed
    }

    /// Flatten this entity over its current selection extent. See
    /// [`ObjectRenderer::rasterize`].
    pub async fn rasterize(&mut self) -> anyhow::Result<ImageObject> {
        let region = self.transform.relative_rect();
        self.objects.rasterize(region).await
    }

    /// Children before the subtree that holds them: transform collaborator, then
    /// the object renderer, then the entity group itself.
    pub fn destroy(mut self) {
        {
            let mut graph = self.graph.write();
            self.transform.destroy(&mut graph);
        }
        self.objects.destroy();
        self.graph.write().remove(self.group);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::scene::Graph;
    use crate::testing::{MemoryService, RecordingTransform, RecordingWriter, TransformCall};
    use crate::viewport::{self, ViewportTransform};
    use inkstage_core::color::Color;
    use inkstage_core::state::object::{BrushLine, ObjectId};
    use inkstage_core::state::EntityState;
    use inkstage_core::units::Rect;

    struct Harness {
        graph: SharedGraph,
        writer: Arc<RecordingWriter>,
        service: Arc<MemoryService>,
        transform: RecordingTransform,
        viewport_tx: viewport::ViewportSender,
    }
    impl Harness {
        fn new() -> (Self, EntityController) {
            Self::with_config(EntityConfig::raster_layer())
        }
        fn with_config(config: EntityConfig) -> (Self, EntityController) {
            crate::testing::init_logs();
            let graph = Graph::new_shared();
            let writer = Arc::new(RecordingWriter::default());
            let service = Arc::new(MemoryService::new());
            let transform = RecordingTransform::default();
            let (viewport_tx, viewport_rx) =
                viewport::channel(ViewportTransform::identity([64, 64]));
            let controller = EntityController::new(
                EntityId::fresh(),
                config,
                &graph,
                writer.clone(),
                service.clone(),
                Box::new(transform.clone()),
                viewport_rx,
            );
            (
                Self {
                    graph,
                    writer,
                    service,
                    transform,
                    viewport_tx,
                },
                controller,
            )
        }
    }

    fn brush(points: &[[f32; 2]], width: f32) -> Arc<ObjectState> {
        Arc::new(ObjectState::BrushLine(BrushLine {
            id: ObjectId::fresh(),
            points: points.to_vec(),
            width,
            color: Color::opaque(0, 0, 0),
            clip: None,
        }))
    }
    fn snapshot(state: EntityState) -> Snapshot {
        Arc::new(state)
    }

    #[test]
    fn identical_snapshot_is_skipped_entirely() {
        let (harness, mut controller) = Harness::new();
        let snap = snapshot(EntityState::empty().with_objects(vec![brush(&[[0.0, 0.0]], 2.0)]));
        controller.update(Some(snap.clone()));
        harness.transform.take();
        controller.update(Some(snap));
        assert!(harness.transform.take().is_empty());
    }

    #[test]
    fn first_render_forces_bounds_and_position() {
        let (harness, mut controller) = Harness::new();
        let snap = snapshot(EntityState::empty().with_objects(vec![brush(&[[0.0, 0.0]], 2.0)]));
        controller.update(Some(snap));
        let calls = harness.transform.take();
        assert!(calls.contains(&TransformCall::RequestBoundsRecalculation));
        assert!(calls.contains(&TransformCall::UpdatePosition([0.0, 0.0])));
        assert!(calls.contains(&TransformCall::UpdateBounds));
    }

    #[test]
    fn position_only_change_touches_only_position() {
        let (harness, mut controller) = Harness::new();
        let first = snapshot(EntityState::empty().with_objects(vec![brush(&[[0.0, 0.0]], 2.0)]));
        controller.update(Some(first.clone()));
        harness.transform.take();
        // Same objects Arc, new position: the object list must not re-render.
        let moved = snapshot(first.with_position([7.0, 3.0]));
        controller.update(Some(moved));
        assert_eq!(
            harness.transform.take(),
            vec![TransformCall::UpdatePosition([7.0, 3.0])]
        );
    }

    #[test]
    fn empty_enabled_entity_is_hidden() {
        let (_harness, mut controller) = Harness::new();
        controller.update(Some(snapshot(EntityState::empty())));
        assert!(!controller.objects().has_objects());
        assert!(!controller.is_visible());
    }

    #[test]
    fn buffer_makes_entity_visible_and_survives_empty_renders() {
        let (harness, mut controller) = Harness::new();
        controller.update(Some(snapshot(EntityState::empty())));
        assert!(!controller.is_visible());

        let draft = brush(&[[0.0, 0.0], [10.0, 10.0]], 4.0);
        controller.set_buffer(draft);
        assert!(controller.objects().has_objects());
        assert!(controller.is_visible());

        // A committed-list render with no objects leaves the draft alone.
        controller.render_objects(&[]);
        assert!(controller.objects().has_buffer());
        assert!(controller.is_visible());
        drop(harness);
    }

    #[test]
    fn disable_hides_without_detaching() {
        let (harness, mut controller) = Harness::new();
        let objects: Vec<_> = vec![brush(&[[0.0, 0.0]], 2.0)];
        let enabled = snapshot(EntityState::empty().with_objects(objects.clone()));
        controller.update(Some(enabled.clone()));
        assert!(controller.is_visible());
        let group = controller.group();
        let children_before = harness.graph.read().get(group).unwrap().children().len();

        let disabled = snapshot(enabled.with_enabled(false));
        controller.update(Some(disabled));
        assert!(!controller.is_visible());
        // Same nodes, just hidden.
        assert_eq!(
            harness.graph.read().get(group).unwrap().children().len(),
            children_before
        );
    }

    #[test]
    fn commit_goes_through_to_the_container() {
        let (harness, mut controller) = Harness::new();
        controller.update(Some(snapshot(EntityState::empty())));
        controller.set_buffer(brush(&[[0.0, 0.0], [10.0, 10.0]], 4.0));
        controller.commit_buffer();
        assert_eq!(harness.writer.take().len(), 1);
        assert!(!controller.objects().has_buffer());
        // Nothing committed locally: the entity went back to empty until the next
        // snapshot echoes the mutation.
        assert!(!controller.is_visible());
    }

    #[test]
    fn viewport_stream_realigns_compositing_rect() {
        let (harness, mut controller) =
            Harness::with_config(EntityConfig::inpaint_mask(Color::opaque(255, 0, 0)));
        // No content at all; the rect still follows the stream.
        let mut zoomed = ViewportTransform::identity([64, 64]);
        zoomed.scale = 2.0;
        harness.viewport_tx.send(zoomed).unwrap();
        controller.poll_viewport();

        let graph = harness.graph.read();
        let object_group = controller.objects().group();
        let children = graph.get(object_group).unwrap().children().to_vec();
        let rect_node = *children.last().unwrap();
        match graph.get(rect_node).unwrap().kind {
            crate::scene::NodeKind::Rect { rect, .. } => {
                assert_eq!(rect, Rect::new(0.0, 0.0, 32.0, 32.0));
            }
            ref other => panic!("topmost mask node should be the compositing rect, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn rasterize_uses_selection_extent() {
        let (harness, _) = Harness::new();
        // Rebuild with a transform that reports a concrete selection rect.
        let mut transform = RecordingTransform::default();
        transform.rect = Rect::new(0.0, 0.0, 8.0, 8.0);
        let (_tx, viewport_rx) = viewport::channel(ViewportTransform::identity([64, 64]));
        let mut controller = EntityController::new(
            EntityId::fresh(),
            EntityConfig::raster_layer(),
            &harness.graph,
            harness.writer.clone(),
            harness.service.clone(),
            Box::new(transform),
            viewport_rx,
        );
        controller.render_objects(&[brush(&[[2.0, 2.0], [6.0, 6.0]], 2.0)]);
        let object = controller.rasterize().await.unwrap();
        assert_eq!((object.image.width, object.image.height), (8, 8));
        assert_eq!(harness.writer.take().len(), 1);
    }

    #[test]
    fn destroy_tears_down_children_first_then_subtree() {
        let (harness, mut controller) = Harness::new();
        controller.update(Some(snapshot(
            EntityState::empty().with_objects(vec![brush(&[[0.0, 0.0]], 2.0)]),
        )));
        let group = controller.group();
        let transform = harness.transform.clone();
        controller.destroy();
        assert_eq!(transform.take().pop(), Some(TransformCall::Destroy));
        assert!(!harness.graph.read().contains(group));
    }
}
