//! Test doubles for the external collaborators. Compiled for tests only.

use std::sync::Arc;

use inkstage_core::bitmap::{BitmapCategory, BitmapService, EncodedBitmap, ServiceError};
use inkstage_core::container::StateWriter;
use inkstage_core::state::object::{BrushLine, EraserLine, ImageObject, ImageRef, RectShape};
use inkstage_core::state::EntityId;
use inkstage_core::units::Rect;

/// In-memory bitmap service. Fetches resolve immediately; missing names are
/// not-found. An optional gate can hold fetches open to script race orderings.
pub struct MemoryService {
    bitmaps: parking_lot::Mutex<hashbrown::HashMap<String, Vec<u8>>>,
    gates: parking_lot::Mutex<hashbrown::HashMap<String, Arc<tokio::sync::Notify>>>,
}

impl MemoryService {
    pub fn new() -> Self {
        Self {
            bitmaps: parking_lot::Mutex::new(hashbrown::HashMap::new()),
            gates: parking_lot::Mutex::new(hashbrown::HashMap::new()),
        }
    }
    pub fn insert_png(&self, name: &str, pixels: &image::RgbaImage) {
        self.bitmaps.lock().insert(name.to_owned(), encode_png(pixels));
    }
    /// Future fetches of `name` block until [`MemoryService::open_gate`].
    pub fn gate(&self, name: &str) -> Arc<tokio::sync::Notify> {
        let notify = Arc::new(tokio::sync::Notify::new());
        self.gates.lock().insert(name.to_owned(), notify.clone());
        notify
    }
    pub fn open_gate(notify: &tokio::sync::Notify) {
        notify.notify_waiters();
        notify.notify_one();
    }
}

#[async_trait::async_trait]
impl BitmapService for MemoryService {
    async fn fetch_bitmap(&self, image: &ImageRef) -> Result<Option<EncodedBitmap>, ServiceError> {
        let gate = self.gates.lock().get(&image.name).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        Ok(self
            .bitmaps
            .lock()
            .get(&image.name)
            .cloned()
            .map(EncodedBitmap::new))
    }
    async fn upload_bitmap(
        &self,
        data: EncodedBitmap,
        name: &str,
        _category: BitmapCategory,
        _intermediate: bool,
    ) -> Result<ImageRef, ServiceError> {
        let decoded =
            image::load_from_memory(&data.bytes).map_err(|e| ServiceError::Other(e.into()))?;
        self.bitmaps.lock().insert(name.to_owned(), data.bytes);
        Ok(ImageRef {
            name: name.to_owned(),
            width: decoded.width(),
            height: decoded.height(),
        })
    }
}

/// Route `log` output into test captures. Safe to call from every test.
pub fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Give spawned tasks room to run on the current-thread test runtime.
pub async fn settle() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}

pub fn encode_png(pixels: &image::RgbaImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgba8(pixels.clone())
        .write_to(
            &mut std::io::Cursor::new(&mut bytes),
            image::ImageFormat::Png,
        )
        .unwrap();
    bytes
}

pub fn solid(width: u32, height: u32, color: [u8; 4]) -> image::RgbaImage {
    image::RgbaImage::from_pixel(width, height, image::Rgba(color))
}

/// Records every mutation request verbatim.
#[derive(Default)]
pub struct RecordingWriter {
    pub mutations: parking_lot::Mutex<Vec<Mutation>>,
}

#[derive(Clone, Debug)]
pub enum Mutation {
    AddBrushLine(EntityId, BrushLine),
    AddEraserLine(EntityId, EraserLine),
    AddRect(EntityId, RectShape),
    RasterizeEntity(EntityId, ImageObject, [f32; 2]),
}

impl RecordingWriter {
    pub fn take(&self) -> Vec<Mutation> {
        std::mem::take(&mut *self.mutations.lock())
    }
}

impl StateWriter for RecordingWriter {
    fn add_brush_line(&self, entity: EntityId, line: BrushLine) {
        self.mutations.lock().push(Mutation::AddBrushLine(entity, line));
    }
    fn add_eraser_line(&self, entity: EntityId, line: EraserLine) {
        self.mutations
            .lock()
            .push(Mutation::AddEraserLine(entity, line));
    }
    fn add_rect(&self, entity: EntityId, rect: RectShape) {
        self.mutations.lock().push(Mutation::AddRect(entity, rect));
    }
    fn rasterize_entity(&self, entity: EntityId, image: ImageObject, position: [f32; 2]) {
        self.mutations
            .lock()
            .push(Mutation::RasterizeEntity(entity, image, position));
    }
}

/// Transform collaborator that records the calls the entity controller makes.
#[derive(Clone, Default)]
pub struct RecordingTransform {
    pub calls: Arc<parking_lot::Mutex<Vec<TransformCall>>>,
    pub rect: Rect,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TransformCall {
    UpdatePosition([f32; 2]),
    RequestBoundsRecalculation,
    UpdateBounds,
    Destroy,
}

impl RecordingTransform {
    pub fn take(&self) -> Vec<TransformCall> {
        std::mem::take(&mut *self.calls.lock())
    }
}

impl crate::transform::TransformController for RecordingTransform {
    fn update_position(&mut self, position: [f32; 2]) {
        self.calls.lock().push(TransformCall::UpdatePosition(position));
    }
    fn request_bounds_recalculation(&mut self) {
        self.calls
            .lock()
            .push(TransformCall::RequestBoundsRecalculation);
    }
    fn update_bounds(&mut self) {
        self.calls.lock().push(TransformCall::UpdateBounds);
    }
    fn nodes_to_attach(
        &mut self,
        _graph: &mut crate::scene::Graph,
        _parent: crate::scene::NodeId,
    ) -> Vec<crate::scene::NodeId> {
        Vec::new()
    }
    fn relative_rect(&self) -> Rect {
        self.rect
    }
    fn destroy(&mut self, _graph: &mut crate::scene::Graph) {
        self.calls.lock().push(TransformCall::Destroy);
    }
}
