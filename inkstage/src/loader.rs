//! # Bitmap loader
//!
//! Fetch-and-decode of raster content referenced by [`ImageRef`], on top of the
//! external [`BitmapService`]. The service hands back encoded bytes; decode and the
//! object's filter chain run here, off the scene-mutation path.
//!
//! [`BitmapLoader::spawn_fetch`] gives callers a cancellable handle; the image
//! renderer instead drives [`BitmapLoader::fetch`] inside its own task, because its
//! cancellation model is supersession (generations), not abort.

use std::sync::Arc;

use inkstage_core::bitmap::{BitmapService, ServiceError};
use inkstage_core::state::object::{ImageFilter, ImageRef};

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    /// The service has no bitmap under this reference. Recoverable: renderers show
    /// their error placeholder.
    #[error("bitmap {0:?} not found")]
    NotFound(String),
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("decode failed: {0}")]
    Decode(#[from] image::ImageError),
}

#[derive(Clone)]
pub struct BitmapLoader {
    service: Arc<dyn BitmapService>,
}

impl BitmapLoader {
    #[must_use]
    pub fn new(service: Arc<dyn BitmapService>) -> Self {
        Self { service }
    }
    #[must_use]
    pub fn service(&self) -> &Arc<dyn BitmapService> {
        &self.service
    }
    /// Fetch, decode, and filter. Not-found is an error here - by the time a
    /// renderer asks for content, a dangling reference is a failure to show.
    pub async fn fetch(
        &self,
        image: &ImageRef,
        filters: &[ImageFilter],
    ) -> Result<image::RgbaImage, LoadError> {
        let encoded = self
            .service
            .fetch_bitmap(image)
            .await?
            .ok_or_else(|| LoadError::NotFound(image.name.clone()))?;
        let decoded = image::load_from_memory(&encoded.bytes)?.into_rgba8();
        Ok(apply_filters(decoded, filters))
    }
    /// Fetch on a spawned task, cancellable from the outside. Must be called within
    /// a tokio runtime.
    #[must_use]
    pub fn spawn_fetch(&self, image: ImageRef, filters: Vec<ImageFilter>) -> FetchTask {
        let loader = self.clone();
        FetchTask {
            handle: tokio::task::spawn(async move { loader.fetch(&image, &filters).await }),
        }
    }
}

/// Handle to an in-flight fetch. Dropping the handle does *not* cancel.
pub struct FetchTask {
    handle: tokio::task::JoinHandle<Result<image::RgbaImage, LoadError>>,
}

impl FetchTask {
    /// Abort the fetch. [`FetchTask::wait`] then yields `None`.
    pub fn cancel(&self) {
        self.handle.abort();
    }
    /// Await completion. `None` if the task was cancelled.
    pub async fn wait(self) -> Option<Result<image::RgbaImage, LoadError>> {
        match self.handle.await {
            Ok(result) => Some(result),
            Err(join) if join.is_cancelled() => None,
            // The fetch panicked; that's a bug in the service impl, surface it.
            Err(join) => std::panic::resume_unwind(join.into_panic()),
        }
    }
}

fn apply_filters(mut bitmap: image::RgbaImage, filters: &[ImageFilter]) -> image::RgbaImage {
    for filter in filters {
        match filter {
            ImageFilter::LightnessToAlpha => {
                for px in bitmap.pixels_mut() {
                    // Rec. 601 luma.
                    let luma = 0.299 * f32::from(px[0])
                        + 0.587 * f32::from(px[1])
                        + 0.114 * f32::from(px[2]);
                    px[3] = luma.round().min(255.0) as u8;
                }
            }
            ImageFilter::Invert => {
                for px in bitmap.pixels_mut() {
                    px[0] = 255 - px[0];
                    px[1] = 255 - px[1];
                    px[2] = 255 - px[2];
                }
            }
        }
    }
    bitmap
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::{solid, MemoryService};

    #[tokio::test]
    async fn fetch_decodes() {
        let service = Arc::new(MemoryService::new());
        service.insert_png("a.png", &solid(3, 2, [9, 8, 7, 255]));
        let loader = BitmapLoader::new(service);
        let reference = ImageRef {
            name: "a.png".into(),
            width: 3,
            height: 2,
        };
        let bitmap = loader.fetch(&reference, &[]).await.unwrap();
        assert_eq!((bitmap.width(), bitmap.height()), (3, 2));
        assert_eq!(bitmap.get_pixel(0, 0).0, [9, 8, 7, 255]);
    }

    #[tokio::test]
    async fn missing_bitmap_is_not_found() {
        let loader = BitmapLoader::new(Arc::new(MemoryService::new()));
        let reference = ImageRef {
            name: "nope.png".into(),
            width: 1,
            height: 1,
        };
        assert!(matches!(
            loader.fetch(&reference, &[]).await,
            Err(LoadError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn filters_apply_in_order() {
        let service = Arc::new(MemoryService::new());
        service.insert_png("f.png", &solid(1, 1, [255, 255, 255, 10]));
        let loader = BitmapLoader::new(service);
        let reference = ImageRef {
            name: "f.png".into(),
            width: 1,
            height: 1,
        };
        let bitmap = loader
            .fetch(
                &reference,
                &[ImageFilter::LightnessToAlpha, ImageFilter::Invert],
            )
            .await
            .unwrap();
        // White: lightness 255 -> alpha 255, then inverted to black.
        assert_eq!(bitmap.get_pixel(0, 0).0, [0, 0, 0, 255]);
    }

    #[tokio::test]
    async fn cancelled_fetch_yields_none() {
        let loader = BitmapLoader::new(Arc::new(MemoryService::new()));
        let task = loader.spawn_fetch(
            ImageRef {
                name: "x.png".into(),
                width: 1,
                height: 1,
            },
            Vec::new(),
        );
        task.cancel();
        assert!(task.wait().await.is_none());
    }
}
