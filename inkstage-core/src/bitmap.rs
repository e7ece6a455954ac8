//! Async interface of the external bitmap service.
//!
//! Content travels encoded (the wire format the service stores); decode happens in
//! the engine's loader. Both directions can fail or take arbitrarily long - the
//! engine treats them as opaque suspension points.

use crate::state::object::ImageRef;

/// Encoded bitmap bytes (PNG and friends) as stored by the service.
#[derive(Clone, Debug)]
pub struct EncodedBitmap {
    pub bytes: Vec<u8>,
}

impl EncodedBitmap {
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }
}

/// Where an uploaded bitmap is filed by the service.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, strum::AsRefStr)]
pub enum BitmapCategory {
    General,
    Mask,
    Control,
}

#[derive(thiserror::Error, Debug)]
pub enum ServiceError {
    #[error("bitmap service unavailable")]
    Unavailable,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[async_trait::async_trait]
pub trait BitmapService: Send + Sync {
    /// Fetch encoded content by reference. `Ok(None)` means the service has no such
    /// bitmap - a recoverable condition, not an error.
    async fn fetch_bitmap(&self, image: &ImageRef) -> Result<Option<EncodedBitmap>, ServiceError>;

    /// Store encoded content under `name`, returning the reference future fetches
    /// should use. `intermediate` marks content the user never sees in a gallery.
    async fn upload_bitmap(
        &self,
        data: EncodedBitmap,
        name: &str,
        category: BitmapCategory,
        intermediate: bool,
    ) -> Result<ImageRef, ServiceError>;
}
