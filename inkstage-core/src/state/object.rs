//! # Object states
//!
//! The renderable content of an entity: a closed tagged union of the four object
//! kinds the engine knows how to paint. States are immutable once committed to a
//! snapshot - consumers share them through `Arc` and treat pointer identity as the
//! "has it changed" test, so nothing here may be mutated in place after handoff.

use crate::color::Color;
use crate::units::{points_extent, Rect};

pub type ObjectId = crate::Id<ObjectState>;

/// One renderable object. Paint order is the order of the containing list.
///
/// Adding a kind means adding a variant here and one primitive renderer in the
/// engine - every `match` over this type is exhaustive on purpose.
#[derive(Clone, Debug, strum::EnumDiscriminants)]
#[strum_discriminants(name(ObjectKind))]
#[strum_discriminants(derive(strum::AsRefStr, Hash))]
pub enum ObjectState {
    BrushLine(BrushLine),
    EraserLine(EraserLine),
    Rect(RectShape),
    Image(ImageObject),
}

impl ObjectState {
    #[must_use]
    pub fn id(&self) -> ObjectId {
        match self {
            Self::BrushLine(line) => line.id,
            Self::EraserLine(line) => line.id,
            Self::Rect(rect) => rect.id,
            Self::Image(image) => image.id,
        }
    }
    #[must_use]
    pub fn kind(&self) -> ObjectKind {
        self.into()
    }
    /// Geometric footprint, before any pixel-accurate correction.
    ///
    /// For erasers this is the *affected* area, not contributed area - callers that
    /// care about visible extent must fall back to a pixel scan.
    #[must_use]
    pub fn extent(&self) -> Rect {
        match self {
            Self::BrushLine(line) => stroke_extent(&line.points, line.width, line.clip),
            Self::EraserLine(line) => stroke_extent(&line.points, line.width, line.clip),
            Self::Rect(rect) => rect.rect,
            // Images sit at the entity origin, dimension-sized.
            Self::Image(image) => Rect::new(
                0.0,
                0.0,
                image.image.width as f32,
                image.image.height as f32,
            ),
        }
    }
}

fn stroke_extent(points: &[[f32; 2]], width: f32, clip: Option<Rect>) -> Rect {
    let Some(tight) = points_extent(points) else {
        return Rect::EMPTY;
    };
    let inflated = tight.inflate(width / 2.0);
    match clip {
        Some(clip) => inflated.intersect(&clip).unwrap_or(Rect::EMPTY),
        None => inflated,
    }
}

/// A freehand stroke painted with normal compositing.
#[derive(Clone, Debug)]
pub struct BrushLine {
    pub id: ObjectId,
    /// Polyline in canvas units. A single point is a valid dab.
    pub points: Vec<[f32; 2]>,
    pub width: f32,
    pub color: Color,
    /// Restricts the painted area. A clipped stroke's visible extent can only be
    /// known by a pixel scan.
    pub clip: Option<Rect>,
}

/// A freehand stroke that *removes* from whatever it is drawn over.
/// Geometry-identical to [`BrushLine`]; only the compositing rule differs.
#[derive(Clone, Debug)]
pub struct EraserLine {
    pub id: ObjectId,
    pub points: Vec<[f32; 2]>,
    pub width: f32,
    pub clip: Option<Rect>,
}

/// An axis-aligned filled rectangle.
#[derive(Clone, Debug)]
pub struct RectShape {
    pub id: ObjectId,
    pub rect: Rect,
    pub color: Color,
}

/// A pasted or generated raster image, loaded asynchronously by reference.
#[derive(Clone, Debug)]
pub struct ImageObject {
    pub id: ObjectId,
    pub image: ImageRef,
    /// Applied in order at decode time.
    pub filters: smallvec::SmallVec<[ImageFilter; 2]>,
}

/// A reference to bitmap content owned by the external image service.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ImageRef {
    pub name: String,
    pub width: u32,
    pub height: u32,
}

impl ImageRef {
    /// Mint a reference with a collision-free generated name, for content the
    /// engine itself produces (rasterization output).
    #[must_use]
    pub fn generate(width: u32, height: u32) -> Self {
        Self {
            name: format!("{}.png", uuid::Uuid::new_v4()),
            width,
            height,
        }
    }
}

/// Pixel filters an image object may carry. Closed set - the decode path matches
/// exhaustively.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, strum::AsRefStr, strum::EnumIter)]
pub enum ImageFilter {
    /// Alpha becomes the pixel's lightness; used to turn grayscale output into
    /// region masks.
    LightnessToAlpha,
    /// Invert RGB, leave alpha.
    Invert,
}
