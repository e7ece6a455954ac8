//! Software compositor for the scene graph.
//!
//! Walks a subtree in paint order and resolves it to straight-alpha RGBA pixels,
//! one canvas unit per pixel, over a caller-chosen world-space region. This is the
//! path behind `rasterize()` and the ground truth the compositing rules are tested
//! against.
//!
//! Shapes are painted with hard edges (no antialiasing) and, crucially, *one blend
//! per pixel per shape*: a stroke's own overlapping segments do not double-blend a
//! semi-transparent color.

use inkstage_core::color::Color;
use inkstage_core::units::Rect;

use super::{CompositeMode, Graph, Node, NodeId, NodeKind};

/// Rasterize the subtree under `root` over `region` (world space). Output
/// dimensions are the region's, rounded up, at least 1x1.
#[must_use]
pub fn rasterize(graph: &Graph, root: NodeId, region: Rect) -> image::RgbaImage {
    let width = (region.width.ceil() as u32).max(1);
    let height = (region.height.ceil() as u32).max(1);
    let mut surface = Surface {
        pixels: image::RgbaImage::new(width, height),
        origin: [region.x, region.y],
    };
    paint(graph, root, &mut surface);
    surface.pixels
}

struct Surface {
    pixels: image::RgbaImage,
    /// World coordinates of the top-left pixel's corner.
    origin: [f32; 2],
}

impl Surface {
    fn blank_like(&self) -> Self {
        Self {
            pixels: image::RgbaImage::new(self.pixels.width(), self.pixels.height()),
            origin: self.origin,
        }
    }
    /// World-space center of pixel `(x, y)`.
    fn center(&self, x: u32, y: u32) -> [f32; 2] {
        [
            self.origin[0] + x as f32 + 0.5,
            self.origin[1] + y as f32 + 0.5,
        ]
    }
    /// Pixel column range covered by world-space span `[min, max)`, clamped.
    fn columns(&self, min: f32, max: f32) -> std::ops::Range<u32> {
        span_to_pixels(min - self.origin[0], max - self.origin[0], self.pixels.width())
    }
    fn rows(&self, min: f32, max: f32) -> std::ops::Range<u32> {
        span_to_pixels(min - self.origin[1], max - self.origin[1], self.pixels.height())
    }
}

fn span_to_pixels(min: f32, max: f32, limit: u32) -> std::ops::Range<u32> {
    let lo = (min.floor().max(0.0)) as u32;
    let hi = (max.ceil().max(0.0) as u32).min(limit);
    lo.min(limit)..hi
}

fn paint(graph: &Graph, id: NodeId, target: &mut Surface) {
    let Some(node) = graph.get(id) else {
        return;
    };
    if !node.visible || node.opacity <= 0.0 {
        return;
    }
    match &node.kind {
        NodeKind::Group { isolate: false } => {
            for &child in node.children() {
                paint(graph, child, target);
            }
        }
        NodeKind::Group { isolate: true } => {
            let mut scratch = target.blank_like();
            for &child in node.children() {
                paint(graph, child, &mut scratch);
            }
            composite_surface(target, &scratch, node.composite, node.opacity);
        }
        NodeKind::Line {
            points,
            width,
            color,
            clip,
        } => paint_line(target, node, points, *width, *color, *clip),
        NodeKind::Rect { rect, color } => paint_rect(target, node, *rect, *color),
        NodeKind::Image {
            bitmap,
            size,
            offset,
        } => {
            if let Some(bitmap) = bitmap {
                paint_image(target, node, bitmap, *size, *offset);
            }
        }
        // Annotation only; the compositor has no text stack.
        NodeKind::Label { .. } => (),
    }
}

fn composite_surface(target: &mut Surface, source: &Surface, mode: CompositeMode, opacity: f32) {
    for (x, y, dst) in target.pixels.enumerate_pixels_mut() {
        let src = source.pixels.get_pixel(x, y);
        let mut src = to_f32(*src);
        src[3] *= opacity;
        blend(dst, src, mode);
    }
}

fn paint_line(
    target: &mut Surface,
    node: &Node,
    points: &[ultraviolet::Vec2],
    width: f32,
    color: Color,
    clip: Option<Rect>,
) {
    let raw: smallvec::SmallVec<[[f32; 2]; 16]> = points.iter().map(|p| [p.x, p.y]).collect();
    let Some(tight) = inkstage_core::units::points_extent(&raw) else {
        return;
    };
    let radius = (width / 2.0).max(0.0);
    let bounds = tight.inflate(radius);
    let radius_sq = radius * radius;

    let src = to_f32_color(color);
    for y in target.rows(bounds.y, bounds.bottom()) {
        for x in target.columns(bounds.x, bounds.right()) {
            let center = target.center(x, y);
            if let Some(clip) = clip {
                if !clip.contains(center) {
                    continue;
                }
            }
            if distance_sq_to_polyline(center, points) <= radius_sq {
                blend(target.pixels.get_pixel_mut(x, y), src, node.composite);
            }
        }
    }
}

fn paint_rect(target: &mut Surface, node: &Node, rect: Rect, color: Color) {
    let src = to_f32_color(color);
    for y in target.rows(rect.y, rect.bottom()) {
        for x in target.columns(rect.x, rect.right()) {
            if rect.contains(target.center(x, y)) {
                blend(target.pixels.get_pixel_mut(x, y), src, node.composite);
            }
        }
    }
}

fn paint_image(
    target: &mut Surface,
    node: &Node,
    bitmap: &image::RgbaImage,
    size: [f32; 2],
    offset: ultraviolet::Vec2,
) {
    if size[0] <= 0.0 || size[1] <= 0.0 || bitmap.width() == 0 || bitmap.height() == 0 {
        return;
    }
    let dest = Rect::new(offset.x, offset.y, size[0], size[1]);
    for y in target.rows(dest.y, dest.bottom()) {
        for x in target.columns(dest.x, dest.right()) {
            let center = target.center(x, y);
            if !dest.contains(center) {
                continue;
            }
            // Nearest sample.
            let u = ((center[0] - dest.x) / dest.width * bitmap.width() as f32) as u32;
            let v = ((center[1] - dest.y) / dest.height * bitmap.height() as f32) as u32;
            let texel = bitmap.get_pixel(u.min(bitmap.width() - 1), v.min(bitmap.height() - 1));
            blend(target.pixels.get_pixel_mut(x, y), to_f32(*texel), node.composite);
        }
    }
}

fn distance_sq_to_polyline(point: [f32; 2], points: &[ultraviolet::Vec2]) -> f32 {
    let p = ultraviolet::Vec2::new(point[0], point[1]);
    // A single point is a dab.
    if points.len() == 1 {
        return (p - points[0]).mag_sq();
    }
    let mut best = f32::INFINITY;
    for segment in points.windows(2) {
        let (a, b) = (segment[0], segment[1]);
        let ab = b - a;
        let len_sq = ab.mag_sq();
        let t = if len_sq <= f32::EPSILON {
            0.0
        } else {
            ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0)
        };
        best = best.min((p - (a + ab * t)).mag_sq());
    }
    best
}

fn to_f32(px: image::Rgba<u8>) -> [f32; 4] {
    [
        f32::from(px[0]) / 255.0,
        f32::from(px[1]) / 255.0,
        f32::from(px[2]) / 255.0,
        f32::from(px[3]) / 255.0,
    ]
}

fn to_f32_color(color: Color) -> [f32; 4] {
    to_f32(image::Rgba(color.0))
}

/// Straight-alpha per-pixel compositing.
fn blend(dst: &mut image::Rgba<u8>, src: [f32; 4], mode: CompositeMode) {
    let d = to_f32(*dst);
    let (sa, da) = (src[3], d[3]);
    let out = match mode {
        CompositeMode::SourceOver => {
            let a = sa + da * (1.0 - sa);
            if a <= 0.0 {
                [0.0; 4]
            } else {
                let rgb = |i: usize| (src[i] * sa + d[i] * da * (1.0 - sa)) / a;
                [rgb(0), rgb(1), rgb(2), a]
            }
        }
        CompositeMode::SourceIn => [src[0], src[1], src[2], sa * da],
        CompositeMode::DestinationOut => [d[0], d[1], d[2], da * (1.0 - sa)],
    };
    *dst = image::Rgba([
        (out[0] * 255.0).round() as u8,
        (out[1] * 255.0).round() as u8,
        (out[2] * 255.0).round() as u8,
        (out[3] * 255.0).round() as u8,
    ]);
}
