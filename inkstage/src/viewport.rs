//! Viewport transform and its push stream.
//!
//! The host pans/zooms the stage; entities only care so their compositing rects can
//! keep covering the screen. The transform is pushed through a `tokio::sync::watch`
//! channel: late subscribers see the current value, and intermediate values may be
//! skipped - only the latest matters for alignment.

use inkstage_core::units::Rect;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ViewportTransform {
    /// Screen-space offset of the canvas origin, in pixels.
    pub position: ultraviolet::Vec2,
    /// Screen pixels per canvas unit.
    pub scale: f32,
    /// Viewport size in screen pixels.
    pub dimensions: [u32; 2],
}

impl ViewportTransform {
    #[must_use]
    pub fn identity(dimensions: [u32; 2]) -> Self {
        Self {
            position: ultraviolet::Vec2::zero(),
            scale: 1.0,
            dimensions,
        }
    }
    /// The canvas-space rect currently visible on screen: the full viewport mapped
    /// through the inverse transform. Doubling `scale` halves this rect.
    #[must_use]
    pub fn visible_canvas_rect(&self) -> Rect {
        Rect::new(
            -self.position.x / self.scale,
            -self.position.y / self.scale,
            self.dimensions[0] as f32 / self.scale,
            self.dimensions[1] as f32 / self.scale,
        )
    }
    /// Canvas point for a screen point.
    #[must_use]
    pub fn unproject(&self, screen: ultraviolet::Vec2) -> ultraviolet::Vec2 {
        (screen - self.position) / self.scale
    }
    /// Screen point for a canvas point.
    #[must_use]
    pub fn project(&self, canvas: ultraviolet::Vec2) -> ultraviolet::Vec2 {
        canvas * self.scale + self.position
    }
}

pub type ViewportSender = tokio::sync::watch::Sender<ViewportTransform>;
pub type ViewportWatcher = tokio::sync::watch::Receiver<ViewportTransform>;

/// Create the stream with an initial transform.
#[must_use]
pub fn channel(initial: ViewportTransform) -> (ViewportSender, ViewportWatcher) {
    tokio::sync::watch::channel(initial)
}

#[cfg(test)]
mod test {
    use super::ViewportTransform;

    #[test]
    fn zoom_halves_visible_rect() {
        let mut vt = ViewportTransform::identity([800, 600]);
        let full = vt.visible_canvas_rect();
        assert_eq!((full.width, full.height), (800.0, 600.0));
        vt.scale = 2.0;
        let zoomed = vt.visible_canvas_rect();
        assert_eq!((zoomed.width, zoomed.height), (400.0, 300.0));
    }
    #[test]
    fn pan_offsets_visible_rect() {
        let mut vt = ViewportTransform::identity([100, 100]);
        vt.position = ultraviolet::Vec2::new(-50.0, 30.0);
        let rect = vt.visible_canvas_rect();
        assert_eq!((rect.x, rect.y), (50.0, -30.0));
    }
    #[test]
    fn project_roundtrip() {
        let mut vt = ViewportTransform::identity([100, 100]);
        vt.scale = 2.0;
        vt.position = ultraviolet::Vec2::new(10.0, -4.0);
        let p = ultraviolet::Vec2::new(3.0, 7.0);
        let back = vt.unproject(vt.project(p));
        assert!((back - p).mag() < 1e-5);
    }
}
