//! Cover-fit mapping from the source video frame onto the destination canvas.

use crate::landmarks::{Landmark, Point};

pub const MIN_ZOOM: f32 = 1.0;
pub const MAX_ZOOM: f32 = 2.5;

/// Scale + offset that maps source pixels onto the destination with no
/// letterboxing. Overflow is split evenly on both sides.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderTransform {
    pub src_w: f32,
    pub src_h: f32,
    pub scale: f32,
    pub dx: f32,
    pub dy: f32,
}

pub fn clamp_zoom(zoom: f32) -> f32 {
    if zoom.is_nan() {
        return MIN_ZOOM;
    }
    zoom.clamp(MIN_ZOOM, MAX_ZOOM)
}

impl RenderTransform {
    /// `scale = max(dest_w/src_w, dest_h/src_h) * zoom`, zoom clamped to [1, 2.5].
    pub fn cover_fit(src_w: f32, src_h: f32, dest_w: f32, dest_h: f32, zoom: f32) -> Self {
        let src_w = src_w.max(1.0);
        let src_h = src_h.max(1.0);
        let scale = (dest_w / src_w).max(dest_h / src_h) * clamp_zoom(zoom);
        Self {
            src_w,
            src_h,
            scale,
            dx: (dest_w - src_w * scale) * 0.5,
            dy: (dest_h - src_h * scale) * 0.5,
        }
    }

    /// Normalized landmark to destination pixels.
    #[inline]
    pub fn project(&self, lm: Landmark) -> Point {
        Point::new(lm.x * self.src_w * self.scale + self.dx, lm.y * self.src_h * self.scale + self.dy)
    }

    /// Size of the scaled source frame in destination pixels.
    pub fn drawn_size(&self) -> (f32, f32) {
        (self.src_w * self.scale, self.src_h * self.scale)
    }

    /// Same source dimensions, so only dest size / zoom can change the mapping.
    pub fn same_source(&self, src_w: f32, src_h: f32) -> bool {
        self.src_w == src_w.max(1.0) && self.src_h == src_h.max(1.0)
    }

    pub fn to_skia(&self) -> tiny_skia::Transform {
        tiny_skia::Transform::from_row(self.scale, 0.0, 0.0, self.scale, self.dx, self.dy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_takes_larger_axis_ratio_times_zoom() {
        for zoom in [1.0, 1.3, 1.75, 2.0, 2.5] {
            let t = RenderTransform::cover_fit(640.0, 480.0, 900.0, 900.0, zoom);
            let expected = (900.0f32 / 640.0).max(900.0 / 480.0) * zoom;
            assert!((t.scale - expected).abs() < 1e-5, "zoom {zoom}");
        }
    }

    #[test]
    fn drawn_image_covers_destination_without_gap() {
        for (dw, dh) in [(900.0, 900.0), (1280.0, 400.0), (300.0, 1200.0)] {
            for zoom in [1.0, 1.6, 2.5] {
                let t = RenderTransform::cover_fit(640.0, 480.0, dw, dh, zoom);
                let (w, h) = t.drawn_size();
                assert!(t.dx <= 1e-3 && t.dy <= 1e-3);
                assert!(t.dx + w >= dw - 1e-3);
                assert!(t.dy + h >= dh - 1e-3);
            }
        }
    }

    #[test]
    fn zoom_two_doubles_scale_and_stays_centered() {
        let base = RenderTransform::cover_fit(640.0, 480.0, 800.0, 600.0, 1.0);
        let zoomed = RenderTransform::cover_fit(640.0, 480.0, 800.0, 600.0, 2.0);
        assert!((zoomed.scale - base.scale * 2.0).abs() < 1e-5);

        // Symmetric crop: overflow on the left equals overflow on the right.
        let (w, h) = zoomed.drawn_size();
        let right_overflow = zoomed.dx + w - 800.0;
        let bottom_overflow = zoomed.dy + h - 600.0;
        assert!((-zoomed.dx - right_overflow).abs() < 1e-3);
        assert!((-zoomed.dy - bottom_overflow).abs() < 1e-3);

        // Frame center maps to canvas center.
        let c = zoomed.project(Landmark::new(0.5, 0.5));
        assert!((c.x - 400.0).abs() < 1e-3 && (c.y - 300.0).abs() < 1e-3);
    }

    #[test]
    fn zoom_is_clamped() {
        assert_eq!(clamp_zoom(0.2), MIN_ZOOM);
        assert_eq!(clamp_zoom(9.0), MAX_ZOOM);
        assert_eq!(clamp_zoom(f32::NAN), MIN_ZOOM);
        let a = RenderTransform::cover_fit(640.0, 480.0, 640.0, 480.0, 5.0);
        let b = RenderTransform::cover_fit(640.0, 480.0, 640.0, 480.0, 2.5);
        assert_eq!(a, b);
    }

    #[test]
    fn projection_matches_formula() {
        let t = RenderTransform::cover_fit(640.0, 360.0, 500.0, 500.0, 1.2);
        let lm = Landmark::new(0.25, 0.8);
        let p = t.project(lm);
        assert!((p.x - (0.25 * 640.0 * t.scale + t.dx)).abs() < 1e-4);
        assert!((p.y - (0.8 * 360.0 * t.scale + t.dy)).abs() < 1e-4);
    }
}
