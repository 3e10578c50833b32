//! Overlay backends.
//!
//! A backend is chosen once when the session starts and everything else
//! talks to it through [`OverlayRenderer`]. A failing region is logged and
//! skipped; the rest of the frame still draws.

pub mod canvas2d;
pub mod mesh;

use tiny_skia::Pixmap;

use crate::canvas::Canvas;
use crate::color::Rgb;
use crate::decal::DecalOverlayManager;
use crate::error::Result;
use crate::geometry::{eye, Side, LIPS_INNER};
use crate::landmarks::{Point, ProjectedFace};
use crate::raster::{erase_polygon, feather_layer};
use crate::region::{Region, RegionSelection};
use crate::style::StyleResolver;

pub use canvas2d::CanvasRenderer;
pub use mesh::MeshRenderer;

/// Inputs every region draw reads from.
pub struct FrameContext<'a> {
    pub face: &'a ProjectedFace,
    pub styles: &'a StyleResolver,
    pub decals: &'a mut DecalOverlayManager,
}

pub trait OverlayRenderer {
    fn name(&self) -> &'static str;

    /// True for the GPU mesh path.
    fn is_gpu(&self) -> bool {
        false
    }

    /// Keep internal surfaces the same pixel size as the canvas.
    fn resize(&mut self, width: u32, height: u32) -> Result<()>;

    fn draw_region(
        &mut self,
        canvas: &mut Canvas,
        ctx: &mut FrameContext<'_>,
        region: Region,
        color: Rgb,
    ) -> Result<()>;

    /// Drop per-session surfaces. Process-lifetime resources stay.
    fn clear(&mut self) {}

    /// Draw every selected region back to front. Returns how many drew.
    fn render(
        &mut self,
        canvas: &mut Canvas,
        face: Option<&ProjectedFace>,
        selection: &RegionSelection,
        styles: &StyleResolver,
        decals: &mut DecalOverlayManager,
    ) -> usize {
        let Some(face) = face else {
            return 0;
        };
        let mut ctx = FrameContext { face, styles, decals };
        draw_selection(self, canvas, &mut ctx, selection)
    }
}

/// The per-frame region loop shared by every backend.
pub fn draw_selection<R: OverlayRenderer + ?Sized>(
    renderer: &mut R,
    canvas: &mut Canvas,
    ctx: &mut FrameContext<'_>,
    selection: &RegionSelection,
) -> usize {
    let mut drawn = 0;
    for (region, color) in selection.in_draw_order() {
        match renderer.draw_region(canvas, ctx, region, color) {
            Ok(()) => drawn += 1,
            Err(e) => log::debug!("[{}] {region} skipped: {e}", renderer.name()),
        }
    }
    drawn
}

/// Openings a region must leave bare: the mouth for lips, both eyes for the
/// lid and under-eye ellipses.
pub fn region_holes(face: &ProjectedFace, region: Region) -> Vec<Vec<Point>> {
    match region {
        Region::Lips => vec![face.polygon(&LIPS_INNER)],
        Region::Eyeshadow | Region::Concealer => Side::BOTH.iter().map(|s| face.polygon(eye(*s).opening)).collect(),
        _ => Vec::new(),
    }
}

/// Last step of every painted region on both backends. Holes are cut after
/// the blur so no color bleeds back into them.
pub fn feather_and_cut(layer: &mut Pixmap, face: &ProjectedFace, region: Region, radius: usize, scratch: &mut Vec<u8>) {
    feather_layer(layer, radius, scratch);
    for hole in region_holes(face, region) {
        erase_polygon(layer, &hole);
    }
}

/// Which backend the session asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendChoice {
    /// GPU when it comes up, 2D otherwise.
    #[default]
    Auto,
    Canvas,
    Mesh,
}

/// Pick the backend once. The GPU path is built by `init_mesh` so callers
/// (and tests) decide how the device is obtained; any failure lands on the
/// 2D renderer without surfacing.
pub fn select_backend<F>(choice: BackendChoice, width: u32, height: u32, init_mesh: F) -> Box<dyn OverlayRenderer>
where
    F: FnOnce(u32, u32) -> Result<MeshRenderer>,
{
    if choice != BackendChoice::Canvas {
        match init_mesh(width, height) {
            Ok(mesh) => {
                log::info!("[MESH] GPU overlay ready ({width}x{height})");
                return Box::new(mesh);
            }
            Err(e) => log::debug!("[MESH] falling back to 2D: {e}"),
        }
    }
    Box::new(CanvasRenderer::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TryOnError;
    use crate::geometry::{LEFT_EYE_OPENING, LIPS_OUTER};
    use crate::landmarks::Bounds;
    use crate::raster::{point_in_polygon, polygon_path};
    use crate::style::default_style;
    use crate::synthetic::SyntheticFace;
    use crate::transform::RenderTransform;

    #[test]
    fn failing_gpu_init_falls_back_to_canvas() {
        let r = select_backend(BackendChoice::Auto, 64, 64, |_, _| {
            Err(TryOnError::BackendUnavailable("no adapter".into()))
        });
        assert_eq!(r.name(), "2D");
    }

    fn face(size: f32) -> ProjectedFace {
        let frame = SyntheticFace::default().frame().unwrap();
        ProjectedFace::project(&frame, &RenderTransform::cover_fit(size, size, size, size, 1.0))
    }

    // Pixels whose whole square lies inside the polygon.
    fn fully_inside(poly: &[Point], w: u32, h: u32) -> Vec<(u32, u32)> {
        let mut out = Vec::new();
        for y in 0..h {
            for x in 0..w {
                let (fx, fy) = (x as f32, y as f32);
                let corners = [(fx, fy), (fx + 1.0, fy), (fx, fy + 1.0), (fx + 1.0, fy + 1.0)];
                if corners.iter().all(|&(cx, cy)| point_in_polygon(cx, cy, poly)) {
                    out.push((x, y));
                }
            }
        }
        out
    }

    #[test]
    fn mouth_stays_bare_after_feathering() {
        for size in [400u32, 960] {
            let f = face(size as f32);
            let style = default_style(Region::Lips);
            let outer = f.polygon(&LIPS_OUTER);
            let short = Bounds::of(&outer).map(|b| b.width().min(b.height())).unwrap();
            let inner = f.polygon(&LIPS_INNER);
            let inside = fully_inside(&inner, size, size);
            assert!(!inside.is_empty());

            for radius in [style.feather_radius(short), 4] {
                // Same layer the stencil pass leaves: outer lips with the mouth already cut.
                let mut layer = Pixmap::new(size, size).unwrap();
                let mut paint = tiny_skia::Paint::default();
                paint.set_color_rgba8(204, 0, 51, 255);
                let path = polygon_path(&outer).unwrap();
                layer.fill_path(&path, &paint, tiny_skia::FillRule::Winding, tiny_skia::Transform::identity(), None);
                erase_polygon(&mut layer, &inner);

                feather_and_cut(&mut layer, &f, Region::Lips, radius, &mut Vec::new());
                for &(x, y) in &inside {
                    assert_eq!(layer.pixel(x, y).unwrap().alpha(), 0, "size {size} radius {radius} at ({x}, {y})");
                }
            }
        }
    }

    #[test]
    fn holes_follow_the_region() {
        let f = face(400.0);
        assert_eq!(region_holes(&f, Region::Lips).len(), 1);
        assert_eq!(region_holes(&f, Region::Eyeshadow).len(), 2);
        assert_eq!(region_holes(&f, Region::Concealer).len(), 2);
        assert!(region_holes(&f, Region::Blush).is_empty());
        assert_eq!(region_holes(&f, Region::Eyeshadow)[0], f.polygon(&LEFT_EYE_OPENING));
    }

    #[test]
    fn canvas_choice_never_touches_gpu() {
        let r = select_backend(BackendChoice::Canvas, 64, 64, |_, _| -> Result<MeshRenderer> {
            panic!("GPU init must not run")
        });
        assert_eq!(r.name(), "2D");
    }
}
