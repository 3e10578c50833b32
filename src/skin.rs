//! Hair-vs-skin classification above the brows, used to keep foundation off
//! fringes and hairlines.
//!
//! The reference skin tone comes from the nose bridge, which hair never
//! covers. Pixels in a band between the extended forehead and the brows are
//! marked as hair when they are both far from that tone and clearly darker.
//! Both thresholds scale with the reference luminance so darker skin is not
//! read as hair.

use tiny_skia::PixmapRef;

use crate::canvas::Canvas;
use crate::error::Result;
use crate::geometry::{LEFT_BROW, RIGHT_BROW, SKIN_REFERENCE};
use crate::landmarks::{Bounds, Point, ProjectedFace};
use crate::raster::{blur_mask, point_in_polygon};
use crate::types::Mask;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkinMaskParams {
    /// Sample every `stride` pixels; hits are stamped as stride x stride blocks.
    pub stride: usize,
    /// Horizontal inset from the oval edge, fraction of face width.
    pub inset_x: f32,
    /// Vertical inset from the oval top, fraction of face height.
    pub inset_y: f32,
    /// Gap kept above the brows, fraction of face height.
    pub brow_margin: f32,
    /// Color distance threshold = max(min_distance, ref_luma * distance_ratio).
    pub min_distance: f32,
    pub distance_ratio: f32,
    /// Required darkening = max(min_luma_drop, ref_luma * luma_drop_ratio).
    pub min_luma_drop: f32,
    pub luma_drop_ratio: f32,
    pub blur_radius: usize,
}

impl Default for SkinMaskParams {
    fn default() -> Self {
        Self {
            stride: 2,
            inset_x: 0.08,
            inset_y: 0.03,
            brow_margin: 0.02,
            min_distance: 28.0,
            distance_ratio: 0.35,
            min_luma_drop: 12.0,
            luma_drop_ratio: 0.25,
            blur_radius: 2,
        }
    }
}

#[inline]
fn luma(r: f32, g: f32, b: f32) -> f32 {
    0.299 * r + 0.587 * g + 0.114 * b
}

#[inline]
fn rgb_at(pixels: &PixmapRef<'_>, x: u32, y: u32) -> Option<(f32, f32, f32)> {
    let c = pixels.pixel(x, y)?.demultiply();
    Some((c.red() as f32, c.green() as f32, c.blue() as f32))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkinReference {
    pub rgb: (f32, f32, f32),
    pub luma: f32,
    pub samples: usize,
}

/// Average 3x3 neighbourhoods around the nose-bridge landmarks.
pub fn sample_skin_reference(pixels: &PixmapRef<'_>, face: &ProjectedFace) -> Option<SkinReference> {
    let (w, h) = (pixels.width() as i32, pixels.height() as i32);
    let (mut r, mut g, mut b, mut n) = (0.0, 0.0, 0.0, 0usize);
    for &idx in &SKIN_REFERENCE {
        let p = face.at(idx);
        let (px, py) = (p.x.round() as i32, p.y.round() as i32);
        for dy in -1..=1 {
            for dx in -1..=1 {
                let (x, y) = (px + dx, py + dy);
                if x < 0 || y < 0 || x >= w || y >= h {
                    continue;
                }
                if let Some((sr, sg, sb)) = rgb_at(pixels, x as u32, y as u32) {
                    r += sr;
                    g += sg;
                    b += sb;
                    n += 1;
                }
            }
        }
    }
    if n == 0 {
        return None;
    }
    let k = n as f32;
    let rgb = (r / k, g / k, b / k);
    Some(SkinReference { rgb, luma: luma(rgb.0, rgb.1, rgb.2), samples: n })
}

pub struct SkinMaskEngine {
    params: SkinMaskParams,
    mask: Mask,
    scratch: Vec<f32>,
}

impl Default for SkinMaskEngine {
    fn default() -> Self {
        Self::new(SkinMaskParams::default())
    }
}

impl SkinMaskEngine {
    pub fn new(params: SkinMaskParams) -> Self {
        Self { params, mask: Mask::new(0, 0), scratch: Vec::new() }
    }

    /// Build the hair mask for this frame.
    ///
    /// `Err(PixelAccessDenied)` when the canvas may not be read; `Ok(None)`
    /// when there is nothing to cut (no reference samples, empty band, no
    /// hair found). Callers treat both as "draw foundation without it".
    pub fn build(&mut self, canvas: &Canvas, face: &ProjectedFace, oval: &[Point]) -> Result<Option<&Mask>> {
        let pixels = canvas.read_pixels()?;
        let Some(reference) = sample_skin_reference(&pixels, face) else {
            log::debug!("[SKIN] no reference samples in frame");
            return Ok(None);
        };
        let Some(bounds) = Bounds::of(oval) else {
            return Ok(None);
        };
        let p = self.params;
        let (fw, fh) = (bounds.width(), bounds.height());
        let brow_top = face
            .polygon(&LEFT_BROW)
            .into_iter()
            .chain(face.polygon(&RIGHT_BROW))
            .map(|pt| pt.y)
            .fold(f32::INFINITY, f32::min);

        let (w, h) = (pixels.width() as usize, pixels.height() as usize);
        let y0 = (bounds.min_y + p.inset_y * fh).max(0.0) as usize;
        let y1 = ((brow_top - p.brow_margin * fh).min(h as f32)).max(0.0) as usize;
        let inset_x = p.inset_x * fw;
        let x0 = (bounds.min_x + inset_x).max(0.0) as usize;
        let x1 = ((bounds.max_x - inset_x).min(w as f32)).max(0.0) as usize;
        if y0 >= y1 || x0 >= x1 {
            return Ok(None);
        }

        let dist_thr = p.min_distance.max(reference.luma * p.distance_ratio);
        let drop_thr = p.min_luma_drop.max(reference.luma * p.luma_drop_ratio);
        let inset_y = p.inset_y * fh;
        let stride = p.stride.max(1);

        self.mask.reset(w, h);
        let mut hits = 0usize;
        for y in (y0..y1).step_by(stride) {
            for x in (x0..x1).step_by(stride) {
                let (fx, fy) = (x as f32 + 0.5, y as f32 + 0.5);
                // Stay clear of the polygon seams on both sides and above.
                if !point_in_polygon(fx - inset_x, fy, oval)
                    || !point_in_polygon(fx + inset_x, fy, oval)
                    || !point_in_polygon(fx, fy - inset_y, oval)
                {
                    continue;
                }
                let Some((r, g, b)) = rgb_at(&pixels, x as u32, y as u32) else {
                    continue;
                };
                let (rr, rg, rb) = reference.rgb;
                let dist = ((r - rr).powi(2) + (g - rg).powi(2) + (b - rb).powi(2)).sqrt();
                let drop = reference.luma - luma(r, g, b);
                if dist > dist_thr && drop > drop_thr {
                    hits += 1;
                    for sy in y..(y + stride).min(h) {
                        let row = sy * w;
                        for sx in x..(x + stride).min(w) {
                            self.mask.alpha[row + sx] = 1.0;
                        }
                    }
                }
            }
        }
        if hits == 0 {
            return Ok(None);
        }
        log::trace!("[SKIN] {hits} hair samples (ref luma {:.0})", reference.luma);
        blur_mask(&mut self.mask, p.blur_radius, &mut self.scratch);
        Ok(Some(&self.mask))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::SyntheticFace;
    use crate::transform::RenderTransform;
    use crate::types::FrameBuffer;

    fn setup(skin: u32, top_band: Option<u32>, clean: bool) -> (Canvas, ProjectedFace, Vec<Point>) {
        let t = RenderTransform::cover_fit(200.0, 200.0, 200.0, 200.0, 1.0);
        let face = ProjectedFace::project(&SyntheticFace::default().frame().unwrap(), &t);
        let mut frame = FrameBuffer::filled(200, 200, skin);
        if let Some(hair) = top_band {
            // Fringe across the forehead, well above the brows.
            for y in 40..58 {
                for x in 0..200 {
                    frame.put(x, y, hair);
                }
            }
        }
        let mut canvas = Canvas::new(200, 200).unwrap();
        canvas.draw_video(&frame, &t, clean);
        let oval = face.polygon(&crate::geometry::FACE_OVAL);
        (canvas, face, oval)
    }

    #[test]
    fn dark_fringe_is_marked_as_hair() {
        let (canvas, face, oval) = setup(0x00_E0_B0_90, Some(0x00_20_18_10), true);
        let mut engine = SkinMaskEngine::default();
        let mask = engine.build(&canvas, &face, &oval).unwrap().expect("hair found");
        assert!(mask.at(100, 50) > 0.5);
        // Nose bridge stays skin.
        assert_eq!(mask.at(100, 100), 0.0);
    }

    #[test]
    fn uniform_dark_skin_is_not_hair() {
        let (canvas, face, oval) = setup(0x00_4A_30_22, None, true);
        let mut engine = SkinMaskEngine::default();
        assert!(engine.build(&canvas, &face, &oval).unwrap().is_none());
    }

    #[test]
    fn unreadable_canvas_is_an_error_not_a_panic() {
        let (canvas, face, oval) = setup(0x00_E0_B0_90, Some(0x00_20_18_10), false);
        let mut engine = SkinMaskEngine::default();
        assert!(engine.build(&canvas, &face, &oval).is_err());
    }
}
