// Raster helpers shared by both backends: paths, polygon tests, feather blur
// and alpha-subtract passes on off-screen layers.
use tiny_skia::{FillRule, Paint, Path, PathBuilder, Pixmap, Transform};

use crate::landmarks::Point;
use crate::types::Mask;

/// Box passes used for feathering; three boxes approximate a gaussian.
pub const FEATHER_PASSES: usize = 3;

/// Closed polygon path. None for degenerate input.
pub fn polygon_path(points: &[Point]) -> Option<Path> {
    if points.len() < 3 {
        return None;
    }
    let mut pb = PathBuilder::new();
    pb.move_to(points[0].x, points[0].y);
    for p in &points[1..] {
        pb.line_to(p.x, p.y);
    }
    pb.close();
    pb.finish()
}

/// Open polyline path for strokes.
pub fn polyline_path(points: &[Point]) -> Option<Path> {
    if points.len() < 2 {
        return None;
    }
    let mut pb = PathBuilder::new();
    pb.move_to(points[0].x, points[0].y);
    for p in &points[1..] {
        pb.line_to(p.x, p.y);
    }
    pb.finish()
}

/// Even-odd ray cast.
pub fn point_in_polygon(x: f32, y: f32, poly: &[Point]) -> bool {
    let n = poly.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (pi, pj) = (poly[i], poly[j]);
        if (pi.y > y) != (pj.y > y) {
            let x_cross = (pj.x - pi.x) * (y - pi.y) / (pj.y - pi.y) + pi.x;
            if x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Alpha-subtract a polygon from a layer (canvas `destination-out`).
pub fn erase_polygon(layer: &mut Pixmap, points: &[Point]) {
    if let Some(path) = polygon_path(points) {
        let mut paint = Paint::default();
        paint.set_color_rgba8(0, 0, 0, 255);
        paint.blend_mode = tiny_skia::BlendMode::DestinationOut;
        paint.anti_alias = true;
        layer.fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
    }
}

/// Scale every premultiplied pixel by `1 - mask`. Mask must match the layer.
pub fn subtract_mask(layer: &mut Pixmap, mask: &Mask) -> bool {
    if mask.width != layer.width() as usize || mask.height != layer.height() as usize {
        return false;
    }
    for (px, m) in layer.data_mut().chunks_exact_mut(4).zip(mask.alpha.iter()) {
        if *m <= 0.0 {
            continue;
        }
        let keep = 1.0 - m.clamp(0.0, 1.0);
        for c in px.iter_mut() {
            *c = (*c as f32 * keep).round() as u8;
        }
    }
    true
}

/// Feather a premultiplied RGBA layer in place.
pub fn feather_layer(layer: &mut Pixmap, radius: usize, scratch: &mut Vec<u8>) {
    if radius == 0 {
        return;
    }
    let (w, h) = (layer.width() as usize, layer.height() as usize);
    for _ in 0..FEATHER_PASSES {
        box_blur_u8::<4>(layer.data_mut(), w, h, radius, scratch);
    }
}

/// Soften a mask in place (single box pass).
pub fn blur_mask(mask: &mut Mask, radius: usize, scratch: &mut Vec<f32>) {
    if radius == 0 || mask.width == 0 || mask.height == 0 {
        return;
    }
    let (w, h) = (mask.width, mask.height);
    scratch.clear();
    scratch.resize(w * h, 0.0);
    let r = radius as i32;
    let win = (2 * r + 1) as f32;

    // Horizontal: mask -> scratch, edges extended.
    for y in 0..h {
        let row = y * w;
        let mut sum = mask.alpha[row] * (r as f32 + 1.0);
        for x in 1..=r {
            sum += mask.alpha[row + (x.min(w as i32 - 1)) as usize];
        }
        for x in 0..w as i32 {
            scratch[row + x as usize] = sum / win;
            let left = (x - r).max(0) as usize;
            let right = (x + r + 1).min(w as i32 - 1) as usize;
            sum += mask.alpha[row + right] - mask.alpha[row + left];
        }
    }

    // Vertical: scratch -> mask.
    for x in 0..w {
        let mut sum = scratch[x] * (r as f32 + 1.0);
        for y in 1..=r {
            sum += scratch[(y.min(h as i32 - 1)) as usize * w + x];
        }
        for y in 0..h as i32 {
            mask.alpha[y as usize * w + x] = (sum / win).clamp(0.0, 1.0);
            let top = (y - r).max(0) as usize;
            let bottom = (y + r + 1).min(h as i32 - 1) as usize;
            sum += scratch[bottom * w + x] - scratch[top * w + x];
        }
    }
}

/// Separable sliding-window box blur over `C` interleaved u8 channels.
/// Edge pixels are extended so borders do not darken.
fn box_blur_u8<const C: usize>(
    data: &mut [u8],
    w: usize,
    h: usize,
    radius: usize,
    tmp: &mut Vec<u8>,
) {
    if w == 0 || h == 0 {
        return;
    }
    tmp.clear();
    tmp.resize(data.len(), 0);
    let r = radius as i32;
    let win = (2 * r + 1) as u32;
    let (wi, hi) = (w as i32, h as i32);

    /* ---- Pass 1: horizontal, data -> tmp ---- */
    for y in 0..h {
        let row = y * w;
        let mut sums = [0u32; C];
        for c in 0..C {
            sums[c] = data[row * C + c] as u32 * (r as u32 + 1);
        }
        for x in 1..=r {
            let xr = x.min(wi - 1) as usize;
            for c in 0..C {
                sums[c] += data[(row + xr) * C + c] as u32;
            }
        }
        for x in 0..wi {
            let idx = (row + x as usize) * C;
            for c in 0..C {
                tmp[idx + c] = (sums[c] / win) as u8;
            }
            let left = (x - r).max(0) as usize;
            let right = (x + r + 1).min(wi - 1) as usize;
            for c in 0..C {
                sums[c] = sums[c] + data[(row + right) * C + c] as u32
                    - data[(row + left) * C + c] as u32;
            }
        }
    }

    /* ---- Pass 2: vertical, tmp -> data ---- */
    for x in 0..w {
        let mut sums = [0u32; C];
        for c in 0..C {
            sums[c] = tmp[x * C + c] as u32 * (r as u32 + 1);
        }
        for y in 1..=r {
            let yr = y.min(hi - 1) as usize;
            for c in 0..C {
                sums[c] += tmp[(yr * w + x) * C + c] as u32;
            }
        }
        for y in 0..hi {
            let idx = (y as usize * w + x) * C;
            for c in 0..C {
                data[idx + c] = (sums[c] / win) as u8;
            }
            let top = (y - r).max(0) as usize;
            let bottom = (y + r + 1).min(hi - 1) as usize;
            for c in 0..C {
                sums[c] = sums[c] + tmp[(bottom * w + x) * C + c] as u32
                    - tmp[(top * w + x) * C + c] as u32;
            }
        }
    }
}
