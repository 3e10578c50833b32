//! Immediate-mode 2D backend on a tiny-skia layer.
//!
//! Every region is painted into one reused off-screen layer at its target
//! opacity, softened, cut, and then composited onto the canvas with the
//! region's blend mode.

use tiny_skia::{
    Color, FillRule, FilterQuality, GradientStop, LineCap, LineJoin, Paint, PathBuilder, Pixmap,
    PixmapPaint, RadialGradient, SpreadMode, Stroke, Transform,
};

use super::{feather_and_cut, FrameContext, OverlayRenderer};
use crate::canvas::{layer_like, Canvas};
use crate::color::Rgb;
use crate::decal::{place_decal, profile, DecalLookup, DecalOverlayManager, DecalProfile, EyeAxis};
use crate::error::{Result, TryOnError};
use crate::geometry::{
    eye, Side, FACE_OVAL, LEFT_BROW, LEFT_EYE, LEFT_EYE_OPENING, LEFT_NOSTRIL,
    LIPS_OUTER, RIGHT_BROW, RIGHT_EYE, RIGHT_EYE_OPENING, RIGHT_NOSTRIL,
};
use crate::landmarks::{Bounds, Point, ProjectedFace};
use crate::raster::{erase_polygon, feather_layer, polygon_path, polyline_path, subtract_mask};
use crate::region::Region;
use crate::skin::SkinMaskEngine;
use crate::style::RegionStyle;

/// Forehead extension of the tracked oval, fraction of face height.
pub const FOREHEAD_LIFT: f32 = 0.12;

/// Face oval with its upper half pushed up toward the hairline. The lift
/// grows from nothing at the oval's vertical center to [`FOREHEAD_LIFT`] at
/// the top; jaw and chin points are untouched.
pub fn extended_oval(face: &ProjectedFace) -> Vec<Point> {
    let oval = face.polygon(&FACE_OVAL);
    let Some(b) = Bounds::of(&oval) else {
        return oval;
    };
    let mid = b.center().y;
    let span = mid - b.min_y;
    if span <= 0.0 {
        return oval;
    }
    let lift = b.height() * FOREHEAD_LIFT;
    oval.into_iter()
        .map(|p| {
            if p.y < mid {
                Point::new(p.x, p.y - lift * (mid - p.y) / span)
            } else {
                p
            }
        })
        .collect()
}

fn short_side(points: &[Point]) -> f32 {
    Bounds::of(points).map(|b| b.width().min(b.height())).unwrap_or(0.0)
}

fn solid(color: Rgb, opacity: f32) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(color.to_skia(opacity));
    paint.anti_alias = true;
    paint
}

fn fill_polygon(layer: &mut Pixmap, points: &[Point], paint: &Paint, region: Region) -> Result<()> {
    let path = polygon_path(points).ok_or_else(|| TryOnError::draw(region.as_str(), "degenerate polygon"))?;
    layer.fill_path(&path, paint, FillRule::Winding, Transform::identity(), None);
    Ok(())
}

/// Elliptical radial gradient fading to nothing at the rim. A unit-circle
/// gradient is drawn through a rotate + non-uniform scale, so the ellipse is
/// exact and the falloff follows it.
pub fn fill_gradient_ellipse(
    layer: &mut Pixmap,
    center: Point,
    radii: (f32, f32),
    angle: f32,
    color: Rgb,
    opacity: f32,
) -> Result<()> {
    let (rx, ry) = radii;
    if !(rx > 0.5 && ry > 0.5) {
        return Err(TryOnError::draw("ellipse", format!("radii too small ({rx:.1}, {ry:.1})")));
    }
    let stops = vec![
        GradientStop::new(0.0, color.to_skia(opacity)),
        GradientStop::new(0.55, color.to_skia(opacity * 0.6)),
        GradientStop::new(1.0, color.to_skia(0.0)),
    ];
    let origin = tiny_skia::Point::from_xy(0.0, 0.0);
    let shader = RadialGradient::new(origin, origin, 1.0, stops, SpreadMode::Pad, Transform::identity())
        .ok_or_else(|| TryOnError::draw("ellipse", "gradient rejected"))?;
    let path = PathBuilder::from_circle(0.0, 0.0, 1.0).ok_or_else(|| TryOnError::draw("ellipse", "no unit circle"))?;
    let mut paint = Paint::default();
    paint.shader = shader;
    paint.anti_alias = true;
    let (sin, cos) = angle.sin_cos();
    let ts = Transform::from_row(rx * cos, rx * sin, -ry * sin, ry * cos, center.x, center.y);
    layer.fill_path(&path, &paint, FillRule::Winding, ts, None);
    Ok(())
}

/* ------------------------------------------------------------ regions */

fn paint_lips(layer: &mut Pixmap, face: &ProjectedFace, color: Rgb, style: &RegionStyle, scratch: &mut Vec<u8>) -> Result<()> {
    let outer = face.polygon(&LIPS_OUTER);
    fill_polygon(layer, &outer, &solid(color, style.opacity), Region::Lips)?;
    feather_and_cut(layer, face, Region::Lips, style.feather_radius(short_side(&outer)), scratch);
    Ok(())
}

fn paint_brows(layer: &mut Pixmap, face: &ProjectedFace, color: Rgb, style: &RegionStyle, scratch: &mut Vec<u8>) -> Result<()> {
    let paint = solid(color, style.opacity);
    let mut side = f32::INFINITY;
    for s in Side::BOTH {
        let brow = face.polygon(eye(s).brow);
        fill_polygon(layer, &brow, &paint, Region::Eyebrows)?;
        side = side.min(short_side(&brow));
    }
    feather_layer(layer, style.feather_radius(side), scratch);
    Ok(())
}

/// Lid shadow: centered a little toward the temple and lifted toward the
/// brow arch, tall as roughly half the lid-to-brow gap.
pub fn eyeshadow_ellipse(face: &ProjectedFace, side: Side) -> (Point, (f32, f32), f32) {
    let e = eye(side);
    let axis = EyeAxis::new(face, side);
    let outer = face.at(e.outer);
    let brow = face.at(e.brow_peak);
    let center = axis.origin.lerp(outer, 0.15).lerp(brow, 0.45);
    let rx = axis.width * 0.62;
    let ry = face.at(e.lid_peak).distance(brow) * 0.55;
    (center, (rx, ry), axis.angle)
}

/// Under-eye: dropped below the lower lid along the eye's local down axis.
pub fn concealer_ellipse(face: &ProjectedFace, side: Side) -> (Point, (f32, f32), f32) {
    let e = eye(side);
    let axis = EyeAxis::new(face, side);
    let (sin, cos) = axis.angle.sin_cos();
    let down = Point::new(-sin, cos);
    let center = face.at(e.lower_lid) + down * (axis.width * 0.35);
    (center, (axis.width * 0.55, axis.width * 0.28), axis.angle)
}

pub fn blush_ellipse(face: &ProjectedFace, side: Side) -> (Point, (f32, f32), f32) {
    let fw = Bounds::of(&face.polygon(&FACE_OVAL)).map(|b| b.width()).unwrap_or(0.0);
    let (l, r) = (face.at(LEFT_EYE.outer), face.at(RIGHT_EYE.outer));
    let roll = (r.y - l.y).atan2(r.x - l.x);
    (face.at(eye(side).cheek), (fw * 0.13, fw * 0.09), roll)
}

type EllipseFn = fn(&ProjectedFace, Side) -> (Point, (f32, f32), f32);

fn paint_ellipses(
    layer: &mut Pixmap,
    face: &ProjectedFace,
    color: Rgb,
    style: &RegionStyle,
    scratch: &mut Vec<u8>,
    region: Region,
    ellipse: EllipseFn,
) -> Result<()> {
    let mut shortest = f32::INFINITY;
    for side in Side::BOTH {
        let (center, (rx, ry), angle) = ellipse(face, side);
        fill_gradient_ellipse(layer, center, (rx, ry), angle, color, style.opacity)?;
        shortest = shortest.min(2.0 * rx.min(ry));
    }
    feather_and_cut(layer, face, region, style.feather_radius(shortest), scratch);
    Ok(())
}

const FOUNDATION_HOLES: [&[u16]; 7] = [
    &LEFT_EYE_OPENING,
    &RIGHT_EYE_OPENING,
    &LIPS_OUTER,
    &LEFT_NOSTRIL,
    &RIGHT_NOSTRIL,
    &LEFT_BROW,
    &RIGHT_BROW,
];

fn paint_foundation(
    layer: &mut Pixmap,
    canvas: &Canvas,
    face: &ProjectedFace,
    color: Rgb,
    style: &RegionStyle,
    scratch: &mut Vec<u8>,
    skin: &mut SkinMaskEngine,
) -> Result<()> {
    let oval = extended_oval(face);
    fill_polygon(layer, &oval, &solid(color, style.opacity), Region::Foundation)?;
    for hole in FOUNDATION_HOLES {
        erase_polygon(layer, &face.polygon(hole));
    }
    match skin.build(canvas, face, &oval) {
        Ok(Some(mask)) => {
            subtract_mask(layer, mask);
        }
        Ok(None) => {}
        Err(e) => log::debug!("[SKIN] hair cutout skipped: {e}"),
    }
    feather_layer(layer, style.feather_radius(short_side(&oval)), scratch);
    Ok(())
}

fn draw_decal(layer: &mut Pixmap, face: &ProjectedFace, side: Side, profile: DecalProfile, img: &Pixmap, opacity: f32) {
    let aspect = img.height() as f32 / img.width().max(1) as f32;
    if let Some(p) = place_decal(face, side, profile, aspect) {
        let paint = PixmapPaint {
            opacity: opacity.clamp(0.0, 1.0),
            blend_mode: tiny_skia::BlendMode::SourceOver,
            quality: FilterQuality::Bilinear,
        };
        layer.draw_pixmap(0, 0, img.as_ref(), &paint, p.to_skia(img.width(), img.height()), None);
    }
}

/// Drawn when no decal is configured: the upper-lid arc as a round stroke,
/// lifted a little for lashes.
fn stroke_lid(layer: &mut Pixmap, face: &ProjectedFace, side: Side, region: Region, color: Rgb, opacity: f32) -> Result<()> {
    let axis = EyeAxis::new(face, side);
    let (width, lift) = match region {
        Region::Eyelash => (0.09 * axis.width, 0.05 * axis.width),
        _ => (0.045 * axis.width, 0.0),
    };
    let (sin, cos) = axis.angle.sin_cos();
    let up = Point::new(sin, -cos) * lift;
    let arc: Vec<Point> = face.polygon(eye(side).upper_lid).into_iter().map(|p| p + up).collect();
    let path = polyline_path(&arc).ok_or_else(|| TryOnError::draw(region.as_str(), "degenerate lid arc"))?;
    let stroke = Stroke {
        width: width.max(1.0),
        line_cap: LineCap::Round,
        line_join: LineJoin::Round,
        ..Stroke::default()
    };
    layer.stroke_path(&path, &solid(color, opacity), &stroke, Transform::identity(), None);
    Ok(())
}

fn paint_eye_decals(
    layer: &mut Pixmap,
    decals: &mut DecalOverlayManager,
    face: &ProjectedFace,
    region: Region,
    color: Rgb,
    style: &RegionStyle,
    scratch: &mut Vec<u8>,
) -> Result<()> {
    let profile = profile(region).ok_or_else(|| TryOnError::draw(region.as_str(), "not a decal region"))?;
    let mut eye_width = f32::INFINITY;
    for side in Side::BOTH {
        eye_width = eye_width.min(EyeAxis::new(face, side).width);
        match decals.request(region, side, color) {
            DecalLookup::Ready(img) => draw_decal(layer, face, side, profile, &img, style.opacity),
            DecalLookup::NotConfigured => stroke_lid(layer, face, side, region, color, style.opacity)?,
            // Not drawn until it lands; failed stays undrawn.
            DecalLookup::Pending | DecalLookup::Failed => {}
        }
    }
    feather_layer(layer, style.feather_radius(eye_width), scratch);
    Ok(())
}

/* ------------------------------------------------------------ renderer */

#[derive(Default)]
pub struct CanvasRenderer {
    layer: Option<Pixmap>,
    scratch: Vec<u8>,
    skin: SkinMaskEngine,
}

/// Cleared layer matching the canvas, reallocated only on size change.
fn prepare_layer<'a>(slot: &'a mut Option<Pixmap>, canvas: &Canvas) -> Result<&'a mut Pixmap> {
    let fits = slot
        .as_ref()
        .is_some_and(|l| l.width() == canvas.width() && l.height() == canvas.height());
    if !fits {
        *slot = Some(layer_like(canvas)?);
    }
    let layer = slot
        .as_mut()
        .ok_or_else(|| TryOnError::RenderSurfaceMissing("overlay layer".into()))?;
    layer.fill(Color::TRANSPARENT);
    Ok(layer)
}

impl OverlayRenderer for CanvasRenderer {
    fn name(&self) -> &'static str {
        "2D"
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        if self.layer.as_ref().is_some_and(|l| l.width() != width || l.height() != height) {
            self.layer = None;
        }
        Ok(())
    }

    fn draw_region(&mut self, canvas: &mut Canvas, ctx: &mut FrameContext<'_>, region: Region, color: Rgb) -> Result<()> {
        let style = ctx.styles.resolve(region);
        let face = ctx.face;
        let Self { layer, scratch, skin } = self;
        let layer = prepare_layer(layer, canvas)?;
        match region {
            Region::Lips => paint_lips(layer, face, color, &style, scratch)?,
            Region::Eyebrows => paint_brows(layer, face, color, &style, scratch)?,
            Region::Eyeshadow => paint_ellipses(layer, face, color, &style, scratch, region, eyeshadow_ellipse)?,
            Region::Concealer => paint_ellipses(layer, face, color, &style, scratch, region, concealer_ellipse)?,
            Region::Blush => paint_ellipses(layer, face, color, &style, scratch, region, blush_ellipse)?,
            Region::Foundation => paint_foundation(layer, canvas, face, color, &style, scratch, skin)?,
            Region::Eyelash | Region::Eyeliner => {
                paint_eye_decals(layer, ctx.decals, face, region, color, &style, scratch)?
            }
        }
        canvas.composite(layer, style.blend);
        Ok(())
    }

    fn clear(&mut self) {
        self.layer = None;
    }
}
