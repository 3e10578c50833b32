//! Lash and liner decals: fetch, recolor, rasterize, cache, and place on the
//! eye axis.
//!
//! Raw markup is fetched once per URL. Requests that arrive while a fetch is
//! in flight are queued as typed keys against that URL and built when the
//! text lands, so one URL is only ever fetched once. Failed fetches stay
//! failed for the life of the process. Colorized images are cached per
//! `(region, side, color)` and never rebuilt or recolored in place.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::thread;

use flume::{Receiver, Sender};
use resvg::usvg;
use tiny_skia::{Pixmap, Transform};

use crate::color::Rgb;
use crate::error::{Result, TryOnError};
use crate::geometry::{eye, Side};
use crate::landmarks::{Point, ProjectedFace};
use crate::region::Region;

/// Raster width of a decal; height follows the markup's aspect.
pub const DECAL_RASTER_WIDTH: u32 = 256;

/* ---------------------------------------------------------------- loading */

/// Asynchronous fetch of raw decal markup.
///
/// `start` begins one fetch; `poll` drains whatever has completed since the
/// last call. The manager never calls `start` twice for the same URL.
pub trait DecalLoader: Send {
    fn start(&mut self, url: &str);
    fn poll(&mut self) -> Vec<(String, Result<String>)>;
}

/// Reads local paths and `file://` URLs on a short-lived thread per fetch.
pub struct FsDecalLoader {
    tx: Sender<(String, Result<String>)>,
    rx: Receiver<(String, Result<String>)>,
}

impl Default for FsDecalLoader {
    fn default() -> Self {
        let (tx, rx) = flume::unbounded();
        Self { tx, rx }
    }
}

fn read_decal(url: &str) -> Result<String> {
    let path = url.strip_prefix("file://").unwrap_or(url);
    if path.contains("://") {
        return Err(TryOnError::AssetFetch {
            url: url.to_string(),
            reason: "only local paths and file:// URLs are supported".into(),
        });
    }
    std::fs::read_to_string(path)
        .map_err(|e| TryOnError::AssetFetch { url: url.to_string(), reason: e.to_string() })
}

impl DecalLoader for FsDecalLoader {
    fn start(&mut self, url: &str) {
        let tx = self.tx.clone();
        let url = url.to_string();
        thread::spawn(move || {
            let result = read_decal(&url);
            // Receiver gone means the manager was dropped; nothing to deliver to.
            let _ = tx.send((url, result));
        });
    }

    fn poll(&mut self) -> Vec<(String, Result<String>)> {
        self.rx.try_iter().collect()
    }
}

/* ---------------------------------------------------------------- colorize */

const PAINT_PROPERTIES: [&str; 2] = ["fill", "stroke"];

fn is_preserved(value: &str) -> bool {
    let v = value.trim().to_ascii_lowercase();
    matches!(v.as_str(), "none" | "inherit" | "transparent" | "currentcolor") || v.starts_with("url(")
}

#[inline]
fn is_name_boundary(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n' | b';' | b'{' | b'"' | b'\'')
}

fn skip_ws(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    i
}

/// If a `fill`/`stroke` attribute or declaration starts at `i`, the byte
/// range of its value.
fn paint_value_at(bytes: &[u8], i: usize) -> Option<(usize, usize)> {
    if i > 0 && !is_name_boundary(bytes[i - 1]) {
        return None;
    }
    let name = PAINT_PROPERTIES.iter().find(|n| bytes[i..].starts_with(n.as_bytes()))?;
    let j = skip_ws(bytes, i + name.len());
    match bytes.get(j)? {
        b'=' => {
            let q = skip_ws(bytes, j + 1);
            let quote = *bytes.get(q)?;
            if quote != b'"' && quote != b'\'' {
                return None;
            }
            let start = q + 1;
            let len = bytes[start..].iter().position(|&b| b == quote)?;
            Some((start, start + len))
        }
        b':' => {
            let start = skip_ws(bytes, j + 1);
            let mut end = start;
            while end < bytes.len() && !matches!(bytes[end], b';' | b'}' | b'"' | b'\'' | b'<' | b'!' | b'\n') {
                end += 1;
            }
            while end > start && bytes[end - 1].is_ascii_whitespace() {
                end -= 1;
            }
            (end > start).then_some((start, end))
        }
        _ => None,
    }
}

/// Replace every `fill`/`stroke` paint, in attributes and in inline or
/// stylesheet declarations, with `color`. `none`, `inherit`, `transparent`,
/// `currentColor` and `url(...)` references are left as they are, as are
/// neighbouring properties such as `fill-opacity` or `data-fill`.
///
/// Deterministic; applying it twice with the same color changes nothing.
pub fn colorize_svg(raw: &str, color: Rgb) -> String {
    let hex = color.to_hex();
    let bytes = raw.as_bytes();
    let mut out = String::with_capacity(raw.len());
    let mut copied = 0;
    let mut i = 0;
    while i < bytes.len() {
        match paint_value_at(bytes, i) {
            Some((start, end)) => {
                if !is_preserved(&raw[start..end]) {
                    out.push_str(&raw[copied..start]);
                    out.push_str(&hex);
                    copied = end;
                }
                i = end;
            }
            None => i += 1,
        }
    }
    out.push_str(&raw[copied..]);
    out
}

/// Rasterize markup at `width` pixels wide. `mirror` flips it horizontally.
pub fn rasterize_svg(svg: &str, width: u32, mirror: bool) -> std::result::Result<Pixmap, String> {
    let tree = usvg::Tree::from_str(svg, &usvg::Options::default()).map_err(|e| e.to_string())?;
    let size = tree.size();
    if size.width() <= 0.0 || size.height() <= 0.0 {
        return Err("decal has no size".into());
    }
    let w = width.max(1);
    let h = ((size.height() / size.width()) * w as f32).round().max(1.0) as u32;
    let mut pixmap = Pixmap::new(w, h).ok_or_else(|| format!("cannot allocate {w}x{h} decal"))?;
    let sx = w as f32 / size.width();
    let sy = h as f32 / size.height();
    let ts = if mirror {
        Transform::from_row(-sx, 0.0, 0.0, sy, w as f32, 0.0)
    } else {
        Transform::from_scale(sx, sy)
    };
    resvg::render(&tree, ts, &mut pixmap.as_mut());
    Ok(pixmap)
}

/* ---------------------------------------------------------------- cache */

/// Colorized image cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DecalKey {
    pub region: Region,
    pub side: Side,
    pub color: Rgb,
}

enum RawState {
    Pending(Vec<DecalKey>),
    Ready(Arc<str>),
    Failed,
}

/// Outcome of asking for a decal this frame.
#[derive(Clone)]
pub enum DecalLookup {
    /// No URL configured for the region.
    NotConfigured,
    Pending,
    Ready(Arc<Pixmap>),
    Failed,
}

pub struct DecalOverlayManager {
    loader: Box<dyn DecalLoader>,
    urls: HashMap<Region, String>,
    raw: HashMap<String, RawState>,
    images: HashMap<DecalKey, Arc<Pixmap>>,
    // Keys whose colorized markup would not rasterize.
    broken: HashSet<DecalKey>,
    raster_width: u32,
}

impl DecalOverlayManager {
    pub fn new(loader: Box<dyn DecalLoader>, urls: HashMap<Region, String>) -> Self {
        Self {
            loader,
            urls,
            raw: HashMap::new(),
            images: HashMap::new(),
            broken: HashSet::new(),
            raster_width: DECAL_RASTER_WIDTH,
        }
    }

    /// Number of colorized images held.
    pub fn cached_images(&self) -> usize {
        self.images.len()
    }

    pub fn request(&mut self, region: Region, side: Side, color: Rgb) -> DecalLookup {
        let key = DecalKey { region, side, color };
        if let Some(img) = self.images.get(&key) {
            return DecalLookup::Ready(img.clone());
        }
        if self.broken.contains(&key) {
            return DecalLookup::Failed;
        }
        let Some(url) = self.urls.get(&region) else {
            return DecalLookup::NotConfigured;
        };
        match self.raw.get_mut(url) {
            None => {
                log::debug!("[DECAL] fetching {url}");
                self.loader.start(url);
                self.raw.insert(url.clone(), RawState::Pending(vec![key]));
                DecalLookup::Pending
            }
            Some(RawState::Pending(queue)) => {
                if !queue.contains(&key) {
                    queue.push(key);
                }
                DecalLookup::Pending
            }
            Some(RawState::Ready(text)) => {
                let text = text.clone();
                self.build(key, &text)
            }
            Some(RawState::Failed) => DecalLookup::Failed,
        }
    }

    /// Absorb completed fetches and build images for the keys queued on them.
    pub fn pump(&mut self) {
        for (url, result) in self.loader.poll() {
            let queued = match self.raw.remove(&url) {
                Some(RawState::Pending(q)) => q,
                Some(done) => {
                    // Completed twice; keep the first outcome.
                    self.raw.insert(url, done);
                    continue;
                }
                None => Vec::new(),
            };
            match result {
                Ok(text) => {
                    let text: Arc<str> = Arc::from(text);
                    self.raw.insert(url, RawState::Ready(text.clone()));
                    for key in queued {
                        self.build(key, &text);
                    }
                }
                Err(e) => {
                    log::warn!("[DECAL] {e}");
                    self.raw.insert(url, RawState::Failed);
                }
            }
        }
    }

    fn build(&mut self, key: DecalKey, raw: &str) -> DecalLookup {
        if let Some(img) = self.images.get(&key) {
            return DecalLookup::Ready(img.clone());
        }
        let svg = colorize_svg(raw, key.color);
        match rasterize_svg(&svg, self.raster_width, key.side == Side::Right) {
            Ok(pixmap) => {
                let img = Arc::new(pixmap);
                self.images.insert(key, img.clone());
                DecalLookup::Ready(img)
            }
            Err(reason) => {
                log::debug!("[DECAL] {} {} {}: {reason}", key.region, key.side.as_str(), key.color);
                self.broken.insert(key);
                DecalLookup::Failed
            }
        }
    }
}

/* ---------------------------------------------------------------- placement */

/// Per-region placement tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecalProfile {
    /// Anchor = lid extremum * blend. Positive stays above the corner line,
    /// negative drops below it.
    pub anchor_blend: f32,
    pub width_scale: f32,
    /// Extra width on the temple side, fraction of eye width.
    pub outer_extra: f32,
}

pub const LASH_PROFILE: DecalProfile =
    DecalProfile { anchor_blend: 0.55, width_scale: 1.15, outer_extra: 0.18 };
pub const LINER_PROFILE: DecalProfile =
    DecalProfile { anchor_blend: -0.30, width_scale: 1.10, outer_extra: 0.25 };

pub fn profile(region: Region) -> Option<DecalProfile> {
    match region {
        Region::Eyelash => Some(LASH_PROFILE),
        Region::Eyeliner => Some(LINER_PROFILE),
        _ => None,
    }
}

/// Eye axis through both corners, ordered so `left.x <= right.x`. The local
/// frame has +X along the axis and +Y pointing down the screen whichever eye
/// it is and however the head is rolled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeAxis {
    pub left: Point,
    pub right: Point,
    pub origin: Point,
    /// Radians, in (-pi/2, pi/2].
    pub angle: f32,
    pub width: f32,
    pub outer_is_left: bool,
}

impl EyeAxis {
    pub fn new(face: &ProjectedFace, side: Side) -> Self {
        let refs = eye(side);
        let (outer, inner) = (face.at(refs.outer), face.at(refs.inner));
        let outer_is_left = outer.x <= inner.x;
        let (left, right) = if outer_is_left { (outer, inner) } else { (inner, outer) };
        let d = right - left;
        Self {
            left,
            right,
            origin: left.midpoint(right),
            angle: d.y.atan2(d.x),
            width: left.distance(right),
            outer_is_left,
        }
    }

    pub fn to_local(&self, p: Point) -> Point {
        let (sin, cos) = self.angle.sin_cos();
        let d = p - self.origin;
        Point::new(d.x * cos + d.y * sin, -d.x * sin + d.y * cos)
    }

    pub fn to_canvas(&self, p: Point) -> Point {
        let (sin, cos) = self.angle.sin_cos();
        Point::new(
            self.origin.x + p.x * cos - p.y * sin,
            self.origin.y + p.x * sin + p.y * cos,
        )
    }
}

/// Decal rectangle in the eye's local frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecalPlacement {
    pub axis: EyeAxis,
    pub x0: f32,
    pub width: f32,
    pub top: f32,
    pub height: f32,
    /// Draw the image mirrored (its temple side is on the wrong end).
    pub mirror: bool,
}

impl DecalPlacement {
    /// Local y of the bottom edge; 0 is the corner line, positive is below it.
    pub fn bottom(&self) -> f32 {
        self.top + self.height
    }

    /// Image pixels to canvas pixels.
    pub fn to_skia(&self, img_w: u32, img_h: u32) -> Transform {
        let sx = self.width / img_w.max(1) as f32;
        let sy = self.height / img_h.max(1) as f32;
        let (lsx, ltx) = if self.mirror { (-sx, self.x0 + self.width) } else { (sx, self.x0) };
        let (sin, cos) = self.axis.angle.sin_cos();
        let o = self.axis.origin;
        Transform::from_row(
            cos * lsx,
            sin * lsx,
            -sin * sy,
            cos * sy,
            cos * ltx - sin * self.top + o.x,
            sin * ltx + cos * self.top + o.y,
        )
    }
}

/// Fit a decal of the given aspect (height / width) to one eye.
///
/// The vertical anchor comes from the mid upper lid only; corners hardly move
/// when blinking.
pub fn place_decal(face: &ProjectedFace, side: Side, profile: DecalProfile, aspect: f32) -> Option<DecalPlacement> {
    let axis = EyeAxis::new(face, side);
    if axis.width <= f32::EPSILON || !aspect.is_finite() || aspect <= 0.0 {
        return None;
    }
    let extremum = eye(side)
        .mid_upper_lid
        .iter()
        .map(|&i| axis.to_local(face.at(i)).y)
        .fold(0.0f32, f32::min);
    let anchor = extremum * profile.anchor_blend;

    let span = axis.width * profile.width_scale;
    let extra = axis.width * profile.outer_extra;
    let width = span + extra;
    let x0 = if axis.outer_is_left { -span * 0.5 - extra } else { -span * 0.5 };
    let height = width * aspect;

    // Images are authored temple-left; the right eye's copy is pre-mirrored.
    let image_outer_left = side == Side::Left;
    Some(DecalPlacement {
        axis,
        x0,
        width,
        top: anchor - height,
        height,
        mirror: image_outer_left != axis.outer_is_left,
    })
}
