//! Destination surface: the camera frame cover-fitted underneath, the
//! makeup layers composited on top.

use tiny_skia::{Color, FilterQuality, IntSize, Pixmap, PixmapPaint, PixmapRef, Transform};

use crate::error::{Result, TryOnError};
use crate::style::BlendMode;
use crate::transform::RenderTransform;
use crate::types::{pack_rgb, FrameBuffer};

pub struct Canvas {
    pixmap: Pixmap,
    // Camera frame as a pixmap; reused while the source size is stable.
    video: Option<Pixmap>,
    // False when the current frame came from a source we may not read back.
    origin_clean: bool,
}

fn surface(width: u32, height: u32) -> Result<Pixmap> {
    Pixmap::new(width, height).ok_or_else(|| {
        TryOnError::RenderSurfaceMissing(format!("cannot allocate {width}x{height} canvas"))
    })
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        Ok(Self { pixmap: surface(width, height)?, video: None, origin_clean: true })
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    /// No-op when the size is unchanged.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        if width == self.width() && height == self.height() {
            return Ok(());
        }
        self.pixmap = surface(width, height)?;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.pixmap.fill(Color::TRANSPARENT);
        self.video = None;
    }

    /// Paint the camera frame through the cover-fit transform. Everything
    /// outside the drawn frame is black (cover fit leaves nothing outside).
    pub fn draw_video(&mut self, frame: &FrameBuffer, transform: &RenderTransform, origin_clean: bool) {
        self.origin_clean = origin_clean;
        self.pixmap.fill(Color::BLACK);
        if frame.is_empty() {
            return;
        }
        let (w, h) = (frame.width as u32, frame.height as u32);
        let reuse = matches!(&self.video, Some(v) if v.width() == w && v.height() == h);
        if !reuse {
            self.video = Pixmap::new(w, h);
        }
        let Some(video) = self.video.as_mut() else {
            return;
        };
        for (dst, src) in video.data_mut().chunks_exact_mut(4).zip(frame.pixels.iter()) {
            dst[0] = ((src >> 16) & 0xFF) as u8;
            dst[1] = ((src >> 8) & 0xFF) as u8;
            dst[2] = (src & 0xFF) as u8;
            dst[3] = 255;
        }
        let paint = PixmapPaint { quality: FilterQuality::Bilinear, ..PixmapPaint::default() };
        self.pixmap.draw_pixmap(0, 0, video.as_ref(), &paint, transform.to_skia(), None);
    }

    /// Read access to rendered pixels, refused for unclean sources.
    pub fn read_pixels(&self) -> Result<PixmapRef<'_>> {
        if !self.origin_clean {
            return Err(TryOnError::PixelAccessDenied);
        }
        Ok(self.pixmap.as_ref())
    }

    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }

    pub fn pixmap_mut(&mut self) -> &mut Pixmap {
        &mut self.pixmap
    }

    /// Composite a full-canvas layer with the given blend mode.
    pub fn composite(&mut self, layer: &Pixmap, blend: BlendMode) {
        let paint = PixmapPaint {
            opacity: 1.0,
            blend_mode: blend.to_skia(),
            quality: FilterQuality::Nearest,
        };
        self.pixmap.draw_pixmap(0, 0, layer.as_ref(), &paint, Transform::identity(), None);
    }

    /// Flatten into 0x00RRGGBB for the window.
    pub fn to_frame_buffer(&self, out: &mut FrameBuffer) {
        let (w, h) = (self.width() as usize, self.height() as usize);
        if out.width != w || out.height != h {
            *out = FrameBuffer::new(w, h);
        }
        for (dst, px) in out.pixels.iter_mut().zip(self.pixmap.pixels()) {
            let c = px.demultiply();
            *dst = pack_rgb(c.red(), c.green(), c.blue());
        }
    }
}

/// A transparent full-size layer for off-screen region work.
pub fn layer_like(canvas: &Canvas) -> Result<Pixmap> {
    surface(canvas.width(), canvas.height())
}

/// Wrap raw premultiplied RGBA (e.g. a GPU readback) as a pixmap.
pub fn pixmap_from_rgba(data: Vec<u8>, width: u32, height: u32) -> Result<Pixmap> {
    let size = IntSize::from_wh(width, height)
        .ok_or_else(|| TryOnError::RenderSurfaceMissing("zero-sized layer".into()))?;
    Pixmap::from_vec(data, size)
        .ok_or_else(|| TryOnError::RenderSurfaceMissing("layer size mismatch".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_size_is_surface_missing() {
        assert!(matches!(Canvas::new(0, 10), Err(TryOnError::RenderSurfaceMissing(_))));
    }

    #[test]
    fn video_covers_whole_canvas() {
        let mut canvas = Canvas::new(64, 32).unwrap();
        let frame = FrameBuffer::filled(40, 40, 0x00_33_66_99);
        let t = RenderTransform::cover_fit(40.0, 40.0, 64.0, 32.0, 1.0);
        canvas.draw_video(&frame, &t, true);
        for (x, y) in [(0, 0), (63, 0), (0, 31), (63, 31), (32, 16)] {
            let p = canvas.pixmap().pixel(x, y).unwrap();
            assert_eq!((p.red(), p.green(), p.blue(), p.alpha()), (0x33, 0x66, 0x99, 255));
        }
    }

    #[test]
    fn unclean_origin_refuses_reads() {
        let mut canvas = Canvas::new(8, 8).unwrap();
        let frame = FrameBuffer::filled(8, 8, 0);
        let t = RenderTransform::cover_fit(8.0, 8.0, 8.0, 8.0, 1.0);
        canvas.draw_video(&frame, &t, false);
        assert!(matches!(canvas.read_pixels(), Err(TryOnError::PixelAccessDenied)));
        canvas.draw_video(&frame, &t, true);
        assert!(canvas.read_pixels().is_ok());
    }

    #[test]
    fn frame_buffer_roundtrip_colors() {
        let mut canvas = Canvas::new(4, 4).unwrap();
        canvas.pixmap_mut().fill(Color::from_rgba8(10, 20, 30, 255));
        let mut fb = FrameBuffer::new(1, 1);
        canvas.to_frame_buffer(&mut fb);
        assert_eq!((fb.width, fb.height), (4, 4));
        assert_eq!(fb.pixels[5], 0x000A141E);
    }
}
