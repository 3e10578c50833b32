//! One open try-on: camera stream, tracker, canvas, selection and zoom.
//!
//! A session is created when the mirror opens and consumed by [`Session::close`].
//! Long-lived resources (the overlay backend and the decal cache) live in
//! [`Overlay`] and are handed back on close so the next open reuses them.

use std::time::Instant;

use flume::{Receiver, RecvTimeoutError, TryRecvError};

use crate::camera::{StreamStop, VideoSource};
use crate::canvas::Canvas;
use crate::color::Rgb;
use crate::config::{SessionConfig, Swatch};
use crate::decal::DecalOverlayManager;
use crate::error::{Result, TryOnError};
use crate::landmarks::ProjectedFace;
use crate::region::{Region, RegionSelection};
use crate::render::OverlayRenderer;
use crate::style::{StyleOverride, StyleResolver};
use crate::tracker::{FaceTracker, TrackingResults};
use crate::transform::{clamp_zoom, RenderTransform, MIN_ZOOM};

/// Process-lifetime overlay resources.
pub struct Overlay {
    pub renderer: Box<dyn OverlayRenderer>,
    pub decals: DecalOverlayManager,
}

pub struct Session {
    config: SessionConfig,
    styles: StyleResolver,
    overlay: Overlay,
    canvas: Canvas,
    selection: RegionSelection,
    zoom: f32,
    transform: Option<RenderTransform>,

    tracker: Option<Box<dyn FaceTracker>>,
    results: Option<Receiver<TrackingResults>>,
    stream: Option<StreamStop>,

    // Active resize registration. Replaced on every start, never stacked.
    resize_listener: Option<u64>,
    next_listener: u64,
}

impl Session {
    /// Allocate the destination surface. The selection starts empty.
    pub fn open(config: SessionConfig, styles: StyleResolver, mut overlay: Overlay, width: u32, height: u32) -> Result<Self> {
        let canvas = Canvas::new(width, height)?;
        if let Err(e) = overlay.renderer.resize(width, height) {
            log::debug!("[SESSION] overlay resize: {e}");
        }
        log::info!("[SESSION] open {width}x{height}, backend {}", overlay.renderer.name());
        Ok(Self {
            config,
            styles,
            overlay,
            canvas,
            selection: RegionSelection::default(),
            zoom: MIN_ZOOM,
            transform: None,
            tracker: None,
            results: None,
            stream: None,
            resize_listener: None,
            next_listener: 0,
        })
    }

    /// Bring up the stream and the tracker, each behind its own bounded wait.
    ///
    /// On error the session keeps whatever was started; [`Session::stop`]
    /// (or another `start`) tears it down.
    pub fn start(&mut self, mut source: Box<dyn VideoSource>, mut tracker: Box<dyn FaceTracker>) -> Result<()> {
        self.stop();
        self.install_resize_listener();
        self.stream = Some(source.stop_handle());

        let first = source.recv_timeout(self.config.stream_timeout).map_err(|e| match e {
            TryOnError::Acquisition(_) => e,
            other => TryOnError::Acquisition(other.to_string()),
        })?;
        log::info!("[SESSION] stream live at {}x{}", first.width, first.height);
        self.render_frame(&TrackingResults { image: first, face: None, origin_clean: source.origin_clean() });

        tracker.configure(&self.config.tracker).map_err(|e| match e {
            TryOnError::LibraryUnavailable(_) => e,
            other => TryOnError::LibraryUnavailable(other.to_string()),
        })?;
        let tracker = self.tracker.insert(tracker);
        let handles = tracker.start(source)?;
        self.results = Some(handles.results);

        let started = Instant::now();
        match handles.ready.recv_timeout(self.config.tracker_ready_timeout) {
            Ok(()) => {
                log::info!("[SESSION] tracker ready after {} ms", started.elapsed().as_millis());
                Ok(())
            }
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => {
                let waited_ms = started.elapsed().as_millis() as u64;
                log::warn!("[TRACKER] no results after {waited_ms} ms");
                Err(TryOnError::TrackerNeverReady { waited_ms })
            }
        }
    }

    /// Render one pass per delivered result. An ended stream is reported
    /// once as an acquisition failure.
    pub fn pump(&mut self) -> Result<usize> {
        let mut passes = 0;
        loop {
            let Some(rx) = &self.results else {
                return Ok(passes);
            };
            match rx.try_recv() {
                Ok(results) => {
                    self.render_frame(&results);
                    passes += 1;
                }
                Err(TryRecvError::Empty) => return Ok(passes),
                Err(TryRecvError::Disconnected) => {
                    self.results = None;
                    return Err(TryOnError::Acquisition("camera stream ended".into()));
                }
            }
        }
    }

    /// Full clear-and-redraw for one tracker callback. Returns how many
    /// regions drew.
    pub fn render_frame(&mut self, results: &TrackingResults) -> usize {
        self.overlay.decals.pump();
        if results.image.is_empty() {
            let blank = self.cover_fit(1.0, 1.0);
            self.canvas.draw_video(&results.image, &blank, results.origin_clean);
            return 0;
        }
        let transform = self.current_transform(results.image.width as f32, results.image.height as f32);
        self.canvas.draw_video(&results.image, &transform, results.origin_clean);
        if self.selection.is_empty() {
            return 0;
        }
        let face = results.face.as_ref().map(|f| ProjectedFace::project(f, &transform));
        let Overlay { renderer, decals } = &mut self.overlay;
        renderer.render(&mut self.canvas, face.as_ref(), &self.selection, &self.styles, decals)
    }

    // Recompute only when the source size changed; resize and zoom refresh eagerly.
    fn current_transform(&mut self, src_w: f32, src_h: f32) -> RenderTransform {
        match self.transform {
            Some(t) if t.same_source(src_w, src_h) => t,
            _ => {
                let t = self.cover_fit(src_w, src_h);
                self.transform = Some(t);
                t
            }
        }
    }

    fn cover_fit(&self, src_w: f32, src_h: f32) -> RenderTransform {
        RenderTransform::cover_fit(src_w, src_h, self.canvas.width() as f32, self.canvas.height() as f32, self.zoom)
    }

    fn refresh_transform(&mut self) {
        if let Some(t) = self.transform {
            self.transform = Some(self.cover_fit(t.src_w, t.src_h));
        }
    }

    /* ---------- entry points ---------- */

    /// Swatch click: `region` is a region name (or `none`), `color` a hex or
    /// `rgb(...)` string.
    pub fn set_region_color(&mut self, region: &str, color: &str) -> Result<()> {
        if region.trim().eq_ignore_ascii_case("none") {
            return Ok(());
        }
        let region: Region = region.parse()?;
        let color: Rgb = color.parse()?;
        self.select(region, color);
        Ok(())
    }

    pub fn select(&mut self, region: Region, color: Rgb) {
        log::debug!("[SESSION] {region} -> {color}");
        self.selection.set(region, color);
    }

    /// Apply a swatch to every region its attribute maps to.
    pub fn select_swatch(&mut self, swatch: &Swatch) {
        if swatch.regions.is_empty() {
            log::debug!("[SESSION] swatch {:?} maps to no region", swatch.name);
        }
        for region in &swatch.regions {
            self.select(*region, swatch.color);
        }
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    pub fn clear_region(&mut self, region: Region) {
        self.selection.remove(region);
    }

    /// Clamped to [1, 2.5]; the transform follows immediately.
    pub fn set_zoom(&mut self, zoom: f32) {
        self.zoom = clamp_zoom(zoom);
        self.refresh_transform();
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn set_widget_style(&mut self, region: Region, style: StyleOverride) {
        self.styles.set_widget(region, style);
    }

    pub fn set_product_opacity(&mut self, region: Region, percent: u8) {
        self.styles.set_product_opacity(region, percent);
    }

    /// Switching products drops the previous product's opacities.
    pub fn clear_product_opacity(&mut self) {
        self.styles.clear_product_overrides();
    }

    /// Window resize. Ignored unless a listener is installed (between start
    /// and stop). Returns whether the canvas followed.
    pub fn handle_resize(&mut self, width: u32, height: u32) -> Result<bool> {
        if self.resize_listener.is_none() {
            return Ok(false);
        }
        self.canvas.resize(width, height)?;
        if let Err(e) = self.overlay.renderer.resize(width, height) {
            log::debug!("[SESSION] overlay resize: {e}");
        }
        self.refresh_transform();
        Ok(true)
    }

    fn install_resize_listener(&mut self) {
        self.next_listener += 1;
        if let Some(old) = self.resize_listener.replace(self.next_listener) {
            log::debug!("[SESSION] resize listener {old} replaced");
        }
    }

    /* ---------- getters ---------- */

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    pub fn selection(&self) -> &RegionSelection {
        &self.selection
    }

    pub fn transform(&self) -> Option<RenderTransform> {
        self.transform
    }

    pub fn gpu_ready(&self) -> bool {
        self.overlay.renderer.is_gpu()
    }

    pub fn backend_name(&self) -> &'static str {
        self.overlay.renderer.name()
    }

    pub fn resize_listener_count(&self) -> usize {
        usize::from(self.resize_listener.is_some())
    }

    pub fn is_running(&self) -> bool {
        self.results.is_some()
    }

    /* ---------- teardown ---------- */

    /// Stop the stream and tracker, drop the resize listener, clear both
    /// surfaces. Safe after a partial start and safe to repeat.
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            stream.stop();
        }
        if let Some(mut tracker) = self.tracker.take() {
            tracker.stop();
        }
        self.results = None;
        self.resize_listener = None;
        self.transform = None;
        self.canvas.clear();
        self.overlay.renderer.clear();
    }

    /// End the session; the selection goes with it.
    pub fn close(mut self) -> Overlay {
        self.stop();
        log::info!("[SESSION] closed");
        self.overlay
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decal::FsDecalLoader;
    use crate::render::CanvasRenderer;
    use crate::types::FrameBuffer;
    use std::collections::HashMap;

    fn session() -> Session {
        let overlay = Overlay {
            renderer: Box::new(CanvasRenderer::default()),
            decals: DecalOverlayManager::new(Box::new(FsDecalLoader::default()), HashMap::new()),
        };
        Session::open(SessionConfig::default(), StyleResolver::default(), overlay, 200, 100).unwrap()
    }

    #[test]
    fn zero_sized_surface_is_missing() {
        let overlay = Overlay {
            renderer: Box::new(CanvasRenderer::default()),
            decals: DecalOverlayManager::new(Box::new(FsDecalLoader::default()), HashMap::new()),
        };
        let err = Session::open(SessionConfig::default(), StyleResolver::default(), overlay, 0, 10).err();
        assert!(matches!(err, Some(TryOnError::RenderSurfaceMissing(_))));
    }

    #[test]
    fn string_entry_point_validates() {
        let mut s = session();
        s.set_region_color("lips", "rgb(204, 0, 51)").unwrap();
        assert_eq!(s.selection().get(Region::Lips), Some(Rgb::new(204, 0, 51)));
        s.set_region_color("none", "#000").unwrap();
        assert!(matches!(s.set_region_color("cheeks", "#000"), Err(TryOnError::InvalidRegion(_))));
        assert!(matches!(s.set_region_color("lips", "red"), Err(TryOnError::InvalidColor(_))));
    }

    #[test]
    fn zoom_refreshes_transform_symmetrically() {
        let mut s = session();
        let frame = TrackingResults { image: FrameBuffer::new(320, 240), face: None, origin_clean: true };
        s.render_frame(&frame);
        let base = s.transform().unwrap();
        s.set_zoom(2.0);
        let zoomed = s.transform().unwrap();
        assert!((zoomed.scale - base.scale * 2.0).abs() < 1e-5);
        let (w, h) = zoomed.drawn_size();
        assert!((zoomed.dx + w * 0.5 - 100.0).abs() < 1e-3);
        assert!((zoomed.dy + h * 0.5 - 50.0).abs() < 1e-3);
        s.set_zoom(9.0);
        assert_eq!(s.zoom(), 2.5);
    }

    #[test]
    fn resize_is_ignored_without_listener() {
        let mut s = session();
        assert!(!s.handle_resize(300, 300).unwrap());
        assert_eq!(s.canvas().width(), 200);
    }

    #[test]
    fn stop_twice_is_harmless() {
        let mut s = session();
        s.stop();
        s.stop();
        assert_eq!(s.resize_listener_count(), 0);
    }
}
