// Video sources: the trait the tracker pulls frames through, and the live
// camera feed behind it.
// Visual expectation: once a source is running, `recv_timeout` hands back a
// FrameBuffer of 0x00RRGGBB pixels, the same thing the window displays.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use flume::{Receiver, RecvTimeoutError, Sender, TrySendError};
// Bring in nokhwa types for camera control.
use nokhwa::{
    Camera,
    pixel_format::RgbFormat,
    utils::{CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution},
};

use crate::config::CameraConfig;
use crate::error::{Result, TryOnError};
use crate::types::FrameBuffer;

/// Shared "stop streaming" flag. Cloned into whoever needs to end the stream,
/// so teardown can stop the camera even after the source itself was handed off.
#[derive(Clone, Debug, Default)]
pub struct StreamStop(Arc<AtomicBool>);

impl StreamStop {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A stream of camera-like frames, produced off the caller's thread.
pub trait VideoSource: Send {
    /// Wait at most `timeout` for the next frame. A stall that may recover is
    /// `FrameTimeout`; any other error means the stream is over.
    fn recv_timeout(&mut self, timeout: Duration) -> Result<FrameBuffer>;

    fn stop_handle(&self) -> StreamStop;

    /// False when frames come from somewhere we may not read pixels back from.
    fn origin_clean(&self) -> bool {
        true
    }
}

// Only a couple of frames in flight; older ones are dropped, never queued.
const FRAME_QUEUE: usize = 2;

/// Live webcam. The device is opened on its own thread (nokhwa cameras are
/// not `Send` on every backend) and frames come back over a channel.
pub struct CameraFeed {
    rx: Receiver<Result<FrameBuffer>>,
    stop: StreamStop,
}

impl CameraFeed {
    /// Start opening the camera. Returns immediately; a device that cannot be
    /// opened shows up as an `Acquisition` error on the first receive.
    pub fn open(config: &CameraConfig) -> Self {
        let (tx, rx) = flume::bounded(FRAME_QUEUE);
        let stop = StreamStop::default();
        let cfg = config.clone();
        let flag = stop.clone();
        thread::spawn(move || capture_loop(cfg, tx, flag));
        Self { rx, stop }
    }
}

impl VideoSource for CameraFeed {
    fn recv_timeout(&mut self, timeout: Duration) -> Result<FrameBuffer> {
        match self.rx.recv_timeout(timeout) {
            Ok(frame) => frame,
            Err(RecvTimeoutError::Timeout) => {
                Err(TryOnError::FrameTimeout { waited_ms: timeout.as_millis() as u64 })
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err(TryOnError::Acquisition("camera stream ended".into()))
            }
        }
    }

    fn stop_handle(&self) -> StreamStop {
        self.stop.clone()
    }
}

impl Drop for CameraFeed {
    fn drop(&mut self) {
        self.stop.stop();
    }
}

/* ---------- capture thread ---------- */

fn capture_loop(cfg: CameraConfig, tx: Sender<Result<FrameBuffer>>, stop: StreamStop) {
    let mut cam = match CameraCapture::new(&cfg) {
        Ok(cam) => cam,
        Err(e) => {
            log::warn!("[CAMERA] {e}");
            let _ = tx.send(Err(e));
            return;
        }
    };
    let (w, h) = cam.resolution();
    log::info!("[CAMERA] streaming {w}x{h} from device {}", cfg.index);

    while !stop.is_stopped() {
        let frame = cam.next_frame();
        let failed = frame.is_err();
        match tx.try_send(frame) {
            Ok(()) | Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Disconnected(_)) => break,
        }
        if failed {
            break;
        }
    }
    // Dropping `cam` closes the stream and releases the device.
    log::debug!("[CAMERA] stream stopped");
}

// A small wrapper around nokhwa::Camera so the capture loop stays clean.
struct CameraCapture {
    cam: Camera,
    width: u32,
    height: u32,
}

impl CameraCapture {
    /// Open the configured device at the closest format to the request.
    fn new(cfg: &CameraConfig) -> Result<Self> {
        let idx = CameraIndex::Index(cfg.index);
        let fmt = CameraFormat::new(
            Resolution::new(cfg.width, cfg.height),
            FrameFormat::YUYV, // uncompressed; cheap to convert to RGB
            cfg.fps,
        );
        let req = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(fmt));

        let mut cam = Camera::new(idx, req)
            .map_err(|e| TryOnError::Acquisition(format!("create camera: {e}")))?;
        cam.open_stream()
            .map_err(|e| TryOnError::Acquisition(format!("open stream: {e}")))?;

        // The stream may settle on a slightly different resolution.
        let actual = cam.resolution();
        Ok(Self { cam, width: actual.width(), height: actual.height() })
    }

    /// Grab one frame and convert it to 0x00RRGGBB pixels.
    fn next_frame(&mut self) -> Result<FrameBuffer> {
        let frame = self
            .cam
            .frame()
            .map_err(|e| TryOnError::Acquisition(format!("fetch frame: {e}")))?;
        let rgb = frame
            .decode_image::<RgbFormat>()
            .map_err(|e| TryOnError::Acquisition(format!("decode frame: {e}")))?;
        let (w, h) = rgb.dimensions();
        Ok(frame_from_rgb_bytes(w, h, rgb.as_raw()))
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Pack tightly packed RGB bytes into a window-ready frame.
pub fn frame_from_rgb_bytes(width: u32, height: u32, rgb: &[u8]) -> FrameBuffer {
    let pixels = rgb
        .chunks_exact(3)
        .map(|p| ((p[0] as u32) << 16) | ((p[1] as u32) << 8) | p[2] as u32)
        .collect();
    FrameBuffer { width: width as usize, height: height as usize, pixels }
}

/// A still picture replayed as a stream, for running without a webcam.
pub struct StillImageSource {
    frame: FrameBuffer,
    interval: Duration,
    stop: StreamStop,
}

impl StillImageSource {
    pub fn open(path: &std::path::Path, fps: u32) -> Result<Self> {
        let img = image::open(path)
            .map_err(|e| TryOnError::Acquisition(format!("{}: {e}", path.display())))?;
        Ok(Self::from_image(&img.to_rgb8(), fps))
    }

    pub fn from_image(img: &image::RgbImage, fps: u32) -> Self {
        let (w, h) = img.dimensions();
        Self {
            frame: frame_from_rgb_bytes(w, h, img.as_raw()),
            interval: Duration::from_millis(1000 / fps.max(1) as u64),
            stop: StreamStop::default(),
        }
    }
}

impl VideoSource for StillImageSource {
    fn recv_timeout(&mut self, timeout: Duration) -> Result<FrameBuffer> {
        if self.stop.is_stopped() {
            return Err(TryOnError::Acquisition("stream stopped".into()));
        }
        thread::sleep(self.interval.min(timeout));
        Ok(self.frame.clone())
    }

    fn stop_handle(&self) -> StreamStop {
        self.stop.clone()
    }
}
