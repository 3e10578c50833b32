//! Face-tracking provider seam.
//!
//! The session only knows the provider lifecycle: configure, start on a video
//! source, receive results, stop. Detection itself is out of this crate; the
//! bundled [`ReplayTracker`] plays back a recorded landmark sequence (or a
//! procedurally animated face) against live camera frames.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use flume::{Receiver, Sender, TrySendError};

use crate::camera::VideoSource;
use crate::error::{Result, TryOnError};
use crate::landmarks::{Landmark, LandmarkFrame};
use crate::synthetic::SyntheticFace;
use crate::types::FrameBuffer;

/// Provider options. Only the first face is ever used.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerOptions {
    pub max_faces: u32,
    pub refine_landmarks: bool,
    pub min_detection_confidence: f32,
    pub min_tracking_confidence: f32,
}

impl Default for TrackerOptions {
    fn default() -> Self {
        Self {
            max_faces: 1,
            refine_landmarks: false,
            min_detection_confidence: 0.5,
            min_tracking_confidence: 0.5,
        }
    }
}

/// One provider callback: the frame it looked at and zero or one face.
#[derive(Debug, Clone)]
pub struct TrackingResults {
    pub image: FrameBuffer,
    pub face: Option<LandmarkFrame>,
    pub origin_clean: bool,
}

/// What a started provider hands back. `ready` fires once, before the first
/// result; both channels disconnect when the provider stops.
pub struct TrackerHandles {
    pub ready: Receiver<()>,
    pub results: Receiver<TrackingResults>,
}

pub trait FaceTracker {
    /// Load models / recordings. Failure here means the provider is unusable.
    fn configure(&mut self, options: &TrackerOptions) -> Result<()>;

    /// Begin consuming `source`. The provider owns it until `stop`.
    fn start(&mut self, source: Box<dyn VideoSource>) -> Result<TrackerHandles>;

    /// Safe to call more than once, and before `start`.
    fn stop(&mut self);
}

// How long the producer waits on the camera before giving up on the stream.
const FRAME_WAIT: Duration = Duration::from_secs(2);
const RESULT_QUEUE: usize = 2;

/// Recorded landmark playback: a JSON array with one entry per frame, each
/// either `null` (no face) or an array of `{x, y}` points.
pub struct ReplayTracker {
    recording: Option<PathBuf>,
    frames: Arc<Vec<Option<LandmarkFrame>>>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl ReplayTracker {
    /// `None` animates a synthetic face instead of reading a file.
    pub fn new(recording: Option<PathBuf>) -> Self {
        Self {
            recording,
            frames: Arc::new(Vec::new()),
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    fn load(&self) -> Result<Vec<Option<LandmarkFrame>>> {
        let Some(path) = &self.recording else {
            return Ok(Vec::new());
        };
        let text = std::fs::read_to_string(path)?;
        let raw: Vec<Option<Vec<Landmark>>> = serde_json::from_str(&text)?;
        let frames = raw
            .into_iter()
            .enumerate()
            .map(|(i, pts)| {
                pts.and_then(|p| match LandmarkFrame::new(p) {
                    Ok(f) => Some(f),
                    Err(e) => {
                        log::debug!("[TRACKER] frame {i} dropped: {e}");
                        None
                    }
                })
            })
            .collect();
        Ok(frames)
    }
}

impl FaceTracker for ReplayTracker {
    fn configure(&mut self, options: &TrackerOptions) -> Result<()> {
        if options.max_faces != 1 {
            log::debug!("[TRACKER] max_faces={} ignored, using the first face", options.max_faces);
        }
        let frames = self
            .load()
            .map_err(|e| TryOnError::LibraryUnavailable(format!("landmark recording: {e}")))?;
        if self.recording.is_some() && frames.is_empty() {
            return Err(TryOnError::LibraryUnavailable("landmark recording is empty".into()));
        }
        log::info!(
            "[TRACKER] {}",
            match &self.recording {
                Some(p) => format!("replaying {} frames from {}", frames.len(), p.display()),
                None => "animating a synthetic face".to_string(),
            }
        );
        self.frames = Arc::new(frames);
        Ok(())
    }

    fn start(&mut self, source: Box<dyn VideoSource>) -> Result<TrackerHandles> {
        self.stop();
        self.stop = Arc::new(AtomicBool::new(false));

        let (ready_tx, ready) = flume::bounded(1);
        let (results_tx, results) = flume::bounded(RESULT_QUEUE);
        let frames = Arc::clone(&self.frames);
        let stop = Arc::clone(&self.stop);
        self.worker = Some(thread::spawn(move || {
            produce(source, frames, stop, ready_tx, results_tx)
        }));
        Ok(TrackerHandles { ready, results })
    }

    fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::warn!("[TRACKER] worker panicked");
            }
        }
    }
}

impl Drop for ReplayTracker {
    fn drop(&mut self) {
        self.stop();
    }
}

/* ---------- producer thread ---------- */

fn produce(
    mut source: Box<dyn VideoSource>,
    frames: Arc<Vec<Option<LandmarkFrame>>>,
    stop: Arc<AtomicBool>,
    ready: Sender<()>,
    results: Sender<TrackingResults>,
) {
    let mut tick: usize = 0;
    let mut announced = false;
    while !stop.load(Ordering::SeqCst) {
        let image = match source.recv_timeout(FRAME_WAIT) {
            Ok(image) => image,
            Err(TryOnError::FrameTimeout { waited_ms }) => {
                log::debug!("[TRACKER] camera stalled for {waited_ms} ms, still waiting");
                continue;
            }
            Err(e) => {
                log::warn!("[TRACKER] video source ended: {e}");
                break;
            }
        };
        let face = if frames.is_empty() {
            animated_face(tick)
        } else {
            frames[tick % frames.len()].clone()
        };
        tick = tick.wrapping_add(1);

        if !announced {
            let _ = ready.send(());
            announced = true;
        }
        let out = TrackingResults { image, face, origin_clean: source.origin_clean() };
        match results.try_send(out) {
            Ok(()) | Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Disconnected(_)) => break,
        }
    }
    source.stop_handle().stop();
    log::debug!("[TRACKER] producer stopped after {tick} frames");
}

// A slow talk-and-tilt loop so every region gets exercised while moving.
fn animated_face(tick: usize) -> Option<LandmarkFrame> {
    let t = tick as f32 / 30.0;
    let face = SyntheticFace {
        roll_degrees: 8.0 * (t * 0.7).sin(),
        mouth_open: 0.35 + 0.3 * (t * 2.1).sin(),
        ..SyntheticFace::default()
    };
    face.frame().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::StreamStop;
    use crate::landmarks::LANDMARK_COUNT;

    struct Blank {
        stop: StreamStop,
    }

    impl VideoSource for Blank {
        fn recv_timeout(&mut self, _timeout: Duration) -> Result<FrameBuffer> {
            if self.stop.is_stopped() {
                return Err(TryOnError::Acquisition("stopped".into()));
            }
            thread::sleep(Duration::from_millis(2));
            Ok(FrameBuffer::filled(8, 6, 0x00_80_80_80))
        }

        fn stop_handle(&self) -> StreamStop {
            self.stop.clone()
        }
    }

    /// Stalls `stalls` times before delivering frames.
    struct Stalling {
        stalls: usize,
        stop: StreamStop,
    }

    impl VideoSource for Stalling {
        fn recv_timeout(&mut self, timeout: Duration) -> Result<FrameBuffer> {
            if self.stop.is_stopped() {
                return Err(TryOnError::Acquisition("stopped".into()));
            }
            if self.stalls > 0 {
                self.stalls -= 1;
                return Err(TryOnError::FrameTimeout { waited_ms: timeout.as_millis() as u64 });
            }
            thread::sleep(Duration::from_millis(2));
            Ok(FrameBuffer::new(8, 6))
        }

        fn stop_handle(&self) -> StreamStop {
            self.stop.clone()
        }
    }

    #[test]
    fn camera_stall_does_not_end_the_producer() {
        let mut tracker = ReplayTracker::new(None);
        tracker.configure(&TrackerOptions::default()).unwrap();
        let stop = StreamStop::default();
        let handles = tracker.start(Box::new(Stalling { stalls: 3, stop: stop.clone() })).unwrap();

        handles.ready.recv_timeout(Duration::from_secs(2)).unwrap();
        let res = handles.results.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!((res.image.width, res.image.height), (8, 6));
        assert!(!stop.is_stopped());

        tracker.stop();
        assert!(stop.is_stopped());
        assert!(handles.results.is_disconnected());
    }

    fn temp_file(name: &str, body: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("makeup-mirror-{}-{name}", std::process::id()));
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn synthetic_replay_reports_ready_then_faces() {
        let mut tracker = ReplayTracker::new(None);
        tracker.configure(&TrackerOptions::default()).unwrap();
        let stop = StreamStop::default();
        let handles = tracker.start(Box::new(Blank { stop: stop.clone() })).unwrap();

        handles.ready.recv_timeout(Duration::from_secs(2)).unwrap();
        let res = handles.results.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!((res.image.width, res.image.height), (8, 6));
        assert_eq!(res.face.unwrap().points().len(), LANDMARK_COUNT);

        tracker.stop();
        assert!(stop.is_stopped());
    }

    #[test]
    fn missing_recording_is_library_unavailable() {
        let mut tracker = ReplayTracker::new(Some(PathBuf::from("/definitely/not/here.json")));
        let err = tracker.configure(&TrackerOptions::default()).unwrap_err();
        assert!(matches!(err, TryOnError::LibraryUnavailable(_)));
    }

    #[test]
    fn short_frames_in_a_recording_become_no_face() {
        let path = temp_file("short.json", r#"[null, [{"x": 0.5, "y": 0.5}]]"#);
        let tracker = ReplayTracker::new(Some(path.clone()));
        let frames = tracker.load().unwrap();
        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(Option::is_none));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn stop_before_start_is_harmless() {
        let mut tracker = ReplayTracker::new(None);
        tracker.stop();
        tracker.stop();
    }
}
