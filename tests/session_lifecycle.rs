use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use flume::Sender;

use makeup_mirror::camera::{StreamStop, VideoSource};
use makeup_mirror::config::SessionConfig;
use makeup_mirror::decal::{DecalOverlayManager, FsDecalLoader};
use makeup_mirror::render::CanvasRenderer;
use makeup_mirror::synthetic::SyntheticFace;
use makeup_mirror::tracker::{FaceTracker, TrackerHandles, TrackerOptions, TrackingResults};
use makeup_mirror::types::FrameBuffer;
use makeup_mirror::{Overlay, Region, Result, Session, StyleResolver, TryOnError};

/// Hands out `frames` frames, then behaves like a camera that went quiet.
struct ScriptedSource {
    frames: usize,
    stop: StreamStop,
}

impl ScriptedSource {
    fn new(frames: usize) -> (Self, StreamStop) {
        let stop = StreamStop::default();
        (Self { frames, stop: stop.clone() }, stop)
    }
}

impl VideoSource for ScriptedSource {
    fn recv_timeout(&mut self, timeout: Duration) -> Result<FrameBuffer> {
        if self.stop.is_stopped() {
            return Err(TryOnError::Acquisition("stopped".into()));
        }
        if self.frames == 0 {
            thread::sleep(timeout);
            return Err(TryOnError::FrameTimeout { waited_ms: timeout.as_millis() as u64 });
        }
        self.frames -= 1;
        Ok(FrameBuffer::new(64, 48))
    }

    fn stop_handle(&self) -> StreamStop {
        self.stop.clone()
    }
}

#[derive(Clone, Default)]
struct Counters {
    configured: Arc<AtomicUsize>,
    started: Arc<AtomicUsize>,
    stopped: Arc<AtomicUsize>,
}

enum Behaviour {
    Ready,
    ReadyThenEnd,
    NeverReady,
    BrokenLibrary,
}

struct MockTracker {
    behaviour: Behaviour,
    counters: Counters,
    // Held so the channels stay open until stop.
    senders: Option<(Sender<()>, Sender<TrackingResults>)>,
}

impl MockTracker {
    fn boxed(behaviour: Behaviour, counters: &Counters) -> Box<dyn FaceTracker> {
        Box::new(Self { behaviour, counters: counters.clone(), senders: None })
    }
}

impl FaceTracker for MockTracker {
    fn configure(&mut self, _options: &TrackerOptions) -> Result<()> {
        self.counters.configured.fetch_add(1, Ordering::SeqCst);
        match self.behaviour {
            Behaviour::BrokenLibrary => Err(TryOnError::LibraryUnavailable("model missing".into())),
            _ => Ok(()),
        }
    }

    fn start(&mut self, _source: Box<dyn VideoSource>) -> Result<TrackerHandles> {
        self.counters.started.fetch_add(1, Ordering::SeqCst);
        let (ready_tx, ready) = flume::bounded(1);
        let (results_tx, results) = flume::unbounded();
        if matches!(self.behaviour, Behaviour::Ready | Behaviour::ReadyThenEnd) {
            ready_tx.send(()).unwrap();
            results_tx
                .send(TrackingResults {
                    image: FrameBuffer::new(64, 48),
                    face: Some(SyntheticFace::default().frame().unwrap()),
                    origin_clean: true,
                })
                .unwrap();
        }
        if !matches!(self.behaviour, Behaviour::ReadyThenEnd) {
            self.senders = Some((ready_tx, results_tx));
        }
        Ok(TrackerHandles { ready, results })
    }

    fn stop(&mut self) {
        self.counters.stopped.fetch_add(1, Ordering::SeqCst);
        self.senders = None;
    }
}

fn session(stream_ms: u64, ready_ms: u64) -> Session {
    let config = SessionConfig {
        stream_timeout: Duration::from_millis(stream_ms),
        tracker_ready_timeout: Duration::from_millis(ready_ms),
        ..SessionConfig::default()
    };
    let overlay = Overlay {
        renderer: Box::new(CanvasRenderer::default()),
        decals: DecalOverlayManager::new(Box::new(FsDecalLoader::default()), HashMap::new()),
    };
    Session::open(config, StyleResolver::default(), overlay, 160, 120).unwrap()
}

#[test]
fn silent_camera_is_a_retryable_acquisition_failure() {
    let counters = Counters::default();
    let mut s = session(30, 1000);
    let (source, stream) = ScriptedSource::new(0);

    let err = s.start(Box::new(source), MockTracker::boxed(Behaviour::Ready, &counters)).unwrap_err();
    // A stalled first frame still reads as a camera failure.
    assert!(matches!(err, TryOnError::Acquisition(_)));
    assert!(err.is_user_visible() && err.is_retryable());
    assert_eq!(counters.configured.load(Ordering::SeqCst), 0);

    s.stop();
    assert!(stream.is_stopped());
    assert_eq!(s.resize_listener_count(), 0);
}

#[test]
fn tracker_that_never_fires_gets_its_own_diagnostic() {
    let counters = Counters::default();
    let mut s = session(1000, 40);
    let (source, stream) = ScriptedSource::new(5);

    let err = s.start(Box::new(source), MockTracker::boxed(Behaviour::NeverReady, &counters)).unwrap_err();
    match err {
        TryOnError::TrackerNeverReady { waited_ms } => assert!(waited_ms >= 40),
        other => panic!("unexpected {other:?}"),
    }
    let err = TryOnError::TrackerNeverReady { waited_ms: 40 };
    assert!(err.is_user_visible() && !err.is_retryable());

    s.stop();
    assert!(stream.is_stopped());
    assert_eq!(counters.stopped.load(Ordering::SeqCst), 1);
}

#[test]
fn broken_library_is_reported_and_not_started() {
    let counters = Counters::default();
    let mut s = session(1000, 1000);
    let (source, _stream) = ScriptedSource::new(1);

    let err = s.start(Box::new(source), MockTracker::boxed(Behaviour::BrokenLibrary, &counters)).unwrap_err();
    assert!(matches!(err, TryOnError::LibraryUnavailable(_)));
    assert!(!err.is_retryable());
    assert_eq!(counters.started.load(Ordering::SeqCst), 0);
}

#[test]
fn one_render_pass_per_delivered_result() {
    let counters = Counters::default();
    let mut s = session(1000, 1000);
    let (source, _stream) = ScriptedSource::new(1);
    s.start(Box::new(source), MockTracker::boxed(Behaviour::Ready, &counters)).unwrap();
    assert!(s.is_running());

    s.select(Region::Lips, "#cc0033".parse().unwrap());
    assert_eq!(s.pump().unwrap(), 1);
    assert_eq!(s.pump().unwrap(), 0);
}

#[test]
fn restarting_replaces_the_resize_listener() {
    let counters = Counters::default();
    let mut s = session(1000, 1000);
    for _ in 0..3 {
        let (source, _stream) = ScriptedSource::new(1);
        s.start(Box::new(source), MockTracker::boxed(Behaviour::Ready, &counters)).unwrap();
        assert_eq!(s.resize_listener_count(), 1);
    }
    // Each restart stopped the previous tracker first.
    assert_eq!(counters.stopped.load(Ordering::SeqCst), 2);

    assert!(s.handle_resize(320, 200).unwrap());
    assert_eq!((s.canvas().width(), s.canvas().height()), (320, 200));

    s.stop();
    assert!(!s.handle_resize(100, 100).unwrap());
}

#[test]
fn ended_stream_surfaces_once() {
    let counters = Counters::default();
    let mut s = session(1000, 1000);
    let (source, _stream) = ScriptedSource::new(1);
    s.start(Box::new(source), MockTracker::boxed(Behaviour::ReadyThenEnd, &counters)).unwrap();

    assert!(matches!(s.pump(), Err(TryOnError::Acquisition(_))));
    assert!(!s.is_running());
    assert_eq!(s.pump().unwrap(), 0);
}

#[test]
fn close_after_a_partial_start_hands_back_the_overlay() {
    let counters = Counters::default();
    let mut s = session(1000, 20);
    let (source, stream) = ScriptedSource::new(3);
    assert!(s.start(Box::new(source), MockTracker::boxed(Behaviour::NeverReady, &counters)).is_err());

    let overlay = s.close();
    assert!(stream.is_stopped());
    assert_eq!(counters.stopped.load(Ordering::SeqCst), 1);
    assert_eq!(overlay.renderer.name(), "2D");

    // Reopening starts from an empty selection.
    let reopened = Session::open(SessionConfig::default(), StyleResolver::default(), overlay, 160, 120).unwrap();
    assert!(reopened.selection().is_empty());
}
