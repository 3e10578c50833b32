// What you SEE now:
// • The camera fills the window (cover fit, no black bars).
// • Number keys apply the configured shades; + / - zoom in 0.1 steps.
// • C clears every shade. ESC quits.
// • If the camera or face tracking fails, a message says so; R retries the camera.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use makeup_mirror::camera::{CameraFeed, StillImageSource, VideoSource};
use makeup_mirror::config::{Swatch, TryOnConfig};
use makeup_mirror::decal::{DecalOverlayManager, FsDecalLoader};
use makeup_mirror::draw::{draw_message, draw_swatch_bar, draw_text_5x7, Drawer};
use makeup_mirror::render::{select_backend, MeshRenderer};
use makeup_mirror::tracker::ReplayTracker;
use makeup_mirror::types::FrameBuffer;
use makeup_mirror::{Overlay, Result, Session, TryOnError};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(e) = run() {
        log::error!("{e}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    /* --- Config ---
       Optional JSON file as the first argument; stock defaults otherwise. */
    let config = match std::env::args_os().nth(1) {
        Some(path) => TryOnConfig::load(&PathBuf::from(path))?,
        None => TryOnConfig::default(),
    };
    let swatches = config.swatches()?;
    let (w, h) = (config.window.width, config.window.height);

    /* --- Window + overlay backend ---
       Visual: window opens black; the GPU path is used when a device comes up. */
    let mut drawer = Drawer::new("Makeup Mirror", w as usize, h as usize)?;
    let overlay = Overlay {
        renderer: select_backend(config.backend, w, h, MeshRenderer::new),
        decals: DecalOverlayManager::new(Box::new(FsDecalLoader::default()), config.decal_urls()),
    };
    let mut session = Session::open(config.session_config(), config.style_resolver()?, overlay, w, h)?;

    /* --- Reusable screen buffer ---
       Visual: this is the image you actually see each frame. */
    let mut screen = FrameBuffer::new(w as usize, h as usize);
    draw_message(&mut screen, "Starting camera...", 0x00_FF_FF_FF);
    drawer.present(&screen)?;

    let mut status = start(&mut session, &config).err();

    /* --- HUD / FPS --- */
    let mut last_fps_time = Instant::now();
    let mut frames_this_second: u32 = 0;
    let mut hud_fps_text = String::from("FPS 0.0");

    /* ------------------------------ Main loop ------------------------------ */
    while drawer.is_open() && !drawer.esc_pressed() {
        /* 1) Window size drives the canvas size. */
        let (ww, wh) = drawer.size();
        if ww > 0 && wh > 0 && (ww, wh) != (screen.width, screen.height) {
            if let Err(e) = session.handle_resize(ww as u32, wh as u32) {
                fail(&mut session, &mut status, e);
            }
        }

        /* 2) Inputs */
        if let Some(i) = drawer.swatch_pressed() {
            if let Some(swatch) = swatches.get(i) {
                session.select_swatch(swatch); // visual: shade appears on the next frame
            }
        }
        if drawer.c_pressed_once() {
            session.clear_selection(); // visual: bare face again
        }
        let dz = drawer.zoom_delta();
        if dz != 0.0 {
            session.set_zoom(session.zoom() + dz);
        }
        if drawer.r_pressed_once() && status.as_ref().is_some_and(TryOnError::is_retryable) {
            status = start(&mut session, &config).err();
        }

        /* 3) One render pass per tracker result. */
        if status.is_none() {
            if let Err(e) = session.pump() {
                fail(&mut session, &mut status, e);
            }
        }

        /* 4) Canvas -> screen, then HUD on top. */
        session.canvas().to_frame_buffer(&mut screen);
        let chips: Vec<_> = swatches.iter().map(|s| (s.color, is_applied(&session, s))).collect();
        draw_swatch_bar(&mut screen, &chips);
        let hud = format!("{} | ZOOM {:.1} | {}", session.backend_name(), session.zoom(), hud_fps_text);
        draw_text_5x7(&mut screen, 8, 8, &hud, 0x00_FF_FF_FF);
        if let Some(e) = &status {
            let hint = if e.is_retryable() { " Press R to retry." } else { "" };
            draw_message(&mut screen, &format!("{e}.{hint}"), 0x00_FF_CC_33);
        }

        /* 5) Present to the window. */
        drawer.present(&screen)?;

        /* 6) FPS counter, once per second. */
        frames_this_second += 1;
        let now = Instant::now();
        if now.duration_since(last_fps_time) >= Duration::from_secs(1) {
            let fps = frames_this_second as f32 / now.duration_since(last_fps_time).as_secs_f32();
            log::debug!("FPS: {fps:.1}");
            hud_fps_text = format!("FPS {fps:.1}");
            frames_this_second = 0;
            last_fps_time = now;
        }
    }

    session.close();
    Ok(())
}

// Camera (or still picture) plus the landmark replay, behind the session's bounded waits.
fn start(session: &mut Session, config: &TryOnConfig) -> Result<()> {
    let source: Box<dyn VideoSource> = match &config.camera.image {
        Some(path) => Box::new(StillImageSource::open(path, config.camera.fps)?),
        None => Box::new(CameraFeed::open(&config.camera)),
    };
    let tracker = Box::new(ReplayTracker::new(config.landmarks.clone()));
    let started = session.start(source, tracker);
    if let Err(e) = &started {
        session.stop();
        log::warn!("[SESSION] start failed: {e}");
    }
    started
}

// Only user-visible failures get the message band; the rest are logged.
fn fail(session: &mut Session, status: &mut Option<TryOnError>, e: TryOnError) {
    if e.is_user_visible() {
        session.stop();
        *status = Some(e);
    } else {
        log::debug!("[SESSION] {e}");
    }
}

fn is_applied(session: &Session, swatch: &Swatch) -> bool {
    !swatch.regions.is_empty()
        && swatch.regions.iter().all(|r| session.selection().get(*r) == Some(swatch.color))
}
