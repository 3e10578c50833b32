use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use makeup_mirror::decal::{
    colorize_svg, place_decal, rasterize_svg, DecalLoader, DecalLookup, DecalOverlayManager, EyeAxis,
    LASH_PROFILE, LINER_PROFILE,
};
use makeup_mirror::geometry::Side;
use makeup_mirror::landmarks::Point;
use makeup_mirror::synthetic::SyntheticFace;
use makeup_mirror::{ProjectedFace, Region, RenderTransform, Result, Rgb, TryOnError};

const LASH: &str = include_str!("../assets/lash.svg");
const LINER: &str = include_str!("../assets/liner.svg");

fn face(roll: f32) -> ProjectedFace {
    let frame = SyntheticFace { roll_degrees: roll, ..SyntheticFace::default() }.frame().unwrap();
    ProjectedFace::project(&frame, &RenderTransform::cover_fit(640.0, 480.0, 640.0, 480.0, 1.0))
}

#[test]
fn shipped_decals_colorize_selectively_and_idempotently() {
    let plum = Rgb::new(0x7a, 0x3b, 0x69);
    for raw in [LASH, LINER] {
        let once = colorize_svg(raw, plum);
        assert_eq!(colorize_svg(raw, plum), once);
        assert_eq!(colorize_svg(&once, plum), once);
        assert!(!once.contains("#000000"));
        assert!(once.contains("#7a3b69"));
        assert!(rasterize_svg(&once, 128, false).is_ok());
    }
    let lash = colorize_svg(LASH, plum);
    assert!(lash.contains(r#"fill="none""#));
    assert!(lash.contains("stroke:none"));
    let liner = colorize_svg(LINER, plum);
    assert!(liner.contains(r#"fill="url(#sheen)""#));
    assert!(liner.contains(r##"stop-color="#ffffff""##));
}

#[test]
fn eye_axis_is_ordered_left_to_right_for_any_roll() {
    for roll in (-89..=89).step_by(7) {
        let f = face(roll as f32);
        for side in Side::BOTH {
            let axis = EyeAxis::new(&f, side);
            assert!(axis.left.x <= axis.right.x, "roll {roll} {side:?}");
            // Local +Y points down the screen.
            let below = axis.to_canvas(Point::new(0.0, 10.0));
            assert!(below.y > axis.origin.y, "roll {roll}");
        }
    }
}

#[test]
fn liner_sits_below_the_corner_line_and_lashes_above() {
    for roll in [-60.0, -15.0, 0.0, 20.0, 75.0] {
        let f = face(roll);
        for side in Side::BOTH {
            let liner = place_decal(&f, side, LINER_PROFILE, 0.2).unwrap();
            let lash = place_decal(&f, side, LASH_PROFILE, 0.3).unwrap();
            assert!(liner.bottom() > 0.0, "liner roll {roll}");
            assert!(lash.bottom() <= 0.0, "lash roll {roll}");
            assert!(liner.width > liner.axis.width);
        }
    }
}

/// Records fetch starts; completions are pushed by the test.
#[derive(Clone, Default)]
struct ManualLoader {
    started: Arc<Mutex<Vec<String>>>,
    done: Arc<Mutex<Vec<(String, Result<String>)>>>,
}

impl DecalLoader for ManualLoader {
    fn start(&mut self, url: &str) {
        self.started.lock().unwrap().push(url.to_string());
    }

    fn poll(&mut self) -> Vec<(String, Result<String>)> {
        std::mem::take(&mut *self.done.lock().unwrap())
    }
}

fn manager(loader: &ManualLoader) -> DecalOverlayManager {
    let urls = HashMap::from([
        (Region::Eyelash, "mem://lash".to_string()),
        (Region::Eyeliner, "mem://liner".to_string()),
    ]);
    DecalOverlayManager::new(Box::new(loader.clone()), urls)
}

#[test]
fn concurrent_requests_share_one_fetch() {
    let loader = ManualLoader::default();
    let mut m = manager(&loader);
    let black = Rgb::new(0, 0, 0);

    for side in Side::BOTH {
        assert!(matches!(m.request(Region::Eyelash, side, black), DecalLookup::Pending));
        assert!(matches!(m.request(Region::Eyelash, side, black), DecalLookup::Pending));
    }
    assert_eq!(*loader.started.lock().unwrap(), vec!["mem://lash".to_string()]);

    loader.done.lock().unwrap().push(("mem://lash".into(), Ok(LASH.to_string())));
    m.pump();
    // Both queued sides were built when the markup landed.
    assert_eq!(m.cached_images(), 2);
    assert!(matches!(m.request(Region::Eyelash, Side::Left, black), DecalLookup::Ready(_)));

    // A new color reuses the cached markup without another fetch.
    assert!(matches!(m.request(Region::Eyelash, Side::Right, Rgb::new(200, 0, 0)), DecalLookup::Ready(_)));
    assert_eq!(loader.started.lock().unwrap().len(), 1);
    assert_eq!(m.cached_images(), 3);
}

#[test]
fn failed_fetch_is_never_retried() {
    let loader = ManualLoader::default();
    let mut m = manager(&loader);
    let black = Rgb::new(0, 0, 0);

    assert!(matches!(m.request(Region::Eyeliner, Side::Left, black), DecalLookup::Pending));
    loader.done.lock().unwrap().push((
        "mem://liner".into(),
        Err(TryOnError::AssetFetch { url: "mem://liner".into(), reason: "404".into() }),
    ));
    m.pump();

    for _ in 0..3 {
        assert!(matches!(m.request(Region::Eyeliner, Side::Left, black), DecalLookup::Failed));
        assert!(matches!(m.request(Region::Eyeliner, Side::Right, black), DecalLookup::Failed));
    }
    assert_eq!(loader.started.lock().unwrap().len(), 1);
    assert_eq!(m.cached_images(), 0);
}

#[test]
fn region_without_url_is_not_configured() {
    let loader = ManualLoader::default();
    let mut m = DecalOverlayManager::new(Box::new(loader.clone()), HashMap::new());
    assert!(matches!(m.request(Region::Eyelash, Side::Left, Rgb::new(1, 2, 3)), DecalLookup::NotConfigured));
    assert!(loader.started.lock().unwrap().is_empty());
}
