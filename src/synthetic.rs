//! A procedurally laid out face-mesh frame.
//!
//! Every landmark the geometry tables reference is placed on simple ellipses
//! in the right order, so fills, holes and decal anchors all land where a
//! real detection would put them. Used by the replay tracker when no
//! recording is configured, and by tests.

use std::f32::consts::PI;

use crate::geometry::{
    FACE_OVAL, LEFT_BROW, LEFT_EYE, LEFT_EYE_OPENING, LEFT_NOSTRIL, LIPS_INNER, LIPS_OUTER,
    RIGHT_BROW, RIGHT_EYE, RIGHT_EYE_OPENING, RIGHT_NOSTRIL, SKIN_REFERENCE,
};
use crate::error::Result;
use crate::landmarks::{Landmark, LandmarkFrame, LANDMARK_COUNT};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticFace {
    /// Normalized face center.
    pub center: (f32, f32),
    /// 1.0 = face oval about 0.44 x 0.6 of the frame.
    pub scale: f32,
    /// Head roll in degrees, clockwise on screen.
    pub roll_degrees: f32,
    /// 0 = closed lips, 1 = wide open.
    pub mouth_open: f32,
}

impl Default for SyntheticFace {
    fn default() -> Self {
        Self { center: (0.5, 0.5), scale: 1.0, roll_degrees: 0.0, mouth_open: 0.6 }
    }
}

// Place `indices` around an ellipse, starting at `start` radians and walking
// clockwise on screen (over the top first when starting on the left).
fn ring(pts: &mut [Landmark], indices: &[u16], c: (f32, f32), rx: f32, ry: f32, start: f32, mirror: bool) {
    let n = indices.len() as f32;
    for (k, &i) in indices.iter().enumerate() {
        let theta = start - 2.0 * PI * k as f32 / n;
        let dx = rx * theta.cos();
        let x = if mirror { c.0 - dx } else { c.0 + dx };
        pts[i as usize] = Landmark::new(x, c.1 - ry * theta.sin());
    }
}

impl SyntheticFace {
    pub fn frame(&self) -> Result<LandmarkFrame> {
        let s = self.scale;
        let (cx, cy) = self.center;
        let mut pts = vec![Landmark::new(cx, cy); LANDMARK_COUNT];

        ring(&mut pts, &FACE_OVAL, (cx, cy), 0.22 * s, 0.30 * s, PI / 2.0, false);

        let eye_y = cy - 0.08 * s;
        let eye_dx = 0.09 * s;
        ring(&mut pts, &LEFT_EYE_OPENING, (cx - eye_dx, eye_y), 0.045 * s, 0.018 * s, PI, false);
        ring(&mut pts, &RIGHT_EYE_OPENING, (cx + eye_dx, eye_y), 0.045 * s, 0.018 * s, PI, true);

        let brow_y = cy - 0.145 * s;
        ring(&mut pts, &LEFT_BROW, (cx - eye_dx, brow_y), 0.055 * s, 0.011 * s, PI, false);
        ring(&mut pts, &RIGHT_BROW, (cx + eye_dx, brow_y), 0.055 * s, 0.011 * s, PI, true);

        let lip_y = cy + 0.16 * s;
        ring(&mut pts, &LIPS_OUTER, (cx, lip_y), 0.07 * s, 0.032 * s, PI, false);
        let open = self.mouth_open.clamp(0.0, 1.0);
        ring(&mut pts, &LIPS_INNER, (cx, lip_y), 0.048 * s, (0.002 + 0.02 * open) * s, PI, false);

        let nose_y = cy + 0.08 * s;
        ring(&mut pts, &LEFT_NOSTRIL, (cx - 0.018 * s, nose_y), 0.008 * s, 0.005 * s, PI, false);
        ring(&mut pts, &RIGHT_NOSTRIL, (cx + 0.018 * s, nose_y), 0.008 * s, 0.005 * s, PI, true);

        for (k, &i) in SKIN_REFERENCE.iter().enumerate() {
            let t = k as f32 / (SKIN_REFERENCE.len() - 1) as f32;
            pts[i as usize] = Landmark::new(cx, eye_y + (nose_y - 0.02 * s - eye_y) * t);
        }

        pts[LEFT_EYE.cheek as usize] = Landmark::new(cx - 0.13 * s, cy + 0.05 * s);
        pts[RIGHT_EYE.cheek as usize] = Landmark::new(cx + 0.13 * s, cy + 0.05 * s);

        if self.roll_degrees != 0.0 {
            let (sin, cos) = self.roll_degrees.to_radians().sin_cos();
            for p in pts.iter_mut() {
                let (dx, dy) = (p.x - cx, p.y - cy);
                *p = Landmark::new(cx + dx * cos - dy * sin, cy + dx * sin + dy * cos);
            }
        }

        LandmarkFrame::new(pts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eye_corners_and_lid_peak_are_where_expected() {
        let f = SyntheticFace::default().frame().unwrap();
        let outer = f.get(LEFT_EYE.outer as usize);
        let inner = f.get(LEFT_EYE.inner as usize);
        let peak = f.get(LEFT_EYE.lid_peak as usize);
        let low = f.get(LEFT_EYE.lower_lid as usize);
        assert!(outer.x < inner.x);
        assert!(peak.y < outer.y && low.y > outer.y);

        let r_outer = f.get(RIGHT_EYE.outer as usize);
        let r_inner = f.get(RIGHT_EYE.inner as usize);
        assert!(r_outer.x > r_inner.x);
    }

    #[test]
    fn oval_starts_on_top() {
        let f = SyntheticFace::default().frame().unwrap();
        let top = f.get(FACE_OVAL[0] as usize);
        let chin = f.get(FACE_OVAL[18] as usize);
        assert!(top.y < chin.y);
        assert!((top.x - 0.5).abs() < 1e-5);
    }
}
