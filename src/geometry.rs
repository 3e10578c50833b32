//! Static face-mesh index tables.
//!
//! Polygons are closed landmark loops for fills, arcs are open runs for
//! strokes, and fans are triangle index buffers for the GPU path. Fans are
//! derived at compile time by [`fan`], so the GPU topology is fixed data.
//! Hole polygons (mouth, eye openings, brows, nostrils) live in their own
//! tables and are never merged with the outer fill they cut.
//!
//! "Left"/"right" are image-space sides of the unmirrored camera frame.

/// Triangle fan over a closed polygon `[v0, v1, .., v(n-1)]`:
/// `n-2` triangles `[v0, v(i), v(i+1)]` for `i = 1..n-2`.
pub const fn fan<const N: usize, const M: usize>(poly: [u16; N]) -> [u16; M] {
    assert!(N >= 3, "polygon needs at least three vertices");
    assert!(M == 3 * (N - 2), "fan length must be 3 * (n - 2)");
    let mut out = [0u16; M];
    let mut i = 1;
    while i + 1 < N {
        let k = (i - 1) * 3;
        out[k] = poly[0];
        out[k + 1] = poly[i];
        out[k + 2] = poly[i + 1];
        i += 1;
    }
    out
}

// ---------------------------------------------------------------- lips

pub const LIPS_OUTER: [u16; 20] = [
    61, 185, 40, 39, 37, 0, 267, 269, 270, 409, 291, 375, 321, 405, 314, 17, 84, 181, 91, 146,
];

/// Mouth opening.
pub const LIPS_INNER: [u16; 20] = [
    78, 191, 80, 81, 82, 13, 312, 311, 310, 415, 308, 324, 318, 402, 317, 14, 87, 178, 88, 95,
];

// ---------------------------------------------------------------- eyes

pub const LEFT_EYE_OPENING: [u16; 16] = [
    33, 246, 161, 160, 159, 158, 157, 173, 133, 155, 154, 153, 145, 144, 163, 7,
];

pub const RIGHT_EYE_OPENING: [u16; 16] = [
    263, 466, 388, 387, 386, 385, 384, 398, 362, 382, 381, 380, 374, 373, 390, 249,
];

/// Upper lid, outer corner to inner corner (open arc).
pub const LEFT_UPPER_LID: [u16; 9] = [33, 246, 161, 160, 159, 158, 157, 173, 133];
pub const RIGHT_UPPER_LID: [u16; 9] = [263, 466, 388, 387, 386, 385, 384, 398, 362];

/// Upper lid without either corner. Corners barely move during a blink,
/// the mid-arc does, so vertical anchoring reads from these.
pub const LEFT_MID_UPPER_LID: [u16; 7] = [246, 161, 160, 159, 158, 157, 173];
pub const RIGHT_MID_UPPER_LID: [u16; 7] = [466, 388, 387, 386, 385, 384, 398];

// ---------------------------------------------------------------- brows

pub const LEFT_BROW: [u16; 10] = [70, 63, 105, 66, 107, 55, 65, 52, 53, 46];
pub const RIGHT_BROW: [u16; 10] = [300, 293, 334, 296, 336, 285, 295, 282, 283, 276];

// ---------------------------------------------------------------- lids

/// Crescent between upper lid and brow underside. Starts on the brow so
/// every fan triangle stays above the lid line.
pub const LEFT_EYESHADOW: [u16; 14] = [
    52, 53, 46, 33, 246, 161, 160, 159, 158, 157, 173, 133, 55, 65,
];
pub const RIGHT_EYESHADOW: [u16; 14] = [
    282, 283, 276, 263, 466, 388, 387, 386, 385, 384, 398, 362, 285, 295,
];

// ---------------------------------------------------------------- face

/// Tracked face boundary, clockwise from the forehead top (10).
pub const FACE_OVAL: [u16; 36] = [
    10, 338, 297, 332, 284, 251, 389, 356, 454, 323, 361, 288, 397, 365, 379, 378, 400, 377, 152,
    148, 176, 149, 150, 136, 172, 58, 132, 93, 234, 127, 162, 21, 54, 103, 67, 109,
];

pub const LEFT_NOSTRIL: [u16; 6] = [79, 166, 75, 60, 20, 238];
pub const RIGHT_NOSTRIL: [u16; 6] = [309, 392, 305, 290, 250, 458];

/// Nose bridge points; never under hair, used as the skin reference.
pub const SKIN_REFERENCE: [u16; 5] = [6, 168, 197, 195, 5];

// ---------------------------------------------------------------- fans

pub const LIPS_OUTER_FAN: [u16; 3 * (LIPS_OUTER.len() - 2)] = fan(LIPS_OUTER);
pub const LIPS_INNER_FAN: [u16; 3 * (LIPS_INNER.len() - 2)] = fan(LIPS_INNER);
pub const LEFT_BROW_FAN: [u16; 3 * (LEFT_BROW.len() - 2)] = fan(LEFT_BROW);
pub const RIGHT_BROW_FAN: [u16; 3 * (RIGHT_BROW.len() - 2)] = fan(RIGHT_BROW);
pub const LEFT_EYESHADOW_FAN: [u16; 3 * (LEFT_EYESHADOW.len() - 2)] = fan(LEFT_EYESHADOW);
pub const RIGHT_EYESHADOW_FAN: [u16; 3 * (RIGHT_EYESHADOW.len() - 2)] = fan(RIGHT_EYESHADOW);

/// Image-space side of the face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Left, Side::Right];

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }
}

/// Reference landmarks for one eye and the features around it.
#[derive(Debug, Clone, Copy)]
pub struct EyeRefs {
    pub outer: u16,
    pub inner: u16,
    pub lid_peak: u16,
    pub lower_lid: u16,
    pub mid_upper_lid: &'static [u16],
    pub upper_lid: &'static [u16],
    pub opening: &'static [u16],
    pub brow: &'static [u16],
    pub brow_peak: u16,
    pub cheek: u16,
}

pub const LEFT_EYE: EyeRefs = EyeRefs {
    outer: 33,
    inner: 133,
    lid_peak: 159,
    lower_lid: 145,
    mid_upper_lid: &LEFT_MID_UPPER_LID,
    upper_lid: &LEFT_UPPER_LID,
    opening: &LEFT_EYE_OPENING,
    brow: &LEFT_BROW,
    brow_peak: 105,
    cheek: 50,
};

pub const RIGHT_EYE: EyeRefs = EyeRefs {
    outer: 263,
    inner: 362,
    lid_peak: 386,
    lower_lid: 374,
    mid_upper_lid: &RIGHT_MID_UPPER_LID,
    upper_lid: &RIGHT_UPPER_LID,
    opening: &RIGHT_EYE_OPENING,
    brow: &RIGHT_BROW,
    brow_peak: 334,
    cheek: 280,
};

pub fn eye(side: Side) -> &'static EyeRefs {
    match side {
        Side::Left => &LEFT_EYE,
        Side::Right => &RIGHT_EYE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::LANDMARK_COUNT;

    #[test]
    fn fan_emits_n_minus_two_triangles_from_v0() {
        let f: [u16; 9] = fan([4, 5, 6, 7, 8]);
        assert_eq!(f, [4, 5, 6, 4, 6, 7, 4, 7, 8]);
        assert_eq!(LIPS_OUTER_FAN.len(), 3 * 18);
        assert!(LIPS_OUTER_FAN.chunks(3).all(|t| t[0] == LIPS_OUTER[0]));
    }

    #[test]
    fn fan_covers_each_edge_in_order() {
        for (i, tri) in LEFT_BROW_FAN.chunks(3).enumerate() {
            assert_eq!(tri, [LEFT_BROW[0], LEFT_BROW[i + 1], LEFT_BROW[i + 2]]);
        }
    }

    #[test]
    fn every_index_is_inside_the_mesh() {
        let tables: [&[u16]; 14] = [
            &LIPS_OUTER,
            &LIPS_INNER,
            &LEFT_EYE_OPENING,
            &RIGHT_EYE_OPENING,
            &LEFT_BROW,
            &RIGHT_BROW,
            &LEFT_EYESHADOW,
            &RIGHT_EYESHADOW,
            &FACE_OVAL,
            &LEFT_NOSTRIL,
            &RIGHT_NOSTRIL,
            &SKIN_REFERENCE,
            &LEFT_MID_UPPER_LID,
            &RIGHT_MID_UPPER_LID,
        ];
        for t in tables {
            assert!(t.iter().all(|&i| (i as usize) < LANDMARK_COUNT));
        }
    }

    #[test]
    fn mid_lid_excludes_corners() {
        for side in Side::BOTH {
            let e = eye(side);
            assert!(!e.mid_upper_lid.contains(&e.outer));
            assert!(!e.mid_upper_lid.contains(&e.inner));
            assert_eq!(e.upper_lid.first(), Some(&e.outer));
            assert_eq!(e.upper_lid.last(), Some(&e.inner));
            assert!(e.mid_upper_lid.contains(&e.lid_peak));
        }
    }

    #[test]
    fn holes_are_separate_from_fills() {
        assert!(LIPS_INNER.iter().all(|i| !LIPS_OUTER.contains(i)));
    }
}
