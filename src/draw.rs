// Window + software drawing utilities.
// Visual effects provided here:
// 1) A resizable window that shows the composited mirror.
// 2) A swatch bar along the bottom edge (number keys pick a shade).
// 3) A tiny 5x7 bitmap font for the HUD and user-facing error messages.

use crate::color::Rgb;
use crate::error::{Result, TryOnError};
use crate::types::{pack_rgb, FrameBuffer};
use minifb::{Key, KeyRepeat, Window, WindowOptions};

pub struct Drawer {
    window: Window, // the on-screen window you see
}

impl Drawer {
    /// Create a resizable window.
    /// Visual: a new empty window appears with your chosen title.
    pub fn new(title: &str, width: usize, height: usize) -> Result<Self> {
        let opts = WindowOptions { resize: true, ..WindowOptions::default() };
        let mut window =
            Window::new(title, width, height, opts).map_err(|e| TryOnError::Window(e.to_string()))?;
        window.set_target_fps(60);
        Ok(Self { window })
    }

    /// Push the pixels for this frame to the screen.
    /// Visual: the window immediately displays the new image.
    pub fn present(&mut self, framebuffer: &FrameBuffer) -> Result<()> {
        self.window
            .update_with_buffer(&framebuffer.pixels, framebuffer.width, framebuffer.height)
            .map_err(|e| TryOnError::Window(e.to_string()))
    }

    /// Returns false when the user closes the window (so we can stop the loop).
    pub fn is_open(&self) -> bool {
        self.window.is_open()
    }

    /// Current client size; the canvas follows it.
    pub fn size(&self) -> (usize, usize) {
        self.window.get_size()
    }

    fn pressed(&self, key: Key) -> bool {
        self.window.is_key_pressed(key, KeyRepeat::No)
    }

    /// ESC closes the mirror.
    pub fn esc_pressed(&self) -> bool {
        self.pressed(Key::Escape)
    }

    /// Visual: when pressed, every applied shade disappears.
    pub fn c_pressed_once(&self) -> bool {
        self.pressed(Key::C)
    }

    // Retry after a camera failure.
    pub fn r_pressed_once(&self) -> bool {
        self.pressed(Key::R)
    }

    /// Number key 1..9 then 0, as a swatch index 0..9.
    pub fn swatch_pressed(&self) -> Option<usize> {
        const KEYS: [Key; 10] = [
            Key::Key1, Key::Key2, Key::Key3, Key::Key4, Key::Key5,
            Key::Key6, Key::Key7, Key::Key8, Key::Key9, Key::Key0,
        ];
        KEYS.iter().position(|k| self.pressed(*k))
    }

    /// +0.1 / -0.1 zoom steps; held keys repeat.
    pub fn zoom_delta(&self) -> f32 {
        let down = |k| self.window.is_key_pressed(k, KeyRepeat::Yes);
        let mut d = 0.0;
        if down(Key::Equal) || down(Key::NumPadPlus) {
            d += 0.1;
        }
        if down(Key::Minus) || down(Key::NumPadMinus) {
            d -= 0.1;
        }
        d
    }
}

/* ---------- Software drawing: pixels, rectangles, tiny bitmap font ---------- */

/// Put a pixel on the framebuffer if (x,y) is inside bounds.
/// Visual: the exact pixel at (x,y) changes color.
#[inline]
fn put_pixel(fb: &mut FrameBuffer, x: i32, y: i32, color: u32) {
    if x < 0 || y < 0 {
        return;
    }
    fb.put(x as usize, y as usize, color);
}

/// Solid rectangle, clipped to the frame.
pub fn fill_rect(fb: &mut FrameBuffer, x: i32, y: i32, w: i32, h: i32, color: u32) {
    for yy in y.max(0)..(y + h).min(fb.height as i32) {
        for xx in x.max(0)..(x + w).min(fb.width as i32) {
            fb.pixels[yy as usize * fb.width + xx as usize] = color;
        }
    }
}

/// 1-pixel rectangle outline.
fn stroke_rect(fb: &mut FrameBuffer, x: i32, y: i32, w: i32, h: i32, color: u32) {
    for xx in x..x + w {
        put_pixel(fb, xx, y, color);
        put_pixel(fb, xx, y + h - 1, color);
    }
    for yy in y..y + h {
        put_pixel(fb, x, yy, color);
        put_pixel(fb, x + w - 1, yy, color);
    }
}

/// One chip per swatch along the bottom edge, labelled with its key.
/// Visual: small colored squares; the ones currently applied get a white frame.
pub fn draw_swatch_bar(fb: &mut FrameBuffer, swatches: &[(Rgb, bool)]) {
    const CHIP: i32 = 22;
    const GAP: i32 = 6;
    let y = fb.height as i32 - CHIP - 14;
    for (i, (color, active)) in swatches.iter().take(10).enumerate() {
        let x = 8 + i as i32 * (CHIP + GAP);
        fill_rect(fb, x, y, CHIP, CHIP, pack_rgb(color.r, color.g, color.b));
        stroke_rect(fb, x, y, CHIP, CHIP, if *active { 0x00_FF_FF_FF } else { 0x00_20_20_20 });
        let label = ((i + 1) % 10).to_string();
        draw_text_5x7(fb, x + CHIP / 2 - 2, y + CHIP + 3, &label, 0x00_FF_FF_FF);
    }
}

/// A dark band across the middle with the message word-wrapped on it.
/// Visual: the camera failure text the user can act on.
pub fn draw_message(fb: &mut FrameBuffer, text: &str, color: u32) {
    let per_line = ((fb.width as i32 - 24) / 6).max(8) as usize;
    let mut lines: Vec<String> = Vec::new();
    for word in text.split_whitespace() {
        match lines.last_mut() {
            Some(line) if line.len() + 1 + word.len() <= per_line => {
                line.push(' ');
                line.push_str(word);
            }
            _ => lines.push(word.to_string()),
        }
    }
    let band_h = lines.len() as i32 * 10 + 16;
    let top = fb.height as i32 / 2 - band_h / 2;
    fill_rect(fb, 0, top, fb.width as i32, band_h, 0x00_10_10_10);
    for (i, line) in lines.iter().enumerate() {
        draw_text_5x7(fb, 12, top + 8 + i as i32 * 10, line, color);
    }
}

/* ---------- 5x7 bitmap font ---------- */

/// Return a 5x7 glyph bitmap. Lowercase letters share the uppercase shapes.
/// Each u8 is a row; the low 5 bits are the pixels (bit 4 = leftmost).
fn glyph5x7(ch: char) -> Option<[u8; 7]> {
    // Helper macro to define a glyph quickly
    macro_rules! g { ($a:expr,$b:expr,$c:expr,$d:expr,$e:expr,$f:expr,$g:expr) => {
        Some([$a,$b,$c,$d,$e,$f,$g])
    }; }

    match ch.to_ascii_uppercase() {
        // Digits 0..9
        '0' => g!(0b01110,0b10001,0b10011,0b10101,0b11001,0b10001,0b01110),
        '1' => g!(0b00100,0b01100,0b00100,0b00100,0b00100,0b00100,0b01110),
        '2' => g!(0b01110,0b10001,0b00001,0b00010,0b00100,0b01000,0b11111),
        '3' => g!(0b11110,0b00001,0b00001,0b01110,0b00001,0b00001,0b11110),
        '4' => g!(0b00010,0b00110,0b01010,0b10010,0b11111,0b00010,0b00010),
        '5' => g!(0b11111,0b10000,0b11110,0b00001,0b00001,0b10001,0b01110),
        '6' => g!(0b00110,0b01000,0b10000,0b11110,0b10001,0b10001,0b01110),
        '7' => g!(0b11111,0b00001,0b00010,0b00100,0b01000,0b01000,0b01000),
        '8' => g!(0b01110,0b10001,0b10001,0b01110,0b10001,0b10001,0b01110),
        '9' => g!(0b01110,0b10001,0b10001,0b01111,0b00001,0b00010,0b01100),

        'A' => g!(0b01110,0b10001,0b10001,0b11111,0b10001,0b10001,0b10001),
        'B' => g!(0b11110,0b10001,0b10001,0b11110,0b10001,0b10001,0b11110),
        'C' => g!(0b01110,0b10001,0b10000,0b10000,0b10000,0b10001,0b01110),
        'D' => g!(0b11100,0b10010,0b10001,0b10001,0b10001,0b10010,0b11100),
        'E' => g!(0b11111,0b10000,0b10000,0b11110,0b10000,0b10000,0b11111),
        'F' => g!(0b11111,0b10000,0b10000,0b11110,0b10000,0b10000,0b10000),
        'G' => g!(0b01110,0b10001,0b10000,0b10111,0b10001,0b10001,0b01111),
        'H' => g!(0b10001,0b10001,0b10001,0b11111,0b10001,0b10001,0b10001),
        'I' => g!(0b01110,0b00100,0b00100,0b00100,0b00100,0b00100,0b01110),
        'J' => g!(0b00111,0b00010,0b00010,0b00010,0b00010,0b10010,0b01100),
        'K' => g!(0b10001,0b10010,0b10100,0b11000,0b10100,0b10010,0b10001),
        'L' => g!(0b10000,0b10000,0b10000,0b10000,0b10000,0b10000,0b11111),
        'M' => g!(0b10001,0b11011,0b10101,0b10101,0b10001,0b10001,0b10001),
        'N' => g!(0b10001,0b10001,0b11001,0b10101,0b10011,0b10001,0b10001),
        'O' => g!(0b01110,0b10001,0b10001,0b10001,0b10001,0b10001,0b01110),
        'P' => g!(0b11110,0b10001,0b10001,0b11110,0b10000,0b10000,0b10000),
        'Q' => g!(0b01110,0b10001,0b10001,0b10001,0b10101,0b10010,0b01101),
        'R' => g!(0b11110,0b10001,0b10001,0b11110,0b10100,0b10010,0b10001),
        'S' => g!(0b01111,0b10000,0b10000,0b01110,0b00001,0b00001,0b11110),
        'T' => g!(0b11111,0b00100,0b00100,0b00100,0b00100,0b00100,0b00100),
        'U' => g!(0b10001,0b10001,0b10001,0b10001,0b10001,0b10001,0b01110),
        'V' => g!(0b10001,0b10001,0b10001,0b10001,0b10001,0b01010,0b00100),
        'W' => g!(0b10001,0b10001,0b10001,0b10101,0b10101,0b10101,0b01010),
        'X' => g!(0b10001,0b10001,0b01010,0b00100,0b01010,0b10001,0b10001),
        'Y' => g!(0b10001,0b10001,0b01010,0b00100,0b00100,0b00100,0b00100),
        'Z' => g!(0b11111,0b00001,0b00010,0b00100,0b01000,0b10000,0b11111),

        // Punctuation
        ' ' => g!(0b00000,0b00000,0b00000,0b00000,0b00000,0b00000,0b00000),
        '|' => g!(0b00100,0b00100,0b00100,0b00100,0b00100,0b00100,0b00100),
        ':' => g!(0b00000,0b00100,0b00000,0b00000,0b00100,0b00000,0b00000),
        '.' => g!(0b00000,0b00000,0b00000,0b00000,0b00000,0b00100,0b00000),
        ',' => g!(0b00000,0b00000,0b00000,0b00000,0b00000,0b00100,0b01000),
        '-' => g!(0b00000,0b00000,0b00000,0b11111,0b00000,0b00000,0b00000),
        '+' => g!(0b00000,0b00100,0b00100,0b11111,0b00100,0b00100,0b00000),
        '/' => g!(0b00001,0b00010,0b00010,0b00100,0b01000,0b01000,0b10000),
        '(' => g!(0b00010,0b00100,0b01000,0b01000,0b01000,0b00100,0b00010),
        ')' => g!(0b01000,0b00100,0b00010,0b00010,0b00010,0b00100,0b01000),
        '#' => g!(0b01010,0b01010,0b11111,0b01010,0b11111,0b01010,0b01010),
        '!' => g!(0b00100,0b00100,0b00100,0b00100,0b00100,0b00000,0b00100),
        '?' => g!(0b01110,0b10001,0b00001,0b00010,0b00100,0b00000,0b00100),
        '\'' => g!(0b00100,0b00100,0b00000,0b00000,0b00000,0b00000,0b00000),
        '"' => g!(0b01010,0b01010,0b00000,0b00000,0b00000,0b00000,0b00000),

        _ => None,
    }
}

/// Draw a single 5x7 character at (x,y).
/// Visual: a tiny glyph appears with a 1-pixel black shadow for contrast.
fn draw_char_5x7(fb: &mut FrameBuffer, x: i32, y: i32, ch: char, color: u32) {
    if let Some(rows) = glyph5x7(ch) {
        // Shadow first, then the glyph itself on top.
        for (dx, dy, c) in [(1, 1, 0x00000000), (0, 0, color)] {
            for (ry, rowbits) in rows.iter().enumerate() {
                for rx in 0..5 {
                    if (rowbits & (1 << (4 - rx))) != 0 {
                        put_pixel(fb, x + rx + dx, y + ry as i32 + dy, c);
                    }
                }
            }
        }
    }
}

/// Draw a text string using 5x7 glyphs.
/// Visual: a compact HUD string appears; each glyph is 5x7 with 1-pixel spacing.
pub fn draw_text_5x7(fb: &mut FrameBuffer, mut x: i32, y: i32, text: &str, color: u32) {
    for ch in text.chars() {
        draw_char_5x7(fb, x, y, ch, color);
        x += 6; // 5 pixels glyph width + 1 pixel spacing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_letter_has_a_glyph() {
        for c in ('A'..='Z').chain('a'..='z').chain('0'..='9') {
            assert!(glyph5x7(c).is_some(), "missing glyph for {c:?}");
        }
    }

    #[test]
    fn text_draws_inside_bounds_only() {
        let mut fb = FrameBuffer::new(20, 10);
        draw_text_5x7(&mut fb, 15, 5, "WWW", 0x00_FF_FF_FF);
        assert!(fb.pixels.iter().any(|&p| p == 0x00_FF_FF_FF));
    }

    #[test]
    fn message_band_is_centered() {
        let mut fb = FrameBuffer::filled(120, 80, 0x00_FF_00_00);
        draw_message(&mut fb, "camera unavailable press r to retry", 0x00_FF_FF_FF);
        assert_eq!(fb.pixels[40 * fb.width], 0x00_10_10_10);
        assert_eq!(fb.pixels[0], 0x00_FF_00_00);
    }
}
