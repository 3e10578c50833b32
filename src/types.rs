// Core pixel containers shared by the camera, the canvas and the window.

#[derive(Clone, Debug, PartialEq)]
pub struct FrameBuffer {
    pub width: usize,      // frame width in pixels
    pub height: usize,     // frame height in pixels
    pub pixels: Vec<u32>,  // each entry is 0x00RRGGBB for minifb
}

impl FrameBuffer {
    /// Black frame of the given size.
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height, pixels: vec![0u32; width * height] }
    }

    /// Single flat color, handy for synthetic sources.
    pub fn filled(width: usize, height: usize, rgb: u32) -> Self {
        Self { width, height, pixels: vec![rgb & 0x00FF_FFFF; width * height] }
    }

    #[inline]
    pub fn put(&mut self, x: usize, y: usize, rgb: u32) {
        if x < self.width && y < self.height {
            self.pixels[y * self.width + x] = rgb & 0x00FF_FFFF;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Alpha plane in [0,1] per pixel.
/// Used for the hair mask: 1 = hair (remove foundation), 0 = skin.
#[derive(Clone, Debug)]
pub struct Mask {
    pub width: usize,
    pub height: usize,
    pub alpha: Vec<f32>,   // length = width * height, values clamped to [0.0, 1.0]
}

impl Mask {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height, alpha: vec![0.0; width * height] }
    }

    /// Reuse the allocation for a new size; contents are zeroed.
    pub fn reset(&mut self, width: usize, height: usize) {
        self.width = width;
        self.height = height;
        self.alpha.clear();
        self.alpha.resize(width * height, 0.0);
    }

    #[inline]
    pub fn at(&self, x: usize, y: usize) -> f32 {
        self.alpha[y * self.width + x]
    }
}

#[inline]
pub fn pack_rgb(r: u8, g: u8, b: u8) -> u32 {
    ((r as u32) << 16) | ((g as u32) << 8) | b as u32
}
