//! Canonical 32-bit BGRA view of a raster

use super::format::ColorOrdering;

/// A 32-bit BGRA image, the view every raster can produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Bitmap {
    /// Blank (transparent black) bitmap.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * 4],
        }
    }

    /// Bitmap from tightly packed RGBA8.
    #[must_use]
    pub fn from_rgba(width: u32, height: u32, rgba: &[u8]) -> Self {
        let mut data = rgba.to_vec();
        for texel in data.chunks_exact_mut(4) {
            texel.swap(0, 2);
        }
        Self { width, height, data }
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Always 32.
    #[must_use]
    pub fn depth(&self) -> u32 {
        32
    }

    #[must_use]
    pub fn color_order(&self) -> ColorOrdering {
        ColorOrdering::Bgra
    }

    /// Raw BGRA bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// RGBA value at (x, y).
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        let t = &self.data[offset..offset + 4];
        Some([t[2], t[1], t[0], t[3]])
    }

    /// Write an RGBA value at (x, y); out of range writes are ignored.
    pub fn set_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        self.data[offset..offset + 4].copy_from_slice(&[rgba[2], rgba[1], rgba[0], rgba[3]]);
    }

    /// Copy `src` into this bitmap with its top-left corner at (x, y).
    pub fn blit(&mut self, src: &Bitmap, x: u32, y: u32) {
        for sy in 0..src.height {
            for sx in 0..src.width {
                if let Some(rgba) = src.pixel(sx, sy) {
                    self.set_pixel(x + sx, y + sy, rgba);
                }
            }
        }
    }

    /// Tightly packed RGBA8 copy.
    #[must_use]
    pub fn to_rgba(&self) -> Vec<u8> {
        let mut rgba = self.data.clone();
        for texel in rgba.chunks_exact_mut(4) {
            texel.swap(0, 2);
        }
        rgba
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bgra_storage() {
        let bitmap = Bitmap::from_rgba(1, 1, &[1, 2, 3, 4]);
        assert_eq!(bitmap.data(), &[3, 2, 1, 4]);
        assert_eq!(bitmap.pixel(0, 0), Some([1, 2, 3, 4]));
        assert_eq!(bitmap.to_rgba(), vec![1, 2, 3, 4]);
        assert_eq!(bitmap.pixel(1, 0), None);
    }

    #[test]
    fn test_blit_clips() {
        let mut dst = Bitmap::new(2, 2);
        let src = Bitmap::from_rgba(2, 1, &[9, 9, 9, 255, 8, 8, 8, 255]);
        dst.blit(&src, 1, 1);
        assert_eq!(dst.pixel(1, 1), Some([9, 9, 9, 255]));
        assert_eq!(dst.pixel(0, 0), Some([0, 0, 0, 0]));
    }
}
