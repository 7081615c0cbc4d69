//! Mipmap pyramid preview

use super::Bitmap;
use super::portable::PortablePixels;
use crate::error::Result;

/// Lay out every mipmap level side by side: the base on the left, smaller
/// levels stacked top to bottom in a column to its right.
///
/// # Errors
/// Returns an error if a level cannot be decoded.
pub fn draw_mipmap_layers(pixels: &PortablePixels) -> Result<Bitmap> {
    let base_width = pixels.width();
    let base_height = pixels.height();
    let tail = &pixels.mipmaps[1.min(pixels.mipmaps.len())..];
    let column_width = tail.iter().map(|m| m.width).max().unwrap_or(0);
    let column_height: u32 = tail.iter().map(|m| m.height).sum();

    let mut canvas = Bitmap::new(base_width + column_width, base_height.max(column_height));
    let mut y = 0;
    for index in 0..pixels.mipmaps.len() {
        let level = &pixels.mipmaps[index];
        let bitmap = Bitmap::from_rgba(level.width, level.height, &pixels.decode_level(index)?);
        if index == 0 {
            canvas.blit(&bitmap, 0, 0);
        } else {
            canvas.blit(&bitmap, base_width, y);
            y += level.height;
        }
    }
    Ok(canvas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::portable::MipLevel;

    #[test]
    fn test_pyramid_layout() {
        let mut pixels = PortablePixels::from_rgba(4, 4, [255u8, 0, 0, 255].repeat(16));
        pixels.mipmaps.push(MipLevel::new(2, 2, [0u8, 255, 0, 255].repeat(4)));
        pixels.mipmaps.push(MipLevel::new(1, 1, vec![0, 0, 255, 255]));

        let canvas = draw_mipmap_layers(&pixels).unwrap();
        assert_eq!((canvas.width(), canvas.height()), (6, 4));
        assert_eq!(canvas.pixel(0, 0), Some([255, 0, 0, 255]));
        assert_eq!(canvas.pixel(4, 0), Some([0, 255, 0, 255]));
        assert_eq!(canvas.pixel(4, 2), Some([0, 0, 255, 255]));
        assert_eq!(canvas.pixel(5, 3), Some([0, 0, 0, 0]));
    }
}
