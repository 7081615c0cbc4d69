//! Surface resampling

use image::RgbaImage;
use image::imageops::{self, FilterType};

use super::mipmap::{MipmapGenMode, full_chain_length, generate_chain};
use super::portable::{MipLevel, PortablePixels};
use crate::error::{Error, Result};

/// Resample an RGBA8 surface to `new_width` x `new_height`.
///
/// # Errors
/// Returns [`Error::CodecFailure`] if `rgba` does not hold a full surface.
pub fn resize_rgba(
    rgba: &[u8],
    width: u32,
    height: u32,
    new_width: u32,
    new_height: u32,
    filter: FilterType,
) -> Result<Vec<u8>> {
    if (width, height) == (new_width, new_height) {
        return Ok(rgba.to_vec());
    }
    let img = RgbaImage::from_raw(width, height, rgba.to_vec())
        .ok_or_else(|| Error::codec(format!("RGBA buffer does not hold a {width}x{height} surface")))?;
    tracing::debug!("resizing {width}x{height} -> {new_width}x{new_height} ({filter:?})");
    Ok(imageops::resize(&img, new_width, new_height, filter).into_raw())
}

/// Resample a whole raster, rebuilding as many mipmap levels as it had.
///
/// The result is RGBA8888; callers transcode it to whatever layout they need.
///
/// # Errors
/// Returns an error if the base level cannot be decoded.
pub fn resize_pixels(
    pixels: &PortablePixels,
    new_width: u32,
    new_height: u32,
    filter: FilterType,
) -> Result<PortablePixels> {
    let base = pixels.decode_level(0)?;
    let resized = resize_rgba(&base, pixels.width(), pixels.height(), new_width, new_height, filter)?;
    let levels = pixels.mipmaps.len().min(full_chain_length(new_width, new_height));
    let chain = generate_chain(&resized, new_width, new_height, levels, MipmapGenMode::Default);

    let mut out = PortablePixels::from_rgba(new_width, new_height, Vec::new());
    out.mipmaps = chain
        .into_iter()
        .map(|(w, h, data)| MipLevel::new(w, h, data))
        .collect();
    out.has_alpha = out.mipmaps[0].data.chunks_exact(4).any(|t| t[3] != 255);
    out.auto_mipmaps = pixels.auto_mipmaps;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resize_solid() {
        let rgba = [10u8, 20, 30, 255].repeat(16);
        let out = resize_rgba(&rgba, 4, 4, 8, 2, FilterType::Triangle).unwrap();
        assert_eq!(out.len(), 8 * 2 * 4);
        assert!(out.chunks_exact(4).all(|t| t == [10, 20, 30, 255]));
    }

    #[test]
    fn test_resize_pixels_keeps_chain_length() {
        let mut pixels = PortablePixels::from_rgba(8, 8, [1u8, 2, 3, 255].repeat(64));
        pixels.mipmaps.push(MipLevel::new(4, 4, [1u8, 2, 3, 255].repeat(16)));
        pixels.mipmaps.push(MipLevel::new(2, 2, [1u8, 2, 3, 255].repeat(4)));

        let out = resize_pixels(&pixels, 16, 4, FilterType::Triangle).unwrap();
        let dims: Vec<(u32, u32)> = out.mipmaps.iter().map(|m| (m.width, m.height)).collect();
        assert_eq!(dims, vec![(16, 4), (8, 2), (4, 1)]);
        assert!(out.validate().is_ok());
    }

    #[test]
    fn test_short_buffer_rejected() {
        assert!(resize_rgba(&[0; 8], 4, 4, 2, 2, FilterType::Nearest).is_err());
    }
}
