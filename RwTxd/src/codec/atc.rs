//! AMD/Qualcomm ATC compression
//!
//! The colour block stores a 555 endpoint (with a mode bit in bit 15) and a 565
//! endpoint followed by 2-bit indices. The alpha variants prepend a DXT3-style
//! explicit or DXT5-style interpolated alpha block.

#![allow(clippy::cast_possible_truncation)]

use super::dxt::{
    decode_explicit_alpha, decode_interpolated_alpha, encode_explicit_alpha,
    encode_interpolated_alpha, rgb565_to_rgba,
};
use super::{for_each_block_into, write_block};
use crate::error::{Error, Result};
use crate::raster::Compression;

fn rgb555_to_rgba(color: u16) -> [u8; 4] {
    let r = ((color >> 10) & 0x1F) as u8;
    let g = ((color >> 5) & 0x1F) as u8;
    let b = (color & 0x1F) as u8;
    [(r << 3) | (r >> 2), (g << 3) | (g >> 2), (b << 3) | (b >> 2), 255]
}

fn rgb_to_555(rgb: [u8; 4]) -> u16 {
    (u16::from(rgb[0] >> 3) << 10) | (u16::from(rgb[1] >> 3) << 5) | u16::from(rgb[2] >> 3)
}

fn rgb_to_565(rgb: [u8; 4]) -> u16 {
    super::dxt::rgb_to_565(rgb[0], rgb[1], rgb[2])
}

fn color_palette(c0: u16, c1: u16) -> [[u8; 4]; 4] {
    let a = rgb555_to_rgba(c0 & 0x7FFF);
    let b = rgb565_to_rgba(c1);
    let mut palette = [[0u8, 0, 0, 255]; 4];
    if c0 & 0x8000 == 0 {
        palette[0] = a;
        palette[3] = b;
        for i in 0..3 {
            let (ca, cb) = (u16::from(a[i]), u16::from(b[i]));
            palette[1][i] = ((2 * ca + cb) / 3) as u8;
            palette[2][i] = ((ca + 2 * cb) / 3) as u8;
        }
    } else {
        palette[2] = a;
        palette[3] = b;
        for i in 0..3 {
            palette[1][i] = a[i].saturating_sub(b[i] / 4);
        }
    }
    palette
}

fn decode_color_block(data: &[u8], block: &mut [u8; 64]) {
    let c0 = u16::from_le_bytes([data[0], data[1]]);
    let c1 = u16::from_le_bytes([data[2], data[3]]);
    let indices = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
    let palette = color_palette(c0, c1);
    for i in 0..16 {
        let color = palette[((indices >> (i * 2)) & 3) as usize];
        block[i * 4..i * 4 + 3].copy_from_slice(&color[..3]);
        block[i * 4 + 3] = 255;
    }
}

fn encode_color_block(block: &[[u8; 4]; 16]) -> [u8; 8] {
    let lum = |p: &[u8; 4]| u32::from(p[0]) * 2 + u32::from(p[1]) * 4 + u32::from(p[2]);
    let darkest = block.iter().min_by_key(|p| lum(p)).copied().unwrap_or([0; 4]);
    let brightest = block.iter().max_by_key(|p| lum(p)).copied().unwrap_or([0; 4]);

    // Mode 0: index 0 is the 555 endpoint, index 3 the 565 endpoint.
    let c0 = rgb_to_555(darkest) & 0x7FFF;
    let c1 = rgb_to_565(brightest);
    let palette = color_palette(c0, c1);

    let mut indices = 0u32;
    for (i, pixel) in block.iter().enumerate() {
        let best = palette
            .iter()
            .enumerate()
            .min_by_key(|(_, c)| {
                (0..3)
                    .map(|k| {
                        let d = i32::from(pixel[k]) - i32::from(c[k]);
                        (d * d) as u32
                    })
                    .sum::<u32>()
            })
            .map_or(0, |(index, _)| index as u32);
        indices |= best << (i * 2);
    }

    let mut out = [0u8; 8];
    out[0..2].copy_from_slice(&c0.to_le_bytes());
    out[2..4].copy_from_slice(&c1.to_le_bytes());
    out[4..8].copy_from_slice(&indices.to_le_bytes());
    out
}

/// Decode an ATC surface to RGBA8.
///
/// # Errors
/// Returns [`Error::CodecFailure`] if the data is too short.
pub fn decompress(compression: Compression, width: u32, height: u32, data: &[u8]) -> Result<Vec<u8>> {
    let block_bytes = compression.block_bytes();
    let expected = compression.surface_size(width, height);
    if data.len() < expected {
        return Err(Error::codec(format!(
            "{compression} surface {width}x{height} needs {expected} bytes, have {}",
            data.len()
        )));
    }

    let blocks_x = width.div_ceil(4) as usize;
    let mut rgba = vec![0u8; width as usize * height as usize * 4];
    let mut decoded = [0u8; 64];

    for (index, block) in data[..expected].chunks_exact(block_bytes).enumerate() {
        match compression {
            Compression::AtcRgb => decode_color_block(block, &mut decoded),
            Compression::AtcExplicitAlpha => {
                decode_color_block(&block[8..], &mut decoded);
                decode_explicit_alpha(&block[..8], &mut decoded);
            }
            Compression::AtcInterpolatedAlpha => {
                decode_color_block(&block[8..], &mut decoded);
                decode_interpolated_alpha(&block[..8], &mut decoded);
            }
            other => return Err(Error::codec(format!("{other} is not an ATC scheme"))),
        }
        write_block(&mut rgba, width, height, index % blocks_x, index / blocks_x, &decoded);
    }
    Ok(rgba)
}

/// Encode RGBA8 as an ATC surface.
///
/// # Errors
/// Returns [`Error::CodecFailure`] if the input is too short.
pub fn compress(compression: Compression, width: u32, height: u32, rgba: &[u8]) -> Result<Vec<u8>> {
    if rgba.len() < width as usize * height as usize * 4 {
        return Err(Error::codec("RGBA data shorter than surface"));
    }
    let encode: fn(&[[u8; 4]; 16], &mut [u8]) = match compression {
        Compression::AtcRgb => |block, out| out.copy_from_slice(&encode_color_block(block)),
        Compression::AtcExplicitAlpha => |block, out| {
            out[..8].copy_from_slice(&encode_explicit_alpha(block));
            out[8..].copy_from_slice(&encode_color_block(block));
        },
        Compression::AtcInterpolatedAlpha => |block, out| {
            out[..8].copy_from_slice(&encode_interpolated_alpha(block));
            out[8..].copy_from_slice(&encode_color_block(block));
        },
        other => return Err(Error::codec(format!("{other} is not an ATC scheme"))),
    };
    Ok(for_each_block_into(compression, width, height, rgba, encode))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solid_color_survives() {
        let rgba = [200u8, 40, 80, 255].repeat(16);
        let packed = compress(Compression::AtcRgb, 4, 4, &rgba).unwrap();
        assert_eq!(packed.len(), 8);
        let decoded = decompress(Compression::AtcRgb, 4, 4, &packed).unwrap();
        for texel in decoded.chunks_exact(4) {
            assert!(texel[0].abs_diff(200) <= 8);
            assert!(texel[1].abs_diff(40) <= 8);
            assert!(texel[2].abs_diff(80) <= 8);
            assert_eq!(texel[3], 255);
        }
    }

    #[test]
    fn test_alpha_variants_keep_alpha() {
        let mut rgba = Vec::new();
        for i in 0..16u8 {
            rgba.extend_from_slice(&[10, 20, 30, i * 17]);
        }
        for compression in [Compression::AtcExplicitAlpha, Compression::AtcInterpolatedAlpha] {
            let packed = compress(compression, 4, 4, &rgba).unwrap();
            assert_eq!(packed.len(), 16);
            let decoded = decompress(compression, 4, 4, &packed).unwrap();
            for (a, b) in decoded.chunks_exact(4).zip(rgba.chunks_exact(4)) {
                assert!(a[3].abs_diff(b[3]) <= 20);
            }
        }
    }
}
