//! DXT1..DXT5 block compression
//!
//! Decoding goes through `bcdec_rs`. Encoding has two runtimes: the built-in
//! range-fit encoder and the ISPC kernels from `intel_tex_2`.

#![allow(clippy::cast_possible_truncation)]

use rayon::prelude::*;

use super::{extract_block, for_each_block_into};
use crate::engine::DxtRuntime;
use crate::error::{Error, Result};
use crate::raster::Compression;

// ============================================================================
// Decoding
// ============================================================================

/// Decode a DXT surface to RGBA8.
///
/// # Errors
/// Returns [`Error::CodecFailure`] if `data` is shorter than the surface.
pub fn decompress(compression: Compression, width: u32, height: u32, data: &[u8]) -> Result<Vec<u8>> {
    let block_bytes = compression.block_bytes();
    let expected = compression.surface_size(width, height);
    if data.len() < expected {
        return Err(Error::codec(format!(
            "{compression} surface {width}x{height} needs {expected} bytes, have {}",
            data.len()
        )));
    }

    let mut rgba = vec![0u8; width as usize * height as usize * 4];
    let blocks_x = width.div_ceil(4) as usize;
    let mut decoded = [0u8; 64];

    for (index, block) in data[..expected].chunks_exact(block_bytes).enumerate() {
        match compression {
            Compression::Dxt1 => bcdec_rs::bc1(block, &mut decoded, 16),
            Compression::Dxt2 | Compression::Dxt3 => bcdec_rs::bc2(block, &mut decoded, 16),
            Compression::Dxt4 | Compression::Dxt5 => bcdec_rs::bc3(block, &mut decoded, 16),
            other => return Err(Error::codec(format!("{other} is not a DXT scheme"))),
        }
        if matches!(compression, Compression::Dxt2 | Compression::Dxt4) {
            unpremultiply(&mut decoded);
        }
        super::write_block(&mut rgba, width, height, index % blocks_x, index / blocks_x, &decoded);
    }
    Ok(rgba)
}

fn unpremultiply(block: &mut [u8; 64]) {
    for texel in block.chunks_exact_mut(4) {
        let alpha = u32::from(texel[3]);
        if alpha == 0 {
            continue;
        }
        for channel in &mut texel[..3] {
            *channel = ((u32::from(*channel) * 255 + alpha / 2) / alpha).min(255) as u8;
        }
    }
}

fn premultiply(rgba: &[u8]) -> Vec<u8> {
    let mut out = rgba.to_vec();
    for texel in out.chunks_exact_mut(4) {
        let alpha = u32::from(texel[3]);
        for channel in &mut texel[..3] {
            *channel = ((u32::from(*channel) * alpha + 127) / 255) as u8;
        }
    }
    out
}

// ============================================================================
// Encoding
// ============================================================================

/// Encode RGBA8 as a DXT surface.
///
/// # Errors
/// Returns [`Error::CodecFailure`] if `rgba` is too short or the scheme is not DXT.
pub fn compress(
    compression: Compression,
    width: u32,
    height: u32,
    rgba: &[u8],
    runtime: DxtRuntime,
) -> Result<Vec<u8>> {
    let expected = width as usize * height as usize * 4;
    if rgba.len() < expected {
        return Err(Error::codec(format!(
            "RGBA data for {width}x{height} needs {expected} bytes, have {}",
            rgba.len()
        )));
    }
    let source = if matches!(compression, Compression::Dxt2 | Compression::Dxt4) {
        premultiply(&rgba[..expected])
    } else {
        rgba[..expected].to_vec()
    };

    match runtime {
        DxtRuntime::Native => compress_native(compression, width, height, &source),
        DxtRuntime::Squish => compress_ispc(compression, width, height, &source),
    }
}

fn compress_native(compression: Compression, width: u32, height: u32, rgba: &[u8]) -> Result<Vec<u8>> {
    let encode: fn(&[[u8; 4]; 16], &mut [u8]) = match compression {
        Compression::Dxt1 => |block, out| out.copy_from_slice(&encode_dxt1_block(block)),
        Compression::Dxt2 | Compression::Dxt3 => |block, out| {
            out[..8].copy_from_slice(&encode_explicit_alpha(block));
            out[8..].copy_from_slice(&encode_color_block(block, false));
        },
        Compression::Dxt4 | Compression::Dxt5 => |block, out| {
            out[..8].copy_from_slice(&encode_interpolated_alpha(block));
            out[8..].copy_from_slice(&encode_color_block(block, false));
        },
        other => return Err(Error::codec(format!("{other} is not a DXT scheme"))),
    };
    Ok(for_each_block_into(compression, width, height, rgba, encode))
}

/// Pad RGBA8 to whole 4x4 blocks by repeating edge texels.
fn padded_surface(width: u32, height: u32, rgba: &[u8]) -> (u32, u32, Vec<u8>) {
    let (pw, ph) = (width.div_ceil(4) * 4, height.div_ceil(4) * 4);
    if pw == width && ph == height {
        return (pw, ph, rgba.to_vec());
    }
    let (w, h) = (width as usize, height as usize);
    let mut padded = vec![0u8; pw as usize * ph as usize * 4];
    for y in 0..ph as usize {
        for x in 0..pw as usize {
            let src = (y.min(h - 1) * w + x.min(w - 1)) * 4;
            let dst = (y * pw as usize + x) * 4;
            padded[dst..dst + 4].copy_from_slice(&rgba[src..src + 4]);
        }
    }
    (pw, ph, padded)
}

fn compress_ispc(compression: Compression, width: u32, height: u32, rgba: &[u8]) -> Result<Vec<u8>> {
    // The ISPC BC1 kernel is opaque-only; punch-through alpha needs the built-in encoder.
    if compression == Compression::Dxt1 && rgba.chunks_exact(4).any(|t| t[3] < 128) {
        return compress_native(compression, width, height, rgba);
    }

    let (pw, ph, padded) = padded_surface(width, height, rgba);
    let surface = intel_tex_2::RgbaSurface {
        width: pw,
        height: ph,
        stride: pw * 4,
        data: &padded,
    };
    let blocks = (pw as usize / 4) * (ph as usize / 4);

    match compression {
        Compression::Dxt1 => {
            let mut out = vec![0u8; blocks * 8];
            intel_tex_2::bc1::compress_blocks_into(&surface, &mut out);
            Ok(out)
        }
        Compression::Dxt4 | Compression::Dxt5 => {
            let mut out = vec![0u8; blocks * 16];
            intel_tex_2::bc3::compress_blocks_into(&surface, &mut out);
            Ok(out)
        }
        Compression::Dxt2 | Compression::Dxt3 => {
            let mut colors = vec![0u8; blocks * 8];
            intel_tex_2::bc1::compress_blocks_into(&surface, &mut colors);

            let blocks_x = pw as usize / 4;
            let mut out = vec![0u8; blocks * 16];
            out.par_chunks_mut(16).enumerate().for_each(|(i, dst)| {
                let block = extract_block(&padded, pw, ph, (i % blocks_x) * 4, (i / blocks_x) * 4);
                dst[..8].copy_from_slice(&encode_explicit_alpha(&block));
                let mut color = [0u8; 8];
                color.copy_from_slice(&colors[i * 8..i * 8 + 8]);
                dst[8..].copy_from_slice(&force_four_color(color));
            });
            Ok(out)
        }
        other => Err(Error::codec(format!("{other} is not a DXT scheme"))),
    }
}

/// DXT3 colour blocks are always decoded in four-colour mode; reorder endpoints if needed.
fn force_four_color(mut block: [u8; 8]) -> [u8; 8] {
    let c0 = u16::from_le_bytes([block[0], block[1]]);
    let c1 = u16::from_le_bytes([block[2], block[3]]);
    if c0 > c1 {
        return block;
    }
    if c0 == c1 {
        block[4..].fill(0);
        return block;
    }
    block.copy_within(0..2, 2);
    block[0..2].copy_from_slice(&c1.to_le_bytes());
    let indices = u32::from_le_bytes([block[4], block[5], block[6], block[7]]);
    let mut remapped = 0u32;
    for i in 0..16 {
        // 0<->1 swap endpoints, 2 (1/2) maps onto the nearer third.
        let index = match (indices >> (i * 2)) & 3 {
            0 => 1,
            1 => 0,
            2 => 2,
            _ => 0,
        };
        remapped |= index << (i * 2);
    }
    block[4..].copy_from_slice(&remapped.to_le_bytes());
    block
}

/// Convert RGB888 to RGB565.
#[must_use]
pub fn rgb_to_565(r: u8, g: u8, b: u8) -> u16 {
    let r5 = u16::from(r >> 3);
    let g6 = u16::from(g >> 2);
    let b5 = u16::from(b >> 3);
    (r5 << 11) | (g6 << 5) | b5
}

/// Expand RGB565 to RGBA8.
#[must_use]
pub fn rgb565_to_rgba(color: u16) -> [u8; 4] {
    let r = ((color >> 11) & 0x1F) as u8;
    let g = ((color >> 5) & 0x3F) as u8;
    let b = (color & 0x1F) as u8;
    [(r << 3) | (r >> 2), (g << 2) | (g >> 4), (b << 3) | (b >> 2), 255]
}

/// Palette of a colour block.
fn color_palette(c0: u16, c1: u16, four_color: bool) -> [[u8; 4]; 4] {
    let a = rgb565_to_rgba(c0);
    let b = rgb565_to_rgba(c1);
    let mix = |wa: u16, wb: u16, div: u16| -> [u8; 4] {
        let mut out = [0u8, 0, 0, 255];
        for i in 0..3 {
            out[i] = ((u16::from(a[i]) * wa + u16::from(b[i]) * wb) / div) as u8;
        }
        out
    };
    if four_color {
        [a, b, mix(2, 1, 3), mix(1, 2, 3)]
    } else {
        [a, b, mix(1, 1, 2), [0, 0, 0, 0]]
    }
}

/// Pick endpoints from the brightest and darkest texel of the block.
fn find_endpoint_colors(block: &[[u8; 4]; 16], ignore_transparent: bool) -> (u16, u16) {
    let mut min_lum = u32::MAX;
    let mut max_lum = 0;
    let mut min_pixel = [0u8; 3];
    let mut max_pixel = [0u8; 3];

    for pixel in block {
        if ignore_transparent && pixel[3] < 128 {
            continue;
        }
        let lum = u32::from(pixel[0]) * 2 + u32::from(pixel[1]) * 4 + u32::from(pixel[2]);
        if lum < min_lum {
            min_lum = lum;
            min_pixel = [pixel[0], pixel[1], pixel[2]];
        }
        if lum >= max_lum {
            max_lum = lum;
            max_pixel = [pixel[0], pixel[1], pixel[2]];
        }
    }

    (
        rgb_to_565(max_pixel[0], max_pixel[1], max_pixel[2]),
        rgb_to_565(min_pixel[0], min_pixel[1], min_pixel[2]),
    )
}

fn closest_color(pixel: &[u8; 4], palette: &[[u8; 4]], candidates: usize) -> u32 {
    let mut best = 0u32;
    let mut best_dist = u32::MAX;
    for (i, color) in palette.iter().take(candidates).enumerate() {
        let dist: u32 = (0..3)
            .map(|c| {
                let d = i32::from(pixel[c]) - i32::from(color[c]);
                (d * d) as u32
            })
            .sum();
        if dist < best_dist {
            best_dist = dist;
            best = i as u32;
        }
    }
    best
}

/// Encode a colour block. `allow_transparent` enables DXT1 three-colour mode.
fn encode_color_block(block: &[[u8; 4]; 16], allow_transparent: bool) -> [u8; 8] {
    let transparent = allow_transparent && block.iter().any(|p| p[3] < 128);
    let (hi, lo) = find_endpoint_colors(block, transparent);

    let (c0, c1) = if transparent {
        // Three-colour mode requires c0 <= c1.
        (hi.min(lo), hi.max(lo))
    } else if hi == lo {
        (hi, lo)
    } else {
        (hi.max(lo), hi.min(lo))
    };

    let four_color = !transparent && c0 > c1;
    let palette = color_palette(c0, c1, four_color);
    let candidates = if four_color { 4 } else { 3 };

    let mut indices = 0u32;
    for (i, pixel) in block.iter().enumerate() {
        let index = if transparent && pixel[3] < 128 {
            3
        } else if c0 == c1 {
            0
        } else {
            closest_color(pixel, &palette, candidates)
        };
        indices |= index << (i * 2);
    }

    let mut out = [0u8; 8];
    out[0..2].copy_from_slice(&c0.to_le_bytes());
    out[2..4].copy_from_slice(&c1.to_le_bytes());
    out[4..8].copy_from_slice(&indices.to_le_bytes());
    out
}

fn encode_dxt1_block(block: &[[u8; 4]; 16]) -> [u8; 8] {
    encode_color_block(block, true)
}

/// Explicit 4-bit alpha, as used by DXT2/3 and ATC explicit alpha.
pub(crate) fn encode_explicit_alpha(block: &[[u8; 4]; 16]) -> [u8; 8] {
    let mut out = [0u8; 8];
    for (i, pixel) in block.iter().enumerate() {
        let alpha = ((u32::from(pixel[3]) * 15 + 127) / 255) as u8;
        out[i / 2] |= alpha << ((i % 2) * 4);
    }
    out
}

/// Decode an explicit 4-bit alpha block into the alpha channel of `block`.
pub(crate) fn decode_explicit_alpha(data: &[u8], block: &mut [u8; 64]) {
    for i in 0..16 {
        let nibble = (data[i / 2] >> ((i % 2) * 4)) & 0x0F;
        block[i * 4 + 3] = nibble * 17;
    }
}

/// Interpolated alpha block, as used by DXT4/5 and ATC interpolated alpha.
pub(crate) fn encode_interpolated_alpha(block: &[[u8; 4]; 16]) -> [u8; 8] {
    let (mut min_alpha, mut max_alpha) = (255u8, 0u8);
    for pixel in block {
        min_alpha = min_alpha.min(pixel[3]);
        max_alpha = max_alpha.max(pixel[3]);
    }

    let (a0, a1) = (max_alpha, min_alpha);
    let alphas = alpha_palette(a0, a1);

    let mut indices: u64 = 0;
    for (i, pixel) in block.iter().enumerate() {
        let mut best_index = 0u64;
        let mut best_dist = i32::MAX;
        for (j, &candidate) in alphas.iter().enumerate() {
            let dist = (i32::from(pixel[3]) - i32::from(candidate)).abs();
            if dist < best_dist {
                best_dist = dist;
                best_index = j as u64;
            }
        }
        indices |= best_index << (i * 3);
    }

    let mut out = [0u8; 8];
    out[0] = a0;
    out[1] = a1;
    out[2..8].copy_from_slice(&indices.to_le_bytes()[..6]);
    out
}

fn alpha_palette(a0: u8, a1: u8) -> [u8; 8] {
    let (a0w, a1w) = (u16::from(a0), u16::from(a1));
    if a0 > a1 {
        let mut p = [a0, a1, 0, 0, 0, 0, 0, 0];
        for k in 1..7u16 {
            p[k as usize + 1] = (((7 - k) * a0w + k * a1w) / 7) as u8;
        }
        p
    } else {
        let mut p = [a0, a1, 0, 0, 0, 0, 0, 255];
        for k in 1..5u16 {
            p[k as usize + 1] = (((5 - k) * a0w + k * a1w) / 5) as u8;
        }
        p
    }
}

/// Decode an interpolated alpha block into the alpha channel of `block`.
pub(crate) fn decode_interpolated_alpha(data: &[u8], block: &mut [u8; 64]) {
    let alphas = alpha_palette(data[0], data[1]);
    let mut bits = [0u8; 8];
    bits[..6].copy_from_slice(&data[2..8]);
    let indices = u64::from_le_bytes(bits);
    for i in 0..16 {
        block[i * 4 + 3] = alphas[((indices >> (i * 3)) & 7) as usize];
    }
}
