//! Texel encoding and decoding for uncompressed layouts
//!
//! Packed formats are described as channel bit widths. Channels are laid out
//! from the least significant bit (or lowest address) in the order given by
//! the [`ColorOrdering`]: `Rgba` puts red first, `Bgra` blue first and `Abgr`
//! alpha first.

#![allow(clippy::cast_possible_truncation)]

use super::format::{ColorOrdering, PaletteType, PixelLayout, RasterFormat};
use crate::error::{Error, Result};

/// Bit widths of (red, green, blue, alpha).
fn channel_widths(format: RasterFormat) -> [u32; 4] {
    match format {
        RasterFormat::Format1555 => [5, 5, 5, 1],
        RasterFormat::Format565 => [5, 6, 5, 0],
        RasterFormat::Format4444 => [4, 4, 4, 4],
        RasterFormat::Format555 => [5, 5, 5, 0],
        RasterFormat::Format888 => [8, 8, 8, 0],
        RasterFormat::Format8888 | RasterFormat::Default => [8, 8, 8, 8],
        RasterFormat::Lum8 | RasterFormat::LumAlpha => [0, 0, 0, 0],
    }
}

/// Channel indices (into RGBA) in storage order.
const fn channel_order(order: ColorOrdering) -> [usize; 4] {
    match order {
        ColorOrdering::Rgba => [0, 1, 2, 3],
        ColorOrdering::Bgra => [2, 1, 0, 3],
        ColorOrdering::Abgr => [3, 2, 1, 0],
    }
}

/// Scale an `bits`-wide value to 8 bits.
#[inline]
pub(crate) fn expand(value: u32, bits: u32) -> u8 {
    if bits == 0 {
        return 255;
    }
    let max = (1u32 << bits) - 1;
    ((value * 255 + max / 2) / max) as u8
}

/// Scale an 8-bit value to `bits` wide.
#[inline]
pub(crate) fn reduce(value: u8, bits: u32) -> u32 {
    let max = (1u32 << bits) - 1;
    (u32::from(value) * max + 127) / 255
}

/// Rec. 601 luminance.
#[inline]
pub(crate) fn luminance(rgba: [u8; 4]) -> u8 {
    let l = 299 * u32::from(rgba[0]) + 587 * u32::from(rgba[1]) + 114 * u32::from(rgba[2]);
    ((l + 500) / 1000) as u8
}

fn bytes_per_texel(layout: &PixelLayout) -> Result<usize> {
    if layout.depth % 8 != 0 || layout.depth == 0 {
        return Err(Error::unsupported(format!(
            "{}-bit texels are not byte aligned",
            layout.depth
        )));
    }
    Ok(layout.depth as usize / 8)
}

fn read_le(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .rev()
        .fold(0u32, |acc, &b| (acc << 8) | u32::from(b))
}

fn write_le(value: u32, out: &mut [u8]) {
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = (value >> (8 * i)) as u8;
    }
}

/// Decode one texel of an uncompressed, unpalettized layout.
#[must_use]
pub fn decode_texel(layout: &PixelLayout, src: &[u8]) -> [u8; 4] {
    match layout.raster_format {
        RasterFormat::Lum8 => {
            let l = src[0];
            [l, l, l, 255]
        }
        RasterFormat::LumAlpha => [src[0], src[0], src[0], src.get(1).copied().unwrap_or(255)],
        format => {
            let widths = channel_widths(format);
            let order = channel_order(layout.color_order);
            let word = read_le(src);
            let mut rgba = [0u8, 0, 0, 255];
            let mut shift = 0;
            for &channel in &order {
                let bits = widths[channel];
                if bits == 0 {
                    continue;
                }
                let value = (word >> shift) & ((1u32 << bits) - 1);
                rgba[channel] = expand(value, bits);
                shift += bits;
            }
            rgba
        }
    }
}

/// Encode one texel of an uncompressed, unpalettized layout.
pub fn encode_texel(layout: &PixelLayout, rgba: [u8; 4], dst: &mut [u8]) {
    match layout.raster_format {
        RasterFormat::Lum8 => dst[0] = luminance(rgba),
        RasterFormat::LumAlpha => {
            dst[0] = luminance(rgba);
            if let Some(alpha) = dst.get_mut(1) {
                *alpha = rgba[3];
            }
        }
        format => {
            let widths = channel_widths(format);
            let order = channel_order(layout.color_order);
            let mut word = 0u32;
            let mut shift = 0;
            for &channel in &order {
                let bits = widths[channel];
                if bits == 0 {
                    continue;
                }
                word |= reduce(rgba[channel], bits) << shift;
                shift += bits;
            }
            // Unused high bits (X8R8G8B8, X1R5G5B5) are written as ones.
            let total = dst.len() as u32 * 8;
            if shift < total {
                word |= (u32::MAX >> (32 - (total - shift))) << shift;
            }
            write_le(word, dst);
        }
    }
}

/// Bytes of one tightly packed row.
#[must_use]
pub fn row_size(width: u32, depth: u32) -> usize {
    (width as usize * depth as usize).div_ceil(8)
}

/// Bytes of one row padded to `alignment`.
#[must_use]
pub fn aligned_row_size(width: u32, depth: u32, alignment: usize) -> usize {
    row_size(width, depth).div_ceil(alignment) * alignment
}

/// Copy rows between different row alignments.
#[must_use]
pub fn realign_rows(
    data: &[u8],
    width: u32,
    height: u32,
    depth: u32,
    from_alignment: usize,
    to_alignment: usize,
) -> Vec<u8> {
    let src_pitch = aligned_row_size(width, depth, from_alignment);
    let dst_pitch = aligned_row_size(width, depth, to_alignment);
    if src_pitch == dst_pitch {
        return data.to_vec();
    }
    let row = row_size(width, depth);
    let mut out = vec![0u8; dst_pitch * height as usize];
    for y in 0..height as usize {
        let src = &data[y * src_pitch..y * src_pitch + row];
        out[y * dst_pitch..y * dst_pitch + row].copy_from_slice(src);
    }
    out
}

fn check_len(data: &[u8], expected: usize, what: &str) -> Result<()> {
    if data.len() < expected {
        return Err(Error::codec(format!(
            "{what}: expected {expected} bytes, have {}",
            data.len()
        )));
    }
    Ok(())
}

/// Decode a tightly packed unpalettized surface to RGBA8.
///
/// # Errors
/// Returns [`Error::CodecFailure`] if `data` is too short.
pub fn decode_surface(layout: &PixelLayout, width: u32, height: u32, data: &[u8]) -> Result<Vec<u8>> {
    let bpp = bytes_per_texel(layout)?;
    let count = width as usize * height as usize;
    check_len(data, count * bpp, "texel data")?;

    let mut rgba = vec![0u8; count * 4];
    for (texel, out) in data.chunks_exact(bpp).zip(rgba.chunks_exact_mut(4)) {
        out.copy_from_slice(&decode_texel(layout, texel));
    }
    Ok(rgba)
}

/// Encode RGBA8 into a tightly packed unpalettized surface.
///
/// # Errors
/// Returns [`Error::CodecFailure`] if `rgba` is too short.
pub fn encode_surface(layout: &PixelLayout, width: u32, height: u32, rgba: &[u8]) -> Result<Vec<u8>> {
    let bpp = bytes_per_texel(layout)?;
    let count = width as usize * height as usize;
    check_len(rgba, count * 4, "RGBA data")?;

    let mut out = vec![0u8; count * bpp];
    for (src, texel) in rgba.chunks_exact(4).zip(out.chunks_exact_mut(bpp)) {
        encode_texel(layout, [src[0], src[1], src[2], src[3]], texel);
    }
    Ok(out)
}

/// Unpack palette indices of a tightly packed surface into one byte per texel.
///
/// # Errors
/// Returns [`Error::CodecFailure`] if `data` is too short or the raster is not palettized.
pub fn unpack_indices(palette_type: PaletteType, width: u32, height: u32, data: &[u8]) -> Result<Vec<u8>> {
    let depth = palette_type
        .index_depth()
        .ok_or_else(|| Error::codec("raster has no palette"))?;
    let pitch = row_size(width, depth);
    check_len(data, pitch * height as usize, "palette indices")?;

    let mut indices = Vec::with_capacity(width as usize * height as usize);
    for y in 0..height as usize {
        let row = &data[y * pitch..(y + 1) * pitch];
        for x in 0..width as usize {
            let index = match palette_type {
                PaletteType::Pal8 => row[x],
                PaletteType::Pal4 => {
                    let byte = row[x / 2];
                    if x % 2 == 0 { byte >> 4 } else { byte & 0x0F }
                }
                PaletteType::Pal4Lsb => {
                    let byte = row[x / 2];
                    if x % 2 == 0 { byte & 0x0F } else { byte >> 4 }
                }
                PaletteType::None => 0,
            };
            indices.push(index);
        }
    }
    Ok(indices)
}

/// Pack one-byte-per-texel indices into a tightly packed surface.
#[must_use]
pub fn pack_indices(palette_type: PaletteType, width: u32, height: u32, indices: &[u8]) -> Vec<u8> {
    let depth = palette_type.index_depth().unwrap_or(8);
    let pitch = row_size(width, depth);
    let mut out = vec![0u8; pitch * height as usize];
    for y in 0..height as usize {
        for x in 0..width as usize {
            let index = indices[y * width as usize + x];
            let row = &mut out[y * pitch..(y + 1) * pitch];
            match palette_type {
                PaletteType::Pal4 => {
                    let nibble = index & 0x0F;
                    row[x / 2] |= if x % 2 == 0 { nibble << 4 } else { nibble };
                }
                PaletteType::Pal4Lsb => {
                    let nibble = index & 0x0F;
                    row[x / 2] |= if x % 2 == 0 { nibble } else { nibble << 4 };
                }
                PaletteType::Pal8 | PaletteType::None => row[x] = index,
            }
        }
    }
    out
}

/// Encode palette entries in the entry format of `layout`.
#[must_use]
pub fn encode_palette(layout: &PixelLayout, palette: &[[u8; 4]], entries: usize) -> Vec<u8> {
    let entry_layout = PixelLayout::raw(layout.raster_format, layout.color_order);
    let size = entry_layout.depth as usize / 8;
    let mut out = vec![0u8; entries * size];
    for (color, slot) in palette.iter().zip(out.chunks_exact_mut(size)) {
        encode_texel(&entry_layout, *color, slot);
    }
    out
}

/// Decode palette entries stored in the entry format of `layout`.
#[must_use]
pub fn decode_palette(layout: &PixelLayout, data: &[u8], entries: usize) -> Vec<[u8; 4]> {
    let entry_layout = PixelLayout::raw(layout.raster_format, layout.color_order);
    let size = (entry_layout.depth as usize / 8).max(1);
    data.chunks_exact(size)
        .take(entries)
        .map(|entry| decode_texel(&entry_layout, entry))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_bgra8888_byte_order() {
        let layout = PixelLayout::raw(RasterFormat::Format8888, ColorOrdering::Bgra);
        let mut out = [0u8; 4];
        encode_texel(&layout, [1, 2, 3, 4], &mut out);
        assert_eq!(out, [3, 2, 1, 4]);
        assert_eq!(decode_texel(&layout, &out), [1, 2, 3, 4]);
    }

    #[test]
    fn test_565_extremes() {
        let layout = PixelLayout::raw(RasterFormat::Format565, ColorOrdering::Bgra);
        let mut out = [0u8; 2];
        encode_texel(&layout, [255, 0, 0, 255], &mut out);
        assert_eq!(u16::from_le_bytes(out), 0xF800);
        assert_eq!(decode_texel(&layout, &out), [255, 0, 0, 255]);
    }

    #[test]
    fn test_1555_alpha_bit() {
        let layout = PixelLayout::raw(RasterFormat::Format1555, ColorOrdering::Bgra);
        let mut out = [0u8; 2];
        encode_texel(&layout, [0, 0, 0, 0], &mut out);
        assert_eq!(u16::from_le_bytes(out), 0x0000);
        encode_texel(&layout, [0, 0, 0, 255], &mut out);
        assert_eq!(u16::from_le_bytes(out), 0x8000);
    }

    #[test]
    fn test_888_pads_with_ones() {
        let layout = PixelLayout {
            depth: 32,
            ..PixelLayout::raw(RasterFormat::Format888, ColorOrdering::Bgra)
        };
        let mut out = [0u8; 4];
        encode_texel(&layout, [10, 20, 30, 0], &mut out);
        assert_eq!(out, [30, 20, 10, 255]);
        assert_eq!(decode_texel(&layout, &out), [10, 20, 30, 255]);
    }

    #[test]
    fn test_pal4_nibble_orders() {
        let indices = [1u8, 2, 3, 4];
        let msb = pack_indices(PaletteType::Pal4, 4, 1, &indices);
        let lsb = pack_indices(PaletteType::Pal4Lsb, 4, 1, &indices);
        assert_eq!(msb, vec![0x12, 0x34]);
        assert_eq!(lsb, vec![0x21, 0x43]);
        assert_eq!(unpack_indices(PaletteType::Pal4, 4, 1, &msb).unwrap(), indices);
        assert_eq!(unpack_indices(PaletteType::Pal4Lsb, 4, 1, &lsb).unwrap(), indices);
    }

    #[test]
    fn test_realign_rows() {
        let tight = vec![1u8, 2, 3, 4, 5, 6];
        let aligned = realign_rows(&tight, 3, 2, 8, 1, 4);
        assert_eq!(aligned, vec![1, 2, 3, 0, 4, 5, 6, 0]);
        assert_eq!(realign_rows(&aligned, 3, 2, 8, 4, 1), tight);
    }
}
