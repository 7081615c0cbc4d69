//! PVRTC 2bpp / 4bpp compression
//!
//! Blocks are stored in Morton order. Each 64-bit block holds modulation
//! data (first dword) and two low-resolution endpoint colours (second dword).
//! A texel's endpoints are bilinearly interpolated from the four nearest
//! blocks, which is why surfaces need at least 2x2 blocks.

#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_possible_wrap)]

use crate::error::{Error, Result};
use crate::raster::Compression;
use crate::raster::pixel::{expand, reduce};

/// Modulation weights in eighths.
const WEIGHTS: [u32; 4] = [0, 3, 5, 8];

struct Geometry {
    block_w: u32,
    block_h: u32,
    blocks_x: u32,
    blocks_y: u32,
    two_bpp: bool,
}

impl Geometry {
    fn new(compression: Compression, width: u32, height: u32) -> Result<Self> {
        if !width.is_power_of_two() || !height.is_power_of_two() {
            return Err(Error::codec(format!(
                "PVRTC needs power-of-two dimensions, got {width}x{height}"
            )));
        }
        let two_bpp = matches!(compression, Compression::Pvrtc2Rgb | Compression::Pvrtc2Rgba);
        let (block_w, block_h) = compression.block_dimensions();
        Ok(Self {
            block_w,
            block_h,
            blocks_x: width.div_ceil(block_w).max(2),
            blocks_y: height.div_ceil(block_h).max(2),
            two_bpp,
        })
    }

    fn block_count(&self) -> usize {
        self.blocks_x as usize * self.blocks_y as usize
    }

    /// Morton index of a block; the larger dimension's excess bits go on top.
    fn twiddle(&self, bx: u32, by: u32) -> usize {
        let min_dim = self.blocks_x.min(self.blocks_y);
        let mut twiddled = 0u32;
        let mut src_bit = 1u32;
        let mut dst_bit = 1u32;
        let mut shift = 0u32;
        while src_bit < min_dim {
            if by & src_bit != 0 {
                twiddled |= dst_bit;
            }
            if bx & src_bit != 0 {
                twiddled |= dst_bit << 1;
            }
            src_bit <<= 1;
            dst_bit <<= 2;
            shift += 1;
        }
        let rest = if self.blocks_x > self.blocks_y { bx } else { by } >> shift;
        (twiddled | (rest << (2 * shift))) as usize
    }

    /// Blocks and weights (in `block_w * block_h` units) contributing to texel (x, y).
    fn neighbours(&self, x: u32, y: u32) -> [(u32, u32, u32); 4] {
        let gx = x as i32 - (self.block_w / 2) as i32;
        let gy = y as i32 - (self.block_h / 2) as i32;
        let bx0 = gx.div_euclid(self.block_w as i32).rem_euclid(self.blocks_x as i32) as u32;
        let by0 = gy.div_euclid(self.block_h as i32).rem_euclid(self.blocks_y as i32) as u32;
        let fx = gx.rem_euclid(self.block_w as i32) as u32;
        let fy = gy.rem_euclid(self.block_h as i32) as u32;
        let bx1 = (bx0 + 1) % self.blocks_x;
        let by1 = (by0 + 1) % self.blocks_y;
        let (wx0, wx1) = (self.block_w - fx, fx);
        let (wy0, wy1) = (self.block_h - fy, fy);
        [
            (bx0, by0, wx0 * wy0),
            (bx1, by0, wx1 * wy0),
            (bx0, by1, wx0 * wy1),
            (bx1, by1, wx1 * wy1),
        ]
    }
}

#[derive(Clone, Copy, Default)]
struct Endpoints {
    a: [u8; 4],
    b: [u8; 4],
}

fn decode_color_a(bits: u32) -> [u8; 4] {
    let value = (bits >> 1) & 0x3FFF;
    if bits & 0x8000 != 0 {
        [
            expand((value >> 9) & 0x1F, 5),
            expand((value >> 4) & 0x1F, 5),
            expand(value & 0xF, 4),
            255,
        ]
    } else {
        [
            expand((value >> 7) & 0xF, 4),
            expand((value >> 3) & 0xF, 4),
            expand(value & 0x7, 3),
            expand((value >> 11) & 0x7, 3),
        ]
    }
}

fn decode_color_b(bits: u32) -> [u8; 4] {
    let value = (bits >> 16) & 0x7FFF;
    if bits & 0x8000_0000 != 0 {
        [
            expand((value >> 10) & 0x1F, 5),
            expand((value >> 5) & 0x1F, 5),
            expand(value & 0x1F, 5),
            255,
        ]
    } else {
        [
            expand((value >> 8) & 0xF, 4),
            expand((value >> 4) & 0xF, 4),
            expand(value & 0xF, 4),
            expand((value >> 12) & 0x7, 3),
        ]
    }
}

fn encode_color_a(color: [u8; 4]) -> u32 {
    if color[3] == 255 {
        let value = (reduce(color[0], 5) << 9) | (reduce(color[1], 5) << 4) | reduce(color[2], 4);
        (value << 1) | 0x8000
    } else {
        let value = (reduce(color[3], 3) << 11)
            | (reduce(color[0], 4) << 7)
            | (reduce(color[1], 4) << 3)
            | reduce(color[2], 3);
        value << 1
    }
}

fn encode_color_b(color: [u8; 4]) -> u32 {
    if color[3] == 255 {
        let value = (reduce(color[0], 5) << 10) | (reduce(color[1], 5) << 5) | reduce(color[2], 5);
        (value << 16) | 0x8000_0000
    } else {
        let value = (reduce(color[3], 3) << 12)
            | (reduce(color[0], 4) << 8)
            | (reduce(color[1], 4) << 4)
            | reduce(color[2], 4);
        value << 16
    }
}

fn interpolate(geometry: &Geometry, endpoints: &[Endpoints], x: u32, y: u32) -> Endpoints {
    let total = geometry.block_w * geometry.block_h;
    let mut a = [0u32; 4];
    let mut b = [0u32; 4];
    for (bx, by, weight) in geometry.neighbours(x, y) {
        let e = endpoints[geometry.twiddle(bx, by)];
        for c in 0..4 {
            a[c] += u32::from(e.a[c]) * weight;
            b[c] += u32::from(e.b[c]) * weight;
        }
    }
    let finish = |v: [u32; 4]| v.map(|c| ((c + total / 2) / total) as u8);
    Endpoints {
        a: finish(a),
        b: finish(b),
    }
}

fn modulate(e: &Endpoints, weight: u32, punch_through: bool) -> [u8; 4] {
    let mut out = [0u8; 4];
    for c in 0..4 {
        let (a, b) = (u32::from(e.a[c]), u32::from(e.b[c]));
        out[c] = ((a * (8 - weight) + b * weight + 4) / 8) as u8;
    }
    if punch_through {
        out[3] = 0;
    }
    out
}

/// Modulation value (0..=3) and punch-through flag for texel (px, py) of a block.
fn texel_modulation(geometry: &Geometry, modulation: u32, mode: bool, px: u32, py: u32) -> (u32, bool) {
    if geometry.two_bpp {
        if !mode {
            let bit = (modulation >> (py * 8 + px)) & 1;
            return (if bit == 1 { 3 } else { 0 }, false);
        }
        // Checkerboard: stored texels carry two bits, the rest average their neighbours.
        let stored = |x: u32, y: u32| -> u32 {
            let slot = (y * 8 + x) / 2;
            (modulation >> (slot * 2)) & 3
        };
        if (px + py) % 2 == 0 {
            return (stored(px, py), false);
        }
        let mut sum = 0;
        let mut count = 0;
        for (dx, dy) in [(-1i32, 0i32), (1, 0), (0, -1), (0, 1)] {
            let (nx, ny) = (px as i32 + dx, py as i32 + dy);
            if (0..8).contains(&nx) && (0..4).contains(&ny) {
                sum += WEIGHTS[stored(nx as u32, ny as u32) as usize];
                count += 1;
            }
        }
        let average = sum / count.max(1);
        let nearest = (0..4).min_by_key(|&i| WEIGHTS[i].abs_diff(average)).unwrap_or(0);
        return (nearest as u32, false);
    }

    let value = (modulation >> ((py * 4 + px) * 2)) & 3;
    if mode {
        // Punch-through: 1 and 2 both mean half, 2 is transparent.
        match value {
            1 => (4, false),
            2 => (4, true),
            other => (other, false),
        }
    } else {
        (value, false)
    }
}

/// Decode a PVRTC surface to RGBA8.
///
/// # Errors
/// Returns [`Error::CodecFailure`] for non power-of-two sizes or short data.
pub fn decompress(compression: Compression, width: u32, height: u32, data: &[u8]) -> Result<Vec<u8>> {
    let geometry = Geometry::new(compression, width, height)?;
    let expected = geometry.block_count() * 8;
    if data.len() < expected {
        return Err(Error::codec(format!(
            "{compression} surface {width}x{height} needs {expected} bytes, have {}",
            data.len()
        )));
    }

    let words: Vec<(u32, u32)> = data[..expected]
        .chunks_exact(8)
        .map(|b| {
            (
                u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
                u32::from_le_bytes([b[4], b[5], b[6], b[7]]),
            )
        })
        .collect();
    let endpoints: Vec<Endpoints> = words
        .iter()
        .map(|&(_, color)| Endpoints {
            a: decode_color_a(color),
            b: decode_color_b(color),
        })
        .collect();

    let mut rgba = vec![0u8; width as usize * height as usize * 4];
    for y in 0..height {
        for x in 0..width {
            let (bx, by) = (x / geometry.block_w, y / geometry.block_h);
            let (modulation, color) = words[geometry.twiddle(bx, by)];
            let (value, punch) = texel_modulation(
                &geometry,
                modulation,
                color & 1 != 0,
                x % geometry.block_w,
                y % geometry.block_h,
            );
            let weight = if value == 4 { 4 } else { WEIGHTS[value as usize] };
            let e = interpolate(&geometry, &endpoints, x, y);
            let texel = modulate(&e, weight, punch);
            let offset = (y as usize * width as usize + x as usize) * 4;
            rgba[offset..offset + 4].copy_from_slice(&texel);
        }
    }
    Ok(rgba)
}

/// Encode RGBA8 as a PVRTC surface.
///
/// Endpoints are the darkest and brightest texel of each block; modulation is
/// chosen against the interpolated endpoints the decoder will see.
///
/// # Errors
/// Returns [`Error::CodecFailure`] for non power-of-two sizes or short input.
pub fn compress(compression: Compression, width: u32, height: u32, rgba: &[u8]) -> Result<Vec<u8>> {
    let geometry = Geometry::new(compression, width, height)?;
    if rgba.len() < width as usize * height as usize * 4 {
        return Err(Error::codec("RGBA data shorter than surface"));
    }
    let opaque_only = matches!(compression, Compression::Pvrtc2Rgb | Compression::Pvrtc4Rgb);

    let texel = |x: u32, y: u32| -> [u8; 4] {
        let (x, y) = (x.min(width - 1), y.min(height - 1));
        let offset = (y as usize * width as usize + x as usize) * 4;
        let mut t = [rgba[offset], rgba[offset + 1], rgba[offset + 2], rgba[offset + 3]];
        if opaque_only {
            t[3] = 255;
        }
        t
    };
    let lum = |t: &[u8; 4]| u32::from(t[0]) * 2 + u32::from(t[1]) * 4 + u32::from(t[2]) + u32::from(t[3]);

    let mut colors = vec![0u32; geometry.block_count()];
    let mut endpoints = vec![Endpoints::default(); geometry.block_count()];
    for by in 0..geometry.blocks_y {
        for bx in 0..geometry.blocks_x {
            let mut darkest = [255u8; 4];
            let mut brightest = [0u8; 4];
            let (mut lo, mut hi) = (u32::MAX, 0u32);
            for py in 0..geometry.block_h {
                for px in 0..geometry.block_w {
                    let t = texel(bx * geometry.block_w + px, by * geometry.block_h + py);
                    let l = lum(&t);
                    if l < lo {
                        lo = l;
                        darkest = t;
                    }
                    if l >= hi {
                        hi = l;
                        brightest = t;
                    }
                }
            }
            let word = encode_color_a(darkest) | encode_color_b(brightest);
            let index = geometry.twiddle(bx, by);
            colors[index] = word;
            endpoints[index] = Endpoints {
                a: decode_color_a(word),
                b: decode_color_b(word),
            };
        }
    }

    let mut out = vec![0u8; geometry.block_count() * 8];
    for by in 0..geometry.blocks_y {
        for bx in 0..geometry.blocks_x {
            let mut modulation = 0u32;
            for py in 0..geometry.block_h {
                for px in 0..geometry.block_w {
                    let (x, y) = (bx * geometry.block_w + px, by * geometry.block_h + py);
                    let target = texel(x, y);
                    let e = interpolate(&geometry, &endpoints, x % (geometry.blocks_x * geometry.block_w), y % (geometry.blocks_y * geometry.block_h));
                    let error = |weight: u32| -> u32 {
                        let c = modulate(&e, weight, false);
                        (0..4)
                            .map(|k| u32::from(c[k].abs_diff(target[k])).pow(2))
                            .sum()
                    };
                    if geometry.two_bpp {
                        let bit = u32::from(error(8) < error(0));
                        modulation |= bit << (py * 8 + px);
                    } else {
                        let best = (0..4u32).min_by_key(|&i| error(WEIGHTS[i as usize])).unwrap_or(0);
                        modulation |= best << ((py * 4 + px) * 2);
                    }
                }
            }
            let index = geometry.twiddle(bx, by);
            out[index * 8..index * 8 + 4].copy_from_slice(&modulation.to_le_bytes());
            out[index * 8 + 4..index * 8 + 8].copy_from_slice(&colors[index].to_le_bytes());
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_twiddle_square() {
        let g = Geometry::new(Compression::Pvrtc4Rgb, 16, 16).unwrap();
        assert_eq!(g.twiddle(0, 0), 0);
        assert_eq!(g.twiddle(0, 1), 1);
        assert_eq!(g.twiddle(1, 0), 2);
        assert_eq!(g.twiddle(1, 1), 3);
        assert_eq!(g.twiddle(2, 0), 8);
    }

    #[test]
    fn test_solid_color_round_trip() {
        let rgba = [248u8, 128, 64, 255].repeat(64);
        for compression in [Compression::Pvrtc4Rgb, Compression::Pvrtc2Rgba] {
            let packed = compress(compression, 8, 8, &rgba).unwrap();
            assert_eq!(packed.len(), compression.surface_size(8, 8));
            let decoded = decompress(compression, 8, 8, &packed).unwrap();
            for texel in decoded.chunks_exact(4) {
                assert!(texel[0].abs_diff(248) <= 8, "{texel:?}");
                assert!(texel[1].abs_diff(128) <= 8, "{texel:?}");
                assert!(texel[2].abs_diff(64) <= 17, "{texel:?}");
            }
        }
    }

    #[test]
    fn test_rejects_non_power_of_two() {
        assert!(compress(Compression::Pvrtc4Rgba, 12, 8, &[0; 12 * 8 * 4]).is_err());
    }
}
