//! Palette quantization
//!
//! The native runtime is a weighted median cut over the distinct colours of
//! all mipmap levels. The `PngQuant` runtime refines that palette with a few
//! k-means passes, which is slower but noticeably closer on gradients.

#![allow(clippy::cast_possible_truncation)]

use std::collections::HashMap;

use crate::engine::PaletteRuntime;

const REFINE_PASSES: usize = 6;

/// Distinct colours with their occurrence counts.
fn histogram(levels: &[&[u8]]) -> Vec<([u8; 4], u32)> {
    let mut counts: HashMap<[u8; 4], u32> = HashMap::new();
    for level in levels {
        for texel in level.chunks_exact(4) {
            *counts.entry([texel[0], texel[1], texel[2], texel[3]]).or_insert(0) += 1;
        }
    }
    let mut colors: Vec<([u8; 4], u32)> = counts.into_iter().collect();
    // HashMap order is random; keep palettes deterministic.
    colors.sort_unstable_by_key(|(c, _)| u32::from_be_bytes(*c));
    colors
}

struct ColorBox {
    colors: Vec<([u8; 4], u32)>,
}

impl ColorBox {
    fn weight(&self) -> u64 {
        self.colors.iter().map(|(_, n)| u64::from(*n)).sum()
    }

    /// Widest channel and its extent.
    fn widest_channel(&self) -> (usize, u8) {
        let mut best = (0, 0u8);
        for channel in 0..4 {
            let (lo, hi) = self
                .colors
                .iter()
                .fold((255u8, 0u8), |(lo, hi), (c, _)| (lo.min(c[channel]), hi.max(c[channel])));
            let range = hi.saturating_sub(lo);
            if range > best.1 {
                best = (channel, range);
            }
        }
        best
    }

    fn mean(&self) -> [u8; 4] {
        let total = self.weight().max(1);
        let mut sum = [0u64; 4];
        for (c, n) in &self.colors {
            for k in 0..4 {
                sum[k] += u64::from(c[k]) * u64::from(*n);
            }
        }
        sum.map(|v| ((v + total / 2) / total) as u8)
    }

    /// Split at the weighted median of the widest channel.
    fn split(mut self) -> (ColorBox, ColorBox) {
        let (channel, _) = self.widest_channel();
        self.colors.sort_unstable_by_key(|(c, _)| c[channel]);
        let half = self.weight() / 2;
        let mut acc = 0u64;
        let mut cut = 1;
        for (i, (_, n)) in self.colors.iter().enumerate() {
            acc += u64::from(*n);
            if acc >= half {
                cut = (i + 1).clamp(1, self.colors.len() - 1);
                break;
            }
        }
        let upper = self.colors.split_off(cut);
        (self, ColorBox { colors: upper })
    }
}

fn median_cut(colors: Vec<([u8; 4], u32)>, max_colors: usize) -> Vec<[u8; 4]> {
    let mut boxes = vec![ColorBox { colors }];
    while boxes.len() < max_colors {
        let candidate = boxes
            .iter()
            .enumerate()
            .filter(|(_, b)| b.colors.len() > 1)
            .max_by_key(|(_, b)| u64::from(b.widest_channel().1) * b.weight())
            .map(|(i, _)| i);
        let Some(index) = candidate else { break };
        let (a, b) = boxes.swap_remove(index).split();
        boxes.push(a);
        boxes.push(b);
    }
    boxes.iter().map(ColorBox::mean).collect()
}

fn color_distance(a: [u8; 4], b: [u8; 4]) -> u32 {
    (0..4)
        .map(|k| {
            let d = u32::from(a[k].abs_diff(b[k]));
            d * d
        })
        .sum()
}

/// Index of the palette entry closest to `color`.
#[must_use]
pub fn nearest_index(palette: &[[u8; 4]], color: [u8; 4]) -> usize {
    palette
        .iter()
        .enumerate()
        .min_by_key(|(_, p)| color_distance(**p, color))
        .map_or(0, |(i, _)| i)
}

fn refine(palette: &mut [[u8; 4]], colors: &[([u8; 4], u32)]) {
    for _ in 0..REFINE_PASSES {
        let mut sums = vec![[0u64; 5]; palette.len()];
        for (color, n) in colors {
            let slot = &mut sums[nearest_index(palette, *color)];
            for k in 0..4 {
                slot[k] += u64::from(color[k]) * u64::from(*n);
            }
            slot[4] += u64::from(*n);
        }
        let mut moved = false;
        for (entry, sum) in palette.iter_mut().zip(&sums) {
            if sum[4] == 0 {
                continue;
            }
            let next = [0, 1, 2, 3].map(|k| ((sum[k] + sum[4] / 2) / sum[4]) as u8);
            moved |= next != *entry;
            *entry = next;
        }
        if !moved {
            break;
        }
    }
}

/// Build a palette of at most `max_colors` entries for the given RGBA8 levels.
#[must_use]
pub fn quantize(levels: &[&[u8]], max_colors: usize, runtime: PaletteRuntime) -> Vec<[u8; 4]> {
    let colors = histogram(levels);
    if colors.len() <= max_colors {
        return colors.into_iter().map(|(c, _)| c).collect();
    }
    tracing::debug!("quantizing {} colours to {max_colors} ({runtime:?})", colors.len());

    let mut palette = median_cut(colors.clone(), max_colors);
    if runtime == PaletteRuntime::PngQuant {
        refine(&mut palette, &colors);
    }
    palette
}

/// Map every RGBA8 texel to its nearest palette index.
#[must_use]
pub fn map_to_palette(rgba: &[u8], palette: &[[u8; 4]]) -> Vec<u8> {
    let mut cache: HashMap<[u8; 4], u8> = HashMap::new();
    rgba.chunks_exact(4)
        .map(|t| {
            let color = [t[0], t[1], t[2], t[3]];
            *cache
                .entry(color)
                .or_insert_with(|| nearest_index(palette, color) as u8)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn gradient() -> Vec<u8> {
        (0..=255u8).flat_map(|v| [v, 255 - v, v / 2, 255]).collect()
    }

    #[test]
    fn test_few_colors_kept_exactly() {
        let rgba = [[1u8, 2, 3, 255], [9, 9, 9, 0]].repeat(8).concat();
        let palette = quantize(&[&rgba], 16, PaletteRuntime::Native);
        assert_eq!(palette.len(), 2);
        let indices = map_to_palette(&rgba, &palette);
        for (index, texel) in indices.iter().zip(rgba.chunks_exact(4)) {
            assert_eq!(palette[*index as usize], [texel[0], texel[1], texel[2], texel[3]]);
        }
    }

    #[test]
    fn test_palette_size_bounded() {
        let rgba = gradient();
        for runtime in [PaletteRuntime::Native, PaletteRuntime::PngQuant] {
            let palette = quantize(&[&rgba], 16, runtime);
            assert!(palette.len() <= 16);
            let indices = map_to_palette(&rgba, &palette);
            assert!(indices.iter().all(|&i| (i as usize) < palette.len()));
        }
    }

    #[test]
    fn test_refinement_does_not_hurt() {
        let rgba = gradient();
        let error = |palette: &[[u8; 4]]| -> u64 {
            rgba.chunks_exact(4)
                .map(|t| {
                    let c = [t[0], t[1], t[2], t[3]];
                    u64::from(color_distance(palette[nearest_index(palette, c)], c))
                })
                .sum()
        };
        let native = quantize(&[&rgba], 8, PaletteRuntime::Native);
        let refined = quantize(&[&rgba], 8, PaletteRuntime::PngQuant);
        // Centroids are rounded to 8 bits, allow for that.
        assert!(error(&refined) <= error(&native) + error(&native) / 20);
    }
}
