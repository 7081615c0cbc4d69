//! Mipmap chain generation

#![allow(clippy::cast_possible_truncation)]

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{Error, Result};

/// How four source texels collapse into one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum MipmapGenMode {
    /// Box filter.
    #[default]
    Default,
    /// The sample furthest from the box average.
    Contrast,
    /// Per-channel maximum.
    Brighten,
    /// Per-channel minimum.
    Darken,
    /// The sample closest to the box average.
    SelectClose,
}

impl FromStr for MipmapGenMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(Self::Default),
            "contrast" => Ok(Self::Contrast),
            "brighten" => Ok(Self::Brighten),
            "darken" => Ok(Self::Darken),
            "selectclose" | "select_close" => Ok(Self::SelectClose),
            other => Err(Error::InvalidConfiguration {
                key: "mipGenMode".to_string(),
                message: format!("unknown mipmap generation mode '{other}'"),
            }),
        }
    }
}

impl fmt::Display for MipmapGenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Default => "default",
            Self::Contrast => "contrast",
            Self::Brighten => "brighten",
            Self::Darken => "darken",
            Self::SelectClose => "selectclose",
        })
    }
}

/// Dimensions of the level below `width` x `height`, halved with floor.
#[must_use]
pub const fn next_level_dimensions(width: u32, height: u32) -> (u32, u32) {
    let w = width / 2;
    let h = height / 2;
    (if w == 0 { 1 } else { w }, if h == 0 { 1 } else { h })
}

/// Length of a full chain down to 1x1.
#[must_use]
pub fn full_chain_length(width: u32, height: u32) -> usize {
    let largest = width.max(height).max(1);
    1 + largest.ilog2() as usize
}

fn distance(a: [u8; 4], b: [u32; 4]) -> u32 {
    (0..4)
        .map(|c| {
            let d = u32::from(a[c]).abs_diff(b[c]);
            d * d
        })
        .sum()
}

fn collapse(samples: &[[u8; 4]], mode: MipmapGenMode) -> [u8; 4] {
    let count = samples.len() as u32;
    let mut sum = [0u32; 4];
    for s in samples {
        for c in 0..4 {
            sum[c] += u32::from(s[c]);
        }
    }
    let average = sum.map(|v| (v + count / 2) / count);

    match mode {
        MipmapGenMode::Default => average.map(|v| v as u8),
        MipmapGenMode::Brighten => {
            let mut out = [0u8; 4];
            for s in samples {
                for c in 0..4 {
                    out[c] = out[c].max(s[c]);
                }
            }
            out
        }
        MipmapGenMode::Darken => {
            let mut out = [255u8; 4];
            for s in samples {
                for c in 0..4 {
                    out[c] = out[c].min(s[c]);
                }
            }
            out
        }
        MipmapGenMode::Contrast => samples
            .iter()
            .copied()
            .max_by_key(|s| distance(*s, average))
            .unwrap_or([0; 4]),
        MipmapGenMode::SelectClose => samples
            .iter()
            .copied()
            .min_by_key(|s| distance(*s, average))
            .unwrap_or([0; 4]),
    }
}

/// Produce the next level of an RGBA8 surface.
#[must_use]
pub fn downsample(rgba: &[u8], width: u32, height: u32, mode: MipmapGenMode) -> (u32, u32, Vec<u8>) {
    let (nw, nh) = next_level_dimensions(width, height);
    let (w, h) = (width as usize, height as usize);
    let mut out = Vec::with_capacity(nw as usize * nh as usize * 4);
    let mut samples = Vec::with_capacity(4);

    for y in 0..nh as usize {
        for x in 0..nw as usize {
            samples.clear();
            for (sx, sy) in [(x * 2, y * 2), (x * 2 + 1, y * 2), (x * 2, y * 2 + 1), (x * 2 + 1, y * 2 + 1)] {
                if sx < w && sy < h {
                    let offset = (sy * w + sx) * 4;
                    samples.push([rgba[offset], rgba[offset + 1], rgba[offset + 2], rgba[offset + 3]]);
                }
            }
            out.extend_from_slice(&collapse(&samples, mode));
        }
    }
    (nw, nh, out)
}

/// Generate up to `max_levels` levels (base included) from an RGBA8 base.
///
/// Generation stops early once both dimensions reach 1.
#[must_use]
pub fn generate_chain(
    base: &[u8],
    width: u32,
    height: u32,
    max_levels: usize,
    mode: MipmapGenMode,
) -> Vec<(u32, u32, Vec<u8>)> {
    let mut chain = vec![(width, height, base.to_vec())];
    while chain.len() < max_levels {
        let (w, h, data) = &chain[chain.len() - 1];
        if *w == 1 && *h == 1 {
            break;
        }
        let next = downsample(data, *w, *h, mode);
        chain.push(next);
    }
    chain
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_chain_length_law() {
        assert_eq!(full_chain_length(64, 64), 7);
        assert_eq!(full_chain_length(64, 16), 7);
        assert_eq!(full_chain_length(1, 1), 1);
        assert_eq!(full_chain_length(100, 3), 7);

        let base = vec![128u8; 64 * 64 * 4];
        let chain = generate_chain(&base, 64, 64, 4, MipmapGenMode::Default);
        let dims: Vec<(u32, u32)> = chain.iter().map(|(w, h, _)| (*w, *h)).collect();
        assert_eq!(dims, vec![(64, 64), (32, 32), (16, 16), (8, 8)]);

        let chain = generate_chain(&base, 64, 64, 100, MipmapGenMode::Default);
        assert_eq!(chain.len(), 7);
    }

    #[test]
    fn test_odd_sizes_halve_with_floor() {
        assert_eq!(next_level_dimensions(5, 3), (2, 1));
        assert_eq!(next_level_dimensions(1, 7), (1, 3));

        let base = vec![0u8; 100 * 3 * 4];
        let chain = generate_chain(&base, 100, 3, 100, MipmapGenMode::Default);
        let widths: Vec<u32> = chain.iter().map(|(w, _, _)| *w).collect();
        assert_eq!(widths, vec![100, 50, 25, 12, 6, 3, 1]);
        assert_eq!(chain.len(), full_chain_length(100, 3));
    }

    #[test]
    fn test_non_square_reaches_one() {
        let base = vec![0u8; 8 * 2 * 4];
        let chain = generate_chain(&base, 8, 2, 10, MipmapGenMode::Default);
        let dims: Vec<(u32, u32)> = chain.iter().map(|(w, h, _)| (*w, *h)).collect();
        assert_eq!(dims, vec![(8, 2), (4, 1), (2, 1), (1, 1)]);
    }

    #[test]
    fn test_modes() {
        // 2x2 surface: black, white, grey, grey.
        let rgba = [
            0, 0, 0, 255, 255, 255, 255, 255, //
            100, 100, 100, 255, 100, 100, 100, 255,
        ];
        let pick = |mode| downsample(&rgba, 2, 2, mode).2;
        assert_eq!(pick(MipmapGenMode::Default), vec![114, 114, 114, 255]);
        assert_eq!(pick(MipmapGenMode::Brighten), vec![255, 255, 255, 255]);
        assert_eq!(pick(MipmapGenMode::Darken), vec![0, 0, 0, 255]);
        assert_eq!(pick(MipmapGenMode::Contrast), vec![255, 255, 255, 255]);
        assert_eq!(pick(MipmapGenMode::SelectClose), vec![100, 100, 100, 255]);
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("SelectClose".parse::<MipmapGenMode>().unwrap(), MipmapGenMode::SelectClose);
        assert!("blur".parse::<MipmapGenMode>().is_err());
    }
}
