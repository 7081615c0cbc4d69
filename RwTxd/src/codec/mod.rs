//! Block-compression kernels
//!
//! Every kernel takes and produces tightly packed RGBA8. The raster layer
//! calls [`decompress`] and [`compress`] and never looks inside the blocks.

#![allow(clippy::cast_possible_truncation)]

pub mod atc;
pub mod dxt;
pub mod pvrtc;

use rayon::prelude::*;

use crate::engine::DxtRuntime;
use crate::error::{Error, Result};
use crate::raster::Compression;

/// Decode a compressed surface to RGBA8.
///
/// # Errors
/// Returns [`Error::CodecFailure`] if the data is too short or the scheme is unknown.
pub fn decompress(compression: Compression, width: u32, height: u32, data: &[u8]) -> Result<Vec<u8>> {
    if width == 0 || height == 0 {
        return Ok(Vec::new());
    }
    if compression.is_dxt() {
        dxt::decompress(compression, width, height, data)
    } else if compression.is_pvrtc() {
        pvrtc::decompress(compression, width, height, data)
    } else if compression.is_atc() {
        atc::decompress(compression, width, height, data)
    } else {
        Err(Error::codec("surface is not compressed"))
    }
}

/// Encode RGBA8 as a compressed surface.
///
/// # Errors
/// Returns [`Error::CodecFailure`] if the input is too short or the scheme is unknown.
pub fn compress(
    compression: Compression,
    width: u32,
    height: u32,
    rgba: &[u8],
    runtime: DxtRuntime,
) -> Result<Vec<u8>> {
    if width == 0 || height == 0 {
        return Ok(Vec::new());
    }
    tracing::debug!("compressing {width}x{height} surface as {compression} ({runtime:?} runtime)");
    if compression.is_dxt() {
        dxt::compress(compression, width, height, rgba, runtime)
    } else if compression.is_pvrtc() {
        pvrtc::compress(compression, width, height, rgba)
    } else if compression.is_atc() {
        atc::compress(compression, width, height, rgba)
    } else {
        Err(Error::codec("target scheme is not a compression"))
    }
}

/// Extract a 4x4 block of RGBA texels, repeating edge texels past the border.
pub(crate) fn extract_block(pixels: &[u8], width: u32, height: u32, x: usize, y: usize) -> [[u8; 4]; 16] {
    let (width, height) = (width as usize, height as usize);
    let mut block = [[0u8; 4]; 16];

    for py in 0..4 {
        for px in 0..4 {
            let sx = (x + px).min(width - 1);
            let sy = (y + py).min(height - 1);
            let src = (sy * width + sx) * 4;
            block[py * 4 + px].copy_from_slice(&pixels[src..src + 4]);
        }
    }

    block
}

/// Copy a decoded 4x4 block (16-byte pitch) into a surface, clipping at the border.
pub(crate) fn write_block(rgba: &mut [u8], width: u32, height: u32, bx: usize, by: usize, block: &[u8; 64]) {
    let (width, height) = (width as usize, height as usize);
    for py in 0..4 {
        for px in 0..4 {
            let (fx, fy) = (bx * 4 + px, by * 4 + py);
            if fx >= width || fy >= height {
                continue;
            }
            let src = (py * 4 + px) * 4;
            let dst = (fy * width + fx) * 4;
            rgba[dst..dst + 4].copy_from_slice(&block[src..src + 4]);
        }
    }
}

/// Run a 4x4 block encoder over a whole surface, one block row per rayon task.
pub(crate) fn for_each_block_into(
    compression: Compression,
    width: u32,
    height: u32,
    rgba: &[u8],
    encode: fn(&[[u8; 4]; 16], &mut [u8]),
) -> Vec<u8> {
    let block_bytes = compression.block_bytes();
    let blocks_x = width.div_ceil(4) as usize;
    let blocks_y = height.div_ceil(4) as usize;
    let mut output = vec![0u8; blocks_x * blocks_y * block_bytes];

    output
        .par_chunks_mut(blocks_x * block_bytes)
        .enumerate()
        .for_each(|(by, row)| {
            for (bx, out) in row.chunks_exact_mut(block_bytes).enumerate() {
                let block = extract_block(rgba, width, height, bx * 4, by * 4);
                encode(&block, out);
            }
        });

    output
}
