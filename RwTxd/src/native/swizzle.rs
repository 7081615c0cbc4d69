//! Texel and palette reordering used by console platforms

/// Offset of texel (x, y) in a Morton-swizzled power-of-two surface.
///
/// Bits of `x` and `y` are interleaved, `x` first, until the smaller
/// dimension runs out; the remaining bits of the larger one follow.
#[must_use]
pub fn morton_offset(mut x: u32, mut y: u32, width: u32, height: u32) -> usize {
    let (mut w, mut h) = (width, height);
    let mut offset = 0usize;
    let mut shift = 0;
    while w > 1 || h > 1 {
        if w > 1 {
            offset |= ((x & 1) as usize) << shift;
            x >>= 1;
            w >>= 1;
            shift += 1;
        }
        if h > 1 {
            offset |= ((y & 1) as usize) << shift;
            y >>= 1;
            h >>= 1;
            shift += 1;
        }
    }
    offset
}

/// Reorder a linear surface of `texel_size`-byte texels into Morton order.
#[must_use]
pub fn swizzle(linear: &[u8], width: u32, height: u32, texel_size: usize) -> Vec<u8> {
    let mut out = vec![0u8; linear.len()];
    for y in 0..height {
        for x in 0..width {
            let src = (y as usize * width as usize + x as usize) * texel_size;
            let dst = morton_offset(x, y, width, height) * texel_size;
            if src + texel_size <= linear.len() && dst + texel_size <= out.len() {
                out[dst..dst + texel_size].copy_from_slice(&linear[src..src + texel_size]);
            }
        }
    }
    out
}

/// Inverse of [`swizzle`].
#[must_use]
pub fn unswizzle(swizzled: &[u8], width: u32, height: u32, texel_size: usize) -> Vec<u8> {
    let mut out = vec![0u8; swizzled.len()];
    for y in 0..height {
        for x in 0..width {
            let dst = (y as usize * width as usize + x as usize) * texel_size;
            let src = morton_offset(x, y, width, height) * texel_size;
            if src + texel_size <= swizzled.len() && dst + texel_size <= out.len() {
                out[dst..dst + texel_size].copy_from_slice(&swizzled[src..src + texel_size]);
            }
        }
    }
    out
}

/// CSM1 position of palette entry `index`: bits 3 and 4 trade places.
#[must_use]
pub const fn csm1_index(index: usize) -> usize {
    (index & !0x18) | ((index & 0x08) << 1) | ((index & 0x10) >> 1)
}

/// Reorder a 256-entry CLUT between linear and CSM1 order (self-inverse).
#[must_use]
pub fn csm1_reorder(palette: &[u8], entry_size: usize) -> Vec<u8> {
    let mut out = palette.to_vec();
    let entries = palette.len() / entry_size;
    for index in 0..entries {
        let target = csm1_index(index);
        if target < entries {
            out[target * entry_size..(target + 1) * entry_size]
                .copy_from_slice(&palette[index * entry_size..(index + 1) * entry_size]);
        }
    }
    out
}
