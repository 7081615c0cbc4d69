//! Platform-neutral pixel pivot
//!
//! Every native platform can produce and accept [`PortablePixels`]: tightly
//! packed mipmap levels in a [`PixelLayout`] plus an RGBA palette. Converting
//! between platforms goes through this type; when both sides understand the
//! layout the texel bytes move across untouched, otherwise they are decoded
//! to RGBA8 and re-encoded.

use serde::Serialize;

use super::format::{ColorOrdering, PaletteType, PixelLayout, RasterFormat};
use super::{palette, pixel};
use crate::codec;
use crate::engine::EngineConfig;
use crate::error::{Error, Result};

/// One level of a mipmap chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MipLevel {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl MipLevel {
    #[must_use]
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self { width, height, data }
    }
}

/// How a raster uses its alpha channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AlphaProfile {
    /// Every texel is fully opaque.
    Opaque,
    /// Alpha is only ever 0 or 255.
    OneBit,
    /// A handful of distinct alpha values.
    FewLevels,
    /// Smooth alpha gradients.
    Smooth,
}

/// Distinct alpha values at or below which explicit (DXT3-style) alpha is preferred.
const FEW_ALPHA_LEVELS: usize = 16;

/// Pixel data detached from any native platform.
#[derive(Debug, Clone, PartialEq)]
pub struct PortablePixels {
    pub layout: PixelLayout,
    /// Tightly packed levels, base first.
    pub mipmaps: Vec<MipLevel>,
    /// RGBA entries; empty unless the layout is palettized.
    pub palette: Vec<[u8; 4]>,
    pub auto_mipmaps: bool,
    pub has_alpha: bool,
}

impl PortablePixels {
    /// Single-level RGBA8 pixels.
    #[must_use]
    pub fn from_rgba(width: u32, height: u32, rgba: Vec<u8>) -> Self {
        let has_alpha = rgba.chunks_exact(4).any(|t| t[3] != 255);
        Self {
            layout: PixelLayout::rgba8888(),
            mipmaps: vec![MipLevel::new(width, height, rgba)],
            palette: Vec::new(),
            auto_mipmaps: false,
            has_alpha,
        }
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.mipmaps.first().map_or(0, |m| m.width)
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.mipmaps.first().map_or(0, |m| m.height)
    }

    /// Check the structural invariants.
    ///
    /// # Errors
    /// Returns [`Error::CodecFailure`] if a level is short, the chain does not
    /// halve, or a compressed layout carries a palette.
    pub fn validate(&self) -> Result<()> {
        if self.mipmaps.is_empty() {
            return Err(Error::codec("raster has no mipmap levels"));
        }
        if self.layout.compression.is_compressed() && self.layout.palette_type.is_palette() {
            return Err(Error::codec("compressed rasters cannot be palettized"));
        }
        for (index, level) in self.mipmaps.iter().enumerate() {
            let needed = self.layout.surface_size(level.width, level.height);
            if level.data.len() < needed {
                return Err(Error::codec(format!(
                    "mipmap {index} ({}x{}) holds {} bytes, needs {needed}",
                    level.width,
                    level.height,
                    level.data.len()
                )));
            }
            if index > 0 {
                let prev = &self.mipmaps[index - 1];
                let expected = super::mipmap::next_level_dimensions(prev.width, prev.height);
                if (level.width, level.height) != expected {
                    return Err(Error::codec(format!(
                        "mipmap {index} is {}x{}, expected {}x{}",
                        level.width, level.height, expected.0, expected.1
                    )));
                }
            }
        }
        Ok(())
    }

    /// Decode one level to RGBA8.
    ///
    /// # Errors
    /// Returns [`Error::CodecFailure`] if the level is missing or its data is short.
    pub fn decode_level(&self, index: usize) -> Result<Vec<u8>> {
        let level = self
            .mipmaps
            .get(index)
            .ok_or_else(|| Error::codec(format!("no mipmap level {index}")))?;
        let layout = &self.layout;

        if layout.compression.is_compressed() {
            return codec::decompress(layout.compression, level.width, level.height, &level.data);
        }
        if layout.palette_type.is_palette() {
            let indices = pixel::unpack_indices(layout.palette_type, level.width, level.height, &level.data)?;
            let mut rgba = Vec::with_capacity(indices.len() * 4);
            for index in indices {
                let color = self.palette.get(usize::from(index)).copied().unwrap_or([0, 0, 0, 255]);
                rgba.extend_from_slice(&color);
            }
            return Ok(rgba);
        }
        pixel::decode_surface(layout, level.width, level.height, &level.data)
    }

    /// Decode every level to RGBA8.
    ///
    /// # Errors
    /// See [`decode_level`](Self::decode_level).
    pub fn decode_all(&self) -> Result<Vec<MipLevel>> {
        (0..self.mipmaps.len())
            .map(|i| {
                let level = &self.mipmaps[i];
                Ok(MipLevel::new(level.width, level.height, self.decode_level(i)?))
            })
            .collect()
    }

    /// Classify the alpha channel of all levels.
    ///
    /// # Errors
    /// Returns an error if decoding fails.
    pub fn alpha_profile(&self) -> Result<AlphaProfile> {
        if !self.layout.can_have_alpha() && !self.layout.palette_type.is_palette() {
            return Ok(AlphaProfile::Opaque);
        }
        let mut seen = [false; 256];
        for level in self.decode_all()? {
            for texel in level.data.chunks_exact(4) {
                seen[usize::from(texel[3])] = true;
            }
        }
        let distinct = seen.iter().filter(|&&s| s).count();
        let partial = seen[1..255].iter().any(|&s| s);
        Ok(if distinct <= 1 && seen[255] {
            AlphaProfile::Opaque
        } else if !partial {
            AlphaProfile::OneBit
        } else if distinct <= FEW_ALPHA_LEVELS {
            AlphaProfile::FewLevels
        } else {
            AlphaProfile::Smooth
        })
    }

    /// True if any texel is not fully opaque.
    ///
    /// # Errors
    /// Returns an error if decoding fails.
    pub fn compute_has_alpha(&self) -> Result<bool> {
        Ok(self.alpha_profile()? != AlphaProfile::Opaque)
    }

    /// Encode RGBA8 levels into `target`.
    ///
    /// # Errors
    /// Returns an error if a codec fails or the layout cannot be encoded.
    pub fn encode_levels(target: PixelLayout, levels: Vec<MipLevel>, config: &EngineConfig) -> Result<Self> {
        let has_alpha = target.can_have_alpha() || target.palette_type.is_palette();
        let has_alpha = has_alpha && levels.iter().any(|l| l.data.chunks_exact(4).any(|t| t[3] != 255));

        if target.palette_type.is_palette() {
            let refs: Vec<&[u8]> = levels.iter().map(|l| l.data.as_slice()).collect();
            let entry_layout = PixelLayout::raw(target.raster_format, target.color_order);
            let palette: Vec<[u8; 4]> =
                palette::quantize(&refs, target.palette_type.entry_count(), config.palette_runtime)
                    .into_iter()
                    .map(|c| round_trip_entry(&entry_layout, c))
                    .collect();
            let mipmaps = levels
                .iter()
                .map(|l| {
                    let indices = palette::map_to_palette(&l.data, &palette);
                    MipLevel::new(
                        l.width,
                        l.height,
                        pixel::pack_indices(target.palette_type, l.width, l.height, &indices),
                    )
                })
                .collect();
            return Ok(Self {
                layout: target,
                mipmaps,
                palette,
                auto_mipmaps: false,
                has_alpha,
            });
        }

        let mipmaps = levels
            .into_iter()
            .map(|l| {
                let data = if target.compression.is_compressed() {
                    codec::compress(target.compression, l.width, l.height, &l.data, config.dxt_runtime)?
                } else {
                    pixel::encode_surface(&target, l.width, l.height, &l.data)?
                };
                Ok(MipLevel::new(l.width, l.height, data))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            layout: target,
            mipmaps,
            palette: Vec::new(),
            auto_mipmaps: false,
            has_alpha,
        })
    }

    /// Re-encode into `target`, moving texel bytes untouched where possible.
    ///
    /// # Errors
    /// Returns an error if decoding or encoding fails.
    pub fn transcode(&self, target: PixelLayout, config: &EngineConfig) -> Result<Self> {
        if self.layout.same_encoding(&target) {
            let mut out = self.clone();
            out.layout = target;
            return Ok(out);
        }

        if self.layout.palette_type.is_palette()
            && target.palette_type.is_palette()
            && self.palette.len() <= target.palette_type.entry_count()
        {
            return self.repack_palette(target);
        }

        tracing::debug!("transcoding {} -> {target}", self.layout);
        let auto_mipmaps = self.auto_mipmaps;
        let mut out = Self::encode_levels(target, self.decode_all()?, config)?;
        out.auto_mipmaps = auto_mipmaps;
        Ok(out)
    }

    /// Palette-to-palette conversion that keeps the indices.
    fn repack_palette(&self, target: PixelLayout) -> Result<Self> {
        let entry_layout = PixelLayout::raw(target.raster_format, target.color_order);
        let palette: Vec<[u8; 4]> = self
            .palette
            .iter()
            .map(|c| round_trip_entry(&entry_layout, *c))
            .collect();
        let mipmaps = self
            .mipmaps
            .iter()
            .map(|level| {
                let indices =
                    pixel::unpack_indices(self.layout.palette_type, level.width, level.height, &level.data)?;
                Ok(MipLevel::new(
                    level.width,
                    level.height,
                    pixel::pack_indices(target.palette_type, level.width, level.height, &indices),
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            layout: target,
            mipmaps,
            palette,
            auto_mipmaps: self.auto_mipmaps,
            has_alpha: self.has_alpha && target.raster_format.has_alpha_channel(),
        })
    }

    /// Keep only the base level.
    pub fn truncate_mipmaps(&mut self, levels: usize) {
        self.mipmaps.truncate(levels.max(1));
    }
}

/// Quantize one palette entry to what `entry_layout` can store.
fn round_trip_entry(entry_layout: &PixelLayout, color: [u8; 4]) -> [u8; 4] {
    let mut buf = [0u8; 4];
    let size = (entry_layout.depth as usize / 8).clamp(1, 4);
    pixel::encode_texel(entry_layout, color, &mut buf[..size]);
    pixel::decode_texel(entry_layout, &buf[..size])
}

/// 16-bit layout a compressed surface decompresses to when packed decompression is on.
#[must_use]
pub fn packed_layout_for(pixels: &PortablePixels) -> PixelLayout {
    let format = match pixels.layout.compression.dxt_number() {
        Some(1) if pixels.has_alpha => RasterFormat::Format1555,
        Some(1) => RasterFormat::Format565,
        Some(_) => RasterFormat::Format4444,
        None if pixels.has_alpha => RasterFormat::Format8888,
        None => RasterFormat::Format888,
    };
    PixelLayout::raw(format, ColorOrdering::Bgra)
}

/// Palette layout with 32-bit RGBA entries.
#[must_use]
pub fn palette_layout(palette_type: PaletteType) -> PixelLayout {
    PixelLayout::palettized(palette_type, RasterFormat::Format8888, ColorOrdering::Rgba)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::Compression;
    use pretty_assertions::assert_eq;

    fn checker(width: u32, height: u32) -> Vec<u8> {
        let mut rgba = Vec::new();
        for y in 0..height {
            for x in 0..width {
                let on = (x + y) % 2 == 0;
                rgba.extend_from_slice(if on { &[255, 0, 0, 255] } else { &[0, 0, 255, 255] });
            }
        }
        rgba
    }

    #[test]
    fn test_palette_round_trip_is_exact() {
        let config = EngineConfig::default();
        let pixels = PortablePixels::from_rgba(8, 8, checker(8, 8));
        let pal = pixels.transcode(palette_layout(PaletteType::Pal4), &config).unwrap();
        assert_eq!(pal.palette.len(), 2);
        assert_eq!(pal.mipmaps[0].data.len(), 32);
        assert_eq!(pal.decode_level(0).unwrap(), checker(8, 8));

        let lsb = pal.transcode(palette_layout(PaletteType::Pal4Lsb), &config).unwrap();
        assert_eq!(lsb.palette, pal.palette);
        assert_eq!(lsb.decode_level(0).unwrap(), checker(8, 8));

        let pal8 = lsb.transcode(palette_layout(PaletteType::Pal8), &config).unwrap();
        assert_eq!(pal8.mipmaps[0].data.len(), 64);
        assert_eq!(pal8.decode_level(0).unwrap(), checker(8, 8));
    }

    #[test]
    fn test_same_encoding_is_identity() {
        let config = EngineConfig::default();
        let pixels = PortablePixels::from_rgba(4, 4, checker(4, 4));
        let out = pixels.transcode(PixelLayout::rgba8888(), &config).unwrap();
        assert_eq!(out, pixels);
    }

    #[test]
    fn test_alpha_profiles() {
        let opaque = PortablePixels::from_rgba(4, 4, checker(4, 4));
        assert_eq!(opaque.alpha_profile().unwrap(), AlphaProfile::Opaque);

        let mut rgba = checker(4, 4);
        rgba[3] = 0;
        let one_bit = PortablePixels::from_rgba(4, 4, rgba.clone());
        assert_eq!(one_bit.alpha_profile().unwrap(), AlphaProfile::OneBit);

        rgba[7] = 128;
        let few = PortablePixels::from_rgba(4, 4, rgba);
        assert_eq!(few.alpha_profile().unwrap(), AlphaProfile::FewLevels);

        let smooth: Vec<u8> = (0..64u8).flat_map(|a| [0, 0, 0, a * 4]).collect();
        let smooth = PortablePixels::from_rgba(8, 8, smooth);
        assert_eq!(smooth.alpha_profile().unwrap(), AlphaProfile::Smooth);
    }

    #[test]
    fn test_validate_rejects_bad_chain() {
        let mut pixels = PortablePixels::from_rgba(4, 4, checker(4, 4));
        pixels.mipmaps.push(MipLevel::new(1, 1, vec![0; 4]));
        assert!(pixels.validate().is_err());
        pixels.mipmaps[1] = MipLevel::new(2, 2, vec![0; 16]);
        assert!(pixels.validate().is_ok());
    }

    #[test]
    fn test_compress_and_decode() {
        let config = EngineConfig::default();
        let pixels = PortablePixels::from_rgba(8, 8, [90u8, 90, 90, 255].repeat(64));
        let dxt = pixels
            .transcode(PixelLayout::compressed(Compression::Dxt1), &config)
            .unwrap();
        assert_eq!(dxt.mipmaps[0].data.len(), 32);
        assert!(!dxt.has_alpha);
        let back = dxt.decode_level(0).unwrap();
        assert!(back.chunks_exact(4).all(|t| t[0].abs_diff(90) <= 4));
    }
}
