//! Raster format descriptors

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{Error, Result};

/// Canonical pixel format code (bits 8..12 of the raster format word).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RasterFormat {
    /// No explicit format; used by compressed rasters on some platforms.
    Default,
    Format1555,
    Format565,
    Format4444,
    Lum8,
    Format8888,
    Format888,
    Format555,
    LumAlpha,
}

/// Raster format flag: mipmaps are regenerated by the runtime.
pub const RASTER_AUTOMIPMAP: u32 = 0x1000;
/// Raster format flag: 8-bit palette.
pub const RASTER_PAL8: u32 = 0x2000;
/// Raster format flag: 4-bit palette.
pub const RASTER_PAL4: u32 = 0x4000;
/// Raster format flag: the raster carries mipmaps.
pub const RASTER_MIPMAP: u32 = 0x8000;

const FORMAT_MASK: u32 = 0x0F00;

impl RasterFormat {
    /// Format code as stored in the raster format word.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::Default => 0x000,
            Self::Format1555 => 0x100,
            Self::Format565 => 0x200,
            Self::Format4444 => 0x300,
            Self::Lum8 => 0x400,
            Self::Format8888 => 0x500,
            Self::Format888 => 0x600,
            Self::Format555 => 0xA00,
            Self::LumAlpha => 0xB00,
        }
    }

    /// Decode the format part of a raster format word.
    ///
    /// # Errors
    /// Returns [`Error::CorruptBlock`] for unknown codes.
    pub fn from_code(word: u32) -> Result<Self> {
        Ok(match word & FORMAT_MASK {
            0x000 => Self::Default,
            0x100 => Self::Format1555,
            0x200 => Self::Format565,
            0x300 => Self::Format4444,
            0x400 => Self::Lum8,
            0x500 => Self::Format8888,
            0x600 => Self::Format888,
            0xA00 => Self::Format555,
            0xB00 => Self::LumAlpha,
            other => {
                return Err(Error::corrupt(format!(
                    "unknown raster format code 0x{other:03X}"
                )));
            }
        })
    }

    /// Bits per texel when stored unpalettized.
    #[must_use]
    pub const fn natural_depth(self) -> u32 {
        match self {
            Self::Lum8 => 8,
            Self::Format1555
            | Self::Format565
            | Self::Format4444
            | Self::Format555
            | Self::LumAlpha => 16,
            Self::Format888 => 24,
            Self::Default | Self::Format8888 => 32,
        }
    }

    /// True if the format stores alpha.
    #[must_use]
    pub const fn has_alpha_channel(self) -> bool {
        matches!(
            self,
            Self::Format1555 | Self::Format4444 | Self::Format8888 | Self::LumAlpha | Self::Default
        )
    }

    /// True for luminance formats.
    #[must_use]
    pub const fn is_luminance(self) -> bool {
        matches!(self, Self::Lum8 | Self::LumAlpha)
    }
}

impl fmt::Display for RasterFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Default => "DEFAULT",
            Self::Format1555 => "1555",
            Self::Format565 => "565",
            Self::Format4444 => "4444",
            Self::Lum8 => "LUM8",
            Self::Format8888 => "8888",
            Self::Format888 => "888",
            Self::Format555 => "555",
            Self::LumAlpha => "LUM_ALPHA",
        };
        f.write_str(name)
    }
}

impl FromStr for RasterFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.trim().to_ascii_uppercase().as_str() {
            "1555" => Self::Format1555,
            "565" => Self::Format565,
            "4444" => Self::Format4444,
            "LUM8" | "LUM" => Self::Lum8,
            "8888" => Self::Format8888,
            "888" => Self::Format888,
            "555" => Self::Format555,
            "LUM_ALPHA" | "LUMALPHA" => Self::LumAlpha,
            other => return Err(Error::unsupported(format!("unknown raster format '{other}'"))),
        })
    }
}

/// Byte order of color channels in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum ColorOrdering {
    #[default]
    Rgba,
    Bgra,
    Abgr,
}

/// Palette kind of a raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum PaletteType {
    #[default]
    None,
    /// 4-bit indices, high nibble first.
    Pal4,
    /// 4-bit indices, low nibble first.
    Pal4Lsb,
    /// 8-bit indices.
    Pal8,
}

impl PaletteType {
    /// Bits per index, or `None` for unpalettized rasters.
    #[must_use]
    pub const fn index_depth(self) -> Option<u32> {
        match self {
            Self::None => None,
            Self::Pal4 | Self::Pal4Lsb => Some(4),
            Self::Pal8 => Some(8),
        }
    }

    /// Number of palette entries addressed by the index depth.
    #[must_use]
    pub const fn entry_count(self) -> usize {
        match self {
            Self::None => 0,
            Self::Pal4 | Self::Pal4Lsb => 16,
            Self::Pal8 => 256,
        }
    }

    #[must_use]
    pub const fn is_palette(self) -> bool {
        !matches!(self, Self::None)
    }

    /// Flag bits in the raster format word.
    #[must_use]
    pub const fn format_flag(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Pal4 | Self::Pal4Lsb => RASTER_PAL4,
            Self::Pal8 => RASTER_PAL8,
        }
    }
}

/// Block-compression scheme of a raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum Compression {
    #[default]
    None,
    Dxt1,
    Dxt2,
    Dxt3,
    Dxt4,
    Dxt5,
    Pvrtc2Rgb,
    Pvrtc2Rgba,
    Pvrtc4Rgb,
    Pvrtc4Rgba,
    AtcRgb,
    AtcExplicitAlpha,
    AtcInterpolatedAlpha,
}

impl Compression {
    #[must_use]
    pub const fn is_compressed(self) -> bool {
        !matches!(self, Self::None)
    }

    /// DXT number 1..=5, if this is a DXT scheme.
    #[must_use]
    pub const fn dxt_number(self) -> Option<u32> {
        match self {
            Self::Dxt1 => Some(1),
            Self::Dxt2 => Some(2),
            Self::Dxt3 => Some(3),
            Self::Dxt4 => Some(4),
            Self::Dxt5 => Some(5),
            _ => None,
        }
    }

    /// DXT scheme from its number.
    #[must_use]
    pub const fn from_dxt_number(n: u32) -> Option<Self> {
        match n {
            1 => Some(Self::Dxt1),
            2 => Some(Self::Dxt2),
            3 => Some(Self::Dxt3),
            4 => Some(Self::Dxt4),
            5 => Some(Self::Dxt5),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_dxt(self) -> bool {
        self.dxt_number().is_some()
    }

    #[must_use]
    pub const fn is_pvrtc(self) -> bool {
        matches!(
            self,
            Self::Pvrtc2Rgb | Self::Pvrtc2Rgba | Self::Pvrtc4Rgb | Self::Pvrtc4Rgba
        )
    }

    #[must_use]
    pub const fn is_atc(self) -> bool {
        matches!(
            self,
            Self::AtcRgb | Self::AtcExplicitAlpha | Self::AtcInterpolatedAlpha
        )
    }

    /// Texel block width and height.
    #[must_use]
    pub const fn block_dimensions(self) -> (u32, u32) {
        match self {
            Self::None => (1, 1),
            Self::Pvrtc2Rgb | Self::Pvrtc2Rgba => (8, 4),
            _ => (4, 4),
        }
    }

    /// Bytes per compressed block.
    #[must_use]
    pub const fn block_bytes(self) -> usize {
        match self {
            Self::None => 0,
            Self::Dxt1 | Self::AtcRgb => 8,
            Self::Pvrtc2Rgb | Self::Pvrtc2Rgba | Self::Pvrtc4Rgb | Self::Pvrtc4Rgba => 8,
            _ => 16,
        }
    }

    /// True if the scheme stores alpha.
    #[must_use]
    pub const fn has_alpha(self) -> bool {
        !matches!(
            self,
            Self::None | Self::Pvrtc2Rgb | Self::Pvrtc4Rgb | Self::AtcRgb
        )
    }

    /// Size in bytes of one compressed surface.
    #[must_use]
    pub fn surface_size(self, width: u32, height: u32) -> usize {
        let (bw, bh) = self.block_dimensions();
        let (mut bx, mut by) = (width.div_ceil(bw), height.div_ceil(bh));
        if self.is_pvrtc() {
            // PVRTC decodes from a 2x2 block neighbourhood.
            bx = bx.max(2);
            by = by.max(2);
        }
        bx as usize * by as usize * self.block_bytes()
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Dxt1 => "DXT1",
            Self::Dxt2 => "DXT2",
            Self::Dxt3 => "DXT3",
            Self::Dxt4 => "DXT4",
            Self::Dxt5 => "DXT5",
            Self::Pvrtc2Rgb => "PVRTC 2bpp RGB",
            Self::Pvrtc2Rgba => "PVRTC 2bpp RGBA",
            Self::Pvrtc4Rgb => "PVRTC 4bpp RGB",
            Self::Pvrtc4Rgba => "PVRTC 4bpp RGBA",
            Self::AtcRgb => "ATC RGB",
            Self::AtcExplicitAlpha => "ATC explicit alpha",
            Self::AtcInterpolatedAlpha => "ATC interpolated alpha",
        };
        f.write_str(name)
    }
}

/// Complete description of how texels of a raster are encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PixelLayout {
    /// Texel format, or the palette entry format for palette rasters.
    pub raster_format: RasterFormat,
    /// Bits per stored texel (the index depth for palette rasters).
    pub depth: u32,
    pub color_order: ColorOrdering,
    pub palette_type: PaletteType,
    pub compression: Compression,
}

impl PixelLayout {
    /// Uncompressed, unpalettized layout of `format` at its natural depth.
    #[must_use]
    pub const fn raw(format: RasterFormat, color_order: ColorOrdering) -> Self {
        Self {
            raster_format: format,
            depth: format.natural_depth(),
            color_order,
            palette_type: PaletteType::None,
            compression: Compression::None,
        }
    }

    /// The 32-bit RGBA pivot layout.
    #[must_use]
    pub const fn rgba8888() -> Self {
        Self::raw(RasterFormat::Format8888, ColorOrdering::Rgba)
    }

    /// Palette layout with the given entry format.
    #[must_use]
    pub fn palettized(palette_type: PaletteType, entry_format: RasterFormat, color_order: ColorOrdering) -> Self {
        Self {
            raster_format: entry_format,
            depth: palette_type.index_depth().unwrap_or(8),
            color_order,
            palette_type,
            compression: Compression::None,
        }
    }

    /// Compressed layout.
    #[must_use]
    pub const fn compressed(compression: Compression) -> Self {
        Self {
            raster_format: RasterFormat::Default,
            depth: if matches!(compression, Compression::Dxt1 | Compression::AtcRgb) {
                4
            } else if compression.is_pvrtc() {
                if matches!(compression, Compression::Pvrtc2Rgb | Compression::Pvrtc2Rgba) {
                    2
                } else {
                    4
                }
            } else {
                8
            },
            color_order: ColorOrdering::Rgba,
            palette_type: PaletteType::None,
            compression,
        }
    }

    /// True if texels of this layout can carry alpha.
    #[must_use]
    pub fn can_have_alpha(&self) -> bool {
        if self.compression.is_compressed() {
            self.compression.has_alpha()
        } else {
            self.raster_format.has_alpha_channel()
        }
    }

    /// Bytes used by one tightly packed surface.
    #[must_use]
    pub fn surface_size(&self, width: u32, height: u32) -> usize {
        if self.compression.is_compressed() {
            self.compression.surface_size(width, height)
        } else {
            (width as usize * self.depth as usize).div_ceil(8) * height as usize
        }
    }

    /// True if two layouts differ only in ways that don't need a pixel transcode.
    #[must_use]
    pub fn same_encoding(&self, other: &PixelLayout) -> bool {
        if self.compression.is_compressed() || other.compression.is_compressed() {
            return self.compression == other.compression;
        }
        self == other
    }
}

impl Default for PixelLayout {
    fn default() -> Self {
        Self::rgba8888()
    }
}

impl fmt::Display for PixelLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.compression.is_compressed() {
            return write!(f, "{}", self.compression);
        }
        match self.palette_type {
            PaletteType::None => write!(f, "{} ({} bit)", self.raster_format, self.depth),
            PaletteType::Pal8 => write!(f, "PAL8 ({})", self.raster_format),
            PaletteType::Pal4 | PaletteType::Pal4Lsb => write!(f, "PAL4 ({})", self.raster_format),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_codes_round_trip() {
        for format in [
            RasterFormat::Format1555,
            RasterFormat::Format565,
            RasterFormat::Format4444,
            RasterFormat::Lum8,
            RasterFormat::Format8888,
            RasterFormat::Format888,
            RasterFormat::Format555,
            RasterFormat::LumAlpha,
        ] {
            let word = format.code() | RASTER_PAL8 | RASTER_MIPMAP;
            assert_eq!(RasterFormat::from_code(word).unwrap(), format);
        }
        assert!(RasterFormat::from_code(0x0E00).is_err());
    }

    #[test]
    fn test_compressed_surface_sizes() {
        assert_eq!(Compression::Dxt1.surface_size(64, 64), 2048);
        assert_eq!(Compression::Dxt5.surface_size(64, 64), 4096);
        assert_eq!(Compression::Dxt1.surface_size(1, 1), 8);
        assert_eq!(Compression::Pvrtc4Rgba.surface_size(4, 4), 32);
        assert_eq!(Compression::Pvrtc2Rgb.surface_size(32, 32), 256);
    }

    #[test]
    fn test_uncompressed_surface_size() {
        let pal4 = PixelLayout::palettized(PaletteType::Pal4, RasterFormat::Format8888, ColorOrdering::Rgba);
        assert_eq!(pal4.surface_size(3, 2), 4);
        assert_eq!(PixelLayout::rgba8888().surface_size(2, 2), 16);
    }
}
