//! Xbox native textures
//!
//! Texel data of uncompressed rasters lives in Morton (swizzled) order and
//! every mipmap level is concatenated behind one total-size dword. Palettes
//! hold 256 `D3DCOLOR` (BGRA) entries; 4-bit palettes are widened to 8-bit.

use super::swizzle::{swizzle, unswizzle};
use super::{
    NativeData, NativeSurface, NativeTextureType, XboxNative, chain_dimensions, dimension_u16, dxt_for,
    ensure_native_layout, foreign_data, palette_from_word, platform, raster_format_word, read_common_header,
    write_common_header,
};
use crate::block::{DynBlockReader, DynBlockWriter, chunk};
use crate::error::{Error, Result};
use crate::raster::pixel::{decode_palette, encode_palette};
use crate::raster::{
    AlphaProfile, ColorOrdering, Compression, MipLevel, PaletteType, PixelLayout, PortablePixels,
    RASTER_AUTOMIPMAP, RasterFormat, SizeRules,
};
use crate::txd::TextureFields;

pub const XBOX_NAME: &str = "Xbox";

const MAX_DIMENSION: u32 = 4096;
const PALETTE_ENTRIES: usize = 256;
const RASTER_TYPE_TEXTURE: u8 = 4;

/// Xbox DXT codes, `DXT1` through `DXT5`.
const DXT_CODES: [u8; 5] = [0x0C, 0x0D, 0x0E, 0x0F, 0x10];

fn dxt_code(compression: Compression) -> u8 {
    compression
        .dxt_number()
        .and_then(|n| DXT_CODES.get(n as usize - 1).copied())
        .unwrap_or(0)
}

fn compression_from_code(code: u8) -> Option<Compression> {
    DXT_CODES
        .iter()
        .position(|&c| c == code)
        .and_then(|i| Compression::from_dxt_number(i as u32 + 1))
}

fn bgr888() -> PixelLayout {
    PixelLayout {
        depth: 32,
        ..PixelLayout::raw(RasterFormat::Format888, ColorOrdering::Bgra)
    }
}

/// Entry layout of the on-disk palette.
fn palette_entry_layout() -> PixelLayout {
    PixelLayout::raw(RasterFormat::Format8888, ColorOrdering::Bgra)
}

fn layout_from_word(word: u32) -> Result<PixelLayout> {
    let format = RasterFormat::from_code(word)?;
    if palette_from_word(word, PaletteType::Pal8).is_palette() {
        return Ok(PixelLayout::palettized(
            PaletteType::Pal8,
            RasterFormat::Format8888,
            ColorOrdering::Rgba,
        ));
    }
    Ok(match format {
        RasterFormat::Format888 => bgr888(),
        RasterFormat::Lum8 => PixelLayout::raw(RasterFormat::Lum8, ColorOrdering::Rgba),
        RasterFormat::Default | RasterFormat::LumAlpha => {
            PixelLayout::raw(RasterFormat::Format8888, ColorOrdering::Bgra)
        }
        other => PixelLayout::raw(other, ColorOrdering::Bgra),
    })
}

/// Bytes per texel for swizzling, or `None` for block-compressed data.
fn texel_size(layout: &PixelLayout) -> Option<usize> {
    if layout.compression.is_compressed() {
        None
    } else {
        Some((layout.depth as usize / 8).max(1))
    }
}

/// Xbox.
#[derive(Debug, Default, Clone, Copy)]
pub struct XboxType;

impl NativeTextureType for XboxType {
    fn name(&self) -> &'static str {
        XBOX_NAME
    }

    fn platform_id(&self) -> u32 {
        platform::XBOX
    }

    fn device_id(&self) -> u16 {
        8
    }

    fn create_native_data(&self) -> NativeData {
        NativeData::Xbox(XboxNative::default())
    }

    fn size_rules(&self, _layout: &PixelLayout) -> SizeRules {
        SizeRules::power_of_two().with_maximum(MAX_DIMENSION)
    }

    fn native_layout(&self, requested: &PixelLayout, has_alpha: bool) -> PixelLayout {
        if requested.compression.is_dxt() {
            return PixelLayout::compressed(requested.compression);
        }
        if requested.compression.is_compressed() {
            return if has_alpha {
                PixelLayout::raw(RasterFormat::Format8888, ColorOrdering::Bgra)
            } else {
                bgr888()
            };
        }
        if requested.palette_type.is_palette() {
            return PixelLayout::palettized(PaletteType::Pal8, RasterFormat::Format8888, ColorOrdering::Rgba);
        }
        match requested.raster_format {
            RasterFormat::Format888 => bgr888(),
            RasterFormat::Lum8 => PixelLayout::raw(RasterFormat::Lum8, ColorOrdering::Rgba),
            RasterFormat::LumAlpha | RasterFormat::Default => {
                PixelLayout::raw(RasterFormat::Format8888, ColorOrdering::Bgra)
            }
            format => PixelLayout::raw(format, ColorOrdering::Bgra),
        }
    }

    fn compression_for(&self, alpha: AlphaProfile, _quality: f32) -> Option<Compression> {
        Some(dxt_for(alpha))
    }

    fn to_portable(&self, data: &NativeData) -> Result<PortablePixels> {
        let NativeData::Xbox(native) = data else {
            return Err(foreign_data(XBOX_NAME, data));
        };
        let surface = &native.surface;
        if surface.mipmaps.is_empty() {
            return Err(Error::RasterEmpty);
        }
        let layout = surface.layout;
        let mipmaps = surface
            .mipmaps
            .iter()
            .map(|level| match texel_size(&layout) {
                Some(size) => MipLevel::new(
                    level.width,
                    level.height,
                    unswizzle(&level.data, level.width, level.height, size),
                ),
                None => level.clone(),
            })
            .collect();
        let palette = if layout.palette_type.is_palette() {
            decode_palette(&palette_entry_layout(), &surface.palette, surface.palette_entries)
        } else {
            Vec::new()
        };
        Ok(PortablePixels {
            layout,
            mipmaps,
            palette,
            auto_mipmaps: surface.auto_mipmaps,
            has_alpha: surface.has_alpha,
        })
    }

    fn from_portable(&self, pixels: PortablePixels) -> Result<NativeData> {
        ensure_native_layout(self, &pixels)?;
        let layout = pixels.layout;
        let mipmaps = pixels
            .mipmaps
            .into_iter()
            .map(|level| match texel_size(&layout) {
                Some(size) => {
                    let data = swizzle(&level.data, level.width, level.height, size);
                    MipLevel::new(level.width, level.height, data)
                }
                None => level,
            })
            .collect();
        let (palette, palette_entries) = if layout.palette_type.is_palette() {
            (
                encode_palette(&palette_entry_layout(), &pixels.palette, PALETTE_ENTRIES),
                PALETTE_ENTRIES,
            )
        } else {
            (Vec::new(), 0)
        };
        Ok(NativeData::Xbox(XboxNative {
            surface: NativeSurface {
                layout,
                mipmaps,
                palette,
                palette_entries,
                auto_mipmaps: pixels.auto_mipmaps,
                has_alpha: pixels.has_alpha,
                raster_type: RASTER_TYPE_TEXTURE,
            },
        }))
    }

    fn serialize(&self, fields: &TextureFields, data: &NativeData, writer: &mut DynBlockWriter<'_>) -> Result<()> {
        let NativeData::Xbox(native) = data else {
            return Err(foreign_data(XBOX_NAME, data));
        };
        let surface = &native.surface;
        let layout = &surface.layout;
        let depth = if layout.compression.is_compressed() { 16 } else { layout.depth };
        let total: usize = surface.mipmaps.iter().map(|m| m.data.len()).sum();

        let ctx = writer.enter_context(chunk::STRUCT, writer.block_version().unwrap_or_default())?;
        write_common_header(writer, platform::XBOX, fields)?;
        writer.write_u32(raster_format_word(
            layout,
            surface.mipmaps.len(),
            surface.auto_mipmaps,
            surface.has_alpha,
        ))?;
        writer.write_u32(u32::from(surface.has_alpha))?;
        writer.write_u16(dimension_u16(surface.width())?)?;
        writer.write_u16(dimension_u16(surface.height())?)?;
        writer.write_u8(u8::try_from(depth).map_err(|_| Error::unsupported(format!("{depth}-bit texels")))?)?;
        writer.write_u8(
            u8::try_from(surface.mipmaps.len()).map_err(|_| Error::unsupported("more than 255 mipmap levels"))?,
        )?;
        writer.write_u8(surface.raster_type)?;
        writer.write_u8(dxt_code(layout.compression))?;
        writer.write_u32(u32::try_from(total).map_err(|_| Error::unsupported("raster too large"))?)?;
        writer.write_bytes(&surface.palette)?;
        for level in &surface.mipmaps {
            writer.write_bytes(&level.data)?;
        }
        writer.leave_context(ctx)
    }

    fn deserialize(&self, reader: &mut DynBlockReader<'_>) -> Result<(TextureFields, NativeData)> {
        let ctx = reader.enter_context_expect(chunk::STRUCT)?;
        let fields = read_common_header(reader, platform::XBOX)?;
        let format_word = reader.read_u32()?;
        let has_alpha = reader.read_u32()? != 0;
        let width = u32::from(reader.read_u16()?);
        let height = u32::from(reader.read_u16()?);
        let _depth = reader.read_u8()?;
        let levels = usize::from(reader.read_u8()?);
        let raster_type = reader.read_u8()?;
        let dxt = reader.read_u8()?;
        let total = reader.read_u32()? as usize;

        if width == 0 || height == 0 || levels == 0 {
            return Err(Error::corrupt(format!(
                "Xbox raster {width}x{height} with {levels} levels"
            )));
        }
        let layout = if dxt != 0 {
            PixelLayout::compressed(
                compression_from_code(dxt).ok_or_else(|| Error::corrupt(format!("unknown Xbox DXT code 0x{dxt:02X}")))?,
            )
        } else {
            layout_from_word(format_word)?
        };

        let (palette, palette_entries) = if layout.palette_type.is_palette() {
            (reader.read_bytes(PALETTE_ENTRIES * 4)?, PALETTE_ENTRIES)
        } else {
            (Vec::new(), 0)
        };

        let data = reader.read_bytes(total)?;
        let mut offset = 0;
        let mut mipmaps = Vec::with_capacity(levels);
        for (index, (w, h)) in chain_dimensions(width, height, levels).into_iter().enumerate() {
            let size = layout.surface_size(w, h);
            let level = data.get(offset..offset + size).ok_or_else(|| {
                Error::corrupt(format!("Xbox mipmap {index} ({w}x{h}) runs past the image data"))
            })?;
            mipmaps.push(MipLevel::new(w, h, level.to_vec()));
            offset += size;
        }
        reader.leave_context(ctx)?;

        let native = XboxNative {
            surface: NativeSurface {
                layout,
                mipmaps,
                palette,
                palette_entries,
                auto_mipmaps: format_word & RASTER_AUTOMIPMAP != 0,
                has_alpha,
                raster_type,
            },
        };
        Ok((fields, NativeData::Xbox(native)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BlockReader, BlockWriter, ReadSeek, WriteSeek};
    use crate::engine::Engine;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    fn serialize_round_trip(data: &NativeData) -> NativeData {
        let engine = Engine::new();
        let mut buffer = Cursor::new(Vec::new());
        {
            let stream: &mut dyn WriteSeek = &mut buffer;
            let mut writer = BlockWriter::new(stream);
            XboxType
                .serialize(&TextureFields::default(), data, &mut writer)
                .unwrap();
        }
        buffer.set_position(0);
        let stream: &mut dyn ReadSeek = &mut buffer;
        let mut reader = BlockReader::new(stream, &engine);
        XboxType.deserialize(&mut reader).unwrap().1
    }

    #[test]
    fn test_dxt_codes() {
        assert_eq!(dxt_code(Compression::Dxt1), 0x0C);
        assert_eq!(dxt_code(Compression::Dxt5), 0x10);
        assert_eq!(compression_from_code(0x0E), Some(Compression::Dxt3));
        assert_eq!(compression_from_code(0x20), None);
    }

    #[test]
    fn test_texels_are_swizzled() {
        let layout = PixelLayout::raw(RasterFormat::Format8888, ColorOrdering::Bgra);
        let linear: Vec<u8> = (0..4 * 4 * 4).map(|v| v as u8).collect();
        let pixels = PortablePixels {
            layout,
            mipmaps: vec![MipLevel::new(4, 4, linear.clone())],
            palette: Vec::new(),
            auto_mipmaps: false,
            has_alpha: true,
        };
        let native = XboxType.from_portable(pixels.clone()).unwrap();
        // Texel (0, 1) moves to Morton slot 2.
        assert_eq!(&native.surface().mipmaps[0].data[8..12], &linear[16..20]);

        let back = serialize_round_trip(&native);
        assert_eq!(back, native);
        assert_eq!(XboxType.to_portable(&back).unwrap(), pixels);
    }

    #[test]
    fn test_palette_round_trip_with_mipmaps() {
        let mut palette = vec![[0u8, 0, 0, 255]; 256];
        palette[3] = [10, 20, 30, 40];
        let layout = PixelLayout::palettized(PaletteType::Pal8, RasterFormat::Format8888, ColorOrdering::Rgba);
        let pixels = PortablePixels {
            layout,
            mipmaps: vec![
                MipLevel::new(4, 2, vec![0, 1, 2, 3, 3, 2, 1, 0]),
                MipLevel::new(2, 1, vec![3, 3]),
                MipLevel::new(1, 1, vec![1]),
            ],
            palette,
            auto_mipmaps: false,
            has_alpha: true,
        };
        let native = XboxType.from_portable(pixels.clone()).unwrap();
        let back = serialize_round_trip(&native);
        assert_eq!(XboxType.to_portable(&back).unwrap(), pixels);
    }

    #[test]
    fn test_pal4_widens_to_pal8() {
        let pal4 = PixelLayout::palettized(PaletteType::Pal4, RasterFormat::Format8888, ColorOrdering::Rgba);
        assert_eq!(XboxType.native_layout(&pal4, false).palette_type, PaletteType::Pal8);
        assert!(!XboxType.size_rules(&pal4).verify(12, 16));
    }
}
