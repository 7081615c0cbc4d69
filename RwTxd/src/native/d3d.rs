//! Direct3D 8 and Direct3D 9 native textures
//!
//! Both store linear texels with rows padded to four bytes, palettes of
//! RGBA entries, and a `u32 size` prefix in front of every mipmap level.
//! They differ in one header dword (has-alpha on D3D8, the `D3DFORMAT` on
//! D3D9) and the meaning of the last header byte.

use super::{
    D3d8Native, D3d9Native, NativeData, NativeSurface, NativeTextureType, chain_dimensions, dimension_u16,
    dxt_for, ensure_native_layout, foreign_data, palette_from_word, platform, raster_format_word,
    read_common_header, write_common_header,
};
use crate::block::{DynBlockReader, DynBlockWriter, chunk};
use crate::engine::WarningLevel;
use crate::error::{Error, Result};
use crate::raster::pixel::{decode_texel, encode_texel, realign_rows};
use crate::raster::{
    AlphaProfile, ColorOrdering, Compression, MipLevel, PaletteType, PixelLayout, PortablePixels,
    RASTER_AUTOMIPMAP, RasterFormat, SizeRules,
};
use crate::txd::TextureFields;

pub const D3D8_NAME: &str = "Direct3D8";
pub const D3D9_NAME: &str = "Direct3D9";

/// Row alignment of uncompressed levels.
const ROW_ALIGNMENT: usize = 4;
const MAX_DIMENSION: u32 = 4096;
/// `rasterType` of a plain texture.
pub(crate) const RASTER_TYPE_TEXTURE: u8 = 4;

/// `D3DFORMAT` values written by Direct3D 9 rasters.
mod d3dfmt {
    pub const A8R8G8B8: u32 = 21;
    pub const X8R8G8B8: u32 = 22;
    pub const R5G6B5: u32 = 23;
    pub const X1R5G5B5: u32 = 24;
    pub const A1R5G5B5: u32 = 25;
    pub const A4R4G4B4: u32 = 26;
    pub const P8: u32 = 41;
    pub const L8: u32 = 50;
    pub const A8L8: u32 = 51;
}

const D3D9_FLAG_ALPHA: u8 = 0x01;
const D3D9_FLAG_CUBE: u8 = 0x02;
const D3D9_FLAG_AUTO_MIPMAPS: u8 = 0x04;
const D3D9_FLAG_COMPRESSED: u8 = 0x08;

const CUBE_FACES: usize = 6;

pub(crate) const fn fourcc(code: &[u8; 4]) -> u32 {
    u32::from_le_bytes(*code)
}

/// FourCC of a DXT scheme.
pub(crate) fn dxt_fourcc(compression: Compression) -> Option<u32> {
    compression.dxt_number().map(|n| {
        #[allow(clippy::cast_possible_truncation)]
        let digit = b'0' + n as u8;
        fourcc(&[b'D', b'X', b'T', digit])
    })
}

/// DXT scheme of a FourCC.
pub(crate) fn dxt_from_fourcc(code: u32) -> Option<Compression> {
    let bytes = code.to_le_bytes();
    if &bytes[..3] != b"DXT" {
        return None;
    }
    Compression::from_dxt_number(u32::from(bytes[3].wrapping_sub(b'0')))
}

/// Palette entries of a PAL4 raster on disk.
const PAL4_ENTRIES: usize = 32;

fn palette_entries(palette_type: PaletteType) -> usize {
    match palette_type {
        PaletteType::Pal8 => 256,
        PaletteType::Pal4 | PaletteType::Pal4Lsb => PAL4_ENTRIES,
        PaletteType::None => 0,
    }
}

/// 888 texels and palette entries take a whole dword on Direct3D.
fn bgr888() -> PixelLayout {
    PixelLayout {
        depth: 32,
        ..PixelLayout::raw(RasterFormat::Format888, ColorOrdering::Bgra)
    }
}

fn entry_layout(format: RasterFormat) -> PixelLayout {
    PixelLayout {
        depth: 32,
        ..PixelLayout::raw(format, ColorOrdering::Rgba)
    }
}

fn encode_entries(format: RasterFormat, palette: &[[u8; 4]], entries: usize) -> Vec<u8> {
    let layout = entry_layout(format);
    let mut out = vec![0u8; entries * 4];
    for (color, slot) in palette.iter().zip(out.chunks_exact_mut(4)) {
        encode_texel(&layout, *color, slot);
    }
    out
}

fn decode_entries(format: RasterFormat, data: &[u8], entries: usize) -> Vec<[u8; 4]> {
    let layout = entry_layout(format);
    data.chunks_exact(4)
        .take(entries)
        .map(|entry| decode_texel(&layout, entry))
        .collect()
}

fn native_layout(requested: &PixelLayout, has_alpha: bool, luminance_alpha: bool) -> PixelLayout {
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
        let entry_format = if requested.raster_format == RasterFormat::Format888 {
            RasterFormat::Format888
        } else {
            RasterFormat::Format8888
        };
        let palette_type = match requested.palette_type {
            PaletteType::Pal8 => PaletteType::Pal8,
            _ => PaletteType::Pal4,
        };
        return PixelLayout::palettized(palette_type, entry_format, ColorOrdering::Rgba);
    }
    match requested.raster_format {
        RasterFormat::Format888 => bgr888(),
        RasterFormat::Lum8 => PixelLayout::raw(RasterFormat::Lum8, ColorOrdering::Rgba),
        RasterFormat::LumAlpha if luminance_alpha => PixelLayout::raw(RasterFormat::LumAlpha, ColorOrdering::Rgba),
        RasterFormat::LumAlpha | RasterFormat::Default => {
            PixelLayout::raw(RasterFormat::Format8888, ColorOrdering::Bgra)
        }
        format => PixelLayout::raw(format, ColorOrdering::Bgra),
    }
}

fn size_rules(layout: &PixelLayout) -> SizeRules {
    let rules = SizeRules::any().with_maximum(MAX_DIMENSION);
    if layout.compression.is_compressed() { rules.multiple(4) } else { rules }
}

fn d3d9_format(layout: &PixelLayout) -> u32 {
    if let Some(code) = dxt_fourcc(layout.compression) {
        return code;
    }
    if layout.palette_type.is_palette() {
        return d3dfmt::P8;
    }
    match layout.raster_format {
        RasterFormat::Format888 => d3dfmt::X8R8G8B8,
        RasterFormat::Format565 => d3dfmt::R5G6B5,
        RasterFormat::Format555 => d3dfmt::X1R5G5B5,
        RasterFormat::Format1555 => d3dfmt::A1R5G5B5,
        RasterFormat::Format4444 => d3dfmt::A4R4G4B4,
        RasterFormat::Lum8 => d3dfmt::L8,
        RasterFormat::LumAlpha => d3dfmt::A8L8,
        RasterFormat::Format8888 | RasterFormat::Default => d3dfmt::A8R8G8B8,
    }
}

fn layout_from_d3d9_format(code: u32) -> Option<PixelLayout> {
    Some(match code {
        d3dfmt::A8R8G8B8 => PixelLayout::raw(RasterFormat::Format8888, ColorOrdering::Bgra),
        d3dfmt::X8R8G8B8 => bgr888(),
        d3dfmt::R5G6B5 => PixelLayout::raw(RasterFormat::Format565, ColorOrdering::Bgra),
        d3dfmt::X1R5G5B5 => PixelLayout::raw(RasterFormat::Format555, ColorOrdering::Bgra),
        d3dfmt::A1R5G5B5 => PixelLayout::raw(RasterFormat::Format1555, ColorOrdering::Bgra),
        d3dfmt::A4R4G4B4 => PixelLayout::raw(RasterFormat::Format4444, ColorOrdering::Bgra),
        d3dfmt::L8 => PixelLayout::raw(RasterFormat::Lum8, ColorOrdering::Rgba),
        d3dfmt::A8L8 => PixelLayout::raw(RasterFormat::LumAlpha, ColorOrdering::Rgba),
        _ => return None,
    })
}

/// Layout described by a raster format word and depth byte.
fn layout_from_word(word: u32, depth: u8) -> Result<PixelLayout> {
    let format = RasterFormat::from_code(word)?;
    let palette_type = palette_from_word(word, PaletteType::Pal4);
    if palette_type.is_palette() {
        let entry_format = if format == RasterFormat::Format888 {
            RasterFormat::Format888
        } else {
            RasterFormat::Format8888
        };
        return Ok(PixelLayout::palettized(palette_type, entry_format, ColorOrdering::Rgba));
    }
    let layout = match format {
        RasterFormat::Format888 => bgr888(),
        RasterFormat::Lum8 | RasterFormat::LumAlpha => PixelLayout::raw(format, ColorOrdering::Rgba),
        RasterFormat::Default => PixelLayout::raw(RasterFormat::Format8888, ColorOrdering::Bgra),
        other => PixelLayout::raw(other, ColorOrdering::Bgra),
    };
    if u32::from(depth) != layout.depth && depth != 0 {
        tracing::debug!("depth byte {depth} disagrees with {layout}, keeping {}", layout.depth);
    }
    Ok(layout)
}

fn surface_to_portable(surface: &NativeSurface) -> Result<PortablePixels> {
    let layout = surface.layout;
    if surface.mipmaps.is_empty() {
        return Err(Error::RasterEmpty);
    }
    let mipmaps = surface
        .mipmaps
        .iter()
        .map(|level| {
            if layout.compression.is_compressed() {
                level.clone()
            } else {
                MipLevel::new(
                    level.width,
                    level.height,
                    realign_rows(&level.data, level.width, level.height, layout.depth, ROW_ALIGNMENT, 1),
                )
            }
        })
        .collect();
    let palette = if layout.palette_type.is_palette() {
        decode_entries(layout.raster_format, &surface.palette, layout.palette_type.entry_count())
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

fn surface_from_portable(pixels: PortablePixels) -> NativeSurface {
    let layout = pixels.layout;
    let mipmaps = pixels
        .mipmaps
        .into_iter()
        .map(|level| {
            if layout.compression.is_compressed() {
                level
            } else {
                let data = realign_rows(&level.data, level.width, level.height, layout.depth, 1, ROW_ALIGNMENT);
                MipLevel::new(level.width, level.height, data)
            }
        })
        .collect();
    let palette_entries = palette_entries(layout.palette_type);
    NativeSurface {
        layout,
        mipmaps,
        palette: encode_entries(layout.raster_format, &pixels.palette, palette_entries),
        palette_entries,
        auto_mipmaps: pixels.auto_mipmaps,
        has_alpha: pixels.has_alpha,
        raster_type: RASTER_TYPE_TEXTURE,
    }
}

fn stored_level_size(layout: &PixelLayout, width: u32, height: u32) -> usize {
    if layout.compression.is_compressed() {
        layout.surface_size(width, height)
    } else {
        crate::raster::pixel::aligned_row_size(width, layout.depth, ROW_ALIGNMENT) * height as usize
    }
}

/// Header fields following the common header.
struct D3dHeader {
    format_word: u32,
    /// Has-alpha dword on D3D8, `D3DFORMAT` on D3D9.
    format_dword: u32,
    width: u16,
    height: u16,
    depth: u8,
    levels: u8,
    raster_type: u8,
    /// DXT number on D3D8, flags on D3D9.
    last: u8,
}

impl D3dHeader {
    fn read(reader: &mut DynBlockReader<'_>) -> Result<Self> {
        Ok(Self {
            format_word: reader.read_u32()?,
            format_dword: reader.read_u32()?,
            width: reader.read_u16()?,
            height: reader.read_u16()?,
            depth: reader.read_u8()?,
            levels: reader.read_u8()?,
            raster_type: reader.read_u8()?,
            last: reader.read_u8()?,
        })
    }

    fn write(&self, writer: &mut DynBlockWriter<'_>) -> Result<()> {
        writer.write_u32(self.format_word)?;
        writer.write_u32(self.format_dword)?;
        writer.write_u16(self.width)?;
        writer.write_u16(self.height)?;
        writer.write_u8(self.depth)?;
        writer.write_u8(self.levels)?;
        writer.write_u8(self.raster_type)?;
        writer.write_u8(self.last)
    }

    fn for_surface(surface: &NativeSurface, format_dword: u32, last: u8) -> Result<Self> {
        let layout = &surface.layout;
        let depth = if layout.compression.is_compressed() { 16 } else { layout.depth };
        Ok(Self {
            format_word: raster_format_word(layout, surface.mipmaps.len(), surface.auto_mipmaps, surface.has_alpha),
            format_dword,
            width: dimension_u16(surface.width())?,
            height: dimension_u16(surface.height())?,
            depth: u8::try_from(depth).map_err(|_| Error::unsupported(format!("{depth}-bit texels")))?,
            levels: u8::try_from(surface.mipmaps.len())
                .map_err(|_| Error::unsupported("more than 255 mipmap levels"))?,
            raster_type: surface.raster_type,
            last,
        })
    }
}

fn write_levels(writer: &mut DynBlockWriter<'_>, surface: &NativeSurface) -> Result<()> {
    writer.write_bytes(&surface.palette)?;
    for level in &surface.mipmaps {
        let size = u32::try_from(level.data.len()).map_err(|_| Error::unsupported("mipmap level too large"))?;
        writer.write_u32(size)?;
        writer.write_bytes(&level.data)?;
    }
    Ok(())
}

/// Read the palette and `levels` size-prefixed levels.
fn read_levels(
    reader: &mut DynBlockReader<'_>,
    layout: &PixelLayout,
    width: u32,
    height: u32,
    levels: usize,
) -> Result<(Vec<u8>, Vec<MipLevel>)> {
    let palette = reader.read_bytes(palette_entries(layout.palette_type) * 4)?;
    let mut mipmaps = Vec::with_capacity(levels);
    for (index, (w, h)) in chain_dimensions(width, height, levels).into_iter().enumerate() {
        let size = reader.read_u32()? as usize;
        let needed = stored_level_size(layout, w, h);
        if size < needed {
            return Err(Error::corrupt(format!(
                "mipmap {index} ({w}x{h}) stores {size} bytes, needs {needed}"
            )));
        }
        let mut data = reader.read_bytes(size)?;
        data.truncate(needed);
        mipmaps.push(MipLevel::new(w, h, data));
    }
    Ok((palette, mipmaps))
}

fn check_header(header: &D3dHeader) -> Result<()> {
    if header.width == 0 || header.height == 0 {
        return Err(Error::corrupt(format!(
            "raster has empty dimensions {}x{}",
            header.width, header.height
        )));
    }
    if header.levels == 0 {
        return Err(Error::corrupt("raster declares no mipmap levels"));
    }
    Ok(())
}

fn dxt_compression_for(alpha: AlphaProfile) -> Option<Compression> {
    Some(dxt_for(alpha))
}

/// Direct3D 8 (PC, RenderWare 3.5 era).
#[derive(Debug, Default, Clone, Copy)]
pub struct Direct3D8Type;

impl NativeTextureType for Direct3D8Type {
    fn name(&self) -> &'static str {
        D3D8_NAME
    }

    fn platform_id(&self) -> u32 {
        platform::D3D8
    }

    fn device_id(&self) -> u16 {
        1
    }

    fn create_native_data(&self) -> NativeData {
        NativeData::Direct3D8(D3d8Native::default())
    }

    fn size_rules(&self, layout: &PixelLayout) -> SizeRules {
        size_rules(layout)
    }

    fn native_layout(&self, requested: &PixelLayout, has_alpha: bool) -> PixelLayout {
        native_layout(requested, has_alpha, false)
    }

    fn compression_for(&self, alpha: AlphaProfile, _quality: f32) -> Option<Compression> {
        dxt_compression_for(alpha)
    }

    fn image_formats(&self) -> &'static [&'static str] {
        &["DDS"]
    }

    fn to_portable(&self, data: &NativeData) -> Result<PortablePixels> {
        match data {
            NativeData::Direct3D8(native) => surface_to_portable(&native.surface),
            other => Err(foreign_data(D3D8_NAME, other)),
        }
    }

    fn from_portable(&self, pixels: PortablePixels) -> Result<NativeData> {
        ensure_native_layout(self, &pixels)?;
        Ok(NativeData::Direct3D8(D3d8Native {
            surface: surface_from_portable(pixels),
        }))
    }

    fn serialize(&self, fields: &TextureFields, data: &NativeData, writer: &mut DynBlockWriter<'_>) -> Result<()> {
        let NativeData::Direct3D8(native) = data else {
            return Err(foreign_data(D3D8_NAME, data));
        };
        let surface = &native.surface;
        let dxt = surface.layout.compression.dxt_number().unwrap_or(0);
        #[allow(clippy::cast_possible_truncation)]
        let header = D3dHeader::for_surface(surface, u32::from(surface.has_alpha), dxt as u8)?;

        let ctx = writer.enter_context(chunk::STRUCT, writer.block_version().unwrap_or_default())?;
        write_common_header(writer, platform::D3D8, fields)?;
        header.write(writer)?;
        write_levels(writer, surface)?;
        writer.leave_context(ctx)
    }

    fn deserialize(&self, reader: &mut DynBlockReader<'_>) -> Result<(TextureFields, NativeData)> {
        let ctx = reader.enter_context_expect(chunk::STRUCT)?;
        let fields = read_common_header(reader, platform::D3D8)?;
        let header = D3dHeader::read(reader)?;
        check_header(&header)?;

        let layout = if header.last != 0 {
            let compression = Compression::from_dxt_number(u32::from(header.last))
                .ok_or_else(|| Error::corrupt(format!("unknown DXT type {}", header.last)))?;
            PixelLayout::compressed(compression)
        } else {
            layout_from_word(header.format_word, header.depth)?
        };
        let (width, height) = (u32::from(header.width), u32::from(header.height));
        let (palette, mipmaps) = read_levels(reader, &layout, width, height, usize::from(header.levels))?;
        reader.leave_context(ctx)?;

        let native = D3d8Native {
            surface: NativeSurface {
                layout,
                mipmaps,
                palette,
                palette_entries: palette_entries(layout.palette_type),
                auto_mipmaps: header.format_word & RASTER_AUTOMIPMAP != 0,
                has_alpha: header.format_dword != 0,
                raster_type: header.raster_type,
            },
        };
        Ok((fields, NativeData::Direct3D8(native)))
    }
}

/// Direct3D 9 (PC, San Andreas era).
#[derive(Debug, Default, Clone, Copy)]
pub struct Direct3D9Type;

impl NativeTextureType for Direct3D9Type {
    fn name(&self) -> &'static str {
        D3D9_NAME
    }

    fn platform_id(&self) -> u32 {
        platform::D3D9
    }

    fn device_id(&self) -> u16 {
        2
    }

    fn create_native_data(&self) -> NativeData {
        NativeData::Direct3D9(D3d9Native::default())
    }

    fn size_rules(&self, layout: &PixelLayout) -> SizeRules {
        size_rules(layout)
    }

    fn native_layout(&self, requested: &PixelLayout, has_alpha: bool) -> PixelLayout {
        native_layout(requested, has_alpha, true)
    }

    fn compression_for(&self, alpha: AlphaProfile, _quality: f32) -> Option<Compression> {
        dxt_compression_for(alpha)
    }

    fn image_formats(&self) -> &'static [&'static str] {
        &["DDS"]
    }

    fn to_portable(&self, data: &NativeData) -> Result<PortablePixels> {
        match data {
            NativeData::Direct3D9(native) => surface_to_portable(&native.surface),
            other => Err(foreign_data(D3D9_NAME, other)),
        }
    }

    fn from_portable(&self, pixels: PortablePixels) -> Result<NativeData> {
        ensure_native_layout(self, &pixels)?;
        let d3d_format = d3d9_format(&pixels.layout);
        Ok(NativeData::Direct3D9(D3d9Native {
            surface: surface_from_portable(pixels),
            d3d_format,
            is_cube_map: false,
        }))
    }

    fn serialize(&self, fields: &TextureFields, data: &NativeData, writer: &mut DynBlockWriter<'_>) -> Result<()> {
        let NativeData::Direct3D9(native) = data else {
            return Err(foreign_data(D3D9_NAME, data));
        };
        let surface = &native.surface;
        let mut flags = 0u8;
        if surface.has_alpha {
            flags |= D3D9_FLAG_ALPHA;
        }
        if native.is_cube_map {
            flags |= D3D9_FLAG_CUBE;
        }
        if surface.auto_mipmaps {
            flags |= D3D9_FLAG_AUTO_MIPMAPS;
        }
        if surface.layout.compression.is_compressed() {
            flags |= D3D9_FLAG_COMPRESSED;
        }
        let header = D3dHeader::for_surface(surface, native.d3d_format, flags)?;

        let ctx = writer.enter_context(chunk::STRUCT, writer.block_version().unwrap_or_default())?;
        write_common_header(writer, platform::D3D9, fields)?;
        header.write(writer)?;
        write_levels(writer, surface)?;
        writer.leave_context(ctx)
    }

    fn deserialize(&self, reader: &mut DynBlockReader<'_>) -> Result<(TextureFields, NativeData)> {
        let ctx = reader.enter_context_expect(chunk::STRUCT)?;
        let fields = read_common_header(reader, platform::D3D9)?;
        let header = D3dHeader::read(reader)?;
        check_header(&header)?;

        let d3d_format = header.format_dword;
        let palette_type = palette_from_word(header.format_word, PaletteType::Pal4);
        let layout = if let Some(compression) = dxt_from_fourcc(d3d_format) {
            PixelLayout::compressed(compression)
        } else if header.last & D3D9_FLAG_COMPRESSED != 0 {
            return Err(Error::corrupt(format!("unknown compressed D3DFORMAT 0x{d3d_format:08X}")));
        } else if palette_type.is_palette() {
            layout_from_word(header.format_word, header.depth)?
        } else if let Some(layout) = layout_from_d3d9_format(d3d_format) {
            layout
        } else {
            layout_from_word(header.format_word, header.depth)?
        };

        let (width, height) = (u32::from(header.width), u32::from(header.height));
        let levels = usize::from(header.levels);
        let (palette, mipmaps) = read_levels(reader, &layout, width, height, levels)?;
        if header.last & D3D9_FLAG_CUBE != 0 {
            // Only the first face survives; skip the remaining five.
            for _ in 1..CUBE_FACES {
                for _ in 0..levels {
                    let size = reader.read_u32()?;
                    reader.skip(u64::from(size))?;
                }
            }
            reader.engine().warn(
                WarningLevel::Important,
                format!("cube map '{}' was reduced to its first face", fields.name),
            );
        }
        reader.leave_context(ctx)?;

        let native = D3d9Native {
            surface: NativeSurface {
                layout,
                mipmaps,
                palette,
                palette_entries: palette_entries(layout.palette_type),
                auto_mipmaps: header.last & D3D9_FLAG_AUTO_MIPMAPS != 0
                    || header.format_word & RASTER_AUTOMIPMAP != 0,
                has_alpha: header.last & D3D9_FLAG_ALPHA != 0,
                raster_type: header.raster_type,
            },
            d3d_format,
            is_cube_map: false,
        };
        Ok((fields, NativeData::Direct3D9(native)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BlockReader, BlockWriter, ReadSeek, WriteSeek};
    use crate::engine::Engine;
    use crate::raster::palette_layout;
    use crate::txd::{AddressMode, FilterMode};
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    fn fields() -> TextureFields {
        TextureFields {
            name: "wall".to_string(),
            mask_name: "wallm".to_string(),
            filter: FilterMode::LinearLinear,
            u_addr: AddressMode::Wrap,
            v_addr: AddressMode::Clamp,
        }
    }

    fn round_trip(handler: &dyn NativeTextureType, data: &NativeData) -> (TextureFields, NativeData) {
        let engine = Engine::new();
        let mut buffer = Cursor::new(Vec::new());
        {
            let stream: &mut dyn WriteSeek = &mut buffer;
            let mut writer = BlockWriter::new(stream);
            handler.serialize(&fields(), data, &mut writer).unwrap();
        }
        buffer.set_position(0);
        let stream: &mut dyn ReadSeek = &mut buffer;
        let mut reader = BlockReader::new(stream, &engine);
        handler.deserialize(&mut reader).unwrap()
    }

    #[test]
    fn test_fourcc() {
        assert_eq!(dxt_fourcc(Compression::Dxt1), Some(0x3154_5844));
        assert_eq!(dxt_from_fourcc(0x3554_5844), Some(Compression::Dxt5));
        assert_eq!(dxt_from_fourcc(d3dfmt::A8R8G8B8), None);
    }

    #[test]
    fn test_d3d9_serialize_round_trip() {
        // 3 texels wide: rows of 565 need padding to 8 bytes.
        let layout = PixelLayout::raw(RasterFormat::Format565, ColorOrdering::Bgra);
        let pixels = PortablePixels {
            layout,
            mipmaps: vec![MipLevel::new(3, 2, (0..12).collect()), MipLevel::new(1, 1, vec![7, 8])],
            palette: Vec::new(),
            auto_mipmaps: false,
            has_alpha: false,
        };
        let native = Direct3D9Type.from_portable(pixels.clone()).unwrap();
        assert_eq!(native.surface().mipmaps[0].data.len(), 16);

        let (fields_back, data_back) = round_trip(&Direct3D9Type, &native);
        assert_eq!(fields_back, fields());
        assert_eq!(data_back, native);
        assert_eq!(Direct3D9Type.to_portable(&data_back).unwrap(), pixels);
    }

    #[test]
    fn test_d3d8_palette_round_trip() {
        let mut palette = vec![[0u8, 0, 0, 255]; 16];
        palette[1] = [255, 0, 0, 128];
        let layout = PixelLayout::palettized(PaletteType::Pal4, RasterFormat::Format8888, ColorOrdering::Rgba);
        let pixels = PortablePixels {
            layout,
            mipmaps: vec![MipLevel::new(4, 2, vec![0x01, 0x10, 0x11, 0x00])],
            palette: palette.clone(),
            auto_mipmaps: false,
            has_alpha: true,
        };
        let native = Direct3D8Type.from_portable(pixels).unwrap();
        assert_eq!(native.surface().palette.len(), PAL4_ENTRIES * 4);

        let (_, data_back) = round_trip(&Direct3D8Type, &native);
        let back = Direct3D8Type.to_portable(&data_back).unwrap();
        assert_eq!(back.layout, layout);
        assert_eq!(back.palette, palette);
        assert_eq!(back.mipmaps[0].data, vec![0x01, 0x10, 0x11, 0x00]);
    }

    #[test]
    fn test_dxt_round_trip() {
        let layout = PixelLayout::compressed(Compression::Dxt3);
        let pixels = PortablePixels {
            layout,
            mipmaps: vec![MipLevel::new(4, 4, vec![0xAB; 16])],
            palette: Vec::new(),
            auto_mipmaps: false,
            has_alpha: true,
        };
        for handler in [&Direct3D8Type as &dyn NativeTextureType, &Direct3D9Type] {
            let native = handler.from_portable(pixels.clone()).unwrap();
            let (_, data_back) = round_trip(handler, &native);
            assert_eq!(handler.to_portable(&data_back).unwrap(), pixels);
        }
    }

    #[test]
    fn test_native_layouts() {
        let pal4_lsb = PixelLayout::palettized(PaletteType::Pal4Lsb, RasterFormat::Format8888, ColorOrdering::Rgba);
        assert_eq!(
            Direct3D9Type.native_layout(&pal4_lsb, true).palette_type,
            PaletteType::Pal4
        );
        assert_eq!(Direct3D9Type.native_layout(&palette_layout(PaletteType::Pal8), true), palette_layout(PaletteType::Pal8));
        let atc = PixelLayout::compressed(Compression::AtcRgb);
        assert_eq!(Direct3D9Type.native_layout(&atc, false), bgr888());
        let lum_alpha = PixelLayout::raw(RasterFormat::LumAlpha, ColorOrdering::Rgba);
        assert_eq!(Direct3D9Type.native_layout(&lum_alpha, true), lum_alpha);
        assert_eq!(
            Direct3D8Type.native_layout(&lum_alpha, true).raster_format,
            RasterFormat::Format8888
        );
    }

    #[test]
    fn test_wrong_platform_rejected() {
        let native = Direct3D8Type.from_portable(PortablePixels {
            layout: PixelLayout::raw(RasterFormat::Format8888, ColorOrdering::Bgra),
            mipmaps: vec![MipLevel::new(1, 1, vec![1, 2, 3, 4])],
            palette: Vec::new(),
            auto_mipmaps: false,
            has_alpha: false,
        });
        let native = native.unwrap();
        assert!(Direct3D9Type.to_portable(&native).is_err());
    }
}
