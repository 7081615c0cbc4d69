//! PlayStation 2 and PSP native textures
//!
//! Both keep the texture name and mask in `STRING` chunks and the raster in a
//! `STRUCT` holding a GS register record followed by a `STRUCT` of texel and
//! CLUT data. The PlayStation 2 GS treats alpha 128 as opaque and reads 8-bit
//! CLUTs in CSM1 order; the PSP does neither. Texel data is kept linear.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::swizzle::csm1_reorder;
use super::{
    NativeData, NativeSurface, NativeTextureType, PspNative, Ps2Native, apply_filter_flags, chain_dimensions,
    ensure_native_layout, foreign_data, palette_from_word, platform, raster_format_word,
};
use crate::block::{BinaryRecord, DynBlockReader, DynBlockWriter, chunk};
use crate::engine::WarningLevel;
use crate::error::{Error, Result};
use crate::raster::pixel::{decode_palette, encode_palette};
use crate::raster::{
    ColorOrdering, MipLevel, PaletteType, PixelLayout, PortablePixels, RASTER_AUTOMIPMAP, RasterFormat, SizeRules,
};
use crate::txd::TextureFields;

pub const PS2_NAME: &str = "PlayStation2";
pub const PSP_NAME: &str = "PSP";

/// Raster format flag marking GIF packet headers in front of each level.
const RASTER_HAS_HEADERS: u32 = 0x2_0000;
/// Size of one GIF packet header.
const GIF_HEADER_SIZE: u64 = 0x50;
/// The GS addresses at most seven levels.
const MAX_LEVELS: usize = 7;
const PS2_MAX_DIMENSION: u32 = 1024;
const PSP_MAX_DIMENSION: u32 = 512;

/// GS pixel storage modes.
mod psm {
    pub const CT32: u64 = 0x00;
    pub const CT24: u64 = 0x01;
    pub const CT16: u64 = 0x02;
    pub const T8: u64 = 0x13;
    pub const T4: u64 = 0x14;
}

/// GS register record at the start of the raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct GsRasterHeader {
    width: u32,
    height: u32,
    depth: u32,
    raster_format: u32,
    tex0: u64,
    tex1: u64,
    miptbp1: u64,
    miptbp2: u64,
    texels_size: u32,
    palette_size: u32,
    gpu_size: u32,
    sky_mipmap: u32,
}

impl BinaryRecord for GsRasterHeader {
    const SIZE: usize = 64;

    fn read_from<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        Ok(Self {
            width: reader.read_u32::<LittleEndian>()?,
            height: reader.read_u32::<LittleEndian>()?,
            depth: reader.read_u32::<LittleEndian>()?,
            raster_format: reader.read_u32::<LittleEndian>()?,
            tex0: reader.read_u64::<LittleEndian>()?,
            tex1: reader.read_u64::<LittleEndian>()?,
            miptbp1: reader.read_u64::<LittleEndian>()?,
            miptbp2: reader.read_u64::<LittleEndian>()?,
            texels_size: reader.read_u32::<LittleEndian>()?,
            palette_size: reader.read_u32::<LittleEndian>()?,
            gpu_size: reader.read_u32::<LittleEndian>()?,
            sky_mipmap: reader.read_u32::<LittleEndian>()?,
        })
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_u32::<LittleEndian>(self.width)?;
        writer.write_u32::<LittleEndian>(self.height)?;
        writer.write_u32::<LittleEndian>(self.depth)?;
        writer.write_u32::<LittleEndian>(self.raster_format)?;
        writer.write_u64::<LittleEndian>(self.tex0)?;
        writer.write_u64::<LittleEndian>(self.tex1)?;
        writer.write_u64::<LittleEndian>(self.miptbp1)?;
        writer.write_u64::<LittleEndian>(self.miptbp2)?;
        writer.write_u32::<LittleEndian>(self.texels_size)?;
        writer.write_u32::<LittleEndian>(self.palette_size)?;
        writer.write_u32::<LittleEndian>(self.gpu_size)?;
        writer.write_u32::<LittleEndian>(self.sky_mipmap)
    }
}

impl GsRasterHeader {
    /// Mipmap count from the MXL field of TEX1.
    #[allow(clippy::cast_possible_truncation)]
    fn levels(&self) -> usize {
        ((self.tex1 >> 2) & 0x7) as usize + 1
    }
}

/// Scale 0..=255 alpha to the GS range 0..=128.
#[allow(clippy::cast_possible_truncation)]
fn alpha_to_gs(alpha: u8) -> u8 {
    ((u32::from(alpha) * 128 + 127) / 255) as u8
}

/// Scale GS alpha 0..=128 back to 0..=255.
#[allow(clippy::cast_possible_truncation)]
fn alpha_from_gs(alpha: u8) -> u8 {
    ((u32::from(alpha) * 255 + 64) / 128).min(255) as u8
}

fn map_alpha(data: &mut [u8], map: fn(u8) -> u8) {
    for texel in data.chunks_exact_mut(4) {
        texel[3] = map(texel[3]);
    }
}

/// Differences between the two consoles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Console {
    Ps2,
    Psp,
}

impl Console {
    const fn name(self) -> &'static str {
        match self {
            Self::Ps2 => PS2_NAME,
            Self::Psp => PSP_NAME,
        }
    }

    const fn platform_id(self) -> u32 {
        match self {
            Self::Ps2 => platform::PS2,
            Self::Psp => platform::PSP,
        }
    }

    /// True if alpha is stored in the GS 0..=128 range.
    const fn half_alpha(self) -> bool {
        matches!(self, Self::Ps2)
    }

    fn size_rules(self) -> SizeRules {
        match self {
            Self::Ps2 => SizeRules::power_of_two().with_maximum(PS2_MAX_DIMENSION),
            Self::Psp => SizeRules::power_of_two().with_maximum(PSP_MAX_DIMENSION),
        }
    }

    fn native_layout(self, requested: &PixelLayout, has_alpha: bool) -> PixelLayout {
        let rgba = |format| PixelLayout::raw(format, ColorOrdering::Rgba);
        if requested.palette_type.is_palette() && !requested.compression.is_compressed() {
            let entry_format = if self == Self::Ps2 && requested.raster_format == RasterFormat::Format1555 {
                RasterFormat::Format1555
            } else {
                RasterFormat::Format8888
            };
            let palette_type = match requested.palette_type {
                PaletteType::Pal8 => PaletteType::Pal8,
                _ => PaletteType::Pal4Lsb,
            };
            return PixelLayout::palettized(palette_type, entry_format, ColorOrdering::Rgba);
        }
        if self == Self::Psp || requested.compression.is_compressed() {
            return rgba(RasterFormat::Format8888);
        }
        match requested.raster_format {
            RasterFormat::Format1555 | RasterFormat::Format555 => rgba(RasterFormat::Format1555),
            RasterFormat::Format8888 | RasterFormat::Default => rgba(RasterFormat::Format8888),
            _ if has_alpha => rgba(RasterFormat::Format8888),
            _ => gs_888(),
        }
    }

    fn create(self, surface: NativeSurface, sky_mipmap_k: u32) -> NativeData {
        match self {
            Self::Ps2 => NativeData::PlayStation2(Ps2Native { surface, sky_mipmap_k }),
            Self::Psp => NativeData::Psp(PspNative { surface }),
        }
    }

    /// Storage and mipmap K of data belonging to this console.
    fn unwrap(self, data: &NativeData) -> Result<(&NativeSurface, u32)> {
        match (self, data) {
            (Self::Ps2, NativeData::PlayStation2(native)) => Ok((&native.surface, native.sky_mipmap_k)),
            (Self::Psp, NativeData::Psp(native)) => Ok((&native.surface, 0)),
            _ => Err(foreign_data(self.name(), data)),
        }
    }

    /// True if texels of `layout` carry an 8-bit alpha byte.
    fn scales_alpha(self, layout: &PixelLayout) -> bool {
        self.half_alpha() && layout.raster_format == RasterFormat::Format8888
    }

    fn to_portable(self, data: &NativeData) -> Result<PortablePixels> {
        let (surface, _) = self.unwrap(data)?;
        if surface.mipmaps.is_empty() {
            return Err(Error::RasterEmpty);
        }
        let layout = surface.layout;
        let mut mipmaps = surface.mipmaps.clone();
        let palette = if layout.palette_type.is_palette() {
            let mut clut = surface.palette.clone();
            let entry_size = entry_layout(&layout).depth as usize / 8;
            if self.half_alpha() && layout.palette_type == PaletteType::Pal8 {
                clut = csm1_reorder(&clut, entry_size);
            }
            if self.scales_alpha(&layout) {
                map_alpha(&mut clut, alpha_from_gs);
            }
            decode_palette(&entry_layout(&layout), &clut, layout.palette_type.entry_count())
        } else {
            if self.scales_alpha(&layout) {
                for level in &mut mipmaps {
                    map_alpha(&mut level.data, alpha_from_gs);
                }
            }
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

    fn from_portable(self, handler: &dyn NativeTextureType, pixels: PortablePixels) -> Result<NativeData> {
        ensure_native_layout(handler, &pixels)?;
        let layout = pixels.layout;
        let mut mipmaps = pixels.mipmaps;
        if mipmaps.len() > MAX_LEVELS {
            tracing::debug!("{}: dropping {} mipmap levels", self.name(), mipmaps.len() - MAX_LEVELS);
            mipmaps.truncate(MAX_LEVELS);
        }

        let (palette, palette_entries) = if layout.palette_type.is_palette() {
            let entries = layout.palette_type.entry_count();
            let entry_layout = entry_layout(&layout);
            let mut clut = encode_palette(&entry_layout, &pixels.palette, entries);
            if self.scales_alpha(&layout) {
                map_alpha(&mut clut, alpha_to_gs);
            }
            if self.half_alpha() && layout.palette_type == PaletteType::Pal8 {
                clut = csm1_reorder(&clut, entry_layout.depth as usize / 8);
            }
            (clut, entries)
        } else {
            if self.scales_alpha(&layout) {
                for level in &mut mipmaps {
                    map_alpha(&mut level.data, alpha_to_gs);
                }
            }
            (Vec::new(), 0)
        };

        let surface = NativeSurface {
            layout,
            mipmaps,
            palette,
            palette_entries,
            auto_mipmaps: pixels.auto_mipmaps,
            has_alpha: pixels.has_alpha,
            raster_type: 4,
        };
        Ok(self.create(surface, 0))
    }

    fn serialize(self, fields: &TextureFields, data: &NativeData, writer: &mut DynBlockWriter<'_>) -> Result<()> {
        let (surface, sky_mipmap_k) = self.unwrap(data)?;
        let version = writer.block_version().unwrap_or_default();

        let ctx = writer.enter_context(chunk::STRUCT, version)?;
        writer.write_u32(self.platform_id())?;
        writer.write_u32(fields.pack_filter_flags())?;
        writer.leave_context(ctx)?;
        writer.write_string_chunk(&fields.name, version)?;
        writer.write_string_chunk(&fields.mask_name, version)?;

        let header = gs_header(surface, sky_mipmap_k)?;
        let raster = writer.enter_context(chunk::STRUCT, version)?;
        let ctx = writer.enter_context(chunk::STRUCT, version)?;
        writer.write_struct(&header)?;
        writer.leave_context(ctx)?;
        let ctx = writer.enter_context(chunk::STRUCT, version)?;
        for level in &surface.mipmaps {
            writer.write_bytes(&level.data)?;
        }
        writer.write_bytes(&surface.palette)?;
        writer.leave_context(ctx)?;
        writer.leave_context(raster)
    }

    fn deserialize(self, reader: &mut DynBlockReader<'_>) -> Result<(TextureFields, NativeData)> {
        let ctx = reader.enter_context_expect(chunk::STRUCT)?;
        let found = reader.read_u32()?;
        if found != self.platform_id() {
            return Err(Error::corrupt(format!(
                "native texture platform 0x{found:X}, expected 0x{:X}",
                self.platform_id()
            )));
        }
        let flags = reader.read_u32()?;
        reader.leave_context(ctx)?;

        let mut fields = TextureFields {
            name: reader.read_string_chunk()?,
            mask_name: reader.read_string_chunk()?,
            ..TextureFields::default()
        };
        apply_filter_flags(reader, &mut fields, flags);

        let raster = reader.enter_context_expect(chunk::STRUCT)?;
        let ctx = reader.enter_context_expect(chunk::STRUCT)?;
        let header: GsRasterHeader = reader.read_struct()?;
        reader.leave_context(ctx)?;

        let layout = self.layout_from_header(&header)?;
        let has_headers = header.raster_format & RASTER_HAS_HEADERS != 0;
        let levels = header.levels();
        if header.width == 0 || header.height == 0 {
            return Err(Error::corrupt(format!(
                "{} raster has empty dimensions {}x{}",
                self.name(),
                header.width,
                header.height
            )));
        }

        let ctx = reader.enter_context_expect(chunk::STRUCT)?;
        let mut mipmaps = Vec::with_capacity(levels);
        for (w, h) in chain_dimensions(header.width, header.height, levels) {
            if has_headers {
                reader.skip(GIF_HEADER_SIZE)?;
            }
            mipmaps.push(MipLevel::new(w, h, reader.read_bytes(layout.surface_size(w, h))?));
        }
        let (palette, palette_entries) = if layout.palette_type.is_palette() {
            if has_headers {
                reader.skip(GIF_HEADER_SIZE)?;
            }
            let entries = layout.palette_type.entry_count();
            let entry_size = entry_layout(&layout).depth as usize / 8;
            (reader.read_bytes(entries * entry_size)?, entries)
        } else {
            (Vec::new(), 0)
        };
        let leftover = reader.remaining()?;
        if leftover > 0 {
            reader.engine().warn_secure(
                WarningLevel::Verbose,
                format!("{} raster '{}' has {leftover} bytes of GS padding", self.name(), fields.name),
            );
        }
        reader.leave_context(ctx)?;
        reader.leave_context(raster)?;

        let has_alpha = (header.tex0 >> 34) & 1 != 0;
        let surface = NativeSurface {
            layout,
            mipmaps,
            palette,
            palette_entries,
            auto_mipmaps: header.raster_format & RASTER_AUTOMIPMAP != 0,
            has_alpha,
            raster_type: 4,
        };
        Ok((fields, self.create(surface, header.sky_mipmap)))
    }

    fn layout_from_header(self, header: &GsRasterHeader) -> Result<PixelLayout> {
        let format = RasterFormat::from_code(header.raster_format)?;
        let palette_type = palette_from_word(header.raster_format, PaletteType::Pal4Lsb);
        if palette_type.is_palette() {
            let entry_format = if format == RasterFormat::Format1555 {
                RasterFormat::Format1555
            } else {
                RasterFormat::Format8888
            };
            return Ok(PixelLayout::palettized(palette_type, entry_format, ColorOrdering::Rgba));
        }
        Ok(match format {
            RasterFormat::Format1555 => PixelLayout::raw(RasterFormat::Format1555, ColorOrdering::Rgba),
            RasterFormat::Format888 => gs_888(),
            RasterFormat::Format8888 => PixelLayout::raw(RasterFormat::Format8888, ColorOrdering::Rgba),
            other => {
                return Err(Error::corrupt(format!(
                    "{} rasters cannot store {other} texels",
                    self.name()
                )));
            }
        })
    }
}

/// 24-bit color kept in a 32-bit GS word.
fn gs_888() -> PixelLayout {
    PixelLayout {
        depth: 32,
        ..PixelLayout::raw(RasterFormat::Format888, ColorOrdering::Rgba)
    }
}

/// Layout of one CLUT entry.
fn entry_layout(layout: &PixelLayout) -> PixelLayout {
    PixelLayout::raw(layout.raster_format, ColorOrdering::Rgba)
}

fn psm_code(layout: &PixelLayout) -> u64 {
    match layout.palette_type {
        PaletteType::Pal8 => psm::T8,
        PaletteType::Pal4 | PaletteType::Pal4Lsb => psm::T4,
        PaletteType::None => match layout.raster_format {
            RasterFormat::Format1555 => psm::CT16,
            RasterFormat::Format888 => psm::CT24,
            _ => psm::CT32,
        },
    }
}

/// Fill the GS registers the way the RenderWare PS2 driver lays them out.
fn gs_header(surface: &NativeSurface, sky_mipmap_k: u32) -> Result<GsRasterHeader> {
    let layout = &surface.layout;
    let (width, height) = (surface.width(), surface.height());
    let levels = surface.mipmaps.len();
    let texels_size: usize = surface.mipmaps.iter().map(|m| m.data.len()).sum();
    let too_large = |_| Error::unsupported("raster too large for a GS upload");

    let tbw = u64::from((width / 64).max(1));
    let tw = u64::from(width.max(1).ilog2());
    let th = u64::from(height.max(1).ilog2());
    let tcc = u64::from(surface.has_alpha);
    let cpsm = if layout.raster_format == RasterFormat::Format1555 {
        psm::CT16
    } else {
        psm::CT32
    };
    let tex0 = (tbw << 14) | (psm_code(layout) << 20) | (tw << 26) | (th << 30) | (tcc << 34) | (cpsm << 51);
    let mxl = (levels.saturating_sub(1) as u64) & 0x7;
    let tex1 = mxl << 2;

    let texels_size = u32::try_from(texels_size).map_err(too_large)?;
    let palette_size = u32::try_from(surface.palette.len()).map_err(too_large)?;
    Ok(GsRasterHeader {
        width,
        height,
        depth: layout.depth,
        raster_format: raster_format_word(layout, levels, surface.auto_mipmaps, surface.has_alpha),
        tex0,
        tex1,
        miptbp1: 0,
        miptbp2: 0,
        texels_size,
        palette_size,
        gpu_size: texels_size + palette_size,
        sky_mipmap: sky_mipmap_k,
    })
}

/// PlayStation 2.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlayStation2Type;

impl NativeTextureType for PlayStation2Type {
    fn name(&self) -> &'static str {
        PS2_NAME
    }

    fn platform_id(&self) -> u32 {
        platform::PS2
    }

    fn device_id(&self) -> u16 {
        6
    }

    fn create_native_data(&self) -> NativeData {
        NativeData::PlayStation2(Ps2Native::default())
    }

    fn size_rules(&self, _layout: &PixelLayout) -> SizeRules {
        Console::Ps2.size_rules()
    }

    fn native_layout(&self, requested: &PixelLayout, has_alpha: bool) -> PixelLayout {
        Console::Ps2.native_layout(requested, has_alpha)
    }

    fn to_portable(&self, data: &NativeData) -> Result<PortablePixels> {
        Console::Ps2.to_portable(data)
    }

    fn from_portable(&self, pixels: PortablePixels) -> Result<NativeData> {
        Console::Ps2.from_portable(self, pixels)
    }

    fn serialize(&self, fields: &TextureFields, data: &NativeData, writer: &mut DynBlockWriter<'_>) -> Result<()> {
        Console::Ps2.serialize(fields, data, writer)
    }

    fn deserialize(&self, reader: &mut DynBlockReader<'_>) -> Result<(TextureFields, NativeData)> {
        Console::Ps2.deserialize(reader)
    }
}

/// PlayStation Portable.
#[derive(Debug, Default, Clone, Copy)]
pub struct PspType;

impl NativeTextureType for PspType {
    fn name(&self) -> &'static str {
        PSP_NAME
    }

    fn platform_id(&self) -> u32 {
        platform::PSP
    }

    fn device_id(&self) -> u16 {
        9
    }

    fn create_native_data(&self) -> NativeData {
        NativeData::Psp(PspNative::default())
    }

    fn size_rules(&self, _layout: &PixelLayout) -> SizeRules {
        Console::Psp.size_rules()
    }

    fn native_layout(&self, requested: &PixelLayout, has_alpha: bool) -> PixelLayout {
        Console::Psp.native_layout(requested, has_alpha)
    }

    fn to_portable(&self, data: &NativeData) -> Result<PortablePixels> {
        Console::Psp.to_portable(data)
    }

    fn from_portable(&self, pixels: PortablePixels) -> Result<NativeData> {
        Console::Psp.from_portable(self, pixels)
    }

    fn serialize(&self, fields: &TextureFields, data: &NativeData, writer: &mut DynBlockWriter<'_>) -> Result<()> {
        Console::Psp.serialize(fields, data, writer)
    }

    fn deserialize(&self, reader: &mut DynBlockReader<'_>) -> Result<(TextureFields, NativeData)> {
        Console::Psp.deserialize(reader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BlockReader, BlockWriter, ReadSeek, WriteSeek};
    use crate::engine::Engine;
    use crate::txd::FilterMode;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    fn serialize_round_trip(handler: &dyn NativeTextureType, data: &NativeData) -> (TextureFields, NativeData) {
        let engine = Engine::new();
        let fields = TextureFields {
            name: "road".to_string(),
            filter: FilterMode::Point,
            ..TextureFields::default()
        };
        let mut buffer = Cursor::new(Vec::new());
        {
            let stream: &mut dyn WriteSeek = &mut buffer;
            let mut writer = BlockWriter::new(stream);
            handler.serialize(&fields, data, &mut writer).unwrap();
        }
        buffer.set_position(0);
        let stream: &mut dyn ReadSeek = &mut buffer;
        let mut reader = BlockReader::new(stream, &engine);
        handler.deserialize(&mut reader).unwrap()
    }

    #[test]
    fn test_gs_alpha_is_invertible() {
        for gs in 0..=128u8 {
            assert_eq!(alpha_to_gs(alpha_from_gs(gs)), gs);
        }
        assert_eq!(alpha_to_gs(255), 128);
        assert_eq!(alpha_from_gs(128), 255);
        assert_eq!(alpha_to_gs(0), 0);
    }

    #[test]
    fn test_ps2_pal8_round_trip() {
        let mut palette = vec![[0u8, 0, 0, 255]; 256];
        palette[8] = [200, 100, 50, 255];
        palette[16] = [1, 2, 3, 0];
        let layout = PixelLayout::palettized(PaletteType::Pal8, RasterFormat::Format8888, ColorOrdering::Rgba);
        let pixels = PortablePixels {
            layout,
            mipmaps: vec![MipLevel::new(4, 4, (0..16).map(|i| if i % 2 == 0 { 8 } else { 16 }).collect())],
            palette: palette.clone(),
            auto_mipmaps: false,
            has_alpha: true,
        };
        let native = PlayStation2Type.from_portable(pixels.clone()).unwrap();
        let clut = &native.surface().palette;
        // Entry 8 sits at CSM1 slot 16 with GS alpha.
        assert_eq!(&clut[16 * 4..16 * 4 + 4], &[200, 100, 50, 128]);

        let (fields, back) = serialize_round_trip(&PlayStation2Type, &native);
        assert_eq!(fields.name, "road");
        assert_eq!(fields.filter, FilterMode::Point);
        assert_eq!(back, native);
        assert_eq!(PlayStation2Type.to_portable(&back).unwrap(), pixels);
    }

    #[test]
    fn test_ps2_mipmap_count_in_tex1() {
        let layout = PixelLayout::raw(RasterFormat::Format8888, ColorOrdering::Rgba);
        let pixels = PortablePixels {
            layout,
            mipmaps: vec![
                MipLevel::new(4, 4, [10u8, 20, 30, 255].repeat(16)),
                MipLevel::new(2, 2, [10u8, 20, 30, 255].repeat(4)),
                MipLevel::new(1, 1, vec![10, 20, 30, 255]),
            ],
            palette: Vec::new(),
            auto_mipmaps: false,
            has_alpha: false,
        };
        let native = PlayStation2Type.from_portable(pixels.clone()).unwrap();
        assert_eq!(native.surface().mipmaps[0].data[3], 128);
        let header = gs_header(native.surface(), 0).unwrap();
        assert_eq!(header.levels(), 3);

        let (_, back) = serialize_round_trip(&PlayStation2Type, &native);
        assert_eq!(PlayStation2Type.to_portable(&back).unwrap(), pixels);
    }

    #[test]
    fn test_psp_keeps_full_alpha() {
        let layout = PixelLayout::palettized(PaletteType::Pal4Lsb, RasterFormat::Format8888, ColorOrdering::Rgba);
        let mut palette = vec![[0u8; 4]; 16];
        palette[1] = [9, 9, 9, 200];
        let pixels = PortablePixels {
            layout,
            mipmaps: vec![MipLevel::new(2, 2, vec![0x10, 0x01])],
            palette,
            auto_mipmaps: false,
            has_alpha: true,
        };
        let native = PspType.from_portable(pixels.clone()).unwrap();
        assert_eq!(&native.surface().palette[4..8], &[9, 9, 9, 200]);
        let (_, back) = serialize_round_trip(&PspType, &native);
        assert_eq!(PspType.to_portable(&back).unwrap(), pixels);
    }

    #[test]
    fn test_native_layouts() {
        let pal4 = PixelLayout::palettized(PaletteType::Pal4, RasterFormat::Format8888, ColorOrdering::Rgba);
        assert_eq!(PlayStation2Type.native_layout(&pal4, true).palette_type, PaletteType::Pal4Lsb);
        let rgb565 = PixelLayout::raw(RasterFormat::Format565, ColorOrdering::Bgra);
        assert_eq!(PlayStation2Type.native_layout(&rgb565, false), gs_888());
        assert_eq!(
            PspType.native_layout(&rgb565, false),
            PixelLayout::raw(RasterFormat::Format8888, ColorOrdering::Rgba)
        );
        assert!(!PspType.size_rules(&rgb565).verify(1024, 1024));
    }
}
