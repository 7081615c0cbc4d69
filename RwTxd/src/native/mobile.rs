//! Mobile native textures
//!
//! The four mobile platforms share one payload layout and differ only in the
//! GL internal formats they accept: S3TC (DXT1/3/5), PowerVR (PVRTC),
//! AMDCompress (ATC) and plain 16/32-bit texels.

use super::{
    MobileNative, NativeData, NativeSurface, NativeTextureType, chain_dimensions, dimension_u16, dxt_for,
    ensure_native_layout, foreign_data, platform, read_common_header, write_common_header,
};
use crate::block::{DynBlockReader, DynBlockWriter, chunk};
use crate::error::{Error, Result};
use crate::raster::{
    AlphaProfile, ColorOrdering, Compression, MipLevel, PixelLayout, PortablePixels, RasterFormat, SizeRules,
};
use crate::txd::TextureFields;

pub const S3TC_NAME: &str = "S3TC_mobile";
pub const POWERVR_NAME: &str = "PowerVR";
pub const ATC_NAME: &str = "AMDCompress";
pub const UNCOMPRESSED_NAME: &str = "uncompressed_mobile";

/// GL internal formats.
pub mod gl {
    pub const COMPRESSED_RGB_S3TC_DXT1: u32 = 0x83F0;
    pub const COMPRESSED_RGBA_S3TC_DXT1: u32 = 0x83F1;
    pub const COMPRESSED_RGBA_S3TC_DXT3: u32 = 0x83F2;
    pub const COMPRESSED_RGBA_S3TC_DXT5: u32 = 0x83F3;
    pub const COMPRESSED_RGB_PVRTC_4BPP: u32 = 0x8C00;
    pub const COMPRESSED_RGB_PVRTC_2BPP: u32 = 0x8C01;
    pub const COMPRESSED_RGBA_PVRTC_4BPP: u32 = 0x8C02;
    pub const COMPRESSED_RGBA_PVRTC_2BPP: u32 = 0x8C03;
    pub const ATC_RGB: u32 = 0x8C92;
    pub const ATC_RGBA_EXPLICIT_ALPHA: u32 = 0x8C93;
    pub const ATC_RGBA_INTERPOLATED_ALPHA: u32 = 0x87EE;
    pub const RGBA: u32 = 0x1908;
    pub const UNSIGNED_SHORT_4_4_4_4: u32 = 0x8033;
    pub const UNSIGNED_SHORT_5_5_5_1: u32 = 0x8034;
    pub const UNSIGNED_SHORT_5_6_5: u32 = 0x8363;
}

const MAX_DIMENSION: u32 = 4096;
const PVR_MAX_DIMENSION: u32 = 2048;

/// Which mobile platform a handler serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flavor {
    S3tc,
    PowerVr,
    Atc,
    Uncompressed,
}

impl Flavor {
    const fn name(self) -> &'static str {
        match self {
            Self::S3tc => S3TC_NAME,
            Self::PowerVr => POWERVR_NAME,
            Self::Atc => ATC_NAME,
            Self::Uncompressed => UNCOMPRESSED_NAME,
        }
    }

    const fn platform_id(self) -> u32 {
        match self {
            Self::S3tc => platform::S3TC_MOBILE,
            Self::PowerVr => platform::POWERVR,
            Self::Atc => platform::ATC,
            Self::Uncompressed => platform::UNCOMPRESSED_MOBILE,
        }
    }

    fn wrap(self, native: MobileNative) -> NativeData {
        match self {
            Self::S3tc => NativeData::S3tcMobile(native),
            Self::PowerVr => NativeData::PowerVr(native),
            Self::Atc => NativeData::AmdCompress(native),
            Self::Uncompressed => NativeData::UncompressedMobile(native),
        }
    }

    fn unwrap(self, data: &NativeData) -> Result<&MobileNative> {
        match (self, data) {
            (Self::S3tc, NativeData::S3tcMobile(native))
            | (Self::PowerVr, NativeData::PowerVr(native))
            | (Self::Atc, NativeData::AmdCompress(native))
            | (Self::Uncompressed, NativeData::UncompressedMobile(native)) => Ok(native),
            _ => Err(foreign_data(self.name(), data)),
        }
    }

    fn size_rules(self) -> SizeRules {
        match self {
            Self::S3tc => SizeRules::any().multiple(4).with_maximum(MAX_DIMENSION),
            Self::PowerVr => SizeRules::power_of_two().squared().with_maximum(PVR_MAX_DIMENSION),
            Self::Atc => SizeRules::any().multiple(4).with_maximum(MAX_DIMENSION),
            Self::Uncompressed => SizeRules::any().with_maximum(MAX_DIMENSION),
        }
    }

    fn native_layout(self, requested: &PixelLayout, has_alpha: bool) -> PixelLayout {
        let compression = requested.compression;
        match self {
            Self::S3tc => PixelLayout::compressed(match compression {
                Compression::Dxt1 | Compression::Dxt3 | Compression::Dxt5 => compression,
                Compression::Dxt2 => Compression::Dxt3,
                Compression::Dxt4 => Compression::Dxt5,
                _ if has_alpha => Compression::Dxt5,
                _ => Compression::Dxt1,
            }),
            Self::PowerVr => PixelLayout::compressed(if compression.is_pvrtc() {
                compression
            } else if has_alpha {
                Compression::Pvrtc4Rgba
            } else {
                Compression::Pvrtc4Rgb
            }),
            Self::Atc => PixelLayout::compressed(if compression.is_atc() {
                compression
            } else if has_alpha {
                Compression::AtcInterpolatedAlpha
            } else {
                Compression::AtcRgb
            }),
            Self::Uncompressed => {
                if compression.is_compressed() || requested.palette_type.is_palette() {
                    return PixelLayout::raw(RasterFormat::Format8888, ColorOrdering::Rgba);
                }
                match requested.raster_format {
                    RasterFormat::Format4444 => PixelLayout::raw(RasterFormat::Format4444, ColorOrdering::Abgr),
                    RasterFormat::Format565 => PixelLayout::raw(RasterFormat::Format565, ColorOrdering::Bgra),
                    RasterFormat::Format1555 | RasterFormat::Format555 => {
                        PixelLayout::raw(RasterFormat::Format1555, ColorOrdering::Abgr)
                    }
                    _ => PixelLayout::raw(RasterFormat::Format8888, ColorOrdering::Rgba),
                }
            }
        }
    }

    fn compression_for(self, alpha: AlphaProfile, quality: f32) -> Option<Compression> {
        let opaque = alpha == AlphaProfile::Opaque;
        match self {
            Self::S3tc => Some(dxt_for(alpha)),
            Self::PowerVr => Some(match (quality >= 0.5, opaque) {
                (true, true) => Compression::Pvrtc4Rgb,
                (true, false) => Compression::Pvrtc4Rgba,
                (false, true) => Compression::Pvrtc2Rgb,
                (false, false) => Compression::Pvrtc2Rgba,
            }),
            Self::Atc => Some(if opaque {
                Compression::AtcRgb
            } else {
                Compression::AtcInterpolatedAlpha
            }),
            Self::Uncompressed => None,
        }
    }

    fn image_formats(self) -> &'static [&'static str] {
        match self {
            Self::S3tc | Self::Uncompressed => &["DDS"],
            Self::PowerVr => &["PVR"],
            Self::Atc => &[],
        }
    }

    fn to_portable(self, data: &NativeData) -> Result<PortablePixels> {
        let surface = &self.unwrap(data)?.surface;
        if surface.mipmaps.is_empty() {
            return Err(Error::RasterEmpty);
        }
        Ok(PortablePixels {
            layout: surface.layout,
            mipmaps: surface.mipmaps.clone(),
            palette: Vec::new(),
            auto_mipmaps: surface.auto_mipmaps,
            has_alpha: surface.has_alpha,
        })
    }

    fn from_portable(self, handler: &dyn NativeTextureType, pixels: PortablePixels) -> Result<NativeData> {
        ensure_native_layout(handler, &pixels)?;
        let internal_format = internal_format_of(&pixels.layout, pixels.has_alpha)?;
        Ok(self.wrap(MobileNative {
            surface: NativeSurface {
                layout: pixels.layout,
                mipmaps: pixels.mipmaps,
                palette: Vec::new(),
                palette_entries: 0,
                auto_mipmaps: pixels.auto_mipmaps,
                has_alpha: pixels.has_alpha,
                raster_type: 4,
            },
            internal_format,
        }))
    }

    fn serialize(self, fields: &TextureFields, data: &NativeData, writer: &mut DynBlockWriter<'_>) -> Result<()> {
        let native = self.unwrap(data)?;
        let surface = &native.surface;
        let data_size: usize = surface.mipmaps.iter().map(|m| 4 + m.data.len()).sum();
        let too_large = |_| Error::unsupported("raster too large");

        let ctx = writer.enter_context(chunk::STRUCT, writer.block_version().unwrap_or_default())?;
        write_common_header(writer, self.platform_id(), fields)?;
        writer.write_u8(u8::try_from(surface.mipmaps.len()).map_err(|_| Error::unsupported("more than 255 mipmap levels"))?)?;
        writer.write_u8(0)?;
        writer.write_u8(u8::from(surface.has_alpha))?;
        writer.write_u8(0)?;
        writer.write_u16(dimension_u16(surface.width())?)?;
        writer.write_u16(dimension_u16(surface.height())?)?;
        writer.write_u32(native.internal_format)?;
        writer.write_u32(u32::try_from(data_size).map_err(too_large)?)?;
        for level in &surface.mipmaps {
            writer.write_u32(u32::try_from(level.data.len()).map_err(too_large)?)?;
            writer.write_bytes(&level.data)?;
        }
        writer.leave_context(ctx)
    }

    fn deserialize(self, reader: &mut DynBlockReader<'_>) -> Result<(TextureFields, NativeData)> {
        let ctx = reader.enter_context_expect(chunk::STRUCT)?;
        let fields = read_common_header(reader, self.platform_id())?;
        let levels = usize::from(reader.read_u8()?);
        let _unknown = reader.read_u8()?;
        let has_alpha = reader.read_u8()? != 0;
        let _padding = reader.read_u8()?;
        let width = u32::from(reader.read_u16()?);
        let height = u32::from(reader.read_u16()?);
        let internal_format = reader.read_u32()?;
        let _data_size = reader.read_u32()?;

        if width == 0 || height == 0 || levels == 0 {
            return Err(Error::corrupt(format!(
                "{} raster {width}x{height} with {levels} levels",
                self.name()
            )));
        }
        let layout = layout_of_internal_format(internal_format).ok_or_else(|| {
            Error::corrupt(format!("unknown GL internal format 0x{internal_format:04X}"))
        })?;
        if !self.native_layout(&layout, has_alpha).same_encoding(&layout) {
            return Err(Error::corrupt(format!(
                "{} raster stores foreign format {layout}",
                self.name()
            )));
        }

        let mut mipmaps = Vec::with_capacity(levels);
        for (index, (w, h)) in chain_dimensions(width, height, levels).into_iter().enumerate() {
            let size = reader.read_u32()? as usize;
            let needed = layout.surface_size(w, h);
            if size < needed {
                return Err(Error::corrupt(format!(
                    "mipmap {index} ({w}x{h}) stores {size} bytes, needs {needed}"
                )));
            }
            let mut data = reader.read_bytes(size)?;
            data.truncate(needed);
            mipmaps.push(MipLevel::new(w, h, data));
        }
        reader.leave_context(ctx)?;

        let native = MobileNative {
            surface: NativeSurface {
                layout,
                mipmaps,
                palette: Vec::new(),
                palette_entries: 0,
                auto_mipmaps: false,
                has_alpha,
                raster_type: 4,
            },
            internal_format,
        };
        Ok((fields, self.wrap(native)))
    }
}

/// GL internal format for a layout.
fn internal_format_of(layout: &PixelLayout, has_alpha: bool) -> Result<u32> {
    Ok(match layout.compression {
        Compression::Dxt1 if has_alpha => gl::COMPRESSED_RGBA_S3TC_DXT1,
        Compression::Dxt1 => gl::COMPRESSED_RGB_S3TC_DXT1,
        Compression::Dxt3 => gl::COMPRESSED_RGBA_S3TC_DXT3,
        Compression::Dxt5 => gl::COMPRESSED_RGBA_S3TC_DXT5,
        Compression::Pvrtc4Rgb => gl::COMPRESSED_RGB_PVRTC_4BPP,
        Compression::Pvrtc2Rgb => gl::COMPRESSED_RGB_PVRTC_2BPP,
        Compression::Pvrtc4Rgba => gl::COMPRESSED_RGBA_PVRTC_4BPP,
        Compression::Pvrtc2Rgba => gl::COMPRESSED_RGBA_PVRTC_2BPP,
        Compression::AtcRgb => gl::ATC_RGB,
        Compression::AtcExplicitAlpha => gl::ATC_RGBA_EXPLICIT_ALPHA,
        Compression::AtcInterpolatedAlpha => gl::ATC_RGBA_INTERPOLATED_ALPHA,
        Compression::Dxt2 | Compression::Dxt4 => {
            return Err(Error::unsupported(format!("{} has no GL format", layout.compression)));
        }
        Compression::None => match layout.raster_format {
            RasterFormat::Format8888 => gl::RGBA,
            RasterFormat::Format4444 => gl::UNSIGNED_SHORT_4_4_4_4,
            RasterFormat::Format565 => gl::UNSIGNED_SHORT_5_6_5,
            RasterFormat::Format1555 => gl::UNSIGNED_SHORT_5_5_5_1,
            other => return Err(Error::unsupported(format!("{other} has no GL format"))),
        },
    })
}

fn layout_of_internal_format(code: u32) -> Option<PixelLayout> {
    let compressed = |c| Some(PixelLayout::compressed(c));
    match code {
        gl::COMPRESSED_RGB_S3TC_DXT1 | gl::COMPRESSED_RGBA_S3TC_DXT1 => compressed(Compression::Dxt1),
        gl::COMPRESSED_RGBA_S3TC_DXT3 => compressed(Compression::Dxt3),
        gl::COMPRESSED_RGBA_S3TC_DXT5 => compressed(Compression::Dxt5),
        gl::COMPRESSED_RGB_PVRTC_4BPP => compressed(Compression::Pvrtc4Rgb),
        gl::COMPRESSED_RGB_PVRTC_2BPP => compressed(Compression::Pvrtc2Rgb),
        gl::COMPRESSED_RGBA_PVRTC_4BPP => compressed(Compression::Pvrtc4Rgba),
        gl::COMPRESSED_RGBA_PVRTC_2BPP => compressed(Compression::Pvrtc2Rgba),
        gl::ATC_RGB => compressed(Compression::AtcRgb),
        gl::ATC_RGBA_EXPLICIT_ALPHA => compressed(Compression::AtcExplicitAlpha),
        gl::ATC_RGBA_INTERPOLATED_ALPHA => compressed(Compression::AtcInterpolatedAlpha),
        gl::RGBA => Some(PixelLayout::raw(RasterFormat::Format8888, ColorOrdering::Rgba)),
        gl::UNSIGNED_SHORT_4_4_4_4 => Some(PixelLayout::raw(RasterFormat::Format4444, ColorOrdering::Abgr)),
        gl::UNSIGNED_SHORT_5_6_5 => Some(PixelLayout::raw(RasterFormat::Format565, ColorOrdering::Bgra)),
        gl::UNSIGNED_SHORT_5_5_5_1 => Some(PixelLayout::raw(RasterFormat::Format1555, ColorOrdering::Abgr)),
        _ => None,
    }
}

macro_rules! mobile_type {
    ($(#[$meta:meta])* $name:ident, $flavor:expr, $variant:ident) => {
        $(#[$meta])*
        #[derive(Debug, Default, Clone, Copy)]
        pub struct $name;

        impl NativeTextureType for $name {
            fn name(&self) -> &'static str {
                $flavor.name()
            }

            fn platform_id(&self) -> u32 {
                $flavor.platform_id()
            }

            fn create_native_data(&self) -> NativeData {
                NativeData::$variant(MobileNative::default())
            }

            fn size_rules(&self, _layout: &PixelLayout) -> SizeRules {
                $flavor.size_rules()
            }

            fn native_layout(&self, requested: &PixelLayout, has_alpha: bool) -> PixelLayout {
                $flavor.native_layout(requested, has_alpha)
            }

            fn compression_for(&self, alpha: AlphaProfile, quality: f32) -> Option<Compression> {
                $flavor.compression_for(alpha, quality)
            }

            fn image_formats(&self) -> &'static [&'static str] {
                $flavor.image_formats()
            }

            fn to_portable(&self, data: &NativeData) -> Result<PortablePixels> {
                $flavor.to_portable(data)
            }

            fn from_portable(&self, pixels: PortablePixels) -> Result<NativeData> {
                $flavor.from_portable(self, pixels)
            }

            fn serialize(
                &self,
                fields: &TextureFields,
                data: &NativeData,
                writer: &mut DynBlockWriter<'_>,
            ) -> Result<()> {
                $flavor.serialize(fields, data, writer)
            }

            fn deserialize(&self, reader: &mut DynBlockReader<'_>) -> Result<(TextureFields, NativeData)> {
                $flavor.deserialize(reader)
            }
        }
    };
}

mobile_type!(
    /// DXT-compressed textures for GL ES devices with S3TC.
    S3tcMobileType, Flavor::S3tc, S3tcMobile
);
mobile_type!(
    /// PVRTC textures for PowerVR GPUs.
    PowerVrType, Flavor::PowerVr, PowerVr
);
mobile_type!(
    /// ATC textures for Adreno GPUs.
    AmdCompressType, Flavor::Atc, AmdCompress
);
mobile_type!(
    /// Uncompressed 16/32-bit GL ES textures.
    UncompressedMobileType, Flavor::Uncompressed, UncompressedMobile
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BlockReader, BlockWriter, ReadSeek, WriteSeek};
    use crate::engine::Engine;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    fn serialize_round_trip(handler: &dyn NativeTextureType, data: &NativeData) -> NativeData {
        let engine = Engine::new();
        let mut buffer = Cursor::new(Vec::new());
        {
            let stream: &mut dyn WriteSeek = &mut buffer;
            let mut writer = BlockWriter::new(stream);
            handler
                .serialize(&TextureFields::default(), data, &mut writer)
                .unwrap();
        }
        buffer.set_position(0);
        let stream: &mut dyn ReadSeek = &mut buffer;
        let mut reader = BlockReader::new(stream, &engine);
        handler.deserialize(&mut reader).unwrap().1
    }

    #[test]
    fn test_s3tc_maps_dxt2_and_raw() {
        let dxt2 = PixelLayout::compressed(Compression::Dxt2);
        assert_eq!(S3tcMobileType.native_layout(&dxt2, true).compression, Compression::Dxt3);
        let raw = PixelLayout::rgba8888();
        assert_eq!(S3tcMobileType.native_layout(&raw, false).compression, Compression::Dxt1);
        assert_eq!(S3tcMobileType.native_layout(&raw, true).compression, Compression::Dxt5);
        assert!(!S3tcMobileType.supports_compression(Compression::Dxt4));
    }

    #[test]
    fn test_pvr_rules_and_heuristic() {
        let rules = PowerVrType.size_rules(&PixelLayout::compressed(Compression::Pvrtc4Rgb));
        assert!(rules.verify(64, 64));
        assert!(!rules.verify(64, 32));
        assert_eq!(
            PowerVrType.compression_for(AlphaProfile::Opaque, 0.9),
            Some(Compression::Pvrtc4Rgb)
        );
        assert_eq!(
            PowerVrType.compression_for(AlphaProfile::Smooth, 0.2),
            Some(Compression::Pvrtc2Rgba)
        );
        assert_eq!(UncompressedMobileType.compression_for(AlphaProfile::Opaque, 1.0), None);
    }

    #[test]
    fn test_atc_serialize_round_trip() {
        let pixels = PortablePixels {
            layout: PixelLayout::compressed(Compression::AtcInterpolatedAlpha),
            mipmaps: vec![
                MipLevel::new(8, 4, vec![0x5A; 32]),
                MipLevel::new(4, 2, vec![0x33; 16]),
                MipLevel::new(2, 1, vec![0x11; 16]),
                MipLevel::new(1, 1, vec![0x22; 16]),
            ],
            palette: Vec::new(),
            auto_mipmaps: false,
            has_alpha: true,
        };
        let native = AmdCompressType.from_portable(pixels.clone()).unwrap();
        assert_eq!(
            Flavor::Atc.unwrap(&native).unwrap().internal_format,
            gl::ATC_RGBA_INTERPOLATED_ALPHA
        );
        let back = serialize_round_trip(&AmdCompressType, &native);
        assert_eq!(back, native);
        assert_eq!(AmdCompressType.to_portable(&back).unwrap(), pixels);
    }

    #[test]
    fn test_uncompressed_gl_layouts() {
        let pixels = PortablePixels {
            layout: PixelLayout::raw(RasterFormat::Format4444, ColorOrdering::Abgr),
            mipmaps: vec![MipLevel::new(2, 2, vec![0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC, 0xDE, 0xF0])],
            palette: Vec::new(),
            auto_mipmaps: false,
            has_alpha: true,
        };
        let native = UncompressedMobileType.from_portable(pixels.clone()).unwrap();
        let back = serialize_round_trip(&UncompressedMobileType, &native);
        assert_eq!(UncompressedMobileType.to_portable(&back).unwrap(), pixels);

        // Foreign layouts must be adapted first.
        let bgra = PortablePixels {
            layout: PixelLayout::raw(RasterFormat::Format4444, ColorOrdering::Bgra),
            ..pixels
        };
        assert!(UncompressedMobileType.from_portable(bgra).is_err());
    }
}
