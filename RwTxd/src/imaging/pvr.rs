//! PowerVR texture container (version 3)

use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::{DecodedImage, ImageFormat, ImageFormatDescriptor};
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::native::{POWERVR_NAME, S3TC_NAME, UNCOMPRESSED_NAME, chain_dimensions};
use crate::raster::pixel::encode_surface;
use crate::raster::{
    ColorOrdering, Compression, MipLevel, PaletteType, PixelLayout, PortablePixels, Raster, RasterFormat,
};

const NAME: &str = "PVR";

const DESCRIPTOR: ImageFormatDescriptor = ImageFormatDescriptor {
    name: NAME,
    default_extension: "pvr",
    extensions: &["pvr"],
    is_native: true,
};

/// `"PVR\x03"`
const PVR3_MAGIC: u32 = 0x0352_5650;
const HEADER_SIZE: usize = 52;

const PVRTC_2BPP_RGB: u64 = 0;
const PVRTC_2BPP_RGBA: u64 = 1;
const PVRTC_4BPP_RGB: u64 = 2;
const PVRTC_4BPP_RGBA: u64 = 3;
const DXT1: u64 = 7;
const DXT3: u64 = 9;
const DXT5: u64 = 11;

/// Uncompressed pixel format: channel names in the low dword, bit counts in the high one.
const fn packed(channels: [u8; 4], bits: [u8; 4]) -> u64 {
    ((u32::from_le_bytes(bits) as u64) << 32) | u32::from_le_bytes(channels) as u64
}

const RGBA_8888: u64 = packed(*b"rgba", [8, 8, 8, 8]);
const RGBA_4444: u64 = packed(*b"rgba", [4, 4, 4, 4]);
const RGBA_5551: u64 = packed(*b"rgba", [5, 5, 5, 1]);
const RGB_565: u64 = packed(*b"rgb\0", [5, 6, 5, 0]);

/// PVR files holding PVRTC, DXT or packed RGBA data.
pub struct PvrFormat;

/// Layout and owning platform of a PVR pixel format.
fn layout_for(pixel_format: u64) -> Option<(PixelLayout, &'static str)> {
    let mapped = match pixel_format {
        PVRTC_2BPP_RGB => (PixelLayout::compressed(Compression::Pvrtc2Rgb), POWERVR_NAME),
        PVRTC_2BPP_RGBA => (PixelLayout::compressed(Compression::Pvrtc2Rgba), POWERVR_NAME),
        PVRTC_4BPP_RGB => (PixelLayout::compressed(Compression::Pvrtc4Rgb), POWERVR_NAME),
        PVRTC_4BPP_RGBA => (PixelLayout::compressed(Compression::Pvrtc4Rgba), POWERVR_NAME),
        DXT1 => (PixelLayout::compressed(Compression::Dxt1), S3TC_NAME),
        DXT3 => (PixelLayout::compressed(Compression::Dxt3), S3TC_NAME),
        DXT5 => (PixelLayout::compressed(Compression::Dxt5), S3TC_NAME),
        RGBA_8888 => (
            PixelLayout::raw(RasterFormat::Format8888, ColorOrdering::Rgba),
            UNCOMPRESSED_NAME,
        ),
        RGBA_4444 => (
            PixelLayout::raw(RasterFormat::Format4444, ColorOrdering::Abgr),
            UNCOMPRESSED_NAME,
        ),
        RGBA_5551 => (
            PixelLayout::raw(RasterFormat::Format1555, ColorOrdering::Abgr),
            UNCOMPRESSED_NAME,
        ),
        RGB_565 => (
            PixelLayout::raw(RasterFormat::Format565, ColorOrdering::Bgra),
            UNCOMPRESSED_NAME,
        ),
        _ => return None,
    };
    Some(mapped)
}

fn pixel_format_for(layout: &PixelLayout) -> Option<u64> {
    if layout.palette_type != PaletteType::None {
        return None;
    }
    match layout.compression {
        Compression::Pvrtc2Rgb => Some(PVRTC_2BPP_RGB),
        Compression::Pvrtc2Rgba => Some(PVRTC_2BPP_RGBA),
        Compression::Pvrtc4Rgb => Some(PVRTC_4BPP_RGB),
        Compression::Pvrtc4Rgba => Some(PVRTC_4BPP_RGBA),
        Compression::Dxt1 => Some(DXT1),
        Compression::Dxt3 => Some(DXT3),
        Compression::Dxt5 => Some(DXT5),
        Compression::None => match (layout.raster_format, layout.color_order) {
            (RasterFormat::Format8888, ColorOrdering::Rgba) => Some(RGBA_8888),
            (RasterFormat::Format4444, ColorOrdering::Abgr) => Some(RGBA_4444),
            (RasterFormat::Format1555, ColorOrdering::Abgr) => Some(RGBA_5551),
            (RasterFormat::Format565, ColorOrdering::Bgra) => Some(RGB_565),
            _ => None,
        },
        _ => None,
    }
}

struct PvrHeader {
    pixel_format: u64,
    width: u32,
    height: u32,
    surfaces: u32,
    faces: u32,
    mip_count: u32,
    metadata_size: u32,
}

fn read_header(cursor: &mut Cursor<&[u8]>) -> std::io::Result<PvrHeader> {
    let _flags = cursor.read_u32::<LittleEndian>()?;
    let pixel_format = cursor.read_u64::<LittleEndian>()?;
    let _color_space = cursor.read_u32::<LittleEndian>()?;
    let _channel_type = cursor.read_u32::<LittleEndian>()?;
    let height = cursor.read_u32::<LittleEndian>()?;
    let width = cursor.read_u32::<LittleEndian>()?;
    let _depth = cursor.read_u32::<LittleEndian>()?;
    let surfaces = cursor.read_u32::<LittleEndian>()?;
    let faces = cursor.read_u32::<LittleEndian>()?;
    let mip_count = cursor.read_u32::<LittleEndian>()?;
    let metadata_size = cursor.read_u32::<LittleEndian>()?;
    Ok(PvrHeader {
        pixel_format,
        width,
        height,
        surfaces,
        faces,
        mip_count,
        metadata_size,
    })
}

impl ImageFormat for PvrFormat {
    fn descriptor(&self) -> &ImageFormatDescriptor {
        &DESCRIPTOR
    }

    fn probe(&self, data: &[u8]) -> bool {
        data.len() >= HEADER_SIZE && data[..4] == PVR3_MAGIC.to_le_bytes()
    }

    fn decode(&self, _engine: &Engine, data: &[u8]) -> Result<DecodedImage> {
        if !self.probe(data) {
            return Err(Error::decode_failed(NAME, "missing PVR3 header"));
        }
        let mut cursor = Cursor::new(data);
        cursor.set_position(4);
        let header = read_header(&mut cursor).map_err(|e| Error::decode_failed(NAME, e.to_string()))?;
        let (layout, platform) = layout_for(header.pixel_format)
            .ok_or_else(|| Error::decode_failed(NAME, format!("unsupported pixel format 0x{:016X}", header.pixel_format)))?;
        if header.width == 0 || header.height == 0 {
            return Err(Error::decode_failed(NAME, "zero-sized texture"));
        }
        cursor.set_position(cursor.position() + u64::from(header.metadata_size));

        // Levels are stored largest first; every level holds all surfaces and faces.
        let copies = header.surfaces.max(1) as usize * header.faces.max(1) as usize;
        let mut mipmaps = Vec::new();
        for (width, height) in chain_dimensions(header.width, header.height, header.mip_count.max(1) as usize) {
            let size = layout.surface_size(width, height);
            let mut level = vec![0; size];
            if cursor.read_exact(&mut level).is_err() {
                if mipmaps.is_empty() {
                    return Err(Error::decode_failed(NAME, "texel data is truncated"));
                }
                break;
            }
            cursor.set_position(cursor.position() + (size * (copies - 1)) as u64);
            mipmaps.push(MipLevel::new(width, height, level));
        }

        let mut pixels = PortablePixels {
            layout,
            mipmaps,
            palette: Vec::new(),
            auto_mipmaps: false,
            has_alpha: false,
        };
        pixels.has_alpha = pixels.compute_has_alpha()?;
        Ok(DecodedImage::native(pixels, platform))
    }

    fn encode(&self, raster: &Raster) -> Result<Vec<u8>> {
        let pixels = raster.portable_pixels()?;
        let (pixel_format, levels) = match pixel_format_for(&pixels.layout) {
            Some(format) => (format, pixels.mipmaps),
            None => {
                let target = PixelLayout::rgba8888();
                let levels = pixels
                    .decode_all()?
                    .into_iter()
                    .map(|level| {
                        encode_surface(&target, level.width, level.height, &level.data)
                            .map(|data| MipLevel::new(level.width, level.height, data))
                    })
                    .collect::<Result<Vec<_>>>()?;
                (RGBA_8888, levels)
            }
        };
        let (width, height) = levels
            .first()
            .map(|l| (l.width, l.height))
            .ok_or(Error::RasterEmpty)?;

        let body: usize = levels.iter().map(|l| l.data.len()).sum();
        let mut output = Vec::with_capacity(HEADER_SIZE + body);
        output.write_u32::<LittleEndian>(PVR3_MAGIC)?;
        output.write_u32::<LittleEndian>(0)?;
        output.write_u64::<LittleEndian>(pixel_format)?;
        output.write_u32::<LittleEndian>(0)?;
        output.write_u32::<LittleEndian>(0)?;
        output.write_u32::<LittleEndian>(height)?;
        output.write_u32::<LittleEndian>(width)?;
        output.write_u32::<LittleEndian>(1)?;
        output.write_u32::<LittleEndian>(1)?;
        output.write_u32::<LittleEndian>(1)?;
        output.write_u32::<LittleEndian>(levels.len() as u32)?;
        output.write_u32::<LittleEndian>(0)?;
        for level in &levels {
            output.extend_from_slice(&level.data);
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_pvrtc_raster_round_trip() {
        let engine = Engine::new();
        let raster = engine.create_raster();
        let rgba: Vec<u8> = (0..32 * 32).flat_map(|i: u32| [(i % 251) as u8, 90, 30, 255]).collect();
        raster
            .install_pixels(POWERVR_NAME, PortablePixels::from_rgba(32, 32, rgba))
            .unwrap();
        assert!(raster.supports_image_method("PVR"));
        let before = raster.portable_pixels().unwrap();

        let bytes = PvrFormat.encode(&raster).unwrap();
        assert!(PvrFormat.probe(&bytes));
        let decoded = PvrFormat.decode(&engine, &bytes).unwrap();
        assert_eq!(decoded.native_type, Some(POWERVR_NAME));
        assert_eq!(decoded.pixels.layout, before.layout);
        assert_eq!(decoded.pixels.mipmaps, before.mipmaps);
    }

    #[test]
    fn test_uncompressed_formats_map_both_ways() {
        for format in [RGBA_8888, RGBA_4444, RGBA_5551, RGB_565, DXT5, PVRTC_2BPP_RGB] {
            let (layout, _) = layout_for(format).unwrap();
            assert_eq!(pixel_format_for(&layout), Some(format));
        }
        assert_eq!(RGBA_8888, 0x0808_0808_6162_6772);
    }

    #[test]
    fn test_truncated_file_is_rejected() {
        let engine = Engine::new();
        let mut bytes = PVR3_MAGIC.to_le_bytes().to_vec();
        bytes.resize(HEADER_SIZE, 0);
        // 4x4 RGBA8888 with no texel data
        bytes[8..16].copy_from_slice(&RGBA_8888.to_le_bytes());
        bytes[24..28].copy_from_slice(&4u32.to_le_bytes());
        bytes[28..32].copy_from_slice(&4u32.to_le_bytes());
        assert!(PvrFormat.decode(&engine, &bytes).is_err());
    }
}
