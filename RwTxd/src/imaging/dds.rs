//! DirectDraw Surface files
//!
//! DDS keeps block-compressed and packed texel data verbatim, so a DXT raster
//! goes in and out without a lossy round trip. Only the first surface of
//! volume and cube textures is read.

use std::io::Cursor;

use ddsfile::{D3DFormat, Dds, DxgiFormat, NewD3dParams};

use super::{DecodedImage, ImageFormat, ImageFormatDescriptor};
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::native::{D3D9_NAME, chain_dimensions};
use crate::raster::pixel::encode_surface;
use crate::raster::{
    ColorOrdering, Compression, MipLevel, PaletteType, PixelLayout, PortablePixels, Raster, RasterFormat,
};

const NAME: &str = "DDS";

const DESCRIPTOR: ImageFormatDescriptor = ImageFormatDescriptor {
    name: NAME,
    default_extension: "dds",
    extensions: &["dds"],
    is_native: true,
};

/// DDS files backed by `ddsfile`.
pub struct DdsFormat;

fn bgra(format: RasterFormat) -> PixelLayout {
    PixelLayout::raw(format, ColorOrdering::Bgra)
}

fn with_depth(mut layout: PixelLayout, depth: u32) -> PixelLayout {
    layout.depth = depth;
    layout
}

fn layout_for_d3d(format: D3DFormat) -> Option<PixelLayout> {
    let layout = match format {
        D3DFormat::DXT1 => PixelLayout::compressed(Compression::Dxt1),
        D3DFormat::DXT2 => PixelLayout::compressed(Compression::Dxt2),
        D3DFormat::DXT3 => PixelLayout::compressed(Compression::Dxt3),
        D3DFormat::DXT4 => PixelLayout::compressed(Compression::Dxt4),
        D3DFormat::DXT5 => PixelLayout::compressed(Compression::Dxt5),
        D3DFormat::A8R8G8B8 => bgra(RasterFormat::Format8888),
        D3DFormat::A8B8G8R8 => PixelLayout::raw(RasterFormat::Format8888, ColorOrdering::Rgba),
        D3DFormat::X8R8G8B8 => with_depth(bgra(RasterFormat::Format888), 32),
        D3DFormat::R8G8B8 => bgra(RasterFormat::Format888),
        D3DFormat::R5G6B5 => bgra(RasterFormat::Format565),
        D3DFormat::A1R5G5B5 => bgra(RasterFormat::Format1555),
        D3DFormat::X1R5G5B5 => bgra(RasterFormat::Format555),
        D3DFormat::A4R4G4B4 => bgra(RasterFormat::Format4444),
        D3DFormat::L8 => PixelLayout::raw(RasterFormat::Lum8, ColorOrdering::Rgba),
        D3DFormat::A8L8 => PixelLayout::raw(RasterFormat::LumAlpha, ColorOrdering::Rgba),
        _ => return None,
    };
    Some(layout)
}

fn layout_for_dxgi(format: DxgiFormat) -> Option<PixelLayout> {
    let layout = match format {
        DxgiFormat::BC1_UNorm | DxgiFormat::BC1_UNorm_sRGB => PixelLayout::compressed(Compression::Dxt1),
        DxgiFormat::BC2_UNorm | DxgiFormat::BC2_UNorm_sRGB => PixelLayout::compressed(Compression::Dxt3),
        DxgiFormat::BC3_UNorm | DxgiFormat::BC3_UNorm_sRGB => PixelLayout::compressed(Compression::Dxt5),
        DxgiFormat::R8G8B8A8_UNorm | DxgiFormat::R8G8B8A8_UNorm_sRGB => {
            PixelLayout::raw(RasterFormat::Format8888, ColorOrdering::Rgba)
        }
        DxgiFormat::B8G8R8A8_UNorm | DxgiFormat::B8G8R8A8_UNorm_sRGB => bgra(RasterFormat::Format8888),
        DxgiFormat::B8G8R8X8_UNorm | DxgiFormat::B8G8R8X8_UNorm_sRGB => {
            with_depth(bgra(RasterFormat::Format888), 32)
        }
        DxgiFormat::B5G6R5_UNorm => bgra(RasterFormat::Format565),
        DxgiFormat::B5G5R5A1_UNorm => bgra(RasterFormat::Format1555),
        _ => return None,
    };
    Some(layout)
}

/// D3D format that stores `layout` without a transcode.
fn d3d_format_for(layout: &PixelLayout) -> Option<D3DFormat> {
    if layout.palette_type != PaletteType::None {
        return None;
    }
    match layout.compression {
        Compression::Dxt1 => return Some(D3DFormat::DXT1),
        Compression::Dxt2 => return Some(D3DFormat::DXT2),
        Compression::Dxt3 => return Some(D3DFormat::DXT3),
        Compression::Dxt4 => return Some(D3DFormat::DXT4),
        Compression::Dxt5 => return Some(D3DFormat::DXT5),
        Compression::None => {}
        _ => return None,
    }
    let bgra = layout.color_order == ColorOrdering::Bgra;
    match (layout.raster_format, layout.depth) {
        (RasterFormat::Format8888, 32) if bgra => Some(D3DFormat::A8R8G8B8),
        (RasterFormat::Format8888, 32) if layout.color_order == ColorOrdering::Rgba => {
            Some(D3DFormat::A8B8G8R8)
        }
        (RasterFormat::Format888, 32) if bgra => Some(D3DFormat::X8R8G8B8),
        (RasterFormat::Format888, 24) if bgra => Some(D3DFormat::R8G8B8),
        (RasterFormat::Format565, 16) if bgra => Some(D3DFormat::R5G6B5),
        (RasterFormat::Format1555, 16) if bgra => Some(D3DFormat::A1R5G5B5),
        (RasterFormat::Format555, 16) if bgra => Some(D3DFormat::X1R5G5B5),
        (RasterFormat::Format4444, 16) if bgra => Some(D3DFormat::A4R4G4B4),
        (RasterFormat::Lum8, 8) => Some(D3DFormat::L8),
        (RasterFormat::LumAlpha, 16) => Some(D3DFormat::A8L8),
        _ => None,
    }
}

/// Split the concatenated surface data of a DDS layer into mipmap levels.
fn split_levels(layout: &PixelLayout, width: u32, height: u32, levels: usize, data: &[u8]) -> Result<Vec<MipLevel>> {
    let mut offset = 0;
    let mut mipmaps = Vec::with_capacity(levels);
    for (w, h) in chain_dimensions(width, height, levels) {
        let size = layout.surface_size(w, h);
        let Some(bytes) = data.get(offset..offset + size) else {
            if mipmaps.is_empty() {
                return Err(Error::decode_failed(NAME, "surface data is truncated"));
            }
            tracing::debug!("DDS mipmap chain cut short at {}x{}", w, h);
            break;
        };
        mipmaps.push(MipLevel::new(w, h, bytes.to_vec()));
        offset += size;
    }
    Ok(mipmaps)
}

impl ImageFormat for DdsFormat {
    fn descriptor(&self) -> &ImageFormatDescriptor {
        &DESCRIPTOR
    }

    fn probe(&self, data: &[u8]) -> bool {
        data.starts_with(b"DDS ")
    }

    fn decode(&self, _engine: &Engine, data: &[u8]) -> Result<DecodedImage> {
        let dds = Dds::read(&mut Cursor::new(data)).map_err(|e| Error::decode_failed(NAME, e.to_string()))?;
        let (width, height) = (dds.get_width(), dds.get_height());

        let layout = if let Some(dxgi) = dds.get_dxgi_format() {
            layout_for_dxgi(dxgi).ok_or_else(|| Error::decode_failed(NAME, format!("unsupported DXGI format {dxgi:?}")))?
        } else if let Some(d3d) = dds.get_d3d_format() {
            layout_for_d3d(d3d).ok_or_else(|| Error::decode_failed(NAME, format!("unsupported D3D format {d3d:?}")))?
        } else {
            return Err(Error::decode_failed(NAME, "unknown pixel format"));
        };

        let surface = dds
            .get_data(0)
            .map_err(|e| Error::decode_failed(NAME, format!("no surface data: {e}")))?;
        let levels = dds.get_num_mipmap_levels().max(1) as usize;
        let mipmaps = split_levels(&layout, width, height, levels, surface)?;

        let mut pixels = PortablePixels {
            layout,
            mipmaps,
            palette: Vec::new(),
            auto_mipmaps: false,
            has_alpha: false,
        };
        pixels.has_alpha = pixels.compute_has_alpha()?;
        tracing::debug!("decoded {}x{} DDS ({}, {} levels)", width, height, layout, pixels.mipmaps.len());
        Ok(DecodedImage::native(pixels, D3D9_NAME))
    }

    fn encode(&self, raster: &Raster) -> Result<Vec<u8>> {
        let pixels = raster.portable_pixels()?;
        let (format, levels) = match d3d_format_for(&pixels.layout) {
            Some(format) => (format, pixels.mipmaps),
            None => {
                let target = bgra(RasterFormat::Format8888);
                let levels = pixels
                    .decode_all()?
                    .into_iter()
                    .map(|level| {
                        encode_surface(&target, level.width, level.height, &level.data)
                            .map(|data| MipLevel::new(level.width, level.height, data))
                    })
                    .collect::<Result<Vec<_>>>()?;
                (D3DFormat::A8R8G8B8, levels)
            }
        };
        let (width, height) = levels
            .first()
            .map(|l| (l.width, l.height))
            .ok_or(Error::RasterEmpty)?;

        let mut dds = Dds::new_d3d(NewD3dParams {
            height,
            width,
            depth: None,
            format,
            mipmap_levels: Some(levels.len() as u32),
            caps2: None,
        })
        .map_err(|e| Error::encode_failed(NAME, e.to_string()))?;

        let surface = dds
            .get_mut_data(0)
            .map_err(|e| Error::encode_failed(NAME, e.to_string()))?;
        let mut offset = 0;
        for level in &levels {
            let end = offset + level.data.len();
            let target = surface
                .get_mut(offset..end)
                .ok_or_else(|| Error::encode_failed(NAME, "surface buffer is smaller than the mipmap chain"))?;
            target.copy_from_slice(&level.data);
            offset = end;
        }

        let mut output = Vec::new();
        dds.write(&mut output)
            .map_err(|e| Error::encode_failed(NAME, e.to_string()))?;
        Ok(output)
    }
}
