//! PNG, BMP and TGA through the `image` crate

use std::io::Cursor;

use image::{ImageFormat as ImageCrateFormat, RgbaImage};

use super::{DecodedImage, ImageFormat, ImageFormatDescriptor};
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::raster::{PortablePixels, Raster};

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// A bitmap format handled by the `image` crate.
pub struct GenericImageFormat {
    descriptor: ImageFormatDescriptor,
    format: ImageCrateFormat,
}

impl GenericImageFormat {
    #[must_use]
    pub fn png() -> Self {
        Self {
            descriptor: ImageFormatDescriptor {
                name: "PNG",
                default_extension: "png",
                extensions: &["png"],
                is_native: false,
            },
            format: ImageCrateFormat::Png,
        }
    }

    #[must_use]
    pub fn bmp() -> Self {
        Self {
            descriptor: ImageFormatDescriptor {
                name: "BMP",
                default_extension: "bmp",
                extensions: &["bmp", "dib"],
                is_native: false,
            },
            format: ImageCrateFormat::Bmp,
        }
    }

    #[must_use]
    pub fn tga() -> Self {
        Self {
            descriptor: ImageFormatDescriptor {
                name: "TGA",
                default_extension: "tga",
                extensions: &["tga", "targa"],
                is_native: false,
            },
            format: ImageCrateFormat::Tga,
        }
    }
}

/// TGA has no magic number; check that the header fields hold sane values.
fn looks_like_tga(data: &[u8]) -> bool {
    if data.len() < 18 {
        return false;
    }
    let color_map_type = data[1];
    let image_type = data[2];
    let depth = data[16];
    let mapped = matches!(image_type, 1 | 9);
    color_map_type <= 1
        && matches!(image_type, 1 | 2 | 3 | 9 | 10 | 11)
        && (color_map_type == 1) == mapped
        && matches!(depth, 8 | 15 | 16 | 24 | 32)
}

impl ImageFormat for GenericImageFormat {
    fn descriptor(&self) -> &ImageFormatDescriptor {
        &self.descriptor
    }

    fn probe(&self, data: &[u8]) -> bool {
        match self.format {
            ImageCrateFormat::Png => data.starts_with(&PNG_SIGNATURE),
            ImageCrateFormat::Bmp => data.len() >= 26 && data.starts_with(b"BM"),
            ImageCrateFormat::Tga => looks_like_tga(data),
            _ => false,
        }
    }

    fn decode(&self, _engine: &Engine, data: &[u8]) -> Result<DecodedImage> {
        let image = image::load_from_memory_with_format(data, self.format)
            .map_err(|e| Error::decode_failed(self.descriptor.name, e.to_string()))?;
        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        tracing::debug!("decoded {}x{} {} image", width, height, self.descriptor.name);
        Ok(DecodedImage::generic(PortablePixels::from_rgba(
            width,
            height,
            rgba.into_raw(),
        )))
    }

    fn encode(&self, raster: &Raster) -> Result<Vec<u8>> {
        let bitmap = raster.get_bitmap()?;
        let image = RgbaImage::from_raw(bitmap.width(), bitmap.height(), bitmap.to_rgba())
            .ok_or_else(|| Error::encode_failed(self.descriptor.name, "bitmap size mismatch"))?;
        let mut output = Cursor::new(Vec::new());
        image
            .write_to(&mut output, self.format)
            .map_err(|e| Error::encode_failed(self.descriptor.name, e.to_string()))?;
        Ok(output.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn checker_raster(engine: &Engine) -> Raster {
        let mut rgba = Vec::new();
        for i in 0..16u8 {
            rgba.extend_from_slice(&[i * 16, 255 - i * 16, 7, if i % 2 == 0 { 255 } else { 128 }]);
        }
        let raster = engine.create_raster();
        raster
            .install_pixels("Direct3D9", PortablePixels::from_rgba(4, 4, rgba))
            .unwrap();
        raster
    }

    #[test]
    fn test_png_keeps_pixels() {
        let engine = Engine::new();
        let raster = checker_raster(&engine);
        let png = GenericImageFormat::png();
        let bytes = png.encode(&raster).unwrap();
        assert!(png.probe(&bytes));

        let decoded = png.decode(&engine, &bytes).unwrap();
        assert_eq!(decoded.native_type, None);
        assert_eq!(
            decoded.pixels.mipmaps[0].data,
            raster.get_bitmap().unwrap().to_rgba()
        );
    }

    #[test]
    fn test_tga_and_bmp_probe_their_own_output() {
        let engine = Engine::new();
        let raster = checker_raster(&engine);
        for format in [GenericImageFormat::tga(), GenericImageFormat::bmp()] {
            let bytes = format.encode(&raster).unwrap();
            assert!(format.probe(&bytes), "{}", format.descriptor().name);
            let decoded = format.decode(&engine, &bytes).unwrap();
            assert_eq!(decoded.pixels.width(), 4);
        }
    }

    #[test]
    fn test_garbage_is_a_decode_error() {
        let engine = Engine::new();
        let err = GenericImageFormat::bmp()
            .decode(&engine, b"definitely not an image")
            .unwrap_err();
        assert!(matches!(err, Error::ImageDecodeFailed { ref format, .. } if format == "BMP"));
    }
}
