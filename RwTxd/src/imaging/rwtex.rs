//! Single serialized texture (`TEXTURE_NATIVE` chunk) as an image file

use std::io::Cursor;

use super::{DecodedImage, ImageFormat, ImageFormatDescriptor};
use crate::block::chunk;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::native::NativeTextureType;
use crate::raster::Raster;
use crate::txd::Texture;

const NAME: &str = "RWTEX";

const DESCRIPTOR: ImageFormatDescriptor = ImageFormatDescriptor {
    name: NAME,
    default_extension: "rwtex",
    extensions: &["rwtex"],
    is_native: true,
};

/// Texture chunks as written by the dictionary serializer.
pub struct RwTexFormat;

impl ImageFormat for RwTexFormat {
    fn descriptor(&self) -> &ImageFormatDescriptor {
        &DESCRIPTOR
    }

    fn probe(&self, data: &[u8]) -> bool {
        data.len() >= 12 && data[..4] == chunk::TEXTURE_NATIVE.to_le_bytes()
    }

    fn decode(&self, engine: &Engine, data: &[u8]) -> Result<DecodedImage> {
        if !self.probe(data) {
            return Err(Error::decode_failed(NAME, "not a texture chunk"));
        }
        let object = engine.deserialize(Cursor::new(data))?;
        let texture = engine.to_texture(object)?;
        let raster = texture
            .raster()
            .ok_or_else(|| Error::decode_failed(NAME, "texture has no raster"))?;
        let platform = raster.native_type_name().ok_or(Error::RasterEmpty)?;
        Ok(DecodedImage::native(raster.portable_pixels()?, platform))
    }

    fn encode(&self, raster: &Raster) -> Result<Vec<u8>> {
        let texture = Texture::new(raster.clone());
        let output = raster
            .engine()
            .serialize_texture(&texture, Cursor::new(Vec::new()))?;
        Ok(output.into_inner())
    }

    /// Every serializable platform can be written.
    fn accepts_platform(&self, _platform: &dyn NativeTextureType) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::PortablePixels;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_ps2_raster_keeps_its_platform() {
        let engine = Engine::new();
        let raster = engine.create_raster();
        let rgba: Vec<u8> = (0..64u8).flat_map(|i| [i * 4, 0, 255 - i * 4, 255]).collect();
        raster
            .install_pixels("PlayStation2", PortablePixels::from_rgba(8, 8, rgba))
            .unwrap();
        assert!(raster.supports_image_method("RWTEX"));
        assert!(!raster.supports_image_method("DDS"));

        let bytes = RwTexFormat.encode(&raster).unwrap();
        assert!(RwTexFormat.probe(&bytes));
        let decoded = RwTexFormat.decode(&engine, &bytes).unwrap();
        assert_eq!(decoded.native_type, Some("PlayStation2"));
        assert_eq!(decoded.pixels, raster.portable_pixels().unwrap());
    }
}
