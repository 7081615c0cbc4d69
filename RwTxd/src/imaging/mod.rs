//! Image file formats
//!
//! Two kinds of codecs share one registry. Generic formats (PNG, BMP, TGA)
//! move plain RGBA bitmaps in and out of a raster. Native formats (DDS, PVR,
//! RWTEX) carry texel data the way a platform stores it, so compression and
//! mipmaps survive the trip.

mod dds;
mod generic;
mod pvr;
mod rwtex;

pub use dds::DdsFormat;
pub use generic::GenericImageFormat;
pub use pvr::PvrFormat;
pub use rwtex::RwTexFormat;

use std::sync::Arc;

use crate::engine::Engine;
use crate::error::Result;
use crate::native::NativeTextureType;
use crate::raster::{PortablePixels, Raster};

/// Static description of an image format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageFormatDescriptor {
    /// Display name, e.g. `PNG`.
    pub name: &'static str,
    /// Extension used when writing, without the dot.
    pub default_extension: &'static str,
    /// Every extension recognized when reading, lowercase.
    pub extensions: &'static [&'static str],
    /// True if the format keeps native texel data.
    pub is_native: bool,
}

impl ImageFormatDescriptor {
    /// True if `extension` (with or without a leading dot) belongs to the format.
    pub fn matches_extension(&self, extension: &str) -> bool {
        let extension = extension.trim_start_matches('.');
        self.extensions.iter().any(|e| e.eq_ignore_ascii_case(extension))
    }
}

/// Pixels produced by a codec, plus the platform they belong on.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub pixels: PortablePixels,
    /// Native platform for the pixels, `None` to keep the raster's own.
    pub native_type: Option<&'static str>,
}

impl DecodedImage {
    /// Generic image without a platform preference.
    #[must_use]
    pub fn generic(pixels: PortablePixels) -> Self {
        Self {
            pixels,
            native_type: None,
        }
    }

    #[must_use]
    pub fn native(pixels: PortablePixels, native_type: &'static str) -> Self {
        Self {
            pixels,
            native_type: Some(native_type),
        }
    }
}

/// One image file format.
pub trait ImageFormat: Send + Sync {
    fn descriptor(&self) -> &ImageFormatDescriptor;

    /// Cheap check whether `data` looks like this format.
    fn probe(&self, data: &[u8]) -> bool;

    /// Decode a complete file.
    ///
    /// # Errors
    /// Returns [`Error::ImageDecodeFailed`](crate::Error::ImageDecodeFailed) if
    /// the data is not a valid file of this format.
    fn decode(&self, engine: &Engine, data: &[u8]) -> Result<DecodedImage>;

    /// Encode a raster as a complete file.
    ///
    /// # Errors
    /// Returns [`Error::ImageEncodeFailed`](crate::Error::ImageEncodeFailed) if
    /// the raster cannot be expressed in this format.
    fn encode(&self, raster: &Raster) -> Result<Vec<u8>>;

    /// True if rasters of `platform` can be written without converting them first.
    fn accepts_platform(&self, platform: &dyn NativeTextureType) -> bool {
        !self.descriptor().is_native
            || platform
                .image_formats()
                .iter()
                .any(|f| f.eq_ignore_ascii_case(self.descriptor().name))
    }
}

/// Registered image formats, looked up by name or extension.
pub struct ImagingRegistry {
    formats: Vec<Arc<dyn ImageFormat>>,
}

impl ImagingRegistry {
    #[must_use]
    pub fn empty() -> Self {
        Self { formats: Vec::new() }
    }

    /// Registry with every built-in format.
    #[must_use]
    pub fn with_builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(GenericImageFormat::png()));
        registry.register(Arc::new(GenericImageFormat::bmp()));
        registry.register(Arc::new(GenericImageFormat::tga()));
        registry.register(Arc::new(DdsFormat));
        registry.register(Arc::new(PvrFormat));
        registry.register(Arc::new(RwTexFormat));
        registry
    }

    /// Add a format, replacing one with the same name.
    pub fn register(&mut self, format: Arc<dyn ImageFormat>) {
        let name = format.descriptor().name;
        self.formats
            .retain(|f| !f.descriptor().name.eq_ignore_ascii_case(name));
        self.formats.push(format);
    }

    /// Format by name (case-insensitive).
    #[must_use]
    pub fn find(&self, name: &str) -> Option<Arc<dyn ImageFormat>> {
        self.formats
            .iter()
            .find(|f| f.descriptor().name.eq_ignore_ascii_case(name))
            .cloned()
    }

    /// Format claiming a file extension.
    #[must_use]
    pub fn find_by_extension(&self, extension: &str) -> Option<Arc<dyn ImageFormat>> {
        self.formats
            .iter()
            .find(|f| f.descriptor().matches_extension(extension))
            .cloned()
    }

    /// First format whose probe accepts `data`.
    #[must_use]
    pub fn detect(&self, data: &[u8]) -> Option<Arc<dyn ImageFormat>> {
        self.formats.iter().find(|f| f.probe(data)).cloned()
    }

    /// Every registered format in registration order.
    pub fn formats(&self) -> impl Iterator<Item = &Arc<dyn ImageFormat>> {
        self.formats.iter()
    }
}

impl Default for ImagingRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_lookup_by_name_and_extension() {
        let registry = ImagingRegistry::with_builtin();
        assert_eq!(registry.find("png").unwrap().descriptor().name, "PNG");
        assert_eq!(registry.find_by_extension(".TGA").unwrap().descriptor().name, "TGA");
        assert_eq!(registry.find_by_extension("dds").unwrap().descriptor().name, "DDS");
        assert!(registry.find("JPEG").is_none());
    }

    #[test]
    fn test_native_flags() {
        let registry = ImagingRegistry::with_builtin();
        let native: Vec<_> = registry
            .formats()
            .filter(|f| f.descriptor().is_native)
            .map(|f| f.descriptor().name)
            .collect();
        assert_eq!(native, vec!["DDS", "PVR", "RWTEX"]);
    }

    #[test]
    fn test_detect_by_magic() {
        let registry = ImagingRegistry::with_builtin();
        let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];
        assert_eq!(registry.detect(&png).unwrap().descriptor().name, "PNG");
        assert_eq!(registry.detect(b"DDS \0\0\0\0").unwrap().descriptor().name, "DDS");
    }
}
