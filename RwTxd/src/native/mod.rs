//! Native texture platforms
//!
//! A raster's pixel storage belongs to exactly one native platform. Each
//! platform is described by a [`NativeTextureType`] handler that knows the
//! platform's legal layouts and dimensions, converts its storage to and from
//! [`PortablePixels`], and reads and writes the platform's `TEXTURE_NATIVE`
//! payload.

mod d3d;
mod mobile;
mod sony;
pub mod swizzle;
mod xbox;

pub use d3d::{D3D8_NAME, D3D9_NAME, Direct3D8Type, Direct3D9Type};
pub use mobile::{
    ATC_NAME, AmdCompressType, POWERVR_NAME, PowerVrType, S3TC_NAME, S3tcMobileType, UNCOMPRESSED_NAME,
    UncompressedMobileType,
};
pub use sony::{PS2_NAME, PSP_NAME, PlayStation2Type, PspType};
pub use xbox::{XBOX_NAME, XboxType};

use std::sync::Arc;

use image::imageops::FilterType;

use crate::block::{DynBlockReader, DynBlockWriter};
use crate::engine::{Engine, WarningLevel};
use crate::error::Result;
use crate::raster::{
    AlphaProfile, Compression, MipLevel, PaletteType, PixelLayout, PortablePixels, RASTER_AUTOMIPMAP,
    RASTER_MIPMAP, RASTER_PAL4, RASTER_PAL8, RasterFormat, SizeRules, next_level_dimensions,
    packed_layout_for, resize_pixels,
};
use crate::txd::TextureFields;

/// Platform ids found in the first dword of a native texture payload.
pub mod platform {
    pub const XBOX: u32 = 5;
    pub const D3D8: u32 = 8;
    pub const D3D9: u32 = 9;
    pub const POWERVR: u32 = 10;
    pub const ATC: u32 = 11;
    pub const UNCOMPRESSED_MOBILE: u32 = 12;
    pub const S3TC_MOBILE: u32 = 13;
    /// `"PS2\0"`
    pub const PS2: u32 = 0x0032_5350;
    /// `"PSP\0"`
    pub const PSP: u32 = 0x0050_5350;
}

/// Texel storage shared by all platforms, arranged the way the platform keeps it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NativeSurface {
    pub layout: PixelLayout,
    pub mipmaps: Vec<MipLevel>,
    /// Palette entries encoded in the platform's entry format.
    pub palette: Vec<u8>,
    pub palette_entries: usize,
    pub auto_mipmaps: bool,
    pub has_alpha: bool,
    pub raster_type: u8,
}

impl NativeSurface {
    #[must_use]
    pub fn width(&self) -> u32 {
        self.mipmaps.first().map_or(0, |m| m.width)
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.mipmaps.first().map_or(0, |m| m.height)
    }
}

/// Direct3D 8 storage.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct D3d8Native {
    pub surface: NativeSurface,
}

/// Direct3D 9 storage.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct D3d9Native {
    pub surface: NativeSurface,
    /// `D3DFORMAT` value or DXT FourCC.
    pub d3d_format: u32,
    pub is_cube_map: bool,
}

/// Xbox storage; uncompressed levels are Morton swizzled.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct XboxNative {
    pub surface: NativeSurface,
}

/// PlayStation 2 storage; alpha is 0..=128 and PAL8 CLUTs are CSM1 swizzled.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Ps2Native {
    pub surface: NativeSurface,
    /// Mipmap K value from the sky extension.
    pub sky_mipmap_k: u32,
}

/// PSP storage.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PspNative {
    pub surface: NativeSurface,
}

/// Storage of the mobile platforms.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MobileNative {
    pub surface: NativeSurface,
    /// GL internal format of the texel data.
    pub internal_format: u32,
}

/// Pixel storage of a raster, tagged by native platform.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeData {
    Direct3D8(D3d8Native),
    Direct3D9(D3d9Native),
    Xbox(XboxNative),
    PlayStation2(Ps2Native),
    Psp(PspNative),
    S3tcMobile(MobileNative),
    PowerVr(MobileNative),
    AmdCompress(MobileNative),
    UncompressedMobile(MobileNative),
}

impl NativeData {
    /// Name of the native type owning this storage.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Direct3D8(_) => d3d::D3D8_NAME,
            Self::Direct3D9(_) => d3d::D3D9_NAME,
            Self::Xbox(_) => xbox::XBOX_NAME,
            Self::PlayStation2(_) => sony::PS2_NAME,
            Self::Psp(_) => sony::PSP_NAME,
            Self::S3tcMobile(_) => mobile::S3TC_NAME,
            Self::PowerVr(_) => mobile::POWERVR_NAME,
            Self::AmdCompress(_) => mobile::ATC_NAME,
            Self::UncompressedMobile(_) => mobile::UNCOMPRESSED_NAME,
        }
    }

    #[must_use]
    pub fn surface(&self) -> &NativeSurface {
        match self {
            Self::Direct3D8(d) => &d.surface,
            Self::Direct3D9(d) => &d.surface,
            Self::Xbox(d) => &d.surface,
            Self::PlayStation2(d) => &d.surface,
            Self::Psp(d) => &d.surface,
            Self::S3tcMobile(d) | Self::PowerVr(d) | Self::AmdCompress(d) | Self::UncompressedMobile(d) => {
                &d.surface
            }
        }
    }

    pub fn surface_mut(&mut self) -> &mut NativeSurface {
        match self {
            Self::Direct3D8(d) => &mut d.surface,
            Self::Direct3D9(d) => &mut d.surface,
            Self::Xbox(d) => &mut d.surface,
            Self::PlayStation2(d) => &mut d.surface,
            Self::Psp(d) => &mut d.surface,
            Self::S3tcMobile(d) | Self::PowerVr(d) | Self::AmdCompress(d) | Self::UncompressedMobile(d) => {
                &mut d.surface
            }
        }
    }

    /// True once pixels have been installed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.surface().mipmaps.is_empty()
    }
}

/// Handler for one native texture platform.
pub trait NativeTextureType: Send + Sync {
    /// Type name, e.g. `Direct3D9`.
    fn name(&self) -> &'static str;

    /// Platform id written at the start of the native payload.
    fn platform_id(&self) -> u32;

    /// RenderWare device id reported for dictionaries of this platform.
    fn device_id(&self) -> u16 {
        0
    }

    /// Fresh storage without pixels.
    fn create_native_data(&self) -> NativeData;

    /// Dimension rules for rasters stored in `layout`.
    fn size_rules(&self, layout: &PixelLayout) -> SizeRules;

    /// The layout this platform stores `requested` as.
    fn native_layout(&self, requested: &PixelLayout, has_alpha: bool) -> PixelLayout;

    /// True if the platform stores `layout` without transcoding.
    fn supports_layout(&self, layout: &PixelLayout) -> bool {
        let native = self.native_layout(layout, layout.can_have_alpha());
        native.same_encoding(layout)
            || (native.palette_type == layout.palette_type
                && native.raster_format == layout.raster_format
                && layout.palette_type.is_palette())
    }

    /// Best compression for the given alpha usage, if the platform compresses at all.
    fn compression_for(&self, _alpha: AlphaProfile, _quality: f32) -> Option<Compression> {
        None
    }

    /// True if the platform can hold `compression`.
    fn supports_compression(&self, compression: Compression) -> bool {
        self.native_layout(&PixelLayout::compressed(compression), compression.has_alpha())
            .compression
            == compression
    }

    /// Native image formats this platform exports directly.
    fn image_formats(&self) -> &'static [&'static str] {
        &[]
    }

    /// Resampling filter used by `resize`.
    fn resize_filter(&self) -> FilterType {
        FilterType::Triangle
    }

    /// Detach the pixels from native storage.
    ///
    /// # Errors
    /// Returns an error if `data` belongs to another platform or is corrupt.
    fn to_portable(&self, data: &NativeData) -> Result<PortablePixels>;

    /// Arrange pixels for native storage. `pixels` must already be in a
    /// layout returned by [`native_layout`](Self::native_layout).
    ///
    /// # Errors
    /// Returns an error if the layout is not native to the platform.
    fn from_portable(&self, pixels: PortablePixels) -> Result<NativeData>;

    /// Write the `TEXTURE_NATIVE` payload (everything but the extension chunk).
    ///
    /// # Errors
    /// Returns an error if the storage cannot be expressed on disk.
    fn serialize(&self, fields: &TextureFields, data: &NativeData, writer: &mut DynBlockWriter<'_>) -> Result<()>;

    /// Read the `TEXTURE_NATIVE` payload (everything but the extension chunk).
    ///
    /// # Errors
    /// Returns an error if the payload is corrupt.
    fn deserialize(&self, reader: &mut DynBlockReader<'_>) -> Result<(TextureFields, NativeData)>;
}

/// Registry of native texture handlers.
pub struct NativeTypeRegistry {
    types: Vec<Arc<dyn NativeTextureType>>,
}

impl NativeTypeRegistry {
    /// Registry holding no handlers.
    #[must_use]
    pub fn empty() -> Self {
        Self { types: Vec::new() }
    }

    /// Registry with every built-in platform.
    #[must_use]
    pub fn with_builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(Direct3D8Type));
        registry.register(Arc::new(Direct3D9Type));
        registry.register(Arc::new(XboxType));
        registry.register(Arc::new(PlayStation2Type));
        registry.register(Arc::new(PspType));
        registry.register(Arc::new(S3tcMobileType));
        registry.register(Arc::new(PowerVrType));
        registry.register(Arc::new(AmdCompressType));
        registry.register(Arc::new(UncompressedMobileType));
        registry
    }

    /// Add a handler, replacing one with the same name.
    pub fn register(&mut self, handler: Arc<dyn NativeTextureType>) {
        self.types.retain(|t| !t.name().eq_ignore_ascii_case(handler.name()));
        self.types.push(handler);
    }

    /// Handler by type name (case-insensitive).
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn NativeTextureType>> {
        self.types
            .iter()
            .find(|t| t.name().eq_ignore_ascii_case(name))
            .cloned()
    }

    /// Handler for a payload platform id.
    #[must_use]
    pub fn by_platform_id(&self, id: u32) -> Option<Arc<dyn NativeTextureType>> {
        self.types.iter().find(|t| t.platform_id() == id).cloned()
    }

    /// Registered type names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.types.iter().map(|t| t.name()).collect()
    }
}

/// Bring pixels into a shape `handler` can store: fix or reject illegal
/// dimensions, then transcode to the platform's layout.
///
/// # Errors
/// Returns [`Error::InvalidDimension`](crate::Error::InvalidDimension) if the
/// dimensions are illegal and `fix_incompatible_rasters` is off, or any codec error.
pub fn adapt_pixels(
    engine: &Engine,
    handler: &dyn NativeTextureType,
    pixels: PortablePixels,
) -> Result<PortablePixels> {
    let config = engine.config();
    let mut requested = pixels.layout;
    if requested.compression.is_compressed() && config.dxt_packed_decompression {
        let native = handler.native_layout(&requested, pixels.has_alpha);
        if !native.compression.is_compressed() {
            requested = packed_layout_for(&pixels);
        }
    }
    let target = handler.native_layout(&requested, pixels.has_alpha);

    let rules = handler.size_rules(&target);
    let (width, height) = (pixels.width(), pixels.height());
    let pixels = if rules.verify(width, height) {
        pixels
    } else if config.fix_incompatible_rasters {
        let (new_width, new_height) = rules.adjust(width, height);
        engine.warn(
            WarningLevel::Important,
            format!(
                "resized {width}x{height} raster to {new_width}x{new_height} for {}",
                handler.name()
            ),
        );
        resize_pixels(&pixels, new_width, new_height, handler.resize_filter())?
    } else {
        rules.check(width, height)?;
        pixels
    };

    pixels.transcode(target, &config)
}

/// Shorthand for [`Error::UnsupportedConversion`](crate::Error::UnsupportedConversion)
/// when a handler is handed another platform's storage.
pub(crate) fn foreign_data(handler: &str, data: &NativeData) -> crate::Error {
    crate::Error::unsupported(format!(
        "{handler} handler received {} native data",
        data.type_name()
    ))
}

/// Reject pixels that are not in the handler's own layout.
pub(crate) fn ensure_native_layout(handler: &dyn NativeTextureType, pixels: &PortablePixels) -> Result<()> {
    pixels.validate()?;
    let native = handler.native_layout(&pixels.layout, pixels.has_alpha);
    if native.same_encoding(&pixels.layout) {
        Ok(())
    } else {
        Err(crate::Error::unsupported(format!(
            "{} stores {} as {native}",
            handler.name(),
            pixels.layout
        )))
    }
}

/// Name and mask fields stored as fixed 32-byte strings.
const NAME_FIELD_WIDTH: usize = 32;

/// Write the fields shared by the PC, Xbox and mobile payloads.
pub(crate) fn write_common_header(
    writer: &mut DynBlockWriter<'_>,
    platform_id: u32,
    fields: &TextureFields,
) -> Result<()> {
    writer.write_u32(platform_id)?;
    writer.write_u32(fields.pack_filter_flags())?;
    writer.write_fixed_string(&fields.name, NAME_FIELD_WIDTH)?;
    writer.write_fixed_string(&fields.mask_name, NAME_FIELD_WIDTH)
}

/// Read the counterpart of [`write_common_header`], checking the platform id.
pub(crate) fn read_common_header(reader: &mut DynBlockReader<'_>, platform_id: u32) -> Result<TextureFields> {
    let found = reader.read_u32()?;
    if found != platform_id {
        return Err(crate::Error::corrupt(format!(
            "native texture platform 0x{found:X}, expected 0x{platform_id:X}"
        )));
    }
    let flags = reader.read_u32()?;
    let mut fields = TextureFields {
        name: reader.read_fixed_string(NAME_FIELD_WIDTH)?,
        mask_name: reader.read_fixed_string(NAME_FIELD_WIDTH)?,
        ..TextureFields::default()
    };
    apply_filter_flags(reader, &mut fields, flags);
    Ok(fields)
}

/// Unpack filter flags, warning about codes that had to be replaced.
pub(crate) fn apply_filter_flags(reader: &DynBlockReader<'_>, fields: &mut TextureFields, flags: u32) {
    if let Some(problem) = fields.unpack_filter_flags(flags) {
        reader.engine().warn(WarningLevel::Important, problem);
    }
}

/// Raster format word: format code plus palette and mipmap flags.
pub(crate) fn raster_format_word(layout: &PixelLayout, levels: usize, auto_mipmaps: bool, has_alpha: bool) -> u32 {
    let format = match layout.compression.dxt_number() {
        Some(1) if has_alpha => RasterFormat::Format1555,
        Some(1) => RasterFormat::Format565,
        Some(_) => RasterFormat::Format4444,
        None => layout.raster_format,
    };
    let mut word = format.code() | layout.palette_type.format_flag();
    if levels > 1 {
        word |= RASTER_MIPMAP;
    }
    if auto_mipmaps {
        word |= RASTER_AUTOMIPMAP;
    }
    word
}

/// Palette kind encoded in a raster format word.
pub(crate) fn palette_from_word(word: u32, pal4: PaletteType) -> PaletteType {
    if word & RASTER_PAL8 != 0 {
        PaletteType::Pal8
    } else if word & RASTER_PAL4 != 0 {
        pal4
    } else {
        PaletteType::None
    }
}

/// DXT scheme for an alpha profile.
pub(crate) fn dxt_for(alpha: AlphaProfile) -> Compression {
    match alpha {
        AlphaProfile::Opaque | AlphaProfile::OneBit => Compression::Dxt1,
        AlphaProfile::FewLevels => Compression::Dxt3,
        AlphaProfile::Smooth => Compression::Dxt5,
    }
}

/// Dimension as stored in a 16-bit header field.
pub(crate) fn dimension_u16(value: u32) -> Result<u16> {
    u16::try_from(value).map_err(|_| crate::Error::InvalidDimension {
        width: value,
        height: value,
        reason: "does not fit a 16-bit header field".to_string(),
    })
}

/// Dimensions of each level of a chain starting at `width` x `height`.
pub(crate) fn chain_dimensions(width: u32, height: u32, levels: usize) -> Vec<(u32, u32)> {
    let mut dims = Vec::with_capacity(levels);
    let mut current = (width, height);
    for _ in 0..levels {
        dims.push(current);
        current = next_level_dimensions(current.0, current.1);
    }
    dims
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineConfig;
    use crate::raster::{PaletteType, RasterFormat, palette_layout};
    use pretty_assertions::assert_eq;

    fn gradient(width: u32, height: u32) -> Vec<u8> {
        let mut rgba = Vec::new();
        for y in 0..height {
            for x in 0..width {
                rgba.extend_from_slice(&[(x * 16) as u8, (y * 16) as u8, 128, 255]);
            }
        }
        rgba
    }

    #[test]
    fn test_registry_lookup() {
        let registry = NativeTypeRegistry::with_builtin();
        assert_eq!(registry.names().len(), 9);
        assert_eq!(registry.get("direct3d9").unwrap().platform_id(), platform::D3D9);
        assert_eq!(registry.by_platform_id(platform::PS2).unwrap().name(), "PlayStation2");
        assert!(registry.get("GameCube").is_none());
    }

    #[test]
    fn test_every_platform_round_trips_portable() {
        let engine = Engine::new();
        let registry = NativeTypeRegistry::with_builtin();
        for name in registry.names() {
            let handler = registry.get(name).unwrap();
            let pixels = PortablePixels::from_rgba(16, 16, gradient(16, 16));
            let adapted = adapt_pixels(&engine, handler.as_ref(), pixels).unwrap();
            let native = handler.from_portable(adapted.clone()).unwrap();
            assert_eq!(native.type_name(), name);
            let back = handler.to_portable(&native).unwrap();
            assert_eq!(back.layout, adapted.layout, "{name}");
            assert_eq!(back.mipmaps, adapted.mipmaps, "{name}");
        }
    }

    #[test]
    fn test_illegal_dimensions() {
        let engine = Engine::with_config(EngineConfig {
            fix_incompatible_rasters: false,
            ..EngineConfig::default()
        });
        let ps2 = engine.native_type("PlayStation2").unwrap();
        let pixels = PortablePixels::from_rgba(12, 8, gradient(12, 8));
        assert!(matches!(
            adapt_pixels(&engine, ps2.as_ref(), pixels.clone()),
            Err(crate::Error::InvalidDimension { .. })
        ));

        engine.update_config(|c| c.fix_incompatible_rasters = true);
        let fixed = adapt_pixels(&engine, ps2.as_ref(), pixels).unwrap();
        assert_eq!((fixed.width(), fixed.height()), (16, 8));
    }

    #[test]
    fn test_supports_layout() {
        let engine = Engine::new();
        let d3d9 = engine.native_type("Direct3D9").unwrap();
        let ps2 = engine.native_type("PlayStation2").unwrap();
        let dxt1 = PixelLayout::compressed(Compression::Dxt1);
        assert!(d3d9.supports_layout(&dxt1));
        assert!(!ps2.supports_layout(&dxt1));
        assert!(ps2.supports_layout(&palette_layout(PaletteType::Pal8)));
        assert!(d3d9.supports_compression(Compression::Dxt5));
        assert!(!ps2.supports_compression(Compression::Dxt5));
        let lum = PixelLayout::raw(RasterFormat::Lum8, crate::raster::ColorOrdering::Rgba);
        assert!(!ps2.supports_layout(&lum));
    }
}
