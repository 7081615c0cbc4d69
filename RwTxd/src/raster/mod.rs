//! Rasters and everything that reshapes their pixels
//!
//! A [`Raster`] is a shared handle to pixel storage owned by one native
//! platform. Clones share the storage; use [`Raster::deep_clone`] for an
//! independent copy. Every operation works the same way: detach the pixels
//! into [`PortablePixels`], reshape them, and hand them back to the platform
//! handler in a layout it can store.

mod bitmap;
mod debug;
mod format;
mod mipmap;
mod palette;
pub mod pixel;
mod portable;
mod resize;
mod size_rules;

pub use bitmap::Bitmap;
pub use debug::draw_mipmap_layers;
pub use format::{
    ColorOrdering, Compression, PaletteType, PixelLayout, RASTER_AUTOMIPMAP, RASTER_MIPMAP, RASTER_PAL4,
    RASTER_PAL8, RasterFormat,
};
pub use mipmap::{MipmapGenMode, full_chain_length, generate_chain, next_level_dimensions};
pub use portable::{AlphaProfile, MipLevel, PortablePixels, packed_layout_for, palette_layout};
pub use resize::{resize_pixels, resize_rgba};
pub use size_rules::SizeRules;

use std::fmt;
use std::io::{Read, Write};
use std::sync::Arc;

use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::imaging::DecodedImage;
use crate::native::{NativeData, NativeTextureType, adapt_pixels};
use crate::sync::{ReentrantRwLock, UnfairMutex};

/// Platform rasters land on when nothing else decides.
pub const DEFAULT_PLATFORM: &str = "Direct3D9";

struct RasterShared {
    engine: Engine,
    /// Serializes whole operations; reentrant so operations can compose.
    lock: ReentrantRwLock,
    body: UnfairMutex<Option<NativeData>>,
}

/// Shared handle to native pixel storage.
#[derive(Clone)]
pub struct Raster {
    shared: Arc<RasterShared>,
}

impl fmt::Debug for Raster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let body = self.shared.body.lock();
        let mut s = f.debug_struct("Raster");
        match body.as_ref() {
            Some(native) => s
                .field("platform", &native.type_name())
                .field("width", &native.surface().width())
                .field("height", &native.surface().height())
                .field("layout", &native.surface().layout)
                .field("mipmaps", &native.surface().mipmaps.len()),
            None => s.field("platform", &"<none>"),
        };
        s.finish()
    }
}

impl Raster {
    /// Raster without native data.
    #[must_use]
    pub fn new(engine: &Engine) -> Self {
        Self::with_body(engine, None)
    }

    /// Raster around existing native storage.
    #[must_use]
    pub fn from_native(engine: &Engine, native: NativeData) -> Self {
        Self::with_body(engine, Some(native))
    }

    fn with_body(engine: &Engine, body: Option<NativeData>) -> Self {
        Self {
            shared: Arc::new(RasterShared {
                engine: engine.clone(),
                lock: ReentrantRwLock::new(),
                body: UnfairMutex::new(body),
            }),
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.shared.engine
    }

    /// Independent copy of the storage.
    #[must_use]
    pub fn deep_clone(&self) -> Self {
        let body = self.shared.body.lock().clone();
        Self::with_body(&self.shared.engine, body)
    }

    /// True if both handles share storage.
    #[must_use]
    pub fn ptr_eq(&self, other: &Raster) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Name of the native platform, if the raster has native data.
    #[must_use]
    pub fn native_type_name(&self) -> Option<&'static str> {
        self.shared.body.lock().as_ref().map(NativeData::type_name)
    }

    /// Handler of the raster's native platform.
    ///
    /// # Errors
    /// Returns [`Error::RasterEmpty`] without native data, or
    /// [`Error::UnsupportedNativePlatform`] if the platform is not registered.
    pub fn native_type(&self) -> Result<Arc<dyn NativeTextureType>> {
        let name = self.native_type_name().ok_or(Error::RasterEmpty)?;
        self.engine().native_type(name)
    }

    /// Run `f` on the native storage.
    pub(crate) fn with_native<T>(&self, f: impl FnOnce(&NativeData) -> Result<T>) -> Result<T> {
        let body = self.shared.body.lock();
        f(body.as_ref().ok_or(Error::RasterEmpty)?)
    }

    /// Install fresh empty storage for `platform`, discarding current pixels.
    ///
    /// # Errors
    /// Returns [`Error::UnsupportedNativePlatform`] for unknown platforms.
    pub fn new_native_data(&self, platform: &str) -> Result<()> {
        let handler = self.engine().native_type(platform)?;
        let _guard = self.shared.lock.write()?;
        let mut body = self.shared.body.lock();
        if let Some(old) = body.as_ref()
            && !old.is_empty()
        {
            tracing::debug!("discarding {} pixels for new {} storage", old.type_name(), handler.name());
        }
        *body = Some(handler.create_native_data());
        Ok(())
    }

    /// Store `pixels` on `platform`, converting them as the platform requires.
    ///
    /// # Errors
    /// Returns an error if the platform is unknown or the pixels cannot be adapted.
    pub fn install_pixels(&self, platform: &str, pixels: PortablePixels) -> Result<()> {
        let handler = self.engine().native_type(platform)?;
        let _guard = self.shared.lock.write()?;
        let adapted = adapt_pixels(self.engine(), handler.as_ref(), pixels)?;
        self.store(handler.as_ref(), adapted)
    }

    fn store(&self, handler: &dyn NativeTextureType, pixels: PortablePixels) -> Result<()> {
        let native = handler.from_portable(pixels)?;
        *self.shared.body.lock() = Some(native);
        Ok(())
    }

    /// Pixels detached from native storage.
    ///
    /// # Errors
    /// Returns [`Error::RasterEmpty`] if the raster holds no pixels.
    pub fn portable_pixels(&self) -> Result<PortablePixels> {
        let handler = self.native_type()?;
        let _guard = self.shared.lock.read()?;
        self.with_native(|native| {
            if native.is_empty() {
                return Err(Error::RasterEmpty);
            }
            handler.to_portable(native)
        })
    }

    fn surface_info<T>(&self, f: impl FnOnce(&crate::native::NativeSurface) -> T) -> Result<T> {
        self.with_native(|native| {
            if native.is_empty() {
                Err(Error::RasterEmpty)
            } else {
                Ok(f(native.surface()))
            }
        })
    }

    /// Base level dimensions.
    ///
    /// # Errors
    /// Returns [`Error::RasterEmpty`] if the raster holds no pixels.
    pub fn size(&self) -> Result<(u32, u32)> {
        self.surface_info(|s| (s.width(), s.height()))
    }

    /// # Errors
    /// Returns [`Error::RasterEmpty`] if the raster holds no pixels.
    pub fn width(&self) -> Result<u32> {
        self.surface_info(crate::native::NativeSurface::width)
    }

    /// # Errors
    /// Returns [`Error::RasterEmpty`] if the raster holds no pixels.
    pub fn height(&self) -> Result<u32> {
        self.surface_info(crate::native::NativeSurface::height)
    }

    /// Current texel layout.
    ///
    /// # Errors
    /// Returns [`Error::RasterEmpty`] if the raster holds no pixels.
    pub fn layout(&self) -> Result<PixelLayout> {
        self.surface_info(|s| s.layout)
    }

    /// # Errors
    /// Returns [`Error::RasterEmpty`] if the raster holds no pixels.
    pub fn mipmap_count(&self) -> Result<usize> {
        self.surface_info(|s| s.mipmaps.len())
    }

    /// # Errors
    /// Returns [`Error::RasterEmpty`] if the raster holds no pixels.
    pub fn has_alpha(&self) -> Result<bool> {
        self.surface_info(|s| s.has_alpha)
    }

    /// True once pixels are installed.
    #[must_use]
    pub fn has_pixels(&self) -> bool {
        self.shared.body.lock().as_ref().is_some_and(|n| !n.is_empty())
    }

    /// Dimension rules of the current platform and layout.
    ///
    /// # Errors
    /// Returns [`Error::RasterEmpty`] without native data.
    pub fn size_rules(&self) -> Result<SizeRules> {
        let handler = self.native_type()?;
        let layout = self.layout().unwrap_or_default();
        Ok(handler.size_rules(&layout))
    }

    /// Move the pixels to another native platform.
    ///
    /// Texel bytes are carried over untouched when the target stores the
    /// current layout; otherwise they pass through RGBA8.
    ///
    /// # Errors
    /// Returns an error if the target is unknown or the pixels cannot be adapted.
    pub fn convert_raster_to(&self, platform: &str) -> Result<()> {
        let target = self.engine().native_type(platform)?;
        let _guard = self.shared.lock.write()?;
        let source = self.native_type()?;
        if source.name() == target.name() {
            return Ok(());
        }
        if !self.has_pixels() {
            return self.new_native_data(platform);
        }
        let pixels = self.portable_pixels()?;
        tracing::debug!("converting {} raster to {}", source.name(), target.name());
        let adapted = adapt_pixels(self.engine(), target.as_ref(), pixels)?;
        self.store(target.as_ref(), adapted)
    }

    /// True if converting to `platform` before transforming keeps information
    /// a round trip through RGBA8 would lose.
    ///
    /// That is the case when the raster is palettized or compressed and the
    /// target stores that layout as is.
    ///
    /// # Errors
    /// Returns an error if the target is unknown.
    pub fn should_convert_beforehand(&self, platform: &str) -> Result<bool> {
        let target = self.engine().native_type(platform)?;
        let Ok(layout) = self.layout() else {
            return Ok(false);
        };
        let rich = layout.palette_type.is_palette() || layout.compression.is_compressed();
        Ok(rich && target.supports_layout(&layout))
    }

    /// Re-encode `pixels` into `target` and store them on the current platform.
    fn transcode_in_place(&self, handler: &dyn NativeTextureType, pixels: &PortablePixels, target: PixelLayout) -> Result<()> {
        let config = self.engine().config();
        let converted = pixels.transcode(target, &config)?;
        self.store(handler, converted)
    }

    /// Change the texel format within the current platform.
    ///
    /// # Errors
    /// Returns an error if the raster is empty or encoding fails.
    pub fn convert_to_format(&self, format: RasterFormat) -> Result<()> {
        let handler = self.native_type()?;
        let _guard = self.shared.lock.write()?;
        let pixels = self.portable_pixels()?;
        let order = if pixels.layout.compression.is_compressed() {
            ColorOrdering::Bgra
        } else {
            pixels.layout.color_order
        };
        let target = handler.native_layout(&PixelLayout::raw(format, order), pixels.has_alpha);
        if target.raster_format != format {
            self.engine().warn(
                crate::engine::WarningLevel::Info,
                format!("{} stores {format} rasters as {target}", handler.name()),
            );
        }
        self.transcode_in_place(handler.as_ref(), &pixels, target)
    }

    /// Quantize to a palette with entries in `format`.
    ///
    /// # Errors
    /// Returns [`Error::UnsupportedConversion`] if the platform has no palette
    /// support, or a codec error.
    pub fn convert_to_palette(&self, palette_type: PaletteType, format: RasterFormat) -> Result<()> {
        let handler = self.native_type()?;
        let _guard = self.shared.lock.write()?;
        let pixels = self.portable_pixels()?;
        let requested = PixelLayout::palettized(palette_type, format, ColorOrdering::Rgba);
        let target = handler.native_layout(&requested, pixels.has_alpha);
        if !target.palette_type.is_palette() {
            return Err(Error::unsupported(format!("{} has no palette rasters", handler.name())));
        }
        self.transcode_in_place(handler.as_ref(), &pixels, target)
    }

    /// Compress with the scheme the platform recommends for the raster's alpha.
    ///
    /// `quality` ranges from 0 (smallest) to 1 (best).
    ///
    /// # Errors
    /// Returns [`Error::UnsupportedConversion`] if the platform has no compression.
    pub fn compress(&self, quality: f32) -> Result<()> {
        let handler = self.native_type()?;
        let _guard = self.shared.lock.write()?;
        let pixels = self.portable_pixels()?;
        let profile = pixels.alpha_profile()?;
        let compression = handler
            .compression_for(profile, quality)
            .ok_or_else(|| Error::unsupported(format!("{} has no texture compression", handler.name())))?;
        tracing::debug!("compressing {profile:?} raster as {compression}");
        self.compress_pixels(handler.as_ref(), &pixels, compression)
    }

    /// Move to `platform` and compress there in one re-encode.
    ///
    /// Platforms that only store compressed texels would otherwise compress
    /// once on conversion and again here.
    ///
    /// # Errors
    /// Returns [`Error::UnsupportedConversion`] if `platform` has no texture compression.
    pub fn compress_to(&self, platform: &str, quality: f32) -> Result<()> {
        let target = self.engine().native_type(platform)?;
        let _guard = self.shared.lock.write()?;
        let pixels = self.portable_pixels()?;
        let profile = pixels.alpha_profile()?;
        let compression = target
            .compression_for(profile, quality)
            .ok_or_else(|| Error::unsupported(format!("{} has no texture compression", target.name())))?;
        tracing::debug!("compressing {profile:?} raster as {compression} for {}", target.name());
        self.compress_pixels(target.as_ref(), &pixels, compression)
    }

    /// Compress with a specific scheme.
    ///
    /// # Errors
    /// Returns [`Error::UnsupportedConversion`] if the platform cannot store it.
    pub fn compress_custom(&self, compression: Compression) -> Result<()> {
        let handler = self.native_type()?;
        let _guard = self.shared.lock.write()?;
        let pixels = self.portable_pixels()?;
        self.compress_pixels(handler.as_ref(), &pixels, compression)
    }

    fn compress_pixels(&self, handler: &dyn NativeTextureType, pixels: &PortablePixels, compression: Compression) -> Result<()> {
        let target = handler.native_layout(&PixelLayout::compressed(compression), pixels.has_alpha);
        if target.compression != compression {
            return Err(Error::unsupported(format!("{} cannot store {compression}", handler.name())));
        }
        let rules = handler.size_rules(&target);
        rules.check(pixels.width(), pixels.height())?;
        self.transcode_in_place(handler, pixels, target)
    }

    /// Drop every mipmap level but the base.
    ///
    /// # Errors
    /// Returns [`Error::RasterEmpty`] if the raster holds no pixels.
    pub fn clear_mipmaps(&self) -> Result<()> {
        let handler = self.native_type()?;
        let _guard = self.shared.lock.write()?;
        let mut pixels = self.portable_pixels()?;
        if pixels.mipmaps.len() <= 1 {
            return Ok(());
        }
        pixels.truncate_mipmaps(1);
        pixels.auto_mipmaps = false;
        self.store(handler.as_ref(), pixels)
    }

    /// Bring the chain to `max_levels` levels (base included).
    ///
    /// A longer chain is cut; a shorter one is extended by downsampling its
    /// last level until `max_levels` is reached or both dimensions are 1.
    /// Existing levels keep their bytes.
    ///
    /// Each level halves with floor, `max(1, d / 2)`, as RenderWare does. For
    /// power-of-two sizes that equals rounding up; for other sizes only floor
    /// yields `1 + floor(log2(max(w, h)))` levels.
    ///
    /// # Errors
    /// Returns an error if the raster is empty or encoding fails.
    pub fn generate_mipmaps(&self, max_levels: usize, mode: MipmapGenMode) -> Result<()> {
        let handler = self.native_type()?;
        let _guard = self.shared.lock.write()?;
        let mut pixels = self.portable_pixels()?;
        let max_levels = max_levels.max(1);
        pixels.truncate_mipmaps(max_levels);

        let last_index = pixels.mipmaps.len() - 1;
        let last = &pixels.mipmaps[last_index];
        let wanted = max_levels - last_index;
        let chain = generate_chain(&pixels.decode_level(last_index)?, last.width, last.height, wanted, mode);

        let config = self.engine().config();
        for (width, height, rgba) in chain.into_iter().skip(1) {
            let level = encode_extra_level(&pixels, width, height, &rgba, &config)?;
            pixels.mipmaps.push(level);
        }
        self.store(handler.as_ref(), pixels)
    }

    /// Resample to `width` x `height` with the platform's filter.
    ///
    /// # Errors
    /// Returns [`Error::InvalidDimension`] if the platform rejects the new size.
    pub fn resize(&self, width: u32, height: u32) -> Result<()> {
        let handler = self.native_type()?;
        let _guard = self.shared.lock.write()?;
        let pixels = self.portable_pixels()?;
        handler.size_rules(&pixels.layout).check(width, height)?;
        let resized = resize_pixels(&pixels, width, height, handler.resize_filter())?;
        let target = handler.native_layout(&pixels.layout, resized.has_alpha);
        self.transcode_in_place(handler.as_ref(), &resized, target)
    }

    /// Make the raster cheap to sample on low-end hardware: palettize where the
    /// platform has palettes (PAL4 below quality 0.5), compress otherwise.
    ///
    /// # Errors
    /// Returns an error if the raster is empty or encoding fails.
    pub fn optimize_for_low_end(&self, quality: f32) -> Result<()> {
        let handler = self.native_type()?;
        let _guard = self.shared.lock.write()?;
        let palette_type = if quality < 0.5 {
            PaletteType::Pal4
        } else {
            PaletteType::Pal8
        };
        let requested = PixelLayout::palettized(palette_type, RasterFormat::Format8888, ColorOrdering::Rgba);
        let has_alpha = self.has_alpha()?;
        if handler.native_layout(&requested, has_alpha).palette_type.is_palette() {
            return self.convert_to_palette(palette_type, RasterFormat::Format8888);
        }
        if handler.compression_for(AlphaProfile::Opaque, quality).is_some() {
            return self.compress(quality);
        }
        self.convert_to_format(if has_alpha {
            RasterFormat::Format4444
        } else {
            RasterFormat::Format565
        })
    }

    /// Base level as 32-bit BGRA.
    ///
    /// # Errors
    /// Returns an error if the raster is empty or cannot be decoded.
    pub fn get_bitmap(&self) -> Result<Bitmap> {
        let pixels = self.portable_pixels()?;
        Ok(Bitmap::from_rgba(pixels.width(), pixels.height(), &pixels.decode_level(0)?))
    }

    /// Replace the pixels with a bitmap, keeping the platform and its preferred layout.
    ///
    /// # Errors
    /// Returns an error if the bitmap cannot be adapted to the platform.
    pub fn set_bitmap(&self, bitmap: &Bitmap) -> Result<()> {
        let platform = self.native_type_name().unwrap_or(DEFAULT_PLATFORM);
        let pixels = PortablePixels::from_rgba(bitmap.width(), bitmap.height(), bitmap.to_rgba());
        self.install_pixels(platform, pixels)
    }

    /// Every mipmap level laid out side by side.
    ///
    /// # Errors
    /// Returns an error if the raster is empty or cannot be decoded.
    pub fn draw_debug_mipmaps(&self) -> Result<Bitmap> {
        draw_mipmap_layers(&self.portable_pixels()?)
    }

    /// True if the raster can be written as `format_name` without conversion.
    #[must_use]
    pub fn supports_image_method(&self, format_name: &str) -> bool {
        let Some(format) = self.engine().imaging().find(format_name) else {
            return false;
        };
        if !format.descriptor().is_native {
            return self.has_pixels();
        }
        self.has_pixels() && self.native_type().is_ok_and(|h| format.accepts_platform(h.as_ref()))
    }

    /// Replace the pixels with an image decoded by the named codec.
    ///
    /// Native image formats bring their own platform; generic images keep the
    /// raster's current platform.
    ///
    /// # Errors
    /// Returns [`Error::UnknownImageFormat`] for unregistered codecs or any decode error.
    pub fn read_image(&self, mut stream: impl Read, format_name: &str) -> Result<()> {
        let format = self
            .engine()
            .imaging()
            .find(format_name)
            .ok_or_else(|| Error::UnknownImageFormat(format_name.to_string()))?;
        let mut data = Vec::new();
        stream.read_to_end(&mut data)?;
        let decoded = format.decode(self.engine(), &data)?;
        self.install_decoded(decoded)
    }

    pub(crate) fn install_decoded(&self, decoded: DecodedImage) -> Result<()> {
        let platform = decoded
            .native_type
            .or_else(|| self.native_type_name())
            .unwrap_or(DEFAULT_PLATFORM);
        self.install_pixels(platform, decoded.pixels)
    }

    /// Encode the raster with the named codec.
    ///
    /// # Errors
    /// Returns [`Error::UnsupportedConversion`] if a native codec cannot take
    /// the raster's platform, or any encode error.
    pub fn write_image(&self, mut stream: impl Write, format_name: &str) -> Result<()> {
        let format = self
            .engine()
            .imaging()
            .find(format_name)
            .ok_or_else(|| Error::UnknownImageFormat(format_name.to_string()))?;
        if format.descriptor().is_native && !self.supports_image_method(format_name) {
            return Err(Error::unsupported(format!(
                "{} rasters cannot be written as {}",
                self.native_type_name().unwrap_or("empty"),
                format.descriptor().name
            )));
        }
        let bytes = format.encode(self)?;
        stream.write_all(&bytes)?;
        Ok(())
    }
}

/// Encode one RGBA8 level to match the layout of `pixels`.
fn encode_extra_level(
    pixels: &PortablePixels,
    width: u32,
    height: u32,
    rgba: &[u8],
    config: &crate::engine::EngineConfig,
) -> Result<MipLevel> {
    let layout = &pixels.layout;
    let data = if layout.palette_type.is_palette() {
        let indices = palette::map_to_palette(rgba, &pixels.palette);
        pixel::pack_indices(layout.palette_type, width, height, &indices)
    } else if layout.compression.is_compressed() {
        crate::codec::compress(layout.compression, width, height, rgba, config.dxt_runtime)?
    } else {
        pixel::encode_surface(layout, width, height, rgba)?
    };
    Ok(MipLevel::new(width, height, data))
}
