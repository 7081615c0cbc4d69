//! The engine handle
//!
//! An [`Engine`] bundles everything that used to be process-wide state: the
//! runtime configuration, the warning channel and the registries of native
//! texture types and image formats. It is cheap to clone and is passed to
//! every reader, writer and raster.

mod version;
mod warnings;

pub use version::{DEFAULT_BUILD_NUMBER, LibraryVersion};
pub use warnings::{
    ScopeKind, TracingWarningSink, WarningLevel, WarningManager, WarningScope, WarningSink,
};

use std::fmt;
use std::io::{Read, Seek, Write};
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::imaging::ImagingRegistry;
use crate::native::{NativeTextureType, NativeTypeRegistry};
use crate::raster::Raster;
use crate::sync::UnfairRwLock;
use crate::txd::{RwObject, TexDictionary, Texture};

/// Block-compression implementation used for DXT encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum DxtRuntime {
    /// Built-in range-fit encoder.
    #[default]
    Native,
    /// ISPC texture compressor.
    Squish,
}

impl FromStr for DxtRuntime {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "native" => Ok(Self::Native),
            "squish" => Ok(Self::Squish),
            other => Err(Error::InvalidConfiguration {
                key: "dxtRuntimeType".to_string(),
                message: format!("unknown DXT runtime '{other}'"),
            }),
        }
    }
}

/// Palette quantizer used for palettization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum PaletteRuntime {
    /// Median-cut.
    #[default]
    Native,
    /// Median-cut refined with k-means passes.
    PngQuant,
}

impl FromStr for PaletteRuntime {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "native" => Ok(Self::Native),
            "pngquant" => Ok(Self::PngQuant),
            other => Err(Error::InvalidConfiguration {
                key: "palRuntimeType".to_string(),
                message: format!("unknown palette runtime '{other}'"),
            }),
        }
    }
}

/// Runtime toggles shared by everything using an engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineConfig {
    /// Version stamped on newly written objects.
    pub version: LibraryVersion,
    /// Treat chunk lengths as advisory when reading.
    pub ignore_block_regions: bool,
    /// 0 (silent) to 4 (verbose).
    pub warning_level: u8,
    /// Suppress warnings that reveal details of third-party files.
    pub ignore_secure_warnings: bool,
    pub dxt_runtime: DxtRuntime,
    pub palette_runtime: PaletteRuntime,
    /// Resize rasters whose dimensions the target platform rejects instead of failing.
    pub fix_incompatible_rasters: bool,
    /// Keep DXT-compressed data packed when a conversion only needs to re-wrap it.
    pub dxt_packed_decompression: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: LibraryVersion::default(),
            ignore_block_regions: false,
            warning_level: 3,
            ignore_secure_warnings: true,
            dxt_runtime: DxtRuntime::Native,
            palette_runtime: PaletteRuntime::Native,
            fix_incompatible_rasters: true,
            dxt_packed_decompression: false,
        }
    }
}

struct EngineInner {
    config: UnfairRwLock<EngineConfig>,
    warnings: WarningManager,
    native_types: NativeTypeRegistry,
    imaging: ImagingRegistry,
}

/// Shared handle to an engine instance.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &*self.inner.config.read())
            .finish_non_exhaustive()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// Engine with default configuration and all built-in formats registered.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    #[must_use]
    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                config: UnfairRwLock::new(config),
                warnings: WarningManager::default(),
                native_types: NativeTypeRegistry::with_builtin(),
                imaging: ImagingRegistry::with_builtin(),
            }),
        }
    }

    /// Snapshot of the current configuration.
    pub fn config(&self) -> EngineConfig {
        self.inner.config.read().clone()
    }

    /// Modify the configuration in place.
    pub fn update_config(&self, update: impl FnOnce(&mut EngineConfig)) {
        update(&mut self.inner.config.write());
    }

    /// Version new objects are written with.
    pub fn version(&self) -> LibraryVersion {
        self.inner.config.read().version
    }

    pub fn set_version(&self, version: LibraryVersion) {
        self.inner.config.write().version = version;
    }

    pub fn warnings(&self) -> &WarningManager {
        &self.inner.warnings
    }

    /// Raise a user-visible warning.
    pub fn warn(&self, level: WarningLevel, message: impl Into<String>) {
        self.push_warning(level, false, message.into());
    }

    /// Raise a warning that may reveal the structure of a third-party file.
    pub fn warn_secure(&self, level: WarningLevel, message: impl Into<String>) {
        self.push_warning(level, true, message.into());
    }

    fn push_warning(&self, level: WarningLevel, secure: bool, message: String) {
        let (threshold, hide_secure) = {
            let config = self.inner.config.read();
            (config.warning_level, config.ignore_secure_warnings)
        };
        if level as u8 > threshold || (secure && hide_secure) {
            tracing::trace!("suppressed warning: {message}");
            return;
        }
        self.inner.warnings.dispatch(message);
    }

    pub fn native_types(&self) -> &NativeTypeRegistry {
        &self.inner.native_types
    }

    /// Look up a native texture handler by type name.
    ///
    /// # Errors
    /// Returns [`Error::UnsupportedNativePlatform`] if no handler has that name.
    pub fn native_type(&self, name: &str) -> Result<Arc<dyn NativeTextureType>> {
        self.inner
            .native_types
            .get(name)
            .ok_or_else(|| Error::UnsupportedNativePlatform {
                platform: name.to_string(),
            })
    }

    pub fn imaging(&self) -> &ImagingRegistry {
        &self.inner.imaging
    }

    /// True if a generic image format with that name is registered.
    pub fn is_imaging_format_available(&self, name: &str) -> bool {
        self.inner
            .imaging
            .find(name)
            .is_some_and(|f| !f.descriptor().is_native)
    }

    /// True if a native image format with that name is registered.
    pub fn is_native_image_format_available(&self, name: &str) -> bool {
        self.inner
            .imaging
            .find(name)
            .is_some_and(|f| f.descriptor().is_native)
    }

    /// New raster without native data.
    pub fn create_raster(&self) -> Raster {
        Raster::new(self)
    }

    /// New texture around a raster.
    pub fn create_texture(&self, raster: Raster) -> Texture {
        Texture::new(raster)
    }

    /// New empty dictionary stamped with the engine version.
    pub fn create_tex_dictionary(&self) -> TexDictionary {
        TexDictionary::new(self.version())
    }

    /// Read one top-level object (a dictionary or a single texture).
    ///
    /// # Errors
    /// Returns [`Error::UnexpectedObject`] for other chunk types and any
    /// block or raster error from the reader.
    pub fn deserialize<R: Read + Seek>(&self, stream: R) -> Result<RwObject> {
        crate::txd::read_object(self, stream)
    }

    /// Write a dictionary as a complete TXD stream.
    ///
    /// # Errors
    /// Returns an error if a texture's native type cannot be serialized.
    pub fn serialize_dictionary<W: Write + Seek>(
        &self,
        txd: &TexDictionary,
        stream: W,
    ) -> Result<W> {
        crate::txd::write_dictionary(self, txd, stream)
    }

    /// Write a single texture as a `TEXTURE_NATIVE` chunk.
    ///
    /// # Errors
    /// Returns an error if the texture's native type cannot be serialized.
    pub fn serialize_texture<W: Write + Seek>(&self, texture: &Texture, stream: W) -> Result<W> {
        crate::txd::write_texture(self, texture, stream)
    }

    /// Extract a texture from a deserialized object.
    ///
    /// Accepts a texture or a dictionary holding exactly one texture.
    ///
    /// # Errors
    /// Returns [`Error::UnexpectedObject`] otherwise.
    pub fn to_texture(&self, object: RwObject) -> Result<Texture> {
        match object {
            RwObject::Texture(texture) => Ok(*texture),
            RwObject::TexDictionary(mut txd) => {
                if txd.texture_count() != 1 {
                    return Err(Error::UnexpectedObject {
                        message: format!(
                            "expected a single texture, dictionary holds {}",
                            txd.texture_count()
                        ),
                    });
                }
                txd.remove_texture(0).ok_or_else(|| Error::UnexpectedObject {
                    message: "dictionary is empty".to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::UnfairMutex;

    #[derive(Default)]
    struct CollectingSink(UnfairMutex<Vec<String>>);

    impl WarningSink for CollectingSink {
        fn on_warning(&self, message: &str) {
            self.0.lock().push(message.to_string());
        }
    }

    #[test]
    fn test_warning_level_filters() {
        let engine = Engine::new();
        let sink = Arc::new(CollectingSink::default());
        engine.warnings().set_sink(sink.clone());
        engine.update_config(|c| c.warning_level = 2);

        engine.warn(WarningLevel::Important, "shown");
        engine.warn(WarningLevel::Verbose, "hidden");
        engine.warn_secure(WarningLevel::Critical, "secure");
        assert_eq!(*sink.0.lock(), vec!["shown".to_string()]);

        engine.update_config(|c| {
            c.warning_level = 0;
            c.ignore_secure_warnings = false;
        });
        engine.warn(WarningLevel::Critical, "silent");
        assert_eq!(sink.0.lock().len(), 1);
    }

    #[test]
    fn test_runtime_parsing() {
        assert_eq!("Squish".parse::<DxtRuntime>().unwrap(), DxtRuntime::Squish);
        assert_eq!(
            "pngquant".parse::<PaletteRuntime>().unwrap(),
            PaletteRuntime::PngQuant
        );
        assert!("zlib".parse::<DxtRuntime>().is_err());
    }

    #[test]
    fn test_builtin_registries() {
        let engine = Engine::new();
        assert!(engine.is_imaging_format_available("PNG"));
        assert!(engine.is_native_image_format_available("DDS"));
        assert!(!engine.is_imaging_format_available("DDS"));
        assert!(engine.native_type("Direct3D9").is_ok());
        assert!(matches!(
            engine.native_type("Dreamcast"),
            Err(Error::UnsupportedNativePlatform { .. })
        ));
    }
}
