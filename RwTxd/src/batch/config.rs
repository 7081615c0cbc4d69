//! Mass conversion settings
//!
//! Settings come from an INI file with a `[Main]` section:
//!
//! ```ini
//! ; convert the PC game to PS2
//! [Main]
//! gameRoot=gta_pc/
//! outputRoot=gta_ps2/
//! targetPlatform=PS2
//! compressTextures=true
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;

use crate::engine::{DxtRuntime, EngineConfig, LibraryVersion, PaletteRuntime};
use crate::error::{Error, Result};
use crate::pipeline::{TargetPlatform, TransformOptions};
use crate::raster::MipmapGenMode;

/// Section holding the mass conversion keys.
pub const MAIN_SECTION: &str = "Main";

/// Parsed INI text: sections of `key=value` pairs in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IniDocument {
    sections: Vec<(String, Vec<(String, String)>)>,
}

impl IniDocument {
    /// Parse INI text. Lines before the first header belong to the unnamed
    /// section; `;` and `#` start comment lines.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfiguration`] for lines that are neither a
    /// header, a comment nor a `key=value` pair.
    pub fn parse(text: &str) -> Result<Self> {
        let mut sections: Vec<(String, Vec<(String, String)>)> = vec![(String::new(), Vec::new())];
        for (number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }
            if let Some(header) = line.strip_prefix('[') {
                let name = header.strip_suffix(']').ok_or_else(|| Error::InvalidConfiguration {
                    key: format!("line {}", number + 1),
                    message: format!("unterminated section header '{line}'"),
                })?;
                sections.push((name.trim().to_string(), Vec::new()));
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(Error::InvalidConfiguration {
                    key: format!("line {}", number + 1),
                    message: format!("expected key=value, found '{line}'"),
                });
            };
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);
            if let Some((_, entries)) = sections.last_mut() {
                entries.push((key.trim().to_string(), value.to_string()));
            }
        }
        Ok(Self { sections })
    }

    /// Entries of the first section called `name` (case-insensitive).
    pub fn section(&self, name: &str) -> Option<&[(String, String)]> {
        self.sections
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, entries)| entries.as_slice())
    }

    /// Last value of `key` in `section`.
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.section(section)?
            .iter()
            .rev()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

/// Parse an INI boolean: `true/false`, `1/0`, `yes/no`, `on/off`.
///
/// # Errors
/// Returns [`Error::InvalidConfiguration`] naming `key` otherwise.
pub fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(Error::InvalidConfiguration {
            key: key.to_string(),
            message: format!("expected a boolean, found '{other}'"),
        }),
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| Error::InvalidConfiguration {
        key: key.to_string(),
        message: format!("expected a number, found '{value}'"),
    })
}

/// Everything a mass conversion run needs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MassConvConfig {
    pub game_root: PathBuf,
    pub output_root: PathBuf,
    pub target_platform: TargetPlatform,
    pub target_version: LibraryVersion,
    pub clear_mipmaps: bool,
    pub generate_mipmaps: bool,
    pub mip_gen_mode: MipmapGenMode,
    pub mip_gen_max_level: u32,
    pub improve_filtering: bool,
    pub compress_textures: bool,
    pub compression_quality: f32,
    pub palette_runtime: PaletteRuntime,
    pub dxt_runtime: DxtRuntime,
    pub warning_level: u8,
    pub ignore_secure_warnings: bool,
    pub reconstruct_img_archives: bool,
    pub fix_incompatible_rasters: bool,
    pub dxt_packed_decompression: bool,
    pub img_archives_compressed: bool,
    pub ignore_serialization_regions: bool,
    pub output_debug: bool,
    /// Keys of the `[Main]` section that were not recognized.
    #[serde(skip)]
    pub unknown_keys: Vec<String>,
}

impl Default for MassConvConfig {
    fn default() -> Self {
        let engine = EngineConfig::default();
        let transform = TransformOptions::default();
        Self {
            game_root: PathBuf::from("massconv_in"),
            output_root: PathBuf::from("massconv_out"),
            target_platform: transform.target_platform,
            target_version: transform.target_version,
            clear_mipmaps: transform.clear_mipmaps,
            generate_mipmaps: transform.generate_mipmaps,
            mip_gen_mode: transform.mip_gen_mode,
            mip_gen_max_level: transform.mip_gen_max_level,
            improve_filtering: transform.improve_filtering,
            compress_textures: transform.compress,
            compression_quality: transform.compression_quality,
            palette_runtime: engine.palette_runtime,
            dxt_runtime: engine.dxt_runtime,
            warning_level: engine.warning_level,
            ignore_secure_warnings: engine.ignore_secure_warnings,
            reconstruct_img_archives: true,
            fix_incompatible_rasters: engine.fix_incompatible_rasters,
            dxt_packed_decompression: engine.dxt_packed_decompression,
            img_archives_compressed: false,
            ignore_serialization_regions: true,
            output_debug: transform.output_debug,
            unknown_keys: Vec::new(),
        }
    }
}

impl MassConvConfig {
    /// Read settings from an INI file. Relative roots resolve against the
    /// file's directory.
    ///
    /// # Errors
    /// Returns an IO error or [`Error::InvalidConfiguration`].
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut config = Self::from_ini(&text)?;
        if let Some(base) = path.parent() {
            config.game_root = base.join(&config.game_root);
            config.output_root = base.join(&config.output_root);
        }
        Ok(config)
    }

    /// Settings from INI text; keys missing from `[Main]` keep their defaults.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfiguration`] for a missing `[Main]` section
    /// or a malformed value.
    pub fn from_ini(text: &str) -> Result<Self> {
        let document = IniDocument::parse(text)?;
        let entries = document.section(MAIN_SECTION).ok_or_else(|| Error::InvalidConfiguration {
            key: MAIN_SECTION.to_string(),
            message: "missing [Main] section".to_string(),
        })?;
        let mut config = Self::default();
        for (key, value) in entries {
            config.apply(key, value)?;
        }
        for key in &config.unknown_keys {
            tracing::warn!("ignoring unknown configuration key '{}'", key);
        }
        Ok(config)
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        match key.to_ascii_lowercase().as_str() {
            "gameroot" => self.game_root = PathBuf::from(value),
            "outputroot" => self.output_root = PathBuf::from(value),
            "targetplatform" => self.target_platform = value.parse()?,
            "targetversion" => self.target_version = value.parse()?,
            "clearmipmaps" => self.clear_mipmaps = parse_bool(key, value)?,
            "generatemipmaps" => self.generate_mipmaps = parse_bool(key, value)?,
            "mipgenmode" => self.mip_gen_mode = value.parse()?,
            "mipgenmaxlevel" => self.mip_gen_max_level = parse_number(key, value)?,
            "improvefiltering" => self.improve_filtering = parse_bool(key, value)?,
            "compresstextures" => self.compress_textures = parse_bool(key, value)?,
            "compressionquality" => {
                let quality: f32 = parse_number(key, value)?;
                if !(0.0..=1.0).contains(&quality) {
                    return Err(Error::InvalidConfiguration {
                        key: key.to_string(),
                        message: format!("quality {quality} is outside 0.0 to 1.0"),
                    });
                }
                self.compression_quality = quality;
            }
            "palruntimetype" => self.palette_runtime = value.parse()?,
            "dxtruntimetype" => self.dxt_runtime = value.parse()?,
            "warninglevel" => {
                let level: u8 = parse_number(key, value)?;
                if level > 4 {
                    return Err(Error::InvalidConfiguration {
                        key: key.to_string(),
                        message: format!("level {level} is outside 0 to 4"),
                    });
                }
                self.warning_level = level;
            }
            "ignoresecurewarnings" => self.ignore_secure_warnings = parse_bool(key, value)?,
            "reconstructimgarchives" => self.reconstruct_img_archives = parse_bool(key, value)?,
            "fixincompatiblerasters" => self.fix_incompatible_rasters = parse_bool(key, value)?,
            "dxtpackeddecompression" => self.dxt_packed_decompression = parse_bool(key, value)?,
            "imgarchivescompressed" => self.img_archives_compressed = parse_bool(key, value)?,
            "ignoreserializationregions" => self.ignore_serialization_regions = parse_bool(key, value)?,
            "outputdebug" => self.output_debug = parse_bool(key, value)?,
            _ => self.unknown_keys.push(key.to_string()),
        }
        Ok(())
    }

    /// Engine settings for the run.
    pub fn to_engine_config(&self) -> EngineConfig {
        EngineConfig {
            version: self.target_version,
            ignore_block_regions: self.ignore_serialization_regions,
            warning_level: self.warning_level,
            ignore_secure_warnings: self.ignore_secure_warnings,
            dxt_runtime: self.dxt_runtime,
            palette_runtime: self.palette_runtime,
            fix_incompatible_rasters: self.fix_incompatible_rasters,
            dxt_packed_decompression: self.dxt_packed_decompression,
        }
    }

    /// Pipeline settings for every dictionary of the run.
    pub fn to_transform_options(&self) -> TransformOptions {
        TransformOptions {
            target_platform: self.target_platform,
            target_version: self.target_version,
            clear_mipmaps: self.clear_mipmaps,
            generate_mipmaps: self.generate_mipmaps,
            mip_gen_mode: self.mip_gen_mode,
            mip_gen_max_level: self.mip_gen_max_level,
            improve_filtering: self.improve_filtering,
            compress: self.compress_textures,
            compression_quality: self.compression_quality,
            output_debug: self.output_debug,
            resize_rule: None,
        }
    }
}
