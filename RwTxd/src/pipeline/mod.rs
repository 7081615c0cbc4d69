//! Declarative texture transforms
//!
//! [`TransformOptions`] describes what a conversion should do;
//! [`process_dictionary`] applies it to every texture in a fixed order. Mipmaps
//! change before compression, filtering is fixed after mipmaps change, and
//! the platform conversion runs first only when the source carries state the
//! RGBA pivot would lose.

mod transform;

pub use transform::{TransformReport, process_dictionary, process_texture};

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;

use crate::engine::LibraryVersion;
use crate::error::Error;
use crate::native::{ATC_NAME, D3D8_NAME, D3D9_NAME, POWERVR_NAME, PS2_NAME, PSP_NAME, S3TC_NAME, UNCOMPRESSED_NAME, XBOX_NAME};
use crate::raster::MipmapGenMode;

/// Platform a conversion targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum TargetPlatform {
    #[default]
    Pc,
    Ps2,
    Psp,
    Xbox,
    DxtMobile,
    Pvr,
    Atc,
    UncompressedMobile,
}

impl TargetPlatform {
    /// Native type name for rasters of this target. PC dictionaries older
    /// than 3.6.0.0 use Direct3D8.
    #[must_use]
    pub fn native_type_name(self, version: LibraryVersion) -> &'static str {
        match self {
            Self::Pc if version.is_at_least(LibraryVersion::new(3, 6, 0, 0)) => D3D9_NAME,
            Self::Pc => D3D8_NAME,
            Self::Ps2 => PS2_NAME,
            Self::Psp => PSP_NAME,
            Self::Xbox => XBOX_NAME,
            Self::DxtMobile => S3TC_NAME,
            Self::Pvr => POWERVR_NAME,
            Self::Atc => ATC_NAME,
            Self::UncompressedMobile => UNCOMPRESSED_NAME,
        }
    }
}

impl FromStr for TargetPlatform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PC" => Ok(Self::Pc),
            "PS2" => Ok(Self::Ps2),
            "PSP" => Ok(Self::Psp),
            "XBOX" => Ok(Self::Xbox),
            "DXT_MOBILE" => Ok(Self::DxtMobile),
            "PVR" => Ok(Self::Pvr),
            "ATC" => Ok(Self::Atc),
            "UNC_MOBILE" => Ok(Self::UncompressedMobile),
            other => Err(Error::InvalidConfiguration {
                key: "targetPlatform".to_string(),
                message: format!("unknown platform '{other}'"),
            }),
        }
    }
}

impl fmt::Display for TargetPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pc => "PC",
            Self::Ps2 => "PS2",
            Self::Psp => "PSP",
            Self::Xbox => "XBOX",
            Self::DxtMobile => "DXT_MOBILE",
            Self::Pvr => "PVR",
            Self::Atc => "ATC",
            Self::UncompressedMobile => "UNC_MOBILE",
        })
    }
}

/// Picks new dimensions for a raster of the given size, `None` to keep it.
pub type ResizeRule = Arc<dyn Fn(u32, u32) -> Option<(u32, u32)> + Send + Sync>;

/// What to do to every texture of a dictionary.
#[derive(Clone)]
pub struct TransformOptions {
    pub target_platform: TargetPlatform,
    pub target_version: LibraryVersion,
    pub clear_mipmaps: bool,
    pub generate_mipmaps: bool,
    pub mip_gen_mode: MipmapGenMode,
    /// Index of the last generated level; the chain holds this plus one
    /// levels. 0 generates down to 1x1.
    pub mip_gen_max_level: u32,
    pub improve_filtering: bool,
    pub compress: bool,
    /// 0.0 to 1.0.
    pub compression_quality: f32,
    /// Write a mipmap preview next to each converted dictionary.
    pub output_debug: bool,
    pub resize_rule: Option<ResizeRule>,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            target_platform: TargetPlatform::Pc,
            target_version: LibraryVersion::san_andreas(),
            clear_mipmaps: false,
            generate_mipmaps: false,
            mip_gen_mode: MipmapGenMode::Default,
            mip_gen_max_level: 0,
            improve_filtering: true,
            compress: false,
            compression_quality: 1.0,
            output_debug: false,
            resize_rule: None,
        }
    }
}

impl fmt::Debug for TransformOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformOptions")
            .field("target_platform", &self.target_platform)
            .field("target_version", &self.target_version)
            .field("clear_mipmaps", &self.clear_mipmaps)
            .field("generate_mipmaps", &self.generate_mipmaps)
            .field("mip_gen_mode", &self.mip_gen_mode)
            .field("mip_gen_max_level", &self.mip_gen_max_level)
            .field("improve_filtering", &self.improve_filtering)
            .field("compress", &self.compress)
            .field("compression_quality", &self.compression_quality)
            .field("output_debug", &self.output_debug)
            .field("resize_rule", &self.resize_rule.is_some())
            .finish()
    }
}

impl TransformOptions {
    /// Native type name of the target platform.
    #[must_use]
    pub fn target_native_type(&self) -> &'static str {
        self.target_platform.native_type_name(self.target_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_platform_names() {
        for name in ["PC", "PS2", "PSP", "XBOX", "DXT_MOBILE", "PVR", "ATC", "UNC_MOBILE"] {
            let platform: TargetPlatform = name.parse().unwrap();
            assert_eq!(platform.to_string(), name);
        }
        assert_eq!("xbox".parse::<TargetPlatform>().unwrap(), TargetPlatform::Xbox);
        assert!("N64".parse::<TargetPlatform>().is_err());
    }

    #[test]
    fn test_pc_native_type_follows_version() {
        assert_eq!(TargetPlatform::Pc.native_type_name(LibraryVersion::san_andreas()), "Direct3D9");
        assert_eq!(TargetPlatform::Pc.native_type_name(LibraryVersion::vice_city()), "Direct3D8");
        assert_eq!(TargetPlatform::Ps2.native_type_name(LibraryVersion::gta3()), "PlayStation2");
    }
}
