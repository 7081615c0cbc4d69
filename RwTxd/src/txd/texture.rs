//! Textures and their sampling state

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use super::extensions::RawExtension;
use crate::engine::LibraryVersion;
use crate::error::{Error, Result};
use crate::raster::Raster;

/// Longest texture or mask name accepted.
pub const MAX_NAME_LENGTH: usize = 32;

/// Characters reserved by file systems and archive formats.
const RESERVED_CHARACTERS: &[char] = &['/', ':', '?', '"', '<', '>', '|', '[', ']', '\\'];

/// Texture filtering mode. Mip modes read as `<texel filter>/<mip filter>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum FilterMode {
    Point,
    #[default]
    Linear,
    PointPoint,
    PointLinear,
    LinearPoint,
    LinearLinear,
}

impl FilterMode {
    /// RenderWare filter code.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Point => 1,
            Self::Linear => 2,
            Self::PointPoint => 3,
            Self::PointLinear => 4,
            Self::LinearPoint => 5,
            Self::LinearLinear => 6,
        }
    }

    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            1 => Self::Point,
            2 => Self::Linear,
            3 => Self::PointPoint,
            4 => Self::PointLinear,
            5 => Self::LinearPoint,
            6 => Self::LinearLinear,
            _ => return None,
        })
    }

    /// True if the mode samples between mipmap levels.
    #[must_use]
    pub const fn uses_mipmaps(self) -> bool {
        !matches!(self, Self::Point | Self::Linear)
    }

    /// Closest mode legal for a raster with or without mipmaps.
    #[must_use]
    pub const fn fixed_for(self, has_mipmaps: bool) -> Self {
        match (self, has_mipmaps) {
            (Self::PointPoint | Self::PointLinear, false) => Self::Point,
            (Self::LinearPoint | Self::LinearLinear, false) => Self::Linear,
            (Self::Point, true) => Self::PointPoint,
            (Self::Linear, true) => Self::LinearLinear,
            (mode, _) => mode,
        }
    }

    /// The highest quality mode legal for a raster with or without mipmaps.
    #[must_use]
    pub const fn improved_for(has_mipmaps: bool) -> Self {
        if has_mipmaps { Self::LinearLinear } else { Self::Linear }
    }
}

impl fmt::Display for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Point => "point",
            Self::Linear => "linear",
            Self::PointPoint => "point/point",
            Self::PointLinear => "point/linear",
            Self::LinearPoint => "linear/point",
            Self::LinearLinear => "linear/linear",
        })
    }
}

/// Texture coordinate addressing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum AddressMode {
    #[default]
    Wrap,
    Mirror,
    Clamp,
}

impl AddressMode {
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Wrap => 1,
            Self::Mirror => 2,
            Self::Clamp => 3,
        }
    }

    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            1 => Self::Wrap,
            2 => Self::Mirror,
            3 => Self::Clamp,
            _ => return None,
        })
    }
}

impl fmt::Display for AddressMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Wrap => "wrap",
            Self::Mirror => "mirror",
            Self::Clamp => "clamp",
        })
    }
}

impl FromStr for AddressMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wrap" => Ok(Self::Wrap),
            "mirror" => Ok(Self::Mirror),
            "clamp" => Ok(Self::Clamp),
            other => Err(Error::unsupported(format!("unknown addressing mode '{other}'"))),
        }
    }
}

/// Check a texture or mask name.
///
/// # Errors
/// Returns [`Error::InvalidTextureName`] for names over 32 characters or
/// containing reserved punctuation or control characters.
pub fn validate_texture_name(name: &str) -> Result<()> {
    let invalid = |reason| {
        Err(Error::InvalidTextureName {
            name: name.to_string(),
            reason,
        })
    };
    if name.len() > MAX_NAME_LENGTH {
        return invalid("longer than 32 characters");
    }
    if !name.is_ascii() {
        return invalid("non-ASCII character");
    }
    if name.chars().any(|c| c.is_ascii_control()) {
        return invalid("control character");
    }
    if name.contains(RESERVED_CHARACTERS) {
        return invalid("reserved character");
    }
    Ok(())
}

/// The per-texture fields stored in every native texture header.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct TextureFields {
    pub name: String,
    pub mask_name: String,
    pub filter: FilterMode,
    pub u_addr: AddressMode,
    pub v_addr: AddressMode,
}

impl TextureFields {
    /// Pack filter and addressing as `filter:8 | u:4 | v:4`.
    #[must_use]
    pub fn pack_filter_flags(&self) -> u32 {
        u32::from(self.filter.code())
            | (u32::from(self.u_addr.code()) << 8)
            | (u32::from(self.v_addr.code()) << 12)
    }

    /// Unpack filter flags. Unknown codes fall back to defaults and are
    /// returned as a diagnostic.
    #[allow(clippy::cast_possible_truncation)]
    pub fn unpack_filter_flags(&mut self, flags: u32) -> Option<String> {
        let filter_code = (flags & 0xFF) as u8;
        let u_code = ((flags >> 8) & 0xF) as u8;
        let v_code = ((flags >> 12) & 0xF) as u8;

        let mut problems = Vec::new();
        self.filter = FilterMode::from_code(filter_code).unwrap_or_else(|| {
            problems.push(format!("filter mode {filter_code}"));
            FilterMode::default()
        });
        self.u_addr = AddressMode::from_code(u_code).unwrap_or_else(|| {
            problems.push(format!("U addressing {u_code}"));
            AddressMode::default()
        });
        self.v_addr = AddressMode::from_code(v_code).unwrap_or_else(|| {
            problems.push(format!("V addressing {v_code}"));
            AddressMode::default()
        });
        if problems.is_empty() {
            None
        } else {
            Some(format!("texture '{}' has invalid {}", self.name, problems.join(", ")))
        }
    }
}

/// A named, sampled reference to a raster.
#[derive(Debug, Clone)]
pub struct Texture {
    fields: TextureFields,
    raster: Option<Raster>,
    version: LibraryVersion,
    pub(crate) extensions: Vec<RawExtension>,
}

impl Texture {
    /// Texture around `raster`, stamped with the raster engine's version.
    #[must_use]
    pub fn new(raster: Raster) -> Self {
        let version = raster.engine().version();
        Self {
            fields: TextureFields::default(),
            raster: Some(raster),
            version,
            extensions: Vec::new(),
        }
    }

    pub(crate) fn from_parts(fields: TextureFields, raster: Raster, version: LibraryVersion) -> Self {
        Self {
            fields,
            raster: Some(raster),
            version,
            extensions: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.fields.name
    }

    /// Rename the texture.
    ///
    /// # Errors
    /// Returns [`Error::InvalidTextureName`] if the name is rejected.
    pub fn set_name(&mut self, name: &str) -> Result<()> {
        validate_texture_name(name)?;
        self.fields.name = name.to_string();
        Ok(())
    }

    #[must_use]
    pub fn mask_name(&self) -> &str {
        &self.fields.mask_name
    }

    /// Set the alpha mask name.
    ///
    /// # Errors
    /// Returns [`Error::InvalidTextureName`] if the name is rejected.
    pub fn set_mask_name(&mut self, name: &str) -> Result<()> {
        validate_texture_name(name)?;
        self.fields.mask_name = name.to_string();
        Ok(())
    }

    #[must_use]
    pub fn filter(&self) -> FilterMode {
        self.fields.filter
    }

    pub fn set_filter(&mut self, filter: FilterMode) {
        self.fields.filter = filter;
    }

    #[must_use]
    pub fn u_addressing(&self) -> AddressMode {
        self.fields.u_addr
    }

    #[must_use]
    pub fn v_addressing(&self) -> AddressMode {
        self.fields.v_addr
    }

    pub fn set_addressing(&mut self, u: AddressMode, v: AddressMode) {
        self.fields.u_addr = u;
        self.fields.v_addr = v;
    }

    #[must_use]
    pub fn fields(&self) -> &TextureFields {
        &self.fields
    }

    #[must_use]
    pub fn raster(&self) -> Option<&Raster> {
        self.raster.as_ref()
    }

    pub fn set_raster(&mut self, raster: Raster) {
        self.raster = Some(raster);
    }

    /// Detach the raster, leaving the texture empty.
    pub fn take_raster(&mut self) -> Option<Raster> {
        self.raster.take()
    }

    #[must_use]
    pub fn version(&self) -> LibraryVersion {
        self.version
    }

    pub fn set_version(&mut self, version: LibraryVersion) {
        self.version = version;
    }

    /// Unknown extension chunks carried along from the source file.
    #[must_use]
    pub fn extensions(&self) -> &[RawExtension] {
        &self.extensions
    }

    fn has_mipmaps(&self) -> bool {
        self.raster
            .as_ref()
            .and_then(|r| r.mipmap_count().ok())
            .is_some_and(|n| n > 1)
    }

    /// Collapse a filter mode the raster's mipmap chain cannot honour.
    ///
    /// Returns true if the filter changed.
    pub fn fix_filtering(&mut self) -> bool {
        let fixed = self.fields.filter.fixed_for(self.has_mipmaps());
        let changed = fixed != self.fields.filter;
        self.fields.filter = fixed;
        changed
    }

    /// Switch to the best filter the raster supports.
    pub fn improve_filtering(&mut self) {
        self.fields.filter = FilterMode::improved_for(self.has_mipmaps());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_name_validation() {
        assert!(validate_texture_name("grass_01").is_ok());
        assert!(validate_texture_name(&"a".repeat(32)).is_ok());
        assert!(validate_texture_name(&"a".repeat(33)).is_err());
        for c in ['/', ':', '?', '"', '<', '>', '|', '[', ']', '\\'] {
            assert!(validate_texture_name(&format!("tex{c}")).is_err(), "{c}");
        }
        assert!(validate_texture_name("tab\there").is_err());
    }

    #[test]
    fn test_filter_fix_law() {
        assert_eq!(FilterMode::LinearLinear.fixed_for(false), FilterMode::Linear);
        assert_eq!(FilterMode::PointLinear.fixed_for(false), FilterMode::Point);
        assert_eq!(FilterMode::Point.fixed_for(true), FilterMode::PointPoint);
        assert_eq!(FilterMode::Linear.fixed_for(true), FilterMode::LinearLinear);
        assert_eq!(FilterMode::LinearPoint.fixed_for(true), FilterMode::LinearPoint);
    }

    #[test]
    fn test_filter_flags_packing() {
        let fields = TextureFields {
            name: "x".to_string(),
            filter: FilterMode::LinearLinear,
            u_addr: AddressMode::Clamp,
            v_addr: AddressMode::Mirror,
            ..TextureFields::default()
        };
        let flags = fields.pack_filter_flags();
        assert_eq!(flags, 0x2306);

        let mut back = TextureFields::default();
        assert_eq!(back.unpack_filter_flags(flags), None);
        assert_eq!(back.filter, FilterMode::LinearLinear);
        assert_eq!(back.u_addr, AddressMode::Clamp);
        assert_eq!(back.v_addr, AddressMode::Mirror);

        assert!(back.unpack_filter_flags(0x0009).is_some());
        assert_eq!(back.filter, FilterMode::Linear);
    }
}
