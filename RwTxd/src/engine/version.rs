//! RenderWare library version stamps
//!
//! Every chunk on disk carries a packed library stamp that decides the
//! dialect of the serialized object.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::error::Error;

/// Build number written when no specific build is known.
pub const DEFAULT_BUILD_NUMBER: u16 = 0xFFFF;

/// A RenderWare library version `(libMajor, libMinor, revMajor, revMinor)` plus build number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LibraryVersion {
    pub lib_major: u8,
    pub lib_minor: u8,
    pub rev_major: u8,
    pub rev_minor: u8,
    /// `None` for legacy stamps that cannot carry one.
    pub build_number: Option<u16>,
}

impl LibraryVersion {
    /// Create a version with the default build number.
    #[must_use]
    pub const fn new(lib_major: u8, lib_minor: u8, rev_major: u8, rev_minor: u8) -> Self {
        Self {
            lib_major,
            lib_minor,
            rev_major,
            rev_minor,
            build_number: Some(DEFAULT_BUILD_NUMBER),
        }
    }

    /// Same version with a specific build number.
    #[must_use]
    pub const fn with_build(mut self, build: u16) -> Self {
        self.build_number = Some(build);
        self
    }

    /// GTA San Andreas (3.6.0.3).
    #[must_use]
    pub const fn san_andreas() -> Self {
        Self::new(3, 6, 0, 3)
    }

    /// GTA Vice City PC (3.4.0.3).
    #[must_use]
    pub const fn vice_city() -> Self {
        Self::new(3, 4, 0, 3)
    }

    /// GTA III PC (3.1.0.1).
    #[must_use]
    pub const fn gta3() -> Self {
        Self::new(3, 1, 0, 1)
    }

    /// Manhunt PC (3.4.0.5).
    #[must_use]
    pub const fn manhunt() -> Self {
        Self::new(3, 4, 0, 5)
    }

    /// The 20-bit version number `0xMmRrr` (e.g. `0x36003` for 3.6.0.3).
    #[must_use]
    pub const fn packed_version(&self) -> u32 {
        ((self.lib_major as u32 & 0xF) << 16)
            | ((self.lib_minor as u32 & 0xF) << 12)
            | ((self.rev_major as u32 & 0xF) << 8)
            | (self.rev_minor as u32)
    }

    fn from_packed(version: u32, build_number: Option<u16>) -> Self {
        Self {
            lib_major: ((version >> 16) & 0xF) as u8,
            lib_minor: ((version >> 12) & 0xF) as u8,
            rev_major: ((version >> 8) & 0xF) as u8,
            rev_minor: (version & 0xFF) as u8,
            build_number,
        }
    }

    /// Encode as the 32-bit library stamp found in chunk headers.
    ///
    /// Versions up to 3.1.0.0 use the legacy form without a build number.
    #[must_use]
    pub fn to_library_stamp(&self) -> u32 {
        let version = self.packed_version();
        if version <= 0x31000 {
            return version >> 8;
        }
        let build = u32::from(self.build_number.unwrap_or(DEFAULT_BUILD_NUMBER));
        (((version - 0x30000) & 0x3FF00) << 14) | ((version & 0x3F) << 16) | build
    }

    /// Decode a 32-bit library stamp.
    #[must_use]
    pub fn from_library_stamp(stamp: u32) -> Self {
        if stamp & 0xFFFF_0000 != 0 {
            let version = (((stamp >> 14) & 0x3FF00) + 0x30000) | ((stamp >> 16) & 0x3F);
            Self::from_packed(version, Some((stamp & 0xFFFF) as u16))
        } else {
            Self::from_packed(stamp << 8, None)
        }
    }

    /// True if this version is at least `lib_major.lib_minor.rev_major.rev_minor` of `other`.
    #[must_use]
    pub fn is_at_least(&self, other: LibraryVersion) -> bool {
        self.packed_version() >= other.packed_version()
    }
}

impl Default for LibraryVersion {
    fn default() -> Self {
        Self::san_andreas()
    }
}

impl fmt::Display for LibraryVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.lib_major, self.lib_minor, self.rev_major, self.rev_minor
        )?;
        if let Some(build) = self.build_number
            && build != DEFAULT_BUILD_NUMBER
        {
            write!(f, " (build 0x{build:04X})")?;
        }
        Ok(())
    }
}

impl Serialize for LibraryVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl FromStr for LibraryVersion {
    type Err = Error;

    /// Parses `a.b.c.d`, `a.b.c.d.build` or a game preset name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |message: String| Error::InvalidConfiguration {
            key: "targetVersion".to_string(),
            message,
        };

        match s.trim().to_ascii_uppercase().as_str() {
            "GTA3" | "GTAIII" | "III" => return Ok(Self::gta3()),
            "VC" | "GTAVC" | "VICECITY" => return Ok(Self::vice_city()),
            "SA" | "GTASA" | "SANANDREAS" => return Ok(Self::san_andreas()),
            "MANHUNT" | "MH" => return Ok(Self::manhunt()),
            _ => {}
        }

        let parts: Vec<&str> = s.trim().split('.').collect();
        if parts.len() != 4 && parts.len() != 5 {
            return Err(invalid(format!("expected a.b.c.d[.build], got '{s}'")));
        }

        let mut numbers = [0u8; 4];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            *slot = part
                .parse::<u8>()
                .map_err(|e| invalid(format!("bad version component '{part}': {e}")))?;
        }
        if numbers[0] > 0xF || numbers[1] > 0xF || numbers[2] > 0xF || numbers[3] > 0x3F {
            return Err(invalid(format!("version component out of range in '{s}'")));
        }

        let mut version = Self::new(numbers[0], numbers[1], numbers[2], numbers[3]);
        if let Some(build) = parts.get(4) {
            let parsed = if let Some(hex) = build.strip_prefix("0x").or_else(|| build.strip_prefix("0X")) {
                u16::from_str_radix(hex, 16)
            } else {
                build.parse::<u16>()
            };
            version.build_number =
                Some(parsed.map_err(|e| invalid(format!("bad build number '{build}': {e}")))?);
        }
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_san_andreas_stamp() {
        assert_eq!(LibraryVersion::san_andreas().to_library_stamp(), 0x1803_FFFF);
        let decoded = LibraryVersion::from_library_stamp(0x1803_FFFF);
        assert_eq!(decoded, LibraryVersion::san_andreas());
    }

    #[test]
    fn test_vice_city_stamp() {
        assert_eq!(LibraryVersion::vice_city().to_library_stamp(), 0x1003_FFFF);
    }

    #[test]
    fn test_legacy_stamp() {
        let legacy = LibraryVersion::from_library_stamp(0x0000_0310);
        assert_eq!((legacy.lib_major, legacy.lib_minor), (3, 1));
        assert_eq!(legacy.build_number, None);
        assert_eq!(legacy.to_library_stamp(), 0x310);
    }

    #[test]
    fn test_parse_version_strings() {
        let v: LibraryVersion = "3.6.0.3".parse().unwrap();
        assert_eq!(v, LibraryVersion::san_andreas());

        let v: LibraryVersion = "3.4.0.3.0x1234".parse().unwrap();
        assert_eq!(v.build_number, Some(0x1234));

        let v: LibraryVersion = "vc".parse().unwrap();
        assert_eq!(v, LibraryVersion::vice_city());

        assert!("3.6".parse::<LibraryVersion>().is_err());
        assert!("3.6.0.x".parse::<LibraryVersion>().is_err());
    }
}
