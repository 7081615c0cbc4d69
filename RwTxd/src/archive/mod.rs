//! Archives holding texture dictionaries
//!
//! An [`ArchiveFormat`] can list its members and rebuild itself at another
//! path, passing each member through a transform. IMG archives (VER1 with a
//! separate directory file, VER2 single file) and ZIP archives are built in.

mod img;
mod lzo;
mod zipfile;

pub use img::{IMG_NAME_LENGTH, IMG_SECTOR_SIZE, ImgArchiveFormat, ImgEntry, ImgReader, ImgVersion, ImgWriter};
pub use lzo::{LZO_BLOCK_SIZE, LZO_MAGIC, LzoCompression, StreamCompressionProvider};
pub use zipfile::ZipArchiveFormat;

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::Result;

/// One member of an archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveMember {
    pub name: String,
    /// Stored size in bytes, sector padding included.
    pub size: u64,
}

/// How a rebuilt archive is written.
#[derive(Debug, Clone, Copy, Default)]
pub struct RebuildOptions {
    /// Compress members where the format supports it.
    pub compress_members: bool,
}

/// Member transform handed to [`ArchiveFormat::rebuild`]: gets the member
/// name and bytes, returns the bytes to store.
pub type MemberTransform<'a> = dyn FnMut(&str, Vec<u8>) -> Result<Vec<u8>> + 'a;

/// A container of named files.
pub trait ArchiveFormat: Send + Sync {
    fn name(&self) -> &'static str;

    /// True if `path` looks like an archive of this format.
    fn probe(&self, path: &Path) -> bool;

    /// Members in stored order.
    ///
    /// # Errors
    /// Returns an error if the archive cannot be read.
    fn list(&self, path: &Path) -> Result<Vec<ArchiveMember>>;

    /// Call `visit` with every member's name and contents.
    ///
    /// # Errors
    /// Returns the first read or visitor error.
    fn for_each_member(&self, path: &Path, visit: &mut dyn FnMut(&str, Vec<u8>) -> Result<()>) -> Result<()>;

    /// Write a copy of `source` at `target` with every member passed through
    /// `transform`. Returns every file written.
    ///
    /// # Errors
    /// Returns the first read, write or transform error. Files already
    /// written are left for the caller to clean up.
    fn rebuild(
        &self,
        source: &Path,
        target: &Path,
        options: RebuildOptions,
        transform: &mut MemberTransform<'_>,
    ) -> Result<Vec<PathBuf>>;

    /// Files written when rebuilding at `target`.
    fn output_files(&self, target: &Path) -> Vec<PathBuf> {
        vec![target.to_path_buf()]
    }
}

/// Archive formats known to the batch driver.
pub struct ArchiveRegistry {
    formats: Vec<Box<dyn ArchiveFormat>>,
}

impl ArchiveRegistry {
    #[must_use]
    pub fn with_builtin() -> Self {
        Self {
            formats: vec![Box::new(ImgArchiveFormat::default()), Box::new(ZipArchiveFormat)],
        }
    }

    pub fn register(&mut self, format: Box<dyn ArchiveFormat>) {
        self.formats.push(format);
    }

    /// Format that claims `path`.
    #[must_use]
    pub fn detect(&self, path: &Path) -> Option<&dyn ArchiveFormat> {
        self.formats.iter().find(|f| f.probe(path)).map(AsRef::as_ref)
    }

    #[must_use]
    pub fn find(&self, name: &str) -> Option<&dyn ArchiveFormat> {
        self.formats
            .iter()
            .find(|f| f.name().eq_ignore_ascii_case(name))
            .map(AsRef::as_ref)
    }
}

impl Default for ArchiveRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

/// True if `path` has the extension `extension`, ignoring case.
pub(crate) fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_by_extension() {
        let registry = ArchiveRegistry::with_builtin();
        assert_eq!(registry.detect(Path::new("models/gta3.IMG")).map(|f| f.name()), Some("IMG"));
        assert_eq!(registry.detect(Path::new("mods/pack.zip")).map(|f| f.name()), Some("ZIP"));
        assert!(registry.detect(Path::new("models/generic.txd")).is_none());
        assert!(registry.find("img").is_some());
    }
}
