//! IMG archives
//!
//! Members are stored in 2048-byte sectors. VER2 archives carry a `VER2`
//! header, a member count and a 32-byte directory entry per member in front
//! of the data; VER1 archives keep the same entries in a separate `.dir`
//! file next to the `.img`.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::{ArchiveFormat, ArchiveMember, LzoCompression, MemberTransform, RebuildOptions, StreamCompressionProvider, has_extension};
use crate::error::{Error, Result};
use crate::sync::check_hazard_condition;

pub const IMG_SECTOR_SIZE: u64 = 2048;

/// Size of the name field; names keep one byte for the terminator.
pub const IMG_NAME_LENGTH: usize = 24;

const VER2_MAGIC: [u8; 4] = *b"VER2";
const ENTRY_SIZE: u64 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImgVersion {
    /// `.img` data with a `.dir` directory file.
    V1,
    /// Single file with an embedded directory.
    V2,
}

/// Directory entry; offsets and sizes count sectors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImgEntry {
    pub name: String,
    pub offset: u32,
    pub size: u32,
}

fn sectors_for(bytes: u64) -> u64 {
    bytes.div_ceil(IMG_SECTOR_SIZE)
}

fn read_name<R: Read>(reader: &mut R) -> Result<String> {
    let mut raw = [0u8; IMG_NAME_LENGTH];
    reader.read_exact(&mut raw)?;
    let end = raw.iter().position(|&b| b == 0).unwrap_or(IMG_NAME_LENGTH);
    Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
}

fn write_name<W: Write>(writer: &mut W, name: &str) -> Result<()> {
    let mut raw = [0u8; IMG_NAME_LENGTH];
    raw[..name.len()].copy_from_slice(name.as_bytes());
    writer.write_all(&raw)?;
    Ok(())
}

fn validate_member_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() >= IMG_NAME_LENGTH || !name.is_ascii() || name.contains('\0') {
        return Err(Error::archive(format!(
            "member name '{name}' must be 1 to {} ASCII characters",
            IMG_NAME_LENGTH - 1
        )));
    }
    Ok(())
}

fn read_entry<R: Read>(reader: &mut R, version: ImgVersion) -> Result<ImgEntry> {
    let offset = reader.read_u32::<LittleEndian>()?;
    let size = match version {
        ImgVersion::V1 => reader.read_u32::<LittleEndian>()?,
        ImgVersion::V2 => {
            let streaming = reader.read_u16::<LittleEndian>()?;
            let stored = reader.read_u16::<LittleEndian>()?;
            u32::from(if streaming == 0 { stored } else { streaming })
        }
    };
    let name = read_name(reader)?;
    Ok(ImgEntry { name, offset, size })
}

fn write_entry<W: Write>(writer: &mut W, version: ImgVersion, entry: &ImgEntry) -> Result<()> {
    writer.write_u32::<LittleEndian>(entry.offset)?;
    match version {
        ImgVersion::V1 => writer.write_u32::<LittleEndian>(entry.size)?,
        ImgVersion::V2 => {
            writer.write_u16::<LittleEndian>(entry.size as u16)?;
            writer.write_u16::<LittleEndian>(0)?;
        }
    }
    write_name(writer, &entry.name)
}

/// Reads members of an IMG archive on demand.
pub struct ImgReader {
    file: BufReader<File>,
    file_len: u64,
    version: ImgVersion,
    entries: Vec<ImgEntry>,
}

impl ImgReader {
    /// Open `path`; VER1 archives need their `.dir` file alongside.
    ///
    /// # Errors
    /// Returns [`Error::ArchiveFormat`] if neither layout fits.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = BufReader::new(File::open(path)?);
        let file_len = file.get_ref().metadata()?.len();

        let mut magic = [0u8; 4];
        let is_ver2 = file_len >= 8 && {
            file.read_exact(&mut magic)?;
            magic == VER2_MAGIC
        };

        let (version, entries) = if is_ver2 {
            let count = u64::from(file.read_u32::<LittleEndian>()?);
            if 8 + count * ENTRY_SIZE > file_len {
                return Err(Error::archive(format!("directory of {count} entries exceeds the file")));
            }
            let entries = (0..count)
                .map(|_| read_entry(&mut file, ImgVersion::V2))
                .collect::<Result<Vec<_>>>()?;
            (ImgVersion::V2, entries)
        } else {
            let dir_path = path.with_extension("dir");
            if !dir_path.is_file() {
                return Err(Error::archive(format!(
                    "{} has no VER2 header and no directory file",
                    path.display()
                )));
            }
            let dir = std::fs::read(&dir_path)?;
            if dir.len() as u64 % ENTRY_SIZE != 0 {
                return Err(Error::archive(format!("{} has a partial entry", dir_path.display())));
            }
            let mut cursor = std::io::Cursor::new(dir.as_slice());
            let entries = (0..dir.len() as u64 / ENTRY_SIZE)
                .map(|_| read_entry(&mut cursor, ImgVersion::V1))
                .collect::<Result<Vec<_>>>()?;
            (ImgVersion::V1, entries)
        };

        tracing::debug!("{}: {:?} archive with {} members", path.display(), version, entries.len());
        Ok(Self {
            file,
            file_len,
            version,
            entries,
        })
    }

    pub fn version(&self) -> ImgVersion {
        self.version
    }

    pub fn entries(&self) -> &[ImgEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stored bytes of member `index`, sector padding included. A member
    /// running past the end of the file is cut at the end.
    ///
    /// # Errors
    /// Returns [`Error::ArchiveFormat`] if the member starts outside the file.
    pub fn read(&mut self, index: usize) -> Result<Vec<u8>> {
        let entry = self
            .entries
            .get(index)
            .ok_or_else(|| Error::archive(format!("no member #{index}")))?;
        let start = u64::from(entry.offset) * IMG_SECTOR_SIZE;
        if start > self.file_len {
            return Err(Error::archive(format!("member '{}' starts past the end of the archive", entry.name)));
        }
        let end = (start + u64::from(entry.size) * IMG_SECTOR_SIZE).min(self.file_len);
        let mut data = vec![0u8; (end - start) as usize];
        self.file.seek(SeekFrom::Start(start))?;
        self.file.read_exact(&mut data)?;
        Ok(data)
    }
}

/// Streams members into a new IMG archive.
pub struct ImgWriter {
    img: BufWriter<File>,
    dir_path: Option<PathBuf>,
    version: ImgVersion,
    capacity: usize,
    entries: Vec<ImgEntry>,
    next_sector: u64,
}

impl ImgWriter {
    /// Create an archive for at most `capacity` members. VER2 archives
    /// reserve their directory up front.
    ///
    /// # Errors
    /// Returns an IO error if the files cannot be created.
    pub fn create(path: &Path, version: ImgVersion, capacity: usize) -> Result<Self> {
        let mut img = BufWriter::new(File::create(path)?);
        let (dir_path, next_sector) = match version {
            ImgVersion::V1 => (Some(path.with_extension("dir")), 0),
            ImgVersion::V2 => {
                let header_sectors = sectors_for(8 + capacity as u64 * ENTRY_SIZE);
                img.write_all(&vec![0u8; (header_sectors * IMG_SECTOR_SIZE) as usize])?;
                (None, header_sectors)
            }
        };
        Ok(Self {
            img,
            dir_path,
            version,
            capacity,
            entries: Vec::with_capacity(capacity),
            next_sector,
        })
    }

    /// Append a member, padding it to whole sectors.
    ///
    /// # Errors
    /// Returns [`Error::ArchiveFormat`] for bad names, a full directory or
    /// members too large for a VER2 entry.
    pub fn add(&mut self, name: &str, data: &[u8]) -> Result<()> {
        validate_member_name(name)?;
        if self.version == ImgVersion::V2 && self.entries.len() >= self.capacity {
            return Err(Error::archive(format!("directory is full ({} members)", self.capacity)));
        }
        let sectors = sectors_for(data.len() as u64);
        let limit = match self.version {
            ImgVersion::V1 => u64::from(u32::MAX),
            ImgVersion::V2 => u64::from(u16::MAX),
        };
        if sectors > limit || self.next_sector > u64::from(u32::MAX) {
            return Err(Error::archive(format!("member '{name}' does not fit the archive")));
        }
        self.img.write_all(data)?;
        let padding = sectors * IMG_SECTOR_SIZE - data.len() as u64;
        self.img.write_all(&vec![0u8; padding as usize])?;

        self.entries.push(ImgEntry {
            name: name.to_string(),
            offset: self.next_sector as u32,
            size: sectors as u32,
        });
        self.next_sector += sectors;
        Ok(())
    }

    /// Write the directory and flush. Returns every file written.
    ///
    /// # Errors
    /// Returns an IO error if writing fails.
    pub fn finish(mut self) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        match &self.dir_path {
            Some(dir_path) => {
                let mut dir = BufWriter::new(File::create(dir_path)?);
                for entry in &self.entries {
                    write_entry(&mut dir, ImgVersion::V1, entry)?;
                }
                dir.flush()?;
                written.push(dir_path.clone());
            }
            None => {
                self.img.seek(SeekFrom::Start(0))?;
                self.img.write_all(&VER2_MAGIC)?;
                self.img.write_u32::<LittleEndian>(self.entries.len() as u32)?;
                for entry in &self.entries {
                    write_entry(&mut self.img, ImgVersion::V2, entry)?;
                }
            }
        }
        self.img.flush()?;
        Ok(written)
    }
}

/// IMG archives, with optional member compression.
pub struct ImgArchiveFormat {
    compression: Arc<dyn StreamCompressionProvider>,
}

impl ImgArchiveFormat {
    #[must_use]
    pub fn new(compression: Arc<dyn StreamCompressionProvider>) -> Self {
        Self { compression }
    }

    fn unpack(&self, data: Vec<u8>) -> Result<Vec<u8>> {
        if self.compression.is_compressed(&data) {
            self.compression.decompress(&data)
        } else {
            Ok(data)
        }
    }
}

impl Default for ImgArchiveFormat {
    fn default() -> Self {
        Self::new(Arc::new(LzoCompression))
    }
}

impl ArchiveFormat for ImgArchiveFormat {
    fn name(&self) -> &'static str {
        "IMG"
    }

    fn probe(&self, path: &Path) -> bool {
        has_extension(path, "img")
    }

    fn list(&self, path: &Path) -> Result<Vec<ArchiveMember>> {
        let reader = ImgReader::open(path)?;
        Ok(reader
            .entries()
            .iter()
            .map(|e| ArchiveMember {
                name: e.name.clone(),
                size: u64::from(e.size) * IMG_SECTOR_SIZE,
            })
            .collect())
    }

    fn for_each_member(&self, path: &Path, visit: &mut dyn FnMut(&str, Vec<u8>) -> Result<()>) -> Result<()> {
        let mut reader = ImgReader::open(path)?;
        for index in 0..reader.len() {
            let data = self.unpack(reader.read(index)?)?;
            let name = reader.entries()[index].name.clone();
            visit(&name, data)?;
        }
        Ok(())
    }

    fn rebuild(
        &self,
        source: &Path,
        target: &Path,
        options: RebuildOptions,
        transform: &mut MemberTransform<'_>,
    ) -> Result<Vec<PathBuf>> {
        let mut reader = ImgReader::open(source)?;
        let mut writer = ImgWriter::create(target, reader.version(), reader.len())?;
        for index in 0..reader.len() {
            check_hazard_condition()?;
            let name = reader.entries()[index].name.clone();
            let data = self.unpack(reader.read(index)?)?;
            let mut output = transform(&name, data)?;
            if options.compress_members {
                output = self.compression.compress(&output)?;
            }
            writer.add(&name, &output)?;
        }
        let mut written = vec![target.to_path_buf()];
        written.extend(writer.finish()?);
        Ok(written)
    }

    fn output_files(&self, target: &Path) -> Vec<PathBuf> {
        vec![target.to_path_buf(), target.with_extension("dir")]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn build(path: &Path, version: ImgVersion, members: &[(&str, Vec<u8>)]) {
        let mut writer = ImgWriter::create(path, version, members.len()).unwrap();
        for (name, data) in members {
            writer.add(name, data).unwrap();
        }
        writer.finish().unwrap();
    }

    fn members() -> Vec<(&'static str, Vec<u8>)> {
        vec![
            ("infernus.txd", vec![0x16; 3000]),
            ("infernus.dff", vec![0x10; 10]),
            ("empty.ide", vec![]),
        ]
    }

    #[test]
    fn test_ver2_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gta3.img");
        build(&path, ImgVersion::V2, &members());

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..4], b"VER2");
        assert_eq!(bytes.len() as u64 % IMG_SECTOR_SIZE, 0);

        let mut reader = ImgReader::open(&path).unwrap();
        assert_eq!(reader.version(), ImgVersion::V2);
        assert_eq!(
            reader.entries()[0],
            ImgEntry {
                name: "infernus.txd".to_string(),
                offset: 1,
                size: 2
            }
        );
        assert_eq!(reader.entries()[1].offset, 3);
        assert_eq!(reader.entries()[2].size, 0);
        let first = reader.read(0).unwrap();
        assert_eq!(first.len(), 4096);
        assert_eq!(&first[..3000], &[0x16; 3000][..]);
        assert!(first[3000..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_ver1_uses_directory_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cuntcars.img");
        build(&path, ImgVersion::V1, &members());
        assert_eq!(std::fs::metadata(path.with_extension("dir")).unwrap().len(), 3 * ENTRY_SIZE);

        let mut reader = ImgReader::open(&path).unwrap();
        assert_eq!(reader.version(), ImgVersion::V1);
        assert_eq!(reader.entries()[0].offset, 0);
        assert_eq!(&reader.read(1).unwrap()[..10], &[0x10; 10][..]);

        std::fs::remove_file(path.with_extension("dir")).unwrap();
        assert!(matches!(ImgReader::open(&path), Err(Error::ArchiveFormat { .. })));
    }

    #[test]
    fn test_rebuild_transforms_and_compresses() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.img");
        let target = dir.path().join("target.img");
        build(&source, ImgVersion::V2, &members());

        let format = ImgArchiveFormat::default();
        let mut seen = Vec::new();
        let written = format
            .rebuild(
                &source,
                &target,
                RebuildOptions { compress_members: true },
                &mut |name, data| {
                    seen.push(name.to_string());
                    Ok(if name.ends_with(".txd") { vec![0xAB; 5000] } else { data })
                },
            )
            .unwrap();
        assert_eq!(written, vec![target.clone()]);
        assert_eq!(seen, vec!["infernus.txd", "infernus.dff", "empty.ide"]);

        let mut reader = ImgReader::open(&target).unwrap();
        assert!(LzoCompression.is_compressed(&reader.read(0).unwrap()));

        let mut unpacked = Vec::new();
        format
            .for_each_member(&target, &mut |name, data| {
                unpacked.push((name.to_string(), data));
                Ok(())
            })
            .unwrap();
        assert_eq!(unpacked[0].1, vec![0xAB; 5000]);
        assert_eq!(unpacked[1].1, vec![0x10; 10]);
    }

    #[test]
    fn test_member_names_are_checked() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = ImgWriter::create(&dir.path().join("a.img"), ImgVersion::V2, 1).unwrap();
        assert!(writer.add(&"x".repeat(24), b"data").is_err());
        assert!(writer.add("", b"data").is_err());
        writer.add("ok.txd", b"data").unwrap();
        assert!(writer.add("second.txd", b"data").is_err());
    }
}
