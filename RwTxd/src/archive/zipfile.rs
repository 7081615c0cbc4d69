//! ZIP archives through the `zip` crate

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use zip::ZipArchive;
use zip::write::{SimpleFileOptions, ZipWriter};

use super::{ArchiveFormat, ArchiveMember, MemberTransform, RebuildOptions, has_extension};
use crate::error::Result;
use crate::sync::check_hazard_condition;

/// ZIP archives. Members keep their compression method when rebuilt.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZipArchiveFormat;

fn open(path: &Path) -> Result<ZipArchive<BufReader<File>>> {
    Ok(ZipArchive::new(BufReader::new(File::open(path)?))?)
}

impl ArchiveFormat for ZipArchiveFormat {
    fn name(&self) -> &'static str {
        "ZIP"
    }

    fn probe(&self, path: &Path) -> bool {
        has_extension(path, "zip")
    }

    fn list(&self, path: &Path) -> Result<Vec<ArchiveMember>> {
        let mut archive = open(path)?;
        let mut members = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let file = archive.by_index(index)?;
            if file.is_dir() {
                continue;
            }
            members.push(ArchiveMember {
                name: file.name().to_string(),
                size: file.size(),
            });
        }
        Ok(members)
    }

    fn for_each_member(&self, path: &Path, visit: &mut dyn FnMut(&str, Vec<u8>) -> Result<()>) -> Result<()> {
        let mut archive = open(path)?;
        for index in 0..archive.len() {
            let mut file = archive.by_index(index)?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().to_string();
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data)?;
            drop(file);
            visit(&name, data)?;
        }
        Ok(())
    }

    fn rebuild(
        &self,
        source: &Path,
        target: &Path,
        _options: RebuildOptions,
        transform: &mut MemberTransform<'_>,
    ) -> Result<Vec<PathBuf>> {
        let mut archive = open(source)?;
        let mut writer = ZipWriter::new(BufWriter::new(File::create(target)?));
        for index in 0..archive.len() {
            check_hazard_condition()?;
            let mut file = archive.by_index(index)?;
            let name = file.name().to_string();
            let options = SimpleFileOptions::default().compression_method(file.compression());
            if file.is_dir() {
                writer.add_directory(name, options)?;
                continue;
            }
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data)?;
            drop(file);

            let output = transform(&name, data)?;
            writer.start_file(name, options)?;
            writer.write_all(&output)?;
        }
        writer.finish()?.flush()?;
        Ok(vec![target.to_path_buf()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn build(path: &Path) {
        let mut writer = ZipWriter::new(File::create(path).unwrap());
        let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        writer.add_directory("models/", options).unwrap();
        writer.start_file("models/generic.txd", options).unwrap();
        writer.write_all(&[0x16; 64]).unwrap();
        writer
            .start_file("readme.txt", SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored))
            .unwrap();
        writer.write_all(b"hello").unwrap();
        writer.finish().unwrap();
    }

    #[test]
    fn test_rebuild_keeps_layout() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("pack.zip");
        let target = dir.path().join("out.zip");
        build(&source);

        let format = ZipArchiveFormat;
        assert_eq!(
            format.list(&source).unwrap(),
            vec![
                ArchiveMember {
                    name: "models/generic.txd".to_string(),
                    size: 64
                },
                ArchiveMember {
                    name: "readme.txt".to_string(),
                    size: 5
                },
            ]
        );

        format
            .rebuild(&source, &target, RebuildOptions::default(), &mut |name, data| {
                Ok(if name.ends_with(".txd") { vec![1, 2, 3] } else { data })
            })
            .unwrap();

        let mut members = Vec::new();
        format
            .for_each_member(&target, &mut |name, data| {
                members.push((name.to_string(), data));
                Ok(())
            })
            .unwrap();
        assert_eq!(
            members,
            vec![
                ("models/generic.txd".to_string(), vec![1, 2, 3]),
                ("readme.txt".to_string(), b"hello".to_vec()),
            ]
        );

        let mut rebuilt = open(&target).unwrap();
        assert!(rebuilt.by_index(0).unwrap().is_dir());
        assert_eq!(
            rebuilt.by_name("readme.txt").unwrap().compression(),
            zip::CompressionMethod::Stored
        );
    }
}
