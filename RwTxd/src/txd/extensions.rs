//! Extension chunks
//!
//! Textures and dictionaries end with an `EXTENSION` chunk holding plugin
//! data. None of it is interpreted while loading; every child is kept as raw
//! bytes and written back unchanged.

use crate::block::{DynBlockReader, DynBlockWriter, chunk};
use crate::engine::{LibraryVersion, WarningLevel};
use crate::error::Result;

/// One plugin chunk from an `EXTENSION` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawExtension {
    pub id: u32,
    pub version: LibraryVersion,
    pub data: Vec<u8>,
}

impl RawExtension {
    #[must_use]
    pub fn new(id: u32, version: LibraryVersion, data: Vec<u8>) -> Self {
        Self { id, version, data }
    }
}

/// Read an `EXTENSION` chunk if one follows inside the current chunk.
///
/// A damaged child ends the list with a warning; everything read up to that
/// point is kept.
///
/// # Errors
/// Returns an error if the extension chunk itself cannot be opened.
pub(crate) fn read_extensions(reader: &mut DynBlockReader<'_>) -> Result<Vec<RawExtension>> {
    if reader.remaining()? < crate::block::HEADER_SIZE {
        return Ok(Vec::new());
    }
    match reader.peek_header() {
        Ok(header) if header.id == chunk::EXTENSION => read_extension_chunk(reader),
        _ => Ok(Vec::new()),
    }
}

/// Permissive reads only: pick up an `EXTENSION` chunk that starts at or
/// beyond the declared end of the current chunk.
///
/// Writers that under-report a dictionary's length leave its extension
/// outside the declared region; it is read anyway and reported.
///
/// # Errors
/// Returns an error if the extension chunk itself cannot be opened.
pub(crate) fn read_trailing_extensions(reader: &mut DynBlockReader<'_>) -> Result<Vec<RawExtension>> {
    if !reader.is_permissive() || reader.remaining()? >= crate::block::HEADER_SIZE {
        return Ok(Vec::new());
    }
    let owner = reader.block_id().map_or("stream", chunk::name);
    match reader.peek_header() {
        Ok(header) if header.id == chunk::EXTENSION => {
            reader.engine().warn(
                WarningLevel::Important,
                format!("extension chunk lies past the declared end of the {owner} chunk; reading it anyway"),
            );
            read_extension_chunk(reader)
        }
        _ => Ok(Vec::new()),
    }
}

fn read_extension_chunk(reader: &mut DynBlockReader<'_>) -> Result<Vec<RawExtension>> {
    let ctx = reader.enter_context_expect(chunk::EXTENSION)?;
    let mut extensions = Vec::new();
    while reader.remaining()? >= crate::block::HEADER_SIZE {
        let child = match reader.enter_context() {
            Ok(child) => child,
            Err(err) => {
                reader.engine().warn(
                    WarningLevel::Important,
                    format!("dropped damaged extension chunk: {err}"),
                );
                reader.skip_context(ctx)?;
                return Ok(extensions);
            }
        };
        let id = child.block_id();
        let version = child.block_version();
        match reader.read_remaining() {
            Ok(data) => {
                reader.leave_context(child)?;
                extensions.push(RawExtension::new(id, version, data));
            }
            Err(err) => {
                reader.engine().warn_secure(
                    WarningLevel::Important,
                    format!("skipped unreadable {} extension: {err}", chunk::name(id)),
                );
                reader.skip_context(child)?;
            }
        }
    }
    reader.leave_context(ctx)?;
    Ok(extensions)
}

/// Write an `EXTENSION` chunk holding `extensions`.
///
/// # Errors
/// Returns an IO error if the stream cannot be written.
pub(crate) fn write_extensions(
    writer: &mut DynBlockWriter<'_>,
    version: LibraryVersion,
    extensions: &[RawExtension],
) -> Result<()> {
    let ctx = writer.enter_context(chunk::EXTENSION, version)?;
    for extension in extensions {
        let child = writer.enter_context(extension.id, extension.version)?;
        writer.write_bytes(&extension.data)?;
        writer.leave_context(child)?;
    }
    writer.leave_context(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BlockReader, BlockWriter, ReadSeek, WriteSeek};
    use crate::engine::Engine;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    #[test]
    fn test_unknown_extensions_survive() {
        let version = LibraryVersion::san_andreas();
        let extensions = vec![
            RawExtension::new(chunk::SKY_MIPMAP_VAL, version, vec![0xFC, 0x0F, 0, 0]),
            RawExtension::new(0x0253_F2F3, version, vec![1, 2, 3]),
        ];
        let mut buffer = Cursor::new(Vec::new());
        {
            let stream: &mut dyn WriteSeek = &mut buffer;
            let mut writer = BlockWriter::new(stream);
            write_extensions(&mut writer, version, &extensions).unwrap();
        }
        buffer.set_position(0);
        let engine = Engine::new();
        let stream: &mut dyn ReadSeek = &mut buffer;
        let mut reader = BlockReader::new(stream, &engine);
        assert_eq!(read_extensions(&mut reader).unwrap(), extensions);
    }

    #[test]
    fn test_missing_extension_chunk_reads_empty() {
        let mut buffer = Cursor::new(Vec::new());
        let engine = Engine::new();
        let stream: &mut dyn ReadSeek = &mut buffer;
        let mut reader = BlockReader::new(stream, &engine);
        assert!(read_extensions(&mut reader).unwrap().is_empty());
    }
}
