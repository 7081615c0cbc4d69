//! RenderWare chunked binary stream
//!
//! Every object in a TXD file is a tree of chunks. A chunk starts with a
//! 12-byte header (`id`, `length`, library stamp) followed by `length` bytes of
//! payload, which is either raw data or a sequence of child chunks.
//!
//! [`BlockReader`] and [`BlockWriter`] keep a stack of open chunks. Each
//! `enter_context` returns a [`BlockContext`] token that must be handed back to
//! `leave_context` in reverse order.

mod reader;
mod writer;

pub use reader::BlockReader;
pub use writer::BlockWriter;

use std::io::{Read, Seek, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::engine::LibraryVersion;

/// Well-known chunk identifiers.
pub mod chunk {
    /// Raw structure payload.
    pub const STRUCT: u32 = 0x01;
    /// Zero-terminated string payload.
    pub const STRING: u32 = 0x02;
    /// Container for plugin extension chunks.
    pub const EXTENSION: u32 = 0x03;
    /// A single native texture.
    pub const TEXTURE_NATIVE: u32 = 0x15;
    /// A texture dictionary.
    pub const TEX_DICTIONARY: u32 = 0x16;
    /// Sky mipmap-K extension written by PlayStation 2 tools.
    pub const SKY_MIPMAP_VAL: u32 = 0x0110;
    /// Editor-private extension carrying a settings container.
    pub const EDITOR_PRIVATE: u32 = 0x0253_F2FE;
    /// Root of a settings container.
    pub const CONFIG: u32 = 0x0253_F2FD;

    /// Human readable chunk name for diagnostics.
    #[must_use]
    pub fn name(id: u32) -> &'static str {
        match id {
            STRUCT => "Struct",
            STRING => "String",
            EXTENSION => "Extension",
            TEXTURE_NATIVE => "TextureNative",
            TEX_DICTIONARY => "TexDictionary",
            SKY_MIPMAP_VAL => "SkyMipmapVal",
            EDITOR_PRIVATE => "EditorPrivate",
            CONFIG => "Config",
            _ => "Unknown",
        }
    }
}

/// Object-safe `Read + Seek`.
pub trait ReadSeek: Read + Seek {}
impl<T: Read + Seek + ?Sized> ReadSeek for T {}

/// Object-safe `Write + Seek`.
pub trait WriteSeek: Write + Seek {}
impl<T: Write + Seek + ?Sized> WriteSeek for T {}

/// Reader over a type-erased stream, as handed to native texture handlers.
pub type DynBlockReader<'a> = BlockReader<&'a mut dyn ReadSeek>;
/// Writer over a type-erased stream, as handed to native texture handlers.
pub type DynBlockWriter<'a> = BlockWriter<&'a mut dyn WriteSeek>;

/// Size of a chunk header on disk.
pub const HEADER_SIZE: u64 = 12;

/// A fixed-layout little-endian record.
pub trait BinaryRecord: Sized {
    /// Encoded size in bytes.
    const SIZE: usize;

    /// Decode one record.
    ///
    /// # Errors
    /// Returns an IO error if the stream ends early.
    fn read_from<R: Read>(reader: &mut R) -> std::io::Result<Self>;

    /// Encode one record.
    ///
    /// # Errors
    /// Returns an IO error if the stream cannot be written.
    fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()>;
}

/// The 12-byte chunk header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub id: u32,
    pub length: u32,
    pub stamp: u32,
}

impl BlockHeader {
    /// Library version encoded in the stamp.
    #[must_use]
    pub fn version(&self) -> LibraryVersion {
        LibraryVersion::from_library_stamp(self.stamp)
    }
}

impl BinaryRecord for BlockHeader {
    const SIZE: usize = 12;

    fn read_from<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        Ok(Self {
            id: reader.read_u32::<LittleEndian>()?,
            length: reader.read_u32::<LittleEndian>()?,
            stamp: reader.read_u32::<LittleEndian>()?,
        })
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_u32::<LittleEndian>(self.id)?;
        writer.write_u32::<LittleEndian>(self.length)?;
        writer.write_u32::<LittleEndian>(self.stamp)
    }
}

/// Token for one open chunk. Hand it back to `leave_context` to close the chunk.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "an entered block must be left"]
pub struct BlockContext {
    depth: usize,
    id: u32,
    version: LibraryVersion,
    length: u64,
}

impl BlockContext {
    /// Chunk id.
    pub fn block_id(&self) -> u32 {
        self.id
    }

    /// Library version of the chunk.
    pub fn block_version(&self) -> LibraryVersion {
        self.version
    }

    /// Declared payload length. Zero for chunks still being written.
    pub fn block_length(&self) -> u64 {
        self.length
    }
}

/// Bookkeeping for one open chunk.
#[derive(Debug, Clone, Copy)]
struct OpenBlock {
    id: u32,
    version: LibraryVersion,
    header_pos: u64,
    payload_start: u64,
    declared_length: u64,
}

impl OpenBlock {
    fn declared_end(&self) -> u64 {
        self.payload_start + self.declared_length
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Engine, EngineConfig};
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    fn engine(permissive: bool) -> Engine {
        Engine::with_config(EngineConfig {
            ignore_block_regions: permissive,
            ..EngineConfig::default()
        })
    }

    fn nested_stream() -> Vec<u8> {
        let version = LibraryVersion::san_andreas();
        let mut writer = BlockWriter::new(Cursor::new(Vec::new()));
        let root = writer.enter_context(chunk::TEX_DICTIONARY, version).unwrap();
        let inner = writer.enter_context(chunk::STRUCT, version).unwrap();
        writer.write_u32(0xDEAD_BEEF).unwrap();
        writer.write_u16(7).unwrap();
        writer.leave_context(inner).unwrap();
        let ext = writer.enter_context(chunk::EXTENSION, version).unwrap();
        writer.leave_context(ext).unwrap();
        writer.leave_context(root).unwrap();
        writer.into_inner().unwrap().into_inner()
    }

    #[test]
    fn test_writer_back_patches_lengths() {
        let bytes = nested_stream();
        assert_eq!(bytes.len(), 12 + 12 + 6 + 12);
        let header = BlockHeader::read_from(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(header.id, chunk::TEX_DICTIONARY);
        assert_eq!(header.length, 30);
        assert_eq!(header.version(), LibraryVersion::san_andreas());
    }

    #[test]
    fn test_reader_cursor_balances_in_strict_mode() {
        let bytes = nested_stream();
        let mut reader = BlockReader::new(Cursor::new(bytes.clone()), &engine(false));
        let root = reader.enter_context().unwrap();
        assert_eq!(root.block_id(), chunk::TEX_DICTIONARY);
        assert_eq!(root.block_length(), 30);

        let inner = reader.enter_context_expect(chunk::STRUCT).unwrap();
        assert_eq!(reader.read_u32().unwrap(), 0xDEAD_BEEF);
        // Leave without consuming the trailing u16.
        reader.leave_context(inner).unwrap();

        let ext = reader.enter_context_expect(chunk::EXTENSION).unwrap();
        assert!(reader.is_at_end().unwrap());
        reader.leave_context(ext).unwrap();
        reader.leave_context(root).unwrap();
        assert_eq!(reader.position().unwrap(), bytes.len() as u64);
    }

    #[test]
    fn test_strict_mode_rejects_reads_past_block() {
        let bytes = nested_stream();
        let mut reader = BlockReader::new(Cursor::new(bytes), &engine(false));
        let root = reader.enter_context().unwrap();
        let inner = reader.enter_context().unwrap();
        reader.read_u32().unwrap();
        reader.read_u16().unwrap();
        assert!(matches!(reader.read_u8(), Err(crate::Error::CorruptBlock { .. })));
        reader.leave_context(inner).unwrap();
        let _ = root;
    }

    #[test]
    fn test_truncated_stream_is_corrupt() {
        let mut bytes = nested_stream();
        bytes.truncate(20);
        let mut reader = BlockReader::new(Cursor::new(bytes), &engine(true));
        let _root = reader.enter_context().unwrap();
        let result = reader.enter_context();
        assert!(matches!(result, Err(crate::Error::CorruptBlock { .. })));
    }

    #[test]
    fn test_unbalanced_leave_is_rejected() {
        let bytes = nested_stream();
        let mut reader = BlockReader::new(Cursor::new(bytes), &engine(false));
        let root = reader.enter_context().unwrap();
        let inner = reader.enter_context().unwrap();
        assert!(matches!(
            reader.leave_context(root),
            Err(crate::Error::BlockContextUnbalanced { .. })
        ));
        reader.leave_context(inner).unwrap();
    }

    #[test]
    fn test_unexpected_chunk_id() {
        let bytes = nested_stream();
        let mut reader = BlockReader::new(Cursor::new(bytes), &engine(false));
        let result = reader.enter_context_expect(chunk::TEXTURE_NATIVE);
        assert!(matches!(
            result,
            Err(crate::Error::UnknownChunk {
                expected: chunk::TEXTURE_NATIVE,
                found: chunk::TEX_DICTIONARY
            })
        ));
    }

    #[test]
    fn test_permissive_mode_trusts_consumed_bytes() {
        let mut bytes = nested_stream();
        // Understate the root length by the size of the trailing extension.
        bytes[4..8].copy_from_slice(&18u32.to_le_bytes());

        let mut reader = BlockReader::new(Cursor::new(bytes.clone()), &engine(true));
        let root = reader.enter_context().unwrap();
        let inner = reader.enter_context().unwrap();
        reader.leave_context(inner).unwrap();
        let ext = reader.enter_context_expect(chunk::EXTENSION).unwrap();
        reader.leave_context(ext).unwrap();
        reader.leave_context(root).unwrap();
        assert_eq!(reader.position().unwrap(), bytes.len() as u64);
    }
}
