//! Chunk stream writer

use std::io::{Seek, SeekFrom, Write};

use byteorder::{LittleEndian, WriteBytesExt};

use super::{BinaryRecord, BlockContext, BlockHeader, HEADER_SIZE, OpenBlock, chunk};
use crate::engine::LibraryVersion;
use crate::error::{Error, Result};

/// Writes nested chunks, back-patching each length when the chunk is left.
pub struct BlockWriter<W> {
    inner: W,
    stack: Vec<OpenBlock>,
}

impl<W: Write + Seek> BlockWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            stack: Vec::new(),
        }
    }

    /// Flush and return the stream.
    ///
    /// # Errors
    /// Returns [`Error::BlockContextUnbalanced`] if a chunk is still open.
    pub fn into_inner(mut self) -> Result<W> {
        if let Some(open) = self.stack.last() {
            return Err(Error::BlockContextUnbalanced {
                message: format!("{} chunk was never left", chunk::name(open.id)),
            });
        }
        self.inner.flush()?;
        Ok(self.inner)
    }

    /// Absolute stream position.
    ///
    /// # Errors
    /// Returns an IO error if the stream cannot report its position.
    pub fn position(&mut self) -> Result<u64> {
        Ok(self.inner.stream_position()?)
    }

    /// Reserve a header and open a chunk.
    ///
    /// # Errors
    /// Returns an IO error if the header cannot be written.
    pub fn enter_context(&mut self, id: u32, version: LibraryVersion) -> Result<BlockContext> {
        let header_pos = self.position()?;
        BlockHeader {
            id,
            length: 0,
            stamp: version.to_library_stamp(),
        }
        .write_to(&mut self.inner)?;

        self.stack.push(OpenBlock {
            id,
            version,
            header_pos,
            payload_start: header_pos + HEADER_SIZE,
            declared_length: 0,
        });
        Ok(BlockContext {
            depth: self.stack.len(),
            id,
            version,
            length: 0,
        })
    }

    /// Close the innermost chunk and patch its length.
    ///
    /// # Errors
    /// Returns [`Error::BlockContextUnbalanced`] if `ctx` is not the innermost open
    /// chunk, or [`Error::CorruptBlock`] if the payload exceeds 4 GiB.
    pub fn leave_context(&mut self, ctx: BlockContext) -> Result<()> {
        match self.stack.last() {
            Some(open) if self.stack.len() == ctx.depth && open.id == ctx.id => {}
            _ => {
                return Err(Error::BlockContextUnbalanced {
                    message: format!(
                        "tried to close {} at depth {} with {} chunks open",
                        chunk::name(ctx.id),
                        ctx.depth,
                        self.stack.len()
                    ),
                });
            }
        }
        let Some(open) = self.stack.pop() else {
            return Err(Error::BlockContextUnbalanced {
                message: "chunk stack is empty".to_string(),
            });
        };

        let end = self.position()?;
        let length = u32::try_from(end - open.payload_start)
            .map_err(|_| Error::corrupt(format!("{} chunk exceeds 4 GiB", chunk::name(open.id))))?;

        self.inner.seek(SeekFrom::Start(open.header_pos + 4))?;
        self.inner.write_u32::<LittleEndian>(length)?;
        self.inner.seek(SeekFrom::Start(end))?;
        Ok(())
    }

    /// Current chunk version, used by nested writers that inherit it.
    pub fn block_version(&self) -> Option<LibraryVersion> {
        self.stack.last().map(|b| b.version)
    }

    /// # Errors
    /// Returns an IO error if the stream cannot be written.
    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        Ok(self.inner.write_u8(value)?)
    }

    /// # Errors
    /// Returns an IO error if the stream cannot be written.
    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        Ok(self.inner.write_u16::<LittleEndian>(value)?)
    }

    /// # Errors
    /// Returns an IO error if the stream cannot be written.
    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        Ok(self.inner.write_u32::<LittleEndian>(value)?)
    }

    /// # Errors
    /// Returns an IO error if the stream cannot be written.
    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        Ok(self.inner.write_u64::<LittleEndian>(value)?)
    }

    /// # Errors
    /// Returns an IO error if the stream cannot be written.
    pub fn write_f32(&mut self, value: f32) -> Result<()> {
        Ok(self.inner.write_f32::<LittleEndian>(value)?)
    }

    /// # Errors
    /// Returns an IO error if the stream cannot be written.
    pub fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        Ok(self.inner.write_all(data)?)
    }

    /// # Errors
    /// Returns an IO error if the stream cannot be written.
    pub fn write_struct<T: BinaryRecord>(&mut self, record: &T) -> Result<()> {
        Ok(record.write_to(&mut self.inner)?)
    }

    /// Write `value` zero-padded to `width` bytes. Longer values are truncated;
    /// a value of exactly `width` bytes is written without a terminator.
    ///
    /// # Errors
    /// Returns an IO error if the stream cannot be written.
    pub fn write_fixed_string(&mut self, value: &str, width: usize) -> Result<()> {
        let mut field = vec![0u8; width];
        let bytes = value.as_bytes();
        let n = bytes.len().min(width);
        field[..n].copy_from_slice(&bytes[..n]);
        self.write_bytes(&field)
    }

    /// Write a `STRING` chunk, padded to a multiple of four bytes.
    ///
    /// # Errors
    /// Returns an IO error if the stream cannot be written.
    pub fn write_string_chunk(&mut self, value: &str, version: LibraryVersion) -> Result<()> {
        let ctx = self.enter_context(chunk::STRING, version)?;
        let padded = (value.len() + 4) & !3;
        self.write_fixed_string(value, padded)?;
        self.leave_context(ctx)
    }

    /// Write `n` zero bytes.
    ///
    /// # Errors
    /// Returns an IO error if the stream cannot be written.
    pub fn write_zeros(&mut self, n: usize) -> Result<()> {
        self.write_bytes(&vec![0u8; n])
    }
}
