//! Chunk stream reader

use std::io::{ErrorKind, Read, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};

use super::{BinaryRecord, BlockContext, BlockHeader, HEADER_SIZE, OpenBlock, chunk};
use crate::engine::{Engine, LibraryVersion, WarningLevel};
use crate::error::{Error, Result};

/// Reads nested chunks from a seekable stream.
///
/// In strict mode a read that would cross the end of the innermost chunk fails
/// with [`Error::CorruptBlock`], and leaving a chunk always resumes at its
/// declared end. In permissive mode (`ignore_block_regions`) declared lengths
/// are only advisory: reads may run past them and leaving a chunk resumes at
/// whichever of the consumed or declared end lies further.
pub struct BlockReader<R> {
    inner: R,
    stack: Vec<OpenBlock>,
    permissive: bool,
    engine: Engine,
}

fn map_eof(err: std::io::Error) -> Error {
    if err.kind() == ErrorKind::UnexpectedEof {
        Error::corrupt("unexpected end of stream")
    } else {
        Error::Io(err)
    }
}

impl<R: Read + Seek> BlockReader<R> {
    /// Wrap a stream. The engine's permissive toggle is sampled once here.
    pub fn new(inner: R, engine: &Engine) -> Self {
        Self {
            inner,
            stack: Vec::new(),
            permissive: engine.config().ignore_block_regions,
            engine: engine.clone(),
        }
    }

    /// True if declared chunk lengths are advisory.
    pub fn is_permissive(&self) -> bool {
        self.permissive
    }

    /// Engine this reader reports warnings to.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Absolute stream position.
    ///
    /// # Errors
    /// Returns an IO error if the stream cannot report its position.
    pub fn position(&mut self) -> Result<u64> {
        Ok(self.inner.stream_position()?)
    }

    /// Consume the reader and return the stream.
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Parse a chunk header at the cursor and open the chunk.
    ///
    /// # Errors
    /// Returns [`Error::CorruptBlock`] on truncation, or in strict mode when the
    /// chunk does not fit into its parent.
    pub fn enter_context(&mut self) -> Result<BlockContext> {
        let header_pos = self.position()?;
        if !self.permissive
            && let Some(parent) = self.stack.last()
            && header_pos + HEADER_SIZE > parent.declared_end()
        {
            return Err(Error::corrupt(format!(
                "chunk header at 0x{header_pos:X} lies outside its parent {}",
                chunk::name(parent.id)
            )));
        }

        let header = BlockHeader::read_from(&mut self.inner).map_err(map_eof)?;
        let payload_start = header_pos + HEADER_SIZE;
        let declared_length = u64::from(header.length);

        if !self.permissive
            && let Some(parent) = self.stack.last()
            && payload_start + declared_length > parent.declared_end()
        {
            return Err(Error::corrupt(format!(
                "{} chunk of {declared_length} bytes overruns its parent {}",
                chunk::name(header.id),
                chunk::name(parent.id)
            )));
        }

        let open = OpenBlock {
            id: header.id,
            version: header.version(),
            header_pos,
            payload_start,
            declared_length,
        };
        self.stack.push(open);
        tracing::trace!(
            "enter {} (0x{:X}) at 0x{header_pos:X}, {declared_length} bytes",
            chunk::name(header.id),
            header.id
        );

        Ok(BlockContext {
            depth: self.stack.len(),
            id: open.id,
            version: open.version,
            length: declared_length,
        })
    }

    /// Open a chunk and require a specific id.
    ///
    /// On a mismatch the cursor is restored to the header.
    ///
    /// # Errors
    /// Returns [`Error::UnknownChunk`] if the chunk has a different id.
    pub fn enter_context_expect(&mut self, id: u32) -> Result<BlockContext> {
        let ctx = self.enter_context()?;
        if ctx.id != id {
            let found = ctx.id;
            self.abandon(ctx)?;
            return Err(Error::UnknownChunk { expected: id, found });
        }
        Ok(ctx)
    }

    /// Read the next chunk header without consuming it.
    ///
    /// # Errors
    /// Returns [`Error::CorruptBlock`] if no full header remains.
    pub fn peek_header(&mut self) -> Result<BlockHeader> {
        let pos = self.position()?;
        let header = BlockHeader::read_from(&mut self.inner).map_err(map_eof);
        self.inner.seek(SeekFrom::Start(pos))?;
        header
    }

    /// Close a chunk opened by [`enter_context`](Self::enter_context).
    ///
    /// # Errors
    /// Returns [`Error::BlockContextUnbalanced`] if `ctx` is not the innermost open chunk.
    pub fn leave_context(&mut self, ctx: BlockContext) -> Result<()> {
        let open = self.pop_matching(&ctx)?;
        let declared_end = open.declared_end();

        let target = if self.permissive {
            let consumed_end = self.position()?;
            if consumed_end != declared_end {
                self.engine.warn(
                    WarningLevel::Important,
                    format!(
                        "block region size mismatch in {} chunk: declared {} bytes, consumed {}",
                        chunk::name(open.id),
                        open.declared_length,
                        consumed_end.saturating_sub(open.payload_start)
                    ),
                );
            }
            consumed_end.max(declared_end)
        } else {
            declared_end
        };

        self.inner.seek(SeekFrom::Start(target))?;
        Ok(())
    }

    /// Close a chunk and rewind to its header, as if it had never been entered.
    ///
    /// # Errors
    /// Returns [`Error::BlockContextUnbalanced`] if `ctx` is not the innermost open chunk.
    pub fn abandon(&mut self, ctx: BlockContext) -> Result<()> {
        let open = self.pop_matching(&ctx)?;
        self.inner.seek(SeekFrom::Start(open.header_pos))?;
        Ok(())
    }

    /// Close `ctx` together with any chunks a failed parse left open inside
    /// it, and resume at its declared end.
    ///
    /// # Errors
    /// Returns [`Error::BlockContextUnbalanced`] if `ctx` is no longer open.
    pub fn skip_context(&mut self, ctx: BlockContext) -> Result<()> {
        if self.stack.len() > ctx.depth {
            self.stack.truncate(ctx.depth);
        }
        let open = self.pop_matching(&ctx)?;
        self.inner.seek(SeekFrom::Start(open.declared_end()))?;
        Ok(())
    }

    fn pop_matching(&mut self, ctx: &BlockContext) -> Result<OpenBlock> {
        match self.stack.last() {
            Some(open) if self.stack.len() == ctx.depth && open.id == ctx.id => {}
            Some(open) => {
                return Err(Error::BlockContextUnbalanced {
                    message: format!(
                        "tried to leave {} at depth {} while {} at depth {} is open",
                        chunk::name(ctx.id),
                        ctx.depth,
                        chunk::name(open.id),
                        self.stack.len()
                    ),
                });
            }
            None => {
                return Err(Error::BlockContextUnbalanced {
                    message: format!("no open chunk to leave ({})", chunk::name(ctx.id)),
                });
            }
        }
        self.stack
            .pop()
            .ok_or_else(|| Error::BlockContextUnbalanced {
                message: "chunk stack is empty".to_string(),
            })
    }

    /// Id of the innermost open chunk.
    pub fn block_id(&self) -> Option<u32> {
        self.stack.last().map(|b| b.id)
    }

    /// Version of the innermost open chunk.
    pub fn block_version(&self) -> Option<LibraryVersion> {
        self.stack.last().map(|b| b.version)
    }

    /// Declared length of the innermost open chunk.
    pub fn block_length(&self) -> Option<u64> {
        self.stack.last().map(|b| b.declared_length)
    }

    /// Bytes left before the declared end of the innermost chunk.
    ///
    /// # Errors
    /// Returns an IO error if the stream cannot report its position.
    pub fn remaining(&mut self) -> Result<u64> {
        let pos = self.position()?;
        Ok(self
            .stack
            .last()
            .map_or(u64::MAX, |b| b.declared_end().saturating_sub(pos)))
    }

    /// True once the cursor reached the declared end of the innermost chunk.
    ///
    /// # Errors
    /// Returns an IO error if the stream cannot report its position.
    pub fn is_at_end(&mut self) -> Result<bool> {
        Ok(self.remaining()? == 0)
    }

    fn check_bounds(&mut self, n: u64) -> Result<()> {
        if self.permissive {
            return Ok(());
        }
        if let Some(open) = self.stack.last().copied() {
            let pos = self.position()?;
            if pos + n > open.declared_end() {
                return Err(Error::corrupt(format!(
                    "read of {n} bytes at 0x{pos:X} crosses the end of {} chunk",
                    chunk::name(open.id)
                )));
            }
        }
        Ok(())
    }

    /// # Errors
    /// Returns [`Error::CorruptBlock`] on truncation or a chunk overrun.
    pub fn read_u8(&mut self) -> Result<u8> {
        self.check_bounds(1)?;
        self.inner.read_u8().map_err(map_eof)
    }

    /// # Errors
    /// Returns [`Error::CorruptBlock`] on truncation or a chunk overrun.
    pub fn read_u16(&mut self) -> Result<u16> {
        self.check_bounds(2)?;
        self.inner.read_u16::<LittleEndian>().map_err(map_eof)
    }

    /// # Errors
    /// Returns [`Error::CorruptBlock`] on truncation or a chunk overrun.
    pub fn read_u32(&mut self) -> Result<u32> {
        self.check_bounds(4)?;
        self.inner.read_u32::<LittleEndian>().map_err(map_eof)
    }

    /// # Errors
    /// Returns [`Error::CorruptBlock`] on truncation or a chunk overrun.
    pub fn read_u64(&mut self) -> Result<u64> {
        self.check_bounds(8)?;
        self.inner.read_u64::<LittleEndian>().map_err(map_eof)
    }

    /// # Errors
    /// Returns [`Error::CorruptBlock`] on truncation or a chunk overrun.
    pub fn read_f32(&mut self) -> Result<f32> {
        self.check_bounds(4)?;
        self.inner.read_f32::<LittleEndian>().map_err(map_eof)
    }

    /// Fill `buf` completely.
    ///
    /// # Errors
    /// Returns [`Error::CorruptBlock`] on truncation or a chunk overrun.
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.check_bounds(buf.len() as u64)?;
        self.inner.read_exact(buf).map_err(map_eof)
    }

    /// Read `n` bytes into a new buffer.
    ///
    /// # Errors
    /// Returns [`Error::CorruptBlock`] on truncation or a chunk overrun, and
    /// [`Error::OutOfMemory`] for absurd sizes.
    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        const LIMIT: usize = 1 << 30;
        if n > LIMIT {
            return Err(Error::OutOfMemory { bytes: n as u64 });
        }
        let mut buf = vec![0u8; n];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Read a fixed-size record.
    ///
    /// # Errors
    /// Returns [`Error::CorruptBlock`] on truncation or a chunk overrun.
    pub fn read_struct<T: BinaryRecord>(&mut self) -> Result<T> {
        self.check_bounds(T::SIZE as u64)?;
        T::read_from(&mut self.inner).map_err(map_eof)
    }

    /// Read a zero-padded fixed-width string field.
    ///
    /// # Errors
    /// Returns [`Error::CorruptBlock`] on truncation or a chunk overrun.
    pub fn read_fixed_string(&mut self, width: usize) -> Result<String> {
        let raw = self.read_bytes(width)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
    }

    /// Read a `STRING` chunk.
    ///
    /// # Errors
    /// Returns [`Error::UnknownChunk`] if the next chunk is not a string.
    pub fn read_string_chunk(&mut self) -> Result<String> {
        let ctx = self.enter_context_expect(chunk::STRING)?;
        let length = usize::try_from(ctx.block_length())
            .map_err(|_| Error::corrupt("string chunk too large"))?;
        let value = self.read_fixed_string(length);
        self.leave_context(ctx)?;
        value
    }

    /// Advance the cursor by `n` bytes.
    ///
    /// # Errors
    /// Returns [`Error::CorruptBlock`] on a chunk overrun.
    pub fn skip(&mut self, n: u64) -> Result<()> {
        self.check_bounds(n)?;
        let offset = i64::try_from(n).map_err(|_| Error::corrupt("skip distance too large"))?;
        self.inner.seek(SeekFrom::Current(offset))?;
        Ok(())
    }

    /// Read the rest of the innermost chunk.
    ///
    /// # Errors
    /// Returns [`Error::CorruptBlock`] on truncation.
    pub fn read_remaining(&mut self) -> Result<Vec<u8>> {
        let remaining = self.remaining()?;
        let n = usize::try_from(remaining).map_err(|_| Error::corrupt("chunk too large"))?;
        self.read_bytes(n)
    }
}
