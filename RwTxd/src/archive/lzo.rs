//! LZO-framed member compression
//!
//! Compressed IMG members start with [`LZO_MAGIC`] followed by blocks of
//! `{u32 uncompressed_size, u32 compressed_size, data}`. A block header of
//! zeros (sector padding) or the end of the data ends the stream.

use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};

/// First word of an LZO-framed member.
pub const LZO_MAGIC: u32 = 0x67A3A1CE;

/// Uncompressed bytes per block.
pub const LZO_BLOCK_SIZE: usize = 0x20000;

/// Whole-member compression used inside archives.
pub trait StreamCompressionProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// True if `data` was produced by this provider.
    fn is_compressed(&self, data: &[u8]) -> bool;

    /// # Errors
    /// Returns an error if the codec fails.
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// # Errors
    /// Returns an error if `data` is not valid compressed data.
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// LZO1X blocks behind a magic word.
#[derive(Debug, Default, Clone, Copy)]
pub struct LzoCompression;

impl StreamCompressionProvider for LzoCompression {
    fn name(&self) -> &'static str {
        "LZO"
    }

    fn is_compressed(&self, data: &[u8]) -> bool {
        data.len() >= 4 && data[..4] == LZO_MAGIC.to_le_bytes()
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(data.len() / 2 + 16);
        out.write_u32::<LittleEndian>(LZO_MAGIC)?;
        for block in data.chunks(LZO_BLOCK_SIZE) {
            let packed = lzokay_native::compress(block).map_err(|e| Error::codec(format!("LZO: {e:?}")))?;
            out.write_u32::<LittleEndian>(block.len() as u32)?;
            out.write_u32::<LittleEndian>(packed.len() as u32)?;
            out.write_all(&packed)?;
        }
        Ok(out)
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        if !self.is_compressed(data) {
            return Err(Error::archive("member is not LZO compressed"));
        }
        let mut cursor = Cursor::new(&data[4..]);
        let mut out = Vec::new();
        loop {
            let remaining = cursor.get_ref().len() as u64 - cursor.position();
            if remaining < 8 {
                break;
            }
            let uncompressed = cursor.read_u32::<LittleEndian>()? as usize;
            let compressed = cursor.read_u32::<LittleEndian>()? as usize;
            if uncompressed == 0 && compressed == 0 {
                break;
            }
            if uncompressed > LZO_BLOCK_SIZE || compressed as u64 > remaining - 8 {
                return Err(Error::archive(format!(
                    "LZO block of {compressed} bytes ({uncompressed} unpacked) exceeds the member"
                )));
            }
            let mut packed = vec![0u8; compressed];
            cursor.read_exact(&mut packed)?;
            let block = lzokay_native::decompress_all(&packed, Some(uncompressed))
                .map_err(|e| Error::codec(format!("LZO: {e:?}")))?;
            if block.len() != uncompressed {
                return Err(Error::codec(format!(
                    "LZO block unpacked to {} bytes, expected {uncompressed}",
                    block.len()
                )));
            }
            out.extend_from_slice(&block);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_multi_block_member() {
        let data: Vec<u8> = (0..LZO_BLOCK_SIZE * 2 + 100).map(|i| (i / 7 % 251) as u8).collect();
        let packed = LzoCompression.compress(&data).unwrap();
        assert!(LzoCompression.is_compressed(&packed));
        assert!(packed.len() < data.len());

        // Sector padding after the last block is ignored.
        let mut padded = packed.clone();
        padded.resize(packed.len().next_multiple_of(2048), 0);
        assert_eq!(LzoCompression.decompress(&padded).unwrap(), data);
    }

    #[test]
    fn test_rejects_foreign_and_truncated_data() {
        assert!(LzoCompression.decompress(b"TXD data").is_err());

        let packed = LzoCompression.compress(&[5u8; 4096]).unwrap();
        let mut truncated = packed[..12].to_vec();
        truncated.extend_from_slice(&[0xFF; 8]);
        assert!(LzoCompression.decompress(&truncated).is_err());
    }
}
