//! TXD reading and writing
//!
//! ```text
//! TEX_DICTIONARY
//! ├── STRUCT          u16 count, u16 device id (u32 count before 3.6)
//! ├── TEXTURE_NATIVE  per texture
//! │   ├── ...         native payload, owned by the platform handler
//! │   └── EXTENSION
//! └── EXTENSION
//! ```

use std::io::{Read, Seek, Write};

use super::dictionary::TexDictionary;
use super::extensions::{read_extensions, read_trailing_extensions, write_extensions};
use super::texture::Texture;
use crate::block::{BlockReader, BlockWriter, DynBlockReader, DynBlockWriter, ReadSeek, WriteSeek, chunk};
use crate::engine::{Engine, LibraryVersion, WarningLevel};
use crate::error::{Error, Result};
use crate::raster::Raster;

/// First version whose dictionary struct carries a device id.
const DEVICE_ID_VERSION: LibraryVersion = LibraryVersion::new(3, 6, 0, 0);

/// A top-level object read from a stream.
#[derive(Debug)]
pub enum RwObject {
    TexDictionary(TexDictionary),
    Texture(Box<Texture>),
}

impl RwObject {
    /// Chunk name of the object kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TexDictionary(_) => chunk::name(chunk::TEX_DICTIONARY),
            Self::Texture(_) => chunk::name(chunk::TEXTURE_NATIVE),
        }
    }
}

/// Read the object at the start of `stream`.
///
/// # Errors
/// Returns [`Error::UnexpectedObject`] if the stream holds some other chunk.
pub fn read_object<R: Read + Seek>(engine: &Engine, mut stream: R) -> Result<RwObject> {
    let stream: &mut dyn ReadSeek = &mut stream;
    let mut reader = BlockReader::new(stream, engine);
    let header = reader.peek_header()?;
    match header.id {
        chunk::TEX_DICTIONARY => read_dictionary(&mut reader).map(RwObject::TexDictionary),
        chunk::TEXTURE_NATIVE => match read_texture(&mut reader)? {
            Some(texture) => Ok(RwObject::Texture(Box::new(texture))),
            None => Err(Error::UnexpectedObject {
                message: "texture uses an unsupported native platform".to_string(),
            }),
        },
        other => Err(Error::UnexpectedObject {
            message: format!(
                "{} chunk (0x{other:X}) is neither a texture dictionary nor a texture",
                chunk::name(other)
            ),
        }),
    }
}

/// Read a `TEX_DICTIONARY` chunk.
///
/// # Errors
/// Returns an error if the dictionary chunk or its struct is damaged. Damaged
/// textures are skipped with a warning.
fn read_dictionary(reader: &mut DynBlockReader<'_>) -> Result<TexDictionary> {
    let root = reader.enter_context_expect(chunk::TEX_DICTIONARY)?;
    let version = root.block_version();

    let header = reader.enter_context_expect(chunk::STRUCT)?;
    let count = if header.block_version().is_at_least(DEVICE_ID_VERSION) {
        let count = reader.read_u16()?;
        let device_id = reader.read_u16()?;
        tracing::trace!("dictionary of {count} textures for device {device_id}");
        usize::from(count)
    } else {
        reader.read_u32()? as usize
    };
    reader.leave_context(header)?;

    let mut txd = TexDictionary::new(version);
    for index in 0..count {
        match read_texture(reader)? {
            Some(texture) => txd.add_texture(texture),
            None => tracing::debug!("texture {index} skipped"),
        }
    }
    txd.extensions = read_extensions(reader)?;
    if txd.extensions.is_empty() {
        txd.extensions = read_trailing_extensions(reader)?;
    }
    reader.leave_context(root)?;
    Ok(txd)
}

/// Platform id at the start of the native payload, without consuming it.
fn peek_platform_id(reader: &mut DynBlockReader<'_>) -> Result<u32> {
    let ctx = reader.enter_context_expect(chunk::STRUCT)?;
    let id = reader.read_u32();
    reader.abandon(ctx)?;
    id
}

/// Errors confined to one texture; the rest of the dictionary stays readable.
fn is_texture_local(err: &Error) -> bool {
    matches!(
        err,
        Error::CorruptBlock { .. }
            | Error::UnknownChunk { .. }
            | Error::InvalidDimension { .. }
            | Error::CodecFailure { .. }
            | Error::UnsupportedConversion { .. }
            | Error::RasterEmpty
    )
}

/// Read one `TEXTURE_NATIVE` chunk.
///
/// Returns `None` when the texture had to be skipped.
fn read_texture(reader: &mut DynBlockReader<'_>) -> Result<Option<Texture>> {
    let ctx = reader.enter_context_expect(chunk::TEXTURE_NATIVE)?;
    let version = ctx.block_version();

    let platform_id = peek_platform_id(reader)?;
    let Some(handler) = reader.engine().native_types().by_platform_id(platform_id) else {
        reader.engine().warn(
            WarningLevel::Important,
            format!("skipped texture with unknown native platform 0x{platform_id:X}"),
        );
        reader.skip_context(ctx)?;
        return Ok(None);
    };

    let (fields, native) = match handler.deserialize(reader) {
        Ok(parsed) => parsed,
        Err(err) if is_texture_local(&err) => {
            reader.engine().warn(
                WarningLevel::Important,
                format!("skipped damaged {} texture: {err}", handler.name()),
            );
            reader.skip_context(ctx)?;
            return Ok(None);
        }
        Err(err) => return Err(err),
    };

    let raster = Raster::from_native(reader.engine(), native);
    let mut texture = Texture::from_parts(fields, raster, version);
    texture.extensions = read_extensions(reader)?;
    reader.leave_context(ctx)?;
    Ok(Some(texture))
}

/// True if the texture carries pixels a handler can write.
fn is_serializable(engine: &Engine, texture: &Texture) -> bool {
    texture
        .raster()
        .and_then(Raster::native_type_name)
        .is_some_and(|name| engine.native_types().get(name).is_some())
}

/// Write a `TEX_DICTIONARY` chunk.
///
/// Textures without pixels are left out with a warning.
///
/// # Errors
/// Returns an error if a native handler fails to write its payload.
fn write_dictionary_chunk(
    engine: &Engine,
    txd: &TexDictionary,
    writer: &mut DynBlockWriter<'_>,
) -> Result<()> {
    let version = txd.version();
    let textures: Vec<&Texture> = txd
        .textures()
        .filter(|texture| {
            let keep = is_serializable(engine, texture);
            if !keep {
                engine.warn(
                    WarningLevel::Important,
                    format!("texture '{}' has no native pixels and was not written", texture.name()),
                );
            }
            keep
        })
        .collect();

    let root = writer.enter_context(chunk::TEX_DICTIONARY, version)?;
    let header = writer.enter_context(chunk::STRUCT, version)?;
    if version.is_at_least(DEVICE_ID_VERSION) {
        let count = u16::try_from(textures.len())
            .map_err(|_| Error::unsupported(format!("{} textures do not fit one dictionary", textures.len())))?;
        writer.write_u16(count)?;
        writer.write_u16(txd.get_recommended_driver_platform(engine))?;
    } else {
        let count = u32::try_from(textures.len())
            .map_err(|_| Error::unsupported("too many textures for one dictionary"))?;
        writer.write_u32(count)?;
    }
    writer.leave_context(header)?;

    for texture in textures {
        write_texture_chunk(texture, writer)?;
    }
    write_extensions(writer, version, txd.extensions())?;
    writer.leave_context(root)
}

/// Write one `TEXTURE_NATIVE` chunk.
///
/// # Errors
/// Returns [`Error::RasterEmpty`] if the texture has no pixels, or any
/// handler error.
fn write_texture_chunk(texture: &Texture, writer: &mut DynBlockWriter<'_>) -> Result<()> {
    let raster = texture.raster().ok_or(Error::RasterEmpty)?;
    let handler = raster.native_type()?;
    let ctx = writer.enter_context(chunk::TEXTURE_NATIVE, texture.version())?;
    raster.with_native(|native| handler.serialize(texture.fields(), native, writer))?;
    write_extensions(writer, texture.version(), texture.extensions())?;
    writer.leave_context(ctx)
}

/// Write `txd` to `stream` and hand the stream back.
///
/// # Errors
/// Returns an error if any texture fails to serialize.
pub fn write_dictionary<W: Write + Seek>(engine: &Engine, txd: &TexDictionary, mut stream: W) -> Result<W> {
    {
        let dyn_stream: &mut dyn WriteSeek = &mut stream;
        let mut writer = BlockWriter::new(dyn_stream);
        write_dictionary_chunk(engine, txd, &mut writer)?;
        writer.into_inner()?;
    }
    Ok(stream)
}

/// Write a single texture to `stream` and hand the stream back.
///
/// # Errors
/// Returns an error if the texture fails to serialize.
pub fn write_texture<W: Write + Seek>(engine: &Engine, texture: &Texture, mut stream: W) -> Result<W> {
    if !is_serializable(engine, texture) {
        return Err(Error::RasterEmpty);
    }
    {
        let dyn_stream: &mut dyn WriteSeek = &mut stream;
        let mut writer = BlockWriter::new(dyn_stream);
        write_texture_chunk(texture, &mut writer)?;
        writer.into_inner()?;
    }
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::{Compression, PortablePixels};
    use crate::txd::{AddressMode, FilterMode};
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    fn checker(size: u32) -> Vec<u8> {
        (0..size * size)
            .flat_map(|i| {
                if (i % size + i / size) % 2 == 0 {
                    [255, 255, 255, 255]
                } else {
                    [0, 0, 0, 255]
                }
            })
            .collect()
    }

    fn texture_on(engine: &Engine, platform: &str, name: &str) -> Texture {
        let raster = engine.create_raster();
        raster
            .install_pixels(platform, PortablePixels::from_rgba(8, 8, checker(8)))
            .unwrap();
        let mut texture = engine.create_texture(raster);
        texture.set_name(name).unwrap();
        texture
    }

    fn round_trip(engine: &Engine, txd: &TexDictionary) -> TexDictionary {
        let bytes = engine
            .serialize_dictionary(txd, Cursor::new(Vec::new()))
            .unwrap()
            .into_inner();
        match engine.deserialize(Cursor::new(bytes)).unwrap() {
            RwObject::TexDictionary(txd) => txd,
            other => panic!("unexpected {}", other.kind()),
        }
    }

    #[test]
    fn test_empty_dictionary_bytes() {
        let engine = Engine::new();
        let txd = engine.create_tex_dictionary();
        let bytes = engine
            .serialize_dictionary(&txd, Cursor::new(Vec::new()))
            .unwrap()
            .into_inner();
        let stamp = LibraryVersion::san_andreas().to_library_stamp().to_le_bytes();

        let mut expected = Vec::new();
        expected.extend_from_slice(&0x16u32.to_le_bytes());
        expected.extend_from_slice(&28u32.to_le_bytes());
        expected.extend_from_slice(&stamp);
        expected.extend_from_slice(&1u32.to_le_bytes());
        expected.extend_from_slice(&4u32.to_le_bytes());
        expected.extend_from_slice(&stamp);
        expected.extend_from_slice(&[0, 0, 0, 0]);
        expected.extend_from_slice(&3u32.to_le_bytes());
        expected.extend_from_slice(&0u32.to_le_bytes());
        expected.extend_from_slice(&stamp);
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_dictionary_round_trip_keeps_fields() {
        let engine = Engine::new();
        let mut txd = engine.create_tex_dictionary();
        let mut first = texture_on(&engine, "Direct3D9", "wall");
        first.set_filter(FilterMode::Point);
        first.set_addressing(AddressMode::Clamp, AddressMode::Mirror);
        first.set_mask_name("wall_a").unwrap();
        txd.add_texture(first);
        txd.add_texture(texture_on(&engine, "Direct3D9", "floor"));

        let back = round_trip(&engine, &txd);
        assert_eq!(back.texture_count(), 2);
        let wall = back.find_texture("wall").unwrap();
        assert_eq!(wall.filter(), FilterMode::Point);
        assert_eq!(wall.u_addressing(), AddressMode::Clamp);
        assert_eq!(wall.v_addressing(), AddressMode::Mirror);
        assert_eq!(wall.mask_name(), "wall_a");
        assert_eq!(
            wall.raster().unwrap().get_bitmap().unwrap(),
            txd.find_texture("wall").unwrap().raster().unwrap().get_bitmap().unwrap()
        );
    }

    #[test]
    fn test_legacy_dictionary_uses_u32_count() {
        let engine = Engine::new();
        let mut txd = TexDictionary::new(LibraryVersion::gta3());
        let mut texture = texture_on(&engine, "Direct3D8", "old");
        texture.set_version(LibraryVersion::gta3());
        txd.add_texture(texture);
        let bytes = engine
            .serialize_dictionary(&txd, Cursor::new(Vec::new()))
            .unwrap()
            .into_inner();
        // STRUCT payload starts after two headers.
        assert_eq!(&bytes[24..28], &1u32.to_le_bytes());
        assert_eq!(round_trip(&engine, &txd).texture_count(), 1);
    }

    #[test]
    fn test_unknown_platform_is_skipped() {
        let engine = Engine::new();
        let mut txd = engine.create_tex_dictionary();
        txd.add_texture(texture_on(&engine, "Direct3D9", "keep"));
        txd.add_texture(texture_on(&engine, "Direct3D9", "drop"));
        let mut bytes = engine
            .serialize_dictionary(&txd, Cursor::new(Vec::new()))
            .unwrap()
            .into_inner();

        // Patch the platform id of the second texture.
        let second = bytes
            .windows(4)
            .enumerate()
            .filter(|(_, w)| *w == b"drop")
            .map(|(i, _)| i)
            .next()
            .unwrap();
        let platform_offset = second - 8;
        bytes[platform_offset..platform_offset + 4].copy_from_slice(&0x7777u32.to_le_bytes());

        let back = match engine.deserialize(Cursor::new(bytes)).unwrap() {
            RwObject::TexDictionary(txd) => txd,
            other => panic!("unexpected {}", other.kind()),
        };
        assert_eq!(back.texture_count(), 1);
        assert_eq!(back.texture(0).unwrap().name(), "keep");
    }

    #[test]
    fn test_single_texture_object() {
        let engine = Engine::new();
        let texture = texture_on(&engine, "Direct3D9", "solo");
        texture.raster().unwrap().compress_custom(Compression::Dxt1).unwrap();
        let bytes = engine
            .serialize_texture(&texture, Cursor::new(Vec::new()))
            .unwrap()
            .into_inner();
        let object = engine.deserialize(Cursor::new(bytes)).unwrap();
        assert_eq!(object.kind(), chunk::name(chunk::TEXTURE_NATIVE));
        let back = engine.to_texture(object).unwrap();
        assert_eq!(back.name(), "solo");
        assert_eq!(
            back.raster().unwrap().layout().unwrap().compression,
            Compression::Dxt1
        );
    }

    #[test]
    fn test_rejects_other_chunks() {
        let engine = Engine::new();
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0x10u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&LibraryVersion::san_andreas().to_library_stamp().to_le_bytes());
        assert!(matches!(
            engine.deserialize(Cursor::new(bytes)),
            Err(Error::UnexpectedObject { .. })
        ));
    }
}
