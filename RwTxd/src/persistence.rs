//! Editor state stored in block streams
//!
//! The container is a `CONFIG` chunk whose children are `STRUCT` chunks, one
//! per subsystem. Each child starts with the subsystem's sector id and a
//! fixed checksum word. Children that fail these checks are skipped so newer
//! files still load.

use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::block::{BinaryRecord, BlockReader, BlockWriter, DynBlockReader, ReadSeek, WriteSeek, chunk};
use crate::engine::{Engine, LibraryVersion, WarningLevel};
use crate::error::Result;
use crate::txd::TexDictionary;

/// Checksum word following every sector id.
pub const SECTION_CHECKSUM: u16 = 0x5158;

/// Header at the start of every section payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SectionHeader {
    sector_id: u16,
    checksum: u16,
}

impl BinaryRecord for SectionHeader {
    const SIZE: usize = 4;

    fn read_from<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        Ok(Self {
            sector_id: reader.read_u16::<LittleEndian>()?,
            checksum: reader.read_u16::<LittleEndian>()?,
        })
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_u16::<LittleEndian>(self.sector_id)?;
        writer.write_u16::<LittleEndian>(self.checksum)
    }
}

/// One subsystem's saved state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistenceSection {
    pub sector_id: u16,
    pub data: Vec<u8>,
}

/// Ordered set of subsystem sections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistenceContainer {
    sections: Vec<PersistenceSection>,
}

impl PersistenceContainer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Data of the section with `sector_id`.
    #[must_use]
    pub fn get(&self, sector_id: u16) -> Option<&[u8]> {
        self.sections
            .iter()
            .find(|s| s.sector_id == sector_id)
            .map(|s| s.data.as_slice())
    }

    /// Store `data` for `sector_id`, replacing an existing section.
    pub fn set(&mut self, sector_id: u16, data: Vec<u8>) {
        match self.sections.iter_mut().find(|s| s.sector_id == sector_id) {
            Some(section) => section.data = data,
            None => self.sections.push(PersistenceSection { sector_id, data }),
        }
    }

    pub fn remove(&mut self, sector_id: u16) -> Option<Vec<u8>> {
        let index = self.sections.iter().position(|s| s.sector_id == sector_id)?;
        Some(self.sections.remove(index).data)
    }

    pub fn sections(&self) -> &[PersistenceSection] {
        &self.sections
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Read a container from a `CONFIG` chunk.
    ///
    /// # Errors
    /// Returns an error if the stream does not start with a `CONFIG` chunk.
    pub fn read(engine: &Engine, data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let stream: &mut dyn ReadSeek = &mut cursor;
        let mut reader = BlockReader::new(stream, engine);
        let root = reader.enter_context_expect(chunk::CONFIG)?;
        let mut container = Self::new();
        while reader.remaining()? >= crate::block::HEADER_SIZE {
            let child = reader.enter_context()?;
            match read_section(&mut reader, child.block_id()) {
                Ok(Some(section)) => container.sections.push(section),
                Ok(None) => {}
                Err(err) => engine.warn(
                    WarningLevel::Verbose,
                    format!("skipped damaged editor state section: {err}"),
                ),
            }
            reader.skip_context(child)?;
        }
        reader.leave_context(root)?;
        Ok(container)
    }

    /// Write the container as a `CONFIG` chunk.
    ///
    /// # Errors
    /// Returns an IO error if writing fails.
    pub fn write(&self, version: LibraryVersion) -> Result<Vec<u8>> {
        let mut buffer = Cursor::new(Vec::new());
        {
            let stream: &mut dyn WriteSeek = &mut buffer;
            let mut writer = BlockWriter::new(stream);
            let root = writer.enter_context(chunk::CONFIG, version)?;
            for section in &self.sections {
                let child = writer.enter_context(chunk::STRUCT, version)?;
                writer.write_struct(&SectionHeader {
                    sector_id: section.sector_id,
                    checksum: SECTION_CHECKSUM,
                })?;
                writer.write_bytes(&section.data)?;
                writer.leave_context(child)?;
            }
            writer.leave_context(root)?;
        }
        Ok(buffer.into_inner())
    }

    /// Editor state carried by a dictionary, if any.
    ///
    /// # Errors
    /// Returns an error if the dictionary carries a damaged container.
    pub fn from_dictionary(engine: &Engine, txd: &TexDictionary) -> Result<Option<Self>> {
        txd.editor_private()
            .map(|data| Self::read(engine, data))
            .transpose()
    }

    /// Attach the container to a dictionary as its editor-private extension.
    ///
    /// # Errors
    /// Returns an IO error if encoding fails.
    pub fn store_in(&self, txd: &mut TexDictionary) -> Result<()> {
        let data = self.write(txd.version())?;
        txd.set_editor_private(data);
        Ok(())
    }
}

/// Section of the current child chunk, `None` for foreign children.
fn read_section(reader: &mut DynBlockReader<'_>, id: u32) -> Result<Option<PersistenceSection>> {
    if id != chunk::STRUCT {
        tracing::debug!("ignoring {} chunk in editor state", chunk::name(id));
        return Ok(None);
    }
    let header: SectionHeader = reader.read_struct()?;
    if header.checksum != SECTION_CHECKSUM {
        tracing::debug!(
            "ignoring editor state section {} with checksum 0x{:04X}",
            header.sector_id,
            header.checksum
        );
        return Ok(None);
    }
    Ok(Some(PersistenceSection {
        sector_id: header.sector_id,
        data: reader.read_remaining()?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_sections_round_trip() {
        let engine = Engine::new();
        let mut container = PersistenceContainer::new();
        container.set(1, b"main window".to_vec());
        container.set(7, vec![]);
        container.set(1, b"replaced".to_vec());

        let bytes = container.write(LibraryVersion::san_andreas()).unwrap();
        let read = PersistenceContainer::read(&engine, &bytes).unwrap();
        assert_eq!(read, container);
        assert_eq!(read.get(1), Some(&b"replaced"[..]));
    }

    #[test]
    fn test_unknown_children_are_tolerated() {
        let engine = Engine::new();
        let version = LibraryVersion::san_andreas();
        let mut buffer = Cursor::new(Vec::new());
        {
            let stream: &mut dyn WriteSeek = &mut buffer;
            let mut writer = BlockWriter::new(stream);
            let root = writer.enter_context(chunk::CONFIG, version).unwrap();
            let foreign = writer.enter_context(0x0253_F2F0, version).unwrap();
            writer.write_u32(99).unwrap();
            writer.leave_context(foreign).unwrap();
            let bad = writer.enter_context(chunk::STRUCT, version).unwrap();
            writer.write_u16(3).unwrap();
            writer.write_u16(0x1234).unwrap();
            writer.leave_context(bad).unwrap();
            let good = writer.enter_context(chunk::STRUCT, version).unwrap();
            writer.write_u16(4).unwrap();
            writer.write_u16(SECTION_CHECKSUM).unwrap();
            writer.write_bytes(&[1, 2]).unwrap();
            writer.leave_context(good).unwrap();
            writer.leave_context(root).unwrap();
        }
        let read = PersistenceContainer::read(&engine, &buffer.into_inner()).unwrap();
        assert_eq!(
            read.sections(),
            &[PersistenceSection {
                sector_id: 4,
                data: vec![1, 2]
            }]
        );
    }

    #[test]
    fn test_dictionary_carries_container() {
        let engine = Engine::new();
        let mut txd = engine.create_tex_dictionary();
        assert!(PersistenceContainer::from_dictionary(&engine, &txd).unwrap().is_none());

        let mut container = PersistenceContainer::new();
        container.set(2, vec![9; 5]);
        container.store_in(&mut txd).unwrap();

        let bytes = engine
            .serialize_dictionary(&txd, Cursor::new(Vec::new()))
            .unwrap()
            .into_inner();
        let crate::txd::RwObject::TexDictionary(read) = engine.deserialize(Cursor::new(bytes)).unwrap() else {
            panic!("expected a dictionary");
        };
        assert_eq!(
            PersistenceContainer::from_dictionary(&engine, &read).unwrap(),
            Some(container)
        );
    }
}
