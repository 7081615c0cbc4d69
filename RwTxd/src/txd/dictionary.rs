//! Texture dictionaries

use super::extensions::RawExtension;
use super::texture::Texture;
use crate::block::chunk;
use crate::engine::{Engine, LibraryVersion};

/// An ordered collection of textures, the in-memory form of a TXD file.
#[derive(Debug, Clone, Default)]
pub struct TexDictionary {
    textures: Vec<Texture>,
    version: LibraryVersion,
    pub(crate) extensions: Vec<RawExtension>,
}

impl TexDictionary {
    /// Empty dictionary written with `version`.
    #[must_use]
    pub fn new(version: LibraryVersion) -> Self {
        Self {
            textures: Vec::new(),
            version,
            extensions: Vec::new(),
        }
    }

    /// Version of the dictionary chunk.
    #[must_use]
    pub fn version(&self) -> LibraryVersion {
        self.version
    }

    /// Change the version of the dictionary chunk. Textures keep their own.
    pub fn set_engine_version(&mut self, version: LibraryVersion) {
        self.version = version;
    }

    /// Append a texture.
    pub fn add_texture(&mut self, texture: Texture) {
        self.textures.push(texture);
    }

    /// Remove and return the texture at `index`.
    pub fn remove_texture(&mut self, index: usize) -> Option<Texture> {
        (index < self.textures.len()).then(|| self.textures.remove(index))
    }

    /// Remove and return the first texture called `name` (case-insensitive).
    pub fn remove_texture_named(&mut self, name: &str) -> Option<Texture> {
        let index = self.position(name)?;
        self.remove_texture(index)
    }

    #[must_use]
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    /// Textures in insertion order.
    pub fn textures(&self) -> impl Iterator<Item = &Texture> {
        self.textures.iter()
    }

    pub fn textures_mut(&mut self) -> impl Iterator<Item = &mut Texture> {
        self.textures.iter_mut()
    }

    #[must_use]
    pub fn texture(&self, index: usize) -> Option<&Texture> {
        self.textures.get(index)
    }

    pub fn texture_mut(&mut self, index: usize) -> Option<&mut Texture> {
        self.textures.get_mut(index)
    }

    /// First texture called `name` (case-insensitive).
    #[must_use]
    pub fn find_texture(&self, name: &str) -> Option<&Texture> {
        self.textures.iter().find(|t| t.name().eq_ignore_ascii_case(name))
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.textures
            .iter()
            .position(|t| t.name().eq_ignore_ascii_case(name))
    }

    /// Take every texture out of the dictionary.
    pub fn drain(&mut self) -> impl Iterator<Item = Texture> + '_ {
        self.textures.drain(..)
    }

    /// Device id matching the native type of the first texture, 0 if unknown.
    #[must_use]
    pub fn get_recommended_driver_platform(&self, engine: &Engine) -> u16 {
        self.textures
            .first()
            .and_then(Texture::raster)
            .and_then(crate::raster::Raster::native_type_name)
            .and_then(|name| engine.native_types().get(name))
            .map_or(0, |handler| handler.device_id())
    }

    /// Extension chunks attached to the dictionary.
    #[must_use]
    pub fn extensions(&self) -> &[RawExtension] {
        &self.extensions
    }

    /// The editor-private extension payload, if present.
    #[must_use]
    pub fn editor_private(&self) -> Option<&[u8]> {
        self.extensions
            .iter()
            .find(|e| e.id == chunk::EDITOR_PRIVATE)
            .map(|e| e.data.as_slice())
    }

    /// Replace the editor-private extension payload.
    pub fn set_editor_private(&mut self, data: Vec<u8>) {
        self.extensions.retain(|e| e.id != chunk::EDITOR_PRIVATE);
        self.extensions
            .push(RawExtension::new(chunk::EDITOR_PRIVATE, self.version, data));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::PortablePixels;
    use pretty_assertions::assert_eq;

    fn texture(engine: &Engine, name: &str, platform: &str) -> Texture {
        let raster = engine.create_raster();
        raster
            .install_pixels(platform, PortablePixels::from_rgba(4, 4, vec![255; 64]))
            .unwrap();
        let mut texture = engine.create_texture(raster);
        texture.set_name(name).unwrap();
        texture
    }

    #[test]
    fn test_add_find_remove() {
        let engine = Engine::new();
        let mut txd = engine.create_tex_dictionary();
        txd.add_texture(texture(&engine, "road", "Direct3D9"));
        txd.add_texture(texture(&engine, "grass", "Direct3D9"));
        assert_eq!(txd.texture_count(), 2);
        assert!(txd.find_texture("GRASS").is_some());

        let removed = txd.remove_texture_named("road").unwrap();
        assert_eq!(removed.name(), "road");
        assert_eq!(txd.texture_count(), 1);
        assert!(txd.remove_texture(5).is_none());
    }

    #[test]
    fn test_recommended_platform_follows_first_texture() {
        let engine = Engine::new();
        let mut txd = engine.create_tex_dictionary();
        assert_eq!(txd.get_recommended_driver_platform(&engine), 0);
        txd.add_texture(texture(&engine, "a", "PlayStation2"));
        txd.add_texture(texture(&engine, "b", "Direct3D9"));
        assert_eq!(txd.get_recommended_driver_platform(&engine), 6);
    }

    #[test]
    fn test_editor_private_is_replaced() {
        let mut txd = TexDictionary::new(LibraryVersion::vice_city());
        txd.set_editor_private(vec![1]);
        txd.set_editor_private(vec![2, 3]);
        assert_eq!(txd.extensions().len(), 1);
        assert_eq!(txd.editor_private(), Some(&[2u8, 3][..]));
    }
}
