//! Textures, texture dictionaries and their serialization

mod dictionary;
mod extensions;
mod serialize;
mod texture;

pub use dictionary::TexDictionary;
pub use extensions::RawExtension;
pub use serialize::{RwObject, read_object, write_dictionary, write_texture};
pub use texture::{
    AddressMode, FilterMode, MAX_NAME_LENGTH, Texture, TextureFields, validate_texture_name,
};
