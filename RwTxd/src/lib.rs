//! # RwTxd
//!
//! A pure-Rust library for RenderWare texture dictionaries (`.txd`).
//!
//! ## Supported Formats
//!
//! - **Block streams** - The chunked binary container every RenderWare file uses
//! - **Native textures** - Direct3D 8/9, Xbox, PlayStation 2, PSP and the
//!   mobile platforms (DXT, PVRTC, ATC, uncompressed)
//! - **Images** - DDS, PVR, PNG, BMP, TGA and raw `RWTEX` textures
//! - **Archives** - IMG (version 1 and 2, optionally LZO compressed) and ZIP
//!
//! ## Quick Start
//!
//! ### Reading a Dictionary
//!
//! ```no_run
//! use rwtxd::prelude::*;
//!
//! let engine = Engine::new();
//! let file = std::io::BufReader::new(std::fs::File::open("generic.txd")?);
//! if let RwObject::TexDictionary(txd) = engine.deserialize(file)? {
//!     for texture in txd.textures() {
//!         println!("{}", texture.name());
//!     }
//! }
//! # Ok::<(), rwtxd::Error>(())
//! ```
//!
//! ### Converting for Another Platform
//!
//! ```no_run
//! use rwtxd::prelude::*;
//!
//! let engine = Engine::new();
//! let data = std::fs::read("generic.txd")?;
//! let RwObject::TexDictionary(mut txd) = engine.deserialize(std::io::Cursor::new(data))? else {
//!     return Ok(());
//! };
//! let options = TransformOptions {
//!     target_platform: TargetPlatform::Ps2,
//!     ..TransformOptions::default()
//! };
//! process_dictionary(&engine, &mut txd, &options, None)?;
//! engine.serialize_dictionary(&txd, std::io::Cursor::new(Vec::new()))?;
//! # Ok::<(), rwtxd::Error>(())
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` - Enables the `rwtxd` and `massconv` command-line binaries

pub mod error;
pub mod block;
pub mod sync;
pub mod engine;
pub mod raster;
pub mod codec;
pub mod native;
pub mod imaging;
pub mod txd;
pub mod importer;
pub mod persistence;
pub mod scheduler;
pub mod pipeline;
pub mod archive;
pub mod batch;

// Re-exports for convenience
pub use error::{Error, Result};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::error::{Error, Result};

    // Engine
    pub use crate::engine::{Engine, EngineConfig, LibraryVersion, WarningLevel};

    // Dictionaries and textures
    pub use crate::txd::{AddressMode, FilterMode, RwObject, TexDictionary, Texture};

    // Rasters
    pub use crate::raster::{Compression, MipmapGenMode, PaletteType, Raster, RasterFormat};

    // Conversion
    pub use crate::pipeline::{TargetPlatform, TransformOptions, process_dictionary, process_texture};

    // Batch
    pub use crate::batch::{MassConvConfig, MassConverter};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(feature = "cli")]
pub mod cli;
