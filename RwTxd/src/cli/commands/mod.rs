use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Subcommand;

use crate::engine::{Engine, LibraryVersion};
use crate::pipeline::TargetPlatform;
use crate::raster::MipmapGenMode;
use crate::txd::{RwObject, TexDictionary};

pub mod convert;
pub mod extract;
pub mod import;
pub mod info;
pub mod mass;

/// Read a dictionary file. A lone texture comes back wrapped in a dictionary.
fn read_dictionary(engine: &Engine, path: &Path) -> anyhow::Result<TexDictionary> {
    let file = std::fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let object = engine
        .deserialize(BufReader::new(file))
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(match object {
        RwObject::TexDictionary(txd) => txd,
        RwObject::Texture(texture) => {
            let mut txd = TexDictionary::new(texture.version());
            txd.add_texture(*texture);
            txd
        }
    })
}

/// Pipeline switches shared by `convert` and `import`.
#[derive(clap::Args, Debug, Clone)]
pub struct TransformArgs {
    /// Target platform (PC, PS2, PSP, XBOX, DXT_MOBILE, PVR, ATC, UNC_MOBILE)
    #[arg(short, long, default_value = "PC")]
    pub platform: TargetPlatform,

    /// Target library version (a.b.c.d or GTA3, VC, SA, Manhunt)
    #[arg(long = "target-version", default_value = "SA")]
    pub version: LibraryVersion,

    /// Remove all mipmap levels below the base
    #[arg(long)]
    pub clear_mipmaps: bool,

    /// Generate a mipmap chain
    #[arg(long)]
    pub generate_mipmaps: bool,

    /// Mipmap filter (default, contrast, brighten, darken, selectclose)
    #[arg(long, default_value = "default")]
    pub mip_gen_mode: MipmapGenMode,

    /// Highest mipmap level to generate, 0 for the full chain
    #[arg(long, default_value_t = 0)]
    pub mip_gen_max_level: u32,

    /// Compress textures for the target platform
    #[arg(long)]
    pub compress: bool,

    /// Compression quality between 0 and 1
    #[arg(long, default_value_t = 1.0)]
    pub quality: f32,
}

impl TransformArgs {
    fn to_options(&self) -> crate::pipeline::TransformOptions {
        crate::pipeline::TransformOptions {
            target_platform: self.platform,
            target_version: self.version,
            clear_mipmaps: self.clear_mipmaps,
            generate_mipmaps: self.generate_mipmaps,
            mip_gen_mode: self.mip_gen_mode,
            mip_gen_max_level: self.mip_gen_max_level,
            compress: self.compress,
            compression_quality: self.quality,
            ..crate::pipeline::TransformOptions::default()
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a mass conversion from a configuration file
    Mass {
        /// Configuration file with a [Main] section
        config: PathBuf,

        /// Write a JSON report of every file
        #[arg(long)]
        report: Option<PathBuf>,

        /// Suppress progress bar
        #[arg(short, long)]
        quiet: bool,
    },

    /// Show the textures of a dictionary
    Info {
        /// Source TXD file
        source: PathBuf,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Write every texture of a dictionary as an image file
    Extract {
        /// Source TXD file
        #[arg(short, long)]
        source: PathBuf,

        /// Output directory
        #[arg(short, long)]
        destination: PathBuf,

        /// Image format name (PNG, BMP, TGA, DDS, PVR, RWTEX)
        #[arg(short, long, default_value = "PNG")]
        format: String,

        /// Also write a preview of every mipmap level
        #[arg(long)]
        mipmaps: bool,
    },

    /// Build a dictionary from image files
    Import {
        /// Image or texture files
        #[arg(required = true)]
        sources: Vec<PathBuf>,

        /// Output TXD file
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        transform: TransformArgs,
    },

    /// Convert a dictionary for another platform
    Convert {
        /// Source TXD file
        #[arg(short, long)]
        source: PathBuf,

        /// Output TXD file
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        transform: TransformArgs,
    },
}

impl Commands {
    pub fn execute(&self) -> anyhow::Result<()> {
        match self {
            Commands::Mass {
                config,
                report,
                quiet,
            } => mass::execute(config, report.as_deref(), !*quiet),
            Commands::Info { source, json } => info::execute(source, *json),
            Commands::Extract {
                source,
                destination,
                format,
                mipmaps,
            } => extract::execute(source, destination, format, *mipmaps),
            Commands::Import {
                sources,
                output,
                transform,
            } => import::execute(sources, output, &transform.to_options()),
            Commands::Convert {
                source,
                output,
                transform,
            } => convert::execute(source, output, &transform.to_options()),
        }
    }
}
