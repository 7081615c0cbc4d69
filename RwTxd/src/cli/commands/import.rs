//! CLI command for building a dictionary from image files

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;

use crate::batch::OutputFileGuard;
use crate::cli::progress::{PACKAGE, PICTURE, print_done, print_step};
use crate::engine::Engine;
use crate::importer::import_texture;
use crate::pipeline::{TransformOptions, process_texture};
use crate::txd::{TexDictionary, Texture};

fn load(engine: &Engine, path: &Path, options: &TransformOptions) -> anyhow::Result<Texture> {
    let data = std::fs::read(path)?;
    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    let imported = import_texture(engine, &data, file_name)?;
    tracing::info!("{}: read as {}", path.display(), imported.format);

    let mut texture = imported.texture;
    process_texture(&mut texture, options, None)?;
    Ok(texture)
}

pub fn execute(sources: &[PathBuf], output: &Path, options: &TransformOptions) -> anyhow::Result<()> {
    let start = Instant::now();
    let engine = Engine::new();
    engine.set_version(options.target_version);

    print_step(
        1,
        2,
        PICTURE,
        &format!("Importing {} files for {}...", sources.len(), options.target_platform),
    );
    let mut txd = TexDictionary::new(options.target_version);
    for source in sources {
        let texture = match load(&engine, source, options) {
            Ok(texture) => texture,
            Err(err) => {
                println!("  skipping {}: {:#}", source.display(), err);
                continue;
            }
        };
        if txd.find_texture(texture.name()).is_some() {
            println!("  skipping {}: a texture named '{}' exists", source.display(), texture.name());
            continue;
        }
        txd.add_texture(texture);
    }
    if txd.is_empty() {
        anyhow::bail!("no texture could be imported");
    }

    print_step(2, 2, PACKAGE, &format!("Writing {} textures...", txd.texture_count()));
    let data = engine
        .serialize_dictionary(&txd, Cursor::new(Vec::new()))?
        .into_inner();
    OutputFileGuard::new(output)
        .write_all(&data)
        .with_context(|| format!("failed to write {}", output.display()))?;

    print_done(start.elapsed());
    Ok(())
}
