//! CLI command for writing textures as image files

use std::io::BufWriter;
use std::path::Path;
use std::time::Instant;

use anyhow::Context;

use super::read_dictionary;
use crate::batch::OutputFileGuard;
use crate::cli::progress::{DISK, LOOKING_GLASS, PICTURE, print_done, print_step, simple_bar};
use crate::engine::Engine;
use crate::raster::Raster;

fn file_stem(name: &str, index: usize) -> String {
    if name.is_empty() {
        format!("texture_{index}")
    } else {
        name.to_string()
    }
}

fn write_image(raster: &Raster, path: &Path, format: &str) -> anyhow::Result<()> {
    let guard = OutputFileGuard::new(path);
    let mut writer = BufWriter::new(guard.create()?);
    raster.write_image(&mut writer, format)?;
    writer.into_inner().map_err(std::io::IntoInnerError::into_error)?.sync_all()?;
    guard.commit();
    Ok(())
}

fn write_mipmap_preview(raster: &Raster, path: &Path) -> anyhow::Result<()> {
    let bitmap = raster.draw_debug_mipmaps()?;
    let image = image::RgbaImage::from_raw(bitmap.width(), bitmap.height(), bitmap.to_rgba())
        .context("preview buffer size mismatch")?;
    image.save_with_format(path, image::ImageFormat::Png)?;
    Ok(())
}

pub fn execute(source: &Path, destination: &Path, format: &str, mipmaps: bool) -> anyhow::Result<()> {
    let start = Instant::now();
    let engine = Engine::new();
    let Some(codec) = engine.imaging().find(format) else {
        let known: Vec<_> = engine.imaging().formats().map(|f| f.descriptor().name).collect();
        anyhow::bail!("unknown image format '{}'. Known formats: {}", format, known.join(", "));
    };
    let extension = codec.descriptor().default_extension;

    print_step(1, 2, LOOKING_GLASS, "Reading dictionary...");
    let txd = read_dictionary(&engine, source)?;
    std::fs::create_dir_all(destination)
        .with_context(|| format!("failed to create {}", destination.display()))?;

    print_step(2, 2, PICTURE, &format!("Writing {} textures...", txd.texture_count()));
    let bar = simple_bar(txd.texture_count() as u64, "Extracting");
    let mut failed = 0usize;
    for (index, texture) in txd.textures().enumerate() {
        let stem = file_stem(texture.name(), index);
        bar.set_prefix(stem.clone());
        bar.inc(1);
        let Some(raster) = texture.raster().filter(|r| r.has_pixels()) else {
            tracing::warn!("texture '{}' has no pixels", stem);
            failed += 1;
            continue;
        };

        let path = destination.join(format!("{stem}.{extension}"));
        if let Err(err) = write_image(raster, &path, format) {
            tracing::warn!("{}: {:#}", path.display(), err);
            failed += 1;
            continue;
        }
        if mipmaps {
            let preview = destination.join(format!("{stem}_mipmaps.png"));
            if let Err(err) = write_mipmap_preview(raster, &preview) {
                tracing::warn!("{}: {:#}", preview.display(), err);
            }
        }
    }
    bar.finish_and_clear();

    println!(
        "{}{} written to {}, {} failed",
        DISK,
        txd.texture_count() - failed,
        destination.display(),
        failed
    );
    print_done(start.elapsed());
    Ok(())
}
