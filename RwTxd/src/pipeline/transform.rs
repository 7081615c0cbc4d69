use std::path::{Path, PathBuf};

use serde::Serialize;

use super::{TargetPlatform, TransformOptions};
use crate::engine::{Engine, WarningLevel};
use crate::error::{Error, Result};
use crate::raster::Raster;
use crate::sync::check_hazard_condition;
use crate::txd::{TexDictionary, Texture};

/// Outcome of [`process_dictionary`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransformReport {
    /// Textures that went through every step.
    pub processed: usize,
    /// Textures kept in their original state, with the reason.
    pub failed: Vec<(String, String)>,
    /// Mipmap previews written.
    pub debug_files: Vec<PathBuf>,
}

/// Transform one texture.
///
/// Work happens on a private copy of the texture and its raster; the texture
/// is only replaced once every step succeeded. `debug_dir` receives the
/// mipmap preview when `output_debug` is set.
///
/// # Errors
/// Returns the first failing step's error, [`Error::CancellationRequested`]
/// included. The texture is untouched in that case.
pub fn process_texture(
    texture: &mut Texture,
    options: &TransformOptions,
    debug_dir: Option<&Path>,
) -> Result<Option<PathBuf>> {
    let mut work = texture.clone();
    let Some(raster) = work.take_raster() else {
        work.set_version(options.target_version);
        *texture = work;
        return Ok(None);
    };
    let raster = raster.deep_clone();
    work.set_raster(raster.clone());
    work.set_version(options.target_version);

    let platform = options.target_native_type();
    let mut converted = false;
    if raster.has_pixels() && raster.should_convert_beforehand(platform)? {
        tracing::debug!("converting '{}' to {} before transforming", work.name(), platform);
        raster.convert_raster_to(platform)?;
        converted = true;
    }

    if let Some(rule) = &options.resize_rule
        && raster.has_pixels()
    {
        let (width, height) = raster.size()?;
        if let Some((new_width, new_height)) = rule(width, height)
            && (new_width, new_height) != (width, height)
        {
            tracing::debug!("resizing '{}' from {}x{} to {}x{}", work.name(), width, height, new_width, new_height);
            raster.resize(new_width, new_height)?;
        }
    }

    if options.clear_mipmaps && raster.has_pixels() {
        raster.clear_mipmaps()?;
        work.fix_filtering();
    }
    if options.generate_mipmaps && raster.has_pixels() {
        let max_levels = match options.mip_gen_max_level {
            0 => usize::MAX,
            level => level as usize + 1,
        };
        raster.generate_mipmaps(max_levels, options.mip_gen_mode)?;
        work.fix_filtering();
    }
    check_hazard_condition()?;

    let debug_file = match debug_dir {
        Some(dir) if options.output_debug && raster.has_pixels() => write_debug_preview(&raster, dir, work.name()),
        _ => None,
    };

    if options.compress && raster.has_pixels() {
        match options.target_platform {
            TargetPlatform::Xbox
            | TargetPlatform::Pc
            | TargetPlatform::DxtMobile
            | TargetPlatform::Pvr
            | TargetPlatform::Atc => raster.compress_to(platform, options.compression_quality)?,
            TargetPlatform::Ps2 => {
                if !converted {
                    raster.convert_raster_to(platform)?;
                }
                raster.optimize_for_low_end(options.compression_quality)?;
            }
            // No block compression on these.
            TargetPlatform::Psp | TargetPlatform::UncompressedMobile => {
                if !converted {
                    raster.convert_raster_to(platform)?;
                }
            }
        }
        converted = true;
    }

    if options.improve_filtering {
        work.improve_filtering();
    }
    if !converted {
        raster.convert_raster_to(platform)?;
    }
    check_hazard_condition()?;

    *texture = work;
    Ok(debug_file)
}

/// Write the mipmap pyramid of `raster` as `<dir>/<name>.tga`.
///
/// A failed preview is a warning; the conversion itself goes on.
fn write_debug_preview(raster: &Raster, dir: &Path, name: &str) -> Option<PathBuf> {
    let file_name = if name.is_empty() { "unnamed" } else { name };
    let path = dir.join(format!("{file_name}.tga"));
    let result = (|| -> Result<()> {
        let bitmap = raster.draw_debug_mipmaps()?;
        let image = image::RgbaImage::from_raw(bitmap.width(), bitmap.height(), bitmap.to_rgba())
            .ok_or_else(|| Error::encode_failed("TGA", "preview buffer size mismatch"))?;
        std::fs::create_dir_all(dir)?;
        image
            .save_with_format(&path, image::ImageFormat::Tga)
            .map_err(|e| Error::encode_failed("TGA", e.to_string()))
    })();
    match result {
        Ok(()) => Some(path),
        Err(err) => {
            raster.engine().warn(
                WarningLevel::Important,
                format!("failed to write mipmap preview {}: {err}", path.display()),
            );
            None
        }
    }
}

/// Transform every texture of `txd` and stamp the dictionary with the target
/// version.
///
/// A texture that fails keeps its original state and is reported; the rest
/// of the dictionary goes on.
///
/// # Errors
/// Returns [`Error::CancellationRequested`] if the calling thread is
/// terminated. Textures already processed keep their new state.
pub fn process_dictionary(
    engine: &Engine,
    txd: &mut TexDictionary,
    options: &TransformOptions,
    debug_dir: Option<&Path>,
) -> Result<TransformReport> {
    txd.set_engine_version(options.target_version);
    let mut report = TransformReport::default();
    for texture in txd.textures_mut() {
        check_hazard_condition()?;
        match process_texture(texture, options, debug_dir) {
            Ok(debug_file) => {
                report.processed += 1;
                report.debug_files.extend(debug_file);
            }
            Err(err) if err.is_cancellation() => return Err(err),
            Err(err) => {
                engine.warn(
                    WarningLevel::Important,
                    format!("texture '{}' left unchanged: {err}", texture.name()),
                );
                report.failed.push((texture.name().to_string(), err.to_string()));
            }
        }
    }
    tracing::debug!(
        "transformed {} textures for {} ({} failed)",
        report.processed,
        options.target_platform,
        report.failed.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::{Compression, PaletteType, PortablePixels, RasterFormat};
    use crate::txd::{AddressMode, FilterMode};
    use pretty_assertions::assert_eq;

    /// 64x64 8888 Direct3D9 texture with a full chain and trilinear filtering.
    fn pc_texture(engine: &Engine) -> Texture {
        let rgba: Vec<u8> = (0..64u32 * 64)
            .flat_map(|i| [(i % 64 * 4) as u8, (i / 64 * 4) as u8, 0x80, 0xFF])
            .collect();
        let raster = engine.create_raster();
        raster
            .install_pixels("Direct3D9", PortablePixels::from_rgba(64, 64, rgba))
            .unwrap();
        raster.generate_mipmaps(7, crate::raster::MipmapGenMode::Default).unwrap();
        let mut texture = engine.create_texture(raster);
        texture.set_name("road").unwrap();
        texture.set_filter(FilterMode::LinearLinear);
        texture.set_addressing(AddressMode::Wrap, AddressMode::Wrap);
        texture
    }

    fn dictionary_of(engine: &Engine, texture: Texture) -> TexDictionary {
        let mut txd = engine.create_tex_dictionary();
        txd.add_texture(texture);
        txd
    }

    #[test]
    fn test_ps2_low_end_conversion() {
        let engine = Engine::new();
        let mut txd = dictionary_of(&engine, pc_texture(&engine));
        assert_eq!(txd.texture(0).unwrap().raster().unwrap().mipmap_count().unwrap(), 7);

        let options = TransformOptions {
            target_platform: TargetPlatform::Ps2,
            clear_mipmaps: true,
            compress: true,
            ..TransformOptions::default()
        };
        let report = process_dictionary(&engine, &mut txd, &options, None).unwrap();
        assert_eq!(report.processed, 1);

        let texture = txd.texture(0).unwrap();
        let raster = texture.raster().unwrap();
        assert_eq!(raster.native_type_name(), Some("PlayStation2"));
        let layout = raster.layout().unwrap();
        assert_eq!(layout.palette_type, PaletteType::Pal8);
        assert_eq!(layout.compression, Compression::None);
        assert_eq!(raster.mipmap_count().unwrap(), 1);
        assert_eq!(texture.filter(), FilterMode::Linear);
    }

    #[test]
    fn test_pc_mipmaps_then_dxt() {
        let engine = Engine::new();
        let mut texture = pc_texture(&engine);
        texture.raster().unwrap().clear_mipmaps().unwrap();

        let options = TransformOptions {
            target_platform: TargetPlatform::Pc,
            generate_mipmaps: true,
            mip_gen_max_level: 3,
            compress: true,
            ..TransformOptions::default()
        };
        process_texture(&mut texture, &options, None).unwrap();

        let raster = texture.raster().unwrap();
        assert_eq!(raster.native_type_name(), Some("Direct3D9"));
        assert_eq!(raster.layout().unwrap().compression, Compression::Dxt1);
        let sizes: Vec<u32> = raster
            .portable_pixels()
            .unwrap()
            .mipmaps
            .iter()
            .map(|m| m.width)
            .collect();
        assert_eq!(sizes, vec![64, 32, 16, 8]);
        assert_eq!(texture.filter(), FilterMode::LinearLinear);
    }

    #[test]
    fn test_powervr_quality_picks_bit_depth() {
        let engine = Engine::new();
        for (quality, expected) in [(1.0, Compression::Pvrtc4Rgb), (0.25, Compression::Pvrtc2Rgb)] {
            let mut texture = pc_texture(&engine);
            let options = TransformOptions {
                target_platform: TargetPlatform::Pvr,
                clear_mipmaps: true,
                compress: true,
                compression_quality: quality,
                ..TransformOptions::default()
            };
            process_texture(&mut texture, &options, None).unwrap();

            let raster = texture.raster().unwrap();
            assert_eq!(raster.native_type_name(), Some("PowerVR"));
            assert_eq!(raster.layout().unwrap().compression, expected, "quality {quality}");
        }
    }

    #[test]
    fn test_mobile_dxt_and_atc_compress() {
        let engine = Engine::new();
        for (platform, name, expected) in [
            (TargetPlatform::DxtMobile, "S3TC_mobile", Compression::Dxt1),
            (TargetPlatform::Atc, "AMDCompress", Compression::AtcRgb),
        ] {
            let mut texture = pc_texture(&engine);
            let options = TransformOptions {
                target_platform: platform,
                clear_mipmaps: true,
                compress: true,
                ..TransformOptions::default()
            };
            process_texture(&mut texture, &options, None).unwrap();

            let raster = texture.raster().unwrap();
            assert_eq!(raster.native_type_name(), Some(name));
            assert_eq!(raster.layout().unwrap().compression, expected);
        }
    }

    #[test]
    fn test_failed_texture_keeps_original_state() {
        let engine = Engine::with_config(crate::engine::EngineConfig {
            fix_incompatible_rasters: false,
            ..Default::default()
        });
        let texture = pc_texture(&engine);
        let original = texture.raster().unwrap().portable_pixels().unwrap();

        // PowerVR only takes square rasters.
        let options = TransformOptions {
            target_platform: TargetPlatform::Pvr,
            resize_rule: Some(std::sync::Arc::new(|w, h| Some((w, h / 2)))),
            ..TransformOptions::default()
        };
        let mut txd = dictionary_of(&engine, texture);
        let report = process_dictionary(&engine, &mut txd, &options, None).unwrap();
        assert_eq!(report.processed, 0);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "road");

        let kept = txd.texture(0).unwrap();
        assert_eq!(kept.version(), engine.version());
        let kept = kept.raster().unwrap();
        assert_eq!(kept.native_type_name(), Some("Direct3D9"));
        assert_eq!(kept.portable_pixels().unwrap(), original);
    }

    #[test]
    fn test_palette_source_converts_first() {
        let engine = Engine::new();
        let texture = pc_texture(&engine);
        let raster = texture.raster().unwrap();
        raster.clear_mipmaps().unwrap();
        raster.convert_to_palette(PaletteType::Pal8, RasterFormat::Format8888).unwrap();
        assert!(raster.should_convert_beforehand("PlayStation2").unwrap());

        let mut txd = dictionary_of(&engine, texture);
        let options = TransformOptions {
            target_platform: TargetPlatform::Ps2,
            ..TransformOptions::default()
        };
        process_dictionary(&engine, &mut txd, &options, None).unwrap();
        let raster = txd.texture(0).unwrap().raster().unwrap();
        assert_eq!(raster.native_type_name(), Some("PlayStation2"));
        assert_eq!(raster.layout().unwrap().palette_type, PaletteType::Pal8);
    }

    #[test]
    fn test_debug_preview_written() {
        let engine = Engine::new();
        let dir = tempfile::tempdir().unwrap();
        let mut texture = pc_texture(&engine);
        let options = TransformOptions {
            output_debug: true,
            ..TransformOptions::default()
        };
        let written = process_texture(&mut texture, &options, Some(dir.path())).unwrap();
        let path = written.unwrap();
        assert_eq!(path, dir.path().join("road.tga"));
        let preview = image::open(&path).unwrap();
        assert_eq!((preview.width(), preview.height()), (96, 64));
    }

    #[test]
    fn test_version_is_stamped() {
        let engine = Engine::new();
        let mut txd = dictionary_of(&engine, pc_texture(&engine));
        let options = TransformOptions {
            target_version: crate::engine::LibraryVersion::vice_city(),
            ..TransformOptions::default()
        };
        process_dictionary(&engine, &mut txd, &options, None).unwrap();
        assert_eq!(txd.version(), crate::engine::LibraryVersion::vice_city());
        let texture = txd.texture(0).unwrap();
        assert_eq!(texture.version(), crate::engine::LibraryVersion::vice_city());
        assert_eq!(texture.raster().unwrap().native_type_name(), Some("Direct3D8"));
    }
}
