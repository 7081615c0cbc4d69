//! Mass conversion of a game directory tree

use std::io::Cursor;
use std::path::{Path, PathBuf};

use serde::Serialize;
use walkdir::WalkDir;

use super::config::MassConvConfig;
use super::output::OutputFileGuard;
use crate::archive::{ArchiveFormat, ArchiveRegistry, RebuildOptions, has_extension};
use crate::engine::{Engine, WarningLevel};
use crate::error::{Error, Result};
use crate::pipeline::{ResizeRule, TransformOptions, TransformReport, process_dictionary, process_texture};
use crate::sync::check_hazard_condition;
use crate::txd::RwObject;

/// Directory under the output root that receives mipmap previews.
pub const DEBUG_DIRECTORY: &str = "_debug";

/// What happened to one source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FileOutcome {
    /// A dictionary went through the pipeline.
    Converted { textures: usize, failed: usize },
    /// An archive was rebuilt; `converted` counts its transformed dictionaries.
    ArchiveRebuilt { members: usize, converted: usize },
    /// Copied unchanged.
    Copied,
    /// Could not be converted and was copied unchanged instead.
    CopiedAfterError { error: String },
    /// Nothing was written.
    Failed { error: String },
}

/// Ledger entry for one source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    /// Path relative to the game root.
    pub path: PathBuf,
    #[serde(flatten)]
    pub outcome: FileOutcome,
}

/// Per-file ledger of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MassConvReport {
    pub files: Vec<FileRecord>,
}

impl MassConvReport {
    fn count(&self, predicate: impl Fn(&FileOutcome) -> bool) -> usize {
        self.files.iter().filter(|f| predicate(&f.outcome)).count()
    }

    /// Dictionaries and archives that were transformed.
    pub fn converted_count(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Converted { .. } | FileOutcome::ArchiveRebuilt { .. }))
    }

    pub fn copied_count(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Copied))
    }

    /// Files that were copied instead of converted, or not written at all.
    pub fn failed_count(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::CopiedAfterError { .. } | FileOutcome::Failed { .. }))
    }

    /// The ledger as pretty-printed JSON.
    ///
    /// # Errors
    /// Returns [`Error::JsonError`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Progress of a run, reported before each file.
#[derive(Debug, Clone)]
pub struct MassConvProgress {
    /// 1-based index of the file.
    pub current: usize,
    pub total: usize,
    /// Path relative to the game root.
    pub path: PathBuf,
}

/// Mirrors a game tree into an output tree, converting every dictionary on
/// the way.
pub struct MassConverter {
    engine: Engine,
    config: MassConvConfig,
    options: TransformOptions,
    archives: ArchiveRegistry,
}

impl MassConverter {
    /// Converter with an engine configured from `config`.
    pub fn new(config: MassConvConfig) -> Self {
        Self::with_engine(Engine::with_config(config.to_engine_config()), config)
    }

    pub fn with_engine(engine: Engine, config: MassConvConfig) -> Self {
        let options = config.to_transform_options();
        Self {
            engine,
            config,
            options,
            archives: ArchiveRegistry::with_builtin(),
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn config(&self) -> &MassConvConfig {
        &self.config
    }

    /// Downscale rule applied to every raster.
    pub fn set_resize_rule(&mut self, rule: Option<ResizeRule>) {
        self.options.resize_rule = rule;
    }

    /// Every regular file below the game root, in a stable order. The output
    /// tree is skipped when it lives inside the game root.
    ///
    /// # Errors
    /// Returns [`Error::InvalidPath`] if the game root is not a directory.
    pub fn collect_files(&self) -> Result<Vec<PathBuf>> {
        let root = &self.config.game_root;
        if !root.is_dir() {
            return Err(Error::InvalidPath(root.clone()));
        }
        let output = &self.config.output_root;
        let mut files = Vec::new();
        for entry in WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.path() != output.as_path())
        {
            let entry = entry?;
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }

    /// Convert the whole tree.
    ///
    /// Per-file failures are logged and recorded; the walk goes on.
    ///
    /// # Errors
    /// Returns [`Error::InvalidPath`] for a missing game root or
    /// [`Error::CancellationRequested`] if the thread is terminated. The file
    /// being written at that moment is removed.
    pub fn run(&self, progress: &dyn Fn(&MassConvProgress)) -> Result<MassConvReport> {
        let files = self.collect_files()?;
        let total = files.len();
        tracing::info!(
            "converting {} files from {} to {} for {}",
            total,
            self.config.game_root.display(),
            self.config.output_root.display(),
            self.options.target_platform
        );

        let mut report = MassConvReport::default();
        for (index, source) in files.iter().enumerate() {
            check_hazard_condition()?;
            let relative = source
                .strip_prefix(&self.config.game_root)
                .map_or_else(|_| source.clone(), Path::to_path_buf);
            progress(&MassConvProgress {
                current: index + 1,
                total,
                path: relative.clone(),
            });

            let outcome = match self.process_file(source, &relative) {
                Ok(outcome) => outcome,
                Err(err) if err.is_cancellation() => return Err(err),
                Err(err) => {
                    tracing::error!("{}: {}", relative.display(), err);
                    FileOutcome::Failed { error: err.to_string() }
                }
            };
            report.files.push(FileRecord {
                path: relative,
                outcome,
            });
        }

        tracing::info!(
            "done: {} converted, {} copied, {} failed",
            report.converted_count(),
            report.copied_count(),
            report.failed_count()
        );
        Ok(report)
    }

    fn process_file(&self, source: &Path, relative: &Path) -> Result<FileOutcome> {
        let target = self.config.output_root.join(relative);
        if has_extension(source, "txd") {
            return self.convert_txd_file(source, &target, relative);
        }
        if self.config.reconstruct_img_archives
            && let Some(format) = self.archives.detect(source)
        {
            return self.rebuild_archive(format, source, &target, relative);
        }
        copy_file(source, &target)?;
        Ok(FileOutcome::Copied)
    }

    fn debug_dir(&self, relative: &Path) -> Option<PathBuf> {
        self.options
            .output_debug
            .then(|| self.config.output_root.join(DEBUG_DIRECTORY).join(relative))
    }

    fn convert_txd_file(&self, source: &Path, target: &Path, relative: &Path) -> Result<FileOutcome> {
        let data = std::fs::read(source)?;
        let debug_dir = self.debug_dir(relative);
        match self.convert_dictionary_bytes(&data, debug_dir.as_deref()) {
            Ok((output, summary)) => {
                OutputFileGuard::new(target).write_all(&output)?;
                tracing::info!("converted {}", relative.display());
                Ok(FileOutcome::Converted {
                    textures: summary.processed + summary.failed.len(),
                    failed: summary.failed.len(),
                })
            }
            Err(err) if err.is_cancellation() => Err(err),
            Err(err) => {
                self.engine.warn(
                    WarningLevel::Critical,
                    format!("{}: {err}; copying it unchanged", relative.display()),
                );
                OutputFileGuard::new(target).write_all(&data)?;
                Ok(FileOutcome::CopiedAfterError { error: err.to_string() })
            }
        }
    }

    /// Run a serialized dictionary (or single texture) through the pipeline.
    ///
    /// # Errors
    /// Returns an error if the data cannot be parsed or written back.
    pub fn convert_dictionary_bytes(&self, data: &[u8], debug_dir: Option<&Path>) -> Result<(Vec<u8>, TransformReport)> {
        match self.engine.deserialize(Cursor::new(data))? {
            RwObject::TexDictionary(mut txd) => {
                let summary = process_dictionary(&self.engine, &mut txd, &self.options, debug_dir)?;
                let output = self.engine.serialize_dictionary(&txd, Cursor::new(Vec::new()))?;
                Ok((output.into_inner(), summary))
            }
            RwObject::Texture(mut texture) => {
                let mut summary = TransformReport::default();
                let debug_file = process_texture(&mut texture, &self.options, debug_dir)?;
                summary.processed = 1;
                summary.debug_files.extend(debug_file);
                let output = self.engine.serialize_texture(&texture, Cursor::new(Vec::new()))?;
                Ok((output.into_inner(), summary))
            }
        }
    }

    fn rebuild_archive(&self, format: &dyn ArchiveFormat, source: &Path, target: &Path, relative: &Path) -> Result<FileOutcome> {
        let guard = OutputFileGuard::with_paths(format.output_files(target));
        guard.prepare()?;
        let options = RebuildOptions {
            compress_members: self.config.img_archives_compressed,
        };
        let mut members = 0;
        let mut converted = 0;
        format.rebuild(source, target, options, &mut |name, data| {
            members += 1;
            if !has_extension(Path::new(name), "txd") {
                return Ok(data);
            }
            let debug_dir = self.debug_dir(&relative.join(name));
            match self.convert_dictionary_bytes(&data, debug_dir.as_deref()) {
                Ok((output, _)) => {
                    converted += 1;
                    Ok(output)
                }
                Err(err) if err.is_cancellation() => Err(err),
                Err(err) => {
                    self.engine.warn(
                        WarningLevel::Critical,
                        format!("{}/{name}: {err}; keeping it unchanged", relative.display()),
                    );
                    Ok(data)
                }
            }
        })?;
        guard.commit();
        tracing::info!("rebuilt {} ({} of {} members converted)", relative.display(), converted, members);
        Ok(FileOutcome::ArchiveRebuilt { members, converted })
    }
}

fn copy_file(source: &Path, target: &Path) -> Result<()> {
    let guard = OutputFileGuard::new(target);
    guard.prepare()?;
    std::fs::copy(source, target)?;
    guard.commit();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::PortablePixels;
    use pretty_assertions::assert_eq;

    fn dictionary_bytes(engine: &Engine, names: &[&str]) -> Vec<u8> {
        let mut txd = engine.create_tex_dictionary();
        for name in names {
            let raster = engine.create_raster();
            raster
                .install_pixels("Direct3D9", PortablePixels::from_rgba(8, 8, vec![0x40; 256]))
                .unwrap();
            let mut texture = engine.create_texture(raster);
            texture.set_name(name).unwrap();
            txd.add_texture(texture);
        }
        engine
            .serialize_dictionary(&txd, Cursor::new(Vec::new()))
            .unwrap()
            .into_inner()
    }

    fn config_for(root: &Path) -> MassConvConfig {
        MassConvConfig {
            game_root: root.join("game"),
            output_root: root.join("out"),
            target_platform: crate::pipeline::TargetPlatform::Ps2,
            ..MassConvConfig::default()
        }
    }

    #[test]
    fn test_tree_is_mirrored() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(dir.path());
        let engine = Engine::new();
        std::fs::create_dir_all(config.game_root.join("models")).unwrap();
        std::fs::write(config.game_root.join("models/generic.txd"), dictionary_bytes(&engine, &["a", "b"])).unwrap();
        std::fs::write(config.game_root.join("models/broken.TXD"), b"not a dictionary").unwrap();
        std::fs::write(config.game_root.join("readme.txt"), b"hello").unwrap();

        let converter = MassConverter::new(config.clone());
        let seen = std::cell::RefCell::new(Vec::new());
        let report = converter
            .run(&|p| seen.borrow_mut().push((p.current, p.total)))
            .unwrap();
        assert_eq!(*seen.borrow(), vec![(1, 3), (2, 3), (3, 3)]);
        let paths: Vec<&Path> = report.files.iter().map(|f| f.path.as_path()).collect();
        assert_eq!(
            paths,
            vec![Path::new("models/broken.TXD"), Path::new("models/generic.txd"), Path::new("readme.txt")]
        );
        assert!(matches!(report.files[0].outcome, FileOutcome::CopiedAfterError { .. }));
        assert_eq!(report.files[1].outcome, FileOutcome::Converted { textures: 2, failed: 0 });
        assert_eq!(report.files[2].outcome, FileOutcome::Copied);
        assert_eq!((report.converted_count(), report.copied_count(), report.failed_count()), (1, 1, 1));
        assert_eq!(std::fs::read(config.output_root.join("readme.txt")).unwrap(), b"hello");
        assert_eq!(
            std::fs::read(config.output_root.join("models/broken.TXD")).unwrap(),
            b"not a dictionary"
        );

        let converted = std::fs::read(config.output_root.join("models/generic.txd")).unwrap();
        let RwObject::TexDictionary(txd) = engine.deserialize(Cursor::new(converted)).unwrap() else {
            panic!("expected a dictionary");
        };
        assert_eq!(txd.texture_count(), 2);
        assert!(
            txd.textures()
                .all(|t| t.raster().unwrap().native_type_name() == Some("PlayStation2"))
        );
        assert_eq!(report.to_json().unwrap().matches("\"kind\"").count(), 3);
    }

    #[test]
    fn test_archives_are_rebuilt() {
        let dir = tempfile::tempdir().unwrap();
        let config = MassConvConfig {
            img_archives_compressed: true,
            ..config_for(dir.path())
        };
        let engine = Engine::new();
        std::fs::create_dir_all(&config.game_root).unwrap();
        let img = config.game_root.join("gta3.img");
        let mut writer = crate::archive::ImgWriter::create(&img, crate::archive::ImgVersion::V2, 2).unwrap();
        writer.add("car.txd", &dictionary_bytes(&engine, &["body"])).unwrap();
        writer.add("car.dff", b"model").unwrap();
        writer.finish().unwrap();

        let report = MassConverter::new(config.clone()).run(&|_| {}).unwrap();
        assert_eq!(
            report.files[0].outcome,
            FileOutcome::ArchiveRebuilt { members: 2, converted: 1 }
        );

        let format = crate::archive::ImgArchiveFormat::default();
        let mut members = Vec::new();
        format
            .for_each_member(&config.output_root.join("gta3.img"), &mut |name, data| {
                members.push((name.to_string(), data));
                Ok(())
            })
            .unwrap();
        assert_eq!(members[1].0, "car.dff");
        assert_eq!(&members[1].1[..5], b"model");
        let RwObject::TexDictionary(txd) = engine.deserialize(Cursor::new(members[0].1.clone())).unwrap() else {
            panic!("expected a dictionary");
        };
        assert_eq!(
            txd.texture(0).unwrap().raster().unwrap().native_type_name(),
            Some("PlayStation2")
        );
    }

    #[test]
    fn test_missing_root_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let converter = MassConverter::new(config_for(dir.path()));
        assert!(matches!(converter.run(&|_| {}), Err(Error::InvalidPath(_))));
    }
}
