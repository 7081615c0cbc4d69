//! Loading textures from files of unknown or misnamed type
//!
//! The file extension only sets an expectation. The expected loader runs
//! first with its warnings captured; if it fails every other loader is tried
//! silently, and a wrong guess is reported once the real format is known.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use crate::block::chunk;
use crate::engine::{Engine, ScopeKind, WarningLevel};
use crate::error::{Error, Result};
use crate::imaging::ImageFormat;
use crate::txd::Texture;

/// What the extension of an input file suggests it contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expectation {
    /// No usable hint.
    None,
    /// An image format, by registered name.
    Image(&'static str),
    /// A serialized texture or dictionary.
    TexChunk,
}

impl Expectation {
    /// Expectation for a file extension (with or without the dot).
    pub fn from_extension(engine: &Engine, extension: &str) -> Self {
        let extension = extension.trim_start_matches('.');
        if extension.is_empty() {
            return Self::None;
        }
        if extension.eq_ignore_ascii_case("txd") {
            return Self::TexChunk;
        }
        engine
            .imaging()
            .find_by_extension(extension)
            .map_or(Self::None, |f| Self::Image(f.descriptor().name))
    }
}

/// A texture produced by [`import_texture`].
#[derive(Debug)]
pub struct ImportedTexture {
    pub texture: Texture,
    /// Name of the loader that understood the data.
    pub format: &'static str,
}

#[derive(Clone)]
enum Loader {
    Image(Arc<dyn ImageFormat>),
    TexChunk,
}

impl Loader {
    fn name(&self) -> &'static str {
        match self {
            Self::Image(format) => format.descriptor().name,
            Self::TexChunk => "TXD",
        }
    }

    fn matches(&self, expectation: Expectation) -> bool {
        match (self, expectation) {
            (Self::Image(format), Expectation::Image(name)) => format.descriptor().name == name,
            (Self::TexChunk, Expectation::TexChunk) => true,
            _ => false,
        }
    }

    fn load(&self, engine: &Engine, data: &[u8]) -> Result<Texture> {
        match self {
            Self::Image(format) => {
                let decoded = format.decode(engine, data)?;
                let raster = engine.create_raster();
                raster.install_decoded(decoded)?;
                Ok(engine.create_texture(raster))
            }
            Self::TexChunk => {
                let id = data
                    .get(..4)
                    .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]));
                if !matches!(id, Some(chunk::TEX_DICTIONARY | chunk::TEXTURE_NATIVE)) {
                    return Err(Error::corrupt("not a texture or dictionary chunk"));
                }
                let object = engine.deserialize(Cursor::new(data))?;
                engine.to_texture(object)
            }
        }
    }
}

fn loaders(engine: &Engine) -> Vec<Loader> {
    std::iter::once(Loader::TexChunk)
        .chain(engine.imaging().formats().cloned().map(Loader::Image))
        .collect()
}

/// Name a freshly imported texture after its file, if it has no name yet.
fn apply_file_name(engine: &Engine, texture: &mut Texture, file_name: &str) {
    if !texture.name().is_empty() {
        return;
    }
    let Some(stem) = Path::new(file_name).file_stem().and_then(|s| s.to_str()) else {
        return;
    };
    if let Err(err) = texture.set_name(stem) {
        engine.warn(
            WarningLevel::Important,
            format!("imported texture left unnamed: {err}"),
        );
    }
}

/// Load a texture from `data`, using `file_name` as a format hint and as
/// the texture name.
///
/// # Errors
/// Returns the expected loader's error if no loader understood the data and
/// the file name suggested a format, [`Error::UnknownImageFormat`] otherwise.
pub fn import_texture(engine: &Engine, data: &[u8], file_name: &str) -> Result<ImportedTexture> {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    let expectation = Expectation::from_extension(engine, extension);
    let all = loaders(engine);

    let mut expected_failure: Option<(&'static str, Vec<String>, Error)> = None;
    if let Some(expected) = all.iter().find(|l| l.matches(expectation)) {
        let scope = engine.warnings().scope(ScopeKind::Capture);
        match expected.load(engine, data) {
            Ok(mut texture) => {
                scope.flush();
                apply_file_name(engine, &mut texture, file_name);
                return Ok(ImportedTexture {
                    texture,
                    format: expected.name(),
                });
            }
            Err(err) => {
                let captured = scope.finish();
                tracing::debug!("{} loader rejected '{}': {}", expected.name(), file_name, err);
                expected_failure = Some((expected.name(), captured, err));
            }
        }
    }

    for loader in all.iter().filter(|l| !l.matches(expectation)) {
        let attempt = {
            let _silence = engine.warnings().scope(ScopeKind::Silence);
            loader.load(engine, data)
        };
        if let Ok(mut texture) = attempt {
            if let Some((expected, _, _)) = &expected_failure {
                engine.warn(
                    WarningLevel::Important,
                    format!("tried parsing {expected} but found {}", loader.name()),
                );
            }
            apply_file_name(engine, &mut texture, file_name);
            return Ok(ImportedTexture {
                texture,
                format: loader.name(),
            });
        }
    }

    match expected_failure {
        Some((expected, captured, err)) => {
            for message in captured {
                engine.warnings().dispatch(message);
            }
            engine.warn(
                WarningLevel::Critical,
                format!("failed to load '{file_name}' as {expected}: {err}"),
            );
            Err(err)
        }
        None => Err(Error::UnknownImageFormat(format!(
            "no loader recognized '{file_name}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::WarningSink;
    use crate::raster::{ColorOrdering, PortablePixels, RasterFormat};
    use crate::sync::UnfairMutex;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct CollectingSink(UnfairMutex<Vec<String>>);

    impl WarningSink for CollectingSink {
        fn on_warning(&self, message: &str) {
            self.0.lock().push(message.to_string());
        }
    }

    fn engine_with_sink() -> (Engine, Arc<CollectingSink>) {
        let engine = Engine::new();
        let sink = Arc::new(CollectingSink::default());
        engine.warnings().set_sink(sink.clone());
        (engine, sink)
    }

    fn png_bytes() -> Vec<u8> {
        let image = image::RgbaImage::from_fn(8, 8, |x, y| image::Rgba([x as u8 * 30, y as u8 * 30, 90, 255]));
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_expectation_from_extension() {
        let engine = Engine::new();
        assert_eq!(Expectation::from_extension(&engine, "BMP"), Expectation::Image("BMP"));
        assert_eq!(Expectation::from_extension(&engine, ".txd"), Expectation::TexChunk);
        assert_eq!(Expectation::from_extension(&engine, "jpg"), Expectation::None);
        assert_eq!(Expectation::from_extension(&engine, ""), Expectation::None);
    }

    #[test]
    fn test_misnamed_png_is_recovered() {
        let (engine, sink) = engine_with_sink();
        let imported = import_texture(&engine, &png_bytes(), "foo.bmp").unwrap();
        assert_eq!(imported.format, "PNG");
        assert_eq!(imported.texture.name(), "foo");
        assert!(
            sink.0
                .lock()
                .iter()
                .any(|m| m.contains("tried parsing BMP but found PNG"))
        );

        let raster = imported.texture.raster().unwrap();
        assert_eq!(raster.native_type_name(), Some("Direct3D9"));
        let layout = raster.layout().unwrap();
        assert_eq!(layout.raster_format, RasterFormat::Format8888);
        assert_eq!(layout.color_order, ColorOrdering::Bgra);
    }

    #[test]
    fn test_correct_hint_is_quiet() {
        let (engine, sink) = engine_with_sink();
        let imported = import_texture(&engine, &png_bytes(), "grass.png").unwrap();
        assert_eq!(imported.format, "PNG");
        assert!(sink.0.lock().is_empty());
    }

    #[test]
    fn test_texture_chunk_behind_image_extension() {
        let (engine, sink) = engine_with_sink();
        let raster = engine.create_raster();
        raster
            .install_pixels("Direct3D9", PortablePixels::from_rgba(4, 4, vec![128; 64]))
            .unwrap();
        let mut texture = engine.create_texture(raster);
        texture.set_name("wall").unwrap();
        let bytes = engine
            .serialize_texture(&texture, Cursor::new(Vec::new()))
            .unwrap()
            .into_inner();

        let imported = import_texture(&engine, &bytes, "other.tga").unwrap();
        assert_eq!(imported.format, "TXD");
        assert_eq!(imported.texture.name(), "wall");
        assert!(sink.0.lock().iter().any(|m| m == "tried parsing TGA but found TXD"));
    }

    #[test]
    fn test_failures_report_expected_error() {
        let (engine, sink) = engine_with_sink();
        let err = import_texture(&engine, b"garbage garbage garbage", "bad.png").unwrap_err();
        assert!(matches!(err, Error::ImageDecodeFailed { ref format, .. } if format == "PNG"));
        assert!(sink.0.lock().iter().any(|m| m.starts_with("failed to load 'bad.png' as PNG")));

        let err = import_texture(&engine, b"garbage garbage garbage", "bad").unwrap_err();
        assert!(matches!(err, Error::UnknownImageFormat(_)));
    }
}
