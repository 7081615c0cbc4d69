//! Output files that vanish unless finished

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Deletes its files when dropped without [`commit`](Self::commit).
///
/// Every output of a conversion goes through a guard, so an error or a
/// cancellation halfway through leaves no partial file behind.
#[derive(Debug)]
pub struct OutputFileGuard {
    paths: Vec<PathBuf>,
    committed: bool,
}

impl OutputFileGuard {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_paths(vec![path.into()])
    }

    /// Guard for outputs spread over several files.
    pub fn with_paths(paths: Vec<PathBuf>) -> Self {
        Self {
            paths,
            committed: false,
        }
    }

    /// The first guarded path.
    pub fn path(&self) -> &Path {
        self.paths.first().map_or(Path::new(""), PathBuf::as_path)
    }

    /// Create the parent directories of every guarded path.
    ///
    /// # Errors
    /// Returns an IO error if a directory cannot be created.
    pub fn prepare(&self) -> Result<()> {
        for path in &self.paths {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }

    /// Create the first guarded file.
    ///
    /// # Errors
    /// Returns an IO error if the file cannot be created.
    pub fn create(&self) -> Result<File> {
        self.prepare()?;
        Ok(File::create(self.path())?)
    }

    /// Write `data` to the first guarded file and keep it.
    ///
    /// # Errors
    /// Returns an IO error; the partial file is removed.
    pub fn write_all(self, data: &[u8]) -> Result<()> {
        let mut file = self.create()?;
        file.write_all(data)?;
        file.sync_all()?;
        drop(file);
        self.commit();
        Ok(())
    }

    /// Keep the files.
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for OutputFileGuard {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        for path in &self.paths {
            if path.exists() {
                match std::fs::remove_file(path) {
                    Ok(()) => tracing::debug!("removed partial output {}", path.display()),
                    Err(err) => tracing::warn!("failed to remove partial output {}: {}", path.display(), err),
                }
            }
        }
    }
}
