use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("directory missing or not writable: {0}")]
    Dir(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Ensure the directory exists; create if missing.
pub fn ensure_dir(dir: &Path) -> Result<(), PersistError> {
    if dir.exists() {
        let meta = fs::metadata(dir).map_err(|e| PersistError::Dir(e.to_string()))?;
        if !meta.is_dir() {
            return Err(PersistError::Dir(format!("{} is not a directory", dir.display())));
        }
    } else {
        fs::create_dir_all(dir).map_err(|e| PersistError::Dir(e.to_string()))?;
    }
    Ok(())
}

/// Atomically write content to `{dir}/{filename}` by writing a temp file in
/// the same directory, syncing it, then renaming over the target.
#[derive(Debug, Clone)]
pub struct AtomicFileWriter {
    dir: PathBuf,
}

impl AtomicFileWriter {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn write(&self, filename: &str, content: &[u8]) -> Result<PathBuf, PersistError> {
        ensure_dir(&self.dir)?;

        let target = self.dir.join(filename);
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(content)?;
        tmp.flush()?;
        tmp.as_file_mut().sync_all()?;

        // `persist` renames over an existing target, so readers see either
        // the old or the new content, never a mix.
        tmp.persist(&target).map_err(|e| PersistError::Io(e.error))?;
        Ok(target)
    }
}
