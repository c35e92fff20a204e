use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors from on-disk corpus handling.
#[derive(Error, Debug)]
pub enum CorpusError {
    #[error("Corpus I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl CorpusError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        CorpusError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Lists the corpus entry files of `dir`, sorted by path.
///
/// Entries are read-only inputs owned by the corpus directory; this module
/// never mutates them. Subdirectories and other non-files are skipped. The
/// sort gives the triage loop a stable order, which the first-seen tie-break
/// in deduplication depends on for reproducible reports.
pub fn list_entries(dir: &Path) -> Result<Vec<PathBuf>, CorpusError> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| CorpusError::io(dir, e))? {
        let entry = entry.map_err(|e| CorpusError::io(dir, e))?;
        let path = entry.path();
        if path.is_file() {
            entries.push(path);
        }
    }
    entries.sort();
    Ok(entries)
}

/// Copies every corpus entry of `src` into `dst`, creating `dst` first.
/// Returns the number of entries copied.
pub fn copy_entries(src: &Path, dst: &Path) -> Result<usize, CorpusError> {
    fs::create_dir_all(dst).map_err(|e| CorpusError::io(dst, e))?;
    let mut copied = 0;
    for entry in list_entries(src)? {
        // list_entries only yields files, so file_name is always present.
        if let Some(name) = entry.file_name() {
            fs::copy(&entry, dst.join(name)).map_err(|e| CorpusError::io(&entry, e))?;
            copied += 1;
        }
    }
    Ok(copied)
}
