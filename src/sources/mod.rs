// file: src/sources/mod.rs
// description: dataset source readers and shared directory listing
// reference: https://docs.rs/walkdir

pub mod civitai;
pub mod enhanced;
pub mod lexica;
pub mod originals;

use crate::error::{PipelineError, Result};
use crate::utils::Validator;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub use civitai::CivitaiSource;
pub use enhanced::EnhancedFolder;
pub use lexica::{LexicaExtraction, LexicaSource};
pub use originals::OriginalPromptCollector;

/// Regular files directly inside `dir` with the given extension, by name.
pub fn list_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    Validator::validate_directory(dir)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .follow_links(false)
    {
        let entry = entry.map_err(|e| PipelineError::Validation(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        if entry.path().extension().is_some_and(|ext| ext == extension) {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}

pub(crate) fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}
