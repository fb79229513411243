// file: src/exporter/csv.rs
// description: csv reading and atomic writing of prompt and caption datasets
// reference: https://docs.rs/csv

use crate::error::{PipelineError, Result};
use crate::models::{CaptionRecord, OriginalPrompt, PromptRecord};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const CAPTION_HEADER: &[&str] = &["id", "prompt", "image_filename", "caption"];
pub const PROMPT_HEADER: &[&str] = &["id", "prompt", "image_filename"];
pub const ORIGINAL_HEADER: &[&str] = &["id", "prompt_original"];

pub struct CsvStore;

impl CsvStore {
    pub fn read_captions(path: &Path) -> Result<Vec<CaptionRecord>> {
        Self::read_rows(path)
    }

    pub fn write_captions(path: &Path, records: &[CaptionRecord]) -> Result<()> {
        Self::write_rows(path, records, CAPTION_HEADER)
    }

    pub fn write_prompts(path: &Path, records: &[PromptRecord]) -> Result<()> {
        Self::write_rows(path, records, PROMPT_HEADER)
    }

    pub fn read_originals(path: &Path) -> Result<Vec<OriginalPrompt>> {
        Self::read_rows(path)
    }

    pub fn write_originals(path: &Path, records: &[OriginalPrompt]) -> Result<()> {
        Self::write_rows(path, records, ORIGINAL_HEADER)
    }

    pub fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
        let mut reader = ::csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_path(path)?;

        let mut rows = Vec::new();
        for row in reader.deserialize() {
            rows.push(row?);
        }

        debug!("Read {} rows from {}", rows.len(), path.display());
        Ok(rows)
    }

    /// Writes to a sibling temp file, then renames it over `path`.
    pub fn write_rows<T: Serialize>(path: &Path, rows: &[T], header: &[&str]) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| PipelineError::FileOperation {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let tmp_path = Self::temp_path(path);

        {
            let mut writer = if rows.is_empty() {
                let mut writer = ::csv::WriterBuilder::new()
                    .has_headers(false)
                    .from_path(&tmp_path)?;
                writer.write_record(header)?;
                writer
            } else {
                ::csv::WriterBuilder::new()
                    .has_headers(true)
                    .from_path(&tmp_path)?
            };

            for row in rows {
                writer.serialize(row)?;
            }
            writer.flush()?;
        }

        fs::rename(&tmp_path, path).map_err(|source| PipelineError::FileOperation {
            path: path.to_path_buf(),
            source,
        })?;

        debug!("Wrote {} rows to {}", rows.len(), path.display());
        Ok(())
    }

    fn temp_path(path: &Path) -> PathBuf {
        let mut name = path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        path.with_file_name(name)
    }
}
