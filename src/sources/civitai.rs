// file: src/sources/civitai.rs
// description: prompt extraction from scraped Civitai json metadata
// reference: https://docs.rs/serde_json

use super::{file_stem, list_files};
use crate::error::Result;
use crate::models::PromptRecord;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const CIVITAI_OUTPUT_FILE: &str = "civitai_image_prompt_captioned_cleaned.csv";

/// A folder of `<base>.json` metadata files next to `<base>.jpg` images.
pub struct CivitaiSource {
    dir: PathBuf,
}

impl CivitaiSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn default_output(&self) -> PathBuf {
        self.dir.join(CIVITAI_OUTPUT_FILE)
    }

    pub fn extract_prompts(&self) -> Result<Vec<PromptRecord>> {
        info!("Extracting Civitai prompts from {}", self.dir.display());

        let mut seen = HashSet::new();
        let mut records = Vec::new();

        for json_path in list_files(&self.dir, "json")? {
            let base = file_stem(&json_path);
            let image_filename = format!("{}.jpg", base);

            if !self.dir.join(&image_filename).is_file() {
                debug!("No image for {}, skipping", json_path.display());
                continue;
            }

            let prompt = match Self::read_prompt(&json_path) {
                Ok(prompt) => prompt,
                Err(e) => {
                    warn!("Unreadable metadata {}: {}", json_path.display(), e);
                    continue;
                }
            };

            if prompt.is_empty() || !seen.insert(prompt.clone()) {
                continue;
            }

            records.push(PromptRecord::new(base, prompt, image_filename));
        }

        info!("Found {} unique Civitai prompts", records.len());
        Ok(records)
    }

    fn read_prompt(path: &Path) -> Result<String> {
        let text = fs::read_to_string(path)?;
        let data: serde_json::Value = serde_json::from_str(&text)?;

        Ok(data
            .get("meta")
            .and_then(|meta| meta.get("prompt"))
            .and_then(|prompt| prompt.as_str())
            .unwrap_or_default()
            .trim()
            .to_string())
    }
}
