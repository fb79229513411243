// file: src/sources/originals.rs
// description: consolidates numbered original prompt files into one table

use super::{file_stem, list_files};
use crate::error::Result;
use crate::models::{OriginalPrompt, numeric_id};
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

pub struct OriginalPromptCollector {
    dir: PathBuf,
}

impl OriginalPromptCollector {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Reads every `<n>.txt`, keyed by the first digit run of its stem,
    /// sorted by that id.
    pub fn collect(&self) -> Result<Vec<OriginalPrompt>> {
        let mut prompts = Vec::new();

        for path in list_files(&self.dir, "txt")? {
            let stem = file_stem(&path);

            let Some(id) = numeric_id(&stem) else {
                warn!("[{}] No numeric id in file name, skipping", stem);
                continue;
            };

            match fs::read_to_string(&path) {
                Ok(text) => prompts.push(OriginalPrompt {
                    id,
                    prompt_original: text.trim().to_string(),
                }),
                Err(e) => warn!("[{}] Error reading file: {}", stem, e),
            }
        }

        prompts.sort_by_key(|p| p.id);

        info!(
            "Collected {} original prompts from {}",
            prompts.len(),
            self.dir.display()
        );
        Ok(prompts)
    }
}
