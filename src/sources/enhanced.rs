// file: src/sources/enhanced.rs
// description: images generated from enhanced prompts, one folder per model

use super::{file_stem, list_files};
use crate::error::Result;
use crate::models::PromptRecord;
use crate::models::record::compare_ids;
use crate::utils::Validator;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// `<base>/<MODEL>/` holding `<id>.png` images and `<id>.txt` prompts.
pub struct EnhancedFolder {
    model: String,
    folder: PathBuf,
    num_samples: usize,
}

impl EnhancedFolder {
    pub fn new(base: &Path, model: impl Into<String>, num_samples: usize) -> Self {
        let model = model.into();
        Self {
            folder: base.join(&model),
            model,
            num_samples,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn checkpoint_file(&self) -> String {
        format!("{}_captions_temp.csv", self.model)
    }

    pub fn output_file(&self) -> String {
        format!("{}_captions_sorted.csv", self.model)
    }

    pub fn scan(&self) -> Result<Vec<PromptRecord>> {
        let mut images = list_files(&self.folder, "png")?;
        images.sort_by(|a, b| compare_ids(&file_stem(a), &file_stem(b)));
        images.truncate(self.num_samples);

        let mut records = Vec::with_capacity(images.len());

        for image in images {
            let id = file_stem(&image);

            if id.parse::<u64>().is_err() {
                warn!("[{}] [{}] Non-numeric image id, skipping", self.model, id);
                continue;
            }

            let prompt_path = self.folder.join(format!("{}.txt", id));
            if !prompt_path.is_file() {
                warn!("[{}] [{}] Missing .txt file", self.model, id);
                continue;
            }

            let prompt = match fs::read_to_string(&prompt_path) {
                Ok(text) => text.trim().to_string(),
                Err(e) => {
                    warn!("[{}] [{}] Prompt read error: {}", self.model, id, e);
                    continue;
                }
            };

            if let Err(e) = Validator::validate_content_not_empty(&prompt) {
                warn!("[{}] [{}] {}, skipping", self.model, id, e);
                continue;
            }

            let image_filename = format!("{}.png", id);
            records.push(PromptRecord::new(id, prompt, image_filename));
        }

        info!(
            "[{}] {} image/prompt pairs ready for captioning",
            self.model,
            records.len()
        );
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup(ids: &[&str], with_prompt: &[&str]) -> TempDir {
        let temp = TempDir::new().unwrap();
        let folder = temp.path().join("BART");
        fs::create_dir(&folder).unwrap();
        for id in ids {
            fs::write(folder.join(format!("{}.png", id)), b"png").unwrap();
        }
        for id in with_prompt {
            fs::write(
                folder.join(format!("{}.txt", id)),
                format!("  enhanced prompt {}\n", id),
            )
            .unwrap();
        }
        temp
    }

    #[test]
    fn test_scan_orders_numerically_and_limits() {
        let temp = setup(&["1", "2", "10", "3"], &["1", "2", "10", "3"]);
        let folder = EnhancedFolder::new(temp.path(), "BART", 3);

        let records = folder.scan().unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();

        assert_eq!(ids, vec!["1", "2", "3"]);
        assert_eq!(records[0].prompt, "enhanced prompt 1");
        assert_eq!(records[2].image_filename, "3.png");
    }

    #[test]
    fn test_scan_skips_missing_prompt_and_bad_ids() {
        let temp = setup(&["1", "2", "cover"], &["2", "cover"]);
        let folder = EnhancedFolder::new(temp.path(), "BART", 200);

        let records = folder.scan().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "2");
    }

    #[test]
    fn test_scan_skips_blank_prompt() {
        let temp = setup(&["1", "2"], &["1", "2"]);
        fs::write(temp.path().join("BART/1.txt"), "  \n").unwrap();

        let records = EnhancedFolder::new(temp.path(), "BART", 200).scan().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "2");
    }

    #[test]
    fn test_file_names() {
        let folder = EnhancedFolder::new(Path::new("/base"), "QWEN", 200);
        assert_eq!(folder.checkpoint_file(), "QWEN_captions_temp.csv");
        assert_eq!(folder.output_file(), "QWEN_captions_sorted.csv");
        assert_eq!(folder.folder(), Path::new("/base/QWEN"));
    }
}
