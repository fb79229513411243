// file: src/utils/validation.rs
// description: input validation helpers for dataset folders, urls and cells
// reference: input validation patterns

use crate::error::{PipelineError, Result};
use std::path::Path;

pub struct Validator;

impl Validator {
    pub fn validate_directory(path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(PipelineError::Validation(format!(
                "Directory does not exist: {}",
                path.display()
            )));
        }

        if !path.is_dir() {
            return Err(PipelineError::Validation(format!(
                "Path is not a directory: {}",
                path.display()
            )));
        }

        Ok(())
    }

    pub fn validate_url(url: &str) -> Result<()> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(PipelineError::Validation(format!(
                "Invalid URL format: {}",
                url
            )));
        }
        Ok(())
    }

    pub fn validate_content_not_empty(content: &str) -> Result<()> {
        if content.trim().is_empty() {
            return Err(PipelineError::Validation("Content is empty".to_string()));
        }
        Ok(())
    }

    /// Extension of an image url: text after the last dot, cut at the query
    /// string, at most four characters, lowercased.
    pub fn url_extension(url: &str) -> String {
        let tail = url.rsplit('.').next().unwrap_or(url);
        let tail = tail.split('?').next().unwrap_or(tail);
        tail.chars().take(4).collect::<String>().to_lowercase()
    }

    pub fn validate_image_extension(ext: &str, allowed: &[String]) -> Result<()> {
        if allowed.iter().any(|a| a.eq_ignore_ascii_case(ext)) {
            Ok(())
        } else {
            Err(PipelineError::Validation(format!(
                "Unsupported image extension: {}",
                ext
            )))
        }
    }
}
