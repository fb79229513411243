// file: src/models/record.rs
// description: prompt, caption and original-prompt rows exchanged as csv
// reference: internal data structures

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

lazy_static! {
    static ref DIGITS: Regex = Regex::new(r"\d+").expect("valid digit pattern");
}

/// First run of ascii digits in `text`, parsed as an integer.
pub fn numeric_id(text: &str) -> Option<u64> {
    DIGITS.find(text).and_then(|m| m.as_str().parse().ok())
}

/// Orders ids numerically where both carry digits, otherwise by text.
pub(crate) fn compare_ids(a: &str, b: &str) -> Ordering {
    match (numeric_id(a), numeric_id(b)) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

/// An image paired with the prompt that produced it, before captioning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptRecord {
    pub id: String,
    pub prompt: String,
    pub image_filename: String,
}

impl PromptRecord {
    pub fn new(
        id: impl Into<String>,
        prompt: impl Into<String>,
        image_filename: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into(),
            image_filename: image_filename.into(),
        }
    }

    pub fn with_caption(self, caption: String) -> CaptionRecord {
        CaptionRecord {
            id: self.id,
            prompt: self.prompt,
            image_filename: self.image_filename,
            caption: Some(caption),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionRecord {
    pub id: String,
    pub prompt: String,
    pub image_filename: String,
    pub caption: Option<String>,
}

impl CaptionRecord {
    pub fn has_caption(&self) -> bool {
        self.caption
            .as_deref()
            .is_some_and(|caption| !caption.trim().is_empty())
    }

    pub fn sort_by_id(records: &mut [CaptionRecord]) {
        records.sort_by(|a, b| compare_ids(&a.id, &b.id));
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OriginalPrompt {
    pub id: u64,
    pub prompt_original: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_id() {
        assert_eq!(numeric_id("img_0000042"), Some(42));
        assert_eq!(numeric_id("17"), Some(17));
        assert_eq!(numeric_id("prompt"), None);
    }

    #[test]
    fn test_sort_by_id_is_numeric() {
        let mut records: Vec<CaptionRecord> = ["10", "2", "1", "abc"]
            .iter()
            .map(|id| PromptRecord::new(*id, "p", format!("{}.png", id)).with_caption("c".into()))
            .collect();

        CaptionRecord::sort_by_id(&mut records);
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "10", "abc"]);
    }

    #[test]
    fn test_has_caption() {
        let mut record = PromptRecord::new("1", "p", "1.png").with_caption("  ".into());
        assert!(!record.has_caption());
        record.caption = Some("A cat".into());
        assert!(record.has_caption());
        record.caption = None;
        assert!(!record.has_caption());
    }
}
