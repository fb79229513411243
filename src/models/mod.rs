// file: src/models/mod.rs
// description: data models module exports
// reference: internal module structure

pub mod loadings;
pub mod record;

pub use loadings::{ComponentLoadings, Loading};
pub use record::{CaptionRecord, OriginalPrompt, PromptRecord, numeric_id};
