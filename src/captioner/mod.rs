// file: src/captioner/mod.rs
// description: vision model captioning module exports
// reference: internal module structure

pub mod client;
pub mod encoding;
pub mod retry;

use crate::error::Result;
use std::future::Future;

pub use client::OpenAiCaptionClient;
pub use encoding::{data_url, encode_bytes_png_base64, encode_image_png_base64, verify_image_bytes};
pub use retry::RetryPolicy;

/// Produces a one-line caption for a base64-encoded PNG.
pub trait Captioner {
    fn caption(&self, image_b64: &str) -> impl Future<Output = Result<String>> + Send;
}
