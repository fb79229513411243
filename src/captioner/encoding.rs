// file: src/captioner/encoding.rs
// description: image validation and png/base64 payload encoding
// reference: https://docs.rs/image

use crate::error::{PipelineError, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::ImageFormat;
use std::fs;
use std::io::Cursor;
use std::path::Path;

/// Decodes any supported image, flattens it to RGB and re-encodes it as a
/// base64 PNG.
pub fn encode_image_png_base64(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|source| PipelineError::FileOperation {
        path: path.to_path_buf(),
        source,
    })?;

    encode_bytes_png_base64(&bytes)
        .map_err(|e| PipelineError::Image(format!("{}: {}", path.display(), e)))
}

pub fn encode_bytes_png_base64(bytes: &[u8]) -> Result<String> {
    let rgb = image::load_from_memory(bytes)?.to_rgb8();

    let mut buffer = Cursor::new(Vec::with_capacity(bytes.len()));
    rgb.write_to(&mut buffer, ImageFormat::Png)?;

    Ok(STANDARD.encode(buffer.into_inner()))
}

pub fn verify_image_bytes(bytes: &[u8]) -> Result<()> {
    image::load_from_memory(bytes)?;
    Ok(())
}

pub fn data_url(image_b64: &str) -> String {
    format!("data:image/png;base64,{}", image_b64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use tempfile::TempDir;

    fn png_bytes() -> Vec<u8> {
        let img = RgbaImage::from_pixel(3, 2, Rgba([200, 10, 10, 128]));
        let mut buffer = Cursor::new(Vec::new());
        img.write_to(&mut buffer, ImageFormat::Png).unwrap();
        buffer.into_inner()
    }

    #[test]
    fn test_encode_flattens_to_rgb_png() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("sample.png");
        fs::write(&path, png_bytes()).unwrap();

        let encoded = encode_image_png_base64(&path).unwrap();
        let decoded = STANDARD.decode(encoded).unwrap();

        assert_eq!(
            image::guess_format(&decoded).unwrap(),
            ImageFormat::Png
        );
        let img = image::load_from_memory(&decoded).unwrap();
        assert_eq!((img.width(), img.height()), (3, 2));
        assert!(!img.color().has_alpha());
    }

    #[test]
    fn test_encode_rejects_corrupt_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("broken.jpg");
        fs::write(&path, b"definitely not a jpeg").unwrap();

        assert!(matches!(
            encode_image_png_base64(&path),
            Err(PipelineError::Image(_))
        ));
    }

    #[test]
    fn test_encode_missing_file() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            encode_image_png_base64(&temp.path().join("absent.png")),
            Err(PipelineError::FileOperation { .. })
        ));
    }

    #[test]
    fn test_verify_image_bytes() {
        assert!(verify_image_bytes(&png_bytes()).is_ok());
        assert!(verify_image_bytes(b"<html>not found</html>").is_err());
    }

    #[test]
    fn test_data_url() {
        assert_eq!(data_url("QUJD"), "data:image/png;base64,QUJD");
    }
}
