//! Image encoding: `DynamicImage` → PNG bytes → base64 for the request body.
//!
//! PNG is lossless; JPEG artefacts around thin drawing lines and small print
//! hurt recognition.

use crate::error::{ItemError, OcrError};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

/// Encoded image bytes plus their MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
}

impl ImagePayload {
    /// Wrap already-encoded bytes (e.g. a file read from disk).
    pub fn from_bytes(bytes: Vec<u8>, mime_type: &'static str) -> Self {
        Self { bytes, mime_type }
    }

    /// PNG-encode an in-memory image.
    pub fn png(img: &DynamicImage) -> Result<Self, ItemError> {
        let bytes = encode_png(img).map_err(|e| ItemError::Encode {
            detail: e.to_string(),
        })?;
        Ok(Self {
            bytes,
            mime_type: "image/png",
        })
    }

    /// Standard base64 of the bytes.
    pub fn base64(&self) -> String {
        let b64 = STANDARD.encode(&self.bytes);
        debug!("Encoded image → {} bytes base64", b64.len());
        b64
    }

    /// `data:{mime};base64,{…}` URI for OpenAI-style `image_url` parts.
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64())
    }
}

/// Encode an image as PNG bytes.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}

/// Write an image to `path` as PNG.
pub fn save_png(img: &DynamicImage, path: &Path) -> Result<(), OcrError> {
    img.save_with_format(path, image::ImageFormat::Png)
        .map_err(|e| OcrError::ArtifactWriteFailed {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn png_payload_has_png_signature() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let payload = ImagePayload::png(&img).expect("encode should succeed");
        assert_eq!(payload.mime_type, "image/png");
        assert_eq!(&payload.bytes[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn data_uri_prefix() {
        let payload = ImagePayload::from_bytes(vec![1, 2, 3], "image/jpeg");
        assert_eq!(payload.data_uri(), "data:image/jpeg;base64,AQID");
    }
}
