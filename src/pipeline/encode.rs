//! Image encoding: `DynamicImage` → PNG bytes, and bytes → base64 data URI.
//!
//! pdfium hands back embedded images as decoded bitmaps regardless of the
//! filter they were stored with, so PDF images are re-encoded as PNG before
//! they reach the image store. PNG is lossless; figures with text in them stay
//! legible. DOCX images are stored as-is and never pass through here.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a decoded image as PNG bytes.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    debug!(
        "Encoded {}x{} image → {} bytes PNG",
        img.width(),
        img.height(),
        buf.len()
    );
    Ok(buf)
}

/// Build a `data:` URI embedding `bytes` with the given MIME type.
pub fn data_uri(bytes: &[u8], mime_type: &str) -> String {
    format!("data:{};base64,{}", mime_type, STANDARD.encode(bytes))
}
