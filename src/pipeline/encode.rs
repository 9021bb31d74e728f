//! Image encoding: `DynamicImage` → PNG bytes → base64.
//!
//! PNG is lossless; JPEG artefacts around rendered glyphs make vision models
//! misread small print. Both inference backends embed images as base64 in a
//! JSON body, so the base64 step lives here too.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use std::io::Cursor;

/// MIME type of every page image we produce.
pub const PNG_MIME: &str = "image/png";

/// Encode a rasterised page as PNG.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}

/// Standard base64 (with padding) of `bytes`.
pub fn to_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}
