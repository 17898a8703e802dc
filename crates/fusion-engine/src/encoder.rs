use std::fs;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use fusion_contracts::errors::GenerationError;
use fusion_contracts::wire::EncodedImage;

use crate::source::{ImageContent, SourceImage};

pub(crate) const FALLBACK_MIME: &str = "application/octet-stream";

/// Reads a source image and encodes it for transport. A read failure is
/// terminal for the submission.
pub fn encode_source(source: &SourceImage) -> Result<EncodedImage, GenerationError> {
    match source.content() {
        ImageContent::File(path) => encode_file(path),
        ImageContent::Memory { bytes, mime_type } => Ok(encode_bytes(bytes, mime_type)),
    }
}

pub fn encode_file(path: &Path) -> Result<EncodedImage, GenerationError> {
    let bytes = fs::read(path).map_err(|err| GenerationError::Encoding {
        detail: format!("failed reading {}: {err}", path.display()),
    })?;
    let mime_type = mime_for_path(path)
        .or_else(|| sniff_mime(&bytes))
        .unwrap_or(FALLBACK_MIME);
    Ok(encode_bytes(&bytes, mime_type))
}

pub fn encode_bytes(bytes: &[u8], mime_type: &str) -> EncodedImage {
    EncodedImage {
        data: BASE64.encode(bytes),
        mime_type: mime_type.to_string(),
    }
}

pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "heic" => Some("image/heic"),
        "heif" => Some("image/heif"),
        "bmp" => Some("image/bmp"),
        _ => None,
    }
}

pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    image::guess_format(bytes)
        .ok()
        .map(|format| format.to_mime_type())
}
