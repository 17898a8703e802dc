use std::fmt;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::wire::EncodedImage;

/// A generated image, held as a self-contained `data:` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationResult {
    uri: String,
}

impl GenerationResult {
    pub fn from_data_uri(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }

    pub fn from_encoded(image: &EncodedImage) -> Self {
        Self {
            uri: format!("data:{};base64,{}", image.mime_type, image.data),
        }
    }

    pub fn from_bytes(mime_type: &str, bytes: &[u8]) -> Self {
        Self {
            uri: format!("data:{mime_type};base64,{}", BASE64.encode(bytes)),
        }
    }

    pub fn as_uri(&self) -> &str {
        &self.uri
    }

    pub fn into_uri(self) -> String {
        self.uri
    }

    /// MIME type from the URI header, when the URI is a base64 data URI.
    pub fn mime_type(&self) -> Option<&str> {
        let (header, _) = self.split().ok()?;
        let mime = header.split(';').next().unwrap_or_default();
        (!mime.is_empty()).then_some(mime)
    }

    pub fn decode(&self) -> Result<DecodedImage> {
        let (header, payload) = self.split()?;
        let mime_type = header.split(';').next().unwrap_or_default();
        let bytes = BASE64
            .decode(payload.trim().as_bytes())
            .context("generated image base64 decode failed")?;
        Ok(DecodedImage {
            mime_type: if mime_type.is_empty() {
                "application/octet-stream".to_string()
            } else {
                mime_type.to_string()
            },
            bytes,
        })
    }

    pub fn file_extension(&self) -> &'static str {
        extension_for_mime(self.mime_type().unwrap_or_default())
    }

    fn split(&self) -> Result<(&str, &str)> {
        let Some(rest) = self.uri.strip_prefix("data:") else {
            bail!("generated image is not a data URI");
        };
        let Some((header, payload)) = rest.split_once(',') else {
            bail!("generated image data URI has no payload");
        };
        if !header.ends_with(";base64") {
            bail!("generated image data URI is not base64 encoded");
        }
        Ok((header, payload))
    }
}

impl fmt::Display for GenerationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const MAX_SHOWN: usize = 48;
        if self.uri.len() <= MAX_SHOWN {
            f.write_str(&self.uri)
        } else {
            let cut = (0..=MAX_SHOWN)
                .rev()
                .find(|idx| self.uri.is_char_boundary(*idx))
                .unwrap_or(0);
            write!(f, "{}… ({} chars)", &self.uri[..cut], self.uri.len())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

pub fn extension_for_mime(mime: &str) -> &'static str {
    match mime.trim().to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/bmp" => "bmp",
        "image/heic" => "heic",
        "image/heif" => "heif",
        _ => "png",
    }
}
