use std::fmt;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use fusion_contracts::artifact::GenerationResult;
use image::ImageReader;

use crate::encoder::{mime_for_path, sniff_mime, FALLBACK_MIME};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    First,
    Second,
}

impl Slot {
    pub fn index(self) -> usize {
        match self {
            Self::First => 0,
            Self::Second => 1,
        }
    }

    pub fn number(self) -> u8 {
        match self {
            Self::First => 1,
            Self::Second => 2,
        }
    }
}

/// Where the image bytes live. Files are read at submission time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageContent {
    File(PathBuf),
    Memory { bytes: Arc<[u8]>, mime_type: String },
}

/// Display metadata derived locally when an image is selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePreview {
    pub name: String,
    pub mime_type: String,
    pub byte_len: Option<u64>,
    pub dimensions: Option<(u32, u32)>,
}

impl fmt::Display for ImagePreview {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}", self.name, self.mime_type)?;
        if let Some((width, height)) = self.dimensions {
            write!(f, ", {width}x{height}")?;
        }
        if let Some(len) = self.byte_len {
            write!(f, ", {len} bytes")?;
        }
        f.write_str(")")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    content: ImageContent,
    preview: ImagePreview,
}

impl SourceImage {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let preview = preview_for_path(&path);
        Self {
            content: ImageContent::File(path),
            preview,
        }
    }

    pub fn from_bytes(name: impl Into<String>, mime_type: Option<&str>, bytes: Vec<u8>) -> Self {
        let mime_type = mime_type
            .map(str::to_string)
            .or_else(|| sniff_mime(&bytes).map(str::to_string))
            .unwrap_or_else(|| FALLBACK_MIME.to_string());
        let preview = ImagePreview {
            name: name.into(),
            mime_type: mime_type.clone(),
            byte_len: Some(bytes.len() as u64),
            dimensions: dimensions_of_bytes(&bytes),
        };
        Self {
            content: ImageContent::Memory {
                bytes: bytes.into(),
                mime_type,
            },
            preview,
        }
    }

    /// Turns a generated result back into an input image.
    pub fn from_result(result: &GenerationResult) -> Result<Self> {
        let decoded = result.decode()?;
        let name = format!(
            "generated-image-{}.{}",
            chrono::Utc::now().timestamp_millis(),
            result.file_extension()
        );
        Ok(Self::from_bytes(
            name,
            Some(decoded.mime_type.as_str()),
            decoded.bytes,
        ))
    }

    pub fn content(&self) -> &ImageContent {
        &self.content
    }

    pub fn preview(&self) -> &ImagePreview {
        &self.preview
    }
}

fn preview_for_path(path: &Path) -> ImagePreview {
    let name = path
        .file_name()
        .map(|value| value.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    let mime_type = mime_for_path(path)
        .or_else(|| sniff_path(path))
        .unwrap_or(FALLBACK_MIME)
        .to_string();
    ImagePreview {
        name,
        mime_type,
        byte_len: std::fs::metadata(path).ok().map(|meta| meta.len()),
        dimensions: image::image_dimensions(path).ok(),
    }
}

/// Reads only the file header, matching the encoder's content sniffing.
fn sniff_path(path: &Path) -> Option<&'static str> {
    ImageReader::open(path)
        .ok()?
        .with_guessed_format()
        .ok()?
        .format()
        .map(|format| format.to_mime_type())
}

fn dimensions_of_bytes(bytes: &[u8]) -> Option<(u32, u32)> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}
