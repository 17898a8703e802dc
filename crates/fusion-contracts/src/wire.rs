//! JSON shapes exchanged between the generation client and backend.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const ERROR_API_KEY_MISSING: &str = "API_KEY_MISSING";
pub const ERROR_GENERATION_FAILED_PREFIX: &str = "Image generation failed";
pub const ERROR_NO_IMAGE: &str = "No image was generated.";
pub const ERROR_MISSING_FIELDS: &str = "Missing required fields: prompt and image1.";
pub const ERROR_METHOD_NOT_ALLOWED: &str = "Method Not Allowed";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedImage {
    pub data: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
}

/// One submission. Built fresh per submit and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub image1: EncodedImage,
    pub image2: Option<EncodedImage>,
}

impl GenerationRequest {
    pub fn new(
        prompt: impl Into<String>,
        image1: EncodedImage,
        image2: Option<EncodedImage>,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            image1,
            image2,
        }
    }

    pub fn images(&self) -> impl Iterator<Item = &EncodedImage> {
        std::iter::once(&self.image1).chain(self.image2.as_ref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessBody {
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Status line and body of a backend reply, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawReply {
    pub status: u16,
    pub body: String,
}

impl RawReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn success(data: impl Into<String>) -> Self {
        Self::json(200, &SuccessBody { data: data.into() })
    }

    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self::json(
            status,
            &ErrorBody {
                error: message.into(),
            },
        )
    }

    fn json<T: Serialize>(status: u16, body: &T) -> Self {
        let body = serde_json::to_string(body).unwrap_or_else(|_| Value::Null.to_string());
        Self { status, body }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::{EncodedImage, GenerationRequest, RawReply};

    #[test]
    fn request_serializes_with_camel_case_mime_and_null_second_image() -> anyhow::Result<()> {
        let request = GenerationRequest::new(
            "blend",
            EncodedImage {
                data: "QUJD".to_string(),
                mime_type: "image/png".to_string(),
            },
            None,
        );
        let value: Value = serde_json::to_value(&request)?;
        assert_eq!(
            value,
            json!({
                "prompt": "blend",
                "image1": {"data": "QUJD", "mimeType": "image/png"},
                "image2": null,
            })
        );
        assert_eq!(request.images().count(), 1);
        Ok(())
    }

    #[test]
    fn request_accepts_missing_second_image() -> anyhow::Result<()> {
        let parsed: GenerationRequest = serde_json::from_value(json!({
            "prompt": "p",
            "image1": {"data": "AA==", "mimeType": "image/jpeg"},
        }))?;
        assert!(parsed.image2.is_none());
        Ok(())
    }

    #[test]
    fn reply_helpers_write_contract_bodies() -> anyhow::Result<()> {
        let ok = RawReply::success("data:image/png;base64,AA==");
        assert!(ok.is_success());
        assert_eq!(
            serde_json::from_str::<Value>(&ok.body)?,
            json!({"data": "data:image/png;base64,AA=="})
        );

        let err = RawReply::error(500, "API_KEY_MISSING");
        assert!(!err.is_success());
        assert_eq!(
            serde_json::from_str::<Value>(&err.body)?,
            json!({"error": "API_KEY_MISSING"})
        );
        Ok(())
    }
}
