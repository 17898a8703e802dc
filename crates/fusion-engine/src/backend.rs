use fusion_contracts::artifact::GenerationResult;
use fusion_contracts::events::EventWriter;
use fusion_contracts::wire::{
    EncodedImage, GenerationRequest, RawReply, ERROR_API_KEY_MISSING, ERROR_METHOD_NOT_ALLOWED,
    ERROR_MISSING_FIELDS, ERROR_NO_IMAGE,
};
use serde_json::{json, Value};
use thiserror::Error;

use crate::{error_chain_text, map_object};

/// What the model returned for one call: the first image it produced
/// and/or its text response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelOutput {
    pub image: Option<EncodedImage>,
    pub text: Option<String>,
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("API_KEY_MISSING")]
    MissingApiKey,
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

pub trait ImageModel: Send + Sync {
    fn name(&self) -> &str;

    /// Whether credentials are present. Checked before the request body is
    /// even parsed.
    fn is_configured(&self) -> bool {
        true
    }

    fn generate(&self, prompt: &str, images: &[EncodedImage]) -> Result<ModelOutput, ModelError>;
}

/// Serves the generation endpoint: turns a request body into a status and
/// JSON body, calling the model once.
pub struct GenerationBackend {
    model: Box<dyn ImageModel>,
    events: EventWriter,
}

impl GenerationBackend {
    pub fn new<M: ImageModel + 'static>(model: M) -> Self {
        Self {
            model: Box::new(model),
            events: EventWriter::disabled("backend"),
        }
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = events;
        self
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    pub fn handle(&self, method: &str, body: &str) -> RawReply {
        let reply = self.handle_inner(method, body);
        self.events.emit_lossy(
            "backend_reply",
            map_object(json!({
                "model": self.model.name(),
                "status": reply.status,
            })),
        );
        reply
    }

    fn handle_inner(&self, method: &str, body: &str) -> RawReply {
        if !method.eq_ignore_ascii_case("POST") {
            return RawReply::error(405, ERROR_METHOD_NOT_ALLOWED);
        }
        if !self.model.is_configured() {
            return RawReply::error(500, ERROR_API_KEY_MISSING);
        }

        let payload: Value = match serde_json::from_str(if body.is_empty() { "{}" } else { body }) {
            Ok(value) => value,
            Err(err) => return RawReply::error(500, err.to_string()),
        };
        let has_prompt = payload
            .get("prompt")
            .and_then(Value::as_str)
            .map(|value| !value.is_empty())
            .unwrap_or(false);
        let has_image1 = payload
            .get("image1")
            .map(Value::is_object)
            .unwrap_or(false);
        if !has_prompt || !has_image1 {
            return RawReply::error(400, ERROR_MISSING_FIELDS);
        }
        let request: GenerationRequest = match serde_json::from_value(payload) {
            Ok(request) => request,
            Err(err) => return RawReply::error(500, err.to_string()),
        };
        self.handle_request(&request)
    }

    pub fn handle_request(&self, request: &GenerationRequest) -> RawReply {
        let images: Vec<EncodedImage> = request.images().cloned().collect();
        self.events.emit_lossy(
            "backend_request",
            map_object(json!({
                "model": self.model.name(),
                "images": images.len(),
                "prompt_chars": request.prompt.chars().count(),
            })),
        );

        let output = match self.model.generate(&request.prompt, &images) {
            Ok(output) => output,
            Err(ModelError::MissingApiKey) => return RawReply::error(500, ERROR_API_KEY_MISSING),
            Err(ModelError::Failed(err)) => {
                return RawReply::error(500, error_chain_text(&err, 2000))
            }
        };

        if let Some(image) = output.image.filter(|image| !image.data.is_empty()) {
            return RawReply::success(GenerationResult::from_encoded(&image).into_uri());
        }
        if let Some(text) = output.text.filter(|text| !text.trim().is_empty()) {
            return RawReply::error(
                500,
                format!("Image generation failed. Model response: {text}"),
            );
        }
        RawReply::error(500, ERROR_NO_IMAGE)
    }
}
