use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use fusion_contracts::wire::EncodedImage;
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Map, Value};

use crate::backend::{ImageModel, ModelError, ModelOutput};
use crate::config::BackendConfig;
use crate::truncate_text;

const RETRY_BACKOFF_SECONDS: f64 = 1.2;

/// Gemini `generateContent` with inline images, asking for IMAGE and TEXT.
pub struct GeminiImageModel {
    config: BackendConfig,
    http: HttpClient,
}

impl GeminiImageModel {
    pub fn new(config: BackendConfig) -> Self {
        Self {
            config,
            http: HttpClient::new(),
        }
    }

    fn endpoint(&self) -> String {
        let trimmed = self.config.model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!(
            "{}/{}:generateContent",
            self.config.api_base.trim_end_matches('/'),
            model_path
        )
    }

    fn post_with_transport_retries(
        &self,
        endpoint: &str,
        api_key: &str,
        payload: &Value,
    ) -> Result<HttpResponse> {
        let max_retries = self.config.retries;
        for attempt in 0..=max_retries {
            let response = self
                .http
                .post(endpoint)
                .query(&[("key", api_key)])
                .timeout(self.config.request_timeout)
                .json(payload)
                .send();

            match response {
                Ok(ok) => return Ok(ok),
                Err(raw) => {
                    let err = anyhow::Error::new(raw)
                        .context(format!("Gemini request failed ({})", self.config.model));
                    if !is_retryable_transport_error(&err) || attempt >= max_retries {
                        return Err(err);
                    }
                    eprintln!(
                        "fusion backend: Gemini transport retry {}/{} after transient failure.",
                        attempt + 1,
                        max_retries
                    );
                    let delay_s = RETRY_BACKOFF_SECONDS * (attempt as f64 + 1.0);
                    thread::sleep(Duration::from_secs_f64(delay_s));
                }
            }
        }

        unreachable!("Gemini transport retry loop should always return a response or error")
    }
}

impl ImageModel for GeminiImageModel {
    fn name(&self) -> &str {
        &self.config.model
    }

    fn is_configured(&self) -> bool {
        self.config.api_key.is_some()
    }

    fn generate(&self, prompt: &str, images: &[EncodedImage]) -> Result<ModelOutput, ModelError> {
        let Some(api_key) = self.config.api_key.as_deref() else {
            return Err(ModelError::MissingApiKey);
        };
        let payload = build_payload(prompt, images);
        let response = self.post_with_transport_retries(&self.endpoint(), api_key, &payload)?;
        let response_payload = response_json_or_error(response)?;
        Ok(extract_output(&response_payload))
    }
}

/// Images first, prompt text last.
pub(crate) fn build_payload(prompt: &str, images: &[EncodedImage]) -> Value {
    let mut parts: Vec<Value> = images
        .iter()
        .map(|image| {
            json!({
                "inlineData": {
                    "data": image.data,
                    "mimeType": image.mime_type,
                }
            })
        })
        .collect();
    parts.push(json!({ "text": prompt }));
    json!({
        "contents": [{
            "role": "user",
            "parts": parts,
        }],
        "generationConfig": {
            "responseModalities": ["IMAGE", "TEXT"],
        },
    })
}

/// Reads the first candidate only: its first inline image, and the
/// concatenation of its text parts.
pub(crate) fn extract_output(response_payload: &Value) -> ModelOutput {
    let parts = response_payload
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
        .and_then(|candidate| candidate.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut image = None;
    let mut text = String::new();
    for part in &parts {
        if image.is_none() {
            let inline = part
                .get("inlineData")
                .or_else(|| part.get("inline_data"))
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_else(Map::new);
            let data = inline
                .get("data")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if !data.is_empty() {
                let mime_type = inline
                    .get("mimeType")
                    .or_else(|| inline.get("mime_type"))
                    .and_then(Value::as_str)
                    .unwrap_or("image/png");
                image = Some(EncodedImage {
                    data: data.to_string(),
                    mime_type: mime_type.to_string(),
                });
            }
        }
        if let Some(chunk) = part.get("text").and_then(Value::as_str) {
            text.push_str(chunk);
        }
    }

    ModelOutput {
        image,
        text: (!text.trim().is_empty()).then_some(text),
    }
}

fn response_json_or_error(response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response.text().context("Gemini response body read failed")?;
    if !status.is_success() {
        bail!("Gemini request failed ({code}): {}", truncate_text(&body, 512));
    }
    let parsed: Value =
        serde_json::from_str(&body).context("Gemini returned invalid JSON payload")?;
    Ok(parsed)
}

fn is_retryable_transport_error(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<reqwest::Error>()
            .map(|reqwest_err| {
                reqwest_err.is_timeout() || reqwest_err.is_connect() || reqwest_err.is_request()
            })
            .unwrap_or(false)
    })
}
