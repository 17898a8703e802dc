pub mod backend;
pub mod client;
pub mod config;
pub mod dryrun;
pub mod encoder;
pub mod gemini;
pub mod session;
pub mod source;

use serde_json::{Map, Value};

pub use backend::{GenerationBackend, ImageModel, ModelError, ModelOutput};
pub use client::{classify_reply, GenerationClient, HttpTransport, InProcessTransport, Transport};
pub use config::{BackendConfig, ClientConfig};
pub use dryrun::DryrunImageModel;
pub use gemini::GeminiImageModel;
pub use session::{Outcome, Session, SessionError};
pub use source::{ImagePreview, Slot, SourceImage};

pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Picks the transport for `config`: HTTP when an endpoint is set,
/// otherwise the backend built by `backend` runs in-process.
pub fn client_for<F>(config: &ClientConfig, backend: F) -> GenerationClient
where
    F: FnOnce() -> GenerationBackend,
{
    match config.endpoint.as_deref() {
        Some(endpoint) => GenerationClient::new(HttpTransport::new(endpoint, config.timeout)),
        None => GenerationClient::new(InProcessTransport::new(std::sync::Arc::new(backend()))),
    }
}

pub(crate) fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts
            .last()
            .map(|existing| existing == trimmed)
            .unwrap_or(false)
        {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

pub(crate) fn map_object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}
