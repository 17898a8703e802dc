use std::env;
use std::time::Duration;

pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image-preview";
pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_SUBMISSION_TIMEOUT_SECS: u64 = 60;

const MIN_SUBMISSION_TIMEOUT_SECS: u64 = 5;
const MAX_SUBMISSION_TIMEOUT_SECS: u64 = 600;
const DEFAULT_MODEL_RETRIES: usize = 2;
const MAX_MODEL_RETRIES: usize = 4;

/// Client-side settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Backend URL; `None` means the backend runs in-process.
    pub endpoint: Option<String>,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout: Duration::from_secs(DEFAULT_SUBMISSION_TIMEOUT_SECS),
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        Self {
            endpoint: non_empty_env("FUSION_ENDPOINT"),
            timeout: Duration::from_secs(parse_timeout_secs(
                non_empty_env("FUSION_TIMEOUT_SECS").as_deref(),
            )),
        }
    }

    pub fn with_endpoint(mut self, endpoint: Option<String>) -> Self {
        if let Some(endpoint) = endpoint.filter(|value| !value.trim().is_empty()) {
            self.endpoint = Some(endpoint.trim().to_string());
        }
        self
    }

    pub fn with_timeout_secs(mut self, seconds: Option<u64>) -> Self {
        if let Some(seconds) = seconds {
            self.timeout = Duration::from_secs(
                seconds.clamp(MIN_SUBMISSION_TIMEOUT_SECS, MAX_SUBMISSION_TIMEOUT_SECS),
            );
        }
        self
    }
}

/// Backend-side settings for the model call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub model: String,
    pub retries: usize,
    pub request_timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: DEFAULT_GEMINI_API_BASE.to_string(),
            model: DEFAULT_IMAGE_MODEL.to_string(),
            retries: DEFAULT_MODEL_RETRIES,
            request_timeout: Duration::from_secs(90),
        }
    }
}

impl BackendConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_key: non_empty_env("API_KEY")
                .or_else(|| non_empty_env("GEMINI_API_KEY"))
                .or_else(|| non_empty_env("GOOGLE_API_KEY")),
            api_base: non_empty_env("GEMINI_API_BASE")
                .map(|value| value.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_base),
            model: non_empty_env("FUSION_IMAGE_MODEL").unwrap_or(defaults.model),
            retries: non_empty_env("FUSION_MODEL_RETRIES")
                .and_then(|value| value.parse::<usize>().ok())
                .map(|value| value.min(MAX_MODEL_RETRIES))
                .unwrap_or(defaults.retries),
            request_timeout: defaults.request_timeout,
        }
    }
}

pub(crate) fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_timeout_secs(raw: Option<&str>) -> u64 {
    raw.and_then(|value| value.trim().parse::<u64>().ok())
        .map(|value| value.clamp(MIN_SUBMISSION_TIMEOUT_SECS, MAX_SUBMISSION_TIMEOUT_SECS))
        .unwrap_or(DEFAULT_SUBMISSION_TIMEOUT_SECS)
}
