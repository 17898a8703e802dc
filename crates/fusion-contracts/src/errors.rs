use thiserror::Error;

const UNKNOWN_MODEL_ERROR: &str = "Unknown model error";

/// Every way a submission can end without an image.
///
/// This is the surface the rest of the system matches on; the backend's
/// message strings are only interpreted in the client's classifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("missing required inputs for the selected mode")]
    Validation,
    #[error("backend has no model credentials configured")]
    Configuration,
    #[error("model declined: {detail}")]
    ModelRefusal { detail: String },
    #[error("no image was generated")]
    EmptyResult,
    #[error("server error (HTTP {status})")]
    Server { status: u16 },
    #[error("{raw}")]
    Unclassified { raw: String },
    #[error("image could not be read: {detail}")]
    Encoding { detail: String },
    #[error("no response within {seconds}s")]
    Timeout { seconds: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Configuration,
    ModelRefusal,
    EmptyResult,
    Server,
    Unclassified,
    Encoding,
    Timeout,
}

impl GenerationError {
    pub fn refusal(detail: impl Into<String>) -> Self {
        let detail = detail.into();
        let detail = detail.trim();
        Self::ModelRefusal {
            detail: if detail.is_empty() {
                UNKNOWN_MODEL_ERROR.to_string()
            } else {
                detail.to_string()
            },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation => ErrorKind::Validation,
            Self::Configuration => ErrorKind::Configuration,
            Self::ModelRefusal { .. } => ErrorKind::ModelRefusal,
            Self::EmptyResult => ErrorKind::EmptyResult,
            Self::Server { .. } => ErrorKind::Server,
            Self::Unclassified { .. } => ErrorKind::Unclassified,
            Self::Encoding { .. } => ErrorKind::Encoding,
            Self::Timeout { .. } => ErrorKind::Timeout,
        }
    }

    pub fn detail(&self) -> Option<String> {
        match self {
            Self::ModelRefusal { detail } | Self::Encoding { detail } => Some(detail.clone()),
            Self::Unclassified { raw } => Some(raw.clone()),
            Self::Server { status } => Some(status.to_string()),
            Self::Timeout { seconds } => Some(seconds.to_string()),
            Self::Validation | Self::Configuration | Self::EmptyResult => None,
        }
    }

    /// Localization key for the user-facing message. Unclassified errors
    /// have no key; their raw text is shown instead.
    pub fn message_key(&self) -> Option<&'static str> {
        match self.kind() {
            ErrorKind::Validation => Some("errorAllInputs"),
            ErrorKind::Configuration => Some("errorApiKey"),
            ErrorKind::ModelRefusal => Some("errorGenerationFailed"),
            ErrorKind::EmptyResult => Some("errorNoImageGenerated"),
            ErrorKind::Server => Some("errorServer"),
            ErrorKind::Encoding => Some("errorEncoding"),
            ErrorKind::Timeout => Some("errorTimeout"),
            ErrorKind::Unclassified => None,
        }
    }

    /// English message shown to the user.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation => {
                "Please provide all required inputs for the selected mode.".to_string()
            }
            Self::Configuration => {
                "API key is not configured. Please contact the administrator.".to_string()
            }
            Self::ModelRefusal { detail } => {
                format!("Image generation failed. Model response: {detail}")
            }
            Self::EmptyResult => {
                "No image was generated. The model may have refused the prompt without a text reason."
                    .to_string()
            }
            Self::Server { status } => {
                format!("The server returned an error (HTTP {status}).")
            }
            Self::Unclassified { raw } => raw.clone(),
            Self::Encoding { detail } => format!("Could not read the selected image: {detail}"),
            Self::Timeout { seconds } => {
                format!("The generation did not finish within {seconds} seconds.")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ErrorKind, GenerationError};

    #[test]
    fn refusal_detail_defaults_when_blank() {
        assert_eq!(
            GenerationError::refusal("  "),
            GenerationError::ModelRefusal {
                detail: "Unknown model error".to_string()
            }
        );
        assert_eq!(
            GenerationError::refusal(" nudity detected ").detail().as_deref(),
            Some("nudity detected")
        );
    }

    #[test]
    fn refusal_message_interpolates_detail() {
        let err = GenerationError::refusal("I can't draw that");
        assert_eq!(err.kind(), ErrorKind::ModelRefusal);
        assert_eq!(err.message_key(), Some("errorGenerationFailed"));
        assert_eq!(
            err.user_message(),
            "Image generation failed. Model response: I can't draw that"
        );
    }

    #[test]
    fn unclassified_shows_raw_text() {
        let err = GenerationError::Unclassified {
            raw: "quota exceeded".to_string(),
        };
        assert_eq!(err.message_key(), None);
        assert_eq!(err.user_message(), "quota exceeded");
        assert_eq!(err.to_string(), "quota exceeded");
    }

    #[test]
    fn server_error_keeps_status() {
        let err = GenerationError::Server { status: 502 };
        assert_eq!(err.detail().as_deref(), Some("502"));
        assert!(err.user_message().contains("HTTP 502"));
    }
}
