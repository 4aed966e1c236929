//! Error types for the deployment wizard.

use thiserror::Error;

/// Uniform error shape for every call made to the deployment backend.
///
/// The backend's error payload is carried through untouched so it can be
/// shown to the user verbatim.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    /// The backend answered with a non-2xx status and a body.
    #[error("{}", pretty_body(.body))]
    Response {
        /// HTTP status code.
        status: u16,
        /// Parsed JSON body, or the raw text as a JSON string.
        body: serde_json::Value,
    },

    /// The request never produced a usable response.
    #[error("{0}")]
    Transport(String),
}

impl ApiError {
    /// Returns the raw payload the backend sent, if any.
    pub fn body(&self) -> Option<&serde_json::Value> {
        match self {
            ApiError::Response { body, .. } => Some(body),
            ApiError::Transport(_) => None,
        }
    }

    /// Returns the HTTP status code, if the backend answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Response { status, .. } => Some(*status),
            ApiError::Transport(_) => None,
        }
    }
}

fn pretty_body(body: &serde_json::Value) -> String {
    match body {
        serde_json::Value::String(text) => text.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Transport(err.to_string())
    }
}

/// Top-level error type for wizard operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A backend call failed.
    #[error("backend error: {0}")]
    Api(#[from] ApiError),

    /// User input did not pass validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Configuration could not be loaded or is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error while reading configuration or talking to the terminal.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Interactive prompt failed.
    #[error("prompt error: {0}")]
    Prompt(String),
}

/// Result type alias for wizard operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn response_error_displays_raw_payload() {
        let err = ApiError::Response {
            status: 400,
            body: json!({"name": ["This field is required."]}),
        };

        let shown = err.to_string();
        assert!(shown.contains("\"name\""));
        assert!(shown.contains("This field is required."));
        assert_eq!(err.status(), Some(400));
    }

    #[test]
    fn text_body_is_shown_without_quotes() {
        let err = ApiError::Response {
            status: 502,
            body: json!("Bad Gateway"),
        };
        assert_eq!(err.to_string(), "Bad Gateway");
    }

    #[test]
    fn transport_error_has_no_body() {
        let err = ApiError::Transport("connection refused".to_string());
        assert_eq!(err.to_string(), "connection refused");
        assert!(err.body().is_none());
        assert!(err.status().is_none());
    }

    #[test]
    fn api_error_converts_into_top_level_error() {
        let err: Error = ApiError::Transport("timeout".to_string()).into();
        assert!(matches!(err, Error::Api(_)));
        assert_eq!(err.to_string(), "backend error: timeout");
    }
}
