//! Error types for the reposfs library.

use thiserror::Error;

use crate::notification::Severity;

/// Main error type for reposfs operations.
#[derive(Error, Debug)]
pub enum ReposError {
    /// HTTP request failed with status code.
    #[error("HTTP error: {0}")]
    HttpError(u16),

    /// Network request error.
    #[error("Request error: {0}")]
    RequestError(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Local file access error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Invalid or unexpected response from server.
    #[error("Invalid response from server: {0}")]
    InvalidResponse(String),

    /// The server answered with an explicit message.
    #[error("{title}: {content}")]
    Server {
        severity: Severity,
        title: String,
        content: String,
    },

    /// Operation interrupted by pause or stop.
    #[error("Operation cancelled")]
    Cancelled,

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Custom error message.
    #[error("{0}")]
    Custom(String),
}

impl ReposError {
    /// Title and body used when the error is shown to the user.
    pub fn headline(&self) -> (String, String) {
        match self {
            ReposError::Server { title, content, .. } => (title.clone(), content.clone()),
            ReposError::HttpError(status) => {
                (format!("Request failed ({status})"), self.to_string())
            }
            other => ("Error".to_string(), other.to_string()),
        }
    }
}

/// Result type alias for reposfs operations.
pub type Result<T> = std::result::Result<T, ReposError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_error_display() {
        let err = ReposError::Server {
            severity: Severity::Error,
            title: "Denied".into(),
            content: "not allowed".into(),
        };
        assert_eq!(err.to_string(), "Denied: not allowed");
        assert_eq!(err.headline(), ("Denied".into(), "not allowed".into()));
    }

    #[test]
    fn test_http_headline() {
        let (title, body) = ReposError::HttpError(404).headline();
        assert_eq!(title, "Request failed (404)");
        assert_eq!(body, "HTTP error: 404");
    }
}
