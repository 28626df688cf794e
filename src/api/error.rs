//! Messages embedded in server responses.

use serde::Deserialize;
use serde_json::Value;

use crate::error::ReposError;
use crate::notification::Severity;

/// `message` field of a server response: a bare string or a detailed object.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ServerMessage {
    Text(String),
    Detailed {
        #[serde(default)]
        severity: Severity,
        #[serde(default)]
        title: String,
        #[serde(default)]
        content: String,
    },
}

impl ServerMessage {
    /// Extract the message of a JSON response, if it carries one.
    pub fn from_body(body: &Value) -> Option<Self> {
        let message = body.get("message")?;
        if message.is_null() {
            return None;
        }
        serde_json::from_value(message.clone()).ok()
    }

    pub fn severity(&self) -> Severity {
        match self {
            ServerMessage::Text(_) => Severity::Info,
            ServerMessage::Detailed { severity, .. } => *severity,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            ServerMessage::Text(_) => "Server message",
            ServerMessage::Detailed { title, .. } => title,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            ServerMessage::Text(text) => text,
            ServerMessage::Detailed { content, .. } => content,
        }
    }

    /// Error carrying this message, reported as at least an error.
    pub fn into_error(self) -> ReposError {
        let severity = match self.severity() {
            Severity::Info | Severity::Warning => Severity::Error,
            other => other,
        };
        ReposError::Server {
            severity,
            title: self.title().to_string(),
            content: self.content().to_string(),
        }
    }
}
