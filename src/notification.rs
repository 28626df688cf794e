//! User-facing notifications.
//!
//! The library never renders anything itself. Messages that a user should see
//! (server messages, upload failures, confirmations) go through a [`Notifier`].

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// Message severity as sent by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Severity {
    #[default]
    Info,
    Warning,
    Error,
    Fatal,
}

impl From<String> for Severity {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "warning" | "warn" => Severity::Warning,
            "error" => Severity::Error,
            "fatal" => Severity::Fatal,
            _ => Severity::Info,
        }
    }
}

impl From<Severity> for String {
    fn from(value: Severity) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        })
    }
}

/// Receives messages meant for the user.
pub trait Notifier: Send + Sync {
    fn notify(&self, severity: Severity, title: &str, content: &str);
}

impl<F> Notifier for F
where
    F: Fn(Severity, &str, &str) + Send + Sync,
{
    fn notify(&self, severity: Severity, title: &str, content: &str) {
        self(severity, title, content)
    }
}

/// Notifier that writes every message to the `tracing` log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, severity: Severity, title: &str, content: &str) {
        match severity {
            Severity::Info => info!(%title, %content, "notification"),
            Severity::Warning => warn!(%title, %content, "notification"),
            Severity::Error | Severity::Fatal => error!(%severity, %title, %content, "notification"),
        }
    }
}
