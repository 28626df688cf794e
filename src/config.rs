//! Client configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ReposError, Result};

/// Largest body sent in a single upload request (50 MiB).
pub const DEFAULT_CHUNK_SIZE: u64 = 50 * 1024 * 1024;

/// Delay between two processing polls once every chunk is sent.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Minimum delay between two transfer-rate samples.
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_millis(100);

/// Number of transfer-rate samples averaged into the reported speed.
pub const DEFAULT_SPEED_WINDOW: usize = 100;

/// Settings shared by the HTTP client and the uploader.
///
/// Every field has a default so a JSON file only needs the values it changes:
///
/// ```
/// use reposfs::ClientConfig;
/// let config = ClientConfig::from_json(r#"{
///     "server_url": "https://files.example.org",
///     "repository": "photos"
/// }"#).unwrap();
/// assert_eq!(config.repos_url(), "https://files.example.org/photos");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub server_url: String,
    /// Url name of the repository.
    pub repository: String,
    /// Value of the `content-authtoken` header.
    pub auth_token: Option<String>,
    pub proxy: Option<String>,
    pub chunk_size: u64,
    #[serde(with = "millis")]
    pub poll_interval: Duration,
    #[serde(with = "millis")]
    pub sample_interval: Duration,
    pub speed_window: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:3000".to_string(),
            repository: String::new(),
            auth_token: None,
            proxy: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
            speed_window: DEFAULT_SPEED_WINDOW,
        }
    }
}

impl ClientConfig {
    pub fn new(server_url: impl Into<String>, repository: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            repository: repository.into(),
            ..Self::default()
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Base url of every repository endpoint.
    pub fn repos_url(&self) -> String {
        format!(
            "{}/{}",
            self.server_url.trim_end_matches('/'),
            self.repository.trim_matches('/')
        )
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(ReposError::InvalidConfig("chunk_size must be positive".into()));
        }
        if self.speed_window == 0 {
            return Err(ReposError::InvalidConfig("speed_window must be positive".into()));
        }
        if self.repository.trim_matches('/').is_empty() {
            return Err(ReposError::InvalidConfig("repository is empty".into()));
        }
        Ok(())
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = tokio::fs::read_to_string(path).await?;
        Self::from_json(&text)
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
