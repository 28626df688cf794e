//! HTTP client wrapper for repository requests.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use reqwest::{Body, Client, RequestBuilder};
use serde::Serialize;
use tracing::debug;

use crate::error::{ReposError, Result};

/// Status and text of a server response.
///
/// Non-success statuses are returned as-is: repository endpoints put a JSON
/// message in error bodies, and the caller decides how to surface it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client for making requests to a repository server.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    auth_token: Option<String>,
}

impl HttpClient {
    /// Create a new HTTP client.
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            auth_token: None,
        }
    }

    /// Create a new HTTP client with a proxy.
    pub fn with_proxy(proxy: &str) -> Result<Self> {
        let proxy = reqwest::Proxy::all(proxy)
            .map_err(|e| ReposError::InvalidConfig(format!("Invalid proxy: {}", e)))?;

        let client = Client::builder()
            .proxy(proxy)
            .build()
            .map_err(|e| ReposError::InvalidConfig(format!("Failed to build client: {}", e)))?;

        Ok(Self {
            client,
            auth_token: None,
        })
    }

    /// Token sent in the `content-authtoken` header of every request.
    pub fn set_auth_token(&mut self, token: Option<String>) {
        self.auth_token = token;
    }

    fn prepare(&self, builder: RequestBuilder) -> RequestBuilder {
        let builder = builder.header(ACCEPT, "application/json");
        match &self.auth_token {
            Some(token) => builder.header("content-authtoken", token),
            None => builder,
        }
    }

    async fn execute(&self, builder: RequestBuilder) -> Result<HttpResponse> {
        let response = self.prepare(builder).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(HttpResponse { status, body })
    }

    /// Make a GET request.
    pub async fn get(&self, url: &str) -> Result<HttpResponse> {
        debug!(%url, "GET");
        self.execute(self.client.get(url)).await
    }

    /// Make a POST request with a JSON body.
    pub async fn post_json<T: Serialize + ?Sized>(&self, url: &str, body: &T) -> Result<HttpResponse> {
        debug!(%url, "POST");
        self.execute(self.client.post(url).json(body)).await
    }

    /// Make a POST request with raw headers and an arbitrary body.
    ///
    /// Header values must be visible ASCII; callers percent-encode free text.
    pub async fn post_body(
        &self,
        url: &str,
        headers: &[(&'static str, String)],
        body: Body,
    ) -> Result<HttpResponse> {
        let mut map = HeaderMap::with_capacity(headers.len());
        for (name, value) in headers {
            let value = HeaderValue::from_str(value).map_err(|e| {
                ReposError::Custom(format!("Invalid value for header {}: {}", name, e))
            })?;
            map.insert(HeaderName::from_static(*name), value);
        }
        debug!(%url, headers = headers.len(), "POST body");
        self.execute(self.client.post(url).headers(map).body(body)).await
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let _client = HttpClient::new();
        let _default = HttpClient::default();
    }

    #[test]
    fn test_proxy_creation() {
        let client = HttpClient::with_proxy("http://127.0.0.1:8080");
        assert!(client.is_ok());
    }

    #[test]
    fn test_proxy_invalid() {
        let res = HttpClient::with_proxy(":::::::");
        assert!(matches!(res, Err(ReposError::InvalidConfig(_))));
    }

    #[test]
    fn test_response_success_range() {
        assert!(HttpResponse::new(200, "").is_success());
        assert!(HttpResponse::new(204, "").is_success());
        assert!(!HttpResponse::new(400, "").is_success());
        assert!(!HttpResponse::new(500, "").is_success());
    }
}
