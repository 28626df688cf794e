//! Repository endpoint client with request/response handling.

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::error::ServerMessage;
use crate::config::ClientConfig;
use crate::enc_string::EncodedString;
use crate::error::{ReposError, Result};
use crate::fs::{ObjectId, RemoteObject};
use crate::http::{HttpClient, HttpResponse};

/// Body of an update request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectUpdate {
    pub name: EncodedString,
    pub description: EncodedString,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_upload: Option<bool>,
}

impl ObjectUpdate {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: EncodedString::from_plain(name),
            description: EncodedString::from_plain(description),
            open_upload: None,
        }
    }

    pub fn with_open_upload(mut self, open_upload: bool) -> Self {
        self.open_upload = Some(open_upload);
        self
    }
}

/// Reject names the server filesystem cannot store.
///
/// Forbidden: `< > : " / \ | ? *`, control characters, and reserved device
/// names such as `con` or `lpt1` (case-insensitive).
pub fn validate_directory_name(name: &str) -> Result<()> {
    const FORBIDDEN: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];
    const RESERVED: &[&str] = &["aux", "con", "clock$", "nul", "prn"];

    let invalid = || ReposError::Custom(format!("Invalid directory name: {:?}", name));
    if name.trim().is_empty() {
        return Err(invalid());
    }
    if name.chars().any(|c| FORBIDDEN.contains(&c) || (c as u32) < 0x20) {
        return Err(invalid());
    }
    let lower = name.to_ascii_lowercase();
    let numbered_device = (lower.starts_with("com") || lower.starts_with("lpt"))
        && lower.len() == 4
        && matches!(lower.as_bytes()[3], b'1'..=b'9');
    if RESERVED.contains(&lower.as_str()) || numbered_device {
        return Err(invalid());
    }
    Ok(())
}

/// Turn a raw response into JSON, mapping server messages and bad statuses
/// to errors.
///
/// A successful response carrying a `message` is an error too: repository
/// endpoints only attach one when the action was refused.
pub fn parse_response(response: HttpResponse) -> Result<Value> {
    let success = response.is_success();
    if response.body.trim().is_empty() {
        return if success {
            Ok(Value::Null)
        } else {
            Err(ReposError::HttpError(response.status))
        };
    }

    let value: Value = match serde_json::from_str(&response.body) {
        Ok(value) => value,
        Err(_) if !success => return Err(ReposError::HttpError(response.status)),
        Err(e) => return Err(e.into()),
    };

    if let Some(message) = ServerMessage::from_body(&value) {
        return Err(message.into_error());
    }
    if !success {
        return Err(ReposError::HttpError(response.status));
    }
    Ok(value)
}

fn parse_objects(value: Value) -> Result<Vec<RemoteObject>> {
    let Value::Array(records) = value else {
        return Err(ReposError::InvalidResponse("expected an array of objects".into()));
    };
    let mut objects = Vec::with_capacity(records.len());
    for record in &records {
        match RemoteObject::from_server_data(record) {
            Ok(object) => objects.push(object),
            Err(e) => warn!(error = %e, "skipping invalid object record"),
        }
    }
    Ok(objects)
}

fn parse_ids(value: Value) -> Result<Vec<ObjectId>> {
    Ok(serde_json::from_value(value)?)
}

fn path_suffix(id: Option<ObjectId>) -> String {
    id.map(|id| id.to_string()).unwrap_or_default()
}

/// Client for the endpoints of one repository.
#[derive(Debug, Clone)]
pub struct RepositoryClient {
    http: HttpClient,
    repos_url: String,
}

impl RepositoryClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        config.validate()?;
        let mut http = match &config.proxy {
            Some(proxy) => HttpClient::with_proxy(proxy)?,
            None => HttpClient::new(),
        };
        http.set_auth_token(config.auth_token.clone());
        Ok(Self {
            http,
            repos_url: config.repos_url(),
        })
    }

    pub fn repos_url(&self) -> &str {
        &self.repos_url
    }

    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.repos_url, path)
    }

    /// Upload endpoint for files sent into `directory`.
    pub fn send_url(&self, directory: Option<ObjectId>) -> String {
        self.url(&format!("send/{}", path_suffix(directory)))
    }

    async fn get(&self, path: &str) -> Result<Value> {
        parse_response(self.http.get(&self.url(path)).await?)
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<Value> {
        parse_response(self.http.post_json(&self.url(path), body).await?)
    }

    /// Every object outside the trash.
    pub async fn fetch_content(&self) -> Result<Vec<RemoteObject>> {
        let objects = parse_objects(self.get("content/").await?)?;
        debug!(count = objects.len(), "fetched repository content");
        Ok(objects)
    }

    /// Every object in the trash.
    pub async fn fetch_trash(&self) -> Result<Vec<RemoteObject>> {
        let objects = parse_objects(self.get("trash/").await?)?;
        debug!(count = objects.len(), "fetched repository trash");
        Ok(objects)
    }

    pub async fn fetch_object(&self, id: ObjectId) -> Result<RemoteObject> {
        RemoteObject::from_server_data(&self.get(&format!("content/{}", id)).await?)
    }

    /// Move objects under `parent` (`None` for the root).
    pub async fn move_items(&self, ids: &[ObjectId], parent: Option<ObjectId>) -> Result<()> {
        self.post(&format!("move-item/{}", path_suffix(parent)), &json!({ "item_ids": ids }))
            .await?;
        Ok(())
    }

    /// Returns the ids actually moved.
    pub async fn move_to_trash(&self, ids: &[ObjectId]) -> Result<Vec<ObjectId>> {
        parse_ids(self.post("move-to-trash/", ids).await?)
    }

    /// Returns the ids actually restored.
    pub async fn restore_from_trash(&self, ids: &[ObjectId]) -> Result<Vec<ObjectId>> {
        parse_ids(self.post("restore-from-trash/", ids).await?)
    }

    /// Permanently delete objects. Returns the ids actually removed.
    pub async fn remove(&self, ids: &[ObjectId]) -> Result<Vec<ObjectId>> {
        parse_ids(self.post("remove/", ids).await?)
    }

    pub async fn make_directory(
        &self,
        parent: Option<ObjectId>,
        name: &str,
        open_upload: bool,
    ) -> Result<RemoteObject> {
        validate_directory_name(name)?;
        let path = match parent {
            Some(parent) => format!("make-directory/{}", parent),
            None => "make-directory".to_string(),
        };
        let body = json!({
            "name": EncodedString::from_plain(name),
            "open_upload": open_upload,
        });
        RemoteObject::from_server_data(&self.post(&path, &body).await?)
    }

    pub async fn update_object(&self, id: ObjectId, update: &ObjectUpdate) -> Result<RemoteObject> {
        RemoteObject::from_server_data(&self.post(&format!("update/{}", id), update).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::Severity;

    fn client() -> RepositoryClient {
        RepositoryClient::new(&ClientConfig::new("https://host/", "alice/photos")).unwrap()
    }

    #[test]
    fn test_urls() {
        let client = client();
        assert_eq!(client.repos_url(), "https://host/alice/photos");
        assert_eq!(client.send_url(None), "https://host/alice/photos/send/");
        assert_eq!(client.send_url(Some(ObjectId(12))), "https://host/alice/photos/send/12");
    }

    #[test]
    fn test_parse_response_success() {
        let value = parse_response(HttpResponse::new(200, "[1, 2]")).unwrap();
        assert_eq!(parse_ids(value).unwrap(), vec![ObjectId(1), ObjectId(2)]);
        assert_eq!(parse_response(HttpResponse::new(200, "  ")).unwrap(), Value::Null);
    }

    #[test]
    fn test_parse_response_errors() {
        assert!(matches!(
            parse_response(HttpResponse::new(500, "")),
            Err(ReposError::HttpError(500))
        ));
        assert!(matches!(
            parse_response(HttpResponse::new(502, "<html>bad gateway</html>")),
            Err(ReposError::HttpError(502))
        ));
        assert!(matches!(
            parse_response(HttpResponse::new(200, "not json")),
            Err(ReposError::JsonError(_))
        ));

        let refused = HttpResponse::new(
            403,
            r#"{"message": {"severity": "Error", "title": "Forbidden", "content": "read only"}}"#,
        );
        match parse_response(refused) {
            Err(ReposError::Server { severity, title, content }) => {
                assert_eq!(severity, Severity::Error);
                assert_eq!(title, "Forbidden");
                assert_eq!(content, "read only");
            }
            other => panic!("unexpected {other:?}"),
        }

        let soft = HttpResponse::new(200, r#"{"message": "nothing moved"}"#);
        assert!(matches!(parse_response(soft), Err(ReposError::Server { .. })));
    }

    #[test]
    fn test_parse_objects_skips_invalid_records() {
        let value = json!([
            {"id": 1, "name": "a", "is_regular_file": false},
            {"name": "no id"},
            {"id": 2, "name": "b", "is_regular_file": true, "size": 3}
        ]);
        let objects = parse_objects(value).unwrap();
        assert_eq!(objects.len(), 2);
        assert!(parse_objects(json!({"id": 1})).is_err());
    }

    #[test]
    fn test_directory_name_validation() {
        assert!(validate_directory_name("Holidays 2024").is_ok());
        assert!(validate_directory_name("comics").is_ok());
        assert!(validate_directory_name("com0").is_ok());
        for bad in ["", "  ", "a/b", "what?", "tab\there", "CON", "lpt3", "Clock$"] {
            assert!(validate_directory_name(bad).is_err(), "{:?} should be rejected", bad);
        }
    }

    #[test]
    fn test_update_body() {
        let body = serde_json::to_value(ObjectUpdate::new("new name", "")).unwrap();
        assert_eq!(body, json!({"name": "new%20name", "description": ""}));
        let body = serde_json::to_value(ObjectUpdate::new("d", "x").with_open_upload(true)).unwrap();
        assert_eq!(body["open_upload"], json!(true));
    }
}
