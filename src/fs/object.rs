//! Remote filesystem object types and server record parsing.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::enc_string::EncodedString;
use crate::error::{ReposError, Result};

/// Server-side identifier of a file or directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ObjectId(pub i64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ObjectId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.trim().parse().map(ObjectId)
    }
}

impl From<i64> for ObjectId {
    fn from(value: i64) -> Self {
        ObjectId(value)
    }
}

// Ids are 64-bit and some servers send them as strings to survive JSON
// number precision in browsers.
impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        match Lenient::<i64>::deserialize(deserializer)? {
            Lenient::Value(v) => Ok(ObjectId(v)),
            Lenient::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Lenient<T> {
    Value(T),
    Text(String),
}

fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + FromStr,
    T::Err: fmt::Display,
{
    match Option::<Lenient<T>>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Lenient::Value(v)) => Ok(Some(v)),
        Some(Lenient::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(Lenient::Text(s)) => s.trim().parse().map(Some).map_err(serde::de::Error::custom),
    }
}

/// Object record as serialized by the server.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ObjectRecord {
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<ObjectId>,
    #[serde(default, deserialize_with = "lenient")]
    pub repos: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    pub owner: Option<i64>,
    #[serde(default)]
    pub name: Option<EncodedString>,
    #[serde(default)]
    pub is_regular_file: bool,
    #[serde(default)]
    pub description: Option<EncodedString>,
    #[serde(default, deserialize_with = "lenient")]
    pub parent_item: Option<ObjectId>,
    #[serde(default)]
    pub is_trash: bool,
    #[serde(default)]
    pub absolute_path: Option<EncodedString>,
    #[serde(default, deserialize_with = "lenient")]
    pub size: Option<u64>,
    #[serde(default)]
    pub mimetype: Option<EncodedString>,
    #[serde(default, deserialize_with = "lenient")]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub open_upload: Option<bool>,
}

/// File-only or directory-only attributes.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectKind {
    File {
        size: u64,
        mimetype: EncodedString,
        /// Milliseconds since the Unix epoch.
        timestamp: i64,
    },
    Directory {
        open_upload: bool,
    },
}

/// A file or directory known to the client.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteObject {
    pub id: ObjectId,
    pub repository_id: i64,
    pub owner_id: i64,
    pub name: EncodedString,
    pub description: EncodedString,
    /// `None` for repository roots.
    pub parent_item: Option<ObjectId>,
    pub in_trash: bool,
    /// Full path computed by the server.
    pub absolute_path: EncodedString,
    pub kind: ObjectKind,
}

impl RemoteObject {
    /// Parse a record returned by the server.
    pub fn from_server_data(value: &Value) -> Result<Self> {
        let record = ObjectRecord::deserialize(value)?;
        Self::from_record(record)
    }

    pub fn from_record(record: ObjectRecord) -> Result<Self> {
        let id = record
            .id
            .ok_or_else(|| ReposError::InvalidResponse("object record without id".into()))?;
        let kind = if record.is_regular_file {
            ObjectKind::File {
                size: record.size.unwrap_or(0),
                mimetype: record.mimetype.unwrap_or_default(),
                timestamp: record.timestamp.unwrap_or(0),
            }
        } else {
            ObjectKind::Directory {
                open_upload: record.open_upload.unwrap_or(false),
            }
        };
        Ok(Self {
            id,
            repository_id: record.repos.unwrap_or(0),
            owner_id: record.owner.unwrap_or(0),
            name: record.name.unwrap_or_default(),
            description: record.description.unwrap_or_default(),
            parent_item: record.parent_item,
            in_trash: record.is_trash,
            absolute_path: record.absolute_path.unwrap_or_default(),
            kind,
        })
    }

    /// A directory built locally, mostly useful for tests and previews.
    pub fn directory(id: impl Into<ObjectId>, parent: Option<ObjectId>, name: &str) -> Self {
        Self {
            id: id.into(),
            repository_id: 0,
            owner_id: 0,
            name: EncodedString::from_plain(name),
            description: EncodedString::default(),
            parent_item: parent,
            in_trash: false,
            absolute_path: EncodedString::from_plain(&format!("/{}/", name)),
            kind: ObjectKind::Directory { open_upload: false },
        }
    }

    /// A file built locally, mostly useful for tests and previews.
    pub fn file(id: impl Into<ObjectId>, parent: Option<ObjectId>, name: &str, size: u64) -> Self {
        let mimetype = mime_guess::from_path(name).first_or_octet_stream();
        Self {
            id: id.into(),
            repository_id: 0,
            owner_id: 0,
            name: EncodedString::from_plain(name),
            description: EncodedString::default(),
            parent_item: parent,
            in_trash: false,
            absolute_path: EncodedString::from_plain(&format!("/{}", name)),
            kind: ObjectKind::File {
                size,
                mimetype: EncodedString::from_plain(mimetype.essence_str()),
                timestamp: 0,
            },
        }
    }

    pub fn with_absolute_path(mut self, path: &str) -> Self {
        self.absolute_path = EncodedString::from_plain(path);
        self
    }

    pub fn is_regular_file(&self) -> bool {
        matches!(self.kind, ObjectKind::File { .. })
    }

    /// File size, 0 for directories.
    pub fn size(&self) -> u64 {
        match self.kind {
            ObjectKind::File { size, .. } => size,
            ObjectKind::Directory { .. } => 0,
        }
    }

    pub fn mimetype(&self) -> Option<&EncodedString> {
        match &self.kind {
            ObjectKind::File { mimetype, .. } => Some(mimetype),
            ObjectKind::Directory { .. } => None,
        }
    }

    pub fn timestamp(&self) -> Option<i64> {
        match self.kind {
            ObjectKind::File { timestamp, .. } => Some(timestamp),
            ObjectKind::Directory { .. } => None,
        }
    }

    pub fn open_upload(&self) -> Option<bool> {
        match self.kind {
            ObjectKind::Directory { open_upload } => Some(open_upload),
            ObjectKind::File { .. } => None,
        }
    }
}
