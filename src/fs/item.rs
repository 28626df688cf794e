//! Entries that are either cached remote objects or staged local files.

use super::object::{ObjectId, RemoteObject};
use crate::staging::StagingFile;

/// A remote object or a local file, handled uniformly for display.
#[derive(Debug, Clone)]
pub enum Item {
    Remote(RemoteObject),
    Local(StagingFile),
}

impl Item {
    pub fn name(&self) -> String {
        match self {
            Item::Remote(object) => object.name.plain(),
            Item::Local(file) => file.name.clone(),
        }
    }

    pub fn size(&self) -> u64 {
        match self {
            Item::Remote(object) => object.size(),
            Item::Local(file) => file.size,
        }
    }

    pub fn is_regular_file(&self) -> bool {
        match self {
            Item::Remote(object) => object.is_regular_file(),
            Item::Local(_) => true,
        }
    }

    pub fn mimetype(&self) -> Option<String> {
        match self {
            Item::Remote(object) => object.mimetype().map(|mimetype| mimetype.plain()),
            Item::Local(file) => Some(file.mimetype.clone()),
        }
    }

    pub fn timestamp(&self) -> Option<i64> {
        match self {
            Item::Remote(object) => object.timestamp(),
            Item::Local(file) => Some(file.timestamp),
        }
    }

    /// Id on the server, `None` until a local file is uploaded.
    pub fn remote_id(&self) -> Option<ObjectId> {
        match self {
            Item::Remote(object) => Some(object.id),
            Item::Local(_) => None,
        }
    }
}

impl From<RemoteObject> for Item {
    fn from(object: RemoteObject) -> Self {
        Item::Remote(object)
    }
}

impl From<StagingFile> for Item {
    fn from(file: StagingFile) -> Self {
        Item::Local(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_access() {
        let remote = Item::from(RemoteObject::directory(3, None, "docs"));
        assert_eq!(remote.name(), "docs");
        assert!(!remote.is_regular_file());
        assert_eq!(remote.size(), 0);
        assert_eq!(remote.remote_id(), Some(ObjectId(3)));

        let local = Item::from(StagingFile::from_bytes("a.txt", b"abc".to_vec()).with_timestamp(12));
        assert_eq!(local.name(), "a.txt");
        assert!(local.is_regular_file());
        assert_eq!(local.size(), 3);
        assert_eq!(local.mimetype().as_deref(), Some("text/plain"));
        assert_eq!(local.timestamp(), Some(12));
        assert_eq!(local.remote_id(), None);
    }
}
