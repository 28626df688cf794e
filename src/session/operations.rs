//! Server side changes to repository objects.

use tracing::info;

use super::repository::RepositorySession;
use crate::api::ObjectUpdate;
use crate::error::Result;
use crate::fs::ObjectId;
use crate::notification::Severity;

impl RepositorySession {
    /// Create a directory in the current directory.
    pub async fn make_directory(&mut self, name: &str, open_upload: bool) -> Result<ObjectId> {
        let parent = self.navigator.current_directory();
        let directory = self.reported(self.client.make_directory(parent, name, open_upload).await)?;
        let id = directory.id;
        info!(%id, name, "directory created");
        self.filesystem.add_object(directory);
        Ok(id)
    }

    /// Rename or describe an object.
    pub async fn update_object(&mut self, id: ObjectId, update: &ObjectUpdate) -> Result<()> {
        let object = self.reported(self.client.update_object(id, update).await)?;
        // Re-adding keeps the children of a renamed directory in place.
        self.filesystem.add_object(object);
        Ok(())
    }

    /// Drop objects the server reports as gone from this view.
    fn forget_objects(&mut self, ids: &[ObjectId]) {
        for id in ids {
            self.filesystem.remove_object(*id, false);
        }
        self.navigator.retain_existing(&self.filesystem);
    }

    fn selection(&self) -> Vec<ObjectId> {
        self.navigator.selected().to_vec()
    }

    /// Returns the number of objects moved to the trash.
    pub async fn move_selection_to_trash(&mut self) -> Result<usize> {
        let selection = self.selection();
        if selection.is_empty() {
            return Ok(0);
        }
        let moved = self.reported(self.client.move_to_trash(&selection).await)?;
        self.forget_objects(&moved);
        Ok(moved.len())
    }

    /// Returns the number of objects taken out of the trash.
    pub async fn restore_selection(&mut self) -> Result<usize> {
        let selection = self.selection();
        if selection.is_empty() {
            return Ok(0);
        }
        let restored = self.reported(self.client.restore_from_trash(&selection).await)?;
        self.forget_objects(&restored);
        Ok(restored.len())
    }

    /// Permanently delete the selection. Returns the number of deleted objects.
    pub async fn remove_selection(&mut self) -> Result<usize> {
        let selection = self.selection();
        if selection.is_empty() {
            return Ok(0);
        }
        let removed = self.reported(self.client.remove(&selection).await)?;
        self.forget_objects(&removed);
        self.notify(
            Severity::Info,
            "Removed",
            &format!("Successfully removed {} elements", removed.len()),
        );
        Ok(removed.len())
    }

    pub fn cut_selection(&mut self) -> usize {
        self.navigator.cut_selection()
    }

    /// Move cut objects into the current directory.
    pub async fn paste_clipboard(&mut self) -> Result<usize> {
        let parent = self.navigator.current_directory();
        let result = self
            .navigator
            .move_clipboard_to_parent(&self.client, &mut self.filesystem, parent)
            .await;
        self.reported(result)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::config::ClientConfig;
    use crate::fs::RemoteObject;

    fn offline_session() -> (RepositorySession, Arc<Mutex<Vec<Severity>>>) {
        let messages = Arc::new(Mutex::new(Vec::new()));
        let log = messages.clone();
        let notifier = move |severity: Severity, _title: &str, _content: &str| log.lock().unwrap().push(severity);
        let mut session = RepositorySession::new(ClientConfig::new("http://127.0.0.1:9", "repo"))
            .unwrap()
            .with_notifier(Arc::new(notifier));
        session.filesystem_mut().add_object(RemoteObject::directory(1, None, "docs"));
        session.filesystem_mut().add_object(RemoteObject::file(2, Some(ObjectId(1)), "a.txt", 4));
        (session, messages)
    }

    #[test]
    fn test_forget_objects_updates_selection() {
        let (mut session, _) = offline_session();
        session.navigator_mut().view_item(ObjectId(1));
        session.forget_objects(&[ObjectId(1)]);
        assert!(session.filesystem().is_empty());
        assert!(session.navigator().selected().is_empty());
    }

    #[tokio::test]
    async fn test_empty_selection_makes_no_request() {
        let (mut session, messages) = offline_session();
        assert_eq!(session.move_selection_to_trash().await.unwrap(), 0);
        assert_eq!(session.remove_selection().await.unwrap(), 0);
        assert!(messages.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_directory_name_leaves_cache_alone() {
        let (mut session, messages) = offline_session();
        assert!(session.make_directory("a/b", false).await.is_err());
        assert_eq!(session.filesystem().len(), 2);
        assert_eq!(messages.lock().unwrap().as_slice(), &[Severity::Error]);
    }

    #[tokio::test]
    async fn test_failed_paste_is_reported() {
        let (mut session, messages) = offline_session();
        session.navigator_mut().view_item(ObjectId(2));
        assert_eq!(session.cut_selection(), 1);
        assert!(session.paste_clipboard().await.is_err());
        assert!(session.navigator().clipboard().is_empty());
        assert_eq!(messages.lock().unwrap().len(), 1);
    }
}
