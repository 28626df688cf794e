//! Session state and content loading.

use std::sync::Arc;

use tracing::{debug, info};

use crate::api::RepositoryClient;
use crate::config::ClientConfig;
use crate::error::{ReposError, Result};
use crate::fs::{DirectoryFilter, DirectoryListing, Filesystem, ObjectId};
use crate::navigator::Navigator;
use crate::notification::{Notifier, Severity, TracingNotifier};
use crate::upload::FilesystemUpload;

/// Which part of the repository the cache holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum View {
    #[default]
    Content,
    Trash,
}

/// Everything a client needs to browse and modify one repository.
pub struct RepositorySession {
    pub(super) config: ClientConfig,
    pub(super) client: RepositoryClient,
    pub(super) filesystem: Filesystem,
    pub(super) navigator: Navigator,
    pub(super) uploader: FilesystemUpload,
    pub(super) filter: DirectoryFilter,
    pub(super) notifier: Arc<dyn Notifier>,
    pub(super) view: View,
}

impl RepositorySession {
    /// Create a session. Messages go to the `tracing` log until
    /// [`with_notifier`](Self::with_notifier) is used.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = RepositoryClient::new(&config)?;
        Ok(Self {
            filesystem: Filesystem::new(config.repository.clone()),
            navigator: Navigator::new(),
            uploader: FilesystemUpload::new(&config),
            filter: DirectoryFilter::new(),
            notifier: Arc::new(TracingNotifier),
            view: View::Content,
            client,
            config,
        })
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn client(&self) -> &RepositoryClient {
        &self.client
    }

    pub fn filesystem(&self) -> &Filesystem {
        &self.filesystem
    }

    pub fn filesystem_mut(&mut self) -> &mut Filesystem {
        &mut self.filesystem
    }

    pub fn navigator(&self) -> &Navigator {
        &self.navigator
    }

    pub fn navigator_mut(&mut self) -> &mut Navigator {
        &mut self.navigator
    }

    pub fn filter(&self) -> &DirectoryFilter {
        &self.filter
    }

    pub fn filter_mut(&mut self) -> &mut DirectoryFilter {
        &mut self.filter
    }

    pub fn uploader(&self) -> &FilesystemUpload {
        &self.uploader
    }

    pub fn uploader_mut(&mut self) -> &mut FilesystemUpload {
        &mut self.uploader
    }

    pub fn view(&self) -> View {
        self.view
    }

    /// Forward a failed result to the notifier.
    pub(super) fn reported<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            let severity = match e {
                ReposError::Server { severity, .. } => *severity,
                _ => Severity::Error,
            };
            let (title, content) = e.headline();
            self.notifier.notify(severity, &title, &content);
        }
        result
    }

    pub(super) fn notify(&self, severity: Severity, title: &str, content: &str) {
        self.notifier.notify(severity, title, content);
    }

    /// Replace the cache with the repository content.
    pub async fn load_content(&mut self) -> Result<usize> {
        let objects = self.reported(self.client.fetch_content().await)?;
        Ok(self.replace_content(objects, View::Content))
    }

    /// Replace the cache with the trash content.
    pub async fn load_trash(&mut self) -> Result<usize> {
        let objects = self.reported(self.client.fetch_trash().await)?;
        Ok(self.replace_content(objects, View::Trash))
    }

    fn replace_content(&mut self, objects: Vec<crate::fs::RemoteObject>, view: View) -> usize {
        let count = objects.len();
        self.filesystem.clear();
        for object in objects {
            self.filesystem.add_object(object);
        }
        if self.view != view {
            self.navigator.set_current_dir(None);
        }
        self.view = view;
        self.navigator.retain_existing(&self.filesystem);
        if let Some(current) = self.navigator.current_directory() {
            if self.filesystem.get_object_data(current).is_none() {
                self.navigator.set_current_dir(None);
            }
        }
        info!(count, ?view, "repository loaded");
        count
    }

    /// Refresh one object from the server.
    pub async fn fetch_object(&mut self, id: ObjectId) -> Result<()> {
        let object = self.reported(self.client.fetch_object(id).await)?;
        self.filesystem.add_object(object);
        Ok(())
    }

    /// Entries of the current directory, as filtered and sorted.
    pub fn listing(&self) -> DirectoryListing {
        self.filter.listing(&self.filesystem, self.navigator.current_directory())
    }

    pub fn select(&mut self, id: ObjectId, shift: bool, ctrl: bool) {
        let listing = self.listing();
        self.navigator.select_item(id, shift, ctrl, &listing);
    }

    /// Open a cached directory, or the root with `None`. Returns false when
    /// `directory` is not a cached directory.
    pub fn enter_directory(&mut self, directory: Option<ObjectId>) -> bool {
        if let Some(id) = directory {
            match self.filesystem.get_object_data(id) {
                Some(object) if !object.is_regular_file() => {}
                _ => {
                    debug!(%id, "not a cached directory");
                    return false;
                }
            }
        }
        self.navigator.set_current_dir(directory);
        true
    }

    /// Open the directory at `path`, like `/docs/2024/`.
    pub fn enter_path(&mut self, path: &str) -> bool {
        if path.trim_matches('/').is_empty() {
            return self.enter_directory(None);
        }
        match self.filesystem.get_object_from_path(path) {
            Some(id) => self.enter_directory(Some(id)),
            None => false,
        }
    }

    pub fn back(&mut self) -> bool {
        self.navigator.back()
    }

    /// Path of the current directory, `/a/b/` style.
    pub fn current_path(&self) -> String {
        self.filesystem
            .make_string_path_to_object(self.navigator.current_directory())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::fs::RemoteObject;

    fn offline_session() -> (RepositorySession, Arc<Mutex<Vec<(Severity, String)>>>) {
        let messages = Arc::new(Mutex::new(Vec::new()));
        let log = messages.clone();
        let notifier = move |severity: Severity, title: &str, _content: &str| {
            log.lock().unwrap().push((severity, title.to_string()));
        };
        let session = RepositorySession::new(ClientConfig::new("http://127.0.0.1:9", "repo"))
            .unwrap()
            .with_notifier(Arc::new(notifier));
        (session, messages)
    }

    fn seeded() -> RepositorySession {
        let (mut session, _) = offline_session();
        let fs = session.filesystem_mut();
        fs.add_object(RemoteObject::directory(1, None, "docs"));
        fs.add_object(RemoteObject::directory(2, Some(ObjectId(1)), "2024"));
        fs.add_object(RemoteObject::file(3, Some(ObjectId(1)), "b.txt", 5));
        fs.add_object(RemoteObject::file(4, Some(ObjectId(1)), "a.txt", 5));
        session
    }

    #[test]
    fn test_enter_and_list() {
        let mut session = seeded();
        assert_eq!(session.listing().ids().collect::<Vec<_>>(), vec![ObjectId(1)]);
        assert!(!session.enter_directory(Some(ObjectId(3))));
        assert!(!session.enter_directory(Some(ObjectId(99))));

        assert!(session.enter_path("/docs/"));
        assert_eq!(session.current_path(), "/docs/");
        assert_eq!(
            session.listing().ids().collect::<Vec<_>>(),
            vec![ObjectId(2), ObjectId(4), ObjectId(3)]
        );

        session.select(ObjectId(2), false, false);
        session.select(ObjectId(3), true, false);
        assert_eq!(session.navigator().selected().len(), 3);

        assert!(session.back());
        assert_eq!(session.navigator().current_directory(), None);
        assert!(session.navigator().selected().is_empty());
    }

    #[tokio::test]
    async fn test_failed_load_is_reported() {
        let (mut session, messages) = offline_session();
        session.filesystem_mut().add_object(RemoteObject::file(7, None, "kept", 1));

        assert!(session.load_content().await.is_err());
        assert_eq!(session.filesystem().len(), 1);
        let messages = messages.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].0, Severity::Error);
    }

    #[test]
    fn test_replace_content_resets_missing_directory() {
        let mut session = seeded();
        session.enter_directory(Some(ObjectId(2)));
        let count = session.replace_content(vec![RemoteObject::file(8, None, "trashed", 3)], View::Trash);
        assert_eq!(count, 1);
        assert_eq!(session.view(), View::Trash);
        assert_eq!(session.navigator().current_directory(), None);
        assert_eq!(session.filesystem().get_object_content_stats(None).unwrap().size, 3);
    }
}
