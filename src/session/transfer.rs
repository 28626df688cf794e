//! Staging local files and uploading them into the current directory.

use std::path::Path;

use super::repository::RepositorySession;
use crate::error::Result;
use crate::staging::{StagedFileId, StagingFile};
use crate::upload::{BatchOutcome, UploadControl};

impl RepositorySession {
    /// Stage `file` under the staging directory `path`.
    pub fn stage_file(&mut self, file: StagingFile, path: &str) -> Option<StagedFileId> {
        self.uploader.staging_mut().add_file(file, path)
    }

    /// Stage a file from disk under the staging directory `path`.
    pub async fn stage_path(&mut self, file: impl AsRef<Path>, path: &str) -> Result<Option<StagedFileId>> {
        let result = self.uploader.staging_mut().add_local_path(file, path).await;
        self.reported(result)
    }

    /// Stage a local directory and everything below it.
    pub async fn stage_tree(&mut self, root: impl AsRef<Path>) -> Result<usize> {
        let result = self.uploader.staging_mut().add_local_tree(root).await;
        self.reported(result)
    }

    /// Upload every staged file into the current directory.
    ///
    /// Returns when the staging area is empty, the upload is paused through
    /// [`upload_control`](Self::upload_control), or a file fails. Failures
    /// were already reported to the notifier.
    pub async fn upload(&mut self) -> BatchOutcome {
        let directory = self.navigator.current_directory();
        let base_path = self.filesystem.make_string_path_to_object(directory);
        self.uploader
            .set_destination(self.client.send_url(directory), directory, base_path);
        self.uploader
            .start(&self.client, &mut self.filesystem, self.notifier.as_ref())
            .await
    }

    pub fn upload_control(&self) -> UploadControl {
        self.uploader.control()
    }
}
