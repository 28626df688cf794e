//! Sequential upload of every file of a staging filesystem.

use std::time::Duration;

use tracing::{debug, info, warn};

use super::stats::TransferStats;
use super::stream::{FileProgress, UploadControl, UploadOutcome, UploadStream};
use super::transport::UploadTransport;
use crate::config::ClientConfig;
use crate::error::ReposError;
use crate::fs::{ContentStats, Filesystem, Item, ObjectId};
use crate::notification::Notifier;
use crate::staging::{DirectoryId, StagedFileId, StagingFilesystem};

/// Progress of a whole batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchProgress {
    pub file_name: String,
    pub file_size: u64,
    pub files_sent: u64,
    pub files_total: u64,
    pub bytes_sent: u64,
    /// Bytes sent once the current file is done.
    pub bytes_after_file: u64,
    pub bytes_total: u64,
    pub process_percent: f64,
    /// Bytes per second.
    pub speed: f64,
    /// Seconds left, infinite while the speed is unknown.
    pub remaining: f64,
}

#[derive(Debug, Clone)]
pub enum UploadEvent {
    Progress(BatchProgress),
    /// A file reached the server. Carries the server record when one was
    /// returned, the staged file otherwise.
    FileUploaded(Item),
    Stopped { finished: bool },
}

/// How a call to [`FilesystemUpload::start`] ended.
#[derive(Debug)]
pub enum BatchOutcome {
    Finished,
    Paused,
    Aborted(ReposError),
}

pub type UploadEventCallback = Box<dyn FnMut(&UploadEvent) + Send>;

/// Uploads staged files one after the other.
pub struct FilesystemUpload {
    staging: StagingFilesystem,
    url: String,
    base_directory: Option<ObjectId>,
    base_path: String,
    chunk_size: u64,
    poll_interval: Duration,
    sample_interval: Duration,
    speed_window: usize,
    control: UploadControl,
    active: bool,
    total_file_sent: u64,
    total_content_sent: u64,
    current: Option<(StagedFileId, UploadStream)>,
    stats: TransferStats,
    on_event: Option<UploadEventCallback>,
}

/// Join two paths, collapsing runs of `/`.
fn join_path(base: &str, path: &str) -> String {
    let mut joined = String::with_capacity(base.len() + path.len() + 1);
    for c in base.chars().chain(std::iter::once('/')).chain(path.chars()) {
        if c == '/' && joined.ends_with('/') {
            continue;
        }
        joined.push(c);
    }
    joined
}

impl FilesystemUpload {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            staging: StagingFilesystem::default(),
            url: String::new(),
            base_directory: None,
            base_path: "/".to_string(),
            chunk_size: config.chunk_size,
            poll_interval: config.poll_interval,
            sample_interval: config.sample_interval,
            speed_window: config.speed_window,
            control: UploadControl::new(),
            active: false,
            total_file_sent: 0,
            total_content_sent: 0,
            current: None,
            stats: TransferStats::new(config.sample_interval, config.speed_window),
            on_event: None,
        }
    }

    pub fn staging(&self) -> &StagingFilesystem {
        &self.staging
    }

    pub fn staging_mut(&mut self) -> &mut StagingFilesystem {
        &mut self.staging
    }

    /// Handle to pause the batch from elsewhere.
    pub fn control(&self) -> UploadControl {
        self.control.clone()
    }

    pub fn is_running(&self) -> bool {
        self.control.is_running()
    }

    pub fn on_event(&mut self, callback: impl FnMut(&UploadEvent) + Send + 'static) {
        self.on_event = Some(Box::new(callback));
    }

    /// Upload into `directory`, whose path on the server is `base_path`.
    pub fn set_destination(&mut self, url: impl Into<String>, directory: Option<ObjectId>, base_path: impl Into<String>) {
        self.url = url.into();
        self.base_directory = directory;
        self.base_path = base_path.into();
    }

    pub fn total_file_sent(&self) -> u64 {
        self.total_file_sent
    }

    pub fn total_content_sent(&self) -> u64 {
        self.total_content_sent
    }

    fn emit(&mut self, event: UploadEvent) {
        if let Some(callback) = self.on_event.as_mut() {
            callback(&event);
        }
    }

    fn open_stream(&self, id: StagedFileId) -> Option<UploadStream> {
        let file = self.staging.file(id)?.clone();
        let directory = self.staging.file_directory(id)?;
        let destination = join_path(&self.base_path, &self.staging.absolute_path(directory)?);
        Some(
            UploadStream::new(file, self.url.clone(), destination, self.chunk_size)
                .with_poll_interval(self.poll_interval),
        )
    }

    /// Find the server directory matching a staged one by walking names from
    /// the upload base.
    fn resolve_remote_directory(&mut self, filesystem: &Filesystem, directory: DirectoryId) {
        let mut current = self.base_directory;
        for name in self.staging.directory_names(directory) {
            match filesystem.find_child(current, &name) {
                Some(child) => current = Some(child),
                None => return,
            }
        }
        if let Some(remote) = current {
            self.staging.set_remote_directory(directory, remote);
        }
    }

    /// Upload staged files until none is left, the control is paused, or a
    /// file fails.
    pub async fn start<T: UploadTransport>(
        &mut self,
        transport: &T,
        filesystem: &mut Filesystem,
        notifier: &dyn Notifier,
    ) -> BatchOutcome {
        self.control.resume();
        if !self.active {
            self.active = true;
            let pending = self.staging.stats(self.staging.root()).unwrap_or_default();
            info!(files = pending.count, bytes = pending.size, url = %self.url, "starting upload");
        }

        loop {
            let (file_id, mut stream) = match self.current.take() {
                Some(current) => current,
                None => {
                    let Some(id) = self.staging.get_random_file() else {
                        self.stop(true);
                        return BatchOutcome::Finished;
                    };
                    match self.open_stream(id) {
                        Some(stream) => (id, stream),
                        None => {
                            warn!("staged file vanished before upload");
                            self.staging.remove_file(id);
                            continue;
                        }
                    }
                }
            };

            let pending: ContentStats = self.staging.stats(self.staging.root()).unwrap_or_default();
            let files_sent = self.total_file_sent;
            let content_sent = self.total_content_sent;
            let control = self.control.clone();
            let stats = &mut self.stats;
            let on_event = &mut self.on_event;
            let mut on_progress = |progress: &FileProgress| {
                let bytes_total = content_sent + pending.size;
                let bytes_sent = content_sent + progress.bytes_sent;
                stats.update(bytes_sent, bytes_total);
                let event = UploadEvent::Progress(BatchProgress {
                    file_name: progress.file_name.clone(),
                    file_size: progress.bytes_total,
                    files_sent,
                    files_total: files_sent + pending.count,
                    bytes_sent,
                    bytes_after_file: content_sent + progress.bytes_total,
                    bytes_total,
                    process_percent: progress.process_percent,
                    speed: stats.speed(),
                    remaining: stats.remaining(),
                });
                if let Some(callback) = on_event.as_mut() {
                    callback(&event);
                }
            };

            match stream.go(transport, filesystem, notifier, &control, &mut on_progress).await {
                UploadOutcome::Sent { file } => {
                    if let Some(directory) = self.staging.file_directory(file_id) {
                        self.resolve_remote_directory(filesystem, directory);
                    }
                    let staged = self.staging.remove_file(file_id);
                    let size = stream.file().size;
                    self.total_file_sent += 1;
                    self.total_content_sent += size;
                    debug!(file = %stream.file().name, size, "file uploaded");
                    let item = match (file, staged) {
                        (Some(remote), _) => Item::from(remote),
                        (None, Some(local)) => Item::from(local),
                        (None, None) => Item::from(stream.file().clone()),
                    };
                    self.emit(UploadEvent::FileUploaded(item));
                }
                UploadOutcome::Paused => {
                    self.current = Some((file_id, stream));
                    info!("upload paused");
                    return BatchOutcome::Paused;
                }
                UploadOutcome::Failed(e) => {
                    self.stop(false);
                    return BatchOutcome::Aborted(e);
                }
                UploadOutcome::Cancelled => {
                    self.stop(false);
                    return BatchOutcome::Aborted(ReposError::Cancelled);
                }
            }
        }
    }

    /// Hold the current file; a later `start` resends its unacknowledged chunk.
    pub fn pause(&mut self) {
        self.control.pause();
        if let Some((_, stream)) = self.current.as_mut() {
            stream.hold();
        }
    }

    /// End the batch. Files not uploaded stay staged.
    pub fn stop(&mut self, finished: bool) {
        self.control.pause();
        if let Some((_, mut stream)) = self.current.take() {
            stream.cancel();
        }
        if !self.active {
            return;
        }
        self.active = false;
        self.stats = TransferStats::new(self.sample_interval, self.speed_window);
        info!(
            finished,
            files = self.total_file_sent,
            bytes = self.total_content_sent,
            "upload stopped"
        );
        if finished {
            self.total_file_sent = 0;
            self.total_content_sent = 0;
        }
        self.emit(UploadEvent::Stopped { finished });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::json;

    use super::*;
    use crate::fs::RemoteObject;
    use crate::http::HttpResponse;
    use crate::notification::Severity;
    use crate::staging::StagingFile;
    use crate::upload::transport::mock::{MockTransport, Reply};
    use crate::upload::transport::ChunkHeaders;

    fn ok(body: serde_json::Value) -> Reply {
        Reply::Respond(HttpResponse::new(200, body.to_string()))
    }

    fn quiet(_: Severity, _: &str, _: &str) {}

    fn uploader() -> (FilesystemUpload, Arc<Mutex<Vec<String>>>) {
        let config = ClientConfig::new("https://host", "repo").with_chunk_size(10);
        let mut upload = FilesystemUpload::new(&config);
        upload.set_destination("https://host/repo/send/1", Some(ObjectId(1)), "/base/");
        let events = Arc::new(Mutex::new(Vec::new()));
        let log = events.clone();
        upload.on_event(move |event| {
            let entry = match event {
                UploadEvent::Progress(p) => format!("progress {} {}/{}", p.file_name, p.bytes_sent, p.bytes_total),
                UploadEvent::FileUploaded(item) => format!("uploaded {}", item.name()),
                UploadEvent::Stopped { finished } => format!("stopped {}", finished),
            };
            log.lock().unwrap().push(entry);
        });
        (upload, events)
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("/base/", "/a/b/"), "/base/a/b/");
        assert_eq!(join_path("/", "/"), "/");
        assert_eq!(join_path("/x//y", "z"), "/x/y/z");
    }

    #[tokio::test]
    async fn test_uploads_every_file() {
        let (mut upload, events) = uploader();
        upload.staging_mut().add_file(StagingFile::from_bytes("a.txt", vec![1u8; 4]), "/");
        upload
            .staging_mut()
            .add_file(StagingFile::from_bytes("b.txt", vec![2u8; 12]), "/photos/");

        let mut fs = Filesystem::new("repo");
        fs.add_object(RemoteObject::directory(ObjectId(1), None, "base"));
        let transport = MockTransport::new([
            ok(json!({"stream_id": "1", "process_percent": 1.0,
                      "file": {"id": 10, "name": "a.txt", "is_regular_file": true, "size": 4, "parent_item": 1}})),
            ok(json!({"stream_id": "2", "process_percent": 0.5,
                      "created_directories": [{"id": 2, "name": "photos", "is_regular_file": false, "parent_item": 1}]})),
            ok(json!({"stream_id": "2", "process_percent": 1.0})),
        ]);

        let outcome = upload.start(&transport, &mut fs, &quiet).await;
        assert!(matches!(outcome, BatchOutcome::Finished));
        assert!(upload.staging().is_empty());
        assert!(!upload.is_running());
        assert_eq!(upload.total_file_sent(), 0);

        let sent = transport.sent();
        assert_eq!(sent.len(), 3);
        match &sent[1].headers {
            ChunkHeaders::Identity { name, path, .. } => {
                assert_eq!(name.plain(), "b.txt");
                assert_eq!(path.plain(), "/base/photos/");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(fs.get_object_data(ObjectId(2)).is_some());

        let events = events.lock().unwrap();
        assert!(events.contains(&"uploaded a.txt".to_string()));
        assert!(events.contains(&"uploaded b.txt".to_string()));
        assert!(events.contains(&"progress b.txt 14/16".to_string()));
        assert_eq!(events.last(), Some(&"stopped true".to_string()));
    }

    #[tokio::test]
    async fn test_failure_aborts_batch() {
        let (mut upload, events) = uploader();
        upload.staging_mut().add_file(StagingFile::from_bytes("a.txt", vec![1u8; 4]), "/");
        upload.staging_mut().add_file(StagingFile::from_bytes("b.txt", vec![1u8; 4]), "/");
        let transport = MockTransport::new([Reply::Respond(HttpResponse::new(503, ""))]);
        let mut fs = Filesystem::new("repo");

        let outcome = upload.start(&transport, &mut fs, &quiet).await;
        assert!(matches!(outcome, BatchOutcome::Aborted(ReposError::HttpError(503))));
        assert_eq!(upload.staging().stats(upload.staging().root()).unwrap().count, 2);
        assert_eq!(events.lock().unwrap().last(), Some(&"stopped false".to_string()));

        upload.stop(false);
        assert_eq!(events.lock().unwrap().iter().filter(|e| e.starts_with("stopped")).count(), 1);
    }

    #[tokio::test]
    async fn test_empty_batch_finishes() {
        let (mut upload, events) = uploader();
        let transport = MockTransport::default();
        let mut fs = Filesystem::new("repo");
        assert!(matches!(upload.start(&transport, &mut fs, &quiet).await, BatchOutcome::Finished));
        assert_eq!(events.lock().unwrap().as_slice(), &["stopped true".to_string()]);
    }

    #[tokio::test]
    async fn test_remote_directory_is_resolved() {
        let (mut upload, _) = uploader();
        upload
            .staging_mut()
            .add_file(StagingFile::from_bytes("a.txt", vec![1u8; 4]), "/photos/");
        upload
            .staging_mut()
            .add_file(StagingFile::from_bytes("b.txt", vec![1u8; 4]), "/photos/");
        let photos = upload.staging().find_directory("/photos/").unwrap();

        let mut fs = Filesystem::new("repo");
        fs.add_object(RemoteObject::directory(ObjectId(1), None, "base"));
        let transport = MockTransport::new([
            ok(json!({"stream_id": "1", "process_percent": 1.0,
                      "created_directories": [{"id": 5, "name": "photos", "is_regular_file": false, "parent_item": 1}]})),
            Reply::Fail(ReposError::Custom("connection reset".into())),
        ]);

        upload.start(&transport, &mut fs, &quiet).await;
        assert_eq!(upload.staging().remote_directory(photos), Some(ObjectId(5)));
    }
}
