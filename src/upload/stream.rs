//! Upload of a single staged file, one chunk request at a time.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use super::chunk::ChunkedFileStream;
use super::transport::{ChunkHeaders, ChunkRequest, UploadTransport};
use crate::api::ServerMessage;
use crate::config::DEFAULT_POLL_INTERVAL;
use crate::enc_string::EncodedString;
use crate::error::{ReposError, Result};
use crate::fs::{Filesystem, RemoteObject};
use crate::http::HttpResponse;
use crate::notification::{Notifier, Severity};
use crate::staging::StagingFile;

/// Where a file upload stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    /// Not started, or held.
    Idle,
    Sending { chunk: u64 },
    AwaitingResponse { chunk: u64 },
    /// Every chunk was sent; waiting for the server to finish processing.
    AwaitingProcessing,
    Finished,
    Failed,
    Cancelled,
}

impl UploadState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadState::Finished | UploadState::Failed | UploadState::Cancelled)
    }
}

/// Progress of one file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileProgress {
    pub file_name: String,
    pub chunks_sent: u64,
    pub chunks_total: u64,
    pub bytes_sent: u64,
    pub bytes_total: u64,
    /// Server side processing, from 0.0 to 1.0.
    pub process_percent: f64,
}

/// Shared run flag of an upload.
///
/// Clones observe the same flag, so a batch can be paused from another task.
#[derive(Debug, Clone)]
pub struct UploadControl {
    running: Arc<watch::Sender<bool>>,
}

impl Default for UploadControl {
    fn default() -> Self {
        Self::new()
    }
}

impl UploadControl {
    pub fn new() -> Self {
        let (running, _) = watch::channel(false);
        Self {
            running: Arc::new(running),
        }
    }

    pub fn is_running(&self) -> bool {
        *self.running.borrow()
    }

    pub fn resume(&self) {
        self.running.send_replace(true);
    }

    pub fn pause(&self) {
        self.running.send_replace(false);
    }

    /// Resolves once the flag is cleared.
    pub async fn halted(&self) {
        let mut running = self.running.subscribe();
        let _ = running.wait_for(|running| !*running).await;
    }
}

/// How a call to [`UploadStream::go`] ended.
#[derive(Debug)]
pub enum UploadOutcome {
    /// Uploaded and processed. `file` is the record returned by the server.
    Sent { file: Option<RemoteObject> },
    /// Held by the control handle; `go` resumes from the last acknowledged chunk.
    Paused,
    Failed(ReposError),
    Cancelled,
}

/// State machine uploading one file to `url`.
pub struct UploadStream {
    file: StagingFile,
    chunks: ChunkedFileStream,
    url: String,
    destination: String,
    stream_id: Option<String>,
    process_percent: f64,
    chunk_progress: u64,
    in_flight: bool,
    state: UploadState,
    poll_interval: Duration,
    uploaded: Option<RemoteObject>,
}

impl UploadStream {
    /// `destination` is the server directory path sent with the first chunk.
    pub fn new(file: StagingFile, url: impl Into<String>, destination: impl Into<String>, chunk_size: u64) -> Self {
        Self {
            chunks: ChunkedFileStream::with_chunk_size(file.size, chunk_size),
            file,
            url: url.into(),
            destination: destination.into(),
            stream_id: None,
            process_percent: 0.0,
            chunk_progress: 0,
            in_flight: false,
            state: UploadState::Idle,
            poll_interval: DEFAULT_POLL_INTERVAL,
            uploaded: None,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn file(&self) -> &StagingFile {
        &self.file
    }

    pub fn state(&self) -> UploadState {
        self.state
    }

    pub fn stream_id(&self) -> Option<&str> {
        self.stream_id.as_deref()
    }

    pub fn progress(&self) -> FileProgress {
        let size = self.chunks.size();
        let chunks_sent = if self.chunks.position() >= size {
            self.chunks.chunk_number()
        } else {
            self.chunks.sent_chunk()
        };
        FileProgress {
            file_name: self.file.name.clone(),
            chunks_sent,
            chunks_total: self.chunks.chunk_number(),
            bytes_sent: (self.chunks.position() + self.chunk_progress).min(size),
            bytes_total: size,
            process_percent: self.process_percent,
        }
    }

    /// Forget the unacknowledged chunk so the next `go` sends it again.
    pub fn hold(&mut self) {
        if self.in_flight {
            self.chunks.cancel_chunk();
            self.in_flight = false;
            self.chunk_progress = 0;
        }
        if !self.state.is_terminal() {
            self.state = UploadState::Idle;
        }
    }

    pub fn cancel(&mut self) {
        self.hold();
        self.state = UploadState::Cancelled;
    }

    fn headers(&self) -> ChunkHeaders {
        match &self.stream_id {
            Some(token) => ChunkHeaders::Token(token.clone()),
            None => ChunkHeaders::Identity {
                name: EncodedString::from_plain(&self.file.name),
                size: self.file.size,
                timestamp: self.file.timestamp,
                mimetype: EncodedString::from_plain(&self.file.mimetype),
                path: EncodedString::from_plain(&self.destination),
                description: self.file.description.as_deref().map(EncodedString::from_plain),
            },
        }
    }

    fn fail(&mut self, error: ReposError, notifier: &dyn Notifier) -> UploadOutcome {
        self.hold();
        self.state = UploadState::Failed;
        warn!(file = %self.file.name, error = %error, "upload failed");
        let (title, content) = error.headline();
        notifier.notify(Severity::Error, &title, &content);
        UploadOutcome::Failed(error)
    }

    /// Run until the file is processed, fails, or the control is paused.
    pub async fn go<T: UploadTransport>(
        &mut self,
        transport: &T,
        filesystem: &mut Filesystem,
        notifier: &dyn Notifier,
        control: &UploadControl,
        on_progress: &mut (dyn FnMut(&FileProgress) + Send),
    ) -> UploadOutcome {
        match self.state {
            UploadState::Finished => return UploadOutcome::Sent { file: self.uploaded.clone() },
            UploadState::Cancelled => return UploadOutcome::Cancelled,
            UploadState::Failed => {
                return UploadOutcome::Failed(ReposError::Custom(format!("upload of {} already failed", self.file.name)))
            }
            _ => {}
        }

        loop {
            if !control.is_running() {
                self.hold();
                return UploadOutcome::Paused;
            }

            let request = match self.chunks.get_next_chunk() {
                Some(range) => {
                    let body = match self.file.read_range(range.start, range.end - range.start).await {
                        Ok(body) => body,
                        Err(e) => return self.fail(e, notifier),
                    };
                    self.in_flight = true;
                    self.chunk_progress = 0;
                    self.state = UploadState::Sending {
                        chunk: self.chunks.sent_chunk(),
                    };
                    ChunkRequest {
                        url: self.url.clone(),
                        headers: self.headers(),
                        body,
                    }
                }
                None => {
                    if self.process_percent >= 1.0 {
                        self.state = UploadState::Finished;
                        return UploadOutcome::Sent { file: self.uploaded.clone() };
                    }
                    let Some(token) = self.stream_id.clone() else {
                        return self.fail(ReposError::InvalidResponse("no stream to poll".into()), notifier);
                    };
                    self.state = UploadState::AwaitingProcessing;
                    tokio::select! {
                        biased;
                        _ = control.halted() => {
                            self.hold();
                            return UploadOutcome::Paused;
                        }
                        _ = tokio::time::sleep(self.poll_interval) => {}
                    }
                    debug!(file = %self.file.name, percent = self.process_percent, "polling processing state");
                    ChunkRequest {
                        url: self.url.clone(),
                        headers: ChunkHeaders::Token(token),
                        body: Vec::new(),
                    }
                }
            };

            let chunk_len = request.body.len() as u64;
            let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
            let send = transport.send_chunk(request, progress_tx);
            tokio::pin!(send);
            let result = loop {
                tokio::select! {
                    biased;
                    _ = control.halted() => break None,
                    Some(sent) = progress_rx.recv() => {
                        if self.in_flight {
                            self.chunk_progress = sent;
                            if let UploadState::Sending { chunk } = self.state {
                                if sent >= chunk_len {
                                    self.state = UploadState::AwaitingResponse { chunk };
                                }
                            }
                        }
                        on_progress(&self.progress());
                    }
                    result = &mut send => break Some(result),
                }
            };

            // Anything answered after a pause belongs to a request we gave up on.
            let Some(result) = result.filter(|_| control.is_running()) else {
                self.hold();
                return UploadOutcome::Paused;
            };

            if let Err(e) = self.handle_response(result, filesystem, notifier) {
                return self.fail(e, notifier);
            }
            on_progress(&self.progress());
        }
    }

    fn handle_response(
        &mut self,
        result: Result<HttpResponse>,
        filesystem: &mut Filesystem,
        notifier: &dyn Notifier,
    ) -> Result<()> {
        let response = result?;
        if response.body.trim().is_empty() {
            return Err(if response.status == 200 {
                ReposError::InvalidResponse("empty upload response".into())
            } else {
                ReposError::HttpError(response.status)
            });
        }
        let body: Value = match serde_json::from_str(&response.body) {
            Ok(body) => body,
            Err(_) if response.status != 200 => return Err(ReposError::HttpError(response.status)),
            Err(e) => return Err(e.into()),
        };
        let message = ServerMessage::from_body(&body);
        if response.status != 200 {
            return Err(match message {
                Some(message) => message.into_error(),
                None => ReposError::HttpError(response.status),
            });
        }
        if let Some(message) = message {
            notifier.notify(Severity::Info, message.title(), message.content());
        }

        let stream_id = match body.get("stream_id") {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            Some(Value::Number(id)) => id.to_string(),
            _ => return Err(ReposError::InvalidResponse("upload response has no stream_id".into())),
        };
        self.stream_id = Some(stream_id);
        self.process_percent = match body.get("process_percent") {
            Some(Value::Number(percent)) => percent.as_f64().unwrap_or(0.0),
            Some(Value::String(percent)) => percent.parse().unwrap_or(0.0),
            _ => 0.0,
        };

        if let Some(Value::Array(directories)) = body.get("created_directories") {
            for record in directories {
                match RemoteObject::from_server_data(record) {
                    Ok(directory) => filesystem.add_object(directory),
                    Err(e) => warn!(error = %e, "ignoring invalid created directory"),
                }
            }
        }
        match body.get("file") {
            None | Some(Value::Null) => {}
            Some(record) => match RemoteObject::from_server_data(record) {
                Ok(file) => {
                    filesystem.add_object(file.clone());
                    self.uploaded = Some(file);
                }
                Err(e) => warn!(error = %e, "ignoring invalid uploaded file record"),
            },
        }

        if self.in_flight {
            self.in_flight = false;
            self.chunk_progress = (self.chunks.size() - self.chunks.position()).min(self.chunks.chunk_size());
        }
        debug!(
            file = %self.file.name,
            chunk = self.chunks.sent_chunk(),
            percent = self.process_percent,
            "chunk acknowledged"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::fs::ObjectId;
    use crate::upload::transport::mock::{MockTransport, Reply};

    fn ok(body: Value) -> Reply {
        Reply::Respond(HttpResponse::new(200, body.to_string()))
    }

    fn data(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn stream(len: usize) -> UploadStream {
        let file = StagingFile::from_bytes("notes.txt", data(len)).with_timestamp(1000);
        UploadStream::new(file, "https://host/repo/send/4", "/docs//2024/", 10)
    }

    struct Recorder(Mutex<Vec<(Severity, String)>>);

    impl Notifier for Recorder {
        fn notify(&self, severity: Severity, title: &str, _content: &str) {
            self.0.lock().unwrap().push((severity, title.to_string()));
        }
    }

    fn running() -> UploadControl {
        let control = UploadControl::new();
        control.resume();
        control
    }

    #[tokio::test]
    async fn test_sends_every_chunk_then_finishes() {
        let transport = MockTransport::new([
            ok(json!({"stream_id": "s1", "process_percent": 0.3})),
            ok(json!({"stream_id": "s1", "process_percent": 0.6})),
            ok(json!({
                "stream_id": "s1",
                "process_percent": 1.0,
                "file": {"id": 9, "name": "notes.txt", "is_regular_file": true, "size": 25, "parent_item": 4}
            })),
        ]);
        let mut fs = Filesystem::new("repo");
        let notifier = Recorder(Mutex::new(Vec::new()));
        let mut progress = Vec::new();
        let mut upload = stream(25);

        let outcome = upload
            .go(&transport, &mut fs, &notifier, &running(), &mut |p: &FileProgress| {
                progress.push(p.bytes_sent)
            })
            .await;

        match outcome {
            UploadOutcome::Sent { file: Some(file) } => assert_eq!(file.id, ObjectId(9)),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(upload.state(), UploadState::Finished);
        assert!(fs.get_object_data(ObjectId(9)).is_some());
        assert!(notifier.0.lock().unwrap().is_empty());
        assert_eq!(progress.last(), Some(&25));

        let sent = transport.sent();
        assert_eq!(sent.len(), 3);
        let sizes: Vec<usize> = sent.iter().map(|r| r.body.len()).collect();
        assert_eq!(sizes, vec![10, 10, 5]);
        assert!(matches!(&sent[0].headers, ChunkHeaders::Identity { path, .. } if path.plain() == "/docs//2024/"));
        assert_eq!(sent[1].headers, ChunkHeaders::Token("s1".into()));
        assert_eq!(sent[2].body, data(25)[20..].to_vec());
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_until_processed() {
        let transport = MockTransport::new([
            ok(json!({"stream_id": 77, "process_percent": 0.5})),
            ok(json!({"stream_id": 77, "process_percent": "0.9"})),
            ok(json!({"stream_id": 77, "process_percent": 1})),
        ]);
        let mut fs = Filesystem::new("repo");
        let notifier = Recorder(Mutex::new(Vec::new()));
        let mut upload = stream(8);

        let outcome = upload
            .go(&transport, &mut fs, &notifier, &running(), &mut |_: &FileProgress| {})
            .await;

        assert!(matches!(outcome, UploadOutcome::Sent { file: None }));
        let sent = transport.sent();
        assert_eq!(sent.len(), 3);
        assert!(sent[1].body.is_empty());
        assert_eq!(sent[2].headers, ChunkHeaders::Token("77".into()));
    }

    #[tokio::test]
    async fn test_failure_is_reported() {
        let transport = MockTransport::new([Reply::Respond(HttpResponse::new(
            500,
            r#"{"message": {"severity": "Error", "title": "Disk full", "content": "no space"}}"#,
        ))]);
        let mut fs = Filesystem::new("repo");
        let notifier = Recorder(Mutex::new(Vec::new()));
        let mut upload = stream(25);

        let outcome = upload
            .go(&transport, &mut fs, &notifier, &running(), &mut |_: &FileProgress| {})
            .await;

        assert!(matches!(outcome, UploadOutcome::Failed(ReposError::Server { .. })));
        assert_eq!(upload.state(), UploadState::Failed);
        assert_eq!(
            notifier.0.lock().unwrap().as_slice(),
            &[(Severity::Error, "Disk full".to_string())]
        );
        assert_eq!(upload.progress().bytes_sent, 0);
    }

    #[tokio::test]
    async fn test_missing_stream_id_fails() {
        let transport = MockTransport::new([ok(json!({"process_percent": 0.1}))]);
        let mut fs = Filesystem::new("repo");
        let notifier = Recorder(Mutex::new(Vec::new()));
        let mut upload = stream(25);

        let outcome = upload
            .go(&transport, &mut fs, &notifier, &running(), &mut |_: &FileProgress| {})
            .await;
        assert!(matches!(outcome, UploadOutcome::Failed(ReposError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_server_message_is_forwarded_as_info() {
        let transport = MockTransport::new([ok(json!({
            "stream_id": "a",
            "process_percent": 1.0,
            "message": {"severity": "Warning", "title": "Renamed", "content": "notes (1).txt"}
        }))]);
        let mut fs = Filesystem::new("repo");
        let notifier = Recorder(Mutex::new(Vec::new()));
        let mut upload = stream(5);

        let outcome = upload
            .go(&transport, &mut fs, &notifier, &running(), &mut |_: &FileProgress| {})
            .await;
        assert!(matches!(outcome, UploadOutcome::Sent { .. }));
        assert_eq!(
            notifier.0.lock().unwrap().as_slice(),
            &[(Severity::Info, "Renamed".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_resends_same_range() {
        let transport = MockTransport::new([ok(json!({"stream_id": "s", "process_percent": 0.2})), Reply::Hang]);
        let mut fs = Filesystem::new("repo");
        let notifier = Recorder(Mutex::new(Vec::new()));
        let control = running();
        let mut upload = stream(25);

        let mut on_progress = |_: &FileProgress| {};
        let (outcome, _) = tokio::join!(
            upload.go(&transport, &mut fs, &notifier, &control, &mut on_progress),
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                control.pause();
            }
        );
        assert!(matches!(outcome, UploadOutcome::Paused));
        assert_eq!(upload.state(), UploadState::Idle);
        assert_eq!(upload.progress().bytes_sent, 10);

        transport.push(ok(json!({"stream_id": "s", "process_percent": 0.5})));
        transport.push(ok(json!({"stream_id": "s", "process_percent": 1.0})));
        control.resume();
        let outcome = upload
            .go(&transport, &mut fs, &notifier, &control, &mut |_: &FileProgress| {})
            .await;
        assert!(matches!(outcome, UploadOutcome::Sent { .. }));

        let sent = transport.sent();
        assert_eq!(sent.len(), 4);
        assert_eq!(sent[1].body, sent[2].body);
        assert_eq!(sent[2].body, data(25)[10..20].to_vec());
        assert_eq!(sent[2].headers, ChunkHeaders::Token("s".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_reply_after_pause_is_dropped() {
        let late = json!({
            "stream_id": "late",
            "process_percent": 1.0,
            "created_directories": [{"id": 51, "name": "2024", "is_regular_file": false}],
            "file": {"id": 50, "name": "notes.txt", "is_regular_file": true, "size": 25, "parent_item": 51}
        });
        let transport = MockTransport::new([
            ok(json!({"stream_id": "s", "process_percent": 0.2})),
            Reply::Delayed(Duration::from_millis(100), HttpResponse::new(200, late.to_string())),
        ]);
        let mut fs = Filesystem::new("repo");
        let notifier = Recorder(Mutex::new(Vec::new()));
        let control = running();
        let mut upload = stream(25);

        let mut on_progress = |_: &FileProgress| {};
        let (outcome, _) = tokio::join!(
            upload.go(&transport, &mut fs, &notifier, &control, &mut on_progress),
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                control.pause();
            }
        );
        assert!(matches!(outcome, UploadOutcome::Paused));
        tokio::time::sleep(Duration::from_millis(250)).await;

        assert_eq!(fs.len(), 0);
        assert!(fs.get_object_data(ObjectId(50)).is_none());
        assert!(fs.get_object_data(ObjectId(51)).is_none());
        assert_eq!(upload.stream_id(), Some("s"));
        assert_eq!(upload.chunks.position(), 10);
        assert_eq!(upload.state(), UploadState::Idle);

        transport.push(ok(json!({"stream_id": "s", "process_percent": 0.6})));
        transport.push(ok(json!({"stream_id": "s", "process_percent": 1.0})));
        control.resume();
        let outcome = upload
            .go(&transport, &mut fs, &notifier, &control, &mut |_: &FileProgress| {})
            .await;
        assert!(matches!(outcome, UploadOutcome::Sent { file: None }));

        let sent = transport.sent();
        assert_eq!(sent.len(), 4);
        assert_eq!(sent[2].body, data(25)[10..20].to_vec());
        assert_eq!(sent[2].headers, ChunkHeaders::Token("s".into()));
        assert_eq!(sent[3].headers, ChunkHeaders::Token("s".into()));
    }

    #[tokio::test]
    async fn test_hold_between_chunks_keeps_acknowledged_bytes() {
        let transport = MockTransport::new([ok(json!({"stream_id": "s", "process_percent": 0.2}))]);
        let mut fs = Filesystem::new("repo");
        let notifier = Recorder(Mutex::new(Vec::new()));
        let control = running();
        let mut upload = stream(25);

        let outcome = upload
            .go(&transport, &mut fs, &notifier, &control, &mut |_: &FileProgress| {
                control.pause();
            })
            .await;
        assert!(matches!(outcome, UploadOutcome::Paused));
        assert_eq!(transport.sent().len(), 1);
        assert_eq!(upload.progress().bytes_sent, 10);

        upload.hold();
        assert_eq!(upload.progress().bytes_sent, 10);
        assert_eq!(upload.chunks.position(), 0);
    }

    #[tokio::test]
    async fn test_not_running_holds_immediately() {
        let transport = MockTransport::default();
        let mut fs = Filesystem::new("repo");
        let notifier = Recorder(Mutex::new(Vec::new()));
        let mut upload = stream(25);

        let outcome = upload
            .go(&transport, &mut fs, &notifier, &UploadControl::new(), &mut |_: &FileProgress| {})
            .await;
        assert!(matches!(outcome, UploadOutcome::Paused));
        assert!(transport.sent().is_empty());
    }
}
