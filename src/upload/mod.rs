//! Chunked uploads of staged files.

pub mod chunk;
pub mod stats;
pub mod stream;
pub mod transport;
pub mod uploader;

pub use chunk::{ChunkedFileStream, MAX_BATCH_SIZE};
pub use stats::TransferStats;
pub use stream::{FileProgress, UploadControl, UploadOutcome, UploadState, UploadStream};
pub use transport::{ChunkHeaders, ChunkRequest, UploadTransport};
pub use uploader::{BatchOutcome, BatchProgress, FilesystemUpload, UploadEvent, UploadEventCallback};
