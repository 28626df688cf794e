//! # reposfs
//!
//! Client-side core for browsing and uploading into a file repository server.
//!
//! ## Features
//!
//! - **Remote cache**: An in-memory mirror of the repository tree with
//!   recursive size and file count aggregates, per-directory listeners and
//!   path lookups.
//! - **Navigation**: Filtered and sorted directory listings, selection with
//!   shift/ctrl semantics, history and cut/paste moves.
//! - **Staging**: A local directory tree of files waiting for upload, with
//!   aggregates that prune empty directories as files leave.
//! - **Uploads**:
//!   - Files are sent in chunks of at most 50 MiB, one request at a time.
//!   - Pause resends the unacknowledged chunk on resume.
//!   - Server side processing is polled until complete.
//!   - Progress events with transfer rate and time estimates.
//!
//! Every name crossing the wire is percent-encoded; see [`EncodedString`].
//!
//! ## Example: Browse and upload
//!
//! ```no_run
//! use reposfs::{ClientConfig, RepositorySession, StagingFile};
//!
//! # async fn example() -> reposfs::Result<()> {
//! let config = ClientConfig::new("https://files.example.org", "alice/photos")
//!     .with_auth_token("secret");
//! let mut session = RepositorySession::new(config)?;
//!
//! session.load_content().await?;
//! session.enter_path("/holidays/");
//! for id in session.listing().ids() {
//!     if let Some(object) = session.filesystem().get_object_data(id) {
//!         println!("{} ({} bytes)", object.name, object.size());
//!     }
//! }
//!
//! session.stage_file(StagingFile::from_bytes("notes.txt", b"hello".to_vec()), "/");
//! session.upload().await;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod enc_string;
pub mod error;
pub mod fs;
pub mod http;
pub mod navigator;
pub mod notification;
pub mod progress;
pub mod session;
pub mod staging;
pub mod upload;

// Re-export commonly used types
pub use api::{ObjectUpdate, RepositoryClient};
pub use config::ClientConfig;
pub use enc_string::EncodedString;
pub use error::{ReposError, Result};
pub use fs::{DirectoryFilter, DirectoryListing, Filesystem, Item, ObjectId, RemoteObject, SortKey};
pub use navigator::Navigator;
pub use notification::{Notifier, Severity, TracingNotifier};
pub use progress::make_progress_bar;
pub use session::{RepositorySession, View};
pub use staging::{StagingFile, StagingFilesystem};
pub use upload::{BatchOutcome, BatchProgress, FilesystemUpload, UploadControl, UploadEvent};
