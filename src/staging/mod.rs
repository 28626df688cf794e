//! Local staging area for upload batches.

mod file;
mod tree;

pub use file::{FileSource, StagingFile};
pub use tree::{DirectoryId, StagedFileId, StagingFilesystem};
