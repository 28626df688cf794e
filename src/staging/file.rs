//! Local files waiting to be uploaded.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::io::{AsyncReadExt as _, AsyncSeekExt as _};

use crate::error::{ReposError, Result};

/// Where the bytes of a staged file come from.
#[derive(Debug, Clone)]
pub enum FileSource {
    Disk(PathBuf),
    Memory(Arc<Vec<u8>>),
}

/// A local file with the metadata sent along with its first chunk.
#[derive(Debug, Clone)]
pub struct StagingFile {
    pub name: String,
    pub size: u64,
    pub mimetype: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub description: Option<String>,
    source: FileSource,
}

fn guess_mimetype(name: &str) -> String {
    mime_guess::from_path(name)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

fn millis_since_epoch(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}

impl StagingFile {
    /// Stage an in-memory buffer.
    pub fn from_bytes(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        let name = name.into();
        let data = data.into();
        Self {
            mimetype: guess_mimetype(&name),
            size: data.len() as u64,
            timestamp: millis_since_epoch(SystemTime::now()),
            description: None,
            source: FileSource::Memory(Arc::new(data)),
            name,
        }
    }

    /// Stage a file from disk, reading its size and modification time.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(ReposError::Custom(format!("{} is not a file", path.display())));
        }
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| ReposError::Custom(format!("{} has no file name", path.display())))?;
        let timestamp = metadata
            .modified()
            .map(millis_since_epoch)
            .unwrap_or_else(|_| millis_since_epoch(SystemTime::now()));

        Ok(Self {
            mimetype: guess_mimetype(&name),
            size: metadata.len(),
            timestamp,
            description: None,
            source: FileSource::Disk(path.to_path_buf()),
            name,
        })
    }

    pub fn with_mimetype(mut self, mimetype: impl Into<String>) -> Self {
        let mimetype = mimetype.into();
        if !mimetype.is_empty() {
            self.mimetype = mimetype;
        }
        self
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn source(&self) -> &FileSource {
        &self.source
    }

    /// Read `len` bytes starting at `offset`.
    pub async fn read_range(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        if offset.saturating_add(len) > self.size {
            return Err(ReposError::Custom(format!(
                "range {}+{} is past the end of {} ({} bytes)",
                offset, len, self.name, self.size
            )));
        }
        match &self.source {
            FileSource::Memory(data) => {
                let start = offset as usize;
                let end = start + len as usize;
                data.get(start..end)
                    .map(<[u8]>::to_vec)
                    .ok_or_else(|| ReposError::Custom(format!("{} changed size", self.name)))
            }
            FileSource::Disk(path) => {
                let mut file = tokio::fs::File::open(path).await?;
                file.seek(std::io::SeekFrom::Start(offset)).await?;
                let mut buffer = vec![0u8; len as usize];
                file.read_exact(&mut buffer).await?;
                Ok(buffer)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mimetype_guess() {
        assert_eq!(StagingFile::from_bytes("a.png", vec![1]).mimetype, "image/png");
        assert_eq!(
            StagingFile::from_bytes("no_extension", vec![1]).mimetype,
            "application/octet-stream"
        );
        let explicit = StagingFile::from_bytes("a.png", vec![1]).with_mimetype("text/x-custom");
        assert_eq!(explicit.mimetype, "text/x-custom");
        let empty = StagingFile::from_bytes("a.png", vec![1]).with_mimetype("");
        assert_eq!(empty.mimetype, "image/png");
    }

    #[tokio::test]
    async fn test_read_range_memory() {
        let file = StagingFile::from_bytes("data.bin", (0u8..10).collect::<Vec<_>>());
        assert_eq!(file.read_range(2, 3).await.unwrap(), vec![2, 3, 4]);
        assert!(file.read_range(8, 5).await.is_err());
    }

    #[tokio::test]
    async fn test_from_path_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        tokio::fs::write(&path, b"hello world").await.unwrap();

        let file = StagingFile::from_path(&path).await.unwrap();
        assert_eq!(file.name, "notes.txt");
        assert_eq!(file.size, 11);
        assert_eq!(file.mimetype, "text/plain");
        assert!(file.timestamp > 0);
        assert_eq!(file.read_range(6, 5).await.unwrap(), b"world");
    }

    #[tokio::test]
    async fn test_from_path_rejects_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(StagingFile::from_path(dir.path()).await.is_err());
    }
}
