//! Chunk cursor over a file being uploaded.

use std::ops::Range;

pub use crate::config::DEFAULT_CHUNK_SIZE as MAX_BATCH_SIZE;

/// Splits a file of `size` bytes into consecutive ranges of at most
/// `chunk_size` bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedFileStream {
    size: u64,
    chunk_size: u64,
    cursor: u64,
    last_cursor: u64,
}

impl ChunkedFileStream {
    pub fn new(size: u64) -> Self {
        Self::with_chunk_size(size, MAX_BATCH_SIZE)
    }

    /// A zero `chunk_size` is treated as 1.
    pub fn with_chunk_size(size: u64, chunk_size: u64) -> Self {
        Self {
            size,
            chunk_size: chunk_size.max(1),
            cursor: 0,
            last_cursor: 0,
        }
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Byte range of the next chunk, `None` once the whole file was handed out.
    pub fn get_next_chunk(&mut self) -> Option<Range<u64>> {
        self.last_cursor = self.cursor;
        if self.cursor >= self.size {
            return None;
        }
        self.cursor += (self.size - self.cursor).min(self.chunk_size);
        Some(self.last_cursor..self.cursor)
    }

    /// Rewind to the start of the chunk returned last.
    pub fn cancel_chunk(&mut self) {
        self.cursor = self.last_cursor;
    }

    /// Number of chunks in the file.
    pub fn chunk_number(&self) -> u64 {
        self.size.div_ceil(self.chunk_size)
    }

    /// Number of chunks before the one returned last.
    pub fn sent_chunk(&self) -> u64 {
        self.last_cursor / self.chunk_size
    }

    /// Offset of the chunk returned last.
    pub fn position(&self) -> u64 {
        self.last_cursor
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.size
    }
}
