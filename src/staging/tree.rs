//! Directory tree of files staged for upload.
//!
//! Directories and files live in two arenas and refer to each other by index.
//! Every directory tracks the total size and number of files below it; the
//! root therefore holds the totals of the whole upload batch.

use std::path::Path;

use tracing::{debug, warn};

use super::file::StagingFile;
use crate::error::Result;
use crate::fs::{ContentStats, ObjectId};

/// Index of a staged directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DirectoryId(usize);

/// Index of a staged file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StagedFileId(usize);

type StatsCallback = Box<dyn FnMut(ContentStats) + Send>;
type DirectoryCallback = Box<dyn FnMut(DirectoryId) + Send>;
type FileCallback = Box<dyn FnMut(StagedFileId) + Send>;
type RemovedCallback = Box<dyn FnMut() + Send>;

#[derive(Default)]
struct DirectoryCallbacks {
    stats_updated: Option<StatsCallback>,
    directory_added: Option<DirectoryCallback>,
    file_added: Option<FileCallback>,
    removed: Option<RemovedCallback>,
}

struct DirectoryNode {
    name: String,
    parent: Option<DirectoryId>,
    // Insertion ordered; names are unique.
    directories: Vec<(String, DirectoryId)>,
    files: Vec<StagedFileId>,
    stats: ContentStats,
    remote_directory: Option<ObjectId>,
    callbacks: DirectoryCallbacks,
}

impl DirectoryNode {
    fn new(name: String, parent: Option<DirectoryId>) -> Self {
        Self {
            name,
            parent,
            directories: Vec::new(),
            files: Vec::new(),
            stats: ContentStats::default(),
            remote_directory: None,
            callbacks: DirectoryCallbacks::default(),
        }
    }

    fn child(&self, name: &str) -> Option<DirectoryId> {
        self.directories
            .iter()
            .find(|(child_name, _)| child_name == name)
            .map(|(_, id)| *id)
    }

    fn is_empty(&self) -> bool {
        self.files.is_empty() && self.directories.is_empty()
    }
}

struct FileEntry {
    file: StagingFile,
    directory: DirectoryId,
    on_removed: Option<RemovedCallback>,
}

/// Local staging area for an upload batch.
pub struct StagingFilesystem {
    directories: Vec<Option<DirectoryNode>>,
    files: Vec<Option<FileEntry>>,
}

impl Default for StagingFilesystem {
    fn default() -> Self {
        Self::new("")
    }
}

impl StagingFilesystem {
    pub fn new(root_name: impl Into<String>) -> Self {
        Self {
            directories: vec![Some(DirectoryNode::new(root_name.into(), None))],
            files: Vec::new(),
        }
    }

    pub fn root(&self) -> DirectoryId {
        DirectoryId(0)
    }

    fn node(&self, id: DirectoryId) -> Option<&DirectoryNode> {
        self.directories.get(id.0).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, id: DirectoryId) -> Option<&mut DirectoryNode> {
        self.directories.get_mut(id.0).and_then(Option::as_mut)
    }

    fn entry(&self, id: StagedFileId) -> Option<&FileEntry> {
        self.files.get(id.0).and_then(Option::as_ref)
    }

    /// Stage `file` under the directory `path`, creating missing directories.
    ///
    /// Empty files are ignored and return `None`.
    pub fn add_file(&mut self, file: StagingFile, path: &str) -> Option<StagedFileId> {
        if file.size == 0 {
            debug!(name = %file.name, "skipping empty file");
            return None;
        }
        let directory = self.directory_from_path(path, true)?;
        let size = file.size;
        let id = StagedFileId(self.files.len());
        self.files.push(Some(FileEntry {
            file,
            directory,
            on_removed: None,
        }));

        self.update_stats(
            directory,
            ContentStats { count: 1, size },
            |stats, delta| {
                stats.count += delta.count;
                stats.size += delta.size;
            },
        );

        let node = self.node_mut(directory)?;
        node.files.push(id);
        if let Some(callback) = node.callbacks.file_added.as_mut() {
            callback(id);
        }
        Some(id)
    }

    /// Resolve a `/`-separated directory path from the root.
    ///
    /// Missing directories are created when `create_if_not_found` is set,
    /// otherwise `None` is returned.
    pub fn directory_from_path(&mut self, path: &str, create_if_not_found: bool) -> Option<DirectoryId> {
        let mut current = self.root();
        for segment in path.split('/').filter(|segment| !segment.is_empty()) {
            let existing = self.node(current)?.child(segment);
            current = match existing {
                Some(child) => child,
                None if create_if_not_found => self.create_directory(current, segment)?,
                None => return None,
            };
        }
        Some(current)
    }

    /// Read-only variant of [`directory_from_path`](Self::directory_from_path).
    pub fn find_directory(&self, path: &str) -> Option<DirectoryId> {
        let mut current = self.root();
        for segment in path.split('/').filter(|segment| !segment.is_empty()) {
            current = self.node(current)?.child(segment)?;
        }
        Some(current)
    }

    fn create_directory(&mut self, parent: DirectoryId, name: &str) -> Option<DirectoryId> {
        let id = DirectoryId(self.directories.len());
        self.directories
            .push(Some(DirectoryNode::new(name.to_string(), Some(parent))));
        let parent_node = self.node_mut(parent)?;
        parent_node.directories.push((name.to_string(), id));
        if let Some(callback) = parent_node.callbacks.directory_added.as_mut() {
            callback(id);
        }
        Some(id)
    }

    fn update_stats(&mut self, from: DirectoryId, delta: ContentStats, op: fn(&mut ContentStats, ContentStats)) {
        let mut current = Some(from);
        while let Some(id) = current {
            let Some(node) = self.node_mut(id) else {
                break;
            };
            op(&mut node.stats, delta);
            let stats = node.stats;
            if let Some(callback) = node.callbacks.stats_updated.as_mut() {
                callback(stats);
            }
            current = node.parent;
        }
    }

    fn detach_file(&mut self, id: StagedFileId) -> Option<(StagingFile, DirectoryId)> {
        let entry = self.files.get_mut(id.0)?.take()?;
        let directory = entry.directory;
        if let Some(node) = self.node_mut(directory) {
            node.files.retain(|file| *file != id);
        }
        self.update_stats(
            directory,
            ContentStats {
                count: 1,
                size: entry.file.size,
            },
            |stats, delta| {
                stats.count = stats.count.saturating_sub(delta.count);
                stats.size = stats.size.saturating_sub(delta.size);
            },
        );
        if let Some(mut callback) = entry.on_removed {
            callback();
        }
        Some((entry.file, directory))
    }

    /// Unstage a file. Directories left empty are pruned up to the root.
    pub fn remove_file(&mut self, id: StagedFileId) -> Option<StagingFile> {
        let (file, directory) = self.detach_file(id)?;
        self.remove_if_empty(directory);
        self.reclaim_slots();
        Some(file)
    }

    /// Drop the freed slots once nothing is staged. Ids handed out before
    /// are reused afterwards.
    fn reclaim_slots(&mut self) {
        if self.node(self.root()).is_some_and(DirectoryNode::is_empty) {
            self.directories.truncate(1);
            self.files.clear();
        }
    }

    fn remove_if_empty(&mut self, from: DirectoryId) {
        let mut current = from;
        loop {
            let Some(node) = self.node(current) else {
                return;
            };
            let Some(parent) = node.parent else {
                return;
            };
            if !node.is_empty() {
                return;
            }
            self.free_directory(current, parent);
            current = parent;
        }
    }

    fn free_directory(&mut self, id: DirectoryId, parent: DirectoryId) {
        if let Some(parent_node) = self.node_mut(parent) {
            parent_node.directories.retain(|(_, child)| *child != id);
        }
        if let Some(mut node) = self.directories.get_mut(id.0).and_then(Option::take) {
            if let Some(callback) = node.callbacks.removed.as_mut() {
                callback();
            }
        }
    }

    /// Remove a directory with everything it contains.
    ///
    /// Removing the root empties it but keeps it.
    pub fn remove_directory(&mut self, id: DirectoryId) {
        let Some(node) = self.node(id) else {
            return;
        };
        let parent = node.parent;

        // Children before parents.
        let mut order = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            order.push(current);
            if let Some(node) = self.node(current) {
                stack.extend(node.directories.iter().map(|(_, child)| *child));
            }
        }
        order.reverse();

        for directory in order {
            let files = self
                .node(directory)
                .map(|node| node.files.clone())
                .unwrap_or_default();
            for file in files.into_iter().rev() {
                self.detach_file(file);
            }
            if let Some(owner) = self.node(directory).and_then(|node| node.parent) {
                self.free_directory(directory, owner);
            }
        }

        if let Some(parent) = parent {
            self.remove_if_empty(parent);
        }
        self.reclaim_slots();
    }

    /// Remove every staged file and directory, keeping the root.
    pub fn clear(&mut self) {
        let root = self.root();
        self.remove_directory(root);
    }

    /// First file in depth-first order: a directory's own files come before
    /// its subdirectories, which are visited in insertion order.
    pub fn get_random_file(&self) -> Option<StagedFileId> {
        let mut stack = vec![self.root()];
        while let Some(current) = stack.pop() {
            let Some(node) = self.node(current) else {
                continue;
            };
            if let Some(file) = node.files.first() {
                return Some(*file);
            }
            stack.extend(node.directories.iter().rev().map(|(_, child)| *child));
        }
        None
    }

    pub fn file(&self, id: StagedFileId) -> Option<&StagingFile> {
        self.entry(id).map(|entry| &entry.file)
    }

    pub fn file_directory(&self, id: StagedFileId) -> Option<DirectoryId> {
        self.entry(id).map(|entry| entry.directory)
    }

    /// Path of a staged file, `/a/b/name` style.
    pub fn file_path(&self, id: StagedFileId) -> Option<String> {
        let entry = self.entry(id)?;
        Some(format!("{}{}", self.absolute_path(entry.directory)?, entry.file.name))
    }

    /// Path of a directory, `/a/b/` style. The root is `/`.
    pub fn absolute_path(&self, id: DirectoryId) -> Option<String> {
        let mut names = Vec::new();
        let mut current = self.node(id)?;
        while let Some(parent) = current.parent {
            names.push(current.name.as_str());
            current = self.node(parent)?;
        }
        let mut path = String::from("/");
        for name in names.iter().rev() {
            path.push_str(name);
            path.push('/');
        }
        Some(path)
    }

    /// Names of the directories between the root and `id`.
    pub fn directory_names(&self, id: DirectoryId) -> Vec<String> {
        let mut names = Vec::new();
        let mut current = self.node(id);
        while let Some(node) = current {
            if node.parent.is_none() {
                break;
            }
            names.push(node.name.clone());
            current = node.parent.and_then(|parent| self.node(parent));
        }
        names.reverse();
        names
    }

    pub fn directory_name(&self, id: DirectoryId) -> Option<&str> {
        self.node(id).map(|node| node.name.as_str())
    }

    pub fn parent(&self, id: DirectoryId) -> Option<DirectoryId> {
        self.node(id)?.parent
    }

    pub fn subdirectories(&self, id: DirectoryId) -> Vec<DirectoryId> {
        self.node(id)
            .map(|node| node.directories.iter().map(|(_, child)| *child).collect())
            .unwrap_or_default()
    }

    pub fn files_in(&self, id: DirectoryId) -> Vec<StagedFileId> {
        self.node(id).map(|node| node.files.clone()).unwrap_or_default()
    }

    /// Total size and file count below a directory.
    pub fn stats(&self, id: DirectoryId) -> Option<ContentStats> {
        self.node(id).map(|node| node.stats)
    }

    pub fn is_empty(&self) -> bool {
        self.stats(self.root()).map_or(true, |stats| stats.count == 0)
    }

    /// Server directory this staged directory uploads into, once known.
    pub fn remote_directory(&self, id: DirectoryId) -> Option<ObjectId> {
        self.node(id)?.remote_directory
    }

    pub fn set_remote_directory(&mut self, id: DirectoryId, remote: ObjectId) {
        if let Some(node) = self.node_mut(id) {
            node.remote_directory = Some(remote);
        }
    }

    pub fn on_stats_updated(&mut self, id: DirectoryId, callback: impl FnMut(ContentStats) + Send + 'static) {
        if let Some(node) = self.node_mut(id) {
            node.callbacks.stats_updated = Some(Box::new(callback));
        }
    }

    pub fn on_directory_added(&mut self, id: DirectoryId, callback: impl FnMut(DirectoryId) + Send + 'static) {
        if let Some(node) = self.node_mut(id) {
            node.callbacks.directory_added = Some(Box::new(callback));
        }
    }

    pub fn on_file_added(&mut self, id: DirectoryId, callback: impl FnMut(StagedFileId) + Send + 'static) {
        if let Some(node) = self.node_mut(id) {
            node.callbacks.file_added = Some(Box::new(callback));
        }
    }

    pub fn on_directory_removed(&mut self, id: DirectoryId, callback: impl FnMut() + Send + 'static) {
        if let Some(node) = self.node_mut(id) {
            node.callbacks.removed = Some(Box::new(callback));
        }
    }

    pub fn on_file_removed(&mut self, id: StagedFileId, callback: impl FnMut() + Send + 'static) {
        if let Some(entry) = self.files.get_mut(id.0).and_then(Option::as_mut) {
            entry.on_removed = Some(Box::new(callback));
        }
    }

    /// Stage one file from disk under `relative_dir`.
    pub async fn add_local_path(&mut self, path: impl AsRef<Path>, relative_dir: &str) -> Result<Option<StagedFileId>> {
        let file = StagingFile::from_path(path).await?;
        Ok(self.add_file(file, relative_dir))
    }

    /// Stage every file below a local directory.
    ///
    /// The directory itself becomes a top-level staged directory, like a
    /// folder dropped onto the upload area. Returns the number of staged
    /// files; empty files are skipped.
    pub async fn add_local_tree(&mut self, root: impl AsRef<Path>) -> Result<usize> {
        let root = root.as_ref();
        let top = root
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut staged = 0;
        let mut pending = vec![(root.to_path_buf(), format!("/{}", top))];
        while let Some((dir, relative)) = pending.pop() {
            let mut entries = Vec::new();
            let mut reader = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = reader.next_entry().await? {
                entries.push(entry);
            }
            entries.sort_by_key(|entry| entry.file_name());

            let mut subdirectories = Vec::new();
            for entry in entries {
                let file_type = entry.file_type().await?;
                let name = entry.file_name().to_string_lossy().into_owned();
                if file_type.is_dir() {
                    subdirectories.push((entry.path(), format!("{}/{}", relative, name)));
                } else if file_type.is_file() {
                    match self.add_local_path(entry.path(), &relative).await {
                        Ok(Some(_)) => staged += 1,
                        Ok(None) => {}
                        Err(e) => warn!(path = %entry.path().display(), error = %e, "cannot stage file"),
                    }
                }
            }
            pending.extend(subdirectories.into_iter().rev());
        }
        Ok(staged)
    }
}

impl std::fmt::Debug for StagingFilesystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagingFilesystem")
            .field("stats", &self.stats(self.root()))
            .finish()
    }
}
