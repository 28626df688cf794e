//! Filtered and sorted views of a cached directory.

use std::cmp::Ordering;

use super::cache::Filesystem;
use super::object::{ObjectId, RemoteObject};

/// Ordering applied to files. Directories are always listed first, by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Name,
    /// Largest first.
    Size,
    /// Oldest first.
    Date,
    /// By mimetype.
    Type,
}

/// How a directory is turned into a listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryFilter {
    name_filter: String,
    files_recursive: bool,
    sort: SortKey,
    reverse: bool,
}

fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| a.cmp(b))
}

impl DirectoryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sorted_by(mut self, sort: SortKey) -> Self {
        self.sort = sort;
        self
    }

    pub fn reversed(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    /// Keep only entries whose name contains `filter`, ignoring case.
    pub fn set_name_filter(&mut self, filter: &str) {
        self.name_filter = filter.to_lowercase();
    }

    /// List direct subdirectories plus every file below the directory.
    pub fn only_files_recursive(&mut self, enable: bool) {
        self.files_recursive = enable;
    }

    pub fn is_files_recursive(&self) -> bool {
        self.files_recursive
    }

    pub fn sort_key(&self) -> SortKey {
        self.sort
    }

    fn collect<'a>(&self, fs: &'a Filesystem, parent: Option<ObjectId>) -> Vec<&'a RemoteObject> {
        let lookup = move |ids: Vec<ObjectId>| -> Vec<&'a RemoteObject> {
            ids.into_iter().filter_map(|id| fs.get_object_data(id)).collect()
        };

        let mut content = if self.files_recursive {
            let mut content: Vec<_> = lookup(fs.get_objects_in_directory(parent))
                .into_iter()
                .filter(|object| !object.is_regular_file())
                .collect();
            content.extend(
                lookup(fs.get_objects_in_directory_recursive(parent))
                    .into_iter()
                    .filter(|object| object.is_regular_file()),
            );
            content
        } else {
            lookup(fs.get_objects_in_directory(parent))
        };

        if !self.name_filter.is_empty() {
            content.retain(|object| object.name.plain().to_lowercase().contains(&self.name_filter));
        }
        content
    }

    fn compare_files(&self, a: &RemoteObject, b: &RemoteObject) -> Ordering {
        let by_name = || compare_names(&a.name.plain(), &b.name.plain());
        match self.sort {
            SortKey::Name => by_name(),
            SortKey::Size => b.size().cmp(&a.size()).then_with(by_name),
            SortKey::Date => a.timestamp().cmp(&b.timestamp()).then_with(by_name),
            SortKey::Type => {
                let mimetype = |object: &RemoteObject| object.mimetype().map(|m| m.plain()).unwrap_or_default();
                mimetype(a).cmp(&mimetype(b)).then_with(by_name)
            }
        }
    }

    /// Sorted ids of the entries shown for `parent`, directories first.
    pub fn directory_content(&self, fs: &Filesystem, parent: Option<ObjectId>) -> Vec<ObjectId> {
        self.listing(fs, parent).ids().collect()
    }

    pub fn listing(&self, fs: &Filesystem, parent: Option<ObjectId>) -> DirectoryListing {
        let (mut directories, mut files): (Vec<_>, Vec<_>) = self
            .collect(fs, parent)
            .into_iter()
            .partition(|object| !object.is_regular_file());

        directories.sort_by(|a, b| compare_names(&a.name.plain(), &b.name.plain()));
        files.sort_by(|a, b| self.compare_files(a, b));
        if self.reverse {
            directories.reverse();
            files.reverse();
        }

        let entries = directories
            .into_iter()
            .map(|object| (object.id, false))
            .chain(files.into_iter().map(|object| (object.id, true)))
            .collect();
        DirectoryListing { directory: parent, entries }
    }
}

/// Ordered snapshot of a directory as displayed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryListing {
    directory: Option<ObjectId>,
    // (id, is_regular_file)
    entries: Vec<(ObjectId, bool)>,
}

impl DirectoryListing {
    pub fn directory(&self) -> Option<ObjectId> {
        self.directory
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.entries.iter().map(|(id, _)| *id)
    }

    pub fn item_index(&self, id: ObjectId) -> Option<usize> {
        self.entries.iter().position(|(entry, _)| *entry == id)
    }

    pub fn item_at(&self, index: usize) -> Option<ObjectId> {
        self.entries.get(index).map(|(id, _)| *id)
    }

    /// Next entry after `id`, wrapping around. Without a known `id` the first
    /// entry is returned.
    pub fn item_after(&self, id: Option<ObjectId>, only_files: bool) -> Option<ObjectId> {
        let len = self.entries.len();
        let Some(index) = id.and_then(|id| self.item_index(id)) else {
            return self.item_at(0);
        };
        (1..=len)
            .map(|step| self.entries[(index + step) % len])
            .find(|(_, is_file)| !only_files || *is_file)
            .map(|(id, _)| id)
    }

    /// Previous entry before `id`, wrapping around. Without a known `id` the
    /// last entry is returned.
    pub fn item_before(&self, id: Option<ObjectId>, only_files: bool) -> Option<ObjectId> {
        let len = self.entries.len();
        let Some(index) = id.and_then(|id| self.item_index(id)) else {
            return len.checked_sub(1).and_then(|last| self.item_at(last));
        };
        (1..=len)
            .map(|step| self.entries[(index + len - step) % len])
            .find(|(_, is_file)| !only_files || *is_file)
            .map(|(id, _)| id)
    }
}
