//! Client-side cache of a repository's files and directories.
//!
//! The cache is a flat id map plus a parent to children index. Every directory
//! carries the recursive size and file count of its content, kept up to date
//! incrementally on each insert and removal by walking the parent chain.
//! Objects whose parent is unknown are treated as roots until the parent
//! arrives.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{debug, warn};

use super::listener::{self, ObjectEvent, SharedRegistry, Subscription};
use super::object::{ObjectId, ObjectKind, RemoteObject};

/// Recursive size and file count of an object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContentStats {
    pub count: u64,
    pub size: u64,
}

impl ContentStats {
    fn add(&mut self, other: ContentStats) {
        self.count += other.count;
        self.size += other.size;
    }

    fn sub(&mut self, other: ContentStats) {
        self.count = self.count.saturating_sub(other.count);
        self.size = self.size.saturating_sub(other.size);
    }
}

/// Insertion-ordered set of child ids.
#[derive(Debug, Default, Clone)]
struct Children {
    order: Vec<ObjectId>,
    members: HashSet<ObjectId>,
}

impl Children {
    fn insert(&mut self, id: ObjectId) -> bool {
        if self.members.insert(id) {
            self.order.push(id);
            true
        } else {
            false
        }
    }

    fn remove(&mut self, id: ObjectId) -> bool {
        if self.members.remove(&id) {
            self.order.retain(|child| *child != id);
            true
        } else {
            false
        }
    }

    fn iter(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.order.iter().copied()
    }
}

#[derive(Debug, Default)]
struct ObjectMetadata {
    children: Children,
    stats: ContentStats,
}

#[derive(Debug, Default)]
struct RootCache {
    dirty: bool,
    roots: Vec<ObjectId>,
}

/// In-memory model of a remote repository tree.
pub struct Filesystem {
    name: String,
    content: BTreeMap<ObjectId, RemoteObject>,
    metadata: HashMap<ObjectId, ObjectMetadata>,
    root: ObjectMetadata,
    roots: RefCell<RootCache>,
    listeners: SharedRegistry,
}

impl Filesystem {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: BTreeMap::new(),
            metadata: HashMap::new(),
            root: ObjectMetadata::default(),
            roots: RefCell::new(RootCache {
                dirty: true,
                roots: Vec::new(),
            }),
            listeners: listener::new_registry(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Insert an object, replacing any previous version with the same id.
    ///
    /// Listeners of the parent receive `on_add_object` for a new id and
    /// `on_update_object` for a replacement under the same parent. A
    /// replacement under another parent is reported as a removal from the old
    /// parent followed by an addition to the new one.
    pub fn add_object(&mut self, object: RemoteObject) {
        let id = object.id;
        let parent = object.parent_item;
        if parent == Some(id) {
            warn!(%id, "object is its own parent, ignored");
            return;
        }

        let previous_parent = self.content.get(&id).map(|previous| previous.parent_item);
        if let Some(old_parent) = previous_parent {
            let contribution = self.contribution(id);
            self.propagate(old_parent, contribution, ContentStats::sub);
            if old_parent != parent {
                self.children_of(old_parent).remove(id);
                listener::dispatch(&self.listeners, old_parent, ObjectEvent::Removed, id);
            }
        }

        let meta = self.metadata.entry(id).or_default();
        if let ObjectKind::File { size, .. } = object.kind {
            meta.stats = ContentStats { count: 1, size };
        }
        let contribution = meta.stats;

        self.children_of(parent).insert(id);
        self.content.insert(id, object);
        self.propagate(parent, contribution, ContentStats::add);
        self.roots.get_mut().dirty = true;

        let event = if previous_parent == Some(parent) {
            ObjectEvent::Updated
        } else {
            ObjectEvent::Added
        };
        listener::dispatch(&self.listeners, parent, event, id);
    }

    /// Remove an object from the cache.
    ///
    /// With `only_dereference` the object leaves the content map and its
    /// parent, but its metadata and children stay so it can be re-added
    /// elsewhere. Otherwise every descendant is removed as well.
    pub fn remove_object(&mut self, id: ObjectId, only_dereference: bool) {
        let Some(parent) = self.content.get(&id).map(|object| object.parent_item) else {
            debug!(%id, "remove of unknown object");
            return;
        };

        let contribution = self.contribution(id);
        self.propagate(parent, contribution, ContentStats::sub);

        if !only_dereference {
            for descendant in self.descendants_post_order(id) {
                let Some(object) = self.content.remove(&descendant) else {
                    continue;
                };
                self.children_of(object.parent_item).remove(descendant);
                listener::dispatch(&self.listeners, object.parent_item, ObjectEvent::Removed, descendant);
                self.forget(descendant);
            }
        }

        self.children_of(parent).remove(id);
        self.content.remove(&id);
        self.roots.get_mut().dirty = true;
        listener::dispatch(&self.listeners, parent, ObjectEvent::Removed, id);
        if !only_dereference {
            self.forget(id);
        }
    }

    /// Drop every object. Root listeners survive, others are released.
    pub fn clear(&mut self) {
        self.content.clear();
        self.metadata.clear();
        self.root = ObjectMetadata::default();
        self.roots.get_mut().dirty = true;
        lock_registry(&self.listeners).retain_root();
    }

    pub fn get_object_data(&self, id: ObjectId) -> Option<&RemoteObject> {
        self.content.get(&id)
    }

    /// Objects without a known parent.
    pub fn get_roots(&self) -> Vec<ObjectId> {
        let mut cache = self.roots.borrow_mut();
        if cache.dirty {
            cache.roots = self
                .content
                .values()
                .filter(|object| match object.parent_item {
                    None => true,
                    Some(parent) => !self.content.contains_key(&parent),
                })
                .map(|object| object.id)
                .collect();
            cache.dirty = false;
        }
        cache.roots.clone()
    }

    /// Direct children of a directory, or the roots for `None`.
    pub fn get_objects_in_directory(&self, parent: Option<ObjectId>) -> Vec<ObjectId> {
        match parent {
            None => self.get_roots(),
            Some(id) => self
                .metadata
                .get(&id)
                .map(|meta| meta.children.iter().collect())
                .unwrap_or_default(),
        }
    }

    /// Every descendant of a directory, matched on the server path.
    ///
    /// `None` returns every cached object. Files and unknown ids have no
    /// descendants.
    pub fn get_objects_in_directory_recursive(&self, parent: Option<ObjectId>) -> Vec<ObjectId> {
        let Some(parent) = parent else {
            return self.content.keys().copied().collect();
        };
        let Some(directory) = self.content.get(&parent) else {
            return Vec::new();
        };
        if directory.is_regular_file() {
            return Vec::new();
        }

        let base = directory.absolute_path.plain();
        if base.trim_matches('/').is_empty() {
            return self.walk_children(parent);
        }
        let prefix = if base.ends_with('/') {
            base
        } else {
            format!("{}/", base)
        };
        self.content
            .values()
            .filter(|object| object.id != parent && object.absolute_path.plain().starts_with(&prefix))
            .map(|object| object.id)
            .collect()
    }

    /// Descendants reached through the children index, for directories
    /// without a usable server path.
    fn walk_children(&self, parent: ObjectId) -> Vec<ObjectId> {
        let mut seen = HashSet::from([parent]);
        let mut found = Vec::new();
        let mut pending = vec![parent];
        while let Some(current) = pending.pop() {
            let Some(meta) = self.metadata.get(&current) else {
                continue;
            };
            for child in meta.children.iter() {
                if seen.insert(child) {
                    found.push(child);
                    pending.push(child);
                }
            }
        }
        found
    }

    /// Direct child of `parent` whose decoded name is `name`.
    pub fn find_child(&self, parent: Option<ObjectId>, name: &str) -> Option<ObjectId> {
        let candidates = match parent {
            None => self.root.children.iter().collect::<Vec<_>>(),
            Some(id) => self.metadata.get(&id)?.children.iter().collect(),
        };
        candidates.into_iter().find(|child| {
            self.content
                .get(child)
                .is_some_and(|object| object.name.plain() == name)
        })
    }

    /// Resolve a `/`-separated path of decoded names from the root.
    pub fn get_object_from_path(&self, path: &str) -> Option<ObjectId> {
        let mut current = None;
        let mut found = false;
        for segment in path.split('/').filter(|segment| !segment.is_empty()) {
            current = Some(self.find_child(current, segment)?);
            found = true;
        }
        if found {
            current
        } else {
            None
        }
    }

    /// Ids from the outermost known ancestor down to `id`.
    pub fn make_path_to_object(&self, id: ObjectId) -> Vec<ObjectId> {
        let mut path = Vec::new();
        let mut current = Some(id);
        while let Some(object) = current.and_then(|cursor| self.content.get(&cursor)) {
            if path.len() > self.content.len() {
                warn!(%id, "parent cycle detected");
                break;
            }
            path.push(object.id);
            current = object.parent_item;
        }
        path.reverse();
        path
    }

    /// Decoded path of `id`, `/a/b/` style. The root is `/`.
    pub fn make_string_path_to_object(&self, id: Option<ObjectId>) -> String {
        let Some(id) = id else {
            return "/".to_string();
        };
        let mut path = String::from("/");
        for step in self.make_path_to_object(id) {
            if let Some(object) = self.content.get(&step) {
                path.push_str(&object.name.plain());
                path.push('/');
            }
        }
        path
    }

    /// Recursive stats of an object, or of the whole repository for `None`.
    pub fn get_object_content_stats(&self, id: Option<ObjectId>) -> Option<ContentStats> {
        match id {
            None => Some(self.root.stats),
            Some(id) => self.metadata.get(&id).map(|meta| meta.stats),
        }
    }

    /// Watch the children of a directory, or of the root for `None`.
    ///
    /// Returns `None` when the directory is not cached.
    pub fn create_listener(&self, parent: Option<ObjectId>) -> Option<Subscription> {
        if let Some(id) = parent {
            if !self.metadata.contains_key(&id) {
                return None;
            }
        }
        Some(listener::subscribe(&self.listeners, parent))
    }

    fn contribution(&self, id: ObjectId) -> ContentStats {
        self.metadata.get(&id).map(|meta| meta.stats).unwrap_or_default()
    }

    fn children_of(&mut self, parent: Option<ObjectId>) -> &mut Children {
        match parent {
            None => &mut self.root.children,
            Some(id) => &mut self.metadata.entry(id).or_default().children,
        }
    }

    // Walks up from `start` applying `op`. A parentless ancestor forwards the
    // delta to the root; an unknown ancestor stops the walk, so orphans only
    // reach the root totals once their parent is cached.
    fn propagate(&mut self, start: Option<ObjectId>, delta: ContentStats, op: fn(&mut ContentStats, ContentStats)) {
        let mut current = start;
        let mut steps = 0usize;
        loop {
            let Some(id) = current else {
                op(&mut self.root.stats, delta);
                return;
            };
            if let Some(meta) = self.metadata.get_mut(&id) {
                op(&mut meta.stats, delta);
            }
            let Some(object) = self.content.get(&id) else {
                return;
            };
            current = object.parent_item;

            steps += 1;
            if steps > self.content.len() {
                warn!(%id, "parent cycle detected while updating stats");
                return;
            }
        }
    }

    fn descendants_post_order(&self, id: ObjectId) -> Vec<ObjectId> {
        let mut order = Vec::new();
        let mut visited = HashSet::from([id]);
        let mut stack = vec![(id, false)];
        while let Some((current, expanded)) = stack.pop() {
            if expanded {
                if current != id {
                    order.push(current);
                }
                continue;
            }
            stack.push((current, true));
            if let Some(meta) = self.metadata.get(&current) {
                for child in meta.children.iter() {
                    if visited.insert(child) {
                        stack.push((child, false));
                    }
                }
            }
        }
        order
    }

    fn forget(&mut self, id: ObjectId) {
        self.metadata.remove(&id);
        lock_registry(&self.listeners).drop_target(Some(id));
    }
}

fn lock_registry(
    registry: &SharedRegistry,
) -> std::sync::MutexGuard<'_, listener::ListenerRegistry> {
    registry.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl std::fmt::Debug for Filesystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Filesystem")
            .field("name", &self.name)
            .field("objects", &self.content.len())
            .field("stats", &self.root.stats)
            .finish()
    }
}
