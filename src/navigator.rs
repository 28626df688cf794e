//! Current directory, selection and clipboard of a repository view.

use tracing::debug;

use crate::api::RepositoryClient;
use crate::error::Result;
use crate::fs::{DirectoryListing, Filesystem, ObjectId};

type SelectionCallback = Box<dyn FnMut(&[ObjectId]) + Send>;
type ObjectCallback = Box<dyn FnMut(Option<ObjectId>) + Send>;

/// Tracks what the user looks at and has selected.
#[derive(Default)]
pub struct Navigator {
    current_directory: Option<ObjectId>,
    // In selection order.
    selected: Vec<ObjectId>,
    anchor: Option<ObjectId>,
    hover: Option<ObjectId>,
    history: Vec<Option<ObjectId>>,
    clipboard: Vec<ObjectId>,
    on_selection_changed: Option<SelectionCallback>,
    on_hover_changed: Option<ObjectCallback>,
    on_directory_changed: Option<ObjectCallback>,
}

impl Navigator {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` is the repository root.
    pub fn current_directory(&self) -> Option<ObjectId> {
        self.current_directory
    }

    pub fn selected(&self) -> &[ObjectId] {
        &self.selected
    }

    pub fn is_selected(&self, id: ObjectId) -> bool {
        self.selected.contains(&id)
    }

    pub fn anchor(&self) -> Option<ObjectId> {
        self.anchor
    }

    pub fn hover(&self) -> Option<ObjectId> {
        self.hover
    }

    pub fn clipboard(&self) -> &[ObjectId] {
        &self.clipboard
    }

    pub fn on_selection_changed(&mut self, callback: impl FnMut(&[ObjectId]) + Send + 'static) {
        self.on_selection_changed = Some(Box::new(callback));
    }

    pub fn on_hover_changed(&mut self, callback: impl FnMut(Option<ObjectId>) + Send + 'static) {
        self.on_hover_changed = Some(Box::new(callback));
    }

    pub fn on_directory_changed(&mut self, callback: impl FnMut(Option<ObjectId>) + Send + 'static) {
        self.on_directory_changed = Some(Box::new(callback));
    }

    fn selection_changed(&mut self) {
        if let Some(callback) = self.on_selection_changed.as_mut() {
            callback(&self.selected);
        }
    }

    fn add_to_selection(&mut self, id: ObjectId) {
        if !self.selected.contains(&id) {
            self.selected.push(id);
        }
    }

    /// Apply a click on `id`.
    ///
    /// With `shift` every entry of `listing` between the anchor and `id` is
    /// selected, keeping the anchor. With `ctrl` the entry is toggled, and a
    /// shift range is added to the selection instead of replacing it. A plain
    /// click selects only `id`.
    pub fn select_item(&mut self, id: ObjectId, shift: bool, ctrl: bool, listing: &DirectoryListing) {
        let range = self
            .anchor
            .filter(|_| shift)
            .and_then(|anchor| Some((listing.item_index(anchor)?, listing.item_index(id)?)));

        match range {
            Some((from, to)) => {
                if !ctrl {
                    self.selected.clear();
                }
                let (from, to) = (from.min(to), from.max(to));
                for index in from..=to {
                    if let Some(entry) = listing.item_at(index) {
                        self.add_to_selection(entry);
                    }
                }
            }
            None if ctrl => {
                if let Some(position) = self.selected.iter().position(|selected| *selected == id) {
                    self.selected.remove(position);
                } else {
                    self.selected.push(id);
                }
                self.anchor = Some(id);
            }
            None => {
                self.selected.clear();
                self.selected.push(id);
                self.anchor = Some(id);
            }
        }
        self.selection_changed();
    }

    /// Select `id` on top of the current selection.
    pub fn view_item(&mut self, id: ObjectId) {
        self.add_to_selection(id);
        self.anchor = Some(id);
        self.selection_changed();
    }

    pub fn clear_selection(&mut self) {
        if self.selected.is_empty() && self.anchor.is_none() {
            return;
        }
        self.selected.clear();
        self.anchor = None;
        self.selection_changed();
    }

    /// Drop selected and cut ids that left the cache.
    pub fn retain_existing(&mut self, filesystem: &Filesystem) {
        let before = self.selected.len();
        self.selected.retain(|id| filesystem.get_object_data(*id).is_some());
        self.clipboard.retain(|id| filesystem.get_object_data(*id).is_some());
        if self.anchor.is_some_and(|anchor| filesystem.get_object_data(anchor).is_none()) {
            self.anchor = None;
        }
        if self.hover.is_some_and(|hover| filesystem.get_object_data(hover).is_none()) {
            self.set_hover(None);
        }
        if self.selected.len() != before {
            self.selection_changed();
        }
    }

    pub fn set_hover(&mut self, id: Option<ObjectId>) {
        if self.hover == id {
            return;
        }
        self.hover = id;
        if let Some(callback) = self.on_hover_changed.as_mut() {
            callback(id);
        }
    }

    fn enter(&mut self, directory: Option<ObjectId>) {
        self.current_directory = directory;
        self.set_hover(None);
        self.clear_selection();
        if let Some(callback) = self.on_directory_changed.as_mut() {
            callback(directory);
        }
    }

    /// Open `directory`, remembering the current one for [`back`](Self::back).
    pub fn set_current_dir(&mut self, directory: Option<ObjectId>) {
        if self.current_directory == directory {
            return;
        }
        self.history.push(self.current_directory);
        self.enter(directory);
    }

    /// Return to the previously opened directory. Returns false when there is
    /// no history.
    pub fn back(&mut self) -> bool {
        match self.history.pop() {
            Some(previous) => {
                self.enter(previous);
                true
            }
            None => false,
        }
    }

    /// Put the selection in the clipboard. Returns the number of cut items.
    pub fn cut_selection(&mut self) -> usize {
        self.clipboard = self.selected.clone();
        self.clipboard.len()
    }

    /// Move the clipboard under `parent` on the server, then in the cache.
    ///
    /// The clipboard is emptied whether or not the move succeeds.
    pub async fn move_clipboard_to_parent(
        &mut self,
        client: &RepositoryClient,
        filesystem: &mut Filesystem,
        parent: Option<ObjectId>,
    ) -> Result<usize> {
        let items = std::mem::take(&mut self.clipboard);
        if items.is_empty() {
            return Ok(0);
        }
        client.move_items(&items, parent).await?;
        Ok(self.apply_move(filesystem, &items, parent))
    }

    /// Re-parent moved objects in the cache, keeping their children.
    pub(crate) fn apply_move(&mut self, filesystem: &mut Filesystem, items: &[ObjectId], parent: Option<ObjectId>) -> usize {
        let mut moved = 0;
        for id in items {
            let Some(mut object) = filesystem.get_object_data(*id).cloned() else {
                debug!(%id, "moved object is not cached");
                continue;
            };
            filesystem.remove_object(*id, true);
            object.parent_item = parent;
            filesystem.add_object(object);
            moved += 1;
        }
        let before = self.selected.len();
        self.selected.retain(|id| !items.contains(id));
        if self.selected.len() != before {
            self.selection_changed();
        }
        moved
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::config::ClientConfig;
    use crate::fs::{DirectoryFilter, RemoteObject};

    fn filesystem() -> Filesystem {
        let mut fs = Filesystem::new("repo");
        fs.add_object(RemoteObject::directory(1, None, "docs"));
        fs.add_object(RemoteObject::directory(2, None, "music"));
        fs.add_object(RemoteObject::file(3, None, "a.txt", 10));
        fs.add_object(RemoteObject::file(4, None, "b.txt", 20));
        fs.add_object(RemoteObject::file(5, None, "c.txt", 30));
        fs.add_object(RemoteObject::file(6, Some(ObjectId(1)), "inner.txt", 5));
        fs
    }

    fn ids(values: &[i64]) -> Vec<ObjectId> {
        values.iter().map(|v| ObjectId(*v)).collect()
    }

    #[test]
    fn test_click_modifiers() {
        let fs = filesystem();
        let listing = DirectoryFilter::new().listing(&fs, None);
        assert_eq!(listing.ids().collect::<Vec<_>>(), ids(&[1, 2, 3, 4, 5]));
        let mut nav = Navigator::new();

        nav.select_item(ObjectId(2), false, false, &listing);
        assert_eq!(nav.selected(), ids(&[2]).as_slice());

        nav.select_item(ObjectId(4), true, false, &listing);
        assert_eq!(nav.selected(), ids(&[2, 3, 4]).as_slice());
        assert_eq!(nav.anchor(), Some(ObjectId(2)));

        nav.select_item(ObjectId(3), false, true, &listing);
        assert_eq!(nav.selected(), ids(&[2, 4]).as_slice());
        assert_eq!(nav.anchor(), Some(ObjectId(3)));

        nav.select_item(ObjectId(1), true, true, &listing);
        assert_eq!(nav.selected(), ids(&[2, 4, 1, 3]).as_slice());

        nav.select_item(ObjectId(5), false, false, &listing);
        assert_eq!(nav.selected(), ids(&[5]).as_slice());
    }

    #[test]
    fn test_shift_without_anchor_is_plain_click() {
        let fs = filesystem();
        let listing = DirectoryFilter::new().listing(&fs, None);
        let mut nav = Navigator::new();
        nav.select_item(ObjectId(4), true, false, &listing);
        assert_eq!(nav.selected(), ids(&[4]).as_slice());
        nav.view_item(ObjectId(1));
        assert_eq!(nav.selected(), ids(&[4, 1]).as_slice());
    }

    #[test]
    fn test_directory_history() {
        let changes = Arc::new(Mutex::new(Vec::new()));
        let log = changes.clone();
        let mut nav = Navigator::new();
        nav.on_directory_changed(move |dir| log.lock().unwrap().push(dir));

        nav.view_item(ObjectId(3));
        nav.set_hover(Some(ObjectId(3)));
        nav.set_current_dir(Some(ObjectId(1)));
        assert!(nav.selected().is_empty());
        assert_eq!(nav.hover(), None);

        nav.set_current_dir(Some(ObjectId(1)));
        nav.set_current_dir(Some(ObjectId(6)));
        assert!(nav.back());
        assert_eq!(nav.current_directory(), Some(ObjectId(1)));
        assert!(nav.back());
        assert_eq!(nav.current_directory(), None);
        assert!(!nav.back());
        assert_eq!(
            changes.lock().unwrap().as_slice(),
            &[Some(ObjectId(1)), Some(ObjectId(6)), Some(ObjectId(1)), None]
        );
    }

    #[test]
    fn test_callbacks_fire_on_change_only() {
        let hovers = Arc::new(Mutex::new(0));
        let count = hovers.clone();
        let mut nav = Navigator::new();
        nav.on_hover_changed(move |_| *count.lock().unwrap() += 1);
        nav.set_hover(Some(ObjectId(1)));
        nav.set_hover(Some(ObjectId(1)));
        nav.set_hover(None);
        assert_eq!(*hovers.lock().unwrap(), 2);
    }

    #[test]
    fn test_apply_move_keeps_children() {
        let mut fs = filesystem();
        let mut nav = Navigator::new();
        nav.view_item(ObjectId(1));
        nav.view_item(ObjectId(3));
        assert_eq!(nav.cut_selection(), 2);

        let items = nav.clipboard().to_vec();
        assert_eq!(nav.apply_move(&mut fs, &items, Some(ObjectId(2))), 2);

        assert_eq!(fs.get_objects_in_directory(None), ids(&[2, 4, 5]));
        let mut music = fs.get_objects_in_directory(Some(ObjectId(2)));
        music.sort();
        assert_eq!(music, ids(&[1, 3]));
        assert_eq!(fs.get_objects_in_directory(Some(ObjectId(1))), ids(&[6]));
        assert_eq!(fs.get_object_content_stats(Some(ObjectId(2))).unwrap().size, 15);
        assert!(nav.selected().is_empty());
    }

    #[tokio::test]
    async fn test_failed_move_clears_clipboard() {
        let client = RepositoryClient::new(&ClientConfig::new("http://127.0.0.1:9", "repo")).unwrap();
        let mut fs = filesystem();
        let mut nav = Navigator::new();
        nav.view_item(ObjectId(3));
        nav.cut_selection();

        let result = nav.move_clipboard_to_parent(&client, &mut fs, Some(ObjectId(1))).await;
        assert!(result.is_err());
        assert!(nav.clipboard().is_empty());
        assert_eq!(fs.get_object_data(ObjectId(3)).unwrap().parent_item, None);
    }

    #[test]
    fn test_retain_existing() {
        let mut fs = filesystem();
        let mut nav = Navigator::new();
        nav.view_item(ObjectId(3));
        nav.view_item(ObjectId(4));
        nav.cut_selection();
        fs.remove_object(ObjectId(3), false);
        nav.retain_existing(&fs);
        assert_eq!(nav.selected(), ids(&[4]).as_slice());
        assert_eq!(nav.clipboard(), ids(&[4]).as_slice());
    }
}
