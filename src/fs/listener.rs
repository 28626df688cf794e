//! Change listeners attached to cached directories.
//!
//! A [`Subscription`] watches the direct children of one directory (or of the
//! repository root) and owns three optional callbacks. Dropping the
//! subscription unregisters it.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use super::object::ObjectId;

/// Callback receiving the id of the child that changed.
pub type ObjectCallback = Box<dyn FnMut(ObjectId) + Send>;

/// Directory watched by a listener, `None` for the repository root.
pub(crate) type ListenerTarget = Option<ObjectId>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ObjectEvent {
    Added,
    Updated,
    Removed,
}

#[derive(Default)]
struct ListenerSlots {
    on_add: Option<ObjectCallback>,
    on_update: Option<ObjectCallback>,
    on_remove: Option<ObjectCallback>,
}

type SharedSlots = Arc<Mutex<ListenerSlots>>;

#[derive(Default)]
pub(crate) struct ListenerRegistry {
    next_id: u64,
    targets: HashMap<ListenerTarget, BTreeMap<u64, SharedSlots>>,
}

pub(crate) type SharedRegistry = Arc<Mutex<ListenerRegistry>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ListenerRegistry {
    fn register(&mut self, target: ListenerTarget) -> (u64, SharedSlots) {
        self.next_id += 1;
        let slots = SharedSlots::default();
        self.targets
            .entry(target)
            .or_default()
            .insert(self.next_id, Arc::clone(&slots));
        (self.next_id, slots)
    }

    fn unregister(&mut self, target: ListenerTarget, id: u64) {
        if let Some(listeners) = self.targets.get_mut(&target) {
            listeners.remove(&id);
            if listeners.is_empty() {
                self.targets.remove(&target);
            }
        }
    }

    /// Forget every listener of a directory that left the cache.
    pub(crate) fn drop_target(&mut self, target: ListenerTarget) {
        self.targets.remove(&target);
    }

    /// Forget every listener except the root ones.
    pub(crate) fn retain_root(&mut self) {
        self.targets.retain(|target, _| target.is_none());
    }

    #[cfg(test)]
    pub(crate) fn count(&self, target: ListenerTarget) -> usize {
        self.targets.get(&target).map_or(0, BTreeMap::len)
    }
}

pub(crate) fn new_registry() -> SharedRegistry {
    Arc::new(Mutex::new(ListenerRegistry::default()))
}

pub(crate) fn subscribe(registry: &SharedRegistry, target: ListenerTarget) -> Subscription {
    let (id, slots) = lock(registry).register(target);
    Subscription {
        registry: Arc::downgrade(registry),
        target,
        id,
        slots,
    }
}

/// Invoke the matching callback of every listener on `target`.
///
/// The registry lock is released before any callback runs, so callbacks may
/// create or drop subscriptions.
pub(crate) fn dispatch(registry: &SharedRegistry, target: ListenerTarget, event: ObjectEvent, object: ObjectId) {
    let handles: Vec<SharedSlots> = match lock(registry).targets.get(&target) {
        Some(listeners) => listeners.values().cloned().collect(),
        None => return,
    };
    for handle in handles {
        let mut slots = lock(&handle);
        let callback = match event {
            ObjectEvent::Added => slots.on_add.as_mut(),
            ObjectEvent::Updated => slots.on_update.as_mut(),
            ObjectEvent::Removed => slots.on_remove.as_mut(),
        };
        if let Some(callback) = callback {
            callback(object);
        }
    }
}

/// Handle on a directory listener.
///
/// Callbacks run synchronously while the cache is being mutated; they must not
/// set callbacks on the subscription that is currently being notified.
pub struct Subscription {
    registry: Weak<Mutex<ListenerRegistry>>,
    target: ListenerTarget,
    id: u64,
    slots: SharedSlots,
}

impl Subscription {
    /// Watched directory, `None` for the root.
    pub fn target(&self) -> Option<ObjectId> {
        self.target
    }

    pub fn on_add_object(&self, callback: impl FnMut(ObjectId) + Send + 'static) {
        lock(&self.slots).on_add = Some(Box::new(callback));
    }

    pub fn on_update_object(&self, callback: impl FnMut(ObjectId) + Send + 'static) {
        lock(&self.slots).on_update = Some(Box::new(callback));
    }

    pub fn on_remove_object(&self, callback: impl FnMut(ObjectId) + Send + 'static) {
        lock(&self.slots).on_remove = Some(Box::new(callback));
    }

    /// Unregister now instead of waiting for the handle to drop.
    pub fn destroy(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).unregister(self.target, self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("target", &self.target)
            .field("id", &self.id)
            .finish()
    }
}
