//! Insertion-ordered handler lists with precise removal.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

/// A registered callback.
pub type Handler<A> = Arc<dyn Fn(&A) + Send + Sync>;

struct Entries<A: ?Sized + 'static> {
    next_id: u64,
    handlers: Vec<(u64, Handler<A>)>,
}

impl<A: ?Sized + 'static> Default for Entries<A> {
    fn default() -> Self {
        Self {
            next_id: 0,
            handlers: Vec::new(),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A handler that panicked mid-registration leaves the list intact.
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Handlers for one kind of notification, fired in registration order.
///
/// Emission works on a snapshot of the list, so handlers may add or remove
/// registrations (including their own) while being called.
pub struct HandlerSet<A: ?Sized + 'static> {
    entries: Arc<Mutex<Entries<A>>>,
}

impl<A: ?Sized + 'static> Default for HandlerSet<A> {
    fn default() -> Self {
        Self {
            entries: Arc::new(Mutex::new(Entries::default())),
        }
    }
}

impl<A: ?Sized + 'static> Clone for HandlerSet<A> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<A: ?Sized + 'static> fmt::Debug for HandlerSet<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerSet").field("len", &self.len()).finish()
    }
}

impl<A: ?Sized + 'static> HandlerSet<A> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, handler: impl Fn(&A) + Send + Sync + 'static) -> Subscription {
        self.add_arc(Arc::new(handler))
    }

    pub fn add_arc(&self, handler: Handler<A>) -> Subscription {
        let id = {
            let mut entries = lock(&self.entries);
            let id = entries.next_id;
            entries.next_id += 1;
            entries.handlers.push((id, handler));
            id
        };

        let weak: Weak<Mutex<Entries<A>>> = Arc::downgrade(&self.entries);
        Subscription::new(move || {
            if let Some(entries) = weak.upgrade() {
                lock(&entries).handlers.retain(|(entry, _)| *entry != id);
            }
        })
    }

    /// Call every handler with `arg`. Returns how many were called.
    pub fn emit(&self, arg: &A) -> usize {
        let snapshot: Vec<Handler<A>> = lock(&self.entries)
            .handlers
            .iter()
            .map(|(_, handler)| handler.clone())
            .collect();
        for handler in &snapshot {
            handler(arg);
        }
        snapshot.len()
    }

    pub fn clear(&self) {
        lock(&self.entries).handlers.clear();
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Type-keyed handler lists: the subscription registry of a connection.
pub struct KeyedHandlers<A: ?Sized + 'static> {
    sets: Mutex<HashMap<String, HandlerSet<A>>>,
}

impl<A: ?Sized + 'static> Default for KeyedHandlers<A> {
    fn default() -> Self {
        Self {
            sets: Mutex::new(HashMap::new()),
        }
    }
}

impl<A: ?Sized + 'static> KeyedHandlers<A> {
    pub fn add(&self, key: &str, handler: impl Fn(&A) + Send + Sync + 'static) -> Subscription {
        let set = lock(&self.sets).entry(key.to_string()).or_default().clone();
        set.add(handler)
    }

    /// Call the handlers registered under `key`, in order.
    pub fn emit(&self, key: &str, arg: &A) -> usize {
        let set = lock(&self.sets).get(key).cloned();
        set.map_or(0, |set| set.emit(arg))
    }

    /// Drop every registration. Outstanding [`Subscription`]s become no-ops.
    pub fn clear(&self) {
        let sets: Vec<HandlerSet<A>> = lock(&self.sets).drain().map(|(_, set)| set).collect();
        for set in sets {
            set.clear();
        }
    }

    pub fn len(&self, key: &str) -> usize {
        lock(&self.sets).get(key).map_or(0, HandlerSet::len)
    }

    /// Registrations across all keys.
    pub fn total(&self) -> usize {
        lock(&self.sets).values().map(HandlerSet::len).sum()
    }
}

/// Registration handle returned by every `subscribe`/`on_*` call.
///
/// Dropping it removes the registration; call [`Subscription::detach`] to
/// keep the handler for the lifetime of its registry instead.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    remove: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    fn new(remove: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            remove: Some(Box::new(remove)),
        }
    }

    /// Remove exactly this registration.
    pub fn unsubscribe(mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }

    /// Leave the handler registered.
    pub fn detach(mut self) {
        self.remove = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.remove.is_some())
            .finish()
    }
}
