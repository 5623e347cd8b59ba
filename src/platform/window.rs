use super::memory::{KeyValueStore, MemoryStore};
use crate::error::StorageError;
use crate::storage::BroadcastRegistry;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::trace;

/// Which storage area of a window an entry or event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageArea {
    /// Shared by every window of an origin; writes notify the other windows.
    Local,
    /// Private to one window.
    Session,
}

/// Notification that a storage entry changed in some other window.
///
/// `key == None` means the whole area was cleared. `new_value == None` means
/// the entry was removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub area: StorageArea,
}

impl StorageEvent {
    /// A local-storage change to `key`.
    pub fn local(key: impl Into<String>, new_value: Option<&str>) -> Self {
        Self {
            key: Some(key.into()),
            old_value: None,
            new_value: new_value.map(str::to_string),
            area: StorageArea::Local,
        }
    }
}

pub type StorageListener = Arc<dyn Fn(&StorageEvent) + Send + Sync>;

/// Handle returned by [`Window::add_storage_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct OriginInner {
    local: Arc<dyn KeyValueStore>,
    windows: Mutex<Vec<Weak<WindowInner>>>,
    next_window: AtomicU64,
}

impl OriginInner {
    fn windows(&self) -> MutexGuard<'_, Vec<Weak<WindowInner>>> {
        self.windows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver `event` to every open window except `source`, in open order.
    fn broadcast(&self, source: u64, event: &StorageEvent) {
        let targets: Vec<_> = {
            let mut windows = self.windows();
            windows.retain(|w| w.strong_count() > 0);
            windows.iter().filter_map(Weak::upgrade).collect()
        };

        for target in targets.into_iter().filter(|w| w.id != source) {
            Window { inner: target }.dispatch_storage_event(event);
        }
    }
}

/// A storage origin: the local storage shared by a set of windows.
///
/// ```
/// use tincan_persist::platform::Origin;
///
/// let origin = Origin::new();
/// let a = origin.open_window();
/// let b = origin.open_window();
///
/// a.local_storage().set_item("theme", "\"dark\"").unwrap();
/// assert_eq!(b.local_storage().get_item("theme").as_deref(), Some("\"dark\""));
/// ```
#[derive(Clone)]
pub struct Origin {
    inner: Arc<OriginInner>,
}

impl Default for Origin {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Origin")
            .field("open_windows", &self.open_windows())
            .finish()
    }
}

impl Origin {
    pub fn new() -> Self {
        Self::with_local_store(Arc::new(MemoryStore::new()))
    }

    /// An origin whose local storage lives in `store`.
    pub fn with_local_store(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            inner: Arc::new(OriginInner {
                local: store,
                windows: Mutex::new(Vec::new()),
                next_window: AtomicU64::new(0),
            }),
        }
    }

    /// Open a new execution context with fresh session storage.
    pub fn open_window(&self) -> Window {
        let id = self.inner.next_window.fetch_add(1, Ordering::SeqCst);
        let inner = Arc::new_cyclic(|weak: &Weak<WindowInner>| WindowInner {
            id,
            origin: Arc::clone(&self.inner),
            session: Arc::new(MemoryStore::new()),
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(0),
            local_registry: Arc::new(BroadcastRegistry::for_window(
                StorageArea::Local,
                WeakWindow(weak.clone()),
            )),
            session_registry: Arc::new(BroadcastRegistry::for_window(
                StorageArea::Session,
                WeakWindow(weak.clone()),
            )),
        });
        self.inner.windows().push(Arc::downgrade(&inner));
        trace!(window = id, "window opened");
        Window { inner }
    }

    /// Number of windows still alive.
    pub fn open_windows(&self) -> usize {
        self.inner
            .windows()
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }
}

struct WindowInner {
    id: u64,
    origin: Arc<OriginInner>,
    session: Arc<dyn KeyValueStore>,
    listeners: Mutex<Vec<(ListenerId, StorageListener)>>,
    next_listener: AtomicU64,
    local_registry: Arc<BroadcastRegistry>,
    session_registry: Arc<BroadcastRegistry>,
}

impl WindowInner {
    fn listeners(&self) -> MutexGuard<'_, Vec<(ListenerId, StorageListener)>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One execution context (a tab) of an [`Origin`].
///
/// Cloning yields another handle to the same window. The window closes when
/// its last handle is dropped.
#[derive(Clone)]
pub struct Window {
    inner: Arc<WindowInner>,
}

impl fmt::Debug for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Window")
            .field("id", &self.inner.id)
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl Window {
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn local_storage(&self) -> StorageHandle {
        self.storage(StorageArea::Local)
    }

    pub fn session_storage(&self) -> StorageHandle {
        self.storage(StorageArea::Session)
    }

    pub fn storage(&self, area: StorageArea) -> StorageHandle {
        StorageHandle {
            area,
            window: Arc::clone(&self.inner),
        }
    }

    /// The broadcast registry serving wide bindings for `area` in this window.
    pub fn broadcast_registry(&self, area: StorageArea) -> Arc<BroadcastRegistry> {
        match area {
            StorageArea::Local => Arc::clone(&self.inner.local_registry),
            StorageArea::Session => Arc::clone(&self.inner.session_registry),
        }
    }

    pub fn add_storage_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&StorageEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.inner.next_listener.fetch_add(1, Ordering::SeqCst));
        self.inner.listeners().push((id, Arc::new(listener)));
        id
    }

    /// Detach a listener. Returns `false` if it was not attached.
    pub fn remove_storage_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners().len()
    }

    /// Deliver an event to this window's listeners, as if another window had
    /// changed storage.
    pub fn dispatch_storage_event(&self, event: &StorageEvent) {
        let listeners: Vec<_> = self
            .inner
            .listeners()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();

        trace!(
            window = self.inner.id,
            key = event.key.as_deref(),
            listeners = listeners.len(),
            "dispatching storage event"
        );
        for listener in listeners {
            listener(event);
        }
    }
}

/// Non-owning reference to a window, held by its registries.
#[derive(Clone)]
pub(crate) struct WeakWindow(Weak<WindowInner>);

impl WeakWindow {
    pub(crate) fn upgrade(&self) -> Option<Window> {
        self.0.upgrade().map(|inner| Window { inner })
    }
}

/// One storage area as seen from one window.
///
/// Writes to local storage that change the stored value notify the other
/// windows of the origin. Writing the value already stored does nothing.
#[derive(Clone)]
pub struct StorageHandle {
    area: StorageArea,
    window: Arc<WindowInner>,
}

impl fmt::Debug for StorageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageHandle")
            .field("area", &self.area)
            .field("window", &self.window.id)
            .finish()
    }
}

impl StorageHandle {
    pub fn area(&self) -> StorageArea {
        self.area
    }

    fn store(&self) -> &dyn KeyValueStore {
        match self.area {
            StorageArea::Local => self.window.origin.local.as_ref(),
            StorageArea::Session => self.window.session.as_ref(),
        }
    }

    fn notify(&self, key: Option<&str>, old_value: Option<String>, new_value: Option<&str>) {
        if self.area != StorageArea::Local {
            return;
        }
        let event = StorageEvent {
            key: key.map(str::to_string),
            old_value,
            new_value: new_value.map(str::to_string),
            area: self.area,
        };
        self.window.origin.broadcast(self.window.id, &event);
    }

    pub fn get_item(&self, key: &str) -> Option<String> {
        self.store().get_item(key)
    }

    pub fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let old_value = self.store().get_item(key);
        if old_value.as_deref() == Some(value) {
            return Ok(());
        }
        self.store().set_item(key, value)?;
        self.notify(Some(key), old_value, Some(value));
        Ok(())
    }

    pub fn remove_item(&self, key: &str) {
        let Some(old_value) = self.store().get_item(key) else {
            return;
        };
        self.store().remove_item(key);
        self.notify(Some(key), Some(old_value), None);
    }

    pub fn clear(&self) {
        if self.store().is_empty() {
            return;
        }
        self.store().clear();
        self.notify(None, None, None);
    }

    pub fn len(&self) -> usize {
        self.store().len()
    }

    pub fn is_empty(&self) -> bool {
        self.store().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    fn recorder(window: &Window) -> Arc<StdMutex<Vec<StorageEvent>>> {
        let events = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        window.add_storage_listener(move |e| sink.lock().unwrap().push(e.clone()));
        events
    }

    #[test]
    fn local_writes_notify_other_windows_only() {
        let origin = Origin::new();
        let a = origin.open_window();
        let b = origin.open_window();
        let a_events = recorder(&a);
        let b_events = recorder(&b);

        a.local_storage().set_item("k", "1").unwrap();

        assert!(a_events.lock().unwrap().is_empty());
        let b_events = b_events.lock().unwrap();
        assert_eq!(b_events.len(), 1);
        assert_eq!(b_events[0].key.as_deref(), Some("k"));
        assert_eq!(b_events[0].new_value.as_deref(), Some("1"));
        assert_eq!(b_events[0].old_value, None);
    }

    #[test]
    fn same_value_write_is_silent() {
        let origin = Origin::new();
        let a = origin.open_window();
        let b = origin.open_window();
        let b_events = recorder(&b);

        a.local_storage().set_item("k", "1").unwrap();
        a.local_storage().set_item("k", "1").unwrap();
        b.local_storage().set_item("k", "1").unwrap();

        assert_eq!(b_events.lock().unwrap().len(), 1);
    }

    #[test]
    fn session_storage_is_private_and_silent() {
        let origin = Origin::new();
        let a = origin.open_window();
        let b = origin.open_window();
        let b_events = recorder(&b);

        a.session_storage().set_item("k", "1").unwrap();

        assert_eq!(b.session_storage().get_item("k"), None);
        assert!(b_events.lock().unwrap().is_empty());
    }

    #[test]
    fn remove_and_clear_emit_events() {
        let origin = Origin::new();
        let a = origin.open_window();
        let b = origin.open_window();
        a.local_storage().set_item("k", "1").unwrap();
        let b_events = recorder(&b);

        a.local_storage().remove_item("k");
        a.local_storage().set_item("j", "2").unwrap();
        a.local_storage().clear();

        let events = b_events.lock().unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].new_value, None);
        assert_eq!(events[0].old_value.as_deref(), Some("1"));
        assert_eq!(events[2].key, None);
    }

    #[test]
    fn closed_windows_are_skipped() {
        let origin = Origin::new();
        let a = origin.open_window();
        let b = origin.open_window();
        assert_eq!(origin.open_windows(), 2);

        drop(b);
        a.local_storage().set_item("k", "1").unwrap();
        assert_eq!(origin.open_windows(), 1);
    }

    #[test]
    fn removed_listener_no_longer_fires() {
        let origin = Origin::new();
        let a = origin.open_window();
        let hits = Arc::new(StdMutex::new(0));
        let sink = Arc::clone(&hits);
        let id = a.add_storage_listener(move |_| *sink.lock().unwrap() += 1);

        a.dispatch_storage_event(&StorageEvent::local("k", Some("1")));
        assert!(a.remove_storage_listener(id));
        assert!(!a.remove_storage_listener(id));
        a.dispatch_storage_event(&StorageEvent::local("k", Some("2")));

        assert_eq!(*hits.lock().unwrap(), 1);
    }
}
