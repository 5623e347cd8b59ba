use crate::platform::{StorageArea, StorageEvent, WeakWindow};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

/// Handler receiving the raw (still serialized) new value of a key.
pub type RawHandler = Arc<dyn Fn(Option<&str>) + Send + Sync>;

/// Shares one window storage listener between every wide binding.
///
/// Each key maps to at most one handler; registering a key again replaces the
/// previous handler. The window listener is attached on the first
/// registration and stays attached for the window's lifetime, even once every
/// key is unregistered.
pub struct BroadcastRegistry {
    area: StorageArea,
    handlers: Mutex<HashMap<String, RawHandler>>,
    attached: AtomicBool,
    window: Option<WeakWindow>,
}

impl fmt::Debug for BroadcastRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BroadcastRegistry")
            .field("area", &self.area)
            .field("keys", &self.len())
            .field("attached", &self.is_attached())
            .finish()
    }
}

impl BroadcastRegistry {
    /// A registry bound to no window. Events reach it only through
    /// [`dispatch`](Self::dispatch) or [`handle_event`](Self::handle_event).
    pub fn detached(area: StorageArea) -> Self {
        Self {
            area,
            handlers: Mutex::new(HashMap::new()),
            attached: AtomicBool::new(false),
            window: None,
        }
    }

    pub(crate) fn for_window(area: StorageArea, window: WeakWindow) -> Self {
        Self {
            window: Some(window),
            ..Self::detached(area)
        }
    }

    fn handlers(&self) -> MutexGuard<'_, HashMap<String, RawHandler>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn area(&self) -> StorageArea {
        self.area
    }

    /// Map `key` to `handler` and make sure the window listener is attached.
    pub fn register(self: &Arc<Self>, key: impl Into<String>, handler: RawHandler) {
        let key = key.into();
        if self.handlers().insert(key.clone(), handler).is_some() {
            debug!(key = %key, "replaced broadcast handler");
        }
        self.ensure_attached();
    }

    /// Remove the handler for `key`. Returns whether one was registered.
    pub fn unregister(&self, key: &str) -> bool {
        self.handlers().remove(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.handlers().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.handlers().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the window listener has been attached.
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    fn ensure_attached(self: &Arc<Self>) {
        let Some(window) = self.window.as_ref().and_then(WeakWindow::upgrade) else {
            return;
        };
        if self
            .attached
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let registry = Arc::downgrade(self);
        window.add_storage_listener(move |event| {
            if let Some(registry) = registry.upgrade() {
                registry.handle_event(event);
            }
        });
        debug!(window = window.id(), area = ?self.area, "broadcast listener attached");
    }

    /// Route a storage event to the handler registered for its key.
    ///
    /// Events for another storage area and area-wide clears are ignored.
    pub fn handle_event(&self, event: &StorageEvent) {
        if event.area != self.area {
            return;
        }
        let Some(key) = event.key.as_deref() else {
            return;
        };
        self.dispatch(key, event.new_value.as_deref());
    }

    /// Call the handler for `key` with `raw`. A key with no handler is
    /// ignored; it may have been unregistered while the event was in flight.
    pub fn dispatch(&self, key: &str, raw: Option<&str>) {
        let handler = self.handlers().get(key).cloned();
        match handler {
            Some(handler) => handler(raw),
            None => trace!(key, "no broadcast handler for key"),
        }
    }
}
