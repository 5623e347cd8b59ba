use crate::runtime::{ReactiveRuntime, RuntimeInner};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, Weak};

/// A reactive signal that holds a value and notifies subscribers when changed.
///
/// A signal belongs to the runtime that was current when it was created; reads
/// are tracked and writes are propagated through that runtime, wherever the
/// handle is used afterwards.
pub struct Signal<T> {
    value: Arc<RwLock<T>>,
    id: usize,
    runtime: Arc<ReactiveRuntime>,
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            id: self.id,
            runtime: Arc::clone(&self.runtime),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = self.value.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("Signal")
            .field("id", &self.id)
            .field("value", &*value)
            .finish()
    }
}

impl<T: Clone + Send + Sync + 'static> Signal<T> {
    /// Create a new signal with the given initial value.
    pub fn new(initial: T) -> Self {
        let runtime = ReactiveRuntime::current();
        let id = runtime.next_id();

        Self {
            value: Arc::new(RwLock::new(initial)),
            id,
            runtime,
        }
    }

    /// Get the current value of the signal.
    pub fn get(&self) -> T {
        self.runtime.track_read(self.id);
        self.get_untracked()
    }

    /// Get the current value without registering a dependency.
    pub fn get_untracked(&self) -> T {
        self.value
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Set a new value for the signal.
    ///
    /// Every effect that read this signal runs before `set` returns.
    pub fn set(&self, new_value: T) {
        *self.value.write().unwrap_or_else(PoisonError::into_inner) = new_value;
        self.runtime.notify_observers(self.id);
    }

    /// Update the value using a function.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        let mut value = self.value.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut *value);
        drop(value); // Release the write lock before notifying
        self.runtime.notify_observers(self.id);
    }

    /// Read the value with a function without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.runtime.track_read(self.id);
        let value = self.value.read().unwrap_or_else(PoisonError::into_inner);
        f(&*value)
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Watch this signal for changes.
    ///
    /// The callback runs immediately with the current value and then after
    /// every write, until the returned guard is dropped.
    pub fn watch<F>(&self, callback: F) -> WatchGuard
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let runtime = Arc::clone(&self.runtime);
        let observer_id = runtime.next_id();
        let signal_id = self.id;
        let value = Arc::clone(&self.value);
        let tracker = Arc::downgrade(&runtime);
        let callback = Arc::new(callback);
        let callback_clone = Arc::clone(&callback);

        runtime.create_observer(observer_id, move || {
            // Re-runs start with no dependencies
            if let Some(runtime) = tracker.upgrade() {
                runtime.track_read(signal_id);
            }
            let val = value.read().unwrap_or_else(PoisonError::into_inner).clone();
            callback_clone(val);
        });

        // Subscribe to this signal
        runtime.with_observer(observer_id, || {
            runtime.track_read(self.id);
        });

        callback(self.get_untracked());

        WatchGuard {
            observer_id,
            runtime: Arc::downgrade(&runtime.inner()),
        }
    }
}

/// RAII guard for signal watchers.
pub struct WatchGuard {
    observer_id: usize,
    runtime: Weak<RuntimeInner>,
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.remove_observer(self.observer_id);
        }
    }
}
