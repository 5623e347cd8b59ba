use crate::scope::Scope;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Callback receiving an already-deserialized value from another context.
pub type ChangeListener<T> = Arc<dyn Fn(T) + Send + Sync>;

/// The contract a persisted value needs from a storage backend.
///
/// An adapter is a side-effecting projection of `T` onto some medium plus an
/// optional change notification channel. It holds no reactive state.
///
/// Implement this directly to plug in a custom backend:
///
/// ```
/// use std::sync::{Arc, Mutex};
/// use tincan_persist::StorageAdapter;
///
/// struct Recorder {
///     log: Mutex<Vec<u32>>,
/// }
///
/// impl StorageAdapter<u32> for Recorder {
///     fn set(&self, value: &u32) {
///         self.log.lock().unwrap().push(*value);
///     }
///     fn initial_value(&self) -> u32 {
///         0
///     }
///     fn default_value(&self) -> u32 {
///         0
///     }
/// }
/// ```
pub trait StorageAdapter<T>: Send + Sync {
    /// Persist `value`. Failures are absorbed by the adapter.
    fn set(&self, value: &T);

    /// The value resolved from the medium when the adapter was created.
    fn initial_value(&self) -> T;

    /// The value a binding returns to on reset.
    fn default_value(&self) -> T;

    /// Subscribe to changes made by other contexts through the channel for
    /// `scope`. `None` means the adapter has no change source.
    fn subscribe(&self, scope: Scope, on_change: ChangeListener<T>) -> Option<Unsubscribe> {
        let _ = (scope, on_change);
        None
    }
}

type Teardown = Box<dyn FnOnce() + Send>;

/// Detaches a subscription. Calling it more than once is a no-op.
pub struct Unsubscribe {
    teardown: Mutex<Option<Teardown>>,
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("done", &self.is_done())
            .finish()
    }
}

impl Unsubscribe {
    pub fn new<F>(teardown: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            teardown: Mutex::new(Some(Box::new(teardown))),
        }
    }

    /// Run the teardown if it has not run yet. Returns whether it ran.
    pub fn unsubscribe(&self) -> bool {
        let teardown = self
            .teardown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match teardown {
            Some(teardown) => {
                teardown();
                true
            }
            None => false,
        }
    }

    pub fn is_done(&self) -> bool {
        self.teardown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

/// Adapter for environments without a storage medium.
///
/// Writes are discarded, the initial value is the default and there is no
/// change source.
#[derive(Debug, Clone)]
pub struct NoopStorage<T> {
    default_value: T,
}

impl<T> NoopStorage<T> {
    pub fn new(default_value: T) -> Self {
        Self { default_value }
    }
}

impl<T: Clone + Send + Sync> StorageAdapter<T> for NoopStorage<T> {
    fn set(&self, _value: &T) {}

    fn initial_value(&self) -> T {
        self.default_value.clone()
    }

    fn default_value(&self) -> T {
        self.default_value.clone()
    }
}
