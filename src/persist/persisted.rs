use crate::error::{PersistError, Result};
use crate::scope::{current_owner, Disposer, Owner, Scope};
use crate::signal::{Effect, Signal};
use crate::storage::StorageAdapter;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Options for [`persist`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistOptions {
    pub scope: Scope,
}

impl PersistOptions {
    pub fn scoped() -> Self {
        Self {
            scope: Scope::Scoped,
        }
    }

    pub fn wide() -> Self {
        Self { scope: Scope::Wide }
    }
}

/// Lifecycle of a binding. There is no way back from `Disposed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    Uninitialized,
    Active,
    Disposed,
}

const UNINITIALIZED: u8 = 0;
const ACTIVE: u8 = 1;
const DISPOSED: u8 = 2;

#[derive(Clone)]
struct Status(Arc<AtomicU8>);

impl Status {
    fn new() -> Self {
        Self(Arc::new(AtomicU8::new(UNINITIALIZED)))
    }

    fn get(&self) -> BindingState {
        match self.0.load(Ordering::SeqCst) {
            UNINITIALIZED => BindingState::Uninitialized,
            ACTIVE => BindingState::Active,
            _ => BindingState::Disposed,
        }
    }

    fn activate(&self) {
        let _ = self
            .0
            .compare_exchange(UNINITIALIZED, ACTIVE, Ordering::SeqCst, Ordering::SeqCst);
    }

    fn dispose(&self) {
        self.0.store(DISPOSED, Ordering::SeqCst);
    }

    fn is_disposed(&self) -> bool {
        self.get() == BindingState::Disposed
    }
}

/// A reactive value mirrored to a storage adapter.
///
/// Every write to the value is pushed to the adapter by a sync effect; changes
/// made by other contexts arrive through the adapter's change source and are
/// written into the value. Clones share the same binding.
///
/// ```
/// use tincan_persist::{local_storage, persist, PersistOptions, platform::Origin};
///
/// let window = Origin::new().open_window();
/// let count = persist(local_storage(Some(&window), "count", 0), PersistOptions::wide()).unwrap();
///
/// count.set(5);
/// assert_eq!(window.local_storage().get_item("count").as_deref(), Some("5"));
///
/// count.reset();
/// assert_eq!(count.get(), 0);
/// count.cleanup();
/// ```
pub struct Persisted<T> {
    current: Signal<T>,
    default_value: T,
    scope: Scope,
    status: Status,
    root: Option<Arc<RootGuard>>,
}

/// Disposes a wide binding's root once the last handle is gone.
struct RootGuard(Disposer);

impl Drop for RootGuard {
    fn drop(&mut self) {
        self.0.dispose();
    }
}

impl<T: Clone> Clone for Persisted<T> {
    fn clone(&self) -> Self {
        Self {
            current: self.current.clone(),
            default_value: self.default_value.clone(),
            scope: self.scope,
            status: self.status.clone(),
            root: self.root.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Persisted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Persisted")
            .field("current", &self.current)
            .field("default_value", &self.default_value)
            .field("scope", &self.scope)
            .field("state", &self.status.get())
            .finish()
    }
}

/// Bind a reactive value to `adapter`.
///
/// With [`Scope::Scoped`] the binding's effects belong to the current
/// [`ComponentScope`](crate::ComponentScope) and end with it. With
/// [`Scope::Wide`] they belong to a new root that lives until
/// [`Persisted::cleanup`] is called or the last handle is dropped.
pub fn persist<T>(
    adapter: Arc<dyn StorageAdapter<T>>,
    options: PersistOptions,
) -> Result<Persisted<T>>
where
    T: Clone + Send + Sync + 'static,
{
    match options.scope {
        Scope::Scoped => {
            let owner = current_owner().ok_or(PersistError::NoComponentScope)?;
            if owner.is_disposed() {
                return Err(PersistError::ScopeDisposed);
            }
            Ok(Persisted::bind(adapter, Scope::Scoped, &owner))
        }
        Scope::Wide => {
            let root = Owner::new();
            let persisted = root.run(|| Persisted::bind(adapter, Scope::Wide, &root));
            Ok(Persisted {
                root: Some(Arc::new(RootGuard(Disposer::for_owner(root)))),
                ..persisted
            })
        }
    }
}

impl<T> Persisted<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn bind(adapter: Arc<dyn StorageAdapter<T>>, scope: Scope, owner: &Arc<Owner>) -> Self {
        let status = Status::new();
        let current = Signal::new(adapter.initial_value());
        let default_value = adapter.default_value();

        let sync = Effect::new({
            let current = current.clone();
            let adapter = Arc::clone(&adapter);
            move || adapter.set(&current.get())
        });

        let unsubscribe = adapter.subscribe(
            scope,
            Arc::new({
                let current = current.clone();
                let status = status.clone();
                move |value: T| {
                    if status.is_disposed() {
                        return;
                    }
                    trace!("applying change from another context");
                    current.set(value);
                }
            }),
        );
        let has_change_source = unsubscribe.is_some();

        owner.on_cleanup({
            let status = status.clone();
            move || {
                status.dispose();
                drop(sync);
                if let Some(unsubscribe) = unsubscribe {
                    unsubscribe.unsubscribe();
                }
                debug!(?scope, "persisted binding disposed");
            }
        });
        status.activate();

        debug!(?scope, owner = owner.id(), has_change_source, "persisted binding active");

        Self {
            current,
            default_value,
            scope,
            status,
            root: None,
        }
    }

    /// The current value. Reads inside an effect are tracked.
    pub fn get(&self) -> T {
        self.current.get()
    }

    pub fn get_untracked(&self) -> T {
        self.current.get_untracked()
    }

    /// Read the current value without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.current.with(f)
    }

    /// Replace the value. Ignored once the binding is disposed.
    pub fn set(&self, value: T) {
        if self.status.is_disposed() {
            trace!("write to disposed binding ignored");
            return;
        }
        self.current.set(value);
    }

    /// Modify the value in place. Ignored once the binding is disposed.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        if self.status.is_disposed() {
            trace!("write to disposed binding ignored");
            return;
        }
        self.current.update(f);
    }

    /// Return to the default value. Storage is updated by the sync effect,
    /// like any other write.
    pub fn reset(&self) {
        self.set(self.default_value.clone());
    }

    /// Tear down a wide binding. Scoped bindings end with their component, so
    /// this is a no-op for them. Safe to call any number of times.
    ///
    /// Dropping every handle of a wide binding tears it down as well. A clone
    /// of [`signal`](Self::signal) does not count as a handle.
    pub fn cleanup(&self) {
        match &self.root {
            Some(root) => root.0.dispose(),
            None => trace!(scope = ?self.scope, "cleanup is a no-op for scoped bindings"),
        }
    }

    pub fn default_value(&self) -> &T {
        &self.default_value
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn state(&self) -> BindingState {
        self.status.get()
    }

    /// The underlying signal, for building effects on top of the value.
    pub fn signal(&self) -> &Signal<T> {
        &self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::ComponentScope;
    use crate::storage::{ChangeListener, NoopStorage, Unsubscribe};
    use std::sync::Mutex;

    /// In-memory adapter that records writes and exposes its change listeners.
    #[derive(Default)]
    struct Probe {
        initial: i32,
        writes: Mutex<Vec<i32>>,
        listeners: Arc<Mutex<Vec<(Scope, ChangeListener<i32>)>>>,
    }

    impl Probe {
        fn with_initial(initial: i32) -> Arc<Self> {
            Arc::new(Self {
                initial,
                ..Self::default()
            })
        }

        fn emit(&self, value: i32) {
            let listeners: Vec<_> = self
                .listeners
                .lock()
                .unwrap()
                .iter()
                .map(|(_, l)| Arc::clone(l))
                .collect();
            for listener in listeners {
                listener(value);
            }
        }

        fn writes(&self) -> Vec<i32> {
            self.writes.lock().unwrap().clone()
        }

        fn subscribed(&self) -> Vec<Scope> {
            self.listeners.lock().unwrap().iter().map(|(s, _)| *s).collect()
        }
    }

    impl StorageAdapter<i32> for Probe {
        fn set(&self, value: &i32) {
            self.writes.lock().unwrap().push(*value);
        }

        fn initial_value(&self) -> i32 {
            self.initial
        }

        fn default_value(&self) -> i32 {
            0
        }

        fn subscribe(&self, scope: Scope, on_change: ChangeListener<i32>) -> Option<Unsubscribe> {
            self.listeners.lock().unwrap().push((scope, on_change));
            let listeners = Arc::clone(&self.listeners);
            Some(Unsubscribe::new(move || listeners.lock().unwrap().clear()))
        }
    }

    #[test]
    fn seeded_from_adapter_and_synced_on_write() {
        let probe = Probe::with_initial(3);
        let value = persist(probe.clone(), PersistOptions::wide()).unwrap();

        assert_eq!(value.get(), 3);
        assert_eq!(value.state(), BindingState::Active);

        value.set(4);
        value.update(|n| *n += 1);
        assert_eq!(value.get(), 5);
        // The first write comes from the sync effect's initial run.
        assert_eq!(probe.writes(), vec![3, 4, 5]);
        value.cleanup();
    }

    #[test]
    fn reset_goes_through_sync_effect() {
        let probe = Probe::with_initial(9);
        let value = persist(probe.clone(), PersistOptions::wide()).unwrap();

        value.reset();
        value.reset();

        assert_eq!(value.get(), 0);
        assert_eq!(probe.writes(), vec![9, 0, 0]);
        value.cleanup();
    }

    #[test]
    fn remote_change_is_applied_and_written_back() {
        let probe = Probe::with_initial(0);
        let value = persist(probe.clone(), PersistOptions::wide()).unwrap();
        assert_eq!(probe.subscribed(), vec![Scope::Wide]);

        probe.emit(10);

        assert_eq!(value.get(), 10);
        assert_eq!(probe.writes(), vec![0, 10]);
        value.cleanup();
    }

    #[test]
    fn wide_cleanup_is_idempotent_and_final() {
        let probe = Probe::with_initial(1);
        let value = persist(probe.clone(), PersistOptions::wide()).unwrap();
        let handle = value.clone();

        value.cleanup();
        handle.cleanup();
        assert_eq!(value.state(), BindingState::Disposed);
        assert!(probe.subscribed().is_empty());

        value.set(2);
        value.reset();
        probe.emit(3);
        assert_eq!(value.get(), 1);
        assert_eq!(probe.writes(), vec![1]);
    }

    #[test]
    fn dropping_last_wide_handle_disposes() {
        let probe = Probe::with_initial(1);
        let value = persist(probe.clone(), PersistOptions::wide()).unwrap();
        let handle = value.clone();
        let status = value.status.clone();

        drop(value);
        assert_eq!(status.get(), BindingState::Active);
        assert_eq!(probe.subscribed(), vec![Scope::Wide]);

        drop(handle);
        assert_eq!(status.get(), BindingState::Disposed);
        assert!(probe.subscribed().is_empty());
    }

    #[test]
    fn scoped_binding_requires_component() {
        let err = persist(Probe::with_initial(0), PersistOptions::scoped()).unwrap_err();
        assert_eq!(err, PersistError::NoComponentScope);

        let component = ComponentScope::new();
        component.dispose();
        let err = component
            .run(|| persist(Probe::with_initial(0), PersistOptions::scoped()))
            .unwrap_err();
        assert_eq!(err, PersistError::ScopeDisposed);
    }

    #[test]
    fn scoped_binding_ends_with_component() {
        let probe = Probe::with_initial(0);
        let component = ComponentScope::new();
        let value = component
            .run(|| persist(probe.clone(), PersistOptions::scoped()))
            .unwrap();
        assert_eq!(probe.subscribed(), vec![Scope::Scoped]);

        // No-op for scoped bindings.
        value.cleanup();
        assert_eq!(value.state(), BindingState::Active);
        probe.emit(4);
        assert_eq!(value.get(), 4);

        drop(component);
        assert_eq!(value.state(), BindingState::Disposed);
        assert!(probe.subscribed().is_empty());
        value.set(8);
        assert_eq!(value.get(), 4);
        assert_eq!(probe.writes(), vec![0, 4]);
    }

    #[test]
    fn noop_adapter_binding_works() {
        let value = persist(Arc::new(NoopStorage::new(2)), PersistOptions::wide()).unwrap();
        value.set(5);
        assert_eq!(value.get(), 5);
        value.reset();
        assert_eq!(value.get(), 2);
        value.cleanup();
    }

    #[test]
    fn consumers_can_react_to_the_signal() {
        let probe = Probe::with_initial(1);
        let value = persist(probe.clone(), PersistOptions::wide()).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let _render = Effect::new({
            let value = value.clone();
            let seen = Arc::clone(&seen);
            move || seen.lock().unwrap().push(value.get())
        });
        probe.emit(6);
        value.set(7);

        assert_eq!(*seen.lock().unwrap(), vec![1, 6, 7]);
        value.cleanup();
    }
}
