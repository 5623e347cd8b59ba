use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type Observer = Arc<dyn Fn() + Send + Sync>;

/// Reactive context for tracking dependencies.
struct ReactiveContext {
    current_observer: Option<usize>,
    // Map from signal ID to set of observer IDs that depend on it
    dependencies: HashMap<usize, HashSet<usize>>,
    // Map from observer ID to set of signal IDs it depends on
    observer_deps: HashMap<usize, HashSet<usize>>,
    // Map from observer ID to the effect function
    observers: HashMap<usize, Observer>,
}

impl ReactiveContext {
    fn new() -> Self {
        Self {
            current_observer: None,
            dependencies: HashMap::new(),
            observer_deps: HashMap::new(),
            observers: HashMap::new(),
        }
    }

    fn forget_dependencies(&mut self, observer_id: usize) {
        if let Some(old_deps) = self.observer_deps.remove(&observer_id) {
            for signal_id in old_deps {
                if let Some(deps) = self.dependencies.get_mut(&signal_id) {
                    deps.remove(&observer_id);
                }
            }
        }
    }
}

/// Inner runtime state that can be shared.
///
/// Guards (`Effect`, `WatchGuard`) hold a `Weak` to this so that dropping them
/// after the runtime is gone is harmless.
pub(crate) struct RuntimeInner {
    context: Mutex<ReactiveContext>,
}

impl RuntimeInner {
    fn new() -> Self {
        Self {
            context: Mutex::new(ReactiveContext::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ReactiveContext> {
        self.context.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn remove_observer(&self, observer_id: usize) {
        let mut ctx = self.lock();
        ctx.observers.remove(&observer_id);
        ctx.forget_dependencies(observer_id);
    }

    pub(crate) fn has_observer(&self, observer_id: usize) -> bool {
        self.lock().observers.contains_key(&observer_id)
    }
}

/// Reactive runtime for managing reactive primitives.
///
/// Each thread has a default runtime; scoped runtimes can be pushed for
/// isolation. The runtime tracks dependencies between signals and effects and
/// runs effects synchronously when a signal they read is written.
///
/// # Examples
///
/// Using the thread's default runtime:
///
/// ```
/// use tincan_persist::Signal;
///
/// let signal = Signal::new(42);
/// assert_eq!(signal.get(), 42);
/// ```
///
/// Using scoped runtimes for isolation:
///
/// ```
/// use tincan_persist::runtime::ReactiveRuntime;
/// use tincan_persist::Signal;
///
/// ReactiveRuntime::scope(|| {
///     let signal = Signal::new(0);
///     assert_eq!(signal.get(), 0);
/// });
/// // Runtime and all its state is dropped here
/// ```
pub struct ReactiveRuntime {
    next_id: AtomicUsize,
    inner: Arc<RuntimeInner>,
}

thread_local! {
    // Stack of scoped runtimes
    static RUNTIME_STACK: RefCell<Vec<Arc<ReactiveRuntime>>> = const { RefCell::new(Vec::new()) };
    static THREAD_RUNTIME: Arc<ReactiveRuntime> = ReactiveRuntime::new();
}

impl ReactiveRuntime {
    /// Create a new isolated runtime.
    ///
    /// This creates a completely independent reactive runtime with its own
    /// dependency graph.
    pub fn new() -> Arc<Self> {
        Arc::new(ReactiveRuntime {
            next_id: AtomicUsize::new(0),
            inner: Arc::new(RuntimeInner::new()),
        })
    }

    /// Run a function with a fresh isolated runtime.
    ///
    /// The runtime and all its state is cleaned up when the function returns.
    ///
    /// # Examples
    ///
    /// ```
    /// use tincan_persist::runtime::ReactiveRuntime;
    /// use tincan_persist::Signal;
    ///
    /// ReactiveRuntime::scope(|| {
    ///     let signal = Signal::new(0);
    ///     assert_eq!(signal.get(), 0);
    /// });
    /// ```
    pub fn scope<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let runtime = Self::new();
        Self::with_runtime(runtime, f)
    }

    // Used when no scoped runtime is active.
    fn thread_default() -> Arc<Self> {
        THREAD_RUNTIME.with(Arc::clone)
    }

    /// Get the current reactive runtime (scoped or thread default).
    pub fn current() -> Arc<Self> {
        RUNTIME_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .cloned()
                .unwrap_or_else(Self::thread_default)
        })
    }

    /// Run a function with a specific runtime as the current context.
    ///
    /// # Examples
    ///
    /// ```
    /// use tincan_persist::runtime::ReactiveRuntime;
    /// use tincan_persist::Signal;
    ///
    /// let runtime = ReactiveRuntime::new();
    /// ReactiveRuntime::with_runtime(runtime, || {
    ///     let signal = Signal::new(42);
    ///     assert_eq!(signal.get(), 42);
    /// });
    /// ```
    pub fn with_runtime<F, R>(runtime: Arc<Self>, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        RUNTIME_STACK.with(|stack| {
            stack.borrow_mut().push(runtime);
        });

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f));

        RUNTIME_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });

        match result {
            Ok(r) => r,
            Err(e) => std::panic::resume_unwind(e),
        }
    }

    /// Get a reference to the inner runtime state.
    pub(crate) fn inner(&self) -> Arc<RuntimeInner> {
        Arc::clone(&self.inner)
    }

    /// Generate the next unique ID for a reactive primitive.
    pub(crate) fn next_id(&self) -> usize {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Track a read of a signal by the current observer.
    pub(crate) fn track_read(&self, signal_id: usize) {
        let mut ctx = self.inner.lock();
        if let Some(current_observer) = ctx.current_observer {
            ctx.dependencies
                .entry(signal_id)
                .or_default()
                .insert(current_observer);
            ctx.observer_deps
                .entry(current_observer)
                .or_default()
                .insert(signal_id);
        }
    }

    /// Run every observer that depends on a signal.
    ///
    /// Observers run synchronously, each inside its own tracking context, with
    /// no runtime lock held so they are free to write other signals.
    pub(crate) fn notify_observers(&self, signal_id: usize) {
        let observers = {
            let ctx = self.inner.lock();
            ctx.dependencies.get(&signal_id).map(|obs| {
                let mut ids: Vec<_> = obs.iter().copied().collect();
                // Registration order
                ids.sort_unstable();
                ids
            })
        };

        if let Some(observers) = observers {
            for observer_id in observers {
                self.run_observer(observer_id);
            }
        }
    }

    fn run_observer(&self, observer_id: usize) {
        let effect = {
            let mut ctx = self.inner.lock();
            ctx.forget_dependencies(observer_id);
            ctx.observers.get(&observer_id).cloned()
        };
        if let Some(effect) = effect {
            self.with_observer(observer_id, || effect());
        }
    }

    /// Register an observer, dropping any dependencies it had before.
    pub(crate) fn create_observer<F>(&self, observer_id: usize, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut ctx = self.inner.lock();
        ctx.forget_dependencies(observer_id);
        ctx.observers.insert(observer_id, Arc::new(f));
    }

    /// Run a function with a specific observer as the current context.
    pub(crate) fn with_observer<F, R>(&self, observer_id: usize, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let prev = self.inner.lock().current_observer.replace(observer_id);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f));
        self.inner.lock().current_observer = prev;

        match result {
            Ok(r) => r,
            Err(e) => std::panic::resume_unwind(e),
        }
    }
}
