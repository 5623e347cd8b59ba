use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::trace;

type Cleanup = Box<dyn FnOnce() + Send>;

/// Which lifetime a binding's side effects are tied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Scope {
    /// Owned by the enclosing [`ComponentScope`]; torn down with it.
    #[default]
    Scoped,
    /// Owned by a detached root; torn down by an explicit cleanup call.
    Wide,
}

/// Collects teardown work and runs it exactly once.
pub struct Owner {
    id: usize,
    cleanups: Mutex<Vec<Cleanup>>,
    disposed: AtomicBool,
}

impl fmt::Debug for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Owner")
            .field("id", &self.id)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

static NEXT_OWNER: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static OWNER_STACK: RefCell<Vec<Arc<Owner>>> = const { RefCell::new(Vec::new()) };
}

impl Owner {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_OWNER.fetch_add(1, Ordering::Relaxed),
            cleanups: Mutex::new(Vec::new()),
            disposed: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Register teardown work. On an already disposed owner it runs now.
    pub fn on_cleanup<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_disposed() {
            f();
            return;
        }
        self.cleanups
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(f));
    }

    /// Run every cleanup, newest first. Later calls do nothing.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let cleanups =
            std::mem::take(&mut *self.cleanups.lock().unwrap_or_else(PoisonError::into_inner));
        trace!(owner = self.id, cleanups = cleanups.len(), "disposing owner");
        for cleanup in cleanups.into_iter().rev() {
            cleanup();
        }
    }

    /// Run `f` with this owner as the current one.
    pub fn run<F, R>(self: &Arc<Self>, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        OWNER_STACK.with(|stack| stack.borrow_mut().push(Arc::clone(self)));

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f));

        OWNER_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });

        match result {
            Ok(r) => r,
            Err(e) => std::panic::resume_unwind(e),
        }
    }
}

/// The owner whose `run` is currently executing on this thread, if any.
pub fn current_owner() -> Option<Arc<Owner>> {
    OWNER_STACK.with(|stack| stack.borrow().last().cloned())
}

/// Register teardown work with the current owner. Returns `false` (and drops
/// `f` without running it) when there is none.
pub fn on_cleanup<F>(f: F) -> bool
where
    F: FnOnce() + Send + 'static,
{
    match current_owner() {
        Some(owner) => {
            owner.on_cleanup(f);
            true
        }
        None => false,
    }
}

/// The lifetime of one mounted component.
///
/// Bindings created inside [`run`](Self::run) with [`Scope::Scoped`] are torn
/// down when the scope is disposed or dropped.
///
/// ```
/// use tincan_persist::ComponentScope;
/// use std::sync::{Arc, atomic::{AtomicBool, Ordering}};
///
/// let torn_down = Arc::new(AtomicBool::new(false));
/// let flag = torn_down.clone();
///
/// let component = ComponentScope::new();
/// component.run(|| {
///     tincan_persist::on_cleanup(move || flag.store(true, Ordering::SeqCst));
/// });
/// drop(component);
///
/// assert!(torn_down.load(Ordering::SeqCst));
/// ```
#[derive(Debug)]
pub struct ComponentScope {
    owner: Arc<Owner>,
}

impl Default for ComponentScope {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentScope {
    pub fn new() -> Self {
        Self {
            owner: Owner::new(),
        }
    }

    /// Run `f` with this component as the current owner.
    pub fn run<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        self.owner.run(f)
    }

    /// Unmount: run every registered cleanup. Idempotent.
    pub fn dispose(&self) {
        self.owner.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.owner.is_disposed()
    }

    pub fn owner(&self) -> &Arc<Owner> {
        &self.owner
    }
}

impl Drop for ComponentScope {
    fn drop(&mut self) {
        self.owner.dispose();
    }
}

/// Tears down a root created by [`create_root`].
///
/// Clones share the root; disposing through any of them more than once is a
/// no-op. Dropping a disposer does not dispose the root.
#[derive(Debug, Clone)]
pub struct Disposer {
    owner: Arc<Owner>,
}

impl Disposer {
    pub(crate) fn for_owner(owner: Arc<Owner>) -> Self {
        Self { owner }
    }

    pub fn dispose(&self) {
        self.owner.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.owner.is_disposed()
    }
}

/// Run `f` under a fresh root owner that is not tied to any component and
/// lives until the returned [`Disposer`] is called.
pub fn create_root<F, R>(f: F) -> (R, Disposer)
where
    F: FnOnce() -> R,
{
    let owner = Owner::new();
    let result = owner.run(f);
    (result, Disposer::for_owner(owner))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<&'static str>>>, impl Fn(&'static str) -> Cleanup) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let make = move |name: &'static str| -> Cleanup {
            let sink = Arc::clone(&sink);
            Box::new(move || sink.lock().unwrap().push(name))
        };
        (log, make)
    }

    #[test]
    fn cleanups_run_newest_first_and_once() {
        let (log, make) = recorder();
        let component = ComponentScope::new();
        component.run(|| {
            on_cleanup(make("first"));
            on_cleanup(make("second"));
        });

        component.dispose();
        component.dispose();
        drop(component);

        assert_eq!(*log.lock().unwrap(), vec!["second", "first"]);
    }

    #[test]
    fn no_owner_outside_run() {
        assert!(current_owner().is_none());
        assert!(!on_cleanup(|| {}));

        let component = ComponentScope::new();
        let id = component.run(|| current_owner().map(|o| o.id()));
        assert_eq!(id, Some(component.owner().id()));
        assert!(current_owner().is_none());
    }

    #[test]
    fn root_inside_component_is_detached() {
        let (log, make) = recorder();
        let component = ComponentScope::new();

        let disposer = component.run(|| {
            let ((), disposer) = create_root(|| {
                on_cleanup(make("root"));
            });
            disposer
        });

        component.dispose();
        assert!(log.lock().unwrap().is_empty());

        let other = disposer.clone();
        disposer.dispose();
        other.dispose();
        assert!(other.is_disposed());
        assert_eq!(*log.lock().unwrap(), vec!["root"]);
    }

    #[test]
    fn cleanup_on_disposed_owner_runs_immediately() {
        let (log, make) = recorder();
        let component = ComponentScope::new();
        component.dispose();
        component.owner().on_cleanup(make("late"));
        assert_eq!(*log.lock().unwrap(), vec!["late"]);
    }

    #[test]
    fn scope_defaults_to_scoped() {
        assert_eq!(Scope::default(), Scope::Scoped);
    }
}
