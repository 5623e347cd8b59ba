//! # Tincan Persist
//!
//! Reactive state that survives reloads and stays in step across windows.
//!
//! A [`Persisted<T>`] is a [`Signal<T>`] bound to a [`StorageAdapter<T>`]:
//!
//! - The signal starts from the value the adapter read from storage.
//! - Every write to the signal is pushed back to storage by an [`Effect`].
//! - Writes made by other windows of the same origin arrive as storage events
//!   and are applied to the signal.
//!
//! ## Lifetimes
//!
//! - [`Scope::Scoped`]: the binding lives inside a [`ComponentScope`] and is
//!   torn down when the component is.
//! - [`Scope::Wide`]: the binding lives until [`Persisted::cleanup`] is called.
//!   Wide bindings of a window share one storage listener through its
//!   [`BroadcastRegistry`].
//!
//! ## Example
//!
//! ```
//! use tincan_persist::platform::{Origin, Window};
//! use tincan_persist::{local_storage_with, persist, PersistOptions, StorageOptions};
//!
//! let origin = Origin::new();
//! let (a, b) = (origin.open_window(), origin.open_window());
//!
//! let bind = |window: &Window| {
//!     let options = StorageOptions::new().sync_tabs(true);
//!     let storage = local_storage_with(Some(window), "theme", "light".to_string(), options);
//!     persist(storage, PersistOptions::wide()).unwrap()
//! };
//! let theme_a = bind(&a);
//! let theme_b = bind(&b);
//!
//! theme_a.set("dark".to_string());
//! assert_eq!(theme_b.get(), "dark");
//! ```

pub mod error;
pub mod persist;
pub mod platform;
pub mod runtime;
pub mod scope;
pub mod signal;
pub mod storage;

// Re-export main types for convenience
pub use error::{PersistError, StorageError};
pub use persist::{persist, BindingState, PersistOptions, Persisted};
pub use scope::{create_root, on_cleanup, ComponentScope, Disposer, Scope};
pub use signal::{create_effect, Effect, Signal, WatchGuard};
pub use storage::{
    local_storage, local_storage_with, session_storage, session_storage_with, BroadcastRegistry,
    NoopStorage, StorageAdapter, StorageOptions, Unsubscribe,
};
