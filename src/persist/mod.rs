//! Reactive values bound to persistent storage.
//!
//! [`persist`] seeds a signal from a [`StorageAdapter`](crate::StorageAdapter),
//! installs an effect that writes every change back, and, when the adapter
//! has a change source, applies changes made by other contexts.

mod persisted;

pub use persisted::{persist, BindingState, PersistOptions, Persisted};
