//! In-process model of the storage environment.
//!
//! An [`Origin`] owns the local storage shared by its [`Window`]s. Each window
//! has private session storage and a list of storage listeners. A write to
//! local storage that changes the stored value is delivered as a
//! [`StorageEvent`] to every other open window of the origin, never to the
//! window that wrote it.

mod memory;
mod window;

pub use memory::{KeyValueStore, MemoryStore};
pub(crate) use window::WeakWindow;
pub use window::{
    ListenerId, Origin, StorageArea, StorageEvent, StorageHandle, StorageListener, Window,
};
