//! Storage adapters and cross-context change delivery.
//!
//! - [`StorageAdapter`]: the narrow contract a persisted value needs from a
//!   backend. Implement it for custom media.
//! - [`WebStorage`]: adapter over one key of a window's local or session
//!   storage, built by [`local_storage`] and [`session_storage`].
//! - [`NoopStorage`]: what you get when there is no storage medium.
//! - [`BroadcastRegistry`]: one shared window listener fanned out by key to
//!   every wide binding.

mod adapter;
mod registry;
mod web;

pub use adapter::{ChangeListener, NoopStorage, StorageAdapter, Unsubscribe};
pub use registry::{BroadcastRegistry, RawHandler};
pub use web::{
    local_storage, local_storage_with, session_storage, session_storage_with, Deserializer,
    Initializer, Serializer, StorageOptions, WebStorage,
};
