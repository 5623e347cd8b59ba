//! Lifetimes for reactive side effects.
//!
//! A binding's effects and subscriptions are registered with an [`Owner`].
//! A [`ComponentScope`] owns them for as long as a component is mounted; a
//! root made by [`create_root`] owns them until its [`Disposer`] is called.

mod owner;

pub use owner::{create_root, current_owner, on_cleanup, ComponentScope, Disposer, Owner, Scope};
