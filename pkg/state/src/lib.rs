//! The Resource Store: named, namespaced, typed objects persisted as JSON.
//!
//! [`store::ResourceStore`] is the contract every controller talks to.
//! [`client::StateStore`] backs it with SlateDB, [`memory::MemoryStore`]
//! keeps everything in process and records calls for tests.

pub mod client;
pub mod error;
pub mod lifecycle;
pub mod memory;
pub mod store;
pub mod watch;

pub use error::StoreError;
pub use store::{ResourceStore, ResourceStoreExt};
