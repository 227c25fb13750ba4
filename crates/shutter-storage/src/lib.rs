//! Shutter Storage Library
//!
//! This crate provides the Durable Item Store: the reload-surviving mirror of
//! every session's upload items. It includes the `ItemStore` trait and
//! implementations backed by the local filesystem and by process memory.
//!
//! # Session encoding
//!
//! Every backend stores a session as one serialized [`SessionRecord`] keyed by
//! its [`SessionKey`]. Decoding is shared through the `codec` module so all
//! backends self-heal the same way: a payload that fails to parse, belongs to
//! a different key or exceeds the configured size limit is cleared and
//! reported as a miss.
//!
//! [`SessionRecord`]: shutter_core::SessionRecord
//! [`SessionKey`]: shutter_core::SessionKey

pub(crate) mod codec;
pub mod factory;
pub(crate) mod keys;
#[cfg(feature = "store-local")]
pub mod local;
#[cfg(feature = "store-memory")]
pub mod memory;
pub mod traits;

// Re-export commonly used types
pub use factory::create_store;
#[cfg(feature = "store-local")]
pub use local::LocalItemStore;
#[cfg(feature = "store-memory")]
pub use memory::MemoryItemStore;
pub use shutter_core::StoreBackend;
pub use traits::{ItemStore, StoreError, StoreResult};
