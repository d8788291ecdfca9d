//! Storage backends for the registry
//!
//! The loader talks to storage only through the `RegistryStore` trait.
//! The primary implementation is `SqliteStore` for persistent storage.

mod sqlite;
mod traits;

pub use sqlite::{SqliteStore, DEFAULT_STORE_TIMEOUT};
pub use traits::{OpenStore, RegistryStore, Resolution, StorageError, StorageResult, StoreTransaction};
