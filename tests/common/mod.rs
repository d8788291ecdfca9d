//! Common test utilities for ingestion integration tests

pub mod fixtures;

use grant_indexer::{OpenStore, SqliteStore};
use std::sync::Arc;

pub use fixtures::{organization_detail, search_page};

/// A fresh in-memory store shared between loader and assertions
pub fn memory_store() -> Arc<SqliteStore> {
    Arc::new(SqliteStore::open_in_memory().expect("in-memory store"))
}
