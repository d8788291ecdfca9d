//! Grant Indexer: registry ingestion without duplicate organizations
//!
//! Streams nonprofit records and the grants between them out of third-party
//! registries and reconciles them against a persistent store.
//!
//! # Core Concepts
//!
//! - **Connectors**: produce a lazy, single-pass stream of raw record batches
//! - **Natural keys**: the (`registry`, `external_id`) pair that identifies
//!   an organization across runs
//! - **Loader**: upserts organizations by natural key, links grants between
//!   resolved organizations, and commits one transaction per batch
//!
//! # Example
//!
//! ```
//! use grant_indexer::{Connector, Loader, OpenStore, RawOrganization, RawRecordBatch,
//!                     ReplayConnector, SqliteStore};
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let store = Arc::new(SqliteStore::open_in_memory().unwrap());
//! let batch = RawRecordBatch::new().with_organization(RawOrganization::new("A", "IRS", "1"));
//! let mut stream = Box::new(ReplayConnector::new(vec![batch])).fetch();
//!
//! let stats = Loader::new(store).load(stream.as_mut()).await.unwrap();
//! assert_eq!(stats.orgs_created, 1);
//! # });
//! ```

pub mod config;
pub mod connector;
pub mod loader;
mod registry;
pub mod storage;

pub use config::{ConfigError, IndexerConfig};
pub use connector::{
    Connector, ConnectorConfig, ConnectorError, FetchWarning, HttpClient, ProPublicaConnector,
    RawGrant, RawOrganization, RawRecordBatch, RecordStream, ReplayConnector,
};
pub use loader::{CancellationToken, LoadError, LoadFailure, LoadStats, Loader};
pub use registry::{Grant, GrantId, NaturalKey, OrgId, Organization};
pub use storage::{OpenStore, RegistryStore, Resolution, SqliteStore, StorageError, StorageResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
