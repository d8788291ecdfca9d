//! Running totals and failure types for a load

use crate::connector::ConnectorError;
use crate::storage::StorageError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Counts of entities written by one `load` invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadStats {
    pub orgs_created: usize,
    pub orgs_updated: usize,
    pub grants_created: usize,
}

impl LoadStats {
    /// Add another batch's counts to this total.
    pub fn merge(&mut self, other: &LoadStats) {
        self.orgs_created += other.orgs_created;
        self.orgs_updated += other.orgs_updated;
        self.grants_created += other.grants_created;
    }
}

impl std::fmt::Display for LoadStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{{orgs_created: {}, orgs_updated: {}, grants_created: {}}}",
            self.orgs_created, self.orgs_updated, self.grants_created
        )
    }
}

/// Why a load stopped early.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("fetch failed: {0}")]
    Source(#[from] ConnectorError),

    /// The store rejected a batch commit
    #[error("commit failed: {0}")]
    Commit(#[source] StorageError),

    /// A read or write inside a batch failed; the batch was rolled back
    #[error("storage error: {0}")]
    Storage(#[source] StorageError),

    #[error("load cancelled")]
    Cancelled,
}

/// A failed load, with the totals of every batch committed before the failure.
#[derive(Debug, Error)]
#[error("{error} (committed before failure: {stats})")]
pub struct LoadFailure {
    pub stats: LoadStats,
    #[source]
    pub error: LoadError,
}
