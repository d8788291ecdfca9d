//! Batch loader: natural-key upsert of organizations and grant linking
//!
//! Per batch:
//! 1. Upsert every organization by natural key
//! 2. Insert every grant whose funder and grantee both resolve
//! 3. Commit the batch as one transaction
//!
//! A crash mid-stream loses at most the in-flight batch.

use super::cancel::CancellationToken;
use super::stats::{LoadError, LoadFailure, LoadStats};
use crate::connector::{RawGrant, RawOrganization, RawRecordBatch, RecordStream};
use crate::registry::Grant;
use crate::storage::{RegistryStore, Resolution, StorageResult, StoreTransaction};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Consumes a record stream into a registry store.
///
/// The loader is the only writer while a load runs; natural-key upserts are
/// not safe against a second loader racing on the same store.
pub struct Loader {
    store: Arc<dyn RegistryStore>,
    cancel: CancellationToken,
}

impl Loader {
    pub fn new(store: Arc<dyn RegistryStore>) -> Self {
        Self {
            store,
            cancel: CancellationToken::new(),
        }
    }

    /// Check `token` before each batch is requested.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Drain `stream`, committing one transaction per batch.
    ///
    /// On failure the returned `LoadFailure` carries the totals of every
    /// batch committed before it.
    pub async fn load(&self, stream: &mut dyn RecordStream) -> Result<LoadStats, LoadFailure> {
        let mut stats = LoadStats::default();
        let mut batch_index = 0usize;

        loop {
            if self.cancel.is_cancelled() {
                info!(batches = batch_index, %stats, "load cancelled");
                return Err(LoadFailure {
                    stats,
                    error: LoadError::Cancelled,
                });
            }

            let batch = match stream.next_batch().await {
                Ok(Some(batch)) => batch,
                Ok(None) => break,
                Err(e) => {
                    return Err(LoadFailure {
                        stats,
                        error: LoadError::Source(e),
                    })
                }
            };

            let batch_stats = self
                .apply_batch(&batch)
                .map_err(|error| LoadFailure { stats, error })?;
            stats.merge(&batch_stats);
            debug!(
                batch = batch_index,
                organizations = batch.organizations.len(),
                grants = batch.grants.len(),
                "batch committed"
            );
            batch_index += 1;
        }

        info!(batches = batch_index, %stats, "load complete");
        Ok(stats)
    }

    /// Write one batch in its own transaction and return its counts.
    ///
    /// Counts are only meaningful once the commit succeeds; on error the
    /// transaction is rolled back.
    pub fn apply_batch(&self, batch: &RawRecordBatch) -> Result<LoadStats, LoadError> {
        let mut stats = LoadStats::default();
        let mut tx = self.store.begin().map_err(LoadError::Storage)?;

        // All upserts precede grant resolution so same-batch endpoints resolve
        for raw in &batch.organizations {
            upsert_organization(tx.as_mut(), raw, &mut stats).map_err(LoadError::Storage)?;
        }
        for raw in &batch.grants {
            insert_grant(tx.as_mut(), raw, &mut stats).map_err(LoadError::Storage)?;
        }

        tx.commit().map_err(LoadError::Commit)?;
        Ok(stats)
    }
}

/// Create or update the organization for `raw`'s natural key.
///
/// An existing organization gets its name overwritten and its optional
/// fields filled from non-blank incoming values.
pub fn upsert_organization(
    tx: &mut dyn StoreTransaction,
    raw: &RawOrganization,
    stats: &mut LoadStats,
) -> StorageResult<Resolution> {
    match tx.find_or_create(raw)? {
        Resolution::Found(mut org) => {
            org.apply_update(raw);
            tx.update_organization(&org)?;
            stats.orgs_updated += 1;
            Ok(Resolution::Found(org))
        }
        created @ Resolution::Created(_) => {
            stats.orgs_created += 1;
            Ok(created)
        }
    }
}

/// Insert a grant between two already-persisted organizations.
///
/// Returns `None` and logs both natural keys when either endpoint is
/// unknown; the grant is dropped and no counter moves.
pub fn insert_grant(
    tx: &mut dyn StoreTransaction,
    raw: &RawGrant,
    stats: &mut LoadStats,
) -> StorageResult<Option<Grant>> {
    let funder_key = raw.funder_key();
    let grantee_key = raw.grantee_key();
    let funder = tx.find_organization(&funder_key)?;
    let grantee = tx.find_organization(&grantee_key)?;

    let (Some(funder), Some(grantee)) = (&funder, &grantee) else {
        warn!(
            funder = %funder_key,
            grantee = %grantee_key,
            funder_found = funder.is_some(),
            grantee_found = grantee.is_some(),
            "skipping grant: organization not found"
        );
        return Ok(None);
    };

    let grant = Grant::link(funder.id, grantee.id, raw);
    tx.insert_grant(&grant)?;
    stats.grants_created += 1;
    Ok(Some(grant))
}
