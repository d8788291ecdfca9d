//! Storage trait definitions

use crate::connector::RawOrganization;
use crate::registry::{Grant, NaturalKey, OrgId, Organization};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Date parsing error: {0}")]
    DateParse(String),

    #[error("Decimal parsing error: {0}")]
    DecimalParse(String),

    #[error("Invalid identity: {0}")]
    InvalidId(String),

    #[error("Organization not found: {0}")]
    OrganizationNotFound(String),

    #[error("Store lock poisoned")]
    LockPoisoned,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Outcome of a natural-key lookup that creates on miss.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// An organization with this natural key already existed
    Found(Organization),
    /// No match; a new organization was inserted
    Created(Organization),
}

impl Resolution {
    pub fn organization(&self) -> &Organization {
        match self {
            Self::Found(org) | Self::Created(org) => org,
        }
    }

    pub fn into_organization(self) -> Organization {
        match self {
            Self::Found(org) | Self::Created(org) => org,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// One unit of work against the store.
///
/// Writes become visible to other readers only after `commit`. Dropping a
/// transaction without committing rolls it back.
pub trait StoreTransaction {
    /// Look up an organization by natural key, seeing this transaction's own
    /// uncommitted writes.
    fn find_organization(&mut self, key: &NaturalKey) -> StorageResult<Option<Organization>>;

    /// Insert a new organization. Fails if the natural key is taken.
    fn insert_organization(&mut self, org: &Organization) -> StorageResult<()>;

    /// Overwrite an existing organization's mutable fields in place.
    fn update_organization(&mut self, org: &Organization) -> StorageResult<()>;

    /// Insert a grant. Both endpoints must already exist.
    fn insert_grant(&mut self, grant: &Grant) -> StorageResult<()>;

    /// Make every write of this transaction durable and visible.
    fn commit(self: Box<Self>) -> StorageResult<()>;

    /// Find the organization for `raw`'s natural key, or insert one built
    /// from `raw` if none exists. The inserted row is immediately visible to
    /// later lookups in the same transaction.
    fn find_or_create(&mut self, raw: &RawOrganization) -> StorageResult<Resolution> {
        if let Some(existing) = self.find_organization(&raw.natural_key())? {
            return Ok(Resolution::Found(existing));
        }
        let org = Organization::from_raw(raw);
        self.insert_organization(&org)?;
        Ok(Resolution::Created(org))
    }
}

/// Trait for registry storage backends
///
/// Implementations must be thread-safe (Send + Sync). They do not serialize
/// concurrent writers racing on the same natural key; a single loader per
/// store is expected.
pub trait RegistryStore: Send + Sync {
    /// Open a transaction. Only one may be open at a time.
    fn begin(&self) -> StorageResult<Box<dyn StoreTransaction + '_>>;

    // === Read side ===

    /// Load an organization by natural key
    fn get_organization(&self, key: &NaturalKey) -> StorageResult<Option<Organization>>;

    /// Load an organization by internal identity
    fn load_organization(&self, id: &OrgId) -> StorageResult<Option<Organization>>;

    fn count_organizations(&self) -> StorageResult<usize>;

    fn count_grants(&self) -> StorageResult<usize>;

    /// Grants where `funder` is the funding organization, oldest first
    fn grants_given(&self, funder: &OrgId) -> StorageResult<Vec<Grant>>;

    /// Grants where `grantee` is the receiving organization, oldest first
    fn grants_received(&self, grantee: &OrgId) -> StorageResult<Vec<Grant>>;
}

/// Extension trait for opening stores from paths
pub trait OpenStore: RegistryStore + Sized {
    /// Open or create a store at the given path
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory() -> StorageResult<Self>;
}
