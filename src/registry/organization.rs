//! Organization entity and its natural key

use crate::connector::RawOrganization;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Durable identity of a persisted organization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrgId(Uuid);

impl OrgId {
    /// Create a new random OrgId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an OrgId from an existing UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for OrgId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OrgId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The (`registry`, `external_id`) pair that identifies an organization
/// across ingestion runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NaturalKey {
    /// Source-system tag, e.g. "IRS"
    pub registry: String,
    /// Identifier unique within the registry
    pub external_id: String,
}

impl NaturalKey {
    pub fn new(registry: impl Into<String>, external_id: impl Into<String>) -> Self {
        Self {
            registry: registry.into(),
            external_id: external_id.into(),
        }
    }
}

impl std::fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.registry, self.external_id)
    }
}

/// A persisted organization.
///
/// At most one exists per natural key. Descriptive fields are mutated in
/// place when the same key is ingested again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrgId,
    pub registry: String,
    pub external_id: String,
    pub name: String,
    pub country: Option<String>,
    pub website: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Organization {
    /// Build a new, not yet persisted organization carrying every field of
    /// the raw record.
    pub fn from_raw(raw: &RawOrganization) -> Self {
        let now = Utc::now();
        Self {
            id: OrgId::new(),
            registry: raw.registry.clone(),
            external_id: raw.external_id.clone(),
            name: raw.name.clone(),
            country: raw.country.clone(),
            website: raw.website.clone(),
            city: raw.city.clone(),
            region: raw.region.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey::new(&self.registry, &self.external_id)
    }

    /// Merge a re-ingested record into this organization.
    ///
    /// `name` is always replaced. The optional descriptive fields are only
    /// replaced by non-blank incoming values, so a blank in the source never
    /// erases what is already known.
    pub fn apply_update(&mut self, raw: &RawOrganization) {
        self.name = raw.name.clone();
        merge_field(&mut self.country, &raw.country);
        merge_field(&mut self.website, &raw.website);
        merge_field(&mut self.city, &raw.city);
        merge_field(&mut self.region, &raw.region);
        self.updated_at = Utc::now();
    }
}

fn merge_field(existing: &mut Option<String>, incoming: &Option<String>) {
    if let Some(value) = incoming.as_deref().filter(|v| !v.trim().is_empty()) {
        *existing = Some(value.to_string());
    }
}
