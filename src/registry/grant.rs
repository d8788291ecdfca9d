//! Grant entity: an append-only funding link between two organizations

use super::organization::OrgId;
use crate::connector::RawGrant;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Durable identity of a persisted grant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GrantId(Uuid);

impl GrantId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for GrantId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for GrantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A persisted grant.
///
/// Both endpoints reference organizations that already exist. Grants are
/// never updated; ingesting the same raw grant twice yields two rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grant {
    pub id: GrantId,
    pub funder_org_id: OrgId,
    pub grantee_org_id: OrgId,
    pub amount: Option<Decimal>,
    pub year: Option<i32>,
    pub source: String,
    pub created_at: DateTime<Utc>,
}

impl Grant {
    /// Build a grant between two resolved organizations, copying amount,
    /// year and source from the raw record.
    pub fn link(funder: OrgId, grantee: OrgId, raw: &RawGrant) -> Self {
        Self {
            id: GrantId::new(),
            funder_org_id: funder,
            grantee_org_id: grantee,
            amount: raw.amount,
            year: raw.year,
            source: raw.source.clone(),
            created_at: Utc::now(),
        }
    }
}
