//! Raw records as seen from an external source
//!
//! These are transient: a connector builds them for one fetch step and the
//! loader discards them once the batch is committed.

use crate::registry::NaturalKey;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An organization as reported by a registry source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawOrganization {
    pub name: String,
    pub registry: String,
    pub external_id: String,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
}

impl RawOrganization {
    pub fn new(
        name: impl Into<String>,
        registry: impl Into<String>,
        external_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            registry: registry.into(),
            external_id: external_id.into(),
            country: None,
            website: None,
            city: None,
            region: None,
        }
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn with_website(mut self, website: impl Into<String>) -> Self {
        self.website = Some(website.into());
        self
    }

    pub fn with_city(mut self, city: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey::new(&self.registry, &self.external_id)
    }
}

/// A grant between two organizations, referenced by natural key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawGrant {
    pub funder_registry: String,
    pub funder_external_id: String,
    pub grantee_registry: String,
    pub grantee_external_id: String,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub source: String,
}

impl RawGrant {
    pub fn new(funder: NaturalKey, grantee: NaturalKey) -> Self {
        Self {
            funder_registry: funder.registry,
            funder_external_id: funder.external_id,
            grantee_registry: grantee.registry,
            grantee_external_id: grantee.external_id,
            amount: None,
            year: None,
            source: String::new(),
        }
    }

    pub fn with_amount(mut self, amount: Decimal) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn funder_key(&self) -> NaturalKey {
        NaturalKey::new(&self.funder_registry, &self.funder_external_id)
    }

    pub fn grantee_key(&self) -> NaturalKey {
        NaturalKey::new(&self.grantee_registry, &self.grantee_external_id)
    }
}

/// Organizations and grants produced together by one fetch step.
///
/// The loader commits a batch as a single unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecordBatch {
    #[serde(default)]
    pub organizations: Vec<RawOrganization>,
    #[serde(default)]
    pub grants: Vec<RawGrant>,
}

impl RawRecordBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_organization(mut self, org: RawOrganization) -> Self {
        self.organizations.push(org);
        self
    }

    pub fn with_grant(mut self, grant: RawGrant) -> Self {
        self.grants.push(grant);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.organizations.is_empty() && self.grants.is_empty()
    }

    /// Total number of records in the batch
    pub fn len(&self) -> usize {
        self.organizations.len() + self.grants.len()
    }
}
