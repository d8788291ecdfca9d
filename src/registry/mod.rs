//! Persisted registry entities
//!
//! Organizations are identified two ways: a durable internal [`OrgId`] and
//! the [`NaturalKey`] assigned by the external registry they came from.

mod grant;
mod organization;

pub use grant::{Grant, GrantId};
pub use organization::{NaturalKey, OrgId, Organization};
