//! Ingestion loader
//!
//! Consumes a connector's batch stream and reconciles it against a
//! `RegistryStore` without creating duplicate organizations.

mod cancel;
mod ingest;
mod stats;

pub use cancel::CancellationToken;
pub use ingest::{insert_grant, upsert_organization, Loader};
pub use stats::{LoadError, LoadFailure, LoadStats};
