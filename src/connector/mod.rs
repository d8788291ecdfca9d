//! Registry source connectors
//!
//! A connector streams normalized [`RawRecordBatch`]es out of one external
//! source. Additional sources implement [`Connector`] and [`RecordStream`].

mod client;
mod propublica;
mod record;
mod replay;
mod traits;

pub use client::{HttpClient, MockClient, MockDetail, ProPublicaApi, PROPUBLICA_API};
pub use propublica::{parse_organization, ProPublicaConnector, IRS_REGISTRY};
pub use record::{RawGrant, RawOrganization, RawRecordBatch};
pub use replay::ReplayConnector;
pub use traits::{
    Connector, ConnectorConfig, ConnectorError, ConnectorResult, FetchSelection, FetchWarning,
    RecordStream,
};
