//! ProPublica Nonprofit Explorer connector
//!
//! Two modes:
//! - search: keyword search, one batch per non-empty results page
//! - by-identifier: one batch per EIN, skipping EINs the source does not know
//!   or returns without a usable record

use super::client::ProPublicaApi;
use super::record::{RawOrganization, RawRecordBatch};
use super::traits::{
    Connector, ConnectorConfig, ConnectorError, ConnectorResult, FetchSelection, FetchWarning,
    RecordStream,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Registry tag for organizations coming from this source
pub const IRS_REGISTRY: &str = "IRS";

const SOURCE_COUNTRY: &str = "US";

/// Connector for the ProPublica Nonprofit Explorer API.
pub struct ProPublicaConnector {
    api: Arc<dyn ProPublicaApi>,
    config: ConnectorConfig,
    max_retries: u32,
    retry_backoff: Duration,
}

impl ProPublicaConnector {
    pub fn new(api: Arc<dyn ProPublicaApi>, config: ConnectorConfig) -> Self {
        Self {
            api,
            config,
            max_retries: 0,
            retry_backoff: Duration::from_millis(500),
        }
    }

    /// Retry transient search failures up to `max_retries` times, waiting
    /// `backoff * attempt` between attempts.
    pub fn with_retries(mut self, max_retries: u32, backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_backoff = backoff;
        self
    }
}

impl Connector for ProPublicaConnector {
    fn source_id(&self) -> &str {
        "propublica"
    }

    fn fetch(self: Box<Self>) -> Box<dyn RecordStream> {
        let mut warnings = Vec::new();
        let state = match self.config.selection() {
            FetchSelection::Search { query, max_pages } => StreamState::Search {
                query,
                next_page: 0,
                max_pages,
            },
            FetchSelection::ByIdentifiers(eins) => StreamState::ByIdentifiers {
                pending: eins.into(),
            },
            FetchSelection::Nothing => {
                let warning = FetchWarning::NoSelection;
                warn!("{}", warning);
                warnings.push(warning);
                StreamState::Exhausted
            }
        };

        Box::new(ProPublicaStream {
            api: self.api,
            state,
            warnings,
            max_retries: self.max_retries,
            retry_backoff: self.retry_backoff,
        })
    }
}

enum StreamState {
    Search {
        query: String,
        next_page: usize,
        max_pages: usize,
    },
    ByIdentifiers {
        pending: VecDeque<String>,
    },
    Exhausted,
}

struct ProPublicaStream {
    api: Arc<dyn ProPublicaApi>,
    state: StreamState,
    warnings: Vec<FetchWarning>,
    max_retries: u32,
    retry_backoff: Duration,
}

impl ProPublicaStream {
    async fn next_search_page(&mut self) -> ConnectorResult<Option<RawRecordBatch>> {
        let (query, page, max_pages) = match &self.state {
            StreamState::Search {
                query,
                next_page,
                max_pages,
            } => (query.clone(), *next_page, *max_pages),
            _ => return Ok(None),
        };
        if page >= max_pages {
            self.state = StreamState::Exhausted;
            return Ok(None);
        }

        info!(query = %query, page, "searching ProPublica");
        let results = self.search_with_retry(&query, page).await?;
        if let StreamState::Search { next_page, .. } = &mut self.state {
            *next_page += 1;
        }

        if results.is_empty() {
            debug!(page, "empty results page, search exhausted");
            self.state = StreamState::Exhausted;
            return Ok(None);
        }

        let mut batch = RawRecordBatch::new();
        for data in &results {
            match parse_organization(data) {
                Ok(org) => batch.organizations.push(org),
                Err(e) => {
                    let warning = FetchWarning::MalformedRecord {
                        reason: e.to_string(),
                    };
                    warn!(page, "skipping search result: {}", warning);
                    self.warnings.push(warning);
                }
            }
        }
        Ok(Some(batch))
    }

    async fn search_with_retry(&self, query: &str, page: usize) -> ConnectorResult<Vec<Value>> {
        let mut attempt: u32 = 0;
        loop {
            match self.api.search(query, page).await {
                Ok(results) => return Ok(results),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(page, attempt, error = %e, "transient search failure, retrying");
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                }
                Err(e) if e.is_transient() => {
                    return Err(ConnectorError::SourceUnavailable(format!(
                        "search page {} failed after {} attempt(s): {}",
                        page,
                        attempt + 1,
                        e
                    )))
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn next_identifier(&mut self) -> ConnectorResult<Option<RawRecordBatch>> {
        loop {
            let ein = match &mut self.state {
                StreamState::ByIdentifiers { pending } => pending.pop_front(),
                _ => None,
            };
            let Some(ein) = ein else {
                self.state = StreamState::Exhausted;
                return Ok(None);
            };

            info!(ein = %ein, "fetching ProPublica organization");
            match self.api.organization(&ein).await {
                Ok(data) => match parse_organization(&data) {
                    Ok(org) => return Ok(Some(RawRecordBatch::new().with_organization(org))),
                    Err(e) => {
                        let warning = FetchWarning::MalformedRecord {
                            reason: format!("{}: {}", ein, e),
                        };
                        warn!("skipping ProPublica organization: {}", warning);
                        self.warnings.push(warning);
                    }
                },
                Err(ConnectorError::NotFound(_)) => {
                    let warning = FetchWarning::NotFound { identifier: ein };
                    warn!("{} in ProPublica, skipping", warning);
                    self.warnings.push(warning);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl RecordStream for ProPublicaStream {
    async fn next_batch(&mut self) -> ConnectorResult<Option<RawRecordBatch>> {
        let result = match self.state {
            StreamState::Exhausted => return Ok(None),
            StreamState::Search { .. } => self.next_search_page().await,
            StreamState::ByIdentifiers { .. } => self.next_identifier().await,
        };
        if result.is_err() {
            self.state = StreamState::Exhausted;
        }
        result
    }

    fn warnings(&self) -> &[FetchWarning] {
        &self.warnings
    }
}

/// Normalize one ProPublica organization payload.
///
/// The EIN may arrive as a JSON number or string and is kept as trimmed
/// text. Missing descriptive fields become `None`; a missing EIN is an error.
pub fn parse_organization(data: &Value) -> ConnectorResult<RawOrganization> {
    let ein = match data.get("ein") {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    };
    if ein.is_empty() {
        return Err(ConnectorError::Parse(
            "organization record has no ein".to_string(),
        ));
    }

    let name = text_field(data, "name").unwrap_or_default();
    let mut org = RawOrganization::new(name, IRS_REGISTRY, ein).with_country(SOURCE_COUNTRY);
    org.city = text_field(data, "city");
    org.region = text_field(data, "state");
    Ok(org)
}

fn text_field(data: &Value, field: &str) -> Option<String> {
    data.get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
