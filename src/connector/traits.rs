//! Connector traits: the contract registry sources implement
//!
//! A connector turns its configuration into a single-pass stream of
//! [`RawRecordBatch`]es. Batches are produced one network step at a time so
//! the loader can commit early batches before the source is exhausted.

use super::record::RawRecordBatch;
use async_trait::async_trait;
use thiserror::Error;

/// Errors raised while fetching from a source.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// The source has no record for the requested identifier
    #[error("not found: {0}")]
    NotFound(String),

    /// Non-success response or an exhausted retry budget
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The source answered but the payload could not be interpreted
    #[error("parse error: {0}")]
    Parse(String),
}

impl ConnectorError {
    /// True for failures worth retrying: timeouts and connection errors.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

/// Result type for connector operations
pub type ConnectorResult<T> = Result<T, ConnectorError>;

/// A non-fatal condition signalled during a fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchWarning {
    /// Neither a query nor identifiers were configured; nothing was fetched
    NoSelection,
    /// The source reported "not found" for this identifier; it was skipped
    NotFound { identifier: String },
    /// A record inside an otherwise good response could not be normalized
    MalformedRecord { reason: String },
}

impl std::fmt::Display for FetchWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoSelection => write!(f, "no query or identifiers provided; nothing to fetch"),
            Self::NotFound { identifier } => write!(f, "identifier {} not found", identifier),
            Self::MalformedRecord { reason } => write!(f, "malformed record: {}", reason),
        }
    }
}

/// Recognized connector options.
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    /// Free-text search query
    pub query: Option<String>,
    /// Explicit identifiers, fetched in order
    pub identifiers: Vec<String>,
    /// Upper bound on search pages requested
    pub max_pages: usize,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            query: None,
            identifiers: Vec::new(),
            max_pages: 5,
        }
    }
}

impl ConnectorConfig {
    pub fn search(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            ..Self::default()
        }
    }

    pub fn by_identifiers<I, S>(identifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            identifiers: identifiers.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Resolve the single selection mode that will be honored.
    ///
    /// A non-empty identifier list takes precedence over the query. Blank
    /// identifiers and a blank query count as absent.
    pub fn selection(&self) -> FetchSelection {
        let identifiers: Vec<String> = self
            .identifiers
            .iter()
            .map(|id| id.trim())
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect();
        if !identifiers.is_empty() {
            return FetchSelection::ByIdentifiers(identifiers);
        }
        match self.query.as_deref().map(str::trim) {
            Some(q) if !q.is_empty() => FetchSelection::Search {
                query: q.to_string(),
                max_pages: self.max_pages,
            },
            _ => FetchSelection::Nothing,
        }
    }
}

/// The selection mode a connector runs in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchSelection {
    Search { query: String, max_pages: usize },
    ByIdentifiers(Vec<String>),
    Nothing,
}

/// A lazy, finite, single-pass sequence of batches.
///
/// `Ok(None)` signals exhaustion; once exhausted (or after an error) every
/// further call returns `Ok(None)`.
#[async_trait]
pub trait RecordStream: Send {
    /// Fetch the next batch from the source.
    async fn next_batch(&mut self) -> ConnectorResult<Option<RawRecordBatch>>;

    /// Warnings signalled so far.
    fn warnings(&self) -> &[FetchWarning];
}

/// The contract registry sources implement.
///
/// `fetch` consumes the connector: a fresh instance must be built to fetch
/// again.
pub trait Connector: Send {
    /// Unique identifier for this source (e.g. "propublica")
    fn source_id(&self) -> &str;

    /// Start fetching, yielding batches as responses arrive.
    fn fetch(self: Box<Self>) -> Box<dyn RecordStream>;
}
