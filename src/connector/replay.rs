//! Replay connector: yields pre-built batches
//!
//! Feeds batches captured earlier (or hand-written fixtures) through the same
//! loader path as a live source. Files are JSON arrays of batches.

use super::record::RawRecordBatch;
use super::traits::{Connector, ConnectorError, ConnectorResult, FetchWarning, RecordStream};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::Path;

/// Connector over an in-memory list of batches.
#[derive(Debug, Default)]
pub struct ReplayConnector {
    batches: Vec<RawRecordBatch>,
    failure: Option<ConnectorError>,
}

impl ReplayConnector {
    pub fn new(batches: Vec<RawRecordBatch>) -> Self {
        Self {
            batches,
            failure: None,
        }
    }

    /// Read a JSON array of batches from `path`.
    pub fn from_json_file(path: impl AsRef<Path>) -> ConnectorResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConnectorError::SourceUnavailable(format!("cannot read {}: {}", path.display(), e))
        })?;
        let batches: Vec<RawRecordBatch> = serde_json::from_str(&content)
            .map_err(|e| ConnectorError::Parse(format!("{}: {}", path.display(), e)))?;
        Ok(Self::new(batches))
    }

    /// Fail with `error` once every batch has been yielded.
    pub fn failing_with(mut self, error: ConnectorError) -> Self {
        self.failure = Some(error);
        self
    }
}

impl Connector for ReplayConnector {
    fn source_id(&self) -> &str {
        "replay"
    }

    fn fetch(self: Box<Self>) -> Box<dyn RecordStream> {
        Box::new(ReplayStream {
            pending: self.batches.into(),
            failure: self.failure,
        })
    }
}

struct ReplayStream {
    pending: VecDeque<RawRecordBatch>,
    failure: Option<ConnectorError>,
}

#[async_trait]
impl RecordStream for ReplayStream {
    async fn next_batch(&mut self) -> ConnectorResult<Option<RawRecordBatch>> {
        if let Some(batch) = self.pending.pop_front() {
            return Ok(Some(batch));
        }
        match self.failure.take() {
            Some(error) => Err(error),
            None => Ok(None),
        }
    }

    fn warnings(&self) -> &[FetchWarning] {
        &[]
    }
}
