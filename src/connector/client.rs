//! ProPublica Nonprofit Explorer API client
//!
//! Two implementations of [`ProPublicaApi`]:
//! - `HttpClient`: talks to the live API over reqwest (production)
//! - `MockClient`: returns preconfigured pages and records (testing)

use super::traits::{ConnectorError, ConnectorResult};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Base URL of the public API
pub const PROPUBLICA_API: &str = "https://projects.propublica.org/nonprofits/api/v2";

/// Client trait for the two ProPublica endpoints the connector uses.
///
/// Organization payloads are returned as raw JSON; the connector owns
/// normalization.
#[async_trait]
pub trait ProPublicaApi: Send + Sync {
    /// `GET {api_base}/search.json?q={query}&page={page}`.
    ///
    /// An empty vector means the source has no more results.
    async fn search(&self, query: &str, page: usize) -> ConnectorResult<Vec<Value>>;

    /// `GET {api_base}/organizations/{ein}.json`.
    ///
    /// HTTP 404 maps to `ConnectorError::NotFound`.
    async fn organization(&self, ein: &str) -> ConnectorResult<Value>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    organizations: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct OrganizationResponse {
    #[serde(default)]
    organization: Option<Value>,
}

/// reqwest-backed client for the live API.
pub struct HttpClient {
    http: Client,
    api_base: Url,
}

impl HttpClient {
    /// Create a client against `api_base` with a per-request timeout.
    pub fn new(api_base: &str, timeout: Duration, user_agent: &str) -> ConnectorResult<Self> {
        let api_base = Url::parse(api_base.trim_end_matches('/'))
            .map_err(|e| ConnectorError::Parse(format!("invalid api base {}: {}", api_base, e)))?;
        if api_base.cannot_be_a_base() {
            return Err(ConnectorError::Parse(format!("invalid api base {}", api_base)));
        }
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;

        Ok(Self { http, api_base })
    }

    pub fn api_base(&self) -> &str {
        self.api_base.as_str()
    }

    /// `api_base` extended by `segments`, each percent-encoded as a single
    /// path segment.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.api_base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

/// Classify a send/receive failure: timeouts are transient, the rest are
/// passed through as HTTP errors.
fn request_error(what: &str, e: reqwest::Error) -> ConnectorError {
    if e.is_timeout() {
        ConnectorError::Timeout(format!("{}: {}", what, e))
    } else if e.is_decode() {
        ConnectorError::Parse(format!("{}: {}", what, e))
    } else {
        ConnectorError::Http(e)
    }
}

#[async_trait]
impl ProPublicaApi for HttpClient {
    async fn search(&self, query: &str, page: usize) -> ConnectorResult<Vec<Value>> {
        let what = format!("search page {}", page);
        let url = self.endpoint(&["search.json"]);

        let response = self
            .http
            .get(url)
            .query(&[("q", query.to_string()), ("page", page.to_string())])
            .send()
            .await
            .map_err(|e| request_error(&what, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ConnectorError::SourceUnavailable(format!(
                "{} returned {}",
                what, status
            )));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| request_error(&what, e))?;
        Ok(body.organizations.unwrap_or_default())
    }

    async fn organization(&self, ein: &str) -> ConnectorResult<Value> {
        let what = format!("organization {}", ein);
        let url = self.endpoint(&["organizations", &format!("{}.json", ein)]);

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| request_error(&what, e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ConnectorError::NotFound(ein.to_string()));
        }
        if !status.is_success() {
            return Err(ConnectorError::SourceUnavailable(format!(
                "{} returned {}",
                what, status
            )));
        }

        let body: OrganizationResponse = response
            .json()
            .await
            .map_err(|e| request_error(&what, e))?;
        body.organization
            .ok_or_else(|| ConnectorError::Parse(format!("{}: response has no organization", what)))
    }
}

/// Canned outcome for a by-identifier request.
#[derive(Debug, Clone)]
pub enum MockDetail {
    Found(Value),
    NotFound,
    /// Non-success status other than 404
    Unavailable(u16),
    Timeout,
}

/// Mock client for tests. Returns preconfigured responses and counts
/// requests.
#[derive(Default)]
pub struct MockClient {
    pages: Vec<Vec<Value>>,
    details: HashMap<String, MockDetail>,
    /// Per-page queue of failures returned before the page itself
    search_failures: Mutex<HashMap<usize, VecDeque<ConnectorError>>>,
    search_requests: AtomicUsize,
    detail_requests: Mutex<Vec<String>>,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a search results page. Pages past the last one are empty.
    pub fn with_page(mut self, organizations: Vec<Value>) -> Self {
        self.pages.push(organizations);
        self
    }

    /// Register the outcome for an identifier. Unregistered identifiers are
    /// reported as not found.
    pub fn with_detail(mut self, ein: impl Into<String>, detail: MockDetail) -> Self {
        self.details.insert(ein.into(), detail);
        self
    }

    /// Make the next request for `page` fail with `error` (queued; each call
    /// adds one more failure before the page succeeds).
    pub fn with_search_failure(self, page: usize, error: ConnectorError) -> Self {
        if let Ok(mut failures) = self.search_failures.lock() {
            failures.entry(page).or_default().push_back(error);
        }
        self
    }

    /// Number of search requests issued so far
    pub fn search_requests(&self) -> usize {
        self.search_requests.load(Ordering::SeqCst)
    }

    /// Identifiers requested so far, in order
    pub fn detail_requests(&self) -> Vec<String> {
        self.detail_requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ProPublicaApi for MockClient {
    async fn search(&self, _query: &str, page: usize) -> ConnectorResult<Vec<Value>> {
        self.search_requests.fetch_add(1, Ordering::SeqCst);

        let queued = self
            .search_failures
            .lock()
            .ok()
            .and_then(|mut failures| failures.get_mut(&page).and_then(|q| q.pop_front()));
        if let Some(error) = queued {
            return Err(error);
        }

        Ok(self.pages.get(page).cloned().unwrap_or_default())
    }

    async fn organization(&self, ein: &str) -> ConnectorResult<Value> {
        if let Ok(mut requests) = self.detail_requests.lock() {
            requests.push(ein.to_string());
        }

        match self.details.get(ein) {
            Some(MockDetail::Found(value)) => Ok(value.clone()),
            Some(MockDetail::Unavailable(status)) => Err(ConnectorError::SourceUnavailable(
                format!("organization {} returned {}", ein, status),
            )),
            Some(MockDetail::Timeout) => Err(ConnectorError::Timeout(format!("organization {}", ein))),
            Some(MockDetail::NotFound) | None => Err(ConnectorError::NotFound(ein.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Serve one canned HTTP response on 127.0.0.1 and resolve to the
    /// request line the client sent.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            String::from_utf8_lossy(&request)
                .lines()
                .next()
                .unwrap_or_default()
                .to_string()
        });
        (format!("http://{}/api", addr), handle)
    }

    fn local_client(api_base: &str) -> HttpClient {
        HttpClient {
            http: Client::builder()
                .no_proxy()
                .timeout(Duration::from_secs(5))
                .build()
                .unwrap(),
            api_base: Url::parse(api_base).unwrap(),
        }
    }

    #[tokio::test]
    async fn http_search_sends_query_and_page() {
        let (base, server) = serve_once("200 OK", r#"{"organizations": [{"ein": 1}, {"ein": 2}]}"#).await;

        let results = local_client(&base).search("food bank", 2).await.unwrap();

        assert_eq!(results.len(), 2);
        let request_line = server.await.unwrap();
        assert!(
            request_line.starts_with("GET /api/search.json?q=food+bank&page=2 "),
            "{}",
            request_line
        );
    }

    #[tokio::test]
    async fn http_search_without_organizations_is_end_of_results() {
        let (base, _server) = serve_once("200 OK", r#"{"total_results": 0}"#).await;

        let results = local_client(&base).search("food bank", 7).await.unwrap();

        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn http_search_error_status_is_source_unavailable() {
        let (base, _server) = serve_once("503 Service Unavailable", "{}").await;

        let err = local_client(&base).search("food bank", 0).await.unwrap_err();

        assert!(matches!(err, ConnectorError::SourceUnavailable(ref msg) if msg.contains("503")));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn http_organization_unwraps_detail_object() {
        let (base, server) = serve_once("200 OK", r#"{"organization": {"ein": 131624100, "name": "Acme"}}"#).await;

        let detail = local_client(&base).organization("131624100").await.unwrap();

        assert_eq!(detail["name"], "Acme");
        let request_line = server.await.unwrap();
        assert!(request_line.starts_with("GET /api/organizations/131624100.json "), "{}", request_line);
    }

    #[tokio::test]
    async fn http_organization_404_is_not_found() {
        let (base, _server) = serve_once("404 Not Found", r#"{"error": "not found"}"#).await;

        let err = local_client(&base).organization("999").await.unwrap_err();

        assert!(matches!(err, ConnectorError::NotFound(ref id) if id == "999"));
    }

    #[tokio::test]
    async fn http_organization_error_status_is_source_unavailable() {
        let (base, _server) = serve_once("503 Service Unavailable", "{}").await;

        let err = local_client(&base).organization("111").await.unwrap_err();

        assert!(matches!(err, ConnectorError::SourceUnavailable(_)));
    }

    #[tokio::test]
    async fn http_organization_escapes_identifier_into_one_segment() {
        let (base, server) = serve_once("404 Not Found", "{}").await;

        let err = local_client(&base).organization("12/34?x#y").await.unwrap_err();

        assert!(matches!(err, ConnectorError::NotFound(_)));
        let request_line = server.await.unwrap();
        assert!(
            request_line.starts_with("GET /api/organizations/12%2F34%3Fx%23y.json "),
            "{}",
            request_line
        );
    }

    #[test]
    fn http_client_rejects_unusable_api_base() {
        let err = HttpClient::new("not a url", Duration::from_secs(1), "grant-indexer-test");
        assert!(matches!(err, Err(ConnectorError::Parse(_))));
    }

    #[test]
    fn http_client_strips_trailing_slash() {
        let client = HttpClient::new(
            "http://localhost:9/api/",
            Duration::from_secs(1),
            "grant-indexer-test",
        )
        .unwrap();
        assert_eq!(client.api_base(), "http://localhost:9/api");
    }

    #[test]
    fn search_response_tolerates_missing_array() {
        let body: SearchResponse = serde_json::from_value(json!({"total_results": 0})).unwrap();
        assert!(body.organizations.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn mock_search_counts_requests_and_ends_with_empty_page() {
        let client = MockClient::new().with_page(vec![json!({"ein": 1})]);
        assert_eq!(client.search("x", 0).await.unwrap().len(), 1);
        assert!(client.search("x", 1).await.unwrap().is_empty());
        assert_eq!(client.search_requests(), 2);
    }

    #[tokio::test]
    async fn mock_search_failures_are_consumed_in_order() {
        let client = MockClient::new()
            .with_page(vec![json!({"ein": 1})])
            .with_search_failure(0, ConnectorError::Timeout("page 0".into()));
        assert!(client.search("x", 0).await.is_err());
        assert!(client.search("x", 0).await.is_ok());
    }

    #[tokio::test]
    async fn mock_unknown_identifier_is_not_found() {
        let client = MockClient::new();
        let err = client.organization("999").await.unwrap_err();
        assert!(matches!(err, ConnectorError::NotFound(ref id) if id == "999"));
        assert_eq!(client.detail_requests(), vec!["999".to_string()]);
    }
}
