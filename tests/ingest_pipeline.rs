//! End-to-end ingestion: connector → loader → store
//!
//! Exercises the public API only, with `MockClient` standing in for the
//! network and SQLite (in memory or on disk) as the store.

mod common;

use common::{memory_store, organization_detail, search_page};
use grant_indexer::connector::{MockClient, MockDetail};
use grant_indexer::{
    CancellationToken, Connector, ConnectorConfig, ConnectorError, FetchWarning, LoadError,
    LoadStats, Loader, NaturalKey, OpenStore, ProPublicaConnector, RawGrant, RawOrganization,
    RawRecordBatch, RegistryStore, ReplayConnector, SqliteStore,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;

fn irs(id: &str) -> NaturalKey {
    NaturalKey::new("IRS", id)
}

fn propublica(api: Arc<MockClient>, config: ConnectorConfig) -> Box<ProPublicaConnector> {
    Box::new(ProPublicaConnector::new(api, config).with_retries(1, Duration::ZERO))
}

#[tokio::test]
async fn example_batch_creates_two_orgs_and_links_grant() {
    let store = memory_store();
    let batch = RawRecordBatch::new()
        .with_organization(RawOrganization::new("A", "IRS", "1"))
        .with_organization(RawOrganization::new("B", "IRS", "2"))
        .with_grant(
            RawGrant::new(irs("1"), irs("2"))
                .with_amount(Decimal::from(1000))
                .with_year(2023),
        );
    let mut stream = Box::new(ReplayConnector::new(vec![batch])).fetch();

    let stats = Loader::new(store.clone()).load(stream.as_mut()).await.unwrap();

    assert_eq!(
        stats,
        LoadStats {
            orgs_created: 2,
            orgs_updated: 0,
            grants_created: 1
        }
    );
    let a = store.get_organization(&irs("1")).unwrap().unwrap();
    let b = store.get_organization(&irs("2")).unwrap().unwrap();
    let grants = store.grants_given(&a.id).unwrap();
    assert_eq!(grants.len(), 1);
    assert_eq!(grants[0].funder_org_id, a.id);
    assert_eq!(grants[0].grantee_org_id, b.id);
}

#[tokio::test]
async fn search_pagination_respects_max_pages() {
    let store = memory_store();
    let api = Arc::new(
        MockClient::new()
            .with_page(search_page(100, 25))
            .with_page(search_page(200, 25))
            .with_page(search_page(300, 25))
            .with_page(search_page(400, 25)),
    );
    let mut stream = propublica(api.clone(), ConnectorConfig::search("arts").with_max_pages(3)).fetch();

    let stats = Loader::new(store.clone()).load(stream.as_mut()).await.unwrap();

    assert_eq!(api.search_requests(), 3);
    assert_eq!(stats.orgs_created, 75);
    assert_eq!(store.count_organizations().unwrap(), 75);
}

#[tokio::test]
async fn search_pagination_stops_at_first_empty_page() {
    let store = memory_store();
    let api = Arc::new(
        MockClient::new()
            .with_page(search_page(100, 10))
            .with_page(search_page(200, 4)),
    );
    let mut stream = propublica(api.clone(), ConnectorConfig::search("arts").with_max_pages(5)).fetch();

    let stats = Loader::new(store).load(stream.as_mut()).await.unwrap();

    assert_eq!(api.search_requests(), 3);
    assert_eq!(stats.orgs_created, 14);
}

#[tokio::test]
async fn identifier_mode_skips_not_found_and_warns_once() {
    let store = memory_store();
    let api = Arc::new(
        MockClient::new()
            .with_detail("111", MockDetail::Found(organization_detail("111", "First")))
            .with_detail("222", MockDetail::NotFound)
            .with_detail("333", MockDetail::Found(organization_detail("333", "Third"))),
    );
    let mut stream = propublica(api, ConnectorConfig::by_identifiers(["111", "222", "333"])).fetch();

    let stats = Loader::new(store.clone()).load(stream.as_mut()).await.unwrap();

    assert_eq!(stats.orgs_created, 2);
    assert_eq!(
        stream.warnings(),
        &[FetchWarning::NotFound {
            identifier: "222".to_string()
        }]
    );
    let third = store.get_organization(&irs("333")).unwrap().unwrap();
    assert_eq!(third.name, "Third");
    assert_eq!(third.city.as_deref(), Some("Albany"));
}

#[tokio::test]
async fn identifier_mode_aborts_on_server_error_keeping_committed_batches() {
    let store = memory_store();
    let api = Arc::new(
        MockClient::new()
            .with_detail("111", MockDetail::Found(organization_detail("111", "First")))
            .with_detail("222", MockDetail::Unavailable(500))
            .with_detail("333", MockDetail::Found(organization_detail("333", "Third"))),
    );
    let mut stream = propublica(api.clone(), ConnectorConfig::by_identifiers(["111", "222", "333"])).fetch();

    let failure = Loader::new(store.clone())
        .load(stream.as_mut())
        .await
        .unwrap_err();

    assert!(matches!(
        failure.error,
        LoadError::Source(ConnectorError::SourceUnavailable(_))
    ));
    assert_eq!(failure.stats.orgs_created, 1);
    assert_eq!(store.count_organizations().unwrap(), 1);
    assert_eq!(api.detail_requests(), vec!["111", "222"]);
}

#[tokio::test]
async fn repeated_search_updates_without_erasing_location() {
    let store = memory_store();
    let first = Arc::new(MockClient::new().with_page(search_page(500, 3)));
    let mut stream = propublica(first, ConnectorConfig::search("arts")).fetch();
    Loader::new(store.clone()).load(stream.as_mut()).await.unwrap();

    // Same EINs come back by identifier with different descriptive data
    let second = Arc::new(MockClient::new().with_detail(
        "500",
        MockDetail::Found(serde_json::json!({"ein": "500", "name": "Renamed", "city": ""})),
    ));
    let mut stream = propublica(second, ConnectorConfig::by_identifiers(["500"])).fetch();
    let stats = Loader::new(store.clone()).load(stream.as_mut()).await.unwrap();

    assert_eq!(stats.orgs_updated, 1);
    assert_eq!(stats.orgs_created, 0);
    let org = store.get_organization(&irs("500")).unwrap().unwrap();
    assert_eq!(org.name, "Renamed");
    assert_eq!(org.city.as_deref(), Some("Portland"));
    assert_eq!(org.region.as_deref(), Some("OR"));
    assert_eq!(store.count_organizations().unwrap(), 3);
}

#[tokio::test]
async fn cancelled_run_commits_nothing_further() {
    let store = memory_store();
    let token = CancellationToken::new();
    token.cancel();
    let mut stream = Box::new(ReplayConnector::new(vec![
        RawRecordBatch::new().with_organization(RawOrganization::new("A", "IRS", "1")),
    ]))
    .fetch();

    let failure = Loader::new(store.clone())
        .with_cancellation(token)
        .load(stream.as_mut())
        .await
        .unwrap_err();

    assert!(matches!(failure.error, LoadError::Cancelled));
    assert_eq!(failure.stats, LoadStats::default());
    assert_eq!(store.count_organizations().unwrap(), 0);
}

#[tokio::test]
async fn progress_survives_reopening_the_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("registry.db");

    {
        let store = Arc::new(SqliteStore::open(&path).unwrap());
        let mut stream = Box::new(
            ReplayConnector::new(vec![
                RawRecordBatch::new().with_organization(RawOrganization::new("A", "IRS", "1")),
            ])
            .failing_with(ConnectorError::Timeout("page 1".into())),
        )
        .fetch();
        let failure = Loader::new(store).load(stream.as_mut()).await.unwrap_err();
        assert_eq!(failure.stats.orgs_created, 1);
    }

    let store = Arc::new(SqliteStore::open(&path).unwrap());
    let mut stream = Box::new(ReplayConnector::new(vec![RawRecordBatch::new()
        .with_organization(RawOrganization::new("A", "IRS", "1"))
        .with_organization(RawOrganization::new("B", "IRS", "2"))
        .with_grant(RawGrant::new(irs("1"), irs("2")))]))
    .fetch();
    let stats = Loader::new(store.clone()).load(stream.as_mut()).await.unwrap();

    assert_eq!(
        stats,
        LoadStats {
            orgs_created: 1,
            orgs_updated: 1,
            grants_created: 1
        }
    );
    assert_eq!(store.count_organizations().unwrap(), 2);
}

#[test]
fn loader_runs_on_a_plain_blocking_executor() {
    let store = memory_store();
    let mut stream = Box::new(ReplayConnector::new(vec![
        RawRecordBatch::new().with_organization(RawOrganization::new("A", "IRS", "1")),
    ]))
    .fetch();

    let stats = tokio_test::block_on(Loader::new(store).load(stream.as_mut())).unwrap();

    assert_eq!(stats.orgs_created, 1);
}
