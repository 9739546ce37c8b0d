//! End-to-end tests for `run_price_cycle`: a `wiremock` storefront,
//! in-memory persistence and a recording archive.

use std::sync::Mutex;
use std::time::Duration;

use roastdb_core::{
    ArchiveError, ArchiveMetadata, ArchiveStatus, Credentials, PersistenceClient,
    PersistenceError, Platform, PriceRecord, PricingUpdate, RawResponseStore, VariantSnapshot,
};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use roastdb_scraper::resilience::{
    BackoffPolicy, BackoffRetrier, CircuitBreaker, CircuitBreakerConfig, CircuitPhase,
};
use roastdb_scraper::{
    run_price_cycle, CycleDeps, CycleError, FetchConfig, Fetcher, Filters, PageTermination,
    ShopifyAdapter,
};

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryStore {
    prior: Vec<VariantSnapshot>,
    unavailable: bool,
    /// Variant whose price rows are rejected.
    reject_variant: Option<&'static str>,
    inserted: Mutex<Vec<PriceRecord>>,
    updated: Mutex<Vec<PricingUpdate>>,
}

impl MemoryStore {
    fn with_prior(prior: Vec<VariantSnapshot>) -> Self {
        Self {
            prior,
            ..Self::default()
        }
    }
}

impl PersistenceClient for MemoryStore {
    async fn latest_snapshots(
        &self,
        _source_id: &str,
    ) -> Result<Vec<VariantSnapshot>, PersistenceError> {
        if self.unavailable {
            return Err(PersistenceError::Unavailable("connection refused".to_string()));
        }
        Ok(self.prior.clone())
    }

    async fn insert_price(&self, record: &PriceRecord) -> Result<String, PersistenceError> {
        if self.reject_variant == Some(record.variant_id.as_str()) {
            return Err(PersistenceError::Rejected {
                variant_id: record.variant_id.clone(),
                reason: "duplicate observation".to_string(),
            });
        }
        let mut inserted = self.inserted.lock().unwrap();
        inserted.push(record.clone());
        Ok(format!("price-{}", inserted.len()))
    }

    async fn update_variant_pricing(
        &self,
        update: &PricingUpdate,
    ) -> Result<bool, PersistenceError> {
        self.updated.lock().unwrap().push(update.clone());
        Ok(true)
    }
}

#[derive(Default)]
struct RecordingArchive {
    fail: bool,
    calls: Mutex<Vec<(String, ArchiveStatus, usize)>>,
}

impl RawResponseStore for RecordingArchive {
    async fn store(
        &self,
        source_id: &str,
        _platform: Platform,
        payload: &Value,
        metadata: &ArchiveMetadata,
        status: ArchiveStatus,
    ) -> Result<(), ArchiveError> {
        if self.fail {
            return Err(ArchiveError::Io(std::io::Error::other("disk full")));
        }
        assert_eq!(
            payload.as_array().map(Vec::len),
            Some(metadata.product_count)
        );
        self.calls
            .lock()
            .unwrap()
            .push((source_id.to_string(), status, metadata.product_count));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn shopify(server: &MockServer) -> ShopifyAdapter {
    let config = FetchConfig {
        timeout: Duration::from_secs(5),
        max_retries: 0,
        retry_base_delay: Duration::from_millis(1),
        politeness_delay: Duration::ZERO,
        jitter_range: Duration::ZERO,
        max_concurrent: 1,
    };
    let fetcher = Fetcher::new(config, "roastdb-test/0.1").expect("failed to build Fetcher");
    ShopifyAdapter::from_parts(&server.uri(), Credentials::Anonymous, fetcher)
}

fn fast_retrier(max_attempts: u32) -> BackoffRetrier {
    BackoffRetrier::new(BackoffPolicy {
        base_delay: Duration::from_millis(1),
        multiplier: 2.0,
        max_delay: Duration::from_millis(5),
        max_attempts,
        jitter_range: 0.1,
    })
}

fn breaker() -> CircuitBreaker {
    CircuitBreaker::new("persistence", CircuitBreakerConfig::default())
}

fn snapshot(variant_id: &str, price: &str, in_stock: bool) -> VariantSnapshot {
    VariantSnapshot {
        variant_id: variant_id.to_string(),
        price: price.parse().unwrap(),
        currency: "USD".to_string(),
        in_stock,
        sku: None,
        weight_grams: None,
    }
}

async fn mount_catalog(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/products.json"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "products": [{
                "id": 1,
                "title": "Kenya Kiambu",
                "variants": [
                    {"id": 101, "title": "12 oz", "price": "29.99", "available": true, "sku": "KEN-12"},
                    {"id": 102, "title": "2 lb", "price": "64.00", "available": true, "sku": "KEN-2LB"}
                ]
            }]
        })))
        .mount(server)
        .await;
}

// ---------------------------------------------------------------------------
// Cycles
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cycle_records_price_changes_and_updates_every_delta() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;

    let store = MemoryStore::with_prior(vec![snapshot("101", "25.99", true)]);
    let archive = RecordingArchive::default();
    let breaker = breaker();
    let retrier = fast_retrier(2);
    let deps = CycleDeps {
        persistence: &store,
        archive: Some(&archive),
        breaker: &breaker,
        retrier: &retrier,
        dry_run: false,
    };

    let report = run_price_cycle("onyx-shop", &shopify(&server), &deps, &Filters::new())
        .await
        .unwrap();

    assert!(report.is_complete(), "{report:?}");
    assert_eq!(report.termination, PageTermination::ShortPage);
    assert_eq!(report.product_count, 1);
    assert_eq!(report.variant_count, 2);
    assert_eq!(report.deltas.len(), 2);
    assert_eq!(report.deltas[0].old_price, Some("25.99".parse::<Decimal>().unwrap()));
    assert_eq!(report.deltas[0].new_price, "29.99".parse::<Decimal>().unwrap());
    assert!(report.deltas[1].is_new_variant());
    assert_eq!(report.prices_recorded, 2);
    assert_eq!(report.persistence.as_ref().map(|s| s.success_count), Some(2));

    let inserted = store.inserted.lock().unwrap();
    assert_eq!(inserted.len(), 2);
    assert_eq!(inserted[0].source_id, "onyx-shop");
    let raw = inserted[0].source_raw.as_ref().expect("raw variant retained");
    assert_eq!(raw["title"], "12 oz");

    let updated = store.updated.lock().unwrap();
    assert_eq!(updated.len(), 2);
    assert_eq!(updated[1].sku.as_deref(), Some("KEN-2LB"));

    let calls = archive.calls.lock().unwrap();
    assert_eq!(
        *calls,
        vec![("onyx-shop".to_string(), ArchiveStatus::Complete, 1)]
    );
}

#[tokio::test]
async fn availability_only_change_updates_without_price_row() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;

    let store = MemoryStore::with_prior(vec![
        snapshot("101", "29.99", false),
        snapshot("102", "64.00", true),
    ]);
    let breaker = breaker();
    let retrier = fast_retrier(2);
    let deps: CycleDeps<'_, MemoryStore, RecordingArchive> = CycleDeps {
        persistence: &store,
        archive: None,
        breaker: &breaker,
        retrier: &retrier,
        dry_run: false,
    };

    let report = run_price_cycle("onyx-shop", &shopify(&server), &deps, &Filters::new())
        .await
        .unwrap();

    assert_eq!(report.deltas.len(), 1);
    assert_eq!(report.availability_changes(), 1);
    assert_eq!(report.price_changes(), 0);
    assert_eq!(report.prices_recorded, 0);
    assert!(store.inserted.lock().unwrap().is_empty());
    assert_eq!(store.updated.lock().unwrap()[0].variant_id, "101");
}

#[tokio::test]
async fn rejected_price_row_marks_the_cycle_incomplete() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;

    let store = MemoryStore {
        reject_variant: Some("102"),
        ..MemoryStore::default()
    };
    let breaker = breaker();
    let retrier = fast_retrier(2);
    let deps: CycleDeps<'_, MemoryStore, RecordingArchive> = CycleDeps {
        persistence: &store,
        archive: None,
        breaker: &breaker,
        retrier: &retrier,
        dry_run: false,
    };

    let report = run_price_cycle("onyx-shop", &shopify(&server), &deps, &Filters::new())
        .await
        .unwrap();

    assert!(!report.is_complete());
    assert_eq!(report.prices_recorded, 1);
    assert_eq!(report.persistence_errors.len(), 1);
    assert!(report.persistence_errors[0].contains("duplicate observation"));
    assert_eq!(store.inserted.lock().unwrap()[0].variant_id, "101");
    assert_eq!(
        store.updated.lock().unwrap().len(),
        2,
        "pricing updates still cover every delta"
    );
}

#[tokio::test]
async fn unchanged_catalog_writes_nothing() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;

    let store = MemoryStore::with_prior(vec![
        snapshot("101", "29.99", true),
        snapshot("102", "64.00", true),
    ]);
    let breaker = breaker();
    let retrier = fast_retrier(2);
    let deps: CycleDeps<'_, MemoryStore, RecordingArchive> = CycleDeps {
        persistence: &store,
        archive: None,
        breaker: &breaker,
        retrier: &retrier,
        dry_run: false,
    };

    let report = run_price_cycle("onyx-shop", &shopify(&server), &deps, &Filters::new())
        .await
        .unwrap();

    assert!(report.deltas.is_empty());
    assert!(report.persistence.is_none());
    assert!(store.updated.lock().unwrap().is_empty());
}

#[tokio::test]
async fn dry_run_reports_deltas_without_writing() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;

    let store = MemoryStore::default();
    let archive = RecordingArchive::default();
    let breaker = breaker();
    let retrier = fast_retrier(2);
    let deps = CycleDeps {
        persistence: &store,
        archive: Some(&archive),
        breaker: &breaker,
        retrier: &retrier,
        dry_run: true,
    };

    let report = run_price_cycle("onyx-shop", &shopify(&server), &deps, &Filters::new())
        .await
        .unwrap();

    assert!(report.dry_run);
    assert_eq!(report.deltas.len(), 2);
    assert_eq!(report.prices_recorded, 0);
    assert!(store.inserted.lock().unwrap().is_empty());
    assert!(store.updated.lock().unwrap().is_empty());
    assert!(archive.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unreadable_prior_state_fails_the_cycle() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;

    let store = MemoryStore {
        unavailable: true,
        ..MemoryStore::default()
    };
    let breaker = breaker();
    let retrier = fast_retrier(2);
    let deps: CycleDeps<'_, MemoryStore, RecordingArchive> = CycleDeps {
        persistence: &store,
        archive: None,
        breaker: &breaker,
        retrier: &retrier,
        dry_run: false,
    };

    let result = run_price_cycle("onyx-shop", &shopify(&server), &deps, &Filters::new()).await;

    match result {
        Err(CycleError::PriorState { source_id, source }) => {
            assert_eq!(source_id, "onyx-shop");
            assert!(!source.is_open());
        }
        other => panic!("expected PriorState, got: {other:?}"),
    }
    assert_eq!(breaker.state().failure_count, 1);
}

#[tokio::test]
async fn open_breaker_fails_fast_on_prior_state() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;

    let store = MemoryStore {
        unavailable: true,
        ..MemoryStore::default()
    };
    let breaker = CircuitBreaker::new(
        "persistence",
        CircuitBreakerConfig {
            failure_threshold: 1,
            success_threshold: 1,
            timeout: Duration::from_secs(60),
        },
    );
    let retrier = fast_retrier(2);
    let deps: CycleDeps<'_, MemoryStore, RecordingArchive> = CycleDeps {
        persistence: &store,
        archive: None,
        breaker: &breaker,
        retrier: &retrier,
        dry_run: false,
    };
    let adapter = shopify(&server);

    let _ = run_price_cycle("onyx-shop", &adapter, &deps, &Filters::new()).await;
    assert_eq!(breaker.phase(), CircuitPhase::Open);

    match run_price_cycle("onyx-shop", &adapter, &deps, &Filters::new()).await {
        Err(CycleError::PriorState { source, .. }) => assert!(source.is_open()),
        other => panic!("expected PriorState, got: {other:?}"),
    }
}

#[tokio::test]
async fn archive_failure_does_not_abort_the_cycle() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;

    let store = MemoryStore::default();
    let archive = RecordingArchive {
        fail: true,
        ..RecordingArchive::default()
    };
    let breaker = breaker();
    let retrier = fast_retrier(2);
    let deps = CycleDeps {
        persistence: &store,
        archive: Some(&archive),
        breaker: &breaker,
        retrier: &retrier,
        dry_run: false,
    };

    let report = run_price_cycle("onyx-shop", &shopify(&server), &deps, &Filters::new())
        .await
        .unwrap();

    assert!(report.is_complete());
    assert_eq!(store.updated.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn persistent_rate_limit_returns_partial_report() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/products.json"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
        .expect(2)
        .mount(&server)
        .await;

    let store = MemoryStore::default();
    let archive = RecordingArchive::default();
    let breaker = breaker();
    let retrier = fast_retrier(2);
    let deps = CycleDeps {
        persistence: &store,
        archive: Some(&archive),
        breaker: &breaker,
        retrier: &retrier,
        dry_run: false,
    };

    let report = run_price_cycle("onyx-shop", &shopify(&server), &deps, &Filters::new())
        .await
        .unwrap();

    assert!(!report.is_complete());
    assert_eq!(
        report.termination,
        PageTermination::RateLimited {
            retry_after_secs: 0
        }
    );
    assert!(report.deltas.is_empty());
    let calls = archive.calls.lock().unwrap();
    assert_eq!(calls[0].1, ArchiveStatus::Partial);
}

#[tokio::test]
async fn transient_rate_limit_is_retried_as_a_fresh_pass() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/products.json"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_catalog(&server).await;

    let store = MemoryStore::default();
    let breaker = breaker();
    let retrier = fast_retrier(3);
    let deps: CycleDeps<'_, MemoryStore, RecordingArchive> = CycleDeps {
        persistence: &store,
        archive: None,
        breaker: &breaker,
        retrier: &retrier,
        dry_run: false,
    };

    let report = run_price_cycle("onyx-shop", &shopify(&server), &deps, &Filters::new())
        .await
        .unwrap();

    assert!(report.is_complete());
    assert_eq!(report.variant_count, 2);
}
