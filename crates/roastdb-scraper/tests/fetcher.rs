//! Integration tests for `Fetcher::request` against a local `wiremock`
//! server: conditional requests, retry bounds, the concurrency gate,
//! politeness pauses and credentials.

use std::time::{Duration, Instant};

use roastdb_core::Credentials;
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use roastdb_scraper::{FetchConfig, FetchRequest, Fetcher, ScraperError};

/// No politeness pause and millisecond retry waits.
fn fast_config(max_retries: u32) -> FetchConfig {
    FetchConfig {
        timeout: Duration::from_secs(5),
        max_retries,
        retry_base_delay: Duration::from_millis(1),
        politeness_delay: Duration::ZERO,
        jitter_range: Duration::ZERO,
        max_concurrent: 2,
    }
}

fn test_fetcher(max_retries: u32) -> Fetcher {
    Fetcher::new(fast_config(max_retries), "roastdb-test/0.1").expect("failed to build Fetcher")
}

async fn request_count(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .map_or(0, |requests| requests.len())
}

// ---------------------------------------------------------------------------
// Conditional cache
// ---------------------------------------------------------------------------

#[tokio::test]
async fn second_fetch_with_etag_is_not_modified_and_cache_is_unchanged() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/products.json"))
        .and(header("if-none-match", "\"v1\""))
        .respond_with(ResponseTemplate::new(304))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/products.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("etag", "\"v1\"")
                .set_body_json(json!({"products": []})),
        )
        .mount(&server)
        .await;

    let fetcher = test_fetcher(0);
    let url = format!("{}/products.json", server.uri());

    let first = fetcher.request(FetchRequest::get(&url)).await.unwrap();
    assert_eq!(first.status, 200);
    assert!(!first.body.is_empty());
    assert_eq!(fetcher.cache().len(), 1);
    let entry = fetcher.cache().get(&url).expect("validators cached");
    assert_eq!(entry.etag.as_deref(), Some("\"v1\""));

    let second = fetcher.request(FetchRequest::get(&url)).await.unwrap();
    assert_eq!(second.status, 304);
    assert!(second.is_not_modified());
    assert!(second.body.is_empty());
    assert_eq!(fetcher.cache().len(), 1);
    assert_eq!(fetcher.cache().get(&url), Some(entry));
}

#[tokio::test]
async fn last_modified_is_sent_back_as_if_modified_since() {
    let server = MockServer::start().await;
    let stamp = "Wed, 21 Oct 2026 07:28:00 GMT";

    Mock::given(method("GET"))
        .and(header("if-modified-since", stamp))
        .respond_with(ResponseTemplate::new(304))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("last-modified", stamp)
                .set_body_string("[]"),
        )
        .mount(&server)
        .await;

    let fetcher = test_fetcher(0);
    let url = format!("{}/catalog", server.uri());
    assert_eq!(fetcher.request(FetchRequest::get(&url)).await.unwrap().status, 200);
    assert_eq!(fetcher.request(FetchRequest::get(&url)).await.unwrap().status, 304);
}

#[tokio::test]
async fn without_cache_skips_validators() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(header("if-none-match", "\"v1\""))
        .respond_with(ResponseTemplate::new(304))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("etag", "\"v1\"")
                .set_body_string("[]"),
        )
        .mount(&server)
        .await;

    let fetcher = test_fetcher(0);
    let url = format!("{}/catalog", server.uri());
    fetcher.request(FetchRequest::get(&url)).await.unwrap();

    let bypass = fetcher
        .request(FetchRequest::get(&url).without_cache())
        .await
        .unwrap();
    assert_eq!(bypass.status, 200);
    assert!(!bypass.body.is_empty());
}

#[tokio::test]
async fn cache_is_keyed_by_full_url_including_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("etag", "\"p\"")
                .set_body_string("[]"),
        )
        .mount(&server)
        .await;

    let fetcher = test_fetcher(0);
    let url = format!("{}/catalog", server.uri());
    fetcher
        .request(FetchRequest::get(&url).query("page", "1"))
        .await
        .unwrap();
    fetcher
        .request(FetchRequest::get(&url).query("page", "2"))
        .await
        .unwrap();

    assert_eq!(fetcher.cache().len(), 2);
    assert!(fetcher.cache().get(&format!("{url}?page=1")).is_some());
    assert!(fetcher.cache().get(&url).is_none());
}

// ---------------------------------------------------------------------------
// Retry bounds
// ---------------------------------------------------------------------------

#[tokio::test]
async fn server_errors_are_retried_up_to_max_retries() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
        .mount(&server)
        .await;

    let fetcher = test_fetcher(2);
    let response = fetcher
        .request(FetchRequest::get(format!("{}/catalog", server.uri())))
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.attempts, 3);
    assert_eq!(request_count(&server).await, 3);
}

#[tokio::test]
async fn exhausted_retries_return_last_failing_status() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
        .mount(&server)
        .await;

    let fetcher = test_fetcher(1);
    let response = fetcher
        .request(FetchRequest::get(format!("{}/catalog", server.uri())))
        .await
        .unwrap();

    assert_eq!(response.status, 502);
    assert_eq!(response.attempts, 2);
    assert_eq!(request_count(&server).await, 2);
}

#[tokio::test]
async fn client_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such store"))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = test_fetcher(3);
    let response = fetcher
        .request(FetchRequest::get(format!("{}/catalog", server.uri())))
        .await
        .unwrap();

    assert_eq!(response.status, 404);
    assert_eq!(response.attempts, 1);
    assert_eq!(response.body_text(), "no such store");
}

#[tokio::test]
async fn rate_limit_is_returned_after_one_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "30"))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = test_fetcher(3);
    let response = fetcher
        .request(FetchRequest::get(format!("{}/catalog", server.uri())))
        .await
        .unwrap();

    assert_eq!(response.status, 429);
    assert_eq!(response.header_str("retry-after"), Some("30"));
}

#[tokio::test]
async fn connection_failure_surfaces_transport_error_after_retries() {
    let fetcher = test_fetcher(1);
    let result = fetcher
        .request(FetchRequest::get("http://127.0.0.1:1/catalog"))
        .await;

    match result {
        Err(ScraperError::Transport { attempts, url, .. }) => {
            assert_eq!(attempts, 2);
            assert_eq!(url, "http://127.0.0.1:1/catalog");
        }
        other => panic!("expected Transport, got: {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Concurrency gate and politeness
// ---------------------------------------------------------------------------

#[tokio::test]
async fn in_flight_requests_never_exceed_max_concurrent() {
    let server = MockServer::start().await;
    let latency = Duration::from_millis(200);
    Mock::given(method("GET"))
        .and(path("/catalog"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[]").set_delay(latency))
        .expect(5)
        .mount(&server)
        .await;

    // max_concurrent = 2: five requests need at least three rounds.
    let fetcher = test_fetcher(0);
    let url = format!("{}/catalog", server.uri());
    let send = || fetcher.request(FetchRequest::get(&url).without_cache());

    let started = Instant::now();
    let (a, b, c, d, e) = tokio::join!(send(), send(), send(), send(), send());
    let elapsed = started.elapsed();

    for response in [a, b, c, d, e] {
        assert_eq!(response.unwrap().status, 200);
    }
    assert!(elapsed >= latency * 3, "gate let too many through: {elapsed:?}");
    assert!(elapsed < latency * 5, "requests ran one at a time: {elapsed:?}");
}

#[tokio::test]
async fn politeness_delay_precedes_every_request_including_not_modified() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/products.json"))
        .and(header("if-none-match", "\"v1\""))
        .respond_with(ResponseTemplate::new(304))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/products.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("etag", "\"v1\"")
                .set_body_json(json!({"products": []})),
        )
        .mount(&server)
        .await;

    let pause = Duration::from_millis(150);
    let fetcher = Fetcher::new(
        FetchConfig {
            politeness_delay: pause,
            ..fast_config(0)
        },
        "roastdb-test/0.1",
    )
    .expect("failed to build Fetcher");
    let url = format!("{}/products.json", server.uri());

    let started = Instant::now();
    let first = fetcher.request(FetchRequest::get(&url)).await.unwrap();
    assert_eq!(first.status, 200);
    assert!(started.elapsed() >= pause);

    let started = Instant::now();
    let second = fetcher.request(FetchRequest::get(&url)).await.unwrap();
    assert!(second.is_not_modified());
    assert!(started.elapsed() >= pause);
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

#[tokio::test]
async fn bearer_credentials_set_authorization_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("authorization", "Bearer shpat_test"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = test_fetcher(0);
    let request = FetchRequest::get(format!("{}/catalog", server.uri())).credentials(
        Credentials::Bearer {
            token: "shpat_test".to_string(),
        },
    );
    assert_eq!(fetcher.request(request).await.unwrap().status, 200);
}
