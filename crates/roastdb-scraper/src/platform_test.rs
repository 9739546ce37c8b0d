use std::cell::Cell;

use chrono::TimeZone;
use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};
use serde_json::json;

use super::*;

fn response(status: u16, body: &str) -> FetchResponse {
    FetchResponse {
        status,
        headers: HeaderMap::new(),
        body: body.as_bytes().to_vec(),
        attempts: 1,
    }
}

fn decode_array(r: &FetchResponse) -> Result<Vec<ProductRecord>, ScraperError> {
    r.json::<Vec<ProductRecord>>("test")
}

fn products(n: usize) -> Vec<ProductRecord> {
    (0..n)
        .map(|i| ProductRecord::new(json!({ "id": i })))
        .collect()
}

// ---------------------------------------------------------------------------
// PageOutcome::from_response
// ---------------------------------------------------------------------------

#[test]
fn ok_response_decodes_products() {
    let outcome = PageOutcome::from_response(&response(200, r#"[{"id":1},{"id":2}]"#), decode_array);
    match outcome {
        PageOutcome::Products(p) => assert_eq!(p.len(), 2),
        other => panic!("expected Products, got: {other:?}"),
    }
}

#[test]
fn undecodable_body_is_malformed() {
    let outcome = PageOutcome::from_response(&response(200, "<html>maintenance</html>"), decode_array);
    assert!(matches!(outcome, PageOutcome::Malformed { .. }), "got: {outcome:?}");
}

#[test]
fn not_modified_maps_to_not_modified() {
    let outcome = PageOutcome::from_response(&response(304, ""), decode_array);
    assert_eq!(outcome, PageOutcome::NotModified);
}

#[test]
fn too_many_requests_reads_retry_after() {
    let mut r = response(429, "slow down");
    r.headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
    let outcome = PageOutcome::from_response(&r, decode_array);
    assert_eq!(outcome, PageOutcome::RateLimited { retry_after_secs: 7 });
}

#[test]
fn too_many_requests_without_header_defaults() {
    let outcome = PageOutcome::from_response(&response(429, ""), decode_array);
    assert_eq!(
        outcome,
        PageOutcome::RateLimited {
            retry_after_secs: DEFAULT_RETRY_AFTER_SECS
        }
    );
}

#[test]
fn client_error_keeps_status_and_body() {
    let outcome = PageOutcome::from_response(&response(401, "bad key"), decode_array);
    assert_eq!(
        outcome,
        PageOutcome::Rejected {
            status: 401,
            body: "bad key".to_string()
        }
    );
}

#[test]
fn server_error_keeps_status() {
    let outcome = PageOutcome::from_response(&response(503, ""), decode_array);
    assert_eq!(outcome, PageOutcome::ServerError { status: 503 });
}

// ---------------------------------------------------------------------------
// parse_retry_after
// ---------------------------------------------------------------------------

#[test]
fn retry_after_accepts_delta_seconds() {
    assert_eq!(parse_retry_after(Some(" 120 "), Utc::now()), 120);
}

#[test]
fn retry_after_accepts_http_date() {
    let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
    assert_eq!(
        parse_retry_after(Some("Sat, 01 Mar 2025 12:00:30 GMT"), now),
        30
    );
}

#[test]
fn retry_after_in_the_past_is_zero() {
    let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
    assert_eq!(parse_retry_after(Some("Sat, 01 Mar 2025 11:00:00 GMT"), now), 0);
}

#[test]
fn retry_after_garbage_defaults() {
    assert_eq!(parse_retry_after(Some("soon"), Utc::now()), DEFAULT_RETRY_AFTER_SECS);
    assert_eq!(parse_retry_after(None, Utc::now()), DEFAULT_RETRY_AFTER_SECS);
}

// ---------------------------------------------------------------------------
// PageTermination
// ---------------------------------------------------------------------------

#[test]
fn only_natural_ends_are_complete() {
    assert!(PageTermination::EmptyPage.is_complete());
    assert!(PageTermination::ShortPage.is_complete());
    assert!(!PageTermination::SafetyCap.is_complete());
    assert!(!PageTermination::RateLimited { retry_after_secs: 1 }.is_complete());
    assert!(!PageTermination::ClientError { status: 403 }.is_complete());
    assert!(!PageTermination::ServerError { status: 502 }.is_complete());
    assert!(!PageTermination::Malformed { page: 2 }.is_complete());
    assert!(!PageTermination::Transport {
        message: "reset".to_string()
    }
    .is_complete());
}

#[test]
fn termination_display_is_human_readable() {
    assert_eq!(
        PageTermination::RateLimited { retry_after_secs: 30 }.to_string(),
        "rate limited (retry after 30s)"
    );
    assert_eq!(
        PageTermination::Malformed { page: 4 }.to_string(),
        "malformed payload on page 4"
    );
}

// ---------------------------------------------------------------------------
// paginate
// ---------------------------------------------------------------------------

#[tokio::test]
async fn short_page_stops_pagination() {
    let calls = Cell::new(0u32);
    let run = paginate("test", 3, MAX_PAGES, |page| {
        calls.set(calls.get() + 1);
        async move {
            Ok(match page {
                1 => PageOutcome::Products(products(3)),
                _ => PageOutcome::Products(products(1)),
            })
        }
    })
    .await;
    assert_eq!(run.products.len(), 4);
    assert_eq!(run.pages_fetched, 2);
    assert_eq!(run.termination, PageTermination::ShortPage);
    assert_eq!(calls.get(), 2);
}

#[tokio::test]
async fn empty_page_stops_pagination() {
    let run = paginate("test", 2, MAX_PAGES, |page| async move {
        Ok(if page <= 2 {
            PageOutcome::Products(products(2))
        } else {
            PageOutcome::Products(Vec::new())
        })
    })
    .await;
    assert_eq!(run.products.len(), 4);
    assert_eq!(run.pages_fetched, 3);
    assert_eq!(run.termination, PageTermination::EmptyPage);
}

#[tokio::test]
async fn always_full_pages_stop_at_safety_cap() {
    let calls = Cell::new(0u32);
    let run = paginate("test", 2, 5, |_| {
        calls.set(calls.get() + 1);
        async { Ok(PageOutcome::Products(products(2))) }
    })
    .await;
    assert_eq!(calls.get(), 5);
    assert_eq!(run.pages_fetched, 5);
    assert_eq!(run.products.len(), 10);
    assert_eq!(run.termination, PageTermination::SafetyCap);
    assert!(!run.is_complete());
}

#[tokio::test]
async fn rate_limit_keeps_accumulated_products() {
    let run = paginate("test", 2, MAX_PAGES, |page| async move {
        Ok(if page == 1 {
            PageOutcome::Products(products(2))
        } else {
            PageOutcome::RateLimited {
                retry_after_secs: 12,
            }
        })
    })
    .await;
    assert_eq!(run.products.len(), 2);
    assert_eq!(run.pages_fetched, 1);
    assert_eq!(
        run.termination,
        PageTermination::RateLimited {
            retry_after_secs: 12
        }
    );
}

#[tokio::test]
async fn malformed_page_ends_run_as_failure() {
    let run = paginate("test", 2, MAX_PAGES, |page| async move {
        Ok(if page == 1 {
            PageOutcome::Products(products(2))
        } else {
            PageOutcome::Malformed {
                reason: "expected array".to_string(),
            }
        })
    })
    .await;
    assert_eq!(run.products.len(), 2);
    assert_eq!(run.termination, PageTermination::Malformed { page: 2 });
}

#[tokio::test]
async fn client_and_server_errors_stop_at_current_page() {
    let run = paginate("test", 1, MAX_PAGES, |_| async {
        Ok(PageOutcome::Rejected {
            status: 403,
            body: String::new(),
        })
    })
    .await;
    assert_eq!(run.termination, PageTermination::ClientError { status: 403 });
    assert_eq!(run.pages_fetched, 0);

    let run = paginate("test", 1, MAX_PAGES, |_| async {
        Ok(PageOutcome::ServerError { status: 502 })
    })
    .await;
    assert_eq!(run.termination, PageTermination::ServerError { status: 502 });
}

#[tokio::test]
async fn transport_error_becomes_termination() {
    let run = paginate("test", 1, MAX_PAGES, |_| async {
        Err(ScraperError::InvalidUrl {
            url: "x".to_string(),
            reason: "relative URL without a base".to_string(),
        })
    })
    .await;
    assert!(
        matches!(run.termination, PageTermination::Transport { .. }),
        "got: {:?}",
        run.termination
    );
    assert!(run.products.is_empty());
}
