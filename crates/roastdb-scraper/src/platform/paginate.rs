//! Page-numbered pagination loop shared by every adapter.

use std::future::Future;

use crate::error::ScraperError;

use super::{PageOutcome, PageRun, PageTermination};

/// Requests pages `1..=max_pages` in order through `fetch_page`, stopping
/// at the first empty page, short page (fewer than `limit` items), or
/// failure. Products from earlier pages are always kept.
///
/// A 304 cannot mark the end of a catalog, so it terminates the pass as
/// [`PageTermination::Malformed`]; callers doing full passes should bypass
/// the conditional cache.
pub async fn paginate<F, Fut>(label: &str, limit: u32, max_pages: u32, mut fetch_page: F) -> PageRun
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<PageOutcome, ScraperError>>,
{
    let limit = usize::try_from(limit).unwrap_or(usize::MAX);
    let mut products = Vec::new();
    let mut pages_fetched = 0u32;

    for page in 1..=max_pages {
        let outcome = match fetch_page(page).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(source = label, page, error = %e, "page request failed");
                return PageRun {
                    products,
                    pages_fetched,
                    termination: PageTermination::Transport {
                        message: e.to_string(),
                    },
                };
            }
        };

        let termination = match outcome {
            PageOutcome::Products(batch) => {
                pages_fetched += 1;
                let count = batch.len();
                products.extend(batch);
                tracing::debug!(source = label, page, count, total = products.len(), "page fetched");
                if count == 0 {
                    PageTermination::EmptyPage
                } else if count < limit {
                    PageTermination::ShortPage
                } else {
                    continue;
                }
            }
            PageOutcome::RateLimited { retry_after_secs } => {
                tracing::warn!(
                    source = label,
                    page,
                    retry_after_secs,
                    accumulated = products.len(),
                    "rate limited, ending pagination pass"
                );
                PageTermination::RateLimited { retry_after_secs }
            }
            PageOutcome::Rejected { status, body } => {
                tracing::error!(source = label, page, status, body = %truncate(&body, 200), "page rejected");
                PageTermination::ClientError { status }
            }
            PageOutcome::ServerError { status } => {
                tracing::error!(source = label, page, status, "server error after retries");
                PageTermination::ServerError { status }
            }
            PageOutcome::Malformed { reason } => {
                tracing::warn!(source = label, page, reason = %reason, "malformed page, treating as empty");
                PageTermination::Malformed { page }
            }
            PageOutcome::NotModified => {
                tracing::warn!(source = label, page, "304 during pagination, ending pass");
                PageTermination::Malformed { page }
            }
        };

        return PageRun {
            products,
            pages_fetched,
            termination,
        };
    }

    tracing::warn!(source = label, max_pages, total = products.len(), "safety page cap reached");
    PageRun {
        products,
        pages_fetched,
        termination: PageTermination::SafetyCap,
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
