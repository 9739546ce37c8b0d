//! Storefront platform adapters.
//!
//! Every adapter turns a [`Fetcher`](crate::fetch::Fetcher) into
//! page-numbered catalog pagination. Page-level failures come back as
//! values ([`PageOutcome`], [`PageTermination`]); only configuration and
//! URL faults are `Err`.

mod origin;
mod paginate;
pub mod shopify;
pub mod woocommerce;

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;

use chrono::{DateTime, Utc};
use roastdb_core::{Platform, SourceConfig};

use crate::error::ScraperError;
use crate::fetch::FetchResponse;
use crate::types::ProductRecord;

pub use origin::store_origin;
pub use paginate::paginate;
pub use shopify::ShopifyAdapter;
pub use woocommerce::WooCommerceAdapter;

/// Hard stop for a full-catalog pass against an origin that never returns
/// a short page.
pub const MAX_PAGES: u32 = 1000;

/// Page cap for reduced-field passes and variation listings.
pub const REDUCED_MAX_PAGES: u32 = 100;

/// Wait assumed when a 429 carries no usable `Retry-After`.
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Extra query parameters passed through to the platform, e.g.
/// `status=publish` or `collection_id=...`.
pub type Filters = BTreeMap<String, String>;

/// Whether a page request carries conditional validators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    Conditional,
    /// Full passes bypass the cache: a 304 page carries no products and
    /// would be indistinguishable from the end of the catalog.
    Bypass,
}

/// Result of one page request.
#[derive(Debug, Clone, PartialEq)]
pub enum PageOutcome {
    Products(Vec<ProductRecord>),
    /// 304 on a conditional request.
    NotModified,
    RateLimited {
        retry_after_secs: u64,
    },
    /// 4xx other than 429.
    Rejected {
        status: u16,
        body: String,
    },
    /// 5xx after the fetcher's retries ran out.
    ServerError {
        status: u16,
    },
    /// 2xx with an undecodable body, or an unexpected status class.
    Malformed {
        reason: String,
    },
}

impl PageOutcome {
    /// Maps a fetcher response onto a page outcome, decoding 2xx bodies
    /// with `decode`.
    pub(crate) fn from_response<F>(response: &FetchResponse, decode: F) -> Self
    where
        F: FnOnce(&FetchResponse) -> Result<Vec<ProductRecord>, ScraperError>,
    {
        match response.status {
            304 => PageOutcome::NotModified,
            429 => PageOutcome::RateLimited {
                retry_after_secs: parse_retry_after(response.header_str("retry-after"), Utc::now()),
            },
            status @ 400..=499 => PageOutcome::Rejected {
                status,
                body: response.body_text(),
            },
            status @ 500.. => PageOutcome::ServerError { status },
            200..=299 => match decode(response) {
                Ok(products) => PageOutcome::Products(products),
                Err(e) => PageOutcome::Malformed {
                    reason: e.to_string(),
                },
            },
            status => PageOutcome::Malformed {
                reason: format!("unexpected HTTP {status}"),
            },
        }
    }
}

/// Why a pagination pass stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageTermination {
    EmptyPage,
    /// A page returned fewer items than requested.
    ShortPage,
    /// Every page up to the cap was full.
    SafetyCap,
    RateLimited {
        retry_after_secs: u64,
    },
    ClientError {
        status: u16,
    },
    ServerError {
        status: u16,
    },
    Transport {
        message: String,
    },
    Malformed {
        page: u32,
    },
}

impl PageTermination {
    /// `true` when the pass reached the natural end of the catalog.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(self, PageTermination::EmptyPage | PageTermination::ShortPage)
    }
}

impl fmt::Display for PageTermination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageTermination::EmptyPage => write!(f, "empty page"),
            PageTermination::ShortPage => write!(f, "short page"),
            PageTermination::SafetyCap => write!(f, "safety page cap reached"),
            PageTermination::RateLimited { retry_after_secs } => {
                write!(f, "rate limited (retry after {retry_after_secs}s)")
            }
            PageTermination::ClientError { status } => write!(f, "client error HTTP {status}"),
            PageTermination::ServerError { status } => write!(f, "server error HTTP {status}"),
            PageTermination::Transport { message } => write!(f, "transport error: {message}"),
            PageTermination::Malformed { page } => write!(f, "malformed payload on page {page}"),
        }
    }
}

/// Products accumulated by one pagination pass and why it stopped.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRun {
    pub products: Vec<ProductRecord>,
    /// Pages that returned a decodable product list, the empty one included.
    pub pages_fetched: u32,
    pub termination: PageTermination,
}

impl PageRun {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.termination.is_complete()
    }
}

/// Capability set shared by every storefront platform.
pub trait PlatformAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    /// Fetches one page. `limit` is clamped to the platform's page-size cap.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError`] for URL faults and exhausted transport
    /// retries; HTTP statuses come back as [`PageOutcome`] values.
    fn fetch_page(
        &self,
        limit: u32,
        page: u32,
        filters: &Filters,
    ) -> impl Future<Output = Result<PageOutcome, ScraperError>> + Send;

    /// Walks pages `1, 2, …` until an empty or short page, a failure, or
    /// the safety cap.
    fn fetch_all(&self, filters: &Filters) -> impl Future<Output = PageRun> + Send;

    /// `true` iff a single-item request returns HTTP 200.
    fn test_connection(&self) -> impl Future<Output = bool> + Send;
}

/// Runtime dispatch over the supported platforms.
pub enum SourceAdapter {
    Shopify(ShopifyAdapter),
    Woocommerce(WooCommerceAdapter),
}

impl SourceAdapter {
    /// Builds the adapter for `source.platform`, applying the platform's
    /// page-size cap and politeness floor.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::InvalidUrl`] for an unusable base URL and
    /// [`ScraperError::Client`] if the HTTP client cannot be built.
    pub fn from_source_config(source: &SourceConfig, user_agent: &str) -> Result<Self, ScraperError> {
        match source.platform {
            Platform::Shopify => Ok(SourceAdapter::Shopify(ShopifyAdapter::new(source, user_agent)?)),
            Platform::Woocommerce => Ok(SourceAdapter::Woocommerce(WooCommerceAdapter::new(
                source, user_agent,
            )?)),
        }
    }

    /// Label used in logs: the source id, or the base URL for adapters
    /// built from parts.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            SourceAdapter::Shopify(a) => a.label(),
            SourceAdapter::Woocommerce(a) => a.label(),
        }
    }
}

impl PlatformAdapter for SourceAdapter {
    fn platform(&self) -> Platform {
        match self {
            SourceAdapter::Shopify(a) => a.platform(),
            SourceAdapter::Woocommerce(a) => a.platform(),
        }
    }

    async fn fetch_page(
        &self,
        limit: u32,
        page: u32,
        filters: &Filters,
    ) -> Result<PageOutcome, ScraperError> {
        match self {
            SourceAdapter::Shopify(a) => a.fetch_page(limit, page, filters).await,
            SourceAdapter::Woocommerce(a) => a.fetch_page(limit, page, filters).await,
        }
    }

    async fn fetch_all(&self, filters: &Filters) -> PageRun {
        match self {
            SourceAdapter::Shopify(a) => a.fetch_all(filters).await,
            SourceAdapter::Woocommerce(a) => a.fetch_all(filters).await,
        }
    }

    async fn test_connection(&self) -> bool {
        match self {
            SourceAdapter::Shopify(a) => a.test_connection().await,
            SourceAdapter::Woocommerce(a) => a.test_connection().await,
        }
    }
}

/// Seconds to wait from a `Retry-After` value: delta-seconds or an
/// HTTP-date. Missing or unparseable values fall back to
/// [`DEFAULT_RETRY_AFTER_SECS`].
#[must_use]
pub fn parse_retry_after(value: Option<&str>, now: DateTime<Utc>) -> u64 {
    let Some(value) = value.map(str::trim) else {
        return DEFAULT_RETRY_AFTER_SECS;
    };
    if let Ok(secs) = value.parse::<u64>() {
        return secs;
    }
    DateTime::parse_from_rfc2822(value).map_or(DEFAULT_RETRY_AFTER_SECS, |at| {
        u64::try_from((at.with_timezone(&Utc) - now).num_seconds()).unwrap_or(0)
    })
}

#[cfg(test)]
#[path = "../platform_test.rs"]
mod tests;
