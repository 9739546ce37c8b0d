//! Family A: Shopify-style `GET /products.json?limit=&page=`.

use std::time::Duration;

use reqwest::header::{HeaderValue, ACCEPT};
use roastdb_core::{Credentials, Platform, SourceConfig};

use crate::error::ScraperError;
use crate::fetch::{FetchConfig, FetchRequest, Fetcher};
use crate::types::ShopifyProductsPage;

use super::{
    paginate, store_origin, CachePolicy, Filters, PageOutcome, PageRun, PlatformAdapter,
    MAX_PAGES,
};

/// Largest `limit` the endpoint honours.
pub const PAGE_SIZE_CAP: u32 = 250;

/// Minimum wait before every request to a Shopify origin.
pub const POLITENESS_FLOOR: Duration = Duration::from_millis(500);

pub struct ShopifyAdapter {
    label: String,
    origin: String,
    credentials: Credentials,
    fetcher: Fetcher,
    page_size: u32,
    max_pages: u32,
}

impl ShopifyAdapter {
    /// Builds an adapter from resolved source settings. The politeness delay
    /// is raised to [`POLITENESS_FLOOR`] and the page size capped at
    /// [`PAGE_SIZE_CAP`].
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::Client`] if the HTTP client cannot be built.
    pub fn new(source: &SourceConfig, user_agent: &str) -> Result<Self, ScraperError> {
        let config = FetchConfig::from_source(source).with_politeness_floor(POLITENESS_FLOOR);
        let fetcher = Fetcher::new(config, user_agent)?;
        let mut adapter = Self::from_parts(&source.base_url, source.credentials.clone(), fetcher);
        adapter.label.clone_from(&source.id);
        if let Some(size) = source.page_size {
            adapter = adapter.with_page_size(size);
        }
        Ok(adapter)
    }

    /// Wraps an existing fetcher as-is; no politeness floor is applied.
    #[must_use]
    pub fn from_parts(base_url: &str, credentials: Credentials, fetcher: Fetcher) -> Self {
        Self {
            label: base_url.to_owned(),
            origin: store_origin(base_url),
            credentials,
            fetcher,
            page_size: PAGE_SIZE_CAP,
            max_pages: MAX_PAGES,
        }
    }

    /// Page size for [`PlatformAdapter::fetch_all`], clamped to `1..=250`.
    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, PAGE_SIZE_CAP);
        self
    }

    #[must_use]
    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages;
        self
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    #[must_use]
    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    pub(crate) fn products_url(&self) -> String {
        format!("{}/products.json", self.origin)
    }

    async fn request_page(
        &self,
        limit: u32,
        page: u32,
        filters: &Filters,
        policy: CachePolicy,
    ) -> Result<PageOutcome, ScraperError> {
        let limit = limit.clamp(1, PAGE_SIZE_CAP);
        let mut request = FetchRequest::get(self.products_url())
            .query("limit", limit.to_string())
            .query("page", page.to_string())
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .credentials(self.credentials.clone());
        for (key, value) in filters {
            request = request.query(key, value);
        }
        if policy == CachePolicy::Bypass {
            request = request.without_cache();
        }

        let response = self.fetcher.request(request).await?;
        let context = format!("{} products page {page}", self.label);
        Ok(PageOutcome::from_response(&response, |r| {
            r.json::<ShopifyProductsPage>(&context).map(|p| p.products)
        }))
    }
}

impl PlatformAdapter for ShopifyAdapter {
    fn platform(&self) -> Platform {
        Platform::Shopify
    }

    async fn fetch_page(
        &self,
        limit: u32,
        page: u32,
        filters: &Filters,
    ) -> Result<PageOutcome, ScraperError> {
        self.request_page(limit, page, filters, CachePolicy::Conditional)
            .await
    }

    async fn fetch_all(&self, filters: &Filters) -> PageRun {
        let limit = self.page_size;
        paginate(&self.label, limit, self.max_pages, move |page| {
            self.request_page(limit, page, filters, CachePolicy::Bypass)
        })
        .await
    }

    async fn test_connection(&self) -> bool {
        let request = FetchRequest::get(self.products_url())
            .query("limit", "1")
            .credentials(self.credentials.clone())
            .without_cache();
        match self.fetcher.request(request).await {
            Ok(response) => response.status == 200,
            Err(e) => {
                tracing::warn!(source = %self.label, error = %e, "connection test failed");
                false
            }
        }
    }
}
