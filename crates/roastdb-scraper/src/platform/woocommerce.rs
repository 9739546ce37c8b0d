//! Family B: WooCommerce-style `GET /wp-json/wc/v3/products?per_page=&page=`.
//!
//! The body is a bare JSON array. Besides full product pages this adapter
//! offers a reduced-field mode (`_fields=`) for price-only passes, a
//! total-count probe via `X-WP-Total`, and optional expansion of variable
//! products whose `variations` list only IDs.

use std::time::Duration;

use reqwest::header::{HeaderValue, ACCEPT};
use roastdb_core::{Credentials, Platform, SourceConfig};
use serde_json::Value;

use crate::error::ScraperError;
use crate::fetch::{FetchConfig, FetchRequest, Fetcher};
use crate::types::ProductRecord;

use super::{
    paginate, CachePolicy, Filters, PageOutcome, PageRun, PageTermination, PlatformAdapter,
    MAX_PAGES, REDUCED_MAX_PAGES,
};

/// Largest `per_page` the REST API honours.
pub const PAGE_SIZE_CAP: u32 = 100;

/// Minimum wait before every request to a WooCommerce origin.
pub const POLITENESS_FLOOR: Duration = Duration::from_millis(100);

/// Columns requested in reduced-field mode.
pub const PRICE_FIELDS: &str =
    "id,type,sku,price,regular_price,sale_price,stock_status,stock_quantity,variations";

const TOTAL_HEADER: &str = "x-wp-total";

pub struct WooCommerceAdapter {
    label: String,
    base_url: String,
    credentials: Credentials,
    fetcher: Fetcher,
    page_size: u32,
    max_pages: u32,
    expand_variations: bool,
}

impl WooCommerceAdapter {
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
        let mut adapter = Self::from_parts(&source.base_url, source.credentials.clone(), fetcher)
            .with_variation_expansion(source.expand_variations);
        adapter.label.clone_from(&source.id);
        if let Some(size) = source.page_size {
            adapter = adapter.with_page_size(size);
        }
        Ok(adapter)
    }

    /// Wraps an existing fetcher as-is; no politeness floor is applied.
    /// WordPress may live under a path, so `base_url` is kept whole.
    #[must_use]
    pub fn from_parts(base_url: &str, credentials: Credentials, fetcher: Fetcher) -> Self {
        Self {
            label: base_url.to_owned(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            credentials,
            fetcher,
            page_size: PAGE_SIZE_CAP,
            max_pages: MAX_PAGES,
            expand_variations: false,
        }
    }

    /// Page size for full passes, clamped to `1..=100`.
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
    pub fn with_variation_expansion(mut self, enabled: bool) -> Self {
        self.expand_variations = enabled;
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
        format!("{}/wp-json/wc/v3/products", self.base_url)
    }

    fn variations_url(&self, product_id: &str) -> String {
        format!("{}/{product_id}/variations", self.products_url())
    }

    /// One reduced-field page: only identifier, price and stock columns.
    ///
    /// # Errors
    ///
    /// Same as [`PlatformAdapter::fetch_page`].
    pub async fn fetch_price_page(
        &self,
        limit: u32,
        page: u32,
        filters: &Filters,
    ) -> Result<PageOutcome, ScraperError> {
        self.request_page(
            &self.products_url(),
            limit,
            page,
            filters,
            Some(PRICE_FIELDS),
            CachePolicy::Conditional,
        )
        .await
    }

    /// Reduced-field full pass, capped at [`REDUCED_MAX_PAGES`].
    pub async fn fetch_all_prices(&self, filters: &Filters) -> PageRun {
        let url = self.products_url();
        let url = url.as_str();
        let limit = self.page_size;
        let max_pages = self.max_pages.min(REDUCED_MAX_PAGES);
        let mut run = paginate(&self.label, limit, max_pages, move |page| {
            self.request_page(url, limit, page, filters, Some(PRICE_FIELDS), CachePolicy::Bypass)
        })
        .await;
        if self.expand_variations {
            self.expand(&mut run, Some(PRICE_FIELDS)).await;
        }
        run
    }

    /// Catalog size from the `X-WP-Total` header of a one-item request.
    /// `None` when the request is not a 2xx or the header is missing.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError`] for URL faults and exhausted transport
    /// retries.
    pub async fn count_products(&self, filters: &Filters) -> Result<Option<u64>, ScraperError> {
        let mut request = FetchRequest::get(self.products_url())
            .query("per_page", "1")
            .query("_fields", "id")
            .credentials(self.credentials.clone())
            .without_cache();
        for (key, value) in filters {
            request = request.query(key, value);
        }
        let response = self.fetcher.request(request).await?;
        if !response.is_success() {
            tracing::warn!(source = %self.label, status = response.status, "count probe rejected");
            return Ok(None);
        }
        Ok(response
            .header_str(TOTAL_HEADER)
            .and_then(|v| v.trim().parse::<u64>().ok()))
    }

    async fn request_page(
        &self,
        url: &str,
        limit: u32,
        page: u32,
        filters: &Filters,
        fields: Option<&str>,
        policy: CachePolicy,
    ) -> Result<PageOutcome, ScraperError> {
        let limit = limit.clamp(1, PAGE_SIZE_CAP);
        let mut request = FetchRequest::get(url)
            .query("per_page", limit.to_string())
            .query("page", page.to_string())
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .credentials(self.credentials.clone());
        if let Some(fields) = fields {
            request = request.query("_fields", fields);
        }
        for (key, value) in filters {
            request = request.query(key, value);
        }
        if policy == CachePolicy::Bypass {
            request = request.without_cache();
        }

        let response = self.fetcher.request(request).await?;
        let context = format!("{} page {page} of {url}", self.label);
        Ok(PageOutcome::from_response(&response, |r| {
            r.json::<Vec<ProductRecord>>(&context)
        }))
    }

    /// Replaces ID-only `variations` arrays of variable products with the
    /// variation objects. A rate limit stops expansion and marks the run
    /// rate limited; other failures leave that product unexpanded.
    async fn expand(&self, run: &mut PageRun, fields: Option<&str>) {
        let empty = Filters::new();
        for product in &mut run.products {
            if !needs_expansion(product) {
                continue;
            }
            let Some(product_id) = product.id() else {
                continue;
            };
            let url = self.variations_url(&product_id);
            let url = url.as_str();
            let empty = &empty;
            let variations = paginate(&self.label, PAGE_SIZE_CAP, REDUCED_MAX_PAGES, move |page| {
                self.request_page(url, PAGE_SIZE_CAP, page, empty, fields, CachePolicy::Bypass)
            })
            .await;

            if let PageTermination::RateLimited { .. } = variations.termination {
                tracing::warn!(source = %self.label, product_id = %product_id, "rate limited while expanding variations");
                run.termination = variations.termination;
                return;
            }
            if !variations.is_complete() {
                tracing::warn!(
                    source = %self.label,
                    product_id = %product_id,
                    termination = %variations.termination,
                    "variation listing incomplete"
                );
                if variations.products.is_empty() {
                    continue;
                }
            }

            let expanded = variations
                .products
                .into_iter()
                .map(ProductRecord::into_value)
                .collect();
            if let Some(object) = product.as_value_mut().as_object_mut() {
                object.insert("variations".to_owned(), Value::Array(expanded));
            }
        }
    }
}

fn needs_expansion(product: &ProductRecord) -> bool {
    product.product_type() == Some("variable")
        && product
            .as_value()
            .get("variations")
            .and_then(Value::as_array)
            .is_some_and(|list| list.iter().any(|v| !v.is_object()))
}

impl PlatformAdapter for WooCommerceAdapter {
    fn platform(&self) -> Platform {
        Platform::Woocommerce
    }

    async fn fetch_page(
        &self,
        limit: u32,
        page: u32,
        filters: &Filters,
    ) -> Result<PageOutcome, ScraperError> {
        self.request_page(
            &self.products_url(),
            limit,
            page,
            filters,
            None,
            CachePolicy::Conditional,
        )
        .await
    }

    async fn fetch_all(&self, filters: &Filters) -> PageRun {
        let url = self.products_url();
        let url = url.as_str();
        let limit = self.page_size;
        let mut run = paginate(&self.label, limit, self.max_pages, move |page| {
            self.request_page(url, limit, page, filters, None, CachePolicy::Bypass)
        })
        .await;
        if self.expand_variations {
            self.expand(&mut run, None).await;
        }
        run
    }

    async fn test_connection(&self) -> bool {
        let request = FetchRequest::get(self.products_url())
            .query("per_page", "1")
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
