//! Request and response values exchanged with [`super::Fetcher`].

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use roastdb_core::Credentials;
use serde::de::DeserializeOwned;

use crate::error::ScraperError;

/// One logical request. Retries, politeness and conditional headers are
/// added by the fetcher.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub(super) url: String,
    pub(super) method: Method,
    pub(super) query: Vec<(String, String)>,
    pub(super) headers: HeaderMap,
    pub(super) credentials: Credentials,
    pub(super) use_cache: bool,
}

impl FetchRequest {
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::GET,
            query: Vec::new(),
            headers: HeaderMap::new(),
            credentials: Credentials::Anonymous,
            use_cache: true,
        }
    }

    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Skips `If-None-Match` / `If-Modified-Since` for this request.
    #[must_use]
    pub fn without_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Absolute URL with query parameters appended; also the cache key.
    pub(super) fn full_url(&self) -> Result<reqwest::Url, ScraperError> {
        let mut url = reqwest::Url::parse(&self.url).map_err(|e| ScraperError::InvalidUrl {
            url: self.url.clone(),
            reason: e.to_string(),
        })?;
        if !self.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }
}

/// Final response of a logical request. A `5xx` here means retries were
/// exhausted; a `304` carries an empty body.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    /// HTTP attempts made, including the successful one.
    pub attempts: u32,
}

impl FetchResponse {
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    #[must_use]
    pub fn is_not_modified(&self) -> bool {
        self.status == 304
    }

    #[must_use]
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Decodes the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::Deserialize`] tagged with `context`.
    pub fn json<T: DeserializeOwned>(&self, context: &str) -> Result<T, ScraperError> {
        serde_json::from_slice(&self.body).map_err(|e| ScraperError::Deserialize {
            context: context.to_owned(),
            source: e,
        })
    }

    /// Lossy UTF-8 body, for logging rejected responses.
    #[must_use]
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
