//! Per-source fetch coordinator: concurrency gate, politeness delay,
//! conditional requests and classified retry.

mod politeness;
mod request;

use std::time::Duration;

use reqwest::header::{HeaderValue, IF_MODIFIED_SINCE, IF_NONE_MATCH};
use reqwest::Client;
use roastdb_core::{Credentials, SourceConfig};
use tokio::sync::Semaphore;

use crate::cache::{CacheEntry, ConditionalCache};
use crate::classify::{classify, AttemptOutcome, RetryDecision, TransportFault};
use crate::error::ScraperError;

pub use politeness::{jittered_delay, politeness_pause, retry_delay};
pub use request::{FetchRequest, FetchResponse};

/// Per-source tuning, fixed for the lifetime of a [`Fetcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchConfig {
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// Additional attempts after the first, for retryable outcomes.
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub politeness_delay: Duration,
    pub jitter_range: Duration,
    /// In-flight request bound for this source.
    pub max_concurrent: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_base_delay: Duration::from_secs(1),
            politeness_delay: Duration::from_millis(500),
            jitter_range: Duration::from_millis(250),
            max_concurrent: 2,
        }
    }
}

impl FetchConfig {
    #[must_use]
    pub fn from_source(source: &SourceConfig) -> Self {
        Self {
            timeout: Duration::from_secs(source.timeout_secs),
            max_retries: source.max_retries,
            retry_base_delay: Duration::from_millis(source.retry_base_delay_ms),
            politeness_delay: Duration::from_millis(source.politeness_delay_ms),
            jitter_range: Duration::from_millis(source.jitter_ms),
            max_concurrent: source.concurrency,
        }
    }

    /// Raises the politeness delay to at least `floor`.
    #[must_use]
    pub fn with_politeness_floor(mut self, floor: Duration) -> Self {
        self.politeness_delay = self.politeness_delay.max(floor);
        self
    }
}

/// Issues HTTP requests for one source.
///
/// Every request waits for a gate permit, then sleeps the politeness delay
/// before each attempt. Conditional validators from earlier 2xx responses
/// are attached unless the request opts out, and a 304 returns with an
/// empty body. Timeouts, connection failures and 5xx responses are retried
/// up to `max_retries` times with `retry_base_delay * 2^attempt` waits;
/// 4xx responses (429 included) come back after a single attempt.
pub struct Fetcher {
    client: Client,
    config: FetchConfig,
    gate: Semaphore,
    cache: ConditionalCache,
}

impl Fetcher {
    /// # Errors
    ///
    /// Returns [`ScraperError::Client`] if the `reqwest::Client` cannot be
    /// constructed.
    pub fn new(config: FetchConfig, user_agent: &str) -> Result<Self, ScraperError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout.min(Duration::from_secs(10)))
            .user_agent(user_agent)
            .build()?;
        let gate = Semaphore::new(config.max_concurrent.max(1));
        Ok(Self {
            client,
            config,
            gate,
            cache: ConditionalCache::new(),
        })
    }

    #[must_use]
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    #[must_use]
    pub fn cache(&self) -> &ConditionalCache {
        &self.cache
    }

    /// Rejects every queued and future request with
    /// [`ScraperError::GateClosed`]. In-flight requests finish normally.
    pub fn close(&self) {
        self.gate.close();
    }

    /// Sends `request` and returns its final response.
    ///
    /// # Errors
    ///
    /// - [`ScraperError::InvalidUrl`] if the URL does not parse.
    /// - [`ScraperError::GateClosed`] after [`Self::close`].
    /// - [`ScraperError::Transport`] when a transport failure outlives the
    ///   retry budget, or is not retryable at all.
    pub async fn request(&self, request: FetchRequest) -> Result<FetchResponse, ScraperError> {
        let url = request.full_url()?;
        let cache_key = url.to_string();

        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| ScraperError::GateClosed {
                url: cache_key.clone(),
            })?;

        let mut attempt = 0u32;
        loop {
            let pause = politeness_pause(self.config.politeness_delay, self.config.jitter_range);
            if !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }

            let cached = if request.use_cache {
                self.cache.get(&cache_key)
            } else {
                None
            };
            let builder = self.build(&request, url.clone(), cached.as_ref());

            let response = match builder.send().await {
                Ok(response) => response,
                Err(err) => {
                    let fault = TransportFault::of(&err);
                    if classify(AttemptOutcome::Transport(fault)) == RetryDecision::Retry
                        && attempt < self.config.max_retries
                    {
                        self.back_off(&cache_key, attempt, &format!("{fault:?}")).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(ScraperError::Transport {
                        url: cache_key,
                        attempts: attempt + 1,
                        source: err,
                    });
                }
            };

            let status = response.status().as_u16();
            if classify(AttemptOutcome::Status(status)) == RetryDecision::Retry
                && attempt < self.config.max_retries
            {
                self.back_off(&cache_key, attempt, &format!("HTTP {status}"))
                    .await;
                attempt += 1;
                continue;
            }

            let headers = response.headers().clone();
            let body = if status == 304 {
                Vec::new()
            } else {
                response
                    .bytes()
                    .await
                    .map_err(|e| ScraperError::Transport {
                        url: cache_key.clone(),
                        attempts: attempt + 1,
                        source: e,
                    })?
                    .to_vec()
            };

            if (200..300).contains(&status) {
                if let Some(entry) = CacheEntry::from_headers(&headers) {
                    self.cache.put(&cache_key, entry.etag, entry.last_modified);
                }
            }

            tracing::debug!(url = %cache_key, status, attempts = attempt + 1, "request complete");
            return Ok(FetchResponse {
                status,
                headers,
                body,
                attempts: attempt + 1,
            });
        }
    }

    fn build(
        &self,
        request: &FetchRequest,
        url: reqwest::Url,
        cached: Option<&CacheEntry>,
    ) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(request.method.clone(), url)
            .headers(request.headers.clone());

        builder = match &request.credentials {
            Credentials::Anonymous => builder,
            Credentials::Bearer { token } => builder.bearer_auth(token),
            Credentials::Basic { key, secret } => builder.basic_auth(key, Some(secret)),
        };

        if let Some(entry) = cached {
            if let Some(etag) = entry.etag.as_deref().and_then(header_value) {
                builder = builder.header(IF_NONE_MATCH, etag);
            }
            if let Some(since) = entry.last_modified.as_deref().and_then(header_value) {
                builder = builder.header(IF_MODIFIED_SINCE, since);
            }
        }
        builder
    }

    async fn back_off(&self, url: &str, attempt: u32, reason: &str) {
        let delay = retry_delay(self.config.retry_base_delay, attempt);
        tracing::warn!(
            url,
            attempt,
            max_retries = self.config.max_retries,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            reason,
            "retryable outcome, backing off"
        );
        tokio::time::sleep(delay).await;
    }
}

fn header_value(value: &str) -> Option<HeaderValue> {
    HeaderValue::from_str(value).ok()
}

#[cfg(test)]
#[path = "../fetch_test.rs"]
mod tests;
