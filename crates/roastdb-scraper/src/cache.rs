//! Conditional-request validator memory, keyed by full request URL.
//!
//! Contract: the fetcher reads the entry before sending (to add
//! `If-None-Match` / `If-Modified-Since`) and writes it after a 2xx response
//! that carries `ETag` or `Last-Modified`. A 304 never touches the entry.
//! Entries are never evicted; keys come from a bounded set of endpoint URLs.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use reqwest::header::{HeaderMap, HeaderName, ETAG, LAST_MODIFIED};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheEntry {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl CacheEntry {
    /// Reads validators from response headers; `None` when neither is present.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let read = |name: HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
        };
        let entry = Self {
            etag: read(ETAG),
            last_modified: read(LAST_MODIFIED),
        };
        if entry.etag.is_none() && entry.last_modified.is_none() {
            None
        } else {
            Some(entry)
        }
    }
}

/// Per-source URL → validator map.
///
/// The lock is only held for the map operation itself, never across an
/// `.await`.
#[derive(Debug, Default)]
pub struct ConditionalCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl ConditionalCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, url: &str) -> Option<CacheEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .cloned()
    }

    /// Overwrites the entry for `url`. Both validators absent is a no-op.
    pub fn put(&self, url: &str, etag: Option<String>, last_modified: Option<String>) {
        if etag.is_none() && last_modified.is_none() {
            return;
        }
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                url.to_owned(),
                CacheEntry {
                    etag,
                    last_modified,
                },
            );
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
