//! Interfaces the engine consumes but does not implement: durable pricing
//! storage and raw-response archival.

use std::future::Future;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Platform, VariantSnapshot};

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),

    #[error("rejected write for variant {variant_id}: {reason}")]
    Rejected { variant_id: String, reason: String },

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// One price observation to append to the price history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub source_id: String,
    pub variant_id: String,
    pub price: Decimal,
    pub currency: String,
    pub scraped_at: DateTime<Utc>,
    /// Raw platform payload the price was read from, when retained.
    pub source_raw: Option<serde_json::Value>,
}

/// Current-pricing update for one variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingUpdate {
    pub source_id: String,
    pub variant_id: String,
    pub price_current: Decimal,
    pub last_checked_at: DateTime<Utc>,
    pub in_stock: bool,
    pub currency: String,
    pub sku: Option<String>,
}

/// Outcome of a batch write (price rows or pricing updates). Partial
/// failure is reported here, not retried.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchUpdateSummary {
    pub success_count: usize,
    pub failure_count: usize,
    pub errors: Vec<String>,
}

impl BatchUpdateSummary {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failure_count == 0
    }
}

/// Durable storage for variant pricing.
pub trait PersistenceClient: Send + Sync {
    /// Last known snapshot of every variant belonging to `source_id`.
    fn latest_snapshots(
        &self,
        source_id: &str,
    ) -> impl Future<Output = Result<Vec<VariantSnapshot>, PersistenceError>> + Send;

    /// Appends a price observation and returns its storage id.
    fn insert_price(
        &self,
        record: &PriceRecord,
    ) -> impl Future<Output = Result<String, PersistenceError>> + Send;

    /// Appends every record, collecting per-row failures instead of
    /// stopping at the first one. Backends that can write a batch in one
    /// round trip should override this.
    fn insert_prices(
        &self,
        records: &[PriceRecord],
    ) -> impl Future<Output = Result<BatchUpdateSummary, PersistenceError>> + Send {
        async move {
            let mut summary = BatchUpdateSummary::default();
            for record in records {
                match self.insert_price(record).await {
                    Ok(_) => summary.success_count += 1,
                    Err(e) => {
                        summary.failure_count += 1;
                        summary
                            .errors
                            .push(format!("variant {}: {e}", record.variant_id));
                    }
                }
            }
            Ok(summary)
        }
    }

    /// Returns `false` when the backend accepted the call but changed nothing.
    fn update_variant_pricing(
        &self,
        update: &PricingUpdate,
    ) -> impl Future<Output = Result<bool, PersistenceError>> + Send;

    /// Applies every update, collecting per-item failures instead of
    /// stopping at the first one.
    fn batch_update_variant_pricing(
        &self,
        updates: &[PricingUpdate],
    ) -> impl Future<Output = Result<BatchUpdateSummary, PersistenceError>> + Send {
        async move {
            let mut summary = BatchUpdateSummary::default();
            for update in updates {
                match self.update_variant_pricing(update).await {
                    Ok(true) => summary.success_count += 1,
                    Ok(false) => {
                        summary.failure_count += 1;
                        summary
                            .errors
                            .push(format!("variant {} was not updated", update.variant_id));
                    }
                    Err(e) => {
                        summary.failure_count += 1;
                        summary
                            .errors
                            .push(format!("variant {}: {e}", update.variant_id));
                    }
                }
            }
            Ok(summary)
        }
    }
}

/// Whether an archived payload covers a full catalog pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveStatus {
    Complete,
    Partial,
}

impl std::fmt::Display for ArchiveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArchiveStatus::Complete => write!(f, "complete"),
            ArchiveStatus::Partial => write!(f, "partial"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveMetadata {
    pub fetched_at: DateTime<Utc>,
    pub pages_fetched: usize,
    pub product_count: usize,
    /// Human-readable reason the pagination pass ended.
    pub termination: String,
}

/// Blob/file store for raw fetch payloads.
///
/// Callers treat this as fire-and-forget: an `Err` is logged and never
/// aborts the fetch pipeline.
pub trait RawResponseStore: Send + Sync {
    fn store(
        &self,
        source_id: &str,
        platform: Platform,
        payload: &serde_json::Value,
        metadata: &ArchiveMetadata,
        status: ArchiveStatus,
    ) -> impl Future<Output = Result<(), ArchiveError>> + Send;
}
