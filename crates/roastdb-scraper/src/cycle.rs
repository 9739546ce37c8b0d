//! One end-to-end price pass for a single source.
//!
//! fetch → archive (best-effort) → normalize → load prior state →
//! reconcile → persist. Page-level failures do not abort the cycle: the
//! report carries whatever was accumulated plus the reason the pass
//! stopped. Only a failure to read prior state is an `Err`, because
//! reconciling against nothing would report every variant as new.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use roastdb_core::{
    ArchiveMetadata, ArchiveStatus, BatchUpdateSummary, PersistenceClient, PersistenceError,
    Platform, PriceDelta, PriceRecord, PricingUpdate, RawResponseStore, VariantSnapshot,
};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::normalize::normalize_product_with_raw;
use crate::platform::{Filters, PageRun, PageTermination, PlatformAdapter};
use crate::reconcile::reconcile;
use crate::resilience::{BackoffRetrier, CircuitBreaker, CircuitError, RateLimitAware};

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("failed to load prior snapshots for {source_id}: {source}")]
    PriorState {
        source_id: String,
        #[source]
        source: CircuitError<PersistenceError>,
    },
}

/// Collaborators shared by every cycle of a run.
pub struct CycleDeps<'a, P, R> {
    pub persistence: &'a P,
    /// `None` disables archival.
    pub archive: Option<&'a R>,
    /// Guards every persistence call.
    pub breaker: &'a CircuitBreaker,
    /// Re-runs a pass that ended on a 429.
    pub retrier: &'a BackoffRetrier,
    /// Fetch, normalize and reconcile, but write nothing.
    pub dry_run: bool,
}

#[derive(Debug, Clone)]
pub struct CycleReport {
    pub source_id: String,
    pub platform: Platform,
    pub pages_fetched: u32,
    pub product_count: usize,
    pub variant_count: usize,
    pub termination: PageTermination,
    pub deltas: Vec<PriceDelta>,
    /// Price-history rows written.
    pub prices_recorded: usize,
    /// `None` when nothing was written (dry run, no deltas, or breaker open).
    pub persistence: Option<BatchUpdateSummary>,
    pub persistence_errors: Vec<String>,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl CycleReport {
    /// `true` when the catalog pass ended naturally and every write landed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.termination.is_complete()
            && self.persistence_errors.is_empty()
            && self
                .persistence
                .as_ref()
                .is_none_or(BatchUpdateSummary::is_complete)
    }

    #[must_use]
    pub fn price_changes(&self) -> usize {
        self.deltas.iter().filter(|d| d.price_changed()).count()
    }

    #[must_use]
    pub fn availability_changes(&self) -> usize {
        self.deltas
            .iter()
            .filter(|d| !d.is_new_variant() && d.availability_changed())
            .count()
    }
}

/// A pass that ended on a 429, carried back to the retrier.
struct RateLimitedPass(PageRun);

impl fmt::Display for RateLimitedPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pass ended after {} page(s): {}",
            self.0.pages_fetched, self.0.termination
        )
    }
}

impl RateLimitAware for RateLimitedPass {
    fn is_rate_limited(&self) -> bool {
        matches!(self.0.termination, PageTermination::RateLimited { .. })
    }

    fn retry_after(&self) -> Option<Duration> {
        match self.0.termination {
            PageTermination::RateLimited { retry_after_secs } => {
                Some(Duration::from_secs(retry_after_secs))
            }
            _ => None,
        }
    }
}

/// Runs one price cycle for `source_id` through `adapter`.
///
/// # Errors
///
/// Returns [`CycleError::PriorState`] when prior snapshots cannot be read,
/// including while the persistence breaker is open.
pub async fn run_price_cycle<A, P, R>(
    source_id: &str,
    adapter: &A,
    deps: &CycleDeps<'_, P, R>,
    filters: &Filters,
) -> Result<CycleReport, CycleError>
where
    A: PlatformAdapter,
    P: PersistenceClient,
    R: RawResponseStore,
{
    let started_at = Utc::now();
    let platform = adapter.platform();

    let run = fetch_with_backoff(source_id, adapter, deps.retrier, filters).await;
    tracing::debug!(
        source = source_id,
        pages = run.pages_fetched,
        products = run.products.len(),
        termination = %run.termination,
        "catalog pass finished"
    );

    if !deps.dry_run {
        if let Some(archive) = deps.archive {
            archive_run(source_id, platform, archive, &run, started_at).await;
        }
    }

    let mut fresh: Vec<VariantSnapshot> = Vec::new();
    let mut raw_by_variant: HashMap<String, &Map<String, Value>> = HashMap::new();
    for (snapshot, raw) in run.products.iter().flat_map(normalize_product_with_raw) {
        raw_by_variant.entry(snapshot.variant_id.clone()).or_insert(raw);
        fresh.push(snapshot);
    }

    let prior = if fresh.is_empty() {
        Vec::new()
    } else {
        deps.breaker
            .call(|| deps.persistence.latest_snapshots(source_id))
            .await
            .map_err(|source| CycleError::PriorState {
                source_id: source_id.to_string(),
                source,
            })?
    };

    let deltas = reconcile(&fresh, &prior, Utc::now());

    let mut report = CycleReport {
        source_id: source_id.to_string(),
        platform,
        pages_fetched: run.pages_fetched,
        product_count: run.products.len(),
        variant_count: fresh.len(),
        termination: run.termination.clone(),
        deltas,
        prices_recorded: 0,
        persistence: None,
        persistence_errors: Vec::new(),
        dry_run: deps.dry_run,
        started_at,
        finished_at: started_at,
    };

    if !deps.dry_run && !report.deltas.is_empty() {
        persist(&mut report, deps, &raw_by_variant).await;
    }
    report.finished_at = Utc::now();

    if report.is_complete() {
        tracing::info!(
            source = source_id,
            products = report.product_count,
            variants = report.variant_count,
            deltas = report.deltas.len(),
            price_changes = report.price_changes(),
            prices_recorded = report.prices_recorded,
            dry_run = report.dry_run,
            "price cycle complete"
        );
    } else {
        tracing::error!(
            source = source_id,
            products = report.product_count,
            variants = report.variant_count,
            deltas = report.deltas.len(),
            termination = %report.termination,
            persistence_errors = report.persistence_errors.len(),
            "price cycle finished with failures"
        );
    }
    Ok(report)
}

async fn fetch_with_backoff<A: PlatformAdapter>(
    source_id: &str,
    adapter: &A,
    retrier: &BackoffRetrier,
    filters: &Filters,
) -> PageRun {
    let outcome = retrier
        .run(source_id, || async move {
            let run = adapter.fetch_all(filters).await;
            if matches!(run.termination, PageTermination::RateLimited { .. }) {
                Err(RateLimitedPass(run))
            } else {
                Ok(run)
            }
        })
        .await;
    match outcome {
        Ok(run) => run,
        Err(e) => e.into_inner().0,
    }
}

async fn archive_run<R: RawResponseStore>(
    source_id: &str,
    platform: Platform,
    archive: &R,
    run: &PageRun,
    fetched_at: DateTime<Utc>,
) {
    let payload = Value::Array(
        run.products
            .iter()
            .map(|product| product.as_value().clone())
            .collect(),
    );
    let metadata = ArchiveMetadata {
        fetched_at,
        pages_fetched: usize::try_from(run.pages_fetched).unwrap_or(usize::MAX),
        product_count: run.products.len(),
        termination: run.termination.to_string(),
    };
    let status = if run.is_complete() {
        ArchiveStatus::Complete
    } else {
        ArchiveStatus::Partial
    };
    if let Err(e) = archive
        .store(source_id, platform, &payload, &metadata, status)
        .await
    {
        tracing::warn!(source = source_id, error = %e, "raw payload archive failed");
    }
}

async fn persist<P, R>(
    report: &mut CycleReport,
    deps: &CycleDeps<'_, P, R>,
    raw_by_variant: &HashMap<String, &Map<String, Value>>,
) where
    P: PersistenceClient,
{
    let records: Vec<PriceRecord> = report
        .deltas
        .iter()
        .filter(|d| d.price_changed())
        .map(|delta| PriceRecord {
            source_id: report.source_id.clone(),
            variant_id: delta.variant_id.clone(),
            price: delta.new_price,
            currency: delta.currency.clone(),
            scraped_at: delta.detected_at,
            source_raw: raw_by_variant
                .get(&delta.variant_id)
                .map(|raw| Value::Object((*raw).clone())),
        })
        .collect();

    if !records.is_empty() {
        match deps
            .breaker
            .call(|| deps.persistence.insert_prices(&records))
            .await
        {
            Ok(summary) => {
                report.prices_recorded = summary.success_count;
                if !summary.is_complete() {
                    tracing::warn!(
                        source = %report.source_id,
                        recorded = summary.success_count,
                        failed = summary.failure_count,
                        "price history insert partially failed"
                    );
                }
                report.persistence_errors.extend(summary.errors);
            }
            Err(e) => {
                tracing::error!(source = %report.source_id, error = %e, "price history insert failed");
                report.persistence_errors.push(e.to_string());
            }
        }
    }

    let updates: Vec<PricingUpdate> = report
        .deltas
        .iter()
        .map(|delta| PricingUpdate {
            source_id: report.source_id.clone(),
            variant_id: delta.variant_id.clone(),
            price_current: delta.new_price,
            last_checked_at: delta.detected_at,
            in_stock: delta.in_stock,
            currency: delta.currency.clone(),
            sku: delta.sku.clone(),
        })
        .collect();

    match deps
        .breaker
        .call(|| deps.persistence.batch_update_variant_pricing(&updates))
        .await
    {
        Ok(summary) => {
            if !summary.is_complete() {
                tracing::warn!(
                    source = %report.source_id,
                    succeeded = summary.success_count,
                    failed = summary.failure_count,
                    "variant pricing update partially failed"
                );
            }
            report.persistence = Some(summary);
        }
        Err(e) => {
            tracing::error!(source = %report.source_id, error = %e, "variant pricing update failed");
            report.persistence_errors.push(e.to_string());
        }
    }
}
