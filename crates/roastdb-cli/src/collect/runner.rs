//! Bounded cross-source fan-out shared by every command, plus run totals.

use std::future::Future;

use futures::stream::{self, StreamExt};
use roastdb_core::SourceConfig;
use roastdb_scraper::CycleReport;

/// Runs `process` for every source, at most `max_concurrent` at a time.
/// Results come back in completion order, each paired with its source.
pub(super) async fn run_sources<'a, T, F, Fut>(
    sources: &'a [SourceConfig],
    max_concurrent: usize,
    process: F,
) -> Vec<(&'a SourceConfig, T)>
where
    F: Fn(&'a SourceConfig) -> Fut,
    Fut: Future<Output = T>,
{
    stream::iter(sources)
        .map(|source| {
            let fut = process(source);
            async move { (source, fut.await) }
        })
        .buffer_unordered(max_concurrent.max(1))
        .collect()
        .await
}

/// Aggregated counts for a `collect` run.
#[derive(Debug, Default, PartialEq, Eq)]
pub(super) struct RunTotals {
    pub sources: usize,
    /// Sources whose cycle errored or finished with a failure indicator.
    pub failed_sources: usize,
    pub variants: usize,
    pub deltas: usize,
    pub prices_recorded: usize,
}

impl RunTotals {
    pub(super) fn all_failed(&self) -> bool {
        self.sources > 0 && self.failed_sources == self.sources
    }
}

pub(super) fn tally(results: &[(&SourceConfig, anyhow::Result<CycleReport>)]) -> RunTotals {
    let mut totals = RunTotals {
        sources: results.len(),
        ..RunTotals::default()
    };
    for (source, outcome) in results {
        match outcome {
            Ok(report) => {
                totals.variants += report.variant_count;
                totals.deltas += report.deltas.len();
                totals.prices_recorded += report.prices_recorded;
                if !report.is_complete() {
                    totals.failed_sources += 1;
                }
            }
            Err(e) => {
                let message = format!("{e:#}");
                tracing::error!(source = %source.id, error = %message, "price cycle failed");
                totals.failed_sources += 1;
            }
        }
    }
    totals
}
