//! Command handlers for `check`, `count` and `collect`.
//!
//! Called from `main` once configuration is loaded. Per-source failures are
//! logged and counted rather than propagated so a single bad source does
//! not abort the run; the command fails only when every source fails.

mod runner;

use std::time::Duration;

use anyhow::Context;
use roastdb_core::{AppConfig, ConfigProvider, Platform, PriceDelta, SourceConfig};
use roastdb_scraper::resilience::{
    BackoffPolicy, BackoffRetrier, CircuitBreaker, CircuitBreakerConfig,
};
use roastdb_scraper::{
    run_price_cycle, CycleDeps, CycleReport, Filters, PlatformAdapter, SourceAdapter,
    WooCommerceAdapter,
};
use serde::Serialize;

use crate::store::{FsRawResponseStore, JsonStateStore};

/// One stdout line per detected change.
#[derive(Serialize)]
struct DeltaLine<'a> {
    source_id: &'a str,
    #[serde(flatten)]
    delta: &'a PriceDelta,
}

/// Resolve the sources a command should visit.
///
/// With `source_filter` the single source must resolve, credentials
/// included. Without it, sources whose credentials are missing are skipped
/// with a warning.
pub(crate) fn resolve_sources<P: ConfigProvider>(
    provider: &P,
    source_filter: Option<&str>,
) -> anyhow::Result<Vec<SourceConfig>> {
    if let Some(id) = source_filter {
        let source = provider
            .get_source_config(id)
            .with_context(|| format!("cannot resolve source '{id}'"))?;
        return Ok(vec![source]);
    }

    let mut sources = Vec::new();
    for id in provider.source_ids() {
        match provider.get_source_config(&id) {
            Ok(source) => sources.push(source),
            Err(e) => tracing::warn!(source = %id, error = %e, "skipping source: configuration incomplete"),
        }
    }
    if sources.is_empty() {
        anyhow::bail!("no usable sources configured");
    }
    Ok(sources)
}

pub(crate) fn build_breaker(config: &AppConfig) -> CircuitBreaker {
    CircuitBreaker::new(
        "persistence",
        CircuitBreakerConfig {
            failure_threshold: config.breaker_failure_threshold,
            success_threshold: config.breaker_success_threshold,
            timeout: Duration::from_secs(config.breaker_timeout_secs),
        },
    )
}

pub(crate) fn build_retrier(config: &AppConfig) -> BackoffRetrier {
    BackoffRetrier::new(BackoffPolicy {
        base_delay: Duration::from_secs(config.rate_limit_base_delay_secs),
        max_attempts: config.rate_limit_max_attempts,
        ..BackoffPolicy::default()
    })
}

/// Probe every source with a single-item request.
///
/// # Errors
///
/// Returns an error if sources cannot be resolved or any probe fails.
pub(crate) async fn run_check<P: ConfigProvider>(
    config: &AppConfig,
    provider: &P,
    source_filter: Option<&str>,
) -> anyhow::Result<()> {
    let sources = resolve_sources(provider, source_filter)?;
    let results = runner::run_sources(&sources, config.max_concurrent_sources, |source| {
        check_source(source, &config.user_agent)
    })
    .await;

    let mut unreachable = 0usize;
    for (source, reachable) in &results {
        let status = if *reachable { "ok" } else { "unreachable" };
        println!("{}\t{}\t{status}", source.id, source.platform);
        if !reachable {
            unreachable += 1;
        }
    }
    if unreachable > 0 {
        anyhow::bail!("{unreachable} of {} sources unreachable", results.len());
    }
    Ok(())
}

async fn check_source(source: &SourceConfig, user_agent: &str) -> bool {
    match SourceAdapter::from_source_config(source, user_agent) {
        Ok(adapter) => adapter.test_connection().await,
        Err(e) => {
            tracing::error!(source = %source.id, error = %e, "failed to build adapter");
            false
        }
    }
}

/// Print catalog sizes for WooCommerce sources from the `X-WP-Total` probe.
///
/// # Errors
///
/// Returns an error if sources cannot be resolved, or if a single
/// requested source is not a WooCommerce source.
pub(crate) async fn run_count<P: ConfigProvider>(
    config: &AppConfig,
    provider: &P,
    source_filter: Option<&str>,
) -> anyhow::Result<()> {
    let sources: Vec<SourceConfig> = resolve_sources(provider, source_filter)?
        .into_iter()
        .filter(|s| {
            if s.platform == Platform::Woocommerce {
                true
            } else {
                tracing::info!(source = %s.id, platform = %s.platform, "count probe not supported, skipping");
                false
            }
        })
        .collect();
    if sources.is_empty() {
        anyhow::bail!("no woocommerce sources to count");
    }

    let results = runner::run_sources(&sources, config.max_concurrent_sources, |source| {
        count_source(source, &config.user_agent)
    })
    .await;

    for (source, outcome) in &results {
        match outcome {
            Ok(Some(total)) => println!("{}\t{total}", source.id),
            Ok(None) => println!("{}\tunknown", source.id),
            Err(e) => {
                let message = format!("{e:#}");
                tracing::error!(source = %source.id, error = %message, "count probe failed");
                println!("{}\terror", source.id);
            }
        }
    }
    Ok(())
}

async fn count_source(source: &SourceConfig, user_agent: &str) -> anyhow::Result<Option<u64>> {
    let adapter = WooCommerceAdapter::new(source, user_agent)
        .with_context(|| format!("failed to build adapter for '{}'", source.id))?;
    Ok(adapter.count_products(&Filters::new()).await?)
}

/// Run one price cycle per source and print every delta as a JSON line.
///
/// When `dry_run` is `true` nothing is written to the state file or the
/// archive.
///
/// # Errors
///
/// Returns an error if sources cannot be resolved, the state file cannot
/// be opened, or every source fails.
pub(crate) async fn run_collect<P: ConfigProvider>(
    config: &AppConfig,
    provider: &P,
    source_filter: Option<&str>,
    dry_run: bool,
) -> anyhow::Result<()> {
    let sources = resolve_sources(provider, source_filter)?;
    let store = JsonStateStore::open(&config.state_path)
        .await
        .with_context(|| format!("failed to open state file {}", config.state_path.display()))?;
    let archive = config.archive_dir.as_ref().map(FsRawResponseStore::new);
    let breaker = build_breaker(config);
    let retrier = build_retrier(config);
    let deps = CycleDeps {
        persistence: &store,
        archive: archive.as_ref(),
        breaker: &breaker,
        retrier: &retrier,
        dry_run,
    };

    let results = runner::run_sources(&sources, config.max_concurrent_sources, |source| {
        collect_source(source, &config.user_agent, &deps)
    })
    .await;

    for (_, outcome) in &results {
        if let Ok(report) = outcome {
            print_deltas(report)?;
        }
    }

    let totals = runner::tally(&results);
    tracing::info!(
        sources = totals.sources,
        failed_sources = totals.failed_sources,
        variants = totals.variants,
        deltas = totals.deltas,
        prices_recorded = totals.prices_recorded,
        dry_run,
        "collect run finished"
    );
    if totals.all_failed() {
        anyhow::bail!("all {} sources failed", totals.sources);
    }
    if totals.failed_sources > 0 {
        tracing::warn!(
            failed_sources = totals.failed_sources,
            total_sources = totals.sources,
            "some sources failed during collection"
        );
    }
    Ok(())
}

pub(crate) async fn collect_source(
    source: &SourceConfig,
    user_agent: &str,
    deps: &CycleDeps<'_, JsonStateStore, FsRawResponseStore>,
) -> anyhow::Result<CycleReport> {
    let adapter = SourceAdapter::from_source_config(source, user_agent)
        .with_context(|| format!("failed to build adapter for '{}'", source.id))?;
    let report = run_price_cycle(&source.id, &adapter, deps, &Filters::new()).await?;
    Ok(report)
}

fn print_deltas(report: &CycleReport) -> anyhow::Result<()> {
    for delta in &report.deltas {
        let line = DeltaLine {
            source_id: &report.source_id,
            delta,
        };
        println!("{}", serde_json::to_string(&line)?);
    }
    Ok(())
}

#[cfg(test)]
#[path = "collect_test.rs"]
mod tests;
