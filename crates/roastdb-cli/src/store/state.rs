//! JSON state file implementing [`PersistenceClient`].
//!
//! Layout: one entry per source holding current variant pricing (keyed by
//! variant id) and an append-only price history. Every mutation is applied
//! to a copy of the state, written through a temp file and rename, and
//! only becomes visible once the write succeeds.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use roastdb_core::{
    BatchUpdateSummary, PersistenceClient, PersistenceError, PriceRecord, PricingUpdate,
    VariantSnapshot,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    sources: BTreeMap<String, SourceState>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SourceState {
    #[serde(default)]
    variants: BTreeMap<String, VariantPricing>,
    #[serde(default)]
    price_history: Vec<StoredPrice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VariantPricing {
    price_current: Decimal,
    currency: String,
    in_stock: bool,
    #[serde(default)]
    sku: Option<String>,
    last_checked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredPrice {
    id: Uuid,
    variant_id: String,
    price: Decimal,
    currency: String,
    scraped_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source_raw: Option<serde_json::Value>,
}

pub struct JsonStateStore {
    path: PathBuf,
    state: Mutex<StateFile>,
}

impl JsonStateStore {
    /// Loads `path`, starting empty when it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if the file exists but cannot be read or
    /// parsed.
    pub async fn open(path: &Path) -> Result<Self, PersistenceError> {
        let state = match tokio::fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StateFile::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path: path.to_path_buf(),
            state: Mutex::new(state),
        })
    }

    /// Price-history rows recorded for `source_id`.
    pub async fn history_len(&self, source_id: &str) -> usize {
        self.state
            .lock()
            .await
            .sources
            .get(source_id)
            .map_or(0, |s| s.price_history.len())
    }

    async fn save(&self, state: &StateFile) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Applies `change` to a copy of the state and swaps it in once saved.
    /// On a failed save the in-memory state is left as it was.
    async fn commit<T>(
        &self,
        change: impl FnOnce(&mut StateFile) -> T,
    ) -> Result<T, PersistenceError> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        let out = change(&mut next);
        self.save(&next).await?;
        *state = next;
        Ok(out)
    }
}

fn push_price(state: &mut StateFile, record: &PriceRecord) -> Uuid {
    let id = Uuid::new_v4();
    state
        .sources
        .entry(record.source_id.clone())
        .or_default()
        .price_history
        .push(StoredPrice {
            id,
            variant_id: record.variant_id.clone(),
            price: record.price,
            currency: record.currency.clone(),
            scraped_at: record.scraped_at,
            source_raw: record.source_raw.clone(),
        });
    id
}

fn apply_update(state: &mut StateFile, update: &PricingUpdate) {
    state
        .sources
        .entry(update.source_id.clone())
        .or_default()
        .variants
        .insert(
            update.variant_id.clone(),
            VariantPricing {
                price_current: update.price_current,
                currency: update.currency.clone(),
                in_stock: update.in_stock,
                sku: update.sku.clone(),
                last_checked_at: update.last_checked_at,
            },
        );
}

impl PersistenceClient for JsonStateStore {
    async fn latest_snapshots(
        &self,
        source_id: &str,
    ) -> Result<Vec<VariantSnapshot>, PersistenceError> {
        let state = self.state.lock().await;
        Ok(state
            .sources
            .get(source_id)
            .map(|source| {
                source
                    .variants
                    .iter()
                    .map(|(variant_id, pricing)| VariantSnapshot {
                        variant_id: variant_id.clone(),
                        price: pricing.price_current,
                        currency: pricing.currency.clone(),
                        in_stock: pricing.in_stock,
                        sku: pricing.sku.clone(),
                        weight_grams: None,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn insert_price(&self, record: &PriceRecord) -> Result<String, PersistenceError> {
        let id = self.commit(|state| push_price(state, record)).await?;
        Ok(id.to_string())
    }

    /// Appends every row in memory, then writes the file once.
    async fn insert_prices(
        &self,
        records: &[PriceRecord],
    ) -> Result<BatchUpdateSummary, PersistenceError> {
        self.commit(|state| {
            for record in records {
                push_price(state, record);
            }
        })
        .await?;
        Ok(BatchUpdateSummary {
            success_count: records.len(),
            failure_count: 0,
            errors: Vec::new(),
        })
    }

    async fn update_variant_pricing(
        &self,
        update: &PricingUpdate,
    ) -> Result<bool, PersistenceError> {
        self.commit(|state| apply_update(state, update)).await?;
        Ok(true)
    }

    /// Applies every update in memory, then writes the file once.
    async fn batch_update_variant_pricing(
        &self,
        updates: &[PricingUpdate],
    ) -> Result<BatchUpdateSummary, PersistenceError> {
        self.commit(|state| {
            for update in updates {
                apply_update(state, update);
            }
        })
        .await?;
        Ok(BatchUpdateSummary {
            success_count: updates.len(),
            failure_count: 0,
            errors: Vec::new(),
        })
    }
}
