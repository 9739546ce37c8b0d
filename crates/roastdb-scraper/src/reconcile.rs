//! Diff of fresh variant snapshots against last known state.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use roastdb_core::{PriceDelta, VariantSnapshot};

/// Emits one [`PriceDelta`] per fresh variant whose price or availability
/// differs from `prior`, or that has no prior snapshot at all.
///
/// Matching is by `variant_id`. When `fresh` repeats an ID, the first
/// occurrence wins. Output order follows `fresh`; `prior` is only read.
#[must_use]
pub fn reconcile(
    fresh: &[VariantSnapshot],
    prior: &[VariantSnapshot],
    detected_at: DateTime<Utc>,
) -> Vec<PriceDelta> {
    let prior_by_id: HashMap<&str, &VariantSnapshot> = prior
        .iter()
        .map(|snapshot| (snapshot.variant_id.as_str(), snapshot))
        .collect();
    let mut seen: HashSet<&str> = HashSet::with_capacity(fresh.len());
    let mut deltas = Vec::new();

    for snapshot in fresh {
        if !seen.insert(snapshot.variant_id.as_str()) {
            continue;
        }
        match prior_by_id.get(snapshot.variant_id.as_str()).copied() {
            None => deltas.push(delta(snapshot, None, detected_at)),
            Some(old) if old.price != snapshot.price || old.in_stock != snapshot.in_stock => {
                deltas.push(delta(snapshot, Some(old), detected_at));
            }
            Some(_) => {}
        }
    }
    deltas
}

fn delta(
    fresh: &VariantSnapshot,
    prior: Option<&VariantSnapshot>,
    detected_at: DateTime<Utc>,
) -> PriceDelta {
    PriceDelta {
        variant_id: fresh.variant_id.clone(),
        old_price: prior.map(|p| p.price),
        new_price: fresh.price,
        currency: fresh.currency.clone(),
        in_stock: fresh.in_stock,
        previous_in_stock: prior.map(|p| p.in_stock),
        sku: fresh.sku.clone(),
        detected_at,
    }
}
