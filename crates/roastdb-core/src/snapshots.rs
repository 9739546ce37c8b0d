use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Minimal comparable state of one purchasable variant, extracted from a
/// storefront product payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantSnapshot {
    /// Platform variant ID, stored as a string to avoid precision loss.
    pub variant_id: String,
    /// Major-unit price, e.g. `25.99`.
    pub price: Decimal,
    /// ISO 4217 currency code.
    pub currency: String,
    pub in_stock: bool,
    pub sku: Option<String>,
    /// Shipping weight when the platform reports it in grams.
    pub weight_grams: Option<f64>,
}

/// A detected change between a fresh [`VariantSnapshot`] and the last known
/// one for the same variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceDelta {
    pub variant_id: String,
    /// `None` when the variant has never been seen before.
    pub old_price: Option<Decimal>,
    pub new_price: Decimal,
    pub currency: String,
    pub in_stock: bool,
    /// Prior availability, `None` for new variants.
    pub previous_in_stock: Option<bool>,
    pub sku: Option<String>,
    pub detected_at: DateTime<Utc>,
}

impl PriceDelta {
    #[must_use]
    pub fn is_new_variant(&self) -> bool {
        self.old_price.is_none()
    }

    /// `true` for new variants and for real price moves.
    #[must_use]
    pub fn price_changed(&self) -> bool {
        self.old_price != Some(self.new_price)
    }

    #[must_use]
    pub fn availability_changed(&self) -> bool {
        self.previous_in_stock != Some(self.in_stock)
    }
}
