//! Storefront response shapes.
//!
//! Products are kept as raw JSON: the normalizer only reads the price,
//! availability and identifier fields, and the raw payload is what gets
//! archived.
//!
//! ## Observed shapes
//!
//! ### Shopify `GET /products.json`
//! An object `{"products": [...]}`. Each product carries a `variants`
//! array; `price` on a variant is a decimal **string** (`"18.00"`),
//! `available` is a boolean, `grams` an integer. Variant IDs are large
//! integers and are read as strings to avoid precision loss.
//!
//! ### WooCommerce `GET /wp-json/wc/v3/products`
//! A bare JSON array. `type` is `"simple"`, `"variable"`, `"grouped"` or
//! `"external"`. Simple products carry `price` / `regular_price` /
//! `stock_status` at the top level. Variable products list `variations`
//! as bare integer IDs unless expanded from
//! `/products/{id}/variations`. `price` may be an empty string when the
//! product has no price set. The Store API flavour instead nests prices
//! under `prices` as minor-unit strings with a `currency_code`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One raw platform product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductRecord(Value);

impl ProductRecord {
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Product ID as a string, whether the platform sent a number or a string.
    #[must_use]
    pub fn id(&self) -> Option<String> {
        id_string(self.0.get("id")?)
    }

    /// WooCommerce `type`; absent on Shopify.
    #[must_use]
    pub fn product_type(&self) -> Option<&str> {
        self.0.get("type").and_then(Value::as_str)
    }

    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn as_value_mut(&mut self) -> &mut Value {
        &mut self.0
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        self.0
    }
}

impl From<Value> for ProductRecord {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Top-level response from Shopify's `GET /products.json`.
#[derive(Debug, Deserialize)]
pub struct ShopifyProductsPage {
    #[serde(default)]
    pub products: Vec<ProductRecord>,
}

/// Reads a JSON number or non-empty string as an identifier.
pub(crate) fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_owned()),
        _ => None,
    }
}
