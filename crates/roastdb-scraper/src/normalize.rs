//! Extraction of [`VariantSnapshot`]s from raw storefront products.
//!
//! Both platform shapes go through the same field lookups; see
//! [`crate::types`] for the observed payloads. Variants without a
//! resolvable ID or price are dropped with a debug log, never an error.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use roastdb_core::VariantSnapshot;
use rust_decimal::Decimal;
use serde_json::{Map, Value};

use crate::types::{id_string, ProductRecord};

/// Currency assumed when neither the variant nor a nested price object
/// names one.
pub const DEFAULT_CURRENCY: &str = "USD";

/// Nested integer prices above this are read as minor units (cents).
///
/// This can misread a genuinely large major-unit price; the currency is
/// not consulted.
pub const MINOR_UNIT_THRESHOLD: Decimal = Decimal::from_parts(1000, 0, 0, false, 0);

const VARIANT_LIST_FIELDS: [&str; 2] = ["variants", "variations"];
const DIRECT_PRICE_FIELDS: [&str; 2] = ["price", "regular_price"];
const NESTED_PRICE_OBJECTS: [&str; 2] = ["prices", "price"];
const NESTED_PRICE_FIELDS: [&str; 2] = ["price", "regular_price"];
const CURRENCY_FIELDS: [&str; 2] = ["currency", "currency_code"];
/// Only gram-denominated fields. WooCommerce `weight` is in the store's
/// configured unit, which the product payload does not carry.
const WEIGHT_FIELDS: [&str; 1] = ["grams"];

/// Checked in order; the first present, non-null field decides.
const AVAILABILITY_FIELDS: [&str; 7] = [
    "available",
    "in_stock",
    "is_in_stock",
    "stock_status",
    "availability",
    "inventory_quantity",
    "stock_quantity",
];

const IN_STOCK_WORDS: &[&str] = &[
    "instock",
    "in_stock",
    "in stock",
    "available",
    "onbackorder",
    "on_backorder",
    "backorder",
    "preorder",
    "yes",
    "true",
];

const OUT_OF_STOCK_WORDS: &[&str] = &[
    "outofstock",
    "out_of_stock",
    "out of stock",
    "soldout",
    "sold_out",
    "sold out",
    "unavailable",
    "discontinued",
    "no",
    "false",
];

static PRICE_NOISE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s$€£]").expect("valid regex"));

/// `1,299` or `12,345,678.90`: commas only between groups of three.
static THOUSANDS_GROUPED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,3}(,\d{3})+(\.\d+)?$").expect("valid regex"));

/// Snapshots for every priced variant of `product`.
///
/// Variants come from `variants` or `variations`; non-object entries (bare
/// variation IDs) are skipped. A product with no variant objects that is
/// not `type: "variable"` is read as a single implicit variant.
#[must_use]
pub fn normalize_product(product: &ProductRecord) -> Vec<VariantSnapshot> {
    normalize_product_with_raw(product)
        .into_iter()
        .map(|(snapshot, _)| snapshot)
        .collect()
}

/// Like [`normalize_product`], pairing each snapshot with the variant
/// object it was read from.
#[must_use]
pub fn normalize_product_with_raw(
    product: &ProductRecord,
) -> Vec<(VariantSnapshot, &Map<String, Value>)> {
    let product_id = product.id().unwrap_or_default();
    variant_objects(product)
        .into_iter()
        .filter_map(|variant| Some((normalize_variant(variant, &product_id)?, variant)))
        .collect()
}

/// Flattens [`normalize_product`] over a page run.
#[must_use]
pub fn normalize_products(products: &[ProductRecord]) -> Vec<VariantSnapshot> {
    products.iter().flat_map(normalize_product).collect()
}

fn variant_objects(product: &ProductRecord) -> Vec<&Map<String, Value>> {
    let Some(fields) = product.as_value().as_object() else {
        tracing::debug!("skipping non-object product payload");
        return Vec::new();
    };

    let variants: Vec<&Map<String, Value>> = VARIANT_LIST_FIELDS
        .iter()
        .find_map(|key| fields.get(*key).and_then(Value::as_array))
        .map(|list| list.iter().filter_map(Value::as_object).collect())
        .unwrap_or_default();

    if !variants.is_empty() {
        return variants;
    }
    if product.product_type() == Some("variable") {
        tracing::debug!(
            product_id = %product.id().unwrap_or_default(),
            "variable product without variation objects, skipping"
        );
        return Vec::new();
    }
    vec![fields]
}

fn normalize_variant(variant: &Map<String, Value>, product_id: &str) -> Option<VariantSnapshot> {
    let Some(variant_id) = variant.get("id").and_then(id_string) else {
        tracing::debug!(product_id, "variant without id dropped");
        return None;
    };
    let Some(price) = resolve_price(variant) else {
        tracing::debug!(product_id, variant_id = %variant_id, "variant without resolvable price dropped");
        return None;
    };

    Some(VariantSnapshot {
        price,
        currency: resolve_currency(variant),
        in_stock: resolve_availability(variant),
        sku: variant
            .get("sku")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned),
        weight_grams: WEIGHT_FIELDS
            .iter()
            .find_map(|key| variant.get(*key).and_then(parse_weight)),
        variant_id,
    })
}

/// Direct `price`-like fields first, then nested price objects.
pub(crate) fn resolve_price(variant: &Map<String, Value>) -> Option<Decimal> {
    let direct = DIRECT_PRICE_FIELDS
        .iter()
        .find_map(|key| variant.get(*key).and_then(parse_price));
    if direct.is_some() {
        return direct;
    }

    NESTED_PRICE_OBJECTS
        .iter()
        .filter_map(|key| variant.get(*key).and_then(Value::as_object))
        .find_map(|nested| {
            NESTED_PRICE_FIELDS
                .iter()
                .find_map(|key| nested.get(*key).and_then(parse_price))
                .map(from_minor_units)
        })
}

fn from_minor_units(value: Decimal) -> Decimal {
    if value.scale() == 0 && value > MINOR_UNIT_THRESHOLD {
        let mut major = value / Decimal::ONE_HUNDRED;
        major.rescale(2);
        major
    } else {
        value
    }
}

/// Reads a JSON number or a price string such as `"$1,299.00"`.
///
/// Commas are accepted only as thousands grouping (`"1,299"`); a decimal
/// comma such as `"12,50"` is rejected rather than guessed.
pub(crate) fn parse_price(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => {
            let cleaned = PRICE_NOISE_RE.replace_all(s, "");
            if !cleaned.contains(',') {
                cleaned.into_owned()
            } else if THOUSANDS_GROUPED_RE.is_match(&cleaned) {
                cleaned.replace(',', "")
            } else {
                return None;
            }
        }
        _ => return None,
    };
    if text.is_empty() {
        return None;
    }
    let price = Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()?;
    (!price.is_sign_negative()).then_some(price)
}

fn resolve_currency(variant: &Map<String, Value>) -> String {
    let read = |fields: &Map<String, Value>| {
        CURRENCY_FIELDS.iter().find_map(|key| {
            fields
                .get(*key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_uppercase)
        })
    };
    read(variant)
        .or_else(|| {
            NESTED_PRICE_OBJECTS
                .iter()
                .filter_map(|key| variant.get(*key).and_then(Value::as_object))
                .find_map(read)
        })
        .unwrap_or_else(|| DEFAULT_CURRENCY.to_owned())
}

pub(crate) fn resolve_availability(variant: &Map<String, Value>) -> bool {
    AVAILABILITY_FIELDS
        .iter()
        .find_map(|key| variant.get(*key).filter(|v| !v.is_null()))
        .is_none_or(availability_of)
}

fn availability_of(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|q| q > 0.0),
        Value::String(s) => {
            let word = s.trim().to_lowercase();
            if IN_STOCK_WORDS.contains(&word.as_str()) {
                true
            } else if OUT_OF_STOCK_WORDS.contains(&word.as_str()) {
                false
            } else if let Ok(quantity) = word.parse::<f64>() {
                quantity > 0.0
            } else {
                true
            }
        }
        _ => true,
    }
}

fn parse_weight(value: &Value) -> Option<f64> {
    let weight = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    weight.is_finite().then_some(weight)
}

#[cfg(test)]
#[path = "normalize_test.rs"]
mod tests;
