//! Storefront root resolution for Shopify sources.

/// Root of the storefront `base_url` points into.
///
/// Shopify serves `products.json` only at the store root, so a configured
/// path such as `/collections/coffee` is dropped while scheme, host and an
/// explicit port are kept. Input without a parsable host keeps everything
/// up to the first `/` after its scheme separator.
#[must_use]
pub fn store_origin(base_url: &str) -> String {
    match reqwest::Url::parse(base_url) {
        Ok(url) if url.has_host() => url.origin().ascii_serialization(),
        parsed => {
            let reason = parsed.err().map_or_else(|| "no host".to_string(), |e| e.to_string());
            tracing::warn!(
                source_url = base_url,
                %reason,
                "storefront URL has no usable host, keeping its leading authority"
            );
            leading_authority(base_url).to_string()
        }
    }
}

fn leading_authority(raw: &str) -> &str {
    let start = raw.find("://").map_or(0, |i| i + 3);
    match raw[start..].find('/') {
        Some(end) => &raw[..start + end],
        None => raw,
    }
}
