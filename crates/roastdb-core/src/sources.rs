//! Roaster/source registry loaded from `config/sources.yaml`.
//!
//! The YAML file never carries secrets: credentials name the env vars that
//! hold them, and [`YamlConfigProvider`] resolves those at lookup time.

use std::collections::HashSet;
use std::env::VarError;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Storefront platform family a source is served by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Page-numbered `products.json` API with bearer auth.
    Shopify,
    /// `wp-json/wc/v3` REST API with basic or bearer auth.
    Woocommerce,
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::Shopify => write!(f, "shopify"),
            Platform::Woocommerce => write!(f, "woocommerce"),
        }
    }
}

/// Resolved credentials for one source.
#[derive(Clone, PartialEq, Eq, Default)]
pub enum Credentials {
    #[default]
    Anonymous,
    Bearer {
        token: String,
    },
    Basic {
        key: String,
        secret: String,
    },
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Anonymous => write!(f, "Anonymous"),
            Credentials::Bearer { .. } => f
                .debug_struct("Bearer")
                .field("token", &"[redacted]")
                .finish(),
            Credentials::Basic { key, .. } => f
                .debug_struct("Basic")
                .field("key", key)
                .field("secret", &"[redacted]")
                .finish(),
        }
    }
}

/// Credential reference as written in the YAML file.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuthConfig {
    #[default]
    None,
    Bearer {
        token_env: String,
    },
    Basic {
        key_env: String,
        secret_env: String,
    },
}

fn default_concurrency() -> usize {
    2
}

fn default_politeness_delay_ms() -> u64 {
    500
}

fn default_jitter_ms() -> u64 {
    250
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1_000
}

/// One storefront endpoint as written in the YAML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceEntry {
    pub id: String,
    pub platform: Platform,
    pub base_url: String,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_politeness_delay_ms")]
    pub politeness_delay_ms: u64,
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Requested page size; clamped to the platform cap by the adapter.
    #[serde(default)]
    pub page_size: Option<u32>,
    /// WooCommerce only: fetch `/products/{id}/variations` for variable products.
    #[serde(default)]
    pub expand_variations: bool,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoasterEntry {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub sources: Vec<SourceEntry>,
}

#[derive(Debug, Deserialize)]
pub struct SourcesFile {
    pub roasters: Vec<RoasterEntry>,
}

/// Fully resolved per-source settings handed to the scraper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    pub id: String,
    pub roaster_id: String,
    pub platform: Platform,
    pub base_url: String,
    pub concurrency: usize,
    pub politeness_delay_ms: u64,
    pub jitter_ms: u64,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub page_size: Option<u32>,
    pub expand_variations: bool,
    pub credentials: Credentials,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoasterConfig {
    pub id: String,
    pub name: String,
    pub sources: Vec<SourceConfig>,
}

/// Supplies per-source configuration to the engine.
///
/// Lookup failures are configuration errors and are never retried.
pub trait ConfigProvider: Send + Sync {
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownSource`] or a credential resolution error.
    fn get_source_config(&self, source_id: &str) -> Result<SourceConfig, ConfigError>;

    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownRoaster`] or a credential resolution error.
    fn get_roaster_config(&self, roaster_id: &str) -> Result<RoasterConfig, ConfigError>;

    /// Ids of every configured source, in file order.
    fn source_ids(&self) -> Vec<String>;
}

/// Load and validate the sources registry from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_sources(path: &Path) -> Result<SourcesFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::SourcesFileIo {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_sources(&content)
}

/// Parse and validate a sources registry from YAML text.
///
/// # Errors
///
/// Returns `ConfigError` if the text does not parse or fails validation.
pub fn parse_sources(content: &str) -> Result<SourcesFile, ConfigError> {
    let sources_file: SourcesFile = serde_yaml::from_str(content)?;
    validate_sources(&sources_file)?;
    Ok(sources_file)
}

fn validate_sources(sources_file: &SourcesFile) -> Result<(), ConfigError> {
    let mut seen_roasters = HashSet::new();
    let mut seen_sources = HashSet::new();

    for roaster in &sources_file.roasters {
        if roaster.id.trim().is_empty() {
            return Err(ConfigError::Validation(
                "roaster id must be non-empty".to_string(),
            ));
        }
        if !seen_roasters.insert(roaster.id.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate roaster id: '{}'",
                roaster.id
            )));
        }

        for source in &roaster.sources {
            if !seen_sources.insert(source.id.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate source id: '{}' (roaster '{}')",
                    source.id, roaster.id
                )));
            }
            validate_source(source)?;
        }
    }

    Ok(())
}

fn validate_source(source: &SourceEntry) -> Result<(), ConfigError> {
    if source.id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "source id must be non-empty".to_string(),
        ));
    }

    let url = source.base_url.trim();
    if !(url.starts_with("https://") || url.starts_with("http://")) {
        return Err(ConfigError::Validation(format!(
            "source '{}' has base_url \"{}\"; expected an http(s) URL",
            source.id, source.base_url
        )));
    }

    if source.concurrency == 0 {
        return Err(ConfigError::Validation(format!(
            "source '{}' has concurrency 0; must be at least 1",
            source.id
        )));
    }

    if source.page_size == Some(0) {
        return Err(ConfigError::Validation(format!(
            "source '{}' has page_size 0",
            source.id
        )));
    }

    if source.platform == Platform::Shopify {
        if matches!(source.auth, AuthConfig::Basic { .. }) {
            return Err(ConfigError::Validation(format!(
                "source '{}' is a shopify source; basic auth is not supported, use a bearer token",
                source.id
            )));
        }
        if source.expand_variations {
            return Err(ConfigError::Validation(format!(
                "source '{}': expand_variations only applies to woocommerce sources",
                source.id
            )));
        }
    }

    Ok(())
}

type EnvLookup = dyn Fn(&str) -> Result<String, VarError> + Send + Sync;

/// [`ConfigProvider`] over a parsed [`SourcesFile`].
///
/// The registry is parsed once; credentials are read from the environment
/// on every lookup so rotated secrets are picked up without a reload.
pub struct YamlConfigProvider {
    roasters: Vec<RoasterEntry>,
    lookup: Box<EnvLookup>,
}

impl YamlConfigProvider {
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be loaded or fails validation.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        Ok(Self::new(load_sources(path)?))
    }

    #[must_use]
    pub fn new(sources_file: SourcesFile) -> Self {
        Self::with_lookup(sources_file, |key| std::env::var(key))
    }

    /// Uses `lookup` instead of the process environment for credential vars.
    pub fn with_lookup<F>(sources_file: SourcesFile, lookup: F) -> Self
    where
        F: Fn(&str) -> Result<String, VarError> + Send + Sync + 'static,
    {
        Self {
            roasters: sources_file.roasters,
            lookup: Box::new(lookup),
        }
    }

    fn resolve(
        &self,
        roaster: &RoasterEntry,
        source: &SourceEntry,
    ) -> Result<SourceConfig, ConfigError> {
        let read = |var: &str| -> Result<String, ConfigError> {
            (self.lookup)(var)
                .ok()
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ConfigError::MissingCredential {
                    source_id: source.id.clone(),
                    var: var.to_string(),
                })
        };

        let credentials = match &source.auth {
            AuthConfig::None => Credentials::Anonymous,
            AuthConfig::Bearer { token_env } => Credentials::Bearer {
                token: read(token_env)?,
            },
            AuthConfig::Basic {
                key_env,
                secret_env,
            } => Credentials::Basic {
                key: read(key_env)?,
                secret: read(secret_env)?,
            },
        };

        Ok(SourceConfig {
            id: source.id.clone(),
            roaster_id: roaster.id.clone(),
            platform: source.platform,
            base_url: source.base_url.trim().trim_end_matches('/').to_string(),
            concurrency: source.concurrency,
            politeness_delay_ms: source.politeness_delay_ms,
            jitter_ms: source.jitter_ms,
            timeout_secs: source.timeout_secs,
            max_retries: source.max_retries,
            retry_base_delay_ms: source.retry_base_delay_ms,
            page_size: source.page_size,
            expand_variations: source.expand_variations,
            credentials,
        })
    }
}

impl ConfigProvider for YamlConfigProvider {
    fn get_source_config(&self, source_id: &str) -> Result<SourceConfig, ConfigError> {
        self.roasters
            .iter()
            .find_map(|r| {
                r.sources
                    .iter()
                    .find(|s| s.id == source_id)
                    .map(|s| (r, s))
            })
            .ok_or_else(|| ConfigError::UnknownSource(source_id.to_string()))
            .and_then(|(roaster, source)| self.resolve(roaster, source))
    }

    fn get_roaster_config(&self, roaster_id: &str) -> Result<RoasterConfig, ConfigError> {
        let roaster = self
            .roasters
            .iter()
            .find(|r| r.id == roaster_id)
            .ok_or_else(|| ConfigError::UnknownRoaster(roaster_id.to_string()))?;

        let sources = roaster
            .sources
            .iter()
            .map(|s| self.resolve(roaster, s))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(RoasterConfig {
            id: roaster.id.clone(),
            name: roaster.name.clone(),
            sources,
        })
    }

    fn source_ids(&self) -> Vec<String> {
        self.roasters
            .iter()
            .flat_map(|r| r.sources.iter().map(|s| s.id.clone()))
            .collect()
    }
}

#[cfg(test)]
#[path = "sources_test.rs"]
mod tests;
