pub mod app_config;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod snapshots;
pub mod sources;

pub use app_config::{AppConfig, Environment};
pub use collaborators::{
    ArchiveError, ArchiveMetadata, ArchiveStatus, BatchUpdateSummary, PersistenceClient,
    PersistenceError, PriceRecord, PricingUpdate, RawResponseStore,
};
pub use config::{load_app_config, load_app_config_from_env};
pub use error::ConfigError;
pub use snapshots::{PriceDelta, VariantSnapshot};
pub use sources::{
    load_sources, parse_sources, AuthConfig, ConfigProvider, Credentials, Platform,
    RoasterConfig, SourceConfig, SourcesFile, YamlConfigProvider,
};
