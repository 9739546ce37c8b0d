use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Process-wide settings for a collection run. Per-source tuning lives in
/// [`crate::SourceConfig`].
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub env: Environment,
    pub log_level: String,
    pub sources_path: PathBuf,
    /// JSON file holding the last known variant pricing per source.
    pub state_path: PathBuf,
    /// Raw page archival is skipped when unset.
    pub archive_dir: Option<PathBuf>,
    pub user_agent: String,
    pub max_concurrent_sources: usize,
    pub breaker_failure_threshold: u32,
    pub breaker_success_threshold: u32,
    pub breaker_timeout_secs: u64,
    pub rate_limit_max_attempts: u32,
    pub rate_limit_base_delay_secs: u64,
}
