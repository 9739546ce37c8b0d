use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the real environment so tests can drive it with a
/// `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::path::PathBuf;

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u32>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u64>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<usize>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let env = parse_environment(&or_default("ROASTDB_ENV", "development"))?;
    let log_level = or_default("ROASTDB_LOG_LEVEL", "info");
    let sources_path = PathBuf::from(or_default("ROASTDB_SOURCES_PATH", "./config/sources.yaml"));
    let state_path = PathBuf::from(or_default("ROASTDB_STATE_PATH", "./data/pricing-state.json"));
    let archive_dir = lookup("ROASTDB_ARCHIVE_DIR")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from);
    let user_agent = or_default("ROASTDB_USER_AGENT", "roastdb/0.1 (price-tracking)");

    let max_concurrent_sources = parse_usize("ROASTDB_MAX_CONCURRENT_SOURCES", "4")?;
    if max_concurrent_sources == 0 {
        return Err(ConfigError::InvalidEnvVar {
            var: "ROASTDB_MAX_CONCURRENT_SOURCES".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }

    let breaker_failure_threshold = parse_u32("ROASTDB_BREAKER_FAILURE_THRESHOLD", "5")?;
    let breaker_success_threshold = parse_u32("ROASTDB_BREAKER_SUCCESS_THRESHOLD", "2")?;
    let breaker_timeout_secs = parse_u64("ROASTDB_BREAKER_TIMEOUT_SECS", "60")?;
    let rate_limit_max_attempts = parse_u32("ROASTDB_RATE_LIMIT_MAX_ATTEMPTS", "3")?;
    let rate_limit_base_delay_secs = parse_u64("ROASTDB_RATE_LIMIT_BASE_DELAY_SECS", "30")?;

    Ok(AppConfig {
        env,
        log_level,
        sources_path,
        state_path,
        archive_dir,
        user_agent,
        max_concurrent_sources,
        breaker_failure_threshold,
        breaker_success_threshold,
        breaker_timeout_secs,
        rate_limit_max_attempts,
        rate_limit_base_delay_secs,
    })
}

/// Parse a string into an `Environment` variant.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidEnvVar`] for anything other than
/// `development`, `test`, or `production`.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "ROASTDB_ENV".to_string(),
            reason: format!("unknown environment \"{other}\""),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
