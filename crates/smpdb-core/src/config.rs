use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files — useful for testing
/// or when the caller manages env setup.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// This is the core parsing/validation logic, decoupled from the actual environment
/// so it can be tested with a pure `HashMap` lookup — no `set_var`/`remove_var` needed.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let parse_addr = |var: &str, default: &str| -> Result<SocketAddr, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
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

    let database_url = require("DATABASE_URL")?;
    let sheets_token = require("SMPDB_SHEETS_TOKEN")?;
    let provider_token = require("SMPDB_PROVIDER_TOKEN")?;

    let env = parse_environment(&or_default("SMPDB_ENV", "development"));

    let bind_addr = parse_addr("SMPDB_BIND_ADDR", "0.0.0.0:3100")?;
    let log_level = or_default("SMPDB_LOG_LEVEL", "info");
    let sources_path = PathBuf::from(or_default("SMPDB_SOURCES_PATH", "./config/sources.yaml"));

    let sheets_api_base = or_default("SMPDB_SHEETS_API_BASE", "https://sheets.googleapis.com");
    let provider_api_base = or_default("SMPDB_PROVIDER_API_BASE", "https://api.brightdata.com");
    let provider_dataset_instagram = lookup("SMPDB_PROVIDER_DATASET_INSTAGRAM").ok();
    let provider_dataset_tiktok = lookup("SMPDB_PROVIDER_DATASET_TIKTOK").ok();

    let db_max_connections = parse_u32("SMPDB_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("SMPDB_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("SMPDB_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let request_timeout_secs = parse_u64("SMPDB_REQUEST_TIMEOUT_SECS", "30")?;

    let batch_size = parse_usize("SMPDB_BATCH_SIZE", "5")?;
    if batch_size == 0 {
        return Err(ConfigError::InvalidEnvVar {
            var: "SMPDB_BATCH_SIZE".to_string(),
            reason: "batch size must be at least 1".to_string(),
        });
    }
    let batch_stagger_secs = parse_u64("SMPDB_BATCH_STAGGER_SECS", "30")?;
    let cycle_interval_secs = parse_u64("SMPDB_CYCLE_INTERVAL_SECS", "3600")?;
    let startup_grace_secs = parse_u64("SMPDB_STARTUP_GRACE_SECS", "60")?;
    let items_per_target = parse_u32("SMPDB_ITEMS_PER_TARGET", "12")?;

    let poll_interval_secs = parse_u64("SMPDB_POLL_INTERVAL_SECS", "15")?;
    let max_wait_secs = parse_u64("SMPDB_MAX_WAIT_SECS", "600")?;

    let worker_concurrency = parse_usize("SMPDB_WORKER_CONCURRENCY", "5")?;
    let queue_poll_interval_secs = parse_u64("SMPDB_QUEUE_POLL_INTERVAL_SECS", "5")?;
    let job_max_attempts = parse_u32("SMPDB_JOB_MAX_ATTEMPTS", "3")?;
    let retry_backoff_base_secs = parse_u64("SMPDB_RETRY_BACKOFF_BASE_SECS", "30")?;

    let monitor_url = lookup("SMPDB_MONITOR_URL").ok();
    let monitor_secret = lookup("SMPDB_MONITOR_SECRET").ok();
    let report_interval_secs = parse_u64("SMPDB_REPORT_INTERVAL_SECS", "30")?;

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        sources_path,
        sheets_api_base,
        sheets_token,
        provider_api_base,
        provider_token,
        provider_dataset_instagram,
        provider_dataset_tiktok,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        request_timeout_secs,
        batch_size,
        batch_stagger_secs,
        cycle_interval_secs,
        startup_grace_secs,
        items_per_target,
        poll_interval_secs,
        max_wait_secs,
        worker_concurrency,
        queue_poll_interval_secs,
        job_max_attempts,
        retry_backoff_base_secs,
        monitor_url,
        monitor_secret,
        report_interval_secs,
    })
}

/// Parse a string into an `Environment` variant.
///
/// Unrecognized values default to `Environment::Development`.
fn parse_environment(s: &str) -> Environment {
    match s {
        "production" => Environment::Production,
        "test" => Environment::Test,
        _ => Environment::Development,
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
