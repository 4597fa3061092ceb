use std::net::SocketAddr;
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

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub sources_path: PathBuf,

    pub sheets_api_base: String,
    pub sheets_token: String,

    pub provider_api_base: String,
    pub provider_token: String,
    pub provider_dataset_instagram: Option<String>,
    pub provider_dataset_tiktok: Option<String>,

    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,

    pub request_timeout_secs: u64,

    pub batch_size: usize,
    pub batch_stagger_secs: u64,
    pub cycle_interval_secs: u64,
    pub startup_grace_secs: u64,
    pub items_per_target: u32,

    pub poll_interval_secs: u64,
    pub max_wait_secs: u64,

    pub worker_concurrency: usize,
    pub queue_poll_interval_secs: u64,
    pub job_max_attempts: u32,
    pub retry_backoff_base_secs: u64,

    pub monitor_url: Option<String>,
    pub monitor_secret: Option<String>,
    pub report_interval_secs: u64,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("sources_path", &self.sources_path)
            .field("database_url", &"[redacted]")
            .field("sheets_api_base", &self.sheets_api_base)
            .field("sheets_token", &"[redacted]")
            .field("provider_api_base", &self.provider_api_base)
            .field("provider_token", &"[redacted]")
            .field(
                "provider_dataset_instagram",
                &self.provider_dataset_instagram,
            )
            .field("provider_dataset_tiktok", &self.provider_dataset_tiktok)
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("batch_size", &self.batch_size)
            .field("batch_stagger_secs", &self.batch_stagger_secs)
            .field("cycle_interval_secs", &self.cycle_interval_secs)
            .field("startup_grace_secs", &self.startup_grace_secs)
            .field("items_per_target", &self.items_per_target)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("max_wait_secs", &self.max_wait_secs)
            .field("worker_concurrency", &self.worker_concurrency)
            .field("queue_poll_interval_secs", &self.queue_poll_interval_secs)
            .field("job_max_attempts", &self.job_max_attempts)
            .field("retry_backoff_base_secs", &self.retry_backoff_base_secs)
            .field("monitor_url", &self.monitor_url)
            .field(
                "monitor_secret",
                &self.monitor_secret.as_ref().map(|_| "[redacted]"),
            )
            .field("report_interval_secs", &self.report_interval_secs)
            .finish()
    }
}
