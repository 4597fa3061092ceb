//! Shared configuration, domain types, and process-wide state for SMPDB.

use thiserror::Error;

pub mod app_config;
pub mod config;
pub mod process_state;
pub mod sources;
pub mod types;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use process_state::{
    ActivityEntry, CycleGuard, ProcessState, StatusSnapshot, WorkItemStats, ACTIVITY_LOG_CAPACITY,
};
pub use sources::{load_sources, SheetSourceConfig, SourcesFile};
pub use types::{
    normalize_identifier, CanonicalRecord, CollectionJob, ControlCommand, CoreError, JobKind,
    Platform, RecordAuthor, RecordContent, RecordMetrics, SheetInfo, UpsertStats, WorkItem,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read sources file {path}: {source}")]
    SourcesFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse sources file: {0}")]
    SourcesFileParse(#[from] serde_yaml::Error),

    #[error("invalid sources file: {0}")]
    SourcesInvalid(String),
}
