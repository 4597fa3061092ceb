use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("no dataset configured for platform {platform}")]
    Configuration { platform: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("snapshot {snapshot_id} still running after {waited_secs}s")]
    Timeout {
        snapshot_id: String,
        waited_secs: u64,
    },

    #[error("provider reported snapshot {snapshot_id} as failed")]
    Failed { snapshot_id: String },
}
