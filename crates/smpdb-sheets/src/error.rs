use thiserror::Error;

#[derive(Debug, Error)]
pub enum SheetsError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("sheet backend unavailable: status {status} from {url}")]
    Unavailable { status: u16, url: String },

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("required column not found in header row: {column}")]
    MissingColumn { column: &'static str },

    #[error("no free header slot for the results column within {max_columns} columns")]
    SheetFull { max_columns: usize },
}
