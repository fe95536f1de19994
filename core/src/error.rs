use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Registry fetch failed: {0}")]
    Registry(#[from] reqwest::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Invalid log-line pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("SE name {name} matches no SE")]
    NoMatchingStorageElement { name: String },

    #[error("SE name {name} matches {count} SEs")]
    MultipleStorageElements { name: String, count: usize },

    #[error("Invalid timestamp: {value}")]
    InvalidTimestamp { value: String },

    #[error("No valid cutoff instant on {day}")]
    InvalidCutoff { day: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type ReportResult<T> = Result<T, ReportError>;
