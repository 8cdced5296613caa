//! Custom error types for papersift

use thiserror::Error;

/// Main error type for papersift operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid argument '{param}': {reason}")]
    InvalidArgument { param: &'static str, reason: String },

    #[error("Catalog request failed: {url}")]
    CatalogFetchFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Catalog response could not be parsed: {0}")]
    CatalogParse(String),

    #[error("PDF download failed: {uri}")]
    PdfDownloadFailed {
        uri: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("No PDF available for paper {0}")]
    PdfUnavailable(String),

    #[error("Paper not found in catalog: {0}")]
    PaperNotFound(String),

    #[error("Failed to persist paper {catalog_id}: {source}")]
    PersistenceFailed {
        catalog_id: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Search query against the document store failed: {0}")]
    SearchStoreFailed(#[source] Box<Error>),

    #[error("Circuit '{0}' is open")]
    CircuitOpen(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Result type alias for papersift
pub type Result<T> = std::result::Result<T, Error>;

/// SQLSTATE classes that are worth retrying: connection exceptions,
/// serialization failures, deadlocks, and operator intervention.
const TRANSIENT_SQLSTATE_PREFIXES: &[&str] = &["08", "40001", "40P01", "57P"];

impl Error {
    /// Whether a retry of the same operation might succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Timeout(_) => true,
            Error::Io(_) => true,
            Error::Database(e) => match e {
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut => true,
                sqlx::Error::Database(db) => db
                    .code()
                    .map(|code| {
                        TRANSIENT_SQLSTATE_PREFIXES
                            .iter()
                            .any(|prefix| code.starts_with(prefix))
                    })
                    .unwrap_or(false),
                _ => false,
            },
            Error::PersistenceFailed { source, .. } => source.is_transient(),
            _ => false,
        }
    }

    /// Shorthand for an `InvalidArgument` error
    pub fn invalid_argument(param: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidArgument {
            param,
            reason: reason.into(),
        }
    }
}
