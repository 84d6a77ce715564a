use thiserror::Error;

// Errors a store operation reports back to its caller
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Task {id} not found")]
    NotFound { id: u64 },

    // Field-level rejection from the record service
    #[error("{field}: {message}")]
    Validation { field: String, message: String },

    #[error("Record service error: {0}")]
    Remote(String),
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        StoreError::Remote(err.to_string())
    }
}

// Errors of the durable slot. The store logs these and carries on.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Stored task collection is invalid: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },

    #[error("Invalid config: {0}")]
    Invalid(String),
}
