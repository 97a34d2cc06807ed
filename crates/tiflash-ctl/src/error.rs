//! Error types for the check library.

use thiserror::Error;

/// Main error type for check operations.
#[derive(Error, Debug)]
pub enum CtlError {
    /// A storage key does not decode to a table boundary or row key.
    #[error("Malformed key {key}: {reason}")]
    MalformedKey { key: String, reason: String },

    /// Row count or min/max query against TiKV or TiFlash failed
    #[error("Replica query failed: {0}")]
    ReplicaQuery(String),

    /// PD lookup failed or returned something unusable
    #[error("Region metadata lookup failed: {0}")]
    MetadataLookup(String),

    /// A command posted to a TiFlash instance failed
    #[error("TiFlash request failed: {0}")]
    TiflashRequest(String),

    /// The database/table could not be resolved to a table id
    #[error("Table resolution failed: {0}")]
    TableResolution(String),

    /// Configuration error (invalid YAML, bad values, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CtlError {
    /// Create a MalformedKey error for the hex form of a key.
    pub fn malformed_key(key: impl Into<String>, reason: impl Into<String>) -> Self {
        CtlError::MalformedKey {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Process exit status for this error class.
    pub fn exit_code(&self) -> u8 {
        match self {
            CtlError::Config(_) | CtlError::Yaml(_) => 2,
            CtlError::TableResolution(_) => 3,
            CtlError::ReplicaQuery(_) => 4,
            CtlError::MetadataLookup(_) => 5,
            CtlError::MalformedKey { .. } => 6,
            CtlError::TiflashRequest(_) => 7,
            CtlError::Io(_) | CtlError::Json(_) => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

impl From<sqlx::Error> for CtlError {
    fn from(err: sqlx::Error) -> Self {
        CtlError::ReplicaQuery(err.to_string())
    }
}

impl From<reqwest::Error> for CtlError {
    fn from(err: reqwest::Error) -> Self {
        CtlError::MetadataLookup(err.to_string())
    }
}

/// Result type alias for check operations.
pub type Result<T> = std::result::Result<T, CtlError>;
