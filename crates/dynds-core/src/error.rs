//! Error types for DynDS

use thiserror::Error;

/// Core error type for DynDS operations
#[derive(Error, Debug)]
pub enum DsError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A statement was refused by a SQL firewall filter
    #[error("SQL rejected ({reason}): {sql}")]
    SqlRejected { sql: String, reason: String },

    /// A pool could not be created; carries the failure that caused it
    #[error("{message}: {source}")]
    CreateDataSource {
        message: String,
        #[source]
        source: Box<DsError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("{0}")]
    Other(String),
}

impl DsError {
    /// Wrap an error as a pool creation failure
    pub fn create_data_source(message: impl Into<String>, source: DsError) -> Self {
        DsError::CreateDataSource {
            message: message.into(),
            source: Box::new(source),
        }
    }

    /// The innermost error of a `CreateDataSource` chain, or `self`
    pub fn root_cause(&self) -> &DsError {
        match self {
            DsError::CreateDataSource { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Result type alias for DynDS operations
pub type Result<T> = std::result::Result<T, DsError>;
