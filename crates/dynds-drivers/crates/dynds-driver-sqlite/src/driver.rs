//! SQLite driver implementation

use async_trait::async_trait;
use dynds_core::{
    Connection, ConnectionConfig, DatabaseDriver, DsError, READ_ONLY_PARAM, Result,
    STATEMENT_CACHE_SIZE_PARAM,
};
use std::sync::Arc;

use crate::SqliteConnection;
use crate::connection::MEMORY_PATH;

/// Extract the database path from a SQLite URL
///
/// Accepts `sqlite:<path>`, `sqlite://<path>`, `jdbc:sqlite:<path>` and
/// `sqlite::memory:`.
pub fn parse_sqlite_url(url: &str) -> Option<String> {
    let url = url.trim();
    let rest = url.strip_prefix("jdbc:").unwrap_or(url);
    let rest = rest.strip_prefix("sqlite:")?;
    let path = rest.strip_prefix("//").unwrap_or(rest);

    match path {
        "" => None,
        MEMORY_PATH => Some(MEMORY_PATH.to_string()),
        path => Some(path.to_string()),
    }
}

/// SQLite database driver
pub struct SqliteDriver;

impl SqliteDriver {
    /// Create a new SQLite driver instance
    pub fn new() -> Self {
        tracing::debug!("SQLite driver initialized");
        Self
    }
}

impl Default for SqliteDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseDriver for SqliteDriver {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn display_name(&self) -> &'static str {
        "SQLite"
    }

    fn accepts_url(&self, url: &str) -> bool {
        parse_sqlite_url(url).is_some()
    }

    #[tracing::instrument(skip(self, config), fields(url = %config.url))]
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Connection>> {
        let path = config
            .get_string("path")
            .or_else(|| parse_sqlite_url(&config.url))
            .ok_or_else(|| {
                DsError::Configuration(format!(
                    "Not a SQLite URL: '{}'. Example: sqlite:/path/to/database.db",
                    config.url
                ))
            })?;

        let conn = SqliteConnection::open(&path).map_err(|e| {
            tracing::error!(error = %e, "failed to connect to SQLite database");
            e
        })?;

        if let Some(capacity) = config.get_string(STATEMENT_CACHE_SIZE_PARAM) {
            let capacity = capacity.trim().parse::<usize>().map_err(|_| {
                DsError::Configuration(format!("Invalid statement cache size '{}'", capacity))
            })?;
            conn.set_statement_cache_capacity(capacity)?;
        }
        if config.get_string(READ_ONLY_PARAM).as_deref() == Some("true") {
            conn.set_read_only(true)?;
        }

        tracing::debug!(path = %path, "SQLite connection created");
        Ok(Arc::new(conn))
    }
}
