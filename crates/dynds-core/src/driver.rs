//! Database driver trait definition

use crate::{Connection, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Connection parameter asking the driver to refuse writes
pub const READ_ONLY_PARAM: &str = "readOnly";

/// Connection parameter sizing the per-connection prepared statement cache
pub const STATEMENT_CACHE_SIZE_PARAM: &str = "statementCacheSize";

/// Everything a driver needs to open one physical connection
#[derive(Debug, Clone, Default)]
pub struct ConnectionConfig {
    /// Driver-specific URL (e.g., `sqlite:/var/lib/app.db`)
    pub url: String,
    /// Username
    pub username: Option<String>,
    /// Password
    pub password: Option<String>,
    /// Additional connection parameters
    pub params: HashMap<String, String>,
}

impl ConnectionConfig {
    /// Create a configuration for the given URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Set the credentials
    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.username = Some(username.to_string());
        self.password = Some(password.to_string());
        self
    }

    /// Set a connection parameter
    pub fn with_param(mut self, key: &str, value: impl Into<String>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    /// Get a parameter as a string
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.params.get(key).cloned()
    }
}

/// Core driver trait that all database drivers must implement
#[async_trait]
pub trait DatabaseDriver: Send + Sync {
    /// Unique name for this driver (e.g., "sqlite"), used as the driver class name
    fn name(&self) -> &'static str;

    /// Display name for humans
    fn display_name(&self) -> &'static str {
        self.name()
    }

    /// Whether this driver understands the given URL
    fn accepts_url(&self, url: &str) -> bool;

    /// Create a new connection
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Connection>>;

    /// Connect, run a trivial query and disconnect
    async fn test_connection(&self, config: &ConnectionConfig) -> Result<()> {
        let conn = self.connect(config).await?;
        let outcome = conn.query("SELECT 1", &[]).await.map(|_| ());
        if let Err(e) = conn.close().await {
            tracing::debug!(error = %e, "failed to close test connection");
        }
        outcome
    }
}
