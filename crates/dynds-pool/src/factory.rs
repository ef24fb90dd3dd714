//! Physical connection creation and validation

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dynds_core::{
    Connection, ConnectionConfig, DatabaseDriver, DsError, READ_ONLY_PARAM, Result,
    STATEMENT_CACHE_SIZE_PARAM,
};

use crate::PoolConfig;

/// Factory trait for creating new connections
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    /// Create a new connection
    async fn create(&self) -> Result<Arc<dyn Connection>>;

    /// Validate that a connection is still usable
    ///
    /// Default implementation only checks the connection is open.
    async fn validate(&self, conn: &dyn Connection) -> bool {
        !conn.is_closed()
    }
}

#[async_trait]
impl<T: ConnectionFactory> ConnectionFactory for Arc<T> {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        (**self).create().await
    }

    async fn validate(&self, conn: &dyn Connection) -> bool {
        (**self).validate(conn).await
    }
}

/// Opens connections through a [`DatabaseDriver`] and validates them with the
/// configured validation query
pub struct DriverConnectionFactory {
    driver: Arc<dyn DatabaseDriver>,
    connection: ConnectionConfig,
    validation_query: Option<String>,
    validation_timeout: Option<Duration>,
}

impl DriverConnectionFactory {
    pub fn new(driver: Arc<dyn DatabaseDriver>, config: &PoolConfig) -> Self {
        let mut connection = ConnectionConfig::new(config.url())
            .with_credentials(config.username(), config.password());
        for (key, value) in config.connection_properties() {
            connection = connection.with_param(key, value.clone());
        }
        if config.default_read_only() {
            connection = connection.with_param(READ_ONLY_PARAM, "true");
        }
        if let Some(size) = config.statement_cache_size() {
            connection = connection.with_param(STATEMENT_CACHE_SIZE_PARAM, size.to_string());
        }

        Self {
            driver,
            connection,
            validation_query: config.validation_query().map(str::to_string),
            validation_timeout: config.validation_query_timeout(),
        }
    }

    pub fn driver(&self) -> &Arc<dyn DatabaseDriver> {
        &self.driver
    }

    async fn run_validation_query(&self, conn: &dyn Connection, sql: &str) -> Result<()> {
        let check = conn.query(sql, &[]);
        let outcome = match self.validation_timeout {
            Some(timeout) => tokio::time::timeout(timeout, check)
                .await
                .map_err(|_| {
                    DsError::Timeout(format!("validation query exceeded {:?}", timeout))
                })?,
            None => check.await,
        };
        outcome.map(|_| ())
    }
}

#[async_trait]
impl ConnectionFactory for DriverConnectionFactory {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        self.driver.connect(&self.connection).await
    }

    async fn validate(&self, conn: &dyn Connection) -> bool {
        if conn.is_closed() {
            return false;
        }
        let Some(sql) = self.validation_query.as_deref() else {
            return true;
        };

        match self.run_validation_query(conn, sql).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, driver = self.driver.name(), "connection validation failed");
                false
            }
        }
    }
}
