//! The configurable pool object

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use dynds_core::{DatabaseDriver, DsError, Result};
use dynds_drivers::DriverRegistry;
use tokio::sync::OnceCell;

use crate::factory::DriverConnectionFactory;
use crate::filter::{Filter, FilterChain};
use crate::{ConnectionPool, PoolConfig, PoolStats, PooledConnection};

/// A named, configurable connection pool
///
/// Configure it through `&mut self` (identity setters, [`config_mut`],
/// [`set_filters`]), then share it. The pool starts on [`init`] or on the
/// first [`get_connection`], whichever comes first.
///
/// [`config_mut`]: PoolDataSource::config_mut
/// [`set_filters`]: PoolDataSource::set_filters
/// [`init`]: PoolDataSource::init
/// [`get_connection`]: PoolDataSource::get_connection
#[derive(Default)]
pub struct PoolDataSource {
    config: PoolConfig,
    filters: FilterChain,
    driver: Option<Arc<dyn DatabaseDriver>>,
    pool: OnceCell<Arc<ConnectionPool>>,
    closed: AtomicBool,
}

impl PoolDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: PoolConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        self.config.name()
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut PoolConfig {
        &mut self.config
    }

    pub fn set_url(&mut self, url: &str) {
        self.config.set_url(url.to_string());
    }

    pub fn set_username(&mut self, username: &str) {
        self.config.set_username(username.to_string());
    }

    pub fn set_password(&mut self, password: &str) {
        self.config.set_password(password.to_string());
    }

    pub fn set_name(&mut self, name: &str) {
        self.config.set_name(name.to_string());
    }

    pub fn set_driver_class_name(&mut self, driver: &str) {
        self.config.set_driver_class_name(driver.to_string());
    }

    /// Use this driver instead of resolving one from the registry
    pub fn set_driver(&mut self, driver: Arc<dyn DatabaseDriver>) {
        self.driver = Some(driver);
    }

    pub fn set_filters(&mut self, filters: Vec<Arc<dyn Filter>>) {
        self.filters = FilterChain::new(filters);
    }

    pub fn add_filter(&mut self, filter: Arc<dyn Filter>) {
        self.filters.push(filter);
    }

    pub fn filters(&self) -> &FilterChain {
        &self.filters
    }

    pub fn is_initialized(&self) -> bool {
        self.pool.initialized()
    }

    /// Start the pool
    ///
    /// Validates the configuration, resolves the driver and opens
    /// `initialSize` connections. Calling it again after success is a no-op;
    /// after a failure it retries.
    pub async fn init(&self) -> Result<()> {
        self.pool().await.map(|_| ())
    }

    async fn pool(&self) -> Result<&Arc<ConnectionPool>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DsError::Connection(format!(
                "data source '{}' is closed",
                self.name()
            )));
        }
        self.pool.get_or_try_init(|| self.start()).await
    }

    async fn start(&self) -> Result<Arc<ConnectionPool>> {
        self.config.validate()?;

        let driver = match &self.driver {
            Some(driver) => Arc::clone(driver),
            None => DriverRegistry::with_defaults()
                .resolve(self.config.driver_class_name(), self.config.url())?,
        };

        let factory = DriverConnectionFactory::new(driver, &self.config);
        let pool = Arc::new(ConnectionPool::new(
            self.config.clone(),
            factory,
            self.filters.clone(),
        ));

        if let Err(e) = pool.prefill(self.config.initial_size()).await {
            pool.close().await;
            return Err(e);
        }

        self.filters.data_source_initialized(&self.config);
        spawn_evictor(&pool);

        tracing::info!(
            name = self.name(),
            url = self.config.url(),
            initial_size = self.config.initial_size(),
            max_active = self.config.max_active(),
            filters = ?self.filters.names(),
            "data source initialized"
        );
        Ok(pool)
    }

    /// Borrow a connection, starting the pool first if needed
    pub async fn get_connection(&self) -> Result<PooledConnection> {
        self.pool().await?.get().await
    }

    pub fn stats(&self) -> PoolStats {
        self.pool
            .get()
            .map(|pool| pool.stats())
            .unwrap_or_default()
    }

    /// Run one idle eviction pass now
    pub async fn evict_idle(&self) -> usize {
        match self.pool.get() {
            Some(pool) => pool.evict_idle().await,
            None => 0,
        }
    }

    /// Close idle connections and refuse further borrowing
    pub async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        if let Some(pool) = self.pool.get() {
            pool.close().await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for PoolDataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolDataSource")
            .field("name", &self.name())
            .field("url", &self.config.url())
            .field("filters", &self.filters)
            .field("initialized", &self.is_initialized())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Periodically evict idle connections until the pool is closed or dropped
fn spawn_evictor(pool: &Arc<ConnectionPool>) {
    let period = pool.config().time_between_eviction_runs();
    if period.is_zero() {
        return;
    }
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        return;
    };

    let weak: Weak<ConnectionPool> = Arc::downgrade(pool);
    handle.spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(pool) = weak.upgrade() else {
                break;
            };
            if pool.is_closed() {
                break;
            }
            pool.evict_idle().await;
        }
    });
}
