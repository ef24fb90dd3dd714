//! Pool configuration types

use std::collections::HashMap;
use std::time::Duration;

use dynds_config::{Bindable, PropertySetter};
use dynds_core::{DsError, Result};
use serde::Serialize;

/// Every tunable property of a [`crate::PoolDataSource`]
///
/// Millisecond and second units follow the property names. Negative
/// `maxWait` / `phyTimeoutMillis` mean "unbounded".
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolConfig {
    url: String,
    username: String,
    #[serde(skip)]
    password: String,
    name: String,
    driver_class_name: Option<String>,
    initial_size: usize,
    max_active: usize,
    min_idle: usize,
    max_wait: i64,
    validation_query: Option<String>,
    validation_query_timeout: u32,
    test_on_borrow: bool,
    test_on_return: bool,
    test_while_idle: bool,
    time_between_eviction_runs_millis: u64,
    min_evictable_idle_time_millis: u64,
    phy_timeout_millis: i64,
    query_timeout: u32,
    default_read_only: bool,
    connection_properties: HashMap<String, String>,
    keep_alive: bool,
    pool_prepared_statements: bool,
    max_pool_prepared_statement_per_connection_size: usize,
}

impl Default for PoolConfig {
    /// Defaults:
    /// - maxActive: 8, minIdle: 0, initialSize: 0
    /// - maxWait: -1 (wait forever)
    /// - testWhileIdle after 60 s idle, eviction after 30 min idle
    fn default() -> Self {
        Self {
            url: String::new(),
            username: String::new(),
            password: String::new(),
            name: String::new(),
            driver_class_name: None,
            initial_size: 0,
            max_active: 8,
            min_idle: 0,
            max_wait: -1,
            validation_query: None,
            validation_query_timeout: 0,
            test_on_borrow: false,
            test_on_return: false,
            test_while_idle: true,
            time_between_eviction_runs_millis: 60_000,
            min_evictable_idle_time_millis: 1_800_000,
            phy_timeout_millis: -1,
            query_timeout: 0,
            default_read_only: false,
            connection_properties: HashMap::new(),
            keep_alive: false,
            pool_prepared_statements: false,
            max_pool_prepared_statement_per_connection_size: 10,
        }
    }
}

impl PoolConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    // Identity

    pub fn set_url(&mut self, url: String) {
        self.url = url;
    }

    pub fn set_username(&mut self, username: String) {
        self.username = username;
    }

    pub fn set_password(&mut self, password: String) {
        self.password = password;
    }

    pub fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub fn set_driver_class_name(&mut self, driver: String) {
        let driver = driver.trim();
        self.driver_class_name = (!driver.is_empty()).then(|| driver.to_string());
    }

    // Sizing

    pub fn set_initial_size(&mut self, size: usize) {
        self.initial_size = size;
    }

    pub fn set_max_active(&mut self, size: usize) -> Result<()> {
        if size == 0 {
            return Err(DsError::Configuration("maxActive must be greater than 0".into()));
        }
        self.max_active = size;
        Ok(())
    }

    pub fn set_min_idle(&mut self, size: usize) {
        self.min_idle = size;
    }

    pub fn set_max_wait(&mut self, millis: i64) -> Result<()> {
        if millis < -1 {
            return Err(DsError::Configuration(format!(
                "maxWait must be -1 or greater, got {}",
                millis
            )));
        }
        self.max_wait = millis;
        Ok(())
    }

    // Validation

    pub fn set_validation_query(&mut self, sql: String) {
        let sql = sql.trim();
        self.validation_query = (!sql.is_empty()).then(|| sql.to_string());
    }

    pub fn set_validation_query_timeout(&mut self, seconds: u32) {
        self.validation_query_timeout = seconds;
    }

    pub fn set_test_on_borrow(&mut self, enabled: bool) {
        self.test_on_borrow = enabled;
    }

    pub fn set_test_on_return(&mut self, enabled: bool) {
        self.test_on_return = enabled;
    }

    pub fn set_test_while_idle(&mut self, enabled: bool) {
        self.test_while_idle = enabled;
    }

    // Eviction

    pub fn set_time_between_eviction_runs_millis(&mut self, millis: u64) {
        self.time_between_eviction_runs_millis = millis;
    }

    pub fn set_min_evictable_idle_time_millis(&mut self, millis: u64) {
        self.min_evictable_idle_time_millis = millis;
    }

    pub fn set_phy_timeout_millis(&mut self, millis: i64) {
        self.phy_timeout_millis = millis;
    }

    pub fn set_keep_alive(&mut self, enabled: bool) {
        self.keep_alive = enabled;
    }

    // Connection behavior

    pub fn set_query_timeout(&mut self, seconds: u32) {
        self.query_timeout = seconds;
    }

    pub fn set_default_read_only(&mut self, read_only: bool) {
        self.default_read_only = read_only;
    }

    /// Parse `key=value` pairs separated by `;`
    pub fn set_connection_properties(&mut self, properties: &str) -> Result<()> {
        let mut parsed = HashMap::new();
        for pair in properties.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .map(|(k, v)| (k.trim(), v.trim()))
                .filter(|(k, _)| !k.is_empty())
                .ok_or_else(|| {
                    DsError::Configuration(format!("malformed connection property '{}'", pair))
                })?;
            parsed.insert(key.to_string(), value.to_string());
        }
        self.connection_properties = parsed;
        Ok(())
    }

    pub fn set_pool_prepared_statements(&mut self, enabled: bool) {
        self.pool_prepared_statements = enabled;
    }

    pub fn set_max_pool_prepared_statement_per_connection_size(&mut self, size: usize) {
        self.max_pool_prepared_statement_per_connection_size = size;
        if size > 0 {
            self.pool_prepared_statements = true;
        }
    }

    // Accessors

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn driver_class_name(&self) -> Option<&str> {
        self.driver_class_name.as_deref()
    }

    pub fn initial_size(&self) -> usize {
        self.initial_size
    }

    pub fn max_active(&self) -> usize {
        self.max_active
    }

    pub fn min_idle(&self) -> usize {
        self.min_idle
    }

    /// How long to wait for a connection; `None` waits forever
    pub fn max_wait(&self) -> Option<Duration> {
        (self.max_wait > 0).then(|| Duration::from_millis(self.max_wait as u64))
    }

    pub fn validation_query(&self) -> Option<&str> {
        self.validation_query.as_deref()
    }

    pub fn validation_query_timeout(&self) -> Option<Duration> {
        (self.validation_query_timeout > 0)
            .then(|| Duration::from_secs(u64::from(self.validation_query_timeout)))
    }

    pub fn test_on_borrow(&self) -> bool {
        self.test_on_borrow
    }

    pub fn test_on_return(&self) -> bool {
        self.test_on_return
    }

    pub fn test_while_idle(&self) -> bool {
        self.test_while_idle
    }

    pub fn time_between_eviction_runs(&self) -> Duration {
        Duration::from_millis(self.time_between_eviction_runs_millis)
    }

    pub fn min_evictable_idle_time(&self) -> Duration {
        Duration::from_millis(self.min_evictable_idle_time_millis)
    }

    /// Maximum physical connection lifetime; `None` is unlimited
    pub fn phy_timeout(&self) -> Option<Duration> {
        (self.phy_timeout_millis > 0).then(|| Duration::from_millis(self.phy_timeout_millis as u64))
    }

    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    pub fn query_timeout(&self) -> Option<Duration> {
        (self.query_timeout > 0).then(|| Duration::from_secs(u64::from(self.query_timeout)))
    }

    pub fn default_read_only(&self) -> bool {
        self.default_read_only
    }

    pub fn connection_properties(&self) -> &HashMap<String, String> {
        &self.connection_properties
    }

    /// Prepared statement cache size per connection, if caching is enabled
    pub fn statement_cache_size(&self) -> Option<usize> {
        (self.pool_prepared_statements && self.max_pool_prepared_statement_per_connection_size > 0)
            .then_some(self.max_pool_prepared_statement_per_connection_size)
    }

    /// Cross-property checks run before the pool opens its first connection
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(DsError::Configuration(format!(
                "datasource '{}' has no url",
                self.name
            )));
        }
        if self.min_idle > self.max_active {
            return Err(DsError::Configuration(format!(
                "minIdle ({}) cannot exceed maxActive ({})",
                self.min_idle, self.max_active
            )));
        }
        if self.initial_size > self.max_active {
            return Err(DsError::Configuration(format!(
                "initialSize ({}) cannot exceed maxActive ({})",
                self.initial_size, self.max_active
            )));
        }
        Ok(())
    }
}

fn rejected(e: DsError) -> String {
    e.to_string()
}

impl Bindable for PoolConfig {
    fn bind_target() -> &'static str {
        "pool"
    }

    fn property_setters() -> Vec<PropertySetter<Self>> {
        vec![
            PropertySetter::new("url", PoolConfig::set_url),
            PropertySetter::new("username", PoolConfig::set_username),
            PropertySetter::new("password", PoolConfig::set_password),
            PropertySetter::new("name", PoolConfig::set_name),
            PropertySetter::new("driverClassName", PoolConfig::set_driver_class_name),
            PropertySetter::new("initialSize", PoolConfig::set_initial_size),
            PropertySetter::try_new("maxActive", |c: &mut PoolConfig, v: usize| {
                c.set_max_active(v).map_err(rejected)
            }),
            PropertySetter::new("minIdle", PoolConfig::set_min_idle),
            PropertySetter::try_new("maxWait", |c: &mut PoolConfig, v: i64| {
                c.set_max_wait(v).map_err(rejected)
            }),
            PropertySetter::new("validationQuery", PoolConfig::set_validation_query),
            PropertySetter::new(
                "validationQueryTimeout",
                PoolConfig::set_validation_query_timeout,
            ),
            PropertySetter::new("testOnBorrow", PoolConfig::set_test_on_borrow),
            PropertySetter::new("testOnReturn", PoolConfig::set_test_on_return),
            PropertySetter::new("testWhileIdle", PoolConfig::set_test_while_idle),
            PropertySetter::new(
                "timeBetweenEvictionRunsMillis",
                PoolConfig::set_time_between_eviction_runs_millis,
            ),
            PropertySetter::new(
                "minEvictableIdleTimeMillis",
                PoolConfig::set_min_evictable_idle_time_millis,
            ),
            PropertySetter::new("phyTimeoutMillis", PoolConfig::set_phy_timeout_millis),
            PropertySetter::new("keepAlive", PoolConfig::set_keep_alive),
            PropertySetter::new("queryTimeout", PoolConfig::set_query_timeout),
            PropertySetter::new("defaultReadOnly", PoolConfig::set_default_read_only),
            PropertySetter::try_new("connectionProperties", |c: &mut PoolConfig, v: String| {
                c.set_connection_properties(&v).map_err(rejected)
            }),
            PropertySetter::new(
                "poolPreparedStatements",
                PoolConfig::set_pool_prepared_statements,
            ),
            PropertySetter::new(
                "maxPoolPreparedStatementPerConnectionSize",
                PoolConfig::set_max_pool_prepared_statement_per_connection_size,
            ),
        ]
    }
}
