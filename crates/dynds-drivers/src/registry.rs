//! Driver registry for managing available database drivers

use dynds_core::{DatabaseDriver, DsError, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of available database drivers
pub struct DriverRegistry {
    drivers: HashMap<String, Arc<dyn DatabaseDriver>>,
}

impl DriverRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            drivers: HashMap::new(),
        }
    }

    /// Create a registry with all built-in drivers registered
    pub fn with_defaults() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::new();

        #[cfg(feature = "sqlite")]
        registry.register(Arc::new(crate::sqlite::SqliteDriver::new()));

        registry
    }

    /// Register a new driver, replacing any driver with the same name
    pub fn register(&mut self, driver: Arc<dyn DatabaseDriver>) {
        let name = driver.name().to_string();
        tracing::debug!(driver = %name, "registering database driver");
        self.drivers.insert(name, driver);
    }

    /// Get a driver by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn DatabaseDriver>> {
        let driver = self.drivers.get(name).cloned();
        if driver.is_none() {
            tracing::warn!(driver = %name, "driver not found in registry");
        }
        driver
    }

    /// Find the first driver that accepts the URL
    pub fn for_url(&self, url: &str) -> Option<Arc<dyn DatabaseDriver>> {
        let driver = self
            .drivers
            .values()
            .find(|driver| driver.accepts_url(url))
            .cloned();
        if driver.is_none() {
            tracing::debug!(url = %url, "no registered driver accepts url");
        }
        driver
    }

    /// Resolve a driver by explicit name, falling back to the URL
    pub fn resolve(&self, name: Option<&str>, url: &str) -> Result<Arc<dyn DatabaseDriver>> {
        match name {
            Some(name) => self
                .get(name)
                .ok_or_else(|| DsError::Driver(format!("unknown driver '{}'", name))),
            None => self
                .for_url(url)
                .ok_or_else(|| DsError::Driver(format!("no suitable driver found for '{}'", url))),
        }
    }

    /// List all registered driver names
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.drivers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Check if a driver is registered
    pub fn has(&self, name: &str) -> bool {
        self.drivers.contains_key(name)
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
