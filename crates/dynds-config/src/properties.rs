//! Datasource configuration model

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{ConfigMap, ConfigValue};

/// Reserved pool-configuration key holding the comma-separated filter names
pub const FILTERS_KEY: &str = "filters";

/// One configured datasource
///
/// Identity fields are read directly; everything tunable lives in `pool` and is
/// bound onto the pool object by name.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct DataSourceProperty {
    /// Creator selector; unset means the default pool
    #[serde(rename = "type")]
    pub pool_type: Option<String>,
    /// Pool display name; defaults to the datasource key
    pub pool_name: Option<String>,
    /// Registered driver name; inferred from the URL when blank
    pub driver_class_name: Option<String>,
    pub url: String,
    pub username: String,
    pub password: String,
    /// `Some(false)` initializes the pool at creation time
    pub lazy: Option<bool>,
    /// Per-datasource pool overrides, including filter sub-configurations
    pub pool: ConfigMap,
}

impl DataSourceProperty {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.username = username.to_string();
        self.password = password.to_string();
        self
    }

    pub fn with_pool_name(mut self, name: &str) -> Self {
        self.pool_name = Some(name.to_string());
        self
    }

    pub fn with_lazy(mut self, lazy: bool) -> Self {
        self.lazy = Some(lazy);
        self
    }

    pub fn with_pool_entry(mut self, key: &str, value: impl Into<ConfigValue>) -> Self {
        self.pool.insert(key.to_string(), value.into());
        self
    }

    /// Whether the pool must be initialized eagerly
    pub fn is_eager(&self) -> bool {
        self.lazy == Some(false)
    }

    /// The driver name, if one was given and is not blank
    pub fn driver_name(&self) -> Option<&str> {
        self.driver_class_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}

impl std::fmt::Debug for DataSourceProperty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSourceProperty")
            .field("pool_type", &self.pool_type)
            .field("pool_name", &self.pool_name)
            .field("driver_class_name", &self.driver_class_name)
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"******")
            .field("lazy", &self.lazy)
            .field("pool", &self.pool)
            .finish()
    }
}

/// The whole datasource configuration: global pool defaults plus every datasource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct DynamicDataSourceProperties {
    /// Name of the primary datasource
    pub primary: String,
    /// Fail when a requested datasource does not exist instead of using the primary
    pub strict: bool,
    /// Global pool defaults, including `filters` and filter sub-configurations
    pub pool: ConfigMap,
    /// Datasources by name, in declaration order
    pub datasource: IndexMap<String, DataSourceProperty>,
}

impl Default for DynamicDataSourceProperties {
    fn default() -> Self {
        Self {
            primary: "master".to_string(),
            strict: false,
            pool: ConfigMap::new(),
            datasource: IndexMap::new(),
        }
    }
}

impl DynamicDataSourceProperties {
    /// The globally configured filter list, if any
    pub fn filters(&self) -> Option<&str> {
        self.pool.get(FILTERS_KEY).and_then(ConfigValue::as_str)
    }

    pub fn primary_data_source(&self) -> Option<&DataSourceProperty> {
        self.datasource.get(&self.primary)
    }

    /// Look up a datasource, falling back to the primary unless `strict`
    pub fn data_source(&self, name: &str) -> Option<&DataSourceProperty> {
        match self.datasource.get(name) {
            Some(property) => Some(property),
            None if self.strict => None,
            None => self.primary_data_source(),
        }
    }
}
