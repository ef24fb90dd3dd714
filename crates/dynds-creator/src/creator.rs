//! Datasource creation

use std::sync::Arc;

use async_trait::async_trait;
use dynds_config::{
    ConfigMap, DataSourceProperty, DynamicDataSourceProperties, FILTERS_KEY, apply_properties,
    merge_config, normalize_key,
};
use dynds_core::{DsError, Result};
use dynds_pool::PoolDataSource;
use indexmap::IndexMap;

use crate::filters::assemble_filters;

/// `type` value selecting [`PoolDataSourceCreator`]; an unset type selects it too
pub const DEFAULT_POOL_TYPE: &str = "dynds";

/// Builds a pool from one datasource's properties
#[async_trait]
pub trait DataSourceCreator: Send + Sync {
    /// Whether this creator handles the given properties
    fn support(&self, property: &DataSourceProperty) -> bool;

    async fn create_data_source(&self, property: &DataSourceProperty)
    -> Result<Arc<PoolDataSource>>;
}

/// Creator for [`PoolDataSource`]
///
/// Holds the global pool defaults every datasource is layered on.
#[derive(Debug, Clone, Default)]
pub struct PoolDataSourceCreator {
    global: ConfigMap,
}

impl PoolDataSourceCreator {
    pub fn new(global: ConfigMap) -> Self {
        Self { global }
    }

    pub fn from_properties(properties: &DynamicDataSourceProperties) -> Self {
        Self::new(properties.pool.clone())
    }

    pub fn global(&self) -> &ConfigMap {
        &self.global
    }

    /// Configure a pool without starting it
    pub fn configure(&self, property: &DataSourceProperty) -> PoolDataSource {
        let mut data_source = PoolDataSource::new();
        data_source.set_username(&property.username);
        data_source.set_password(&property.password);
        data_source.set_url(&property.url);
        data_source.set_name(property.pool_name.as_deref().unwrap_or_default());
        if let Some(driver) = property.driver_name() {
            data_source.set_driver_class_name(driver);
        }

        let merged = merge_config(&property.pool, &self.global);
        let filters_key = normalize_key(FILTERS_KEY);
        let scalars: ConfigMap = merged
            .into_iter()
            .filter(|(key, value)| !value.is_map() && normalize_key(key) != filters_key)
            .collect();

        let report = apply_properties(data_source.config_mut(), &scalars);
        if !report.is_clean() {
            tracing::warn!(
                name = data_source.name(),
                unknown = ?report.unknown(),
                failed = report.failed().len(),
                "some pool properties were not applied"
            );
        }

        // The filter list is global; sub-configurations come from both levels
        let names = self.global.get(FILTERS_KEY).and_then(|v| v.as_str());
        data_source.set_filters(assemble_filters(names, &property.pool, &self.global));

        data_source
    }

    /// Create every configured datasource, in declaration order
    ///
    /// A datasource without a pool name is named after its key. Stops at the
    /// first datasource that cannot be created.
    pub async fn create_all(
        &self,
        properties: &DynamicDataSourceProperties,
    ) -> Result<IndexMap<String, Arc<PoolDataSource>>> {
        let mut created = IndexMap::with_capacity(properties.datasource.len());
        for (key, property) in &properties.datasource {
            if !self.support(property) {
                return Err(DsError::Configuration(format!(
                    "datasource '{}' has unsupported type '{}'",
                    key,
                    property.pool_type.as_deref().unwrap_or_default()
                )));
            }

            let data_source = if property.pool_name.is_some() {
                self.create_data_source(property).await?
            } else {
                let named = property.clone().with_pool_name(key);
                self.create_data_source(&named).await?
            };
            created.insert(key.clone(), data_source);
        }
        Ok(created)
    }
}

#[async_trait]
impl DataSourceCreator for PoolDataSourceCreator {
    fn support(&self, property: &DataSourceProperty) -> bool {
        property
            .pool_type
            .as_deref()
            .is_none_or(|t| t.trim().is_empty() || t.eq_ignore_ascii_case(DEFAULT_POOL_TYPE))
    }

    async fn create_data_source(
        &self,
        property: &DataSourceProperty,
    ) -> Result<Arc<PoolDataSource>> {
        let data_source = self.configure(property);

        if property.is_eager() {
            data_source.init().await.map_err(|e| {
                DsError::create_data_source(
                    format!("create data source '{}' error", data_source.name()),
                    e,
                )
            })?;
        }

        tracing::info!(
            name = data_source.name(),
            filters = ?data_source.filters().names(),
            eager = property.is_eager(),
            "data source created"
        );
        Ok(Arc::new(data_source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dynds_config::ConfigValue;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn global() -> ConfigMap {
        let mut stat = ConfigMap::new();
        stat.insert("slow-sql-millis".into(), 250.into());

        let mut global = ConfigMap::new();
        global.insert("filters".into(), "stat,wall".into());
        global.insert("max-active".into(), 20.into());
        global.insert("max-wait".into(), 1000.into());
        global.insert("stat".into(), ConfigValue::Map(stat));
        global
    }

    #[test]
    fn test_identity_and_overrides() {
        let creator = PoolDataSourceCreator::new(global());
        let property = DataSourceProperty::new("sqlite::memory:")
            .with_credentials("app", "secret")
            .with_pool_name("master")
            .with_pool_entry("max-active", 5);

        let ds = creator.configure(&property);
        assert_eq!(ds.name(), "master");
        assert_eq!(ds.config().url(), "sqlite::memory:");
        assert_eq!(ds.config().username(), "app");
        assert_eq!(ds.config().password(), "secret");
        assert_eq!(ds.config().max_active(), 5);
        assert_eq!(ds.config().max_wait(), Some(Duration::from_millis(1000)));
        assert_eq!(ds.config().driver_class_name(), None);
        assert_eq!(ds.filters().names(), vec!["stat", "wall"]);
    }

    #[test]
    fn test_blank_driver_name_ignored() {
        let creator = PoolDataSourceCreator::default();
        let mut property = DataSourceProperty::new("sqlite::memory:");
        property.driver_class_name = Some("  ".into());
        assert_eq!(creator.configure(&property).config().driver_class_name(), None);

        property.driver_class_name = Some("sqlite".into());
        assert_eq!(
            creator.configure(&property).config().driver_class_name(),
            Some("sqlite")
        );
    }

    #[test]
    fn test_filters_only_from_global_list() {
        let creator = PoolDataSourceCreator::default();
        let property = DataSourceProperty::new("sqlite::memory:").with_pool_entry("filters", "stat");
        assert!(creator.configure(&property).filters().is_empty());
    }

    #[test]
    fn test_support() {
        let creator = PoolDataSourceCreator::default();
        let mut property = DataSourceProperty::new("sqlite::memory:");
        assert!(creator.support(&property));
        property.pool_type = Some("DynDS".into());
        assert!(creator.support(&property));
        property.pool_type = Some("hikari".into());
        assert!(!creator.support(&property));
    }
}
