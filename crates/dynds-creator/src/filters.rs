//! Filter assembly from a comma-separated name list

use std::sync::Arc;

use dynds_config::{Bindable, ConfigMap, ConfigValue, apply_properties, merge_config, setter_index};
use dynds_pool::filter::{Filter, LogBackend, LogFilter, StatFilter, WallConfig, WallFilter};

/// Every filter that can be named in the `filters` list
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    strum::EnumString,
    strum::Display,
    strum::IntoStaticStr,
    strum::EnumIter,
)]
#[strum(serialize_all = "lowercase")]
pub enum FilterKind {
    Stat,
    Wall,
    /// Log filter on the `tracing` facade
    Tracing,
    /// Log filter on the `log` facade
    Log,
}

impl FilterKind {
    /// Build the filter and bind `config` onto it
    pub fn build(self, config: &ConfigMap) -> Arc<dyn Filter> {
        match self {
            FilterKind::Stat => Arc::new(bound(StatFilter::default(), config)),
            FilterKind::Wall => Arc::new(WallFilter::new(bound(WallConfig::default(), config))),
            FilterKind::Tracing => Arc::new(bound(LogFilter::new(LogBackend::Tracing), config)),
            FilterKind::Log => Arc::new(bound(LogFilter::new(LogBackend::Log), config)),
        }
    }

    /// Names accepted in this filter's sub-configuration
    pub fn property_names(self) -> Vec<&'static str> {
        match self {
            FilterKind::Stat => names::<StatFilter>(),
            FilterKind::Wall => names::<WallConfig>(),
            FilterKind::Tracing | FilterKind::Log => names::<LogFilter>(),
        }
    }
}

fn bound<T: Bindable>(mut target: T, config: &ConfigMap) -> T {
    apply_properties(&mut target, config);
    target
}

fn names<T: Bindable>() -> Vec<&'static str> {
    let mut names: Vec<_> = setter_index::<T>().property_names().collect();
    names.sort_unstable();
    names
}

fn sub_config<'a>(config: &'a ConfigMap, name: &str) -> Option<&'a ConfigMap> {
    config.get(name).and_then(ConfigValue::as_map)
}

/// Turn `names` (e.g. `"stat,wall"`) into configured filters, in list order
///
/// Each filter is configured from the same-named sub-map, per-datasource
/// entries over global ones. Unknown names are logged and skipped.
pub fn assemble_filters(
    names: Option<&str>,
    per_instance: &ConfigMap,
    global: &ConfigMap,
) -> Vec<Arc<dyn Filter>> {
    let Some(names) = names else {
        return Vec::new();
    };

    let empty = ConfigMap::new();
    let mut filters = Vec::new();
    for name in names.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        let Ok(kind) = name.parse::<FilterKind>() else {
            tracing::warn!(filter = name, "unsupported filter, skipped");
            continue;
        };

        let config = merge_config(
            sub_config(per_instance, name).unwrap_or(&empty),
            sub_config(global, name).unwrap_or(&empty),
        );
        tracing::debug!(filter = name, entries = config.len(), "assembling filter");
        filters.push(kind.build(&config));
    }
    filters
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn map(entries: &[(&str, ConfigValue)]) -> ConfigMap {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn kinds(filters: &[Arc<dyn Filter>]) -> Vec<&'static str> {
        filters.iter().map(|f| f.name()).collect()
    }

    #[test]
    fn test_filter_kind_names() {
        assert_eq!("stat".parse::<FilterKind>().unwrap(), FilterKind::Stat);
        assert_eq!("tracing".parse::<FilterKind>().unwrap(), FilterKind::Tracing);
        assert!("slf4j".parse::<FilterKind>().is_err());
        assert_eq!(FilterKind::Log.to_string(), "log");
    }

    #[test]
    fn test_order_whitespace_and_unknown_names() {
        let filters = assemble_filters(
            Some(" wall , ,bogus,stat,log"),
            &ConfigMap::new(),
            &ConfigMap::new(),
        );
        assert_eq!(kinds(&filters), vec!["wall", "stat", "log"]);
    }

    #[test]
    fn test_missing_or_empty_list() {
        assert!(assemble_filters(None, &ConfigMap::new(), &ConfigMap::new()).is_empty());
        assert!(assemble_filters(Some(""), &ConfigMap::new(), &ConfigMap::new()).is_empty());
        assert!(assemble_filters(Some(" , "), &ConfigMap::new(), &ConfigMap::new()).is_empty());
    }

    #[test]
    fn test_instance_settings_override_global() {
        let global = map(&[(
            "stat",
            map(&[
                ("slow-sql-millis", 100.into()),
                ("merge-sql", true.into()),
            ])
            .into(),
        )]);
        let per_instance = map(&[("stat", map(&[("slow-sql-millis", 5.into())]).into())]);

        let filters = assemble_filters(Some("stat"), &per_instance, &global);
        let stat = filters[0].as_any().downcast_ref::<StatFilter>().unwrap();
        assert_eq!(stat.slow_sql_millis(), 5);
        assert!(stat.is_merge_sql());
    }

    #[test]
    fn test_wall_settings_bound() {
        let global = map(&[(
            "wall",
            map(&[
                ("delete-where-none-check", true.into()),
                ("multi-statement-allow", "true".into()),
            ])
            .into(),
        )]);

        let filters = assemble_filters(Some("wall"), &ConfigMap::new(), &global);
        let wall = filters[0].as_any().downcast_ref::<WallFilter>().unwrap();
        assert!(wall.config().delete_where_none_check);
        assert!(wall.config().multi_statement_allow);
    }

    #[test]
    fn test_log_backends() {
        let filters = assemble_filters(Some("tracing,log"), &ConfigMap::new(), &ConfigMap::new());
        let backends: Vec<_> = filters
            .iter()
            .map(|f| f.as_any().downcast_ref::<LogFilter>().unwrap().backend())
            .collect();
        assert_eq!(backends, vec![LogBackend::Tracing, LogBackend::Log]);
    }

    #[test]
    fn test_property_names() {
        assert!(FilterKind::Stat.property_names().contains(&"slowSqlMillis"));
        assert!(FilterKind::Wall.property_names().contains(&"deleteWhereNoneCheck"));
    }
}
