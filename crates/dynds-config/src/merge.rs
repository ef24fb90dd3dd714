//! Layering per-datasource configuration over global defaults

use crate::ConfigMap;

/// Merge `overrides` on top of `base`
///
/// Keys present in `overrides` replace same-named keys in `base`, keeping the
/// position the key had in `base`; keys present on one side only pass through.
/// Nested maps are taken as a whole from the winning side, never merged
/// recursively. Neither input is modified.
pub fn merge_config(overrides: &ConfigMap, base: &ConfigMap) -> ConfigMap {
    let mut merged = ConfigMap::with_capacity(overrides.len() + base.len());
    merged.extend(base.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConfigValue;
    use pretty_assertions::assert_eq;

    fn map(entries: &[(&str, ConfigValue)]) -> ConfigMap {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_override_wins() {
        let overrides = map(&[("a", 1.into())]);
        let base = map(&[("a", 2.into()), ("b", 3.into())]);

        let merged = merge_config(&overrides, &base);

        assert_eq!(merged, map(&[("a", 1.into()), ("b", 3.into())]));
    }

    #[test]
    fn test_inputs_untouched() {
        let overrides = map(&[("a", 1.into()), ("c", "x".into())]);
        let base = map(&[("a", 2.into()), ("b", 3.into())]);
        let (overrides_before, base_before) = (overrides.clone(), base.clone());

        let _ = merge_config(&overrides, &base);

        assert_eq!(overrides, overrides_before);
        assert_eq!(base, base_before);
    }

    #[test]
    fn test_nested_maps_are_not_merged() {
        let overrides = map(&[("stat", map(&[("merge-sql", true.into())]).into())]);
        let base = map(&[(
            "stat",
            map(&[("slow-sql-millis", 10.into()), ("merge-sql", false.into())]).into(),
        )]);

        let merged = merge_config(&overrides, &base);

        assert_eq!(
            merged["stat"],
            ConfigValue::from(map(&[("merge-sql", true.into())]))
        );
    }

    #[test]
    fn test_empty_sides() {
        let some = map(&[("a", 1.into())]);
        assert_eq!(merge_config(&ConfigMap::new(), &some), some);
        assert_eq!(merge_config(&some, &ConfigMap::new()), some);
        assert!(merge_config(&ConfigMap::new(), &ConfigMap::new()).is_empty());
    }
}
