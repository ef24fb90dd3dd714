//! Best-effort application of configuration entries to a target

use crate::normalize::normalize_key;
use crate::registry::{Bindable, setter_index};
use crate::setter::BindError;
use crate::{ConfigMap, ConfigValue};

/// What happened to one configuration entry
#[derive(Debug, Clone, PartialEq)]
pub enum BindOutcome {
    /// The setter ran
    Applied,
    /// The target has no property with this name
    Unknown,
    /// The value could not be coerced, or the setter refused it
    Failed(BindError),
    /// Nested maps are sub-configurations, not properties
    Skipped,
}

/// Per-entry outcomes of one binding pass, in configuration order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindReport {
    entries: Vec<(String, BindOutcome)>,
}

impl BindReport {
    fn record(&mut self, key: &str, outcome: BindOutcome) {
        self.entries.push((key.to_string(), outcome));
    }

    pub fn entries(&self) -> &[(String, BindOutcome)] {
        &self.entries
    }

    pub fn applied(&self) -> Vec<&str> {
        self.keys_where(|outcome| matches!(outcome, BindOutcome::Applied))
    }

    pub fn unknown(&self) -> Vec<&str> {
        self.keys_where(|outcome| matches!(outcome, BindOutcome::Unknown))
    }

    pub fn skipped(&self) -> Vec<&str> {
        self.keys_where(|outcome| matches!(outcome, BindOutcome::Skipped))
    }

    pub fn failed(&self) -> Vec<(&str, &BindError)> {
        self.entries
            .iter()
            .filter_map(|(key, outcome)| match outcome {
                BindOutcome::Failed(err) => Some((key.as_str(), err)),
                _ => None,
            })
            .collect()
    }

    /// True when every scalar entry was applied
    pub fn is_clean(&self) -> bool {
        self.entries
            .iter()
            .all(|(_, outcome)| matches!(outcome, BindOutcome::Applied | BindOutcome::Skipped))
    }

    fn keys_where(&self, pred: impl Fn(&BindOutcome) -> bool) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, outcome)| pred(outcome))
            .map(|(key, _)| key.as_str())
            .collect()
    }
}

fn display_value<'a>(normalized_key: &str, value: &'a ConfigValue) -> &'a dyn std::fmt::Display {
    if normalized_key.contains("PASSWORD") {
        &"******"
    } else {
        value
    }
}

/// Apply every scalar entry of `config` to `target`
///
/// Never fails as a whole: unknown keys and bad values are logged at warning
/// level, recorded in the report and skipped, so one bad entry cannot stop the
/// rest of the pass.
pub fn apply_properties<T: Bindable>(target: &mut T, config: &ConfigMap) -> BindReport {
    let index = setter_index::<T>();
    let mut report = BindReport::default();

    for (key, value) in config {
        if value.is_map() {
            tracing::debug!(target_type = index.target(), key = %key, "nested configuration skipped");
            report.record(key, BindOutcome::Skipped);
            continue;
        }

        let normalized = normalize_key(key);
        let shown = display_value(&normalized, value);
        let Some(setter) = index.get(&normalized) else {
            tracing::warn!(
                target_type = index.target(),
                key = %key,
                value = %shown,
                "no such property, entry ignored"
            );
            report.record(key, BindOutcome::Unknown);
            continue;
        };

        match setter.invoke(target, value) {
            Ok(()) => {
                tracing::debug!(target_type = index.target(), key = %key, value = %shown, "property set");
                report.record(key, BindOutcome::Applied);
            }
            Err(err) => {
                tracing::warn!(
                    target_type = index.target(),
                    key = %key,
                    value = %shown,
                    error = %err,
                    "failed to set property, entry ignored"
                );
                report.record(key, BindOutcome::Failed(err));
            }
        }
    }

    report
}
