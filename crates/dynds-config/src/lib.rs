//! DynDS Config - Binding flat configuration maps onto typed targets
//!
//! The pieces, in the order they are used:
//!
//! - [`normalize_key`] folds `max-wait`, `maxWait` and `MAX_WAIT` onto one lookup key
//! - [`Bindable`] / [`setter_index`] expose a per-type table of typed setters
//! - [`merge_config`] layers per-datasource overrides on top of global defaults
//! - [`apply_properties`] drives the setters and reports every entry's outcome
//!
//! [`DynamicDataSourceProperties`] is the on-disk shape of the whole configuration.

mod apply;
pub mod loader;
mod merge;
mod normalize;
mod properties;
mod registry;
mod setter;
mod value;

pub use apply::{BindOutcome, BindReport, apply_properties};
pub use merge::merge_config;
pub use normalize::{normalize_key, to_camel_case};
pub use properties::{DataSourceProperty, DynamicDataSourceProperties, FILTERS_KEY};
pub use registry::{Bindable, SetterIndex, setter_index};
pub use setter::{BindError, FromConfigValue, PropertySetter, ValueKind};
pub use value::{ConfigMap, ConfigValue};
