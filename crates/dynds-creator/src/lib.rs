//! DynDS Creator - Builds configured pools from datasource properties
//!
//! [`PoolDataSourceCreator`] takes one [`dynds_config::DataSourceProperty`]
//! plus the global pool defaults and produces a ready [`dynds_pool::PoolDataSource`]:
//! identity fields set, tunables bound through the setter table, filters
//! assembled from the `filters` list.

mod creator;
mod filters;

pub use creator::{DEFAULT_POOL_TYPE, DataSourceCreator, PoolDataSourceCreator};
pub use filters::{FilterKind, assemble_filters};
