//! DynDS Drivers - Database driver registry and connectivity probing
//!
//! Concrete drivers live in their own crates under `crates/` and are enabled
//! through cargo features.

#[cfg(feature = "sqlite")]
pub use dynds_driver_sqlite as sqlite;

mod probe;
mod registry;

pub use probe::{probe, valid, valid_with_sql};
pub use registry::DriverRegistry;

/// Re-export commonly used types from dynds-core
pub use dynds_core::{
    Connection, ConnectionConfig, DatabaseDriver, DsError, QueryResult, Result, Row, Statement,
    StatementResult, Value,
};
