//! DynDS Pool - A configurable connection pool with filters
//!
//! [`PoolDataSource`] is the object configuration is bound onto: its
//! [`PoolConfig`] exposes every tunable property through a setter table, and
//! its [`FilterChain`] intercepts connections and statements.
//!
//! # Example
//!
//! ```ignore
//! use dynds_pool::{PoolDataSource, StatFilter};
//!
//! let mut ds = PoolDataSource::new();
//! ds.set_url("sqlite::memory:");
//! ds.config_mut().set_max_active(4)?;
//! ds.add_filter(Arc::new(StatFilter::default()));
//!
//! let conn = ds.get_connection().await?;
//! conn.query("SELECT 1", &[]).await?;
//! ```

mod config;
mod datasource;
mod factory;
pub mod filter;
mod pool;
mod stats;

pub use config::PoolConfig;
pub use datasource::PoolDataSource;
pub use factory::{ConnectionFactory, DriverConnectionFactory};
pub use filter::{
    Filter, FilterChain, LogBackend, LogFilter, SqlStat, StatFilter, StatementEvent,
    executable_sql,
    StatementKind, StatementOutcome, WallConfig, WallFilter,
};
pub use pool::{ConnectionPool, PooledConnection, PooledStatement};
pub use stats::PoolStats;
