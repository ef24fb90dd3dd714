//! DynDS Core - Core abstractions shared by every DynDS crate
//!
//! This crate defines the traits and types the rest of the workspace is
//! written against:
//!
//! - `DatabaseDriver` - Trait for database driver implementations
//! - `Connection` / `Statement` - Traits for live database handles
//! - `Value`, `Row`, `QueryResult`, `StatementResult` - Result types
//! - `DsError` - The workspace error type

mod connection;
mod driver;
mod error;
mod types;

pub use connection::*;
pub use driver::*;
pub use error::*;
pub use types::*;
