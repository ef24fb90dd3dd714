//! Connection and statement traits

use crate::{QueryResult, Result, StatementResult, Value};
use async_trait::async_trait;

/// A database connection
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the driver name (e.g., "sqlite")
    fn driver_name(&self) -> &str;

    /// Execute a statement that modifies data (INSERT/UPDATE/DELETE/DDL)
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult>;

    /// Execute a query that returns rows (SELECT)
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Create a statement handle bound to this connection
    ///
    /// The handle must be released with [`Statement::close`], independently
    /// of the connection.
    async fn create_statement(&self) -> Result<Box<dyn Statement>>;

    /// Close the connection
    async fn close(&self) -> Result<()>;

    /// Check if the connection is closed
    fn is_closed(&self) -> bool;
}

/// A statement handle created from a [`Connection`]
#[async_trait]
pub trait Statement: Send + Sync {
    /// Execute arbitrary SQL through this statement
    async fn execute(&self, sql: &str) -> Result<StatementResult>;

    /// Release the statement
    async fn close(self: Box<Self>) -> Result<()>;
}
