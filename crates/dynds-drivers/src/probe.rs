//! One-shot connectivity probing
//!
//! A probe opens exactly one connection, creates one statement, optionally
//! runs a validation statement, and releases the statement and the connection
//! independently on every exit path.
//!
//! # Example
//!
//! ```ignore
//! use dynds_drivers::valid_with_sql;
//!
//! let ok = valid_with_sql("sqlite:/var/lib/app.db", "app", "secret", Some("SELECT 1")).await?;
//! assert!(ok);
//! ```

use dynds_core::{Connection, ConnectionConfig, DatabaseDriver, Result};

use crate::DriverRegistry;

#[cfg(test)]
mod tests;

/// Check that a connection can be opened with the given credentials
pub async fn valid(url: &str, username: &str, password: &str) -> Result<bool> {
    valid_with_sql(url, username, password, None).await
}

/// Check connectivity and optionally run a validation statement
///
/// The driver is picked from the default registry by URL. A URL no driver
/// accepts fails with [`dynds_core::DsError::Driver`].
pub async fn valid_with_sql(
    url: &str,
    username: &str,
    password: &str,
    validation_sql: Option<&str>,
) -> Result<bool> {
    let driver = DriverRegistry::with_defaults().resolve(None, url)?;
    probe(driver.as_ref(), url, username, password, validation_sql).await
}

/// Probe through an explicit driver
#[tracing::instrument(skip(driver, password, validation_sql), fields(driver_name = driver.name()))]
pub async fn probe(
    driver: &dyn DatabaseDriver,
    url: &str,
    username: &str,
    password: &str,
    validation_sql: Option<&str>,
) -> Result<bool> {
    let config = ConnectionConfig::new(url).with_credentials(username, password);
    let conn = driver.connect(&config).await?;

    let outcome = run_validation(conn.as_ref(), validation_sql).await;

    if let Err(e) = conn.close().await {
        tracing::debug!(error = %e, "failed to close probe connection");
    }

    outcome?;
    tracing::debug!("probe succeeded");
    Ok(true)
}

async fn run_validation(conn: &dyn Connection, validation_sql: Option<&str>) -> Result<()> {
    let stmt = conn.create_statement().await?;

    let executed = match validation_sql.map(str::trim).filter(|sql| !sql.is_empty()) {
        Some(sql) => stmt.execute(sql).await.map(|_| ()),
        None => Ok(()),
    };

    if let Err(e) = stmt.close().await {
        tracing::debug!(error = %e, "failed to close probe statement");
    }

    executed
}
