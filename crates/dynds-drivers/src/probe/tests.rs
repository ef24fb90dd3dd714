//! Tests for connectivity probing

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use dynds_core::{
    Connection, ConnectionConfig, DatabaseDriver, DsError, QueryResult, Result, Statement,
    StatementResult, Value,
};

use super::{probe, valid, valid_with_sql};

/// Shared observation points for one probe run
#[derive(Default)]
struct Probes {
    connects: AtomicUsize,
    statements: AtomicUsize,
    executed: AtomicUsize,
    statement_closed: AtomicBool,
    connection_closed: AtomicBool,
}

struct MockStatement {
    probes: Arc<Probes>,
    fail_execute: bool,
    fail_close: bool,
}

#[async_trait]
impl Statement for MockStatement {
    async fn execute(&self, _sql: &str) -> Result<StatementResult> {
        self.probes.executed.fetch_add(1, Ordering::SeqCst);
        if self.fail_execute {
            Err(DsError::Query("no such table: missing".into()))
        } else {
            Ok(StatementResult::default())
        }
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.probes.statement_closed.store(true, Ordering::SeqCst);
        if self.fail_close {
            Err(DsError::Query("statement close failed".into()))
        } else {
            Ok(())
        }
    }
}

struct MockConnection {
    probes: Arc<Probes>,
    behavior: Behavior,
}

#[async_trait]
impl Connection for MockConnection {
    fn driver_name(&self) -> &str {
        "mock"
    }

    async fn execute(&self, _sql: &str, _params: &[Value]) -> Result<StatementResult> {
        Ok(StatementResult::default())
    }

    async fn query(&self, _sql: &str, _params: &[Value]) -> Result<QueryResult> {
        Ok(QueryResult::empty())
    }

    async fn create_statement(&self) -> Result<Box<dyn Statement>> {
        if self.behavior.fail_create_statement {
            return Err(DsError::Query("cannot create statement".into()));
        }
        self.probes.statements.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockStatement {
            probes: self.probes.clone(),
            fail_execute: self.behavior.fail_execute,
            fail_close: self.behavior.fail_statement_close,
        }))
    }

    async fn close(&self) -> Result<()> {
        self.probes.connection_closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.probes.connection_closed.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Copy, Default)]
struct Behavior {
    fail_connect: bool,
    fail_create_statement: bool,
    fail_execute: bool,
    fail_statement_close: bool,
}

struct MockDriver {
    probes: Arc<Probes>,
    behavior: Behavior,
}

impl MockDriver {
    fn new(behavior: Behavior) -> Self {
        Self {
            probes: Arc::new(Probes::default()),
            behavior,
        }
    }
}

#[async_trait]
impl DatabaseDriver for MockDriver {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn accepts_url(&self, url: &str) -> bool {
        url.starts_with("mock:")
    }

    async fn connect(&self, _config: &ConnectionConfig) -> Result<Arc<dyn Connection>> {
        if self.behavior.fail_connect {
            return Err(DsError::Connection("Access denied for user".into()));
        }
        self.probes.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockConnection {
            probes: self.probes.clone(),
            behavior: self.behavior,
        }))
    }
}

// =============================================================================
// Resource release
// =============================================================================

#[tokio::test]
async fn test_probe_success_releases_everything() {
    let driver = MockDriver::new(Behavior::default());

    let ok = probe(&driver, "mock:db", "u", "p", Some("SELECT 1")).await.unwrap();

    assert!(ok);
    assert_eq!(driver.probes.connects.load(Ordering::SeqCst), 1);
    assert_eq!(driver.probes.statements.load(Ordering::SeqCst), 1);
    assert_eq!(driver.probes.executed.load(Ordering::SeqCst), 1);
    assert!(driver.probes.statement_closed.load(Ordering::SeqCst));
    assert!(driver.probes.connection_closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_probe_without_sql_skips_execution() {
    let driver = MockDriver::new(Behavior::default());

    assert!(probe(&driver, "mock:db", "u", "p", None).await.unwrap());
    assert!(probe(&driver, "mock:db", "u", "p", Some("   ")).await.unwrap());

    assert_eq!(driver.probes.executed.load(Ordering::SeqCst), 0);
    assert_eq!(driver.probes.statements.load(Ordering::SeqCst), 2);
    assert!(driver.probes.statement_closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_validation_failure_still_releases() {
    let driver = MockDriver::new(Behavior {
        fail_execute: true,
        ..Behavior::default()
    });

    let err = probe(&driver, "mock:db", "u", "p", Some("SELECT * FROM missing"))
        .await
        .unwrap_err();

    assert!(matches!(err, DsError::Query(msg) if msg.contains("missing")));
    assert!(driver.probes.statement_closed.load(Ordering::SeqCst));
    assert!(driver.probes.connection_closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_statement_close_failure_does_not_block_connection_close() {
    let driver = MockDriver::new(Behavior {
        fail_statement_close: true,
        ..Behavior::default()
    });

    assert!(probe(&driver, "mock:db", "u", "p", Some("SELECT 1")).await.unwrap());
    assert!(driver.probes.connection_closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_statement_creation_failure_closes_connection() {
    let driver = MockDriver::new(Behavior {
        fail_create_statement: true,
        ..Behavior::default()
    });

    assert!(probe(&driver, "mock:db", "u", "p", None).await.is_err());
    assert!(driver.probes.connection_closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_connect_failure_propagates_raw_error() {
    let driver = MockDriver::new(Behavior {
        fail_connect: true,
        ..Behavior::default()
    });

    let err = probe(&driver, "mock:db", "u", "p", None).await.unwrap_err();
    assert!(matches!(err, DsError::Connection(msg) if msg.contains("Access denied")));
    assert_eq!(driver.probes.statements.load(Ordering::SeqCst), 0);
}

// =============================================================================
// Default registry
// =============================================================================

#[tokio::test]
async fn test_unparseable_url_fails() {
    let err = valid("ss", "root", "root").await.unwrap_err();
    assert!(matches!(err, DsError::Driver(msg) if msg.contains("no suitable driver")));
}

#[cfg(feature = "sqlite")]
#[tokio::test]
async fn test_sqlite_memory_is_valid() {
    assert!(valid("sqlite::memory:", "", "").await.unwrap());
    assert!(
        valid_with_sql("sqlite::memory:", "", "", Some("SELECT 1"))
            .await
            .unwrap()
    );
}
