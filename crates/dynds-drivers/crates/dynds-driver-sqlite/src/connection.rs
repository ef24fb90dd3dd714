//! SQLite connection implementation

use async_trait::async_trait;
use dynds_core::{
    Connection, DsError, QueryResult, Result, Row, Statement, StatementResult, Value,
};
use parking_lot::Mutex;
use rusqlite::{
    Connection as RusqliteConnection, ErrorCode, InterruptHandle, OpenFlags, params_from_iter,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

type SharedConnection = Arc<Mutex<Option<RusqliteConnection>>>;

/// In-memory database path understood by SQLite
pub(crate) const MEMORY_PATH: &str = ":memory:";

/// SQLite connection wrapper
///
/// The underlying handle is taken out of the shared slot on [`Connection::close`],
/// so statements created from this connection fail once it is closed.
///
/// Statements run on tokio's blocking pool. Dropping the future of a running
/// statement interrupts it, so `tokio::time::timeout` cancels SQLite work.
pub struct SqliteConnection {
    conn: SharedConnection,
    interrupt: Arc<InterruptHandle>,
    path: String,
    cache_statements: AtomicBool,
}

impl SqliteConnection {
    /// Open a SQLite database
    pub fn open(path: &str) -> Result<Self> {
        tracing::debug!(path = %path, "opening SQLite database");
        let expanded_path = Self::expand_path(path)?;

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = if path == MEMORY_PATH {
            RusqliteConnection::open_in_memory().map_err(|e| {
                DsError::Connection(format!("Failed to open in-memory database: {}", e))
            })?
        } else {
            if !expanded_path.starts_with("file:") {
                let file_path = std::path::Path::new(&expanded_path);
                if let Some(parent) = file_path.parent()
                    && !parent.exists()
                {
                    return Err(DsError::Connection(format!(
                        "Parent directory does not exist: {}",
                        parent.display()
                    )));
                }
            }

            let conn = RusqliteConnection::open_with_flags(&expanded_path, flags).map_err(|e| {
                DsError::Connection(format!(
                    "Failed to open SQLite database at '{}': {}",
                    expanded_path, e
                ))
            })?;

            conn.pragma_update(None, "journal_mode", "WAL")
                .map_err(|e| DsError::Connection(format!("Failed to set journal mode: {}", e)))?;
            conn.pragma_update(None, "synchronous", "NORMAL").map_err(|e| {
                DsError::Connection(format!("Failed to set synchronous mode: {}", e))
            })?;
            conn
        };

        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|e| DsError::Connection(format!("Failed to enable foreign keys: {}", e)))?;

        tracing::debug!(path = %expanded_path, "SQLite database connection established");
        Ok(Self {
            interrupt: Arc::new(conn.get_interrupt_handle()),
            conn: Arc::new(Mutex::new(Some(conn))),
            path: expanded_path,
            cache_statements: AtomicBool::new(false),
        })
    }

    /// Cache up to `capacity` prepared statements; `0` disables caching
    pub fn set_statement_cache_capacity(&self, capacity: usize) -> Result<()> {
        self.with_conn(|conn| {
            conn.set_prepared_statement_cache_capacity(capacity);
            Ok(())
        })?;
        self.cache_statements.store(capacity > 0, Ordering::Release);
        Ok(())
    }

    /// Refuse writes on this connection
    pub fn set_read_only(&self, read_only: bool) -> Result<()> {
        let value = if read_only { "ON" } else { "OFF" };
        self.with_conn(|conn| {
            conn.pragma_update(None, "query_only", value)
                .map_err(|e| DsError::Connection(format!("Failed to set query_only: {}", e)))
        })
    }

    /// The resolved database path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Expand `~/` and make relative paths absolute
    fn expand_path(path: &str) -> Result<String> {
        if path == MEMORY_PATH || path.starts_with("file:") {
            return Ok(path.to_string());
        }

        let expanded = if let Some(rest) = path.strip_prefix("~/") {
            let home = dirs::home_dir().ok_or_else(|| {
                DsError::Configuration("Unable to determine HOME directory".into())
            })?;
            home.join(rest).to_string_lossy().to_string()
        } else if path.starts_with('~') {
            return Err(DsError::Configuration(
                "User-specific home directories (~user) are not supported".into(),
            ));
        } else {
            path.to_string()
        };

        let path_buf = std::path::PathBuf::from(&expanded);
        let result = if path_buf.is_relative() {
            std::env::current_dir()?
                .join(path_buf)
                .to_string_lossy()
                .to_string()
        } else {
            expanded
        };

        Ok(result)
    }

    fn with_conn<R>(&self, f: impl FnOnce(&RusqliteConnection) -> Result<R>) -> Result<R> {
        with_open(&self.conn, f)
    }
}

fn with_open<R>(
    conn: &SharedConnection,
    f: impl FnOnce(&RusqliteConnection) -> Result<R>,
) -> Result<R> {
    let guard = conn.lock();
    let conn = guard
        .as_ref()
        .ok_or_else(|| DsError::Connection("SQLite connection is closed".into()))?;
    f(conn)
}

/// Interrupts the statement it guards unless disarmed first
struct InterruptOnDrop {
    handle: Arc<InterruptHandle>,
    cancelled: Arc<AtomicBool>,
    armed: bool,
}

impl Drop for InterruptOnDrop {
    fn drop(&mut self) {
        if self.armed {
            self.cancelled.store(true, Ordering::Release);
            self.handle.interrupt();
            tracing::debug!("interrupted abandoned SQLite statement");
        }
    }
}

/// Run `f` against the open connection on the blocking pool
///
/// If the returned future is dropped before `f` finishes, the statement is
/// interrupted and `f` is skipped when it has not started yet.
async fn run_blocking<R, F>(
    conn: &SharedConnection,
    interrupt: &Arc<InterruptHandle>,
    f: F,
) -> Result<R>
where
    R: Send + 'static,
    F: FnOnce(&RusqliteConnection) -> Result<R> + Send + 'static,
{
    let cancelled = Arc::new(AtomicBool::new(false));
    let mut guard = InterruptOnDrop {
        handle: Arc::clone(interrupt),
        cancelled: Arc::clone(&cancelled),
        armed: true,
    };

    let shared = Arc::clone(conn);
    let joined = tokio::task::spawn_blocking(move || {
        with_open(&shared, |conn| {
            if cancelled.load(Ordering::Acquire) {
                return Err(DsError::Timeout("SQLite statement cancelled".into()));
            }
            f(conn)
        })
    })
    .await;
    guard.armed = false;

    joined.map_err(|e| DsError::Driver(format!("SQLite worker failed: {}", e)))?
}

#[async_trait]
impl Connection for SqliteConnection {
    fn driver_name(&self) -> &str {
        "sqlite"
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        let rusqlite_params = values_to_rusqlite(params);
        let cached = self.cache_statements.load(Ordering::Acquire);
        let sql = sql.to_string();
        let rows_affected = run_blocking(&self.conn, &self.interrupt, move |conn| {
            let params = params_from_iter(rusqlite_params.iter());
            let executed = if cached {
                conn.prepare_cached(&sql).and_then(|mut stmt| stmt.execute(params))
            } else {
                conn.execute(&sql, params)
            };
            executed.map_err(|e| sqlite_error("Failed to execute statement", e))
        })
        .await?;

        tracing::debug!(affected_rows = rows_affected, "statement executed");
        Ok(StatementResult {
            is_query: false,
            affected_rows: rows_affected as u64,
        })
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let start_time = std::time::Instant::now();
        let rusqlite_params = values_to_rusqlite(params);

        let cached = self.cache_statements.load(Ordering::Acquire);
        let sql = sql.to_string();
        let (columns, rows) = run_blocking(&self.conn, &self.interrupt, move |conn| {
            if cached {
                let mut stmt = conn.prepare_cached(&sql).map_err(prepare_error)?;
                read_rows(&mut stmt, &rusqlite_params)
            } else {
                let mut stmt = conn.prepare(&sql).map_err(prepare_error)?;
                read_rows(&mut stmt, &rusqlite_params)
            }
        })
        .await?;

        let execution_time_ms = start_time.elapsed().as_millis() as u64;
        tracing::debug!(
            row_count = rows.len(),
            execution_time_ms = execution_time_ms,
            "query executed successfully"
        );
        Ok(QueryResult {
            columns,
            rows,
            execution_time_ms,
        })
    }

    async fn create_statement(&self) -> Result<Box<dyn Statement>> {
        self.with_conn(|_| Ok(()))?;
        Ok(Box::new(SqliteStatement {
            conn: Arc::clone(&self.conn),
            interrupt: Arc::clone(&self.interrupt),
            closed: AtomicBool::new(false),
        }))
    }

    async fn close(&self) -> Result<()> {
        let Some(conn) = self.conn.lock().take() else {
            return Ok(());
        };
        tracing::debug!(path = %self.path, "closing SQLite connection");
        conn.close()
            .map_err(|(_, e)| DsError::Connection(format!("Failed to close SQLite connection: {}", e)))
    }

    fn is_closed(&self) -> bool {
        self.conn.lock().is_none()
    }
}

/// Statement handle sharing its parent connection
pub struct SqliteStatement {
    conn: SharedConnection,
    interrupt: Arc<InterruptHandle>,
    closed: AtomicBool,
}

#[async_trait]
impl Statement for SqliteStatement {
    async fn execute(&self, sql: &str) -> Result<StatementResult> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DsError::Query("Statement is closed".into()));
        }

        let sql = sql.to_string();
        run_blocking(&self.conn, &self.interrupt, move |conn| {
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| sqlite_error("Failed to prepare statement", e))?;

            if stmt.column_count() > 0 {
                let mut rows = stmt
                    .query([])
                    .map_err(|e| sqlite_error("Failed to execute query", e))?;
                while rows
                    .next()
                    .map_err(|e| sqlite_error("Failed to fetch row", e))?
                    .is_some()
                {}
                Ok(StatementResult {
                    is_query: true,
                    affected_rows: 0,
                })
            } else {
                let affected = stmt
                    .execute([])
                    .map_err(|e| sqlite_error("Failed to execute statement", e))?;
                Ok(StatementResult {
                    is_query: false,
                    affected_rows: affected as u64,
                })
            }
        })
        .await
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        tracing::trace!("SQLite statement closed");
        Ok(())
    }
}

/// Interrupted statements surface as timeouts
fn sqlite_error(context: &str, e: rusqlite::Error) -> DsError {
    if e.sqlite_error_code() == Some(ErrorCode::OperationInterrupted) {
        return DsError::Timeout(format!("SQLite statement interrupted: {}", e));
    }
    DsError::Query(format!("{}: {}", context, e))
}

fn prepare_error(e: rusqlite::Error) -> DsError {
    sqlite_error("Failed to prepare query", e)
}

fn read_rows(
    stmt: &mut rusqlite::Statement<'_>,
    params: &[rusqlite::types::Value],
) -> Result<(Vec<String>, Vec<Row>)> {
    let columns: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    let mut query_rows = stmt
        .query(params_from_iter(params.iter()))
        .map_err(|e| sqlite_error("Failed to execute query", e))?;

    while let Some(row) = query_rows
        .next()
        .map_err(|e| sqlite_error("Failed to fetch row", e))?
    {
        let mut values = Vec::with_capacity(columns.len());
        for i in 0..columns.len() {
            values.push(rusqlite_to_value(row, i)?);
        }
        rows.push(Row::new(columns.clone(), values));
    }
    Ok((columns, rows))
}

fn values_to_rusqlite(values: &[Value]) -> Vec<rusqlite::types::Value> {
    values.iter().map(value_to_rusqlite).collect()
}

fn value_to_rusqlite(value: &Value) -> rusqlite::types::Value {
    match value {
        Value::Null => rusqlite::types::Value::Null,
        Value::Bool(b) => rusqlite::types::Value::Integer(if *b { 1 } else { 0 }),
        Value::Int64(i) => rusqlite::types::Value::Integer(*i),
        Value::Float64(f) => rusqlite::types::Value::Real(*f),
        Value::String(s) => rusqlite::types::Value::Text(s.clone()),
        Value::Bytes(b) => rusqlite::types::Value::Blob(b.clone()),
    }
}

/// Convert rusqlite row value to our Value type
fn rusqlite_to_value(row: &rusqlite::Row, idx: usize) -> Result<Value> {
    use rusqlite::types::ValueRef;

    let value_ref = row
        .get_ref(idx)
        .map_err(|e| DsError::Query(e.to_string()))?;

    let value = match value_ref {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int64(i),
        ValueRef::Real(f) => Value::Float64(f),
        ValueRef::Text(s) => Value::String(String::from_utf8_lossy(s).to_string()),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    };

    Ok(value)
}
