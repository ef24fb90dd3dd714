//! Connection pool implementation
//!
//! Borrowing is bounded by a semaphore sized `maxActive`. Idle connections sit
//! in a LIFO queue and are checked for lifetime and validity when borrowed.
//! Connections go back to the pool when the [`PooledConnection`] is dropped.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use dynds_core::{Connection, DsError, QueryResult, Result, Statement, StatementResult, Value};
use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::factory::ConnectionFactory;
use crate::filter::{FilterChain, StatementEvent, StatementKind, StatementOutcome};
use crate::{PoolConfig, PoolStats};


/// A physical connection with its bookkeeping
struct PhysicalConnection {
    id: u64,
    connection: Arc<dyn Connection>,
    created_at: Instant,
    last_used_at: Instant,
}

impl PhysicalConnection {
    fn touch(&mut self) {
        self.last_used_at = Instant::now();
    }
}

/// A connection pool that manages a set of database connections
pub struct ConnectionPool {
    config: PoolConfig,
    factory: Arc<dyn ConnectionFactory>,
    filters: FilterChain,
    /// Idle connections, most recently returned at the back
    idle: Mutex<VecDeque<PhysicalConnection>>,
    /// Limits borrowed connections to `maxActive`
    semaphore: Arc<Semaphore>,
    active_count: AtomicUsize,
    waiting_count: AtomicUsize,
    next_id: AtomicU64,
    opened_count: AtomicU64,
    closed_count: AtomicU64,
    closed: AtomicBool,
}

impl ConnectionPool {
    pub fn new<F: ConnectionFactory>(config: PoolConfig, factory: F, filters: FilterChain) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_active()));
        Self {
            config,
            factory: Arc::new(factory),
            filters,
            idle: Mutex::new(VecDeque::new()),
            semaphore,
            active_count: AtomicUsize::new(0),
            waiting_count: AtomicUsize::new(0),
            next_id: AtomicU64::new(1),
            opened_count: AtomicU64::new(0),
            closed_count: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn filters(&self) -> &FilterChain {
        &self.filters
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Borrow a connection
    ///
    /// Reuses an idle connection when one passes its checks, otherwise opens a
    /// new one. Waits at most `maxWait` for a free slot.
    pub async fn get(self: &Arc<Self>) -> Result<PooledConnection> {
        if self.is_closed() {
            return Err(DsError::Connection(format!(
                "pool '{}' is closed",
                self.config.name()
            )));
        }

        let _waiting = WaitingGuard::enter(&self.waiting_count);
        match self.config.max_wait() {
            Some(max_wait) => tokio::time::timeout(max_wait, self.acquire())
                .await
                .unwrap_or_else(|_| {
                    Err(DsError::Timeout(format!(
                        "Timed out waiting for connection (maxWait: {:?}, active: {})",
                        max_wait,
                        self.active_count.load(Ordering::SeqCst)
                    )))
                }),
            None => self.acquire().await,
        }
    }

    async fn acquire(self: &Arc<Self>) -> Result<PooledConnection> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| DsError::Connection(format!("pool '{}' is closed", self.config.name())))?;

        let physical = match self.take_idle().await {
            Some(physical) => physical,
            None => self.open_physical().await?,
        };

        self.active_count.fetch_add(1, Ordering::SeqCst);
        Ok(PooledConnection {
            id: physical.id,
            connection: physical.connection,
            created_at: physical.created_at,
            pool: Arc::clone(self),
            permit: Some(permit),
        })
    }

    /// Pop idle connections until one passes lifetime and validity checks
    async fn take_idle(&self) -> Option<PhysicalConnection> {
        loop {
            let mut physical = self.idle.lock().pop_back()?;

            if let Some(reason) = self.expiry_reason(&physical) {
                tracing::debug!(connection_id = physical.id, reason, "discarding idle connection");
                self.close_physical(physical).await;
                continue;
            }

            let needs_validation = self.config.test_on_borrow()
                || (self.config.test_while_idle()
                    && physical.last_used_at.elapsed() >= self.config.time_between_eviction_runs());
            if needs_validation && !self.factory.validate(&*physical.connection).await {
                tracing::debug!(connection_id = physical.id, "idle connection failed validation");
                self.close_physical(physical).await;
                continue;
            }

            physical.touch();
            return Some(physical);
        }
    }

    fn expiry_reason(&self, physical: &PhysicalConnection) -> Option<&'static str> {
        if physical.connection.is_closed() {
            return Some("closed");
        }
        if let Some(phy_timeout) = self.config.phy_timeout()
            && physical.created_at.elapsed() > phy_timeout
        {
            return Some("physical lifetime exceeded");
        }
        if physical.last_used_at.elapsed() > self.config.min_evictable_idle_time() {
            return Some("idle too long");
        }
        None
    }

    async fn open_physical(&self) -> Result<PhysicalConnection> {
        let connection = self.factory.create().await.map_err(|e| {
            tracing::warn!(pool = self.config.name(), error = %e, "failed to open connection");
            e
        })?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.opened_count.fetch_add(1, Ordering::SeqCst);
        self.filters.connection_opened(id);
        tracing::debug!(pool = self.config.name(), connection_id = id, "connection opened");

        let now = Instant::now();
        Ok(PhysicalConnection {
            id,
            connection,
            created_at: now,
            last_used_at: now,
        })
    }

    async fn close_physical(&self, physical: PhysicalConnection) {
        if let Err(e) = physical.connection.close().await {
            tracing::debug!(connection_id = physical.id, error = %e, "error closing connection");
        }
        self.record_closed(physical.id);
    }

    fn record_closed(&self, id: u64) {
        self.closed_count.fetch_add(1, Ordering::SeqCst);
        self.filters.connection_closed(id);
    }

    /// Open `count` connections into the idle queue
    ///
    /// With `count == 0` one connection is opened and closed again, so a bad
    /// configuration still surfaces here.
    pub async fn prefill(&self, count: usize) -> Result<()> {
        if count == 0 {
            let physical = self.open_physical().await?;
            self.close_physical(physical).await;
            return Ok(());
        }

        for _ in 0..count {
            let physical = self.open_physical().await?;
            self.idle.lock().push_back(physical);
        }
        Ok(())
    }

    /// Close idle connections that outlived their idle or physical lifetime
    ///
    /// At least `minIdle` idle connections are kept. With `keepAlive`, kept
    /// connections that sat idle too long are validated instead.
    /// Returns the number of connections closed.
    pub async fn evict_idle(&self) -> usize {
        let min_evictable = self.config.min_evictable_idle_time();
        let min_idle = self.config.min_idle();

        let mut to_close = Vec::new();
        let mut to_check = Vec::new();
        {
            let mut idle = self.idle.lock();
            let mut remaining = idle.len();
            let mut kept = VecDeque::with_capacity(remaining);
            // Front of the queue has been idle the longest
            for physical in idle.drain(..) {
                let phy_expired = self
                    .config
                    .phy_timeout()
                    .is_some_and(|limit| physical.created_at.elapsed() > limit);
                let idle_expired = physical.last_used_at.elapsed() >= min_evictable;

                if phy_expired || physical.connection.is_closed() {
                    remaining -= 1;
                    to_close.push(physical);
                } else if idle_expired && remaining > min_idle {
                    remaining -= 1;
                    to_close.push(physical);
                } else if idle_expired && self.config.keep_alive() {
                    to_check.push(physical);
                } else {
                    kept.push_back(physical);
                }
            }
            *idle = kept;
        }

        let mut evicted = to_close.len();
        for physical in to_close {
            self.close_physical(physical).await;
        }

        for mut physical in to_check {
            if self.factory.validate(&*physical.connection).await {
                physical.touch();
                self.idle.lock().push_front(physical);
            } else {
                evicted += 1;
                self.close_physical(physical).await;
            }
        }

        if evicted > 0 {
            tracing::debug!(pool = self.config.name(), evicted, "evicted idle connections");
        }
        evicted
    }

    fn release(self: &Arc<Self>, physical: PhysicalConnection, permit: OwnedSemaphorePermit) {
        self.active_count.fetch_sub(1, Ordering::SeqCst);

        let must_close = self.is_closed()
            || physical.connection.is_closed()
            || self
                .config
                .phy_timeout()
                .is_some_and(|limit| physical.created_at.elapsed() > limit);

        if !must_close && !self.config.test_on_return() {
            self.idle.lock().push_back(physical);
            drop(permit);
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            // No runtime to close or validate on; the last handle to go closes it
            tracing::debug!(
                connection_id = physical.id,
                "closing released connection without runtime"
            );
            self.record_closed(physical.id);
            drop(physical);
            drop(permit);
            return;
        };

        let pool = Arc::clone(self);
        handle.spawn(async move {
            if must_close || !pool.factory.validate(&*physical.connection).await {
                pool.close_physical(physical).await;
            } else {
                pool.idle.lock().push_back(physical);
            }
            drop(permit);
        });
    }

    pub fn stats(&self) -> PoolStats {
        let idle = self.idle.lock().len();
        let active = self.active_count.load(Ordering::SeqCst);
        let waiting = self.waiting_count.load(Ordering::SeqCst);
        PoolStats::new(idle, active, waiting).with_lifetime_counts(
            self.opened_count.load(Ordering::SeqCst),
            self.closed_count.load(Ordering::SeqCst),
        )
    }

    /// Close all idle connections in the pool
    pub async fn close_idle(&self) {
        let connections: Vec<_> = {
            let mut idle = self.idle.lock();
            idle.drain(..).collect()
        };

        for physical in connections {
            self.close_physical(physical).await;
        }
    }

    /// Refuse further borrowing and close idle connections
    ///
    /// Borrowed connections are closed when they come back.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.semaphore.close();
        self.close_idle().await;
        tracing::info!(pool = self.config.name(), "pool closed");
    }

    async fn with_query_timeout<T>(&self, work: impl Future<Output = Result<T>>) -> Result<T> {
        match self.config.query_timeout() {
            Some(limit) => tokio::time::timeout(limit, work)
                .await
                .map_err(|_| DsError::Timeout(format!("statement exceeded queryTimeout {:?}", limit)))?,
            None => work.await,
        }
    }
}

/// Keeps `waiting_count` balanced even when the waiter is dropped
struct WaitingGuard<'a>(&'a AtomicUsize);

impl<'a> WaitingGuard<'a> {
    fn enter(count: &'a AtomicUsize) -> Self {
        count.fetch_add(1, Ordering::SeqCst);
        Self(count)
    }
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A connection borrowed from the pool
///
/// All SQL, including statements from [`PooledConnection::create_statement`],
/// runs through the pool's filter chain. When dropped, the connection is
/// returned to the pool.
pub struct PooledConnection {
    id: u64,
    connection: Arc<dyn Connection>,
    created_at: Instant,
    pool: Arc<ConnectionPool>,
    permit: Option<OwnedSemaphorePermit>,
}

impl PooledConnection {
    /// Pool-assigned id of the physical connection
    pub fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn inner(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    pub fn driver_name(&self) -> &str {
        self.connection.driver_name()
    }

    pub fn is_closed(&self) -> bool {
        self.connection.is_closed()
    }

    /// Create a statement whose SQL is filtered like this connection's
    pub async fn create_statement(&self) -> Result<PooledStatement<'_>> {
        let statement = self.connection.create_statement().await?;
        Ok(PooledStatement {
            conn: self,
            statement,
        })
    }

    pub async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        self.pool.filters.check_statement(sql)?;

        let start = Instant::now();
        let result = self
            .pool
            .with_query_timeout(self.connection.execute(sql, params))
            .await;
        let outcome = match &result {
            Ok(r) => StatementOutcome::Executed {
                affected_rows: r.affected_rows,
            },
            Err(e) => StatementOutcome::Failed(e),
        };
        self.report(StatementKind::Execute, sql, params, start.elapsed(), outcome);
        result
    }

    pub async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.pool.filters.check_statement(sql)?;

        let start = Instant::now();
        let result = self
            .pool
            .with_query_timeout(self.connection.query(sql, params))
            .await;
        let outcome = match &result {
            Ok(r) => StatementOutcome::Queried { rows: r.row_count() },
            Err(e) => StatementOutcome::Failed(e),
        };
        self.report(StatementKind::Query, sql, params, start.elapsed(), outcome);
        result
    }

    fn report(
        &self,
        kind: StatementKind,
        sql: &str,
        params: &[Value],
        elapsed: Duration,
        outcome: StatementOutcome<'_>,
    ) {
        self.pool.filters.statement_executed(&StatementEvent {
            connection_id: self.id,
            kind,
            sql,
            params,
            elapsed,
            outcome,
        });
    }
}

/// A statement bound to a borrowed connection
pub struct PooledStatement<'a> {
    conn: &'a PooledConnection,
    statement: Box<dyn Statement>,
}

impl PooledStatement<'_> {
    pub async fn execute(&self, sql: &str) -> Result<StatementResult> {
        let pool = &self.conn.pool;
        pool.filters.check_statement(sql)?;

        let start = Instant::now();
        let result = pool.with_query_timeout(self.statement.execute(sql)).await;
        let outcome = match &result {
            Ok(r) => StatementOutcome::Executed {
                affected_rows: r.affected_rows,
            },
            Err(e) => StatementOutcome::Failed(e),
        };
        self.conn
            .report(StatementKind::Execute, sql, &[], start.elapsed(), outcome);
        result
    }

    pub async fn close(self) -> Result<()> {
        self.statement.close().await
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(permit) = self.permit.take() {
            let physical = PhysicalConnection {
                id: self.id,
                connection: Arc::clone(&self.connection),
                created_at: self.created_at,
                last_used_at: Instant::now(),
            };
            self.pool.release(physical, permit);
        }
    }
}
