//! Connection and statement interception
//!
//! A [`FilterChain`] is attached to a pool before it starts. Every filter sees
//! physical connections opening and closing, may veto a statement before it
//! runs, and is told how each statement went. Filters run in chain order.

mod logging;
mod stat;
mod wall;

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use dynds_core::{DsError, Result, Value};

use crate::PoolConfig;

pub use logging::{LogBackend, LogFilter, executable_sql};
pub use stat::{SqlStat, StatFilter, merge_sql};
pub use wall::{WallConfig, WallFilter};

/// Which connection method ran the statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum StatementKind {
    Execute,
    Query,
}

/// How a statement finished
#[derive(Debug, Clone, Copy)]
pub enum StatementOutcome<'a> {
    Executed { affected_rows: u64 },
    Queried { rows: usize },
    Failed(&'a DsError),
}

impl StatementOutcome<'_> {
    pub fn is_error(&self) -> bool {
        matches!(self, StatementOutcome::Failed(_))
    }
}

/// A finished statement as reported to filters
#[derive(Debug, Clone, Copy)]
pub struct StatementEvent<'a> {
    pub connection_id: u64,
    pub kind: StatementKind,
    pub sql: &'a str,
    pub params: &'a [Value],
    pub elapsed: Duration,
    pub outcome: StatementOutcome<'a>,
}

/// Interceptor attached to a pool
pub trait Filter: Send + Sync + 'static {
    /// Registered filter name, e.g. `stat`
    fn name(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;

    /// Called once when the owning pool has been initialized
    fn data_source_initialized(&self, _config: &PoolConfig) {}

    fn connection_opened(&self, _connection_id: u64) {}

    fn connection_closed(&self, _connection_id: u64) {}

    /// Veto a statement before it reaches the database
    fn check_statement(&self, _sql: &str) -> Result<()> {
        Ok(())
    }

    fn statement_executed(&self, _event: &StatementEvent<'_>) {}
}

/// Ordered list of filters
#[derive(Clone, Default)]
pub struct FilterChain {
    filters: Vec<Arc<dyn Filter>>,
}

impl FilterChain {
    pub fn new(filters: Vec<Arc<dyn Filter>>) -> Self {
        Self { filters }
    }

    pub fn push(&mut self, filter: Arc<dyn Filter>) {
        self.filters.push(filter);
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Filter>> {
        self.filters.iter()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    /// First filter of the given concrete type
    pub fn find<F: Filter>(&self) -> Option<&F> {
        self.filters
            .iter()
            .find_map(|f| f.as_any().downcast_ref::<F>())
    }

    pub(crate) fn data_source_initialized(&self, config: &PoolConfig) {
        for filter in &self.filters {
            filter.data_source_initialized(config);
        }
    }

    pub(crate) fn connection_opened(&self, connection_id: u64) {
        for filter in &self.filters {
            filter.connection_opened(connection_id);
        }
    }

    pub(crate) fn connection_closed(&self, connection_id: u64) {
        for filter in &self.filters {
            filter.connection_closed(connection_id);
        }
    }

    /// Stops at the first rejection
    pub(crate) fn check_statement(&self, sql: &str) -> Result<()> {
        self.filters
            .iter()
            .try_for_each(|filter| filter.check_statement(sql))
    }

    pub(crate) fn statement_executed(&self, event: &StatementEvent<'_>) {
        for filter in &self.filters {
            filter.statement_executed(event);
        }
    }
}

impl std::fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl From<Vec<Arc<dyn Filter>>> for FilterChain {
    fn from(filters: Vec<Arc<dyn Filter>>) -> Self {
        Self::new(filters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Recording {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        reject: bool,
    }

    impl Filter for Recording {
        fn name(&self) -> &'static str {
            self.name
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn connection_opened(&self, connection_id: u64) {
            self.log.lock().push(format!("{}:open:{}", self.name, connection_id));
        }

        fn check_statement(&self, sql: &str) -> Result<()> {
            self.log.lock().push(format!("{}:check", self.name));
            if self.reject {
                return Err(DsError::SqlRejected {
                    sql: sql.to_string(),
                    reason: self.name.to_string(),
                });
            }
            Ok(())
        }
    }

    fn recording_chain(entries: &[(&'static str, bool)]) -> (FilterChain, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let filters = entries
            .iter()
            .map(|&(name, reject)| {
                Arc::new(Recording {
                    name,
                    log: log.clone(),
                    reject,
                }) as Arc<dyn Filter>
            })
            .collect::<Vec<_>>();
        (FilterChain::new(filters), log)
    }

    #[test]
    fn test_events_follow_chain_order() {
        let (chain, log) = recording_chain(&[("a", false), ("b", false)]);
        chain.connection_opened(7);
        assert_eq!(*log.lock(), vec!["a:open:7", "b:open:7"]);
        assert_eq!(chain.names(), vec!["a", "b"]);
    }

    #[test]
    fn test_first_rejection_stops_the_chain() {
        let (chain, log) = recording_chain(&[("a", true), ("b", false)]);
        let err = chain.check_statement("DELETE FROM t").unwrap_err();
        assert!(matches!(err, DsError::SqlRejected { reason, .. } if reason == "a"));
        assert_eq!(*log.lock(), vec!["a:check"]);
    }

    #[test]
    fn test_find_by_type() {
        let mut chain = FilterChain::default();
        assert!(chain.find::<StatFilter>().is_none());
        chain.push(Arc::new(StatFilter::default()));
        assert!(chain.find::<StatFilter>().is_some());
        assert!(chain.find::<WallFilter>().is_none());
    }
}
