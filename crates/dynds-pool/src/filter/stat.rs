//! Per-statement execution statistics

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dynds_config::{Bindable, PropertySetter};
use sqlparser::dialect::{Dialect, GenericDialect, dialect_from_str};
use sqlparser::tokenizer::{Token, Tokenizer};

use super::{Filter, StatementEvent, StatementOutcome};

/// Counters for one SQL text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlStat {
    pub execute_count: u64,
    pub error_count: u64,
    pub slow_count: u64,
    pub total_time: Duration,
    pub max_time: Duration,
    pub affected_rows: u64,
    pub fetched_rows: u64,
}

/// Replace literals with `?` and collapse whitespace
///
/// Statements that differ only in their literal values map to the same text.
/// SQL the tokenizer rejects is returned unchanged.
pub fn merge_sql(sql: &str, db_type: Option<&str>) -> String {
    let dialect: Box<dyn Dialect> = db_type
        .and_then(dialect_from_str)
        .unwrap_or_else(|| Box::new(GenericDialect {}));

    let Ok(tokens) = Tokenizer::new(dialect.as_ref(), sql).tokenize() else {
        return sql.to_string();
    };

    let mut merged = String::with_capacity(sql.len());
    let mut pending_space = false;
    for token in tokens {
        let text = match token {
            Token::Whitespace(_) => {
                pending_space = true;
                continue;
            }
            Token::Number(..) | Token::SingleQuotedString(_) => "?".to_string(),
            other => other.to_string(),
        };
        if pending_space && !merged.is_empty() {
            merged.push(' ');
        }
        pending_space = false;
        merged.push_str(&text);
    }
    merged
}

/// Collects execution counts, timings and connection counts
pub struct StatFilter {
    slow_sql_millis: u64,
    log_slow_sql: bool,
    merge_sql: bool,
    db_type: Option<String>,
    sql_stats: DashMap<String, SqlStat>,
    connections_opened: AtomicU64,
    connections_closed: AtomicU64,
}

impl Default for StatFilter {
    fn default() -> Self {
        Self {
            slow_sql_millis: 3000,
            log_slow_sql: false,
            merge_sql: false,
            db_type: None,
            sql_stats: DashMap::new(),
            connections_opened: AtomicU64::new(0),
            connections_closed: AtomicU64::new(0),
        }
    }
}

impl StatFilter {
    pub fn set_slow_sql_millis(&mut self, millis: u64) {
        self.slow_sql_millis = millis;
    }

    pub fn set_log_slow_sql(&mut self, enabled: bool) {
        self.log_slow_sql = enabled;
    }

    pub fn set_merge_sql(&mut self, enabled: bool) {
        self.merge_sql = enabled;
    }

    pub fn set_db_type(&mut self, db_type: String) {
        self.db_type = Some(db_type);
    }

    pub fn slow_sql_millis(&self) -> u64 {
        self.slow_sql_millis
    }

    pub fn log_slow_sql(&self) -> bool {
        self.log_slow_sql
    }

    pub fn is_merge_sql(&self) -> bool {
        self.merge_sql
    }

    pub fn db_type(&self) -> Option<&str> {
        self.db_type.as_deref()
    }

    fn stat_key(&self, sql: &str) -> String {
        if self.merge_sql {
            merge_sql(sql, self.db_type.as_deref())
        } else {
            sql.to_string()
        }
    }

    /// Statistics for a SQL text, merged the same way executions are
    pub fn sql_stat(&self, sql: &str) -> Option<SqlStat> {
        self.sql_stats
            .get(&self.stat_key(sql))
            .map(|entry| entry.value().clone())
    }

    /// Every tracked SQL text, sorted
    pub fn sql_stats(&self) -> Vec<(String, SqlStat)> {
        let mut stats: Vec<_> = self
            .sql_stats
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        stats.sort_by(|a, b| a.0.cmp(&b.0));
        stats
    }

    pub fn connections_opened(&self) -> u64 {
        self.connections_opened.load(Ordering::Relaxed)
    }

    pub fn connections_closed(&self) -> u64 {
        self.connections_closed.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.sql_stats.clear();
        self.connections_opened.store(0, Ordering::Relaxed);
        self.connections_closed.store(0, Ordering::Relaxed);
    }
}

impl Filter for StatFilter {
    fn name(&self) -> &'static str {
        "stat"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn connection_opened(&self, _connection_id: u64) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    fn connection_closed(&self, _connection_id: u64) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    fn statement_executed(&self, event: &StatementEvent<'_>) {
        let slow = event.elapsed.as_millis() >= u128::from(self.slow_sql_millis);

        {
            let mut stat = self.sql_stats.entry(self.stat_key(event.sql)).or_default();
            stat.execute_count += 1;
            stat.total_time += event.elapsed;
            stat.max_time = stat.max_time.max(event.elapsed);
            match event.outcome {
                StatementOutcome::Executed { affected_rows } => stat.affected_rows += affected_rows,
                StatementOutcome::Queried { rows } => stat.fetched_rows += rows as u64,
                StatementOutcome::Failed(_) => stat.error_count += 1,
            }
            if slow {
                stat.slow_count += 1;
            }
        }

        if slow && self.log_slow_sql {
            tracing::warn!(
                sql = %event.sql,
                elapsed_ms = event.elapsed.as_millis() as u64,
                connection_id = event.connection_id,
                "slow sql"
            );
        }
    }
}

impl Bindable for StatFilter {
    fn bind_target() -> &'static str {
        "stat"
    }

    fn property_setters() -> Vec<PropertySetter<Self>> {
        vec![
            PropertySetter::new("slowSqlMillis", StatFilter::set_slow_sql_millis),
            PropertySetter::new("logSlowSql", StatFilter::set_log_slow_sql),
            PropertySetter::new("mergeSql", StatFilter::set_merge_sql),
            PropertySetter::new("dbType", StatFilter::set_db_type),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::StatementKind;
    use dynds_core::DsError;
    use pretty_assertions::assert_eq;

    fn event<'a>(sql: &'a str, elapsed_ms: u64, outcome: StatementOutcome<'a>) -> StatementEvent<'a> {
        StatementEvent {
            connection_id: 1,
            kind: StatementKind::Query,
            sql,
            params: &[],
            elapsed: Duration::from_millis(elapsed_ms),
            outcome,
        }
    }

    #[test]
    fn test_merge_sql_replaces_literals() {
        assert_eq!(
            merge_sql("SELECT * FROM t WHERE id = 1", None),
            "SELECT * FROM t WHERE id = ?"
        );
        assert_eq!(
            merge_sql("select  name\n from users where name = 'bob' and age > 30", None),
            "select name from users where name = ? and age > ?"
        );
    }

    #[test]
    fn test_merge_sql_with_dialect() {
        assert_eq!(
            merge_sql("SELECT * FROM t WHERE id = 42", Some("sqlite")),
            "SELECT * FROM t WHERE id = ?"
        );
    }

    #[test]
    fn test_merge_groups_statements() {
        let mut filter = StatFilter::default();
        filter.set_merge_sql(true);

        filter.statement_executed(&event(
            "SELECT * FROM t WHERE id = 1",
            2,
            StatementOutcome::Queried { rows: 1 },
        ));
        filter.statement_executed(&event(
            "SELECT * FROM t WHERE id = 2",
            4,
            StatementOutcome::Queried { rows: 0 },
        ));

        let stats = filter.sql_stats();
        assert_eq!(stats.len(), 1);
        let (sql, stat) = &stats[0];
        assert_eq!(sql, "SELECT * FROM t WHERE id = ?");
        assert_eq!(stat.execute_count, 2);
        assert_eq!(stat.fetched_rows, 1);
        assert_eq!(stat.max_time, Duration::from_millis(4));
        assert_eq!(stat.total_time, Duration::from_millis(6));

        assert_eq!(filter.sql_stat("SELECT * FROM t WHERE id = 99"), Some(stat.clone()));
    }

    #[test]
    fn test_without_merge_each_text_is_separate() {
        let filter = StatFilter::default();
        filter.statement_executed(&event("SELECT 1", 0, StatementOutcome::Queried { rows: 1 }));
        filter.statement_executed(&event("SELECT 2", 0, StatementOutcome::Queried { rows: 1 }));
        assert_eq!(filter.sql_stats().len(), 2);
    }

    #[test]
    fn test_errors_and_slow_statements() {
        let mut filter = StatFilter::default();
        filter.set_slow_sql_millis(10);
        let err = DsError::Query("boom".into());

        filter.statement_executed(&event("UPDATE t SET v = 1", 12, StatementOutcome::Failed(&err)));
        filter.statement_executed(&event(
            "UPDATE t SET v = 1",
            3,
            StatementOutcome::Executed { affected_rows: 5 },
        ));

        let stat = filter.sql_stat("UPDATE t SET v = 1").unwrap();
        assert_eq!(stat.execute_count, 2);
        assert_eq!(stat.error_count, 1);
        assert_eq!(stat.slow_count, 1);
        assert_eq!(stat.affected_rows, 5);
    }

    #[test]
    fn test_connection_counters_and_reset() {
        let filter = StatFilter::default();
        filter.connection_opened(1);
        filter.connection_opened(2);
        filter.connection_closed(1);
        assert_eq!(filter.connections_opened(), 2);
        assert_eq!(filter.connections_closed(), 1);

        filter.reset();
        assert_eq!(filter.connections_opened(), 0);
        assert!(filter.sql_stats().is_empty());
    }
}
