//! SQL firewall

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};

use dynds_config::{Bindable, PropertySetter};
use dynds_core::{DsError, Result};
use sqlparser::ast::{ObjectType, Statement};
use sqlparser::dialect::{Dialect, GenericDialect, dialect_from_str};
use sqlparser::parser::Parser;

use super::Filter;

/// What the wall lets through
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WallConfig {
    pub select_allow: bool,
    pub insert_allow: bool,
    pub update_allow: bool,
    pub delete_allow: bool,
    pub merge_allow: bool,
    pub call_allow: bool,
    pub create_table_allow: bool,
    pub alter_table_allow: bool,
    pub drop_table_allow: bool,
    pub truncate_allow: bool,
    /// More than one statement in a single string
    pub multi_statement_allow: bool,
    /// Statements outside the categories above (`SET`, `PRAGMA`, `CREATE INDEX`...)
    pub none_base_statement_allow: bool,
    pub delete_where_none_check: bool,
    pub update_where_none_check: bool,
    /// Reject SQL that does not parse
    pub strict_syntax_check: bool,
    pub log_violation: bool,
    /// Reject violations; when off they are only counted and logged
    pub throw_exception: bool,
    pub db_type: Option<String>,
}

impl Default for WallConfig {
    fn default() -> Self {
        Self {
            select_allow: true,
            insert_allow: true,
            update_allow: true,
            delete_allow: true,
            merge_allow: true,
            call_allow: true,
            create_table_allow: true,
            alter_table_allow: true,
            drop_table_allow: true,
            truncate_allow: true,
            multi_statement_allow: false,
            none_base_statement_allow: false,
            delete_where_none_check: false,
            update_where_none_check: false,
            strict_syntax_check: true,
            log_violation: false,
            throw_exception: true,
            db_type: None,
        }
    }
}

macro_rules! wall_flags {
    ($($setter:ident => $field:ident),* $(,)?) => {
        impl WallConfig {
            $(
                pub fn $setter(&mut self, enabled: bool) {
                    self.$field = enabled;
                }
            )*
        }
    };
}

wall_flags! {
    set_select_allow => select_allow,
    set_insert_allow => insert_allow,
    set_update_allow => update_allow,
    set_delete_allow => delete_allow,
    set_merge_allow => merge_allow,
    set_call_allow => call_allow,
    set_create_table_allow => create_table_allow,
    set_alter_table_allow => alter_table_allow,
    set_drop_table_allow => drop_table_allow,
    set_truncate_allow => truncate_allow,
    set_multi_statement_allow => multi_statement_allow,
    set_none_base_statement_allow => none_base_statement_allow,
    set_delete_where_none_check => delete_where_none_check,
    set_update_where_none_check => update_where_none_check,
    set_strict_syntax_check => strict_syntax_check,
    set_log_violation => log_violation,
    set_throw_exception => throw_exception,
}

impl WallConfig {
    pub fn set_db_type(&mut self, db_type: String) {
        self.db_type = Some(db_type);
    }

    fn dialect(&self) -> Box<dyn Dialect> {
        self.db_type
            .as_deref()
            .and_then(dialect_from_str)
            .unwrap_or_else(|| Box::new(GenericDialect {}))
    }

    /// Why a single parsed statement is not allowed, if it is not
    fn statement_violation(&self, statement: &Statement) -> Option<&'static str> {
        match statement {
            Statement::Query(_) if !self.select_allow => Some("select not allow"),
            Statement::Query(_) => None,
            Statement::Insert(_) if !self.insert_allow => Some("insert not allow"),
            Statement::Insert(_) => None,
            Statement::Update { .. } if !self.update_allow => Some("update not allow"),
            Statement::Update { selection, .. } => (self.update_where_none_check
                && selection.is_none())
            .then_some("update none condition not allow"),
            Statement::Delete(_) if !self.delete_allow => Some("delete not allow"),
            Statement::Delete(delete) => (self.delete_where_none_check
                && delete.selection.is_none())
            .then_some("delete none condition not allow"),
            Statement::Merge { .. } => (!self.merge_allow).then_some("merge not allow"),
            Statement::Call(_) => (!self.call_allow).then_some("call not allow"),
            Statement::CreateTable(_) => {
                (!self.create_table_allow).then_some("create table not allow")
            }
            Statement::AlterTable { .. } => {
                (!self.alter_table_allow).then_some("alter table not allow")
            }
            Statement::Drop {
                object_type: ObjectType::Table,
                ..
            } => (!self.drop_table_allow).then_some("drop table not allow"),
            Statement::Truncate { .. } => (!self.truncate_allow).then_some("truncate not allow"),
            _ => (!self.none_base_statement_allow).then_some("none base statement not allow"),
        }
    }

    /// Why the SQL would be rejected, if it would be
    pub fn violation(&self, sql: &str) -> Option<String> {
        let dialect = self.dialect();
        let statements = match Parser::parse_sql(dialect.as_ref(), sql) {
            Ok(statements) => statements,
            Err(e) if self.strict_syntax_check => return Some(format!("syntax error: {}", e)),
            Err(e) => {
                tracing::debug!(error = %e, "wall skipped unparseable sql");
                return None;
            }
        };

        if statements.len() > 1 && !self.multi_statement_allow {
            return Some("multi-statement not allow".to_string());
        }

        statements
            .iter()
            .find_map(|statement| self.statement_violation(statement))
            .map(str::to_string)
    }
}

impl Bindable for WallConfig {
    fn bind_target() -> &'static str {
        "wall"
    }

    fn property_setters() -> Vec<PropertySetter<Self>> {
        vec![
            PropertySetter::new("selectAllow", WallConfig::set_select_allow),
            PropertySetter::new("insertAllow", WallConfig::set_insert_allow),
            PropertySetter::new("updateAllow", WallConfig::set_update_allow),
            PropertySetter::new("deleteAllow", WallConfig::set_delete_allow),
            PropertySetter::new("mergeAllow", WallConfig::set_merge_allow),
            PropertySetter::new("callAllow", WallConfig::set_call_allow),
            PropertySetter::new("createTableAllow", WallConfig::set_create_table_allow),
            PropertySetter::new("alterTableAllow", WallConfig::set_alter_table_allow),
            PropertySetter::new("dropTableAllow", WallConfig::set_drop_table_allow),
            PropertySetter::new("truncateAllow", WallConfig::set_truncate_allow),
            PropertySetter::new("multiStatementAllow", WallConfig::set_multi_statement_allow),
            PropertySetter::new(
                "noneBaseStatementAllow",
                WallConfig::set_none_base_statement_allow,
            ),
            PropertySetter::new("deleteWhereNoneCheck", WallConfig::set_delete_where_none_check),
            PropertySetter::new("updateWhereNoneCheck", WallConfig::set_update_where_none_check),
            PropertySetter::new("strictSyntaxCheck", WallConfig::set_strict_syntax_check),
            PropertySetter::new("logViolation", WallConfig::set_log_violation),
            PropertySetter::new("throwException", WallConfig::set_throw_exception),
            PropertySetter::new("dbType", WallConfig::set_db_type),
        ]
    }
}

/// Checks every statement against a [`WallConfig`] before it runs
#[derive(Debug, Default)]
pub struct WallFilter {
    config: WallConfig,
    checked: AtomicU64,
    violations: AtomicU64,
}

impl WallFilter {
    pub fn new(config: WallConfig) -> Self {
        Self {
            config,
            checked: AtomicU64::new(0),
            violations: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &WallConfig {
        &self.config
    }

    pub fn checked_count(&self) -> u64 {
        self.checked.load(Ordering::Relaxed)
    }

    pub fn violation_count(&self) -> u64 {
        self.violations.load(Ordering::Relaxed)
    }
}

impl Filter for WallFilter {
    fn name(&self) -> &'static str {
        "wall"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn check_statement(&self, sql: &str) -> Result<()> {
        self.checked.fetch_add(1, Ordering::Relaxed);
        let Some(reason) = self.config.violation(sql) else {
            return Ok(());
        };

        self.violations.fetch_add(1, Ordering::Relaxed);
        if self.config.log_violation {
            tracing::warn!(sql = %sql, reason = %reason, "sql violation");
        }

        if self.config.throw_exception {
            Err(DsError::SqlRejected {
                sql: sql.to_string(),
                reason,
            })
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wall(configure: impl FnOnce(&mut WallConfig)) -> WallFilter {
        let mut config = WallConfig::default();
        configure(&mut config);
        WallFilter::new(config)
    }

    #[test]
    fn test_default_allows_plain_dml() {
        let filter = WallFilter::default();
        for sql in [
            "SELECT * FROM users WHERE id = 1",
            "INSERT INTO users (name) VALUES ('a')",
            "UPDATE users SET name = 'b' WHERE id = 1",
            "DELETE FROM users",
            "CREATE TABLE t (id INTEGER)",
            "DROP TABLE t",
        ] {
            assert!(filter.check_statement(sql).is_ok(), "{sql}");
        }
        assert_eq!(filter.checked_count(), 6);
        assert_eq!(filter.violation_count(), 0);
    }

    #[test]
    fn test_delete_without_where() {
        let filter = wall(|c| c.set_delete_where_none_check(true));

        let err = filter.check_statement("DELETE FROM users").unwrap_err();
        assert!(
            matches!(err, DsError::SqlRejected { reason, .. } if reason == "delete none condition not allow")
        );
        assert!(filter.check_statement("DELETE FROM users WHERE id = 3").is_ok());
    }

    #[test]
    fn test_update_without_where() {
        let filter = wall(|c| c.set_update_where_none_check(true));
        assert!(filter.check_statement("UPDATE users SET active = 0").is_err());
        assert!(filter.check_statement("UPDATE users SET active = 0 WHERE id = 1").is_ok());
    }

    #[test]
    fn test_multi_statement_rejected_by_default() {
        let filter = WallFilter::default();
        let err = filter
            .check_statement("SELECT 1; DROP TABLE users")
            .unwrap_err();
        assert!(matches!(err, DsError::SqlRejected { reason, .. } if reason.contains("multi-statement")));

        let filter = wall(|c| c.set_multi_statement_allow(true));
        assert!(filter.check_statement("SELECT 1; SELECT 2").is_ok());
    }

    #[test]
    fn test_disallowed_kinds() {
        let filter = wall(|c| {
            c.set_drop_table_allow(false);
            c.set_truncate_allow(false);
        });
        assert!(filter.check_statement("DROP TABLE users").is_err());
        assert!(filter.check_statement("TRUNCATE TABLE users").is_err());
        assert_eq!(filter.violation_count(), 2);
    }

    #[test]
    fn test_none_base_statements() {
        let filter = WallFilter::default();
        assert!(filter.check_statement("CREATE INDEX idx ON t (id)").is_err());

        let filter = wall(|c| c.set_none_base_statement_allow(true));
        assert!(filter.check_statement("CREATE INDEX idx ON t (id)").is_ok());
    }

    #[test]
    fn test_syntax_errors() {
        let filter = WallFilter::default();
        let err = filter.check_statement("SELEC oops FROM").unwrap_err();
        assert!(matches!(err, DsError::SqlRejected { reason, .. } if reason.starts_with("syntax error")));

        let filter = wall(|c| c.set_strict_syntax_check(false));
        assert!(filter.check_statement("SELEC oops FROM").is_ok());
    }

    #[test]
    fn test_violations_counted_without_throwing() {
        let filter = wall(|c| {
            c.set_select_allow(false);
            c.set_throw_exception(false);
        });
        assert!(filter.check_statement("SELECT 1").is_ok());
        assert_eq!(filter.violation_count(), 1);
    }
}
