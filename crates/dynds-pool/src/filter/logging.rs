//! Statement and connection logging

use std::any::Any;
use std::fmt::Write as _;

use dynds_config::{Bindable, PropertySetter};
use dynds_core::Value;

use super::{Filter, StatementEvent, StatementOutcome};
use crate::PoolConfig;

const TARGET: &str = "dynds::sql";

/// Logging facade a [`LogFilter`] writes to
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString, strum::IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum LogBackend {
    Tracing,
    Log,
}

#[derive(Debug, Clone, Copy)]
enum Level {
    Debug,
    Info,
    Error,
}

/// Writes pool activity to a logging facade
#[derive(Debug)]
pub struct LogFilter {
    backend: LogBackend,
    connection_log_enabled: bool,
    statement_log_enabled: bool,
    statement_executable_sql_log_enable: bool,
    statement_log_error_enabled: bool,
    data_source_log_enabled: bool,
    statement_sql_pretty_format: bool,
}

impl LogFilter {
    pub fn new(backend: LogBackend) -> Self {
        Self {
            backend,
            connection_log_enabled: true,
            statement_log_enabled: true,
            statement_executable_sql_log_enable: false,
            statement_log_error_enabled: true,
            data_source_log_enabled: true,
            statement_sql_pretty_format: false,
        }
    }

    pub fn backend(&self) -> LogBackend {
        self.backend
    }

    pub fn set_connection_log_enabled(&mut self, enabled: bool) {
        self.connection_log_enabled = enabled;
    }

    pub fn set_statement_log_enabled(&mut self, enabled: bool) {
        self.statement_log_enabled = enabled;
    }

    pub fn set_statement_executable_sql_log_enable(&mut self, enabled: bool) {
        self.statement_executable_sql_log_enable = enabled;
    }

    pub fn set_statement_log_error_enabled(&mut self, enabled: bool) {
        self.statement_log_error_enabled = enabled;
    }

    pub fn set_data_source_log_enabled(&mut self, enabled: bool) {
        self.data_source_log_enabled = enabled;
    }

    pub fn set_statement_sql_pretty_format(&mut self, enabled: bool) {
        self.statement_sql_pretty_format = enabled;
    }

    fn emit(&self, level: Level, message: &str) {
        match (self.backend, level) {
            (LogBackend::Tracing, Level::Debug) => tracing::debug!(target: TARGET, "{}", message),
            (LogBackend::Tracing, Level::Info) => tracing::info!(target: TARGET, "{}", message),
            (LogBackend::Tracing, Level::Error) => tracing::error!(target: TARGET, "{}", message),
            (LogBackend::Log, Level::Debug) => log::debug!(target: TARGET, "{}", message),
            (LogBackend::Log, Level::Info) => log::info!(target: TARGET, "{}", message),
            (LogBackend::Log, Level::Error) => log::error!(target: TARGET, "{}", message),
        }
    }

    /// The SQL as it should appear in a log line
    pub fn render_sql(&self, sql: &str, params: &[Value]) -> String {
        let sql = if self.statement_executable_sql_log_enable {
            executable_sql(sql, params)
        } else {
            sql.to_string()
        };

        if self.statement_sql_pretty_format {
            sqlformat::format(
                &sql,
                &sqlformat::QueryParams::None,
                &sqlformat::FormatOptions::default(),
            )
        } else {
            sql
        }
    }
}

/// Inline parameters into `?` and `?N` placeholders
///
/// Placeholders inside quoted text are left alone. Placeholders without a
/// matching parameter stay as written.
pub fn executable_sql(sql: &str, params: &[Value]) -> String {
    if params.is_empty() {
        return sql.to_string();
    }

    let mut out = String::with_capacity(sql.len() + params.len() * 8);
    let mut chars = sql.chars().peekable();
    let mut quote: Option<char> = None;
    let mut next_positional = 0usize;

    while let Some(c) = chars.next() {
        match quote {
            Some(q) => {
                out.push(c);
                if c == q {
                    quote = None;
                }
            }
            None if c == '\'' || c == '"' => {
                quote = Some(c);
                out.push(c);
            }
            None if c == '?' => {
                let mut digits = String::new();
                while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                    digits.push(d);
                    chars.next();
                }
                let index = match digits.parse::<usize>() {
                    Ok(n) => n.checked_sub(1),
                    Err(_) => {
                        next_positional += 1;
                        Some(next_positional - 1)
                    }
                };
                match index.and_then(|i| params.get(i)) {
                    Some(value) => out.push_str(&sql_literal(value)),
                    None => {
                        out.push('?');
                        out.push_str(&digits);
                    }
                }
            }
            None => out.push(c),
        }
    }
    out
}

fn sql_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => (if *b { "1" } else { "0" }).to_string(),
        Value::Int64(i) => i.to_string(),
        Value::Float64(f) => f.to_string(),
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Bytes(bytes) => {
            let mut hex = String::with_capacity(bytes.len() * 2 + 3);
            hex.push_str("X'");
            for b in bytes {
                let _ = write!(hex, "{:02X}", b);
            }
            hex.push('\'');
            hex
        }
    }
}

impl Filter for LogFilter {
    fn name(&self) -> &'static str {
        self.backend.into()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn data_source_initialized(&self, config: &PoolConfig) {
        if self.data_source_log_enabled {
            self.emit(
                Level::Info,
                &format!("{{dataSource-{}}} inited, url: {}", config.name(), config.url()),
            );
        }
    }

    fn connection_opened(&self, connection_id: u64) {
        if self.connection_log_enabled {
            self.emit(Level::Debug, &format!("{{conn-{}}} connected", connection_id));
        }
    }

    fn connection_closed(&self, connection_id: u64) {
        if self.connection_log_enabled {
            self.emit(Level::Debug, &format!("{{conn-{}}} closed", connection_id));
        }
    }

    fn statement_executed(&self, event: &StatementEvent<'_>) {
        match event.outcome {
            StatementOutcome::Failed(error) if self.statement_log_error_enabled => {
                self.emit(
                    Level::Error,
                    &format!(
                        "{{conn-{}}} {} error. {}\n{}",
                        event.connection_id,
                        event.kind,
                        error,
                        self.render_sql(event.sql, event.params)
                    ),
                );
            }
            StatementOutcome::Failed(_) => {}
            _ if self.statement_log_enabled => {
                self.emit(
                    Level::Debug,
                    &format!(
                        "{{conn-{}}} {} {} millis.\n{}",
                        event.connection_id,
                        event.kind,
                        event.elapsed.as_millis(),
                        self.render_sql(event.sql, event.params)
                    ),
                );
            }
            _ => {}
        }
    }
}

impl Bindable for LogFilter {
    fn bind_target() -> &'static str {
        "log"
    }

    fn property_setters() -> Vec<PropertySetter<Self>> {
        vec![
            PropertySetter::new("connectionLogEnabled", LogFilter::set_connection_log_enabled),
            PropertySetter::new("statementLogEnabled", LogFilter::set_statement_log_enabled),
            PropertySetter::new(
                "statementExecutableSqlLogEnable",
                LogFilter::set_statement_executable_sql_log_enable,
            ),
            PropertySetter::new(
                "statementLogErrorEnabled",
                LogFilter::set_statement_log_error_enabled,
            ),
            PropertySetter::new("dataSourceLogEnabled", LogFilter::set_data_source_log_enabled),
            PropertySetter::new(
                "statementSqlPrettyFormat",
                LogFilter::set_statement_sql_pretty_format,
            ),
        ]
    }
}
