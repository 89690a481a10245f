//! Scripted metadata connection for tests
//!
//! Records every statement and answers from a script of failures and
//! warnings. Available in this crate's tests and, with the `test-util`
//! feature, to downstream crates.

use std::collections::VecDeque;

use crate::connection::{MetadataConnection, Row, SqlError, SqlWarning};

#[derive(Debug)]
struct Failure {
    prefix: String,
    error: SqlError,
    /// `None` fails every matching statement
    remaining: Option<usize>,
}

/// In-memory [`MetadataConnection`] driven by a script
#[derive(Debug, Default)]
pub struct ScriptedConnection {
    statements: Vec<String>,
    failures: Vec<Failure>,
    warnings: VecDeque<Vec<SqlWarning>>,
    warnings_error: Option<SqlError>,
    rows: Vec<(String, Vec<Row>)>,
}

impl ScriptedConnection {
    /// Connection that accepts every statement
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` statements starting with `prefix`
    pub fn fail_times(mut self, prefix: &str, times: usize, error: SqlError) -> Self {
        self.failures.push(Failure {
            prefix: prefix.to_string(),
            error,
            remaining: Some(times),
        });
        self
    }

    /// Fail the next statement starting with `prefix`
    pub fn fail_once(self, prefix: &str, error: SqlError) -> Self {
        self.fail_times(prefix, 1, error)
    }

    /// Fail every statement starting with `prefix`
    pub fn fail_always(mut self, prefix: &str, error: SqlError) -> Self {
        self.failures.push(Failure {
            prefix: prefix.to_string(),
            error,
            remaining: None,
        });
        self
    }

    /// Warnings returned by the next `warnings()` call
    pub fn with_warnings(mut self, warnings: Vec<SqlWarning>) -> Self {
        self.warnings.push_back(warnings);
        self
    }

    /// Make every `warnings()` call fail
    pub fn fail_warnings(mut self, error: SqlError) -> Self {
        self.warnings_error = Some(error);
        self
    }

    /// Rows returned by queries starting with `prefix`
    pub fn with_rows(mut self, prefix: &str, rows: Vec<Row>) -> Self {
        self.rows.push((prefix.to_string(), rows));
        self
    }

    /// Every statement received, in order, including failed ones
    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    /// Statements starting with `prefix`
    pub fn matching(&self, prefix: &str) -> Vec<&str> {
        self.statements
            .iter()
            .filter(|s| s.starts_with(prefix))
            .map(String::as_str)
            .collect()
    }

    /// Number of statements starting with `prefix`
    pub fn count(&self, prefix: &str) -> usize {
        self.matching(prefix).len()
    }

    fn run(&mut self, sql: &str) -> Result<(), SqlError> {
        self.statements.push(sql.to_string());
        let failure = self.failures.iter_mut().find(|f| {
            sql.starts_with(&f.prefix) && f.remaining.is_none_or(|remaining| remaining > 0)
        });
        match failure {
            Some(failure) => {
                if let Some(remaining) = failure.remaining.as_mut() {
                    *remaining -= 1;
                }
                Err(failure.error.clone())
            }
            None => Ok(()),
        }
    }
}

impl MetadataConnection for ScriptedConnection {
    fn execute(&mut self, sql: &str) -> Result<(), SqlError> {
        self.run(sql)
    }

    fn query(&mut self, sql: &str) -> Result<Vec<Row>, SqlError> {
        self.run(sql)?;
        Ok(self
            .rows
            .iter()
            .find(|(prefix, _)| sql.starts_with(prefix.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default())
    }

    fn warnings(&mut self) -> Result<Vec<SqlWarning>, SqlError> {
        self.statements.push("SHOW WARNINGS".to_string());
        if let Some(error) = &self.warnings_error {
            return Err(error.clone());
        }
        Ok(self.warnings.pop_front().unwrap_or_default())
    }
}
