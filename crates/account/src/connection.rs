//! Connection boundary to the cluster metadata server

use thiserror::Error;

/// One result row; `None` is SQL NULL
pub type Row = Vec<Option<String>>;

/// Error reported by the server for a statement
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} ({code})")]
pub struct SqlError {
    /// Server error code, e.g. 1819
    pub code: u16,
    /// Five character SQLSTATE
    pub sql_state: String,
    /// Server message text
    pub message: String,
}

impl SqlError {
    /// Build an error from its parts
    pub fn new(code: u16, sql_state: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            sql_state: sql_state.into(),
            message: message.into(),
        }
    }
}

/// One row of `SHOW WARNINGS`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlWarning {
    /// `Note`, `Warning` or `Error`
    pub level: String,
    /// Server warning code, e.g. 3163
    pub code: u16,
    /// Server message text
    pub message: String,
}

impl SqlWarning {
    /// `Note` level warning
    pub fn note(code: u16, message: impl Into<String>) -> Self {
        Self {
            level: "Note".to_string(),
            code,
            message: message.into(),
        }
    }
}

/// Connected, authenticated session on the metadata server
///
/// Implementations block until the server answers. Statements may carry the
/// account password, so implementations must not log them.
pub trait MetadataConnection {
    /// Execute a statement that returns no rows
    fn execute(&mut self, sql: &str) -> Result<(), SqlError>;

    /// Execute a statement and collect its rows
    fn query(&mut self, sql: &str) -> Result<Vec<Row>, SqlError>;

    /// Warnings left by the last statement
    fn warnings(&mut self) -> Result<Vec<SqlWarning>, SqlError>;
}

impl<C: MetadataConnection + ?Sized> MetadataConnection for &mut C {
    fn execute(&mut self, sql: &str) -> Result<(), SqlError> {
        (**self).execute(sql)
    }

    fn query(&mut self, sql: &str) -> Result<Vec<Row>, SqlError> {
        (**self).query(sql)
    }

    fn warnings(&mut self) -> Result<Vec<SqlWarning>, SqlError> {
        (**self).warnings()
    }
}
