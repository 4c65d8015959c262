use crate::Value;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DbError>;

/// Database operation errors.
///
/// Every public surface returns this closed set. Structural problems are
/// detected before any I/O and reported as `BadArgument`; everything the
/// driver reports is wrapped in a `DriverFailure` carrying the originating
/// SQL text and parameter list for diagnostics.
#[derive(Debug, Error)]
pub enum DbError {
    /// Malformed structured arguments (empty VALUES, unknown ORDER direction,
    /// an operation a lazy transaction does not permit, and the like).
    #[error("bad argument: {0}")]
    BadArgument(String),

    /// Operation on a closed Database or Transaction.
    #[error("database is closed")]
    NotOpen,

    /// Any error returned by the driver.
    #[error("{0}")]
    Driver(DriverFailure),

    /// A constraint was violated (unique, foreign key, check, not null).
    #[error("constraint violation: {0}")]
    Integrity(DriverFailure),

    /// Caller-raised rollback signal. Honored within a transaction scope,
    /// where it forces rollback and is suppressed on scope exit.
    #[error("rollback requested")]
    Rollback,
}

impl DbError {
    pub fn bad_argument(msg: impl Into<String>) -> Self {
        Self::BadArgument(msg.into())
    }

    pub fn driver(msg: impl Into<String>) -> Self {
        Self::Driver(DriverFailure::new(msg))
    }

    pub fn integrity(msg: impl Into<String>) -> Self {
        Self::Integrity(DriverFailure::new(msg))
    }

    /// Attach the statement that produced a driver failure.
    pub fn with_statement(self, sql: &str, params: &[Value]) -> Self {
        match self {
            Self::Driver(f) => Self::Driver(f.with_statement(sql, params)),
            Self::Integrity(f) => Self::Integrity(f.with_statement(sql, params)),
            other => other,
        }
    }

    /// Access the structured failure information, if the variant carries one.
    pub fn failure(&self) -> Option<&DriverFailure> {
        match self {
            Self::Driver(f) | Self::Integrity(f) => Some(f),
            Self::BadArgument(_) | Self::NotOpen | Self::Rollback => None,
        }
    }

    pub fn is_integrity(&self) -> bool {
        matches!(self, Self::Integrity(_))
    }
}

/// Driver failure with the originating statement attached.
#[derive(Debug, Clone, Default)]
pub struct DriverFailure {
    /// Primary error message as reported by the driver.
    pub message: String,

    /// Error code from the database (SQLSTATE, SQLite extended code).
    pub code: Option<String>,

    /// SQL text of the failing statement, if any.
    pub sql: Option<String>,

    /// Positional parameters bound to the failing statement.
    pub params: Vec<Value>,
}

impl DriverFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_statement(mut self, sql: &str, params: &[Value]) -> Self {
        self.sql = Some(sql.to_string());
        self.params = params.to_vec();
        self
    }
}

impl std::fmt::Display for DriverFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;

        if let Some(ref code) = self.code {
            write!(f, " [{}]", code)?;
        }

        if let Some(ref sql) = self.sql {
            write!(f, " (sql: {}", sql)?;
            if !self.params.is_empty() {
                let rendered: Vec<String> = self
                    .params
                    .iter()
                    .map(|p| p.as_display_string_truncated(80))
                    .collect();
                write!(f, ", params: [{}]", rendered.join(", "))?;
            }
            write!(f, ")")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_failure_carries_statement() {
        let err = DbError::driver("boom").with_statement("SELECT ?", &[Value::Int(1)]);
        let failure = err.failure().unwrap();
        assert_eq!(failure.sql.as_deref(), Some("SELECT ?"));
        assert_eq!(failure.params, vec![Value::Int(1)]);
        assert!(err.to_string().contains("SELECT ?"));
    }

    #[test]
    fn integrity_is_classified() {
        assert!(DbError::integrity("UNIQUE constraint failed").is_integrity());
        assert!(!DbError::driver("syntax error").is_integrity());
    }
}
