//! Error types shared by drivers and the execution engine.
//!
//! Every failure surfaced by `relcmd` is an [`Error`]. Variants carry a
//! structured payload with a `kind` so callers can branch without parsing
//! messages.

use std::error::Error as StdError;
use std::fmt;

/// Boxed error source carried by payloads that wrap a driver error.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Result alias used by the blocking API.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for all relcmd operations.
#[derive(Debug)]
pub enum Error {
    /// Opening, closing or otherwise managing the connection failed.
    Connection(ConnectionError),
    /// The native command failed, was cancelled, or timed out.
    Command(CommandError),
    /// A declared parameter could not be bound.
    Parameter(ParameterError),
    /// Reading from a result cursor failed.
    Reader(ReaderError),
    /// A transaction operation failed or was used in the wrong state.
    Transaction(TransactionError),
    /// Anything else, usually raised by an interceptor.
    Custom(String),
}

/// Connection error payload.
#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    pub source: Option<BoxError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    Open,
    Close,
    /// Driver reported the connection as broken.
    Broken,
}

/// Command error payload.
#[derive(Debug)]
pub struct CommandError {
    pub kind: CommandErrorKind,
    pub message: String,
    /// Command text, when known.
    pub sql: Option<String>,
    pub source: Option<BoxError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandErrorKind {
    /// The database rejected or failed the command.
    Database,
    /// The command exceeded its timeout.
    Timeout,
    /// The caller cancelled the execution.
    Cancelled,
    /// Building the native command failed.
    Create,
}

/// Parameter binding error payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterError {
    pub kind: ParameterErrorKind,
    /// Invariant name of the offending parameter.
    pub parameter: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterErrorKind {
    /// No value was supplied for a declared parameter.
    Missing,
    /// The supplied value has the wrong shape (e.g. composite arity).
    Mismatch,
    /// The parameter name is not a valid identifier.
    InvalidName,
    /// The same invariant name was declared twice.
    Duplicate,
}

/// Reader error payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderError {
    pub kind: ReaderErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderErrorKind {
    /// The reader is not open.
    Closed,
    /// No current row.
    NoRow,
    /// Ordinal outside the current result set.
    OrdinalOutOfRange,
    /// A column declared non-nullable returned NULL.
    NullValue,
    /// A value did not match the declared column type.
    TypeMismatch,
}

/// Transaction error payload.
#[derive(Debug)]
pub struct TransactionError {
    pub kind: TransactionErrorKind,
    pub message: String,
    pub source: Option<BoxError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionErrorKind {
    /// A transaction is already active on the connection.
    AlreadyStarted,
    /// The transaction was already committed, rolled back or disposed.
    Completed,
    Begin,
    Commit,
    Rollback,
}

impl Error {
    /// Build the error reported when a declared parameter has no value.
    pub fn missing_parameter(invariant_name: impl Into<String>) -> Self {
        let parameter = invariant_name.into();
        Error::Parameter(ParameterError {
            kind: ParameterErrorKind::Missing,
            message: format!("No value provided for required parameter '{parameter}'."),
            parameter,
        })
    }

    /// Build a connection error without a source.
    pub fn connection(kind: ConnectionErrorKind, message: impl Into<String>) -> Self {
        Error::Connection(ConnectionError {
            kind,
            message: message.into(),
            source: None,
        })
    }

    /// Build a reader error.
    pub fn reader(kind: ReaderErrorKind, message: impl Into<String>) -> Self {
        Error::Reader(ReaderError {
            kind,
            message: message.into(),
        })
    }

    /// Build a command error without a source.
    pub fn command(kind: CommandErrorKind, message: impl Into<String>) -> Self {
        Error::Command(CommandError {
            kind,
            message: message.into(),
            sql: None,
            source: None,
        })
    }

    /// Build a transaction error without a source.
    pub fn transaction(kind: TransactionErrorKind, message: impl Into<String>) -> Self {
        Error::Transaction(TransactionError {
            kind,
            message: message.into(),
            source: None,
        })
    }

    /// Error reported to observers when an execution was cancelled.
    pub fn cancelled(reason: &impl fmt::Debug) -> Self {
        Error::command(CommandErrorKind::Cancelled, format!("Cancelled: {reason:?}"))
    }

    /// Whether this error represents a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Error::Command(CommandError {
                kind: CommandErrorKind::Cancelled,
                ..
            })
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(e) => write!(f, "connection error: {}", e.message),
            Error::Command(e) => match &e.sql {
                Some(sql) => write!(f, "command error: {} (sql: {})", e.message, sql),
                None => write!(f, "command error: {}", e.message),
            },
            Error::Parameter(e) => write!(f, "parameter error: {}", e.message),
            Error::Reader(e) => write!(f, "reader error: {}", e.message),
            Error::Transaction(e) => write!(f, "transaction error: {}", e.message),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        let source = match self {
            Error::Connection(e) => e.source.as_ref(),
            Error::Command(e) => e.source.as_ref(),
            Error::Transaction(e) => e.source.as_ref(),
            Error::Parameter(_) | Error::Reader(_) | Error::Custom(_) => None,
        };
        source.map(|s| s.as_ref() as &(dyn StdError + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_parameter_names_parameter() {
        let err = Error::missing_parameter("p0");
        match &err {
            Error::Parameter(p) => {
                assert_eq!(p.kind, ParameterErrorKind::Missing);
                assert_eq!(p.parameter, "p0");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(
            err.to_string(),
            "parameter error: No value provided for required parameter 'p0'."
        );
    }

    #[test]
    fn test_cancelled_is_detected() {
        let err = Error::cancelled(&"deadline");
        assert!(err.is_cancelled());
        assert!(!Error::Custom("x".into()).is_cancelled());
    }

    #[test]
    fn test_source_is_exposed() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        let err = Error::Connection(ConnectionError {
            kind: ConnectionErrorKind::Broken,
            message: "lost".into(),
            source: Some(Box::new(io)),
        });
        assert!(err.source().is_some());
        assert_eq!(err.to_string(), "connection error: lost");
    }
}
