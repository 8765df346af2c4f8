//! Event payloads handed to interceptors.
//!
//! Payloads own their data. The native command, reader or error involved in
//! an event is passed to hooks as a separate argument.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use relcmd_core::{ConnectionId, IsolationLevel, TransactionId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who initiated a command. Carried on events for log correlation only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CommandSource {
    #[default]
    Unknown,
    Query,
    SaveChanges,
    Migrations,
    RawQuery,
    ExecuteSql,
    ValueGenerator,
    Scaffolding,
    BulkUpdate,
}

/// Which native execute method a command is created for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DbCommandMethod {
    NonQuery,
    Scalar,
    Reader,
}

impl DbCommandMethod {
    pub const fn as_str(self) -> &'static str {
        match self {
            DbCommandMethod::NonQuery => "ExecuteNonQuery",
            DbCommandMethod::Scalar => "ExecuteScalar",
            DbCommandMethod::Reader => "ExecuteReader",
        }
    }
}

impl fmt::Display for DbCommandMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of the application context that issued a command.
///
/// Only ever logged or passed to interceptors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextInfo {
    pub name: String,
    pub instance_id: Uuid,
}

impl ContextInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instance_id: Uuid::new_v4(),
        }
    }
}

/// Fields shared by every command event of one execution.
#[derive(Debug, Clone)]
pub struct CommandEventData {
    pub context: Option<Arc<ContextInfo>>,
    pub connection_id: ConnectionId,
    pub command_id: Uuid,
    pub method: DbCommandMethod,
    pub source: CommandSource,
    pub start_time: DateTime<Utc>,
    pub is_async: bool,
}

/// A command event raised after an operation finished.
#[derive(Debug, Clone)]
pub struct CommandEndEventData {
    pub event: CommandEventData,
    pub duration: Duration,
}

impl CommandEndEventData {
    pub fn new(event: CommandEventData, duration: Duration) -> Self {
        Self { event, duration }
    }
}

/// A command event raised when creation or execution failed.
#[derive(Debug, Clone)]
pub struct CommandErrorEventData {
    pub event: CommandEventData,
    pub duration: Duration,
}

impl CommandErrorEventData {
    pub fn new(event: CommandEventData, duration: Duration) -> Self {
        Self { event, duration }
    }
}

/// Raised when a data reader is disposed.
#[derive(Debug, Clone)]
pub struct DataReaderDisposingEventData {
    pub event: CommandEventData,
    /// Time since the command started.
    pub duration: Duration,
    pub records_affected: i64,
    /// Rows read through the wrapper.
    pub read_count: u64,
}

/// Raised before a transaction is begun.
#[derive(Debug, Clone)]
pub struct TransactionStartingEventData {
    pub context: Option<Arc<ContextInfo>>,
    pub connection_id: ConnectionId,
    pub transaction_id: TransactionId,
    pub isolation_level: IsolationLevel,
    pub is_async: bool,
    pub start_time: DateTime<Utc>,
}

/// Raised after a transaction has begun.
#[derive(Debug, Clone)]
pub struct TransactionEndEventData {
    pub event: TransactionStartingEventData,
    pub duration: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_names() {
        assert_eq!(DbCommandMethod::NonQuery.to_string(), "ExecuteNonQuery");
        assert_eq!(DbCommandMethod::Scalar.as_str(), "ExecuteScalar");
        assert_eq!(DbCommandMethod::Reader.as_str(), "ExecuteReader");
    }

    #[test]
    fn test_command_source_serde() {
        let json = serde_json::to_string(&CommandSource::SaveChanges).unwrap();
        assert_eq!(json, "\"SaveChanges\"");
        let back: CommandSource = serde_json::from_str(&json).unwrap();
        assert_eq!(back, CommandSource::SaveChanges);
        assert_eq!(CommandSource::default(), CommandSource::Unknown);
    }

    #[test]
    fn test_context_instances_differ() {
        let a = ContextInfo::new("Blogging");
        let b = ContextInfo::new("Blogging");
        assert_eq!(a.name, b.name);
        assert_ne!(a.instance_id, b.instance_id);
    }
}
