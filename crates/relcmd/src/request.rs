//! Execution requests.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use relcmd_core::{CommandId, ConnectionId, DbConnection};
use relcmd_diagnostics::{
    CommandEventData, CommandSource, ContextInfo, DbCommandMethod, DiagnosticsLogger,
};

use crate::buffered::ReaderColumn;
use crate::connection::RelationalConnection;
use crate::parameter::ParameterValues;

/// Everything one command execution needs besides the command itself.
///
/// Only the connection is required. The logger and the detailed-errors flag
/// default to those configured on the connection.
pub struct CommandParameterObject<'a, D: DbConnection> {
    pub connection: Arc<RelationalConnection<D>>,
    pub parameter_values: Option<&'a ParameterValues>,
    /// Declared shape of the first result set; buffers reader results when set.
    pub reader_columns: Option<&'a [ReaderColumn]>,
    /// Issuing context, used for correlation only.
    pub context: Option<Arc<ContextInfo>>,
    pub logger: Option<Arc<DiagnosticsLogger<D>>>,
    pub detailed_errors_enabled: bool,
    pub command_source: CommandSource,
}

impl<'a, D: DbConnection> CommandParameterObject<'a, D> {
    pub fn new(connection: Arc<RelationalConnection<D>>) -> Self {
        let logger = connection.logger().cloned();
        let detailed_errors_enabled = logger
            .as_ref()
            .is_some_and(|l| l.options().detailed_errors);
        Self {
            connection,
            parameter_values: None,
            reader_columns: None,
            context: None,
            logger,
            detailed_errors_enabled,
            command_source: CommandSource::Unknown,
        }
    }

    pub fn with_parameter_values(mut self, values: &'a ParameterValues) -> Self {
        self.parameter_values = Some(values);
        self
    }

    pub fn with_reader_columns(mut self, columns: &'a [ReaderColumn]) -> Self {
        self.reader_columns = Some(columns);
        self
    }

    pub fn with_context(mut self, context: Arc<ContextInfo>) -> Self {
        self.context = Some(context);
        self
    }

    /// Replace the logger; `None` disables events for this request.
    pub fn with_logger(mut self, logger: Option<Arc<DiagnosticsLogger<D>>>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_detailed_errors(mut self, enabled: bool) -> Self {
        self.detailed_errors_enabled = enabled;
        self
    }

    pub fn with_command_source(mut self, source: CommandSource) -> Self {
        self.command_source = source;
        self
    }
}

impl<D: DbConnection> fmt::Debug for CommandParameterObject<'_, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandParameterObject")
            .field("connection_id", &self.connection.connection_id())
            .field("parameter_values", &self.parameter_values)
            .field("reader_columns", &self.reader_columns)
            .field("context", &self.context)
            .field("has_logger", &self.logger.is_some())
            .field("detailed_errors_enabled", &self.detailed_errors_enabled)
            .field("command_source", &self.command_source)
            .finish()
    }
}

/// Timing and correlation data captured when an execution starts.
#[derive(Debug, Clone)]
pub(crate) struct ExecutionInfo {
    pub(crate) context: Option<Arc<ContextInfo>>,
    pub(crate) connection_id: ConnectionId,
    pub(crate) source: CommandSource,
    pub(crate) start_time: DateTime<Utc>,
    pub(crate) started: Instant,
    pub(crate) is_async: bool,
}

impl ExecutionInfo {
    pub(crate) fn start<D: DbConnection>(request: &CommandParameterObject<'_, D>, is_async: bool) -> Self {
        Self {
            context: request.context.clone(),
            connection_id: request.connection.connection_id(),
            source: request.command_source,
            start_time: Utc::now(),
            started: Instant::now(),
            is_async,
        }
    }

    /// Event payload for this execution. Mints the command id if needed.
    pub(crate) fn event(&self, command_id: &CommandId, method: DbCommandMethod) -> CommandEventData {
        CommandEventData {
            context: self.context.clone(),
            connection_id: self.connection_id,
            command_id: command_id.get(),
            method,
            source: self.source,
            start_time: self.start_time,
            is_async: self.is_async,
        }
    }
}
