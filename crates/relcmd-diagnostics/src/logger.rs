//! The diagnostics logger.
//!
//! Every event goes through [`DiagnosticsLogger`], which writes a `tracing`
//! record and then folds the registered interceptors in registration order,
//! each one receiving the result of the previous one.
//!
//! Callers ask [`DiagnosticsLogger::should_log_command_create`] and
//! [`DiagnosticsLogger::should_log_command_execute`] before raising command
//! events and skip the event entirely when the answer is `false`.

use std::fmt;
use std::fmt::Write as _;
use std::sync::Arc;

use asupersync::Outcome;
use relcmd_core::mode::from_result;
use relcmd_core::{
    DbCommand, DbConnection, DbParameter, Error, ExecutionMode, ParameterDirection, Result, Value,
    try_outcome,
};

use crate::events::{
    CommandEndEventData, CommandErrorEventData, CommandEventData, DataReaderDisposingEventData,
    TransactionEndEventData, TransactionStartingEventData,
};
use crate::interception::InterceptionResult;
use crate::interceptor::{CommandInterceptor, TransactionInterceptor};
use crate::options::DiagnosticsOptions;

/// Routes command and transaction events to `tracing` and to interceptors.
pub struct DiagnosticsLogger<D: DbConnection> {
    options: DiagnosticsOptions,
    command_interceptors: Vec<Arc<dyn CommandInterceptor<D>>>,
    transaction_interceptors: Vec<Arc<dyn TransactionInterceptor<D>>>,
}

impl<D: DbConnection> fmt::Debug for DiagnosticsLogger<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiagnosticsLogger")
            .field("options", &self.options)
            .field("command_interceptors", &self.command_interceptors.len())
            .field("transaction_interceptors", &self.transaction_interceptors.len())
            .finish()
    }
}

impl<D: DbConnection> Default for DiagnosticsLogger<D> {
    fn default() -> Self {
        Self::new(DiagnosticsOptions::default())
    }
}

impl<D: DbConnection> DiagnosticsLogger<D> {
    pub fn new(options: DiagnosticsOptions) -> Self {
        Self {
            options,
            command_interceptors: Vec::new(),
            transaction_interceptors: Vec::new(),
        }
    }

    pub fn options(&self) -> &DiagnosticsOptions {
        &self.options
    }

    /// Register a command interceptor after the ones already registered.
    pub fn with_command_interceptor(mut self, interceptor: impl CommandInterceptor<D> + 'static) -> Self {
        self.command_interceptors.push(Arc::new(interceptor));
        self
    }

    /// Register a shared command interceptor.
    pub fn add_command_interceptor(&mut self, interceptor: Arc<dyn CommandInterceptor<D>>) {
        self.command_interceptors.push(interceptor);
    }

    pub fn with_transaction_interceptor(
        mut self,
        interceptor: impl TransactionInterceptor<D> + 'static,
    ) -> Self {
        self.transaction_interceptors.push(Arc::new(interceptor));
        self
    }

    pub fn add_transaction_interceptor(&mut self, interceptor: Arc<dyn TransactionInterceptor<D>>) {
        self.transaction_interceptors.push(interceptor);
    }

    /// Whether creating / created events would be observed.
    pub fn should_log_command_create(&self) -> bool {
        self.options.command_create_events
            && (!self.command_interceptors.is_empty()
                || tracing::enabled!(target: "relcmd::command", tracing::Level::DEBUG))
    }

    /// Whether executing / executed / error events would be observed.
    pub fn should_log_command_execute(&self) -> bool {
        self.options.command_execute_events
            && (!self.command_interceptors.is_empty()
                || tracing::enabled!(target: "relcmd::command", tracing::Level::INFO))
    }

    /// Whether transaction events would be observed.
    pub fn should_log_transaction(&self) -> bool {
        !self.transaction_interceptors.is_empty()
            || tracing::enabled!(target: "relcmd::transaction", tracing::Level::DEBUG)
    }

    // ========================================================================
    // Command creation
    // ========================================================================

    pub fn command_creating(&self, event: &CommandEventData) -> Result<InterceptionResult<D::Command>> {
        tracing::debug!(
            target: "relcmd::command",
            command_id = %event.command_id,
            connection_id = %event.connection_id,
            method = event.method.as_str(),
            "Creating DbCommand for '{}'",
            event.method
        );

        let mut result = InterceptionResult::NoResult;
        for interceptor in &self.command_interceptors {
            result = interceptor.command_creating(event, result)?;
        }
        Ok(result)
    }

    pub fn command_created(&self, event: &CommandEndEventData, command: &mut D::Command) -> Result<()> {
        tracing::debug!(
            target: "relcmd::command",
            command_id = %event.event.command_id,
            connection_id = %event.event.connection_id,
            elapsed_ms = event.duration.as_millis(),
            "Created DbCommand for '{}' ({}ms)",
            event.event.method,
            event.duration.as_millis()
        );

        for interceptor in &self.command_interceptors {
            interceptor.command_created(event, command)?;
        }
        Ok(())
    }

    // ========================================================================
    // Command execution
    // ========================================================================

    pub async fn non_query_executing(
        &self,
        mode: ExecutionMode<'_>,
        command: &D::Command,
        event: &CommandEventData,
    ) -> Outcome<InterceptionResult<i64>, Error> {
        self.log_command_executing(command, event);

        let mut result = InterceptionResult::NoResult;
        for interceptor in &self.command_interceptors {
            result = match mode {
                ExecutionMode::Blocking => {
                    try_outcome!(from_result(interceptor.non_query_executing(command, event, result)))
                }
                ExecutionMode::Async(cx) => {
                    if let Some(cancelled) = mode.checkpoint() {
                        return cancelled;
                    }
                    try_outcome!(
                        interceptor
                            .non_query_executing_async(cx, command, event, result)
                            .await
                    )
                }
            };
        }
        Outcome::Ok(result)
    }

    pub async fn non_query_executed(
        &self,
        mode: ExecutionMode<'_>,
        command: &D::Command,
        event: &CommandEndEventData,
        result: i64,
    ) -> Outcome<i64, Error> {
        self.log_command_executed(command, event);

        let mut result = result;
        for interceptor in &self.command_interceptors {
            result = match mode {
                ExecutionMode::Blocking => {
                    try_outcome!(from_result(interceptor.non_query_executed(command, event, result)))
                }
                ExecutionMode::Async(cx) => {
                    if let Some(cancelled) = mode.checkpoint() {
                        return cancelled;
                    }
                    try_outcome!(
                        interceptor
                            .non_query_executed_async(cx, command, event, result)
                            .await
                    )
                }
            };
        }
        Outcome::Ok(result)
    }

    pub async fn scalar_executing(
        &self,
        mode: ExecutionMode<'_>,
        command: &D::Command,
        event: &CommandEventData,
    ) -> Outcome<InterceptionResult<Option<Value>>, Error> {
        self.log_command_executing(command, event);

        let mut result = InterceptionResult::NoResult;
        for interceptor in &self.command_interceptors {
            result = match mode {
                ExecutionMode::Blocking => {
                    try_outcome!(from_result(interceptor.scalar_executing(command, event, result)))
                }
                ExecutionMode::Async(cx) => {
                    if let Some(cancelled) = mode.checkpoint() {
                        return cancelled;
                    }
                    try_outcome!(
                        interceptor
                            .scalar_executing_async(cx, command, event, result)
                            .await
                    )
                }
            };
        }
        Outcome::Ok(result)
    }

    pub async fn scalar_executed(
        &self,
        mode: ExecutionMode<'_>,
        command: &D::Command,
        event: &CommandEndEventData,
        result: Option<Value>,
    ) -> Outcome<Option<Value>, Error> {
        self.log_command_executed(command, event);

        let mut result = result;
        for interceptor in &self.command_interceptors {
            result = match mode {
                ExecutionMode::Blocking => {
                    try_outcome!(from_result(interceptor.scalar_executed(command, event, result)))
                }
                ExecutionMode::Async(cx) => {
                    if let Some(cancelled) = mode.checkpoint() {
                        return cancelled;
                    }
                    try_outcome!(
                        interceptor
                            .scalar_executed_async(cx, command, event, result)
                            .await
                    )
                }
            };
        }
        Outcome::Ok(result)
    }

    pub async fn reader_executing(
        &self,
        mode: ExecutionMode<'_>,
        command: &D::Command,
        event: &CommandEventData,
    ) -> Outcome<InterceptionResult<D::Reader>, Error> {
        self.log_command_executing(command, event);

        let mut result = InterceptionResult::NoResult;
        for interceptor in &self.command_interceptors {
            result = match mode {
                ExecutionMode::Blocking => {
                    try_outcome!(from_result(interceptor.reader_executing(command, event, result)))
                }
                ExecutionMode::Async(cx) => {
                    if let Some(cancelled) = mode.checkpoint() {
                        return cancelled;
                    }
                    try_outcome!(
                        interceptor
                            .reader_executing_async(cx, command, event, result)
                            .await
                    )
                }
            };
        }
        Outcome::Ok(result)
    }

    pub async fn reader_executed(
        &self,
        mode: ExecutionMode<'_>,
        command: &D::Command,
        event: &CommandEndEventData,
        result: D::Reader,
    ) -> Outcome<D::Reader, Error> {
        self.log_command_executed(command, event);

        let mut result = result;
        for interceptor in &self.command_interceptors {
            result = match mode {
                ExecutionMode::Blocking => {
                    try_outcome!(from_result(interceptor.reader_executed(command, event, result)))
                }
                ExecutionMode::Async(cx) => {
                    if let Some(cancelled) = mode.checkpoint() {
                        return cancelled;
                    }
                    try_outcome!(
                        interceptor
                            .reader_executed_async(cx, command, event, result)
                            .await
                    )
                }
            };
        }
        Outcome::Ok(result)
    }

    /// Report a failed or cancelled execution. Interceptors observe only.
    pub async fn command_failed(
        &self,
        mode: ExecutionMode<'_>,
        command: &D::Command,
        event: &CommandErrorEventData,
        error: &Error,
    ) {
        tracing::error!(
            target: "relcmd::command",
            command_id = %event.event.command_id,
            connection_id = %event.event.connection_id,
            method = event.event.method.as_str(),
            elapsed_ms = event.duration.as_millis(),
            error = %error,
            "Failed executing DbCommand ({}ms) [{}]\n{}",
            event.duration.as_millis(),
            self.describe_command(command),
            command.command_text()
        );

        for interceptor in &self.command_interceptors {
            match mode {
                ExecutionMode::Blocking => interceptor.command_failed(command, event, error),
                ExecutionMode::Async(cx) => {
                    interceptor.command_failed_async(cx, command, event, error).await;
                }
            }
        }
    }

    // ========================================================================
    // Data reader
    // ========================================================================

    pub async fn data_reader_disposing(
        &self,
        mode: ExecutionMode<'_>,
        command: &D::Command,
        event: &DataReaderDisposingEventData,
    ) {
        tracing::debug!(
            target: "relcmd::reader",
            command_id = %event.event.command_id,
            connection_id = %event.event.connection_id,
            read_count = event.read_count,
            records_affected = event.records_affected,
            "Closing data reader after {} rows ({}ms)",
            event.read_count,
            event.duration.as_millis()
        );

        for interceptor in &self.command_interceptors {
            match mode {
                ExecutionMode::Blocking => interceptor.data_reader_disposing(command, event),
                ExecutionMode::Async(cx) => {
                    interceptor.data_reader_disposing_async(cx, command, event).await;
                }
            }
        }
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    pub async fn transaction_starting(
        &self,
        mode: ExecutionMode<'_>,
        event: &TransactionStartingEventData,
    ) -> Outcome<InterceptionResult<D::Transaction>, Error> {
        tracing::debug!(
            target: "relcmd::transaction",
            transaction_id = %event.transaction_id,
            connection_id = %event.connection_id,
            isolation_level = ?event.isolation_level,
            "Beginning transaction with isolation level '{:?}'",
            event.isolation_level
        );

        let mut result = InterceptionResult::NoResult;
        for interceptor in &self.transaction_interceptors {
            result = match mode {
                ExecutionMode::Blocking => {
                    try_outcome!(from_result(interceptor.transaction_starting(event, result)))
                }
                ExecutionMode::Async(cx) => {
                    if let Some(cancelled) = mode.checkpoint() {
                        return cancelled;
                    }
                    try_outcome!(interceptor.transaction_starting_async(cx, event, result).await)
                }
            };
        }
        Outcome::Ok(result)
    }

    pub async fn transaction_started(
        &self,
        mode: ExecutionMode<'_>,
        event: &TransactionEndEventData,
        transaction: D::Transaction,
    ) -> Outcome<D::Transaction, Error> {
        tracing::debug!(
            target: "relcmd::transaction",
            transaction_id = %event.event.transaction_id,
            connection_id = %event.event.connection_id,
            elapsed_ms = event.duration.as_millis(),
            "Began transaction with isolation level '{:?}'",
            event.event.isolation_level
        );

        let mut transaction = transaction;
        for interceptor in &self.transaction_interceptors {
            transaction = match mode {
                ExecutionMode::Blocking => {
                    try_outcome!(from_result(interceptor.transaction_started(event, transaction)))
                }
                ExecutionMode::Async(cx) => {
                    try_outcome!(interceptor.transaction_started_async(cx, event, transaction).await)
                }
            };
        }
        Outcome::Ok(transaction)
    }

    // ========================================================================
    // Formatting
    // ========================================================================

    fn log_command_executing(&self, command: &D::Command, event: &CommandEventData) {
        tracing::debug!(
            target: "relcmd::command",
            command_id = %event.command_id,
            connection_id = %event.connection_id,
            method = event.method.as_str(),
            source = ?event.source,
            is_async = event.is_async,
            "Executing DbCommand [{}]\n{}",
            self.describe_command(command),
            command.command_text()
        );
    }

    fn log_command_executed(&self, command: &D::Command, event: &CommandEndEventData) {
        tracing::info!(
            target: "relcmd::command",
            command_id = %event.event.command_id,
            connection_id = %event.event.connection_id,
            method = event.event.method.as_str(),
            source = ?event.event.source,
            elapsed_ms = event.duration.as_millis(),
            "Executed DbCommand ({}ms) [{}]\n{}",
            event.duration.as_millis(),
            self.describe_command(command),
            command.command_text()
        );
    }

    /// `Parameters=[..], CommandTimeout='..'` summary of a native command.
    pub fn describe_command(&self, command: &D::Command) -> String {
        let mut out = format!(
            "Parameters=[{}]",
            format_parameters(command.parameters(), self.options.sensitive_data_logging)
        );
        if let Some(timeout) = command.command_timeout() {
            let _ = write!(out, ", CommandTimeout='{}'", timeout.as_secs());
        }
        out
    }
}

/// Render native parameters for log output.
///
/// Values are shown only when `sensitive` is set; otherwise each value is
/// replaced by `'?'`.
pub fn format_parameters(parameters: &[DbParameter], sensitive: bool) -> String {
    let mut out = String::new();
    for (i, parameter) in parameters.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(&parameter.name);
        out.push('=');
        if sensitive {
            out.push_str(&parameter.value.to_log_string());
        } else {
            out.push_str("'?'");
        }

        let mut facets = Vec::new();
        if let Some(db_type) = parameter.db_type {
            facets.push(format!("DbType = {db_type}"));
        }
        if let Some(size) = parameter.size {
            facets.push(format!("Size = {size}"));
        }
        if parameter.direction != ParameterDirection::Input {
            facets.push(format!("Direction = {:?}", parameter.direction));
        }
        if !parameter.is_nullable {
            facets.push("Nullable = false".to_string());
        }
        if !facets.is_empty() {
            let _ = write!(out, " ({})", facets.join(", "));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use relcmd_core::DbType;

    #[test]
    fn test_format_parameters_hides_values() {
        let params = vec![
            DbParameter::new("@p0", 5).with_db_type(DbType::Int32),
            DbParameter::new("@p1", "secret")
                .with_db_type(DbType::String)
                .with_size(64)
                .with_nullable(false),
        ];
        assert_eq!(
            format_parameters(&params, false),
            "@p0='?' (DbType = Int32), @p1='?' (DbType = String, Size = 64, Nullable = false)"
        );
    }

    #[test]
    fn test_format_parameters_sensitive() {
        let params = vec![
            DbParameter::new("@p0", 5),
            DbParameter::new("@p1", Value::Null)
                .with_direction(ParameterDirection::Output),
            DbParameter::new("@p2", "a"),
        ];
        assert_eq!(
            format_parameters(&params, true),
            "@p0=5, @p1=NULL (Direction = Output), @p2='a'"
        );
    }

    #[test]
    fn test_format_no_parameters() {
        assert_eq!(format_parameters(&[], true), "");
    }
}
