//! Relational command execution.
//!
//! A [`RelationalCommand`] is a fixed command text plus its declared
//! parameters. Each execution:
//!
//! 1. checks that every declared parameter has a value, before anything
//!    native is touched;
//! 2. creates the native command (raising creating / created events) and
//!    applies text, ambient transaction, timeout and parameters;
//! 3. opens the connection;
//! 4. raises executing, runs the native call unless an interceptor supplied
//!    a result, and raises executed, whose result is the one returned;
//! 5. on failure or cancellation raises the error event and cleans up;
//! 6. clears the native parameters, disposes the native command and closes
//!    the connection. Reader executions hand this last step to the reader.
//!
//! Events are only raised when the request's logger reports them enabled.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use asupersync::{Cx, Outcome};
use relcmd_core::mode::{complete_blocking, from_result};
use relcmd_core::{
    CommandId, DbCommand, DbConnection, Error, ExecutionMode, Result, Value, try_outcome,
};
use relcmd_diagnostics::{
    CommandEndEventData, CommandErrorEventData, DbCommandMethod, DiagnosticsLogger,
    InterceptionResult,
};

use crate::buffered::BufferedDataReader;
use crate::connection::RelationalConnection;
use crate::execute::{CommandExecution, NonQuery, Reader, Scalar};
use crate::parameter::{ParameterValues, RelationalParameter};
use crate::reader::{DataCursor, RelationalDataReader};
use crate::request::{CommandParameterObject, ExecutionInfo};

/// Source of command text and parameters for [`RelationalCommand::populate_from`].
pub trait RelationalCommandTemplate {
    fn shared_text(&self) -> Arc<str>;

    fn shared_parameters(&self) -> Arc<[RelationalParameter]>;
}

/// A command shape that can be executed repeatedly with different values.
pub struct RelationalCommand<D: DbConnection> {
    command_text: Arc<str>,
    parameters: Arc<[RelationalParameter]>,
    reader: Option<RelationalDataReader<D>>,
}

/// A finished native call whose command still needs cleaning up.
struct Execution<D: DbConnection, T> {
    output: T,
    command: D::Command,
    command_id: CommandId,
    info: ExecutionInfo,
}

impl<D: DbConnection> RelationalCommand<D> {
    pub fn new(command_text: impl Into<Arc<str>>, parameters: Vec<RelationalParameter>) -> Self {
        Self {
            command_text: command_text.into(),
            parameters: parameters.into(),
            reader: None,
        }
    }

    pub fn command_text(&self) -> &str {
        &self.command_text
    }

    pub fn parameters(&self) -> &[RelationalParameter] {
        &self.parameters
    }

    /// Take text and parameters from `template`. The reusable reader is kept.
    pub fn populate_from(&mut self, template: &impl RelationalCommandTemplate) {
        self.command_text = template.shared_text();
        self.parameters = template.shared_parameters();
    }

    /// The reader left by the last reader execution.
    pub fn reader(&self) -> Option<&RelationalDataReader<D>> {
        self.reader.as_ref()
    }

    pub fn reader_mut(&mut self) -> Option<&mut RelationalDataReader<D>> {
        self.reader.as_mut()
    }

    /// Fail with a missing-parameter error for the first declared parameter
    /// that has no value.
    pub fn validate_parameter_values(&self, values: Option<&ParameterValues>) -> Result<()> {
        let Some(first) = self.parameters.first() else {
            return Ok(());
        };
        let Some(values) = values else {
            return Err(Error::missing_parameter(first.invariant_name()));
        };
        match self
            .parameters
            .iter()
            .find(|p| !values.contains_key(p.invariant_name()))
        {
            Some(missing) => Err(Error::missing_parameter(missing.invariant_name())),
            None => Ok(()),
        }
    }

    // ========================================================================
    // Public execution API
    // ========================================================================

    pub fn execute_non_query(&self, request: &CommandParameterObject<'_, D>) -> Result<i64> {
        complete_blocking(self.execute_and_cleanup::<NonQuery>(ExecutionMode::Blocking, request))
    }

    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn execute_non_query_async(
        &self,
        cx: &Cx,
        request: &CommandParameterObject<'_, D>,
    ) -> Outcome<i64, Error> {
        self.execute_and_cleanup::<NonQuery>(ExecutionMode::Async(cx), request)
            .await
    }

    /// `None` when the command returned no rows, `Some(Value::Null)` when the
    /// first cell was NULL.
    pub fn execute_scalar(&self, request: &CommandParameterObject<'_, D>) -> Result<Option<Value>> {
        complete_blocking(self.execute_and_cleanup::<Scalar>(ExecutionMode::Blocking, request))
    }

    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn execute_scalar_async(
        &self,
        cx: &Cx,
        request: &CommandParameterObject<'_, D>,
    ) -> Outcome<Option<Value>, Error> {
        self.execute_and_cleanup::<Scalar>(ExecutionMode::Async(cx), request)
            .await
    }

    /// Execute and return the command's reusable reader.
    ///
    /// The reader holds the native command and an open on the connection
    /// until it is disposed. The returned borrow must end before the command
    /// is executed again.
    pub fn execute_reader(
        &mut self,
        request: &CommandParameterObject<'_, D>,
    ) -> Result<&mut RelationalDataReader<D>> {
        complete_blocking(self.execute_reader_with(ExecutionMode::Blocking, request))
    }

    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn execute_reader_async(
        &mut self,
        cx: &Cx,
        request: &CommandParameterObject<'_, D>,
    ) -> Outcome<&mut RelationalDataReader<D>, Error> {
        self.execute_reader_with(ExecutionMode::Async(cx), request)
            .await
    }

    /// Create and configure a native command for `request`.
    ///
    /// Raises creating / created when enabled; a creating interceptor may
    /// supply the command, in which case the driver is not asked for one.
    /// If the created hook or parameter binding fails, the error event is
    /// raised and the command disposed before the error is returned.
    pub fn create_db_command(
        &self,
        request: &CommandParameterObject<'_, D>,
        command_id: &CommandId,
        method: DbCommandMethod,
    ) -> Result<D::Command> {
        complete_blocking(self.create_command_with(ExecutionMode::Blocking, request, command_id, method))
    }

    // ========================================================================
    // Executor
    // ========================================================================

    async fn create_command_with(
        &self,
        mode: ExecutionMode<'_>,
        request: &CommandParameterObject<'_, D>,
        command_id: &CommandId,
        method: DbCommandMethod,
    ) -> Outcome<D::Command, Error> {
        let connection = &request.connection;
        let info = ExecutionInfo::start(request, mode.is_async());
        let logger = request.logger.as_deref();
        let failure_logger = logger.filter(|logger| {
            logger.should_log_command_create() || logger.should_log_command_execute()
        });

        let mut command = match logger.filter(|logger| logger.should_log_command_create()) {
            Some(logger) => {
                let event = info.event(command_id, method);
                let mut command = match try_outcome!(from_result(logger.command_creating(&event))) {
                    InterceptionResult::HasResult(command) => command,
                    InterceptionResult::NoResult => {
                        try_outcome!(from_result(connection.db().create_command()))
                    }
                };
                let end = CommandEndEventData::new(event, info.started.elapsed());
                if let Err(e) = logger.command_created(&end, &mut command) {
                    abandon_command(mode, failure_logger, connection, command, command_id, &info, method, &e, false)
                        .await;
                    return Outcome::Err(e);
                }
                command
            }
            None => try_outcome!(from_result(connection.db().create_command())),
        };

        command.set_command_text(&self.command_text);
        if let Some(transaction) = connection.current_transaction() {
            command.set_transaction(Some(transaction));
        }
        if let Some(timeout) = connection.command_timeout() {
            command.set_command_timeout(timeout);
        }

        if let Err(e) = self.bind_parameters(&mut command, request.parameter_values) {
            abandon_command(mode, failure_logger, connection, command, command_id, &info, method, &e, false)
                .await;
            return Outcome::Err(e);
        }
        Outcome::Ok(command)
    }

    fn bind_parameters(&self, command: &mut D::Command, values: Option<&ParameterValues>) -> Result<()> {
        let Some(first) = self.parameters.first() else {
            return Ok(());
        };
        let values = values.ok_or_else(|| Error::missing_parameter(first.invariant_name()))?;
        for parameter in self.parameters.iter() {
            parameter.bind(command, values)?;
        }
        Ok(())
    }

    async fn execute_and_cleanup<K: CommandExecution<D>>(
        &self,
        mode: ExecutionMode<'_>,
        request: &CommandParameterObject<'_, D>,
    ) -> Outcome<K::Output, Error> {
        let execution = try_outcome!(self.execute_command::<K>(mode, request).await);
        try_outcome!(cleanup_command(mode, &request.connection, execution.command).await);
        Outcome::Ok(execution.output)
    }

    async fn execute_reader_with(
        &mut self,
        mode: ExecutionMode<'_>,
        request: &CommandParameterObject<'_, D>,
    ) -> Outcome<&mut RelationalDataReader<D>, Error> {
        let Execution {
            output: native,
            command,
            command_id,
            info,
        } = try_outcome!(self.execute_command::<Reader>(mode, request).await);

        let cursor = match request.reader_columns {
            None => DataCursor::Native(native),
            Some(columns) => {
                let buffered = BufferedDataReader::load(
                    mode,
                    native,
                    columns,
                    request.detailed_errors_enabled,
                )
                .await;
                match buffered {
                    Outcome::Ok(buffered) => DataCursor::Buffered(buffered),
                    Outcome::Err(e) => {
                        discard_command(mode, &request.connection, command).await;
                        return Outcome::Err(e);
                    }
                    Outcome::Cancelled(r) => {
                        discard_command(mode, &request.connection, command).await;
                        return Outcome::Cancelled(r);
                    }
                    Outcome::Panicked(p) => {
                        discard_command(mode, &request.connection, command).await;
                        return Outcome::Panicked(p);
                    }
                }
            }
        };

        let reader = self.reader.get_or_insert_with(RelationalDataReader::new);
        reader
            .initialize(
                mode,
                Arc::clone(&request.connection),
                command,
                cursor,
                command_id,
                request.logger.clone(),
                info,
            )
            .await;
        Outcome::Ok(reader)
    }

    /// Steps 1-5: everything up to and including the executed event.
    async fn execute_command<K: CommandExecution<D>>(
        &self,
        mode: ExecutionMode<'_>,
        request: &CommandParameterObject<'_, D>,
    ) -> Outcome<Execution<D, K::Output>, Error> {
        try_outcome!(from_result(
            self.validate_parameter_values(request.parameter_values)
        ));
        if let Some(cancelled) = mode.checkpoint() {
            return cancelled;
        }

        let connection = &request.connection;
        let info = ExecutionInfo::start(request, mode.is_async());
        let command_id = CommandId::deferred();
        let logger = request
            .logger
            .as_deref()
            .filter(|logger| logger.should_log_command_execute());

        let mut command = try_outcome!(
            self.create_command_with(mode, request, &command_id, K::METHOD)
                .await
        );

        let opened = async {
            if let Some(cancelled) = mode.checkpoint() {
                return cancelled;
            }
            connection.open_with(mode).await
        }
        .await;
        match opened {
            Outcome::Ok(_) => {}
            Outcome::Err(e) => {
                abandon_command(mode, logger, connection, command, &command_id, &info, K::METHOD, &e, false)
                    .await;
                return Outcome::Err(e);
            }
            Outcome::Cancelled(r) => {
                let error = Error::cancelled(&r);
                abandon_command(mode, logger, connection, command, &command_id, &info, K::METHOD, &error, false)
                    .await;
                return Outcome::Cancelled(r);
            }
            Outcome::Panicked(p) => {
                let error = Error::Custom(format!("panicked: {p:?}"));
                abandon_command(mode, logger, connection, command, &command_id, &info, K::METHOD, &error, false)
                    .await;
                return Outcome::Panicked(p);
            }
        };

        let executed = async {
            if let Some(cancelled) = mode.checkpoint() {
                return cancelled;
            }
            let Some(logger) = logger else {
                return K::execute_native(mode, &mut command).await;
            };

            let event = info.event(&command_id, K::METHOD);
            let started = Instant::now();
            let intercepted = try_outcome!(K::executing(logger, mode, &command, &event).await);
            let result = match intercepted {
                InterceptionResult::HasResult(result) => result,
                InterceptionResult::NoResult => {
                    if let Some(cancelled) = mode.checkpoint() {
                        return cancelled;
                    }
                    try_outcome!(K::execute_native(mode, &mut command).await)
                }
            };
            let end = CommandEndEventData::new(event, started.elapsed());
            K::executed(logger, mode, &command, &end, result).await
        }
        .await;

        match executed {
            Outcome::Ok(output) => Outcome::Ok(Execution {
                output,
                command,
                command_id,
                info,
            }),
            Outcome::Err(e) => {
                abandon_command(mode, logger, connection, command, &command_id, &info, K::METHOD, &e, true)
                    .await;
                Outcome::Err(e)
            }
            Outcome::Cancelled(r) => {
                let error = Error::cancelled(&r);
                abandon_command(mode, logger, connection, command, &command_id, &info, K::METHOD, &error, true)
                    .await;
                Outcome::Cancelled(r)
            }
            Outcome::Panicked(p) => {
                let error = Error::Custom(format!("panicked: {p:?}"));
                abandon_command(mode, logger, connection, command, &command_id, &info, K::METHOD, &error, true)
                    .await;
                Outcome::Panicked(p)
            }
        }
    }
}

/// Report a failed execution, then release the command and, if it was
/// opened, the connection. Also used when creation fails after the native
/// command exists. Cleanup failures are logged; the caller returns
/// the original failure.
#[allow(clippy::too_many_arguments)]
async fn abandon_command<D: DbConnection>(
    mode: ExecutionMode<'_>,
    logger: Option<&DiagnosticsLogger<D>>,
    connection: &RelationalConnection<D>,
    mut command: D::Command,
    command_id: &CommandId,
    info: &ExecutionInfo,
    method: DbCommandMethod,
    error: &Error,
    close: bool,
) {
    if let Some(logger) = logger {
        let event = CommandErrorEventData::new(info.event(command_id, method), info.started.elapsed());
        logger.command_failed(mode, &command, &event, error).await;
    }

    command.clear_parameters();
    let disposed = dispose_command(mode, &mut command).await;
    let closed = if close {
        connection.close_with(mode).await.map(|_| ())
    } else {
        Outcome::Ok(())
    };
    for outcome in [disposed, closed] {
        if let Outcome::Err(e) = outcome {
            tracing::warn!(
                target: "relcmd::command",
                connection_id = %connection.connection_id(),
                error = %e,
                "Cleanup after a failed command also failed"
            );
        }
    }
}

/// Release a command whose native call succeeded but whose result could not
/// be handed out.
async fn discard_command<D: DbConnection>(
    mode: ExecutionMode<'_>,
    connection: &RelationalConnection<D>,
    command: D::Command,
) {
    if let Outcome::Err(e) = cleanup_command(mode, connection, command).await {
        tracing::warn!(
            target: "relcmd::command",
            connection_id = %connection.connection_id(),
            error = %e,
            "Failed to clean up command after a reader error"
        );
    }
}

/// Clear parameters, dispose the command and release one connection open.
///
/// Every step runs even if an earlier one fails; the first failure is
/// returned.
pub(crate) async fn cleanup_command<D: DbConnection>(
    mode: ExecutionMode<'_>,
    connection: &RelationalConnection<D>,
    mut command: D::Command,
) -> Outcome<(), Error> {
    command.clear_parameters();
    let disposed = dispose_command(mode, &mut command).await;
    drop(command);
    let closed = connection.close_with(mode).await.map(|_| ());
    match disposed {
        Outcome::Ok(()) => closed,
        failed => failed,
    }
}

async fn dispose_command<C: DbCommand>(mode: ExecutionMode<'_>, command: &mut C) -> Outcome<(), Error> {
    match mode {
        ExecutionMode::Blocking => from_result(command.dispose()),
        ExecutionMode::Async(cx) => command.dispose_async(cx).await,
    }
}

impl<D: DbConnection> RelationalCommandTemplate for RelationalCommand<D> {
    fn shared_text(&self) -> Arc<str> {
        Arc::clone(&self.command_text)
    }

    fn shared_parameters(&self) -> Arc<[RelationalParameter]> {
        Arc::clone(&self.parameters)
    }
}

impl<D: DbConnection> fmt::Debug for RelationalCommand<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationalCommand")
            .field("command_text", &self.command_text)
            .field("parameters", &self.parameters)
            .field("reader", &self.reader)
            .finish()
    }
}
