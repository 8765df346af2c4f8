//! Interceptor traits.
//!
//! Every hook has a pass-through default, so an interceptor only overrides the
//! events it cares about. "Executing" hooks receive the result produced by
//! the previous interceptor and may return `HasResult` to replace the native
//! call; "executed" hooks receive the value about to be returned and may
//! transform it. Failure and disposal hooks observe only.
//!
//! The async variants default to calling the blocking hook. Command creation
//! never performs I/O, so the creation hooks have no async form.

use asupersync::{Cx, Outcome};
use relcmd_core::mode::from_result;
use relcmd_core::{DbConnection, Error, Result, Value};

use crate::events::{
    CommandEndEventData, CommandErrorEventData, CommandEventData, DataReaderDisposingEventData,
    TransactionEndEventData, TransactionStartingEventData,
};
use crate::interception::{BoxFuture, InterceptionResult};

/// Hooks around command creation and execution.
///
/// ```ignore
/// struct CountRows;
///
/// impl<D: DbConnection> CommandInterceptor<D> for CountRows {
///     fn non_query_executed(
///         &self,
///         _command: &D::Command,
///         event: &CommandEndEventData,
///         rows: i64,
///     ) -> Result<i64> {
///         println!("{} rows in {:?}", rows, event.duration);
///         Ok(rows)
///     }
/// }
/// ```
pub trait CommandInterceptor<D: DbConnection>: Send + Sync {
    /// Before the native command is created. `HasResult` supplies the command.
    fn command_creating(
        &self,
        _event: &CommandEventData,
        result: InterceptionResult<D::Command>,
    ) -> Result<InterceptionResult<D::Command>> {
        Ok(result)
    }

    /// After the native command was created or supplied. The command may be
    /// adjusted or replaced in place; it stays owned by the executor, which
    /// disposes it if this hook fails.
    fn command_created(&self, _event: &CommandEndEventData, _command: &mut D::Command) -> Result<()> {
        Ok(())
    }

    fn non_query_executing(
        &self,
        _command: &D::Command,
        _event: &CommandEventData,
        result: InterceptionResult<i64>,
    ) -> Result<InterceptionResult<i64>> {
        Ok(result)
    }

    fn non_query_executed(
        &self,
        _command: &D::Command,
        _event: &CommandEndEventData,
        result: i64,
    ) -> Result<i64> {
        Ok(result)
    }

    fn scalar_executing(
        &self,
        _command: &D::Command,
        _event: &CommandEventData,
        result: InterceptionResult<Option<Value>>,
    ) -> Result<InterceptionResult<Option<Value>>> {
        Ok(result)
    }

    fn scalar_executed(
        &self,
        _command: &D::Command,
        _event: &CommandEndEventData,
        result: Option<Value>,
    ) -> Result<Option<Value>> {
        Ok(result)
    }

    fn reader_executing(
        &self,
        _command: &D::Command,
        _event: &CommandEventData,
        result: InterceptionResult<D::Reader>,
    ) -> Result<InterceptionResult<D::Reader>> {
        Ok(result)
    }

    fn reader_executed(
        &self,
        _command: &D::Command,
        _event: &CommandEndEventData,
        result: D::Reader,
    ) -> Result<D::Reader> {
        Ok(result)
    }

    /// The command failed or was cancelled. The error is returned to the
    /// caller unchanged afterwards.
    fn command_failed(&self, _command: &D::Command, _event: &CommandErrorEventData, _error: &Error) {}

    /// A data reader is about to release its cursor, command and connection.
    fn data_reader_disposing(&self, _command: &D::Command, _event: &DataReaderDisposingEventData) {}

    fn non_query_executing_async<'a>(
        &'a self,
        _cx: &'a Cx,
        command: &'a D::Command,
        event: &'a CommandEventData,
        result: InterceptionResult<i64>,
    ) -> BoxFuture<'a, Outcome<InterceptionResult<i64>, Error>> {
        let outcome = from_result(self.non_query_executing(command, event, result));
        Box::pin(async move { outcome })
    }

    fn non_query_executed_async<'a>(
        &'a self,
        _cx: &'a Cx,
        command: &'a D::Command,
        event: &'a CommandEndEventData,
        result: i64,
    ) -> BoxFuture<'a, Outcome<i64, Error>> {
        let outcome = from_result(self.non_query_executed(command, event, result));
        Box::pin(async move { outcome })
    }

    fn scalar_executing_async<'a>(
        &'a self,
        _cx: &'a Cx,
        command: &'a D::Command,
        event: &'a CommandEventData,
        result: InterceptionResult<Option<Value>>,
    ) -> BoxFuture<'a, Outcome<InterceptionResult<Option<Value>>, Error>> {
        let outcome = from_result(self.scalar_executing(command, event, result));
        Box::pin(async move { outcome })
    }

    fn scalar_executed_async<'a>(
        &'a self,
        _cx: &'a Cx,
        command: &'a D::Command,
        event: &'a CommandEndEventData,
        result: Option<Value>,
    ) -> BoxFuture<'a, Outcome<Option<Value>, Error>> {
        let outcome = from_result(self.scalar_executed(command, event, result));
        Box::pin(async move { outcome })
    }

    fn reader_executing_async<'a>(
        &'a self,
        _cx: &'a Cx,
        command: &'a D::Command,
        event: &'a CommandEventData,
        result: InterceptionResult<D::Reader>,
    ) -> BoxFuture<'a, Outcome<InterceptionResult<D::Reader>, Error>> {
        let outcome = from_result(self.reader_executing(command, event, result));
        Box::pin(async move { outcome })
    }

    fn reader_executed_async<'a>(
        &'a self,
        _cx: &'a Cx,
        command: &'a D::Command,
        event: &'a CommandEndEventData,
        result: D::Reader,
    ) -> BoxFuture<'a, Outcome<D::Reader, Error>> {
        let outcome = from_result(self.reader_executed(command, event, result));
        Box::pin(async move { outcome })
    }

    fn command_failed_async<'a>(
        &'a self,
        _cx: &'a Cx,
        command: &'a D::Command,
        event: &'a CommandErrorEventData,
        error: &'a Error,
    ) -> BoxFuture<'a, ()> {
        self.command_failed(command, event, error);
        Box::pin(async {})
    }

    fn data_reader_disposing_async<'a>(
        &'a self,
        _cx: &'a Cx,
        command: &'a D::Command,
        event: &'a DataReaderDisposingEventData,
    ) -> BoxFuture<'a, ()> {
        self.data_reader_disposing(command, event);
        Box::pin(async {})
    }
}

/// Hooks around beginning a transaction.
pub trait TransactionInterceptor<D: DbConnection>: Send + Sync {
    /// Before the native transaction is begun. `HasResult` supplies it.
    fn transaction_starting(
        &self,
        _event: &TransactionStartingEventData,
        result: InterceptionResult<D::Transaction>,
    ) -> Result<InterceptionResult<D::Transaction>> {
        Ok(result)
    }

    fn transaction_started(
        &self,
        _event: &TransactionEndEventData,
        transaction: D::Transaction,
    ) -> Result<D::Transaction> {
        Ok(transaction)
    }

    fn transaction_starting_async<'a>(
        &'a self,
        _cx: &'a Cx,
        event: &'a TransactionStartingEventData,
        result: InterceptionResult<D::Transaction>,
    ) -> BoxFuture<'a, Outcome<InterceptionResult<D::Transaction>, Error>> {
        let outcome = from_result(self.transaction_starting(event, result));
        Box::pin(async move { outcome })
    }

    fn transaction_started_async<'a>(
        &'a self,
        _cx: &'a Cx,
        event: &'a TransactionEndEventData,
        transaction: D::Transaction,
    ) -> BoxFuture<'a, Outcome<D::Transaction, Error>> {
        let outcome = from_result(self.transaction_started(event, transaction));
        Box::pin(async move { outcome })
    }
}
