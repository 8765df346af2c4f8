//! The three execution shapes.
//!
//! Each shape names its native call and the logger events raised around it,
//! so the executor in [`crate::command`] is written once for all three.

use asupersync::Outcome;
use relcmd_core::mode::from_result;
use relcmd_core::{DbCommand, DbConnection, Error, ExecutionMode, Value};
use relcmd_diagnostics::{
    CommandEndEventData, CommandEventData, DbCommandMethod, DiagnosticsLogger, InterceptionResult,
};

pub(crate) trait CommandExecution<D: DbConnection> {
    type Output;

    const METHOD: DbCommandMethod;

    async fn execute_native(
        mode: ExecutionMode<'_>,
        command: &mut D::Command,
    ) -> Outcome<Self::Output, Error>;

    async fn executing(
        logger: &DiagnosticsLogger<D>,
        mode: ExecutionMode<'_>,
        command: &D::Command,
        event: &CommandEventData,
    ) -> Outcome<InterceptionResult<Self::Output>, Error>;

    async fn executed(
        logger: &DiagnosticsLogger<D>,
        mode: ExecutionMode<'_>,
        command: &D::Command,
        event: &CommandEndEventData,
        result: Self::Output,
    ) -> Outcome<Self::Output, Error>;
}

/// Rows-affected execution.
pub(crate) struct NonQuery;

/// First-cell execution.
pub(crate) struct Scalar;

/// Cursor execution.
pub(crate) struct Reader;

impl<D: DbConnection> CommandExecution<D> for NonQuery {
    type Output = i64;

    const METHOD: DbCommandMethod = DbCommandMethod::NonQuery;

    async fn execute_native(mode: ExecutionMode<'_>, command: &mut D::Command) -> Outcome<i64, Error> {
        match mode {
            ExecutionMode::Blocking => from_result(command.execute_non_query()),
            ExecutionMode::Async(cx) => command.execute_non_query_async(cx).await,
        }
    }

    async fn executing(
        logger: &DiagnosticsLogger<D>,
        mode: ExecutionMode<'_>,
        command: &D::Command,
        event: &CommandEventData,
    ) -> Outcome<InterceptionResult<i64>, Error> {
        logger.non_query_executing(mode, command, event).await
    }

    async fn executed(
        logger: &DiagnosticsLogger<D>,
        mode: ExecutionMode<'_>,
        command: &D::Command,
        event: &CommandEndEventData,
        result: i64,
    ) -> Outcome<i64, Error> {
        logger.non_query_executed(mode, command, event, result).await
    }
}

impl<D: DbConnection> CommandExecution<D> for Scalar {
    type Output = Option<Value>;

    const METHOD: DbCommandMethod = DbCommandMethod::Scalar;

    async fn execute_native(
        mode: ExecutionMode<'_>,
        command: &mut D::Command,
    ) -> Outcome<Option<Value>, Error> {
        match mode {
            ExecutionMode::Blocking => from_result(command.execute_scalar()),
            ExecutionMode::Async(cx) => command.execute_scalar_async(cx).await,
        }
    }

    async fn executing(
        logger: &DiagnosticsLogger<D>,
        mode: ExecutionMode<'_>,
        command: &D::Command,
        event: &CommandEventData,
    ) -> Outcome<InterceptionResult<Option<Value>>, Error> {
        logger.scalar_executing(mode, command, event).await
    }

    async fn executed(
        logger: &DiagnosticsLogger<D>,
        mode: ExecutionMode<'_>,
        command: &D::Command,
        event: &CommandEndEventData,
        result: Option<Value>,
    ) -> Outcome<Option<Value>, Error> {
        logger.scalar_executed(mode, command, event, result).await
    }
}

impl<D: DbConnection> CommandExecution<D> for Reader {
    type Output = D::Reader;

    const METHOD: DbCommandMethod = DbCommandMethod::Reader;

    async fn execute_native(
        mode: ExecutionMode<'_>,
        command: &mut D::Command,
    ) -> Outcome<D::Reader, Error> {
        match mode {
            ExecutionMode::Blocking => from_result(command.execute_reader()),
            ExecutionMode::Async(cx) => command.execute_reader_async(cx).await,
        }
    }

    async fn executing(
        logger: &DiagnosticsLogger<D>,
        mode: ExecutionMode<'_>,
        command: &D::Command,
        event: &CommandEventData,
    ) -> Outcome<InterceptionResult<D::Reader>, Error> {
        logger.reader_executing(mode, command, event).await
    }

    async fn executed(
        logger: &DiagnosticsLogger<D>,
        mode: ExecutionMode<'_>,
        command: &D::Command,
        event: &CommandEndEventData,
        result: D::Reader,
    ) -> Outcome<D::Reader, Error> {
        logger.reader_executed(mode, command, event, result).await
    }
}
