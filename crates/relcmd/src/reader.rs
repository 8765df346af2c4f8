//! The relational data reader.
//!
//! [`RelationalDataReader`] is what `execute_reader` hands back. It owns the
//! cursor, the native command that produced it and one open on the
//! connection, and releases all three, in that order, when disposed.
//!
//! A command keeps a single reader and re-initializes it for every reader
//! execution. Re-initializing an open reader disposes its previous cursor,
//! command and connection open first.

use std::fmt;
use std::sync::Arc;

use asupersync::{Cx, Outcome};
use relcmd_core::mode::{complete_blocking, from_result};
use relcmd_core::{
    CommandId, DbConnection, DbDataReader, Error, ExecutionMode, ReaderErrorKind, Result, Value,
};
use relcmd_diagnostics::{DataReaderDisposingEventData, DbCommandMethod, DiagnosticsLogger};

use crate::buffered::BufferedDataReader;
use crate::command::cleanup_command;
use crate::connection::RelationalConnection;
use crate::request::ExecutionInfo;

/// Lifecycle of a [`RelationalDataReader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    Uninitialized,
    Open,
    Disposed,
}

/// The cursor behind a reader: the driver's own or a buffered copy.
pub enum DataCursor<D: DbConnection> {
    Native(D::Reader),
    Buffered(BufferedDataReader),
}

impl<D: DbConnection> DataCursor<D> {
    fn field_count(&self) -> usize {
        match self {
            DataCursor::Native(reader) => reader.field_count(),
            DataCursor::Buffered(reader) => reader.field_count(),
        }
    }

    fn column_name(&self, ordinal: usize) -> Result<&str> {
        match self {
            DataCursor::Native(reader) => reader.column_name(ordinal),
            DataCursor::Buffered(reader) => reader.column_name(ordinal),
        }
    }

    fn get_value(&self, ordinal: usize) -> Result<Value> {
        match self {
            DataCursor::Native(reader) => reader.get_value(ordinal),
            DataCursor::Buffered(reader) => reader.get_value(ordinal),
        }
    }

    fn records_affected(&self) -> i64 {
        match self {
            DataCursor::Native(reader) => reader.records_affected(),
            DataCursor::Buffered(reader) => reader.records_affected(),
        }
    }

    async fn read(&mut self, mode: ExecutionMode<'_>) -> Outcome<bool, Error> {
        match (self, mode) {
            (DataCursor::Native(reader), ExecutionMode::Blocking) => from_result(reader.read()),
            (DataCursor::Native(reader), ExecutionMode::Async(cx)) => reader.read_async(cx).await,
            (DataCursor::Buffered(reader), _) => from_result(reader.read()),
        }
    }

    async fn next_result(&mut self, mode: ExecutionMode<'_>) -> Outcome<bool, Error> {
        match (self, mode) {
            (DataCursor::Native(reader), ExecutionMode::Blocking) => from_result(reader.next_result()),
            (DataCursor::Native(reader), ExecutionMode::Async(cx)) => {
                reader.next_result_async(cx).await
            }
            (DataCursor::Buffered(reader), _) => from_result(reader.next_result()),
        }
    }

    async fn close(&mut self, mode: ExecutionMode<'_>) -> Outcome<(), Error> {
        match (self, mode) {
            (DataCursor::Native(reader), ExecutionMode::Blocking) => from_result(reader.close()),
            (DataCursor::Native(reader), ExecutionMode::Async(cx)) => reader.close_async(cx).await,
            (DataCursor::Buffered(reader), _) => from_result(reader.close()),
        }
    }
}

/// Everything bound to a reader by one execution.
struct Binding<D: DbConnection> {
    connection: Arc<RelationalConnection<D>>,
    command: D::Command,
    cursor: DataCursor<D>,
    logger: Option<Arc<DiagnosticsLogger<D>>>,
    info: ExecutionInfo,
}

/// Reader over the results of one command execution.
pub struct RelationalDataReader<D: DbConnection> {
    state: ReaderState,
    binding: Option<Binding<D>>,
    command_id: CommandId,
    read_count: u64,
}

impl<D: DbConnection> Default for RelationalDataReader<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: DbConnection> RelationalDataReader<D> {
    pub fn new() -> Self {
        Self {
            state: ReaderState::Uninitialized,
            binding: None,
            command_id: CommandId::deferred(),
            read_count: 0,
        }
    }

    /// Bind a new cursor, disposing the previous one if still open.
    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn initialize(
        &mut self,
        mode: ExecutionMode<'_>,
        connection: Arc<RelationalConnection<D>>,
        command: D::Command,
        cursor: DataCursor<D>,
        command_id: CommandId,
        logger: Option<Arc<DiagnosticsLogger<D>>>,
        info: ExecutionInfo,
    ) {
        if self.state == ReaderState::Open {
            if let Outcome::Err(e) = self.dispose_with(mode).await {
                tracing::warn!(
                    target: "relcmd::reader",
                    error = %e,
                    "Failed to dispose previous data reader"
                );
            }
        }

        self.binding = Some(Binding {
            connection,
            command,
            cursor,
            logger,
            info,
        });
        self.command_id = command_id;
        self.read_count = 0;
        self.state = ReaderState::Open;
    }

    pub fn state(&self) -> ReaderState {
        self.state
    }

    /// Correlation id of the execution that produced this reader.
    pub fn command_id(&self) -> &CommandId {
        &self.command_id
    }

    /// The native command, while open.
    pub fn command(&self) -> Option<&D::Command> {
        self.open_binding().map(|binding| &binding.command)
    }

    pub fn connection(&self) -> Option<&Arc<RelationalConnection<D>>> {
        self.open_binding().map(|binding| &binding.connection)
    }

    pub fn is_buffered(&self) -> bool {
        matches!(
            self.open_binding().map(|binding| &binding.cursor),
            Some(DataCursor::Buffered(_))
        )
    }

    /// Rows returned by `read` so far.
    pub fn read_count(&self) -> u64 {
        self.read_count
    }

    pub fn field_count(&self) -> usize {
        self.open_binding()
            .map_or(0, |binding| binding.cursor.field_count())
    }

    pub fn column_name(&self, ordinal: usize) -> Result<&str> {
        self.cursor()?.column_name(ordinal)
    }

    pub fn get_value(&self, ordinal: usize) -> Result<Value> {
        self.cursor()?.get_value(ordinal)
    }

    pub fn is_db_null(&self, ordinal: usize) -> Result<bool> {
        Ok(self.get_value(ordinal)?.is_null())
    }

    pub fn records_affected(&self) -> i64 {
        self.open_binding()
            .map_or(-1, |binding| binding.cursor.records_affected())
    }

    pub fn read(&mut self) -> Result<bool> {
        complete_blocking(self.read_with(ExecutionMode::Blocking))
    }

    pub async fn read_async(&mut self, cx: &Cx) -> Outcome<bool, Error> {
        self.read_with(ExecutionMode::Async(cx)).await
    }

    pub fn next_result(&mut self) -> Result<bool> {
        complete_blocking(self.next_result_with(ExecutionMode::Blocking))
    }

    pub async fn next_result_async(&mut self, cx: &Cx) -> Outcome<bool, Error> {
        self.next_result_with(ExecutionMode::Async(cx)).await
    }

    /// Release the cursor, then the command, then the connection. Idempotent.
    ///
    /// The async form releases everything even under a cancelled context and
    /// then returns `Outcome::Cancelled`.
    pub fn dispose(&mut self) -> Result<()> {
        complete_blocking(self.dispose_with(ExecutionMode::Blocking))
    }

    pub async fn dispose_async(&mut self, cx: &Cx) -> Outcome<(), Error> {
        self.dispose_with(ExecutionMode::Async(cx)).await
    }

    async fn read_with(&mut self, mode: ExecutionMode<'_>) -> Outcome<bool, Error> {
        let cursor = match self.cursor_mut() {
            Ok(cursor) => cursor,
            Err(e) => return Outcome::Err(e),
        };
        let outcome = cursor.read(mode).await;
        if let Outcome::Ok(true) = outcome {
            self.read_count += 1;
        }
        outcome
    }

    async fn next_result_with(&mut self, mode: ExecutionMode<'_>) -> Outcome<bool, Error> {
        match self.cursor_mut() {
            Ok(cursor) => cursor.next_result(mode).await,
            Err(e) => Outcome::Err(e),
        }
    }

    async fn dispose_with(&mut self, mode: ExecutionMode<'_>) -> Outcome<(), Error> {
        if self.state != ReaderState::Open {
            return Outcome::Ok(());
        }
        self.state = ReaderState::Disposed;
        let Some(mut binding) = self.binding.take() else {
            return Outcome::Ok(());
        };

        let logger = binding
            .logger
            .as_deref()
            .filter(|logger| logger.should_log_command_execute());
        if let Some(logger) = logger {
            let event = DataReaderDisposingEventData {
                event: binding.info.event(&self.command_id, DbCommandMethod::Reader),
                duration: binding.info.started.elapsed(),
                records_affected: binding.cursor.records_affected(),
                read_count: self.read_count,
            };
            logger
                .data_reader_disposing(mode, &binding.command, &event)
                .await;
        }

        // Cleanup runs to completion even when cancellation is requested;
        // the cancellation is reported once everything is released.
        let closed = binding.cursor.close(mode).await;
        let cleaned = cleanup_command(mode, &binding.connection, binding.command).await;
        match closed {
            Outcome::Ok(()) => match cleaned {
                Outcome::Ok(()) => mode.checkpoint().unwrap_or(Outcome::Ok(())),
                failed => failed,
            },
            failed => {
                if let Outcome::Err(e) = cleaned {
                    tracing::warn!(
                        target: "relcmd::reader",
                        error = %e,
                        "Failed to clean up command after closing the cursor failed"
                    );
                }
                failed
            }
        }
    }

    fn open_binding(&self) -> Option<&Binding<D>> {
        match self.state {
            ReaderState::Open => self.binding.as_ref(),
            ReaderState::Uninitialized | ReaderState::Disposed => None,
        }
    }

    fn cursor(&self) -> Result<&DataCursor<D>> {
        self.open_binding()
            .map(|binding| &binding.cursor)
            .ok_or_else(|| not_open(self.state))
    }

    fn cursor_mut(&mut self) -> Result<&mut DataCursor<D>> {
        let state = self.state;
        if state != ReaderState::Open {
            return Err(not_open(state));
        }
        self.binding
            .as_mut()
            .map(|binding| &mut binding.cursor)
            .ok_or_else(|| not_open(state))
    }
}

fn not_open(state: ReaderState) -> Error {
    Error::reader(
        ReaderErrorKind::Closed,
        format!("The data reader is not open ({state:?})."),
    )
}

impl<D: DbConnection> Drop for RelationalDataReader<D> {
    fn drop(&mut self) {
        if self.state != ReaderState::Open {
            return;
        }
        if let Err(e) = complete_blocking(self.dispose_with(ExecutionMode::Blocking)) {
            tracing::warn!(
                target: "relcmd::reader",
                error = %e,
                "Failed to dispose data reader on drop"
            );
        }
    }
}

impl<D: DbConnection> fmt::Debug for RelationalDataReader<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationalDataReader")
            .field("state", &self.state)
            .field("command_id", &self.command_id.peek())
            .field("buffered", &self.is_buffered())
            .field("read_count", &self.read_count)
            .finish()
    }
}
