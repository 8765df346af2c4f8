//! Relational command execution for Rust.
//!
//! `relcmd` sits between a query pipeline that has already produced SQL text
//! and a native driver that can run it. It owns the parts in between:
//!
//! - **Parameter binding**: [`RelationalParameter`] turns named values into
//!   typed native parameters.
//! - **Execution**: [`RelationalCommand`] runs non-query, scalar and reader
//!   executions with a fixed resource discipline. The command is disposed and
//!   the connection released on every path, success or failure.
//! - **Interception**: every execution raises creating / created / executing /
//!   executed / failed events through a [`DiagnosticsLogger`]; interceptors can
//!   substitute commands and results.
//! - **Reading**: [`RelationalDataReader`] wraps the native cursor, or a fully
//!   [`BufferedDataReader`] copy of it.
//! - **Transactions**: [`RelationalConnection::begin_transaction`] and the
//!   [`TransactionFactory`] produce [`RelationalTransaction`] wrappers that keep
//!   the connection's ambient transaction in sync.
//!
//! Every I/O operation has a blocking form and an `_async` form taking a
//! [`Cx`]; the async forms return [`Outcome`] and observe cancellation.
//!
//! # Example
//!
//! ```ignore
//! use relcmd::prelude::*;
//!
//! let connection = RelationalConnection::new(driver)
//!     .with_logger(Arc::new(DiagnosticsLogger::default()))
//!     .into_shared();
//!
//! let mut builder = RelationalCommandBuilder::new();
//! builder
//!     .append("UPDATE heroes SET age = age + 1 WHERE team_id = @team")
//!     .add_parameter(RelationalParameter::new("team"));
//! let command = builder.build()?;
//!
//! let values = ParameterValues::from([("team".to_string(), Value::Int(7))]);
//! let request = CommandParameterObject::new(Arc::clone(&connection))
//!     .with_parameter_values(&values);
//! let rows = command.execute_non_query_async(&cx, &request).await;
//! ```

pub use asupersync::{Cx, Outcome};

pub mod buffered;
pub mod builder;
pub mod command;
pub mod connection;
mod execute;
pub mod parameter;
pub mod reader;
pub mod request;
pub mod transaction;

pub use buffered::{BufferedDataReader, ReaderColumn};
pub use builder::RelationalCommandBuilder;
pub use command::{RelationalCommand, RelationalCommandTemplate};
pub use connection::RelationalConnection;
pub use parameter::{ParameterValues, RelationalParameter};
pub use reader::{DataCursor, ReaderState, RelationalDataReader};
pub use request::CommandParameterObject;
pub use transaction::{
    RelationalTransaction, RelationalTransactionFactory, TransactionFactory, TransactionState,
};

pub use relcmd_core::{
    CommandId, ConnectionId, DbCommand, DbConnection, DbDataReader, DbParameter, DbTransaction,
    DbType, Error, ExecutionMode, IsolationLevel, ParameterDirection, Result, TransactionId,
    TypeMapping, Value,
};
pub use relcmd_diagnostics::{
    CommandEndEventData, CommandErrorEventData, CommandEventData, CommandInterceptor,
    CommandSource, ContextInfo, DataReaderDisposingEventData, DbCommandMethod, DiagnosticsLogger,
    DiagnosticsOptions, InterceptionResult, TransactionEndEventData, TransactionInterceptor,
    TransactionStartingEventData,
};

/// The types most applications need.
pub mod prelude {
    pub use crate::{
        CommandParameterObject, Cx, DbConnection, DiagnosticsLogger, DiagnosticsOptions, Error,
        IsolationLevel, Outcome, ParameterValues, ReaderColumn, RelationalCommand,
        RelationalCommandBuilder, RelationalConnection, RelationalParameter, RelationalTransaction,
        Result, TypeMapping, Value,
    };
    pub use std::sync::Arc;
}
