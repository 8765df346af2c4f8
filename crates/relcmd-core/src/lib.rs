//! Core types and traits for relcmd.
//!
//! `relcmd-core` is the **contract layer** of the workspace. It defines what a
//! native database driver must provide and the data that flows between the
//! driver and the execution engine.
//!
//! # Role In The Architecture
//!
//! - **Driver contract**: `DbConnection`, `DbCommand`, `DbDataReader` and
//!   `DbTransaction` are implemented by drivers (and by test doubles).
//! - **Data model**: `Value`, `DbType`, `TypeMapping` and `DbParameter` describe
//!   parameter inputs and result cells.
//! - **Correlation**: `ConnectionId`, `TransactionId` and the lazily minted
//!   `CommandId` tie diagnostics events together.
//! - **Structured concurrency**: re-exports `Cx` and `Outcome` from asupersync
//!   so every async database operation is cancel-correct. `ExecutionMode` lets
//!   one algorithm serve both the blocking and the async API.
//!
//! # Who Uses This Crate
//!
//! - `relcmd-diagnostics` builds its event payloads and interceptor traits on
//!   these types.
//! - `relcmd` implements the command executor, reader and transaction wrapper
//!   against the driver traits.
//!
//! Applications should use the `relcmd` facade; reach for `relcmd-core`
//! directly when writing a driver.

// Re-export asupersync primitives for structured concurrency
pub use asupersync::{Cx, Outcome};

pub mod driver;
pub mod error;
pub mod ids;
pub mod mode;
pub mod types;
pub mod value;

pub use driver::{DbCommand, DbConnection, DbDataReader, DbParameter, DbTransaction};
pub use error::{
    BoxError, CommandError, CommandErrorKind, ConnectionError, ConnectionErrorKind, Error,
    ParameterError, ParameterErrorKind, ReaderError, ReaderErrorKind, Result, TransactionError,
    TransactionErrorKind,
};
pub use ids::{CommandId, ConnectionId, TransactionId};
pub use mode::{ExecutionMode, complete_blocking, from_result, into_result};
pub use types::{DbType, IsolationLevel, ParameterDirection, TypeMapping};
pub use value::Value;
