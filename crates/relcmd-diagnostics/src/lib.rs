//! Diagnostic events and interception for relcmd.
//!
//! Every command execution raises a fixed sequence of events:
//! creating, created, executing, then executed or failed. Each event is
//! written to `tracing` and offered to the registered interceptors, which may
//! substitute the native command, replace the native call with their own
//! result, or transform the result after the call.
//!
//! # Tracing targets
//!
//! | Target | Records |
//! |--------|---------|
//! | `relcmd::command` | creating / created / executing (debug), executed (info), failed (error) |
//! | `relcmd::reader` | data reader disposal |
//! | `relcmd::transaction` | transaction begin / commit / rollback |
//! | `relcmd::connection` | connection open / close |
//!
//! When no interceptor is registered and no subscriber listens on
//! `relcmd::command`, the command events are skipped altogether and no
//! correlation id is generated.

pub mod events;
pub mod interception;
pub mod interceptor;
pub mod logger;
pub mod options;

pub use events::{
    CommandEndEventData, CommandErrorEventData, CommandEventData, CommandSource, ContextInfo,
    DataReaderDisposingEventData, DbCommandMethod, TransactionEndEventData,
    TransactionStartingEventData,
};
pub use interception::{BoxFuture, InterceptionResult};
pub use interceptor::{CommandInterceptor, TransactionInterceptor};
pub use logger::{DiagnosticsLogger, format_parameters};
pub use options::DiagnosticsOptions;
