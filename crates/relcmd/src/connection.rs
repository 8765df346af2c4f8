//! Relational connection wrapper.
//!
//! [`RelationalConnection`] owns a native connection and adds what command
//! execution needs on top of it: a stable id, an optional command timeout,
//! the ambient transaction, and reference-counted open/close.
//!
//! Every execution opens the connection and closes it again when done. The
//! native connection is only closed by the wrapper if the wrapper opened it,
//! and only when the last outstanding open is released. A connection opened
//! by the caller stays open.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use asupersync::{Cx, Outcome};
use chrono::Utc;
use relcmd_core::mode::{complete_blocking, from_result};
use relcmd_core::{
    ConnectionId, DbConnection, Error, ExecutionMode, IsolationLevel, Result, TransactionErrorKind,
    TransactionId, try_outcome,
};
use relcmd_diagnostics::{
    DiagnosticsLogger, InterceptionResult, TransactionEndEventData, TransactionStartingEventData,
};

use crate::transaction::{RelationalTransaction, RelationalTransactionFactory, TransactionFactory};

#[derive(Debug, Default)]
struct OpenState {
    open_count: usize,
    opened_internally: bool,
}

struct AmbientTransaction<D: DbConnection> {
    transaction: Arc<D::Transaction>,
    transaction_id: TransactionId,
}

/// A native connection plus the state shared by the commands run on it.
pub struct RelationalConnection<D: DbConnection> {
    db: D,
    connection_id: ConnectionId,
    command_timeout: Option<Duration>,
    logger: Option<Arc<DiagnosticsLogger<D>>>,
    transaction_factory: Arc<dyn TransactionFactory<D>>,
    state: Mutex<OpenState>,
    current_transaction: Mutex<Option<AmbientTransaction<D>>>,
}

impl<D: DbConnection> RelationalConnection<D> {
    pub fn new(db: D) -> Self {
        Self {
            db,
            connection_id: ConnectionId::new(),
            command_timeout: None,
            logger: None,
            transaction_factory: Arc::new(RelationalTransactionFactory),
            state: Mutex::new(OpenState::default()),
            current_transaction: Mutex::new(None),
        }
    }

    /// Timeout applied to every command created on this connection.
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }

    /// Default logger for requests and transactions on this connection.
    pub fn with_logger(mut self, logger: Arc<DiagnosticsLogger<D>>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn with_transaction_factory(mut self, factory: Arc<dyn TransactionFactory<D>>) -> Self {
        self.transaction_factory = factory;
        self
    }

    /// Wrap into the shared handle used by requests.
    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// The native connection.
    pub fn db(&self) -> &D {
        &self.db
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout
    }

    pub fn logger(&self) -> Option<&Arc<DiagnosticsLogger<D>>> {
        self.logger.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.db.is_open()
    }

    /// Outstanding opens not yet matched by a close.
    pub fn open_count(&self) -> usize {
        self.lock_state().open_count
    }

    /// The ambient native transaction, attached to every new command.
    pub fn current_transaction(&self) -> Option<Arc<D::Transaction>> {
        self.lock_transaction()
            .as_ref()
            .map(|ambient| Arc::clone(&ambient.transaction))
    }

    pub fn current_transaction_id(&self) -> Option<TransactionId> {
        self.lock_transaction()
            .as_ref()
            .map(|ambient| ambient.transaction_id)
    }

    // ========================================================================
    // Open / close
    // ========================================================================

    /// Open the connection. Returns `true` if the native connection was
    /// opened by this call.
    pub fn open(&self) -> Result<bool> {
        complete_blocking(self.open_with(ExecutionMode::Blocking))
    }

    pub async fn open_async(&self, cx: &Cx) -> Outcome<bool, Error> {
        self.open_with(ExecutionMode::Async(cx)).await
    }

    /// Release one open. Returns `true` if the native connection was closed.
    pub fn close(&self) -> Result<bool> {
        complete_blocking(self.close_with(ExecutionMode::Blocking))
    }

    pub async fn close_async(&self, cx: &Cx) -> Outcome<bool, Error> {
        self.close_with(ExecutionMode::Async(cx)).await
    }

    pub(crate) async fn open_with(&self, mode: ExecutionMode<'_>) -> Outcome<bool, Error> {
        let mut opened = false;
        if !self.db.is_open() {
            tracing::debug!(
                target: "relcmd::connection",
                connection_id = %self.connection_id,
                is_async = mode.is_async(),
                "Opening connection"
            );
            let result = match mode {
                ExecutionMode::Blocking => from_result(self.db.open()),
                ExecutionMode::Async(cx) => self.db.open_async(cx).await,
            };
            match result {
                Outcome::Ok(()) => {}
                Outcome::Err(e) => {
                    tracing::error!(
                        target: "relcmd::connection",
                        connection_id = %self.connection_id,
                        error = %e,
                        "Failed to open connection"
                    );
                    return Outcome::Err(e);
                }
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            }
            opened = true;
            tracing::debug!(
                target: "relcmd::connection",
                connection_id = %self.connection_id,
                "Opened connection"
            );
        }

        let mut state = self.lock_state();
        if opened {
            state.opened_internally = true;
        }
        state.open_count += 1;
        Outcome::Ok(opened)
    }

    pub(crate) async fn close_with(&self, mode: ExecutionMode<'_>) -> Outcome<bool, Error> {
        let should_close = {
            let mut state = self.lock_state();
            if state.open_count > 0 {
                state.open_count -= 1;
            }
            if state.open_count == 0 && state.opened_internally {
                state.opened_internally = false;
                true
            } else {
                false
            }
        };

        if !should_close {
            return Outcome::Ok(false);
        }

        tracing::debug!(
            target: "relcmd::connection",
            connection_id = %self.connection_id,
            is_async = mode.is_async(),
            "Closing connection"
        );
        let result = match mode {
            ExecutionMode::Blocking => from_result(self.db.close()),
            ExecutionMode::Async(cx) => self.db.close_async(cx).await,
        };
        result.map(|()| true)
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Begin a transaction owned by the returned wrapper.
    ///
    /// The connection stays open until the transaction is committed, rolled
    /// back or disposed.
    pub fn begin_transaction(self: &Arc<Self>, isolation: IsolationLevel) -> Result<RelationalTransaction<D>> {
        complete_blocking(self.begin_transaction_with(ExecutionMode::Blocking, isolation))
    }

    #[tracing::instrument(level = "debug", skip(self, cx))]
    pub async fn begin_transaction_async(
        self: &Arc<Self>,
        cx: &Cx,
        isolation: IsolationLevel,
    ) -> Outcome<RelationalTransaction<D>, Error> {
        self.begin_transaction_with(ExecutionMode::Async(cx), isolation)
            .await
    }

    /// Make an externally owned native transaction the ambient transaction.
    ///
    /// Disposing the returned wrapper never rolls the native transaction back.
    pub fn use_transaction(self: &Arc<Self>, transaction: Arc<D::Transaction>) -> Result<RelationalTransaction<D>> {
        complete_blocking(self.use_transaction_with(ExecutionMode::Blocking, transaction))
    }

    pub async fn use_transaction_async(
        self: &Arc<Self>,
        cx: &Cx,
        transaction: Arc<D::Transaction>,
    ) -> Outcome<RelationalTransaction<D>, Error> {
        self.use_transaction_with(ExecutionMode::Async(cx), transaction)
            .await
    }

    async fn begin_transaction_with(
        self: &Arc<Self>,
        mode: ExecutionMode<'_>,
        isolation: IsolationLevel,
    ) -> Outcome<RelationalTransaction<D>, Error> {
        if let Some(err) = self.ensure_no_transaction() {
            return Outcome::Err(err);
        }
        if let Some(cancelled) = mode.checkpoint() {
            return cancelled;
        }
        try_outcome!(self.open_with(mode).await);

        let transaction_id = TransactionId::new();
        let native = match self.begin_native(mode, isolation, transaction_id).await {
            Outcome::Ok(native) => native,
            Outcome::Err(e) => {
                self.release_after_failure(mode).await;
                return Outcome::Err(e);
            }
            Outcome::Cancelled(r) => {
                self.release_after_failure(mode).await;
                return Outcome::Cancelled(r);
            }
            Outcome::Panicked(p) => {
                self.release_after_failure(mode).await;
                return Outcome::Panicked(p);
            }
        };

        let native = Arc::new(native);
        self.set_current_transaction(Arc::clone(&native), transaction_id);
        Outcome::Ok(self.transaction_factory.create(
            Arc::clone(self),
            native,
            transaction_id,
            self.logger.clone(),
            true,
        ))
    }

    async fn begin_native(
        &self,
        mode: ExecutionMode<'_>,
        isolation: IsolationLevel,
        transaction_id: TransactionId,
    ) -> Outcome<D::Transaction, Error> {
        let logger = self
            .logger
            .as_deref()
            .filter(|logger| logger.should_log_transaction());

        let Some(logger) = logger else {
            return match mode {
                ExecutionMode::Blocking => from_result(self.db.begin_transaction(isolation)),
                ExecutionMode::Async(cx) => self.db.begin_transaction_async(cx, isolation).await,
            };
        };

        let started = Instant::now();
        let event = TransactionStartingEventData {
            context: None,
            connection_id: self.connection_id,
            transaction_id,
            isolation_level: isolation,
            is_async: mode.is_async(),
            start_time: Utc::now(),
        };

        let native = match logger.transaction_starting(mode, &event).await {
            Outcome::Ok(InterceptionResult::HasResult(native)) => native,
            Outcome::Ok(InterceptionResult::NoResult) => {
                let began = match mode {
                    ExecutionMode::Blocking => from_result(self.db.begin_transaction(isolation)),
                    ExecutionMode::Async(cx) => self.db.begin_transaction_async(cx, isolation).await,
                };
                match began {
                    Outcome::Ok(native) => native,
                    other => return other,
                }
            }
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        let end = TransactionEndEventData {
            event,
            duration: started.elapsed(),
        };
        logger.transaction_started(mode, &end, native).await
    }

    async fn use_transaction_with(
        self: &Arc<Self>,
        mode: ExecutionMode<'_>,
        transaction: Arc<D::Transaction>,
    ) -> Outcome<RelationalTransaction<D>, Error> {
        if let Some(err) = self.ensure_no_transaction() {
            return Outcome::Err(err);
        }
        try_outcome!(self.open_with(mode).await);

        let transaction_id = TransactionId::new();
        tracing::debug!(
            target: "relcmd::transaction",
            connection_id = %self.connection_id,
            transaction_id = %transaction_id,
            "Using external transaction"
        );
        self.set_current_transaction(Arc::clone(&transaction), transaction_id);
        Outcome::Ok(self.transaction_factory.create(
            Arc::clone(self),
            transaction,
            transaction_id,
            self.logger.clone(),
            false,
        ))
    }

    fn ensure_no_transaction(&self) -> Option<Error> {
        self.lock_transaction().as_ref().map(|ambient| {
            Error::transaction(
                TransactionErrorKind::AlreadyStarted,
                format!(
                    "The connection is already in transaction {}.",
                    ambient.transaction_id
                ),
            )
        })
    }

    async fn release_after_failure(&self, mode: ExecutionMode<'_>) {
        if let Outcome::Err(e) = self.close_with(mode).await {
            tracing::warn!(
                target: "relcmd::connection",
                connection_id = %self.connection_id,
                error = %e,
                "Failed to close connection after a failed begin"
            );
        }
    }

    pub(crate) fn set_current_transaction(&self, transaction: Arc<D::Transaction>, transaction_id: TransactionId) {
        *self.lock_transaction() = Some(AmbientTransaction {
            transaction,
            transaction_id,
        });
    }

    /// Clear the ambient transaction if it is still `transaction_id`.
    pub(crate) fn clear_current_transaction(&self, transaction_id: TransactionId) {
        let mut current = self.lock_transaction();
        if current
            .as_ref()
            .is_some_and(|ambient| ambient.transaction_id == transaction_id)
        {
            *current = None;
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, OpenState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_transaction(&self) -> std::sync::MutexGuard<'_, Option<AmbientTransaction<D>>> {
        self.current_transaction
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<D: DbConnection + fmt::Debug> fmt::Debug for RelationalConnection<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationalConnection")
            .field("db", &self.db)
            .field("connection_id", &self.connection_id)
            .field("command_timeout", &self.command_timeout)
            .field("open_count", &self.open_count())
            .field("current_transaction_id", &self.current_transaction_id())
            .finish_non_exhaustive()
    }
}
