//! Transaction wrapper and factory.

use std::fmt;
use std::sync::Arc;

use asupersync::{Cx, Outcome};
use relcmd_core::mode::{complete_blocking, from_result};
use relcmd_core::{
    DbConnection, DbTransaction, Error, ExecutionMode, IsolationLevel, Result, TransactionErrorKind,
    TransactionId,
};
use relcmd_diagnostics::DiagnosticsLogger;

use crate::connection::RelationalConnection;

/// Builds the wrapper handed out for a begun or adopted native transaction.
pub trait TransactionFactory<D: DbConnection>: Send + Sync {
    fn create(
        &self,
        connection: Arc<RelationalConnection<D>>,
        transaction: Arc<D::Transaction>,
        transaction_id: TransactionId,
        logger: Option<Arc<DiagnosticsLogger<D>>>,
        transaction_owned: bool,
    ) -> RelationalTransaction<D>;
}

/// The default factory: a plain [`RelationalTransaction`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RelationalTransactionFactory;

impl<D: DbConnection> TransactionFactory<D> for RelationalTransactionFactory {
    fn create(
        &self,
        connection: Arc<RelationalConnection<D>>,
        transaction: Arc<D::Transaction>,
        transaction_id: TransactionId,
        logger: Option<Arc<DiagnosticsLogger<D>>>,
        transaction_owned: bool,
    ) -> RelationalTransaction<D> {
        RelationalTransaction::new(connection, transaction, transaction_id, logger, transaction_owned)
    }
}

/// Lifecycle of a transaction wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    RolledBack,
    Disposed,
}

#[derive(Debug, Clone, Copy)]
enum Completion {
    Commit,
    Rollback,
}

/// A native transaction tagged with a correlation id and bound to the
/// connection it was started on.
///
/// While active it is the connection's ambient transaction. Committing,
/// rolling back or disposing it clears the ambient transaction and releases
/// the open it holds on the connection. If the wrapper owns the native
/// transaction, disposing it while still active rolls it back.
pub struct RelationalTransaction<D: DbConnection> {
    connection: Arc<RelationalConnection<D>>,
    transaction: Arc<D::Transaction>,
    transaction_id: TransactionId,
    logger: Option<Arc<DiagnosticsLogger<D>>>,
    owned: bool,
    state: TransactionState,
    connection_released: bool,
}

impl<D: DbConnection> RelationalTransaction<D> {
    pub fn new(
        connection: Arc<RelationalConnection<D>>,
        transaction: Arc<D::Transaction>,
        transaction_id: TransactionId,
        logger: Option<Arc<DiagnosticsLogger<D>>>,
        transaction_owned: bool,
    ) -> Self {
        Self {
            connection,
            transaction,
            transaction_id,
            logger,
            owned: transaction_owned,
            state: TransactionState::Active,
            connection_released: false,
        }
    }

    pub fn transaction_id(&self) -> TransactionId {
        self.transaction_id
    }

    pub fn connection(&self) -> &Arc<RelationalConnection<D>> {
        &self.connection
    }

    /// The native transaction.
    pub fn db_transaction(&self) -> &Arc<D::Transaction> {
        &self.transaction
    }

    pub fn logger(&self) -> Option<&Arc<DiagnosticsLogger<D>>> {
        self.logger.as_ref()
    }

    pub fn is_owned(&self) -> bool {
        self.owned
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn isolation_level(&self) -> IsolationLevel {
        self.transaction.isolation_level()
    }

    pub fn commit(&mut self) -> Result<()> {
        complete_blocking(self.complete(ExecutionMode::Blocking, Completion::Commit))
    }

    pub async fn commit_async(&mut self, cx: &Cx) -> Outcome<(), Error> {
        self.complete(ExecutionMode::Async(cx), Completion::Commit).await
    }

    pub fn rollback(&mut self) -> Result<()> {
        complete_blocking(self.complete(ExecutionMode::Blocking, Completion::Rollback))
    }

    pub async fn rollback_async(&mut self, cx: &Cx) -> Outcome<(), Error> {
        self.complete(ExecutionMode::Async(cx), Completion::Rollback)
            .await
    }

    /// Release the transaction. Idempotent.
    pub fn dispose(&mut self) -> Result<()> {
        complete_blocking(self.dispose_with(ExecutionMode::Blocking))
    }

    pub async fn dispose_async(&mut self, cx: &Cx) -> Outcome<(), Error> {
        self.dispose_with(ExecutionMode::Async(cx)).await
    }

    async fn complete(&mut self, mode: ExecutionMode<'_>, completion: Completion) -> Outcome<(), Error> {
        if self.state != TransactionState::Active {
            return Outcome::Err(Error::transaction(
                TransactionErrorKind::Completed,
                format!(
                    "Transaction {} is no longer active ({:?}).",
                    self.transaction_id, self.state
                ),
            ));
        }
        if let Some(cancelled) = mode.checkpoint() {
            return cancelled;
        }

        let result = match (completion, mode) {
            (Completion::Commit, ExecutionMode::Blocking) => from_result(self.transaction.commit()),
            (Completion::Commit, ExecutionMode::Async(cx)) => self.transaction.commit_async(cx).await,
            (Completion::Rollback, ExecutionMode::Blocking) => {
                from_result(self.transaction.rollback())
            }
            (Completion::Rollback, ExecutionMode::Async(cx)) => {
                self.transaction.rollback_async(cx).await
            }
        };

        match result {
            Outcome::Ok(()) => {
                self.state = match completion {
                    Completion::Commit => TransactionState::Committed,
                    Completion::Rollback => TransactionState::RolledBack,
                };
                tracing::debug!(
                    target: "relcmd::transaction",
                    transaction_id = %self.transaction_id,
                    connection_id = %self.connection.connection_id(),
                    "{} transaction",
                    match completion {
                        Completion::Commit => "Committed",
                        Completion::Rollback => "Rolled back",
                    }
                );
                self.clear_transaction(mode).await
            }
            Outcome::Err(e) => {
                tracing::error!(
                    target: "relcmd::transaction",
                    transaction_id = %self.transaction_id,
                    connection_id = %self.connection.connection_id(),
                    error = %e,
                    "Transaction {:?} failed",
                    completion
                );
                Outcome::Err(e)
            }
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }

    async fn dispose_with(&mut self, mode: ExecutionMode<'_>) -> Outcome<(), Error> {
        if self.state == TransactionState::Disposed {
            return Outcome::Ok(());
        }
        let was_active = self.state == TransactionState::Active;
        self.state = TransactionState::Disposed;

        let rolled_back = if was_active && self.owned {
            tracing::debug!(
                target: "relcmd::transaction",
                transaction_id = %self.transaction_id,
                "Rolling back transaction on dispose"
            );
            match mode {
                ExecutionMode::Blocking => from_result(self.transaction.rollback()),
                ExecutionMode::Async(cx) => self.transaction.rollback_async(cx).await,
            }
        } else {
            Outcome::Ok(())
        };

        let cleared = self.clear_transaction(mode).await;
        match rolled_back {
            Outcome::Ok(()) => cleared,
            failed => failed,
        }
    }

    async fn clear_transaction(&mut self, mode: ExecutionMode<'_>) -> Outcome<(), Error> {
        self.connection.clear_current_transaction(self.transaction_id);
        if self.connection_released {
            return Outcome::Ok(());
        }
        self.connection_released = true;
        self.connection.close_with(mode).await.map(|_| ())
    }
}

impl<D: DbConnection> Drop for RelationalTransaction<D> {
    fn drop(&mut self) {
        if self.state == TransactionState::Disposed {
            return;
        }
        if let Err(e) = complete_blocking(self.dispose_with(ExecutionMode::Blocking)) {
            tracing::warn!(
                target: "relcmd::transaction",
                transaction_id = %self.transaction_id,
                error = %e,
                "Failed to dispose transaction on drop"
            );
        }
    }
}

impl<D: DbConnection> fmt::Debug for RelationalTransaction<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationalTransaction")
            .field("transaction_id", &self.transaction_id)
            .field("connection_id", &self.connection.connection_id())
            .field("owned", &self.owned)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
