//! In-memory driver used by the integration tests.
//!
//! Every driver call is counted and appended to a shared log so tests can
//! assert on resource discipline and event order.

#![allow(clippy::manual_async_fn)]
#![allow(dead_code)]

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use asupersync::runtime::{Runtime, RuntimeBuilder};
use relcmd::{
    CommandParameterObject, Cx, DbCommand, DbConnection, DbDataReader, DbParameter,
    DbTransaction, Error, IsolationLevel, Outcome, RelationalConnection, Result, Value,
};
use relcmd_core::CommandErrorKind;

pub fn runtime() -> Runtime {
    RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime")
}

pub fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> std::result::Result<T, String> {
    match outcome {
        Outcome::Ok(v) => Ok(v),
        Outcome::Err(e) => Err(format!("unexpected error: {e}")),
        Outcome::Cancelled(r) => Err(format!("cancelled: {r:?}")),
        Outcome::Panicked(p) => Err(format!("panicked: {p:?}")),
    }
}

fn outcome<T>(result: Result<T>) -> Outcome<T, Error> {
    match result {
        Ok(v) => Outcome::Ok(v),
        Err(e) => Outcome::Err(e),
    }
}

// ============================================================================
// Shared state
// ============================================================================

/// One result set served by [`MockReader`].
#[derive(Debug, Clone, Default)]
pub struct MockResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl MockResultSet {
    pub fn new(columns: &[&str], rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
            rows,
        }
    }
}

/// What the driver returns.
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    pub rows_affected: i64,
    pub scalar: Option<Value>,
    pub result_sets: Vec<MockResultSet>,
    pub records_affected: i64,
    pub fail_execute: bool,
    pub fail_open: bool,
}

/// The native command as it looked when it was executed.
#[derive(Debug, Clone)]
pub struct CommandSnapshot {
    pub text: String,
    pub parameters: Vec<DbParameter>,
    pub timeout: Option<Duration>,
    pub has_transaction: bool,
}

#[derive(Debug, Default)]
pub struct Counters {
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub commands_created: AtomicUsize,
    pub executions: AtomicUsize,
    pub disposals: AtomicUsize,
    pub reader_closes: AtomicUsize,
    pub begins: AtomicUsize,
    pub commits: AtomicUsize,
    pub rollbacks: AtomicUsize,
}

#[derive(Debug, Default)]
pub struct MockState {
    pub counters: Counters,
    pub config: Mutex<MockConfig>,
    pub is_open: AtomicBool,
    pub log: Mutex<Vec<String>>,
    pub last_command: Mutex<Option<CommandSnapshot>>,
}

impl MockState {
    pub fn new(config: MockConfig) -> Arc<Self> {
        Arc::new(Self {
            config: Mutex::new(config),
            ..Self::default()
        })
    }

    pub fn record(&self, entry: impl Into<String>) {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.into());
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn clear_log(&self) {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    pub fn config(&self) -> MockConfig {
        self.config
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last_command(&self) -> Option<CommandSnapshot> {
        self.last_command
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn opens(&self) -> usize {
        self.counters.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.counters.closes.load(Ordering::SeqCst)
    }

    pub fn executions(&self) -> usize {
        self.counters.executions.load(Ordering::SeqCst)
    }

    pub fn disposals(&self) -> usize {
        self.counters.disposals.load(Ordering::SeqCst)
    }

    pub fn commands_created(&self) -> usize {
        self.counters.commands_created.load(Ordering::SeqCst)
    }

    pub fn reader_closes(&self) -> usize {
        self.counters.reader_closes.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.counters.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.counters.rollbacks.load(Ordering::SeqCst)
    }

    pub fn begins(&self) -> usize {
        self.counters.begins.load(Ordering::SeqCst)
    }
}

fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::SeqCst);
}

// ============================================================================
// Driver
// ============================================================================

#[derive(Debug)]
pub struct MockDb {
    pub state: Arc<MockState>,
}

impl MockDb {
    pub fn new(state: &Arc<MockState>) -> Self {
        Self {
            state: Arc::clone(state),
        }
    }
}

/// Shared connection over a fresh driver.
pub fn connection(config: MockConfig) -> (Arc<MockState>, Arc<RelationalConnection<MockDb>>) {
    let state = MockState::new(config);
    let connection = RelationalConnection::new(MockDb::new(&state)).into_shared();
    (state, connection)
}

pub fn request<'a>(connection: &Arc<RelationalConnection<MockDb>>) -> CommandParameterObject<'a, MockDb> {
    CommandParameterObject::new(Arc::clone(connection))
}

impl DbConnection for MockDb {
    type Command = MockCommand;
    type Reader = MockReader;
    type Transaction = MockTransaction;

    fn is_open(&self) -> bool {
        self.state.is_open.load(Ordering::SeqCst)
    }

    fn open(&self) -> Result<()> {
        self.state.record("open");
        if self.state.config().fail_open {
            return Err(Error::connection(
                relcmd_core::ConnectionErrorKind::Open,
                "server unreachable",
            ));
        }
        bump(&self.state.counters.opens);
        self.state.is_open.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn open_async(&self, _cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        let result = self.open();
        async move { outcome(result) }
    }

    fn close(&self) -> Result<()> {
        self.state.record("close");
        bump(&self.state.counters.closes);
        self.state.is_open.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn close_async(&self, _cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        let result = self.close();
        async move { outcome(result) }
    }

    fn create_command(&self) -> Result<MockCommand> {
        self.state.record("create_command");
        bump(&self.state.counters.commands_created);
        Ok(MockCommand::new(&self.state))
    }

    fn begin_transaction(&self, isolation: IsolationLevel) -> Result<MockTransaction> {
        self.state.record("begin");
        bump(&self.state.counters.begins);
        Ok(MockTransaction {
            state: Arc::clone(&self.state),
            isolation,
        })
    }

    fn begin_transaction_async(
        &self,
        _cx: &Cx,
        isolation: IsolationLevel,
    ) -> impl Future<Output = Outcome<MockTransaction, Error>> + Send {
        let result = self.begin_transaction(isolation);
        async move { outcome(result) }
    }
}

pub struct MockCommand {
    state: Arc<MockState>,
    text: String,
    parameters: Vec<DbParameter>,
    timeout: Option<Duration>,
    transaction: Option<Arc<MockTransaction>>,
    /// Tag set by tests to recognise substituted commands.
    pub tag: Option<String>,
}

impl MockCommand {
    pub fn new(state: &Arc<MockState>) -> Self {
        Self {
            state: Arc::clone(state),
            text: String::new(),
            parameters: Vec::new(),
            timeout: None,
            transaction: None,
            tag: None,
        }
    }

    fn execute(&self, kind: &str) -> Result<MockConfig> {
        self.state.record(format!("execute:{kind}"));
        bump(&self.state.counters.executions);
        *self
            .state
            .last_command
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(CommandSnapshot {
            text: self.text.clone(),
            parameters: self.parameters.clone(),
            timeout: self.timeout,
            has_transaction: self.transaction.is_some(),
        });
        let config = self.state.config();
        if config.fail_execute {
            return Err(Error::command(CommandErrorKind::Database, "syntax error"));
        }
        Ok(config)
    }
}

impl DbCommand for MockCommand {
    type Reader = MockReader;
    type Transaction = MockTransaction;

    fn command_text(&self) -> &str {
        &self.text
    }

    fn set_command_text(&mut self, text: &str) {
        self.text = text.to_string();
    }

    fn set_transaction(&mut self, transaction: Option<Arc<MockTransaction>>) {
        self.transaction = transaction;
    }

    fn command_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn set_command_timeout(&mut self, timeout: Duration) {
        self.timeout = Some(timeout);
    }

    fn parameters(&self) -> &[DbParameter] {
        &self.parameters
    }

    fn add_parameter(&mut self, parameter: DbParameter) {
        self.parameters.push(parameter);
    }

    fn clear_parameters(&mut self) {
        self.parameters.clear();
    }

    fn execute_non_query(&mut self) -> Result<i64> {
        Ok(self.execute("non_query")?.rows_affected)
    }

    fn execute_non_query_async(&mut self, _cx: &Cx) -> impl Future<Output = Outcome<i64, Error>> + Send {
        let result = self.execute_non_query();
        async move { outcome(result) }
    }

    fn execute_scalar(&mut self) -> Result<Option<Value>> {
        Ok(self.execute("scalar")?.scalar)
    }

    fn execute_scalar_async(
        &mut self,
        _cx: &Cx,
    ) -> impl Future<Output = Outcome<Option<Value>, Error>> + Send {
        let result = self.execute_scalar();
        async move { outcome(result) }
    }

    fn execute_reader(&mut self) -> Result<MockReader> {
        let config = self.execute("reader")?;
        Ok(MockReader {
            state: Arc::clone(&self.state),
            result_sets: config.result_sets,
            result_index: 0,
            position: None,
            records_affected: config.records_affected,
        })
    }

    fn execute_reader_async(
        &mut self,
        _cx: &Cx,
    ) -> impl Future<Output = Outcome<MockReader, Error>> + Send {
        let result = self.execute_reader();
        async move { outcome(result) }
    }

    fn dispose(&mut self) -> Result<()> {
        self.state.record("dispose");
        bump(&self.state.counters.disposals);
        Ok(())
    }
}

pub struct MockReader {
    state: Arc<MockState>,
    result_sets: Vec<MockResultSet>,
    result_index: usize,
    position: Option<usize>,
    records_affected: i64,
}

impl MockReader {
    fn current(&self) -> Option<&MockResultSet> {
        self.result_sets.get(self.result_index)
    }
}

impl DbDataReader for MockReader {
    fn field_count(&self) -> usize {
        self.current().map_or(0, |set| set.columns.len())
    }

    fn column_name(&self, ordinal: usize) -> Result<&str> {
        self.current()
            .and_then(|set| set.columns.get(ordinal))
            .map(String::as_str)
            .ok_or_else(|| {
                Error::reader(
                    relcmd_core::ReaderErrorKind::OrdinalOutOfRange,
                    format!("no column {ordinal}"),
                )
            })
    }

    fn read(&mut self) -> Result<bool> {
        let rows = self.current().map_or(0, |set| set.rows.len());
        let next = self.position.map_or(0, |p| p + 1);
        self.position = Some(next.min(rows));
        Ok(next < rows)
    }

    fn read_async(&mut self, _cx: &Cx) -> impl Future<Output = Outcome<bool, Error>> + Send {
        let result = self.read();
        async move { outcome(result) }
    }

    fn next_result(&mut self) -> Result<bool> {
        if self.result_index + 1 < self.result_sets.len() {
            self.result_index += 1;
            self.position = None;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn next_result_async(&mut self, _cx: &Cx) -> impl Future<Output = Outcome<bool, Error>> + Send {
        let result = self.next_result();
        async move { outcome(result) }
    }

    fn get_value(&self, ordinal: usize) -> Result<Value> {
        let set = self.current();
        let row = self
            .position
            .and_then(|p| set.and_then(|set| set.rows.get(p)));
        row.and_then(|row| row.get(ordinal)).cloned().ok_or_else(|| {
            Error::reader(
                relcmd_core::ReaderErrorKind::NoRow,
                format!("no value at {ordinal}"),
            )
        })
    }

    fn records_affected(&self) -> i64 {
        self.records_affected
    }

    fn close(&mut self) -> Result<()> {
        self.state.record("reader_close");
        bump(&self.state.counters.reader_closes);
        Ok(())
    }
}

#[derive(Debug)]
pub struct MockTransaction {
    state: Arc<MockState>,
    isolation: IsolationLevel,
}

impl MockTransaction {
    pub fn new(state: &Arc<MockState>, isolation: IsolationLevel) -> Self {
        Self {
            state: Arc::clone(state),
            isolation,
        }
    }
}

impl DbTransaction for MockTransaction {
    fn isolation_level(&self) -> IsolationLevel {
        self.isolation
    }

    fn commit(&self) -> Result<()> {
        self.state.record("commit");
        bump(&self.state.counters.commits);
        Ok(())
    }

    fn commit_async(&self, _cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        let result = self.commit();
        async move { outcome(result) }
    }

    fn rollback(&self) -> Result<()> {
        self.state.record("rollback");
        bump(&self.state.counters.rollbacks);
        Ok(())
    }

    fn rollback_async(&self, _cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        let result = self.rollback();
        async move { outcome(result) }
    }
}
