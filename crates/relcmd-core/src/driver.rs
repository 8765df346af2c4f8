//! The native driver contract.
//!
//! A driver supplies four handle types: a connection, the commands it
//! creates, the readers those commands return and the transactions it
//! begins. Every I/O method comes in a blocking form returning [`Result`] and
//! an async form taking a [`Cx`] and resolving to an [`Outcome`].
//!
//! Connections and transactions are shared behind `Arc` by the engine, so
//! their methods take `&self`; drivers keep any mutable session state behind
//! their own locks. Commands and readers are exclusively owned by a single
//! execution and take `&mut self`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use asupersync::{Cx, Outcome};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::mode::from_result;
use crate::types::{DbType, IsolationLevel, ParameterDirection};
use crate::value::Value;

/// A native parameter attached to a native command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbParameter {
    pub name: String,
    pub value: Value,
    pub db_type: Option<DbType>,
    pub direction: ParameterDirection,
    pub is_nullable: bool,
    pub size: Option<u32>,
}

impl DbParameter {
    /// Input parameter with the type left to the driver.
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            db_type: None,
            direction: ParameterDirection::Input,
            is_nullable: true,
            size: None,
        }
    }

    pub fn with_db_type(mut self, db_type: DbType) -> Self {
        self.db_type = Some(db_type);
        self
    }

    pub fn with_direction(mut self, direction: ParameterDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.is_nullable = nullable;
        self
    }

    pub fn with_size(mut self, size: u32) -> Self {
        self.size = Some(size);
        self
    }
}

/// A native database connection.
pub trait DbConnection: Send + Sync + 'static {
    type Command: DbCommand<Reader = Self::Reader, Transaction = Self::Transaction>;
    type Reader: DbDataReader;
    type Transaction: DbTransaction;

    fn is_open(&self) -> bool;

    fn open(&self) -> Result<()>;

    fn open_async(&self, cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send;

    fn close(&self) -> Result<()>;

    fn close_async(&self, cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send;

    /// Create an empty command bound to this connection.
    fn create_command(&self) -> Result<Self::Command>;

    fn begin_transaction(&self, isolation: IsolationLevel) -> Result<Self::Transaction>;

    fn begin_transaction_async(
        &self,
        cx: &Cx,
        isolation: IsolationLevel,
    ) -> impl Future<Output = Outcome<Self::Transaction, Error>> + Send;
}

/// A native command.
pub trait DbCommand: Send + Sync + 'static {
    type Reader: DbDataReader;
    type Transaction: DbTransaction;

    fn command_text(&self) -> &str;

    fn set_command_text(&mut self, text: &str);

    fn set_transaction(&mut self, transaction: Option<Arc<Self::Transaction>>);

    fn command_timeout(&self) -> Option<Duration>;

    fn set_command_timeout(&mut self, timeout: Duration);

    fn parameters(&self) -> &[DbParameter];

    fn add_parameter(&mut self, parameter: DbParameter);

    fn clear_parameters(&mut self);

    /// Execute and return the number of rows affected.
    fn execute_non_query(&mut self) -> Result<i64>;

    fn execute_non_query_async(
        &mut self,
        cx: &Cx,
    ) -> impl Future<Output = Outcome<i64, Error>> + Send;

    /// Execute and return the first column of the first row.
    ///
    /// `None` means the command produced no rows; `Some(Value::Null)` means
    /// the first cell was SQL NULL.
    fn execute_scalar(&mut self) -> Result<Option<Value>>;

    fn execute_scalar_async(
        &mut self,
        cx: &Cx,
    ) -> impl Future<Output = Outcome<Option<Value>, Error>> + Send;

    fn execute_reader(&mut self) -> Result<Self::Reader>;

    fn execute_reader_async(
        &mut self,
        cx: &Cx,
    ) -> impl Future<Output = Outcome<Self::Reader, Error>> + Send;

    /// Release native resources held by the command.
    fn dispose(&mut self) -> Result<()>;

    fn dispose_async(&mut self, _cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        let result = self.dispose();
        async move { from_result(result) }
    }
}

/// A forward-only native result cursor.
pub trait DbDataReader: Send + 'static {
    /// Number of columns in the current result set.
    fn field_count(&self) -> usize;

    fn column_name(&self, ordinal: usize) -> Result<&str>;

    /// Advance to the next row; `false` once the result set is exhausted.
    fn read(&mut self) -> Result<bool>;

    fn read_async(&mut self, cx: &Cx) -> impl Future<Output = Outcome<bool, Error>> + Send;

    /// Advance to the next result set; `false` when there are no more.
    fn next_result(&mut self) -> Result<bool>;

    fn next_result_async(&mut self, cx: &Cx) -> impl Future<Output = Outcome<bool, Error>> + Send;

    /// Value at `ordinal` in the current row.
    fn get_value(&self, ordinal: usize) -> Result<Value>;

    fn is_db_null(&self, ordinal: usize) -> Result<bool> {
        Ok(self.get_value(ordinal)?.is_null())
    }

    /// Rows changed by the statements executed so far, `-1` for pure queries.
    fn records_affected(&self) -> i64;

    fn close(&mut self) -> Result<()>;

    fn close_async(&mut self, _cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        let result = self.close();
        async move { from_result(result) }
    }
}

/// A native transaction.
pub trait DbTransaction: Send + Sync + 'static {
    fn isolation_level(&self) -> IsolationLevel;

    fn commit(&self) -> Result<()>;

    fn commit_async(&self, cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send;

    fn rollback(&self) -> Result<()>;

    fn rollback_async(&self, cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send;
}
