//! Buffered data reader.
//!
//! [`BufferedDataReader`] drains a native reader into memory so the native
//! cursor, and with it the connection, can be released before the caller
//! starts iterating. The first result set is read through the declared
//! [`ReaderColumn`]s, which are checked for nullability and type; any further
//! result sets are buffered with all of their fields.

use std::future::Future;

use asupersync::{Cx, Outcome};
use relcmd_core::mode::{complete_blocking, from_result};
use relcmd_core::{
    DbDataReader, DbType, Error, ExecutionMode, ReaderErrorKind, Result, Value, try_outcome,
};

const NULL_VALUE_MESSAGE: &str = "Data is Null. This method or property cannot be called on Null values.";

/// Declared shape of one column of the first result set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderColumn {
    /// Column to read by name; positional when `None`.
    pub name: Option<String>,
    pub nullable: bool,
    /// Expected value type, unchecked when `None`.
    pub db_type: Option<DbType>,
}

impl ReaderColumn {
    /// A positional column.
    pub fn new(nullable: bool) -> Self {
        Self {
            name: None,
            nullable,
            db_type: None,
        }
    }

    /// A column looked up by name.
    pub fn named(name: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: Some(name.into()),
            nullable,
            db_type: None,
        }
    }

    pub fn with_db_type(mut self, db_type: DbType) -> Self {
        self.db_type = Some(db_type);
        self
    }
}

#[derive(Debug, Clone, Default)]
struct BufferedResultSet {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

/// An in-memory reader over fully materialized result sets.
#[derive(Debug, Clone)]
pub struct BufferedDataReader {
    result_sets: Vec<BufferedResultSet>,
    result_index: usize,
    /// Current row; `None` before the first `read`.
    position: Option<usize>,
    records_affected: i64,
    detailed_errors: bool,
    closed: bool,
}

impl BufferedDataReader {
    /// Buffer `reader` with blocking reads.
    pub fn initialize<R: DbDataReader>(
        reader: R,
        columns: &[ReaderColumn],
        detailed_errors: bool,
    ) -> Result<Self> {
        complete_blocking(Self::load(ExecutionMode::Blocking, reader, columns, detailed_errors))
    }

    pub async fn initialize_async<R: DbDataReader>(
        cx: &Cx,
        reader: R,
        columns: &[ReaderColumn],
        detailed_errors: bool,
    ) -> Outcome<Self, Error> {
        Self::load(ExecutionMode::Async(cx), reader, columns, detailed_errors).await
    }

    /// Drain `reader` and close it, whether or not loading succeeded.
    pub(crate) async fn load<R: DbDataReader>(
        mode: ExecutionMode<'_>,
        mut reader: R,
        columns: &[ReaderColumn],
        detailed_errors: bool,
    ) -> Outcome<Self, Error> {
        let loaded = Self::drain(mode, &mut reader, columns, detailed_errors).await;
        let records_affected = reader.records_affected();
        let closed = match mode {
            ExecutionMode::Blocking => from_result(reader.close()),
            ExecutionMode::Async(cx) => reader.close_async(cx).await,
        };

        let result_sets = try_outcome!(loaded);
        try_outcome!(closed);
        Outcome::Ok(Self {
            result_sets,
            result_index: 0,
            position: None,
            records_affected,
            detailed_errors,
            closed: false,
        })
    }

    async fn drain<R: DbDataReader>(
        mode: ExecutionMode<'_>,
        reader: &mut R,
        columns: &[ReaderColumn],
        detailed_errors: bool,
    ) -> Outcome<Vec<BufferedResultSet>, Error> {
        let ordinals = try_outcome!(from_result(resolve_ordinals(reader, columns)));
        let mut first = BufferedResultSet {
            columns: Vec::with_capacity(columns.len()),
            rows: Vec::new(),
        };
        for (column, &ordinal) in columns.iter().zip(&ordinals) {
            let name = match &column.name {
                Some(name) => name.clone(),
                None => try_outcome!(from_result(reader.column_name(ordinal))).to_string(),
            };
            first.columns.push(name);
        }

        while try_outcome!(read_row(mode, reader).await) {
            let mut row = Vec::with_capacity(columns.len());
            for (i, (column, &ordinal)) in columns.iter().zip(&ordinals).enumerate() {
                let value = try_outcome!(from_result(reader.get_value(ordinal)));
                try_outcome!(from_result(check_value(
                    column,
                    &first.columns[i],
                    ordinal,
                    &value,
                    detailed_errors
                )));
                row.push(value);
            }
            first.rows.push(row);
        }

        let mut result_sets = vec![first];
        while try_outcome!(next_result_set(mode, reader).await) {
            if let Some(cancelled) = mode.checkpoint() {
                return cancelled;
            }
            let field_count = reader.field_count();
            let mut set = BufferedResultSet::default();
            for ordinal in 0..field_count {
                let name = try_outcome!(from_result(reader.column_name(ordinal)));
                set.columns.push(name.to_string());
            }
            while try_outcome!(read_row(mode, reader).await) {
                let mut row = Vec::with_capacity(field_count);
                for ordinal in 0..field_count {
                    row.push(try_outcome!(from_result(reader.get_value(ordinal))));
                }
                set.rows.push(row);
            }
            result_sets.push(set);
        }

        tracing::debug!(
            target: "relcmd::reader",
            result_sets = result_sets.len(),
            rows = result_sets.iter().map(|s| s.rows.len()).sum::<usize>(),
            "Buffered data reader"
        );
        Outcome::Ok(result_sets)
    }

    /// Whether detailed column errors were enabled when buffering.
    pub fn detailed_errors(&self) -> bool {
        self.detailed_errors
    }

    /// Rows buffered in the current result set.
    pub fn row_count(&self) -> usize {
        self.current_set().map_or(0, |set| set.rows.len())
    }

    pub fn result_set_count(&self) -> usize {
        self.result_sets.len()
    }

    fn current_set(&self) -> Option<&BufferedResultSet> {
        self.result_sets.get(self.result_index)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::reader(ReaderErrorKind::Closed, "The data reader is closed."));
        }
        Ok(())
    }
}

async fn read_row<R: DbDataReader>(mode: ExecutionMode<'_>, reader: &mut R) -> Outcome<bool, Error> {
    match mode {
        ExecutionMode::Blocking => from_result(reader.read()),
        ExecutionMode::Async(cx) => reader.read_async(cx).await,
    }
}

async fn next_result_set<R: DbDataReader>(mode: ExecutionMode<'_>, reader: &mut R) -> Outcome<bool, Error> {
    match mode {
        ExecutionMode::Blocking => from_result(reader.next_result()),
        ExecutionMode::Async(cx) => reader.next_result_async(cx).await,
    }
}

fn resolve_ordinals<R: DbDataReader>(reader: &R, columns: &[ReaderColumn]) -> Result<Vec<usize>> {
    let field_count = reader.field_count();
    let mut ordinals = Vec::with_capacity(columns.len());
    for (position, column) in columns.iter().enumerate() {
        let ordinal = match &column.name {
            Some(name) => (0..field_count)
                .find(|&i| reader.column_name(i).is_ok_and(|n| n == name))
                .ok_or_else(|| {
                    Error::reader(
                        ReaderErrorKind::OrdinalOutOfRange,
                        format!("The result set does not contain a column named '{name}'."),
                    )
                })?,
            None if position < field_count => position,
            None => {
                return Err(Error::reader(
                    ReaderErrorKind::OrdinalOutOfRange,
                    format!(
                        "{} columns were declared but the result set has {field_count}.",
                        columns.len()
                    ),
                ));
            }
        };
        ordinals.push(ordinal);
    }
    Ok(ordinals)
}

fn check_value(
    column: &ReaderColumn,
    name: &str,
    ordinal: usize,
    value: &Value,
    detailed_errors: bool,
) -> Result<()> {
    if value.is_null() {
        if column.nullable {
            return Ok(());
        }
        let message = if detailed_errors {
            format!(
                "An error occurred while reading a database value for column '{name}' (ordinal {ordinal}). The column is not nullable but the value was NULL."
            )
        } else {
            NULL_VALUE_MESSAGE.to_string()
        };
        return Err(Error::reader(ReaderErrorKind::NullValue, message));
    }

    let Some(expected) = column.db_type else {
        return Ok(());
    };
    let actual = value.db_type();
    if expected == DbType::Object || actual == Some(expected) {
        return Ok(());
    }
    let actual = actual.map_or_else(|| "unknown".to_string(), |t| t.to_string());
    let message = if detailed_errors {
        format!(
            "An error occurred while reading a database value for column '{name}' (ordinal {ordinal}). The expected type was '{expected}' but the actual value was of type '{actual}'."
        )
    } else {
        format!("Unable to cast a value of type '{actual}' to type '{expected}'.")
    };
    Err(Error::reader(ReaderErrorKind::TypeMismatch, message))
}

impl DbDataReader for BufferedDataReader {
    fn field_count(&self) -> usize {
        self.current_set().map_or(0, |set| set.columns.len())
    }

    fn column_name(&self, ordinal: usize) -> Result<&str> {
        self.current_set()
            .and_then(|set| set.columns.get(ordinal))
            .map(String::as_str)
            .ok_or_else(|| {
                Error::reader(
                    ReaderErrorKind::OrdinalOutOfRange,
                    format!("Ordinal {ordinal} is out of range."),
                )
            })
    }

    fn read(&mut self) -> Result<bool> {
        self.ensure_open()?;
        let row_count = self.row_count();
        let next = self.position.map_or(0, |p| p + 1);
        if next < row_count {
            self.position = Some(next);
            Ok(true)
        } else {
            self.position = Some(row_count);
            Ok(false)
        }
    }

    fn read_async(&mut self, _cx: &Cx) -> impl Future<Output = Outcome<bool, Error>> + Send {
        let result = self.read();
        async move { from_result(result) }
    }

    fn next_result(&mut self) -> Result<bool> {
        self.ensure_open()?;
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
        async move { from_result(result) }
    }

    fn get_value(&self, ordinal: usize) -> Result<Value> {
        self.ensure_open()?;
        let row = self
            .position
            .and_then(|p| self.current_set().and_then(|set| set.rows.get(p)))
            .ok_or_else(|| Error::reader(ReaderErrorKind::NoRow, "No data exists for the row."))?;
        row.get(ordinal).cloned().ok_or_else(|| {
            Error::reader(
                ReaderErrorKind::OrdinalOutOfRange,
                format!("Ordinal {ordinal} is out of range."),
            )
        })
    }

    fn records_affected(&self) -> i64 {
        self.records_affected
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}
