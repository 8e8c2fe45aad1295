//! Cursor over the rows produced by a statement.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

use crate::ffi;
use crate::statement::{Statement, Step};
use crate::types;
use sqlkit_core::error::{ColumnError, ColumnErrorKind};
use sqlkit_core::{ColumnInfo, Error, Result, Row, Value};
use std::cell::OnceCell;
use std::ffi::c_int;
use std::sync::Arc;

/// Where a cursor is in its row stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// `next` has not been called yet
    NotStarted,
    /// Positioned on a row that can be read
    HasRow,
    /// Every row has been read and the statement released
    Exhausted,
    /// Closed early or after a failed step
    Closed,
}

/// A column selector: an index (`usize`) or a column name (`&str`).
pub trait ColumnIndex {
    fn resolve(&self, rows: &ResultSet<'_>) -> Result<usize>;
}

impl ColumnIndex for usize {
    fn resolve(&self, rows: &ResultSet<'_>) -> Result<usize> {
        if *self < rows.column_count() {
            Ok(*self)
        } else {
            Err(column_error(
                ColumnErrorKind::OutOfRange,
                self.to_string(),
                format!(
                    "index out of range (column count {})",
                    rows.column_count()
                ),
            ))
        }
    }
}

impl ColumnIndex for &str {
    fn resolve(&self, rows: &ResultSet<'_>) -> Result<usize> {
        let Some(columns) = rows.columns() else {
            return Err(no_row(self));
        };
        columns.index_of(self).ok_or_else(|| {
            column_error(
                ColumnErrorKind::NotFound,
                (*self).to_string(),
                "column not found".to_string(),
            )
        })
    }
}

/// Forward-only cursor that owns its statement.
///
/// The statement is released as soon as the cursor runs off the end or a
/// step fails. Column names are resolved once, on first use by name.
pub struct ResultSet<'conn> {
    statement: Statement<'conn>,
    state: CursorState,
    column_count: usize,
    columns: OnceCell<Arc<ColumnInfo>>,
}

impl<'conn> ResultSet<'conn> {
    pub(crate) fn new(statement: Statement<'conn>) -> Self {
        let column_count = statement.column_count();
        Self {
            statement,
            state: CursorState::NotStarted,
            column_count,
            columns: OnceCell::new(),
        }
    }

    /// Advance to the next row. Returns `false` at the end.
    ///
    /// Once exhausted or closed the cursor keeps returning `false`. A step
    /// failure closes the cursor and is returned.
    pub fn next(&mut self) -> Result<bool> {
        if matches!(self.state, CursorState::Exhausted | CursorState::Closed) {
            return Ok(false);
        }
        match self.statement.step() {
            Ok(Step::Row) => {
                self.state = CursorState::HasRow;
                Ok(true)
            }
            Ok(Step::Done) => {
                self.state = CursorState::Exhausted;
                self.statement.close();
                Ok(false)
            }
            Err(e) => {
                self.state = CursorState::Closed;
                self.statement.close();
                Err(e)
            }
        }
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    /// Is the cursor positioned on a readable row?
    pub fn has_row(&self) -> bool {
        self.state == CursorState::HasRow
    }

    pub fn column_count(&self) -> usize {
        self.column_count
    }

    pub fn column_name(&self, index: usize) -> Option<&str> {
        self.columns()?.name_at(index)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns()?.index_of(name)
    }

    pub fn sql(&self) -> &str {
        self.statement.sql()
    }

    /// Release the statement early. Calling this again does nothing.
    pub fn close(&mut self) {
        if self.state != CursorState::Exhausted {
            self.state = CursorState::Closed;
        }
        self.statement.close();
    }

    /// Read a column as a `Value`, keeping its storage class.
    pub fn value<I: ColumnIndex>(&self, column: I) -> Result<Value> {
        let index = self.position(&column)?;
        // SAFETY: positioned on a row and index < column count
        Ok(unsafe { types::read_column(self.statement.raw(), index) })
    }

    pub fn int<I: ColumnIndex>(&self, column: I) -> Result<Option<i32>> {
        self.read(&column, |stmt, i| unsafe { ffi::sqlite3_column_int(stmt, i) })
    }

    pub fn long<I: ColumnIndex>(&self, column: I) -> Result<Option<i64>> {
        self.read(&column, |stmt, i| unsafe { ffi::sqlite3_column_int64(stmt, i) })
    }

    pub fn double<I: ColumnIndex>(&self, column: I) -> Result<Option<f64>> {
        self.read(&column, |stmt, i| unsafe { ffi::sqlite3_column_double(stmt, i) })
    }

    /// Read a column as text; numbers are rendered by the engine.
    pub fn string<I: ColumnIndex>(&self, column: I) -> Result<Option<String>> {
        self.read(&column, |stmt, i| unsafe {
            let ptr = ffi::sqlite3_column_text(stmt, i);
            let len = ffi::sqlite3_column_bytes(stmt, i);
            if ptr.is_null() {
                String::new()
            } else {
                let slice = std::slice::from_raw_parts(ptr, len as usize);
                String::from_utf8_lossy(slice).into_owned()
            }
        })
    }

    pub fn bytes<I: ColumnIndex>(&self, column: I) -> Result<Option<Vec<u8>>> {
        self.read(&column, |stmt, i| unsafe {
            let ptr = ffi::sqlite3_column_blob(stmt, i);
            let len = ffi::sqlite3_column_bytes(stmt, i);
            if ptr.is_null() || len == 0 {
                Vec::new()
            } else {
                std::slice::from_raw_parts(ptr.cast::<u8>(), len as usize).to_vec()
            }
        })
    }

    /// Copy the current row into an owned, thread-portable `Row`.
    pub fn row(&self) -> Result<Row> {
        if !self.has_row() {
            return Err(no_row(&"*"));
        }
        let columns = self.columns().ok_or_else(|| no_row(&"*"))?;
        let raw = self.statement.raw();
        let values = (0..self.column_count)
            // SAFETY: positioned on a row and every index < column count
            .map(|i| unsafe { types::read_column(raw, i as c_int) })
            .collect();
        Ok(Row::with_columns(Arc::clone(columns), values))
    }

    /// Drain the cursor into owned rows, starting with the current row if
    /// the cursor is positioned on one.
    pub fn collect_rows(&mut self) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        if self.has_row() {
            rows.push(self.row()?);
        }
        while self.next()? {
            rows.push(self.row()?);
        }
        Ok(rows)
    }

    /// Lazily built name index; `None` once the statement is gone and the
    /// names were never looked up.
    fn columns(&self) -> Option<&Arc<ColumnInfo>> {
        if let Some(columns) = self.columns.get() {
            return Some(columns);
        }
        if self.statement.is_closed() {
            return None;
        }
        Some(self.columns.get_or_init(|| {
            let raw = self.statement.raw();
            let names = (0..self.column_count)
                .map(|i| {
                    // SAFETY: statement is open and i < column count
                    unsafe { types::column_name(raw, i as c_int) }.unwrap_or_default()
                })
                .collect();
            Arc::new(ColumnInfo::new(names))
        }))
    }

    fn position<I: ColumnIndex>(&self, column: &I) -> Result<c_int> {
        let index = column.resolve(self)?;
        if !self.has_row() {
            return Err(no_row(&index));
        }
        Ok(index as c_int)
    }

    fn read<I, T, F>(&self, column: &I, get: F) -> Result<Option<T>>
    where
        I: ColumnIndex,
        F: FnOnce(*mut ffi::sqlite3_stmt, c_int) -> T,
    {
        let index = self.position(column)?;
        let raw = self.statement.raw();
        // SAFETY: positioned on a row and index < column count
        if unsafe { ffi::sqlite3_column_type(raw, index) } == ffi::SQLITE_NULL {
            return Ok(None);
        }
        Ok(Some(get(raw, index)))
    }
}

impl std::fmt::Debug for ResultSet<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultSet")
            .field("sql", &self.statement.sql())
            .field("state", &self.state)
            .field("column_count", &self.column_count)
            .finish_non_exhaustive()
    }
}

fn column_error(kind: ColumnErrorKind, column: String, message: String) -> Error {
    Error::Column(ColumnError {
        kind,
        column,
        message,
    })
}

fn no_row(column: &dyn std::fmt::Display) -> Error {
    column_error(
        ColumnErrorKind::NoRow,
        column.to_string(),
        "cursor is not positioned on a row".to_string(),
    )
}
