//! Positional and named parameter binding.

use crate::ffi;
use crate::statement::{Statement, query_error};
use crate::types;
use sqlkit_core::error::QueryErrorKind;
use sqlkit_core::{Result, Value};
use std::ffi::{CString, c_int};

/// Binds values into the parameter slots of one statement.
///
/// Indices are 1-based, as in SQL. Named parameters may be given with or
/// without their leading `:`; names starting with `@`, `$` or `?` (as in
/// `?2`) are looked up as written.
pub struct ParameterBinder<'a> {
    statement: &'a Statement<'a>,
}

impl<'a> ParameterBinder<'a> {
    pub(crate) fn new(statement: &'a Statement<'a>) -> Self {
        Self { statement }
    }

    /// Number of parameter slots in the statement.
    pub fn count(&self) -> usize {
        if self.statement.is_closed() {
            return 0;
        }
        // SAFETY: the statement is open
        let n = unsafe { ffi::sqlite3_bind_parameter_count(self.statement.raw()) };
        usize::try_from(n).unwrap_or(0)
    }

    /// Bind `value` to the 1-based slot `index`.
    pub fn bind(&mut self, index: usize, value: impl Into<Value>) -> Result<()> {
        self.statement.ensure_open(QueryErrorKind::Bind)?;
        let value = value.into();
        let Some(slot) = c_int::try_from(index).ok().filter(|i| *i > 0) else {
            return Err(self.bind_error(ffi::SQLITE_RANGE, &index.to_string()));
        };

        // SAFETY: the statement is open; out-of-range slots report SQLITE_RANGE
        let rc = unsafe { types::bind_value(self.statement.raw(), slot, &value) };
        if rc == ffi::SQLITE_OK {
            Ok(())
        } else {
            Err(self.bind_error(rc, &index.to_string()))
        }
    }

    /// Bind `value` to the named parameter `name` (`:name` or `name`).
    pub fn bind_named(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let index = self.index_of(name)?;
        self.bind(index, value)
    }

    /// Bind `values` to slots 1, 2, 3, ... in order.
    pub fn bind_all<I, V>(&mut self, values: I) -> Result<()>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        for (i, value) in values.into_iter().enumerate() {
            self.bind(i + 1, value)?;
        }
        Ok(())
    }

    /// Bind each `(name, value)` pair by name.
    pub fn bind_map<I, K, V>(&mut self, pairs: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        for (name, value) in pairs {
            self.bind_named(name.as_ref(), value)?;
        }
        Ok(())
    }

    /// Resolve a parameter name to its 1-based slot.
    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.statement.ensure_open(QueryErrorKind::Bind)?;
        let full = if name.starts_with([':', '@', '$', '?']) {
            name.to_string()
        } else {
            format!(":{}", name)
        };

        let Ok(c_name) = CString::new(full.as_str()) else {
            return Err(self.bind_error(ffi::SQLITE_RANGE, &full));
        };

        // SAFETY: the statement is open and c_name is NUL-terminated
        let index =
            unsafe { ffi::sqlite3_bind_parameter_index(self.statement.raw(), c_name.as_ptr()) };
        match usize::try_from(index) {
            Ok(i) if i > 0 => Ok(i),
            _ => Err(self.bind_error(ffi::SQLITE_RANGE, &full)),
        }
    }

    fn bind_error(&self, code: c_int, parameter: &str) -> sqlkit_core::Error {
        let reason = match code {
            ffi::SQLITE_TOOBIG => "Value is too large",
            ffi::SQLITE_RANGE => "Parameter index out of range",
            ffi::SQLITE_NOMEM => "Malloc failed",
            other => ffi::error_string(other),
        };
        query_error(
            QueryErrorKind::Bind,
            code,
            self.statement.sql(),
            format!("{} (parameter {})", reason, parameter),
        )
    }
}
